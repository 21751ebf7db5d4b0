use alloc::boxed::Box;
use core::{
    any::Any,
    fmt::{Debug, Display},
};

/// Trait that allows the host to return custom errors from imported
/// functions.
///
/// Types implementing this trait can be converted into a `Trap` and later
/// recovered by the embedder through the downcasting methods below. Useful
/// for representing custom traps or other host specific conditions, such as
/// a requested process exit.
pub trait HostError: 'static + Display + Debug + Any + Send + Sync {}

impl dyn HostError {
    /// Returns `true` if `self` is of type `T`.
    pub fn is<T: HostError>(&self) -> bool {
        (self as &dyn Any).is::<T>()
    }

    /// Downcasts the [`HostError`] into a shared reference to a `T` if
    /// possible, otherwise returns `None`.
    pub fn downcast_ref<T: HostError>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref::<T>()
    }

    /// Downcasts the [`HostError`] into an exclusive reference to a `T` if
    /// possible, otherwise returns `None`.
    pub fn downcast_mut<T: HostError>(&mut self) -> Option<&mut T> {
        (self as &mut dyn Any).downcast_mut::<T>()
    }

    /// Consumes `self` to downcast the [`HostError`] into a `T` if possible.
    ///
    /// # Errors
    ///
    /// Returns `self` back if it is not a `T`.
    pub fn downcast<T: HostError>(self: Box<Self>) -> Result<Box<T>, Box<Self>> {
        if self.is::<T>() {
            match (self as Box<dyn Any>).downcast::<T>() {
                Ok(value) => Ok(value),
                Err(_) => unreachable!("`is` checked that the types match"),
            }
        } else {
            Err(self)
        }
    }
}
