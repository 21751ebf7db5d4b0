use crate::{Error, Value};
use alloc::rc::Rc;
use core::cell::Cell;
use wasmlite_core::ValueType;

/// Reference to a global variable (see [`GlobalInstance`] for details).
///
/// This reference has reference-counting semantics.
#[derive(Clone, Debug)]
pub struct GlobalRef(Rc<GlobalInstance>);

impl ::core::ops::Deref for GlobalRef {
    type Target = GlobalInstance;
    fn deref(&self) -> &GlobalInstance {
        &self.0
    }
}

/// Runtime representation of a global variable (or `global` for short).
///
/// A global contains a value of a specified type and a flag which tells
/// whether it is mutable or immutable. Neither the type of the value nor
/// the mutability can be changed after creation.
#[derive(Debug)]
pub struct GlobalInstance {
    val: Cell<Value>,
    mutable: bool,
}

impl GlobalInstance {
    /// Allocates a global variable instance with the given initial value.
    pub fn alloc(val: Value, mutable: bool) -> GlobalRef {
        GlobalRef(Rc::new(GlobalInstance {
            val: Cell::new(val),
            mutable,
        }))
    }

    /// Changes the value of this global variable.
    ///
    /// # Errors
    ///
    /// Returns `Err` if this global is immutable or if the type of `val`
    /// does not match the global's type.
    pub fn set(&self, val: Value) -> Result<(), Error> {
        if !self.mutable {
            return Err(Error::Global(
                "attempt to change an immutable variable".into(),
            ));
        }
        if self.value_type() != val.value_type() {
            return Err(Error::Global("attempt to change variable type".into()));
        }
        self.val.set(val);
        Ok(())
    }

    /// Returns the value of this global variable.
    pub fn get(&self) -> Value {
        self.val.get()
    }

    /// Returns whether this global variable is mutable.
    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Returns the value type of this global variable.
    pub fn value_type(&self) -> ValueType {
        self.val.get().value_type()
    }
}
