use crate::{Trap, Value};
use core::fmt;
use wasmlite_core::{HostError, TrapCode};

/// Wrapper around a slice of [`Value`] for using it as an argument list
/// conveniently.
#[derive(Debug)]
pub struct RuntimeArgs<'a>(&'a [Value]);

impl<'a> From<&'a [Value]> for RuntimeArgs<'a> {
    fn from(inner: &'a [Value]) -> Self {
        RuntimeArgs(inner)
    }
}

impl<'a> AsRef<[Value]> for RuntimeArgs<'a> {
    fn as_ref(&self) -> &[Value] {
        self.0
    }
}

impl<'a> RuntimeArgs<'a> {
    /// Extracts an argument by index `idx`, converted to `T`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the cast is invalid or there are not enough
    /// arguments.
    pub fn nth_checked<T>(&self, idx: usize) -> Result<T, Trap>
    where
        T: crate::FromValue,
    {
        self.nth_value_checked(idx)?
            .try_into()
            .ok_or_else(|| Trap::from(TrapCode::UnexpectedSignature))
    }

    /// Extracts an argument as a [`Value`] by index `idx`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if this list does not have enough arguments.
    pub fn nth_value_checked(&self, idx: usize) -> Result<Value, Trap> {
        if self.0.len() <= idx {
            return Err(TrapCode::UnexpectedSignature.into());
        }
        Ok(self.0[idx])
    }

    /// Total number of arguments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Trait that allows the embedder to implement imported functions.
///
/// Whenever the interpreter reaches a call to a function index below the
/// imported-function count, it pops the arguments off the operand stack in
/// declaration order and hands them to [`invoke_import`] together with the
/// import's module and field names. The returned value, if any, is pushed
/// back onto the operand stack; its kind is checked against the import's
/// declared result type.
///
/// [`invoke_import`]: #tymethod.invoke_import
///
/// # Examples
///
/// ```rust
/// use wasmlite::{Externals, RuntimeArgs, Trap, Value};
///
/// struct HostExternals;
///
/// impl Externals for HostExternals {
///     fn invoke_import(
///         &mut self,
///         module: &str,
///         field: &str,
///         args: RuntimeArgs,
///     ) -> Result<Option<Value>, Trap> {
///         match (module, field) {
///             ("env", "add") => {
///                 let a: u32 = args.nth_checked(0)?;
///                 let b: u32 = args.nth_checked(1)?;
///                 Ok(Some(Value::I32(a.wrapping_add(b) as i32)))
///             }
///             _ => panic!("unimplemented import {}.{}", module, field),
///         }
///     }
/// }
/// ```
pub trait Externals {
    /// Performs the invocation of an imported function identified by its
    /// module and field names.
    fn invoke_import(
        &mut self,
        module: &str,
        field: &str,
        args: RuntimeArgs,
    ) -> Result<Option<Value>, Trap>;

    /// Returns the exit status requested by the host, if any.
    ///
    /// The dispatch loop polls this at the top of each frame transition
    /// and after every bridged call; a `Some` unwinds all frames with a
    /// [`ProcExit`] pseudo-trap.
    fn exit_status(&self) -> Option<i32> {
        None
    }
}

/// Implementation of [`Externals`] that traps on any imported call.
pub struct NopExternals;

impl Externals for NopExternals {
    fn invoke_import(
        &mut self,
        _module: &str,
        _field: &str,
        _args: RuntimeArgs,
    ) -> Result<Option<Value>, Trap> {
        Err(TrapCode::Unreachable.into())
    }
}

/// Host error that carries the exit status a guest requested.
///
/// Raised as a pseudo-trap when the host records an exit status; the
/// embedder recovers the status by downcasting.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProcExit(pub i32);

impl fmt::Display for ProcExit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "process exited with status {}", self.0)
    }
}

impl HostError for ProcExit {}

#[cfg(test)]
mod tests {
    use super::RuntimeArgs;
    use crate::Value;

    #[test]
    fn i32_runtime_args() {
        let args: RuntimeArgs = (&[Value::I32(0)][..]).into();
        let val: i32 = args.nth_checked(0).unwrap();
        assert_eq!(val, 0);
    }

    #[test]
    fn invalid_cast_is_an_error() {
        let args: RuntimeArgs = (&[Value::I64(90534534545322)][..]).into();
        assert!(args.nth_checked::<i32>(0).is_err());
        assert!(args.nth_value_checked(1).is_err());
    }
}
