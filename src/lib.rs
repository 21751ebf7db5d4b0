//! # wasmlite
//!
//! This library loads WebAssembly 1.0 modules in binary format, instantiates
//! them and invokes their exported functions through a direct interpreter.
//!
//! # Introduction
//!
//! Wasm code is distributed in the form of modules that contain definitions
//! of functions, global variables, linear memories and tables, each of which
//! can be imported and exported. Modules can also carry initialization data
//! for their memories in the form of segments copied to given offsets, and
//! can name a `start` function that runs when the module is loaded.
//!
//! ## Decoding
//!
//! [`Module::from_buffer`] decodes a binary module: it checks the magic
//! bytes and version, walks the sections, and records everything execution
//! needs, including the structural skeleton of every function body. Full
//! type-checking validation is deliberately out of scope; modules are
//! assumed to be well formed enough to execute, and ill-typed stack states
//! surface as runtime errors.
//!
//! ## Instantiation
//!
//! [`ModuleInstance::new`] allocates the module's memories and globals,
//! evaluates the global initializer expressions, copies active data
//! segments into memory, and yields a handle that runs the `start`
//! function, if any, before handing out the finished instance.
//!
//! ## Execution
//!
//! Exported functions are invoked with [`ModuleInstance::call`]. Imported
//! functions are resolved by name at call time through the [`Externals`]
//! trait, which a host (such as the bundled WASI shim) implements. A
//! function either returns a result or traps; on a trap the whole call
//! unwinds and the instance's memories and globals keep whatever partial
//! effects were already applied.
//!
//! # Examples
//!
//! ```rust
//! use wasmlite::{Module, ModuleInstance, NopExternals, Value};
//!
//! let wasm = wat::parse_str(
//!     r#"
//!     (module
//!         (func (export "test") (result i32)
//!             i32.const 1337
//!         )
//!     )
//!     "#,
//! )
//! .expect("failed to parse wat");
//!
//! let module = Module::from_buffer(&wasm).expect("failed to load wasm");
//! let instance = ModuleInstance::new(&module.into())
//!     .expect("failed to instantiate wasm module")
//!     .assert_no_start();
//!
//! assert_eq!(
//!     instance
//!         .call(&mut NopExternals, "test", &[])
//!         .expect("failed to execute export"),
//!     Some(Value::I32(1337)),
//! );
//! ```

#![warn(missing_docs)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
#[macro_use]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std as alloc;

use alloc::{boxed::Box, string::String};
use core::fmt;
#[cfg(feature = "std")]
use std::error;


/// Error type which can be produced by wasm code or by the host environment.
///
/// Under some conditions wasm execution produces a `Trap`, which immediately
/// aborts execution. Traps cannot be handled by WebAssembly code, but are
/// reported to the embedder.
#[derive(Debug)]
pub struct Trap {
    kind: TrapKind,
}

impl Trap {
    /// Create a new trap.
    pub fn new(kind: TrapKind) -> Trap {
        Trap { kind }
    }

    /// Returns the kind of this trap.
    pub fn kind(&self) -> &TrapKind {
        &self.kind
    }

    /// Converts into the kind of this trap.
    pub fn into_kind(self) -> TrapKind {
        self.kind
    }

    /// Returns the [`TrapCode`] of this trap if it is not a host trap.
    pub fn code(&self) -> Option<TrapCode> {
        match self.kind {
            TrapKind::Code(code) => Some(code),
            TrapKind::Host(_) => None,
        }
    }
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            TrapKind::Code(code) => write!(f, "Trap: {}", code),
            TrapKind::Host(host) => write!(f, "Trap: {}", host),
        }
    }
}

#[cfg(feature = "std")]
impl error::Error for Trap {}

/// Kind of a [`Trap`]: either one of the wasm trap codes or an error
/// specified by the host.
#[derive(Debug)]
pub enum TrapKind {
    /// One of the traps mandated by the WebAssembly specification.
    Code(TrapCode),
    /// Error specified by the host, typically returned from an
    /// implementation of [`Externals`].
    Host(Box<dyn HostError>),
}

impl TrapKind {
    /// Whether this trap originates from the host.
    pub fn is_host(&self) -> bool {
        matches!(self, TrapKind::Host(_))
    }
}

impl From<TrapCode> for Trap {
    fn from(code: TrapCode) -> Trap {
        Trap::new(TrapKind::Code(code))
    }
}

impl<U> From<U> for Trap
where
    U: HostError + Sized,
{
    fn from(e: U) -> Self {
        Trap::new(TrapKind::Host(Box::new(e)))
    }
}

/// Internal interpreter error.
#[derive(Debug)]
pub enum Error {
    /// Module decoding error. Can only occur at load time.
    Decode(DecodeError),
    /// Error while instantiating a module. Occurs when the module requires
    /// imports the embedder cannot satisfy or when segment initialization
    /// fails.
    Instantiation(String),
    /// Function-level error: unknown export, argument mismatch, bad local
    /// index.
    Function(String),
    /// Table-level error.
    Table(String),
    /// Memory-level error.
    Memory(String),
    /// Global-level error.
    Global(String),
    /// Value-level error: a value of an unexpected kind was read from the
    /// operand stack.
    Value(String),
    /// Trap.
    Trap(Trap),
    /// Custom embedder error.
    Host(Box<dyn HostError>),
}

impl Error {
    /// Returns a reference to a [`HostError`] if this `Error` represents
    /// some host error, i.e. if it is of the [`Error::Host`] variant or a
    /// [`Error::Trap`] of host kind.
    pub fn as_host_error(&self) -> Option<&dyn HostError> {
        match self {
            Error::Host(host_err) => Some(&**host_err),
            Error::Trap(Trap {
                kind: TrapKind::Host(host_err),
            }) => Some(&**host_err),
            _ => None,
        }
    }

    /// Returns the [`HostError`] if this `Error` represents some host error,
    /// otherwise returns the original error.
    pub fn try_into_host_error(self) -> Result<Box<dyn HostError>, Self> {
        match self {
            Error::Host(host_err) => Ok(host_err),
            Error::Trap(Trap {
                kind: TrapKind::Host(host_err),
            }) => Ok(host_err),
            other => Err(other),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Decode(ref e) => write!(f, "Decode: {}", e),
            Error::Instantiation(ref s) => write!(f, "Instantiation: {}", s),
            Error::Function(ref s) => write!(f, "Function: {}", s),
            Error::Table(ref s) => write!(f, "Table: {}", s),
            Error::Memory(ref s) => write!(f, "Memory: {}", s),
            Error::Global(ref s) => write!(f, "Global: {}", s),
            Error::Value(ref s) => write!(f, "Value: {}", s),
            Error::Trap(ref t) => write!(f, "{}", t),
            Error::Host(ref e) => write!(f, "User: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl error::Error for Error {}

impl<U> From<U> for Error
where
    U: HostError + Sized,
{
    fn from(e: U) -> Self {
        Error::Host(Box::new(e))
    }
}

impl From<Trap> for Error {
    fn from(e: Trap) -> Error {
        Error::Trap(e)
    }
}

impl From<TrapCode> for Error {
    fn from(code: TrapCode) -> Error {
        Error::Trap(Trap::from(code))
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Error {
        Error::Decode(e)
    }
}

mod global;
mod host;
mod instance;
mod memory;
mod module;
mod opcode;
mod reader;
mod runner;
mod stack;
mod types;
mod value;

#[cfg(test)]
mod tests;

pub use self::global::{GlobalInstance, GlobalRef};
pub use self::host::{Externals, NopExternals, ProcExit, RuntimeArgs};
pub use self::instance::{ModuleInstance, ModuleRef, NotStartedModuleRef};
pub use self::memory::{MemoryInstance, MemoryRef, LINEAR_MEMORY_PAGE_SIZE};
pub use self::module::{CustomSection, DataMode, Module};
pub use self::reader::{DecodeError, DecodeErrorKind};
pub use self::runner::{StackLimits, DEFAULT_CALL_STACK_LIMIT, DEFAULT_VALUE_STACK_LIMIT};
pub use self::types::{
    BlockType,
    ExportEntry,
    ExternalKind,
    FuncType,
    GlobalType,
    ImportDesc,
    ImportEntry,
    Limits,
    TableType,
};
pub use self::value::{FromValue, Value};
pub use wasmlite_core::{HostError, TrapCode, ValueType, F32, F64};

/// WebAssembly-specific sizes and units.
pub mod memory_units {
    pub use memory_units::wasm32::*;
    pub use memory_units::{size_of, ByteSize, Bytes, RoundUpTo};
}
