//! Core primitives of the wasmlite WebAssembly interpreter.
//!
//! This crate holds the pieces of the runtime that do not depend on the
//! module format or the execution engine: the value-type model, the numeric
//! conversion and operator traits with their primitive implementations, the
//! NaN-preserving float wrappers and the trap codes shared by every layer.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std as alloc;

mod host_error;
mod nan_preserving_float;
mod trap;
mod value;

pub use self::{
    host_error::HostError,
    nan_preserving_float::{F32, F64},
    trap::TrapCode,
    value::{
        ArithmeticOps,
        ExtendInto,
        Float,
        Integer,
        LittleEndianConvert,
        LoadInto,
        SignExtendFrom,
        StoreFrom,
        TransmuteInto,
        TryTruncateInto,
        ValueType,
        WrapInto,
    },
};
