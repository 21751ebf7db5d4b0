use core::fmt::{self, Display};

/// Error type which can be produced by executing wasm code.
///
/// A trap aborts the current invocation: all call frames are discarded and
/// the error is reported to the embedder. Traps cannot be handled by
/// WebAssembly code itself.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TrapCode {
    /// Wasm code executed the `unreachable` opcode.
    ///
    /// `unreachable` is a special opcode which always traps upon execution.
    /// This opcode has a similar purpose as `ud2` in x86.
    Unreachable,

    /// Attempt to load from or store at an address which lies outside of the
    /// bounds of the linear memory.
    ///
    /// Since addresses are interpreted as unsigned integers, out of bounds
    /// access cannot happen with negative addresses (they always wrap).
    MemoryAccessOutOfBounds,

    /// Attempt to access a table element at an index which lies outside of
    /// the bounds of the table.
    TableAccessOutOfBounds,

    /// An indirect call selected a table element that refers to no function.
    UndefinedElement,

    /// Attempt to call a table element which is uninitialized.
    ElemUninitialized,

    /// Attempt to divide by zero.
    ///
    /// Raised when `div` or `rem` is executed with zero as divisor.
    DivisionByZero,

    /// An integer arithmetic operation caused an overflow.
    ///
    /// Raised by signed division (or remainder) of -2<sup>N-1</sup> over -1,
    /// because the result +2<sup>N-1</sup> is not representable as an N-bit
    /// signed integer.
    IntegerOverflow,

    /// Attempt to make an invalid conversion to an integer.
    ///
    /// Raised when truncating NaNs, infinity, or a value for which the
    /// result is out of range, into an integer.
    InvalidConversionToInt,

    /// The operand stack exceeded its configured depth limit.
    StackOverflow,

    /// An instruction required more operands than the stack held.
    ///
    /// Can only occur for modules that would not pass full validation;
    /// execution is validation-lite by design.
    StackUnderflow,

    /// The call stack exceeded its configured depth limit.
    ///
    /// This is likely caused by some infinite or very deep recursion.
    CallStackExhaustion,

    /// Attempt to invoke a function through `call_indirect` with a
    /// mismatching signature.
    UnexpectedSignature,
}

impl TrapCode {
    /// Returns the trap message as specified by the WebAssembly specification.
    pub fn trap_message(&self) -> &'static str {
        match self {
            TrapCode::Unreachable => "unreachable",
            TrapCode::MemoryAccessOutOfBounds => "out of bounds memory access",
            TrapCode::TableAccessOutOfBounds => "out of bounds table access",
            TrapCode::UndefinedElement => "undefined element",
            TrapCode::ElemUninitialized => "uninitialized element",
            TrapCode::DivisionByZero => "integer divide by zero",
            TrapCode::IntegerOverflow => "integer overflow",
            TrapCode::InvalidConversionToInt => "invalid conversion to integer",
            TrapCode::StackOverflow => "value stack exhausted",
            TrapCode::StackUnderflow => "value stack underflow",
            TrapCode::CallStackExhaustion => "call stack exhausted",
            TrapCode::UnexpectedSignature => "indirect call type mismatch",
        }
    }
}

impl Display for TrapCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.trap_message())
    }
}
