use wasmlite_core::{TransmuteInto, ValueType, F32, F64};

/// Runtime representation of a value.
///
/// Wasm code manipulates values of the four basic numeric types (integers
/// and IEEE 754-2008 floating point data of 32 or 64 bit width), plus
/// 128-bit vectors and nullable references. Vectors are carried through the
/// value model but no executed instruction produces them; references appear
/// only as constants.
///
/// There is no distinction between signed and unsigned integer types.
/// Integers are interpreted by the individual operations as either unsigned
/// or signed in two's complement representation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    /// Value of 32-bit signed or unsigned integer.
    I32(i32),
    /// Value of 64-bit signed or unsigned integer.
    I64(i64),
    /// Value of 32-bit IEEE 754-2008 floating point number.
    F32(F32),
    /// Value of 64-bit IEEE 754-2008 floating point number.
    F64(F64),
    /// Value of a 128-bit vector.
    V128(u128),
    /// A nullable reference to a function, by index.
    FuncRef(Option<u32>),
    /// A nullable opaque host handle.
    ExternRef(Option<u64>),
}

/// Trait for creating a typed value from a [`Value`].
///
/// Typically each implementation can create a value of one specific kind;
/// for example `bool` and `u32` are both represented by [`Value::I32`].
pub trait FromValue
where
    Self: Sized,
{
    /// Creates a value of type `Self` from a given [`Value`].
    ///
    /// Returns `None` if the [`Value`] is of a different kind than expected
    /// by the conversion in question.
    fn from_value(val: Value) -> Option<Self>;
}

impl Value {
    /// Creates a new default value of the given type: zero for numeric
    /// types, null for references.
    pub fn default(value_type: ValueType) -> Self {
        match value_type {
            ValueType::I32 => Value::I32(0),
            ValueType::I64 => Value::I64(0),
            ValueType::F32 => Value::F32(F32::from_bits(0)),
            ValueType::F64 => Value::F64(F64::from_bits(0)),
            ValueType::V128 => Value::V128(0),
            ValueType::FuncRef => Value::FuncRef(None),
            ValueType::ExternRef => Value::ExternRef(None),
        }
    }

    /// Creates a new value by interpreting the passed `u32` as `f32` bits.
    pub fn decode_f32(val: u32) -> Self {
        Value::F32(F32::from_bits(val))
    }

    /// Creates a new value by interpreting the passed `u64` as `f64` bits.
    pub fn decode_f64(val: u64) -> Self {
        Value::F64(F64::from_bits(val))
    }

    /// Returns the type of this value.
    pub fn value_type(&self) -> ValueType {
        match *self {
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
            Value::V128(_) => ValueType::V128,
            Value::FuncRef(_) => ValueType::FuncRef,
            Value::ExternRef(_) => ValueType::ExternRef,
        }
    }

    /// Returns `T` if this particular [`Value`] contains the appropriate
    /// kind. See [`FromValue`] for details.
    pub fn try_into<T: FromValue>(self) -> Option<T> {
        FromValue::from_value(self)
    }
}

impl From<i32> for Value {
    fn from(val: i32) -> Self {
        Value::I32(val)
    }
}

impl From<u32> for Value {
    fn from(val: u32) -> Self {
        Value::I32(val.transmute_into())
    }
}

impl From<i64> for Value {
    fn from(val: i64) -> Self {
        Value::I64(val)
    }
}

impl From<u64> for Value {
    fn from(val: u64) -> Self {
        Value::I64(val.transmute_into())
    }
}

impl From<F32> for Value {
    fn from(val: F32) -> Self {
        Value::F32(val)
    }
}

impl From<F64> for Value {
    fn from(val: F64) -> Self {
        Value::F64(val)
    }
}

impl From<bool> for Value {
    fn from(val: bool) -> Self {
        Value::I32(val as i32)
    }
}

macro_rules! impl_from_value {
    ($expected_kind:ident, $into:ty) => {
        impl FromValue for $into {
            fn from_value(val: Value) -> Option<Self> {
                match val {
                    Value::$expected_kind(val) => Some(val.transmute_into()),
                    _ => None,
                }
            }
        }
    };
}

impl_from_value!(I32, i32);
impl_from_value!(I32, u32);
impl_from_value!(I64, i64);
impl_from_value!(I64, u64);

impl FromValue for F32 {
    fn from_value(val: Value) -> Option<Self> {
        match val {
            Value::F32(val) => Some(val),
            _ => None,
        }
    }
}

impl FromValue for F64 {
    fn from_value(val: Value) -> Option<Self> {
        match val {
            Value::F64(val) => Some(val),
            _ => None,
        }
    }
}

/// This conversion assumes that boolean values are represented by
/// [`Value::I32`], with zero meaning `false`.
impl FromValue for bool {
    fn from_value(val: Value) -> Option<Self> {
        match val {
            Value::I32(val) => Some(val != 0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_views_share_the_bit_pattern() {
        assert_eq!(Value::from(u32::MAX), Value::I32(-1));
        assert_eq!(Value::I32(-1).try_into::<u32>(), Some(u32::MAX));
        assert_eq!(Value::from(u64::MAX), Value::I64(-1));
    }

    #[test]
    fn kind_mismatch_yields_none() {
        assert_eq!(Value::I64(1).try_into::<i32>(), None);
        assert_eq!(Value::I32(1).try_into::<F32>(), None);
    }

    #[test]
    fn defaults_are_zero_or_null() {
        assert_eq!(Value::default(ValueType::I32), Value::I32(0));
        assert_eq!(Value::default(ValueType::FuncRef), Value::FuncRef(None));
        assert_eq!(Value::default(ValueType::F64), Value::F64(F64::from_bits(0)));
    }
}
