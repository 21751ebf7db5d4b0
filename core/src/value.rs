use crate::{
    nan_preserving_float::{F32, F64},
    TrapCode,
};

/// Type of a runtime value.
///
/// There is no distinction between signed and unsigned integer types.
/// Integers are interpreted by the individual operations as either unsigned
/// or signed in two's complement representation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValueType {
    /// 32-bit signed or unsigned integer.
    I32,
    /// 64-bit signed or unsigned integer.
    I64,
    /// 32-bit IEEE 754-2008 floating point number.
    F32,
    /// 64-bit IEEE 754-2008 floating point number.
    F64,
    /// A 128-bit vector. Carried through the value model but never produced
    /// by an executed instruction.
    V128,
    /// A nullable function reference.
    FuncRef,
    /// A nullable external reference.
    ExternRef,
}

impl ValueType {
    /// Decodes a [`ValueType`] from its binary-format byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x7F => Some(Self::I32),
            0x7E => Some(Self::I64),
            0x7D => Some(Self::F32),
            0x7C => Some(Self::F64),
            0x7B => Some(Self::V128),
            0x70 => Some(Self::FuncRef),
            0x6F => Some(Self::ExternRef),
            _ => None,
        }
    }

    /// Returns `true` if `self` is a Wasm numeric type.
    pub fn is_num(&self) -> bool {
        matches!(self, Self::I32 | Self::I64 | Self::F32 | Self::F64)
    }

    /// Returns `true` if `self` is a Wasm reference type.
    pub fn is_ref(&self) -> bool {
        matches!(self, Self::FuncRef | Self::ExternRef)
    }
}

/// Convert one type to another by wrapping.
pub trait WrapInto<T> {
    /// Convert one type to another by wrapping.
    fn wrap_into(self) -> T;
}

/// Convert one type to another by rounding to the nearest integer towards
/// zero.
///
/// # Errors
///
/// Traps when the input float is NaN or cannot be represented by the target
/// integer.
pub trait TryTruncateInto<T, E> {
    /// Convert one type to another by rounding to the nearest integer
    /// towards zero.
    fn try_truncate_into(self) -> Result<T, E>;
}

/// Convert one type to another by extending with leading zeroes or the sign
/// bit, depending on the signedness of `Self`.
pub trait ExtendInto<T> {
    /// Convert one type to another by extension.
    fn extend_into(self) -> T;
}

/// Sign-extends `Self` from the narrower integer type `T`.
pub trait SignExtendFrom<T> {
    /// Reinterprets the low bits of `self` as a `T` and sign-extends them
    /// back to the full width.
    fn sign_extend_from(self) -> Self;
}

/// Reinterprets the bits of a value of one type as another type.
pub trait TransmuteInto<T> {
    /// Reinterprets the bits of a value of one type as another type.
    fn transmute_into(self) -> T;
}

/// Allows to efficiently load bytes from `memory` into a buffer.
pub trait LoadInto {
    /// Loads bytes from `memory` into `self`.
    ///
    /// # Errors
    ///
    /// Traps if the `memory` access is out of bounds.
    fn load_into(&mut self, memory: &[u8], address: usize) -> Result<(), TrapCode>;
}

impl<const N: usize> LoadInto for [u8; N] {
    #[inline]
    fn load_into(&mut self, memory: &[u8], address: usize) -> Result<(), TrapCode> {
        let slice: &Self = memory
            .get(address..)
            .and_then(|slice| slice.get(..N))
            .and_then(|slice| slice.try_into().ok())
            .ok_or(TrapCode::MemoryAccessOutOfBounds)?;
        *self = *slice;
        Ok(())
    }
}

/// Allows to efficiently write bytes from a buffer into `memory`.
pub trait StoreFrom {
    /// Writes bytes from `self` to `memory`.
    ///
    /// # Errors
    ///
    /// Traps if the `memory` access is out of bounds.
    fn store_from(&self, memory: &mut [u8], address: usize) -> Result<(), TrapCode>;
}

impl<const N: usize> StoreFrom for [u8; N] {
    #[inline]
    fn store_from(&self, memory: &mut [u8], address: usize) -> Result<(), TrapCode> {
        let slice: &mut Self = memory
            .get_mut(address..)
            .and_then(|slice| slice.get_mut(..N))
            .and_then(|slice| slice.try_into().ok())
            .ok_or(TrapCode::MemoryAccessOutOfBounds)?;
        *slice = *self;
        Ok(())
    }
}

/// Types that can be converted from and to little endian bytes.
pub trait LittleEndianConvert {
    /// The little endian bytes representation.
    type Bytes: Default + LoadInto + StoreFrom;

    /// Converts `self` into little endian bytes.
    fn into_le_bytes(self) -> Self::Bytes;

    /// Converts little endian bytes into `Self`.
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_little_endian_convert_primitive {
    ( $($primitive:ty),* $(,)? ) => {
        $(
            impl LittleEndianConvert for $primitive {
                type Bytes = [::core::primitive::u8; ::core::mem::size_of::<$primitive>()];

                #[inline]
                fn into_le_bytes(self) -> Self::Bytes {
                    <$primitive>::to_le_bytes(self)
                }

                #[inline]
                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$primitive>::from_le_bytes(bytes)
                }
            }
        )*
    };
}
impl_little_endian_convert_primitive!(u8, u16, u32, u64, i8, i16, i32, i64);

macro_rules! impl_little_endian_convert_float {
    ( $( struct $float_ty:ident($uint_ty:ty); )* $(,)? ) => {
        $(
            impl LittleEndianConvert for $float_ty {
                type Bytes = <$uint_ty as LittleEndianConvert>::Bytes;

                #[inline]
                fn into_le_bytes(self) -> Self::Bytes {
                    <$uint_ty>::into_le_bytes(self.to_bits())
                }

                #[inline]
                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    Self::from_bits(<$uint_ty>::from_le_bytes(bytes))
                }
            }
        )*
    };
}
impl_little_endian_convert_float!(
    struct F32(u32);
    struct F64(u64);
);

/// Arithmetic operations.
pub trait ArithmeticOps<T>: Copy {
    /// Add two values.
    fn add(self, other: T) -> T;
    /// Subtract two values.
    fn sub(self, other: T) -> T;
    /// Multiply two values.
    fn mul(self, other: T) -> T;
}

/// Integer value.
pub trait Integer<T>: ArithmeticOps<T> {
    /// Counts leading zeros in the bitwise representation of the value.
    fn leading_zeros(self) -> T;
    /// Counts trailing zeros in the bitwise representation of the value.
    fn trailing_zeros(self) -> T;
    /// Counts 1-bits in the bitwise representation of the value.
    fn count_ones(self) -> T;
    /// Get left bit rotation result.
    fn rotl(self, other: T) -> T;
    /// Get right bit rotation result.
    fn rotr(self, other: T) -> T;
    /// Divide two values.
    ///
    /// # Errors
    ///
    /// If `other` is equal to zero, or if the signed result overflows.
    fn div(self, other: T) -> Result<T, TrapCode>;
    /// Get division remainder.
    ///
    /// # Errors
    ///
    /// If `other` is equal to zero.
    fn rem(self, other: T) -> Result<T, TrapCode>;
}

/// Float-point value.
pub trait Float<T>: ArithmeticOps<T> {
    /// Get absolute value.
    fn abs(self) -> T;
    /// Returns the largest integer less than or equal to a number.
    fn floor(self) -> T;
    /// Returns the smallest integer greater than or equal to a number.
    fn ceil(self) -> T;
    /// Returns the integer part of a number.
    fn trunc(self) -> T;
    /// Returns the nearest integer to a number. Round half-way cases away
    /// from 0.0.
    fn round(self) -> T;
    /// Returns the nearest integer to a number. Ties are rounded to even.
    fn nearest(self) -> T;
    /// Takes the square root of a number.
    fn sqrt(self) -> T;
    /// Returns `true` if the sign of the number is positive.
    fn is_sign_positive(self) -> bool;
    /// Returns `true` if the sign of the number is negative.
    fn is_sign_negative(self) -> bool;
    /// Returns the division of the two numbers.
    fn div(self, other: T) -> T;
    /// Returns the minimum of the two numbers.
    fn min(self, other: T) -> T;
    /// Returns the maximum of the two numbers.
    fn max(self, other: T) -> T;
    /// Sets sign of this value to the sign of other value.
    fn copysign(self, other: T) -> T;
}

macro_rules! impl_wrap_into {
    ($from:ident, $into:ident) => {
        impl WrapInto<$into> for $from {
            #[inline]
            fn wrap_into(self) -> $into {
                self as $into
            }
        }
    };
    ($from:ident, $intermediate:ident, $into:ident) => {
        impl WrapInto<$into> for $from {
            #[inline]
            fn wrap_into(self) -> $into {
                $into::from(self as $intermediate)
            }
        }
    };
}

impl_wrap_into!(i32, i8);
impl_wrap_into!(i32, i16);
impl_wrap_into!(i64, i8);
impl_wrap_into!(i64, i16);
impl_wrap_into!(i64, i32);

impl WrapInto<F32> for F64 {
    #[inline]
    fn wrap_into(self) -> F32 {
        F32::from(self.to_float() as f32)
    }
}

macro_rules! impl_try_truncate_into {
    (@primitive $from:ident, $into:ident, $rmin:literal, $rmax:literal) => {
        impl TryTruncateInto<$into, TrapCode> for $from {
            #[inline]
            fn try_truncate_into(self) -> Result<$into, TrapCode> {
                if self.is_nan() {
                    return Err(TrapCode::InvalidConversionToInt);
                }
                if self <= $rmin || self >= $rmax {
                    return Err(TrapCode::IntegerOverflow);
                }
                // Casting a float to an integer rounds towards zero.
                Ok(self as _)
            }
        }
    };
    (@wrapped $from:ident, $intermediate:ident, $into:ident) => {
        impl TryTruncateInto<$into, TrapCode> for $from {
            #[inline]
            fn try_truncate_into(self) -> Result<$into, TrapCode> {
                self.to_float().try_truncate_into()
            }
        }
    };
}

impl_try_truncate_into!(@primitive f32, i32, -2147483904.0_f32, 2147483648.0_f32);
impl_try_truncate_into!(@primitive f32, u32,          -1.0_f32, 4294967296.0_f32);
impl_try_truncate_into!(@primitive f64, i32, -2147483649.0_f64, 2147483648.0_f64);
impl_try_truncate_into!(@primitive f64, u32,          -1.0_f64, 4294967296.0_f64);
impl_try_truncate_into!(@primitive f32, i64, -9223373136366403584.0_f32,  9223372036854775808.0_f32);
impl_try_truncate_into!(@primitive f32, u64,                   -1.0_f32, 18446744073709551616.0_f32);
impl_try_truncate_into!(@primitive f64, i64, -9223372036854777856.0_f64,  9223372036854775808.0_f64);
impl_try_truncate_into!(@primitive f64, u64,                   -1.0_f64, 18446744073709551616.0_f64);
impl_try_truncate_into!(@wrapped F32, f32, i32);
impl_try_truncate_into!(@wrapped F32, f32, i64);
impl_try_truncate_into!(@wrapped F64, f64, i32);
impl_try_truncate_into!(@wrapped F64, f64, i64);
impl_try_truncate_into!(@wrapped F32, f32, u32);
impl_try_truncate_into!(@wrapped F32, f32, u64);
impl_try_truncate_into!(@wrapped F64, f64, u32);
impl_try_truncate_into!(@wrapped F64, f64, u64);

macro_rules! impl_extend_into {
    ($from:ident, $into:ident) => {
        impl ExtendInto<$into> for $from {
            #[inline]
            fn extend_into(self) -> $into {
                self as $into
            }
        }
    };
    ($from:ident, $intermediate:ident, $into:ident) => {
        impl ExtendInto<$into> for $from {
            #[inline]
            fn extend_into(self) -> $into {
                $into::from(self as $intermediate)
            }
        }
    };
}

impl_extend_into!(i8, i32);
impl_extend_into!(u8, i32);
impl_extend_into!(i16, i32);
impl_extend_into!(u16, i32);
impl_extend_into!(i8, i64);
impl_extend_into!(u8, i64);
impl_extend_into!(i16, i64);
impl_extend_into!(u16, i64);
impl_extend_into!(i32, i64);
impl_extend_into!(u32, i64);
impl_extend_into!(u32, u64);

impl_extend_into!(i32, f32, F32);
impl_extend_into!(i32, f64, F64);
impl_extend_into!(u32, f32, F32);
impl_extend_into!(u32, f64, F64);
impl_extend_into!(i64, f32, F32);
impl_extend_into!(u64, f32, F32);
impl_extend_into!(i64, f64, F64);
impl_extend_into!(u64, f64, F64);

impl ExtendInto<F64> for F32 {
    #[inline]
    fn extend_into(self) -> F64 {
        F64::from(f64::from(self.to_float()))
    }
}

macro_rules! impl_sign_extend_from {
    ( $( impl SignExtendFrom<$from_type:ty> for $for_type:ty; )* ) => {
        $(
            impl SignExtendFrom<$from_type> for $for_type {
                #[inline]
                fn sign_extend_from(self) -> Self {
                    (self as $from_type) as Self
                }
            }
        )*
    };
}
impl_sign_extend_from! {
    impl SignExtendFrom<i8> for i32;
    impl SignExtendFrom<i16> for i32;
    impl SignExtendFrom<i8> for i64;
    impl SignExtendFrom<i16> for i64;
    impl SignExtendFrom<i32> for i64;
}

macro_rules! impl_transmute_into_self {
    ($type:ident) => {
        impl TransmuteInto<$type> for $type {
            #[inline]
            fn transmute_into(self) -> $type {
                self
            }
        }
    };
}

impl_transmute_into_self!(i32);
impl_transmute_into_self!(i64);

macro_rules! impl_transmute_into_as {
    ($from:ident, $into:ident) => {
        impl TransmuteInto<$into> for $from {
            #[inline]
            fn transmute_into(self) -> $into {
                self as $into
            }
        }
    };
}

impl_transmute_into_as!(i32, u32);
impl_transmute_into_as!(u32, i32);
impl_transmute_into_as!(i64, u64);
impl_transmute_into_as!(u64, i64);

macro_rules! impl_transmute_into_npf {
    ($npf:ident, $signed:ident, $unsigned:ident) => {
        impl TransmuteInto<$signed> for $npf {
            #[inline]
            fn transmute_into(self) -> $signed {
                self.to_bits() as _
            }
        }

        impl TransmuteInto<$unsigned> for $npf {
            #[inline]
            fn transmute_into(self) -> $unsigned {
                self.to_bits()
            }
        }

        impl TransmuteInto<$npf> for $signed {
            #[inline]
            fn transmute_into(self) -> $npf {
                $npf::from_bits(self as _)
            }
        }

        impl TransmuteInto<$npf> for $unsigned {
            #[inline]
            fn transmute_into(self) -> $npf {
                $npf::from_bits(self)
            }
        }
    };
}

impl_transmute_into_npf!(F32, i32, u32);
impl_transmute_into_npf!(F64, i64, u64);

macro_rules! impl_integer_arithmetic_ops {
    ($type:ident) => {
        impl ArithmeticOps<$type> for $type {
            #[inline]
            fn add(self, other: $type) -> $type {
                self.wrapping_add(other)
            }
            #[inline]
            fn sub(self, other: $type) -> $type {
                self.wrapping_sub(other)
            }
            #[inline]
            fn mul(self, other: $type) -> $type {
                self.wrapping_mul(other)
            }
        }
    };
}

impl_integer_arithmetic_ops!(i32);
impl_integer_arithmetic_ops!(u32);
impl_integer_arithmetic_ops!(i64);
impl_integer_arithmetic_ops!(u64);

macro_rules! impl_float_arithmetic_ops {
    ($type:ty) => {
        impl ArithmeticOps<Self> for $type {
            #[inline]
            fn add(self, other: Self) -> Self {
                self + other
            }
            #[inline]
            fn sub(self, other: Self) -> Self {
                self - other
            }
            #[inline]
            fn mul(self, other: Self) -> Self {
                self * other
            }
        }
    };
}

impl_float_arithmetic_ops!(F32);
impl_float_arithmetic_ops!(F64);

macro_rules! impl_integer {
    ($type:ty) => {
        impl Integer<Self> for $type {
            #[inline]
            fn leading_zeros(self) -> Self {
                self.leading_zeros() as _
            }
            #[inline]
            fn trailing_zeros(self) -> Self {
                self.trailing_zeros() as _
            }
            #[inline]
            fn count_ones(self) -> Self {
                self.count_ones() as _
            }
            #[inline]
            fn rotl(self, other: Self) -> Self {
                self.rotate_left(other as u32)
            }
            #[inline]
            fn rotr(self, other: Self) -> Self {
                self.rotate_right(other as u32)
            }
            #[inline]
            fn div(self, other: Self) -> Result<Self, TrapCode> {
                if other == 0 {
                    return Err(TrapCode::DivisionByZero);
                }
                match self.overflowing_div(other) {
                    (result, false) => Ok(result),
                    _ => Err(TrapCode::IntegerOverflow),
                }
            }
            #[inline]
            fn rem(self, other: Self) -> Result<Self, TrapCode> {
                if other == 0 {
                    return Err(TrapCode::DivisionByZero);
                }
                // `wrapping_rem` makes `MIN % -1` yield 0 instead of
                // overflowing.
                Ok(self.wrapping_rem(other))
            }
        }
    };
}

impl_integer!(i32);
impl_integer!(u32);
impl_integer!(i64);
impl_integer!(u64);

#[cfg(feature = "std")]
mod fmath {
    pub use f32;
    pub use f64;
}

#[cfg(not(feature = "std"))]
mod fmath {
    pub use super::libm_adapters::{f32, f64};
}

// The float math functions are not all available in `core`; in no-std
// builds we delegate to `libm` through the adapters below.
macro_rules! impl_float {
    ($type:ident, $fXX:ident, $iXX:ident) => {
        impl Float<Self> for $type {
            #[inline]
            fn abs(self) -> Self {
                fmath::$fXX::abs(self.to_float()).into()
            }
            #[inline]
            fn floor(self) -> Self {
                fmath::$fXX::floor(self.to_float()).into()
            }
            #[inline]
            fn ceil(self) -> Self {
                fmath::$fXX::ceil(self.to_float()).into()
            }
            #[inline]
            fn trunc(self) -> Self {
                fmath::$fXX::trunc(self.to_float()).into()
            }
            #[inline]
            fn round(self) -> Self {
                fmath::$fXX::round(self.to_float()).into()
            }
            #[inline]
            fn nearest(self) -> Self {
                let round = self.round();
                if fmath::$fXX::fract(self.to_float()).abs() != 0.5 {
                    return round;
                }
                let rem = round.to_float() % 2.0;
                if rem == 1.0 {
                    self.floor()
                } else if rem == -1.0 {
                    self.ceil()
                } else {
                    round
                }
            }
            #[inline]
            fn sqrt(self) -> Self {
                fmath::$fXX::sqrt(self.to_float()).into()
            }
            #[inline]
            fn is_sign_positive(self) -> bool {
                <$fXX>::is_sign_positive(self.to_float())
            }
            #[inline]
            fn is_sign_negative(self) -> bool {
                <$fXX>::is_sign_negative(self.to_float())
            }
            #[inline]
            fn div(self, other: Self) -> Self {
                self / other
            }
            #[inline]
            fn min(self, other: Self) -> Self {
                // Adheres to the behavior mandated for Wasm: NaN propagates
                // and -0.0 orders below +0.0.
                match (self.is_nan(), other.is_nan()) {
                    (true, false) => self,
                    (false, true) => other,
                    _ => {
                        if other.is_sign_negative() {
                            return Self::from_float(other.to_float().min(self.to_float()));
                        }
                        Self::from_float(self.to_float().min(other.to_float()))
                    }
                }
            }
            #[inline]
            fn max(self, other: Self) -> Self {
                match (self.is_nan(), other.is_nan()) {
                    (true, false) => self,
                    (false, true) => other,
                    _ => {
                        if other.is_sign_positive() {
                            return Self::from_float(other.to_float().max(self.to_float()));
                        }
                        Self::from_float(self.to_float().max(other.to_float()))
                    }
                }
            }
            #[inline]
            fn copysign(self, other: Self) -> Self {
                use core::mem::size_of;
                let sign_mask = 1 << ((size_of::<$iXX>() << 3) - 1);
                let self_bits = self.to_bits();
                let other_bits = other.to_bits();
                let is_self_sign_set = (self_bits & sign_mask) != 0;
                let is_other_sign_set = (other_bits & sign_mask) != 0;
                if is_self_sign_set == is_other_sign_set {
                    self
                } else if is_other_sign_set {
                    Self::from_bits(self_bits | sign_mask)
                } else {
                    Self::from_bits(self_bits & !sign_mask)
                }
            }
        }
    };
}

impl_float!(F32, f32, u32);
impl_float!(F64, f64, u64);

#[cfg(not(feature = "std"))]
mod libm_adapters {
    pub mod f32 {
        #[inline]
        pub fn abs(v: f32) -> f32 {
            libm::fabsf(v)
        }

        #[inline]
        pub fn floor(v: f32) -> f32 {
            libm::floorf(v)
        }

        #[inline]
        pub fn ceil(v: f32) -> f32 {
            libm::ceilf(v)
        }

        #[inline]
        pub fn trunc(v: f32) -> f32 {
            libm::truncf(v)
        }

        #[inline]
        pub fn round(v: f32) -> f32 {
            libm::roundf(v)
        }

        #[inline]
        pub fn fract(v: f32) -> f32 {
            v - trunc(v)
        }

        #[inline]
        pub fn sqrt(v: f32) -> f32 {
            libm::sqrtf(v)
        }
    }

    pub mod f64 {
        #[inline]
        pub fn abs(v: f64) -> f64 {
            libm::fabs(v)
        }

        #[inline]
        pub fn floor(v: f64) -> f64 {
            libm::floor(v)
        }

        #[inline]
        pub fn ceil(v: f64) -> f64 {
            libm::ceil(v)
        }

        #[inline]
        pub fn trunc(v: f64) -> f64 {
            libm::trunc(v)
        }

        #[inline]
        pub fn round(v: f64) -> f64 {
            libm::round(v)
        }

        #[inline]
        pub fn fract(v: f64) -> f64 {
            v - trunc(v)
        }

        #[inline]
        pub fn sqrt(v: f64) -> f64 {
            libm::sqrt(v)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wasm_float_min_regression_works() {
        assert_eq!(
            Float::min(F32::from(-0.0f32), F32::from(0.0f32)).to_bits(),
            0x8000_0000,
        );
        assert_eq!(
            Float::min(F32::from(0.0f32), F32::from(-0.0f32)).to_bits(),
            0x8000_0000,
        );
    }

    #[test]
    fn wasm_float_max_regression_works() {
        assert_eq!(
            Float::max(F32::from(-0.0f32), F32::from(0.0f32)).to_bits(),
            0x0000_0000,
        );
        assert_eq!(
            Float::max(F32::from(0.0f32), F32::from(-0.0f32)).to_bits(),
            0x0000_0000,
        );
    }

    #[test]
    fn copysign_regression_works() {
        // Extracted from a WebAssembly specification assertion.
        assert!(F32::from_bits(0xFFC00000).is_nan());
        assert_eq!(
            F32::from_bits(0xFFC00000)
                .copysign(F32::from_bits(0x0000_0000))
                .to_bits(),
            F32::from_bits(0x7FC00000).to_bits()
        )
    }

    #[test]
    fn trunc_to_int_traps_on_nan_and_overflow() {
        let nan = F32::from(f32::NAN);
        assert_eq!(
            TryTruncateInto::<i32, TrapCode>::try_truncate_into(nan),
            Err(TrapCode::InvalidConversionToInt)
        );
        let big = F32::from(3.0e9f32);
        assert_eq!(
            TryTruncateInto::<i32, TrapCode>::try_truncate_into(big),
            Err(TrapCode::IntegerOverflow)
        );
        let ok = F64::from(-7.9f64);
        assert_eq!(
            TryTruncateInto::<i32, TrapCode>::try_truncate_into(ok),
            Ok(-7)
        );
    }

    #[test]
    fn signed_division_edge_cases() {
        assert_eq!(Integer::div(i32::MIN, -1), Err(TrapCode::IntegerOverflow));
        assert_eq!(Integer::div(1i32, 0), Err(TrapCode::DivisionByZero));
        assert_eq!(Integer::rem(i32::MIN, -1), Ok(0));
        assert_eq!(Integer::rem(1i64, 0), Err(TrapCode::DivisionByZero));
    }

    #[test]
    fn sign_extension_takes_low_bits() {
        assert_eq!(SignExtendFrom::<i8>::sign_extend_from(0x180i32), -128);
        assert_eq!(SignExtendFrom::<i16>::sign_extend_from(0x8000i32), -32768);
        assert_eq!(
            SignExtendFrom::<i32>::sign_extend_from(0xFFFF_FFFFi64),
            -1i64
        );
    }
}
