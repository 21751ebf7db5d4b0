use core::{
    cmp::Ordering,
    fmt,
    ops::{Add, Div, Mul, Neg, Sub},
};

macro_rules! impl_binop {
    ($for:ty, $is:ty, $op:ident, $func_name:ident) => {
        impl<T: Into<$for>> $op<T> for $for {
            type Output = Self;

            #[inline]
            fn $func_name(self, other: T) -> Self {
                Self::from_float($op::$func_name(self.to_float(), other.into().to_float()))
            }
        }
    };
}

macro_rules! float {
    (
        $( #[$docs:meta] )*
        struct $for:ident($rep:ty as $is:ty);
    ) => {
        float!(
            $(#[$docs])*
            struct $for($rep as $is, #sign_bit = 1 << (::core::mem::size_of::<$is>() * 8 - 1));
        );
    };
    (
        $( #[$docs:meta] )*
        struct $for:ident($rep:ty as $is:ty, #sign_bit = $sign_bit:expr);
    ) => {
        $(#[$docs])*
        #[derive(Copy, Clone)]
        pub struct $for($rep);

        impl_binop!($for, $is, Add, add);
        impl_binop!($for, $is, Sub, sub);
        impl_binop!($for, $is, Mul, mul);
        impl_binop!($for, $is, Div, div);

        impl $for {
            /// Creates a float from its underlying bits.
            #[inline]
            pub fn from_bits(bits: $rep) -> Self {
                Self(bits)
            }

            /// Returns the underlying bits of the float.
            #[inline]
            pub fn to_bits(self) -> $rep {
                self.0
            }

            /// Creates a float from the respective primitive float type.
            #[inline]
            pub fn from_float(float: $is) -> Self {
                Self(float.to_bits())
            }

            /// Returns the respective primitive float type.
            #[inline]
            pub fn to_float(self) -> $is {
                <$is>::from_bits(self.0)
            }

            /// Returns `true` if this value is NaN.
            #[inline]
            pub fn is_nan(self) -> bool {
                self.to_float().is_nan()
            }

            /// Returns the absolute value, operating on the sign bit only so
            /// that NaN payloads are preserved.
            #[must_use]
            #[inline]
            pub fn abs(self) -> Self {
                Self(self.0 & !$sign_bit)
            }
        }

        impl From<$is> for $for {
            #[inline]
            fn from(float: $is) -> $for {
                Self::from_float(float)
            }
        }

        impl From<$for> for $is {
            #[inline]
            fn from(float: $for) -> $is {
                float.to_float()
            }
        }

        impl Neg for $for {
            type Output = Self;

            #[inline]
            fn neg(self) -> Self {
                Self(self.0 ^ $sign_bit)
            }
        }

        impl<T: Into<$for> + Copy> PartialEq<T> for $for {
            #[inline]
            fn eq(&self, other: &T) -> bool {
                self.to_float() == (*other).into().to_float()
            }
        }

        impl<T: Into<$for> + Copy> PartialOrd<T> for $for {
            #[inline]
            fn partial_cmp(&self, other: &T) -> Option<Ordering> {
                self.to_float().partial_cmp(&(*other).into().to_float())
            }
        }

        impl fmt::Debug for $for {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if self.is_nan() {
                    return write!(f, "nan:0x{:X?}", self.to_bits());
                }
                fmt::Debug::fmt(&self.to_float(), f)
            }
        }

        impl fmt::Display for $for {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if self.is_nan() {
                    return write!(f, "nan:0x{:X?}", self.to_bits());
                }
                fmt::Display::fmt(&self.to_float(), f)
            }
        }
    };
}

float! {
    /// A NaN preserving `f32` type.
    struct F32(u32 as f32);
}

float! {
    /// A NaN preserving `f64` type.
    struct F64(u64 as f64);
}

impl From<u32> for F32 {
    #[inline]
    fn from(bits: u32) -> Self {
        Self::from_bits(bits)
    }
}

impl From<F32> for u32 {
    #[inline]
    fn from(float: F32) -> Self {
        float.to_bits()
    }
}

impl From<u64> for F64 {
    #[inline]
    fn from(bits: u64) -> Self {
        Self::from_bits(bits)
    }
}

impl From<F64> for u64 {
    #[inline]
    fn from(float: F64) -> Self {
        float.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::{F32, F64};

    #[test]
    fn binops_preserve_float_semantics() {
        let a = F32::from(1.5f32);
        let b = F32::from(2.25f32);
        assert_eq!((a + b).to_float(), 3.75);
        assert_eq!((a - b).to_float(), -0.75);
        assert_eq!((a * b).to_float(), 3.375);
        assert_eq!((b / a).to_float(), 1.5);
    }

    #[test]
    fn neg_preserves_nan_payload() {
        assert_eq!((-F32::from_bits(0xff80_3210)).to_bits(), 0x7f80_3210);
        assert_eq!(
            (-F64::from_bits(0xff80_3210_0000_0000)).to_bits(),
            0x7f80_3210_0000_0000
        );
    }

    #[test]
    fn abs_clears_only_the_sign_bit() {
        assert_eq!(F64::from(-0.0f64).abs().to_bits(), 0);
        assert_eq!(F32::from_bits(0xffc0_0001).abs().to_bits(), 0x7fc0_0001);
    }
}
