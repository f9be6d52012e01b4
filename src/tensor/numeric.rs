pub use num::{NumCast, One, ToPrimitive, Zero};
use std::cmp::{PartialEq, PartialOrd};
use std::fmt::{Debug, Display};

pub use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use super::error::{Result, TensorError};

/// Element types a tensor can hold.
///
/// Signed only: gradients of `sub` and `abs` need negation.
pub trait Numeric:
    Add<Output = Self>
    + AddAssign
    + Copy
    + Clone
    + One
    + Mul<Output = Self>
    + Sub<Output = Self>
    + Neg<Output = Self>
    + PartialEq
    + PartialOrd
    + Zero
    + NumCast
    + Debug
    + Display
    + 'static
{
}
// https://stackoverflow.com/questions/42381185/specifying-generic-parameter-to-belong-to-a-small-set-of-types
macro_rules! numeric_impl {
    ($($t: ty),+) => {
        $(
            impl Numeric for $t {}
        )+
    }
}

numeric_impl!(i8, i16, i32, i64, i128, f32, f64);

/// Converts an `f64` into the element type, failing if it does not fit.
pub fn cast<T: Numeric>(value: f64) -> Result<T> {
    <T as NumCast>::from(value).ok_or_else(|| TensorError::NotRepresentable(value.to_string()))
}

/// Widens an element to `f64` for serialization.
pub fn widen<T: Numeric>(value: T) -> Result<f64> {
    value
        .to_f64()
        .ok_or_else(|| TensorError::NotRepresentable(value.to_string()))
}

#[test]
fn test_cast_truncates_for_integers() {
    assert_eq!(cast::<i32>(1e-3).unwrap(), 0);
    assert_eq!(cast::<f64>(1e-3).unwrap(), 1e-3);
    assert_eq!(cast::<f32>(1e-3).unwrap(), 1e-3_f32);
}

#[test]
fn test_cast_out_of_range() {
    assert!(cast::<i8>(1e6).is_err());
    assert!(cast::<i64>(f64::NAN).is_err());
}
