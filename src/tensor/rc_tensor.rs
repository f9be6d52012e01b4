use std::rc::Rc;

use std::cmp::PartialEq;
use std::convert::From;
use std::fmt;
use std::ops::{Deref, Mul};

use num::traits::real::Real;

use super::autograd;
use super::error::Result;
use super::functional;
use super::numeric::*;
use super::raw_tensor::*;

/// A reference counted tensor. Clones share data, gradient slot and history.
#[derive(Debug, PartialEq, Clone)]
pub struct RcTensor<T: Numeric>(pub(in crate::tensor) Rc<RawTensor<T>>);

impl<T> Deref for RcTensor<T>
where
    T: Numeric,
{
    type Target = RawTensor<T>;

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

impl<T: Numeric> RcTensor<T> {
    pub(in crate::tensor) fn from_raw(raw_tensor: RawTensor<T>) -> RcTensor<T> {
        RcTensor(Rc::new(raw_tensor))
    }

    pub fn new_with_filler(shape: Vec<usize>, filler: T) -> RcTensor<T> {
        RcTensor::from_raw(RawTensor::new_with_filler(shape, filler))
    }

    pub fn zeros(shape: Vec<usize>) -> RcTensor<T> {
        RcTensor::new_with_filler(shape, T::zero())
    }

    pub fn ones(shape: Vec<usize>) -> RcTensor<T> {
        RcTensor::new_with_filler(shape, T::one())
    }

    pub fn scalar(scalar: T) -> RcTensor<T> {
        RcTensor::from_raw(RawTensor::scalar(scalar))
    }

    pub fn new(array: Vec<T>, shape: Vec<usize>) -> RcTensor<T> {
        RcTensor::from_raw(RawTensor::new(array, shape))
    }

    pub fn try_new(array: Vec<T>, shape: Vec<usize>) -> Result<RcTensor<T>> {
        RawTensor::try_new(array, shape).map(RcTensor::from_raw)
    }

    /// The accumulated gradient, or zeros if `backward` never reached this tensor.
    pub fn grad(&self) -> RcTensor<T> {
        self.grad_opt()
            .unwrap_or_else(|| RcTensor::zeros(self.shape.clone()))
    }

    pub fn grad_opt(&self) -> Option<RcTensor<T>> {
        self.0.grad.borrow().clone()
    }

    pub(in crate::tensor) fn update_grad(&self, grad: &RcTensor<T>) {
        let mut slot = self.0.grad.borrow_mut();
        let accumulated = match slot.take() {
            Some(previous) => autograd::accumulate(&previous, grad),
            None => grad.detach(),
        };
        *slot = Some(accumulated);
    }

    pub fn zero_grad(&self) {
        *self.0.grad.borrow_mut() = None;
    }

    /// Same data, no history and no gradient.
    pub fn detach(&self) -> RcTensor<T> {
        RcTensor::new(self.array.clone(), self.shape.clone())
    }

    /// Accumulates d(self)/d(node) into every node this tensor was computed from.
    /// A non-scalar tensor is treated as if it were summed first.
    pub fn backward(&self) {
        autograd::backward(self)
    }

    pub fn sum(&self) -> RcTensor<T> {
        functional::sum(self)
    }

    pub fn matmul(&self, right: &RcTensor<T>) -> RcTensor<T> {
        functional::try_matmul(self, right).unwrap_or_else(|e| panic!("{}", e))
    }

    pub fn relu(&self) -> RcTensor<T> {
        functional::relu(self.clone())
    }

    pub fn abs(&self) -> RcTensor<T> {
        functional::abs(self.clone())
    }
}

impl<T: Numeric + Real> RcTensor<T> {
    pub fn tanh(&self) -> RcTensor<T> {
        functional::tanh(self.clone())
    }
}

impl<T: Numeric> fmt::Display for RcTensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RcTensor(")?;
        for (i, elem) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{elem}")?;
        }
        write!(f, "; shape={:?})", self.shape)
    }
}

impl<T> From<T> for RcTensor<T>
where
    T: Numeric,
{
    fn from(value: T) -> Self {
        RcTensor::from_raw(RawTensor::from(value))
    }
}

impl<T, U> From<Vec<U>> for RcTensor<T>
where
    T: Numeric,
    RawTensor<T>: From<U>,
{
    fn from(value: Vec<U>) -> RcTensor<T> {
        RcTensor::from_raw(<RawTensor<T> as From<Vec<U>>>::from(value))
    }
}

impl<T, U, const N: usize> From<[U; N]> for RcTensor<T>
where
    T: Numeric,
    RawTensor<T>: From<U>,
    U: Clone,
{
    fn from(value: [U; N]) -> RcTensor<T> {
        RcTensor::from_raw(<RawTensor<T> as From<Vec<U>>>::from(value.to_vec()))
    }
}

macro_rules! binary_op_impl {
    ($($trait: ident, $method: ident, $op: path);+ $(;)?) => {
        $(
            impl<'a, 'b, T: Numeric> std::ops::$trait<&'b RcTensor<T>> for &'a RcTensor<T> {
                type Output = RcTensor<T>;

                fn $method(self, right: &'b RcTensor<T>) -> RcTensor<T> {
                    $op(self, right).unwrap_or_else(|e| panic!("{}", e))
                }
            }

            impl<T: Numeric> std::ops::$trait<RcTensor<T>> for RcTensor<T> {
                type Output = RcTensor<T>;

                fn $method(self, right: RcTensor<T>) -> RcTensor<T> {
                    $op(&self, &right).unwrap_or_else(|e| panic!("{}", e))
                }
            }
        )+
    };
}

binary_op_impl!(
    Add, add, functional::try_add;
    Sub, sub, functional::try_sub;
    Mul, mul, functional::try_mul;
);

impl<T: Numeric> std::ops::Neg for &RcTensor<T> {
    type Output = RcTensor<T>;
    fn neg(self) -> Self::Output {
        functional::neg(self.clone())
    }
}

impl<T: Numeric> std::ops::Neg for RcTensor<T> {
    type Output = RcTensor<T>;
    fn neg(self) -> Self::Output {
        functional::neg(self)
    }
}

/// Scales every element by a plain number, e.g. `&t * 2.0`.
impl<T: Numeric> Mul<T> for &RcTensor<T> {
    type Output = RcTensor<T>;
    fn mul(self, right: T) -> RcTensor<T> {
        self * &RcTensor::scalar(right)
    }
}

#[test]
fn test_element_wise_multiplication() {
    let left = RcTensor::from([1, 2, 3]);
    let right = RcTensor::from([7, 2, 8]);
    assert_eq!(&left * &right, RcTensor::from([7, 4, 24]));
}

#[test]
fn test_element_wise_multiplication_on_rc_tensor_directly() {
    let left = RcTensor::from([1, 2, 3]);
    let right = RcTensor::from([7, 2, 8]);
    assert_eq!(left * right, RcTensor::from([7, 4, 24]));
}

#[test]
fn test_scale_by_number() {
    let tensor = RcTensor::from([1.0, -2.0]);
    assert_eq!(&tensor * 3.0, RcTensor::from([3.0, -6.0]));
}

#[test]
#[should_panic(expected = "not compatible for add")]
fn test_add_mismatched_shapes_panics() {
    let _ = &RcTensor::from([1.0, 2.0, 3.0]) + &RcTensor::from([1.0, 2.0]);
}

#[test]
fn test_detach_drops_history() {
    let x = RcTensor::from([1.0, 2.0]);
    let y = &x * &x;
    assert!(!y.is_leaf());
    let z = y.detach();
    assert!(z.is_leaf());
    assert_eq!(z, y);
}

#[test]
fn test_display() {
    let tensor = RcTensor::from([[1, 2], [3, 4]]);
    assert_eq!(format!("{tensor}"), "RcTensor(1, 2, 3, 4; shape=[2, 2])");
}

#[test]
fn test_from_array_matches_from_vec() {
    let from_array = RcTensor::from([[1.0, 2.0], [3.0, 4.0]]);
    let from_vec = RcTensor::from(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    assert_eq!(from_array, from_vec);
    assert_eq!(from_array.shape(), &vec![2, 2]);
    assert_eq!(RcTensor::<f64>::from([0.5]).shape(), &vec![1]);
}
