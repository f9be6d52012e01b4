use std::cell::RefCell;
use std::cmp::PartialEq;
use std::convert::From;
use std::ops::Index;

use super::autograd::Derivative;
use super::error::{Result, TensorError};
use super::numeric::*;
use super::rc_tensor::*;
use super::utils::flat_offset;

/// The core `struct` in this library.
///
/// Data is stored contiguously in row-major order. A scalar has shape `[]` and a
/// single element.
#[derive(Debug, Clone)]
pub struct RawTensor<T>
where
    T: Numeric,
{
    pub(in crate::tensor) array: Vec<T>,
    pub(in crate::tensor) shape: Vec<usize>,
    pub(in crate::tensor) grad: RefCell<Option<RcTensor<T>>>,
    pub(in crate::tensor) grad_fn: Option<Derivative<T>>,
}

impl<T: Numeric> PartialEq for RawTensor<T> {
    // gradients and graph history do not take part in equality
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.array == other.array
    }
}

impl<T> Default for RawTensor<T>
where
    T: Numeric,
{
    fn default() -> Self {
        RawTensor {
            shape: vec![],
            grad: RefCell::new(None),
            array: vec![],
            grad_fn: None,
        }
    }
}

impl<T, U> From<Vec<U>> for RawTensor<T>
where
    T: Numeric,
    RawTensor<T>: From<U>,
{
    fn from(value: Vec<U>) -> RawTensor<T> {
        let tensors: Vec<_> = value.into_iter().map(RawTensor::from).collect();
        let (arrays, shapes): (Vec<_>, Vec<_>) =
            tensors.into_iter().map(|t| (t.array, t.shape)).unzip();
        // an empty list has no rows to take the inner shape from
        let row_shape = shapes.first().cloned().unwrap_or_default();
        assert!(
            shapes.iter().all(|shape| *shape == row_shape),
            "nested rows must all have the same shape"
        );

        let array = arrays.into_iter().flatten().collect();
        let mut shape = vec![shapes.len()];
        shape.extend_from_slice(&row_shape);
        RawTensor {
            array,
            shape,
            ..Default::default()
        }
    }
}

impl<T, U, const N: usize> From<[U; N]> for RawTensor<T>
where
    T: Numeric,
    RawTensor<T>: From<U>,
    U: Clone,
{
    fn from(value: [U; N]) -> RawTensor<T> {
        <RawTensor<T> as From<Vec<U>>>::from(value.to_vec())
    }
}

impl<T> From<T> for RawTensor<T>
where
    T: Numeric,
{
    fn from(value: T) -> Self {
        RawTensor::scalar(value)
    }
}

impl<T> RawTensor<T>
where
    T: Numeric,
{
    pub fn is_scalar(&self) -> bool {
        self.array.len() == 1 && self.shape.is_empty()
    }

    /// Note! This function will construct Scalars when `shape` is empty.
    pub fn new_with_filler(shape: Vec<usize>, filler: T) -> RawTensor<T> {
        let total = shape.iter().product();
        RawTensor {
            array: vec![filler; total],
            shape,
            ..Default::default()
        }
    }

    pub fn scalar(scalar: T) -> RawTensor<T> {
        RawTensor {
            array: vec![scalar],
            shape: vec![],
            ..Default::default()
        }
    }

    pub fn new(array: Vec<T>, shape: Vec<usize>) -> RawTensor<T> {
        let len = shape.iter().product::<usize>();
        assert_eq!(len, array.len(), "shape {shape:?} does not match the data");
        RawTensor {
            array,
            shape,
            ..Default::default()
        }
    }

    pub fn try_new(array: Vec<T>, shape: Vec<usize>) -> Result<RawTensor<T>> {
        let expected = shape.iter().product::<usize>();
        if expected != array.len() {
            return Err(TensorError::LengthMismatch {
                shape,
                expected,
                actual: array.len(),
            });
        }
        Ok(RawTensor {
            array,
            shape,
            ..Default::default()
        })
    }

    pub fn shape(&self) -> &Vec<usize> {
        &self.shape
    }

    /// Number of elements.
    pub fn count(&self) -> usize {
        self.array.len()
    }

    /// ```
    /// # use rezero::tensor::*;
    /// let matrix = RcTensor::new(vec![0, 1, 2, 3], vec![2, 2]);
    ///
    /// assert_eq!(matrix.get(&[1, 0]).unwrap(), &2);
    /// assert!(matrix.get(&[2, 0]).is_err());
    /// assert!(matrix.get(&[1]).is_err());
    /// ```
    pub fn get(&self, index: &[usize]) -> Result<&T> {
        let offset = flat_offset(index, &self.shape)?;
        Ok(&self.array[offset])
    }

    /// The value of a single-element tensor, whatever its rank.
    pub fn elem(&self) -> T {
        assert_eq!(
            self.array.len(),
            1,
            "elem() needs exactly one element, shape is {:?}",
            self.shape
        );
        self.array[0]
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.array.clone()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.array.iter()
    }

    pub fn is_leaf(&self) -> bool {
        self.grad_fn.is_none()
    }
}

impl<T> Index<&Vec<usize>> for RawTensor<T>
where
    T: Numeric,
{
    type Output = T;

    fn index(&self, index: &Vec<usize>) -> &Self::Output {
        self.get(index).unwrap_or_else(|e| panic!("{}", e))
    }
}

#[test]
fn test_new_with_filler() {
    let vec = RawTensor::new_with_filler(vec![4], 4);
    assert_eq!(vec.shape(), &vec![4]);
    assert_eq!(vec.get(&[2]).unwrap(), &4);
    let scalar = RawTensor::new_with_filler(vec![], 4);
    assert!(scalar.is_scalar());
}

#[test]
fn test_get_2x2x2() {
    let matrix = RawTensor::new(vec![0, 1, 2, 3, 4, 5, 6, 7], vec![2, 2, 2]);
    assert_eq!(matrix[&vec![0, 0, 0]], 0);
    assert_eq!(matrix[&vec![0, 1, 0]], 2);
    assert_eq!(matrix[&vec![1, 1, 1]], 7);
}

#[test]
fn test_get_3x3() {
    let matrix = RawTensor::new(vec![0, 1, 2, 3, 4, 5, 6, 7, 8], vec![3, 3]);
    let mut prev = -1;
    for i in 0..3 {
        for j in 0..3 {
            let &curr = matrix.get(&[i, j]).unwrap();
            assert_eq!(prev + 1, curr);
            prev = curr;
        }
    }
}

#[test]
fn test_try_new_rejects_bad_length() {
    let err = RawTensor::try_new(vec![1.0, 2.0, 3.0], vec![2, 2]).unwrap_err();
    assert!(matches!(
        err,
        TensorError::LengthMismatch {
            expected: 4,
            actual: 3,
            ..
        }
    ));
}

#[test]
fn test_from_nested() {
    let tensor: RawTensor<i32> = RawTensor::from([[0, 1, 2], [3, 4, 5]]);
    assert_eq!(tensor, RawTensor::new((0..6).collect(), vec![2, 3]));
}

#[test]
fn test_from_empty_vec() {
    let empty = RawTensor::<f64>::from(Vec::<f64>::new());
    assert_eq!(empty.shape(), &vec![0]);
    assert_eq!(empty.count(), 0);
}
