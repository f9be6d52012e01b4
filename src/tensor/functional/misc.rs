use crate::tensor::autograd::Derivative;
use crate::tensor::error::{Result, TensorError};
use crate::tensor::numeric::*;
use crate::tensor::{RawTensor, RcTensor, TensorList};

/// Sum of all elements as a scalar.
pub fn sum<T: Numeric>(tensor: &RcTensor<T>) -> RcTensor<T> {
    let total = tensor.array.iter().fold(T::zero(), |acc, &x| acc + x);
    let mut raw_scalar = RawTensor::scalar(total);
    raw_scalar.grad_fn = Some(Derivative::new(
        vec![tensor.clone()],
        sum_vjp,
        format!("sum, file: {}, line: {}", file!(), line!()),
    ));
    RcTensor::from_raw(raw_scalar)
}

fn sum_vjp<T: Numeric>(inputs: &[RcTensor<T>], grad: &RcTensor<T>) -> TensorList<T> {
    assert_eq!(inputs.len(), 1);
    vec![RcTensor::new_with_filler(
        inputs[0].shape().clone(),
        grad.elem(),
    )]
}

/// `[.., k] @ [k, m] -> [.., m]`: every leading index of `left` is a row.
fn matmul_raw<T: Numeric>(left: &RawTensor<T>, right: &RawTensor<T>) -> Result<RawTensor<T>> {
    let mismatch = || TensorError::ShapeMismatch {
        op: "matmul",
        left: left.shape.clone(),
        right: right.shape.clone(),
    };
    let (&k, leading) = left.shape.split_last().ok_or_else(mismatch)?;
    if right.shape.len() != 2 || right.shape[0] != k {
        return Err(mismatch());
    }
    let m = right.shape[1];
    let rows = leading.iter().product::<usize>();

    let mut array = Vec::with_capacity(rows * m);
    for i in 0..rows {
        for j in 0..m {
            let mut acc = T::zero();
            for p in 0..k {
                acc += left.array[i * k + p] * right.array[p * m + j];
            }
            array.push(acc);
        }
    }
    let mut shape = leading.to_vec();
    shape.push(m);
    Ok(RawTensor::new(array, shape))
}

pub fn try_matmul<T: Numeric>(left: &RcTensor<T>, right: &RcTensor<T>) -> Result<RcTensor<T>> {
    let mut raw_tensor = matmul_raw(left, right)?;
    raw_tensor.grad_fn = Some(Derivative::new(
        vec![left.clone(), right.clone()],
        matmul_vjp,
        format!("matmul, file: {}, line: {}", file!(), line!()),
    ));
    Ok(RcTensor::from_raw(raw_tensor))
}

fn matmul_vjp<T: Numeric>(inputs: &[RcTensor<T>], grad: &RcTensor<T>) -> TensorList<T> {
    assert_eq!(inputs.len(), 2);
    let (left, right) = (&inputs[0], &inputs[1]);
    let (k, m) = (right.shape()[0], right.shape()[1]);
    let rows = left.count() / k.max(1);

    // d left = grad @ right^T, d right = left^T @ grad
    let mut left_grad = vec![T::zero(); left.count()];
    let mut right_grad = vec![T::zero(); right.count()];
    for i in 0..rows {
        for j in 0..m {
            let g = grad.array[i * m + j];
            for p in 0..k {
                left_grad[i * k + p] += g * right.array[p * m + j];
                right_grad[p * m + j] += left.array[i * k + p] * g;
            }
        }
    }
    vec![
        RcTensor::new(left_grad, left.shape().clone()),
        RcTensor::new(right_grad, right.shape().clone()),
    ]
}

#[test]
fn test_sum_backward() {
    let input = RcTensor::from([1.0, 2.0, 3.0]);
    input.sum().backward();
    assert_eq!(input.grad(), RcTensor::from([1.0, 1.0, 1.0]));
}

#[test]
fn test_matmul() {
    let matrix = RcTensor::new(vec![0, 1, 2, 3], vec![2, 2]);
    let diag = RcTensor::new(vec![1, 1], vec![2, 1]);
    let e1 = RcTensor::new(vec![0, 1], vec![2, 1]);
    let shape = vec![2, 1];
    assert_eq!(matrix.matmul(&diag), RcTensor::new(vec![1, 5], shape.clone()));
    assert_eq!(matrix.matmul(&e1), RcTensor::new(vec![1, 3], shape));
}

#[test]
fn test_matmul_vector_and_batch() {
    let weights = RcTensor::from([[1.0, 0.0, 2.0], [0.0, 1.0, -1.0]]);
    let vector = RcTensor::from([3.0, 4.0]);
    assert_eq!(vector.matmul(&weights), RcTensor::from([3.0, 4.0, 2.0]));

    let batch = RcTensor::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0], vec![2, 2, 2]);
    let out = batch.matmul(&weights);
    assert_eq!(out.shape(), &vec![2, 2, 3]);
    assert_eq!(
        out.to_vec(),
        vec![1.0, 0.0, 2.0, 0.0, 1.0, -1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0]
    );
}

#[test]
fn test_matmul_shape_mismatch() {
    let left = RcTensor::from([[1.0, 2.0, 3.0]]);
    let right = RcTensor::from([[1.0, 2.0], [3.0, 4.0]]);
    assert!(matches!(
        try_matmul(&left, &right),
        Err(TensorError::ShapeMismatch { op: "matmul", .. })
    ));
}

#[test]
fn test_matmul_backward() {
    let left = RcTensor::from([[1.0, 2.0], [3.0, 4.0]]);
    let right = RcTensor::from([[1.0, -1.0, 0.5], [2.0, 0.0, 1.0]]);
    left.matmul(&right).sum().backward();
    // row sums of right, repeated per row of left
    assert_eq!(left.grad(), RcTensor::from([[0.5, 3.0], [0.5, 3.0]]));
    // column sums of left, repeated per column of right
    assert_eq!(
        right.grad(),
        RcTensor::from([[4.0, 4.0, 4.0], [6.0, 6.0, 6.0]])
    );
}
