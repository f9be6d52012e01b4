use num::traits::real::Real;

use crate::tensor::autograd::Derivative;
use crate::tensor::error::{Result, TensorError};
use crate::tensor::numeric::*;
use crate::tensor::utils::{broadcast_offset, broadcast_shape, IndexIterator};
use crate::tensor::{RawTensor, RcTensor, TensorList};

/// Applies `f` pairwise over `shape`, reading both operands with broadcasting.
/// The caller guarantees both operands broadcast to `shape`.
fn broadcast_apply<T, F>(shape: &[usize], left: &RawTensor<T>, right: &RawTensor<T>, f: F) -> RawTensor<T>
where
    T: Numeric,
    F: Fn(T, T) -> T,
{
    let array = IndexIterator::new(shape.to_vec())
        .map(|idx| {
            f(
                left.array[broadcast_offset(&idx, &left.shape)],
                right.array[broadcast_offset(&idx, &right.shape)],
            )
        })
        .collect();
    RawTensor::new(array, shape.to_vec())
}

fn zip_broadcast<T, F>(op: &'static str, left: &RawTensor<T>, right: &RawTensor<T>, f: F) -> Result<RawTensor<T>>
where
    T: Numeric,
    F: Fn(T, T) -> T,
{
    let shape = broadcast_shape(&left.shape, &right.shape).ok_or_else(|| {
        TensorError::ShapeMismatch {
            op,
            left: left.shape.clone(),
            right: right.shape.clone(),
        }
    })?;
    Ok(broadcast_apply(&shape, left, right, f))
}

fn map<T: Numeric, F: Fn(T) -> T>(tensor: &RawTensor<T>, f: F) -> RawTensor<T> {
    RawTensor::new(tensor.array.iter().map(|&x| f(x)).collect(), tensor.shape.clone())
}

/// Sums a gradient of the broadcast output shape back down to an input's `shape`.
pub(in crate::tensor) fn reduce_to_shape<T: Numeric>(grad: &RawTensor<T>, shape: &[usize]) -> RcTensor<T> {
    let mut array = vec![T::zero(); shape.iter().product()];
    for (idx, &g) in IndexIterator::new(grad.shape.clone()).zip(grad.array.iter()) {
        array[broadcast_offset(&idx, shape)] += g;
    }
    RcTensor::new(array, shape.to_vec())
}

fn with_history<T: Numeric>(
    mut raw_tensor: RawTensor<T>,
    inputs: TensorList<T>,
    vjp: fn(&[RcTensor<T>], &RcTensor<T>) -> TensorList<T>,
    debug_info: String,
) -> RcTensor<T> {
    raw_tensor.grad_fn = Some(Derivative::new(inputs, vjp, debug_info));
    RcTensor::from_raw(raw_tensor)
}

/// Elementwise `left + right` with broadcasting.
pub fn try_add<T: Numeric>(left: &RcTensor<T>, right: &RcTensor<T>) -> Result<RcTensor<T>> {
    let raw_tensor = zip_broadcast("add", left, right, |l, r| l + r)?;
    Ok(with_history(
        raw_tensor,
        vec![left.clone(), right.clone()],
        add_vjp,
        format!("add, file: {}, line: {}", file!(), line!()),
    ))
}

fn add_vjp<T: Numeric>(inputs: &[RcTensor<T>], grad: &RcTensor<T>) -> TensorList<T> {
    assert_eq!(inputs.len(), 2);
    vec![
        reduce_to_shape(grad, inputs[0].shape()),
        reduce_to_shape(grad, inputs[1].shape()),
    ]
}

/// Elementwise `left - right` with broadcasting.
pub fn try_sub<T: Numeric>(left: &RcTensor<T>, right: &RcTensor<T>) -> Result<RcTensor<T>> {
    let raw_tensor = zip_broadcast("sub", left, right, |l, r| l - r)?;
    Ok(with_history(
        raw_tensor,
        vec![left.clone(), right.clone()],
        sub_vjp,
        format!("sub, file: {}, line: {}", file!(), line!()),
    ))
}

fn sub_vjp<T: Numeric>(inputs: &[RcTensor<T>], grad: &RcTensor<T>) -> TensorList<T> {
    assert_eq!(inputs.len(), 2);
    let negated = map(grad, |g| -g);
    vec![
        reduce_to_shape(grad, inputs[0].shape()),
        reduce_to_shape(&negated, inputs[1].shape()),
    ]
}

/// Elementwise `left * right` with broadcasting; a scalar operand scales the other.
pub fn try_mul<T: Numeric>(left: &RcTensor<T>, right: &RcTensor<T>) -> Result<RcTensor<T>> {
    let raw_tensor = zip_broadcast("mul", left, right, |l, r| l * r)?;
    Ok(with_history(
        raw_tensor,
        vec![left.clone(), right.clone()],
        mul_vjp,
        format!("mul, file: {}, line: {}", file!(), line!()),
    ))
}

fn mul_vjp<T: Numeric>(inputs: &[RcTensor<T>], grad: &RcTensor<T>) -> TensorList<T> {
    assert_eq!(inputs.len(), 2);
    let (left, right) = (&inputs[0], &inputs[1]);
    let left_grad = broadcast_apply(grad.shape(), grad, right, |g, r| g * r);
    let right_grad = broadcast_apply(grad.shape(), grad, left, |g, l| g * l);
    vec![
        reduce_to_shape(&left_grad, left.shape()),
        reduce_to_shape(&right_grad, right.shape()),
    ]
}

pub fn neg<T: Numeric>(tensor: RcTensor<T>) -> RcTensor<T> {
    let raw_tensor = map(&tensor, |x| -x);
    with_history(
        raw_tensor,
        vec![tensor],
        neg_vjp,
        format!("neg, file: {}, line: {}", file!(), line!()),
    )
}

fn neg_vjp<T: Numeric>(inputs: &[RcTensor<T>], grad: &RcTensor<T>) -> TensorList<T> {
    assert_eq!(inputs.len(), 1);
    vec![RcTensor::from_raw(map(grad, |g| -g))]
}

pub fn tanh<T: Numeric + Real>(tensor: RcTensor<T>) -> RcTensor<T> {
    let raw_tensor = map(&tensor, |x| x.tanh());
    with_history(
        raw_tensor,
        vec![tensor],
        tanh_vjp,
        format!("tanh, file: {}, line: {}", file!(), line!()),
    )
}

fn tanh_vjp<T: Numeric + Real>(inputs: &[RcTensor<T>], grad: &RcTensor<T>) -> TensorList<T> {
    assert_eq!(inputs.len(), 1);
    let derivative = map(&inputs[0], |x| T::one() - x.tanh().powi(2));
    vec![RcTensor::from_raw(broadcast_apply(
        grad.shape(),
        grad,
        &derivative,
        |g, d| g * d,
    ))]
}

pub fn relu<T: Numeric>(tensor: RcTensor<T>) -> RcTensor<T> {
    let raw_tensor = map(&tensor, |x| if x > T::zero() { x } else { T::zero() });
    with_history(
        raw_tensor,
        vec![tensor],
        relu_vjp,
        format!("relu, file: {}, line: {}", file!(), line!()),
    )
}

fn relu_vjp<T: Numeric>(inputs: &[RcTensor<T>], grad: &RcTensor<T>) -> TensorList<T> {
    assert_eq!(inputs.len(), 1);
    let gated = broadcast_apply(grad.shape(), grad, &inputs[0], |g, x| {
        if x > T::zero() {
            g
        } else {
            T::zero()
        }
    });
    vec![RcTensor::from_raw(gated)]
}

pub fn abs<T: Numeric>(tensor: RcTensor<T>) -> RcTensor<T> {
    let raw_tensor = map(&tensor, |x| if x < T::zero() { -x } else { x });
    with_history(
        raw_tensor,
        vec![tensor],
        abs_vjp,
        format!("abs, file: {}, line: {}", file!(), line!()),
    )
}

// sign(0) is taken to be 0
fn abs_vjp<T: Numeric>(inputs: &[RcTensor<T>], grad: &RcTensor<T>) -> TensorList<T> {
    assert_eq!(inputs.len(), 1);
    let signed = broadcast_apply(grad.shape(), grad, &inputs[0], |g, x| {
        if x > T::zero() {
            g
        } else if x < T::zero() {
            -g
        } else {
            T::zero()
        }
    });
    vec![RcTensor::from_raw(signed)]
}

#[cfg(test)]
fn numerical_grad(f: impl Fn(&RcTensor<f64>) -> RcTensor<f64>, input: &RcTensor<f64>) -> RcTensor<f64> {
    let epsilon = 1e-6;
    let values = input.to_vec();
    let grads = (0..values.len())
        .map(|i| {
            let mut up = values.clone();
            let mut down = values.clone();
            up[i] += epsilon;
            down[i] -= epsilon;
            let up = f(&RcTensor::new(up, input.shape().clone())).sum().elem();
            let down = f(&RcTensor::new(down, input.shape().clone())).sum().elem();
            (up - down) / (2.0 * epsilon)
        })
        .collect();
    RcTensor::new(grads, input.shape().clone())
}

#[cfg(test)]
fn max_abs_diff(left: &RcTensor<f64>, right: &RcTensor<f64>) -> f64 {
    assert_eq!(left.shape(), right.shape());
    left.iter()
        .zip(right.iter())
        .map(|(l, r)| (l - r).abs())
        .fold(0.0, f64::max)
}

#[test]
fn test_add() {
    let tensor1 = RcTensor::new_with_filler(vec![4, 4], 1);
    let tensor2 = RcTensor::new((0..32).collect(), vec![2, 4, 4]);
    let tensor3 = RcTensor::new((1..33).collect(), vec![2, 4, 4]);
    assert_eq!(&tensor2 + &tensor1, tensor3);
    assert_eq!(&tensor1 + &tensor2, tensor3);
    assert_eq!(tensor1 + tensor2, tensor3);
}

#[test]
fn test_add_shape_mismatch_is_an_error() {
    let left = RcTensor::from([1.0, 2.0, 3.0, 4.0]);
    let right = RcTensor::from([1.0, 2.0, 3.0]);
    match try_add(&left, &right) {
        Err(TensorError::ShapeMismatch { op, left, right }) => {
            assert_eq!(op, "add");
            assert_eq!(left, vec![4]);
            assert_eq!(right, vec![3]);
        }
        other => panic!("expected a shape mismatch, got {other:?}"),
    }
}

#[test]
fn test_add_broadcast_backward() {
    let matrix = RcTensor::from([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    let row = RcTensor::from([10.0, 20.0, 30.0]);
    (&matrix + &row).sum().backward();
    assert_eq!(matrix.grad(), RcTensor::ones(vec![2, 3]));
    assert_eq!(row.grad(), RcTensor::from([2.0, 2.0, 2.0]));
}

#[test]
fn test_sub_backward() {
    let left = RcTensor::from([1.0, 2.0]);
    let right = RcTensor::scalar(5.0);
    let out = &left - &right;
    assert_eq!(out, RcTensor::from([-4.0, -3.0]));
    out.sum().backward();
    assert_eq!(left.grad(), RcTensor::from([1.0, 1.0]));
    assert_eq!(right.grad(), RcTensor::scalar(-2.0));
}

#[test]
fn test_scalar_mul_backward() {
    let alpha = RcTensor::scalar(0.5);
    let x = RcTensor::from([1.0, 2.0, 3.0]);
    let out = &alpha * &x;
    assert_eq!(out, RcTensor::from([0.5, 1.0, 1.5]));
    out.sum().backward();
    assert_eq!(alpha.grad(), RcTensor::scalar(6.0));
    assert_eq!(x.grad(), RcTensor::from([0.5, 0.5, 0.5]));
}

#[test]
fn test_tanh_matches_numerical_gradient() {
    let input = RcTensor::from([[0.666, 12.0], [-3.2, -0.1]]);
    let expected = numerical_grad(|x| x.tanh().tanh(), &input);
    input.tanh().tanh().sum().backward();
    assert!(max_abs_diff(&input.grad(), &expected) <= 1e-6);
}

#[test]
fn test_relu_and_abs_gradients() {
    let input = RcTensor::from([-1.5, 0.0, 2.0]);
    assert_eq!(input.relu(), RcTensor::from([0.0, 0.0, 2.0]));
    assert_eq!(input.abs(), RcTensor::from([1.5, 0.0, 2.0]));
    input.relu().sum().backward();
    assert_eq!(input.grad(), RcTensor::from([0.0, 0.0, 1.0]));
    input.zero_grad();
    input.abs().sum().backward();
    assert_eq!(input.grad(), RcTensor::from([-1.0, 0.0, 1.0]));
}

#[test]
fn test_neg_backward() {
    let input = RcTensor::from([1.0, -2.0]);
    let out = -&input;
    assert_eq!(out, RcTensor::from([-1.0, 2.0]));
    out.sum().backward();
    assert_eq!(input.grad(), RcTensor::from([-1.0, -1.0]));
}
