use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::tensor::numeric::*;
use crate::tensor::{RawTensor, RcTensor, TensorList};

/// signature: vjp(inputs, output_grad) -> one gradient per input, shaped like that input
pub(in crate::tensor) type VectorJacobianProduct<T> =
    fn(&[RcTensor<T>], &RcTensor<T>) -> TensorList<T>;

/// The record an op leaves on its output so that `backward` can find its way
/// to the op's inputs.
#[derive(Clone)]
pub(in crate::tensor) struct Derivative<T: Numeric> {
    inputs: TensorList<T>,
    vector_jacobian_product: VectorJacobianProduct<T>,
    debug_info: String,
}

impl<T: Numeric> fmt::Debug for Derivative<T> {
    // printing the inputs would print the whole graph behind them
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derivative")
            .field("inputs", &self.inputs.len())
            .field("debug_info", &self.debug_info)
            .finish()
    }
}

impl<T: Numeric> Derivative<T> {
    pub fn new(
        inputs: TensorList<T>,
        vector_jacobian_product: VectorJacobianProduct<T>,
        debug_info: String,
    ) -> Derivative<T> {
        Derivative {
            inputs,
            vector_jacobian_product,
            debug_info,
        }
    }

    fn input_grads(&self, output_grad: &RcTensor<T>) -> TensorList<T> {
        let grads = (self.vector_jacobian_product)(&self.inputs, output_grad);
        debug_assert_eq!(grads.len(), self.inputs.len());
        for (grad, input) in grads.iter().zip(self.inputs.iter()) {
            debug_assert_eq!(
                grad.shape(),
                input.shape(),
                "gradient and input must have the same shape ({})",
                self.debug_info
            );
        }
        grads
    }
}

type NodeKey<T> = *const RawTensor<T>;

fn key<T: Numeric>(tensor: &RcTensor<T>) -> NodeKey<T> {
    Rc::as_ptr(&tensor.0)
}

/// Every node reachable from `root`, ordered so that each node comes before
/// all of its inputs.
fn topological_order<T: Numeric>(root: &RcTensor<T>) -> TensorList<T> {
    let mut visited: HashSet<NodeKey<T>> = HashSet::new();
    let mut post_order = Vec::new();
    let mut stack = vec![(root.clone(), false)];
    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            post_order.push(node);
            continue;
        }
        if !visited.insert(key(&node)) {
            continue;
        }
        stack.push((node.clone(), true));
        if let Some(derivative) = node.grad_fn.as_ref() {
            for input in derivative.inputs.iter() {
                if !visited.contains(&key(input)) {
                    stack.push((input.clone(), false));
                }
            }
        }
    }
    post_order.reverse();
    post_order
}

/// Elementwise sum of two gradients of the same shape, with no history.
pub(in crate::tensor) fn accumulate<T: Numeric>(left: &RcTensor<T>, right: &RcTensor<T>) -> RcTensor<T> {
    let array = left
        .iter()
        .zip(right.iter())
        .map(|(&l, &r)| l + r)
        .collect();
    RcTensor::new(array, left.shape().clone())
}

/// Reverse-mode sweep from `root`: seeds `ones(root.shape)` and accumulates the
/// gradient of every reachable node into its `grad` slot.
pub(in crate::tensor) fn backward<T: Numeric>(root: &RcTensor<T>) {
    let order = topological_order(root);
    trace!(nodes = order.len(), "backward pass");
    let mut pending: HashMap<NodeKey<T>, RcTensor<T>> = HashMap::new();
    pending.insert(key(root), RcTensor::ones(root.shape().clone()));

    for node in order.iter() {
        let Some(grad) = pending.remove(&key(node)) else {
            continue;
        };
        node.update_grad(&grad);
        let Some(derivative) = node.grad_fn.as_ref() else {
            continue;
        };
        trace!(op = %derivative.debug_info, "propagating gradient");
        for (input, input_grad) in derivative
            .inputs
            .iter()
            .zip(derivative.input_grads(&grad))
        {
            let accumulated = match pending.remove(&key(input)) {
                Some(previous) => accumulate(&previous, &input_grad),
                None => input_grad,
            };
            pending.insert(key(input), accumulated);
        }
    }
}

#[test]
fn test_backward_visits_shared_input_once_per_use() {
    // d/dx (x * x + x) = 2x + 1
    let x = RcTensor::from([1.0, -2.0, 3.0]);
    let y = &(&x * &x) + &x;
    y.sum().backward();
    assert_eq!(x.grad(), RcTensor::from([3.0, -3.0, 7.0]));
}

#[test]
fn test_backward_accumulates_across_calls() {
    let x = RcTensor::from([1.0, 2.0]);
    x.sum().backward();
    x.sum().backward();
    assert_eq!(x.grad(), RcTensor::from([2.0, 2.0]));
    x.zero_grad();
    assert_eq!(x.grad_opt(), None);
}

#[test]
fn test_topological_order_puts_outputs_first() {
    let x = RcTensor::from([1.0, 2.0]);
    let h = x.tanh();
    let out = (&h + &x).sum();
    let order = topological_order(&out);
    assert_eq!(order.len(), 4);
    assert_eq!(key(&order[0]), key(&out));
    let position = |t: &RcTensor<f64>| order.iter().position(|n| key(n) == key(t)).unwrap();
    assert!(position(&h) < position(&x));
}

#[test]
fn test_deep_diamond_is_linear() {
    // 40 stacked `h + h` nodes would be 2^40 paths if walked path by path
    let x = RcTensor::from([1.0]);
    let mut h = x.clone();
    for _ in 0..40 {
        h = &h + &h;
    }
    h.sum().backward();
    assert_eq!(x.grad().elem(), 2f64.powi(40));
}
