use tracing::debug;

use crate::nn::Module;
use crate::tensor::{functional, Numeric, RcTensor, Result, Scalar, TensorError, TensorList};

/// Plain stochastic gradient descent: `p <- p - step_size * p.grad`.
#[derive(Debug, Clone)]
pub struct Sgd<T: Numeric> {
    step_size: Scalar<T>,
}

impl<T: Numeric> Sgd<T> {
    pub fn new(step_size: T) -> Result<Self> {
        if step_size <= T::zero() {
            return Err(TensorError::InvalidStepSize(step_size.to_string()));
        }
        Ok(Sgd {
            step_size: RcTensor::scalar(step_size),
        })
    }

    pub fn step_size(&self) -> T {
        self.step_size.elem()
    }

    /// Moves every parameter that received a gradient against it. The new
    /// parameters are leaves, so the old gradients are left behind.
    pub fn step<M: Module<T> + ?Sized>(&self, module: &mut M) -> Result<()> {
        let mut updated = 0;
        let new_params = module
            .params()
            .iter()
            .map(|p| match p.grad_opt() {
                Some(grad) => {
                    updated += 1;
                    let delta = functional::try_mul(&self.step_size, &grad)?;
                    Ok(functional::try_sub(p, &delta)?.detach())
                }
                None => Ok(p.clone()),
            })
            .collect::<Result<TensorList<T>>>()?;
        debug!(
            updated,
            total = new_params.len(),
            step_size = %self.step_size.elem(),
            "sgd step"
        );
        module.update_params(new_params)
    }

    pub fn zero_grad<M: Module<T> + ?Sized>(&self, module: &M) {
        module.zero_grad()
    }
}

/// One SGD step with a scalar step size tensor.
pub fn sgd_step<T, M>(module: &mut M, step_size: Scalar<T>) -> Result<()>
where
    T: Numeric,
    M: Module<T> + ?Sized,
{
    Sgd::new(step_size.elem())?.step(module)
}

#[test]
fn test_rejects_non_positive_step_size() {
    assert!(matches!(
        Sgd::new(0.0),
        Err(TensorError::InvalidStepSize(_))
    ));
    assert!(Sgd::new(-1e-2).is_err());
    assert_eq!(Sgd::new(0.5).unwrap().step_size(), 0.5);
}

#[test]
fn test_step_moves_linear_layer() {
    use crate::nn::Linear;

    let mut layer = Linear::new(
        RcTensor::from([[1.0, -2.0], [-1.5, 0.5]]),
        RcTensor::ones(vec![1, 2]),
        None,
    );
    layer.forward(RcTensor::from([[1.0, 2.0]])).sum().backward();
    Sgd::new(0.5).unwrap().step(&mut layer).unwrap();

    assert_eq!(layer.weights, RcTensor::from([[0.5, -2.5], [-2.5, -0.5]]));
    assert_eq!(layer.bias, RcTensor::from([[0.5, 0.5]]));
    assert!(layer.weights.is_leaf());
    assert!(layer.weights.grad_opt().is_none());
}

#[test]
fn test_step_moves_alpha_by_inner_output_sum() {
    use crate::nn::{Lambda, ReZero};

    let mut block = ReZero::new(4, Lambda::new(|x: RcTensor<f64>| &x + &x));
    block
        .forward(RcTensor::from([1.0, 2.0, 3.0, 4.0]))
        .sum()
        .backward();
    sgd_step(&mut block, RcTensor::scalar(1e-3)).unwrap();
    // alpha <- 1e-3 - 1e-3 * sum(2x)
    assert!((block.alpha().elem() - (1e-3 - 1e-3 * 20.0)).abs() < 1e-12);
}

#[test]
fn test_params_without_grad_are_kept() {
    use crate::nn::Linear;

    let mut layer = Linear::new(RcTensor::ones(vec![2, 1]), RcTensor::zeros(vec![1, 1]), None);
    let before = layer.params();
    Sgd::new(1.0).unwrap().step(&mut layer).unwrap();
    assert_eq!(layer.params(), before);
}
