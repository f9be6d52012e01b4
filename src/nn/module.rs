use crate::tensor::{NamedTensorList, Numeric, RcTensor, Result, TensorError, TensorList};

/// A computation unit mapping a tensor to a tensor, together with the
/// trainable parameters it owns.
///
/// Implement this for your own layers to plug them into [`crate::nn::ReZero`],
/// [`crate::optim::Sgd`] and [`crate::nn::StateDict`].
pub trait Module<T: Numeric> {
    fn try_forward(&self, input: RcTensor<T>) -> Result<RcTensor<T>>;

    /// Like `try_forward`, but panics on failure, the way tensor arithmetic does.
    fn forward(&self, input: RcTensor<T>) -> RcTensor<T> {
        self.try_forward(input).unwrap_or_else(|e| panic!("{}", e))
    }

    /// Every parameter with its dotted path, in a stable order.
    fn named_params(&self) -> NamedTensorList<T>;

    fn params(&self) -> TensorList<T> {
        self.named_params().into_iter().map(|(_, p)| p).collect()
    }

    /// Replaces the parameters, given in the same order as `params` returns them.
    fn update_params(&mut self, new_params: TensorList<T>) -> Result<()>;

    fn zero_grad(&self) {
        self.params().iter().for_each(|p| p.zero_grad());
    }
}

pub(crate) fn prefixed<T: Numeric>(prefix: &str, params: NamedTensorList<T>) -> NamedTensorList<T> {
    params
        .into_iter()
        .map(|(name, p)| (format!("{prefix}.{name}"), p))
        .collect()
}

pub(crate) fn check_param_count<T: Numeric>(expected: usize, new_params: &TensorList<T>) -> Result<()> {
    if expected != new_params.len() {
        return Err(TensorError::ParamCountMismatch {
            expected,
            actual: new_params.len(),
        });
    }
    Ok(())
}

impl<T: Numeric, M: Module<T> + ?Sized> Module<T> for Box<M> {
    fn try_forward(&self, input: RcTensor<T>) -> Result<RcTensor<T>> {
        (**self).try_forward(input)
    }

    fn named_params(&self) -> NamedTensorList<T> {
        (**self).named_params()
    }

    fn update_params(&mut self, new_params: TensorList<T>) -> Result<()> {
        (**self).update_params(new_params)
    }
}

/// A `Vec` of modules runs them one after another; parameters are named `{i}.{name}`.
impl<T: Numeric, M: Module<T>> Module<T> for Vec<M> {
    fn try_forward(&self, input: RcTensor<T>) -> Result<RcTensor<T>> {
        self.iter()
            .try_fold(input, |prev, module| module.try_forward(prev))
    }

    fn named_params(&self) -> NamedTensorList<T> {
        self.iter()
            .enumerate()
            .flat_map(|(i, module)| prefixed(&i.to_string(), module.named_params()))
            .collect()
    }

    fn update_params(&mut self, new_params: TensorList<T>) -> Result<()> {
        let expected = self.iter().map(|module| module.params().len()).sum();
        check_param_count(expected, &new_params)?;
        let mut param_iter = new_params.into_iter();
        for module in self.iter_mut() {
            let count = module.params().len();
            module.update_params(param_iter.by_ref().take(count).collect())?;
        }
        Ok(())
    }
}

#[test]
fn test_vec_of_modules_runs_in_order() {
    use crate::nn::Lambda;

    let stack: Vec<Box<dyn Module<f64>>> = vec![
        Box::new(Lambda::new(|x: RcTensor<f64>| &x + &x)),
        Box::new(Lambda::new(|x: RcTensor<f64>| &x - &RcTensor::scalar(1.0))),
    ];
    let out = stack.forward(RcTensor::from([1.0, 2.0]));
    assert_eq!(out, RcTensor::from([1.0, 3.0]));
    assert!(stack.named_params().is_empty());
}
