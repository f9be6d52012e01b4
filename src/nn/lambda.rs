use std::fmt;
use std::marker::PhantomData;

use crate::nn::module::check_param_count;
use crate::nn::Module;
use crate::tensor::{NamedTensorList, Numeric, RcTensor, Result, TensorList};

/// A parameter-free module around any function or closure.
///
/// ```
/// use rezero::nn::{Lambda, Module};
/// use rezero::tensor::RcTensor;
///
/// let double = Lambda::new(|x: RcTensor<f64>| &x * 2.0);
/// assert_eq!(double.forward(RcTensor::from([1.5])), RcTensor::from([3.0]));
/// ```
pub struct Lambda<T, F> {
    function: F,
    _elem: PhantomData<fn(T) -> T>,
}

impl<T, F> Lambda<T, F>
where
    T: Numeric,
    F: Fn(RcTensor<T>) -> RcTensor<T>,
{
    pub fn new(function: F) -> Self {
        Lambda {
            function,
            _elem: PhantomData,
        }
    }
}

impl<T, F> fmt::Debug for Lambda<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Lambda")
    }
}

impl<T, F> Module<T> for Lambda<T, F>
where
    T: Numeric,
    F: Fn(RcTensor<T>) -> RcTensor<T>,
{
    fn try_forward(&self, input: RcTensor<T>) -> Result<RcTensor<T>> {
        Ok((self.function)(input))
    }

    fn named_params(&self) -> NamedTensorList<T> {
        vec![]
    }

    fn update_params(&mut self, new_params: TensorList<T>) -> Result<()> {
        check_param_count(0, &new_params)
    }
}

#[test]
fn test_lambda_has_no_params() {
    let mut identity = Lambda::new(|x: RcTensor<i32>| x);
    assert!(identity.params().is_empty());
    assert!(identity.update_params(vec![]).is_ok());
    assert!(identity
        .update_params(vec![RcTensor::scalar(1)])
        .is_err());
    assert_eq!(identity.forward(RcTensor::from([1, 2])), RcTensor::from([1, 2]));
}

#[test]
fn test_lambda_in_generic_code() {
    fn boxed<T: Numeric>() -> Box<dyn Module<T>> {
        Box::new(Lambda::new(|x: RcTensor<T>| -&x))
    }
    let negate = boxed::<f32>();
    assert_eq!(negate.forward(RcTensor::from([1.5, -2.0])), RcTensor::from([-1.5, 2.0]));
    assert_eq!(format!("{:?}", Lambda::new(|x: RcTensor<i64>| x)), "Lambda");
}
