use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::nn::module::check_param_count;
use crate::nn::Module;
use crate::tensor::{cast, functional, NamedTensorList, Numeric, RcTensor, Result, TensorList};

/// Standard deviation of the weights drawn by [`Linear::init`].
const INIT_STD: f64 = 0.1;

/// `activation(x @ weights + bias)` with `weights: [in, out]` and `bias: [1, out]`.
pub struct Linear<T>
where
    T: Numeric,
{
    pub weights: RcTensor<T>,
    pub bias: RcTensor<T>,
    activation: fn(RcTensor<T>) -> RcTensor<T>,
}

impl<T: Numeric> std::fmt::Debug for Linear<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Linear")
            .field("weights", &self.weights.shape())
            .field("bias", &self.bias.shape())
            .finish()
    }
}

impl<T> Linear<T>
where
    T: Numeric,
{
    pub fn new(
        weights: RcTensor<T>,
        bias: RcTensor<T>,
        activation: Option<fn(RcTensor<T>) -> RcTensor<T>>,
    ) -> Self {
        Linear {
            weights,
            bias,
            activation: match activation {
                Some(f) => f,
                None => |t| t,
            },
        }
    }

    /// Weights and bias drawn from `Normal(0, 0.1)`.
    pub fn init<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        activation: Option<fn(RcTensor<T>) -> RcTensor<T>>,
        rng: &mut R,
    ) -> Result<Self> {
        let mut sample_tensor = |shape: Vec<usize>| -> Result<RcTensor<T>> {
            let array = (0..shape.iter().product::<usize>())
                .map(|_| {
                    let value: f64 = StandardNormal.sample(&mut *rng);
                    cast(value * INIT_STD)
                })
                .collect::<Result<Vec<T>>>()?;
            RcTensor::try_new(array, shape)
        };
        let weights = sample_tensor(vec![in_features, out_features])?;
        let bias = sample_tensor(vec![1, out_features])?;
        Ok(Linear::new(weights, bias, activation))
    }
}

impl<T: Numeric> Module<T> for Linear<T> {
    fn try_forward(&self, input: RcTensor<T>) -> Result<RcTensor<T>> {
        let y = functional::try_matmul(&input, &self.weights)?;
        let y = functional::try_add(&y, &self.bias)?;
        Ok((self.activation)(y))
    }

    fn named_params(&self) -> NamedTensorList<T> {
        vec![
            ("weights".to_string(), self.weights.clone()),
            ("bias".to_string(), self.bias.clone()),
        ]
    }

    fn update_params(&mut self, mut new_params: TensorList<T>) -> Result<()> {
        check_param_count(2, &new_params)?;
        self.bias = new_params.remove(1);
        self.weights = new_params.remove(0);
        Ok(())
    }
}

#[test]
fn test_layer_no_grad() {
    let layer = Linear::new(
        RcTensor::new_with_filler(vec![2, 2], 1.0),
        RcTensor::new_with_filler(vec![1, 2], 1.0),
        None,
    );
    let input = RcTensor::new(vec![1.0, 2.0], vec![1, 2]);
    let res = layer.forward(input);
    let expected = RcTensor::new(vec![4.0, 4.0], vec![1, 2]);

    assert_eq!(res, expected);
}

#[test]
fn test_layer() {
    let layer = Linear::new(
        RcTensor::from([[1.0, -2.0], [-1.5, 0.5]]),
        RcTensor::new_with_filler(vec![1, 2], 1.0),
        None,
    );
    let input = RcTensor::new(vec![1.0, 2.0], vec![1, 2]);
    let res = layer.forward(input.clone());
    assert_eq!(res, RcTensor::from([[-1.0, 0.0]]));
    res.sum().backward();
    assert_eq!(
        layer.weights.grad(),
        RcTensor::from([[1.0, 1.0], [2.0, 2.0]])
    );
    assert_eq!(layer.bias.grad(), RcTensor::from([[1.0, 1.0]]));
    assert_eq!(input.grad(), RcTensor::from([[-1.0, -1.0]]));
}

#[test]
fn test_layer_batch_tensor() {
    let layer = Linear::new(
        RcTensor::from([[1.0, -2.0], [-1.1, 0.7]]),
        RcTensor::new_with_filler(vec![2], 1.0),
        Some(functional::tanh),
    );
    let input = RcTensor::new(vec![1.0, 2.0, 0.0, 1.0, -1.0, 0.5], vec![3, 2]);
    let res = layer.forward(input);
    assert_eq!(res.shape(), &vec![3, 2]);
    res.sum().backward();
    assert_eq!(layer.bias.grad().shape(), &vec![2]);
    assert_eq!(layer.weights.grad().shape(), &vec![2, 2]);
}

#[test]
fn test_init_is_seeded() {
    use rand::SeedableRng;

    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let first = Linear::<f32>::init(3, 5, None, &mut rng).unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let second = Linear::<f32>::init(3, 5, None, &mut rng).unwrap();
    assert_eq!(first.weights.shape(), &vec![3, 5]);
    assert_eq!(first.bias.shape(), &vec![1, 5]);
    assert_eq!(first.weights, second.weights);
    assert!(first.weights.iter().any(|&w| w != 0.0));
}

#[test]
fn test_update_params_checks_count() {
    let mut layer = Linear::new(RcTensor::zeros(vec![1, 1]), RcTensor::zeros(vec![1, 1]), None);
    assert!(layer.update_params(vec![RcTensor::zeros(vec![1, 1])]).is_err());
    layer
        .update_params(vec![RcTensor::ones(vec![1, 1]), RcTensor::scalar(2.0)])
        .unwrap();
    assert_eq!(layer.forward(RcTensor::from([3.0])), RcTensor::from([5.0]));
}
