//! ReZero residual gating (Bachlechner et al., 2020).
//!
//! `ReZero` wraps an inner module `f` and computes `x + alpha * f(x)`, where
//! `alpha` is a trainable scalar that starts at `1e-3`. Early in training the
//! block is therefore (almost) the identity, and the optimizer decides how much
//! of `f` to mix in.
//!
//! ```
//! use rezero::nn::{Lambda, Module, ReZero};
//! use rezero::tensor::RcTensor;
//!
//! let block = ReZero::new(4, Lambda::new(|x: RcTensor<f64>| &x * 2.0));
//! let out = block.forward(RcTensor::from([1.0, 2.0, 3.0, 4.0]));
//! for (got, want) in out.iter().zip([1.002, 2.004, 3.006, 4.008]) {
//!     assert!((got - want).abs() < 1e-12);
//! }
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::nn::module::prefixed;
use crate::nn::Module;
use crate::tensor::{
    cast, functional, NamedTensorList, Numeric, RcTensor, Result, Scalar, TensorError, TensorList,
};

/// Initial value of the gate.
pub const DEFAULT_INIT_ALPHA: f64 = 1e-3;

fn default_init_alpha() -> f64 {
    DEFAULT_INIT_ALPHA
}

/// Configuration for creating a [`ReZero`] block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReZeroConfig {
    /// Feature dimension of the wrapped module. Kept for symmetry with
    /// neighbouring layers; the scalar gate does not use it.
    pub embedding_dimension: usize,
    /// Initial gate value.
    #[serde(default = "default_init_alpha")]
    pub init_alpha: f64,
}

impl ReZeroConfig {
    pub fn new(embedding_dimension: usize) -> Self {
        ReZeroConfig {
            embedding_dimension,
            init_alpha: DEFAULT_INIT_ALPHA,
        }
    }

    pub fn with_init_alpha(mut self, init_alpha: f64) -> Self {
        self.init_alpha = init_alpha;
        self
    }

    /// Wraps `module`, failing if `init_alpha` cannot be represented in `T`.
    pub fn init<T, M>(&self, module: M) -> Result<ReZero<T, M>>
    where
        T: Numeric,
        M: Module<T>,
    {
        let alpha = cast(self.init_alpha)
            .map_err(|_| TensorError::InvalidInitAlpha(self.init_alpha))?;
        Ok(ReZero::with_alpha(self.embedding_dimension, module, alpha))
    }
}

/// Gated residual wrapper: `forward(x) = x + alpha * module(x)`.
#[derive(Debug)]
pub struct ReZero<T: Numeric, M> {
    alpha: Scalar<T>,
    module: M,
    embedding_dimension: usize,
}

impl<T, M> ReZero<T, M>
where
    T: Numeric,
    M: Module<T>,
{
    /// Wraps `module` with the gate set to [`DEFAULT_INIT_ALPHA`].
    pub fn new(embedding_dimension: usize, module: M) -> Self {
        // 1e-3 fits every element type; integer types truncate it to 0
        let alpha = cast(DEFAULT_INIT_ALPHA).unwrap_or_else(|_| T::zero());
        Self::with_alpha(embedding_dimension, module, alpha)
    }

    pub fn with_alpha(embedding_dimension: usize, module: M, alpha: T) -> Self {
        debug!(embedding_dimension, %alpha, "creating ReZero block");
        ReZero {
            alpha: RcTensor::scalar(alpha),
            module,
            embedding_dimension,
        }
    }

    /// The gate, a scalar tensor of shape `[]`.
    pub fn alpha(&self) -> &Scalar<T> {
        &self.alpha
    }

    pub fn embedding_dimension(&self) -> usize {
        self.embedding_dimension
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut M {
        &mut self.module
    }

    pub fn into_inner(self) -> M {
        self.module
    }
}

impl<T, M> Module<T> for ReZero<T, M>
where
    T: Numeric,
    M: Module<T>,
{
    /// `x + alpha * module(x)`. Shapes are only checked by the tensor ops: an
    /// inner output that does not broadcast against `x` fails the addition.
    fn try_forward(&self, x: RcTensor<T>) -> Result<RcTensor<T>> {
        let y = self.module.try_forward(x.clone())?;
        let gated = functional::try_mul(&self.alpha, &y)?;
        functional::try_add(&x, &gated)
    }

    fn named_params(&self) -> NamedTensorList<T> {
        let mut params = vec![("alpha".to_string(), self.alpha.clone())];
        params.extend(prefixed("module", self.module.named_params()));
        params
    }

    /// `alpha` first, then the inner module's parameters.
    fn update_params(&mut self, mut new_params: TensorList<T>) -> Result<()> {
        let expected = 1 + self.module.params().len();
        if new_params.len() != expected {
            return Err(TensorError::ParamCountMismatch {
                expected,
                actual: new_params.len(),
            });
        }
        let alpha = new_params.remove(0);
        // a [1] or [1, 1] gate would broadcast the output up to its rank
        if !alpha.shape().is_empty() {
            return Err(TensorError::ShapeMismatch {
                op: "update alpha",
                left: self.alpha.shape().clone(),
                right: alpha.shape().clone(),
            });
        }
        self.module.update_params(new_params)?;
        self.alpha = alpha;
        Ok(())
    }
}

#[cfg(test)]
fn doubling() -> impl Module<f64> {
    crate::nn::Lambda::new(|x: RcTensor<f64>| &x + &x)
}

#[test]
fn test_alpha_starts_at_1e_3() {
    let block = ReZero::new(4, doubling());
    assert_eq!(block.alpha().elem(), 1e-3);
    assert!(block.alpha().shape().is_empty());
    assert_eq!(block.embedding_dimension(), 4);

    let block = ReZero::<f32, _>::new(4, crate::nn::Lambda::new(|x: RcTensor<f32>| x));
    assert_eq!(block.alpha().elem(), 1e-3_f32);
}

#[test]
fn test_doubling_scenario() {
    let block = ReZero::new(4, doubling());
    let out = block.forward(RcTensor::from([1.0, 2.0, 3.0, 4.0]));
    let expected = [1.002, 2.004, 3.006, 4.008];
    assert_eq!(out.shape(), &vec![4]);
    for (got, want) in out.iter().zip(expected.iter()) {
        assert!((got - want).abs() < 1e-12, "got={got}, want={want}");
    }
}

#[test]
fn test_zero_gate_is_exact_identity() {
    let block = ReZeroConfig::new(3)
        .with_init_alpha(0.0)
        .init(doubling())
        .unwrap();
    let x = RcTensor::from([[0.1, -7.25, 3.0], [1e-9, 2.5e7, -0.0]]);
    assert_eq!(block.forward(x.clone()), x);
}

#[test]
fn test_forward_does_not_touch_alpha() {
    let block = ReZero::new(2, doubling());
    let before = block.alpha().clone();
    block.forward(RcTensor::from([1.0, 2.0]));
    block.forward(RcTensor::from([3.0, 4.0]));
    assert_eq!(block.alpha(), &before);
    assert!(block.alpha().is_leaf());
}

#[test]
fn test_alpha_gradient_is_sum_of_inner_output() {
    let block = ReZero::new(4, doubling());
    let x = RcTensor::from([1.0, 2.0, 3.0, 4.0]);
    block.forward(x.clone()).sum().backward();
    assert_eq!(block.alpha().grad().elem(), 20.0);
    // d/dx (x + alpha * 2x) = 1 + 2 alpha
    for &g in x.grad().iter() {
        assert!((g - 1.002).abs() < 1e-12);
    }
}

#[test]
fn test_shape_mismatch_comes_from_the_addition() {
    let block = ReZero::new(
        4,
        crate::nn::Lambda::new(|_x: RcTensor<f64>| RcTensor::from([1.0, 2.0, 3.0])),
    );
    match block.try_forward(RcTensor::from([1.0, 2.0, 3.0, 4.0])) {
        Err(TensorError::ShapeMismatch { op: "add", left, right }) => {
            assert_eq!(left, vec![4]);
            assert_eq!(right, vec![3]);
        }
        other => panic!("expected an add shape mismatch, got {other:?}"),
    }
}

#[test]
fn test_inner_errors_propagate() {
    use crate::nn::Linear;

    // inner layer expects 3 features
    let block = ReZero::new(
        3,
        Linear::new(RcTensor::zeros(vec![3, 3]), RcTensor::zeros(vec![1, 3]), None),
    );
    assert!(matches!(
        block.try_forward(RcTensor::from([1.0, 2.0])),
        Err(TensorError::ShapeMismatch { op: "matmul", .. })
    ));
}

#[test]
fn test_params_expose_alpha_and_inner() {
    use crate::nn::Linear;

    let mut block = ReZero::new(
        2,
        Linear::new(RcTensor::ones(vec![2, 2]), RcTensor::zeros(vec![1, 2]), None),
    );
    let names: Vec<_> = block.named_params().into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["alpha", "module.weights", "module.bias"]);

    let new_params = vec![
        RcTensor::scalar(0.5),
        RcTensor::zeros(vec![2, 2]),
        RcTensor::ones(vec![1, 2]),
    ];
    block.update_params(new_params).unwrap();
    assert_eq!(block.alpha().elem(), 0.5);
    // x + 0.5 * (x @ 0 + 1)
    assert_eq!(
        block.forward(RcTensor::from([[1.0, 2.0]])),
        RcTensor::from([[1.5, 2.5]])
    );

    assert!(block.update_params(vec![RcTensor::scalar(0.5)]).is_err());
    assert!(block
        .update_params(vec![
            RcTensor::from([0.5, 0.5]),
            RcTensor::zeros(vec![2, 2]),
            RcTensor::ones(vec![1, 2]),
        ])
        .is_err());
}

#[test]
fn test_gate_must_stay_a_scalar() {
    let mut block = ReZero::new(4, doubling());
    for shape in [vec![1], vec![1, 1]] {
        match block.update_params(vec![RcTensor::new(vec![0.5], shape.clone())]) {
            Err(TensorError::ShapeMismatch { left, right, .. }) => {
                assert!(left.is_empty());
                assert_eq!(right, shape);
            }
            other => panic!("expected a gate shape mismatch, got {other:?}"),
        }
    }
    assert_eq!(block.alpha().elem(), 1e-3);
    let out = block.forward(RcTensor::from([1.0, 2.0, 3.0, 4.0]));
    assert_eq!(out.shape(), &vec![4]);
}

#[test]
fn test_zero_sized_input_passes_through() {
    let block = ReZero::new(0, crate::nn::Lambda::new(|x: RcTensor<f64>| &x * 2.0));
    let x = RcTensor::zeros(vec![3, 0]);
    let out = block.try_forward(x.clone()).unwrap();
    assert_eq!(out.shape(), &vec![3, 0]);
    assert_eq!(out.count(), 0);

    out.sum().backward();
    assert_eq!(block.alpha().grad().elem(), 0.0);
    assert_eq!(x.grad().shape(), &vec![3, 0]);
}

#[test]
fn test_config_round_trips_through_json() {
    let config = ReZeroConfig::new(256).with_init_alpha(0.25);
    let json = serde_json::to_string(&config).unwrap();
    assert_eq!(serde_json::from_str::<ReZeroConfig>(&json).unwrap(), config);

    let defaulted: ReZeroConfig = serde_json::from_str(r#"{"embedding_dimension": 8}"#).unwrap();
    assert_eq!(defaulted, ReZeroConfig::new(8));
}

#[test]
fn test_config_rejects_unrepresentable_alpha() {
    let err = ReZeroConfig::new(1)
        .with_init_alpha(1e6)
        .init(crate::nn::Lambda::new(|x: RcTensor<i8>| x))
        .unwrap_err();
    assert!(matches!(err, TensorError::InvalidInitAlpha(v) if v == 1e6));
}
