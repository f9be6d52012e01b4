use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::nn::Module;
use crate::tensor::{cast, widen, Numeric, RcTensor, Result, TensorError, TensorList};

/// A parameter's shape and data, widened to `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorRecord {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl TensorRecord {
    pub fn from_tensor<T: Numeric>(tensor: &RcTensor<T>) -> Result<Self> {
        Ok(TensorRecord {
            shape: tensor.shape().clone(),
            data: tensor.iter().map(|&x| widen(x)).collect::<Result<_>>()?,
        })
    }

    pub fn to_tensor<T: Numeric>(&self) -> Result<RcTensor<T>> {
        let array = self.data.iter().map(|&x| cast(x)).collect::<Result<_>>()?;
        RcTensor::try_new(array, self.shape.clone())
    }
}

/// Snapshot of a module's parameters keyed by their dotted names.
///
/// ```
/// use rezero::nn::{Lambda, ReZero, StateDict};
/// use rezero::tensor::RcTensor;
///
/// let block = ReZero::new(2, Lambda::new(|x: RcTensor<f64>| x));
/// let json = StateDict::from_module(&block).unwrap().to_json().unwrap();
///
/// let mut restored = ReZero::new(2, Lambda::new(|x: RcTensor<f64>| x));
/// StateDict::from_json(&json).unwrap().load_into(&mut restored).unwrap();
/// assert_eq!(restored.alpha(), block.alpha());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDict {
    tensors: BTreeMap<String, TensorRecord>,
}

impl StateDict {
    pub fn from_module<T: Numeric, M: Module<T> + ?Sized>(module: &M) -> Result<Self> {
        let mut state_dict = StateDict::default();
        for (name, param) in module.named_params() {
            state_dict.insert(name, TensorRecord::from_tensor(&param)?);
        }
        Ok(state_dict)
    }

    pub fn insert(&mut self, name: String, record: TensorRecord) -> Option<TensorRecord> {
        self.tensors.insert(name, record)
    }

    pub fn get(&self, name: &str) -> Option<&TensorRecord> {
        self.tensors.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Replaces every parameter of `module` with the entry of the same name.
    /// Entries the module does not have are ignored.
    pub fn load_into<T: Numeric, M: Module<T> + ?Sized>(&self, module: &mut M) -> Result<()> {
        let new_params = module
            .named_params()
            .into_iter()
            .map(|(name, param)| {
                let record = self
                    .get(&name)
                    .ok_or_else(|| TensorError::MissingParameter(name.clone()))?;
                if &record.shape != param.shape() {
                    return Err(TensorError::ShapeMismatch {
                        op: "load_state_dict",
                        left: param.shape().clone(),
                        right: record.shape.clone(),
                    });
                }
                record.to_tensor()
            })
            .collect::<Result<TensorList<T>>>()?;
        debug!(params = new_params.len(), "loading state dict");
        module.update_params(new_params)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
fn small_block() -> crate::nn::ReZero<f64, crate::nn::Linear<f64>> {
    use crate::nn::{Linear, ReZero};

    ReZero::new(
        2,
        Linear::new(
            RcTensor::from([[1.0, -2.0], [0.5, 0.25]]),
            RcTensor::from([[0.1, 0.2]]),
            None,
        ),
    )
}

#[test]
fn test_state_dict_names_and_values() {
    let state_dict = StateDict::from_module(&small_block()).unwrap();
    assert_eq!(
        state_dict.names().collect::<Vec<_>>(),
        vec!["alpha", "module.bias", "module.weights"]
    );
    assert_eq!(
        state_dict.get("alpha"),
        Some(&TensorRecord {
            shape: vec![],
            data: vec![1e-3]
        })
    );
}

#[test]
fn test_state_dict_json_round_trip_restores_module() {
    let source = small_block();
    let json = StateDict::from_module(&source).unwrap().to_json().unwrap();

    let mut target = crate::nn::ReZero::new(
        2,
        crate::nn::Linear::new(RcTensor::zeros(vec![2, 2]), RcTensor::zeros(vec![1, 2]), None),
    );
    StateDict::from_json(&json)
        .unwrap()
        .load_into(&mut target)
        .unwrap();
    assert_eq!(target.params(), source.params());
}

#[test]
fn test_load_reports_missing_and_misshaped_params() {
    let mut state_dict = StateDict::from_module(&small_block()).unwrap();
    let mut block = small_block();

    state_dict.insert(
        "module.bias".to_string(),
        TensorRecord {
            shape: vec![2],
            data: vec![0.0, 0.0],
        },
    );
    assert!(matches!(
        state_dict.load_into(&mut block),
        Err(TensorError::ShapeMismatch {
            op: "load_state_dict",
            ..
        })
    ));

    let empty = StateDict::default();
    match empty.load_into(&mut block) {
        Err(TensorError::MissingParameter(name)) => assert_eq!(name, "alpha"),
        other => panic!("expected a missing parameter, got {other:?}"),
    }
}

#[test]
fn test_from_json_rejects_garbage() {
    assert!(matches!(
        StateDict::from_json("{not json"),
        Err(TensorError::Serialization(_))
    ));
}
