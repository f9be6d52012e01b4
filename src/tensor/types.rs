use crate::tensor::RcTensor;

// These are all aliases that should probably be converted to traits/structs at somepoint
// However they exist now for the sake of readability.
pub type TensorList<T> = Vec<RcTensor<T>>;

/// Parameters paired with their dotted path in the module tree, e.g. `module.layers.0.bias`.
pub type NamedTensorList<T> = Vec<(String, RcTensor<T>)>;

/// A tensor of shape `[]`.
pub type Scalar<T> = RcTensor<T>;
