use thiserror::Error;

pub type Result<T> = std::result::Result<T, TensorError>;

/// Everything that can go wrong in tensor arithmetic, parameter plumbing and
/// state dict handling.
#[derive(Error, Debug)]
pub enum TensorError {
    #[error("shapes {left:?} and {right:?} are not compatible for {op}")]
    ShapeMismatch {
        op: &'static str,
        left: Vec<usize>,
        right: Vec<usize>,
    },

    #[error("shape {shape:?} holds {expected} elements but {actual} were given")]
    LengthMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("index {index:?} is out of bounds for shape {shape:?}")]
    IndexOutOfBounds { index: Vec<usize>, shape: Vec<usize> },

    #[error("expected {expected} parameters but got {actual}")]
    ParamCountMismatch { expected: usize, actual: usize },

    #[error("no parameter named `{0}`")]
    MissingParameter(String),

    #[error("step size must be positive, got {0}")]
    InvalidStepSize(String),

    #[error("initial gate value {0} is not representable in the element type")]
    InvalidInitAlpha(f64),

    #[error("value {0} is not representable in the target type")]
    NotRepresentable(String),

    #[error("state dict serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
