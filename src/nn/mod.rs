mod feed_forward;
mod lambda;
mod linear;
pub mod module;
mod rezero;
mod state_dict;

pub use feed_forward::Mlp;
pub use lambda::Lambda;
pub use linear::Linear;
pub use module::Module;
pub use rezero::{ReZero, ReZeroConfig, DEFAULT_INIT_ALPHA};
pub use state_dict::{StateDict, TensorRecord};
