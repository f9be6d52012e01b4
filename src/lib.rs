//! A ReZero gated residual connection (Bachlechner et al., 2020) and the small
//! reverse-mode autograd tensor library it is built on.
//!
//! ```
//! use rezero::nn::{Lambda, Module, ReZero};
//! use rezero::tensor::RcTensor;
//!
//! let block = ReZero::new(4, Lambda::new(|x: RcTensor<f64>| &x + &x));
//! let out = block.forward(RcTensor::from([1.0, 2.0, 3.0, 4.0]));
//! assert_eq!(out.shape(), &vec![4]);
//! ```
pub mod nn;
pub mod optim;
pub mod tensor;
