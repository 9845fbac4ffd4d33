//! A small CPU neural-network runtime.
//!
//! Enough to build, train and run the character CNN: layers carry an
//! explicit backward pass, parameters keep their gradients next to their
//! values, and [`Sequential`] chains layers with shape checking.
//!
//! - **Layers**: [`Embedding`], [`Conv1d`], [`Dense`], [`Flatten`]
//! - **Pooling**: [`MaxPool1d`]
//! - **Activations**: [`ReLU`], [`Softmax`]
//! - **Regularization**: [`Dropout`]
//! - **Training**: [`CategoricalCrossentropy`], [`Adam`]
//!
//! Batched activations are channels-last: `(batch, length, channels)` for
//! sequences and `(batch, features)` for vectors.
//!
//! # References
//!
//! - Glorot, X., & Bengio, Y. (2010). Understanding the difficulty of training
//!   deep feedforward neural networks. AISTATS.
//! - Kingma, D. P., & Ba, J. (2015). Adam: A method for stochastic optimization. ICLR.

mod activation;
mod container;
mod conv;
mod dropout;
mod embedding;
pub mod init;
mod layer;
mod linear;
pub mod loss;
pub mod optim;
mod tensor;

pub use activation::{ReLU, Softmax};
pub use container::Sequential;
pub use conv::{Conv1d, Flatten, MaxPool1d};
pub use dropout::Dropout;
pub use embedding::Embedding;
pub use layer::{Layer, Param};
pub use linear::Dense;
pub use loss::{categorical_accuracy, CategoricalCrossentropy};
pub use optim::{Adam, Optimizer};
pub use tensor::Tensor;
