#![recursion_limit = "256"]

pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod logging;
pub mod model;
pub mod training;

pub use error::MnistError;

#[cfg(test)]
pub(crate) type TestBackend = burn::backend::NdArray<f32>;

#[cfg(test)]
pub(crate) type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;
