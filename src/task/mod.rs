pub mod runner;
pub mod transform;

pub use runner::*;
pub use transform::{fallible, infallible, TransformError, TransformFn};
