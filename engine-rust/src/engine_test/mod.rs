//! A scriptable engine for tests and examples.

mod model;

pub use model::{MockEngine, MockGenerateResult, MockStreamResult};
