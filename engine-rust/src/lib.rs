mod accumulator;
mod engine;
pub mod engine_test;
mod errors;
mod types;
mod types_ext;

pub use accumulator::ReplyAccumulator;
pub use engine::{EngineMetadata, EngineStream, GenerationEngine};
pub use errors::*;
pub use types::*;
