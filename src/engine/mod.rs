// src/engine/mod.rs

//! Task pipeline engine.
//!
//! - [`stack`]: the explicit LIFO of entered stages and the unwind loop.
//! - [`pipeline`]: resolution of task entries into stages and the
//!   enter-then-unwind run.
//!
//! Stage control flow is strictly sequential. Concurrency lives inside
//! individual stages (cluster broadcasts), never between stages.

pub mod pipeline;
pub mod stack;

pub use pipeline::{Pipeline, PipelineReport};
pub use stack::{Stage, StageStack, Unwound};
