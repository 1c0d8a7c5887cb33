//! Model client abstraction
//!
//! Agents reach a language model only through [`ChatModel`]. Provider wire
//! formats live outside this crate.

mod model;
mod retry;
mod types;

pub use model::ChatModel;
pub use retry::{RetryPolicy, RetryingModel};
pub use types::*;
