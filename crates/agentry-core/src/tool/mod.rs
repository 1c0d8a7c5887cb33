//! Tool system
//!
//! Tools are named async capabilities with a JSON input schema. The
//! [`ToolRegistry`] holds the instances the orchestrator and agents call;
//! the [`ToolFactoryRegistry`] turns type tags into fresh instances.

pub mod definition;
pub mod factory;
pub mod registry;
pub mod traits;

pub use definition::{SchemaBuilder, ToolDefinition};
pub use factory::{merge_parameters, ToolConstructor, ToolFactoryRegistry};
pub use registry::{ToolRegistration, ToolRegistry};
pub use traits::{Tool, ToolResult};
