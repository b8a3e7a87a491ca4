pub mod detect;
pub mod execute;
pub mod registry;
pub mod types;

pub use detect::ToolDetector;
pub use execute::{ToolExecutor, ToolOutcome};
pub use registry::{SqliteToolRegistry, ToolRegistry};
pub use types::{AuthDescriptor, ParamValue, ParameterSpec, ToolDefinition, ToolInvocation};
