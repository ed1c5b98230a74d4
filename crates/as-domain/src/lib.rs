pub mod capability;
pub mod config;
pub mod error;
pub mod id;
pub mod invocation;
pub mod resource;
pub mod stream;
pub mod tool;
pub mod trace;

pub use error::{Error, Result};
pub use id::new_id;
pub use invocation::{Invocation, InvocationResponse, TokenUsage, ToolCallRecord};
