pub mod apply;
pub mod backend;
pub mod hasher;
pub mod plan;

pub use apply::{apply, Adapter, ApplyEmitter, ApplyResult, NullEmitter};
pub use backend::{LockGuard, StateBackend};
pub use hasher::hash_resource;
pub use plan::{compute_plan, detect_drift, format_json, format_text, Drift, DriftKind, DriftedResource, Plan};
