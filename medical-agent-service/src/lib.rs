pub mod agents;
pub mod config;
pub mod error;
pub mod format;
pub mod llm;
pub mod loader;
pub mod schema;
pub mod service;

pub use config::{LoaderConfig, ModelConfig, ServiceConfig};
pub use error::{AgentError, LoaderError, UpstreamError};
pub use loader::{DocumentKind, DocumentPayload, SmartLoader};
pub use service::{AppState, build_router, create_app};
