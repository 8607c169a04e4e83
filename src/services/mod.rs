pub mod export_service;
pub mod ingest_service;
pub mod project_service;
pub mod query_service;

pub use export_service::*;
pub use ingest_service::*;
pub use project_service::*;
pub use query_service::*;
