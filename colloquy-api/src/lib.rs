//! COLLOQUY API - HTTP Surface
//!
//! Axum routes over the decision engine and the persistence layer:
//! - `POST /collaborate` - run a pipeline against a new or existing thread
//! - `POST /follow-up` - continue an existing thread
//! - `POST /meta-question` - answer questions about the stored history
//! - `GET /threads/{id}/agent-outputs`, `GET /threads/{id}/stats`,
//!   `GET /turns/{id}`, `GET /stats`, `GET /health` - read paths

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod types;

pub use config::{ApiConfig, StorageBackend};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::api_router;
pub use state::AppState;
