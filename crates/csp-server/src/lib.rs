//! # csp-server
//!
//! HTTP service that ingests browser Content-Security-Policy violation reports,
//! classifies them, records them in an audit log and serves them back.
//!
//! Built on axum. Request flow for a report:
//! rate limit → normalize → classify → append.
//!
//! ## Example
//!
//! ```rust,no_run
//! use csp_server::{CspServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), csp_server::ServerError> {
//!     let config = ServerConfig::default();
//!     let server = CspServer::new(config.clone())?;
//!     server.serve(config.bind_addr).await
//! }
//! ```
//!
//! ## API Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/security/csp-report` | POST | Ingest a violation report (204) |
//! | `/security/csp-violations` | GET | Recent violations; `type`, `since`, `until`, `severity`, `limit` |
//! | `/health` | GET | Liveness, exempt from rate limiting |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

// Re-export main types
pub use config::{AuditConfig, CspConfig, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use handlers::{HealthResponse, ViolationQuery, ViolationsResponse};
pub use middleware::SourceKey;
pub use routes::{HEALTH_PATH, REPORT_PATH, VIOLATIONS_PATH, create_router};
pub use server::{CspServer, MaintenanceReport, run_maintenance, shutdown_on, spawn_maintenance};
pub use state::AppState;
