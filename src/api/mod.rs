//! REST surface.
//!
//! Enabled with `--http` or `server.http.enabled`. Runs beside the MCP
//! stdio server and shares its database and build registry.

mod error;
mod server;

pub use error::{ApiError, ApiResult};
pub use server::{ApiServer, build_router, start_server};
