//! Per-request context passed to tool functions.

use crate::logging::Logger;

/// Per-request context. The logger is named after the tool being called and
/// reaches the MCP client when one is connected.
#[derive(Clone, Default)]
pub struct ToolContext {
    pub logger: Logger,
}

impl ToolContext {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}
