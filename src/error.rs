//! Error types for the configuration model and the tool boundary.
//!
//! [`ModelError`] is raised by the pure model and the store; every variant
//! belongs to one [`ErrorKind`]. [`ToolError`] is the structured shape
//! returned to MCP and HTTP callers.

use serde::Serialize;
use std::fmt;

/// Broad error category, used for HTTP status mapping and by callers that
/// only care whether a request was malformed, dangling or out of sequence.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed input.
    Validation,
    /// A reference to another entity is broken or still held.
    Reference,
    /// The operation is not allowed in the entity's current state.
    State,
    NotFound,
    Internal,
}

/// Entity named in not-found and in-use errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Template,
    Version,
    GlobalConfig,
    Module,
    ModuleConfig,
    Compilation,
    Customer,
    Environment,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Template => "template",
            Entity::Version => "template version",
            Entity::GlobalConfig => "global config",
            Entity::Module => "module",
            Entity::ModuleConfig => "module config",
            Entity::Compilation => "compilation",
            Entity::Customer => "customer",
            Entity::Environment => "environment",
        };
        f.write_str(name)
    }
}

/// Errors raised by model operations. All are recoverable per operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("{0} is required")]
    MissingField(String),

    #[error("invalid {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("version '{0}' does not start with numeric major.minor.patch components")]
    InvalidVersion(String),

    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: Entity, id: String },

    #[error("module config {config_id} is {mapping}-mapped and does not take overrides")]
    NotOverridable {
        config_id: String,
        mapping: &'static str,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    #[error("module config {config_id} maps to missing global config {global_id}")]
    DanglingReference { config_id: String, global_id: String },

    #[error("override key {key} does not name a config of version {version_id}")]
    UnknownOverrideTarget { key: String, version_id: String },

    #[error("{entity} {id} is still referenced by {count} {holder}")]
    InUse {
        entity: Entity,
        id: String,
        count: usize,
        holder: &'static str,
    },

    #[error("template {template_id} has only one version left")]
    LastVersion { template_id: String },

    #[error("template {template_id} already has a root version")]
    RootExists { template_id: String },

    #[error("version {version_id} has no base version to merge into")]
    NoBaseVersion { version_id: String },

    #[error("version {version_id} is deprecated and cannot take new compilations")]
    Deprecated { version_id: String },

    #[error("a build is already running for compilation {compilation_id}")]
    BuildInFlight { compilation_id: String },
}

impl ModelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::MissingField(_)
            | ModelError::InvalidValue { .. }
            | ModelError::InvalidVersion(_)
            | ModelError::AlreadyExists { .. }
            | ModelError::NotOverridable { .. } => ErrorKind::Validation,
            ModelError::NotFound { .. } => ErrorKind::NotFound,
            ModelError::DanglingReference { .. }
            | ModelError::UnknownOverrideTarget { .. }
            | ModelError::InUse { .. } => ErrorKind::Reference,
            ModelError::LastVersion { .. }
            | ModelError::RootExists { .. }
            | ModelError::NoBaseVersion { .. }
            | ModelError::Deprecated { .. }
            | ModelError::BuildInFlight { .. } => ErrorKind::State,
        }
    }

    pub fn not_found(entity: Entity, id: impl Into<String>) -> Self {
        ModelError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    MissingRequiredField,
    InvalidFieldValue,
    InvalidVersion,
    AlreadyExists,
    NotOverridable,

    // Not found errors
    TemplateNotFound,
    VersionNotFound,
    ConfigNotFound,
    ModuleNotFound,
    CompilationNotFound,
    CustomerNotFound,
    EnvironmentNotFound,

    // Reference errors
    DanglingReference,
    UnknownOverrideTarget,
    InUse,

    // State errors
    LastVersion,
    InvalidState,
    NoBaseVersion,
    VersionDeprecated,
    BuildInFlight,

    // Internal errors
    DatabaseError,
    InternalError,
    UnknownTool,
}

impl ErrorCode {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorCode::MissingRequiredField
            | ErrorCode::InvalidFieldValue
            | ErrorCode::InvalidVersion
            | ErrorCode::AlreadyExists
            | ErrorCode::NotOverridable
            | ErrorCode::UnknownTool => ErrorKind::Validation,
            ErrorCode::TemplateNotFound
            | ErrorCode::VersionNotFound
            | ErrorCode::ConfigNotFound
            | ErrorCode::ModuleNotFound
            | ErrorCode::CompilationNotFound
            | ErrorCode::CustomerNotFound
            | ErrorCode::EnvironmentNotFound => ErrorKind::NotFound,
            ErrorCode::DanglingReference | ErrorCode::UnknownOverrideTarget | ErrorCode::InUse => {
                ErrorKind::Reference
            }
            ErrorCode::LastVersion
            | ErrorCode::InvalidState
            | ErrorCode::NoBaseVersion
            | ErrorCode::VersionDeprecated
            | ErrorCode::BuildInFlight => ErrorKind::State,
            ErrorCode::DatabaseError | ErrorCode::InternalError => ErrorKind::Internal,
        }
    }
}

/// Structured error for tool and HTTP responses.
#[derive(Debug, Serialize)]
pub struct ToolError {
    pub code: ErrorCode,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ToolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            kind: code.kind(),
            message: message.into(),
            field: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("{} is required", field),
        )
        .with_field(field)
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::new(ErrorCode::InvalidFieldValue, reason).with_field(field)
    }

    pub fn database(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::DatabaseError, err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ErrorCode::UnknownTool, format!("Unknown tool: {}", name))
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ToolError {}

impl From<ModelError> for ToolError {
    fn from(err: ModelError) -> Self {
        let message = err.to_string();
        match err {
            ModelError::MissingField(field) => {
                ToolError::new(ErrorCode::MissingRequiredField, message).with_field(field)
            }
            ModelError::InvalidValue { field, .. } => {
                ToolError::new(ErrorCode::InvalidFieldValue, message).with_field(field)
            }
            ModelError::InvalidVersion(_) => ToolError::new(ErrorCode::InvalidVersion, message),
            ModelError::AlreadyExists { .. } => ToolError::new(ErrorCode::AlreadyExists, message),
            ModelError::NotOverridable { config_id, .. } => {
                ToolError::new(ErrorCode::NotOverridable, message).with_details(config_id)
            }
            ModelError::NotFound { entity, .. } => {
                let code = match entity {
                    Entity::Template => ErrorCode::TemplateNotFound,
                    Entity::Version => ErrorCode::VersionNotFound,
                    Entity::GlobalConfig | Entity::ModuleConfig => ErrorCode::ConfigNotFound,
                    Entity::Module => ErrorCode::ModuleNotFound,
                    Entity::Compilation => ErrorCode::CompilationNotFound,
                    Entity::Customer => ErrorCode::CustomerNotFound,
                    Entity::Environment => ErrorCode::EnvironmentNotFound,
                };
                ToolError::new(code, message)
            }
            ModelError::DanglingReference { global_id, .. } => {
                ToolError::new(ErrorCode::DanglingReference, message).with_details(global_id)
            }
            ModelError::UnknownOverrideTarget { key, .. } => {
                ToolError::new(ErrorCode::UnknownOverrideTarget, message).with_details(key)
            }
            ModelError::InUse { count, .. } => {
                ToolError::new(ErrorCode::InUse, message).with_details(format!("usage={}", count))
            }
            ModelError::LastVersion { .. } => ToolError::new(ErrorCode::LastVersion, message),
            ModelError::RootExists { .. } => ToolError::new(ErrorCode::InvalidState, message),
            ModelError::NoBaseVersion { .. } => ToolError::new(ErrorCode::NoBaseVersion, message),
            ModelError::Deprecated { .. } => ToolError::new(ErrorCode::VersionDeprecated, message),
            ModelError::BuildInFlight { .. } => ToolError::new(ErrorCode::BuildInFlight, message),
        }
    }
}

// Allow using ? with anyhow errors by converting them
impl From<anyhow::Error> for ToolError {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<ToolError>() {
            Ok(tool_err) => return tool_err,
            Err(err) => err,
        };
        let err = match err.downcast::<ModelError>() {
            Ok(model_err) => return model_err.into(),
            Err(err) => err,
        };
        match err.downcast::<rusqlite::Error>() {
            Ok(db_err) => ToolError::database(db_err),
            Err(err) => ToolError::internal(err),
        }
    }
}

/// Result type for tool operations.
pub type ToolResult<T> = std::result::Result<T, ToolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_errors_fall_into_taxonomy() {
        assert_eq!(
            ModelError::MissingField("name".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ModelError::DanglingReference {
                config_id: "c".into(),
                global_id: "g".into()
            }
            .kind(),
            ErrorKind::Reference
        );
        assert_eq!(
            ModelError::LastVersion {
                template_id: "t".into()
            }
            .kind(),
            ErrorKind::State
        );
        assert_eq!(
            ModelError::not_found(Entity::Version, "v").kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn anyhow_wrapped_model_error_keeps_its_code() {
        let err = anyhow::Error::new(ModelError::InUse {
            entity: Entity::GlobalConfig,
            id: "g1".into(),
            count: 2,
            holder: "module configs",
        });

        let tool_err: ToolError = err.into();
        assert_eq!(tool_err.code, ErrorCode::InUse);
        assert_eq!(tool_err.kind, ErrorKind::Reference);
        assert_eq!(tool_err.details.as_deref(), Some("usage=2"));
    }

    #[test]
    fn tool_error_serialises_codes_in_screaming_case() {
        let err = ToolError::missing_field("name");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "MISSING_REQUIRED_FIELD");
        assert_eq!(json["kind"], "validation");
        assert_eq!(json["field"], "name");
    }
}
