//! HTTP rendering of [`ToolError`].

use crate::error::{ErrorCode, ErrorKind, ModelError, ToolError};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Error returned by REST handlers.
#[derive(Debug)]
pub struct ApiError(pub ToolError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind {
            ErrorKind::Validation => match self.0.code {
                ErrorCode::AlreadyExists | ErrorCode::NotOverridable => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                _ => StatusCode::BAD_REQUEST,
            },
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Reference | ErrorKind::State => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError(err.into())
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        ApiError(err.into())
    }
}

impl From<ToolError> for ApiError {
    fn from(err: ToolError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = ?self.0.code, error = %self.0.message, "Request failed");
        } else {
            tracing::debug!(code = ?self.0.code, error = %self.0.message, "Request rejected");
        }
        (status, Json(self.0)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Entity;

    fn status_of(err: ModelError) -> StatusCode {
        ApiError::from(anyhow::Error::new(err)).status()
    }

    #[test]
    fn error_kinds_map_to_statuses() {
        assert_eq!(
            status_of(ModelError::MissingField("name".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ModelError::AlreadyExists {
                entity: Entity::Version,
                id: "1.0.0".into()
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(ModelError::not_found(Entity::Template, "t")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ModelError::InUse {
                entity: Entity::GlobalConfig,
                id: "g".into(),
                count: 1,
                holder: "module configs"
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ModelError::LastVersion {
                template_id: "t".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(anyhow::anyhow!("disk on fire")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
