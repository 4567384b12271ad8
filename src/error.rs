//! Execution errors and the client-facing error envelope.

use crate::auth::AuthError;
use crate::transport::TransportError;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Errors from one execution.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("connectorKey is required")]
    MissingConnectorKey,

    #[error("Mapping with ID or Name '{0}' not found")]
    MappingNotFound(String),

    #[error("Invalid mapping configuration for: {0}")]
    InvalidMapping(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The target answered with a non-success status and no error mapping applied
    #[error("API Execution failed: target responded with status {status}")]
    TargetApi { status: u16, body: JsonValue },

    /// The target could not be reached
    #[error("API Execution failed: {0}")]
    Transport(String),

    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl From<TransportError> for ConnectorError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Status { status, body } => ConnectorError::TargetApi { status, body },
            TransportError::Network(message) => ConnectorError::Transport(message),
        }
    }
}

/// Error class reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ClientError,
    AuthenticationError,
    TargetApiError,
    InternalError,
}

impl ConnectorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectorError::MissingConnectorKey
            | ConnectorError::MappingNotFound(_)
            | ConnectorError::InvalidMapping(_) => ErrorKind::ClientError,
            ConnectorError::Auth(e) if e.is_configuration() => ErrorKind::ClientError,
            ConnectorError::Auth(_) => ErrorKind::AuthenticationError,
            ConnectorError::TargetApi { .. } | ConnectorError::Transport(_) => {
                ErrorKind::TargetApiError
            }
            ConnectorError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// HTTP-style status for the envelope.
    pub fn status_code(&self) -> u16 {
        match self {
            ConnectorError::MissingConnectorKey
            | ConnectorError::MappingNotFound(_)
            | ConnectorError::InvalidMapping(_) => 400,
            ConnectorError::Auth(e) if e.is_configuration() => 400,
            ConnectorError::Auth(_) => 401,
            ConnectorError::TargetApi { status, .. } => *status,
            ConnectorError::Transport(_) => 502,
            ConnectorError::Internal(_) => 500,
        }
    }

    /// Client-facing envelope; target errors carry the target's error body.
    pub fn envelope(&self) -> ErrorEnvelope {
        let message = match self {
            ConnectorError::Internal(_) => "An unexpected internal error occurred".to_string(),
            other => other.to_string(),
        };
        let target_response = match self {
            ConnectorError::TargetApi { body, .. } if !body.is_null() => Some(body.clone()),
            _ => None,
        };
        ErrorEnvelope {
            success: false,
            status_code: self.status_code(),
            error_type: self.kind(),
            message,
            target_response,
        }
    }
}

/// `{ success: false, statusCode, errorType, message, targetResponse? }`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub success: bool,
    pub status_code: u16,
    pub error_type: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_response: Option<JsonValue>,
}

/// Errors building an engine from configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthType;
    use serde_json::json;

    #[test]
    fn test_kinds_and_status_codes() {
        let cases = [
            (ConnectorError::MissingConnectorKey, ErrorKind::ClientError, 400),
            (ConnectorError::MappingNotFound("x".into()), ErrorKind::ClientError, 400),
            (ConnectorError::InvalidMapping("x".into()), ErrorKind::ClientError, 400),
            (
                ConnectorError::Auth(AuthError::Mismatch {
                    incoming: AuthType::Basic,
                    required: AuthType::OAuth2,
                }),
                ErrorKind::ClientError,
                400,
            ),
            (
                ConnectorError::Auth(AuthError::TokenGeneration("boom".into())),
                ErrorKind::AuthenticationError,
                401,
            ),
            (
                ConnectorError::TargetApi { status: 503, body: JsonValue::Null },
                ErrorKind::TargetApiError,
                503,
            ),
            (ConnectorError::Transport("refused".into()), ErrorKind::TargetApiError, 502),
            (ConnectorError::Internal("x".into()), ErrorKind::InternalError, 500),
        ];

        for (error, kind, status) in cases {
            assert_eq!(error.kind(), kind, "{error}");
            assert_eq!(error.status_code(), status, "{error}");
        }
    }

    #[test]
    fn test_mapping_not_found_message() {
        let error = ConnectorError::MappingNotFound("orders".into());
        assert_eq!(error.to_string(), "Mapping with ID or Name 'orders' not found");
    }

    #[test]
    fn test_target_envelope() {
        let error: ConnectorError = TransportError::Status {
            status: 422,
            body: json!({"error": {"code": "E1"}}),
        }
        .into();

        let envelope = serde_json::to_value(error.envelope()).unwrap();
        assert_eq!(envelope["success"], false);
        assert_eq!(envelope["statusCode"], 422);
        assert_eq!(envelope["errorType"], "TARGET_API_ERROR");
        assert_eq!(envelope["targetResponse"], json!({"error": {"code": "E1"}}));
    }

    #[test]
    fn test_internal_envelope_hides_detail() {
        let envelope = ConnectorError::Internal("db password wrong".into()).envelope();
        assert_eq!(envelope.message, "An unexpected internal error occurred");
        assert_eq!(envelope.target_response, None);

        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("targetResponse").is_none());
        assert_eq!(json["errorType"], "INTERNAL_ERROR");
    }
}
