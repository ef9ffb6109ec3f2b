// Error types module

use std::fmt;

/// Centralized error type for the gateway session core.
///
/// Categorizes the failure conditions a proxied exchange can hit, for
/// consistent HTTP status mapping and monitoring:
/// - Config: configuration load/validation errors
/// - RoutingMiss: no route resolved for the requested host
/// - UpstreamFailed: upstream error with no remaining targets to try
/// - LengthRequired: upstream demanded a Content-Length we cannot supply
/// - AcceptRequestTooLarge: request buffering was abandoned before a
///   GRIP instruct arrived, making the handoff impossible
/// - AcceptResponseTooLarge: GRIP instruct body exceeded its cap
/// - RequestStreamFailed: the primary shared request stream errored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Configuration errors (invalid YAML, inconsistent signing params)
    Config {
        message: String,
        context: Option<String>,
    },

    /// No route exists for the requested host/path
    RoutingMiss { host: String },

    /// Upstream request failed and the targets list is exhausted
    UpstreamFailed,

    /// Upstream refused a request without Content-Length
    LengthRequired,

    /// Request body exceeded the accept cap before the instruct arrived
    AcceptRequestTooLarge,

    /// GRIP instruct response body exceeded the accept cap
    AcceptResponseTooLarge,

    /// Reading the primary client's request stream failed
    RequestStreamFailed,
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Config { message, context } => {
                write!(f, "Configuration error: {}", message)?;
                if let Some(ctx) = context {
                    write!(f, " ({})", ctx)?;
                }
                Ok(())
            }
            _ => write!(f, "{}: {}", self.reason(), self.message()),
        }
    }
}

impl std::error::Error for GatewayError {}

impl GatewayError {
    /// HTTP status code delivered to clients for this error
    pub fn to_http_status(&self) -> u16 {
        match self {
            GatewayError::Config { .. } => 500,
            GatewayError::RoutingMiss { .. } => 502,
            GatewayError::UpstreamFailed => 502,
            GatewayError::LengthRequired => 411,
            GatewayError::AcceptRequestTooLarge => 502,
            GatewayError::AcceptResponseTooLarge => 502,
            GatewayError::RequestStreamFailed => 500,
        }
    }

    /// HTTP reason phrase accompanying the status code
    pub fn reason(&self) -> &'static str {
        match self {
            GatewayError::Config { .. } => "Internal Server Error",
            GatewayError::RoutingMiss { .. } => "Bad Gateway",
            GatewayError::UpstreamFailed => "Bad Gateway",
            GatewayError::LengthRequired => "Length Required",
            GatewayError::AcceptRequestTooLarge => "Bad Gateway",
            GatewayError::AcceptResponseTooLarge => "Bad Gateway",
            GatewayError::RequestStreamFailed => "Internal Server Error",
        }
    }

    /// Human-readable message for the error page body
    pub fn message(&self) -> String {
        match self {
            GatewayError::Config { message, .. } => message.clone(),
            GatewayError::RoutingMiss { host } => {
                format!("No route for host: {}", host)
            }
            GatewayError::UpstreamFailed => "Error while proxying to origin.".to_string(),
            GatewayError::LengthRequired => "Must provide Content-Length header.".to_string(),
            GatewayError::AcceptRequestTooLarge => {
                "Request too large to accept GRIP instruct.".to_string()
            }
            GatewayError::AcceptResponseTooLarge => {
                "GRIP instruct response too large.".to_string()
            }
            GatewayError::RequestStreamFailed => "Primary shared request failed.".to_string(),
        }
    }

    /// Convert error to a compact JSON response string
    ///
    /// Fields:
    /// - error: error category slug
    /// - message: human-readable message
    /// - status: HTTP status code
    /// - request_id: optional request ID for tracing
    pub fn to_json_response(&self, request_id: Option<String>) -> String {
        use serde_json::json;

        let error_type = match self {
            GatewayError::Config { .. } => "config",
            GatewayError::RoutingMiss { .. } => "routing",
            GatewayError::UpstreamFailed
            | GatewayError::LengthRequired
            | GatewayError::AcceptRequestTooLarge
            | GatewayError::AcceptResponseTooLarge => "upstream",
            GatewayError::RequestStreamFailed => "internal",
        };

        let mut response = json!({
            "error": error_type,
            "message": self.message(),
            "status": self.to_http_status(),
        });

        if let Some(id) = request_id {
            response["request_id"] = json!(id);
        }

        response.to_string()
    }

    /// Create a Config error
    pub fn config(message: impl Into<String>) -> Self {
        GatewayError::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Create a Config error with context
    pub fn config_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        GatewayError::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }
}
