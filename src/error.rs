use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        ws::rejection::WebSocketUpgradeRejection,
        Request, State,
    },
    http::{StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::{config::Config, models::now_rfc3339};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Validation {
        message: String,
        code: Option<&'static str>,
    },
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), code: None }
    }

    pub fn validation_code(message: impl Into<String>, code: &'static str) -> Self {
        Self::Validation { message: message.into(), code: Some(code) }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Validation { code, .. } => *code,
            Self::Auth(_) => Some("unauthorized"),
            Self::Forbidden(_) => Some("forbidden"),
            Self::NotFound(_) => Some("not_found"),
            Self::MethodNotAllowed => Some("method_not_allowed"),
            Self::Internal(_) => None,
        }
    }

    /// Message safe to show a client. Internal errors never leak their cause.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "Something went wrong".to_owned(),
            other => other.to_string(),
        }
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::Internal(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(sqlx::Error);
apperr_impl!(serde_json::Error);
apperr_impl!(axum::Error);
apperr_impl!(uuid::Error);
apperr_impl!(tokio::task::JoinError);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation_code(rejection.body_text(), "invalid_body")
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::validation_code(rejection.body_text(), "invalid_path")
    }
}

impl From<WebSocketUpgradeRejection> for AppError {
    fn from(rejection: WebSocketUpgradeRejection) -> Self {
        Self::validation_code(rejection.body_text(), "upgrade_required")
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation_code(rejection.body_text(), "invalid_query")
    }
}

/// Attached to every error response so [`shape_errors`] can rebuild the body
/// with request context.
#[derive(Debug, Clone)]
pub(crate) struct ErrorReport {
    status: StatusCode,
    message: String,
    code: Option<&'static str>,
    stack: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    status: u16,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack: Option<&'a str>,
}

impl AppError {
    fn report(&self) -> ErrorReport {
        ErrorReport {
            status: self.status(),
            message: self.public_message(),
            code: self.code(),
            stack: match self {
                Self::Internal(err) => Some(format!("{err:?}")),
                _ => None,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let report = self.report();

        let body = ErrorBody {
            status: report.status.as_u16(),
            message: &report.message,
            code: report.code,
            path: None,
            timestamp: None,
            stack: None,
        };
        let mut res = (report.status, Json(body)).into_response();
        res.extensions_mut().insert(report);
        res
    }
}

/// Terminal error stage: every [`AppError`] that reaches the edge is logged
/// and re-rendered with the request path and a timestamp. Bare 405s from the
/// router are rendered the same way.
pub async fn shape_errors(State(config): State<Arc<Config>>, req: Request, next: Next) -> Response {
    let path = redacted_path(req.uri());

    let mut res = next.run(req).await;
    let report = match res.extensions_mut().remove::<ErrorReport>() {
        Some(report) => report,
        None if res.status() == StatusCode::METHOD_NOT_ALLOWED => AppError::MethodNotAllowed.report(),
        None => return res,
    };

    if report.status.is_server_error() {
        tracing::error!(
            path = %path,
            status = report.status.as_u16(),
            stack = report.stack.as_deref().unwrap_or_default(),
            "request failed"
        );
    } else {
        tracing::debug!(path = %path, status = report.status.as_u16(), message = %report.message, "request rejected");
    }

    let body = ErrorBody {
        status: report.status.as_u16(),
        message: &report.message,
        code: report.code,
        path: Some(&path),
        timestamp: Some(now_rfc3339()),
        stack: if config.is_production() { None } else { report.stack.as_deref() },
    };

    let mut shaped = (report.status, Json(body)).into_response();
    for (name, value) in res.headers() {
        if name != axum::http::header::CONTENT_TYPE && name != axum::http::header::CONTENT_LENGTH {
            shaped.headers_mut().insert(name.clone(), value.clone());
        }
    }
    shaped
}

pub async fn not_found() -> AppError {
    AppError::NotFound("Route not found".to_owned())
}

pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

/// The request path and query with credential parameters blanked out.
pub(crate) fn redacted_path(uri: &Uri) -> String {
    let Some(query) = uri.query() else {
        return uri.path().to_owned();
    };

    let query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some(("token", _)) => "token=[redacted]".to_owned(),
            _ => pair.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{query}", uri.path())
}
