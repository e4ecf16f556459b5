//! Web 层错误与统一的错误响应
//!
//! 请求处理过程中任何未被动作自己处理的错误都会被转换成同一种 JSON 结构：
//!
//! ```json
//! { "error": "Not Found", "message": "No route matches GET /nope", "trace": [] }
//! ```
//!
//! `trace` 是错误的 cause 链，只在 `app.env = "development"` 时填充，其他环境为空数组。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use trees_core::ContainerError;

use crate::router::RouterError;
use crate::view::TemplateError;

/// Web 层错误类型
#[derive(Error, Debug)]
pub enum WebError {
    // ========== 框架错误 ==========
    /// 模板缺失或渲染失败 - 500
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// 容器中缺少控制器依赖 - 500
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// 路由未匹配 - 404，其余路由错误 - 500
    #[error(transparent)]
    Routing(#[from] RouterError),

    /// 序列化响应失败 - 500
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    // ========== 控制器错误 ==========
    /// 资源不存在 - 404
    #[error("{0}")]
    NotFound(String),

    /// 请求参数无效 - 400
    #[error("{0}")]
    BadRequest(String),

    /// 内部错误 - 500
    #[error("Internal server error: {0}")]
    Internal(String),

    /// 控制器构建、初始化过程中的其他错误 - 500
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WebError {
    /// 获取错误对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebError::Routing(RouterError::RouteNotFound { .. }) => StatusCode::NOT_FOUND,
            WebError::NotFound(_) => StatusCode::NOT_FOUND,
            WebError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WebError::Other(e) => match e.downcast_ref::<WebError>() {
                Some(inner) => inner.status_code(),
                None => StatusCode::INTERNAL_SERVER_ERROR,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 转换为错误响应体
    pub fn to_envelope(&self, expose_trace: bool) -> ErrorEnvelope {
        ErrorEnvelope::from_error(self, self.status_code(), expose_trace)
    }
}

/// 不带 trace 的错误响应；需要按环境决定是否附带 trace 时使用 [`WebError::to_envelope`]
impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        self.to_envelope(false).into_response()
    }
}

/// 统一错误响应格式
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    pub message: String,
    pub trace: Vec<String>,
}

impl ErrorEnvelope {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            message: message.into(),
            trace: Vec::new(),
        }
    }

    pub fn from_error(
        error: &(dyn std::error::Error + 'static),
        status: StatusCode,
        expose_trace: bool,
    ) -> Self {
        let mut envelope = Self::new(status, error.to_string());
        if expose_trace {
            envelope.trace = error_chain(error);
        }
        envelope
    }

    pub fn with_trace(mut self, trace: Vec<String>) -> Self {
        self.trace = trace;
        self
    }
}

impl IntoResponse for ErrorEnvelope {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

/// 错误本身以及所有 source 的描述，由外到内
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut chain = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain
}
