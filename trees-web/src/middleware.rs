//! 中间件模块

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;

use crate::error::ErrorEnvelope;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// 请求 ID 中间件
///
/// 沿用客户端传入的 `X-Request-ID`，没有时生成一个
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let request_id = match req.headers().get(&X_REQUEST_ID) {
        Some(value) => value.clone(),
        None => {
            let generated = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string());
            match generated {
                Ok(value) => {
                    req.headers_mut().insert(X_REQUEST_ID, value.clone());
                    value
                }
                Err(_) => return next.run(req).await,
            }
        }
    };

    let mut response = next.run(req).await;
    response.headers_mut().insert(X_REQUEST_ID, request_id);
    response
}

/// 捕获动作中的 panic，转换为 500 错误响应
///
/// 状态为是否在响应中附带 trace
pub async fn catch_panic(State(expose_trace): State<bool>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();

    match std::panic::AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let message = if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else {
                "Unknown panic occurred".to_string()
            };

            tracing::error!(path = %path, error = %message, "Handler panicked");

            let mut envelope = ErrorEnvelope::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
            if expose_trace {
                envelope = envelope.with_trace(vec![format!("panicked: {}", message)]);
            }
            envelope.into_response()
        }
    }
}
