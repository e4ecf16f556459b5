//! 控制器支持
//!
//! 控制器是一个普通的结构体，实现 [`Controller`] 后它的方法就可以作为路由动作。
//! 每个请求都会通过 [`Controller::construct`] 新建一个实例，随后调用
//! [`Controller::initialize`]，最后调用动作方法。
//!
//! ```ignore
//! pub struct EventController {
//!     view: View,
//!     events: Arc<EventRepository>,
//! }
//!
//! impl Controller for EventController {
//!     const NAME: &'static str = "EventController";
//!
//!     fn construct(container: &Container) -> anyhow::Result<Self> {
//!         Ok(Self {
//!             view: View::new(container.make::<TemplateEngine>()?),
//!             events: container.make::<EventRepository>()?,
//!         })
//!     }
//!
//!     fn view(&self) -> &View {
//!         &self.view
//!     }
//! }
//! ```

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use serde::Serialize;
use trees_core::Container;

use crate::error::WebError;
use crate::request::RequestContext;
use crate::view::View;

/// 动作的返回值
///
/// 返回 `Ok(response)` 即结束本次请求，动作中不会再有后续代码执行
pub type ActionResult = Result<Response, WebError>;

pub const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";

pub const CORS_ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Requested-With";

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// 控制器
pub trait Controller: Sized + Send + Sync + 'static {
    /// 控制器名称，用于路由表和日志
    const NAME: &'static str;

    /// 从容器中解析依赖并构建实例
    fn construct(container: &Container) -> anyhow::Result<Self>;

    /// 构建完成后、调用动作之前执行
    fn initialize(&mut self, _request: &RequestContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn view(&self) -> &View;

    /// 渲染模板并返回 HTML 响应
    fn render<D: Serialize>(&self, template: &str, data: D) -> ActionResult {
        let html = self.view().render(template, data)?;
        Ok(Html(html).into_response())
    }

    /// 返回 JSON 响应，见 [`json`]
    fn json<D: Serialize>(&self, data: D, status: StatusCode) -> ActionResult {
        json(data, status)
    }
}

/// 构建 JSON 响应
///
/// 先确定状态码和响应头，再写入序列化后的响应体。响应头包含开放的 CORS 设置。
pub fn json<D: Serialize>(data: D, status: StatusCode) -> ActionResult {
    let body = serde_json::to_vec(&data)?;

    let response = Response::builder()
        .status(status)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"))
        .header(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(CORS_ALLOW_METHODS),
        )
        .header(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(CORS_ALLOW_HEADERS),
        )
        .header(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE))
        .body(Body::from(body))
        .map_err(|e| WebError::Internal(format!("failed to build JSON response: {}", e)))?;

    Ok(response)
}
