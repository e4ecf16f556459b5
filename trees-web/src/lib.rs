//! # Trees Web
//!
//! Trees 框架的 Web 层，基于 Axum 构建
//!
//! ## 核心特性
//!
//! - **路由表** - `(方法, 路径模式)` 映射到控制器动作，`{name}` 捕获路径参数
//! - **控制器** - 每个请求新建实例，`render` 渲染模板，`json` 返回 JSON
//! - **视图** - 基于 Tera，支持开发环境热加载
//! - **服务提供者** - 会话、视图、路由、静态资源在启动阶段装配
//! - **统一错误响应** - 未处理的错误都转换为 `{error, message, trace}`
//! - **Service Worker** - 生成 `sw.js`，服务端同样以缓存优先的方式提供静态资源

pub mod constants;
pub mod controller;
pub mod error;
pub mod middleware;
pub mod providers;
pub mod request;
pub mod router;
pub mod server;
pub mod service_worker;
pub mod session;
pub mod view;

pub use controller::{json, ActionResult, Controller};
pub use error::{ErrorEnvelope, WebError};
pub use providers::{
    AssetServiceProvider, RouteServiceProvider, SessionServiceProvider, ViewServiceProvider,
};
pub use request::RequestContext;
pub use router::{Params, RouteInfo, RouteTarget, Router, RouterError};
pub use server::{run, startup_router, ServerProperties, TreesWebServer};
pub use service_worker::{AssetCache, ServiceWorker};
pub use session::{Session, SessionStore};
pub use view::{TemplateEngine, TemplateError, View};

pub mod prelude {
    //! 预导入模块

    pub use crate::action;
    pub use crate::controller::{ActionResult, Controller};
    pub use crate::error::WebError;
    pub use crate::providers::*;
    pub use crate::request::RequestContext;
    pub use crate::router::{Router, RouterError};
    pub use crate::server::{run, TreesWebServer};
    pub use crate::session::Session;
    pub use crate::view::{TemplateEngine, View};

    pub use axum::http::StatusCode;
    pub use serde_json::json;
    pub use trees_core::prelude::*;
}
