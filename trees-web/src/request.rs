//! 请求上下文
//!
//! 控制器动作拿到的只读视图：方法、路径、路径参数、查询参数、请求头和会话

use std::collections::HashMap;

use http::{HeaderMap, Method};

use crate::router::Params;
use crate::session::Session;

/// 单个请求的上下文
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    path: String,
    params: Params,
    query: HashMap<String, String>,
    headers: HeaderMap,
    session: Option<Session>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Params::default(),
            query: HashMap::new(),
            headers: HeaderMap::new(),
            session: None,
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_query(mut self, query: HashMap<String, String>) -> Self {
        self.query = query;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// 路径参数，例如 `/events/{id}` 中的 `id`（已经过 URL 解码）
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// 查询参数（已经过 URL 解码）
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 当前会话，未启用会话时为 None
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }
}
