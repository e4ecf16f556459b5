//! 路由表
//!
//! 每个 HTTP 方法一张按注册顺序排列的路由列表。路径按 `/` 切分为段，
//! 字面段必须完全相等，`{name}` 段匹配任意非空段并按名称捕获。
//! 多个模式同时匹配时，先注册的路由生效。

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http::Method;
use parking_lot::RwLock;
use thiserror::Error;
use trees_core::Container;

use crate::controller::{ActionResult, Controller};
use crate::request::RequestContext;

/// 路由错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// 没有任何模式匹配请求路径
    #[error("No route matches {method} {path}")]
    RouteNotFound { method: Method, path: String },

    #[error("Invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// 启动完成后路由表只读
    #[error("Router is sealed, cannot register {method} {pattern}")]
    Sealed { method: Method, pattern: String },
}

type Handler = dyn Fn(&Container, &RequestContext) -> ActionResult + Send + Sync;

/// 路由目标：控制器类型 + 动作
///
/// 通过泛型在注册时单态化，调用时不需要任何反射
#[derive(Clone)]
pub struct RouteTarget {
    controller: &'static str,
    action: &'static str,
    handler: Arc<Handler>,
}

impl RouteTarget {
    /// 每次调用都会构建一个新的控制器实例，执行 `initialize` 后调用动作
    pub fn new<C: Controller>(action: &'static str, method: fn(&C, &RequestContext) -> ActionResult) -> Self {
        let handler = move |container: &Container, request: &RequestContext| -> ActionResult {
            let mut controller = C::construct(container)?;
            controller.initialize(request)?;
            method(&controller, request)
        };

        Self {
            controller: C::NAME,
            action,
            handler: Arc::new(handler),
        }
    }

    pub fn controller(&self) -> &'static str {
        self.controller
    }

    pub fn action(&self) -> &'static str {
        self.action
    }

    pub fn invoke(&self, container: &Container, request: &RequestContext) -> ActionResult {
        (self.handler)(container, request)
    }
}

impl fmt::Debug for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.controller, self.action)
    }
}

/// `action!(EventController::event)` 展开为对应的 [`RouteTarget`]
#[macro_export]
macro_rules! action {
    ($controller:ident :: $method:ident) => {
        $crate::router::RouteTarget::new::<$controller>(stringify!($method), $controller::$method)
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

struct Route {
    pattern: String,
    segments: Vec<Segment>,
    target: RouteTarget,
}

impl Route {
    fn matches(&self, parts: &[&str]) -> Option<Params> {
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = Params::default();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => params.insert(name.clone(), decode_segment(part)),
            }
        }
        Some(params)
    }
}

/// 路径参数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: Vec<(String, String)>,
}

impl Params {
    fn insert(&mut self, name: String, value: String) {
        self.values.push((name, value));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 一次成功的解析结果
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub pattern: String,
    pub target: RouteTarget,
    pub params: Params,
}

/// 路由信息（用于启动日志）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub method: Method,
    pub pattern: String,
    pub controller: &'static str,
    pub action: &'static str,
}

impl fmt::Display for RouteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<6} {:<24} -> {}::{}",
            self.method, self.pattern, self.controller, self.action
        )
    }
}

/// 路由表
///
/// 注册通过 `&self` 完成，这样启动阶段可以从容器中取出共享的 Router 加载路由；
/// `seal()` 之后任何注册都会失败。
#[derive(Default)]
pub struct Router {
    routes: RwLock<HashMap<Method, Vec<Route>>>,
    sealed: AtomicBool,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册路由
    pub fn register(
        &self,
        method: Method,
        pattern: &str,
        target: RouteTarget,
    ) -> Result<&Self, RouterError> {
        if self.is_sealed() {
            return Err(RouterError::Sealed {
                method,
                pattern: pattern.to_string(),
            });
        }

        let segments = parse_pattern(pattern)?;
        tracing::debug!("Route registered: {} {} -> {:?}", method, pattern, target);

        self.routes.write().entry(method).or_default().push(Route {
            pattern: pattern.to_string(),
            segments,
            target,
        });
        Ok(self)
    }

    pub fn get(&self, pattern: &str, target: RouteTarget) -> Result<&Self, RouterError> {
        self.register(Method::GET, pattern, target)
    }

    pub fn post(&self, pattern: &str, target: RouteTarget) -> Result<&Self, RouterError> {
        self.register(Method::POST, pattern, target)
    }

    /// 带公共前缀的路由组
    pub fn prefix(&self, prefix: &str) -> RouteGroup<'_> {
        RouteGroup {
            router: self,
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    /// 解析请求
    ///
    /// HEAD 请求在没有匹配的 HEAD 路由时回退到 GET 路由
    pub fn resolve(&self, method: &Method, path: &str) -> Result<RouteMatch, RouterError> {
        let parts = split_path(path).ok_or_else(|| not_found(method, path))?;
        let routes = self.routes.read();

        let lookup = |m: &Method| {
            routes.get(m).and_then(|list| {
                list.iter().find_map(|route| {
                    route.matches(&parts).map(|params| RouteMatch {
                        pattern: route.pattern.clone(),
                        target: route.target.clone(),
                        params,
                    })
                })
            })
        };

        let found = match lookup(method) {
            Some(found) => Some(found),
            None if *method == Method::HEAD => lookup(&Method::GET),
            None => None,
        };

        found.ok_or_else(|| {
            tracing::debug!("No route for {} {}", method, path);
            not_found(method, path)
        })
    }

    /// 冻结路由表
    pub fn seal(&self) {
        if !self.sealed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Router sealed with {} route(s)", self.len());
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.routes.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 所有路由，按方法名排序，同一方法内保持注册顺序
    pub fn routes(&self) -> Vec<RouteInfo> {
        let routes = self.routes.read();
        let mut methods: Vec<&Method> = routes.keys().collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        methods
            .into_iter()
            .flat_map(|method| {
                routes[method].iter().map(move |route| RouteInfo {
                    method: method.clone(),
                    pattern: route.pattern.clone(),
                    controller: route.target.controller(),
                    action: route.target.action(),
                })
            })
            .collect()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.len())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

/// 路由组
pub struct RouteGroup<'a> {
    router: &'a Router,
    prefix: String,
}

impl RouteGroup<'_> {
    pub fn register(&self, method: Method, pattern: &str, target: RouteTarget) -> Result<&Self, RouterError> {
        let full = if pattern == "/" && self.prefix.is_empty() {
            "/".to_string()
        } else if pattern == "/" {
            self.prefix.clone()
        } else {
            format!("{}{}", self.prefix, pattern)
        };
        self.router.register(method, &full, target)?;
        Ok(self)
    }

    pub fn get(&self, pattern: &str, target: RouteTarget) -> Result<&Self, RouterError> {
        self.register(Method::GET, pattern, target)
    }
}

fn not_found(method: &Method, path: &str) -> RouterError {
    RouterError::RouteNotFound {
        method: method.clone(),
        path: path.to_string(),
    }
}

/// 切分请求路径，忽略一个结尾的 `/`；不以 `/` 开头的路径无法匹配
fn split_path(path: &str) -> Option<Vec<&str>> {
    let rest = path.strip_prefix('/')?;
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    if rest.is_empty() {
        return Some(Vec::new());
    }
    Some(rest.split('/').collect())
}

/// 路径参数按 UTF-8 百分号解码，无法解码时保留原文
fn decode_segment(part: &str) -> String {
    urlencoding::decode(part)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| part.to_string())
}

fn parse_pattern(pattern: &str) -> Result<Vec<Segment>, RouterError> {
    let invalid = |reason: &str| RouterError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    let rest = pattern
        .strip_prefix('/')
        .ok_or_else(|| invalid("must start with '/'"))?;
    if rest.is_empty() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    for part in rest.split('/') {
        if part.is_empty() {
            return Err(invalid("empty segment"));
        }

        let segment = match part.strip_prefix('{') {
            Some(inner) => {
                let name = inner
                    .strip_suffix('}')
                    .ok_or_else(|| invalid("unterminated placeholder"))?;
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(invalid("placeholder names must be non-empty [A-Za-z0-9_]"));
                }
                if segments.contains(&Segment::Param(name.to_string())) {
                    return Err(invalid("duplicate placeholder"));
                }
                Segment::Param(name.to_string())
            }
            None if part.contains(['{', '}']) => {
                return Err(invalid("placeholders must span a whole segment"));
            }
            None => Segment::Literal(part.to_string()),
        };
        segments.push(segment);
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::View;
    use axum::response::IntoResponse;

    struct EventController {
        view: View,
    }

    impl Controller for EventController {
        const NAME: &'static str = "EventController";

        fn construct(_container: &Container) -> anyhow::Result<Self> {
            Ok(Self { view: View::empty() })
        }

        fn view(&self) -> &View {
            &self.view
        }
    }

    impl EventController {
        fn index(&self, _request: &RequestContext) -> ActionResult {
            Ok("index".into_response())
        }

        fn event(&self, _request: &RequestContext) -> ActionResult {
            Ok("event".into_response())
        }

        fn upcoming(&self, _request: &RequestContext) -> ActionResult {
            Ok("upcoming".into_response())
        }
    }

    fn router() -> Router {
        let router = Router::new();
        router
            .get("/", action!(EventController::index))
            .unwrap()
            .get("/events", action!(EventController::index))
            .unwrap()
            .get("/events/{id}", action!(EventController::event))
            .unwrap()
            .get("/events/upcoming", action!(EventController::upcoming))
            .unwrap();
        router
    }

    #[test]
    fn test_exact_paths_resolve_to_registered_targets() {
        let router = router();
        for info in router.routes() {
            if info.pattern.contains('{') {
                continue;
            }
            let found = router.resolve(&info.method, &info.pattern).unwrap();
            assert_eq!(found.target.controller(), info.controller);
            assert_eq!(found.target.action(), info.action);
            assert_eq!(found.pattern, info.pattern);
        }
    }

    #[test]
    fn test_placeholder_captures_segment() {
        let router = router();
        for id in ["42", "abc", "2024-05-01", "x_y"] {
            let found = router.resolve(&Method::GET, &format!("/events/{}", id)).unwrap();
            assert_eq!(found.target.action(), "event");
            assert_eq!(found.params.get("id"), Some(id));
            assert_eq!(found.params.len(), 1);
        }
    }

    #[test]
    fn test_get_events_42() {
        let found = router().resolve(&Method::GET, "/events/42").unwrap();
        assert_eq!(format!("{:?}", found.target), "EventController::event");
        assert_eq!(found.params.get("id"), Some("42"));
    }

    #[test]
    fn test_first_registered_wins() {
        // "/events/upcoming" 在 "/events/{id}" 之后注册，所以永远不会被选中
        let found = router().resolve(&Method::GET, "/events/upcoming").unwrap();
        assert_eq!(found.target.action(), "event");
        assert_eq!(found.params.get("id"), Some("upcoming"));
    }

    #[test]
    fn test_not_found() {
        let router = router();
        assert!(matches!(
            router.resolve(&Method::GET, "/events/42/tickets"),
            Err(RouterError::RouteNotFound { .. })
        ));
        assert!(router.resolve(&Method::POST, "/events").is_err());
        assert!(router.resolve(&Method::GET, "/events//").is_err());
        assert!(router.resolve(&Method::GET, "events").is_err());
    }

    #[test]
    fn test_trailing_slash_and_head_fallback() {
        let router = router();
        assert_eq!(
            router.resolve(&Method::GET, "/events/").unwrap().pattern,
            "/events"
        );
        assert_eq!(
            router.resolve(&Method::HEAD, "/events/7").unwrap().target.action(),
            "event"
        );
        assert_eq!(router.resolve(&Method::GET, "/").unwrap().pattern, "/");
    }

    #[test]
    fn test_invalid_patterns() {
        let router = Router::new();
        for pattern in ["events", "/events//x", "/events/{id", "/events/{}", "/e/{a}/{a}", "/e/x{id}"] {
            let err = router
                .get(pattern, action!(EventController::index))
                .err()
                .unwrap();
            assert!(matches!(err, RouterError::InvalidPattern { .. }), "{pattern}");
        }
    }

    #[test]
    fn test_sealed_router_rejects_registration() {
        let router = router();
        router.seal();
        let err = router
            .get("/late", action!(EventController::index))
            .err()
            .unwrap();
        assert!(matches!(err, RouterError::Sealed { .. }));
        assert_eq!(router.len(), 4);
    }

    #[test]
    fn test_prefix_group() {
        let router = Router::new();
        router
            .prefix("/api/")
            .get("/events", action!(EventController::index))
            .unwrap()
            .get("/events/{id}", action!(EventController::event))
            .unwrap();

        let found = router.resolve(&Method::GET, "/api/events/9").unwrap();
        assert_eq!(found.pattern, "/api/events/{id}");
        assert_eq!(found.params.get("id"), Some("9"));
    }

    #[test]
    fn test_params_are_percent_decoded() {
        let router = router();
        let found = router.resolve(&Method::GET, "/events/a%20b").unwrap();
        assert_eq!(found.params.get("id"), Some("a b"));

        let found = router.resolve(&Method::GET, "/events/caf%C3%A9").unwrap();
        assert_eq!(found.params.get("id"), Some("café"));

        // 解码后不是合法 UTF-8，保留原文
        let found = router.resolve(&Method::GET, "/events/%FF").unwrap();
        assert_eq!(found.params.get("id"), Some("%FF"));
    }

    #[test]
    fn test_root_prefix_group() {
        let router = Router::new();
        router
            .prefix("/")
            .get("/", action!(EventController::index))
            .unwrap()
            .get("/events", action!(EventController::index))
            .unwrap();

        assert_eq!(router.resolve(&Method::GET, "/").unwrap().pattern, "/");
        assert_eq!(router.resolve(&Method::GET, "/events").unwrap().pattern, "/events");
    }
}
