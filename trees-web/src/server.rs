//! Web 服务器模块
//!
//! 基于 Axum。`/sw.js` 和 `/assets/*` 由框架直接处理，其余请求全部交给
//! [`Router`] 解析并分发到控制器动作。

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use trees_core::prelude::*;

use crate::constants::*;
use crate::error::{ErrorEnvelope, WebError};
use crate::middleware::{catch_panic, request_id};
use crate::request::RequestContext;
use crate::router::Router;
use crate::service_worker::{AssetCache, AssetError, ServiceWorker};
use crate::session::SessionStore;

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

const SERVICE_WORKER_ALLOWED: HeaderName = HeaderName::from_static("service-worker-allowed");

/// Web 服务器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProperties {
    /// 服务器监听地址
    pub host: String,

    /// 服务器监听端口
    pub port: u16,

    /// 是否启用 CORS
    pub enable_cors: bool,

    /// 是否启用请求日志
    pub enable_request_logging: bool,

    pub enable_compression: bool,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: false,
            enable_request_logging: true,
            enable_compression: false,
        }
    }
}

impl ServerProperties {
    /// 从 Environment 加载配置
    pub fn from_environment(env: &Environment) -> Self {
        let defaults = Self::default();
        let port = env
            .get_i64(SERVER_PORT)
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(defaults.port);

        Self {
            host: env.get_string(SERVER_HOST).unwrap_or(defaults.host),
            port,
            enable_cors: env.get_bool_or(SERVER_ENABLE_CORS, defaults.enable_cors),
            enable_request_logging: env
                .get_bool_or(SERVER_ENABLE_REQUEST_LOGGING, defaults.enable_request_logging),
            enable_compression: env
                .get_bool_or(SERVER_ENABLE_COMPRESSION, defaults.enable_compression),
        }
    }

    /// 获取服务器地址
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 请求处理共享的状态
#[derive(Clone)]
struct WebState {
    app: Arc<Application>,
    router: Arc<Router>,
    sessions: Option<Arc<SessionStore>>,
    expose_trace: bool,
}

impl WebState {
    fn error_response(&self, error: WebError, path: &str) -> Response {
        let status = error.status_code();
        if status.is_server_error() {
            tracing::error!(path = %path, status = status.as_u16(), error = %error, "Request failed");
        } else {
            tracing::debug!(path = %path, status = status.as_u16(), error = %error, "Request rejected");
        }
        error.to_envelope(self.expose_trace).into_response()
    }
}

/// 把请求分发到控制器动作
async fn dispatch(
    State(state): State<WebState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    query: Option<Query<HashMap<String, String>>>,
) -> Response {
    let path = uri.path();

    let found = match state.router.resolve(&method, path) {
        Ok(found) => found,
        Err(e) => return state.error_response(e.into(), path),
    };

    let session = state.sessions.as_ref().map(|store| store.start(&headers));

    let mut request = RequestContext::new(method, path)
        .with_params(found.params)
        .with_query(query.map(|Query(q)| q).unwrap_or_default())
        .with_headers(headers);
    if let Some(session) = &session {
        request = request.with_session(session.clone());
    }

    tracing::debug!("{} {} -> {:?}", request.method(), path, found.target);

    let mut response = match found.target.invoke(state.app.container(), &request) {
        Ok(response) => response,
        Err(e) => state.error_response(e, path),
    };

    if let Some(cookie) = session.filter(|s| s.is_new()).and_then(|s| s.cookie()) {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    response
}

/// GET /sw.js
async fn service_worker_script(State(state): State<WebState>) -> Response {
    let worker = match state.app.container().make::<ServiceWorker>() {
        Ok(worker) => worker,
        Err(_) => {
            return state.error_response(WebError::NotFound("Service worker is not enabled".into()), "/sw.js")
        }
    };

    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/javascript; charset=utf-8")),
            (SERVICE_WORKER_ALLOWED, HeaderValue::from_static("/")),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        ],
        worker.script(),
    )
        .into_response()
}

/// GET /assets/*path
async fn asset(State(state): State<WebState>, Path(path): Path<String>) -> Response {
    let url = format!("{}{}", ASSETS_MOUNT, path);

    let cache = match state.app.container().make::<AssetCache>() {
        Ok(cache) => cache,
        Err(_) => return state.error_response(WebError::NotFound(format!("Asset '{}' not found", path)), &url),
    };

    match cache.fetch(&path).await {
        Ok((asset, status)) => (
            [
                (header::CONTENT_TYPE, HeaderValue::from_static(asset.content_type)),
                (X_CACHE, HeaderValue::from_static(status.as_str())),
            ],
            asset.bytes,
        )
            .into_response(),
        Err(e @ (AssetError::NotFound(_) | AssetError::InvalidPath(_))) => {
            state.error_response(WebError::NotFound(e.to_string()), &url)
        }
        Err(e) => state.error_response(WebError::Internal(e.to_string()), &url),
    }
}

/// Trees Web 服务器
pub struct TreesWebServer {
    config: ServerProperties,
    state: WebState,
}

impl TreesWebServer {
    /// 由已启动的应用创建服务器，要求容器中已有 `Router`
    pub fn new(app: Application) -> ApplicationResult<Self> {
        if !app.is_booted() {
            return Err(anyhow!("application '{}' has not been booted", app.name()).into());
        }

        let env = Arc::clone(app.environment());
        let config = ServerProperties::from_environment(&env);
        let router = app
            .container()
            .make::<Router>()
            .context("RouteServiceProvider is required to serve requests")?;
        let sessions = app.container().make::<SessionStore>().ok();

        Ok(Self {
            config,
            state: WebState {
                app: Arc::new(app),
                router,
                sessions,
                expose_trace: env.is_development(),
            },
        })
    }

    pub fn config(&self) -> &ServerProperties {
        &self.config
    }

    /// 构建 axum 路由（包含所有中间件）
    pub fn router(&self) -> axum::Router {
        let app = axum::Router::new()
            .route("/sw.js", get(service_worker_script))
            .route("/assets/*path", get(asset))
            .fallback(dispatch)
            .with_state(self.state.clone());

        with_layers(app, &self.config, self.state.expose_trace)
    }

    /// 启动服务器
    pub async fn run(self) -> ApplicationResult<()> {
        let router = self.router();
        serve(&self.config, router).await
    }
}

/// 启动失败时使用的路由：任何请求都返回 500 错误响应
pub fn failsafe_router(
    error: &(dyn std::error::Error + 'static),
    config: &ServerProperties,
    expose_trace: bool,
) -> axum::Router {
    let envelope = ErrorEnvelope::from_error(error, StatusCode::INTERNAL_SERVER_ERROR, expose_trace);
    let app = axum::Router::new().fallback(move || {
        let envelope = envelope.clone();
        async move { envelope.into_response() }
    });

    with_layers(app, config, expose_trace)
}

fn with_layers(app: axum::Router, config: &ServerProperties, expose_trace: bool) -> axum::Router {
    let mut app = app
        .layer(middleware::from_fn_with_state(expose_trace, catch_panic))
        .layer(middleware::from_fn(request_id));

    if config.enable_request_logging {
        app = app.layer(TraceLayer::new_for_http());
    }
    if config.enable_compression {
        app = app.layer(CompressionLayer::new());
    }
    if config.enable_cors {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

async fn serve(config: &ServerProperties, router: axum::Router) -> ApplicationResult<()> {
    let addr = config.address();

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// 构建并启动应用，返回监听配置和要服务的路由
///
/// 任何启动失败（配置文件解析、提供者注册或启动）都会得到保护模式的路由：
/// 所有请求返回 500 错误响应。配置都没能加载时无法确认运行环境，trace 始终为空。
pub async fn startup_router(builder: TreesApplication) -> (ServerProperties, axum::Router) {
    let logging = builder.logging_config().cloned();

    let mut app = match builder.build() {
        Ok(app) => app,
        Err(e) => {
            if let Some(logging) = logging {
                // 构建失败时日志还没有安装
                if let Err(init_error) = logging.init() {
                    tracing::debug!("Skipping logging initialization: {}", init_error);
                }
            }
            tracing::error!("Application failed to load configuration: {}", e);
            tracing::warn!("Serving error responses only");
            let config = ServerProperties::default();
            let router = failsafe_router(&e, &config, false);
            return (config, router);
        }
    };

    let env = Arc::clone(app.environment());
    let config = ServerProperties::from_environment(&env);
    let expose_trace = env.is_development();

    let started = match app.boot().await {
        Ok(()) => TreesWebServer::new(app),
        Err(e) => Err(e),
    };

    let router = match started {
        Ok(server) => server.router(),
        Err(e) => {
            tracing::error!("Application failed to start: {}", e);
            tracing::warn!("Serving error responses only");
            failsafe_router(&e, &config, expose_trace)
        }
    };
    (config, router)
}

/// 构建、启动并运行应用，启动失败时以保护模式继续监听
pub async fn run(builder: TreesApplication) -> ApplicationResult<()> {
    let (config, router) = startup_router(builder).await;
    serve(&config, router).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action;
    use crate::controller::{ActionResult, Controller};
    use crate::providers::*;
    use crate::router::RouterError;
    use crate::service_worker::{Asset, AssetSource};
    use crate::view::{TemplateEngine, View};
    use async_trait::async_trait;
    use axum::body::Body;
    use bytes::Bytes;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use trees_core::{ConfigValue, MapPropertySource};

    struct EventController {
        view: View,
    }

    impl Controller for EventController {
        const NAME: &'static str = "EventController";

        fn construct(container: &Container) -> anyhow::Result<Self> {
            Ok(Self {
                view: View::new(container.make::<TemplateEngine>()?),
            })
        }

        fn view(&self) -> &View {
            &self.view
        }
    }

    impl EventController {
        fn event(&self, request: &RequestContext) -> ActionResult {
            let id = request.param("id").unwrap_or_default();
            if id == "404" {
                return Err(WebError::NotFound(format!("Event {} not found", id)));
            }
            self.render("event.html", json!({ "id": id, "page": request.query("page") }))
        }

        fn broken(&self, _request: &RequestContext) -> ActionResult {
            self.render("missing.html", json!({}))
        }

        fn visits(&self, request: &RequestContext) -> ActionResult {
            let session = request
                .session()
                .ok_or_else(|| WebError::Internal("no session".into()))?;
            let visits = session.get::<u32>("visits").unwrap_or(0) + 1;
            session.put("visits", visits)?;
            self.json(json!({ "visits": visits }), StatusCode::OK)
        }
    }

    fn routes(router: &Router) -> Result<(), RouterError> {
        router
            .get("/events/{id}", action!(EventController::event))?
            .get("/broken", action!(EventController::broken))?
            .get("/visits", action!(EventController::visits))?;
        Ok(())
    }

    struct StaticSource;

    #[async_trait]
    impl AssetSource for StaticSource {
        async fn load(&self, path: &str) -> Result<Asset, AssetError> {
            match path {
                "css/app.css" => Ok(Asset {
                    bytes: Bytes::from_static(b"body {}"),
                    content_type: "text/css; charset=utf-8",
                }),
                "img/logo.svg" => Ok(Asset {
                    bytes: Bytes::from_static(b"<svg/>"),
                    content_type: "image/svg+xml",
                }),
                _ => Err(AssetError::NotFound(path.to_string())),
            }
        }
    }

    fn builder(app_env: &str) -> TreesApplication {
        let settings = MapPropertySource::new("test")
            .with_property("app.env", ConfigValue::String(app_env.into()))
            .with_property("assets.cache-name", ConfigValue::String("eventlyy-v1".into()))
            .with_property(
                "assets.precache",
                ConfigValue::Array(vec![
                    ConfigValue::String("/".into()),
                    ConfigValue::String("/assets/css/app.css".into()),
                ]),
            );

        TreesApplication::new("server-test")
            .config_files(Vec::new())
            .banner(false)
            .logging(None)
            .property_source(Box::new(settings))
    }

    async fn server(app_env: &str) -> axum::Router {
        let engine = TemplateEngine::from_raw([("event.html", "event {{ id }} page {{ page }}")]).unwrap();
        let mut app = builder(app_env)
            .provider(SessionServiceProvider)
            .provider(ViewServiceProvider::with_engine(engine))
            .provider(RouteServiceProvider::new().load("web", routes))
            .provider(AssetServiceProvider::with_source(Arc::new(StaticSource)))
            .build()
            .unwrap();
        app.boot().await.unwrap();
        TreesWebServer::new(app).unwrap().router()
    }

    fn get_request(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_passes_params_and_query() {
        let app = server("production").await;
        let response = app.oneshot(get_request("/events/42?page=3")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "event 42 page 3");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404_envelope() {
        let app = server("development").await;
        let response = app.oneshot(get_request("/nope")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Not Found");
        assert_eq!(body["message"], "No route matches GET /nope");
    }

    #[tokio::test]
    async fn test_controller_not_found() {
        let app = server("production").await;
        let response = app.oneshot(get_request("/events/404")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Not Found", "message": "Event 404 not found", "trace": [] })
        );
    }

    #[tokio::test]
    async fn test_template_error_trace_depends_on_env() {
        let response = server("production")
            .await
            .oneshot(get_request("/broken"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["trace"], json!([]));

        let response = server("development")
            .await
            .oneshot(get_request("/broken"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["message"], "Template 'missing.html' not found");
        assert_eq!(body["trace"][0], "Template 'missing.html' not found");
    }

    #[tokio::test]
    async fn test_session_cookie_issued_once_and_resumed() {
        let app = server("production").await;

        let first = app.clone().oneshot(get_request("/visits")).await.unwrap();
        let cookie = first.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();
        assert_eq!(body_json(first).await["visits"], 1);

        let second = app
            .oneshot(
                axum::http::Request::get("/visits")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(!second.headers().contains_key(header::SET_COOKIE));
        assert_eq!(body_json(second).await["visits"], 2);
    }

    #[tokio::test]
    async fn test_service_worker_script() {
        let app = server("production").await;
        let response = app.oneshot(get_request("/sw.js")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/javascript; charset=utf-8"
        );
        assert_eq!(response.headers()[&SERVICE_WORKER_ALLOWED], "/");
        assert!(body_text(response).await.contains(r#"const CACHE_NAME = "eventlyy-v1";"#));
    }

    #[tokio::test]
    async fn test_assets_cache_status() {
        let app = server("production").await;

        let hit = app.clone().oneshot(get_request("/assets/css/app.css")).await.unwrap();
        assert_eq!(hit.headers()[&X_CACHE], "HIT");
        assert_eq!(hit.headers()[header::CONTENT_TYPE], "text/css; charset=utf-8");
        assert_eq!(body_text(hit).await, "body {}");

        let miss = app.clone().oneshot(get_request("/assets/img/logo.svg")).await.unwrap();
        assert_eq!(miss.headers()[&X_CACHE], "MISS");

        let missing = app.oneshot(get_request("/assets/img/none.png")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_failsafe_router_outside_development() {
        let mut app = builder("production")
            .provider(RouteServiceProvider::new().load("broken", |router| {
                router.get("no-slash", action!(EventController::event))?;
                Ok(())
            }))
            .build()
            .unwrap();
        let err = app.boot().await.unwrap_err();

        let router = failsafe_router(&err, &ServerProperties::default(), false);
        let response = router.oneshot(get_request("/events")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal Server Error");
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("RouteServiceProvider"));
        assert_eq!(body["trace"], json!([]));
    }

    #[tokio::test]
    async fn test_failsafe_router_in_development_has_trace() {
        let err = ApplicationError::Other(anyhow!("database offline").context("booting events"));
        let router = failsafe_router(&err, &ServerProperties::default(), true);
        let response = router.oneshot(get_request("/")).await.unwrap();

        let body = body_json(response).await;
        assert_eq!(body["trace"], json!(["booting events", "database offline"]));
    }

    #[tokio::test]
    async fn test_read_only_requests_do_not_open_sessions() {
        let mut app = builder("production")
            .provider(SessionServiceProvider)
            .provider(ViewServiceProvider::with_engine(
                TemplateEngine::from_raw([("event.html", "event {{ id }}")]).unwrap(),
            ))
            .provider(RouteServiceProvider::new().load("web", routes))
            .build()
            .unwrap();
        app.boot().await.unwrap();
        let store = app.container().make::<SessionStore>().unwrap();
        let router = TreesWebServer::new(app).unwrap().router();

        for _ in 0..50 {
            let response = router.clone().oneshot(get_request("/events/7")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(!response.headers().contains_key(header::SET_COOKIE));
        }
        let head = axum::http::Request::head("/events/7").body(Body::empty()).unwrap();
        router.clone().oneshot(head).await.unwrap();
        assert_eq!(store.len(), 0);

        router.oneshot(get_request("/visits")).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_startup_router_serves_envelope_on_bad_config() {
        let path = std::env::temp_dir().join(format!(
            "trees-bad-{}.toml",
            uuid::Uuid::new_v4().simple()
        ));
        std::fs::write(&path, "[server\nport = ").unwrap();

        let builder = TreesApplication::new("bad-config")
            .config_file(path.display().to_string())
            .banner(false)
            .logging(None)
            .property_source(Box::new(
                MapPropertySource::new("test").with_property("app.env", ConfigValue::String("development".into())),
            ));
        let (config, router) = startup_router(builder).await;
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config, ServerProperties::default());
        let response = router.oneshot(get_request("/events")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal Server Error");
        assert!(body["message"].as_str().unwrap().contains("Failed to parse TOML"));
        assert_eq!(body["trace"], json!([]));
    }

    #[tokio::test]
    async fn test_startup_router_serves_envelope_on_boot_failure() {
        let builder = builder("production").provider(RouteServiceProvider::new().load("broken", |router| {
            router.get("no-slash", action!(EventController::event))?;
            Ok(())
        }));
        let (_, router) = startup_router(builder).await;

        let response = router.oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["trace"], json!([]));
    }

    #[test]
    fn test_server_properties_from_environment() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("test")
                .with_property("server.port", ConfigValue::Int(3000))
                .with_property("server.enable-cors", ConfigValue::Bool(true)),
        ));

        let props = ServerProperties::from_environment(&env);
        assert_eq!(props.port, 3000);
        assert!(props.enable_cors);
        assert_eq!(props.address(), "0.0.0.0:3000");
    }
}
