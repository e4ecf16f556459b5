//! Web 层配置键与默认值

// ==================== Server 配置 ====================

/// 服务器监听地址
pub const SERVER_HOST: &str = "server.host";

/// 服务器监听端口
pub const SERVER_PORT: &str = "server.port";

/// 是否启用 CORS 层
pub const SERVER_ENABLE_CORS: &str = "server.enable-cors";

/// 是否启用请求日志
pub const SERVER_ENABLE_REQUEST_LOGGING: &str = "server.enable-request-logging";

/// 是否启用响应压缩
pub const SERVER_ENABLE_COMPRESSION: &str = "server.enable-compression";

// ==================== 视图配置 ====================

/// 模板 glob
pub const VIEW_PATTERN: &str = "view.pattern";

/// 是否监听模板目录并热加载
pub const VIEW_HOT_RELOAD: &str = "view.hot-reload";

pub const DEFAULT_VIEW_PATTERN: &str = "templates/**/*.html";

// ==================== 会话配置 ====================

pub const SESSION_COOKIE_NAME: &str = "session.cookie-name";

pub const DEFAULT_SESSION_COOKIE: &str = "trees_session";

// ==================== 静态资源与 Service Worker ====================

/// 静态资源根目录
pub const ASSETS_PUBLIC_DIR: &str = "assets.public-dir";

/// Service Worker 使用的缓存名称
pub const ASSETS_CACHE_NAME: &str = "assets.cache-name";

/// 预缓存的 URL 列表
pub const ASSETS_PRECACHE: &str = "assets.precache";

pub const DEFAULT_PUBLIC_DIR: &str = "public";

pub const DEFAULT_CACHE_NAME: &str = "trees-v1";

/// 静态资源挂载的 URL 前缀，只有这个前缀下的预缓存条目会在服务端缓存
pub const ASSETS_MOUNT: &str = "/assets/";
