//! 核心配置键
//!
//! 框架在 Environment 中读取的键名集中定义在这里，避免在各处硬编码

/// 应用名称
pub const APP_NAME: &str = "app.name";

/// 运行环境（development / production / ...）
pub const APP_ENV: &str = "app.env";

/// 开发环境的取值，只有显式设置为该值时才会暴露错误链
pub const ENV_DEVELOPMENT: &str = "development";

/// 未配置 `app.env` 时的默认环境
pub const ENV_PRODUCTION: &str = "production";

/// 默认的环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "TREES_";

/// 激活 profile 的环境变量后缀，完整名称为 `{prefix}PROFILES_ACTIVE`
pub const PROFILES_ACTIVE_SUFFIX: &str = "PROFILES_ACTIVE";

/// 默认配置文件
pub const DEFAULT_CONFIG_FILE: &str = "application.toml";

// ==================== 日志 ====================

/// trace / debug / info / warn / error
pub const LOGGING_LEVEL: &str = "logging.level";

/// compact / pretty / json
pub const LOGGING_FORMAT: &str = "logging.format";

/// EnvFilter 指令，优先于 `logging.level`
pub const LOGGING_FILTER: &str = "logging.filter";
