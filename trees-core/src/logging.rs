//! 日志初始化
//!
//! 读取 `logging.level` / `logging.format` / `logging.filter`，安装全局 tracing 订阅者。
//! 未配置级别时开发环境默认 debug，其他环境默认 info。

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::Environment;
use crate::constants::{LOGGING_FILTER, LOGGING_FORMAT, LOGGING_LEVEL};
use crate::error::{ApplicationError, ApplicationResult};

/// 依赖库中输出过于频繁的目标，默认压到 warn
const QUIET_TARGETS: &[&str] = &["hyper", "mio", "notify", "globset"];

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    /// 多行输出，开发时阅读方便
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" | "full" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// None 时按运行环境决定
    pub level: Option<Level>,
    pub format: LogFormat,
    /// 完整的 EnvFilter 指令，设置后忽略 `level`，例如 "trees_web=debug,tower_http=info"
    pub filter: Option<String>,
    pub show_target: bool,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    /// 进程启动时的默认值，`RUST_LOG` 存在时作为过滤器
    pub fn from_env() -> Self {
        Self {
            filter: std::env::var("RUST_LOG").ok().filter(|s| !s.trim().is_empty()),
            ..Self::default()
        }
    }

    /// 用 `logging.*` 配置覆盖当前值，未设置级别时按 `app.env` 补齐
    ///
    /// 配置了 `logging.level` 时丢弃继承来的过滤器（例如 `RUST_LOG`），
    /// 只有 `logging.filter` 能再次给出完整指令
    pub fn merge_environment(mut self, env: &Environment) -> Self {
        if let Some(raw) = env.get_string(LOGGING_LEVEL) {
            match raw.parse::<Level>() {
                Ok(level) => {
                    self.level = Some(level);
                    self.filter = None;
                }
                Err(_) => eprintln!("Ignoring invalid {} '{}'", LOGGING_LEVEL, raw),
            }
        }
        if let Some(raw) = env.get_string(LOGGING_FORMAT) {
            match raw.parse::<LogFormat>() {
                Ok(format) => self.format = format,
                Err(e) => eprintln!("Ignoring {}: {}", LOGGING_FORMAT, e),
            }
        }
        if let Some(filter) = env.get_string(LOGGING_FILTER) {
            self.filter = Some(filter);
        }

        if self.level.is_none() {
            self.level = Some(if env.is_development() {
                Level::DEBUG
            } else {
                Level::INFO
            });
        }
        self
    }

    /// 过滤指令：显式 filter 优先，否则为 `{level}` 加上噪声目标的 warn 限制
    pub fn directives(&self) -> String {
        if let Some(filter) = &self.filter {
            return filter.clone();
        }

        let level = self.level.unwrap_or(Level::INFO).to_string().to_ascii_lowercase();
        std::iter::once(level)
            .chain(QUIET_TARGETS.iter().map(|target| format!("{}=warn", target)))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// 安装全局订阅者，已经安装过时返回错误
    pub fn init(self) -> ApplicationResult<()> {
        let directives = self.directives();
        let filter = EnvFilter::try_new(&directives)
            .map_err(|e| ApplicationError::LoggingInitFailed(format!("{}: {}", directives, e)))?;

        let layer: Box<dyn Layer<Registry> + Send + Sync> = match self.format {
            LogFormat::Compact => fmt::layer()
                .compact()
                .with_target(self.show_target)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .pretty()
                .with_target(self.show_target)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_target(self.show_target)
                .boxed(),
        };

        tracing_subscriber::registry()
            .with(layer)
            .with(filter)
            .try_init()
            .map_err(|e| ApplicationError::LoggingInitFailed(e.to_string()))
    }
}
