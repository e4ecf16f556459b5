//! 统一的错误类型
//!
//! 每个子系统有自己的错误枚举，应用层通过 [`ApplicationError`] 聚合。
//! 提供者钩子等用户代码返回 `anyhow::Result`，通过 `.context()` 添加上下文。

use thiserror::Error;

use crate::provider::ProviderState;

/// 容器操作结果
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

/// 应用启动结果
pub type ApplicationResult<T> = std::result::Result<T, ApplicationError>;

/// 通用结果类型（用户代码使用）
pub use anyhow::Result;

/// 容器错误
#[derive(Error, Debug)]
pub enum ContainerError {
    /// 请求的类型没有任何绑定
    #[error("Unresolved binding: no binding registered for type '{type_name}'")]
    UnresolvedBinding { type_name: &'static str },

    /// 绑定工厂返回了错误
    #[error("Failed to build '{type_name}': {message}")]
    FactoryFailed {
        type_name: &'static str,
        message: String,
    },

    /// 解析过程中出现循环依赖
    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    /// 绑定中存储的值与请求的类型不一致
    #[error("Type mismatch: expected '{expected}'")]
    TypeMismatch { expected: &'static str },
}

/// 服务提供者生命周期错误
#[derive(Error, Debug)]
pub enum ProviderError {
    /// 非法的状态迁移，例如未注册就启动或重复启动
    #[error("Provider '{provider}' cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        provider: String,
        from: ProviderState,
        to: ProviderState,
    },

    #[error("Provider '{provider}' failed to register: {source}")]
    RegisterFailed {
        provider: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Provider '{provider}' failed to boot: {source}")]
    BootFailed {
        provider: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// 配置加载错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML from '{name}': {source}")]
    Parse {
        name: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 应用级错误
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Logging initialization failed: {0}")]
    LoggingInitFailed(String),

    #[error("Application '{0}' has already been booted")]
    AlreadyBooted(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
