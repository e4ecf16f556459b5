// trees-core: Trees 框架的容器与启动生命周期
//
// 提供：
// - 以类型为键的服务容器（单例 / 延迟单例 / 原型）
// - 服务提供者的 register -> boot 生命周期
// - 分层配置（TOML 文件、profile、环境变量）
// - 基于 tracing 的日志初始化

pub mod app;
pub mod config;
pub mod constants;
pub mod container;
pub mod error;
pub mod logging;
pub mod provider;
pub mod scope;

pub use app::{Application, TreesApplication};
pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
};
pub use container::Container;
pub use error::{
    ApplicationError, ApplicationResult, ConfigError, ContainerError, ContainerResult,
    ProviderError,
};
pub use logging::{LogFormat, LoggingConfig};
pub use provider::{ProviderRegistry, ProviderState, ServiceProvider};
pub use scope::Scope;

// 导出 async_trait，实现 ServiceProvider 时使用
pub use async_trait;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::app::{Application, TreesApplication};
    pub use crate::config::{ConfigValue, Environment, MapPropertySource, PropertySource};
    pub use crate::container::Container;
    pub use crate::error::{
        ApplicationError, ApplicationResult, ContainerError, ContainerResult, Result,
    };
    pub use crate::logging::{LogFormat, LoggingConfig};
    pub use crate::provider::{ServiceProvider, ProviderState};
    pub use crate::scope::Scope;
    pub use anyhow::{anyhow, Context};
    pub use async_trait::async_trait;
}
