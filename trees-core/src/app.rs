use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{Environment, EnvironmentPropertySource, MapPropertySource, PropertySource};
use crate::constants::{APP_NAME, DEFAULT_CONFIG_FILE, DEFAULT_ENV_PREFIX, PROFILES_ACTIVE_SUFFIX};
use crate::container::Container;
use crate::error::{ApplicationError, ApplicationResult};
use crate::logging::LoggingConfig;
use crate::provider::{ProviderRegistry, ProviderState, ServiceProvider};

/// 应用构建器
///
/// 负责加载配置、初始化日志并收集服务提供者，`build()` 之后得到一个
/// 尚未启动的 [`Application`]。
pub struct TreesApplication {
    name: String,
    config_files: Vec<String>,
    env_prefix: String,
    profiles: Vec<String>,
    show_banner: bool,
    logging_config: Option<LoggingConfig>,
    extra_sources: Vec<Box<dyn PropertySource>>,
    providers: ProviderRegistry,
}

impl TreesApplication {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config_files: vec![DEFAULT_CONFIG_FILE.to_string()],
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            profiles: Vec::new(),
            show_banner: true,
            logging_config: Some(LoggingConfig::from_env()),
            extra_sources: Vec::new(),
            providers: ProviderRegistry::new(),
        }
    }

    /// 设置配置文件路径
    pub fn config_file(mut self, path: impl Into<String>) -> Self {
        self.config_files = vec![path.into()];
        self
    }

    pub fn config_files(mut self, paths: Vec<String>) -> Self {
        self.config_files = paths;
        self
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn profiles(mut self, profiles: Vec<String>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn banner(mut self, show: bool) -> Self {
        self.show_banner = show;
        self
    }

    /// 设置日志配置，传入 None 时不安装订阅者（测试中使用）
    pub fn logging(mut self, config: Option<LoggingConfig>) -> Self {
        self.logging_config = config;
        self
    }

    pub fn logging_config(&self) -> Option<&LoggingConfig> {
        self.logging_config.as_ref()
    }

    /// 追加一个配置源（例如测试中的 MapPropertySource）
    pub fn property_source(mut self, source: Box<dyn PropertySource>) -> Self {
        self.extra_sources.push(source);
        self
    }

    /// 添加服务提供者，注册和启动都按添加顺序进行
    pub fn provider(mut self, provider: impl ServiceProvider + 'static) -> Self {
        self.providers.add(Box::new(provider));
        self
    }

    /// 构建应用：加载配置、初始化日志、绑定 Environment
    pub fn build(self) -> ApplicationResult<Application> {
        let environment = Arc::new(Environment::new());

        let active_profiles = self.resolve_profiles();
        self.load_configurations(&environment, &active_profiles)?;
        for source in self.extra_sources {
            environment.add_property_source(source);
        }
        environment.add_property_source(Box::new(EnvironmentPropertySource::new(&self.env_prefix)));
        environment.set_active_profiles(active_profiles.clone());

        if let Some(config) = self.logging_config {
            // 订阅者已经安装时不视为致命错误
            if let Err(e) = config.merge_environment(&environment).init() {
                tracing::debug!("Skipping logging initialization: {}", e);
            }
        }

        if self.show_banner {
            print_banner();
        }

        let name = environment.get_string(APP_NAME).unwrap_or(self.name);
        tracing::info!("Starting {} application", name);
        if active_profiles.is_empty() {
            tracing::info!("No active profiles set, using default configuration");
        } else {
            tracing::info!("Active profiles: {:?}", active_profiles);
        }
        tracing::debug!("Environment variable prefix: {}", self.env_prefix);

        let mut container = Container::new();
        container.singleton_arc(Arc::clone(&environment));

        Ok(Application {
            name,
            environment,
            container,
            providers: self.providers,
            booted: false,
        })
    }

    /// 代码设置优先，其次是 `{prefix}PROFILES_ACTIVE`
    fn resolve_profiles(&self) -> Vec<String> {
        if !self.profiles.is_empty() {
            return self.profiles.clone();
        }
        std::env::var(format!("{}{}", self.env_prefix, PROFILES_ACTIVE_SUFFIX))
            .map(|profiles| {
                profiles
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 加载顺序（优先级从低到高）：
    /// 1. application.toml
    /// 2. application-{profile}.toml
    fn load_configurations(
        &self,
        environment: &Environment,
        active_profiles: &[String],
    ) -> ApplicationResult<()> {
        for base in &self.config_files {
            load_config_file(environment, base, 0)?;
        }

        for (index, profile) in active_profiles.iter().enumerate() {
            for base in &self.config_files {
                let profile_config = profile_config_path(base, profile);
                load_config_file(environment, &profile_config, 10 + index as i32)?;
            }
        }
        Ok(())
    }
}

impl Default for TreesApplication {
    fn default() -> Self {
        Self::new("TreesApplication")
    }
}

/// application.toml -> application-dev.toml
fn profile_config_path(base_path: &str, profile: &str) -> String {
    match base_path.rfind('.') {
        Some(dot) => {
            let (name, ext) = base_path.split_at(dot);
            format!("{}-{}{}", name, profile, ext)
        }
        None => format!("{}-{}", base_path, profile),
    }
}

/// 文件不存在时跳过，解析失败时返回错误
fn load_config_file(environment: &Environment, path: &str, priority: i32) -> ApplicationResult<()> {
    if !Path::new(path).exists() {
        tracing::debug!("Configuration file not found: {}", path);
        return Ok(());
    }

    let source = MapPropertySource::from_toml_file(path)?.with_priority(priority);
    environment.add_property_source(Box::new(source));
    tracing::info!("Loaded configuration from: {} (priority: {})", path, priority);
    Ok(())
}

fn print_banner() {
    println!();
    println!(r"  _____                   ");
    println!(r" |_   _| __ ___  ___  ___ ");
    println!(r"   | || '__/ _ \/ _ \/ __|");
    println!(r"   | || | |  __/  __/\__ \");
    println!(r"   |_||_|  \___|\___||___/");
    println!();
    println!("  :: Trees Framework ::   (v{})", env!("CARGO_PKG_VERSION"));
    println!();
}

/// 已构建的应用
///
/// 持有容器、配置和提供者注册表。`boot()` 成功之后容器内容不再变化，
/// 可以放进 `Arc` 在请求之间共享。
pub struct Application {
    name: String,
    environment: Arc<Environment>,
    container: Container,
    providers: ProviderRegistry,
    booted: bool,
}

impl Application {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn is_booted(&self) -> bool {
        self.booted
    }

    pub fn provider_states(&self) -> Vec<(&str, ProviderState)> {
        self.providers.states()
    }

    /// 依次执行所有提供者的 register 和 boot
    ///
    /// 任何一步失败都会中止启动，错误原样返回给调用方
    pub async fn boot(&mut self) -> ApplicationResult<()> {
        if self.booted {
            return Err(ApplicationError::AlreadyBooted(self.name.clone()));
        }

        let start = Instant::now();

        self.providers.register_all(&mut self.container).map_err(|e| {
            tracing::error!("Provider registration failed: {}", e);
            e
        })?;
        tracing::info!(
            "Registered {} provider(s), {} binding(s)",
            self.providers.len(),
            self.container.len()
        );

        self.providers.boot_all(&self.container).await.map_err(|e| {
            tracing::error!("Provider boot failed: {}", e);
            e
        })?;

        self.booted = true;
        tracing::info!("Started {} in {}ms", self.name, start.elapsed().as_millis());
        Ok(())
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.name)
            .field("booted", &self.booted)
            .field("container", &self.container)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigValue, MapPropertySource};
    use async_trait::async_trait;

    struct Greeting(String);

    struct GreetingProvider;

    #[async_trait]
    impl ServiceProvider for GreetingProvider {
        fn name(&self) -> &str {
            "greeting"
        }

        fn register(&self, container: &mut Container) -> anyhow::Result<()> {
            container.lazy(|c| {
                let env = c.make::<Environment>()?;
                Ok(Greeting(format!("hello from {}", env.app_env())))
            });
            Ok(())
        }

        async fn boot(&self, container: &Container) -> anyhow::Result<()> {
            container.make::<Greeting>()?;
            Ok(())
        }
    }

    struct NeedsMissing;

    struct Missing;

    #[async_trait]
    impl ServiceProvider for NeedsMissing {
        fn name(&self) -> &str {
            "needs-missing"
        }

        fn register(&self, _container: &mut Container) -> anyhow::Result<()> {
            Ok(())
        }

        async fn boot(&self, container: &Container) -> anyhow::Result<()> {
            container.make::<Missing>()?;
            Ok(())
        }
    }

    fn builder() -> TreesApplication {
        TreesApplication::new("test")
            .config_files(Vec::new())
            .banner(false)
            .logging(None)
            .property_source(Box::new(
                MapPropertySource::new("test")
                    .with_property("app.env", ConfigValue::String("staging".to_string())),
            ))
    }

    #[tokio::test]
    async fn test_boot_resolves_environment_binding() {
        let mut app = builder().provider(GreetingProvider).build().unwrap();
        app.boot().await.unwrap();

        assert!(app.is_booted());
        let greeting = app.container().make::<Greeting>().unwrap();
        assert_eq!(greeting.0, "hello from staging");
    }

    #[tokio::test]
    async fn test_unresolved_dependency_during_boot_is_fatal() {
        let mut app = builder().provider(NeedsMissing).build().unwrap();
        let err = app.boot().await.unwrap_err();

        assert!(!app.is_booted());
        assert!(err.to_string().contains("needs-missing"));
        assert!(matches!(err, ApplicationError::Provider(_)));
    }

    #[tokio::test]
    async fn test_boot_twice_fails() {
        let mut app = builder().build().unwrap();
        app.boot().await.unwrap();
        assert!(matches!(
            app.boot().await,
            Err(ApplicationError::AlreadyBooted(_))
        ));
    }

    #[test]
    fn test_profile_config_path() {
        assert_eq!(
            profile_config_path("application.toml", "dev"),
            "application-dev.toml"
        );
        assert_eq!(profile_config_path("config", "prod"), "config-prod");
    }
}
