//! Web 层的服务提供者
//!
//! | 提供者 | register | boot |
//! |---|---|---|
//! | [`SessionServiceProvider`] | 绑定 `SessionStore` | 输出配置 |
//! | [`ViewServiceProvider`] | 绑定 `TemplateEngine` | 按配置启动模板热加载 |
//! | [`RouteServiceProvider`] | 绑定空的 `Router` | 加载路由定义、输出路由表、冻结路由 |
//! | [`AssetServiceProvider`] | 绑定 `AssetCache` 和 `ServiceWorker` | 预缓存静态资源 |

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use trees_core::{Container, Environment, ServiceProvider};

use crate::constants::*;
use crate::router::{Router, RouterError};
use crate::service_worker::{AssetCache, AssetSource, FsAssetSource, ServiceWorker};
use crate::session::SessionStore;
use crate::view::TemplateEngine;

// ==================== Session ====================

/// 会话提供者
#[derive(Debug, Default)]
pub struct SessionServiceProvider;

#[async_trait]
impl ServiceProvider for SessionServiceProvider {
    fn name(&self) -> &str {
        "SessionServiceProvider"
    }

    fn register(&self, container: &mut Container) -> anyhow::Result<()> {
        let env = container.make::<Environment>()?;
        let cookie_name = env.get_string_or(SESSION_COOKIE_NAME, DEFAULT_SESSION_COOKIE);
        container.singleton(SessionStore::new(cookie_name));
        Ok(())
    }

    async fn boot(&self, container: &Container) -> anyhow::Result<()> {
        let store = container.make::<SessionStore>()?;
        tracing::info!(cookie = %store.cookie_name(), "Session store ready (in-memory)");
        Ok(())
    }
}

// ==================== View ====================

/// 视图提供者
///
/// 默认按 `view.pattern` 从磁盘加载模板，`with_engine` 可以直接指定引擎
#[derive(Default)]
pub struct ViewServiceProvider {
    engine: Mutex<Option<TemplateEngine>>,
}

impl ViewServiceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(engine: TemplateEngine) -> Self {
        Self {
            engine: Mutex::new(Some(engine)),
        }
    }
}

#[async_trait]
impl ServiceProvider for ViewServiceProvider {
    fn name(&self) -> &str {
        "ViewServiceProvider"
    }

    fn register(&self, container: &mut Container) -> anyhow::Result<()> {
        let engine = match self.engine.lock().take() {
            Some(engine) => engine,
            None => {
                let env = container.make::<Environment>()?;
                let pattern = env.get_string_or(VIEW_PATTERN, DEFAULT_VIEW_PATTERN);
                TemplateEngine::from_glob(&pattern)?
            }
        };
        container.singleton(engine);
        Ok(())
    }

    async fn boot(&self, container: &Container) -> anyhow::Result<()> {
        let env = container.make::<Environment>()?;
        let engine = container.make::<TemplateEngine>()?;

        // 未配置时只在开发环境启用
        if env.get_bool_or(VIEW_HOT_RELOAD, env.is_development()) {
            let pattern = env.get_string_or(VIEW_PATTERN, DEFAULT_VIEW_PATTERN);
            if let Err(e) = engine.start_hot_reload(&pattern) {
                tracing::warn!(error = %e, "Template hot reload disabled");
            }
        }

        tracing::info!(templates = engine.template_names().len(), "View engine ready");
        Ok(())
    }
}

// ==================== Route ====================

/// 一组路由定义
pub type RouteDefinitions = fn(&Router) -> Result<(), RouterError>;

/// 路由提供者
///
/// ```ignore
/// RouteServiceProvider::new()
///     .load("web", routes::web)
///     .load("api", routes::api)
/// ```
#[derive(Default)]
pub struct RouteServiceProvider {
    sets: Vec<(&'static str, RouteDefinitions)>,
}

impl RouteServiceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一组路由定义，启动时按追加顺序加载
    pub fn load(mut self, name: &'static str, definitions: RouteDefinitions) -> Self {
        self.sets.push((name, definitions));
        self
    }
}

#[async_trait]
impl ServiceProvider for RouteServiceProvider {
    fn name(&self) -> &str {
        "RouteServiceProvider"
    }

    fn register(&self, container: &mut Container) -> anyhow::Result<()> {
        container.singleton(Router::new());
        Ok(())
    }

    async fn boot(&self, container: &Container) -> anyhow::Result<()> {
        let router = container.make::<Router>()?;

        for (name, definitions) in &self.sets {
            let before = router.len();
            definitions(&router).with_context(|| format!("failed to load '{}' routes", name))?;
            tracing::debug!("Loaded {} route(s) from '{}'", router.len() - before, name);
        }

        for route in router.routes() {
            tracing::info!("  {}", route);
        }
        router.seal();

        tracing::info!("Mapped {} route(s)", router.len());
        Ok(())
    }
}

// ==================== Asset ====================

/// 静态资源提供者
///
/// 默认从 `{assets.public-dir}/assets` 读取资源，`with_source` 可以替换资源来源
#[derive(Default)]
pub struct AssetServiceProvider {
    source: Option<Arc<dyn AssetSource>>,
}

impl AssetServiceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(source: Arc<dyn AssetSource>) -> Self {
        Self {
            source: Some(source),
        }
    }
}

#[async_trait]
impl ServiceProvider for AssetServiceProvider {
    fn name(&self) -> &str {
        "AssetServiceProvider"
    }

    fn register(&self, container: &mut Container) -> anyhow::Result<()> {
        let env = container.make::<Environment>()?;
        let cache_name = env.get_string_or(ASSETS_CACHE_NAME, DEFAULT_CACHE_NAME);
        let precache = env.get_string_array(ASSETS_PRECACHE).unwrap_or_default();

        let source = match &self.source {
            Some(source) => Arc::clone(source),
            None => {
                let public_dir = env.get_string_or(ASSETS_PUBLIC_DIR, DEFAULT_PUBLIC_DIR);
                let root = Path::new(&public_dir).join(ASSETS_MOUNT.trim_matches('/'));
                Arc::new(FsAssetSource::new(root)) as Arc<dyn AssetSource>
            }
        };

        container.singleton(AssetCache::new(source, precache.clone()));
        container.singleton(ServiceWorker::new(cache_name, precache));
        Ok(())
    }

    async fn boot(&self, container: &Container) -> anyhow::Result<()> {
        let cache = container.make::<AssetCache>()?;
        let count = cache
            .precache_all()
            .await
            .context("failed to precache assets")?;

        let worker = container.make::<ServiceWorker>()?;
        tracing::info!(cache = %worker.cache_name, assets = count, "Assets precached");
        Ok(())
    }
}
