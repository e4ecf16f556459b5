//! Service Worker 与静态资源缓存
//!
//! 浏览器端：[`ServiceWorker::script`] 生成 `sw.js`，安装时预缓存固定的资源列表，
//! 激活时清理旧版本缓存，请求时优先读缓存、未命中再走网络。
//!
//! 服务端：[`AssetCache`] 对 `/assets/*` 采用同样的缓存优先策略，
//! 启动时把预缓存列表加载进内存，之后即使源不可用也能返回这些资源。

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use thiserror::Error;

use crate::constants::ASSETS_MOUNT;

/// 资源加载错误
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Asset '{0}' not found")]
    NotFound(String),

    /// 路径包含 `..` 等越界片段
    #[error("Invalid asset path '{0}'")]
    InvalidPath(String),

    #[error("Failed to read asset '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Asset source unavailable: {0}")]
    Unavailable(String),
}

/// 单个静态资源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub bytes: Bytes,
    pub content_type: &'static str,
}

/// 缓存命中情况
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// 资源来源（相对缓存而言的“网络”）
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// `path` 是相对资源根目录的路径，例如 `css/app.css`
    async fn load(&self, path: &str) -> Result<Asset, AssetError>;
}

/// 从磁盘目录读取资源
#[derive(Debug, Clone)]
pub struct FsAssetSource {
    root: PathBuf,
}

impl FsAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, AssetError> {
        let relative = Path::new(path.trim_start_matches('/'));
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || path.is_empty() {
            return Err(AssetError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl AssetSource for FsAssetSource {
    async fn load(&self, path: &str) -> Result<Asset, AssetError> {
        let file = self.resolve(path)?;
        match tokio::fs::read(&file).await {
            Ok(bytes) => Ok(Asset {
                bytes: Bytes::from(bytes),
                content_type: content_type_for(path),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AssetError::NotFound(path.to_string()))
            }
            Err(source) => Err(AssetError::Io {
                path: path.to_string(),
                source,
            }),
        }
    }
}

/// 根据扩展名推断 Content-Type
pub fn content_type_for(path: &str) -> &'static str {
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "json" | "webmanifest" => "application/json",
        "html" | "htm" => "text/html; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// 服务端资源缓存
pub struct AssetCache {
    precache: Vec<String>,
    entries: RwLock<HashMap<String, Asset>>,
    source: Arc<dyn AssetSource>,
}

impl AssetCache {
    /// `precache` 中的条目是 URL（例如 `/assets/css/app.css`），
    /// 只有挂载在 `/assets/` 下的条目会在服务端缓存
    pub fn new(source: Arc<dyn AssetSource>, precache: Vec<String>) -> Self {
        let precache = precache
            .iter()
            .filter_map(|url| url.strip_prefix(ASSETS_MOUNT))
            .map(String::from)
            .collect();

        Self {
            precache,
            entries: RwLock::new(HashMap::new()),
            source,
        }
    }

    /// 需要预缓存的相对路径
    pub fn precache_paths(&self) -> &[String] {
        &self.precache
    }

    /// 把预缓存列表全部加载进内存，任意一个失败都视为启动失败
    pub async fn precache_all(&self) -> Result<usize, AssetError> {
        for path in &self.precache {
            let asset = self.source.load(path).await?;
            tracing::debug!(path = %path, bytes = asset.bytes.len(), "Asset precached");
            self.entries.write().insert(path.clone(), asset);
        }
        Ok(self.precache.len())
    }

    /// 缓存优先，未命中时从源加载；非预缓存条目不写入缓存
    pub async fn fetch(&self, path: &str) -> Result<(Asset, CacheStatus), AssetError> {
        if let Some(asset) = self.entries.read().get(path).cloned() {
            return Ok((asset, CacheStatus::Hit));
        }

        let asset = self.source.load(path).await?;
        if self.precache.iter().any(|p| p == path) {
            self.entries.write().insert(path.to_string(), asset.clone());
        }
        Ok((asset, CacheStatus::Miss))
    }

    pub fn is_cached(&self, path: &str) -> bool {
        self.entries.read().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl std::fmt::Debug for AssetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetCache")
            .field("precache", &self.precache)
            .field("cached", &self.len())
            .finish()
    }
}

/// 浏览器端 Service Worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceWorker {
    pub cache_name: String,
    pub precache: Vec<String>,
}

impl ServiceWorker {
    pub fn new(cache_name: impl Into<String>, precache: Vec<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            precache,
        }
    }

    /// 生成 `sw.js` 内容
    pub fn script(&self) -> String {
        // 通过 serde_json 转义，保证生成合法的 JS 字面量
        let cache_name =
            serde_json::to_string(&self.cache_name).unwrap_or_else(|_| "\"trees\"".to_string());
        let precache = serde_json::to_string(&self.precache).unwrap_or_else(|_| "[]".to_string());

        format!(
            r#"const CACHE_NAME = {cache_name};
const PRECACHE_URLS = {precache};

self.addEventListener('install', (event) => {{
  event.waitUntil(
    caches.open(CACHE_NAME)
      .then((cache) => cache.addAll(PRECACHE_URLS))
      .then(() => self.skipWaiting())
  );
}});

self.addEventListener('activate', (event) => {{
  event.waitUntil(
    caches.keys()
      .then((names) => Promise.all(
        names.filter((name) => name !== CACHE_NAME).map((name) => caches.delete(name))
      ))
      .then(() => self.clients.claim())
  );
}});

self.addEventListener('fetch', (event) => {{
  if (event.request.method !== 'GET') {{
    return;
  }}
  event.respondWith(
    caches.match(event.request).then((cached) => cached || fetch(event.request))
  );
}});
"#
        )
    }
}
