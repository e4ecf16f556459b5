//! 视图渲染
//!
//! 基于 Tera 模板引擎。[`TemplateEngine`] 是进程内共享的 Bean，
//! [`View`] 是每个请求新建的轻量包装，可以携带本次请求共享给所有模板的变量。
//!
//! ## 使用示例
//!
//! ```ignore
//! let html = view.render("events/show.html", serde_json::json!({
//!     "event": event,
//!     "title": event.title,
//! }))?;
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::Serialize;
use tera::Tera;
use thiserror::Error;
use tokio::sync::mpsc;

/// 模板错误类型
#[derive(Debug, Error)]
pub enum TemplateError {
    /// 模板名称未加载
    #[error("Template '{0}' not found")]
    Missing(String),

    #[error("Failed to render template '{template}': {cause}")]
    Render { template: String, cause: String },

    /// 传入的数据无法转换为模板变量表（必须是键值映射）
    #[error("Invalid data for template '{template}': {cause}")]
    InvalidData { template: String, cause: String },

    #[error("Template initialization error: {0}")]
    Init(String),
}

/// 模板引擎
#[derive(Clone)]
pub struct TemplateEngine {
    tera: Arc<RwLock<Tera>>,
    hot_reload: Arc<AtomicBool>,
}

impl TemplateEngine {
    /// 从 glob 加载模板，例如 "templates/**/*.html"
    pub fn from_glob(pattern: &str) -> Result<Self, TemplateError> {
        let tera = Tera::new(pattern).map_err(|e| {
            TemplateError::Init(format!("pattern '{}': {}", pattern, error_chain(&e)))
        })?;

        tracing::info!(
            pattern = %pattern,
            templates = tera.get_template_names().count(),
            "Template engine created"
        );

        Ok(Self::from_tera(tera))
    }

    /// 从内存中的模板源码构建（测试和内嵌模板使用）
    pub fn from_raw<'a, I>(templates: I) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| TemplateError::Init(error_chain(&e)))?;
        Ok(Self::from_tera(tera))
    }

    fn from_tera(mut tera: Tera) -> Self {
        tera.autoescape_on(vec![".html", ".htm"]);
        Self {
            tera: Arc::new(RwLock::new(tera)),
            hot_reload: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.read().get_template_names().any(|n| n == name)
    }

    pub fn template_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tera
            .read()
            .get_template_names()
            .map(String::from)
            .collect();
        names.sort();
        names
    }

    /// 渲染模板
    pub fn render(&self, template: &str, context: &tera::Context) -> Result<String, TemplateError> {
        let tera = self.tera.read();
        if !tera.get_template_names().any(|n| n == template) {
            tracing::error!(template = %template, "Template not found");
            return Err(TemplateError::Missing(template.to_string()));
        }

        tera.render(template, context).map_err(|e| {
            let cause = error_chain(&e);
            tracing::error!(template = %template, error = %cause, "Template render error");
            TemplateError::Render {
                template: template.to_string(),
                cause,
            }
        })
    }

    /// 监听模板目录，文件变化后重新加载全部模板
    ///
    /// 需要在 tokio 运行时中调用，重复调用不会重复监听
    pub fn start_hot_reload(&self, pattern: &str) -> Result<(), TemplateError> {
        if self.is_hot_reload_enabled() {
            return Ok(());
        }

        let dir = watch_dir(pattern);
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    tracing::debug!(event = ?event.kind, "Template file changed");
                    let _ = tx.send(());
                }
                Err(e) => tracing::error!(error = ?e, "File watching error"),
            }
        })
        .map_err(|e| TemplateError::Init(format!("watcher: {}", e)))?;

        watcher
            .watch(&dir, RecursiveMode::Recursive)
            .map_err(|e| TemplateError::Init(format!("watch {}: {}", dir.display(), e)))?;

        let tera = Arc::clone(&self.tera);
        tokio::spawn(async move {
            // watcher 必须和任务一起存活
            let _watcher = watcher;
            while rx.recv().await.is_some() {
                // 合并短时间内的连续事件
                tokio::time::sleep(Duration::from_millis(300)).await;
                while rx.try_recv().is_ok() {}

                match tera.write().full_reload() {
                    Ok(()) => tracing::info!("Templates reloaded"),
                    Err(e) => tracing::error!(error = %error_chain(&e), "Template reload failed"),
                }
            }
        });

        self.hot_reload.store(true, Ordering::SeqCst);
        tracing::info!(path = %dir.display(), "Template hot reload started");
        Ok(())
    }

    pub fn is_hot_reload_enabled(&self) -> bool {
        self.hot_reload.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("templates", &self.template_names())
            .field("hot_reload", &self.is_hot_reload_enabled())
            .finish()
    }
}

/// "templates/**/*.html" -> "templates"
fn watch_dir(pattern: &str) -> PathBuf {
    let head = pattern.split('*').next().unwrap_or(pattern);
    let head = head.trim_end_matches('/');
    if head.is_empty() {
        PathBuf::from(".")
    } else {
        PathBuf::from(head)
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// 每个请求一个的视图
///
/// `share` 写入的变量对本次请求渲染的所有模板可见，`render` 传入的数据优先
#[derive(Debug, Clone)]
pub struct View {
    engine: Arc<TemplateEngine>,
    shared: tera::Context,
}

impl View {
    pub fn new(engine: Arc<TemplateEngine>) -> Self {
        Self {
            engine,
            shared: tera::Context::new(),
        }
    }

    /// 没有任何模板的视图（只返回 JSON 的控制器使用）
    pub fn empty() -> Self {
        Self::new(Arc::new(TemplateEngine::from_tera(Tera::default())))
    }

    pub fn share<V: Serialize + ?Sized>(&mut self, key: impl Into<String>, value: &V) {
        self.shared.insert(key, value);
    }

    /// 渲染模板，`data` 的顶层键成为模板变量
    pub fn render<D: Serialize>(&self, template: &str, data: D) -> Result<String, TemplateError> {
        let data = tera::Context::from_serialize(data).map_err(|e| TemplateError::InvalidData {
            template: template.to_string(),
            cause: error_chain(&e),
        })?;

        let mut context = self.shared.clone();
        context.extend(data);
        self.engine.render(template, &context)
    }

    pub fn engine(&self) -> &Arc<TemplateEngine> {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn view() -> View {
        let engine = TemplateEngine::from_raw([
            ("hello.html", "Hello {{ name }} from {{ app }}"),
            ("broken.html", "{{ missing_var }}"),
            ("list.html", "{% for e in events %}[{{ e }}]{% endfor %}"),
        ])
        .unwrap();
        View::new(Arc::new(engine))
    }

    #[test]
    fn test_render_exposes_data_keys_as_variables() {
        let mut view = view();
        view.share("app", "Eventlyy");
        let html = view.render("hello.html", json!({ "name": "Ada" })).unwrap();
        assert_eq!(html, "Hello Ada from Eventlyy");
    }

    #[test]
    fn test_render_data_overrides_shared() {
        let mut view = view();
        view.share("app", "Shared");
        let html = view
            .render("hello.html", json!({ "name": "Ada", "app": "Local" }))
            .unwrap();
        assert_eq!(html, "Hello Ada from Local");
    }

    #[test]
    fn test_html_is_escaped() {
        let mut view = view();
        view.share("app", "x");
        let html = view.render("hello.html", json!({ "name": "<b>" })).unwrap();
        assert_eq!(html, "Hello &lt;b&gt; from x");
    }

    #[test]
    fn test_missing_template() {
        let err = view().render("nope.html", json!({})).unwrap_err();
        assert!(matches!(err, TemplateError::Missing(name) if name == "nope.html"));
    }

    #[test]
    fn test_render_failure_on_undefined_variable() {
        let err = view().render("broken.html", json!({})).unwrap_err();
        assert!(matches!(err, TemplateError::Render { .. }));
    }

    #[test]
    fn test_non_mapping_data_is_rejected() {
        let err = view().render("list.html", json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidData { .. }));
    }

    #[test]
    fn test_watch_dir() {
        assert_eq!(watch_dir("templates/**/*.html"), PathBuf::from("templates"));
        assert_eq!(watch_dir("*.html"), PathBuf::from("."));
    }
}
