//! 分层配置
//!
//! [`Environment`] 按优先级持有多个 [`PropertySource`]，查询时取优先级最高的命中值。
//! 键统一为点分形式，例如 `server.port`、`assets.precache`。
//!
//! 默认的层次（优先级从低到高）：
//!
//! | 来源 | 优先级 |
//! |---|---|
//! | `application.toml` | 0 |
//! | `application-{profile}.toml` | 10 + profile 序号 |
//! | 代码中添加的 `MapPropertySource` | 50 |
//! | `TREES_*` 环境变量 | 100 |

use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;

use crate::constants::{APP_ENV, ENV_DEVELOPMENT, ENV_PRODUCTION};
use crate::error::ConfigError;

/// 配置值
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<ConfigValue>),
    /// 只出现在数组元素中，顶层表总是被展开成点分键
    Table(HashMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// 环境变量里的值都是字符串，这里一并解析
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// 标量转字符串；数组和表返回 None
    pub fn to_scalar_string(&self) -> Option<String> {
        match self {
            ConfigValue::String(s) => Some(s.clone()),
            ConfigValue::Int(i) => Some(i.to_string()),
            ConfigValue::Float(f) => Some(f.to_string()),
            ConfigValue::Bool(b) => Some(b.to_string()),
            ConfigValue::Array(_) | ConfigValue::Table(_) => None,
        }
    }
}

impl From<toml::Value> for ConfigValue {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => ConfigValue::String(s),
            toml::Value::Integer(i) => ConfigValue::Int(i),
            toml::Value::Float(f) => ConfigValue::Float(f),
            toml::Value::Boolean(b) => ConfigValue::Bool(b),
            toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
            toml::Value::Array(items) => {
                ConfigValue::Array(items.into_iter().map(ConfigValue::from).collect())
            }
            toml::Value::Table(table) => ConfigValue::Table(
                table
                    .into_iter()
                    .map(|(k, v)| (k, ConfigValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// 配置源
pub trait PropertySource: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> Option<ConfigValue>;

    /// 数字越大越优先
    fn priority(&self) -> i32 {
        0
    }
}

/// 配置管理器
pub struct Environment {
    sources: RwLock<Vec<Box<dyn PropertySource>>>,
    active_profiles: RwLock<Vec<String>>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            active_profiles: RwLock::new(Vec::new()),
        }
    }

    /// 同优先级的配置源，先添加者优先
    pub fn add_property_source(&self, source: Box<dyn PropertySource>) {
        tracing::debug!(source = source.name(), priority = source.priority(), "Property source added");
        let mut sources = self.sources.write();
        let at = sources
            .iter()
            .position(|existing| existing.priority() < source.priority())
            .unwrap_or(sources.len());
        sources.insert(at, source);
    }

    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        self.sources.read().iter().find_map(|source| source.get(key))
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key)?.to_scalar_string()
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_owned())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key)?.as_i64()
    }

    pub fn get_i64_or(&self, key: &str, default: i64) -> i64 {
        self.get_i64(key).unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)?.as_bool()
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// 字符串列表：TOML 数组，或者逗号分隔的字符串（来自环境变量时）
    pub fn get_string_array(&self, key: &str) -> Option<Vec<String>> {
        let items = match self.get(key)? {
            ConfigValue::Array(items) => items
                .iter()
                .filter_map(ConfigValue::to_scalar_string)
                .collect(),
            ConfigValue::String(list) => list
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(String::from)
                .collect(),
            _ => return None,
        };
        Some(items)
    }

    pub fn set_active_profiles(&self, profiles: Vec<String>) {
        *self.active_profiles.write() = profiles;
    }

    pub fn active_profiles(&self) -> Vec<String> {
        self.active_profiles.read().clone()
    }

    /// `app.env`，未配置时为 production
    pub fn app_env(&self) -> String {
        self.get_string_or(APP_ENV, ENV_PRODUCTION)
    }

    /// 只有显式配置为 development 时成立，决定是否在错误响应中暴露 trace
    pub fn is_development(&self) -> bool {
        self.app_env().eq_ignore_ascii_case(ENV_DEVELOPMENT)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sources = self.sources.read();
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        f.debug_struct("Environment")
            .field("sources", &names)
            .field("active_profiles", &*self.active_profiles.read())
            .finish()
    }
}

// ==================== 配置源 ====================

/// 以 `{prefix}` 开头的环境变量：`TREES_SERVER_ENABLE_CORS` 对应 `server.enable-cors`
pub struct EnvironmentPropertySource {
    prefix: String,
}

impl EnvironmentPropertySource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn variable_for(&self, key: &str) -> String {
        let mut name = self.prefix.clone();
        name.extend(key.chars().map(|c| match c {
            '.' | '-' => '_',
            c => c.to_ascii_uppercase(),
        }));
        name
    }
}

impl PropertySource for EnvironmentPropertySource {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        std::env::var(self.variable_for(key))
            .ok()
            .map(ConfigValue::String)
    }

    fn priority(&self) -> i32 {
        100
    }
}

/// 点分键到值的内存映射，TOML 文件加载后也是这种形式
#[derive(Debug, Clone)]
pub struct MapPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
            priority: 50,
        }
    }

    /// 读取并展开 TOML 文件，优先级为 0
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content, path.display().to_string())
    }

    /// `[server] port = 8080` 展开为 `server.port = 8080`
    pub fn from_toml_str(content: &str, name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        let table: toml::Table = toml::from_str(content).map_err(|source| ConfigError::Parse {
            name: name.clone(),
            source,
        })?;

        let mut properties = HashMap::new();
        let mut pending: Vec<(String, toml::Value)> = table.into_iter().collect();
        while let Some((key, value)) = pending.pop() {
            match value {
                toml::Value::Table(children) => pending.extend(
                    children
                        .into_iter()
                        .map(|(child, v)| (format!("{}.{}", key, child), v)),
                ),
                other => {
                    properties.insert(key, ConfigValue::from(other));
                }
            }
        }

        Ok(Self {
            name,
            properties,
            priority: 0,
        })
    }

    pub fn with_property(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}
