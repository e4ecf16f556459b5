//! 会话存储
//!
//! 进程内的会话表，会话 ID 通过 Cookie 传递。只提供键值读写，不做持久化和过期清理；
//! 会话在第一次写入时才进入会话表，只读的请求不会留下记录。

use std::collections::HashMap;
use std::sync::Arc;

use http::header::{HeaderValue, COOKIE};
use http::HeaderMap;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// 会话存储
#[derive(Debug)]
pub struct SessionStore {
    cookie_name: String,
    sessions: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl SessionStore {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// 根据请求头中的 Cookie 找回会话
    ///
    /// 没有有效 Cookie 时返回一个尚未落库的会话，第一次写入时才分配 ID
    pub fn start(self: &Arc<Self>, headers: &HeaderMap) -> Session {
        let id = match self.cookie_value(headers) {
            Some(id) if self.sessions.read().contains_key(&id) => Some(id),
            Some(_) => {
                tracing::debug!("Unknown session id in cookie, deferring a new session");
                None
            }
            None => None,
        };

        Session {
            store: Arc::clone(self),
            slot: Arc::new(Mutex::new(SessionSlot { id, is_new: false })),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    fn cookie_value(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value.to_string())
    }
}

#[derive(Debug)]
struct SessionSlot {
    id: Option<String>,
    is_new: bool,
}

/// 单个会话的句柄
///
/// 克隆出的句柄共享同一个会话，分发层据此在响应上补 Set-Cookie
#[derive(Clone)]
pub struct Session {
    store: Arc<SessionStore>,
    slot: Arc<Mutex<SessionSlot>>,
}

impl Session {
    /// 尚未写入过的新会话没有 ID
    pub fn id(&self) -> Option<String> {
        self.slot.lock().id.clone()
    }

    /// 本次请求中新建的会话需要下发 Set-Cookie
    pub fn is_new(&self) -> bool {
        self.slot.lock().is_new
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let id = self.id()?;
        let sessions = self.store.sessions.read();
        let value = sessions.get(&id)?.get(key)?.clone();
        serde_json::from_value(value).ok()
    }

    pub fn put<T: Serialize>(&self, key: impl Into<String>, value: T) -> serde_json::Result<()> {
        let value = serde_json::to_value(value)?;

        let mut slot = self.slot.lock();
        let id = match &slot.id {
            Some(id) => id.clone(),
            None => {
                let id = uuid::Uuid::new_v4().simple().to_string();
                tracing::debug!("Starting new session");
                slot.id = Some(id.clone());
                slot.is_new = true;
                id
            }
        };

        self.store
            .sessions
            .write()
            .entry(id)
            .or_default()
            .insert(key.into(), value);
        Ok(())
    }

    pub fn forget(&self, key: &str) {
        let Some(id) = self.id() else { return };
        if let Some(data) = self.store.sessions.write().get_mut(&id) {
            data.remove(key);
        }
    }

    /// Set-Cookie 头的值，会话还没有 ID 时为 None
    pub fn cookie(&self) -> Option<HeaderValue> {
        let id = self.id()?;
        HeaderValue::from_str(&format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            self.store.cookie_name, id
        ))
        .ok()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("Session")
            .field("id", &slot.id)
            .field("is_new", &slot.is_new)
            .finish()
    }
}
