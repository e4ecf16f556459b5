use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==================== 数据模型 ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub title: String,
    pub summary: String,
    pub venue: String,
    pub city: String,
    pub starts_at: NaiveDateTime,
    /// 票价（分），免费活动为 None
    pub price_cents: Option<u32>,
    pub tags: Vec<String>,
}

/// 分页结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub last_page: usize,
    pub prev_page: Option<usize>,
    pub next_page: Option<usize>,
}
