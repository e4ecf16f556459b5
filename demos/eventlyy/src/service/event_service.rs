use anyhow::Context;
use chrono::NaiveDateTime;

use crate::models::{Event, Page};

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// (title, summary, venue, city, starts_at, price_cents, tags)
type Seed = (
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    Option<u32>,
    &'static [&'static str],
);

const SEED: &[Seed] = &[
    (
        "Rust Meetup: Async in Practice",
        "Three short talks on tokio, cancellation and structured concurrency.",
        "The Foundry",
        "Berlin",
        "2026-11-05T19:00",
        None,
        &["tech", "meetup"],
    ),
    (
        "Autumn Jazz Night",
        "A quartet from Lisbon plays standards and originals.",
        "Blue Room",
        "Lisbon",
        "2026-11-08T21:00",
        Some(2500),
        &["music"],
    ),
    (
        "Street Food Market",
        "Forty stalls, one courtyard, no reservations.",
        "Old Brewery Yard",
        "Prague",
        "2026-11-14T12:00",
        None,
        &["food", "outdoor"],
    ),
    (
        "Design Systems Conference",
        "Two days on tokens, accessibility and component governance.",
        "Congress Center",
        "Amsterdam",
        "2026-11-19T09:00",
        Some(34900),
        &["tech", "design", "conference"],
    ),
    (
        "Night Run 10K",
        "A lit course along the river, finishing at the harbour.",
        "Harbour Front",
        "Hamburg",
        "2026-11-22T20:00",
        Some(1800),
        &["sport", "outdoor"],
    ),
    (
        "Ceramics for Beginners",
        "Hands-on wheel throwing workshop, materials included.",
        "Studio Terra",
        "Vienna",
        "2026-11-27T18:30",
        Some(6000),
        &["workshop", "art"],
    ),
    (
        "Indie Game Showcase",
        "Play unreleased games and meet the people making them.",
        "Pixel Hall",
        "Warsaw",
        "2026-12-03T16:00",
        None,
        &["tech", "games"],
    ),
    (
        "Winter Choir Concert",
        "Seasonal music from five centuries.",
        "St. Mary's Church",
        "Copenhagen",
        "2026-12-12T19:30",
        Some(1500),
        &["music"],
    ),
    (
        "Startup Pitch Evening",
        "Ten teams, five minutes each, one jury.",
        "Impact Hub",
        "Madrid",
        "2026-12-15T18:00",
        None,
        &["business", "meetup"],
    ),
    (
        "New Year's Eve Rooftop Party",
        "DJs, fireworks and a view over the old town.",
        "Skyline Terrace",
        "Tallinn",
        "2026-12-31T22:00",
        Some(4500),
        &["party", "music"],
    ),
];

/// 活动服务
///
/// 活动数据在启动时载入内存，按开始时间排序
#[derive(Debug, Clone)]
pub struct EventService {
    events: Vec<Event>,
    per_page: usize,
}

impl EventService {
    pub fn new(mut events: Vec<Event>, per_page: usize) -> Self {
        events.sort_by_key(|e| e.starts_at);
        Self {
            events,
            per_page: per_page.max(1),
        }
    }

    /// 内置的示例活动
    pub fn seeded(per_page: usize) -> anyhow::Result<Self> {
        let events = SEED
            .iter()
            .zip(1u64..)
            .map(|((title, summary, venue, city, starts_at, price_cents, tags), id)| -> anyhow::Result<Event> {
                let starts_at = NaiveDateTime::parse_from_str(starts_at, DATE_FORMAT)
                    .with_context(|| format!("invalid start time for event '{}'", title))?;
                Ok(Event {
                    id,
                    title: title.to_string(),
                    summary: summary.to_string(),
                    venue: venue.to_string(),
                    city: city.to_string(),
                    starts_at,
                    price_cents: *price_cents,
                    tags: tags.iter().map(|t| t.to_string()).collect(),
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self::new(events, per_page))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    pub fn find(&self, id: u64) -> Option<&Event> {
        self.events.iter().find(|e| e.id == id)
    }

    /// 最早开始的 `limit` 个活动
    pub fn upcoming(&self, limit: usize) -> Vec<Event> {
        self.events.iter().take(limit).cloned().collect()
    }

    pub fn last_page(&self) -> usize {
        self.events.len().div_ceil(self.per_page).max(1)
    }

    /// 第 `page` 页（从 1 开始），超出范围时返回空页
    pub fn paginate(&self, page: usize) -> Page<Event> {
        let page = page.max(1);
        let last_page = self.last_page();
        let items = self
            .events
            .iter()
            .skip((page - 1).saturating_mul(self.per_page))
            .take(self.per_page)
            .cloned()
            .collect();

        Page {
            items,
            page,
            per_page: self.per_page,
            total: self.events.len(),
            last_page,
            prev_page: (page > 1).then(|| page - 1),
            next_page: (page < last_page).then(|| page + 1),
        }
    }
}
