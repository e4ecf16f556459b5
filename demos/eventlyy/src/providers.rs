use anyhow::Context;
use trees_web::prelude::*;

use crate::service::EventService;

pub const EVENTS_PER_PAGE: &str = "events.per-page";

const DEFAULT_PER_PAGE: i64 = 6;

/// 活动数据提供者
pub struct EventServiceProvider;

#[async_trait]
impl ServiceProvider for EventServiceProvider {
    fn name(&self) -> &str {
        "EventServiceProvider"
    }

    fn register(&self, container: &mut Container) -> anyhow::Result<()> {
        container.lazy(|c| {
            let env = c.make::<Environment>()?;
            let per_page = env.get_i64_or(EVENTS_PER_PAGE, DEFAULT_PER_PAGE);
            let per_page = usize::try_from(per_page)
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| format!("{} must be a positive integer, got {}", EVENTS_PER_PAGE, per_page))?;
            EventService::seeded(per_page)
        });
        Ok(())
    }

    async fn boot(&self, container: &Container) -> anyhow::Result<()> {
        let events = container.make::<EventService>()?;
        tracing::info!(
            events = events.len(),
            per_page = events.per_page(),
            "Event catalogue loaded"
        );
        Ok(())
    }
}
