use std::sync::Arc;

use trees_web::prelude::*;

use crate::service::EventService;

/// 首页展示的活动数量
const FEATURED: usize = 3;

pub struct HomeController {
    view: View,
    events: Arc<EventService>,
}

impl Controller for HomeController {
    const NAME: &'static str = "HomeController";

    fn construct(container: &Container) -> anyhow::Result<Self> {
        Ok(Self {
            view: super::page_view(container)?,
            events: container.make::<EventService>()?,
        })
    }

    fn initialize(&mut self, request: &RequestContext) -> anyhow::Result<()> {
        self.view.share("current_path", request.path());
        Ok(())
    }

    fn view(&self) -> &View {
        &self.view
    }
}

impl HomeController {
    /// GET /
    pub fn index(&self, _request: &RequestContext) -> ActionResult {
        self.render(
            "home.html",
            json!({
                "title": "Home",
                "featured": self.events.upcoming(FEATURED),
                "total": self.events.len(),
            }),
        )
    }
}
