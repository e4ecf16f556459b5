use std::sync::Arc;

use trees_web::prelude::*;

use crate::models::Event;
use crate::service::EventService;

pub struct EventController {
    view: View,
    events: Arc<EventService>,
}

impl Controller for EventController {
    const NAME: &'static str = "EventController";

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

impl EventController {
    /// GET /events?page=N
    pub fn index(&self, request: &RequestContext) -> ActionResult {
        let page = self.page(request)?;
        self.render("events/index.html", json!({ "title": "Events", "page": page }))
    }

    /// GET /events/{id}
    pub fn event(&self, request: &RequestContext) -> ActionResult {
        let event = self.find(request)?;
        self.render(
            "events/show.html",
            json!({
                "title": event.title,
                "event": event,
                "price": format_price(event.price_cents),
            }),
        )
    }

    /// GET /api/events?page=N
    pub fn list_json(&self, request: &RequestContext) -> ActionResult {
        let page = self.page(request)?;
        self.json(page, StatusCode::OK)
    }

    /// GET /api/events/{id}
    pub fn show_json(&self, request: &RequestContext) -> ActionResult {
        let event = self.find(request)?;
        self.json(event, StatusCode::OK)
    }

    fn find(&self, request: &RequestContext) -> Result<&Event, WebError> {
        let raw = request.param("id").unwrap_or_default();
        raw.parse::<u64>()
            .ok()
            .and_then(|id| self.events.find(id))
            .ok_or_else(|| WebError::NotFound(format!("Event {} not found", raw)))
    }

    fn page(&self, request: &RequestContext) -> Result<crate::models::Page<Event>, WebError> {
        let page = parse_page(request.query("page"))?;
        if page > self.events.last_page() {
            return Err(WebError::NotFound(format!("Page {} does not exist", page)));
        }
        Ok(self.events.paginate(page))
    }
}

/// 2500 -> "€25.00"
fn format_price(cents: Option<u32>) -> String {
    match cents {
        Some(cents) => format!("€{}.{:02}", cents / 100, cents % 100),
        None => "Free".to_string(),
    }
}

/// 缺省为第 1 页，必须是正整数
fn parse_page(raw: Option<&str>) -> Result<usize, WebError> {
    match raw {
        None => Ok(1),
        Some(value) => value
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|page| *page > 0)
            .ok_or_else(|| WebError::BadRequest(format!("Invalid page number '{}'", value))),
    }
}
