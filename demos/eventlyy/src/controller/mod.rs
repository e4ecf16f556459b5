pub mod auth_controller;
pub mod event_controller;
pub mod home_controller;

pub use auth_controller::AuthController;
pub use event_controller::EventController;
pub use home_controller::HomeController;

use trees_web::prelude::*;

/// 所有页面共用的视图：模板引擎 + 应用名称
fn page_view(container: &Container) -> anyhow::Result<View> {
    let env = container.make::<Environment>()?;
    let mut view = View::new(container.make::<TemplateEngine>()?);
    view.share("app_name", &env.get_string_or("app.name", "Eventlyy"));
    Ok(view)
}
