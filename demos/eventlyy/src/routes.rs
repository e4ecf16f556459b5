//! 路由定义

use trees_web::prelude::*;

use crate::controller::{AuthController, EventController, HomeController};

/// 页面路由
pub fn web(router: &Router) -> Result<(), RouterError> {
    router
        .get("/", action!(HomeController::index))?
        .get("/events", action!(EventController::index))?
        .get("/events/{id}", action!(EventController::event))?
        .get("/auth", action!(AuthController::index))?;
    Ok(())
}

/// JSON 接口
pub fn api(router: &Router) -> Result<(), RouterError> {
    router
        .prefix("/api")
        .get("/events", action!(EventController::list_json))?
        .get("/events/{id}", action!(EventController::show_json))?;
    Ok(())
}
