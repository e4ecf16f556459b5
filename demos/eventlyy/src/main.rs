//! Eventlyy
//!
//! 运行：
//!
//! ```bash
//! cd demos/eventlyy
//! cargo run                                # production
//! TREES_PROFILES_ACTIVE=dev cargo run      # development：模板热加载，错误响应附带 trace
//! ```

mod controller;
mod models;
mod providers;
mod routes;
mod service;

use trees_web::prelude::*;

use crate::providers::EventServiceProvider;

fn application() -> TreesApplication {
    TreesApplication::new("Eventlyy")
        .provider(SessionServiceProvider)
        .provider(ViewServiceProvider::new())
        .provider(EventServiceProvider)
        .provider(
            RouteServiceProvider::new()
                .load("web", routes::web)
                .load("api", routes::api),
        )
        .provider(AssetServiceProvider::new())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    trees_web::run(application()).await?;
    Ok(())
}
