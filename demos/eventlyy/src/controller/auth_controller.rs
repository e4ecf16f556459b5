use trees_web::prelude::*;

/// 登录页
///
/// 还没有真正的账号体系，页面只用会话记录访问次数
pub struct AuthController {
    view: View,
}

impl Controller for AuthController {
    const NAME: &'static str = "AuthController";

    fn construct(container: &Container) -> anyhow::Result<Self> {
        Ok(Self {
            view: super::page_view(container)?,
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

impl AuthController {
    /// GET /auth
    pub fn index(&self, request: &RequestContext) -> ActionResult {
        let visits = match request.session() {
            Some(session) => {
                let visits = session.get::<u64>("auth_visits").unwrap_or(0) + 1;
                session.put("auth_visits", visits)?;
                Some(visits)
            }
            None => None,
        };

        self.render("auth.html", json!({ "title": "Sign in", "visits": visits }))
    }
}
