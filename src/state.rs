use std::sync::Arc;

use crate::{
    config::AppConfig,
    guard::SessionGuard,
    markdown::MarkdownRenderer,
    store::{SessionStore, UserStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub sessions: Arc<dyn SessionStore>,
    pub users: Arc<dyn UserStore>,
    pub guard: SessionGuard,
    pub renderer: Arc<MarkdownRenderer>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        let guard = SessionGuard::new(
            sessions.clone(),
            users.clone(),
            config.session_lookup_timeout,
        );
        Self {
            config,
            sessions,
            users,
            guard,
            renderer: Arc::new(MarkdownRenderer::new()),
        }
    }
}
