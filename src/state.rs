use crate::config::AppConfig;
use crate::middleware::RateLimiter;
use crate::services::notifications::Mailer;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub mailer: Arc<dyn Mailer>,
    pub submit_limiter: RateLimiter,
}

pub type SharedState = Arc<AppState>;
