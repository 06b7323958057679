use std::sync::Arc;

use crate::application::auth::AuthService;
use crate::application::experiments::ExperimentService;
use crate::application::feed::FeedService;
use crate::application::interactions::InteractionService;
use crate::application::repos::HealthRepo;

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub interactions: Arc<InteractionService>,
    pub experiments: Arc<ExperimentService>,
    pub auth: Arc<AuthService>,
    pub health: Arc<dyn HealthRepo>,
}
