use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::controller::Controller;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
    /// Accepted `X-Api-Key` values
    pub api_keys: Arc<HashSet<Uuid>>,
}

impl AppState {
    pub fn new(controller: Arc<Controller>, api_keys: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            controller,
            api_keys: Arc::new(api_keys.into_iter().collect()),
        }
    }
}
