//! Shared application state for routes and extractors.

use crate::db::DatabaseRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<DatabaseRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<DatabaseRegistry>) -> Self {
        AppState { registry }
    }
}
