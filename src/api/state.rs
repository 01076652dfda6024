use std::sync::Arc;

use crate::engine::BehaviorEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BehaviorEngine>,
}
