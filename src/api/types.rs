//! Shared state handed to every handler and middleware.

use std::sync::Arc;

use crate::core_state::CoreState;

/// Cheap to clone; everything lives behind the `Arc`.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}
