//! Application state shared across request handlers.

use std::sync::Arc;

use crate::admission::AdmissionService;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    admission: AdmissionService,
}

impl AppState {
    /// Create a new application state.
    pub fn new(admission: AdmissionService) -> Self {
        Self {
            inner: Arc::new(AppStateInner { admission }),
        }
    }

    /// Get a reference to the admission engine.
    pub fn admission(&self) -> &AdmissionService {
        &self.inner.admission
    }
}
