use log::{info, warn};

/// Thin wrapper over the `log` macros that scopes lines to one component.
#[derive(Clone)]
pub struct LogManager {
    scope: String,
}

impl LogManager {
    pub fn new() -> Self {
        Self {
            scope: String::new(),
        }
    }

    pub fn scoped(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    pub fn record(&self, message: &str) {
        if self.scope.is_empty() {
            info!("{}", message);
        } else {
            info!("[{}] {}", self.scope, message);
        }
    }

    pub fn alert(&self, message: &str) {
        if self.scope.is_empty() {
            warn!("{}", message);
        } else {
            warn!("[{}] {}", self.scope, message);
        }
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}
