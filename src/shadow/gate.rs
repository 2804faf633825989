//! Shadow index creation gate

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static GLOBAL: Lazy<CreationGate> = Lazy::new(|| CreationGate::new(false));

/// Switch that must be on before a shadow index can be built
///
/// Building an index over a large series is expensive, so creation is off
/// unless an administrator enables it. Clones share one switch.
#[derive(Debug, Clone)]
pub struct CreationGate(Arc<AtomicBool>);

impl CreationGate {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    /// The process-wide gate
    pub fn global() -> &'static CreationGate {
        &GLOBAL
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with `PermissionDenied` unless the gate is on
    pub fn check(&self, series: &str) -> Result<()> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(Error::PermissionDenied(format!(
                "enable shadow creation before building an index for {}",
                series
            )))
        }
    }
}

impl Default for CreationGate {
    fn default() -> Self {
        Self::new(false)
    }
}
