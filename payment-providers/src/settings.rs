//! Reloadable provider settings.

use std::sync::{Arc, RwLock};

use salon_types::GatewayError;

type Loader<S> = Arc<dyn Fn() -> Result<S, GatewayError> + Send + Sync>;

/// Process-wide settings with an explicit reload.
///
/// Callers take a [`snapshot`](SettingsHandle::snapshot) at the start of an
/// operation and use it until the end; a concurrent reload swaps the shared
/// pointer without touching snapshots already handed out.
pub struct SettingsHandle<S> {
    current: RwLock<Arc<S>>,
    loader: Option<Loader<S>>,
}

impl<S: Send + Sync + 'static> SettingsHandle<S> {
    /// Settings that never change (tests, static deployments).
    pub fn fixed(settings: S) -> Self {
        Self {
            current: RwLock::new(Arc::new(settings)),
            loader: None,
        }
    }

    /// Loads settings once now and again on every [`reload`](Self::reload).
    pub fn with_loader<F>(loader: F) -> Result<Self, GatewayError>
    where
        F: Fn() -> Result<S, GatewayError> + Send + Sync + 'static,
    {
        let initial = loader()?;
        Ok(Self {
            current: RwLock::new(Arc::new(initial)),
            loader: Some(Arc::new(loader)),
        })
    }

    pub fn snapshot(&self) -> Arc<S> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Re-runs the loader. On failure the previous settings stay in place.
    pub fn reload(&self) -> Result<Arc<S>, GatewayError> {
        let Some(loader) = &self.loader else {
            return Ok(self.snapshot());
        };
        let fresh = Arc::new(loader()?);
        self.replace_arc(fresh.clone());
        Ok(fresh)
    }

    pub fn replace(&self, settings: S) {
        self.replace_arc(Arc::new(settings));
    }

    fn replace_arc(&self, settings: Arc<S>) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = settings;
    }
}
