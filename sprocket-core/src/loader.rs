//! Exactly-once loading of app functions

use crate::{App, Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use sprocket_webhooks::BoxError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error};

/// User-supplied setup logic that registers handlers on an [`App`].
///
/// Plain closures `Fn(&App) -> Result<(), BoxError>` implement this trait.
#[async_trait]
pub trait ApplicationFunction: Send + Sync {
    async fn load(&self, app: &App) -> std::result::Result<(), BoxError>;
}

#[async_trait]
impl<F> ApplicationFunction for F
where
    F: Fn(&App) -> std::result::Result<(), BoxError> + Send + Sync,
{
    async fn load(&self, app: &App) -> std::result::Result<(), BoxError> {
        self(app)
    }
}

/// Shared handle to an app function; its allocation is its identity
pub type AppFn = Arc<dyn ApplicationFunction>;

/// Wrap a setup closure into an [`AppFn`]
pub fn app_fn<F>(function: F) -> AppFn
where
    F: Fn(&App) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
{
    Arc::new(function)
}

struct LoadEntry {
    // Pins the allocation so its address cannot be reused by another function.
    _function: AppFn,
    outcome: Arc<OnceCell<std::result::Result<(), String>>>,
}

/// Load state of one app instance.
///
/// Keyed by app function identity. The first caller for a function runs it;
/// concurrent callers wait on the same cell and observe the same outcome. A
/// failed load is remembered and never retried.
#[derive(Default)]
pub(crate) struct LoadRegistry {
    entries: Mutex<HashMap<usize, LoadEntry>>,
}

impl LoadRegistry {
    fn key(function: &AppFn) -> usize {
        Arc::as_ptr(function) as *const () as usize
    }

    pub(crate) fn is_loaded(&self, function: &AppFn) -> bool {
        self.entries
            .lock()
            .get(&Self::key(function))
            .is_some_and(|entry| entry.outcome.get().is_some_and(|outcome| outcome.is_ok()))
    }

    pub(crate) async fn load(&self, app: &App, function: &AppFn) -> Result<()> {
        let outcome = {
            let mut entries = self.entries.lock();
            entries
                .entry(Self::key(function))
                .or_insert_with(|| LoadEntry {
                    _function: function.clone(),
                    outcome: Arc::new(OnceCell::new()),
                })
                .outcome
                .clone()
        };

        let result = outcome
            .get_or_init(|| async {
                debug!("Loading app function");
                function.load(app).await.map_err(|err| {
                    error!(error = %err, "App function failed to load");
                    err.to_string()
                })
            })
            .await;

        result.clone().map_err(Error::Load)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
