//! The tick loop: lease, due monitors, checks, state transitions,
//! notifications, snapshot refresh, and history retention.

pub mod retention;
pub mod tick;

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tracing::error;

use crate::database::Database;
use crate::monitoring::CheckRunner;
use crate::notify::WebhookTransport;

pub use retention::run_retention;

pub struct Scheduler {
    pub db: Arc<dyn Database>,
    pub checks: Arc<dyn CheckRunner>,
    pub transport: Arc<dyn WebhookTransport>,
    background: Mutex<JoinSet<()>>,
}

impl Scheduler {
    pub fn new(
        db: Arc<dyn Database>,
        checks: Arc<dyn CheckRunner>,
        transport: Arc<dyn WebhookTransport>,
    ) -> Self {
        Self { db, checks, transport, background: Mutex::new(JoinSet::new()) }
    }

    /// Detach delivery and snapshot work so the tick never waits on it.
    fn spawn_background<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.background.lock().unwrap().spawn(task);
    }

    /// Collect finished background tasks, logging any that panicked.
    fn reap_background(&self) {
        let mut background = self.background.lock().unwrap();
        while let Some(result) = background.try_join_next() {
            if let Err(err) = result {
                error!(error = %err, "background task failed");
            }
        }
    }

    /// Wait for every in-flight delivery and snapshot refresh to finish.
    /// Used before a single-tick run exits.
    pub async fn drain_background(&self) {
        let mut background = std::mem::take(&mut *self.background.lock().unwrap());
        while let Some(result) = background.join_next().await {
            if let Err(err) = result {
                error!(error = %err, "background task failed");
            }
        }
    }
}
