//! Check-history retention.
//!
//! Old `check_results` rows are deleted in bounded batches so a long-overdue
//! cleanup cannot hold the write path for seconds at a time. A run that hits
//! the batch ceiling simply leaves the rest for the next run.

use anyhow::Result;
use tracing::{debug, info};

use crate::database::Database;
use crate::settings::read_settings;

const RETENTION_LEASE_NAME: &str = "retention:check_results";
const RETENTION_LEASE_SECS: i64 = 600;

const DELETE_BATCH_SIZE: u64 = 5_000;
const MAX_BATCHES_PER_RUN: u64 = 40;

/// Delete check rows older than the configured retention window. Returns the
/// number of rows deleted, `0` when another runner holds the lease.
pub async fn run_retention(db: &dyn Database, now: i64) -> Result<u64> {
    if !db.acquire_lease(RETENTION_LEASE_NAME, now, RETENTION_LEASE_SECS).await? {
        debug!("retention lease held elsewhere, skipping");
        return Ok(0);
    }

    let settings = read_settings(db).await?;
    let cutoff = now - i64::from(settings.retention_check_results_days) * 86_400;

    let mut total = 0u64;
    for _ in 0..MAX_BATCHES_PER_RUN {
        let deleted = db.delete_check_results_before(cutoff, DELETE_BATCH_SIZE).await?;
        total += deleted;
        if deleted < DELETE_BATCH_SIZE {
            break;
        }
    }

    if total > 0 {
        info!(deleted = total, cutoff, "pruned check history");
    }
    Ok(total)
}
