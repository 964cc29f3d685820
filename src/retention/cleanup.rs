use super::classification::{parse_classification, RetentionRule};
use crate::error::{Result, StorageError};
use crate::storage::StorageProvider;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Outcome of one retention pass over a database.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    pub retained: Vec<String>,
    /// Names that were not evaluated: unparsable, unknown class, or no timestamp.
    pub skipped: Vec<String>,
    pub failures: Vec<(String, StorageError)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Deletes every artifact of `database` older than its class allows.
///
/// Only the listing failure is fatal. A failed delete is recorded in the
/// report and the remaining artifacts are still evaluated.
pub async fn cleanup(
    provider: &dyn StorageProvider,
    database: &str,
    now: DateTime<Utc>,
) -> Result<CleanupReport> {
    let artifacts = provider.list(database).await?;
    let mut report = CleanupReport::default();

    for artifact in artifacts {
        let max_age = match parse_classification(&artifact.name).and_then(RetentionRule::max_age) {
            Some(max_age) => max_age,
            None => {
                debug!("Skipping {}: no known classification", artifact.name);
                report.skipped.push(artifact.name);
                continue;
            }
        };
        let last_modified = match artifact.last_modified {
            Some(ts) => ts,
            None => {
                debug!("Skipping {}: no modification time", artifact.name);
                report.skipped.push(artifact.name);
                continue;
            }
        };

        let cutoff = now - max_age;
        if last_modified >= cutoff {
            report.retained.push(artifact.name);
            continue;
        }

        match provider.delete(database, &artifact.name).await {
            Ok(()) => {
                info!("Removed expired backup {} from {}", artifact.name, provider.name());
                report.deleted.push(artifact.name);
            }
            Err(e) => {
                warn!("Failed to remove expired backup {}: {}", artifact.name, e);
                report.failures.push((artifact.name, e));
            }
        }
    }

    info!(
        "Retention for {} on {}: {} deleted, {} retained, {} skipped, {} failed",
        database,
        provider.name(),
        report.deleted.len(),
        report.retained.len(),
        report.skipped.len(),
        report.failures.len()
    );
    Ok(report)
}
