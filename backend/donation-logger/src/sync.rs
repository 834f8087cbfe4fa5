//! Sync engine — drains the pending queue into the remote ledger.
//!
//! A pass walks the queue oldest first, one request at a time. Accepted
//! and duplicate answers both resolve the record. Any other outcome halts
//! the pass and leaves that record and everything after it queued, so a
//! later donation is never confirmed ahead of an earlier one and a
//! struggling ledger is not hit with a burst of doomed requests.
//!
//! Passes never fail. Problems are logged and the queue is retried on the
//! next trigger (a submission or an offline → online transition).

use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::connectivity::Connectivity;
use crate::ledger::{Ledger, LedgerOutcome};
use crate::store;

/// What a single pass achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Records the ledger accepted.
    pub delivered: usize,
    /// Records the ledger already had.
    pub duplicates: usize,
    /// Records still queued when the pass ended.
    pub remaining: usize,
    /// The pass did nothing because we are offline.
    pub skipped_offline: bool,
    /// `local_id` of the record the pass stopped at, if it stopped early.
    pub halted_on: Option<i64>,
    /// The queue could not be read or updated; `remaining` is a lower
    /// bound at best.
    pub storage_error: bool,
}

pub struct SyncEngine {
    pool: SqlitePool,
    ledger: Arc<dyn Ledger>,
    connectivity: Connectivity,
    /// Held for the whole body of a pass; a second caller waits its turn.
    pass_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(pool: SqlitePool, ledger: Arc<dyn Ledger>, connectivity: Connectivity) -> Self {
        Self {
            pool,
            ledger,
            connectivity,
            pass_lock: Mutex::new(()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Try to deliver everything currently queued.
    pub async fn sync_pass(&self) -> SyncReport {
        if !self.connectivity.is_online() {
            debug!("Offline — sync pass skipped");
            return SyncReport {
                skipped_offline: true,
                ..SyncReport::default()
            };
        }

        let _guard = self.pass_lock.lock().await;

        // We may have gone offline while waiting for the previous pass.
        if !self.connectivity.is_online() {
            debug!("Went offline while waiting — sync pass skipped");
            return SyncReport {
                skipped_offline: true,
                ..SyncReport::default()
            };
        }

        let pending = match store::list_all(&self.pool).await {
            Ok(pending) => pending,
            Err(e) => {
                error!("Could not read pending donations: {e}");
                return SyncReport {
                    storage_error: true,
                    ..SyncReport::default()
                };
            }
        };

        let mut report = SyncReport::default();
        let total = pending.len();

        for donation in &pending {
            let duplicate = match self.ledger.submit(donation).await {
                Ok(LedgerOutcome::Accepted) => false,
                Ok(LedgerOutcome::Duplicate) => true,
                Ok(LedgerOutcome::Rejected(reason)) => {
                    warn!(
                        local_id = donation.local_id,
                        udi = %donation.udi,
                        "Ledger rejected donation, halting pass: {reason}"
                    );
                    report.halted_on = Some(donation.local_id);
                    break;
                }
                Err(e) => {
                    warn!(
                        local_id = donation.local_id,
                        udi = %donation.udi,
                        "Ledger unreachable, halting pass: {e}"
                    );
                    report.halted_on = Some(donation.local_id);
                    break;
                }
            };

            if let Err(e) = store::remove(&self.pool, donation.local_id).await {
                // The record stays queued; re-sending it later is absorbed
                // by the ledger's duplicate answer.
                error!(
                    local_id = donation.local_id,
                    "Delivered donation could not be removed from queue: {e}"
                );
                report.halted_on = Some(donation.local_id);
                report.storage_error = true;
                break;
            }

            if duplicate {
                debug!(udi = %donation.udi, "Ledger already had donation");
                report.duplicates += 1;
            } else {
                debug!(udi = %donation.udi, "Donation delivered");
                report.delivered += 1;
            }
        }

        report.remaining = total - report.delivered - report.duplicates;
        if total > 0 {
            info!(
                "Sync pass: {} delivered, {} duplicate, {} still pending",
                report.delivered, report.duplicates, report.remaining
            );
        }
        report
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
