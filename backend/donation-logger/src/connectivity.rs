//! Online/offline signal and the trigger that syncs on reconnect.
//!
//! The UI forwards the browser's `online` / `offline` events; this module
//! keeps the latest value in a [`watch`] channel. A watch receiver only sees
//! the newest value, so an offline → online flap that lands while a pass is
//! running would otherwise look like "still online". The channel therefore
//! also carries a count of reconnects, and [`run`] fires one sync pass
//! whenever that count has moved since the last pass it started. It does
//! not poll.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::sync::SyncEngine;

/// Latest connectivity report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signal {
    pub online: bool,
    /// Offline → online transitions recorded so far.
    pub reconnects: u64,
}

#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<Signal>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(Signal {
            online,
            reconnects: 0,
        });
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        self.tx.borrow().online
    }

    /// Record the latest signal. Returns `true` if it changed.
    pub fn set_online(&self, online: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if current.online == online {
                return false;
            }
            current.online = online;
            if online {
                current.reconnects += 1;
            }
            true
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Signal> {
        self.tx.subscribe()
    }
}

/// Background task: one sync pass for every transition to online.
///
/// Transitions that pile up while a pass is in flight collapse into a
/// single follow-up pass.
pub async fn run(engine: Arc<SyncEngine>, shutdown: CancellationToken) {
    let mut rx = engine.connectivity().subscribe();
    let initial = *rx.borrow_and_update();
    let mut was_online = initial.online;
    let mut handled = initial.reconnects;

    info!("Connectivity trigger started (online: {was_online})");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let signal = *rx.borrow_and_update();
                if signal.reconnects > handled {
                    handled = signal.reconnects;
                    if signal.online {
                        info!("Back online, syncing pending donations");
                        engine.sync_pass().await;
                    }
                } else if !signal.online && was_online {
                    info!("Gone offline, donations will queue locally");
                }
                was_online = signal.online;
            }
        }
    }

    info!("Connectivity trigger stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::ledger::fake::{FakeLedger, Reply};
    use crate::store::{self, memory_pool, sample};

    async fn wait_for_submissions(ledger: &FakeLedger, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while ledger.submitted().len() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("trigger did not sync in time");
    }

    #[test]
    fn set_online_reports_changes_only() {
        let connectivity = Connectivity::new(false);
        assert!(!connectivity.set_online(false));
        assert!(connectivity.set_online(true));
        assert!(connectivity.is_online());
        assert!(!connectivity.set_online(true));

        connectivity.set_online(false);
        connectivity.set_online(true);
        assert_eq!(connectivity.subscribe().borrow().reconnects, 2);
    }

    #[tokio::test]
    async fn reconnect_triggers_one_pass() {
        let ledger = Arc::new(FakeLedger::default());
        let connectivity = Connectivity::new(false);
        let engine = Arc::new(SyncEngine::new(
            memory_pool().await,
            ledger.clone(),
            connectivity.clone(),
        ));
        store::append(engine.pool(), &sample("A-01")).await.unwrap();
        store::append(engine.pool(), &sample("A-02")).await.unwrap();

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run(engine.clone(), shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;

        connectivity.set_online(true);
        wait_for_submissions(&ledger, 2).await;

        // Repeating "online" is not a transition.
        connectivity.set_online(true);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(ledger.submitted(), ["A-01", "A-02"]);
        assert_eq!(store::count(engine.pool()).await.unwrap(), 0);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn reconnect_during_a_pass_is_not_lost() {
        let ledger = Arc::new(FakeLedger::default());
        ledger.reply("A-01", Reply::Unreachable);
        let gate = ledger.hold_next();
        let connectivity = Connectivity::new(false);
        let engine = Arc::new(SyncEngine::new(
            memory_pool().await,
            ledger.clone(),
            connectivity.clone(),
        ));
        store::append(engine.pool(), &sample("A-01")).await.unwrap();

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run(engine.clone(), shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;

        // First pass is stuck on a request that will fail.
        connectivity.set_online(true);
        wait_for_submissions(&ledger, 1).await;

        // The drop that made it fail, and the recovery, both land mid-pass.
        connectivity.set_online(false);
        connectivity.set_online(true);
        ledger.reply("A-01", Reply::Accept);
        gate.notify_one();

        wait_for_submissions(&ledger, 2).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while store::count(engine.pool()).await.unwrap() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("reconnect during a pass triggered no follow-up pass");
        assert_eq!(ledger.submitted(), ["A-01", "A-01"]);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn going_offline_does_not_sync() {
        let ledger = Arc::new(FakeLedger::default());
        let connectivity = Connectivity::new(true);
        let engine = Arc::new(SyncEngine::new(
            memory_pool().await,
            ledger.clone(),
            connectivity.clone(),
        ));
        store::append(engine.pool(), &sample("A-01")).await.unwrap();

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run(engine.clone(), shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;

        connectivity.set_online(false);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(ledger.submitted().is_empty());

        shutdown.cancel();
        task.await.unwrap();
    }
}
