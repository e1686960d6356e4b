//! `tabnap run`: keep the policy enforced until interrupted.
//!
//! The scheduler owns the engine. A poll task watches the settings file and
//! the tab snapshot for changes made by other processes and feeds them in;
//! events from this process's own host are forwarded as they happen.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::core::{PolicyEngine, Scheduler, SchedulerConfig, SchedulerMessage};
use crate::host::{HostEvent, SnapshotHost, TabHost, TabId, TabQuery};
use crate::store::SettingsStore;

/// Lifecycle events that turn `before` into `after`.
pub fn diff_tab_sets(before: &BTreeSet<TabId>, after: &BTreeSet<TabId>) -> Vec<HostEvent> {
    let created = after.difference(before).map(|&id| HostEvent::Created(id));
    let removed = before.difference(after).map(|&id| HostEvent::Removed(id));
    removed.chain(created).collect()
}

/// Current tab ids, or `None` when the snapshot can't be read right now.
async fn tab_ids<H: TabHost>(host: &H) -> Option<BTreeSet<TabId>> {
    match host.query_tabs(&TabQuery::all()).await {
        Ok(tabs) => Some(tabs.into_iter().map(|t| t.id).collect()),
        Err(e) => {
            tracing::warn!("Failed to read tabs, skipping this poll: {}", e);
            None
        }
    }
}

fn spawn_poller(
    store: Arc<SettingsStore>,
    host: Arc<SnapshotHost>,
    tx: mpsc::Sender<SchedulerMessage>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut known = tab_ids(&*host).await;
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;

            if store.refresh() {
                tracing::debug!("Picked up external settings change");
            }

            let Some(current) = tab_ids(&*host).await else {
                continue;
            };
            // Nothing to diff against until the first successful read.
            if let Some(ref before) = known {
                for event in diff_tab_sets(before, &current) {
                    if tx.send(SchedulerMessage::Host(event)).await.is_err() {
                        return;
                    }
                }
            }
            known = Some(current);
        }
    })
}

fn spawn_forwarder(
    mut events: broadcast::Receiver<HostEvent>,
    tx: mpsc::Sender<SchedulerMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if tx.send(SchedulerMessage::Host(event)).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("Dropped {} host events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
}

pub async fn run(
    store: SettingsStore,
    tabs_path: &Path,
    interval_secs: u64,
    poll_secs: u64,
) -> anyhow::Result<()> {
    let store = Arc::new(store);
    if store
        .ensure_initialized()
        .context("Failed to initialize settings")?
    {
        println!("Wrote default settings.");
    }

    let host = Arc::new(
        SnapshotHost::open(tabs_path)
            .with_context(|| format!("Failed to open tab snapshot {}", tabs_path.display()))?,
    );
    let settings = store.load();
    tracing::info!(
        mode = %settings.mode,
        tabs = %tabs_path.display(),
        "Starting auto-suspend daemon"
    );

    let engine = PolicyEngine::new(Arc::clone(&host), settings);
    let config = SchedulerConfig {
        tick_interval: Duration::from_secs(interval_secs.max(1)),
        ..SchedulerConfig::default()
    };
    let mut scheduler = Scheduler::spawn(engine, store.subscribe(), config);

    let poller = spawn_poller(
        Arc::clone(&store),
        Arc::clone(&host),
        scheduler.sender(),
        Duration::from_secs(poll_secs.max(1)),
    );
    let forwarder = spawn_forwarder(host.subscribe(), scheduler.sender());

    // Evaluate once at startup instead of waiting a full interval.
    scheduler.tick().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");

    poller.abort();
    forwarder.abort();
    scheduler.shutdown().await?;
    Ok(())
}
