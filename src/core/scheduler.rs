//! Event scheduler for the policy engine.
//!
//! Runs the engine inside a single tokio task. Every trigger is handled to
//! completion before the next one is looked at:
//! - Periodic ticks (once a minute by default)
//! - Settings changes from the store (reload, then evaluate immediately)
//! - Host tab events (new tabs re-check the tab limit)
//! - Manual suspend requests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::policy::{PolicyEngine, SuspendReport};
use crate::config::Settings;
use crate::error::{TabnapError, TabnapResult};
use crate::host::{HostEvent, TabHost, TabId};

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between periodic evaluations.
    pub tick_interval: Duration,

    /// Capacity of the message queue.
    pub queue_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            queue_size: 64,
        }
    }
}

/// Message types for communicating with the scheduler.
#[derive(Debug)]
pub enum SchedulerMessage {
    /// A tab lifecycle notification from the host.
    Host(HostEvent),

    /// Evaluate the current policy now.
    Tick,

    /// Suspend these tabs unconditionally and report back.
    SuspendTabs {
        ids: Vec<TabId>,
        reply: Option<oneshot::Sender<SuspendReport>>,
    },

    /// Stop the scheduler.
    Shutdown,
}

/// Handle to a running scheduler task.
pub struct Scheduler {
    tx: mpsc::Sender<SchedulerMessage>,
    task_handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl Scheduler {
    /// Start the scheduler. The engine's settings are replaced by the
    /// current value of `settings` before anything else runs.
    pub fn spawn<H>(
        engine: PolicyEngine<H>,
        settings: watch::Receiver<Settings>,
        config: SchedulerConfig,
    ) -> Self
    where
        H: TabHost + 'static,
    {
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);

        let task_handle = tokio::spawn(async move {
            scheduler_loop(engine, rx, settings, config, running_clone).await;
        });

        Self {
            tx,
            task_handle: Some(task_handle),
            running,
        }
    }

    /// Whether the scheduler task is still processing messages.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Forward a host tab event.
    pub async fn notify(&self, event: HostEvent) -> TabnapResult<()> {
        self.send(SchedulerMessage::Host(event)).await
    }

    /// Request an immediate evaluation.
    pub async fn tick(&self) -> TabnapResult<()> {
        self.send(SchedulerMessage::Tick).await
    }

    /// Suspend tabs through the scheduler queue and wait for the result.
    pub async fn suspend_tabs(&self, ids: Vec<TabId>) -> TabnapResult<SuspendReport> {
        let (reply, rx) = oneshot::channel();
        self.send(SchedulerMessage::SuspendTabs {
            ids,
            reply: Some(reply),
        })
        .await?;

        rx.await
            .map_err(|_| TabnapError::Scheduler("Scheduler dropped the request".to_string()))
    }

    /// A clonable sender for feeding the scheduler from other tasks.
    pub fn sender(&self) -> mpsc::Sender<SchedulerMessage> {
        self.tx.clone()
    }

    /// Stop the scheduler and wait for the in-flight pass to finish.
    pub async fn shutdown(&mut self) -> TabnapResult<()> {
        let _ = self.tx.send(SchedulerMessage::Shutdown).await;

        if let Some(handle) = self.task_handle.take() {
            handle.await.map_err(|e| {
                TabnapError::Scheduler(format!("Scheduler task panicked: {}", e))
            })?;
        }

        Ok(())
    }

    async fn send(&self, msg: SchedulerMessage) -> TabnapResult<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|e| TabnapError::Scheduler(format!("Failed to send message: {}", e)))
    }
}

/// Main scheduler loop that runs in a tokio task.
async fn scheduler_loop<H: TabHost>(
    mut engine: PolicyEngine<H>,
    mut rx: mpsc::Receiver<SchedulerMessage>,
    mut settings: watch::Receiver<Settings>,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
) {
    // Not marked as seen: a save that landed between `subscribe` and this
    // point still fires `changed` and gets its immediate pass.
    engine.reload(settings.borrow().clone());

    let period = config.tick_interval.max(Duration::from_millis(1));
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut settings_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_pass(&engine, "tick").await;
            }

            changed = settings.changed(), if settings_open => {
                match changed {
                    Ok(()) => {
                        let next = settings.borrow_and_update().clone();
                        tracing::info!(mode = %next.mode, "Settings changed");
                        engine.reload(next);
                        run_pass(&engine, "settings change").await;
                    }
                    Err(_) => {
                        // Store dropped: keep running on the last settings.
                        tracing::debug!("Settings channel closed");
                        settings_open = false;
                    }
                }
            }

            msg = rx.recv() => {
                match msg {
                    Some(SchedulerMessage::Shutdown) | None => break,
                    Some(msg) => handle_message(&engine, msg).await,
                }
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    tracing::debug!("Scheduler stopped");
}

/// Handle a scheduler message.
async fn handle_message<H: TabHost>(engine: &PolicyEngine<H>, msg: SchedulerMessage) {
    match msg {
        SchedulerMessage::Host(HostEvent::Created(id)) => {
            tracing::trace!("Tab {} created", id);
            match engine.on_new_tab_created().await {
                Ok(report) => log_report("new tab", &report),
                Err(e) => tracing::warn!("Tab limit check failed: {}", e),
            }
        }

        SchedulerMessage::Host(event) => {
            // Only list views care about the other lifecycle events.
            tracing::trace!("Host event {:?}", event);
        }

        SchedulerMessage::Tick => run_pass(engine, "requested tick").await,

        SchedulerMessage::SuspendTabs { ids, reply } => {
            let report = engine.suspend_tabs(&ids).await;
            log_report("manual suspend", &report);
            if let Some(reply) = reply {
                let _ = reply.send(report);
            }
        }

        SchedulerMessage::Shutdown => {
            // Handled by the loop
        }
    }
}

async fn run_pass<H: TabHost>(engine: &PolicyEngine<H>, trigger: &str) {
    match engine.on_tick().await {
        Ok(report) => log_report(trigger, &report),
        Err(e) => tracing::warn!("Auto-suspend pass ({}) failed: {}", trigger, e),
    }
}

fn log_report(trigger: &str, report: &SuspendReport) {
    if report.is_empty() {
        tracing::trace!("No tabs suspended ({})", trigger);
    } else {
        tracing::info!(
            suspended = report.suspended.len(),
            failed = report.failed.len(),
            "Suspended tabs ({})",
            trigger
        );
    }
}
