//! Tab inventory abstraction.
//!
//! This module defines the `TabHost` trait that abstracts the browser's tab
//! API, allowing the policy engine and list model to stay host-agnostic.
//! The engine only ever works on snapshots returned by `query_tabs`.

mod snapshot;

pub use snapshot::SnapshotHost;

use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::TabnapResult;

/// Host-assigned tab identity, unique among currently open tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host-assigned window identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub i64);

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current time in milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as f64
}

fn default_true() -> bool {
    true
}

/// One tab as reported by the host at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSnapshot {
    pub id: TabId,
    pub window_id: WindowId,
    /// Position within its window
    #[serde(default)]
    pub index: u32,
    /// Frontmost tab of its window
    #[serde(default)]
    pub active: bool,
    /// Already suspended
    #[serde(default)]
    pub discarded: bool,
    /// Currently producing sound
    #[serde(default)]
    pub audible: bool,
    /// Host-level eligibility for automatic discarding
    #[serde(default = "default_true")]
    pub auto_discardable: bool,
    #[serde(default)]
    pub incognito: bool,
    /// Milliseconds since the Unix epoch of the last focus
    #[serde(default)]
    pub last_accessed: Option<f64>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub fav_icon_url: Option<String>,
}

impl TabSnapshot {
    /// Last access time, with "never" mapped to the epoch.
    pub fn last_accessed_or_epoch(&self) -> f64 {
        self.last_accessed.unwrap_or(0.0)
    }
}

/// Filter predicates for `TabHost::query_tabs`. `None` means "any".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TabQuery {
    pub active: Option<bool>,
    pub discarded: Option<bool>,
    pub auto_discardable: Option<bool>,
}

impl TabQuery {
    /// Every open tab.
    pub fn all() -> Self {
        Self::default()
    }

    /// Background, still-loaded tabs the host allows to be auto-discarded.
    pub fn auto_suspend_candidates() -> Self {
        Self {
            active: Some(false),
            discarded: Some(false),
            auto_discardable: Some(true),
        }
    }

    pub fn matches(&self, tab: &TabSnapshot) -> bool {
        self.active.map_or(true, |v| tab.active == v)
            && self.discarded.map_or(true, |v| tab.discarded == v)
            && self.auto_discardable.map_or(true, |v| tab.auto_discardable == v)
    }
}

/// The window the caller is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    pub id: WindowId,
    pub focused: bool,
    pub incognito: bool,
}

/// Tab lifecycle notifications emitted by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    Created(TabId),
    Updated(TabId),
    Removed(TabId),
    Activated(TabId),
    Attached(TabId),
    Detached(TabId),
}

impl HostEvent {
    pub fn tab_id(&self) -> TabId {
        match *self {
            HostEvent::Created(id)
            | HostEvent::Updated(id)
            | HostEvent::Removed(id)
            | HostEvent::Activated(id)
            | HostEvent::Attached(id)
            | HostEvent::Detached(id) => id,
        }
    }
}

/// Browser tab API consumed by the engine and the list model.
///
/// Calls may suspend while awaiting the host; each returned future must be
/// `Send` so the scheduler can run on a multi-threaded runtime.
pub trait TabHost: Send + Sync {
    /// Snapshot of every tab matching `query`.
    fn query_tabs(
        &self,
        query: &TabQuery,
    ) -> impl Future<Output = TabnapResult<Vec<TabSnapshot>>> + Send;

    /// Request suspension of one tab.
    fn discard_tab(&self, id: TabId) -> impl Future<Output = TabnapResult<()>> + Send;

    /// Close one tab.
    fn close_tab(&self, id: TabId) -> impl Future<Output = TabnapResult<()>> + Send;

    /// Make a tab active and focus its window.
    fn activate_tab(
        &self,
        id: TabId,
        window_id: WindowId,
    ) -> impl Future<Output = TabnapResult<()>> + Send;

    /// The window the caller is currently attached to.
    fn current_window(&self) -> impl Future<Output = TabnapResult<WindowInfo>> + Send;
}
