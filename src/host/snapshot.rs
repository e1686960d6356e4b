//! Snapshot-backed tab host.
//!
//! Holds a tab inventory in memory, optionally mirrored to a JSON file. When
//! a file is attached it is re-read before every call and rewritten after
//! every mutation, so several processes (the CLI, a running daemon, an
//! exporter) observe each other's changes.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use super::{now_millis, HostEvent, TabHost, TabId, TabQuery, TabSnapshot, WindowId, WindowInfo};
use crate::error::{TabnapError, TabnapResult};
use crate::store::replace_file;

/// On-disk layout of a snapshot file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SnapshotFile {
    current_window: Option<WindowInfo>,
    tabs: Vec<TabSnapshot>,
}

#[derive(Debug, Default)]
struct SnapshotState {
    tabs: Vec<TabSnapshot>,
    window: Option<WindowInfo>,
    /// Tabs whose discard requests are rejected.
    failing: HashSet<TabId>,
}

impl SnapshotState {
    fn position(&self, id: TabId) -> TabnapResult<usize> {
        self.tabs
            .iter()
            .position(|t| t.id == id)
            .ok_or(TabnapError::TabNotFound(id))
    }

    fn current_window(&self) -> WindowInfo {
        if let Some(window) = self.window {
            return window;
        }

        // Fall back to the window holding an active tab, then any window.
        let tab = self
            .tabs
            .iter()
            .find(|t| t.active)
            .or_else(|| self.tabs.first());

        WindowInfo {
            id: tab.map(|t| t.window_id).unwrap_or(WindowId(1)),
            focused: true,
            incognito: tab.map(|t| t.incognito).unwrap_or(false),
        }
    }

    fn reindex(&mut self, window_id: WindowId) {
        let mut index = 0;
        for tab in self.tabs.iter_mut().filter(|t| t.window_id == window_id) {
            tab.index = index;
            index += 1;
        }
    }
}

/// In-memory tab host with optional JSON file persistence.
pub struct SnapshotHost {
    path: Option<PathBuf>,
    state: RwLock<SnapshotState>,
    events: broadcast::Sender<HostEvent>,
}

impl SnapshotHost {
    /// Create a host over a fixed set of tabs.
    pub fn new(tabs: Vec<TabSnapshot>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            path: None,
            state: RwLock::new(SnapshotState {
                tabs,
                ..SnapshotState::default()
            }),
            events,
        }
    }

    /// Create a host mirrored to `path`. A missing file is an empty inventory.
    pub fn open(path: impl Into<PathBuf>) -> TabnapResult<Self> {
        let path = path.into();
        let file = read_snapshot_file(&path)?;
        let (events, _) = broadcast::channel(64);

        Ok(Self {
            path: Some(path),
            state: RwLock::new(SnapshotState {
                tabs: file.tabs,
                window: file.current_window,
                failing: HashSet::new(),
            }),
            events,
        })
    }

    /// Pin the window reported by `current_window`.
    pub fn with_window(mut self, window: WindowInfo) -> Self {
        self.state.get_mut().window = Some(window);
        self
    }

    /// Reject discard requests for the given tabs.
    pub fn with_failing_discards(mut self, ids: impl IntoIterator<Item = TabId>) -> Self {
        self.state.get_mut().failing.extend(ids);
        self
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Subscribe to tab lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    /// Every tab, in storage order.
    pub async fn tabs(&self) -> TabnapResult<Vec<TabSnapshot>> {
        self.query_tabs(&TabQuery::all()).await
    }

    /// Open a new background tab at the end of `window_id`.
    pub async fn open_tab(
        &self,
        window_id: WindowId,
        url: impl Into<String>,
        title: impl Into<String>,
    ) -> TabnapResult<TabId> {
        let mut state = self.state.write().await;
        self.sync_from_disk(&mut state)?;

        let id = TabId(state.tabs.iter().map(|t| t.id.0).max().unwrap_or(0) + 1);
        let index = state.tabs.iter().filter(|t| t.window_id == window_id).count() as u32;
        let incognito = state
            .tabs
            .iter()
            .find(|t| t.window_id == window_id)
            .map(|t| t.incognito)
            .unwrap_or(false);

        state.tabs.push(TabSnapshot {
            id,
            window_id,
            index,
            active: false,
            discarded: false,
            audible: false,
            auto_discardable: true,
            incognito,
            last_accessed: Some(now_millis()),
            url: url.into(),
            title: title.into(),
            fav_icon_url: None,
        });

        self.persist(&state)?;
        drop(state);

        let _ = self.events.send(HostEvent::Created(id));
        Ok(id)
    }

    fn sync_from_disk(&self, state: &mut SnapshotState) -> TabnapResult<()> {
        if let Some(ref path) = self.path {
            let file = read_snapshot_file(path)?;
            state.tabs = file.tabs;
            if file.current_window.is_some() {
                state.window = file.current_window;
            }
        }
        Ok(())
    }

    fn persist(&self, state: &SnapshotState) -> TabnapResult<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        let file = SnapshotFile {
            current_window: state.window,
            tabs: state.tabs.clone(),
        };
        replace_file(path, serde_json::to_string_pretty(&file)?.as_bytes())?;
        Ok(())
    }
}

fn read_snapshot_file(path: &Path) -> TabnapResult<SnapshotFile> {
    if !path.exists() {
        return Ok(SnapshotFile::default());
    }

    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| {
        TabnapError::Host(format!(
            "Failed to parse tab snapshot {}: {}",
            path.display(),
            e
        ))
    })
}

impl TabHost for SnapshotHost {
    async fn query_tabs(&self, query: &TabQuery) -> TabnapResult<Vec<TabSnapshot>> {
        let mut state = self.state.write().await;
        self.sync_from_disk(&mut state)?;

        Ok(state
            .tabs
            .iter()
            .filter(|t| query.matches(t))
            .cloned()
            .collect())
    }

    async fn discard_tab(&self, id: TabId) -> TabnapResult<()> {
        let mut state = self.state.write().await;
        self.sync_from_disk(&mut state)?;

        let pos = state.position(id)?;
        if state.failing.contains(&id) {
            return Err(TabnapError::Host(format!("Cannot discard tab {}", id)));
        }

        state.tabs[pos].discarded = true;
        self.persist(&state)?;
        drop(state);

        let _ = self.events.send(HostEvent::Updated(id));
        Ok(())
    }

    async fn close_tab(&self, id: TabId) -> TabnapResult<()> {
        let mut state = self.state.write().await;
        self.sync_from_disk(&mut state)?;

        let pos = state.position(id)?;
        let removed = state.tabs.remove(pos);
        state.reindex(removed.window_id);

        // Closing the foreground tab hands focus to its neighbour.
        let mut activated = None;
        if removed.active {
            let neighbour = state
                .tabs
                .iter_mut()
                .filter(|t| t.window_id == removed.window_id)
                .min_by_key(|t| t.index.abs_diff(removed.index));
            if let Some(tab) = neighbour {
                tab.active = true;
                tab.discarded = false;
                tab.last_accessed = Some(now_millis());
                activated = Some(tab.id);
            }
        }

        self.persist(&state)?;
        drop(state);

        let _ = self.events.send(HostEvent::Removed(id));
        if let Some(next) = activated {
            let _ = self.events.send(HostEvent::Activated(next));
        }
        Ok(())
    }

    async fn activate_tab(&self, id: TabId, window_id: WindowId) -> TabnapResult<()> {
        let mut state = self.state.write().await;
        self.sync_from_disk(&mut state)?;

        let pos = state.position(id)?;
        if state.tabs[pos].window_id != window_id {
            return Err(TabnapError::Host(format!(
                "Tab {} is not in window {}",
                id, window_id
            )));
        }

        let now = now_millis();
        for tab in state.tabs.iter_mut().filter(|t| t.window_id == window_id) {
            tab.active = tab.id == id;
            if tab.active {
                tab.discarded = false;
                tab.last_accessed = Some(now);
            }
        }

        let incognito = state.tabs[pos].incognito;
        state.window = Some(WindowInfo {
            id: window_id,
            focused: true,
            incognito,
        });

        self.persist(&state)?;
        drop(state);

        let _ = self.events.send(HostEvent::Activated(id));
        Ok(())
    }

    async fn current_window(&self) -> TabnapResult<WindowInfo> {
        let mut state = self.state.write().await;
        self.sync_from_disk(&mut state)?;
        Ok(state.current_window())
    }
}
