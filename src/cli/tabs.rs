//! Tab commands: list, plan, enforce, suspend, close and activate.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::config::{Settings, SuspendMode};
use crate::core::policy::{plan_idle_timer, plan_max_tabs, PolicyEngine, SuspendReport};
use crate::core::{SortOrder, TabList};
use crate::error::{TabnapError, TabnapResult};
use crate::host::{SnapshotHost, TabHost, TabId, TabQuery, TabSnapshot};
use crate::store::SettingsStore;

fn open_host(path: &Path) -> anyhow::Result<Arc<SnapshotHost>> {
    let host = SnapshotHost::open(path)
        .with_context(|| format!("Failed to open tab snapshot {}", path.display()))?;
    Ok(Arc::new(host))
}

fn state_marker(tab: &TabSnapshot) -> &'static str {
    if tab.active {
        "active"
    } else if tab.discarded {
        "zzz"
    } else if tab.audible {
        "audio"
    } else {
        ""
    }
}

/// One row of tab output: id, state, title and URL.
pub fn format_row(tab: &TabSnapshot) -> String {
    let title = if tab.title.is_empty() {
        "(untitled)"
    } else {
        tab.title.as_str()
    };
    format!("{:>6}  {:<6}  {}  {}", tab.id, state_marker(tab), title, tab.url)
}

fn print_report(report: &SuspendReport) {
    for id in &report.suspended {
        println!("suspended {}", id);
    }
    for (id, reason) in &report.failed {
        println!("failed    {}: {}", id, reason);
    }
    if report.is_empty() {
        println!("Nothing to suspend.");
    }
}

pub async fn list(tabs_path: &Path, search: Option<&str>, sort: SortOrder) -> anyhow::Result<()> {
    let host = open_host(tabs_path)?;

    let mut list = TabList::new();
    list.set_sort(sort);
    if let Some(search) = search {
        list.set_query(search);
    }
    list.refresh(&*host).await?;

    if list.is_empty() {
        println!("No tabs.");
        return Ok(());
    }

    for tab in list.visible() {
        println!("{}", format_row(tab));
    }
    Ok(())
}

/// Tabs the current settings would suspend at `now_ms`, without touching them.
pub async fn plan_for<H: TabHost>(
    settings: &Settings,
    host: &H,
    now_ms: f64,
) -> TabnapResult<Vec<TabSnapshot>> {
    match settings.mode {
        SuspendMode::Manual => Ok(Vec::new()),
        SuspendMode::MaxTabs => {
            let total = host.query_tabs(&TabQuery::all()).await?.len();
            let candidates = host
                .query_tabs(&TabQuery::auto_suspend_candidates())
                .await?;
            Ok(plan_max_tabs(settings, total, candidates))
        }
        SuspendMode::AutoTimer => {
            let candidates = host
                .query_tabs(&TabQuery::auto_suspend_candidates())
                .await?;
            Ok(plan_idle_timer(settings, now_ms, candidates))
        }
    }
}

pub async fn plan(store: &SettingsStore, tabs_path: &Path) -> anyhow::Result<()> {
    let settings = store.load();
    let host = open_host(tabs_path)?;

    if settings.mode == SuspendMode::Manual {
        println!("Mode is manual: no tabs are suspended automatically.");
        return Ok(());
    }

    let plan = plan_for(&settings, &*host, crate::host::now_millis()).await?;
    if plan.is_empty() {
        println!("Nothing to suspend ({} mode).", settings.mode);
        return Ok(());
    }

    println!("Would suspend {} tab(s) ({} mode):", plan.len(), settings.mode);
    for tab in &plan {
        println!("{}", format_row(tab));
    }
    Ok(())
}

pub async fn enforce(store: &SettingsStore, tabs_path: &Path) -> anyhow::Result<()> {
    let settings = store.load();
    let engine = PolicyEngine::new(open_host(tabs_path)?, settings);

    let report = engine.on_tick().await.context("Auto-suspend pass failed")?;
    print_report(&report);
    Ok(())
}

pub async fn suspend(
    store: &SettingsStore,
    tabs_path: &Path,
    ids: &[i64],
    all: bool,
) -> anyhow::Result<()> {
    let engine = PolicyEngine::new(open_host(tabs_path)?, store.load());

    let ids: Vec<TabId> = if all {
        let mut list = TabList::new();
        list.refresh(&**engine.host()).await?;
        list.suspendable_ids()
    } else {
        ids.iter().copied().map(TabId).collect()
    };

    let report = engine.suspend_tabs(&ids).await;
    print_report(&report);
    Ok(())
}

pub async fn close(tabs_path: &Path, id: i64) -> anyhow::Result<()> {
    let host = open_host(tabs_path)?;
    host.close_tab(TabId(id)).await?;
    println!("closed {}", id);
    Ok(())
}

/// Look up the tab's window and switch to it.
pub async fn activate_by_id<H: TabHost>(host: &H, id: TabId) -> TabnapResult<()> {
    let tab = host
        .query_tabs(&TabQuery::all())
        .await?
        .into_iter()
        .find(|t| t.id == id)
        .ok_or(TabnapError::TabNotFound(id))?;

    host.activate_tab(tab.id, tab.window_id).await
}

pub async fn activate(tabs_path: &Path, id: i64) -> anyhow::Result<()> {
    let host = open_host(tabs_path)?;
    activate_by_id(&*host, TabId(id)).await?;
    println!("activated {}", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::WindowId;

    const MINUTE: f64 = 60_000.0;

    fn tab(id: i64, last_accessed: f64) -> TabSnapshot {
        TabSnapshot {
            id: TabId(id),
            window_id: WindowId(1),
            index: id as u32,
            active: id == 0,
            discarded: false,
            audible: false,
            auto_discardable: true,
            incognito: false,
            last_accessed: Some(last_accessed),
            url: format!("https://site{}.test/", id),
            title: format!("Tab {}", id),
            fav_icon_url: None,
        }
    }

    fn write_tabs(dir: &tempfile::TempDir, tabs: &[TabSnapshot]) -> std::path::PathBuf {
        let path = dir.path().join("tabs.json");
        let file = serde_json::json!({ "tabs": tabs });
        std::fs::write(&path, file.to_string()).unwrap();
        path
    }

    fn ids(tabs: &[TabSnapshot]) -> Vec<i64> {
        tabs.iter().map(|t| t.id.0).collect()
    }

    #[test]
    fn test_format_row() {
        let mut t = tab(7, 0.0);
        assert!(format_row(&t).contains("Tab 7"));
        t.discarded = true;
        t.title.clear();
        let row = format_row(&t);
        assert!(row.contains("zzz"));
        assert!(row.contains("(untitled)"));
        assert!(row.contains("https://site7.test/"));
    }

    #[tokio::test]
    async fn test_plan_for_each_mode() {
        let now = 100.0 * MINUTE;
        let host = SnapshotHost::new(vec![
            tab(0, now),
            tab(1, now - 45.0 * MINUTE),
            tab(2, now - 5.0 * MINUTE),
            tab(3, now - 60.0 * MINUTE),
        ]);

        let manual = Settings::default();
        assert!(plan_for(&manual, &host, now).await.unwrap().is_empty());

        let limited = Settings {
            mode: SuspendMode::MaxTabs,
            max_tabs: 2,
            ..Settings::default()
        };
        assert_eq!(ids(&plan_for(&limited, &host, now).await.unwrap()), vec![3, 1]);

        let timed = Settings {
            mode: SuspendMode::AutoTimer,
            auto_suspend_minutes: 30,
            ..Settings::default()
        };
        assert_eq!(ids(&plan_for(&timed, &host, now).await.unwrap()), vec![1, 3]);

        // A dry run leaves every tab loaded.
        assert!(host.tabs().await.unwrap().iter().all(|t| !t.discarded));
    }

    #[tokio::test]
    async fn test_activate_by_id() {
        let host = SnapshotHost::new(vec![tab(0, 10.0), tab(1, 5.0)]);
        activate_by_id(&host, TabId(1)).await.unwrap();

        let tabs = host.tabs().await.unwrap();
        assert!(tabs[1].active);
        assert!(!tabs[0].active);

        assert!(matches!(
            activate_by_id(&host, TabId(9)).await,
            Err(TabnapError::TabNotFound(TabId(9)))
        ));
    }

    #[tokio::test]
    async fn test_suspend_all_and_enforce_against_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tabs(&dir, &[tab(0, 30.0), tab(1, 20.0), tab(2, 10.0)]);
        let store = SettingsStore::in_memory(Settings::default());

        suspend(&store, &path, &[], true).await.unwrap();

        let reopened = SnapshotHost::open(&path).unwrap();
        let discarded: Vec<i64> = reopened
            .tabs()
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.discarded)
            .map(|t| t.id.0)
            .collect();
        assert_eq!(discarded, vec![1, 2]);

        // Manual mode: enforcing is a no-op and must not fail.
        enforce(&store, &path).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_missing_tab_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tabs(&dir, &[tab(0, 1.0)]);
        assert!(close(&path, 5).await.is_err());
        close(&path, 0).await.unwrap();
        assert!(SnapshotHost::open(&path).unwrap().tabs().await.unwrap().is_empty());
    }
}
