//! Auto-suspend decision engine.
//!
//! Given the current [`Settings`] and a fresh host snapshot, decides which
//! tabs to suspend and in what order:
//!
//! - **max-tabs**: suspend the oldest-accessed candidates until the total tab
//!   count is back at the threshold (best effort, see [`plan_max_tabs`]).
//! - **auto-timer**: suspend every candidate idle for longer than the limit.
//! - **manual**: nothing happens automatically.
//!
//! Discards are issued one at a time. A failed discard is logged, recorded in
//! the [`SuspendReport`] and never retried within the pass.

use std::sync::Arc;

use url::Url;

use crate::config::{Settings, SuspendMode};
use crate::error::TabnapResult;
use crate::host::{TabHost, TabId, TabQuery, TabSnapshot};

/// Outcome of one suspension pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuspendReport {
    /// Tabs the host accepted, in the order they were requested.
    pub suspended: Vec<TabId>,
    /// Tabs the host rejected, with the reason.
    pub failed: Vec<(TabId, String)>,
}

impl SuspendReport {
    pub fn attempted(&self) -> usize {
        self.suspended.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempted() == 0
    }
}

/// Whether automatic policies must leave `tab` alone.
pub fn is_excluded(settings: &Settings, tab: &TabSnapshot) -> bool {
    if tab.active {
        return true;
    }

    if settings.ignore_audible && tab.audible {
        return true;
    }

    if settings.use_whitelist {
        let domains = settings.whitelist_domains();
        if !domains.is_empty() && host_matches_any(&tab.url, &domains) {
            return true;
        }
    }

    false
}

/// Substring match of the URL's host against whitelist entries.
/// URLs that fail to parse or have no host never match.
fn host_matches_any(url: &str, domains: &[&str]) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };

    domains.iter().any(|d| host.contains(d))
}

/// Candidates to suspend under max-tabs mode, oldest first.
///
/// `total` comes from one query and `candidates` from another; if the tab
/// set changes in between the result is capped at whatever candidates exist.
pub fn plan_max_tabs(
    settings: &Settings,
    total: usize,
    candidates: Vec<TabSnapshot>,
) -> Vec<TabSnapshot> {
    let limit = settings.max_tabs as usize;
    if total <= limit {
        return Vec::new();
    }
    let excess = total - limit;

    let mut eligible: Vec<TabSnapshot> = candidates
        .into_iter()
        .filter(|t| !t.discarded && !is_excluded(settings, t))
        .collect();
    eligible.sort_by(|a, b| {
        a.last_accessed_or_epoch()
            .total_cmp(&b.last_accessed_or_epoch())
    });
    eligible.truncate(excess);
    eligible
}

/// Candidates idle for longer than the auto-timer limit at `now_ms`.
pub fn plan_idle_timer(
    settings: &Settings,
    now_ms: f64,
    candidates: Vec<TabSnapshot>,
) -> Vec<TabSnapshot> {
    let limit_ms = settings.idle_limit_ms();

    candidates
        .into_iter()
        .filter(|t| !t.discarded && !is_excluded(settings, t))
        .filter(|t| now_ms - t.last_accessed_or_epoch() > limit_ms)
        .collect()
}

/// Applies the configured policy against a tab host.
pub struct PolicyEngine<H> {
    host: Arc<H>,
    settings: Settings,
}

impl<H: TabHost> PolicyEngine<H> {
    pub fn new(host: Arc<H>, settings: Settings) -> Self {
        Self {
            host,
            settings: settings.validated(),
        }
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the settings wholesale (on a store change notification).
    pub fn reload(&mut self, settings: Settings) {
        tracing::debug!(mode = %settings.mode, "Reloaded suspend settings");
        self.settings = settings.validated();
    }

    /// Periodic evaluation: dispatch on the current mode.
    pub async fn on_tick(&self) -> TabnapResult<SuspendReport> {
        match self.settings.mode {
            SuspendMode::Manual => Ok(SuspendReport::default()),
            SuspendMode::MaxTabs => self.enforce_max_tabs().await,
            SuspendMode::AutoTimer => self.enforce_idle_timer().await,
        }
    }

    /// The limit is enforced eagerly when tabs are added, not only on ticks.
    pub async fn on_new_tab_created(&self) -> TabnapResult<SuspendReport> {
        if self.settings.mode == SuspendMode::MaxTabs {
            self.enforce_max_tabs().await
        } else {
            Ok(SuspendReport::default())
        }
    }

    pub async fn enforce_max_tabs(&self) -> TabnapResult<SuspendReport> {
        let total = self.host.query_tabs(&TabQuery::all()).await?.len();
        if total <= self.settings.max_tabs as usize {
            return Ok(SuspendReport::default());
        }

        let candidates = self
            .host
            .query_tabs(&TabQuery::auto_suspend_candidates())
            .await?;
        let plan = plan_max_tabs(&self.settings, total, candidates);

        tracing::debug!(
            total,
            max_tabs = self.settings.max_tabs,
            planned = plan.len(),
            "Enforcing tab limit"
        );

        Ok(self.discard_all(&plan, "auto-discard").await)
    }

    pub async fn enforce_idle_timer(&self) -> TabnapResult<SuspendReport> {
        self.enforce_idle_timer_at(crate::host::now_millis()).await
    }

    /// Idle-timer pass evaluated against an explicit clock reading.
    pub async fn enforce_idle_timer_at(&self, now_ms: f64) -> TabnapResult<SuspendReport> {
        let candidates = self
            .host
            .query_tabs(&TabQuery::auto_suspend_candidates())
            .await?;
        let plan = plan_idle_timer(&self.settings, now_ms, candidates);

        tracing::debug!(
            minutes = self.settings.auto_suspend_minutes,
            planned = plan.len(),
            "Enforcing idle timer"
        );

        Ok(self.discard_all(&plan, "timer-discard").await)
    }

    /// Suspend one tab unconditionally. Exclusion rules do not apply.
    pub async fn suspend_tab(&self, id: TabId) -> TabnapResult<()> {
        self.host.discard_tab(id).await
    }

    /// Suspend an explicit list of tabs, in order, ignoring exclusion rules.
    pub async fn suspend_tabs(&self, ids: &[TabId]) -> SuspendReport {
        let mut report = SuspendReport::default();
        for &id in ids {
            self.discard_one(id, "discard", &mut report).await;
        }
        report
    }

    /// "Suspend this tab" context-menu command.
    ///
    /// A background tab that is already discarded is left as is; the
    /// foreground tab is attempted even though most hosts refuse it.
    pub async fn suspend_from_context_menu(&self, tab: &TabSnapshot) -> SuspendReport {
        let mut report = SuspendReport::default();
        if tab.active {
            self.discard_one(tab.id, "discard active", &mut report).await;
        } else if !tab.discarded {
            self.discard_one(tab.id, "discard", &mut report).await;
        }
        report
    }

    async fn discard_all(&self, tabs: &[TabSnapshot], action: &str) -> SuspendReport {
        let mut report = SuspendReport::default();
        for tab in tabs {
            self.discard_one(tab.id, action, &mut report).await;
        }
        if !report.is_empty() {
            tracing::info!(
                suspended = report.suspended.len(),
                failed = report.failed.len(),
                "{} pass finished",
                action
            );
        }
        report
    }

    async fn discard_one(&self, id: TabId, action: &str, report: &mut SuspendReport) {
        match self.host.discard_tab(id).await {
            Ok(()) => report.suspended.push(id),
            Err(e) => {
                tracing::warn!("Failed to {} tab {}: {}", action, id, e);
                report.failed.push((id, e.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{SnapshotHost, WindowId};

    const MINUTE: f64 = 60_000.0;

    fn tab(id: i64, last_accessed: Option<f64>) -> TabSnapshot {
        TabSnapshot {
            id: TabId(id),
            window_id: WindowId(1),
            index: id as u32,
            active: false,
            discarded: false,
            audible: false,
            auto_discardable: true,
            incognito: false,
            last_accessed,
            url: format!("https://site{}.test/", id),
            title: format!("Tab {}", id),
            fav_icon_url: None,
        }
    }

    /// `count` tabs where tab 0 is active and older ids are older.
    fn window_of(count: i64) -> Vec<TabSnapshot> {
        (0..count)
            .map(|i| {
                let mut t = tab(i, Some(1_000.0 + i as f64));
                t.active = i == 0;
                t
            })
            .collect()
    }

    fn max_tabs(limit: u32) -> Settings {
        Settings {
            mode: SuspendMode::MaxTabs,
            max_tabs: limit,
            ..Settings::default()
        }
    }

    fn auto_timer(minutes: u32) -> Settings {
        Settings {
            mode: SuspendMode::AutoTimer,
            auto_suspend_minutes: minutes,
            ..Settings::default()
        }
    }

    fn engine(tabs: Vec<TabSnapshot>, settings: Settings) -> PolicyEngine<SnapshotHost> {
        PolicyEngine::new(Arc::new(SnapshotHost::new(tabs)), settings)
    }

    async fn discarded_ids(engine: &PolicyEngine<SnapshotHost>) -> Vec<TabId> {
        engine
            .host()
            .tabs()
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.discarded)
            .map(|t| t.id)
            .collect()
    }

    #[test]
    fn test_active_tab_always_excluded() {
        let mut t = tab(1, None);
        t.active = true;
        assert!(is_excluded(&Settings::default(), &t));
    }

    #[test]
    fn test_audible_exclusion_follows_setting() {
        let mut t = tab(1, None);
        t.audible = true;

        assert!(is_excluded(&Settings::default(), &t));

        let settings = Settings {
            ignore_audible: false,
            ..Settings::default()
        };
        assert!(!is_excluded(&settings, &t));
    }

    #[test]
    fn test_whitelist_matches_host_substring() {
        let settings = Settings {
            use_whitelist: true,
            whitelist: "example.com\nfoo.org".to_string(),
            ..Settings::default()
        };

        let mut t = tab(1, None);
        t.url = "https://sub.example.com/page".to_string();
        assert!(is_excluded(&settings, &t));

        t.url = "https://other.com".to_string();
        assert!(!is_excluded(&settings, &t));

        // Only the host is matched, not the path.
        t.url = "https://other.com/example.com".to_string();
        assert!(!is_excluded(&settings, &t));
    }

    #[test]
    fn test_whitelist_ignored_when_disabled_or_empty() {
        let mut t = tab(1, None);
        t.url = "https://example.com/".to_string();

        let disabled = Settings {
            use_whitelist: false,
            whitelist: "example.com".to_string(),
            ..Settings::default()
        };
        assert!(!is_excluded(&disabled, &t));

        let blank = Settings {
            use_whitelist: true,
            whitelist: " \n \n".to_string(),
            ..Settings::default()
        };
        assert!(!is_excluded(&blank, &t));
    }

    #[test]
    fn test_malformed_url_is_not_whitelisted() {
        let settings = Settings {
            use_whitelist: true,
            whitelist: "example.com".to_string(),
            ..Settings::default()
        };
        let mut t = tab(1, None);

        t.url = "not a url example.com".to_string();
        assert!(!is_excluded(&settings, &t));

        t.url = "about:blank".to_string();
        assert!(!is_excluded(&settings, &t));
    }

    #[test]
    fn test_plan_max_tabs_under_limit() {
        let tabs = window_of(10);
        assert!(plan_max_tabs(&max_tabs(10), 10, tabs.clone()).is_empty());
        assert!(plan_max_tabs(&max_tabs(25), 10, tabs).is_empty());
    }

    #[test]
    fn test_plan_max_tabs_oldest_first_with_missing_times() {
        let tabs = vec![
            tab(1, Some(5_000.0)),
            tab(2, None),
            tab(3, Some(1_000.0)),
            tab(4, Some(9_000.0)),
        ];

        let plan = plan_max_tabs(&max_tabs(2), 5, tabs);
        let ids: Vec<TabId> = plan.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![TabId(2), TabId(3), TabId(1)]);
    }

    #[test]
    fn test_plan_max_tabs_capped_by_candidates() {
        let tabs = vec![tab(1, Some(1.0)), tab(2, Some(2.0))];
        let plan = plan_max_tabs(&max_tabs(1), 10, tabs);
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_plan_idle_timer_threshold() {
        let now = 100.0 * MINUTE;
        let tabs = vec![
            tab(1, Some(now - 31.0 * MINUTE)),
            tab(2, Some(now - 29.0 * MINUTE)),
            tab(3, Some(now - 30.0 * MINUTE)),
            tab(4, None),
        ];

        let plan = plan_idle_timer(&auto_timer(30), now, tabs);
        let ids: Vec<TabId> = plan.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![TabId(1), TabId(4)]);
    }

    #[tokio::test]
    async fn test_enforce_max_tabs_suspends_excess_oldest() {
        let engine = engine(window_of(30), max_tabs(25));

        let report = engine.enforce_max_tabs().await.unwrap();

        let expected: Vec<TabId> = (1..=5).map(TabId).collect();
        assert_eq!(report.suspended, expected);
        assert_eq!(discarded_ids(&engine).await, expected);
    }

    #[tokio::test]
    async fn test_enforce_max_tabs_noop_at_limit() {
        let engine = engine(window_of(25), max_tabs(25));
        let report = engine.enforce_max_tabs().await.unwrap();
        assert!(report.is_empty());
        assert!(discarded_ids(&engine).await.is_empty());
    }

    #[tokio::test]
    async fn test_enforce_max_tabs_counts_discarded_but_skips_them() {
        // Discarded tabs still count toward the total but are not candidates.
        let mut tabs = window_of(6);
        tabs[1].discarded = true;
        tabs[2].discarded = true;
        let engine = engine(tabs, max_tabs(3));

        let report = engine.enforce_max_tabs().await.unwrap();

        assert_eq!(report.suspended, vec![TabId(3), TabId(4), TabId(5)]);
    }

    #[tokio::test]
    async fn test_enforce_max_tabs_respects_exclusions() {
        let mut tabs = window_of(5);
        tabs[1].audible = true;
        tabs[2].auto_discardable = false;
        tabs[3].url = "https://docs.example.com/".to_string();
        let settings = Settings {
            use_whitelist: true,
            whitelist: "example.com".to_string(),
            ..max_tabs(1)
        };
        let engine = engine(tabs, settings);

        let report = engine.enforce_max_tabs().await.unwrap();

        assert_eq!(report.suspended, vec![TabId(4)]);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_pass() {
        let host = SnapshotHost::new(window_of(6)).with_failing_discards([TabId(1)]);
        let engine = PolicyEngine::new(Arc::new(host), max_tabs(3));

        let report = engine.enforce_max_tabs().await.unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, TabId(1));
        assert_eq!(report.suspended, vec![TabId(2), TabId(3)]);
        assert_eq!(report.attempted(), 3);
    }

    #[tokio::test]
    async fn test_enforce_idle_timer() {
        let now = 1_000.0 * MINUTE;
        let mut tabs = vec![
            tab(1, Some(now - 31.0 * MINUTE)),
            tab(2, Some(now - 29.0 * MINUTE)),
            tab(3, Some(now - 120.0 * MINUTE)),
        ];
        tabs[2].active = true;
        let engine = engine(tabs, auto_timer(30));

        let report = engine.enforce_idle_timer_at(now).await.unwrap();

        assert_eq!(report.suspended, vec![TabId(1)]);
    }

    #[tokio::test]
    async fn test_on_tick_dispatches_by_mode() {
        let manual = engine(window_of(30), Settings::default());
        assert!(manual.on_tick().await.unwrap().is_empty());

        let limited = engine(window_of(30), max_tabs(25));
        assert_eq!(limited.on_tick().await.unwrap().suspended.len(), 5);

        // Tabs with no recorded access are idle since the epoch.
        let mut tabs = window_of(3);
        for t in &mut tabs {
            t.last_accessed = None;
        }
        let timed = engine(tabs, auto_timer(30));
        assert_eq!(
            timed.on_tick().await.unwrap().suspended,
            vec![TabId(1), TabId(2)]
        );
    }

    #[tokio::test]
    async fn test_new_tab_created_only_in_max_tabs_mode() {
        let mut engine = engine(window_of(4), auto_timer(30));
        assert!(engine.on_new_tab_created().await.unwrap().is_empty());

        engine.reload(max_tabs(2));
        let report = engine.on_new_tab_created().await.unwrap();
        assert_eq!(report.suspended, vec![TabId(1), TabId(2)]);
    }

    #[tokio::test]
    async fn test_manual_suspend_ignores_exclusions() {
        let mut tabs = window_of(3);
        tabs[1].audible = true;
        let engine = engine(tabs, Settings::default());

        let report = engine
            .suspend_tabs(&[TabId(0), TabId(1), TabId(42)])
            .await;

        assert_eq!(report.suspended, vec![TabId(0), TabId(1)]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, TabId(42));
    }

    #[tokio::test]
    async fn test_context_menu_suspend() {
        let mut tabs = window_of(3);
        tabs[2].discarded = true;
        let engine = engine(tabs.clone(), Settings::default());

        let report = engine.suspend_from_context_menu(&tabs[0]).await;
        assert_eq!(report.suspended, vec![TabId(0)]);

        let report = engine.suspend_from_context_menu(&tabs[1]).await;
        assert_eq!(report.suspended, vec![TabId(1)]);

        let report = engine.suspend_from_context_menu(&tabs[2]).await;
        assert!(report.is_empty());
    }

    #[test]
    fn test_reload_validates() {
        let mut engine = engine(Vec::new(), Settings::default());
        engine.reload(Settings {
            max_tabs: 0,
            ..max_tabs(5)
        });
        assert_eq!(engine.settings().max_tabs, 25);
        assert_eq!(engine.settings().mode, SuspendMode::MaxTabs);
    }

    #[tokio::test]
    async fn test_suspend_tab_reports_missing() {
        let engine = engine(window_of(2), Settings::default());
        engine.suspend_tab(TabId(1)).await.unwrap();
        assert_eq!(discarded_ids(&engine).await, vec![TabId(1)]);
        assert!(engine.suspend_tab(TabId(9)).await.is_err());
    }
}
