//! Tab list model - search, sort and selection over host snapshots.
//!
//! This is the logic behind the tab list view, kept free of any rendering
//! concerns. Actions issued from the list (activate, close, discard) go
//! straight to the host and bypass the policy engine.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::TabnapResult;
use crate::host::{TabHost, TabId, TabQuery, TabSnapshot, WindowInfo};

/// Ordering of the visible list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Active tab first, then loaded before suspended, then window/position.
    #[default]
    Active,
    /// Most recently accessed first.
    Recent,
    Title,
    Url,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Active => "active",
            SortOrder::Recent => "recent",
            SortOrder::Title => "title",
            SortOrder::Url => "url",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(SortOrder::Active),
            "recent" => Ok(SortOrder::Recent),
            "title" => Ok(SortOrder::Title),
            "url" => Ok(SortOrder::Url),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

/// Tabs to show for `window`: an incognito window only lists incognito tabs.
pub fn visible_tabs(tabs: Vec<TabSnapshot>, window: &WindowInfo) -> Vec<TabSnapshot> {
    if window.incognito {
        tabs.into_iter().filter(|t| t.incognito).collect()
    } else {
        tabs
    }
}

/// Case-insensitive substring match on title or URL. Blank queries match all.
pub fn filter_tabs(tabs: &[TabSnapshot], query: &str) -> Vec<TabSnapshot> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return tabs.to_vec();
    }

    tabs.iter()
        .filter(|t| t.title.to_lowercase().contains(&query) || t.url.to_lowercase().contains(&query))
        .cloned()
        .collect()
}

fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Stable sort in place.
pub fn sort_tabs(tabs: &mut [TabSnapshot], order: SortOrder) {
    match order {
        SortOrder::Active => tabs.sort_by(|a, b| {
            b.active
                .cmp(&a.active)
                .then_with(|| a.discarded.cmp(&b.discarded))
                .then_with(|| a.window_id.cmp(&b.window_id))
                .then_with(|| a.index.cmp(&b.index))
        }),
        SortOrder::Recent => tabs.sort_by(|a, b| {
            b.last_accessed_or_epoch()
                .total_cmp(&a.last_accessed_or_epoch())
        }),
        SortOrder::Title => tabs.sort_by(|a, b| compare_text(&a.title, &b.title)),
        SortOrder::Url => tabs.sort_by(|a, b| compare_text(&a.url, &b.url)),
    }
}

/// Loaded background tabs: the only ones a user can tick or bulk-suspend.
pub fn is_suspendable(tab: &TabSnapshot) -> bool {
    !tab.active && !tab.discarded
}

/// Every suspendable tab, for "suspend all".
pub fn suspendable_ids(tabs: &[TabSnapshot]) -> Vec<TabId> {
    tabs.iter().filter(|t| is_suspendable(t)).map(|t| t.id).collect()
}

/// State of the tab list: current snapshot, search, sort, keyboard cursor
/// and ticked rows.
#[derive(Debug, Clone, Default)]
pub struct TabList {
    tabs: Vec<TabSnapshot>,
    query: String,
    sort: SortOrder,
    visible: Vec<TabSnapshot>,
    cursor: Option<usize>,
    checked: BTreeSet<TabId>,
}

impl TabList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-query the host and rebuild the list.
    pub async fn refresh<H: TabHost>(&mut self, host: &H) -> TabnapResult<()> {
        let window = host.current_window().await?;
        let tabs = host.query_tabs(&TabQuery::all()).await?;
        self.replace_tabs(visible_tabs(tabs, &window));
        Ok(())
    }

    /// Swap in a new snapshot, keeping search, sort, cursor and checks
    /// where they still apply.
    pub fn replace_tabs(&mut self, tabs: Vec<TabSnapshot>) {
        self.tabs = tabs;
        self.rebuild();
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.rebuild();
    }

    pub fn set_sort(&mut self, sort: SortOrder) {
        self.sort = sort;
        self.rebuild();
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort
    }

    /// All tabs from the last snapshot, unfiltered.
    pub fn tabs(&self) -> &[TabSnapshot] {
        &self.tabs
    }

    /// Filtered and sorted rows.
    pub fn visible(&self) -> &[TabSnapshot] {
        &self.visible
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn cursor_tab(&self) -> Option<&TabSnapshot> {
        self.cursor.and_then(|i| self.visible.get(i))
    }

    /// Arrow-down: first row when nothing is selected, clamped at the end.
    pub fn move_down(&mut self) {
        if self.visible.is_empty() {
            return;
        }
        let last = self.visible.len() - 1;
        self.cursor = Some(self.cursor.map_or(0, |i| (i + 1).min(last)));
    }

    /// Arrow-up: clamped at the first row.
    pub fn move_up(&mut self) {
        if self.visible.is_empty() {
            return;
        }
        self.cursor = Some(self.cursor.map_or(0, |i| i.saturating_sub(1)));
    }

    pub fn is_checked(&self, id: TabId) -> bool {
        self.checked.contains(&id)
    }

    /// Flip the checkbox for `id`. Active and suspended rows cannot be
    /// ticked. Returns the new state.
    pub fn toggle_checked(&mut self, id: TabId) -> bool {
        let checkable = self
            .visible
            .iter()
            .any(|t| t.id == id && is_suspendable(t));
        if !checkable {
            return false;
        }

        if !self.checked.remove(&id) {
            self.checked.insert(id);
            return true;
        }
        false
    }

    /// Ticked rows in display order.
    pub fn checked_ids(&self) -> Vec<TabId> {
        self.visible
            .iter()
            .filter(|t| self.checked.contains(&t.id))
            .map(|t| t.id)
            .collect()
    }

    /// Every suspendable tab in the snapshot, ignoring the search filter.
    pub fn suspendable_ids(&self) -> Vec<TabId> {
        suspendable_ids(&self.tabs)
    }

    /// Enter: switch to the tab under the cursor and focus its window.
    pub async fn activate_cursor<H: TabHost>(&self, host: &H) -> TabnapResult<Option<TabId>> {
        let Some(tab) = self.cursor_tab() else {
            return Ok(None);
        };
        host.activate_tab(tab.id, tab.window_id).await?;
        Ok(Some(tab.id))
    }

    fn rebuild(&mut self) {
        let mut visible = filter_tabs(&self.tabs, &self.query);
        sort_tabs(&mut visible, self.sort);
        self.visible = visible;

        let visible = &self.visible;
        self.checked
            .retain(|id| visible.iter().any(|t| t.id == *id && is_suspendable(t)));

        self.cursor = match self.cursor {
            _ if self.visible.is_empty() => None,
            Some(i) => Some(i.min(self.visible.len() - 1)),
            None => None,
        };
    }
}
