use serde::{Deserialize, Serialize};

/// Default tab-count threshold for max-tabs mode.
pub const DEFAULT_MAX_TABS: u32 = 25;

/// Default idle threshold (minutes) for auto-timer mode.
pub const DEFAULT_AUTO_SUSPEND_MINUTES: u32 = 30;

/// The active auto-suspend policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuspendMode {
    /// Only user actions suspend tabs.
    #[default]
    Manual,
    /// Keep the number of loaded tabs at or under `max_tabs`.
    MaxTabs,
    /// Suspend tabs idle for longer than `auto_suspend_minutes`.
    AutoTimer,
}

impl SuspendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuspendMode::Manual => "manual",
            SuspendMode::MaxTabs => "max-tabs",
            SuspendMode::AutoTimer => "auto-timer",
        }
    }
}

impl std::fmt::Display for SuspendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SuspendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "manual" => Ok(SuspendMode::Manual),
            "max-tabs" | "max_tabs" => Ok(SuspendMode::MaxTabs),
            "auto-timer" | "auto_timer" => Ok(SuspendMode::AutoTimer),
            other => Err(format!(
                "unknown suspend mode '{}' (expected manual, max-tabs or auto-timer)",
                other
            )),
        }
    }
}

/// Auto-suspend settings.
///
/// Every field is defaulted on deserialization, so a partial record read
/// from storage is merged over the built-in defaults field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    #[serde(rename = "suspendMode")]
    pub mode: SuspendMode,
    pub max_tabs: u32,
    pub auto_suspend_minutes: u32,
    pub ignore_audible: bool,
    pub use_whitelist: bool,
    /// Newline-separated domain substrings.
    pub whitelist: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: SuspendMode::Manual,
            max_tabs: DEFAULT_MAX_TABS,
            auto_suspend_minutes: DEFAULT_AUTO_SUSPEND_MINUTES,
            ignore_audible: true,
            use_whitelist: false,
            whitelist: String::new(),
        }
    }
}

impl Settings {
    /// Repair out-of-range values. Thresholds must be positive; a zero
    /// falls back to the default rather than disabling the policy.
    pub fn validate(&mut self) {
        if self.max_tabs == 0 {
            self.max_tabs = DEFAULT_MAX_TABS;
        }
        if self.auto_suspend_minutes == 0 {
            self.auto_suspend_minutes = DEFAULT_AUTO_SUSPEND_MINUTES;
        }
    }

    /// Consume and return a validated copy.
    pub fn validated(mut self) -> Self {
        self.validate();
        self
    }

    /// Whitelist entries: trimmed, empty lines dropped.
    pub fn whitelist_domains(&self) -> Vec<&str> {
        self.whitelist
            .lines()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .collect()
    }

    /// Idle threshold in milliseconds.
    pub fn idle_limit_ms(&self) -> f64 {
        self.auto_suspend_minutes as f64 * 60.0 * 1000.0
    }

    /// Apply a partial update, producing a whole new record.
    pub fn apply(&self, patch: &SettingsPatch) -> Settings {
        let mut next = self.clone();
        if let Some(mode) = patch.mode {
            next.mode = mode;
        }
        if let Some(max_tabs) = patch.max_tabs {
            next.max_tabs = max_tabs;
        }
        if let Some(minutes) = patch.auto_suspend_minutes {
            next.auto_suspend_minutes = minutes;
        }
        if let Some(ignore) = patch.ignore_audible {
            next.ignore_audible = ignore;
        }
        if let Some(use_whitelist) = patch.use_whitelist {
            next.use_whitelist = use_whitelist;
        }
        if let Some(ref whitelist) = patch.whitelist {
            next.whitelist = whitelist.clone();
        }
        next.validated()
    }
}

/// A partial edit coming from the settings form or the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub mode: Option<SuspendMode>,
    pub max_tabs: Option<u32>,
    pub auto_suspend_minutes: Option<u32>,
    pub ignore_audible: Option<bool>,
    pub use_whitelist: Option<bool>,
    pub whitelist: Option<String>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == SettingsPatch::default()
    }
}
