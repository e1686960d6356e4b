//! `tabnap settings` subcommands.

use anyhow::Context;

use super::SetArgs;
use crate::config::{Settings, SettingsPatch};
use crate::store::SettingsStore;

impl From<SetArgs> for SettingsPatch {
    fn from(args: SetArgs) -> Self {
        SettingsPatch {
            mode: args.mode,
            max_tabs: args.max_tabs,
            auto_suspend_minutes: args.auto_suspend_minutes,
            ignore_audible: args.ignore_audible,
            use_whitelist: args.use_whitelist,
            whitelist: args.whitelist.map(|domains| domains.join("\n")),
        }
    }
}

/// Human-readable settings summary.
pub fn render(settings: &Settings) -> String {
    let domains = settings.whitelist_domains();
    let whitelist = if domains.is_empty() {
        "(empty)".to_string()
    } else {
        domains.join(", ")
    };

    format!(
        "mode:                 {}\n\
         max tabs:             {}\n\
         auto-suspend minutes: {}\n\
         ignore audible:       {}\n\
         use whitelist:        {}\n\
         whitelist:            {}",
        settings.mode,
        settings.max_tabs,
        settings.auto_suspend_minutes,
        settings.ignore_audible,
        settings.use_whitelist,
        whitelist,
    )
}

pub fn show(store: &SettingsStore) -> anyhow::Result<()> {
    println!("{}", render(&store.load()));
    if let Some(path) = store.path() {
        println!("\nstored in {}", path.display());
    }
    Ok(())
}

pub fn reset(store: &SettingsStore) -> anyhow::Result<()> {
    store
        .save(Settings::default())
        .context("Failed to reset settings")?;
    println!("{}", render(&Settings::default()));
    Ok(())
}

pub fn set(store: &SettingsStore, args: SetArgs) -> anyhow::Result<()> {
    let patch = SettingsPatch::from(args);
    if patch.is_empty() {
        anyhow::bail!("Nothing to change. Run `tabnap settings set --help` for the options.");
    }

    let next = store.load().apply(&patch);
    store.save(next.clone()).context("Failed to save settings")?;
    println!("{}", render(&next));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuspendMode;

    #[test]
    fn test_set_args_into_patch() {
        let args = SetArgs {
            mode: Some(SuspendMode::AutoTimer),
            whitelist: Some(vec!["a.com".to_string(), "b.org".to_string()]),
            ..SetArgs::default()
        };
        let patch = SettingsPatch::from(args);
        assert_eq!(patch.mode, Some(SuspendMode::AutoTimer));
        assert_eq!(patch.whitelist.as_deref(), Some("a.com\nb.org"));
        assert_eq!(patch.max_tabs, None);

        let cleared = SettingsPatch::from(SetArgs {
            whitelist: Some(Vec::new()),
            ..SetArgs::default()
        });
        assert_eq!(cleared.whitelist.as_deref(), Some(""));
    }

    #[test]
    fn test_set_writes_whole_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("storage.json"));

        set(
            &store,
            SetArgs {
                max_tabs: Some(12),
                ..SetArgs::default()
            },
        )
        .unwrap();

        let reopened = SettingsStore::open(dir.path().join("storage.json"));
        let settings = reopened.load();
        assert_eq!(settings.max_tabs, 12);
        assert_eq!(settings.mode, SuspendMode::Manual);

        assert!(set(&store, SetArgs::default()).is_err());
    }

    #[test]
    fn test_render_lists_whitelist() {
        let settings = Settings {
            whitelist: "a.com\n\nb.org".to_string(),
            ..Settings::default()
        };
        let text = render(&settings);
        assert!(text.contains("a.com, b.org"));
        assert!(text.contains("mode:                 manual"));
        assert!(render(&Settings::default()).contains("(empty)"));
    }
}
