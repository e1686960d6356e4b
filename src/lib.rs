//! tabnap - tab suspension policy engine and tab manager.
//!
//! tabnap lists open browser tabs, lets a user search, sort and select them,
//! and suspends (discards) tabs to free memory, either on demand or through
//! one of two automatic policies: a tab-count limit or an idle timer.
//!
//! # Architecture
//!
//! The library is organized into these main modules:
//!
//! - [`config`] - Suspend settings and their defaults
//! - [`store`] - Persisted settings record with change notification
//! - [`host`] - Tab inventory abstraction (`TabHost`) and a snapshot host
//! - [`core`] - Policy engine, scheduler and tab list model
//! - [`cli`] - Command-line frontend
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tabnap::{PolicyEngine, SettingsStore, SnapshotHost};
//!
//! let store = SettingsStore::open_default();
//! let host = Arc::new(SnapshotHost::open("tabs.json")?);
//! let engine = PolicyEngine::new(host, store.load());
//!
//! let report = engine.on_tick().await?;
//! println!("suspended {} tabs", report.suspended.len());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod host;
pub mod store;

mod error;

// Re-export commonly used types for convenience
pub use config::{Settings, SettingsPatch, SuspendMode};
pub use core::{PolicyEngine, Scheduler, SchedulerConfig, SuspendReport, TabList};
pub use error::{TabnapError, TabnapResult};
pub use host::{HostEvent, SnapshotHost, TabHost, TabId, TabSnapshot, WindowId};
pub use store::SettingsStore;
