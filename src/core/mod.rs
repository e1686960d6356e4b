//! Core engine module - host-agnostic business logic.
//!
//! This module contains everything that doesn't depend on a specific
//! browser or frontend:
//! - Auto-suspend policy (candidate selection, exclusion rules)
//! - Scheduler that serializes ticks, host events and settings changes
//! - Tab list model (search, sort, keyboard cursor, checkbox selection)

pub mod listing;
pub mod policy;
pub mod scheduler;

pub use listing::{SortOrder, TabList};
pub use policy::{is_excluded, plan_idle_timer, plan_max_tabs, PolicyEngine, SuspendReport};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerMessage};
