//! viewpulse - Client-side view engagement analytics core
//!
//! Viewpulse tracks which content view a user is on, how long they stay
//! engaged, how deep they scroll, and the view's content metadata, and
//! renders it all as an ordered key-value payload for a downstream collector.
//!
//! ## Modules
//!
//! - **Tracker**: per-view engagement accumulation (time, scroll depth,
//!   content metadata) and payload rendering
//! - **Dispatcher**: command routing, session lifecycle, and the persisted
//!   last-used-account cache

pub mod dispatcher;
pub mod error;
pub mod report;
pub mod store;
pub mod tracker;
pub mod view;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use dispatcher::{
    AccountConfig, Command, CommandOutcome, IgnoreReason, SessionState, ViewDispatcher,
};
pub use error::TrackerError;
pub use report::ReportPayload;
pub use store::{MemoryPreferenceStore, PreferenceStore};
pub use tracker::ViewEngagementTracker;
pub use view::{ViewContent, ViewDimension, ViewInfo};

/// Viewpulse version reported by the CLI and the C API
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for diagnostics output
pub const PRODUCER_NAME: &str = "viewpulse";
