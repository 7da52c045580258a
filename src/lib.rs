//! Situational map for the emergency response operations console.
//!
//! Plots incidents and medical assets from a JSON snapshot onto an external
//! mapping engine and keeps the dispatch-queue list in sync with it: picking
//! a queue row moves the camera to that incident and opens its popup.

pub mod types;
pub mod error;
pub mod config;
pub mod loader;
pub mod data;
pub mod styler;
pub mod engine;
pub mod map;
pub mod queue;
pub mod dashboard;
pub mod headless;
pub mod server;

pub use config::AppConfig;
pub use dashboard::{Dashboard, DashboardController, FocusLoop, Page};
pub use error::BootstrapError;
pub use map::{FitOutcome, FocusOutcome, MapController, MapState};
pub use types::Snapshot;
