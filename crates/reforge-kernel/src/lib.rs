//! Core vocabulary for the Reforge extension reload engine.
//!
//! This crate defines the types shared between the engine and its hosts:
//! - Extension unit model and load-state machine
//! - The abstract host collaborator trait (`load`/`unload`/`is_loaded`)
//! - Reload configuration and strategy
//! - Reload event vocabulary
//! - Typed error taxonomy
//!
//! The engine itself lives in `reforge-engine`; this crate carries no reload
//! logic, only the contracts the engine operates over.

pub mod config;
pub mod error;
pub mod event;
pub mod host;
pub mod unit;

pub use config::{ReloadConfig, ReloadOptions, ReloadStrategy};
pub use error::{ReloadError, ReloadResult};
pub use event::ReloadEvent;
pub use host::{ExtensionHost, HostFailure, LoadOutcome};
pub use unit::{ExtensionUnit, LoadState};
