//! Tableau stage runtime
//!
//! Drives the seating allocator from a chat host: polls membership and chat
//! history, turns changes into placement effects, resolves portraits, and
//! hands everything to a renderer.
//!
//! ## Architecture
//!
//! ```text
//! Host (history, group members)
//!   └── Stage ── poll loop / host signals
//!         ├── tableau-seating   (pure allocation)
//!         ├── AssetResolver     (portrait probing)
//!         ├── SettingsStore     (persisted settings)
//!         └── Renderer          (effect sink)
//! ```
//!
//! ## Modules
//!
//! - `stage`: lifecycle, passes, effect application
//! - `debounce`: restart coalescing
//! - `settings`: global and per-chat settings, persistence
//! - `assets`: portrait lookup over HTTP
//! - `renderer`: renderer trait and in-process renderers
//! - `host`: host traits and an in-memory host
//! - `script`: scripted session replay

pub mod assets;
pub mod config;
pub mod debounce;
pub mod error;
pub mod host;
pub mod renderer;
pub mod script;
pub mod settings;
pub mod stage;

pub use error::{AssetError, HostError, SettingsError, StageError};
pub use stage::{Stage, StageBuilder};
