//! # stickfix-store
//!
//! Storage and retrieval engine for Stickfix, a tag-indexed sticker
//! registry.
//!
//! Users link opaque sticker ids to free-text or emoji tags. Queries return
//! the stickers carrying *every* requested tag, looked up in the caller's
//! own collection and, unless the caller is in private mode, the shared
//! public collection.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  StickerStore (Arc<Mutex<..>>, one lock)     │
//! │    ├─ Scope       private / public routing   │
//! │    ├─ query       union per tag, intersect   │
//! │    └─ ResultCache per-caller memo            │
//! ├─────────────────────────────────────────────┤
//! │  Registry → UserRecord → TagIndex            │
//! ├─────────────────────────────────────────────┤
//! │  Persistence (JSON, 2 backup generations)    │
//! │  Maintenance (tokio intervals)               │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use stickfix_store::{StickerStore, StoreConfig, Window};
//!
//! let store = StickerStore::open(&StoreConfig::load("config/default.toml")?)?;
//! store.add_sticker("42", "CAADBAADTAAD", &["hello", "👋"])?;
//! let stickers = store.get_sticker_list("42", &["hello".into()], false, Window::all())?;
//! store.save()?;
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod maintenance;
pub mod persistence;
pub mod query;
pub mod scope;
pub mod tags;
pub mod user;

// ── re-exports ───────────────────────────────────────────────────────

pub use cache::{CacheStats, CachedList, ResultCache};
pub use config::{DEFAULT_CONFIG_PATH, StoreConfig};
pub use engine::{InlinePage, IntegrityStatus, StickerStore, StoreStats};
pub use error::{StoreError, StoreResult};
pub use maintenance::{MaintenanceHandle, MaintenanceJob, MaintenanceSchedule};
pub use persistence::{Generation, Persistence, SaveOutcome};
pub use query::Window;
pub use scope::Scope;
pub use tags::TagIndex;
pub use user::{PUBLIC_USER_ID, Registry, UserRecord};
