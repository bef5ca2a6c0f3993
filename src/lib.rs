//! # logcask
//!
//! An embedded, log-structured key-value store with:
//! - Append-only segment files with CRC-checked records
//! - An in-memory hash index, snapshotted atomically on close
//! - Crash recovery that replays writes made after the last snapshot
//! - Per-key expiry and optional AES-256-GCM value encryption
//! - Single-writer/multi-reader concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │        put / get / delete / compact / sync / close           │
//! │            (Single Writer / Multi Reader RwLock)             │
//! └──────────┬──────────────────┬─────────────────┬─────────────┘
//!            │                  │                 │
//!            ▼                  ▼                 ▼
//!   ┌────────────────┐  ┌──────────────┐  ┌──────────────┐
//!   │     Index      │  │  Segments    │  │  Compactor   │
//!   │ fingerprint →  │  │ <id>.data    │  │ live records │
//!   │    Record      │  │ (append)     │  │ → new segs   │
//!   └───────┬────────┘  └──────┬───────┘  └──────────────┘
//!           │                  │
//!           ▼                  ▼
//!   ┌────────────────┐  ┌──────────────┐
//!   │   Snapshots    │  │    Codec     │
//!   │ index/<t>.idx  │  │ CRC + LE hdr │
//!   └────────────────┘  └──────────────┘
//! ```
//!
//! ## Keys and fingerprints
//!
//! The index is keyed by a 64-bit fingerprint of each key, not the key itself.
//! `get`, `contains` and `delete` read the stored record and compare keys, so
//! a colliding key is reported as `KeyMismatch` (or `false` from `contains`)
//! and never touches the other key's value. `Engine::len` counts index slots:
//! expired keys stay counted until compaction drops them.
//!
//! ## Example
//!
//! ```no_run
//! use logcask::{Config, Engine};
//!
//! let engine = Engine::open(Config::builder().root_dir("./db").build())?;
//! engine.put(b"name", b"logcask")?;
//! assert_eq!(engine.get(b"name")?, b"logcask");
//! engine.close()?;
//! # Ok::<(), logcask::CaskError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod types;

mod dir;
pub mod hash;
pub mod crypto;
pub mod codec;
pub mod segment;
pub mod index;
pub mod recovery;
pub mod compaction;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CaskError, Result};
pub use config::{Config, ConfigBuilder, SyncStrategy};
pub use engine::Engine;
pub use recovery::RecoveryResult;
pub use compaction::CompactionStats;
pub use hash::{Fnv1aHasher, KeyHasher, Xxh3Hasher};
pub use crypto::{Aes256GcmCipher, Cipher};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of logcask
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
