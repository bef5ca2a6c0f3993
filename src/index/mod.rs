//! Index Module
//!
//! In-memory hash index and its on-disk snapshots.
//!
//! ## Responsibilities
//! - Map each key fingerprint to the locator of its latest value
//! - Serialize the whole index into a snapshot on close/compaction
//! - Rebuild the index from the newest snapshot on startup
//! - Journal expiries of writes not yet covered by a snapshot
//!
//! ## Snapshot Layout
//! ```text
//! index/<unix timestamp>.idx
//! ┌──────────────┬──────────────┬─────┬──────────────────┐
//! │ Entry (36)   │ Entry (36)   │ ... │ Checkpoint (36)  │
//! └──────────────┴──────────────┴─────┴──────────────────┘
//! ```
//! The checkpoint is an ordinary entry that is always expired: loaders drop
//! it from the map but still use its position as the replay start.
//!
//! Expiries of writes made after the checkpoint are kept in
//! `index/expiry.journal` until the next snapshot.

mod expiry;
mod keydir;
mod snapshot;

pub use expiry::{
    expiry_journal_path, read_expiry_journal, ExpiryJournal, ExpiryMap, EXPIRY_ENTRY_SIZE,
    EXPIRY_JOURNAL_FILE,
};
pub use keydir::{Index, SnapshotLoad};
pub use snapshot::{
    latest_snapshot_id, read_latest_snapshot, snapshot_path, write_snapshot, SNAPSHOT_EXTENSION,
};
