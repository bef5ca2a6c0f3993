//! Configuration for logcask
//!
//! Centralized configuration with sensible defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::crypto::{Aes256GcmCipher, Cipher, Secret, ValueCipher};
use crate::error::{CaskError, Result};
use crate::hash::{KeyHasher, Xxh3Hasher};

/// Subdirectory of the root holding segment files
pub const DATA_DIR: &str = "data";

/// Subdirectory of the root holding index snapshots
pub const INDEX_DIR: &str = "index";

/// Default segment rotation threshold (512 MiB)
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 512 * 1024 * 1024;

/// Default ceiling on total segment bytes accepted at startup (1 GiB)
pub const DEFAULT_MAX_TOTAL_SIZE: u64 = 1024 * 1024 * 1024;

/// Main configuration for a logcask instance
#[derive(Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all files
    /// Internal structure:
    ///   {root_dir}/
    ///     ├── data/     (<segment id>.data)
    ///     └── index/    (<unix timestamp>.idx)
    pub root_dir: PathBuf,

    /// Rotate the active segment once it reaches this many bytes
    /// (0 = use the default)
    pub max_segment_size: u64,

    /// Refuse to open when the segments on disk add up to this many bytes
    /// (0 = use the default)
    pub max_total_size: u64,

    /// How often to fsync the active segment
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Encryption Configuration
    // -------------------------------------------------------------------------
    /// Encrypt values at rest
    pub encryption: bool,

    /// Shared secret, required when encryption is enabled
    pub secret: Option<Secret>,

    /// Cipher used when encryption is enabled
    pub cipher: Arc<dyn Cipher>,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Key fingerprint function (must not change for an existing root)
    pub hasher: Arc<dyn KeyHasher>,
}

/// Segment sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced writes (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./logcask_data"),
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            max_total_size: DEFAULT_MAX_TOTAL_SIZE,
            sync_strategy: SyncStrategy::EveryNEntries { count: 100 },
            encryption: false,
            secret: None,
            cipher: Arc::new(Aes256GcmCipher),
            hasher: Arc::new(Xxh3Hasher),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("root_dir", &self.root_dir)
            .field("max_segment_size", &self.max_segment_size)
            .field("max_total_size", &self.max_total_size)
            .field("sync_strategy", &self.sync_strategy)
            .field("encryption", &self.encryption)
            .field("secret", &self.secret)
            .field("cipher", &self.cipher)
            .field("hasher", &self.hasher)
            .finish()
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the configuration before anything touches the filesystem
    pub fn validate(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(CaskError::Config(
                "root directory cannot be empty".to_string(),
            ));
        }

        if self.segment_size_limit() > u32::MAX as u64 {
            return Err(CaskError::Config(format!(
                "max segment size {} exceeds the addressable {} bytes",
                self.segment_size_limit(),
                u32::MAX
            )));
        }

        if let SyncStrategy::EveryNEntries { count: 0 } = self.sync_strategy {
            return Err(CaskError::Config(
                "sync strategy entry count must be at least 1".to_string(),
            ));
        }

        self.value_cipher().map(|_| ())
    }

    /// Effective rotation threshold
    pub fn segment_size_limit(&self) -> u64 {
        match self.max_segment_size {
            0 => DEFAULT_MAX_SEGMENT_SIZE,
            size => size,
        }
    }

    /// Effective startup ceiling on total segment bytes
    pub fn total_size_limit(&self) -> u64 {
        match self.max_total_size {
            0 => DEFAULT_MAX_TOTAL_SIZE,
            size => size,
        }
    }

    /// Directory holding segment files
    pub fn data_path(&self) -> PathBuf {
        self.root_dir.join(DATA_DIR)
    }

    /// Directory holding index snapshots
    pub fn index_path(&self) -> PathBuf {
        self.root_dir.join(INDEX_DIR)
    }

    /// The value cipher, if encryption is enabled
    pub(crate) fn value_cipher(&self) -> Result<Option<ValueCipher>> {
        if !self.encryption {
            return Ok(None);
        }

        let secret = self.secret.clone().ok_or_else(|| {
            CaskError::Config("encryption is enabled but no secret was provided".to_string())
        })?;

        ValueCipher::new(Arc::clone(&self.cipher), secret).map(Some)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the root directory
    pub fn root_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.config.root_dir = path.as_ref().to_path_buf();
        self
    }

    /// Set the segment rotation threshold (in bytes, 0 keeps the default)
    pub fn max_segment_size(mut self, size: u64) -> Self {
        self.config.max_segment_size = size;
        self
    }

    /// Set the startup ceiling on total segment bytes (0 keeps the default)
    pub fn max_total_size(mut self, size: u64) -> Self {
        self.config.max_total_size = size;
        self
    }

    /// Set the segment sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Enable value encryption with the given secret
    pub fn encryption(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.config.encryption = true;
        self.config.secret = Some(Secret::new(secret));
        self
    }

    /// Set the cipher used for value encryption
    pub fn cipher(mut self, cipher: Arc<dyn Cipher>) -> Self {
        self.config.cipher = cipher;
        self
    }

    /// Set the key fingerprint function
    pub fn hasher(mut self, hasher: Arc<dyn KeyHasher>) -> Self {
        self.config.hasher = hasher;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
