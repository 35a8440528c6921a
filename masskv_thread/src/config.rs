use std::fs;
use std::path::Path;

use serde::Deserialize;

/// Allocator configuration for a [`ThreadInfo`](crate::ThreadInfo).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// Upper bound on live `Value` bytes; `None` means unlimited.
    pub alloc_limit: Option<usize>,
    /// Overwrite blocks with `0xA5` before an immediate free.
    pub poison_freed: bool,
}

impl ThreadConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ThreadConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Configuration with the given allocation limit.
    pub fn with_limit(limit: usize) -> Self {
        Self { alloc_limit: Some(limit), ..Self::default() }
    }
}
