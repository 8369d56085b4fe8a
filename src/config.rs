//! TOML configuration: the two backend specs plus sync settings.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::fs::{LocalBackend, MemoryBackend, ObjectBackend, StorageBackend};
use crate::sync::{
    ComparePolicy, Pacing, RateLimit, SyncOptions, WorkingScope, DEFAULT_OPS_PER_SECOND,
};

/// Where one storage tree lives.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendSpec {
    Local {
        root: PathBuf,
    },
    S3 {
        bucket: String,
        region: String,
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        access_key: Option<String>,
        #[serde(default)]
        secret_key: Option<String>,
    },
    Gcs {
        bucket: String,
    },
    Memory {
        #[serde(default = "default_memory_label")]
        label: String,
    },
}

fn default_memory_label() -> String {
    "memory".to_string()
}

impl BackendSpec {
    pub fn build(&self) -> Result<Arc<dyn StorageBackend>> {
        match self {
            BackendSpec::Local { root } => Ok(Arc::new(LocalBackend::new(root.clone()))),
            BackendSpec::S3 {
                bucket,
                region,
                endpoint,
                access_key,
                secret_key,
            } => Ok(Arc::new(ObjectBackend::s3(
                bucket,
                region,
                endpoint.as_deref(),
                access_key.as_deref(),
                secret_key.as_deref(),
            )?)),
            BackendSpec::Gcs { bucket } => Ok(Arc::new(ObjectBackend::gcs(bucket)?)),
            BackendSpec::Memory { label } => Ok(Arc::new(MemoryBackend::new(label.clone()))),
        }
    }
}

/// Settings for the reconciliation run itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Working subtree, default the whole tree.
    pub folder: String,
    /// Exclusion prefixes consulted at diff time.
    pub excludes: Vec<String>,
    /// Operations-per-second ceiling, 0 for unlimited.
    pub ops_per_second: u32,
    pub pacing: Pacing,
    pub compare: ComparePolicy,
    pub verify: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            folder: "/".to_string(),
            excludes: Vec::new(),
            ops_per_second: DEFAULT_OPS_PER_SECOND,
            pacing: Pacing::default(),
            compare: ComparePolicy::default(),
            verify: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub master: BackendSpec,
    pub slave: BackendSpec,
    #[serde(default)]
    pub sync: SyncSettings,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Default location under the user config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("treesync").join("config.toml"))
    }

    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = Self::default_path()
                    .context("No config directory available on this platform")?;
                Self::load(&path)
            }
        }
    }

    /// Engine options derived from the sync settings.
    pub fn sync_options(&self) -> Result<SyncOptions> {
        let scope =
            WorkingScope::new(&self.sync.folder).with_excludes(&self.sync.excludes)?;

        Ok(SyncOptions {
            scope,
            policy: self.sync.compare,
            rate: RateLimit::new(self.sync.ops_per_second),
            pacing: self.sync.pacing,
            verify: self.sync.verify,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let text = r#"
[master]
kind = "local"
root = "/srv/data"

[slave]
kind = "s3"
bucket = "backups"
region = "eu-central-1"
endpoint = "https://minio.internal:9000"
access_key = "ak"
secret_key = "sk"

[sync]
folder = "/photos"
excludes = ["/photos/cache"]
ops_per_second = 50
pacing = "smooth"
compare = "checksum"
verify = true
"#;
        let config: Config = toml::from_str(text).unwrap();

        assert!(matches!(config.master, BackendSpec::Local { .. }));
        assert!(matches!(config.slave, BackendSpec::S3 { .. }));
        assert_eq!(config.sync.folder, "/photos");
        assert_eq!(config.sync.ops_per_second, 50);
        assert_eq!(config.sync.pacing, Pacing::Smooth);
        assert_eq!(config.sync.compare, ComparePolicy::Checksum);
        assert!(config.sync.verify);

        let options = config.sync_options().unwrap();
        assert_eq!(options.scope.root(), "/photos");
        assert!(options.scope.is_excluded("/photos/cache/a.jpg"));
    }

    #[test]
    fn test_sync_settings_default() {
        let text = r#"
[master]
kind = "memory"

[slave]
kind = "memory"
label = "slave"
"#;
        let config: Config = toml::from_str(text).unwrap();

        assert_eq!(config.sync.folder, "/");
        assert_eq!(config.sync.ops_per_second, DEFAULT_OPS_PER_SECOND);
        assert_eq!(config.sync.pacing, Pacing::Window);
        assert!(!config.sync.verify);
    }
}
