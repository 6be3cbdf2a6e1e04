// Configuration file management for the qroute CLI
//
// The router config is stored as JSON in:
// - macOS: ~/Library/Application Support/qroute/config.json
// - Linux: ~/.config/qroute/config.json
// - Windows: %APPDATA%\qroute\config.json
// or at any path given with --config.

use anyhow::{Context, Result};
use qroute_core::{ProbeReplyMode, RouterConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// A router config bound to the file it was loaded from
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub path: PathBuf,
    pub router: RouterConfig,
}

impl ConfigFile {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("qroute");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Explicit path, or the default file in the config directory
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit {
            Some(path) => Ok(path.to_path_buf()),
            None => Ok(Self::config_dir()?.join("config.json")),
        }
    }

    /// Load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let router: RouterConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            router,
        })
    }

    /// Write a default config unless one already exists
    pub fn init(path: &Path) -> Result<(Self, bool)> {
        if path.exists() {
            return Ok((Self::load(path)?, false));
        }
        let file = Self {
            path: path.to_path_buf(),
            router: RouterConfig::default(),
        };
        file.save()?;
        Ok((file, true))
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
        }
        let contents =
            serde_json::to_string_pretty(&self.router).context("Failed to serialize config")?;
        std::fs::write(&self.path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Set a config value
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut candidate = self.router.clone();
        let router = &mut candidate;
        match key {
            "node_id" => router.node_id = value.to_string(),
            "listen_addr" => {
                router.listen_addr = value.parse().context("Invalid socket address")?;
            }
            "alpha" => router.learning.alpha = value.parse().context("Invalid number")?,
            "gamma" => router.learning.gamma = value.parse().context("Invalid number")?,
            "epsilon" => router.learning.epsilon = value.parse().context("Invalid number")?,
            "probe_samples" => router.probe.samples = value.parse().context("Invalid number")?,
            "probe_timeout_ms" => router.probe.timeout_ms = value.parse().context("Invalid number")?,
            "penalty_ms" => router.probe.penalty_ms = value.parse().context("Invalid number")?,
            "noise_ms" => router.probe.noise_ms = value.parse().context("Invalid number")?,
            "forward_timeout_ms" => {
                router.forward_timeout_ms = value.parse().context("Invalid number")?;
            }
            "read_timeout_ms" => router.read_timeout_ms = value.parse().context("Invalid number")?,
            "read_buffer_size" => router.read_buffer_size = value.parse().context("Invalid number")?,
            "max_connections" => router.max_connections = value.parse().context("Invalid number")?,
            "probe_reply" => {
                router.probe_reply = match value {
                    "same_connection" => ProbeReplyMode::SameConnection,
                    "back_connection" => ProbeReplyMode::BackConnection,
                    _ => anyhow::bail!("probe_reply must be same_connection or back_connection"),
                };
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        candidate
            .validate()
            .with_context(|| format!("Rejected value for {}", key))?;
        self.router = candidate;
        self.save()
    }

    /// Add or replace a neighbor
    pub fn add_neighbor(&mut self, id: &str, addr: SocketAddr) -> Result<()> {
        let mut candidate = self.router.clone();
        candidate.neighbors.insert(id.to_string(), addr);
        candidate.validate().context("Rejected neighbor")?;
        self.router = candidate;
        self.save()
    }

    /// Remove a neighbor; returns whether it existed
    pub fn remove_neighbor(&mut self, id: &str) -> Result<bool> {
        let existed = self.router.neighbors.remove(id).is_some();
        if existed {
            self.save()?;
        }
        Ok(existed)
    }

    /// List all scalar config values
    pub fn list(&self) -> Vec<(String, String)> {
        let r = &self.router;
        vec![
            ("node_id".to_string(), r.node_id.clone()),
            ("listen_addr".to_string(), r.listen_addr.to_string()),
            ("alpha".to_string(), r.learning.alpha.to_string()),
            ("gamma".to_string(), r.learning.gamma.to_string()),
            ("epsilon".to_string(), r.learning.epsilon.to_string()),
            ("probe_samples".to_string(), r.probe.samples.to_string()),
            ("probe_timeout_ms".to_string(), r.probe.timeout_ms.to_string()),
            ("penalty_ms".to_string(), r.probe.penalty_ms.to_string()),
            ("noise_ms".to_string(), r.probe.noise_ms.to_string()),
            ("forward_timeout_ms".to_string(), r.forward_timeout_ms.to_string()),
            ("read_timeout_ms".to_string(), r.read_timeout_ms.to_string()),
            ("read_buffer_size".to_string(), r.read_buffer_size.to_string()),
            ("max_connections".to_string(), r.max_connections.to_string()),
            ("probe_reply".to_string(), format!("{:?}", r.probe_reply)),
            ("neighbors".to_string(), r.neighbors.len().to_string()),
            ("known_states".to_string(), r.known_states.len().to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_writes_default_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let (file, created) = ConfigFile::init(&path).unwrap();
        assert!(created);
        assert_eq!(file.router, RouterConfig::default());

        let (_, created) = ConfigFile::init(&path).unwrap();
        assert!(!created);
    }

    #[test]
    fn test_set_persists_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let (mut file, _) = ConfigFile::init(&path).unwrap();

        file.set("epsilon", "0.25").unwrap();
        file.set("probe_reply", "back_connection").unwrap();
        assert!(file.set("alpha", "3.0").is_err());
        assert!(file.set("no_such_key", "1").is_err());

        let reloaded = ConfigFile::load(&path).unwrap();
        assert_eq!(reloaded.router.learning.epsilon, 0.25);
        assert_eq!(reloaded.router.probe_reply, ProbeReplyMode::BackConnection);
        assert_eq!(reloaded.router.learning.alpha, 0.1);
    }

    #[test]
    fn test_neighbor_add_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let (mut file, _) = ConfigFile::init(&path).unwrap();

        file.add_neighbor("B", "127.0.0.1:12346".parse().unwrap()).unwrap();
        assert!(file.add_neighbor("A", "127.0.0.1:12347".parse().unwrap()).is_err());

        let mut reloaded = ConfigFile::load(&path).unwrap();
        assert_eq!(reloaded.router.neighbors.len(), 1);
        assert!(reloaded.remove_neighbor("B").unwrap());
        assert!(!reloaded.remove_neighbor("B").unwrap());
    }
}
