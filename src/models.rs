//! Device model presets.
//!
//! A [`DeviceModel`] is a reusable named preset mapping a commercial mount
//! to one of the embedded serial protocol drivers and a default poll delay.
//! The catalog is loaded from `device_models.json` in the data directory;
//! when that file is missing, unreadable, or carries an older format
//! version, it is restored from (or replaced at runtime by) the embedded
//! default catalog; an obsolete user file is backed up, never deleted.
//!
//! The catalog is read-only at runtime.

use anyhow::{Context, Result};
use log::{debug, warn};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::persistence::{backup_file_name, FORMAT_VERSION};

/// Embedded serial protocol drivers shipped with the crate.
pub const EMBEDDED_SERVERS: [&str; 2] = ["Lx200", "NexStar"];

/// Whether `server` names one of the embedded serial protocol drivers.
pub fn is_embedded_server(server: &str) -> bool {
    EMBEDDED_SERVERS.contains(&server)
}

const DEFAULT_CATALOG_JSON: &str = include_str!("../resources/default_device_models.json");

static DEFAULT_CATALOG: Lazy<Vec<DeviceModel>> =
    Lazy::new(|| parse_catalog_document(DEFAULT_CATALOG_JSON).unwrap_or_default());

/// A reusable named device preset.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct DeviceModel {
    /// Unique preset name (catalog key).
    pub name: String,
    /// Human-readable description.
    #[serde(default = "default_description")]
    pub description: String,
    /// Embedded protocol driver this model uses.
    pub server: String,
    /// Default poll delay in microseconds.
    #[serde(default = "default_delay", rename = "default_delay")]
    pub default_delay_us: u32,
}

fn default_description() -> String {
    "No description is available.".to_string()
}

fn default_delay() -> u32 {
    crate::core::DEFAULT_DELAY_US
}

#[derive(Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    version: String,
    #[serde(default)]
    list: Vec<serde_json::Value>,
}

/// The loaded set of device model presets, keyed by name.
#[derive(Debug, Default)]
pub struct DeviceModelCatalog {
    models: HashMap<String, DeviceModel>,
}

impl DeviceModelCatalog {
    /// The catalog compiled into the crate.
    pub fn embedded_default() -> Self {
        Self::from_models(DEFAULT_CATALOG.clone())
    }

    fn from_models(list: Vec<DeviceModel>) -> Self {
        let mut models = HashMap::new();
        for model in list {
            if models.contains_key(&model.name) {
                warn!("Skipping device model: duplicate name: {}", model.name);
                continue;
            }
            models.insert(model.name.clone(), model);
        }
        Self { models }
    }

    /// Loads the catalog from `device_models.json` inside `directory`,
    /// applying the backup-and-restore policy. Never fails: the embedded
    /// default is the last resort.
    pub fn load(directory: &Path) -> Self {
        let path = directory.join("device_models.json");

        if !path.exists() {
            if let Err(e) = restore_default_catalog(&path) {
                warn!("Unable to write the default device model list: {:#}", e);
                return Self::embedded_default();
            }
            debug!("Default device model list copied to {}", path.display());
        } else {
            match read_catalog_version(&path) {
                Ok(version) if version.as_str() < FORMAT_VERSION => {
                    // Obsolete catalog: back it up and restore the default.
                    let backup = backup_file_name(&path);
                    match std::fs::rename(&path, &backup) {
                        Ok(()) => {
                            warn!(
                                "The existing device_models.json is obsolete; backed up as {}",
                                backup.display()
                            );
                            if let Err(e) = restore_default_catalog(&path) {
                                warn!("Unable to restore the default list: {:#}", e);
                                return Self::embedded_default();
                            }
                        }
                        Err(e) => {
                            warn!(
                                "The existing device_models.json is obsolete and cannot be renamed: {}",
                                e
                            );
                            return Self::embedded_default();
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Unable to read {}: {:#}", path.display(), e);
                    return Self::embedded_default();
                }
            }
        }

        match std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|text| parse_catalog_document(&text))
        {
            Ok(list) => Self::from_models(list),
            Err(e) => {
                warn!("Unable to parse {}: {:#}", path.display(), e);
                Self::embedded_default()
            }
        }
    }

    /// Looks up a preset by name.
    pub fn get(&self, name: &str) -> Option<&DeviceModel> {
        self.models.get(name)
    }

    /// All presets, in unspecified order.
    pub fn models(&self) -> impl Iterator<Item = &DeviceModel> {
        self.models.values()
    }

    /// Number of presets.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

fn read_catalog_version(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let doc: CatalogDocument = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(doc.version)
}

/// Writes the embedded default catalog to the user path.
fn restore_default_catalog(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, DEFAULT_CATALOG_JSON)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Parses a catalog document, skipping invalid records with warnings.
fn parse_catalog_document(text: &str) -> Result<Vec<DeviceModel>> {
    let doc: CatalogDocument = serde_json::from_str(text).context("Malformed catalog document")?;
    let mut models = Vec::new();
    for value in doc.list {
        let model: DeviceModel = match serde_json::from_value(value) {
            Ok(m) => m,
            Err(e) => {
                warn!("Skipping device model: {}", e);
                continue;
            }
        };
        if model.name.is_empty() {
            warn!("Skipping device model: no name");
            continue;
        }
        if !is_embedded_server(&model.server) {
            warn!(
                "Skipping device model '{}': no embedded driver named '{}'",
                model.name, model.server
            );
            continue;
        }
        models.push(model);
    }
    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_default_is_usable() {
        let catalog = DeviceModelCatalog::embedded_default();
        assert!(!catalog.is_empty());
        for model in catalog.models() {
            assert!(is_embedded_server(&model.server));
            assert!(model.default_delay_us > 0);
        }
    }

    #[test]
    fn test_missing_file_restores_default() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = DeviceModelCatalog::load(dir.path());
        assert!(!catalog.is_empty());
        assert!(dir.path().join("device_models.json").exists());
    }

    #[test]
    fn test_obsolete_catalog_backed_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_models.json");
        std::fs::write(&path, r#"{"version":"0.0.0","list":[]}"#).unwrap();

        let catalog = DeviceModelCatalog::load(dir.path());
        assert!(!catalog.is_empty());
        // The obsolete file survives under a backup name.
        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".backup."))
            .collect();
        assert_eq!(backups.len(), 1);
    }

    #[test]
    fn test_bad_records_skipped() {
        let text = r#"{
            "version": "1.4",
            "list": [
                {"name": "Good", "server": "Lx200"},
                {"name": "", "server": "Lx200"},
                {"name": "Bad server", "server": "Paradox"},
                {"name": "Good", "server": "NexStar"}
            ]
        }"#;
        let models = parse_catalog_document(text).unwrap();
        // The duplicate survives parsing and is dropped by the catalog.
        let catalog = DeviceModelCatalog::from_models(models);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("Good").unwrap().server, "Lx200");
    }
}
