use crate::parse::LoadOptions;
use crate::schema::SchemaRegistry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StepstoreConfig {
    /// Schema description files registered next to the bundled schemas
    pub schemas: Vec<PathBuf>,
    pub database: Option<String>,
    pub loader: LoadOptions,
}

impl StepstoreConfig {
    /// Bundled schemas plus every configured description file.
    pub fn registry(&self) -> anyhow::Result<SchemaRegistry> {
        let mut registry = SchemaRegistry::with_demo()?;
        for path in &self.schemas {
            let schema = registry.register_file(path)?;
            tracing::debug!("Registered schema {} from {}", schema.name(), path.display());
        }
        Ok(registry)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("stepstore.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<StepstoreConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: StepstoreConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &StepstoreConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::UnresolvedReferencePolicy;

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("stepstore.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_loader_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stepstore.toml");
        std::fs::write(
            &path,
            "database = \"model.db\"\n\n[loader]\nunresolved_references = \"error\"\ncalculate_unit_factors = false\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(config.database.as_deref(), Some("model.db"));
        assert!(config.schemas.is_empty());
        assert_eq!(config.loader.unresolved_references, UnresolvedReferencePolicy::Error);
        assert!(!config.loader.calculate_unit_factors);
        assert!(config.loader.coerce_attribute_count);
        assert_eq!(config.loader.progress_interval, 1000);
    }

    #[test]
    fn test_write_config_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stepstore.toml");
        let config = StepstoreConfig { database: Some("a.db".into()), ..Default::default() };
        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap().unwrap().database.as_deref(), Some("a.db"));
    }

    #[test]
    fn test_registry_includes_demo() {
        let registry = StepstoreConfig::default().registry().unwrap();
        assert!(registry.get("IFC_DEMO").is_ok());
    }
}
