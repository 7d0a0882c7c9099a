use std::{
    collections::HashSet,
    fs,
    path::Path,
};

use anyhow::{Context, Result};
use rowview_core::DuplicatePolicy;
use serde::Deserialize;

use crate::error::ConfigError;

const CONFIG_DIR: &str = ".rowview";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_TABLE: &str = "M_HU";

/// Top-level project configuration loaded from `.rowview/config.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProjectConfig {
    /// Settings of the view.
    #[serde(default)]
    pub view: ViewConfig,
}

impl ProjectConfig {
    /// Load configuration from `<dir>/.rowview/config.toml`; a missing file yields defaults.
    ///
    /// # Errors
    /// Fails when the file exists but cannot be read, parsed or validated.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let config_path = dir.as_ref().join(CONFIG_DIR).join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        Self::from_path(config_path)
    }

    /// Load configuration from an explicit file.
    ///
    /// # Errors
    /// Fails when the file cannot be read, parsed or validated.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self =
            toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))?;
        config
            .view
            .validate()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        Ok(config)
    }
}

/// The `[view]` block.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Table whose change notifications concern this view.
    pub table_name: String,
    /// What to do when one identity appears twice in the tree.
    pub duplicate_ids: DuplicatePolicy,
    /// Fields rows may be ordered by; empty allows any field.
    pub sortable_fields: Vec<String>,
    /// Fields scanned by barcode selection.
    pub barcode_fields: Vec<String>,
    /// Maximum number of rows to load; zero means unlimited.
    pub query_limit: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE.to_owned(),
            duplicate_ids: DuplicatePolicy::default(),
            sortable_fields: Vec::new(),
            barcode_fields: vec!["barcode".to_owned()],
            query_limit: 0,
        }
    }
}

impl ViewConfig {
    /// Load the `[view]` block of an explicit configuration file.
    ///
    /// # Errors
    /// Fails when the file cannot be read, parsed or validated.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        ProjectConfig::from_path(path).map(|config| config.view)
    }

    /// Configured row limit, `None` when unlimited.
    pub const fn query_limit(&self) -> Option<usize> {
        match self.query_limit {
            0 => None,
            limit => Some(limit),
        }
    }

    /// Check invariants that `serde` cannot express.
    ///
    /// # Errors
    /// Returns the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_name.trim().is_empty() {
            return Err(ConfigError::BlankTableName);
        }
        ensure_unique(&self.sortable_fields, "sortable_fields")?;
        ensure_unique(&self.barcode_fields, "barcode_fields")
    }
}

fn ensure_unique(fields: &[String], list: &'static str) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.as_str()) {
            return Err(ConfigError::DuplicateField(field.clone(), list));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use tempfile::tempdir;

    fn write_config(dir: &Path, body: &str) {
        let config_dir = dir.join(CONFIG_DIR);
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join(CONFIG_FILE), body).unwrap();
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = ProjectConfig::from_dir(dir.path()).unwrap();
        assert_eq!(config.view.table_name, "M_HU");
        assert_eq!(config.view.duplicate_ids, DuplicatePolicy::LastWins);
        assert_eq!(config.view.barcode_fields, ["barcode"]);
        assert!(config.view.sortable_fields.is_empty());
        assert_eq!(config.view.query_limit(), None);
    }

    #[test]
    fn parses_view_block() {
        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
[view]
table_name = "M_Package"
duplicate_ids = "reject"
sortable_fields = ["name", "qty"]
barcode_fields = ["barcode", "name"]
query_limit = 500
"#,
        );

        let view = ProjectConfig::from_dir(dir.path()).unwrap().view;
        assert_eq!(view.table_name, "M_Package");
        assert_eq!(view.duplicate_ids, DuplicatePolicy::Reject);
        assert_eq!(view.sortable_fields, ["name", "qty"]);
        assert_eq!(view.barcode_fields, ["barcode", "name"]);
        assert_eq!(view.query_limit(), Some(500));
    }

    #[test]
    fn partial_block_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        write_config(dir.path(), "[view]\nsortable_fields = [\"name\"]\n");

        let view = ProjectConfig::from_dir(dir.path()).unwrap().view;
        assert_eq!(view.table_name, "M_HU");
        assert_eq!(view.barcode_fields, ["barcode"]);
    }

    #[test]
    fn rejects_duplicate_fields() {
        let dir = tempdir().unwrap();
        write_config(dir.path(), "[view]\nsortable_fields = [\"name\", \"name\"]\n");

        let err = ProjectConfig::from_dir(dir.path()).unwrap_err();
        let config_err = err.downcast_ref::<ConfigError>().expect("typed error");
        assert_eq!(
            *config_err,
            ConfigError::DuplicateField("name".into(), "sortable_fields")
        );
    }

    #[test]
    fn rejects_blank_table_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("view.toml");
        fs::write(&path, "[view]\ntable_name = \"  \"\n").unwrap();

        let err = ViewConfig::from_path(&path).unwrap_err();
        assert!(format!("{err:#}").contains("table_name must not be blank"));
    }

    #[test]
    fn unknown_policy_fails_to_parse() {
        let dir = tempdir().unwrap();
        write_config(dir.path(), "[view]\nduplicate_ids = \"first-wins\"\n");

        let err = ProjectConfig::from_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}
