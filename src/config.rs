//! Run configuration for msa-search
//!
//! Values come from three layers: built-in defaults, an optional TOML file
//! and command line overrides. `use_env` and `use_templates` have no built-in
//! default and must be supplied by one of the other two layers.

use crate::error::{SearchError, SearchResult};
use crate::pipeline::params::PairingStrategy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub databases: DatabaseSettings,
    #[serde(default)]
    pub tool: ToolSettings,
}

/// Numeric knobs forwarded to the search engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchSettings {
    /// Sensitivity; when unset the server k-mer thresholds are used instead
    #[serde(default)]
    pub sensitivity: Option<f64>,
    #[serde(default = "default_filter")]
    pub filter: bool,
    #[serde(default = "default_expand_eval")]
    pub expand_eval: f64,
    #[serde(default = "default_align_eval")]
    pub align_eval: u32,
    #[serde(default = "default_diff")]
    pub diff: u32,
    #[serde(default = "default_qsc")]
    pub qsc: f64,
    #[serde(default = "default_max_accept")]
    pub max_accept: u32,
    #[serde(default)]
    pub pairing_strategy: PairingStrategy,
    #[serde(default = "default_db_load_mode")]
    pub db_load_mode: u8,
    #[serde(default = "default_threads")]
    pub threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseSettings {
    /// UniRef database name under the database root
    #[serde(default = "default_uniref_db")]
    pub uniref_db: String,
    /// Template database name (only read when `use_templates` is on)
    #[serde(default)]
    pub template_db: String,
    /// Environmental database name (only read when `use_env` is on)
    #[serde(default = "default_metagenomic_db")]
    pub metagenomic_db: String,
    #[serde(default)]
    pub use_env: Option<bool>,
    #[serde(default)]
    pub use_templates: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSettings {
    /// MMseqs2 binary, either a path or a name looked up on PATH
    #[serde(default = "default_mmseqs")]
    pub mmseqs: PathBuf,
    /// Keep the query database and retained alignments after the run
    #[serde(default)]
    pub keep_intermediates: bool,
}

// Default value functions
fn default_filter() -> bool { true }
fn default_expand_eval() -> f64 { f64::INFINITY }
fn default_align_eval() -> u32 { 10 }
fn default_diff() -> u32 { 3000 }
fn default_qsc() -> f64 { -20.0 }
fn default_max_accept() -> u32 { 1_000_000 }
fn default_db_load_mode() -> u8 { 0 }
fn default_threads() -> usize { 64 }
fn default_uniref_db() -> String { "uniref30_2302_db".to_string() }
fn default_metagenomic_db() -> String { "colabfold_envdb_202108_db".to_string() }
fn default_mmseqs() -> PathBuf { PathBuf::from("mmseqs") }

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            sensitivity: None,
            filter: default_filter(),
            expand_eval: default_expand_eval(),
            align_eval: default_align_eval(),
            diff: default_diff(),
            qsc: default_qsc(),
            max_accept: default_max_accept(),
            pairing_strategy: PairingStrategy::default(),
            db_load_mode: default_db_load_mode(),
            threads: default_threads(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            uniref_db: default_uniref_db(),
            template_db: String::new(),
            metagenomic_db: default_metagenomic_db(),
            use_env: None,
            use_templates: None,
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            mmseqs: default_mmseqs(),
            keep_intermediates: false,
        }
    }
}

/// Which optional database stages a run includes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageToggles {
    pub use_env: bool,
    pub use_templates: bool,
}

impl DatabaseSettings {
    /// Resolve the optional-stage toggles, failing if either was never supplied
    pub fn toggles(&self) -> SearchResult<StageToggles> {
        let use_env = self.use_env.ok_or_else(|| {
            SearchError::Configuration(
                "use_env is not set; pass --use-env or set databases.use_env".to_string(),
            )
        })?;
        let use_templates = self.use_templates.ok_or_else(|| {
            SearchError::Configuration(
                "use_templates is not set; pass --use-templates or set databases.use_templates"
                    .to_string(),
            )
        })?;

        if use_templates && self.template_db.is_empty() {
            return Err(SearchError::Configuration(
                "use_templates is on but no template database was given".to_string(),
            ));
        }

        Ok(StageToggles {
            use_env,
            use_templates,
        })
    }
}

pub fn default_config() -> Config {
    Config::default()
}

pub fn load_config<P: AsRef<Path>>(path: P) -> SearchResult<Config> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| SearchError::Configuration(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(path: P, config: &Config) -> SearchResult<()> {
    let contents = toml::to_string_pretty(config)
        .map_err(|e| SearchError::Configuration(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.search.sensitivity, None);
        assert!(config.search.filter);
        assert!(config.search.expand_eval.is_infinite());
        assert_eq!(config.search.align_eval, 10);
        assert_eq!(config.search.diff, 3000);
        assert_eq!(config.search.qsc, -20.0);
        assert_eq!(config.search.max_accept, 1_000_000);
        assert_eq!(config.search.pairing_strategy, PairingStrategy::Greedy);
        assert_eq!(config.search.db_load_mode, 0);
        assert_eq!(config.search.threads, 64);

        assert_eq!(config.databases.uniref_db, "uniref30_2302_db");
        assert_eq!(config.databases.template_db, "");
        assert_eq!(config.databases.metagenomic_db, "colabfold_envdb_202108_db");
        assert_eq!(config.databases.use_env, None);
        assert_eq!(config.databases.use_templates, None);

        assert_eq!(config.tool.mmseqs, PathBuf::from("mmseqs"));
        assert!(!config.tool.keep_intermediates);
    }

    #[test]
    fn test_toggles_required() {
        let config = default_config();
        let err = config.databases.toggles().unwrap_err();
        assert!(matches!(err, SearchError::Configuration(ref m) if m.contains("use_env")));

        let mut settings = DatabaseSettings::default();
        settings.use_env = Some(true);
        let err = settings.toggles().unwrap_err();
        assert!(matches!(err, SearchError::Configuration(ref m) if m.contains("use_templates")));

        settings.use_templates = Some(false);
        let toggles = settings.toggles().unwrap();
        assert!(toggles.use_env);
        assert!(!toggles.use_templates);
    }

    #[test]
    fn test_templates_need_a_database() {
        let settings = DatabaseSettings {
            use_env: Some(false),
            use_templates: Some(true),
            ..DatabaseSettings::default()
        };
        assert!(settings.toggles().is_err());
    }

    #[test]
    fn test_load_partial_config() {
        let toml_content = r#"
[search]
sensitivity = 7.5
filter = false
qsc = 0.5

[databases]
uniref_db = "uniref_small"
use_env = false
use_templates = false

[tool]
mmseqs = "/opt/mmseqs/bin/mmseqs"
"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(toml_content.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.search.sensitivity, Some(7.5));
        assert!(!config.search.filter);
        assert_eq!(config.search.qsc, 0.5);
        // Unset fields fall back to defaults
        assert_eq!(config.search.diff, 3000);
        assert!(config.search.expand_eval.is_infinite());
        assert_eq!(config.databases.uniref_db, "uniref_small");
        assert_eq!(config.databases.use_env, Some(false));
        assert_eq!(config.tool.mmseqs, PathBuf::from("/opt/mmseqs/bin/mmseqs"));
    }

    #[test]
    fn test_load_invalid_config() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[search\nfilter = ").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, SearchError::Configuration(ref m) if m.contains("Failed to parse")));
    }

    #[test]
    fn test_save_and_reload() {
        let mut config = Config::default();
        config.search.sensitivity = Some(8.0);
        config.search.pairing_strategy = PairingStrategy::Complete;
        config.databases.use_env = Some(true);
        config.databases.use_templates = Some(false);

        let file = NamedTempFile::new().unwrap();
        save_config(file.path(), &config).unwrap();
        let reloaded = load_config(file.path()).unwrap();
        assert_eq!(reloaded, config);
    }
}
