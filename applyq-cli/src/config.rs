use applyq_core::applyc::settings::ApplySettings;
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "applyq.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyqConfig {
    pub project: ProjectConfig,
    #[serde(default)]
    pub settings: ApplySettings,
    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    /// Entity type of the rows the pipeline starts from
    pub root_type: String,
    #[serde(
        default = "default_schema_path",
        serialize_with = "serialize_path",
        deserialize_with = "deserialize_path"
    )]
    pub schema: PathBuf,
    #[serde(
        default = "default_pipeline_path",
        serialize_with = "serialize_path",
        deserialize_with = "deserialize_path"
    )]
    pub pipeline: PathBuf,
    #[serde(
        default = "default_rows_path",
        serialize_with = "serialize_path",
        deserialize_with = "deserialize_path"
    )]
    pub rows: PathBuf,
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("schema.json")
}

fn default_pipeline_path() -> PathBuf {
    PathBuf::from("pipeline.json")
}

fn default_rows_path() -> PathBuf {
    PathBuf::from("rows.json")
}

fn serialize_path<S>(path: &Path, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&path.to_string_lossy())
}

fn deserialize_path<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(PathBuf::from(s.replace('\\', "/")))
}

/// Store the pipeline is bound against.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Rows are read from the project and evaluated in process
    #[default]
    InMemory,
    /// The bound plan is rendered for a provider instead of executed
    Translated {
        provider: String,
        #[serde(default = "default_true")]
        supports_apply: bool,
    },
}

fn default_true() -> bool {
    true
}

impl BackendConfig {
    pub fn label(&self) -> &str {
        match self {
            BackendConfig::InMemory => "in-memory",
            BackendConfig::Translated { provider, .. } => provider,
        }
    }
}

impl ApplyqConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|e| eyre!("Failed to read {CONFIG_FILE}: {}", e))?;

        let config: ApplyqConfig =
            toml::from_str(&content).map_err(|e| eyre!("Failed to parse {CONFIG_FILE}: {}", e))?;

        config.validate(path)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize {CONFIG_FILE}: {}", e))?;

        fs::write(path, content).map_err(|e| eyre!("Failed to write {CONFIG_FILE}: {}", e))?;

        Ok(())
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let relative_path = std::env::current_dir()
            .ok()
            .and_then(|cwd| path.strip_prefix(&cwd).ok())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| path.to_path_buf());

        if self.project.name.is_empty() {
            return Err(eyre!(
                "Project name cannot be empty in {}",
                relative_path.display()
            ));
        }

        if self.project.root_type.is_empty() {
            return Err(eyre!(
                "`root_type` cannot be empty in {}",
                relative_path.display()
            ));
        }

        if let BackendConfig::Translated { provider, .. } = &self.backend
            && provider.is_empty()
        {
            return Err(eyre!(
                "A translated backend must name its provider in {}",
                relative_path.display()
            ));
        }

        if self.settings.validation.max_node_count == 0 {
            return Err(eyre!(
                "`max_node_count` must be at least 1 in {}",
                relative_path.display()
            ));
        }

        Ok(())
    }

    pub fn default_config(project_name: &str, root_type: &str) -> Self {
        ApplyqConfig {
            project: ProjectConfig {
                name: project_name.to_string(),
                root_type: root_type.to_string(),
                schema: default_schema_path(),
                pipeline: default_pipeline_path(),
                rows: default_rows_path(),
            },
            settings: ApplySettings::default(),
            backend: BackendConfig::default(),
        }
    }
}
