use crate::config::{ApplyqConfig, CONFIG_FILE};
use applyq_core::{
    applyc::{compiler::QueryOptions, schema::Model},
    protocol::row::Record,
};
use eyre::{Result, WrapErr, eyre};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub struct ProjectContext {
    /// The directory holding applyq.toml
    pub root: PathBuf,
    pub config: ApplyqConfig,
}

impl ProjectContext {
    /// Find and load the project context starting from the given directory
    pub fn find_and_load(start_dir: Option<&Path>) -> Result<Self> {
        let start = match start_dir {
            Some(dir) => dir.to_path_buf(),
            None => env::current_dir()?,
        };

        let root = find_project_root(&start)?;
        let config = ApplyqConfig::from_file(&root.join(CONFIG_FILE))?;

        Ok(ProjectContext { root, config })
    }

    pub fn schema_path(&self) -> PathBuf {
        self.root.join(&self.config.project.schema)
    }

    pub fn pipeline_path(&self) -> PathBuf {
        self.root.join(&self.config.project.pipeline)
    }

    pub fn rows_path(&self) -> PathBuf {
        self.root.join(&self.config.project.rows)
    }

    pub fn load_model(&self) -> Result<Model> {
        let path = self.schema_path();
        let content = read(&path)?;
        let model = Model::from_json(&content)
            .wrap_err_with(|| format!("Failed to parse schema {}", path.display()))?;

        let root_type = &self.config.project.root_type;
        if model.structured_type(root_type).is_none() {
            return Err(eyre!(
                "Root type '{}' is not declared in {}",
                root_type,
                path.display()
            ));
        }
        Ok(model)
    }

    /// Query options: the apply pipeline plus any trailing options.
    pub fn load_options(&self) -> Result<QueryOptions> {
        let path = self.pipeline_path();
        let content = read(&path)?;
        serde_json::from_str(&content)
            .wrap_err_with(|| format!("Failed to parse pipeline {}", path.display()))
    }

    pub fn load_rows(&self) -> Result<Vec<Record>> {
        let path = self.rows_path();
        let content = read(&path)?;
        serde_json::from_str(&content)
            .wrap_err_with(|| format!("Failed to parse rows {}", path.display()))
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).wrap_err_with(|| format!("Failed to read {}", path.display()))
}

/// Find the project root by looking for applyq.toml
fn find_project_root(start: &Path) -> Result<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    Err(eyre!(
        "project configuration not found: searched from {} up to filesystem root for {}",
        start.display(),
        CONFIG_FILE
    ))
}
