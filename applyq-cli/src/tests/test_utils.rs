//! Test utilities for applyq-cli tests
//!
//! Every test gets its own temporary project directory, so tests never touch
//! the working directory and can run in parallel.

use crate::config::{ApplyqConfig, BackendConfig, CONFIG_FILE};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const SCHEMA: &str = r#"{"types": [
    {"name": "Product", "kind": "entity", "properties": [
        {"name": "Name", "kind": {"structural": "String"}},
        {"name": "Price", "kind": {"structural": "I32"}}
    ]}
]}"#;

/// `groupby((Name), aggregate(Price with sum as Total))`
pub const GROUP_BY_NAME: &str = r#"{"apply": [
    {"kind": "groupby",
     "keys": [{"node": "property_access", "source": {"node": "range_variable"}, "property": "Name"}],
     "aggregate": [{"aggregate": "property",
                    "expression": {"node": "property_access", "source": {"node": "range_variable"}, "property": "Price"},
                    "method": "sum",
                    "alias": "Total"}]}
]}"#;

pub const ROWS: &str = r#"[
    {"Name": "A", "Price": 10},
    {"Name": "B", "Price": 20},
    {"Name": "A", "Price": 5}
]"#;

/// A project directory holding applyq.toml, a schema, a pipeline and rows.
pub struct TestProject {
    /// Keeps the directory alive for the duration of the test
    pub _temp_dir: TempDir,
    pub path: PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        Self::with_config(ApplyqConfig::default_config("sales", "Product"))
    }

    pub fn with_backend(backend: BackendConfig) -> Self {
        let mut config = ApplyqConfig::default_config("sales", "Product");
        config.backend = backend;
        Self::with_config(config)
    }

    pub fn with_config(config: ApplyqConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("project");
        fs::create_dir_all(&path).expect("Failed to create project dir");

        config
            .save_to_file(&path.join(CONFIG_FILE))
            .expect("Failed to save config");
        write(&path.join("schema.json"), SCHEMA);
        write(&path.join("pipeline.json"), GROUP_BY_NAME);
        write(&path.join("rows.json"), ROWS);

        Self {
            _temp_dir: temp_dir,
            path,
        }
    }

    pub fn write(&self, relative: &str, content: &str) {
        write(&self.path.join(relative), content);
    }

    pub fn path_string(&self) -> String {
        self.path.display().to_string()
    }
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(path, content).expect("Failed to write test file");
}
