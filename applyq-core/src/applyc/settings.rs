use crate::{
    applyc::{ast::BinaryOperator, extensions::ExtensionRegistry},
    engine::queryable::BackendKind,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How member reads on a possibly-null value are compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullPropagation {
    /// Decided by the backend: on in memory, off for translated backends.
    #[default]
    Default,
    Enabled,
    Disabled,
}

impl NullPropagation {
    pub fn resolve(&self, backend: &BackendKind) -> bool {
        match self {
            NullPropagation::Enabled => true,
            NullPropagation::Disabled => false,
            NullPropagation::Default => backend.is_in_memory(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArithmeticOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithmeticOperator {
    pub fn all() -> Vec<ArithmeticOperator> {
        vec![
            ArithmeticOperator::Add,
            ArithmeticOperator::Sub,
            ArithmeticOperator::Mul,
            ArithmeticOperator::Div,
            ArithmeticOperator::Mod,
        ]
    }

    pub fn from_binary(op: BinaryOperator) -> Option<Self> {
        match op {
            BinaryOperator::Add => Some(ArithmeticOperator::Add),
            BinaryOperator::Sub => Some(ArithmeticOperator::Sub),
            BinaryOperator::Mul => Some(ArithmeticOperator::Mul),
            BinaryOperator::Div => Some(ArithmeticOperator::Div),
            BinaryOperator::Mod => Some(ArithmeticOperator::Mod),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSettings {
    #[serde(default = "default_max_node_count")]
    pub max_node_count: usize,
    #[serde(default = "ArithmeticOperator::all")]
    pub allowed_arithmetic_operators: Vec<ArithmeticOperator>,
}

fn default_max_node_count() -> usize {
    100
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            max_node_count: default_max_node_count(),
            allowed_arithmetic_operators: ArithmeticOperator::all(),
        }
    }
}

impl ValidationSettings {
    pub fn with_max_node_count(mut self, max_node_count: usize) -> Self {
        self.max_node_count = max_node_count;
        self
    }

    pub fn with_allowed_arithmetic_operators(mut self, operators: Vec<ArithmeticOperator>) -> Self {
        self.allowed_arithmetic_operators = operators;
        self
    }
}

/// Settings for one binding run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplySettings {
    #[serde(default)]
    pub null_propagation: NullPropagation,
    #[serde(default)]
    pub page_limit: Option<usize>,
    #[serde(default)]
    pub validation: ValidationSettings,
    /// Frozen before the first bind; never read from configuration files.
    #[serde(skip)]
    pub extensions: Arc<ExtensionRegistry>,
}

impl ApplySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_null_propagation(mut self, null_propagation: NullPropagation) -> Self {
        self.null_propagation = null_propagation;
        self
    }

    pub fn with_page_limit(mut self, page_limit: Option<usize>) -> Self {
        self.page_limit = page_limit;
        self
    }

    pub fn with_validation(mut self, validation: ValidationSettings) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_extensions(mut self, extensions: Arc<ExtensionRegistry>) -> Self {
        self.extensions = extensions;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_null_propagation_follows_backend() {
        let setting = NullPropagation::Default;
        assert!(setting.resolve(&BackendKind::InMemory));
        assert!(!setting.resolve(&BackendKind::Translated {
            provider: "sql".to_string()
        }));
        assert!(NullPropagation::Enabled.resolve(&BackendKind::Translated {
            provider: "sql".to_string()
        }));
        assert!(!NullPropagation::Disabled.resolve(&BackendKind::InMemory));
    }

    #[test]
    fn test_validation_defaults() {
        let settings = ApplySettings::default();
        assert_eq!(settings.validation.max_node_count, 100);
        assert_eq!(settings.validation.allowed_arithmetic_operators.len(), 5);
        assert_eq!(settings.page_limit, None);
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: ApplySettings =
            sonic_rs::from_str(r#"{"null_propagation": "disabled", "page_limit": 50}"#).unwrap();
        assert_eq!(settings.null_propagation, NullPropagation::Disabled);
        assert_eq!(settings.page_limit, Some(50));
        assert_eq!(settings.validation, ValidationSettings::default());
    }

    #[test]
    fn test_builder_methods() {
        let settings = ApplySettings::new()
            .with_page_limit(Some(10))
            .with_validation(ValidationSettings::default().with_max_node_count(5));
        assert_eq!(settings.page_limit, Some(10));
        assert_eq!(settings.validation.max_node_count, 5);
    }
}
