//! Custom scalar functions and aggregation methods.
//!
//! The registry is assembled once at startup through [`ExtensionRegistryBuilder`] and
//! frozen behind an `Arc`; binding runs only read it.

use crate::{
    applyc::schema::FieldType,
    protocol::{error::Result, value::Value},
};
use std::{collections::HashMap, fmt, sync::Arc};

pub type ScalarFn = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;
pub type ReducerFn = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

#[derive(Clone)]
pub struct CustomFunction {
    pub name: String,
    pub arity: usize,
    pub return_type: FieldType,
    pub implementation: ScalarFn,
}

impl fmt::Debug for CustomFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("return_type", &self.return_type)
            .finish()
    }
}

/// One implementation of a custom aggregation method for a given input type.
#[derive(Clone)]
pub struct CustomReducer {
    pub method: String,
    pub input_type: FieldType,
    pub result_type: FieldType,
    pub implementation: ReducerFn,
}

impl fmt::Debug for CustomReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomReducer")
            .field("method", &self.method)
            .field("input_type", &self.input_type)
            .field("result_type", &self.result_type)
            .finish()
    }
}

impl PartialEq for CustomFunction {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.arity == other.arity && self.return_type == other.return_type
    }
}

impl PartialEq for CustomReducer {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method
            && self.input_type == other.input_type
            && self.result_type == other.result_type
    }
}

#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    functions: HashMap<String, CustomFunction>,
    aggregations: HashMap<String, HashMap<FieldType, CustomReducer>>,
}

impl ExtensionRegistry {
    pub fn builder() -> ExtensionRegistryBuilder {
        ExtensionRegistryBuilder::default()
    }

    pub fn function(&self, name: &str) -> Option<&CustomFunction> {
        self.functions.get(name)
    }

    /// Resolves `(method, input type)`. A method registered for
    /// [`FieldType::Dynamic`] accepts any input type.
    pub fn aggregation(&self, method: &str, input: &FieldType) -> Option<&CustomReducer> {
        let methods = self.aggregations.get(method)?;
        methods.get(input).or_else(|| methods.get(&FieldType::Dynamic))
    }

    pub fn has_aggregation(&self, method: &str) -> bool {
        self.aggregations.contains_key(method)
    }
}

#[derive(Debug, Default)]
pub struct ExtensionRegistryBuilder {
    registry: ExtensionRegistry,
}

impl ExtensionRegistryBuilder {
    pub fn with_function<F>(
        mut self,
        name: impl Into<String>,
        arity: usize,
        return_type: FieldType,
        implementation: F,
    ) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        self.registry.functions.insert(
            name.clone(),
            CustomFunction {
                name,
                arity,
                return_type,
                implementation: Arc::new(implementation),
            },
        );
        self
    }

    pub fn with_aggregation<F>(
        mut self,
        method: impl Into<String>,
        input_type: FieldType,
        result_type: FieldType,
        implementation: F,
    ) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let method = method.into();
        self.registry
            .aggregations
            .entry(method.clone())
            .or_default()
            .insert(
                input_type.clone(),
                CustomReducer {
                    method,
                    input_type,
                    result_type,
                    implementation: Arc::new(implementation),
                },
            );
        self
    }

    pub fn build(self) -> Arc<ExtensionRegistry> {
        Arc::new(self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<ExtensionRegistry> {
        ExtensionRegistry::builder()
            .with_function("double", 1, FieldType::I64, |args| {
                args[0].checked_mul(&Value::I64(2))
            })
            .with_aggregation("product", FieldType::I64, FieldType::I64, |values| {
                values
                    .iter()
                    .try_fold(Value::I64(1), |acc, v| acc.checked_mul(v))
            })
            .with_aggregation("first", FieldType::Dynamic, FieldType::Dynamic, |values| {
                Ok(values.first().cloned().unwrap_or_default())
            })
            .build()
    }

    #[test]
    fn test_function_lookup() {
        let registry = registry();
        let double = registry.function("double").unwrap();
        assert_eq!(double.arity, 1);
        assert_eq!(
            (double.implementation)(&[Value::I64(4)]).unwrap(),
            Value::I64(8)
        );
        assert!(registry.function("triple").is_none());
    }

    #[test]
    fn test_aggregation_lookup_by_input_type() {
        let registry = registry();
        assert!(registry.aggregation("product", &FieldType::I64).is_some());
        assert!(registry.aggregation("product", &FieldType::String).is_none());
        assert!(registry.aggregation("first", &FieldType::String).is_some());
        assert!(registry.has_aggregation("product"));
        assert!(!registry.has_aggregation("median"));
    }
}
