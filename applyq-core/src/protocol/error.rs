use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("`{kind}` is not supported by the transformation compiler")]
    UnsupportedOperation { kind: String },
    #[error("Couldn't find property `{name}` on `{on}`")]
    UnknownProperty { name: String, on: String },
    #[error("Invalid pipeline state: {0}")]
    InvalidPipelineState(String),
    #[error("Backend `{backend}` does not support {feature}")]
    BackendUnsupported { backend: String, feature: String },
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Evaluation failed: {0}")]
    Evaluation(String),
}

pub type Result<T> = std::result::Result<T, ApplyError>;

impl Serialize for ApplyError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(&self.to_string())
    }
}

impl ApplyError {
    pub fn code(&self) -> &'static str {
        match self {
            ApplyError::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            ApplyError::UnknownProperty { .. } => "UNKNOWN_PROPERTY",
            ApplyError::InvalidPipelineState(_) => "INVALID_PIPELINE_STATE",
            ApplyError::BackendUnsupported { .. } => "BACKEND_UNSUPPORTED",
            ApplyError::Validation(_) => "VALIDATION_ERROR",
            ApplyError::Evaluation(_) => "EVALUATION_ERROR",
        }
    }

    /// True for errors raised while binding, before any row is produced.
    pub fn is_compile_time(&self) -> bool {
        !matches!(self, ApplyError::Evaluation(_))
    }

    pub(crate) fn unsupported(kind: impl Into<String>) -> Self {
        ApplyError::UnsupportedOperation { kind: kind.into() }
    }

    pub(crate) fn unknown_property(name: impl Into<String>, on: impl Into<String>) -> Self {
        ApplyError::UnknownProperty {
            name: name.into(),
            on: on.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================================
    // ApplyError Variant Tests
    // ============================================================================

    #[test]
    fn test_unknown_property_message() {
        let error = ApplyError::unknown_property("Colour", "Product");
        let error_string = error.to_string();
        assert!(error_string.contains("Colour"));
        assert!(error_string.contains("Product"));
    }

    #[test]
    fn test_unsupported_operation_carries_kind() {
        let error = ApplyError::unsupported("Any");
        assert!(matches!(
            &error,
            ApplyError::UnsupportedOperation { kind } if kind == "Any"
        ));
        assert!(error.to_string().contains("`Any`"));
    }

    #[test]
    fn test_backend_unsupported_message() {
        let error = ApplyError::BackendUnsupported {
            backend: "linq2sql".to_string(),
            feature: "$apply".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Backend `linq2sql` does not support $apply"
        );
    }

    // ============================================================================
    // Error Code Tests
    // ============================================================================

    #[test]
    fn test_error_codes() {
        assert_eq!(ApplyError::unsupported("x").code(), "UNSUPPORTED_OPERATION");
        assert_eq!(
            ApplyError::unknown_property("a", "b").code(),
            "UNKNOWN_PROPERTY"
        );
        assert_eq!(
            ApplyError::InvalidPipelineState("x".into()).code(),
            "INVALID_PIPELINE_STATE"
        );
        assert_eq!(ApplyError::Validation("x".into()).code(), "VALIDATION_ERROR");
        assert_eq!(ApplyError::Evaluation("x".into()).code(), "EVALUATION_ERROR");
    }

    #[test]
    fn test_compile_time_classification() {
        assert!(ApplyError::Validation("x".into()).is_compile_time());
        assert!(!ApplyError::Evaluation("x".into()).is_compile_time());
    }

    // ============================================================================
    // Error Trait Tests
    // ============================================================================

    #[test]
    fn test_apply_error_is_error_trait() {
        fn assert_error<T: std::error::Error>(_: T) {}
        assert_error(ApplyError::Validation("too many nodes".into()));
    }

    #[test]
    fn test_apply_error_serializes_as_message() {
        let error = ApplyError::InvalidPipelineState("expand after aggregate".into());
        let json = sonic_rs::to_string(&error).unwrap();
        assert_eq!(json, r#""Invalid pipeline state: expand after aggregate""#);
    }
}
