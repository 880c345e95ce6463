//! Scene error types.

use std::fmt;

/// Errors that can occur in the scene orchestration layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// A tag registry ran out of free tag slots.
    TagRegistryExhausted {
        /// Total number of slots in the registry.
        capacity: usize,
    },
    /// A feature processor id has no registration in the factory.
    FeatureProcessorNotRegistered(String),
    /// A pass path does not resolve to a composite pass in the tree.
    InvalidPassPath(String),
    /// No render pipeline with the given id exists in the scene.
    PipelineNotFound(String),
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TagRegistryExhausted { capacity } => {
                write!(f, "tag registry exhausted ({capacity} slots in use)")
            }
            Self::FeatureProcessorNotRegistered(id) => {
                write!(f, "feature processor '{id}' is not registered")
            }
            Self::InvalidPassPath(msg) => write!(f, "invalid pass path: {msg}"),
            Self::PipelineNotFound(id) => write!(f, "render pipeline '{id}' not found"),
        }
    }
}

impl std::error::Error for SceneError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SceneError::TagRegistryExhausted { capacity: 64 };
        assert_eq!(err.to_string(), "tag registry exhausted (64 slots in use)");

        let err = SceneError::FeatureProcessorNotRegistered("Lighting".to_string());
        assert_eq!(err.to_string(), "feature processor 'Lighting' is not registered");
    }
}
