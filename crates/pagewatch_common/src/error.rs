//! Error types for pagewatch.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("Invalid error signature {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Module id must not be empty")]
    EmptyModuleId,

    #[error("Node {0} does not exist in this document")]
    NodeNotFound(usize),

    #[error("Node {0} is not an element")]
    NotAnElement(usize),

    #[error("Node {0} cannot be inserted inside its own subtree")]
    InvalidHierarchy(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl OverlayError {
    /// Short stable label, used as a structured field in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            OverlayError::InvalidPattern { .. } => "invalid_pattern",
            OverlayError::InvalidConfig(_) => "invalid_config",
            OverlayError::EmptyModuleId => "empty_module_id",
            OverlayError::NodeNotFound(_) => "node_not_found",
            OverlayError::NotAnElement(_) => "not_an_element",
            OverlayError::InvalidHierarchy(_) => "invalid_hierarchy",
            OverlayError::Io(_) => "io",
            OverlayError::Toml(_) => "toml",
        }
    }
}

/// Failure while turning a host event into an error record.
///
/// Never escapes a capture listener; it is logged and dropped.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Could not encode rejection reason: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Record construction panicked: {0}")]
    Panicked(String),
}

pub type Result<T> = std::result::Result<T, OverlayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(OverlayError::EmptyModuleId.kind(), "empty_module_id");
        assert_eq!(OverlayError::NodeNotFound(3).kind(), "node_not_found");
        assert_eq!(
            OverlayError::InvalidConfig("x".to_string()).to_string(),
            "Invalid configuration: x"
        );
    }
}
