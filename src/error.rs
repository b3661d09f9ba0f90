use thiserror::Error;

use crate::domain::{AgentId, HoldId, OperationId};

/// Main error type for the operator
#[derive(Error, Debug)]
pub enum OperatorError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Identity errors
    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    #[error("Unknown operation: {0}")]
    UnknownOperation(OperationId),

    #[error("Operation {operation} is not assigned to agent {agent}")]
    NotOwner {
        operation: OperationId,
        agent: AgentId,
    },

    #[error("Hold not found: {0}")]
    HoldNotFound(HoldId),

    // Capacity errors
    #[error("Operation queue is full ({0} pending)")]
    QueueFull(usize),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl OperatorError {
    /// Stable machine-readable name, used as the `error` field of API bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            OperatorError::Config(_) => "Config",
            OperatorError::Json(_) => "Json",
            OperatorError::UnknownAgent(_) => "UnknownAgent",
            OperatorError::UnknownOperation(_) => "UnknownOperation",
            OperatorError::NotOwner { .. } => "NotOwner",
            OperatorError::HoldNotFound(_) => "NotFound",
            OperatorError::QueueFull(_) => "QueueFull",
            OperatorError::Validation(_) => "Validation",
            OperatorError::Io(_) => "Io",
            OperatorError::Internal(_) | OperatorError::Other(_) => "Internal",
        }
    }
}

/// Result type alias for OperatorError
pub type Result<T> = std::result::Result<T, OperatorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_identity_error_kinds_are_distinct() {
        let agent = AgentId(Uuid::nil());
        let op = OperationId(Uuid::nil());

        assert_eq!(OperatorError::UnknownAgent(agent).kind(), "UnknownAgent");
        assert_eq!(OperatorError::UnknownOperation(op).kind(), "UnknownOperation");
        assert_eq!(
            OperatorError::NotOwner {
                operation: op,
                agent
            }
            .kind(),
            "NotOwner"
        );
        assert_eq!(OperatorError::HoldNotFound(HoldId(Uuid::nil())).kind(), "NotFound");
    }

    #[test]
    fn test_not_owner_message_names_both_sides() {
        let agent = AgentId(Uuid::from_u128(7));
        let op = OperationId(Uuid::from_u128(9));
        let msg = OperatorError::NotOwner {
            operation: op,
            agent,
        }
        .to_string();
        assert!(msg.contains(&op.to_string()));
        assert!(msg.contains(&agent.to_string()));
    }
}
