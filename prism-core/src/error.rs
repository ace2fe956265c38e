//! Error types for the graph engine.

use thiserror::Error;

use crate::graph::NodeId;

/// Errors returned by graph mutation, evaluation and configuration.
#[derive(Error, Debug)]
pub enum GraphError {
    /// The requested input list is longer than the node type allows.
    /// The node is left untouched.
    #[error("node '{node}' accepts no more than {max} input(s), {requested} requested")]
    TooManyInputs {
        node: String,
        max: usize,
        requested: usize,
    },

    /// A handle that no longer refers to a node in the arena.
    #[error("no such node: {0:?}")]
    NoSuchNode(NodeId),

    #[error("node '{0}' is not a group")]
    NotAGroup(String),

    #[error("node '{0}' is not isolated")]
    NotIsolated(String),

    #[error("node '{0}' is already isolated")]
    AlreadyIsolated(String),

    #[error("undo reference count of '{0}' is already zero")]
    UndoRefUnderflow(String),

    #[error("node '{0}' still has connected outputs")]
    OutputsConnected(String),

    /// A node behavior failed while producing its image.
    #[error("evaluation of '{node}' failed: {message}")]
    Evaluation { node: String, message: String },

    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_message_names_node_and_limit() {
        let err = GraphError::TooManyInputs {
            node: "over".into(),
            max: 2,
            requested: 3,
        };
        assert_eq!(
            err.to_string(),
            "node 'over' accepts no more than 2 input(s), 3 requested"
        );
    }

    #[test]
    fn json_errors_convert() {
        let parse = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: GraphError = parse.into();
        assert!(matches!(err, GraphError::Config(_)));
    }
}
