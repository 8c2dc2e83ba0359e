/// Convenience result type used across shotgraph.
pub type ShotgraphResult<T> = Result<T, ShotgraphError>;

/// Top-level error taxonomy used by the export APIs.
#[derive(thiserror::Error, Debug)]
pub enum ShotgraphError {
    /// Invalid user-provided model or option data.
    #[error("validation error: {0}")]
    Validation(String),

    /// A path or token could not be resolved.
    #[error("resolve error: {0}")]
    Resolve(String),

    /// An item could not be placed on the synthetic sequence.
    #[error("collation error: {0}")]
    Collation(String),

    /// Errors while emitting or laying out the node graph.
    #[error("assembly error: {0}")]
    Assembly(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// The export was cancelled through the progress sink.
    #[error("export cancelled")]
    Cancelled,

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ShotgraphError {
    /// Build a [`ShotgraphError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`ShotgraphError::Resolve`] value.
    pub fn resolve(msg: impl Into<String>) -> Self {
        Self::Resolve(msg.into())
    }

    /// Build a [`ShotgraphError::Collation`] value.
    pub fn collation(msg: impl Into<String>) -> Self {
        Self::Collation(msg.into())
    }

    /// Build a [`ShotgraphError::Assembly`] value.
    pub fn assembly(msg: impl Into<String>) -> Self {
        Self::Assembly(msg.into())
    }

    /// Build a [`ShotgraphError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
