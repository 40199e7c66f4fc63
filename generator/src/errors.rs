use thiserror::Error;

/// Contract violations found while turning upstream data into Sensu objects.
#[derive(Error, Debug, PartialEq)]
pub enum GeneratorError {
    #[error("malformed metric definition {metric}: {reason}")]
    MalformedMetric { metric: String, reason: String },

    #[error("metric profile {0} not found")]
    MissingProfile(String),

    #[error("unmatched token {0}: label not present on entity and no default given")]
    UnmatchedToken(String),

    #[error("malformed token in command: {0}")]
    MalformedToken(String),
}
