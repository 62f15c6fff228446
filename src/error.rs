use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every way a solve (or the CLI around it) can fail.
///
/// Each variant carries a human-readable cause that callers are expected to
/// show verbatim.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed caller input: array lengths, indices, element sizes.
    #[error("Input error: {0}")]
    Input(String),

    /// Non-physical material parameters.
    #[error("Material error: {0}")]
    Material(String),

    /// Degenerate or inverted element.
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// Not enough constraints; the reduced system is singular.
    #[error("Ill-posed system: {0}")]
    IllPosed(String),

    /// Factorization or iteration failed for other numerical reasons.
    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Post Processor error: {0}")]
    Output(String),
}
