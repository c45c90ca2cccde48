use thiserror::Error;

pub type Result<T> = std::result::Result<T, MetapathError>;

/// Fatal errors. Soft inapplicability (no aggregation route, incompatible
/// unit types, unmet model rule) is reported as `Ok(None)` / `Ok(false)` by
/// the operation concerned, never through this enum.
#[derive(Debug, Error)]
pub enum MetapathError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("not initialised: {0}")]
    NotInitialised(String),
    #[error("bad union: {0}")]
    BadUnion(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
