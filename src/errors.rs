use thiserror::Error;

/// Every fatal error names the subsystem it came from, so a failed
/// invocation reads as "config", "connect", "discovery", "list" or "output".
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("config error: {field}: {message}")]
    Config { field: String, message: String },

    #[error("config error: failed to load config ({path}{context}): {message}")]
    ConfigLoad {
        path: String,
        context: String,
        message: String,
    },

    #[error("connect error: {0}")]
    Connect(String),

    #[error("discovery error: {0}")]
    Discovery(String),

    #[error("list error: {kind} in namespace '{namespace}': {message}")]
    List {
        kind: String,
        namespace: String,
        message: String,
    },

    #[error("output error: failed to set '{field}': {message}")]
    Output { field: String, message: String },
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Helper for tagging a bad setting with the field it came from
pub fn config_error<E: ToString>(field: &str, err: E) -> ProviderError {
    ProviderError::Config {
        field: field.to_string(),
        message: err.to_string(),
    }
}

/// Helper for mapping any discovery failure (network or cache) into one variant
pub fn discovery_error<E: ToString>(err: E) -> ProviderError {
    ProviderError::Discovery(err.to_string())
}

impl ProviderError {
    /// Short subsystem tag, used as a structured logging field.
    pub fn subsystem(&self) -> &'static str {
        match self {
            ProviderError::Config { .. } | ProviderError::ConfigLoad { .. } => "config",
            ProviderError::Connect(_) => "connect",
            ProviderError::Discovery(_) => "discovery",
            ProviderError::List { .. } => "list",
            ProviderError::Output { .. } => "output",
        }
    }
}
