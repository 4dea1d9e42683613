use thiserror::Error;

/// Échecs côté REST
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend answered {status}")]
    Status { status: u16 },
    /// Réponse 2xx dont le corps signale un échec
    #[error("{0}")]
    Rejected(String),
    #[error("invalid payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Échecs du socket temps réel
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("socket error: {0}")]
    Socket(String),
}

/// Validation locale de formulaire, avant tout envoi
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Customer name is required")]
    MissingCustomer,
    #[error("Quantity must be a positive number")]
    InvalidQuantity,
    #[error("Due date is required")]
    MissingDueDate,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
}

pub type Result<T, E = ConsoleError> = std::result::Result<T, E>;
