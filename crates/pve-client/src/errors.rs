use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("host must not be empty")]
    EmptyHost,

    #[error("port must not be zero")]
    ZeroPort,

    #[error("api token must have the form USER@REALM!TOKENID=SECRET")]
    InvalidToken,

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("invalid base url: {0}")]
    InvalidUrl(String),

    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}
