use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("failed to unmarshal VCAP_APPLICATION: {0}")]
    Vcap(#[from] serde_json::Error),

    #[error("invalid PORT '{0}'")]
    InvalidPort(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
