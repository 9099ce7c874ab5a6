use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log level: {0}")]
    InvalidLevel(String),
    #[error("failed to init logger: {0}")]
    Init(#[from] Box<dyn std::error::Error + Send + Sync>),
}

pub fn init(level: &str, json: bool) -> Result<(), LoggingError> {
    let filter =
        EnvFilter::try_new(level).map_err(|err| LoggingError::InvalidLevel(err.to_string()))?;

    let builder = tracing_subscriber::fmt()
        .with_file(true)
        .with_line_number(true)
        .with_env_filter(filter);

    if json {
        builder.json().try_init()?;
    } else {
        builder.try_init()?;
    }

    Ok(())
}
