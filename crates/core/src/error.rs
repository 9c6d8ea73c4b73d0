use thiserror::Error;

#[derive(Error, Debug)]
pub enum PowerwatchError {
    #[error("Configuration error: {0}")]
    Config(String),
}
