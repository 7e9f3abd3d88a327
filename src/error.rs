use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telegram api error: {0}")]
    Api(String),

    /// Text meant for the user who issued the command. The command wrapper
    /// sends it as a reply instead of logging it.
    #[error("{0}")]
    Reply(String),

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("task runner is closed")]
    RunnerClosed,
}

impl BotError {
    pub fn reply(text: impl Into<String>) -> Self {
        BotError::Reply(text.into())
    }
}

pub type BotResult<T> = Result<T, BotError>;
