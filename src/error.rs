#[derive(Debug, thiserror::Error)]
pub enum EmberError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArgCount(String),

    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    #[error("ERR value is not a valid float")]
    NotFloat,

    #[error("ERR increment or decrement would overflow")]
    Overflow,

    #[error("ERR syntax error")]
    SyntaxError,

    #[error("ERR unknown command '{0}', with args beginning with: {1}")]
    UnknownCommand(String, String),

    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpireTime(String),

    #[error("ERR DB index is out of range")]
    DbIndexOutOfRange,
}

impl EmberError {
    pub fn wrong_args(cmd: &str) -> Self {
        EmberError::WrongArgCount(cmd.to_lowercase())
    }
}

pub type EmberResult<T> = Result<T, EmberError>;
