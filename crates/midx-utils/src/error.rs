/// Base error type for midx-utils operations.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    #[error("path error: {0}")]
    Path(String),

    #[error("unexpected end of input: wanted {wanted} bytes, {remaining} remaining")]
    UnexpectedEof { wanted: usize, remaining: usize },

    #[error("missing NUL terminator")]
    MissingTerminator,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
