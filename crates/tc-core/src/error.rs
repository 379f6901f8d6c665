use thiserror::Error;

pub type TcResult<T> = Result<T, TcError>;

#[derive(Error, Debug)]
pub enum TcError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// A single read or write against the process failed.
    #[error("Plant I/O failed during {op}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed reply from plant: {what}")]
    Protocol { what: String },

    /// The background acquisition step failed; the message is the original error.
    #[error("Acquisition failed: {message}")]
    Acquisition { message: String },

    #[error("Plant has been stopped")]
    Stopped,

    #[error("Plant state lock poisoned")]
    Poisoned,
}

/// `io::Error` is not `Clone`; the copy keeps its kind and message.
impl Clone for TcError {
    fn clone(&self) -> Self {
        match self {
            Self::NonFinite { what, value } => Self::NonFinite {
                what: *what,
                value: *value,
            },
            Self::InvalidArg { what } => Self::InvalidArg { what: *what },
            Self::Io { op, source } => Self::Io {
                op: *op,
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::Protocol { what } => Self::Protocol { what: what.clone() },
            Self::Acquisition { message } => Self::Acquisition {
                message: message.clone(),
            },
            Self::Stopped => Self::Stopped,
            Self::Poisoned => Self::Poisoned,
        }
    }
}
