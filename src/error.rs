use std::borrow::Cow;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    IO(std::io::Error),
    Discovery {
        retries: u32,
    },
    Descriptor(Cow<'static, str>),
    Device {
        code: i64,
        message: String,
    },
    State {
        op: &'static str,
        need: &'static str,
        got: String,
    },
    FrameCorrupted(Cow<'static, str>),
    IncompleteTransfer {
        want: usize,
        got: usize,
    },
    InvalidData(Cow<'static, str>),
    Other(Cow<'static, str>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IO(e) => write!(f, "io: {}", e),
            Self::Discovery { retries } => {
                write!(f, "no usable discovery response after {} searches", retries)
            }
            Self::Descriptor(msg) => write!(f, "device descriptor: {}", msg),
            Self::Device { code, message } => write!(f, "camera error {}: {}", code, message),
            Self::State { op, need, got } => write!(
                f,
                "{} aborted, camera not in {} state, current state: {}",
                op, need, got
            ),
            Self::FrameCorrupted(msg) => write!(f, "liveview frame: {}", msg),
            Self::IncompleteTransfer { want, got } => {
                write!(f, "incomplete transfer: want {} bytes, got {}", want, got)
            }
            Self::InvalidData(msg) => write!(f, "invalid data: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IO(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::IO(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidData(format!("json: {}", e).into())
    }
}
