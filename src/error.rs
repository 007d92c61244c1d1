use std::borrow::Cow;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::fmt;

use rusoto_core::RusotoError;
use tokio::{io, sync::AcquireError};

/// A plain error message, owned or static.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageError(Cow<'static, str>);
impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
impl StdError for MessageError {}
impl From<String> for MessageError {
    fn from(s: String) -> Self {
        MessageError(Cow::Owned(s))
    }
}
impl From<&'static str> for MessageError {
    fn from(s: &'static str) -> Self {
        MessageError(Cow::Borrowed(s))
    }
}

/// A rejected configuration value, artifact or manifest line.
#[derive(Debug, PartialEq, Eq)]
pub struct ValidationError(String);
impl ValidationError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        ValidationError(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}
impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation error: {}", self.0)
    }
}
impl StdError for ValidationError {}

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    /// The bucket rejected the request (missing key, access denied, ...).
    Service(MessageError),
    /// The request never got a service answer: dispatch, credentials, parsing.
    Transport(RusotoError<Infallible>),
    Acquire(AcquireError),
    Validation(ValidationError),
    Message(MessageError),
}
impl Error {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source() {
            Some(e) => write!(f, "{}", e),
            None => Ok(()),
        }
    }
}
impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Service(e) | Self::Message(e) => Some(e),
            Self::Transport(e) => Some(e),
            Self::Acquire(e) => Some(e),
            Self::Validation(e) => Some(e),
        }
    }
}
impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
impl<E> From<RusotoError<E>> for Error
where
    E: fmt::Display,
{
    fn from(e: RusotoError<E>) -> Self {
        let transport = match e {
            RusotoError::Service(e) => return Self::Service(e.to_string().into()),
            RusotoError::HttpDispatch(e) => RusotoError::HttpDispatch(e),
            RusotoError::Credentials(e) => RusotoError::Credentials(e),
            RusotoError::Validation(e) => RusotoError::Validation(e),
            RusotoError::ParseError(e) => RusotoError::ParseError(e),
            RusotoError::Unknown(e) => RusotoError::Unknown(e),
            RusotoError::Blocking => RusotoError::Blocking,
        };
        Self::Transport(transport)
    }
}
impl From<AcquireError> for Error {
    fn from(e: AcquireError) -> Self {
        Self::Acquire(e)
    }
}
impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}
impl From<&'static str> for Error {
    fn from(e: &'static str) -> Self {
        Self::Message(e.into())
    }
}
