//! Error type for the query engine.

use std::error;
use std::fmt::{self, Display, Formatter};
use std::io;
use std::sync::Arc;

//------------ Error ---------------------------------------------------------

/// Error type for queries run by the engine.
///
/// Errors that happen while trying UDP are recoverable: they are recorded
/// and the query moves on to TCP. They only ever reach the caller as part
/// of an [`Error::Multiple`] if TCP fails, too. Cancellation is not an
/// error at all and is reported through its own outcome.
#[derive(Clone, Debug)]
pub enum Error {
    /// Binding a UDP socket gave an error.
    UdpBind(Arc<io::Error>),

    /// Connecting a UDP socket gave an error.
    UdpConnect(Arc<io::Error>),

    /// Sending over a UDP socket gave an error.
    UdpSend(Arc<io::Error>),

    /// Sending over a UDP socket gave a partial result.
    UdpShortSend,

    /// Receiving from a UDP socket gave an error.
    UdpReceive(Arc<io::Error>),

    /// Opening or connecting a TCP socket gave an error.
    TcpConnect(Arc<io::Error>),

    /// Writing to a stream gave an error.
    StreamWriteError(Arc<io::Error>),

    /// Reading from a stream gave an error.
    StreamReadError(Arc<io::Error>),

    /// Reading from a stream ended unexpectedly.
    StreamUnexpectedEndOfData,

    /// Octet sequence too short to be a valid DNS message.
    ShortMessage,

    /// Reply does not match the query.
    WrongReplyForQuery,

    /// The request message could not be composed.
    MessageBuilderPushError,

    /// Registering a socket with the multiplexer gave an error.
    Register(Arc<io::Error>),

    /// No response arrived before the query’s deadline.
    Timeout,

    /// The engine was shut down before the query completed.
    Shutdown,

    /// Setting up the engine gave an error.
    Io(Arc<io::Error>),

    /// More than one transport attempt failed.
    ///
    /// The errors are kept in the order they happened.
    Multiple(Arc<[Error]>),
}

impl Error {
    /// Bundles the errors recorded by a query into a single error.
    ///
    /// A single error is returned as is. Returns `None` if there are no
    /// errors.
    pub fn bundle(mut errors: Vec<Error>) -> Option<Error> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Error::Multiple(errors.into())),
        }
    }

    /// Returns the individual errors this error is made of.
    ///
    /// For anything but [`Error::Multiple`] this is a slice with just the
    /// error itself.
    pub fn causes(&self) -> &[Error] {
        match self {
            Error::Multiple(errors) => &errors[..],
            other => core::slice::from_ref(other),
        }
    }

    /// Returns whether this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Error::UdpBind(_) => write!(f, "error binding UDP socket"),
            Error::UdpConnect(_) => write!(f, "error connecting UDP socket"),
            Error::UdpSend(_) => write!(f, "error sending to UDP socket"),
            Error::UdpShortSend => write!(f, "partial sent to UDP socket"),
            Error::UdpReceive(_) => {
                write!(f, "error receiving from UDP socket")
            }
            Error::TcpConnect(_) => write!(f, "error connecting TCP socket"),
            Error::StreamWriteError(_) => {
                write!(f, "error writing to stream")
            }
            Error::StreamReadError(_) => {
                write!(f, "error reading from stream")
            }
            Error::StreamUnexpectedEndOfData => {
                write!(f, "unexpected end of data")
            }
            Error::ShortMessage => {
                write!(f, "octet sequence to short to be a valid message")
            }
            Error::WrongReplyForQuery => {
                write!(f, "reply does not match query")
            }
            Error::MessageBuilderPushError => {
                write!(f, "PushError from MessageBuilder")
            }
            Error::Register(_) => {
                write!(f, "error registering socket for readiness")
            }
            Error::Timeout => write!(f, "timeout waiting for response"),
            Error::Shutdown => write!(f, "query engine shut down"),
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Multiple(errors) => {
                write!(f, "multiple errors: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::UdpBind(e) => Some(e),
            Error::UdpConnect(e) => Some(e),
            Error::UdpSend(e) => Some(e),
            Error::UdpShortSend => None,
            Error::UdpReceive(e) => Some(e),
            Error::TcpConnect(e) => Some(e),
            Error::StreamWriteError(e) => Some(e),
            Error::StreamReadError(e) => Some(e),
            Error::StreamUnexpectedEndOfData => None,
            Error::ShortMessage => None,
            Error::WrongReplyForQuery => None,
            Error::MessageBuilderPushError => None,
            Error::Register(e) => Some(e),
            Error::Timeout => None,
            Error::Shutdown => None,
            Error::Io(e) => Some(e),
            Error::Multiple(_) => None,
        }
    }
}

//============ Testing =======================================================
