//! Error handling for the gateway

use std::error;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// A Result for internal operations.
pub type Result<T> = ::std::result::Result<T, Error>;

/// All errors which might arise within the gateway
///
/// Every one of these is scoped to a single request. A target that doesn't
/// exist is _not_ an error; it becomes a 404 response.
#[derive(Debug)]
pub enum Error {
    Parse(httparse::Error),
    Io(io::Error),
    PathNotInOriginForm,
    IllegalPercentEncoding,
    RequestIncomplete,
    InvalidUrl(String),
    /// The interpreter could not be launched
    GatewayStartFailure(io::Error),
    /// A file element of the request body could not be read
    BodyStreamFailure {
        path: PathBuf,
        source: io::Error
    },
    /// The interpreter ran past its deadline and was killed
    GatewayTimeout(Duration),
    /// A read was attempted after the final chunk was delivered
    ResponseDrained,
    /// Headers or body were requested before the request was processed
    ResponseNotReady,
    /// A helper thread died without reporting back
    WorkerLost
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Parse(ref e) => write!(f, "malformed request: {}", e),
            Error::Io(ref e) => write!(f, "I/O error: {}", e),
            Error::PathNotInOriginForm =>
                write!(f, "request path does not start with '/'"),
            Error::IllegalPercentEncoding =>
                write!(f, "request path has a bogus percent-encoding"),
            Error::RequestIncomplete => write!(f, "request is incomplete"),
            Error::InvalidUrl(ref url) => write!(f, "can't parse URL {:?}", url),
            Error::GatewayStartFailure(ref e) =>
                write!(f, "failed to start the CGI interpreter: {}", e),
            Error::BodyStreamFailure { ref path, ref source } =>
                write!(f, "failed to stream request body file {}: {}",
                       path.display(), source),
            Error::GatewayTimeout(limit) =>
                write!(f, "CGI interpreter ran longer than {:?}", limit),
            Error::ResponseDrained =>
                write!(f, "response body was already fully read"),
            Error::ResponseNotReady =>
                write!(f, "request has not been processed yet"),
            Error::WorkerLost => write!(f, "a gateway worker thread panicked")
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Parse(ref e) => Some(e),
            Error::Io(ref e) => Some(e),
            Error::GatewayStartFailure(ref e) => Some(e),
            Error::BodyStreamFailure { ref source, .. } => Some(source),
            _ => None
        }
    }
}

impl From<httparse::Error> for Error {
    fn from(e: httparse::Error) -> Error {
        Error::Parse(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}
