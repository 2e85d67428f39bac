use crate::openflow::messages::*;
use std::error;
use std::fmt;
use std::io;
use std::result;

/// Errors of an OpenFlow session with a switch
#[derive(Debug)]
pub enum Error {
    /// The switch connection failed
    Io(io::Error),
    /// The switch sent a message that is answered with an `OfpErrorType::BadRequest`
    BadRequest(OfpBadRequestCode, Vec<u8>),
    /// The switch does not speak OpenFlow 1.3
    HelloFailed,
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "{}", e),
            Error::BadRequest(ref code, _) => write!(f, "Bad OpenFlow request: {:?}", code),
            Error::HelloFailed => write!(f, "OpenFlow version negotiation failed"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = result::Result<T, Error>;
