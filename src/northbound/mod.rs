/*!
The byte stream between an orchestrator and the flow controller

Every message is framed as its decimal byte length, a colon and the
JSON payload, e.g. `2:{}`.
*/

pub mod client;
pub mod server;

use crate::protocol;

use std::error;
use std::fmt;
use std::io;
use std::io::{Read, Write};
use std::result;

/// Separates the length prefix from the payload
pub const FRAME_SEPARATOR: u8 = b':';
/// The largest payload accepted
pub const MAX_FRAME_LEN: usize = 1 << 20;
const MAX_LEN_DIGITS: usize = 7;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    /// The stream is out of sync and has to be closed
    Frame(String),
    Protocol(protocol::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "{}", e),
            Error::Frame(ref msg) => write!(f, "Corrupt northbound frame: {}", msg),
            Error::Protocol(ref e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            Error::Protocol(ref e) => Some(e),
            Error::Frame(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<protocol::Error> for Error {
    fn from(e: protocol::Error) -> Self {
        Error::Protocol(e)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Writes one framed payload
pub fn write_frame<W: Write>(stream: &mut W, payload: &[u8]) -> io::Result<()> {
    write!(stream, "{}", payload.len())?;
    stream.write_all(&[FRAME_SEPARATOR])?;
    stream.write_all(payload)?;
    stream.flush()
}

/// Reads one framed payload.
/// Returns `None` if the stream ends between two frames.
pub fn read_frame<R: Read>(stream: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len: usize = 0;
    let mut digits = 0;
    let mut byte = [0; 1];
    loop {
        if stream.read(&mut byte)? == 0 {
            if digits == 0 {
                return Ok(None);
            }
            return Err(Error::Frame("stream ends inside a length prefix".to_owned()));
        }
        match byte[0] {
            FRAME_SEPARATOR if digits > 0 => break,
            b @ b'0'..=b'9' if digits < MAX_LEN_DIGITS => {
                len = len * 10 + usize::from(b - b'0');
                digits += 1;
            }
            b => return Err(Error::Frame(format!("unexpected byte {:#04x} in length prefix", b))),
        }
    }
    if len > MAX_FRAME_LEN {
        return Err(Error::Frame(format!("payload of {} bytes is too large", len)));
    }

    let mut payload = vec![0; len];
    stream.read_exact(&mut payload)?;
    Ok(Some(payload))
}
