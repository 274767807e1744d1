//! Hotel Protocol -- wire types and frame codec.
//!
//! One persistent TCP connection per client, one request in flight at a time.
//! Every integer is 4-byte big-endian; every string is a 4-byte length prefix
//! followed by that many UTF-8 bytes.

pub mod codec;
pub mod messages;

pub use codec::{ClientCodec, ServerCodec};
pub use messages::*;

/// Length prefix / integer field size in bytes.
pub const INT_SIZE: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown operation code: {0}")]
    UnknownOperation(i32),
    #[error("negative string length: {0}")]
    NegativeLength(i32),
    #[error("string of {0} bytes does not fit a length prefix")]
    StringTooLong(usize),
    #[error("string field is not valid utf-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("reply received while no request was outstanding")]
    UnexpectedReply,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
