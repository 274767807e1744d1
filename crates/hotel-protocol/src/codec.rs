//! Resumable frame codecs for the request/reply protocol.
//!
//! Request: `i32 op` + op-specific fields. Reply: `i32 code`, plus
//! `i32 len` + bytes for data-bearing operations when `code == 0`.
//!
//! Frames carry no outer length, so each codec decodes one field at a time
//! and keeps the finished fields of the current frame between `decode`
//! calls. A field leaves the buffer only once it is complete; a wake-up that
//! brings part of a long string peeks its 4-byte prefix and returns.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::messages::{codes, OpCode, Reply, Request, Scores};
use crate::{ProtocolError, INT_SIZE};

/// Upper bound on a single buffer reservation while waiting for a long string.
const MAX_RESERVE: usize = 64 * 1024;

/// Pop a big-endian `i32` once four bytes are buffered.
fn take_int(src: &mut BytesMut) -> Option<i32> {
    if src.len() < INT_SIZE {
        src.reserve(INT_SIZE - src.len());
        return None;
    }
    Some(src.get_i32())
}

/// Pop a length-prefixed string once all of it is buffered.
fn take_string(src: &mut BytesMut) -> Result<Option<String>, ProtocolError> {
    if src.len() < INT_SIZE {
        src.reserve(INT_SIZE - src.len());
        return Ok(None);
    }
    let len = i32::from_be_bytes([src[0], src[1], src[2], src[3]]);
    if len < 0 {
        return Err(ProtocolError::NegativeLength(len));
    }
    let len = len as usize;
    let total = INT_SIZE + len;
    if src.len() < total {
        src.reserve((total - src.len()).min(MAX_RESERVE));
        return Ok(None);
    }
    src.advance(INT_SIZE);
    let bytes = src.split_to(len);
    Ok(Some(String::from_utf8(bytes.to_vec())?))
}

/// String fields, then int fields, that follow each op code.
fn request_shape(op: OpCode) -> (usize, usize) {
    match op {
        OpCode::Register | OpCode::Login | OpCode::SearchHotel => (2, 0),
        OpCode::Logout | OpCode::SearchHotels | OpCode::ShowBadge => (1, 0),
        OpCode::InsertReview => (2, 5),
        OpCode::CloseConnection => (0, 0),
    }
}

/// Fields of the request being decoded.
#[derive(Debug, Default)]
struct Progress {
    strings: Vec<String>,
    ints: Vec<i32>,
}

impl Progress {
    /// Decode fields until `shape` is complete. `false` means more bytes are needed.
    fn fill(&mut self, src: &mut BytesMut, (strings, ints): (usize, usize)) -> Result<bool, ProtocolError> {
        while self.strings.len() < strings {
            match take_string(src)? {
                Some(value) => self.strings.push(value),
                None => return Ok(false),
            }
        }
        while self.ints.len() < ints {
            match take_int(src) {
                Some(value) => self.ints.push(value),
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    /// Assemble the request. Only called once `fill` reported the shape complete.
    fn into_request(self, op: OpCode) -> Request {
        let mut strings = self.strings.into_iter();
        let mut string = move || strings.next().unwrap_or_default();
        let mut ints = self.ints.into_iter();
        let mut int = move || ints.next().unwrap_or_default();

        match op {
            OpCode::Register => Request::Register {
                username: string(),
                password: string(),
            },
            OpCode::Login => Request::Login {
                username: string(),
                password: string(),
            },
            OpCode::Logout => Request::Logout { username: string() },
            OpCode::SearchHotel => Request::SearchHotel {
                name: string(),
                city: string(),
            },
            OpCode::SearchHotels => Request::SearchHotels { city: string() },
            OpCode::InsertReview => Request::InsertReview {
                hotel_name: string(),
                city: string(),
                scores: Scores {
                    overall: int(),
                    position: int(),
                    cleanliness: int(),
                    service: int(),
                    price: int(),
                },
            },
            OpCode::ShowBadge => Request::ShowBadge { username: string() },
            OpCode::CloseConnection => Request::CloseConnection,
        }
    }
}

fn put_string(dst: &mut BytesMut, value: &str) -> Result<(), ProtocolError> {
    let len = i32::try_from(value.len()).map_err(|_| ProtocolError::StringTooLong(value.len()))?;
    dst.reserve(INT_SIZE + value.len());
    dst.put_i32(len);
    dst.extend_from_slice(value.as_bytes());
    Ok(())
}

fn put_request(dst: &mut BytesMut, item: &Request) -> Result<(), ProtocolError> {
    dst.put_i32(item.op().as_i32());
    match item {
        Request::Register { username, password } | Request::Login { username, password } => {
            put_string(dst, username)?;
            put_string(dst, password)?;
        }
        Request::Logout { username } | Request::ShowBadge { username } => {
            put_string(dst, username)?;
        }
        Request::SearchHotel { name, city } => {
            put_string(dst, name)?;
            put_string(dst, city)?;
        }
        Request::SearchHotels { city } => put_string(dst, city)?,
        Request::InsertReview {
            hotel_name,
            city,
            scores,
        } => {
            put_string(dst, hotel_name)?;
            put_string(dst, city)?;
            for score in scores.as_array() {
                dst.put_i32(score);
            }
        }
        Request::CloseConnection => {}
    }
    Ok(())
}

/// Server side: decodes requests, encodes replies.
#[derive(Debug, Default)]
pub struct ServerCodec {
    op: Option<OpCode>,
    progress: Progress,
}

impl ServerCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self) {
        self.op = None;
        self.progress = Progress::default();
    }
}

impl Decoder for ServerCodec {
    type Item = Request;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let op = match self.op {
            Some(op) => op,
            None => {
                let Some(code) = take_int(src) else {
                    return Ok(None);
                };
                let op = OpCode::try_from(code)?;
                self.op = Some(op);
                op
            }
        };

        if !self.progress.fill(src, request_shape(op))? {
            return Ok(None);
        }
        self.op = None;
        Ok(Some(std::mem::take(&mut self.progress).into_request(op)))
    }

    /// Stream end with a partial frame buffered is a disconnect, not a
    /// malformed frame: the leftover bytes are dropped.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(request) => Ok(Some(request)),
            None => {
                if self.op.is_some() || !src.is_empty() {
                    tracing::debug!(pending = src.len(), op = ?self.op, "stream closed mid-frame");
                    src.clear();
                    self.reset();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Reply> for ServerCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Reply, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(INT_SIZE);
        dst.put_i32(item.code);
        if item.code == codes::OK {
            if let Some(payload) = &item.payload {
                put_string(dst, payload)?;
            }
        }
        Ok(())
    }
}

/// Client side: encodes requests, decodes the reply to the request in flight.
#[derive(Debug, Default)]
pub struct ClientCodec {
    awaiting: Option<OpCode>,
    /// Result code of the reply whose payload is still arriving.
    code: Option<i32>,
}

impl ClientCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operation whose reply is expected next, if any.
    pub fn awaiting(&self) -> Option<OpCode> {
        self.awaiting
    }
}

impl Encoder<Request> for ClientCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        put_request(dst, &item)?;
        self.awaiting = Some(item.op());
        Ok(())
    }
}

impl Decoder for ClientCodec {
    type Item = Reply;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(op) = self.awaiting else {
            if src.is_empty() {
                return Ok(None);
            }
            return Err(ProtocolError::UnexpectedReply);
        };

        let code = match self.code {
            Some(code) => code,
            None => {
                let Some(code) = take_int(src) else {
                    return Ok(None);
                };
                self.code = Some(code);
                code
            }
        };

        let payload = if code == codes::OK && op.has_payload() {
            match take_string(src)? {
                Some(payload) => Some(payload),
                None => return Ok(None),
            }
        } else {
            None
        };

        self.awaiting = None;
        self.code = None;
        Ok(Some(Reply { code, payload }))
    }
}
