//! Request and reply types for the eight client operations.

use std::fmt;

use crate::ProtocolError;

/// Operation codes as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Register = 1,
    Login = 2,
    Logout = 3,
    SearchHotel = 4,
    SearchHotels = 5,
    InsertReview = 6,
    ShowBadge = 7,
    CloseConnection = 8,
}

impl OpCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Whether a successful reply to this operation carries a string payload.
    pub fn has_payload(self) -> bool {
        matches!(self, Self::SearchHotel | Self::SearchHotels | Self::ShowBadge)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Login => "login",
            Self::Logout => "logout",
            Self::SearchHotel => "search_hotel",
            Self::SearchHotels => "search_hotels",
            Self::InsertReview => "insert_review",
            Self::ShowBadge => "show_badge",
            Self::CloseConnection => "close_connection",
        }
    }
}

impl TryFrom<i32> for OpCode {
    type Error = ProtocolError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            1 => Self::Register,
            2 => Self::Login,
            3 => Self::Logout,
            4 => Self::SearchHotel,
            5 => Self::SearchHotels,
            6 => Self::InsertReview,
            7 => Self::ShowBadge,
            8 => Self::CloseConnection,
            other => return Err(ProtocolError::UnknownOperation(other)),
        })
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five review scores, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scores {
    pub overall: i32,
    pub position: i32,
    pub cleanliness: i32,
    pub service: i32,
    pub price: i32,
}

impl Scores {
    pub fn as_array(&self) -> [i32; 5] {
        [
            self.overall,
            self.position,
            self.cleanliness,
            self.service,
            self.price,
        ]
    }
}

/// A decoded client request.
#[derive(Clone, PartialEq, Eq)]
pub enum Request {
    Register { username: String, password: String },
    Login { username: String, password: String },
    Logout { username: String },
    SearchHotel { name: String, city: String },
    SearchHotels { city: String },
    InsertReview {
        hotel_name: String,
        city: String,
        scores: Scores,
    },
    ShowBadge { username: String },
    CloseConnection,
}

impl Request {
    pub fn op(&self) -> OpCode {
        match self {
            Self::Register { .. } => OpCode::Register,
            Self::Login { .. } => OpCode::Login,
            Self::Logout { .. } => OpCode::Logout,
            Self::SearchHotel { .. } => OpCode::SearchHotel,
            Self::SearchHotels { .. } => OpCode::SearchHotels,
            Self::InsertReview { .. } => OpCode::InsertReview,
            Self::ShowBadge { .. } => OpCode::ShowBadge,
            Self::CloseConnection => OpCode::CloseConnection,
        }
    }
}

// Passwords never reach the logs.
impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register { username, .. } => f
                .debug_struct("Register")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::Login { username, .. } => f
                .debug_struct("Login")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::Logout { username } => {
                f.debug_struct("Logout").field("username", username).finish()
            }
            Self::SearchHotel { name, city } => f
                .debug_struct("SearchHotel")
                .field("name", name)
                .field("city", city)
                .finish(),
            Self::SearchHotels { city } => {
                f.debug_struct("SearchHotels").field("city", city).finish()
            }
            Self::InsertReview {
                hotel_name,
                city,
                scores,
            } => f
                .debug_struct("InsertReview")
                .field("hotel_name", hotel_name)
                .field("city", city)
                .field("scores", scores)
                .finish(),
            Self::ShowBadge { username } => f
                .debug_struct("ShowBadge")
                .field("username", username)
                .finish(),
            Self::CloseConnection => f.write_str("CloseConnection"),
        }
    }
}

/// A reply frame: result code plus the payload of data-bearing operations.
///
/// The payload is only put on the wire when `code == codes::OK`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: i32,
    pub payload: Option<String>,
}

impl Reply {
    pub fn code(code: i32) -> Self {
        Self {
            code,
            payload: None,
        }
    }

    pub fn ok() -> Self {
        Self::code(codes::OK)
    }

    pub fn ok_with(payload: impl Into<String>) -> Self {
        Self {
            code: codes::OK,
            payload: Some(payload.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == codes::OK
    }
}

/// Result codes, grouped by operation.
pub mod codes {
    /// Success for every operation.
    pub const OK: i32 = 0;

    /// Reported by the client-side reader when the peer closed the stream
    /// mid-operation. Never written to the wire.
    pub const DISCONNECTED: i32 = -5;

    pub mod register {
        pub const DUPLICATE: i32 = 1;
        pub const SERVER_ERROR: i32 = -1;
    }

    pub mod login {
        pub const ALREADY_LOGGED_IN: i32 = -1;
        pub const NO_SUCH_USER: i32 = -2;
        pub const BAD_PASSWORD: i32 = -3;
        pub const SERVER_ERROR: i32 = -4;
    }

    pub mod logout {
        pub const NOT_LOGGED_IN: i32 = -1;
        pub const USERNAME_MISMATCH: i32 = -2;
    }

    pub mod search {
        pub const NOT_FOUND: i32 = -1;
    }

    pub mod review {
        pub const NOT_AUTHENTICATED: i32 = -1;
        pub const INVALID_SCORES: i32 = -2;
        pub const HOTEL_NOT_FOUND: i32 = -3;
    }

    pub mod badge {
        pub const NOT_AUTHENTICATED: i32 = -1;
    }

    pub mod close {
        pub const STILL_AUTHENTICATED: i32 = -1;
    }
}
