// Copyright 2019 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

use crate::message::MsgCode;
use std::fmt::{Debug, Display, Formatter};

/// Reasons an inbound datagram could not be decoded into a [`Message`](crate::message::Message).
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub enum DecodeError {
    /// The datagram is shorter than the fixed four byte header plus token.
    IncompleteHeader,

    /// The version field is not 1.
    UnsupportedVersion,

    /// The token length nibble is one of the reserved values 9-15.
    InvalidTokenLength,

    /// The option delta uses the reserved nibble 15, or the running option
    /// number overflowed 16 bits.
    InvalidOptionDelta,

    /// The option length uses the reserved nibble 15.
    InvalidOptionLength,

    /// An option header or value runs past the end of the datagram.
    TruncatedOption,

    /// A payload marker was present but no payload followed it.
    PayloadMarkerWithEmptyPayload,
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        <Self as Debug>::fmt(self, f)
    }
}

impl std::error::Error for DecodeError {}

/// Type for errors encountered while sending CoAP requests and handling
/// their responses.
///
/// Response-class variants (`BadRequest` through `ProxyingNotSupported`)
/// correspond one-to-one to CoAP response codes of class 4 and 5, see
/// [`Error::from_response_code`].
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub enum Error {
    /// One or more of the supplied arguments are not valid for the given operation.
    InvalidArgument,

    /// The request URI could not be parsed.
    MalformedUri,

    /// The given URI scheme is not supported.
    UnsupportedUriScheme,

    /// A confirmable request was addressed to a multicast destination.
    MulticastConfirmable,

    /// The local transport address is already in use.
    AddressInUse,

    /// Unable to look up the given host because it was not found.
    HostNotFound,

    /// An I/O error occurred while performing this operation.
    IOError,

    /// Operation timed out waiting for a response.
    TimeOut,

    /// The peer answered with a reset message.
    Reset,

    /// A datagram belonging to the exchange could not be decoded.
    Decode(DecodeError),

    /// 4.00 Bad Request
    BadRequest,

    /// 4.01 Unauthorized
    Unauthorized,

    /// 4.02 Bad Option
    BadOption,

    /// 4.03 Forbidden
    Forbidden,

    /// 4.04 Not Found
    NotFound,

    /// 4.05 Method Not Allowed
    MethodNotAllowed,

    /// 4.06 Not Acceptable
    NotAcceptable,

    /// 4.08 Request Entity Incomplete. Also reported locally when blocks
    /// arrive out of order or duplicated.
    RequestEntityIncomplete,

    /// 4.12 Precondition Failed
    PreconditionFailed,

    /// 4.13 Request Entity Too Large
    RequestEntityTooLarge,

    /// 4.15 Unsupported Content-Format
    UnsupportedContentFormat,

    /// 4.29 Too Many Requests
    TooManyRequests,

    /// 5.00 Internal Server Error
    InternalServerError,

    /// 5.01 Not Implemented
    NotImplemented,

    /// 5.02 Bad Gateway
    BadGateway,

    /// 5.03 Service Unavailable
    ServiceUnavailable,

    /// 5.04 Gateway Timeout
    GatewayTimeout,

    /// 5.05 Proxying Not Supported
    ProxyingNotSupported,

    /// An error response code this crate has no name for.
    Unknown,
}

impl Error {
    /// Maps a response code to its error, or `None` if `code` is not an
    /// error code (below 4.00).
    pub fn from_response_code(code: MsgCode) -> Option<Error> {
        if !code.is_error() {
            return None;
        }

        Some(match code {
            MsgCode::BAD_REQUEST => Error::BadRequest,
            MsgCode::UNAUTHORIZED => Error::Unauthorized,
            MsgCode::BAD_OPTION => Error::BadOption,
            MsgCode::FORBIDDEN => Error::Forbidden,
            MsgCode::NOT_FOUND => Error::NotFound,
            MsgCode::METHOD_NOT_ALLOWED => Error::MethodNotAllowed,
            MsgCode::NOT_ACCEPTABLE => Error::NotAcceptable,
            MsgCode::REQUEST_ENTITY_INCOMPLETE => Error::RequestEntityIncomplete,
            MsgCode::PRECONDITION_FAILED => Error::PreconditionFailed,
            MsgCode::REQUEST_ENTITY_TOO_LARGE => Error::RequestEntityTooLarge,
            MsgCode::UNSUPPORTED_CONTENT_FORMAT => Error::UnsupportedContentFormat,
            MsgCode::TOO_MANY_REQUESTS => Error::TooManyRequests,
            MsgCode::INTERNAL_SERVER_ERROR => Error::InternalServerError,
            MsgCode::NOT_IMPLEMENTED => Error::NotImplemented,
            MsgCode::BAD_GATEWAY => Error::BadGateway,
            MsgCode::SERVICE_UNAVAILABLE => Error::ServiceUnavailable,
            MsgCode::GATEWAY_TIMEOUT => Error::GatewayTimeout,
            MsgCode::PROXYING_NOT_SUPPORTED => Error::ProxyingNotSupported,
            _ => Error::Unknown,
        })
    }

    /// Returns true if this error was caused by an error response from the peer.
    pub fn is_response_error(&self) -> bool {
        match self {
            Error::BadRequest
            | Error::Unauthorized
            | Error::BadOption
            | Error::Forbidden
            | Error::NotFound
            | Error::MethodNotAllowed
            | Error::NotAcceptable
            | Error::RequestEntityIncomplete
            | Error::PreconditionFailed
            | Error::RequestEntityTooLarge
            | Error::UnsupportedContentFormat
            | Error::TooManyRequests
            | Error::InternalServerError
            | Error::NotImplemented
            | Error::BadGateway
            | Error::ServiceUnavailable
            | Error::GatewayTimeout
            | Error::ProxyingNotSupported
            | Error::Unknown => true,
            _ => false,
        }
    }
}

impl std::convert::From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::AddrInUse => Error::AddressInUse,
            std::io::ErrorKind::NotFound => Error::HostNotFound,
            _ => Error::IOError,
        }
    }
}

impl std::convert::From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::Decode(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        <Self as Debug>::fmt(self, f)
    }
}

impl std::error::Error for Error {}
