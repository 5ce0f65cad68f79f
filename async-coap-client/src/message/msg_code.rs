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

/// Enum representing the *class* of a CoAP message code.
#[derive(Debug, Copy, Eq, PartialEq, Clone)]
pub enum MsgCodeClass {
    /// Class for methods
    Method = 0,

    /// Class for successful responses
    Success = 2,

    /// Class for client error responses
    ClientError = 4,

    /// Class for server error responses
    ServerError = 5,

    /// Class for in-band signaling
    Signal = 7,
}

impl MsgCodeClass {
    /// Tries to calculate the message code class from the given class number.
    pub fn try_from(x: u8) -> Option<MsgCodeClass> {
        match x {
            0 => Some(MsgCodeClass::Method),
            2 => Some(MsgCodeClass::Success),
            4 => Some(MsgCodeClass::ClientError),
            5 => Some(MsgCodeClass::ServerError),
            7 => Some(MsgCodeClass::Signal),
            _ => None,
        }
    }

    /// Returns true if the given message code is in this message code class.
    pub fn contains(self, code: MsgCode) -> bool {
        !code.is_empty() && code.class() == self as u8
    }
}

/// A CoAP message code: a 3-bit class and a 5-bit detail, written `c.dd`.
///
/// Codes this crate has no name for are still representable, so that
/// unknown response codes survive decoding.
#[derive(Copy, Eq, PartialEq, Hash, Clone, Ord, PartialOrd, Default)]
pub struct MsgCode(pub u8);

impl MsgCode {
    /// Empty message code. Only used for pings, resets, and empty acknowledgements.
    pub const EMPTY: MsgCode = MsgCode::new(0, 0);

    /// CoAP GET method.
    pub const GET: MsgCode = MsgCode::new(0, 1);

    /// CoAP POST method.
    pub const POST: MsgCode = MsgCode::new(0, 2);

    /// CoAP PUT method.
    pub const PUT: MsgCode = MsgCode::new(0, 3);

    /// CoAP DELETE method.
    pub const DELETE: MsgCode = MsgCode::new(0, 4);

    /// 2.01 Created
    pub const CREATED: MsgCode = MsgCode::new(2, 1);

    /// 2.02 Deleted
    pub const DELETED: MsgCode = MsgCode::new(2, 2);

    /// 2.03 Valid
    pub const VALID: MsgCode = MsgCode::new(2, 3);

    /// 2.04 Changed
    pub const CHANGED: MsgCode = MsgCode::new(2, 4);

    /// 2.05 Content
    pub const CONTENT: MsgCode = MsgCode::new(2, 5);

    /// 2.31 Continue, from RFC7959.
    pub const CONTINUE: MsgCode = MsgCode::new(2, 31);

    /// 4.00 Bad Request
    pub const BAD_REQUEST: MsgCode = MsgCode::new(4, 0);

    /// 4.01 Unauthorized
    pub const UNAUTHORIZED: MsgCode = MsgCode::new(4, 1);

    /// 4.02 Bad Option
    pub const BAD_OPTION: MsgCode = MsgCode::new(4, 2);

    /// 4.03 Forbidden
    pub const FORBIDDEN: MsgCode = MsgCode::new(4, 3);

    /// 4.04 Not Found
    pub const NOT_FOUND: MsgCode = MsgCode::new(4, 4);

    /// 4.05 Method Not Allowed
    pub const METHOD_NOT_ALLOWED: MsgCode = MsgCode::new(4, 5);

    /// 4.06 Not Acceptable
    pub const NOT_ACCEPTABLE: MsgCode = MsgCode::new(4, 6);

    /// 4.08 Request Entity Incomplete, from RFC7959.
    pub const REQUEST_ENTITY_INCOMPLETE: MsgCode = MsgCode::new(4, 8);

    /// 4.12 Precondition Failed
    pub const PRECONDITION_FAILED: MsgCode = MsgCode::new(4, 12);

    /// 4.13 Request Entity Too Large
    pub const REQUEST_ENTITY_TOO_LARGE: MsgCode = MsgCode::new(4, 13);

    /// 4.15 Unsupported Content-Format
    pub const UNSUPPORTED_CONTENT_FORMAT: MsgCode = MsgCode::new(4, 15);

    /// 4.29 Too Many Requests, from RFC8516.
    pub const TOO_MANY_REQUESTS: MsgCode = MsgCode::new(4, 29);

    /// 5.00 Internal Server Error
    pub const INTERNAL_SERVER_ERROR: MsgCode = MsgCode::new(5, 0);

    /// 5.01 Not Implemented
    pub const NOT_IMPLEMENTED: MsgCode = MsgCode::new(5, 1);

    /// 5.02 Bad Gateway
    pub const BAD_GATEWAY: MsgCode = MsgCode::new(5, 2);

    /// 5.03 Service Unavailable
    pub const SERVICE_UNAVAILABLE: MsgCode = MsgCode::new(5, 3);

    /// 5.04 Gateway Timeout
    pub const GATEWAY_TIMEOUT: MsgCode = MsgCode::new(5, 4);

    /// 5.05 Proxying Not Supported
    pub const PROXYING_NOT_SUPPORTED: MsgCode = MsgCode::new(5, 5);

    /// Builds a code from its class and detail parts.
    pub const fn new(class: u8, detail: u8) -> MsgCode {
        MsgCode(((class & 0x7) << 5) | (detail & 0x1F))
    }

    /// The class part (the `c` in `c.dd`).
    pub fn class(self) -> u8 {
        self.0 >> 5
    }

    /// The detail part (the `dd` in `c.dd`).
    pub fn detail(self) -> u8 {
        self.0 & 0x1F
    }

    /// Returns an approximation of this message code as an HTTP status code.
    pub fn to_http_code(self) -> u16 {
        self.class() as u16 * 100 + self.detail() as u16
    }

    /// Returns true if this is the empty code.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if message code is a method.
    pub fn is_method(self) -> bool {
        MsgCodeClass::Method.contains(self)
    }

    /// Returns true if message code is a client error.
    pub fn is_client_error(self) -> bool {
        MsgCodeClass::ClientError.contains(self)
    }

    /// Returns true if message code is a server error.
    pub fn is_server_error(self) -> bool {
        MsgCodeClass::ServerError.contains(self)
    }

    /// Returns true for any code of 4.00 or above that is not a signal.
    pub fn is_error(self) -> bool {
        self.class() >= 4 && !self.is_signal()
    }

    /// Returns true if message code indicates success.
    pub fn is_success(self) -> bool {
        MsgCodeClass::Success.contains(self)
    }

    /// Returns true if message code is an in-band signal.
    pub fn is_signal(self) -> bool {
        MsgCodeClass::Signal.contains(self)
    }

    /// Returns true if this code can only appear in a response.
    pub fn is_response(self) -> bool {
        self.class() >= 2 && !self.is_signal()
    }

    /// Returns the conventional name of this code, if it has one.
    pub fn static_name(self) -> Option<&'static str> {
        Some(match self {
            MsgCode::EMPTY => "Empty",
            MsgCode::GET => "GET",
            MsgCode::POST => "POST",
            MsgCode::PUT => "PUT",
            MsgCode::DELETE => "DELETE",
            MsgCode::CREATED => "Created",
            MsgCode::DELETED => "Deleted",
            MsgCode::VALID => "Valid",
            MsgCode::CHANGED => "Changed",
            MsgCode::CONTENT => "Content",
            MsgCode::CONTINUE => "Continue",
            MsgCode::BAD_REQUEST => "BadRequest",
            MsgCode::UNAUTHORIZED => "Unauthorized",
            MsgCode::BAD_OPTION => "BadOption",
            MsgCode::FORBIDDEN => "Forbidden",
            MsgCode::NOT_FOUND => "NotFound",
            MsgCode::METHOD_NOT_ALLOWED => "MethodNotAllowed",
            MsgCode::NOT_ACCEPTABLE => "NotAcceptable",
            MsgCode::REQUEST_ENTITY_INCOMPLETE => "RequestEntityIncomplete",
            MsgCode::PRECONDITION_FAILED => "PreconditionFailed",
            MsgCode::REQUEST_ENTITY_TOO_LARGE => "RequestEntityTooLarge",
            MsgCode::UNSUPPORTED_CONTENT_FORMAT => "UnsupportedContentFormat",
            MsgCode::TOO_MANY_REQUESTS => "TooManyRequests",
            MsgCode::INTERNAL_SERVER_ERROR => "InternalServerError",
            MsgCode::NOT_IMPLEMENTED => "NotImplemented",
            MsgCode::BAD_GATEWAY => "BadGateway",
            MsgCode::SERVICE_UNAVAILABLE => "ServiceUnavailable",
            MsgCode::GATEWAY_TIMEOUT => "GatewayTimeout",
            MsgCode::PROXYING_NOT_SUPPORTED => "ProxyingNotSupported",
            _ => return None,
        })
    }
}

impl core::fmt::Display for MsgCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(name) = self.static_name() {
            f.write_str(name)
        } else {
            write!(f, "{}.{:02}", self.class(), self.detail())
        }
    }
}

impl core::fmt::Debug for MsgCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}({})", self.class(), self.detail(), self)
    }
}

impl core::convert::From<MsgCode> for u8 {
    fn from(code: MsgCode) -> Self {
        code.0
    }
}

impl core::convert::From<u8> for MsgCode {
    fn from(x: u8) -> Self {
        MsgCode(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_and_detail() {
        assert_eq!(MsgCode::CONTENT.0, 0x45);
        assert_eq!(MsgCode::METHOD_NOT_ALLOWED.0, 0x85);
        assert_eq!(MsgCode::REQUEST_ENTITY_INCOMPLETE.0, 0x88);
        assert_eq!(MsgCode::TOO_MANY_REQUESTS.0, 0x9D);
        assert_eq!(MsgCode::CONTINUE.0, 0x5F);
        assert_eq!(MsgCode::NOT_FOUND.to_http_code(), 404);
        assert_eq!(MsgCode::CONTENT.class(), 2);
        assert_eq!(MsgCode::CONTENT.detail(), 5);
    }

    #[test]
    fn classification() {
        assert!(MsgCode::GET.is_method());
        assert!(!MsgCode::EMPTY.is_method());
        assert!(MsgCode::CHANGED.is_success());
        assert!(MsgCode::BAD_OPTION.is_client_error());
        assert!(MsgCode::BAD_GATEWAY.is_server_error());
        assert!(MsgCode::new(6, 1).is_error());
        assert!(!MsgCode::new(7, 1).is_error());
    }

    #[test]
    fn display() {
        assert_eq!(MsgCode::CONTENT.to_string(), "Content");
        assert_eq!(MsgCode::new(2, 7).to_string(), "2.07");
    }
}
