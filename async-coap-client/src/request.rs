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

//! Request descriptions handed to [`Engine::submit`](crate::Engine::submit).

use super::*;
use regex::Regex;
use std::convert::TryFrom;

lazy_static! {
    /// Splits full URI string into "scheme", "heir-part", "query", and "fragment"
    ///
    /// * scheme    = $2
    /// * authority = $4
    /// * path      = $5
    /// * query     = $7
    /// * fragment  = $9
    static ref RFC3986_APPENDIX_B: Regex =
        Regex::new(r#"^(([^:/?#%]+):)?(//([^/?#]*))?([^?#]*)(\?([^#]*))?(#(.*))?$"#)
            .expect("RFC3986_APPENDIX_B");

    /// Splits the authority into "userinfo", "host", and "port"
    static ref URI_AUTHORITY: Regex =
        Regex::new(r#"^(([^@/?#]+)@)?([^\[\]:]+|\[[^\]]+\])(:([0-9]*))?$"#)
            .expect("URI_AUTHORITY");

    /// Regex for verifying that a URI scheme is well-formed.
    static ref URI_CHECK_SCHEME: Regex =
        Regex::new(r#"^[A-Za-z][-+.A-Za-z0-9]*$"#).expect("URI_CHECK_SCHEME");
}

/// Decodes `%XX` escapes. Fails on truncated escapes or non-UTF-8 results.
fn unescape(component: &str) -> Result<String, Error> {
    let bytes = component.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = component.get(i + 1..i + 3).ok_or(Error::MalformedUri)?;
            out.push(u8::from_str_radix(hex, 16).map_err(|_| Error::MalformedUri)?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).map_err(|_| Error::MalformedUri)
}

/// The parts of a `coap://` URI that a request needs.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RequestUri {
    /// Host name or IP literal, without brackets.
    pub host: String,

    /// Destination port; the CoAP default when the URI has none.
    pub port: u16,

    /// Decoded path segments, one per Uri-Path option.
    pub path: Vec<String>,

    /// Decoded query parameters, one per Uri-Query option.
    pub query: Vec<String>,
}

impl RequestUri {
    /// Splits `uri` into its components.
    ///
    /// A URI without a scheme is taken to be `coap://`. Any scheme other
    /// than `coap` (including `coaps`) fails with
    /// [`Error::UnsupportedUriScheme`].
    pub fn parse(uri: &str) -> Result<RequestUri, Error> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(Error::MalformedUri);
        }

        let with_scheme;
        let uri = match RFC3986_APPENDIX_B.captures(uri) {
            Some(ref caps)
                if caps.get(4).is_none()
                    && caps
                        .get(2)
                        .map_or(true, |m| !URI_CHECK_SCHEME.is_match(m.as_str())) =>
            {
                with_scheme = format!("{}://{}", URI_SCHEME_COAP, uri.trim_start_matches('/'));
                with_scheme.as_str()
            }
            _ => uri,
        };

        let caps = RFC3986_APPENDIX_B
            .captures(uri)
            .ok_or(Error::MalformedUri)?;

        let scheme = caps.get(2).map(|m| m.as_str()).ok_or(Error::MalformedUri)?;
        if !URI_CHECK_SCHEME.is_match(scheme) {
            return Err(Error::MalformedUri);
        }
        if !scheme.eq_ignore_ascii_case(URI_SCHEME_COAP) {
            debug!("unsupported scheme {:?}", scheme);
            return Err(Error::UnsupportedUriScheme);
        }

        let authority = caps.get(4).map(|m| m.as_str()).unwrap_or("");
        let auth_caps = URI_AUTHORITY
            .captures(authority)
            .ok_or(Error::MalformedUri)?;

        if auth_caps.get(2).is_some() {
            // CoAP URIs carry no userinfo.
            return Err(Error::MalformedUri);
        }

        let host = auth_caps.get(3).map(|m| m.as_str()).ok_or(Error::MalformedUri)?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let host = unescape(host)?;

        let port = match auth_caps.get(5).map(|m| m.as_str()) {
            None | Some("") => DEFAULT_PORT_COAP_UDP,
            Some(port) => port.parse::<u16>().map_err(|_| Error::MalformedUri)?,
        };

        let raw_path = caps.get(5).map(|m| m.as_str()).unwrap_or("");
        let path = if raw_path.is_empty() || raw_path == "/" {
            Vec::new()
        } else {
            raw_path
                .trim_start_matches('/')
                .split('/')
                .map(unescape)
                .collect::<Result<Vec<_>, _>>()?
        };

        let query = match caps.get(7).map(|m| m.as_str()) {
            None | Some("") => Vec::new(),
            Some(query) => query
                .split('&')
                .map(unescape)
                .collect::<Result<Vec<_>, _>>()?,
        };

        Ok(RequestUri {
            host,
            port,
            path,
            query,
        })
    }

    /// True if the host is an IP literal rather than a name.
    pub fn host_is_ip_literal(&self) -> bool {
        self.host.parse::<std::net::IpAddr>().is_ok()
    }
}

/// A CoAP request waiting to be submitted.
///
/// Built with one of the method constructors and refined with the builder
/// methods:
///
/// ```
/// # use async_coap_client::prelude::*;
/// let request = Request::post("coap://10.20.30.40/large-create")
///     .unwrap()
///     .non_confirmable()
///     .payload(&b"hello"[..]);
///
/// assert_eq!(request.uri().port, 5683);
/// assert_eq!(request.msg_type(), MsgType::Non);
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Request {
    method: MsgCode,
    msg_type: MsgType,
    uri: RequestUri,
    options: OptionSet,
    payload: Vec<u8>,
    token: Option<MsgToken>,
    observe: bool,
}

impl Request {
    /// Creates a confirmable request for `uri` with the given method.
    pub fn new(method: MsgCode, uri: &str) -> Result<Request, Error> {
        if !method.is_method() {
            return Err(Error::InvalidArgument);
        }

        let uri = RequestUri::parse(uri)?;
        let mut options = OptionSet::new();

        if !uri.host_is_ip_literal() && uri.host != ALL_COAP_DEVICES_HOSTNAME {
            options.insert(URI_HOST, uri.host.as_str())?;
        }
        for segment in uri.path.iter() {
            options.insert(URI_PATH, segment.as_str())?;
        }
        for param in uri.query.iter() {
            options.insert(URI_QUERY, param.as_str())?;
        }

        Ok(Request {
            method,
            msg_type: MsgType::Con,
            uri,
            options,
            payload: Vec::new(),
            token: None,
            observe: false,
        })
    }

    /// GET request.
    pub fn get(uri: &str) -> Result<Request, Error> {
        Request::new(MsgCode::GET, uri)
    }

    /// POST request.
    pub fn post(uri: &str) -> Result<Request, Error> {
        Request::new(MsgCode::POST, uri)
    }

    /// PUT request.
    pub fn put(uri: &str) -> Result<Request, Error> {
        Request::new(MsgCode::PUT, uri)
    }

    /// DELETE request.
    pub fn delete(uri: &str) -> Result<Request, Error> {
        Request::new(MsgCode::DELETE, uri)
    }

    /// GET request that registers an observation ([IETF-RFC7641]).
    ///
    /// [IETF-RFC7641]: https://tools.ietf.org/html/rfc7641
    pub fn observe(uri: &str) -> Result<Request, Error> {
        let mut request = Request::get(uri)?;
        request.options.set(OBSERVE, OBSERVE_REGISTER)?;
        request.observe = true;
        Ok(request)
    }

    /// Sends the request as CON (the default).
    pub fn confirmable(mut self) -> Self {
        self.msg_type = MsgType::Con;
        self
    }

    /// Sends the request as NON.
    pub fn non_confirmable(mut self) -> Self {
        self.msg_type = MsgType::Non;
        self
    }

    /// Sets the request body.
    pub fn payload<P: Into<Vec<u8>>>(mut self, payload: P) -> Self {
        self.payload = payload.into();
        self
    }

    /// Uses a caller-chosen token instead of a generated one.
    pub fn token(mut self, token: MsgToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Uses a caller-chosen token given as raw bytes. Fails if longer than 8 bytes.
    pub fn token_bytes(self, token: &[u8]) -> Result<Self, Error> {
        Ok(self.token(MsgToken::try_from(token)?))
    }

    /// Adds an option.
    pub fn option<'a, T>(mut self, key: OptionKey<T>, value: T) -> Result<Self, Error>
    where
        T: Into<OptionValue<'a>>,
    {
        self.options.insert(key, value)?;
        Ok(self)
    }

    /// Sets the Content-Format of the payload.
    pub fn content_format(mut self, format: ContentFormat) -> Result<Self, Error> {
        self.options.set(CONTENT_FORMAT, format)?;
        Ok(self)
    }

    /// The request method.
    pub fn method(&self) -> MsgCode {
        self.method
    }

    /// CON or NON.
    pub fn msg_type(&self) -> MsgType {
        self.msg_type
    }

    /// The parsed URI.
    pub fn uri(&self) -> &RequestUri {
        &self.uri
    }

    /// Options that will be sent, excluding any the engine adds.
    pub fn options(&self) -> &OptionSet {
        &self.options
    }

    /// The request body.
    pub fn payload_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// The caller-chosen token, if any.
    pub fn explicit_token(&self) -> Option<MsgToken> {
        self.token
    }

    /// True for an observe registration.
    pub fn is_observe(&self) -> bool {
        self.observe
    }

    /// Builds the first message of this request.
    pub(crate) fn to_message(&self, msg_id: MsgId, token: MsgToken) -> Message {
        let mut msg = Message::new(self.msg_type, self.method, msg_id, token);
        msg.options = self.options.clone();
        msg.payload = self.payload.clone();
        msg
    }
}
