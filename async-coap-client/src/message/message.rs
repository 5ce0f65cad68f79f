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

use super::*;

/// An owned CoAP message.
///
/// The version field is implied: it is always 1 on the wire, see [`codec`].
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct Message {
    /// Message type (CON, NON, ACK, RES).
    pub msg_type: MsgType,

    /// Request method or response code.
    pub code: MsgCode,

    /// Message id, used for deduplication and to match ACKs and resets.
    pub msg_id: MsgId,

    /// Token, used to match responses to requests.
    pub token: MsgToken,

    /// Options, always in wire order.
    pub options: OptionSet,

    /// Payload; empty means no payload marker on the wire.
    pub payload: Vec<u8>,
}

impl Message {
    /// Creates a message with no options and no payload.
    pub fn new(msg_type: MsgType, code: MsgCode, msg_id: MsgId, token: MsgToken) -> Message {
        Message {
            msg_type,
            code,
            msg_id,
            token,
            options: OptionSet::new(),
            payload: Vec::new(),
        }
    }

    /// An empty acknowledgement for `msg_id`.
    pub fn ack(msg_id: MsgId) -> Message {
        Message::new(MsgType::Ack, MsgCode::EMPTY, msg_id, MsgToken::EMPTY)
    }

    /// A reset for `msg_id`.
    pub fn reset(msg_id: MsgId) -> Message {
        Message::new(MsgType::Res, MsgCode::EMPTY, msg_id, MsgToken::EMPTY)
    }

    /// Serializes this message. Shorthand for [`codec::encode`].
    pub fn to_bytes(&self) -> Vec<u8> {
        codec::encode(self)
    }

    /// Parses a datagram. Shorthand for [`codec::decode`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Message, DecodeError> {
        codec::decode(bytes)
    }

    /// True for an empty (code 0.00) message: a ping, an empty ACK or a reset.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// The decoded Block1 option, if present and valid.
    pub fn block1(&self) -> Option<BlockInfo> {
        self.options.get(BLOCK1)
    }

    /// The decoded Block2 option, if present and valid.
    pub fn block2(&self) -> Option<BlockInfo> {
        self.options.get(BLOCK2)
    }

    /// The Observe sequence number (or register/deregister value in a request).
    pub fn observe(&self) -> Option<u32> {
        self.options.get(OBSERVE)
    }

    /// The Content-Format option, if present.
    pub fn content_format(&self) -> Option<ContentFormat> {
        self.options.get(CONTENT_FORMAT)
    }

    /// The payload as UTF-8, if it is valid UTF-8.
    pub fn payload_as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Every Uri-Path segment joined with `/`, with a leading `/`.
    pub fn uri_path(&self) -> String {
        let mut path = String::new();
        for segment in self.options.get_all(URI_PATH) {
            path.push('/');
            path.push_str(segment);
        }
        if path.is_empty() {
            path.push('/');
        }
        path
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{:?} {}", self.msg_type, self.code)?;
        write!(f, " MID:{:04X}", self.msg_id)?;

        if !self.token.is_empty() {
            write!(f, " TOK:{}", self.token)?;
        }

        for (number, bytes) in self.options.iter() {
            f.write_str(" ")?;
            number.fmt_with_value(f, bytes)?;
        }

        if !self.payload.is_empty() {
            let is_text = self.content_format().map_or(true, ContentFormat::is_utf8);
            match self.payload_as_str() {
                Some(payload) if is_text => write!(f, " {:?}", payload)?,
                _ => write!(f, " {:02x?}", self.payload)?,
            }
        }

        f.write_str(">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let mut msg = Message::new(
            MsgType::Con,
            MsgCode::GET,
            0x1A2B,
            MsgToken::new(&[1, 2]).unwrap(),
        );
        msg.options.insert(URI_PATH, "test").unwrap();
        msg.payload = b"payload".to_vec();

        assert_eq!(
            msg.to_string(),
            r#"<Con GET MID:1A2B TOK:0102 Uri-Path:"test" "payload">"#
        );
        assert_eq!(Message::reset(7).to_string(), "<Res Empty MID:0007>");
    }

    #[test]
    fn clone_is_independent() {
        let mut original = Message::new(MsgType::Non, MsgCode::CONTENT, 1, MsgToken::EMPTY);
        original.payload = b"one".to_vec();

        let mut copy = original.clone();
        copy.payload.push(b'!');
        copy.options.insert(URI_PATH, "x").unwrap();

        assert_eq!(original.payload, b"one".to_vec());
        assert!(original.options.is_empty());
        assert_eq!(copy.uri_path(), "/x");
        assert_eq!(original.uri_path(), "/");
    }
}
