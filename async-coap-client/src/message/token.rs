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

use crate::util::encode_u32;
use crate::Error;
use core::convert::TryFrom;
use core::ops::Deref;

/// Type for holding the value of a CoAP message token.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, Ord, PartialOrd)]
pub struct MsgToken {
    len: u8,
    bytes: [u8; 8],
}

impl MsgToken {
    /// Constant representing an empty token.
    pub const EMPTY: MsgToken = MsgToken {
        len: 0u8,
        bytes: [0; 8],
    };

    /// Maximum length of a token, in bytes.
    pub const MAX_LEN: usize = 8;

    /// Creates a new token from the given byte slice, or `None` if the slice
    /// is longer than [`MsgToken::MAX_LEN`].
    pub fn new(x: &[u8]) -> Option<MsgToken> {
        if x.len() > Self::MAX_LEN {
            return None;
        }
        let mut bytes = [0u8; 8];
        bytes[..x.len()].copy_from_slice(x);
        Some(MsgToken {
            len: x.len() as u8,
            bytes,
        })
    }

    /// Returns the length of this token.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns true if the length of this token is zero.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a byte slice containing this token.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

impl std::fmt::Display for MsgToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.as_bytes() {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl Default for MsgToken {
    fn default() -> Self {
        MsgToken::EMPTY
    }
}

impl Deref for MsgToken {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_bytes()
    }
}

impl core::cmp::PartialEq<[u8]> for MsgToken {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl core::convert::From<u32> for MsgToken {
    fn from(x: u32) -> Self {
        let mut buffer = [0u8; 4];
        let encoded = encode_u32(x, &mut buffer);
        let mut bytes = [0u8; 8];
        bytes[..encoded.len()].copy_from_slice(encoded);
        MsgToken {
            len: encoded.len() as u8,
            bytes,
        }
    }
}

impl TryFrom<&[u8]> for MsgToken {
    type Error = Error;

    fn try_from(x: &[u8]) -> Result<Self, Self::Error> {
        MsgToken::new(x).ok_or(Error::InvalidArgument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction() {
        let token = MsgToken::new(b"abc").unwrap();
        assert_eq!(token.len(), 3);
        assert_eq!(&token, &b"abc"[..]);
        assert_eq!(token.to_string(), "616263");
        assert!(MsgToken::new(&[0; 9]).is_none());
        assert_eq!(MsgToken::try_from(&[0u8; 9][..]), Err(Error::InvalidArgument));
        assert_eq!(MsgToken::from(0x0102u32).as_bytes(), &[1, 2]);
        assert!(MsgToken::from(0u32).is_empty());
    }
}
