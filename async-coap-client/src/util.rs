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

/// Encodes an unsigned 32-bit number into the given buffer using the
/// big-endian, minimal-length form CoAP uses for `uint` option values.
/// The returned slice is only as large as it needs to be and is empty
/// for zero.
pub fn encode_u32(value: u32, dst: &mut [u8; 4]) -> &[u8] {
    let bytes = value.to_be_bytes();
    let skip = (value.leading_zeros() / 8) as usize;
    let len = 4 - skip;
    dst[..len].copy_from_slice(&bytes[skip..]);
    &dst[..len]
}

/// Owned variant of [`encode_u32`].
pub fn encode_u32_vec(value: u32) -> Vec<u8> {
    let mut buffer = [0u8; 4];
    encode_u32(value, &mut buffer).to_vec()
}

/// Attempts to decode the given big-endian-encoded integer to a `u32`.
/// Input may be up to four bytes long. If the input is larger than four
/// bytes long, returns `None`.
pub fn try_decode_u32(src: &[u8]) -> Option<u32> {
    if src.len() > 4 {
        return None;
    }
    Some(src.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32))
}

/// Attempts to decode the given big-endian-encoded integer to a `u16`.
/// Input may be up to two bytes long. If the input is larger than two
/// bytes long, returns `None`.
pub fn try_decode_u16(src: &[u8]) -> Option<u16> {
    if src.len() > 2 {
        return None;
    }
    try_decode_u32(src).map(|x| x as u16)
}

#[cfg(test)]
mod tests {
    use crate::util::*;

    #[test]
    fn minimal_length() {
        assert_eq!(encode_u32_vec(0xF0AF0010).len(), 4);
        assert_eq!(encode_u32_vec(0x300010).len(), 3);
        assert_eq!(encode_u32_vec(0x5010).len(), 2);
        assert_eq!(encode_u32_vec(0x80).len(), 1);
        assert!(encode_u32_vec(0).is_empty());
    }

    #[test]
    fn encode_decode_u32() {
        for i in vec![
            0x00, 0x01, 0x0FF, 0x100, 0x0FFFF, 0x10000, 0x0FFFFFF, 0x1000000, 0xFFFFFFFF,
        ] {
            assert_eq!(try_decode_u32(encode_u32(i, &mut [0; 4])).unwrap(), i);
        }

        assert_eq!(try_decode_u32(&[0; 5]), None);
    }

    #[test]
    fn decode_u16() {
        assert_eq!(try_decode_u16(&[]), Some(0));
        assert_eq!(try_decode_u16(&[0x12, 0x34]), Some(0x1234));
        assert_eq!(try_decode_u16(&[0; 3]), None);
    }
}
