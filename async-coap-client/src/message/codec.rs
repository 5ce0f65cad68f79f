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

//! Low-level message codec functions.
//!
//! [`encode`] and [`decode`] convert between [`Message`] and the RFC 7252
//! datagram layout. The option helpers are public so that callers can
//! size or inspect option runs without building a whole message.

use super::option::*;
use super::*;

/// Calculates the encoded size of a CoAP option.
pub fn calc_option_size(prev_key: OptionNumber, key: OptionNumber, mut value_len: usize) -> usize {
    if value_len >= 269 {
        value_len += 2;
    } else if value_len >= 13 {
        value_len += 1;
    }

    let option_delta = key.0.saturating_sub(prev_key.0);

    if option_delta >= 269 {
        value_len += 3;
    } else if option_delta >= 13 {
        value_len += 2;
    } else {
        value_len += 1;
    }

    value_len
}

fn split_extended(value: usize) -> (u8, Option<[u8; 2]>, usize) {
    if value >= 269 {
        let ext = (value - 269) as u16;
        (14, Some(ext.to_be_bytes()), 2)
    } else if value >= 13 {
        (13, Some([(value - 13) as u8, 0]), 1)
    } else {
        (value as u8, None, 0)
    }
}

/// Appends one option to `buffer`, delta-encoded against `prev_key`.
///
/// Options must be encoded in ascending order, so `key` may not be smaller
/// than `prev_key`.
pub fn encode_option(
    buffer: &mut Vec<u8>,
    prev_key: OptionNumber,
    key: OptionNumber,
    value: &[u8],
) -> Result<(), Error> {
    if prev_key > key {
        return Err(Error::InvalidArgument);
    }

    if value.len() > MAX_OPTION_VALUE_SIZE {
        warn!("value_len:{}, max:{}", value.len(), MAX_OPTION_VALUE_SIZE);
        return Err(Error::InvalidArgument);
    }

    let (delta_nibble, delta_ext, delta_ext_len) = split_extended((key.0 - prev_key.0) as usize);
    let (len_nibble, len_ext, len_ext_len) = split_extended(value.len());

    buffer.reserve(calc_option_size(prev_key, key, value.len()));
    buffer.push((delta_nibble << 4) | len_nibble);
    if let Some(ext) = delta_ext {
        buffer.extend_from_slice(&ext[..delta_ext_len]);
    }
    if let Some(ext) = len_ext {
        buffer.extend_from_slice(&ext[..len_ext_len]);
    }
    buffer.extend_from_slice(value);

    Ok(())
}

/// Decodes one option from a `core::slice::Iter`, which can be obtained from a byte slice.
/// The iterator is then advanced to the next option.
///
/// Will return `Ok(None)` if it either encounters the end-of-options marker (0xFF) or if the
/// given iterator has been fully consumed. The marker itself is consumed.
pub fn decode_option<'a>(
    iter: &mut core::slice::Iter<'a, u8>,
    last_option: OptionNumber,
) -> Result<Option<(OptionNumber, &'a [u8])>, DecodeError> {
    macro_rules! try_next {
        ($iter:expr, $none:expr) => {
            match ($iter).next() {
                Some(x) => *x,
                None => return $none,
            }
        };
    }

    let header: u8 = try_next!(iter, Ok(None));

    if header == 0xFF {
        // End of options marker.
        return Ok(None);
    }

    let key_delta: u16 = match header >> 4 {
        13 => 13u16 + try_next!(iter, Err(DecodeError::TruncatedOption)) as u16,
        14 => {
            let msb = try_next!(iter, Err(DecodeError::TruncatedOption)) as u32;
            let lsb = try_next!(iter, Err(DecodeError::TruncatedOption)) as u32;
            let delta = 269 + (msb << 8) + lsb;
            if delta > core::u16::MAX as u32 {
                return Err(DecodeError::InvalidOptionDelta);
            }
            delta as u16
        }
        15 => return Err(DecodeError::InvalidOptionDelta),
        key => key as u16,
    };

    let len = match header & 0xF {
        13 => 13 + try_next!(iter, Err(DecodeError::TruncatedOption)) as usize,
        14 => {
            let msb = try_next!(iter, Err(DecodeError::TruncatedOption)) as usize;
            269 + (msb << 8) + try_next!(iter, Err(DecodeError::TruncatedOption)) as usize
        }
        15 => return Err(DecodeError::InvalidOptionLength),
        len => len as usize,
    };

    if last_option.0 > core::u16::MAX - key_delta {
        // Don't let the key wrap.
        return Err(DecodeError::InvalidOptionDelta);
    }

    let rest = iter.as_slice();
    if rest.len() < len {
        return Err(DecodeError::TruncatedOption);
    }

    let value: &'a [u8] = &rest[..len];
    *iter = rest[len..].iter();

    Ok(Some((OptionNumber(last_option.0 + key_delta), value)))
}

/// Reads the fixed header and token of a datagram without looking at the
/// options or payload.
///
/// Returns `None` if the version is not 1 or the header and token are not
/// complete. Used to match a datagram whose body fails to decode.
pub fn peek_header(bytes: &[u8]) -> Option<(MsgType, MsgId, MsgToken)> {
    if bytes.len() < 4 {
        return None;
    }

    if (bytes[0] & COAP_MSG_VER_MASK) >> COAP_MSG_VER_OFFS != COAP_VERSION {
        return None;
    }

    let msg_type = MsgType::from_bits((bytes[0] & COAP_MSG_T_MASK) >> COAP_MSG_T_OFFS);
    let tkl = ((bytes[0] & COAP_MSG_TKL_MASK) >> COAP_MSG_TKL_OFFS) as usize;
    let msg_id = u16::from_be_bytes([bytes[2], bytes[3]]);
    let token = MsgToken::new(bytes.get(4..4 + tkl)?)?;

    Some((msg_type, msg_id, token))
}

/// Serializes `msg` into a new datagram.
pub fn encode(msg: &Message) -> Vec<u8> {
    let token = msg.token.as_bytes();
    let mut buffer = Vec::with_capacity(4 + token.len() + msg.payload.len() + 16);

    buffer.push(
        (COAP_VERSION << COAP_MSG_VER_OFFS)
            | ((msg.msg_type as u8) << COAP_MSG_T_OFFS)
            | ((token.len() as u8) << COAP_MSG_TKL_OFFS),
    );
    buffer.push(msg.code.0);
    buffer.extend_from_slice(&msg.msg_id.to_be_bytes());
    buffer.extend_from_slice(token);

    let mut prev_key = OptionNumber::default();
    for (key, value) in msg.options.iter() {
        // `OptionSet` keeps its entries sorted and bounded, so this cannot fail.
        if let Err(e) = encode_option(&mut buffer, prev_key, key, value) {
            warn!("skipping option {}: {:?}", key, e);
            continue;
        }
        prev_key = key;
    }

    if !msg.payload.is_empty() {
        buffer.push(0xFF);
        buffer.extend_from_slice(&msg.payload);
    }

    buffer
}

/// Parses a datagram into a [`Message`].
pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    if bytes.len() < 4 {
        return Err(DecodeError::IncompleteHeader);
    }

    if (bytes[0] & COAP_MSG_VER_MASK) >> COAP_MSG_VER_OFFS != COAP_VERSION {
        return Err(DecodeError::UnsupportedVersion);
    }

    let tkl = ((bytes[0] & COAP_MSG_TKL_MASK) >> COAP_MSG_TKL_OFFS) as usize;
    if tkl > MsgToken::MAX_LEN {
        return Err(DecodeError::InvalidTokenLength);
    }

    let token = bytes
        .get(4..4 + tkl)
        .and_then(MsgToken::new)
        .ok_or(DecodeError::IncompleteHeader)?;

    let mut msg = Message::new(
        MsgType::from_bits((bytes[0] & COAP_MSG_T_MASK) >> COAP_MSG_T_OFFS),
        MsgCode(bytes[1]),
        u16::from_be_bytes([bytes[2], bytes[3]]),
        token,
    );

    let mut iter = bytes[4 + tkl..].iter();
    let mut last_option = OptionNumber::default();

    loop {
        if iter.as_slice().first() == Some(&0xFF) {
            let payload = &iter.as_slice()[1..];
            if payload.is_empty() {
                return Err(DecodeError::PayloadMarkerWithEmptyPayload);
            }
            msg.payload = payload.to_vec();
            break;
        }

        match decode_option(&mut iter, last_option)? {
            Some((key, value)) => {
                msg.options
                    .insert_raw(key, value)
                    .map_err(|_| DecodeError::InvalidOptionLength)?;
                last_option = key;
            }
            None => break,
        }
    }

    Ok(msg)
}
