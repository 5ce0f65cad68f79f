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
use rand::Rng;
use std::time::Duration;

/// Engine-wide [CoAP transmission parameters][tp].
///
/// Every setter validates its input; a rejected value leaves the previous
/// one in place and returns [`Error::InvalidArgument`].
///
/// [tp]: https://tools.ietf.org/html/rfc7252#section-4.8
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TransParams {
    ack_timeout: Duration,
    ack_random_factor: f64,
    max_retransmit: u32,
    block_size: usize,
}

impl TransParams {
    /// Default `ACK_TIMEOUT`.
    pub const COAP_ACK_TIMEOUT: Duration = Duration::from_secs(2);

    /// Default `ACK_RANDOM_FACTOR`.
    pub const COAP_ACK_RANDOM_FACTOR: f64 = 1.5;

    /// Default `MAX_RETRANSMIT`.
    pub const COAP_MAX_RETRANSMIT: u32 = 4;

    /// Largest accepted `MAX_RETRANSMIT`. Keeps the doubled intervals well
    /// inside the range of [`Duration`].
    pub const MAX_RETRANSMIT_LIMIT: u32 = 25;

    /// Largest accepted `ACK_TIMEOUT`. Together with
    /// [`TransParams::MAX_ACK_RANDOM_FACTOR`] and
    /// [`TransParams::MAX_RETRANSMIT_LIMIT`] this keeps every derived
    /// duration and deadline representable.
    pub const MAX_ACK_TIMEOUT: Duration = Duration::from_secs(60 * 60);

    /// Largest accepted `ACK_RANDOM_FACTOR`.
    pub const MAX_ACK_RANDOM_FACTOR: f64 = 16.0;

    /// From RFC7252:
    ///
    /// > `MAX_LATENCY` is the maximum time a datagram is expected to take
    /// > from the start of its transmission to the completion of its
    /// > reception. [...] We, also arbitrarily, define `MAX_LATENCY` to be
    /// > 100 seconds.
    pub const COAP_MAX_LATENCY: Duration = Duration::from_secs(100);

    /// The configured `ACK_TIMEOUT`.
    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    /// Changes `ACK_TIMEOUT`. Must be non-zero and no larger than
    /// [`TransParams::MAX_ACK_TIMEOUT`].
    pub fn set_ack_timeout(&mut self, value: Duration) -> Result<(), Error> {
        if value == Duration::from_secs(0) || value > Self::MAX_ACK_TIMEOUT {
            warn!("rejecting ack_timeout {:?}", value);
            return Err(Error::InvalidArgument);
        }
        self.ack_timeout = value;
        Ok(())
    }

    /// The configured `ACK_RANDOM_FACTOR`.
    pub fn ack_random_factor(&self) -> f64 {
        self.ack_random_factor
    }

    /// Changes `ACK_RANDOM_FACTOR`. Must be between 1.0 and
    /// [`TransParams::MAX_ACK_RANDOM_FACTOR`].
    pub fn set_ack_random_factor(&mut self, value: f64) -> Result<(), Error> {
        if !(1.0..=Self::MAX_ACK_RANDOM_FACTOR).contains(&value) {
            warn!("rejecting ack_random_factor {}", value);
            return Err(Error::InvalidArgument);
        }
        self.ack_random_factor = value;
        Ok(())
    }

    /// The configured `MAX_RETRANSMIT`.
    pub fn max_retransmit(&self) -> u32 {
        self.max_retransmit
    }

    /// Changes `MAX_RETRANSMIT`. Must not exceed [`TransParams::MAX_RETRANSMIT_LIMIT`].
    pub fn set_max_retransmit(&mut self, value: u32) -> Result<(), Error> {
        if value > Self::MAX_RETRANSMIT_LIMIT {
            warn!("rejecting max_retransmit {}", value);
            return Err(Error::InvalidArgument);
        }
        self.max_retransmit = value;
        Ok(())
    }

    /// Preferred block size in bytes. Zero disables blockwise requests.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Changes the preferred block size: 0, or a power of two from 16 to 1024.
    pub fn set_block_size(&mut self, value: usize) -> Result<(), Error> {
        if value != 0 && BlockInfo::szx_for_size(value).is_none() {
            warn!("rejecting block size {}", value);
            return Err(Error::InvalidArgument);
        }
        self.block_size = value;
        Ok(())
    }

    /// Size exponent of [`TransParams::block_size`], or `None` when blockwise
    /// requests are disabled.
    pub fn block_szx(&self) -> Option<u8> {
        BlockInfo::szx_for_size(self.block_size)
    }

    /// Picks the first retransmission timeout, uniformly between
    /// `ACK_TIMEOUT` and `ACK_TIMEOUT * ACK_RANDOM_FACTOR`.
    pub fn initial_timeout<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let jitter: f64 = rng.gen();
        self.ack_timeout
            .mul_f64(1.0 + jitter * (self.ack_random_factor - 1.0))
    }

    /// `PROCESSING_DELAY`, which RFC7252 sets equal to `ACK_TIMEOUT`.
    pub fn processing_delay(&self) -> Duration {
        self.ack_timeout
    }

    /// From RFC7252:
    ///
    /// > `MAX_TRANSMIT_SPAN` is the maximum time from the first transmission
    /// > of a Confirmable message to its last retransmission.
    /// >
    /// >> `ACK_TIMEOUT * ((2 ** MAX_RETRANSMIT) - 1) * ACK_RANDOM_FACTOR`
    pub fn max_transmit_span(&self) -> Duration {
        let intervals = ((1u64 << self.max_retransmit) - 1) as f64;
        self.ack_timeout
            .mul_f64(intervals * self.ack_random_factor)
    }

    /// How long a request may go unanswered before it times out: the
    /// passive wait for a NON request or a separate response.
    ///
    /// This is `MAX_TRANSMIT_WAIT` from RFC7252 with the random factor
    /// replaced by its expected value:
    ///
    /// >> `ACK_TIMEOUT * ((2 ** (MAX_RETRANSMIT + 1)) - 1) * (1 + ACK_RANDOM_FACTOR) / 2`
    pub fn max_transmit_wait(&self) -> Duration {
        let intervals = ((1u64 << (self.max_retransmit + 1)) - 1) as f64;
        self.ack_timeout
            .mul_f64(intervals * (1.0 + self.ack_random_factor) / 2.0)
    }

    /// From RFC7252:
    ///
    /// > `EXCHANGE_LIFETIME` is the time from starting to send a Confirmable
    /// > message to the time when an acknowledgement is no longer expected,
    /// > i.e., message-layer information about the message exchange can be
    /// > purged.
    /// >
    /// >> `MAX_TRANSMIT_SPAN + (2 * MAX_LATENCY) + PROCESSING_DELAY`
    pub fn exchange_lifetime(&self) -> Duration {
        self.max_transmit_span() + 2 * Self::COAP_MAX_LATENCY + self.processing_delay()
    }

    /// From RFC7252:
    ///
    /// > `NON_LIFETIME` is the time from sending a Non-confirmable message to
    /// > the time its Message ID can be safely reused.
    /// >
    /// >> `MAX_TRANSMIT_SPAN + MAX_LATENCY`
    pub fn non_lifetime(&self) -> Duration {
        self.max_transmit_span() + Self::COAP_MAX_LATENCY
    }
}

impl Default for TransParams {
    fn default() -> Self {
        TransParams {
            ack_timeout: Self::COAP_ACK_TIMEOUT,
            ack_random_factor: Self::COAP_ACK_RANDOM_FACTOR,
            max_retransmit: Self::COAP_MAX_RETRANSMIT,
            block_size: 0,
        }
    }
}
