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
use std::time::{Duration, Instant};

/// Opaque identifier of an exchange started by [`Engine::submit`].
///
/// Handles are allocated in increasing order and never reused by the engine
/// that issued them.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ExchangeHandle(pub(crate) u64);

impl std::fmt::Display for ExchangeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of an exchange.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ExchangeState {
    /// Created, nothing sent yet.
    Idle,

    /// A confirmable message is out and is being retransmitted until acknowledged.
    AwaitingAck,

    /// Waiting for a (separate or non-confirmable) response, or for the next notification.
    AwaitingResponse,

    /// A final response was delivered.
    Completed,

    /// Ended by [`Engine::abort`].
    Aborted,

    /// Ended because no reply arrived in time.
    TimedOut,
}

impl ExchangeState {
    /// True for the three states an exchange never leaves.
    pub fn is_terminal(self) -> bool {
        match self {
            ExchangeState::Completed | ExchangeState::Aborted | ExchangeState::TimedOut => true,
            _ => false,
        }
    }
}

/// The request message currently waiting for its reply.
#[derive(Debug, Clone)]
pub(crate) struct Outstanding<SA> {
    pub msg_id: MsgId,
    pub dest: SA,
    pub bytes: Vec<u8>,
    pub retransmits: u32,
    pub interval: Duration,
}

/// Per-kind state carried by an exchange.
#[derive(Debug)]
pub(crate) enum ExchangeKind<SA: SocketAddrExt> {
    Unicast,
    Observe(ObserveState),
    Multicast(MulticastState<SA::Host>),
}

/// Everything the engine knows about one exchange.
#[derive(Debug)]
pub(crate) struct Exchange<SA: SocketAddrExt> {
    pub handle: ExchangeHandle,
    pub token: MsgToken,
    pub dest: SA,
    pub request: Request,
    pub state: ExchangeState,
    pub kind: ExchangeKind<SA>,
    pub outstanding: Option<Outstanding<SA>>,
    pub timer_gen: u64,
    pub deadline: Option<Instant>,
    pub block1: Option<BlockSegmenter>,
    pub block2: Option<BlockReconstructor>,
    pub last_response_mid: Option<MsgId>,
}

impl<SA: SocketAddrExt> Exchange<SA> {
    pub fn new(
        handle: ExchangeHandle,
        token: MsgToken,
        dest: SA,
        request: Request,
        kind: ExchangeKind<SA>,
    ) -> Exchange<SA> {
        Exchange {
            handle,
            token,
            dest,
            request,
            state: ExchangeState::Idle,
            kind,
            outstanding: None,
            timer_gen: 0,
            deadline: None,
            block1: None,
            block2: None,
            last_response_mid: None,
        }
    }

    pub fn is_multicast(&self) -> bool {
        match self.kind {
            ExchangeKind::Multicast(_) => true,
            _ => false,
        }
    }

    pub fn is_observe(&self) -> bool {
        match self.kind {
            ExchangeKind::Observe(_) => true,
            _ => false,
        }
    }

    /// Records `msg_id` as the latest response and reports whether it
    /// repeats the previous one. Multicast replies are never treated as
    /// duplicates: every reply from every responder is delivered.
    pub fn check_duplicate(&mut self, msg_id: MsgId) -> bool {
        if self.is_multicast() {
            return false;
        }
        let duplicate = self.last_response_mid == Some(msg_id);
        self.last_response_mid = Some(msg_id);
        duplicate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn exchange(dest: &str, kind: ExchangeKind<SocketAddr>) -> Exchange<SocketAddr> {
        let dest: SocketAddr = dest.parse().unwrap();
        let request = Request::get(&format!("coap://{}/test", dest)).unwrap();
        Exchange::new(ExchangeHandle(1), MsgToken::from(1u32), dest, request, kind)
    }

    #[test]
    fn terminal_states() {
        assert!(!ExchangeState::Idle.is_terminal());
        assert!(!ExchangeState::AwaitingAck.is_terminal());
        assert!(!ExchangeState::AwaitingResponse.is_terminal());
        assert!(ExchangeState::Completed.is_terminal());
        assert!(ExchangeState::Aborted.is_terminal());
        assert!(ExchangeState::TimedOut.is_terminal());
        assert_eq!(ExchangeHandle(3).to_string(), "#3");
    }

    #[test]
    fn unicast_duplicates() {
        let mut ex = exchange("10.0.0.1:5683", ExchangeKind::Unicast);
        assert!(!ex.check_duplicate(10));
        assert!(ex.check_duplicate(10));
        assert!(!ex.check_duplicate(11));
        assert_eq!(ex.state, ExchangeState::Idle);
    }

    #[test]
    fn multicast_replies_are_never_duplicates() {
        let mut ex = exchange(
            "224.0.1.187:5683",
            ExchangeKind::Multicast(MulticastState::new()),
        );
        assert!(ex.is_multicast());
        assert!(!ex.check_duplicate(0xAD2F));
        assert!(!ex.check_duplicate(0xAD2F));
    }
}
