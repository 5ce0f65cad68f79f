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
use std::collections::HashMap;
use std::hash::Hash;

/// Maps message ids and tokens of outstanding requests to their exchanges.
///
/// Entries for multicast destinations are keyed without an address, so
/// that replies from any responder match them.
#[derive(Debug)]
pub(crate) struct ResponseTracker<SA: SocketAddrExt> {
    msg_id_map: HashMap<(MsgId, Option<SA>), ExchangeHandle>,
    msg_token_map: HashMap<(MsgToken, Option<SA>), ExchangeHandle>,

    // Number of map entries per id/token, regardless of address.
    live_msg_ids: HashMap<MsgId, usize>,
    live_tokens: HashMap<MsgToken, usize>,
}

fn retain<K: Eq + Hash>(live: &mut HashMap<K, usize>, key: K) {
    *live.entry(key).or_insert(0) += 1;
}

fn release<K: Eq + Hash>(live: &mut HashMap<K, usize>, key: K) {
    if let Some(count) = live.get_mut(&key) {
        *count -= 1;
        if *count == 0 {
            live.remove(&key);
        }
    }
}

fn key_addr<SA: SocketAddrExt>(socket_addr: SA) -> Option<SA> {
    if socket_addr.is_multicast() {
        None
    } else {
        Some(socket_addr)
    }
}

impl<SA: SocketAddrExt> ResponseTracker<SA> {
    pub fn new() -> Self {
        ResponseTracker {
            msg_id_map: HashMap::new(),
            msg_token_map: HashMap::new(),
            live_msg_ids: HashMap::new(),
            live_tokens: HashMap::new(),
        }
    }

    pub fn add_msg_id(&mut self, msg_id: MsgId, socket_addr: SA, handle: ExchangeHandle) {
        trace!("tracking msg_id:{:04X} for {}", msg_id, handle);
        if self
            .msg_id_map
            .insert((msg_id, key_addr(socket_addr)), handle)
            .is_none()
        {
            retain(&mut self.live_msg_ids, msg_id);
        }
    }

    pub fn add_token(&mut self, msg_token: MsgToken, socket_addr: SA, handle: ExchangeHandle) {
        info!("Adding response handler: msg_token:{} for {}", msg_token, handle);
        if self
            .msg_token_map
            .insert((msg_token, key_addr(socket_addr)), handle)
            .is_none()
        {
            retain(&mut self.live_tokens, msg_token);
        }
    }

    pub fn remove_msg_id(&mut self, msg_id: MsgId, socket_addr: SA) {
        if self
            .msg_id_map
            .remove(&(msg_id, key_addr(socket_addr)))
            .is_some()
        {
            release(&mut self.live_msg_ids, msg_id);
        }
    }

    pub fn remove_token(&mut self, msg_token: MsgToken, socket_addr: SA) {
        if self
            .msg_token_map
            .remove(&(msg_token, key_addr(socket_addr)))
            .is_some()
        {
            release(&mut self.live_tokens, msg_token);
        }
    }

    /// Finds the exchange waiting for an ACK or reset with `msg_id` from `socket_addr`.
    pub fn match_msg_id(&self, msg_id: MsgId, socket_addr: SA) -> Option<ExchangeHandle> {
        self.msg_id_map
            .get(&(msg_id, Some(socket_addr)))
            .or_else(|| self.msg_id_map.get(&(msg_id, None)))
            .copied()
    }

    /// Finds the exchange expecting a response with `msg_token` from `socket_addr`.
    pub fn match_token(&self, msg_token: MsgToken, socket_addr: SA) -> Option<ExchangeHandle> {
        self.msg_token_map
            .get(&(msg_token, Some(socket_addr)))
            .or_else(|| self.msg_token_map.get(&(msg_token, None)))
            .copied()
    }

    pub fn token_in_use(&self, msg_token: MsgToken) -> bool {
        self.live_tokens.contains_key(&msg_token)
    }

    pub fn msg_id_in_use(&self, msg_id: MsgId) -> bool {
        self.live_msg_ids.contains_key(&msg_id)
    }
}
