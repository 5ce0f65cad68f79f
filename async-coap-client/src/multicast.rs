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

//! Demultiplexing of responses to a multicast request.

use super::*;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

/// What the engine should do with one responder's reply.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) enum MulticastStep {
    /// The (possibly reassembled) response is ready.
    Complete,

    /// Ask this responder for the given block.
    FollowUp(BlockInfo),

    /// This responder's partial response was discarded.
    Dropped(Error),
}

#[derive(Debug, Default)]
struct Responder {
    reconstructor: Option<BlockReconstructor>,

    // When the block asked for by the last follow-up is overdue.
    deadline: Option<Instant>,
}

impl Responder {
    fn reset(&mut self) {
        self.reconstructor = None;
        self.deadline = None;
    }
}

/// Per-responder state of a multicast exchange, keyed by responder host.
#[derive(Debug)]
pub(crate) struct MulticastState<H: Eq + Hash> {
    responders: HashMap<H, Responder>,
}

impl<H: Eq + Hash + Copy> MulticastState<H> {
    pub fn new() -> MulticastState<H> {
        MulticastState {
            responders: HashMap::new(),
        }
    }

    #[cfg(test)]
    /// Number of distinct responders seen so far.
    pub fn responder_count(&self) -> usize {
        self.responders.len()
    }

    /// Feeds one reply from `sender`. When a blockwise response completes,
    /// `msg` is rewritten to carry the whole payload.
    ///
    /// A responder's first block may have any number; reassembly continues
    /// from there.
    pub fn accept(&mut self, sender: H, msg: &mut Message) -> MulticastStep {
        let responder = self.responders.entry(sender).or_default();
        responder.deadline = None;

        let block = match msg.block2() {
            Some(block) if block.more_flag() || responder.reconstructor.is_some() => block,
            _ => return MulticastStep::Complete,
        };

        let reconstructor = responder
            .reconstructor
            .get_or_insert_with(BlockReconstructor::from_any_block);

        match reconstructor.feed(block, &msg.payload) {
            Err(e) => {
                responder.reset();
                MulticastStep::Dropped(e)
            }
            Ok(false) => match reconstructor.next_block() {
                Some(next) => MulticastStep::FollowUp(next),
                None => {
                    responder.reset();
                    MulticastStep::Dropped(Error::RequestEntityIncomplete)
                }
            },
            Ok(true) => {
                if let Some(reconstructor) = responder.reconstructor.take() {
                    msg.payload = reconstructor.into_inner();
                }
                msg.options.remove(OptionNumber::BLOCK2);
                MulticastStep::Complete
            }
        }
    }

    /// Records that the next block from `sender` is due by `deadline`.
    pub fn await_block(&mut self, sender: H, deadline: Instant) {
        if let Some(responder) = self.responders.get_mut(&sender) {
            if responder.reconstructor.is_some() {
                responder.deadline = Some(deadline);
            }
        }
    }

    /// Earliest deadline of any responder with a follow-up in flight.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.responders.values().filter_map(|r| r.deadline).min()
    }

    /// Discards the partial responses of every responder whose block is
    /// overdue at `now`, returning those responders.
    pub fn expire(&mut self, now: Instant) -> Vec<H> {
        let mut expired = Vec::new();
        for (sender, responder) in self.responders.iter_mut() {
            match responder.deadline {
                Some(deadline) if deadline <= now => {
                    responder.reset();
                    expired.push(*sender);
                }
                _ => (),
            }
        }
        expired
    }
}
