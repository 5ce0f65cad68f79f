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

//! Client side of resource observation ([IETF-RFC7641]).
//!
//! [IETF-RFC7641]: https://tools.ietf.org/html/rfc7641

use super::*;
use std::time::{Duration, Instant};

/// How long a notification sequence number stays authoritative. After this,
/// any sequence number is accepted as newer.
pub const OBSERVE_FRESHNESS_WINDOW: Duration = Duration::from_secs(128);

const SEQ_MASK: u32 = (1 << 24) - 1;
const SEQ_HALF: u32 = 1 << 23;

/// Returns true if notification sequence `new` is newer than `last`, which
/// was received at `last_at`.
///
/// Sequence numbers are 24 bits wide and wrap, so "newer" means less than
/// half the sequence space ahead.
pub fn is_fresh(new: u32, last: u32, last_at: Instant, now: Instant) -> bool {
    let diff = new.wrapping_sub(last) & SEQ_MASK;
    (diff != 0 && diff < SEQ_HALF) || now.saturating_duration_since(last_at) > OBSERVE_FRESHNESS_WINDOW
}

/// What the engine should do with a reply on an observation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) enum ObserveStep {
    /// Hand the (possibly reassembled) message to the application. `last`
    /// is set when the server ended or declined the observation.
    Deliver { last: bool },

    /// Ask for the given block of the notification being reassembled.
    FollowUp(BlockInfo),

    /// Out of order or stale; drop without a trace.
    Stale,

    /// Reassembly failed.
    Fail(Error),
}

#[derive(Debug)]
struct PendingNotification {
    seq: u32,
    reconstructor: BlockReconstructor,
}

/// Sequence tracking and blockwise reassembly for one observation.
#[derive(Debug, Default)]
pub(crate) struct ObserveState {
    last: Option<(u32, Instant)>,
    pending: Option<PendingNotification>,
}

impl ObserveState {
    pub fn new() -> ObserveState {
        ObserveState::default()
    }

    fn fresh(&self, seq: u32, now: Instant) -> bool {
        match self.last {
            None => true,
            Some((last, at)) => is_fresh(seq, last, at, now),
        }
    }

    /// Classifies `msg`, rewriting it into the deliverable notification
    /// when a blockwise one completes.
    pub fn accept(&mut self, msg: &mut Message, now: Instant) -> ObserveStep {
        let block = msg.block2();

        let seq = match msg.observe() {
            Some(seq) => seq,
            None => {
                if let (Some(block), true) = (block, self.pending.is_some()) {
                    if block.num() > 0 {
                        return self.continue_pending(block, msg, now);
                    }
                }
                // The server declined or ended the observation.
                self.pending = None;
                return ObserveStep::Deliver { last: true };
            }
        };

        if !self.fresh(seq, now) {
            return ObserveStep::Stale;
        }

        match block {
            Some(block) if block.more_flag() => {
                let mut reconstructor = BlockReconstructor::new();
                if let Err(e) = reconstructor.feed(block, &msg.payload) {
                    return ObserveStep::Fail(e);
                }
                let next = match reconstructor.next_block() {
                    Some(next) => next,
                    None => return ObserveStep::Fail(Error::RequestEntityIncomplete),
                };
                if let Some(stale) = self.pending.take() {
                    debug!("notification {} replaces partial {}", seq, stale.seq);
                }
                self.pending = Some(PendingNotification { seq, reconstructor });
                ObserveStep::FollowUp(next)
            }
            _ => {
                self.pending = None;
                self.last = Some((seq, now));
                ObserveStep::Deliver { last: false }
            }
        }
    }

    fn continue_pending(&mut self, block: BlockInfo, msg: &mut Message, now: Instant) -> ObserveStep {
        let mut pending = match self.pending.take() {
            Some(pending) => pending,
            None => return ObserveStep::Stale,
        };

        match pending.reconstructor.feed(block, &msg.payload) {
            Err(e) => ObserveStep::Fail(e),
            Ok(false) => match pending.reconstructor.next_block() {
                Some(next) => {
                    self.pending = Some(pending);
                    ObserveStep::FollowUp(next)
                }
                None => ObserveStep::Fail(Error::RequestEntityIncomplete),
            },
            Ok(true) => {
                if !self.fresh(pending.seq, now) {
                    return ObserveStep::Stale;
                }
                msg.payload = pending.reconstructor.into_inner();
                msg.options.remove(OptionNumber::BLOCK2);
                if msg.options.set(OBSERVE, pending.seq).is_err() {
                    return ObserveStep::Fail(Error::BadOption);
                }
                self.last = Some((pending.seq, now));
                ObserveStep::Deliver { last: false }
            }
        }
    }
}
