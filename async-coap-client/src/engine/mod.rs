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

//! The sans-IO protocol engine.
//!
//! [`Engine`] owns every live exchange and never touches a socket or a
//! clock. Callers feed it requests, inbound datagrams and the current time,
//! and drain three queues: datagrams to send ([`Engine::poll_transmit`]),
//! application events ([`Engine::poll_event`]) and the next deadline
//! ([`Engine::poll_timeout`]).
//!
//! Every exchange ends with exactly one [`Event::Finished`]. It may be
//! preceded by one [`Event::Error`] or by [`Event::Aborted`], and, for
//! observations and multicast requests, by any number of
//! [`Event::Notified`] or [`Event::MulticastResponse`] events.

use super::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

#[cfg(test)]
mod tests;

/// Bound on the number of remembered acknowledged responses.
const ACKED_MEMORY: usize = 256;

/// A datagram the engine wants sent.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Transmit<SA> {
    /// Where to send it.
    pub destination: SA,

    /// The encoded message.
    pub payload: Vec<u8>,
}

/// Application-visible outcome of exchange activity.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Event<SA> {
    /// The exchange is over. Carries the final response, if there was one.
    Finished {
        /// The exchange.
        handle: ExchangeHandle,

        /// Final response, or `None` after an abort, cancellation, timeout
        /// or transport-level failure.
        message: Option<Message>,
    },

    /// A notification on an observation.
    Notified {
        /// The exchange.
        handle: ExchangeHandle,

        /// The notification, reassembled if it was sent blockwise.
        message: Message,
    },

    /// The exchange failed. Always followed by `Finished`.
    Error {
        /// The exchange.
        handle: ExchangeHandle,

        /// What went wrong.
        error: Error,
    },

    /// The exchange was aborted by the application. Always followed by `Finished`.
    Aborted {
        /// The exchange.
        handle: ExchangeHandle,
    },

    /// One complete response to a multicast request.
    MulticastResponse {
        /// The exchange.
        handle: ExchangeHandle,

        /// The response, reassembled if it was sent blockwise.
        message: Message,

        /// The responder.
        sender: SA,
    },
}

impl<SA> Event<SA> {
    /// The exchange this event belongs to.
    pub fn handle(&self) -> ExchangeHandle {
        match self {
            Event::Finished { handle, .. }
            | Event::Notified { handle, .. }
            | Event::Error { handle, .. }
            | Event::Aborted { handle }
            | Event::MulticastResponse { handle, .. } => *handle,
        }
    }
}

/// Client-side CoAP protocol engine.
#[derive(Debug)]
pub struct Engine<SA: SocketAddrExt> {
    params: TransParams,
    rng: StdRng,
    next_handle: u64,
    next_msg_id: MsgId,
    exchanges: HashMap<ExchangeHandle, Exchange<SA>>,
    tracker: ResponseTracker<SA>,
    timers: TimerQueue,
    transmits: VecDeque<Transmit<SA>>,
    events: VecDeque<Event<SA>>,
    acked: VecDeque<(SA, MsgId, Instant)>,
}

impl<SA: SocketAddrExt> Default for Engine<SA> {
    fn default() -> Self {
        Engine::new()
    }
}

impl<SA: SocketAddrExt> Engine<SA> {
    /// Creates an engine with default parameters and an entropy-seeded RNG.
    pub fn new() -> Engine<SA> {
        Engine::with_rng(StdRng::from_entropy())
    }

    /// Creates an engine drawing tokens, message ids and retransmission
    /// jitter from `rng`.
    pub fn with_rng(mut rng: StdRng) -> Engine<SA> {
        let next_msg_id = rng.gen();
        Engine {
            params: TransParams::default(),
            rng,
            next_handle: 1,
            next_msg_id,
            exchanges: HashMap::new(),
            tracker: ResponseTracker::new(),
            timers: TimerQueue::new(),
            transmits: VecDeque::new(),
            events: VecDeque::new(),
            acked: VecDeque::new(),
        }
    }

    /// The transmission parameters.
    pub fn params(&self) -> &TransParams {
        &self.params
    }

    /// Mutable access to the transmission parameters. Changes apply to
    /// timers armed and requests submitted afterwards.
    pub fn params_mut(&mut self) -> &mut TransParams {
        &mut self.params
    }

    /// Number of live exchanges.
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    /// True if no exchange is live.
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// State of a live exchange, or `None` once it has finished.
    pub fn state(&self, handle: ExchangeHandle) -> Option<ExchangeState> {
        self.exchanges.get(&handle).map(|ex| ex.state)
    }

    /// Token of a live exchange.
    pub fn token(&self, handle: ExchangeHandle) -> Option<MsgToken> {
        self.exchanges.get(&handle).map(|ex| ex.token)
    }

    /// Starts an exchange now. See [`Engine::submit_at`].
    pub fn submit(&mut self, request: Request, dest: SA) -> Result<ExchangeHandle, Error> {
        self.submit_at(request, dest, Instant::now())
    }

    /// Starts an exchange for `request` towards `dest`, with `now` as the
    /// time of the first transmission.
    ///
    /// Fails with [`Error::MulticastConfirmable`] for a confirmable request
    /// to a multicast address and with [`Error::InvalidArgument`] if the
    /// request's own token is already in use. Nothing is sent on failure.
    pub fn submit_at(
        &mut self,
        request: Request,
        dest: SA,
        now: Instant,
    ) -> Result<ExchangeHandle, Error> {
        let multicast = dest.is_multicast();
        if multicast && request.msg_type().is_con() {
            warn!("refusing confirmable request to multicast address {}", dest);
            return Err(Error::MulticastConfirmable);
        }

        let token = match request.explicit_token() {
            Some(token) if self.tracker.token_in_use(token) => {
                warn!("token {} already in use", token);
                return Err(Error::InvalidArgument);
            }
            Some(token) => token,
            None => self.alloc_token(),
        };

        let msg_id = self.alloc_msg_id();
        let mut msg = request.to_message(msg_id, token);
        let mut block1 = None;

        if let Some(szx) = self.params.block_szx() {
            if msg.payload.len() > 16 << szx {
                let segmenter = BlockSegmenter::new(std::mem::take(&mut msg.payload), szx);
                msg.options.set(SIZE1, segmenter.total_len() as u32)?;
                apply_block1(&mut msg, &segmenter)?;
                block1 = Some(segmenter);
            } else if !msg.options.contains(OptionNumber::BLOCK2) {
                if let Some(hint) = BlockInfo::new(0, false, szx) {
                    msg.options.set(BLOCK2, hint)?;
                }
            }
        }

        let kind = if multicast {
            ExchangeKind::Multicast(MulticastState::new())
        } else if request.is_observe() {
            ExchangeKind::Observe(ObserveState::new())
        } else {
            ExchangeKind::Unicast
        };

        let handle = ExchangeHandle(self.next_handle);
        self.next_handle += 1;

        info!(
            "{} {:?} {} to {} (token {})",
            handle,
            request.msg_type(),
            request.method(),
            dest,
            token
        );

        let mut ex = Exchange::new(handle, token, dest, request, kind);
        ex.block1 = block1;

        self.tracker.add_token(token, dest, handle);
        self.transmit_request(&mut ex, msg, now);
        self.exchanges.insert(handle, ex);

        Ok(handle)
    }

    /// Ends an exchange at the application's request.
    ///
    /// Emits [`Event::Aborted`] then [`Event::Finished`]. Aborting an
    /// exchange that already finished, or aborting twice, does nothing.
    pub fn abort(&mut self, handle: ExchangeHandle) {
        if let Some(mut ex) = self.exchanges.remove(&handle) {
            info!("{} aborted", handle);
            self.release(&mut ex);
            ex.state = ExchangeState::Aborted;
            self.events.push_back(Event::Aborted { handle });
            self.events.push_back(Event::Finished {
                handle,
                message: None,
            });
        }
    }

    /// Stops an observation locally.
    ///
    /// The exchange finishes immediately; any later notification for its
    /// token is answered with a reset and never surfaced. Does nothing if
    /// the exchange already finished. Fails with
    /// [`Error::InvalidArgument`] if `handle` is not an observation.
    pub fn cancel_observe(&mut self, handle: ExchangeHandle) -> Result<(), Error> {
        let mut ex = match self.exchanges.remove(&handle) {
            Some(ex) => ex,
            None => return Ok(()),
        };

        if !ex.is_observe() {
            self.exchanges.insert(handle, ex);
            return Err(Error::InvalidArgument);
        }

        info!("{} observation cancelled", handle);
        self.release(&mut ex);
        ex.state = ExchangeState::Completed;
        self.events.push_back(Event::Finished {
            handle,
            message: None,
        });
        Ok(())
    }

    /// Stops an observation and tells the server, by sending a
    /// non-confirmable GET with the same token and Observe set to
    /// deregister. Then behaves like [`Engine::cancel_observe`].
    pub fn deregister_observe(&mut self, handle: ExchangeHandle) -> Result<(), Error> {
        let (mut msg, dest) = match self.exchanges.get(&handle) {
            None => return Ok(()),
            Some(ex) if !ex.is_observe() => return Err(Error::InvalidArgument),
            Some(ex) => {
                let mut msg = Message::new(MsgType::Non, MsgCode::GET, 0, ex.token);
                msg.options = ex.request.options().clone();
                msg.options.set(OBSERVE, OBSERVE_DEREGISTER)?;
                (msg, ex.dest)
            }
        };

        msg.msg_id = self.alloc_msg_id();
        self.send_untracked(msg, dest);
        self.cancel_observe(handle)
    }

    /// Next datagram to send, if any.
    pub fn poll_transmit(&mut self) -> Option<Transmit<SA>> {
        self.transmits.pop_front()
    }

    /// Next application event, if any.
    pub fn poll_event(&mut self) -> Option<Event<SA>> {
        self.events.pop_front()
    }

    /// When [`Engine::handle_timeout`] should next be called.
    pub fn poll_timeout(&mut self) -> Option<Instant> {
        let exchanges = &self.exchanges;
        self.timers.next_deadline(|handle, generation| {
            exchanges
                .get(&handle)
                .map_or(false, |ex| ex.timer_gen == generation && ex.deadline.is_some())
        })
    }

    /// Fires every timer due at or before `now`: retransmissions and timeouts.
    pub fn handle_timeout(&mut self, now: Instant) {
        while let Some((deadline, handle, generation)) = self.timers.pop_expired(now) {
            let mut ex = match self.exchanges.remove(&handle) {
                Some(ex) => ex,
                None => continue,
            };

            if ex.timer_gen != generation || ex.deadline.is_none() {
                self.exchanges.insert(handle, ex);
                continue;
            }
            ex.deadline = None;

            if let ExchangeKind::Multicast(state) = &mut ex.kind {
                for sender in state.expire(now) {
                    warn!("{} no block from {} in time, discarding its partial response", handle, sender);
                }
                self.rearm_multicast(&mut ex);
                self.exchanges.insert(handle, ex);
                continue;
            }

            let max_retransmit = self.params.max_retransmit();
            let retransmit = match (ex.state, ex.outstanding.as_mut()) {
                (ExchangeState::AwaitingAck, Some(out)) if out.retransmits < max_retransmit => {
                    out.retransmits += 1;
                    out.interval *= 2;
                    Some((out.dest, out.bytes.clone(), out.interval, out.retransmits))
                }
                _ => None,
            };

            match retransmit {
                Some((dest, bytes, interval, count)) => {
                    debug!("{} retransmission {} to {}", handle, count, dest);
                    debug!("OUTBOUND: {} {}", dest, CoapByteDisplayFormatter(&bytes));
                    self.transmits.push_back(Transmit {
                        destination: dest,
                        payload: bytes,
                    });
                    self.arm_timer(&mut ex, deadline + interval);
                    self.exchanges.insert(handle, ex);
                }
                None => {
                    info!("{} timed out", handle);
                    self.finish(ex, ExchangeState::TimedOut, Some(Error::TimeOut), None);
                }
            }
        }
    }

    /// Processes one inbound datagram from `src`, received at `now`.
    pub fn handle_datagram(&mut self, bytes: &[u8], src: SA, now: Instant) {
        debug!("INBOUND: {} {}", src, CoapByteDisplayFormatter(bytes));
        self.prune_acked(now);

        let msg = match Message::from_bytes(bytes) {
            Ok(msg) => msg,
            Err(e) => return self.handle_malformed(bytes, src, e),
        };

        match msg.msg_type {
            MsgType::Res => self.handle_reset(msg, src),
            MsgType::Ack if msg.is_empty() => self.handle_empty_ack(msg, src, now),
            MsgType::Ack => self.handle_piggybacked(msg, src, now),
            _ if !msg.code.is_response() => self.reject_inbound(msg, src),
            _ => self.handle_separate(msg, src, now),
        }
    }

    fn alloc_token(&mut self) -> MsgToken {
        loop {
            let bytes: [u8; DEFAULT_TOKEN_LEN] = self.rng.gen();
            let token = MsgToken::new(&bytes).unwrap_or(MsgToken::EMPTY);
            if !token.is_empty() && !self.tracker.token_in_use(token) {
                return token;
            }
        }
    }

    fn alloc_msg_id(&mut self) -> MsgId {
        loop {
            let msg_id = self.next_msg_id;
            self.next_msg_id = self.next_msg_id.wrapping_add(1);
            if !self.tracker.msg_id_in_use(msg_id) {
                return msg_id;
            }
        }
    }

    fn arm_timer(&mut self, ex: &mut Exchange<SA>, deadline: Instant) {
        ex.timer_gen += 1;
        ex.deadline = Some(deadline);
        self.timers.push(deadline, ex.handle, ex.timer_gen);
    }

    fn disarm_timer(&mut self, ex: &mut Exchange<SA>) {
        ex.timer_gen += 1;
        ex.deadline = None;
    }

    fn send_untracked(&mut self, msg: Message, dest: SA) {
        let bytes = msg.to_bytes();
        debug!("OUTBOUND: {} {}", dest, CoapByteDisplayFormatter(&bytes));
        self.transmits.push_back(Transmit {
            destination: dest,
            payload: bytes,
        });
    }

    /// Sends `msg` as the exchange's new outstanding request, replacing any
    /// previous one, and arms the matching timer.
    fn transmit_request(&mut self, ex: &mut Exchange<SA>, msg: Message, now: Instant) {
        self.settle(ex);

        let dest = ex.dest;
        let bytes = msg.to_bytes();
        debug!("OUTBOUND: {} {}", dest, CoapByteDisplayFormatter(&bytes));
        self.tracker.add_msg_id(msg.msg_id, dest, ex.handle);
        self.transmits.push_back(Transmit {
            destination: dest,
            payload: bytes.clone(),
        });

        let interval = if msg.msg_type.is_con() {
            ex.state = ExchangeState::AwaitingAck;
            self.params.initial_timeout(&mut self.rng)
        } else {
            ex.state = ExchangeState::AwaitingResponse;
            self.params.max_transmit_wait()
        };

        ex.outstanding = Some(Outstanding {
            msg_id: msg.msg_id,
            dest,
            bytes,
            retransmits: 0,
            interval,
        });

        if !ex.is_multicast() {
            self.arm_timer(ex, now + interval);
        }
    }

    /// Forgets the outstanding request after its reply arrived.
    fn settle(&mut self, ex: &mut Exchange<SA>) {
        self.disarm_timer(ex);
        if let Some(out) = ex.outstanding.take() {
            self.tracker.remove_msg_id(out.msg_id, out.dest);
        }
        if !ex.state.is_terminal() {
            ex.state = ExchangeState::AwaitingResponse;
        }
    }

    fn release(&mut self, ex: &mut Exchange<SA>) {
        self.settle(ex);
        self.tracker.remove_token(ex.token, ex.dest);
    }

    fn finish(
        &mut self,
        mut ex: Exchange<SA>,
        state: ExchangeState,
        error: Option<Error>,
        message: Option<Message>,
    ) {
        let handle = ex.handle;
        self.release(&mut ex);
        ex.state = state;
        if let Some(error) = error {
            info!("{} failed: {:?}", handle, error);
            self.events.push_back(Event::Error { handle, error });
        }
        self.events.push_back(Event::Finished { handle, message });
    }

    fn remember_acked(&mut self, src: SA, msg_id: MsgId, now: Instant) {
        if self.acked.len() >= ACKED_MEMORY {
            self.acked.pop_front();
        }
        self.acked.push_back((src, msg_id, now));
    }

    fn prune_acked(&mut self, now: Instant) {
        let lifetime = self.params.exchange_lifetime();
        while let Some((_, _, at)) = self.acked.front() {
            if now.saturating_duration_since(*at) <= lifetime {
                break;
            }
            self.acked.pop_front();
        }
    }

    fn was_acked(&self, src: SA, msg_id: MsgId) -> bool {
        self.acked
            .iter()
            .any(|(addr, id, _)| *addr == src && *id == msg_id)
    }

    fn handle_malformed(&mut self, bytes: &[u8], src: SA, error: DecodeError) {
        let (msg_type, msg_id, token) = match codec::peek_header(bytes) {
            Some(header) => header,
            None => {
                debug!("dropping undecodable datagram from {}: {:?}", src, error);
                return;
            }
        };

        if msg_type.is_con() {
            self.send_untracked(Message::reset(msg_id), src);
        }

        let handle = match msg_type {
            MsgType::Ack | MsgType::Res => self.tracker.match_msg_id(msg_id, src),
            _ => self.tracker.match_token(token, src),
        };

        let ex = match handle.and_then(|handle| self.exchanges.remove(&handle)) {
            Some(ex) => ex,
            None => {
                debug!("dropping undecodable datagram from {}: {:?}", src, error);
                return;
            }
        };

        if ex.is_multicast() {
            warn!("{} ignoring malformed reply from {}: {:?}", ex.handle, src, error);
            self.exchanges.insert(ex.handle, ex);
            return;
        }

        warn!("{} malformed reply from {}: {:?}", ex.handle, src, error);
        self.finish(ex, ExchangeState::Completed, Some(Error::Decode(error)), None);
    }

    fn handle_reset(&mut self, msg: Message, src: SA) {
        let ex = match self
            .tracker
            .match_msg_id(msg.msg_id, src)
            .and_then(|handle| self.exchanges.remove(&handle))
        {
            Some(ex) => ex,
            None => {
                debug!("ignoring unmatched reset {:04X} from {}", msg.msg_id, src);
                return;
            }
        };

        if ex.is_multicast() {
            debug!("{} ignoring reset from {}", ex.handle, src);
            self.exchanges.insert(ex.handle, ex);
            return;
        }

        info!("{} reset by {}", ex.handle, src);
        self.finish(ex, ExchangeState::Completed, Some(Error::Reset), None);
    }

    fn handle_empty_ack(&mut self, msg: Message, src: SA, now: Instant) {
        let mut ex = match self
            .tracker
            .match_msg_id(msg.msg_id, src)
            .and_then(|handle| self.exchanges.remove(&handle))
        {
            Some(ex) => ex,
            None => {
                debug!("ignoring unmatched ack {:04X} from {}", msg.msg_id, src);
                return;
            }
        };

        if ex.state == ExchangeState::AwaitingAck {
            debug!("{} acknowledged, awaiting separate response", ex.handle);
            self.settle(&mut ex);
            if !ex.is_multicast() {
                let deadline = now + self.params.max_transmit_wait();
                self.arm_timer(&mut ex, deadline);
            }
        }

        self.exchanges.insert(ex.handle, ex);
    }

    fn handle_piggybacked(&mut self, msg: Message, src: SA, now: Instant) {
        let ex = match self
            .tracker
            .match_msg_id(msg.msg_id, src)
            .and_then(|handle| self.exchanges.remove(&handle))
        {
            Some(ex) => ex,
            None => {
                debug!("ignoring unmatched ack {:04X} from {}", msg.msg_id, src);
                return;
            }
        };

        if ex.token != msg.token {
            warn!(
                "{} ack {:04X} carries token {} instead of {}",
                ex.handle, msg.msg_id, msg.token, ex.token
            );
            self.exchanges.insert(ex.handle, ex);
            return;
        }

        self.on_response(ex, msg, src, now);
    }

    fn handle_separate(&mut self, msg: Message, src: SA, now: Instant) {
        let mut ex = match self
            .tracker
            .match_token(msg.token, src)
            .and_then(|handle| self.exchanges.remove(&handle))
        {
            Some(ex) => ex,
            None => {
                if msg.msg_type.is_con() {
                    if self.was_acked(src, msg.msg_id) {
                        self.send_untracked(Message::ack(msg.msg_id), src);
                    } else {
                        debug!("resetting unmatched {:04X} from {}", msg.msg_id, src);
                        self.send_untracked(Message::reset(msg.msg_id), src);
                    }
                }
                return;
            }
        };

        let duplicate = ex.check_duplicate(msg.msg_id);

        if msg.msg_type.is_con() {
            self.send_untracked(Message::ack(msg.msg_id), src);
            if !duplicate {
                self.remember_acked(src, msg.msg_id, now);
            }
        }

        if duplicate {
            debug!("{} duplicate {:04X} from {}", ex.handle, msg.msg_id, src);
            self.exchanges.insert(ex.handle, ex);
            return;
        }

        self.on_response(ex, msg, src, now);
    }

    fn reject_inbound(&mut self, msg: Message, src: SA) {
        if msg.msg_type.is_con() {
            debug!("resetting inbound {} from {}", msg.code, src);
            self.send_untracked(Message::reset(msg.msg_id), src);
        } else {
            debug!("dropping inbound {} from {}", msg.code, src);
        }
    }

    fn on_response(&mut self, ex: Exchange<SA>, msg: Message, src: SA, now: Instant) {
        match ex.kind {
            ExchangeKind::Unicast => self.on_unicast_response(ex, msg, now),
            ExchangeKind::Observe(_) => self.on_observe_response(ex, msg, now),
            ExchangeKind::Multicast(_) => self.on_multicast_response(ex, msg, src, now),
        }
    }

    fn on_unicast_response(&mut self, mut ex: Exchange<SA>, mut msg: Message, now: Instant) {
        self.settle(&mut ex);

        if let Some(mut segmenter) = ex.block1.take() {
            if !segmenter.is_last() {
                if !msg.code.is_success() {
                    let error = Error::from_response_code(msg.code).unwrap_or(Error::Unknown);
                    return self.finish(ex, ExchangeState::Completed, Some(error), Some(msg));
                }

                match segmenter.advance(msg.block1()) {
                    Ok(true) => {
                        let next = self.block1_message(&ex, &segmenter);
                        ex.block1 = Some(segmenter);
                        return match next {
                            Ok(next) => {
                                self.transmit_request(&mut ex, next, now);
                                self.exchanges.insert(ex.handle, ex);
                            }
                            Err(e) => self.finish(ex, ExchangeState::Completed, Some(e), None),
                        };
                    }
                    Ok(false) => (),
                    Err(e) => {
                        return self.finish(ex, ExchangeState::Completed, Some(e), Some(msg));
                    }
                }
            }
        }

        if let Some(error) = Error::from_response_code(msg.code) {
            return self.finish(ex, ExchangeState::Completed, Some(error), Some(msg));
        }

        if let Some(block) = msg.block2() {
            if block.more_flag() || block.num() > 0 || ex.block2.is_some() {
                let reconstructor = ex.block2.get_or_insert_with(BlockReconstructor::new);
                match reconstructor.feed(block, &msg.payload) {
                    Err(e) => return self.finish(ex, ExchangeState::Completed, Some(e), None),
                    Ok(false) => {
                        let next = reconstructor.next_block();
                        let msg_type = ex.request.msg_type();
                        return self.request_block2(ex, next, msg_type, now);
                    }
                    Ok(true) => {
                        if let Some(reconstructor) = ex.block2.take() {
                            msg.payload = reconstructor.into_inner();
                        }
                        msg.options.remove(OptionNumber::BLOCK2);
                    }
                }
            }
        }

        info!("{} completed with {}", ex.handle, msg.code);
        self.finish(ex, ExchangeState::Completed, None, Some(msg));
    }

    fn on_observe_response(&mut self, mut ex: Exchange<SA>, mut msg: Message, now: Instant) {
        if let Some(error) = Error::from_response_code(msg.code) {
            return self.finish(ex, ExchangeState::Completed, Some(error), Some(msg));
        }

        let step = match &mut ex.kind {
            ExchangeKind::Observe(state) => state.accept(&mut msg, now),
            _ => ObserveStep::Deliver { last: true },
        };

        let handle = ex.handle;
        match step {
            ObserveStep::Stale => {
                debug!("{} dropping stale notification", handle);
                self.exchanges.insert(handle, ex);
            }
            ObserveStep::Fail(e) => self.finish(ex, ExchangeState::Completed, Some(e), None),
            ObserveStep::FollowUp(block) => {
                self.settle(&mut ex);
                let msg_type = ex.request.msg_type();
                self.request_block2(ex, Some(block), msg_type, now);
            }
            ObserveStep::Deliver { last: false } => {
                self.settle(&mut ex);
                self.events.push_back(Event::Notified {
                    handle,
                    message: msg,
                });
                self.exchanges.insert(handle, ex);
            }
            ObserveStep::Deliver { last: true } => {
                info!("{} observation ended by server with {}", handle, msg.code);
                self.events.push_back(Event::Notified {
                    handle,
                    message: msg.clone(),
                });
                self.finish(ex, ExchangeState::Completed, None, Some(msg));
            }
        }
    }

    fn on_multicast_response(
        &mut self,
        mut ex: Exchange<SA>,
        mut msg: Message,
        src: SA,
        now: Instant,
    ) {
        let step = match &mut ex.kind {
            ExchangeKind::Multicast(state) => state.accept(src.host(), &mut msg),
            _ => MulticastStep::Complete,
        };

        let handle = ex.handle;
        match step {
            MulticastStep::Complete => {
                debug!("{} response from {}", handle, src);
                self.events.push_back(Event::MulticastResponse {
                    handle,
                    message: msg,
                    sender: src,
                });
            }
            MulticastStep::FollowUp(block) => {
                match self.block2_message(&ex, block, MsgType::Non) {
                    Ok(follow_up) => {
                        self.send_untracked(follow_up, src);
                        let deadline = now + self.params.max_transmit_wait();
                        if let ExchangeKind::Multicast(state) = &mut ex.kind {
                            state.await_block(src.host(), deadline);
                        }
                    }
                    Err(e) => warn!("{} cannot request {} from {}: {:?}", handle, block, src, e),
                }
            }
            MulticastStep::Dropped(e) => {
                warn!("{} discarding partial response from {}: {:?}", handle, src, e);
            }
        }

        self.rearm_multicast(&mut ex);
        self.exchanges.insert(handle, ex);
    }

    /// Points the timer of a multicast exchange at the earliest deadline
    /// of a block follow-up still in flight.
    fn rearm_multicast(&mut self, ex: &mut Exchange<SA>) {
        let deadline = match &ex.kind {
            ExchangeKind::Multicast(state) => state.next_deadline(),
            _ => None,
        };
        match deadline {
            Some(deadline) if ex.deadline != Some(deadline) => self.arm_timer(ex, deadline),
            Some(_) => (),
            None => self.disarm_timer(ex),
        }
    }

    /// Builds the request for the current block of an outgoing Block1 transfer.
    fn block1_message(
        &mut self,
        ex: &Exchange<SA>,
        segmenter: &BlockSegmenter,
    ) -> Result<Message, Error> {
        let mut msg = ex.request.to_message(self.alloc_msg_id(), ex.token);
        apply_block1(&mut msg, segmenter)?;
        Ok(msg)
    }

    /// Builds a request for one more block of a Block2 response: the original
    /// request without payload or Observe, carrying `block`.
    fn block2_message(
        &mut self,
        ex: &Exchange<SA>,
        block: BlockInfo,
        msg_type: MsgType,
    ) -> Result<Message, Error> {
        let mut msg = Message::new(msg_type, ex.request.method(), self.alloc_msg_id(), ex.token);
        msg.options = ex.request.options().clone();
        msg.options.remove(OptionNumber::OBSERVE);
        msg.options.remove(OptionNumber::SIZE1);
        msg.options.set(BLOCK2, block.without_more_flag())?;
        Ok(msg)
    }

    fn request_block2(
        &mut self,
        mut ex: Exchange<SA>,
        block: Option<BlockInfo>,
        msg_type: MsgType,
        now: Instant,
    ) {
        let block = match block {
            Some(block) => block,
            None => {
                return self.finish(
                    ex,
                    ExchangeState::Completed,
                    Some(Error::RequestEntityIncomplete),
                    None,
                )
            }
        };

        match self.block2_message(&ex, block, msg_type) {
            Ok(follow_up) => {
                debug!("{} requesting block {}", ex.handle, block);
                self.transmit_request(&mut ex, follow_up, now);
                self.exchanges.insert(ex.handle, ex);
            }
            Err(e) => self.finish(ex, ExchangeState::Completed, Some(e), None),
        }
    }
}

fn apply_block1(msg: &mut Message, segmenter: &BlockSegmenter) -> Result<(), Error> {
    let (block, data) = segmenter.current();
    msg.options.set(BLOCK1, block)?;
    msg.payload = data.to_vec();
    Ok(())
}
