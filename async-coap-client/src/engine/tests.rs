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
use std::net::SocketAddr;
use std::time::Duration;

fn engine() -> Engine<SocketAddr> {
    Engine::with_rng(StdRng::seed_from_u64(0x5EED))
}

fn server() -> SocketAddr {
    "10.20.30.40:5683".parse().unwrap()
}

fn sent(engine: &mut Engine<SocketAddr>) -> (SocketAddr, Message) {
    let transmit = engine.poll_transmit().expect("nothing transmitted");
    let msg = Message::from_bytes(&transmit.payload).expect("engine sent garbage");
    (transmit.destination, msg)
}

fn events(engine: &mut Engine<SocketAddr>) -> Vec<Event<SocketAddr>> {
    std::iter::from_fn(|| engine.poll_event()).collect()
}

fn piggybacked(request: &Message, code: MsgCode, payload: &[u8]) -> Message {
    let mut msg = Message::new(MsgType::Ack, code, request.msg_id, request.token);
    msg.payload = payload.to_vec();
    msg
}

fn deliver(engine: &mut Engine<SocketAddr>, msg: &Message, src: SocketAddr, now: Instant) {
    engine.handle_datagram(&msg.to_bytes(), src, now);
}

fn finished_payload(event: &Event<SocketAddr>) -> Vec<u8> {
    match event {
        Event::Finished {
            message: Some(msg), ..
        } => msg.payload.clone(),
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn piggybacked_get() {
    let now = Instant::now();
    let mut engine = engine();
    let handle = engine
        .submit_at(Request::get("coap://10.20.30.40/test").unwrap(), server(), now)
        .unwrap();

    let (dest, request) = sent(&mut engine);
    assert_eq!(dest, server());
    assert_eq!(request.msg_type, MsgType::Con);
    assert_eq!(request.code, MsgCode::GET);
    assert_eq!(request.uri_path(), "/test");
    assert_eq!(request.token.len(), DEFAULT_TOKEN_LEN);
    assert_eq!(engine.state(handle), Some(ExchangeState::AwaitingAck));

    deliver(
        &mut engine,
        &piggybacked(&request, MsgCode::CONTENT, b"hello"),
        server(),
        now,
    );

    let events = events(&mut engine);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].handle(), handle);
    assert_eq!(finished_payload(&events[0]), b"hello".to_vec());
    assert_eq!(engine.state(handle), None);
    assert!(engine.poll_transmit().is_none());
    assert_eq!(engine.poll_timeout(), None);
}

#[test]
fn timeout_without_retransmission() {
    let start = Instant::now();
    let mut engine = engine();
    engine.params_mut().set_ack_random_factor(1.0).unwrap();
    engine.params_mut().set_max_retransmit(0).unwrap();

    let handle = engine
        .submit_at(Request::get("coap://10.20.30.40/test").unwrap(), server(), start)
        .unwrap();
    sent(&mut engine);

    let deadline = engine.poll_timeout().unwrap();
    let elapsed = deadline - start;
    assert!(elapsed >= Duration::from_millis(1800), "{:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(2200), "{:?}", elapsed);

    engine.handle_timeout(start + Duration::from_millis(1500));
    assert!(events(&mut engine).is_empty());

    engine.handle_timeout(deadline);
    assert_eq!(
        events(&mut engine),
        vec![
            Event::Error {
                handle,
                error: Error::TimeOut
            },
            Event::Finished {
                handle,
                message: None
            },
        ]
    );
    assert!(engine.poll_transmit().is_none());
    assert!(engine.is_empty());
}

#[test]
fn retransmission_doubles_interval() {
    let start = Instant::now();
    let mut engine = engine();
    engine.params_mut().set_ack_random_factor(1.0).unwrap();

    engine
        .submit_at(Request::get("coap://10.20.30.40/test").unwrap(), server(), start)
        .unwrap();
    let first = engine.poll_transmit().unwrap();

    let mut deadlines = Vec::new();
    while let Some(deadline) = engine.poll_timeout() {
        deadlines.push((deadline - start).as_secs());
        engine.handle_timeout(deadline);
    }
    assert_eq!(deadlines, vec![2, 6, 14, 30, 62]);

    let resent: Vec<_> = std::iter::from_fn(|| engine.poll_transmit()).collect();
    assert_eq!(resent.len(), 4);
    assert!(resent.iter().all(|t| *t == first));

    let events = events(&mut engine);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], Event::Error { error: Error::TimeOut, .. }));
}

#[test]
fn abort_is_idempotent() {
    let now = Instant::now();
    let mut engine = engine();
    let handle = engine
        .submit_at(Request::get("coap://10.20.30.40/test").unwrap(), server(), now)
        .unwrap();
    let (_, request) = sent(&mut engine);

    engine.abort(handle);
    engine.abort(handle);

    assert_eq!(
        events(&mut engine),
        vec![
            Event::Aborted { handle },
            Event::Finished {
                handle,
                message: None
            },
        ]
    );

    // A late reply and the stale timer produce nothing.
    deliver(
        &mut engine,
        &piggybacked(&request, MsgCode::CONTENT, b"late"),
        server(),
        now,
    );
    engine.handle_timeout(now + Duration::from_secs(300));
    assert!(engine.poll_event().is_none());
    assert!(engine.poll_transmit().is_none());
    assert_eq!(engine.poll_timeout(), None);
}

#[test]
fn separate_response_is_acknowledged() {
    let now = Instant::now();
    let mut engine = engine();
    let handle = engine
        .submit_at(Request::get("coap://10.20.30.40/test").unwrap(), server(), now)
        .unwrap();
    let (_, request) = sent(&mut engine);

    deliver(&mut engine, &Message::ack(request.msg_id), server(), now);
    assert!(engine.poll_event().is_none());
    assert_eq!(engine.state(handle), Some(ExchangeState::AwaitingResponse));
    let passive_wait = engine.params().max_transmit_wait();
    assert_eq!(engine.poll_timeout(), Some(now + passive_wait));

    let mut response = Message::new(MsgType::Con, MsgCode::CONTENT, 0x5000, request.token);
    response.payload = b"later".to_vec();
    deliver(&mut engine, &response, server(), now);

    let (dest, ack) = sent(&mut engine);
    assert_eq!(dest, server());
    assert_eq!(ack, Message::ack(0x5000));
    let events = events(&mut engine);
    assert_eq!(events.len(), 1);
    assert_eq!(finished_payload(&events[0]), b"later".to_vec());

    // The server missed our ACK and retransmits: ACK again, report nothing.
    deliver(&mut engine, &response, server(), now + Duration::from_secs(3));
    assert_eq!(sent(&mut engine).1, Message::ack(0x5000));
    assert!(engine.poll_event().is_none());
}

#[test]
fn duplicate_ack_after_completion() {
    let now = Instant::now();
    let mut engine = engine();
    engine
        .submit_at(Request::get("coap://10.20.30.40/test").unwrap(), server(), now)
        .unwrap();
    let (_, request) = sent(&mut engine);
    let response = piggybacked(&request, MsgCode::CONTENT, b"once");

    deliver(&mut engine, &response, server(), now);
    assert_eq!(events(&mut engine).len(), 1);

    deliver(&mut engine, &response, server(), now);
    assert!(events(&mut engine).is_empty());
    assert!(engine.poll_transmit().is_none());
}

#[test]
fn reset_ends_exchange() {
    let now = Instant::now();
    let mut engine = engine();
    let handle = engine
        .submit_at(Request::get("coap://10.20.30.40/test").unwrap(), server(), now)
        .unwrap();
    let (_, request) = sent(&mut engine);

    deliver(&mut engine, &Message::reset(request.msg_id), server(), now);
    assert_eq!(
        events(&mut engine),
        vec![
            Event::Error {
                handle,
                error: Error::Reset
            },
            Event::Finished {
                handle,
                message: None
            },
        ]
    );
    assert_eq!(engine.poll_timeout(), None);
}

#[test]
fn token_mismatch_is_ignored() {
    let now = Instant::now();
    let mut engine = engine();
    let handle = engine
        .submit_at(Request::get("coap://10.20.30.40/test").unwrap(), server(), now)
        .unwrap();
    let (_, request) = sent(&mut engine);

    let mut response = piggybacked(&request, MsgCode::CONTENT, b"wrong");
    response.token = MsgToken::new(b"other").unwrap();
    deliver(&mut engine, &response, server(), now);

    assert!(engine.poll_event().is_none());
    assert_eq!(engine.state(handle), Some(ExchangeState::AwaitingAck));
}

#[test]
fn malformed_reply_terminates_matching_exchange() {
    let now = Instant::now();
    let mut engine = engine();
    let handle = engine
        .submit_at(Request::get("coap://10.20.30.40/test").unwrap(), server(), now)
        .unwrap();
    let (_, request) = sent(&mut engine);

    let mut bytes = piggybacked(&request, MsgCode::CONTENT, b"").to_bytes();
    bytes.push(0xFF);

    // Unmatched garbage is dropped.
    engine.handle_datagram(&[0x40, 0x01], server(), now);
    assert!(engine.poll_event().is_none());

    engine.handle_datagram(&bytes, server(), now);
    assert_eq!(
        events(&mut engine),
        vec![
            Event::Error {
                handle,
                error: Error::Decode(DecodeError::PayloadMarkerWithEmptyPayload)
            },
            Event::Finished {
                handle,
                message: None
            },
        ]
    );
}

#[test]
fn inbound_requests_are_refused() {
    let now = Instant::now();
    let mut engine = engine();

    let ping = Message::new(MsgType::Con, MsgCode::EMPTY, 0x0102, MsgToken::EMPTY);
    deliver(&mut engine, &ping, server(), now);
    assert_eq!(sent(&mut engine).1, Message::reset(0x0102));

    let get = Message::new(MsgType::Non, MsgCode::GET, 0x0103, MsgToken::from(7u32));
    deliver(&mut engine, &get, server(), now);
    assert!(engine.poll_transmit().is_none());
    assert!(engine.poll_event().is_none());
}

#[test]
fn confirmable_multicast_rejected() {
    let mut engine = engine();
    let dest: SocketAddr = "224.0.1.187:5683".parse().unwrap();
    let request = Request::get("coap://224.0.1.187/test").unwrap();

    assert_eq!(
        engine.submit(request, dest),
        Err(Error::MulticastConfirmable)
    );
    assert!(engine.poll_transmit().is_none());
    assert!(engine.is_empty());
}

#[test]
fn token_collision_rejected() {
    let mut engine = engine();
    let request = Request::get("coap://10.20.30.40/test")
        .unwrap()
        .token_bytes(&[1, 2])
        .unwrap();

    let handle = engine.submit(request.clone(), server()).unwrap();
    assert_eq!(engine.token(handle), MsgToken::new(&[1, 2]));
    assert_eq!(engine.submit(request.clone(), server()), Err(Error::InvalidArgument));

    engine.abort(handle);
    assert!(engine.submit(request, server()).is_ok());
}

#[test]
fn block2_size_hint() {
    let mut engine = engine();
    engine.params_mut().set_block_size(64).unwrap();
    engine
        .submit(Request::get("coap://10.20.30.40/big").unwrap(), server())
        .unwrap();

    let (_, request) = sent(&mut engine);
    assert_eq!(request.block2(), BlockInfo::new(0, false, 2));
    assert_eq!(request.block1(), None);
}

#[test]
fn blockwise_post_method_not_allowed() {
    let now = Instant::now();
    let mut engine = engine();
    engine.params_mut().set_block_size(16).unwrap();

    let handle = engine
        .submit_at(
            Request::post("coap://10.20.30.40/upload")
                .unwrap()
                .payload(vec![b'p'; 40]),
            server(),
            now,
        )
        .unwrap();

    let (_, first) = sent(&mut engine);
    assert_eq!(first.block1(), BlockInfo::new(0, true, 0));
    assert_eq!(first.options.get(SIZE1), Some(40));
    assert_eq!(first.payload.len(), 16);

    deliver(
        &mut engine,
        &piggybacked(&first, MsgCode::METHOD_NOT_ALLOWED, b""),
        server(),
        now,
    );

    let events = events(&mut engine);
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0],
        Event::Error {
            handle,
            error: Error::MethodNotAllowed
        }
    );
    match &events[1] {
        Event::Finished {
            message: Some(msg), ..
        } => assert_eq!(msg.code, MsgCode::METHOD_NOT_ALLOWED),
        other => panic!("unexpected event {:?}", other),
    }
    assert!(engine.poll_transmit().is_none());
}

#[test]
fn blockwise_post_with_block2_response() {
    let now = Instant::now();
    let mut engine = engine();
    engine.params_mut().set_block_size(16).unwrap();

    let body: Vec<u8> = (0u8..40).collect();
    engine
        .submit_at(
            Request::post("coap://10.20.30.40/upload")
                .unwrap()
                .payload(body.clone()),
            server(),
            now,
        )
        .unwrap();

    let mut uploaded = Vec::new();
    let mut request = sent(&mut engine).1;
    for num in 0..3u32 {
        let block = request.block1().unwrap();
        assert_eq!(block.num(), num);
        assert_eq!(block.more_flag(), num < 2);
        assert_eq!(request.options.contains(OptionNumber::SIZE1), num == 0);
        uploaded.extend_from_slice(&request.payload);

        if num < 2 {
            let mut ack = piggybacked(&request, MsgCode::CONTINUE, b"");
            ack.options.insert(BLOCK1, block).unwrap();
            deliver(&mut engine, &ack, server(), now);

            let token = request.token;
            let msg_id = request.msg_id;
            request = sent(&mut engine).1;
            assert_eq!(request.token, token);
            assert_ne!(request.msg_id, msg_id);
        }
    }
    assert_eq!(uploaded, body);

    let mut changed = piggybacked(&request, MsgCode::CHANGED, &[b'r'; 16]);
    changed.options.insert(BLOCK1, request.block1().unwrap()).unwrap();
    changed.options.insert(BLOCK2, BlockInfo::new(0, true, 0).unwrap()).unwrap();
    deliver(&mut engine, &changed, server(), now);
    assert!(engine.poll_event().is_none());

    let (_, follow_up) = sent(&mut engine);
    assert_eq!(follow_up.code, MsgCode::POST);
    assert_eq!(follow_up.block2(), BlockInfo::new(1, false, 0));
    assert_eq!(follow_up.block1(), None);
    assert!(follow_up.payload.is_empty());

    let mut rest = piggybacked(&follow_up, MsgCode::CHANGED, b"done");
    rest.options.insert(BLOCK2, BlockInfo::new(1, false, 0).unwrap()).unwrap();
    deliver(&mut engine, &rest, server(), now);

    let events = events(&mut engine);
    assert_eq!(events.len(), 1);
    let mut expected = vec![b'r'; 16];
    expected.extend_from_slice(b"done");
    assert_eq!(finished_payload(&events[0]), expected);
    match &events[0] {
        Event::Finished {
            message: Some(msg), ..
        } => assert_eq!(msg.block2(), None),
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn block2_out_of_order_fails() {
    let now = Instant::now();
    let mut engine = engine();
    let handle = engine
        .submit_at(Request::get("coap://10.20.30.40/big").unwrap(), server(), now)
        .unwrap();
    let (_, request) = sent(&mut engine);

    let mut first = piggybacked(&request, MsgCode::CONTENT, &[0; 16]);
    first.options.insert(BLOCK2, BlockInfo::new(0, true, 0).unwrap()).unwrap();
    deliver(&mut engine, &first, server(), now);
    let (_, follow_up) = sent(&mut engine);
    assert_eq!(follow_up.code, MsgCode::GET);
    assert_eq!(follow_up.block2(), BlockInfo::new(1, false, 0));

    let mut skipped = piggybacked(&follow_up, MsgCode::CONTENT, &[0; 16]);
    skipped.options.insert(BLOCK2, BlockInfo::new(2, true, 0).unwrap()).unwrap();
    deliver(&mut engine, &skipped, server(), now);

    assert_eq!(
        events(&mut engine),
        vec![
            Event::Error {
                handle,
                error: Error::RequestEntityIncomplete
            },
            Event::Finished {
                handle,
                message: None
            },
        ]
    );
}

fn notification(token: MsgToken, msg_type: MsgType, msg_id: MsgId, seq: u32) -> Message {
    let mut msg = Message::new(msg_type, MsgCode::CONTENT, msg_id, token);
    msg.options.insert(OBSERVE, seq).unwrap();
    msg.payload = seq.to_string().into_bytes();
    msg
}

fn notified(events: &[Event<SocketAddr>]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Notified { message, .. } => message.observe(),
            _ => None,
        })
        .collect()
}

#[test]
fn observe_drops_stale_notifications() {
    let now = Instant::now();
    let mut engine = engine();
    let handle = engine
        .submit_at(Request::observe("coap://10.20.30.40/obs").unwrap(), server(), now)
        .unwrap();
    let (_, request) = sent(&mut engine);
    assert_eq!(request.observe(), Some(OBSERVE_REGISTER));

    let first = notification(request.token, MsgType::Ack, request.msg_id, 5);
    deliver(&mut engine, &first, server(), now);
    deliver(&mut engine, &notification(request.token, MsgType::Non, 0x100, 3), server(), now);
    deliver(&mut engine, &notification(request.token, MsgType::Con, 0x101, 7), server(), now);

    // Only the confirmable notification is acknowledged.
    assert_eq!(sent(&mut engine).1, Message::ack(0x101));
    assert!(engine.poll_transmit().is_none());

    assert_eq!(notified(&events(&mut engine)), vec![5, 7]);
    assert_eq!(engine.state(handle), Some(ExchangeState::AwaitingResponse));
    assert_eq!(engine.poll_timeout(), None);
}

#[test]
fn observe_sequence_wraps() {
    let now = Instant::now();
    let mut engine = engine();
    engine
        .submit_at(
            Request::observe("coap://10.20.30.40/obs").unwrap().non_confirmable(),
            server(),
            now,
        )
        .unwrap();
    let (_, request) = sent(&mut engine);

    let last = (1 << 24) - 1;
    deliver(&mut engine, &notification(request.token, MsgType::Non, 1, last), server(), now);
    deliver(&mut engine, &notification(request.token, MsgType::Non, 2, 0), server(), now);

    assert_eq!(notified(&events(&mut engine)), vec![last, 0]);
}

#[test]
fn observe_declined_by_server() {
    let now = Instant::now();
    let mut engine = engine();
    let handle = engine
        .submit_at(Request::observe("coap://10.20.30.40/obs").unwrap(), server(), now)
        .unwrap();
    let (_, request) = sent(&mut engine);

    deliver(
        &mut engine,
        &piggybacked(&request, MsgCode::CONTENT, b"once"),
        server(),
        now,
    );

    let events = events(&mut engine);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], Event::Notified { .. }));
    assert_eq!(finished_payload(&events[1]), b"once".to_vec());
    assert_eq!(engine.state(handle), None);
}

#[test]
fn observe_blockwise_notification() {
    let now = Instant::now();
    let mut engine = engine();
    let handle = engine
        .submit_at(Request::observe("coap://10.20.30.40/obs").unwrap(), server(), now)
        .unwrap();
    let (_, request) = sent(&mut engine);

    let mut head = notification(request.token, MsgType::Ack, request.msg_id, 4);
    head.options.insert(BLOCK2, BlockInfo::new(0, true, 0).unwrap()).unwrap();
    head.payload = vec![b'x'; 16];
    deliver(&mut engine, &head, server(), now);
    assert!(engine.poll_event().is_none());

    let (dest, follow_up) = sent(&mut engine);
    assert_eq!(dest, server());
    assert_eq!(follow_up.msg_type, MsgType::Con);
    assert_eq!(follow_up.code, MsgCode::GET);
    assert_eq!(follow_up.token, request.token);
    assert_eq!(follow_up.uri_path(), "/obs");
    assert_eq!(follow_up.observe(), None);
    assert_eq!(follow_up.block2(), BlockInfo::new(1, false, 0));
    assert!(engine.poll_timeout().is_some());

    let mut tail = piggybacked(&follow_up, MsgCode::CONTENT, b"tail");
    tail.options.insert(BLOCK2, BlockInfo::new(1, false, 0).unwrap()).unwrap();
    deliver(&mut engine, &tail, server(), now);

    let events = events(&mut engine);
    assert_eq!(notified(&events), vec![4]);
    match &events[0] {
        Event::Notified { message, .. } => {
            let mut expected = vec![b'x'; 16];
            expected.extend_from_slice(b"tail");
            assert_eq!(message.payload, expected);
            assert_eq!(message.block2(), None);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(engine.state(handle), Some(ExchangeState::AwaitingResponse));
    assert_eq!(engine.poll_timeout(), None);
}

#[test]
fn cancelled_observation_resets_notifications() {
    let now = Instant::now();
    let mut engine = engine();
    let handle = engine
        .submit_at(Request::observe("coap://10.20.30.40/obs").unwrap(), server(), now)
        .unwrap();
    let (_, request) = sent(&mut engine);

    let first = notification(request.token, MsgType::Ack, request.msg_id, 1);
    deliver(&mut engine, &first, server(), now);
    assert_eq!(notified(&events(&mut engine)), vec![1]);

    engine.cancel_observe(handle).unwrap();
    assert_eq!(
        events(&mut engine),
        vec![Event::Finished {
            handle,
            message: None
        }]
    );
    assert!(engine.poll_transmit().is_none());

    deliver(&mut engine, &notification(request.token, MsgType::Con, 0x200, 2), server(), now);
    assert_eq!(sent(&mut engine).1, Message::reset(0x200));
    assert!(engine.poll_event().is_none());

    assert_eq!(engine.cancel_observe(handle), Ok(()));
}

#[test]
fn cancel_observe_requires_observation() {
    let mut engine = engine();
    let handle = engine
        .submit(Request::get("coap://10.20.30.40/test").unwrap(), server())
        .unwrap();

    assert_eq!(engine.cancel_observe(handle), Err(Error::InvalidArgument));
    assert_eq!(engine.deregister_observe(handle), Err(Error::InvalidArgument));
    assert_eq!(engine.state(handle), Some(ExchangeState::AwaitingAck));
}

#[test]
fn deregister_tells_the_server() {
    let mut engine = engine();
    let handle = engine
        .submit(Request::observe("coap://10.20.30.40/obs").unwrap(), server())
        .unwrap();
    let (_, request) = sent(&mut engine);

    engine.deregister_observe(handle).unwrap();

    let (dest, dereg) = sent(&mut engine);
    assert_eq!(dest, server());
    assert_eq!(dereg.msg_type, MsgType::Non);
    assert_eq!(dereg.code, MsgCode::GET);
    assert_eq!(dereg.token, request.token);
    assert_eq!(dereg.observe(), Some(OBSERVE_DEREGISTER));
    assert_eq!(dereg.uri_path(), "/obs");

    assert_eq!(
        events(&mut engine),
        vec![Event::Finished {
            handle,
            message: None
        }]
    );
}

fn all_coap_devices() -> SocketAddr {
    "224.0.1.187:5683".parse().unwrap()
}

#[test]
fn multicast_fixture_reply() {
    let now = Instant::now();
    let mut engine = engine();
    let handle = engine
        .submit_at(
            Request::get("coap://224.0.1.187/test")
                .unwrap()
                .non_confirmable()
                .token_bytes(b"abc")
                .unwrap(),
            all_coap_devices(),
            now,
        )
        .unwrap();
    assert_eq!(sent(&mut engine).0, all_coap_devices());
    assert_eq!(engine.poll_timeout(), None);

    let responder: SocketAddr = "10.20.30.40:5683".parse().unwrap();
    engine.handle_datagram(b"SE\xAD/abc\xC0\xFFReply0", responder, now);
    // The same datagram again is a second response, not a duplicate.
    engine.handle_datagram(b"SE\xAD/abc\xC0\xFFReply0", responder, now);

    let events = events(&mut engine);
    assert_eq!(events.len(), 2);
    for event in &events {
        match event {
            Event::MulticastResponse {
                handle: h,
                message,
                sender,
            } => {
                assert_eq!(*h, handle);
                assert_eq!(*sender, responder);
                assert_eq!(message.payload_as_str(), Some("Reply0"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(engine.state(handle), Some(ExchangeState::AwaitingResponse));
}

fn multicast_responses(engine: &mut Engine<SocketAddr>) -> Vec<(SocketAddr, Vec<u8>)> {
    events(engine)
        .into_iter()
        .map(|event| match event {
            Event::MulticastResponse {
                message, sender, ..
            } => (sender, message.payload),
            other => panic!("unexpected event {:?}", other),
        })
        .collect()
}

#[test]
fn multicast_fixture_blockwise() {
    let now = Instant::now();
    let mut engine = engine();
    engine
        .submit_at(
            Request::get("coap://224.0.1.187/test")
                .unwrap()
                .non_confirmable()
                .token_bytes(b"abc")
                .unwrap(),
            all_coap_devices(),
            now,
        )
        .unwrap();
    sent(&mut engine);

    let host0: SocketAddr = "10.20.30.40:5683".parse().unwrap();
    let host1: SocketAddr = "10.20.30.41:5683".parse().unwrap();

    // Both responders start their replies at block 1.
    engine.handle_datagram(b"SE#}abc\xC0\xB1\x1D\xFFReply1", host0, now);
    engine.handle_datagram(b"SE#}abc\xC0\xB1\x1D\xFFReply3", host1, now);

    for expected in &[host0, host1] {
        let (dest, follow_up) = sent(&mut engine);
        assert_eq!(dest, *expected);
        assert_eq!(follow_up.block2(), BlockInfo::new(2, false, 5));
    }
    assert!(engine.poll_timeout().is_some());

    engine.handle_datagram(b"SE#~abc\xC0\xB1%\xFFReply2", host0, now);
    engine.handle_datagram(b"SE#~abc\xC0\xB1%\xFFReply4", host1, now);

    assert_eq!(
        multicast_responses(&mut engine),
        vec![
            (host0, b"Reply1Reply2".to_vec()),
            (host1, b"Reply3Reply4".to_vec())
        ]
    );
    assert_eq!(engine.poll_timeout(), None);
}

#[test]
fn multicast_overdue_block_drops_only_that_responder() {
    let start = Instant::now();
    let mut engine = engine();
    let handle = engine
        .submit_at(
            Request::get("coap://224.0.1.187/test").unwrap().non_confirmable(),
            all_coap_devices(),
            start,
        )
        .unwrap();
    let (_, request) = sent(&mut engine);
    let wait = engine.params().max_transmit_wait();

    let a: SocketAddr = "10.0.0.1:5683".parse().unwrap();
    let b: SocketAddr = "10.0.0.2:5683".parse().unwrap();
    let reply = |block: BlockInfo, payload: &[u8]| {
        let mut msg = Message::new(MsgType::Non, MsgCode::CONTENT, 0x20, request.token);
        msg.options.insert(BLOCK2, block).unwrap();
        msg.payload = payload.to_vec();
        msg
    };
    let first = BlockInfo::new(0, true, 0).unwrap();
    let last = BlockInfo::new(1, false, 0).unwrap();

    let later = start + Duration::from_secs(1);
    deliver(&mut engine, &reply(first, &[b'a'; 16]), a, start);
    deliver(&mut engine, &reply(first, &[b'b'; 16]), b, later);
    assert_eq!(sent(&mut engine).0, a);
    assert_eq!(sent(&mut engine).0, b);

    // Responder a never sends its second block.
    assert_eq!(engine.poll_timeout(), Some(start + wait));
    engine.handle_timeout(start + wait);
    assert!(engine.poll_event().is_none());
    assert!(engine.poll_transmit().is_none());
    assert_eq!(engine.state(handle), Some(ExchangeState::AwaitingResponse));
    assert_eq!(engine.poll_timeout(), Some(later + wait));

    deliver(&mut engine, &reply(last, b"B"), b, later);
    let mut from_b = vec![b'b'; 16];
    from_b.push(b'B');
    assert_eq!(multicast_responses(&mut engine), vec![(b, from_b)]);
    assert_eq!(engine.poll_timeout(), None);
}

#[test]
fn multicast_interleaved_blockwise() {
    let now = Instant::now();
    let mut engine = engine();
    let handle = engine
        .submit_at(
            Request::get("coap://224.0.1.187/test").unwrap().non_confirmable(),
            all_coap_devices(),
            now,
        )
        .unwrap();
    let (_, request) = sent(&mut engine);

    let a: SocketAddr = "10.0.0.1:5683".parse().unwrap();
    let b: SocketAddr = "10.0.0.2:61616".parse().unwrap();

    let reply = |msg_id: MsgId, block: BlockInfo, payload: &[u8]| {
        let mut msg = Message::new(MsgType::Non, MsgCode::CONTENT, msg_id, request.token);
        msg.options.insert(BLOCK2, block).unwrap();
        msg.payload = payload.to_vec();
        msg
    };
    let first = BlockInfo::new(0, true, 0).unwrap();
    let last = BlockInfo::new(1, false, 0).unwrap();

    deliver(&mut engine, &reply(0x10, first, &[b'a'; 16]), a, now);
    deliver(&mut engine, &reply(0x10, first, &[b'b'; 16]), b, now);

    for expected in &[a, b] {
        let (dest, follow_up) = sent(&mut engine);
        assert_eq!(dest, *expected);
        assert_eq!(follow_up.msg_type, MsgType::Non);
        assert_eq!(follow_up.token, request.token);
        assert_eq!(follow_up.block2(), Some(last));
    }

    deliver(&mut engine, &reply(0x11, last, b"B"), b, now);
    deliver(&mut engine, &reply(0x11, last, b"A"), a, now);

    let responses = multicast_responses(&mut engine);

    let mut from_b = vec![b'b'; 16];
    from_b.push(b'B');
    let mut from_a = vec![b'a'; 16];
    from_a.push(b'A');
    assert_eq!(responses, vec![(b, from_b), (a, from_a)]);

    engine.abort(handle);
    assert_eq!(events(&mut engine).len(), 2);
}

#[test]
fn largest_timing_parameters_time_out_cleanly() {
    let start = Instant::now();
    let mut engine = engine();
    let params = engine.params_mut();
    assert_eq!(
        params.set_ack_timeout(Duration::from_secs(u64::MAX / 2)),
        Err(Error::InvalidArgument)
    );
    params.set_ack_timeout(TransParams::MAX_ACK_TIMEOUT).unwrap();
    params
        .set_ack_random_factor(TransParams::MAX_ACK_RANDOM_FACTOR)
        .unwrap();
    params
        .set_max_retransmit(TransParams::MAX_RETRANSMIT_LIMIT)
        .unwrap();

    let non = engine
        .submit_at(
            Request::get("coap://10.20.30.40/non").unwrap().non_confirmable(),
            server(),
            start,
        )
        .unwrap();
    let con = engine
        .submit_at(Request::get("coap://10.20.30.40/con").unwrap(), server(), start)
        .unwrap();

    let mut transmissions = 0;
    while engine.poll_transmit().is_some() {
        transmissions += 1;
    }
    while let Some(deadline) = engine.poll_timeout() {
        engine.handle_timeout(deadline);
        while engine.poll_transmit().is_some() {
            transmissions += 1;
        }
    }

    // Two first transmissions plus every retransmission of the CON request.
    assert_eq!(transmissions, 2 + TransParams::MAX_RETRANSMIT_LIMIT);
    let timed_out: Vec<ExchangeHandle> = events(&mut engine)
        .into_iter()
        .filter_map(|event| match event {
            Event::Error {
                handle,
                error: Error::TimeOut,
            } => Some(handle),
            _ => None,
        })
        .collect();
    assert_eq!(timed_out.len(), 2);
    assert!(timed_out.contains(&non));
    assert!(timed_out.contains(&con));
    assert_eq!(engine.poll_timeout(), None);
}
