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

//! An asynchronous, client-side implementation of the Constrained Application Protocol (CoAP).
//!
//! The heart of this crate is [`Engine`], a sans-IO protocol state machine covering
//! [IETF-RFC7252] messaging (confirmable retransmission, deduplication, separate
//! responses), [IETF-RFC7959] blockwise transfers in both directions, [IETF-RFC7641]
//! observations and multicast requests with per-responder reassembly. The engine never
//! touches a socket or a clock: you feed it datagrams and the current time, and it hands
//! back datagrams to send, application [`Event`]s and its next deadline.
//!
//! For the common case, [`datagram::DatagramClient`] drives an engine over any socket
//! implementing [`datagram::AsyncDatagramSocket`]. A [Tokio](https://tokio.rs)-based
//! `UdpSocket` implementation lives in the `async-coap-client-tokio` crate[^AllowStdUdpSocket].
//!
//! [^AllowStdUdpSocket]: A naive wrapper around Rust's standard [`std::net::UdpSocket`]
//! ([`datagram::AllowStdUdpSocket`]) is included in this crate, but it should usually be avoided
//! in favor of better-performing options.
//!
//! [IETF-RFC7252]: https://tools.ietf.org/html/rfc7252
//! [IETF-RFC7959]: https://tools.ietf.org/html/rfc7959
//! [IETF-RFC7641]: https://tools.ietf.org/html/rfc7641
//!
//! ## Driving the engine by hand
//!
//! ```
//! use async_coap_client::prelude::*;
//! use std::net::SocketAddr;
//! use std::time::Instant;
//!
//! let server: SocketAddr = "192.0.2.1:5683".parse().unwrap();
//! let mut engine = Engine::new();
//!
//! let handle = engine.submit(Request::get("coap://192.0.2.1/sensors/temp")?, server)?;
//!
//! // This is what would be written to the socket.
//! let transmit = engine.poll_transmit().unwrap();
//! assert_eq!(transmit.destination, server);
//!
//! // Pretend the server answered with a piggybacked response.
//! let request = Message::from_bytes(&transmit.payload)?;
//! let mut response = Message::new(MsgType::Ack, MsgCode::CONTENT, request.msg_id, request.token);
//! response.payload = b"21.5".to_vec();
//! engine.handle_datagram(&response.to_bytes(), server, Instant::now());
//!
//! match engine.poll_event() {
//!     Some(Event::Finished { handle: h, message: Some(msg) }) => {
//!         assert_eq!(h, handle);
//!         assert_eq!(msg.payload_as_str(), Some("21.5"));
//!     }
//!     other => panic!("unexpected {:?}", other),
//! }
//! # Ok::<(), Error>(())
//! ```
//!
//! ## Observing a resource
//!
//! Observations report each fresh notification as an [`Event::Notified`]. Notifications
//! that arrive out of order are dropped, and blockwise notifications are reassembled
//! before they are delivered. [`Engine::cancel_observe`] forgets the observation locally,
//! while [`Engine::deregister_observe`] also tells the server.
//!
//! ## Multicast
//!
//! A non-confirmable request to a multicast address stays open until it is aborted, and
//! every complete response becomes an [`Event::MulticastResponse`] carrying the sender's
//! address. Confirmable multicast requests are refused with [`Error::MulticastConfirmable`].

#![warn(rust_2018_idioms)]
#![warn(missing_debug_implementations)]
#![warn(clippy::all)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;

#[macro_use]
extern crate lazy_static;

pub mod message;
use message::*;

pub mod option;
use option::*;

mod content_format;
pub use content_format::ContentFormat;

mod socketaddr;
pub use socketaddr::SocketAddrExt;

mod block;
pub use block::*;

mod trans_params;
pub use trans_params::*;

mod request;
pub use request::*;

mod exchange;
pub use exchange::{ExchangeHandle, ExchangeState};
use exchange::{Exchange, ExchangeKind, Outstanding};

mod engine;
pub use engine::{Engine, Event, Transmit};

mod observe;
pub use observe::{is_fresh, OBSERVE_FRESHNESS_WINDOW};
use observe::{ObserveState, ObserveStep};

mod multicast;
use multicast::{MulticastState, MulticastStep};

mod response_tracker;
use response_tracker::ResponseTracker;

mod timer;
use timer::TimerQueue;

pub mod consts;
#[doc(hidden)]
pub use consts::*;

mod error;
pub use error::*;

mod util;

pub mod datagram;

/// The types most applications need, for glob import.
pub mod prelude {
    pub use super::datagram::DatagramClient;

    pub use super::{Engine, Event, ExchangeHandle, ExchangeState, Transmit};
    pub use super::{Request, RequestUri};

    pub use super::BlockInfo;
    pub use super::ContentFormat;
    pub use super::Error;
    pub use super::TransParams;

    pub use super::message::Message;
    pub use super::message::MsgCode;
    pub use super::message::MsgCodeClass;
    pub use super::message::MsgId;
    pub use super::message::MsgToken;
    pub use super::message::MsgType;

    pub use super::option;
    pub use option::OptionKey;
    pub use option::OptionNumber;
    pub use option::OptionSet;

    pub use super::SocketAddrExt;
}
