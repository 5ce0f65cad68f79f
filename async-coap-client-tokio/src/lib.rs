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

//! This crate provides [`TokioAsyncUdpSocket`]\: an asynchronous, [Tokio][]-based
//! implementation of [`AsyncDatagramSocket`] for use with [`DatagramClient`].
//!
//! # Example
//!
//! ```no_run
//! use async_coap_client::prelude::*;
//! use async_coap_client_tokio::TokioAsyncUdpSocket;
//! use futures::future::{select, Either, FutureExt};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let socket = TokioAsyncUdpSocket::bind("[::]:0").expect("UDP bind failed");
//!
//!     let client = DatagramClient::new(socket);
//!
//!     // Build a GET request. Any block2 transfer in the response
//!     // is reassembled before it is handed back.
//!     let request = Request::get("coap://coap.me/large").expect("Bad URI");
//!
//!     // The client only makes progress while `run()` is being polled.
//!     let result = match select(client.send(request).boxed_local(), client.run().boxed_local()).await {
//!         Either::Left((result, _)) => result,
//!         Either::Right((err, _)) => panic!("Receive loop terminated: {:?}", err),
//!     };
//!
//!     assert!(result.is_ok(), "Error: {:?}", result.err().unwrap());
//! }
//! ```
//!
//! [`AsyncDatagramSocket`]: async_coap_client::datagram::AsyncDatagramSocket
//! [`DatagramClient`]: async_coap_client::datagram::DatagramClient
//! [Tokio]: https://tokio.rs/

#![warn(rust_2018_idioms, missing_debug_implementations, missing_docs)]

#[macro_use]
extern crate log;

mod tokio_async_udp_socket;
pub use tokio_async_udp_socket::TokioAsyncUdpSocket;
