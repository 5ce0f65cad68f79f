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

//! Async driver for the [`Engine`] over datagram sockets, with associated socket abstractions.
//!
//! The driver is [`DatagramClient`]. It uses an asynchronous datagram
//! socket that implements the trait [`AsyncDatagramSocket`] and all of its required dependency
//! traits ([`DatagramSocketTypes`], [`AsyncSendTo`], [`AsyncRecvFrom`], [`Send`], and [`Sync`]).
//!
//! [`DatagramClient`]: datagram::DatagramClient
//! [`DatagramSocketTypes`]: datagram::DatagramSocketTypes
//! [`AsyncDatagramSocket`]: datagram::AsyncDatagramSocket
//! [`AsyncSendTo`]: datagram::AsyncSendTo
//! [`AsyncRecvFrom`]: datagram::AsyncRecvFrom
//!
use super::*;

mod async_socket;
pub use async_socket::{
    AsyncDatagramSocket, AsyncRecvFrom, AsyncSendTo, DatagramSocketTypes, RecvFromFuture,
    SendToFuture,
};

mod allow_udp_socket;
pub use allow_udp_socket::AllowStdUdpSocket;

mod channel_socket;
pub use channel_socket::{ChannelPeer, ChannelSocket, ChannelSocketAddr};

mod null_socket;
pub use null_socket::NullSocket;
pub use null_socket::NullSocketAddr;

mod client;
pub use client::DatagramClient;
