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
use futures::prelude::*;
use futures::task::{Context, Poll};
use futures_timer::Delay;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, ToSocketAddrs, UdpSocket};
use std::ops::Deref;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

/// A wrapper around [`std::net::UdpSocket`] that implements [`AsyncDatagramSocket`].
///
/// This can be used to allow the standard rust [`UdpSocket`] (which doesn't provide an
/// asynchronous API) to be used in an asynchronous fashion.
///
/// Note that by default this wrapper will block execution whenever one of the `poll` methods is
/// called (An exception is any instance created with [`AllowStdUdpSocket::bind`]).
/// You can fake true asynchronous behavior by calling `set_nonblocking(true)` or
/// `set_read_timeout()`. In the case where a UDP message is not received when polled (or it
/// times out waiting for a response), a `futures_timer::Delay` is used to schedule an appropriate
/// duration (set via `set_async_poll_interval()`) after which it can try again.
///
/// As such, it is really intended to be a convenience stop-gap to get things up and running
/// quickly. For production code, use something truly asynchronous, like the tokio socket in
/// `async-coap-client-tokio`.
#[derive(Debug)]
pub struct AllowStdUdpSocket(UdpSocket, Mutex<Option<Delay>>, Option<Duration>);

impl AllowStdUdpSocket {
    /// The default interval between polling attempts.
    ///
    /// This value can be overridden by [`AllowStdUdpSocket::set_async_poll_interval`].
    const DEFAULT_ASYNC_POLL_INTERVAL: Duration = Duration::from_millis(30);

    /// Upgrades the given [`std::net::UdpSocket`] to an instance of [`AllowStdUdpSocket`].
    ///
    /// Note that no operations are performed on `udp_socket` by this method. It is recommended
    /// that you call [`std::net::UdpSocket::set_nonblocking`] on the socket before using this
    /// method.
    pub fn from_std(udp_socket: UdpSocket) -> AllowStdUdpSocket {
        AllowStdUdpSocket(
            udp_socket,
            Mutex::new(None),
            Some(Self::DEFAULT_ASYNC_POLL_INTERVAL),
        )
    }

    /// Analog of [`std::net::UdpSocket::bind`] for [`AllowStdUdpSocket`].
    ///
    /// The underlying `UdpSocket` is put in non-blocking mode. A port that is already taken
    /// is reported as [`Error::AddressInUse`].
    pub fn bind<A>(addr: A) -> Result<AllowStdUdpSocket, Error>
    where
        A: ToSocketAddrs,
    {
        let udp_socket = UdpSocket::bind(addr).map_err(|e| {
            warn!("bind failed: {}", e);
            Error::from(e)
        })?;
        udp_socket.set_nonblocking(true)?;
        if let Err(e) = udp_socket.set_broadcast(true) {
            debug!("unable to enable broadcast: {}", e);
        }
        Ok(AllowStdUdpSocket::from_std(udp_socket))
    }

    /// Changes the async poll interval for this socket, returning the previous value.
    ///
    /// A value of `None` indicates that no timed polling should be performed.
    pub fn set_async_poll_interval(&mut self, mut dur: Option<Duration>) -> Option<Duration> {
        std::mem::swap(&mut self.2, &mut dur);
        dur
    }

    fn wait_for_data(&self, cx: &mut Context<'_>) {
        if let Some(d) = self.2 {
            let mut lock = match self.1.lock() {
                Ok(lock) => lock,
                Err(poisoned) => poisoned.into_inner(),
            };
            match lock.as_mut() {
                Some(delay) => delay.reset(d),
                None => *lock = Some(Delay::new(d)),
            }
            if let Some(delay) = lock.as_mut() {
                let _ = delay.poll_unpin(cx);
            }
        }
    }
}

impl Unpin for AllowStdUdpSocket {}

impl AsyncDatagramSocket for AllowStdUdpSocket {}

impl DatagramSocketTypes for AllowStdUdpSocket {
    type SocketAddr = std::net::SocketAddr;
    type Error = std::io::Error;

    fn local_addr(&self) -> Result<Self::SocketAddr, Self::Error> {
        self.0.local_addr()
    }

    fn lookup_host(
        host: &str,
        port: u16,
    ) -> Result<std::vec::IntoIter<Self::SocketAddr>, Self::Error>
    where
        Self: Sized,
    {
        if host == ALL_COAP_DEVICES_HOSTNAME {
            Ok(vec![
                SocketAddr::V6(SocketAddrV6::new(
                    Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfd),
                    port,
                    0,
                    0,
                )),
                SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(224, 0, 1, 187), port)),
                SocketAddr::V6(SocketAddrV6::new(
                    Ipv6Addr::new(0xff05, 0, 0, 0, 0, 0, 0, 0xfd),
                    port,
                    0,
                    0,
                )),
            ]
            .into_iter())
        } else {
            (host, port).to_socket_addrs()
        }
    }
}

impl AsyncSendTo for AllowStdUdpSocket {
    fn poll_send_to(
        self: Pin<&Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
        addr: Self::SocketAddr,
    ) -> Poll<Result<usize, Self::Error>> {
        match self.get_ref().0.send_to(buf, addr) {
            Ok(written) => Poll::Ready(Ok(written)),
            Err(e) => {
                if e.kind() == std::io::ErrorKind::WouldBlock {
                    self.get_ref().wait_for_data(cx);
                    Poll::Pending
                } else {
                    Poll::Ready(Err(e))
                }
            }
        }
    }
}

impl AsyncRecvFrom for AllowStdUdpSocket {
    fn poll_recv_from(
        self: Pin<&Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<Result<(usize, Self::SocketAddr), Self::Error>> {
        match self.0.recv_from(buf) {
            Ok((size, from)) => Poll::Ready(Ok((size, from))),
            Err(e) => match e.kind() {
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                    self.wait_for_data(cx);
                    Poll::Pending
                }
                _ => Poll::Ready(Err(e)),
            },
        }
    }
}

impl Deref for AllowStdUdpSocket {
    type Target = UdpSocket;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
