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
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::lock::Mutex;
use futures::prelude::*;
use futures::task::{Context, Poll};
use std::fmt::{Display, Formatter};
use std::pin::Pin;

/// Simplified "SocketAddr" for [`ChannelSocket`]: a one-byte station number.
///
/// Station [`ChannelSocketAddr::MULTICAST`] stands for a multicast group.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct ChannelSocketAddr(pub u8);

impl ChannelSocketAddr {
    /// The multicast "group" address.
    pub const MULTICAST: ChannelSocketAddr = ChannelSocketAddr(0xFF);
}

impl Display for ChannelSocketAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "chan:{}", self.0)
    }
}

impl SocketAddrExt for ChannelSocketAddr {
    type Host = u8;

    fn is_multicast(&self) -> bool {
        *self == ChannelSocketAddr::MULTICAST
    }

    fn host(&self) -> Self::Host {
        self.0
    }

    fn port(&self) -> u16 {
        0
    }

    fn addr_to_string(&self) -> String {
        self.0.to_string()
    }
}

type Datagram = (Vec<u8>, ChannelSocketAddr);

/// An instance of [`AsyncDatagramSocket`] backed by in-memory channels.
///
/// Every datagram sent through the socket shows up at the paired
/// [`ChannelPeer`], and everything the peer injects is received by the
/// socket. Host names resolve to station 1, except
/// [`ALL_COAP_DEVICES_HOSTNAME`] which resolves to
/// [`ChannelSocketAddr::MULTICAST`]. Numeric host names resolve to that
/// station.
#[derive(Debug)]
pub struct ChannelSocket {
    local: ChannelSocketAddr,
    sender: UnboundedSender<Datagram>,
    receiver: Mutex<UnboundedReceiver<Datagram>>,
}

/// The far end of a [`ChannelSocket`].
#[derive(Debug)]
pub struct ChannelPeer {
    sent: UnboundedReceiver<Datagram>,
    inject: UnboundedSender<Datagram>,
}

impl ChannelSocket {
    /// Creates a socket with local address `local`, and its peer.
    pub fn new(local: ChannelSocketAddr) -> (ChannelSocket, ChannelPeer) {
        let (sender, sent) = unbounded();
        let (inject, receiver) = unbounded();
        let socket = ChannelSocket {
            local,
            sender,
            receiver: Mutex::new(receiver),
        };
        (socket, ChannelPeer { sent, inject })
    }
}

impl ChannelPeer {
    /// Waits for the next datagram sent by the socket, with its destination.
    /// Returns `None` once the socket is gone.
    pub async fn recv(&mut self) -> Option<(Vec<u8>, ChannelSocketAddr)> {
        self.sent.next().await
    }

    /// Returns a datagram already sent by the socket, without waiting.
    pub fn try_recv(&mut self) -> Option<(Vec<u8>, ChannelSocketAddr)> {
        self.sent.try_next().ok().flatten()
    }

    /// Delivers `datagram` to the socket as if sent from `from`.
    pub fn send(&self, datagram: &[u8], from: ChannelSocketAddr) -> Result<(), Error> {
        self.inject
            .unbounded_send((datagram.to_vec(), from))
            .map_err(|_| Error::IOError)
    }
}

impl Unpin for ChannelSocket {}

impl AsyncDatagramSocket for ChannelSocket {}

impl DatagramSocketTypes for ChannelSocket {
    type SocketAddr = ChannelSocketAddr;
    type Error = super::Error;

    fn local_addr(&self) -> Result<Self::SocketAddr, Self::Error> {
        Ok(self.local)
    }

    fn lookup_host(
        host: &str,
        _port: u16,
    ) -> Result<std::vec::IntoIter<Self::SocketAddr>, Self::Error>
    where
        Self: Sized,
    {
        let addr = if host == ALL_COAP_DEVICES_HOSTNAME {
            ChannelSocketAddr::MULTICAST
        } else if let Ok(station) = host.parse::<u8>() {
            ChannelSocketAddr(station)
        } else if host.ends_with(".invalid") {
            return Err(Error::HostNotFound);
        } else {
            ChannelSocketAddr(1)
        };
        Ok(vec![addr].into_iter())
    }
}

impl AsyncSendTo for ChannelSocket {
    fn poll_send_to(
        self: Pin<&Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
        addr: Self::SocketAddr,
    ) -> Poll<Result<usize, Self::Error>> {
        match self.get_ref().sender.unbounded_send((buf.to_vec(), addr)) {
            Ok(()) => Poll::Ready(Ok(buf.len())),
            Err(_) => Poll::Ready(Err(Error::IOError)),
        }
    }
}

impl AsyncRecvFrom for ChannelSocket {
    fn poll_recv_from(
        self: Pin<&Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<Result<(usize, Self::SocketAddr), Self::Error>> {
        let mut receiver_lock_future = self.get_ref().receiver.lock();
        let receiver_lock_future = Pin::new(&mut receiver_lock_future);

        if let Poll::Ready(mut receiver_guard) = receiver_lock_future.poll(cx) {
            let receiver: &mut UnboundedReceiver<Datagram> = &mut receiver_guard;
            match receiver.poll_next_unpin(cx) {
                Poll::Ready(Some((packet, from))) => {
                    let len = packet.len();
                    if buf.len() >= len {
                        buf[..len].copy_from_slice(&packet);
                        Poll::Ready(Ok((len, from)))
                    } else {
                        Poll::Ready(Err(Error::IOError))
                    }
                }
                Poll::Ready(None) => Poll::Ready(Err(Error::IOError)),
                Poll::Pending => Poll::Pending,
            }
        } else {
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn datagrams_cross_over() {
        let (socket, mut peer) = ChannelSocket::new(ChannelSocketAddr(0));

        block_on(socket.send_to(b"ping", ChannelSocketAddr(7))).unwrap();
        assert_eq!(
            peer.try_recv(),
            Some((b"ping".to_vec(), ChannelSocketAddr(7)))
        );
        assert_eq!(peer.try_recv(), None);

        peer.send(b"pong", ChannelSocketAddr(7)).unwrap();
        let mut buffer = [0u8; 16];
        let (len, from) = block_on(socket.recv_from(&mut buffer)).unwrap();
        assert_eq!(&buffer[..len], b"pong");
        assert_eq!(from, ChannelSocketAddr(7));
    }

    #[test]
    fn lookup() {
        let resolve = |host: &str| {
            ChannelSocket::lookup_host(host, 5683).map(|mut addrs| addrs.next())
        };
        assert_eq!(
            resolve(ALL_COAP_DEVICES_HOSTNAME),
            Ok(Some(ChannelSocketAddr::MULTICAST))
        );
        assert_eq!(resolve("42"), Ok(Some(ChannelSocketAddr(42))));
        assert_eq!(resolve("server"), Ok(Some(ChannelSocketAddr(1))));
        assert_eq!(resolve("nowhere.invalid").err(), Some(Error::HostNotFound));
        assert!(ChannelSocketAddr::MULTICAST.is_multicast());
    }
}
