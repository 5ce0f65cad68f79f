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

use async_coap_client::datagram::{
    AllowStdUdpSocket, AsyncDatagramSocket, AsyncRecvFrom, AsyncSendTo, DatagramSocketTypes,
};
use async_coap_client::Error;
use futures::task::{Context, Poll};
use std::net::{SocketAddr, ToSocketAddrs};
use std::ops::Deref;
use std::pin::Pin;
use tokio::io::ReadBuf;
use tokio::net::UdpSocket;

/// An asynchronous [`AsyncDatagramSocket`] wrapper around [`tokio::net::UdpSocket`].
///
/// This type differs from [`AllowStdUdpSocket`] in that it provides a real asynchronous,
/// event-driven interface instead of faking one.
///
/// In order to use this type, you must be using [Tokio][] for your event loop: the
/// constructors must be called from within a Tokio runtime.
///
/// [Tokio]: https://tokio.rs/
#[derive(Debug)]
pub struct TokioAsyncUdpSocket(UdpSocket);

impl TokioAsyncUdpSocket {
    /// Analog of [`std::net::UdpSocket::bind`] for [`TokioAsyncUdpSocket`].
    ///
    /// A port that is already taken is reported as [`Error::AddressInUse`].
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use async_coap_client_tokio::TokioAsyncUdpSocket;
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), async_coap_client::Error> {
    /// let async_socket = TokioAsyncUdpSocket::bind("[::]:0")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn bind<A>(addr: A) -> Result<TokioAsyncUdpSocket, Error>
    where
        A: ToSocketAddrs,
    {
        let udp_socket = std::net::UdpSocket::bind(addr).map_err(|e| {
            warn!("bind failed: {}", e);
            Error::from(e)
        })?;
        if let Err(e) = udp_socket.set_broadcast(true) {
            debug!("unable to enable broadcast: {}", e);
        }
        Self::from_std(udp_socket)
    }

    /// Upgrades a [`std::net::UdpSocket`] by wrapping it in a [`TokioAsyncUdpSocket`].
    pub fn from_std(udp_socket: std::net::UdpSocket) -> Result<TokioAsyncUdpSocket, Error> {
        udp_socket.set_nonblocking(true)?;
        Ok(TokioAsyncUdpSocket(UdpSocket::from_std(udp_socket)?))
    }
}

impl AsyncDatagramSocket for TokioAsyncUdpSocket {}

impl DatagramSocketTypes for TokioAsyncUdpSocket {
    type SocketAddr = SocketAddr;
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
        // Name resolution, including the all-coap-devices pseudo-host, is the same
        // as for the blocking socket.
        AllowStdUdpSocket::lookup_host(host, port)
    }
}

impl AsyncSendTo for TokioAsyncUdpSocket {
    fn poll_send_to(
        self: Pin<&Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
        addr: Self::SocketAddr,
    ) -> Poll<Result<usize, Self::Error>> {
        self.0.poll_send_to(cx, buf, addr)
    }
}

impl AsyncRecvFrom for TokioAsyncUdpSocket {
    fn poll_recv_from(
        self: Pin<&Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<Result<(usize, Self::SocketAddr), Self::Error>> {
        let mut read_buf = ReadBuf::new(buf);
        match self.0.poll_recv_from(cx, &mut read_buf) {
            Poll::Ready(Ok(from)) => Poll::Ready(Ok((read_buf.filled().len(), from))),
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Deref for TokioAsyncUdpSocket {
    type Target = UdpSocket;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
