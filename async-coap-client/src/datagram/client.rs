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
use futures::channel::oneshot;
use futures::future::{select, Either};
use futures::prelude::*;
use futures_timer::Delay;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Size of the receive buffer. Larger datagrams are truncated by the socket.
const RECV_BUFFER_LEN: usize = 1500;

#[derive(Debug)]
struct Waiter {
    tx: oneshot::Sender<Result<Option<Message>, Error>>,
    error: Option<Error>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            debug!("Recovering from mutex poisoning");
            poisoned.into_inner()
        }
    }
}

/// Datagram-based CoAP client: an [`Engine`] driven over an [`AsyncDatagramSocket`].
///
/// Requests are submitted from any task; the protocol only makes progress
/// while [`DatagramClient::run`] is being polled.
///
/// ```no_run
/// # #![allow(unused)]
/// use async_coap_client::prelude::*;
/// use async_coap_client::datagram::{AllowStdUdpSocket, DatagramClient};
/// use futures::executor::block_on;
/// use futures::future::{select, Either};
/// use futures::prelude::*;
///
/// let socket = AllowStdUdpSocket::bind("0.0.0.0:0").expect("UDP bind failed");
/// let client = DatagramClient::new(socket);
///
/// let request = Request::get("coap://coap.me/test").unwrap();
/// let response = match block_on(select(client.send(request).boxed(), client.run().boxed())) {
///     Either::Left((response, _)) => response,
///     Either::Right(_) => panic!("client stopped"),
/// };
///
/// println!("{:?}", response);
/// ```
#[derive(Debug)]
pub struct DatagramClient<US: AsyncDatagramSocket> {
    socket: US,
    engine: Mutex<Engine<US::SocketAddr>>,
    subscribers: Mutex<Vec<UnboundedSender<Event<US::SocketAddr>>>>,
    waiters: Mutex<HashMap<ExchangeHandle, Waiter>>,
    kick_tx: UnboundedSender<()>,
    kick_rx: futures::lock::Mutex<UnboundedReceiver<()>>,
}

impl<US: AsyncDatagramSocket> DatagramClient<US> {
    /// Creates a client that talks through `socket`.
    pub fn new(socket: US) -> DatagramClient<US> {
        DatagramClient::with_engine(socket, Engine::new())
    }

    /// Creates a client around an already configured engine.
    pub fn with_engine(socket: US, engine: Engine<US::SocketAddr>) -> DatagramClient<US> {
        let (kick_tx, kick_rx) = unbounded();
        DatagramClient {
            socket,
            engine: Mutex::new(engine),
            subscribers: Mutex::new(Vec::new()),
            waiters: Mutex::new(HashMap::new()),
            kick_tx,
            kick_rx: futures::lock::Mutex::new(kick_rx),
        }
    }

    /// Borrows a reference to the underlying socket.
    pub fn socket(&self) -> &US {
        &self.socket
    }

    fn engine(&self) -> MutexGuard<'_, Engine<US::SocketAddr>> {
        lock(&self.engine)
    }

    fn kick(&self) {
        let _ = self.kick_tx.unbounded_send(());
    }

    /// Returns a stream of every [`Event`] emitted after this call.
    pub fn events(&self) -> UnboundedReceiver<Event<US::SocketAddr>> {
        let (tx, rx) = unbounded();
        lock(&self.subscribers).push(tx);
        rx
    }

    /// Resolves the host of `uri` to an address usable from our socket.
    pub fn resolve(&self, uri: &RequestUri) -> Result<US::SocketAddr, Error> {
        let addrs = US::lookup_host(&uri.host, uri.port).map_err(|e| {
            debug!("lookup of {:?} failed: {}", uri.host, e);
            Error::HostNotFound
        })?;

        let local = self.socket.local_addr().ok();
        addrs
            .filter_map(|addr| match local {
                Some(local) => addr.conforming_to(local),
                None => Some(addr),
            })
            .next()
            .ok_or(Error::HostNotFound)
    }

    fn start(
        &self,
        request: Request,
        waiter: Option<oneshot::Sender<Result<Option<Message>, Error>>>,
    ) -> Result<ExchangeHandle, Error> {
        let dest = self.resolve(request.uri())?;
        let handle = {
            let mut engine = self.engine();
            let handle = engine.submit(request, dest)?;
            if let Some(tx) = waiter {
                lock(&self.waiters).insert(handle, Waiter { tx, error: None });
            }
            handle
        };
        self.kick();
        Ok(handle)
    }

    /// Starts an exchange for `request`. Its events are delivered to every
    /// [`DatagramClient::events`] stream.
    ///
    /// Fails with [`Error::HostNotFound`] if the URI host does not resolve,
    /// or with any error [`Engine::submit`] reports.
    pub fn submit(&self, request: Request) -> Result<ExchangeHandle, Error> {
        self.start(request, None)
    }

    /// Sends `request` and waits for the outcome.
    ///
    /// Resolves to the final response, to `Ok(None)` if the exchange was
    /// aborted or cancelled, or to the error the exchange reported. For an
    /// observation this only resolves once the observation ends.
    pub async fn send(&self, request: Request) -> Result<Option<Message>, Error> {
        let (tx, rx) = oneshot::channel();
        self.start(request, Some(tx))?;
        rx.await.map_err(|_| Error::IOError)?
    }

    /// Aborts an exchange. See [`Engine::abort`].
    pub fn abort(&self, handle: ExchangeHandle) {
        self.engine().abort(handle);
        self.kick();
    }

    /// Stops an observation locally. See [`Engine::cancel_observe`].
    pub fn cancel_observe(&self, handle: ExchangeHandle) -> Result<(), Error> {
        let ret = self.engine().cancel_observe(handle);
        self.kick();
        ret
    }

    /// Stops an observation and tells the server. See [`Engine::deregister_observe`].
    pub fn deregister_observe(&self, handle: ExchangeHandle) -> Result<(), Error> {
        let ret = self.engine().deregister_observe(handle);
        self.kick();
        ret
    }

    /// Current transmission parameters.
    pub fn params(&self) -> TransParams {
        *self.engine().params()
    }

    /// Sets `ACK_TIMEOUT`. See [`TransParams::set_ack_timeout`].
    pub fn set_ack_timeout(&self, value: Duration) -> Result<(), Error> {
        self.engine().params_mut().set_ack_timeout(value)
    }

    /// Sets `ACK_RANDOM_FACTOR`. See [`TransParams::set_ack_random_factor`].
    pub fn set_ack_random_factor(&self, value: f64) -> Result<(), Error> {
        self.engine().params_mut().set_ack_random_factor(value)
    }

    /// Sets `MAX_RETRANSMIT`. See [`TransParams::set_max_retransmit`].
    pub fn set_max_retransmit(&self, value: u32) -> Result<(), Error> {
        self.engine().params_mut().set_max_retransmit(value)
    }

    /// Sets the preferred block size. See [`TransParams::set_block_size`].
    pub fn set_block_size(&self, value: usize) -> Result<(), Error> {
        self.engine().params_mut().set_block_size(value)
    }

    async fn flush(&self) {
        loop {
            let transmit = self.engine().poll_transmit();
            let transmit = match transmit {
                Some(transmit) => transmit,
                None => break,
            };
            if let Err(e) = self
                .socket
                .send_to(&transmit.payload, transmit.destination)
                .await
            {
                error!(
                    "send_to: io error: {:?} (dest={:?})",
                    e, transmit.destination
                );
            }
        }
    }

    fn dispatch_events(&self) {
        let events: Vec<Event<US::SocketAddr>> = {
            let mut engine = self.engine();
            std::iter::from_fn(|| engine.poll_event()).collect()
        };
        if events.is_empty() {
            return;
        }

        let mut subscribers = lock(&self.subscribers);
        let mut waiters = lock(&self.waiters);

        for event in events {
            match &event {
                Event::Error { handle, error } => {
                    if let Some(waiter) = waiters.get_mut(handle) {
                        waiter.error = Some(*error);
                    }
                }
                Event::Finished { handle, message } => {
                    if let Some(waiter) = waiters.remove(handle) {
                        let result = match waiter.error {
                            Some(error) => Err(error),
                            None => Ok(message.clone()),
                        };
                        let _ = waiter.tx.send(result);
                    }
                }
                _ => (),
            }

            subscribers.retain(|tx| tx.unbounded_send(event.clone()).is_ok());
        }
    }

    /// Drives the client: sends queued datagrams, feeds received ones to the
    /// engine, fires timers and delivers events.
    ///
    /// Only returns on a socket receive error. Only one `run` future makes
    /// progress at a time.
    pub async fn run(&self) -> Result<(), Error> {
        let mut buffer = vec![0u8; RECV_BUFFER_LEN];
        let mut kick = self.kick_rx.lock().await;

        loop {
            self.flush().await;
            self.dispatch_events();

            let deadline = self.engine().poll_timeout();
            let timer = match deadline {
                Some(deadline) => {
                    Delay::new(deadline.saturating_duration_since(Instant::now())).left_future()
                }
                None => future::pending().right_future(),
            };

            let received = match select(
                self.socket.recv_from(&mut buffer),
                select(kick.next(), timer),
            )
            .await
            {
                Either::Left((result, _)) => Some(result),
                Either::Right(_) => None,
            };

            match received {
                Some(Ok((len, source))) => {
                    self.engine()
                        .handle_datagram(&buffer[..len], source, Instant::now());
                }
                Some(Err(e)) => {
                    error!("recv_from: io error: {:?}", e);
                    return Err(Error::IOError);
                }
                None => self.engine().handle_timeout(Instant::now()),
            }
        }
    }
}
