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

use std::hash::Hash;

/// Extension trait for `SocketAddr` types that gives the engine the
/// information it needs about a peer address.
///
/// The engine itself never opens sockets; it only compares addresses and
/// asks whether a destination is multicast.
pub trait SocketAddrExt:
    Sized + Copy + core::fmt::Display + core::fmt::Debug + Send + Sync + Unpin + Eq + Hash + 'static
{
    /// The host part of the address. Multicast responders are told apart
    /// by host alone, since a responder may answer from any port.
    type Host: Copy + Eq + Hash + core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    /// Determines if the address in this `SocketAddr` is a multicast/broadcast address or not.
    fn is_multicast(&self) -> bool;

    /// Returns the host part of this address.
    fn host(&self) -> Self::Host;

    /// Returns the port number for this socket.
    ///
    /// A value of zero indicates no specific value.
    fn port(&self) -> u16;

    /// Returns a version of this socket address that conforms to the address type of `local`,
    /// or `None` if such a conversion is not possible.
    ///
    /// This method is useful in mixed ipv6/ipv4 environments.
    #[allow(unused_variables)]
    fn conforming_to(&self, local: Self) -> Option<Self> {
        Some(*self)
    }

    /// Renders the address portion to a string.
    fn addr_to_string(&self) -> String;
}

impl SocketAddrExt for std::net::SocketAddr {
    type Host = std::net::IpAddr;

    fn is_multicast(&self) -> bool {
        self.ip().is_multicast()
            || if let std::net::IpAddr::V4(addr) = self.ip() {
                addr.is_broadcast()
            } else {
                false
            }
    }

    fn host(&self) -> Self::Host {
        self.ip()
    }

    fn port(&self) -> u16 {
        self.port()
    }

    fn conforming_to(&self, local: Self) -> Option<Self> {
        if self.is_ipv6() == local.is_ipv6() {
            Some(*self)
        } else if let std::net::SocketAddr::V4(v4) = self {
            Some((v4.ip().to_ipv6_mapped(), v4.port()).into())
        } else {
            None
        }
    }

    fn addr_to_string(&self) -> String {
        self.ip().to_string()
    }
}
