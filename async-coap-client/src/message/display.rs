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

/// Helper struct for formatting a CoAP buffer for display.
#[derive(Copy, Clone)]
pub struct CoapByteDisplayFormatter<'buf>(pub &'buf [u8]);

impl<'buf> std::fmt::Display for CoapByteDisplayFormatter<'buf> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match codec::decode(self.0) {
            Ok(msg) => std::fmt::Display::fmt(&msg, f),
            Err(e) => write!(f, "<CORRUPTED {:?} {:02x?}>", e, self.0),
        }
    }
}

impl<'buf> std::fmt::Debug for CoapByteDisplayFormatter<'buf> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match codec::decode(self.0) {
            Ok(msg) => write!(f, "CoapByteDisplayFormatter({}, {:02x?})", msg, self.0),
            Err(e) => write!(f, "<CORRUPTED {:?} {:02x?}>", e, self.0),
        }
    }
}
