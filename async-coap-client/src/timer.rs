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
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

/// Deadline queue for exchange timers.
///
/// Cancelling is done by the owner bumping the exchange's generation
/// counter; entries whose generation no longer matches are skipped when
/// they reach the front.
#[derive(Debug, Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<Reverse<(Instant, ExchangeHandle, u64)>>,
}

impl TimerQueue {
    pub fn new() -> TimerQueue {
        TimerQueue::default()
    }

    pub fn push(&mut self, deadline: Instant, handle: ExchangeHandle, generation: u64) {
        self.heap.push(Reverse((deadline, handle, generation)));
    }

    /// Earliest deadline whose entry `is_live` accepts. Stale entries in
    /// front of it are discarded.
    pub fn next_deadline<F>(&mut self, mut is_live: F) -> Option<Instant>
    where
        F: FnMut(ExchangeHandle, u64) -> bool,
    {
        while let Some(Reverse((deadline, handle, generation))) = self.heap.peek().copied() {
            if is_live(handle, generation) {
                return Some(deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Removes and returns the earliest entry due at or before `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Option<(Instant, ExchangeHandle, u64)> {
        match self.heap.peek() {
            Some(Reverse((deadline, _, _))) if *deadline <= now => {
                self.heap.pop().map(|Reverse(entry)| entry)
            }
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn ordering_and_cancellation() {
        let start = Instant::now();
        let mut queue = TimerQueue::new();
        queue.push(start + Duration::from_secs(3), ExchangeHandle(1), 0);
        queue.push(start + Duration::from_secs(1), ExchangeHandle(2), 0);
        queue.push(start + Duration::from_secs(2), ExchangeHandle(3), 5);

        // Handle 2 was cancelled by moving to generation 1.
        let live = |handle: ExchangeHandle, generation: u64| handle != ExchangeHandle(2) || generation == 1;
        assert_eq!(queue.next_deadline(live), Some(start + Duration::from_secs(2)));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop_expired(start + Duration::from_millis(1500)), None);
        assert_eq!(
            queue.pop_expired(start + Duration::from_secs(5)),
            Some((start + Duration::from_secs(2), ExchangeHandle(3), 5))
        );
        assert_eq!(
            queue.pop_expired(start + Duration::from_secs(5)),
            Some((start + Duration::from_secs(3), ExchangeHandle(1), 0))
        );
        assert_eq!(queue.pop_expired(start + Duration::from_secs(5)), None);
        assert_eq!(queue.next_deadline(live), None);
    }
}
