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

//! Blockwise transfers ([IETF-RFC7959]).
//!
//! [`BlockSegmenter`] walks an outbound payload one block at a time and
//! [`BlockReconstructor`] reassembles an inbound one. Neither touches the
//! network; the engine feeds them and decides what to send next.
//!
//! [IETF-RFC7959]: https://tools.ietf.org/html/rfc7959

use super::*;
use std::convert::From;
use std::fmt::{Debug, Display, Formatter};

/// Type for interpreting `block1` and `block2` option values.
#[derive(Copy, Clone, Eq, Ord, Hash, PartialOrd, PartialEq)]
pub struct BlockInfo(pub u32);

impl BlockInfo {
    const MORE_FLAG: u32 = 0b1000;

    /// Maximum legal value for `num`.
    pub const NUM_MAX: u32 = (1 << 20) - 1;

    const SZX_RESERVED: u8 = 0b0111;

    /// Maximum legal value for `szx`.
    pub const SZX_MAX: u8 = Self::SZX_RESERVED - 1;

    /// Constructs a new `BlockInfo` from the number, more flag, and size exponent.
    pub fn new(num: u32, m: bool, szx: u8) -> Option<BlockInfo> {
        if num > Self::NUM_MAX || szx > Self::SZX_MAX {
            None
        } else {
            Some(BlockInfo((num << 4) + ((m as u32) << 3) + szx as u32))
        }
    }

    /// Block number value.
    #[inline]
    pub fn num(&self) -> u32 {
        self.0 >> 4
    }

    /// More flag value. If set, there are more blocks to follow.
    #[inline]
    pub fn more_flag(&self) -> bool {
        (self.0 & Self::MORE_FLAG) == Self::MORE_FLAG
    }

    /// Block size exponent field value.
    #[inline]
    pub fn szx(&self) -> u8 {
        self.0 as u8 & 0b111
    }

    /// The offset (in bytes) that this block starts at.
    #[inline]
    pub fn offset(&self) -> usize {
        (self.num() as usize) << (self.szx() as usize + 4)
    }

    /// The length of this block, in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        1 << (self.szx() as usize + 4)
    }

    /// Checks the validity of the contained value.
    pub fn is_invalid(&self) -> bool {
        (self.num() > Self::NUM_MAX) || self.szx() == Self::SZX_RESERVED
    }

    /// Checks the contained value for validity and, if valid, returns it in an `Option`.
    pub fn valid(self) -> Option<BlockInfo> {
        if self.is_invalid() {
            None
        } else {
            Some(self)
        }
    }

    /// Calculates what the next block will be, if any.
    pub fn next(&self) -> Option<BlockInfo> {
        if self.num() < Self::NUM_MAX {
            BlockInfo(self.0 + 0x10).valid()
        } else {
            None
        }
    }

    /// Returns this `BlockInfo`'s value *with* the more flag set.
    pub fn with_more_flag(&self) -> BlockInfo {
        BlockInfo(self.0 | Self::MORE_FLAG)
    }

    /// Returns this `BlockInfo`'s value *without* the more flag set.
    pub fn without_more_flag(&self) -> BlockInfo {
        BlockInfo(self.0 & !Self::MORE_FLAG)
    }

    /// Converts a block size in bytes to its size exponent. Only the seven
    /// sizes 16 through 1024 have one.
    pub fn szx_for_size(size: usize) -> Option<u8> {
        match size {
            16 => Some(0),
            32 => Some(1),
            64 => Some(2),
            128 => Some(3),
            256 => Some(4),
            512 => Some(5),
            1024 => Some(6),
            _ => None,
        }
    }
}

impl From<u32> for BlockInfo {
    fn from(x: u32) -> Self {
        BlockInfo(x)
    }
}

impl Default for BlockInfo {
    /// Returns a block info with an offset of zero and a block size of 1024.
    fn default() -> Self {
        BlockInfo(6)
    }
}

impl Display for BlockInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "{}/{}/{}",
            self.num(),
            self.more_flag() as u8,
            self.len()
        )?;
        if self.is_invalid() {
            f.write_str("(!)")
        } else {
            Ok(())
        }
    }
}

impl Debug for BlockInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "BlockInfo(0x{:06X}, ", self.0)?;
        Display::fmt(self, f)?;
        f.write_str(")")
    }
}

/// Splits an outbound payload into blocks, one in flight at a time.
#[derive(Debug, Clone)]
pub struct BlockSegmenter {
    payload: Vec<u8>,
    offset: usize,
    szx: u8,
}

impl BlockSegmenter {
    /// Creates a segmenter that starts at block zero with the given size exponent.
    pub fn new(payload: Vec<u8>, szx: u8) -> BlockSegmenter {
        BlockSegmenter {
            payload,
            offset: 0,
            szx: szx.min(BlockInfo::SZX_MAX),
        }
    }

    fn block_len(&self) -> usize {
        1 << (self.szx as usize + 4)
    }

    /// Total payload length, for the Size1 option.
    pub fn total_len(&self) -> usize {
        self.payload.len()
    }

    /// The block currently in flight and its slice of the payload.
    pub fn current(&self) -> (BlockInfo, &[u8]) {
        let end = (self.offset + self.block_len()).min(self.payload.len());
        let num = (self.offset >> (self.szx as usize + 4)) as u32;
        let more = end < self.payload.len();
        let block = BlockInfo::new(num.min(BlockInfo::NUM_MAX), more, self.szx)
            .unwrap_or_default();
        (block, &self.payload[self.offset..end])
    }

    /// True once the final block has been handed out by [`BlockSegmenter::current`].
    pub fn is_last(&self) -> bool {
        self.offset + self.block_len() >= self.payload.len()
    }

    /// Moves past the current block after the peer acknowledged it.
    ///
    /// `ack` is the Block1 value of the reply, if any. A smaller size
    /// exponent in the reply is adopted for the remaining blocks, keeping
    /// the byte offset intact. Returns `Ok(false)` when nothing is left.
    pub fn advance(&mut self, ack: Option<BlockInfo>) -> Result<bool, Error> {
        let sent = self.block_len();
        if let Some(ack) = ack {
            if ack.is_invalid() {
                return Err(Error::BadOption);
            }
            if ack.szx() < self.szx {
                debug!("peer shrank block1 size {} -> {}", sent, ack.len());
                self.szx = ack.szx();
            }
        }
        self.offset = (self.offset + sent).min(self.payload.len());
        if self.offset >> (self.szx as usize + 4) > BlockInfo::NUM_MAX as usize {
            return Err(Error::RequestEntityTooLarge);
        }
        Ok(self.offset < self.payload.len())
    }
}

/// Tool for reconstructing block-wise messages.
///
/// Blocks must arrive strictly in order, starting at zero unless the
/// instance was created with [`BlockReconstructor::from_any_block`]. The
/// first block fixes the size; later blocks may only shrink it.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct BlockReconstructor {
    buffer: Vec<u8>,
    next_num: u32,
    szx: Option<u8>,
    is_finished: bool,
    any_start: bool,
}

impl BlockReconstructor {
    /// Creates a new, empty instance of `BlockReconstructor`.
    pub fn new() -> BlockReconstructor {
        BlockReconstructor::default()
    }

    /// Creates a reconstructor that starts at whatever block number it is
    /// fed first. Multicast responders may begin their reply mid-resource.
    pub fn from_any_block() -> BlockReconstructor {
        BlockReconstructor {
            any_start: true,
            ..BlockReconstructor::default()
        }
    }

    /// The block this object wants next, once the size is known.
    pub fn next_block(&self) -> Option<BlockInfo> {
        BlockInfo::new(self.next_num, false, self.szx?)
    }

    /// Returns true if we have received all of our blocks.
    pub fn is_finished(&self) -> bool {
        self.is_finished
    }

    /// Number of payload bytes collected so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True if no payload bytes have been collected.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consumes this object and returns the collected payload.
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    /// Feeds a block (with an associated payload) to the reconstructor.
    ///
    /// Returns `Ok(true)` when this was the final block. Anything other
    /// than the expected next block fails with
    /// [`Error::RequestEntityIncomplete`].
    pub fn feed(&mut self, block: BlockInfo, payload: &[u8]) -> Result<bool, Error> {
        if self.is_finished || block.is_invalid() {
            return Err(Error::RequestEntityIncomplete);
        }

        match self.szx {
            None => {
                self.szx = Some(block.szx());
                if self.any_start {
                    self.next_num = block.num();
                }
            }
            Some(szx) if block.szx() < szx => {
                self.next_num <<= szx - block.szx();
                self.szx = Some(block.szx());
            }
            Some(szx) if block.szx() > szx => {
                debug!("block size grew from {} to {}", 16 << szx, block.len());
                return Err(Error::RequestEntityIncomplete);
            }
            Some(_) => (),
        }

        if block.num() != self.next_num {
            debug!("expected block {}, got {}", self.next_num, block);
            return Err(Error::RequestEntityIncomplete);
        }

        if block.more_flag() {
            if block.num() == BlockInfo::NUM_MAX {
                return Err(Error::RequestEntityTooLarge);
            }
            self.next_num += 1;
        } else {
            self.is_finished = true;
        }

        self.buffer.extend_from_slice(payload);

        Ok(self.is_finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let block = BlockInfo::default();
        assert_eq!(false, block.more_flag());
        assert_eq!(6, block.szx());
        assert_eq!(0, block.num());
        assert_eq!(1024, block.len());
        assert_eq!(0, block.offset());
        assert_eq!(false, block.is_invalid());
    }

    #[test]
    fn wire_layout() {
        let block = BlockInfo(0x1D);
        assert_eq!(1, block.num());
        assert_eq!(true, block.more_flag());
        assert_eq!(5, block.szx());
        assert_eq!(512, block.offset());

        let block = BlockInfo::new(2, false, 5).unwrap();
        assert_eq!(0x25, block.0);
    }

    #[test]
    fn check_next() {
        let block = BlockInfo::new(BlockInfo::NUM_MAX - 1, true, 6).unwrap();
        assert_eq!(1073739776, block.offset());

        let block = block.next().unwrap();
        assert_eq!(BlockInfo::NUM_MAX, block.num());
        assert_eq!(true, block.more_flag());
        assert_eq!(None, block.next());
    }

    #[test]
    fn validity() {
        assert_eq!(Some(BlockInfo(0)), BlockInfo(0).valid());
        assert_eq!(None, BlockInfo(!0).valid());
        assert_eq!(None, BlockInfo(BlockInfo::SZX_RESERVED as u32).valid());
        assert_eq!(None, BlockInfo::new(0, false, 7));
        assert_eq!(None, BlockInfo::new(BlockInfo::NUM_MAX + 1, false, 0));
    }

    #[test]
    fn size_exponents() {
        assert_eq!(BlockInfo::szx_for_size(16), Some(0));
        assert_eq!(BlockInfo::szx_for_size(1024), Some(6));
        assert_eq!(BlockInfo::szx_for_size(8), None);
        assert_eq!(BlockInfo::szx_for_size(350), None);
        assert_eq!(BlockInfo::szx_for_size(2048), None);
    }

    fn alphabet_payload() -> Vec<u8> {
        let chunk = b"abcdefghijklmnopqrstuvwxyzabcdefghijklmnopqrstuvwxyz\n";
        assert_eq!(chunk.len(), 53);
        chunk.repeat(3)
    }

    #[test]
    fn segment_and_reassemble() {
        let payload = alphabet_payload();
        let mut segmenter = BlockSegmenter::new(payload.clone(), 0);
        let mut reconstructor = BlockReconstructor::new();
        let mut blocks = 0;

        loop {
            let (block, data) = segmenter.current();
            assert_eq!(block.num(), blocks);
            blocks += 1;
            let done = reconstructor.feed(block, data).unwrap();
            assert_eq!(done, !block.more_flag());
            if !segmenter.advance(Some(block)).unwrap() {
                break;
            }
        }

        assert_eq!(blocks, 10);
        assert!(reconstructor.is_finished());
        assert_eq!(reconstructor.into_inner(), payload);
    }

    #[test]
    fn duplicate_block_rejected() {
        let payload = alphabet_payload();
        let mut reconstructor = BlockReconstructor::new();

        let first = BlockInfo::new(0, true, 0).unwrap();
        let second = BlockInfo::new(1, true, 0).unwrap();
        assert_eq!(reconstructor.feed(first, &payload[..16]), Ok(false));
        assert_eq!(reconstructor.feed(second, &payload[16..32]), Ok(false));
        assert_eq!(
            reconstructor.feed(second, &payload[16..32]),
            Err(Error::RequestEntityIncomplete)
        );
    }

    #[test]
    fn out_of_order_block_rejected() {
        let mut reconstructor = BlockReconstructor::new();
        let block = BlockInfo::new(1, true, 0).unwrap();
        assert_eq!(
            reconstructor.feed(block, &[0u8; 16]),
            Err(Error::RequestEntityIncomplete)
        );
    }

    #[test]
    fn reconstructor_follows_smaller_size() {
        let mut reconstructor = BlockReconstructor::new();
        let block = BlockInfo::new(0, true, 1).unwrap();
        assert_eq!(reconstructor.feed(block, &[1u8; 32]), Ok(false));
        assert_eq!(reconstructor.next_block(), BlockInfo::new(1, false, 1));

        let block = BlockInfo::new(2, true, 0).unwrap();
        assert_eq!(reconstructor.feed(block, &[2u8; 16]), Ok(false));
        assert_eq!(reconstructor.next_block(), BlockInfo::new(3, false, 0));

        let block = BlockInfo::new(3, true, 1).unwrap();
        assert_eq!(
            reconstructor.feed(block, &[3u8; 32]),
            Err(Error::RequestEntityIncomplete)
        );
    }

    #[test]
    fn segmenter_follows_smaller_size() {
        let mut segmenter = BlockSegmenter::new(vec![7u8; 300], 3);
        let (block, data) = segmenter.current();
        assert_eq!(block, BlockInfo::new(0, true, 3).unwrap());
        assert_eq!(data.len(), 128);

        assert_eq!(
            segmenter.advance(Some(BlockInfo::new(0, true, 1).unwrap())),
            Ok(true)
        );
        let (block, data) = segmenter.current();
        assert_eq!(block, BlockInfo::new(4, true, 1).unwrap());
        assert_eq!(block.offset(), 128);
        assert_eq!(data.len(), 32);
    }

    #[test]
    fn joins_at_first_block_seen() {
        let mut reconstructor = BlockReconstructor::from_any_block();
        assert_eq!(
            reconstructor.feed(BlockInfo::new(1, true, 5).unwrap(), b"Reply1"),
            Ok(false)
        );
        assert_eq!(reconstructor.next_block(), BlockInfo::new(2, false, 5));
        assert_eq!(
            reconstructor.feed(BlockInfo::new(2, false, 5).unwrap(), b"Reply2"),
            Ok(true)
        );
        assert_eq!(reconstructor.into_inner(), b"Reply1Reply2".to_vec());
    }

    #[test]
    fn short_intermediate_block_accepted() {
        let mut reconstructor = BlockReconstructor::new();
        assert_eq!(
            reconstructor.feed(BlockInfo::new(0, true, 0).unwrap(), b"part"),
            Ok(false)
        );
        assert_eq!(
            reconstructor.feed(BlockInfo::new(1, false, 0).unwrap(), b"-end"),
            Ok(true)
        );
        assert_eq!(reconstructor.into_inner(), b"part-end".to_vec());
    }
}
