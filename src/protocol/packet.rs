use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};

/// Maximum payload carried by a single frame before a continuation frame is required.
pub const MAX_PAYLOAD_LEN: usize = 0x00FF_FFFF;

/// MySQL packet header: 3-byte little-endian length, 1-byte sequence number.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
pub struct PacketHeader {
    length: [u8; 3],
    sequence_id: u8,
}

impl PacketHeader {
    pub fn encode(length: usize, sequence_id: u8) -> Self {
        debug_assert!(length <= MAX_PAYLOAD_LEN);
        let len = (length as u32).to_le_bytes();
        Self {
            length: [len[0], len[1], len[2]],
            sequence_id,
        }
    }

    pub fn length(&self) -> usize {
        u32::from_le_bytes([self.length[0], self.length[1], self.length[2], 0]) as usize
    }

    pub fn sequence_id(&self) -> u8 {
        self.sequence_id
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_bytes(data).map_err(|_| Error::protocol("short packet header"))
    }

    pub fn to_bytes(self) -> [u8; 4] {
        [self.length[0], self.length[1], self.length[2], self.sequence_id]
    }
}

/// Splits a payload into the frame sizes §4.1 requires: consecutive `MAX_PAYLOAD_LEN`
/// chunks, a final short chunk, and a trailing empty chunk iff the payload length is a
/// nonzero multiple of `MAX_PAYLOAD_LEN` (a frame of exactly `MAX_PAYLOAD_LEN` bytes is
/// indistinguishable from "more data follows" otherwise).
pub fn frame_lengths(payload_len: usize) -> Vec<usize> {
    if payload_len == 0 {
        return vec![0];
    }
    let mut lens = Vec::with_capacity(payload_len / MAX_PAYLOAD_LEN + 1);
    let mut remaining = payload_len;
    while remaining > 0 {
        let chunk = remaining.min(MAX_PAYLOAD_LEN);
        lens.push(chunk);
        remaining -= chunk;
    }
    if payload_len % MAX_PAYLOAD_LEN == 0 {
        lens.push(0);
    }
    lens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let h = PacketHeader::encode(0x1234, 7);
        assert_eq!(h.length(), 0x1234);
        assert_eq!(h.sequence_id(), 7);
        let bytes = h.to_bytes();
        let parsed = PacketHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.length(), 0x1234);
        assert_eq!(parsed.sequence_id(), 7);
    }

    #[test]
    fn frame_lengths_small_payload() {
        assert_eq!(frame_lengths(10), vec![10]);
        assert_eq!(frame_lengths(0), vec![0]);
    }

    #[test]
    fn frame_lengths_exact_boundary_emits_trailing_empty_frame() {
        assert_eq!(frame_lengths(MAX_PAYLOAD_LEN), vec![MAX_PAYLOAD_LEN, 0]);
    }

    #[test]
    fn frame_lengths_one_byte_past_boundary() {
        assert_eq!(frame_lengths(MAX_PAYLOAD_LEN + 1), vec![MAX_PAYLOAD_LEN, 1]);
    }

    #[test]
    fn frame_lengths_double_boundary() {
        assert_eq!(
            frame_lengths(MAX_PAYLOAD_LEN * 2),
            vec![MAX_PAYLOAD_LEN, MAX_PAYLOAD_LEN, 0]
        );
    }
}
