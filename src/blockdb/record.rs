use crate::error::{Error, Result};
use crate::types::*;

pub const RECORD_SIZE: usize = 16;

/// One block replacement: who, where, when, before and after.
///
/// On disk this is 16 little-endian bytes:
///
/// ```text
/// 0..4   timestamp  u32 (seconds since the unix epoch)
/// 4..8   player     i32
/// 8..10  x          i16
/// 10..12 y          i16
/// 12..14 z          i16
/// 14     old block  u8
/// 15     new block  u8
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeRecord {
    pub timestamp: u32,
    pub player: PlayerId,
    pub pos: V3<i16>,
    pub old_block: Block,
    pub new_block: Block,
}

impl ChangeRecord {
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0; RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[4..8].copy_from_slice(&self.player.0.to_le_bytes());
        buf[8..10].copy_from_slice(&self.pos.x.to_le_bytes());
        buf[10..12].copy_from_slice(&self.pos.y.to_le_bytes());
        buf[12..14].copy_from_slice(&self.pos.z.to_le_bytes());
        buf[14] = self.old_block.0;
        buf[15] = self.new_block.0;
        buf
    }

    /// Decodes the first [`RECORD_SIZE`] bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let buf: &[u8; RECORD_SIZE] = buf
            .get(..RECORD_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or(Error::TruncatedRecord { len: buf.len() })?;
        let i16_at = |i: usize| i16::from_le_bytes([buf[i], buf[i + 1]]);
        Ok(Self {
            timestamp: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            player: PlayerId(i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]])),
            pos: V3(i16_at(8), i16_at(10), i16_at(12)),
            old_block: Block(buf[14]),
            new_block: Block(buf[15]),
        })
    }
}

/// Decodes every whole record in `buf`. A trailing partial record is
/// returned as its length so the caller can decide what to do with it.
pub fn decode_all(buf: &[u8]) -> (Vec<ChangeRecord>, usize) {
    let chunks = buf.chunks_exact(RECORD_SIZE);
    let tail = chunks.remainder().len();
    let records = chunks.filter_map(|c| ChangeRecord::decode(c).ok()).collect();
    (records, tail)
}
