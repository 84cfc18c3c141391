//! Wire format for boundary payloads.
//!
//! A payload is a contiguous run of `Real` values ordered
//! `(variable, k, j, i)` within the buffer's index range. On the wire it is
//! carried as raw native-endian bytes; both ends of a transfer run the same
//! binary, so no byte swapping is done. Tags are computed independently by
//! sender and receiver from the *receiving* block's local id and slot.

use std::fmt;

use bytemuck::{Pod, Zeroable};
use bytes::Bytes;

use crate::data::Real;
use crate::mesh_error::MeshHaloError;
use crate::topology::direction::NEIGHBOR_SLOTS;

/// Number of low tag bits reserved for the receiving slot index.
pub const SLOT_BITS: u32 = 6;

static_assertions::const_assert!(NEIGHBOR_SLOTS <= 1 << SLOT_BITS);

/// Message tag for one boundary transfer.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
pub struct CommTag(i32);

impl CommTag {
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Tag for the buffer `slot` of the block with local id `local_id` on the
    /// receiving rank.
    #[inline]
    pub const fn for_buffer(local_id: usize, slot: usize) -> Self {
        Self(((local_id as i32) << SLOT_BITS) | slot as i32)
    }

    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Split a tag back into `(local_id, slot)`.
    pub const fn decode(self) -> (usize, usize) {
        (
            (self.0 >> SLOT_BITS) as usize,
            (self.0 & ((1 << SLOT_BITS) - 1)) as usize,
        )
    }
}

impl fmt::Display for CommTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (lid, slot) = self.decode();
        write!(f, "{}(lid={lid},slot={slot})", self.0)
    }
}

/// Fail unless the largest buffer tag of a rank holding `max_local_blocks`
/// blocks stays within `max_tag`.
pub fn check_tag_range(max_local_blocks: usize, max_tag: i32) -> Result<(), MeshHaloError> {
    let Some(last_id) = max_local_blocks.checked_sub(1) else {
        return Ok(());
    };
    let largest = (last_id as u64)
        .checked_shl(SLOT_BITS)
        .filter(|t| t >> SLOT_BITS == last_id as u64)
        .map(|t| t | (NEIGHBOR_SLOTS as u64 - 1));
    match largest {
        Some(t) if t <= max_tag.max(0) as u64 => Ok(()),
        _ => Err(MeshHaloError::InvalidConfig(format!(
            "{max_local_blocks} blocks per rank need tags beyond the transport bound {max_tag}"
        ))),
    }
}

/// Copy a payload into an owned byte buffer.
pub fn encode_payload(values: &[Real]) -> Bytes {
    Bytes::copy_from_slice(bytemuck::cast_slice(values))
}

/// Decode bytes produced by [`encode_payload`].
///
/// The byte buffer carries no alignment guarantee, so values are collected
/// into a fresh vector rather than cast in place.
pub fn decode_payload(bytes: &[u8]) -> Result<Vec<Real>, String> {
    let width = std::mem::size_of::<Real>();
    if bytes.len() % width != 0 {
        return Err(format!(
            "{} bytes is not a whole number of {width}-byte values",
            bytes.len()
        ));
    }
    Ok(bytemuck::pod_collect_to_vec(bytes))
}

/// Fail unless a received payload has exactly the expected length.
pub fn expect_exact_len(peer: usize, actual: usize, expected: usize) -> Result<(), MeshHaloError> {
    if actual == expected {
        Ok(())
    } else {
        Err(MeshHaloError::PayloadLength {
            peer,
            expected,
            actual,
        })
    }
}
