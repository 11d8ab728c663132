// SPDX-License-Identifier: Apache-2.0
//! The 128-byte shared-state header (§3, §6).

use bytemuck::{Pod, Zeroable};

/// `"NEGENTOP"` as a little-endian `u64` (§6).
pub const MAGIC: u64 = 0x4E45_4745_4E54_4F50;

/// Fixed header size in bytes (§3 invariant: `header_size == 128`).
pub const HEADER_SIZE: u32 = 128;

/// Schema version for this header layout (e.g. `330` for `0.3.3`).
pub const SCHEMA_VERSION: u32 = 330;

/// Field offsets recorded in the header, in the order declared by §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct FieldOffsets {
    /// Byte offset of the vegetation field within a state buffer.
    pub vegetation: u32,
    /// Byte offset of the SOM field.
    pub som: u32,
    /// Byte offset of the theta field (all layers, contiguous).
    pub theta: u32,
    /// Byte offset of the surface-water field.
    pub surface_water: u32,
    /// Byte offset of the wind-velocity field.
    pub wind_velocity: u32,
    /// Byte offset of the temperature field.
    pub temperature: u32,
    /// Byte offset of the torsion field.
    pub torsion: u32,
    /// Byte offset of the interventions field.
    pub interventions: u32,
    /// Byte offset of the cloud-density field.
    pub cloud_density: u32,
    /// Byte offset of the precipitation field.
    pub precipitation: u32,
}

/// The 128-byte, little-endian, tightly-packed shared-state header (§3, §6).
///
/// `#[repr(C)]` plus explicit field ordering keeps the layout stable;
/// `Pod`/`Zeroable` (via `bytemuck`) makes the byte-level read/write a
/// straight cast with no hidden padding surprises, which is checked by the
/// `header_is_128_bytes` test below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct SharedStateHeader {
    /// Must equal [`MAGIC`].
    pub magic: u64,
    /// Schema version, bumped on any layout change.
    pub schema_version: u32,
    /// Must equal [`HEADER_SIZE`].
    pub header_size: u32,
    /// Host wall-clock timestamp at last publish (milliseconds).
    pub timestamp_ms: u64,
    /// Monotonically increasing simulation tick counter.
    pub simulation_tick: u64,
    /// XXH3 hash of the canonical binary state.
    pub state_hash: u64,
    /// Index (0 or 1) of the currently-active (readable) buffer.
    pub active_buffer_idx: u32,
    /// Snapshot of numerical error flags at publish time (bitset, see
    /// [`crate::error::ErrorFlags`] for the underlying counters).
    pub error_flags: u32,
    /// Grid X dimension.
    pub grid_nx: u32,
    /// Grid Y dimension.
    pub grid_ny: u32,
    /// Grid Z dimension.
    pub grid_nz: u32,
    /// Number of entities (cells) represented in each state buffer.
    pub num_entities: u32,
    /// Field offset table.
    pub offsets: FieldOffsets,
    /// Reserved, always zeroed.
    pub reserved: [u8; 24],
}

impl SharedStateHeader {
    /// Builds a zeroed header with magic/version/header_size populated.
    #[must_use]
    pub fn new(grid_nx: u32, grid_ny: u32, grid_nz: u32, num_entities: u32, offsets: FieldOffsets) -> Self {
        Self {
            magic: MAGIC,
            schema_version: SCHEMA_VERSION,
            header_size: HEADER_SIZE,
            timestamp_ms: 0,
            simulation_tick: 0,
            state_hash: 0,
            active_buffer_idx: 0,
            error_flags: 0,
            grid_nx,
            grid_ny,
            grid_nz,
            num_entities,
            offsets,
            reserved: [0; 24],
        }
    }

    /// Serializes to its canonical little-endian byte representation.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let bytes = bytemuck::bytes_of(self);
        let mut out = [0_u8; HEADER_SIZE as usize];
        out.copy_from_slice(bytes);
        out
    }

    /// Parses from a byte slice, validating magic and header size.
    ///
    /// # Errors
    /// Returns `None` if `bytes` is shorter than [`HEADER_SIZE`] or the
    /// magic does not match [`MAGIC`].
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE as usize {
            return None;
        }
        let header: SharedStateHeader = *bytemuck::from_bytes(&bytes[..HEADER_SIZE as usize]);
        if header.magic != MAGIC || header.header_size != HEADER_SIZE {
            return None;
        }
        Some(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_128_bytes() {
        assert_eq!(core::mem::size_of::<SharedStateHeader>(), HEADER_SIZE as usize);
    }

    #[test]
    fn round_trips_through_bytes() {
        let offsets = FieldOffsets {
            vegetation: 0,
            som: 4,
            theta: 8,
            surface_water: 12,
            wind_velocity: 16,
            temperature: 20,
            torsion: 24,
            interventions: 28,
            cloud_density: 32,
            precipitation: 36,
        };
        let header = SharedStateHeader::new(4, 4, 1, 16, offsets);
        let bytes = header.to_bytes();
        let parsed = SharedStateHeader::from_bytes(&bytes).expect("valid header");
        assert_eq!(parsed, header);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = [0_u8; HEADER_SIZE as usize];
        bytes[0..8].copy_from_slice(&0_u64.to_le_bytes());
        assert!(SharedStateHeader::from_bytes(&bytes).is_none());
    }
}
