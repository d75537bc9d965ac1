//! Boot slot table decoding.
//!
//! The bootloader leaves a 16-byte record in RAM describing which slot it
//! booted and where that slot's kernel and userland headers live.

use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::diagnostic::{Diagnostic, RecordKind};
use crate::platform_info::DecodeError;
use crate::protocol::bytes::{u32_be, u32_le};
use crate::protocol::constants::*;

const KERNEL_HEADER_OFFSET: usize = 0x04;
const USERLAND_HEADER_OFFSET: usize = 0x08;
const TRAILING_MAGIC_OFFSET: usize = 0x0C;

const KNOWN_SLOTS: [(u32, &str); 3] = [
    (SLOT_A_BASE, "A"),
    (SLOT_B_BASE, "B"),
    (SLOT_KHI_BASE, "Khi"),
];

/// Decoded boot slot record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlotInfo {
    pub magic_valid: bool,
    pub kernel_header_addr: u32,
    pub userland_header_addr: u32,
    pub slot_name: Option<String>,
    #[serde(skip)]
    pub diagnostics: Vec<Diagnostic>,
}

impl SlotInfo {
    /// Size of the record in device RAM.
    pub const SIZE: usize = SLOT_INFO_LEN as usize;

    /// Decode a slot record. Fails only if `data` is shorter than the record.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < Self::SIZE {
            return Err(DecodeError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }

        if u32_be(data, 0) != Some(SLOT_INFO_MAGIC) {
            return Ok(Self::default());
        }

        let mut info = SlotInfo {
            magic_valid: true,
            kernel_header_addr: u32_le(data, KERNEL_HEADER_OFFSET).unwrap_or_default(),
            userland_header_addr: u32_le(data, USERLAND_HEADER_OFFSET).unwrap_or_default(),
            ..Default::default()
        };

        let trailing = u32_be(data, TRAILING_MAGIC_OFFSET);
        if trailing != Some(SLOT_INFO_MAGIC) {
            let diagnostic = Diagnostic::StructuralWarning {
                record: RecordKind::SlotInfo,
                offset: TRAILING_MAGIC_OFFSET,
                expected: SLOT_INFO_MAGIC,
                actual: trailing,
            };
            warn!(%diagnostic, "Slot info structure is damaged");
            info.diagnostics.push(diagnostic);
        }

        let base = info.kernel_header_addr.wrapping_sub(SLOT_HEADER_OFFSET);
        info.slot_name = slot_name_for(base).map(str::to_string);
        if info.slot_name.is_none() {
            let diagnostic = Diagnostic::UnresolvedSlot { base };
            warn!(%diagnostic, "Unknown boot slot");
            info.diagnostics.push(diagnostic);
        }

        Ok(info)
    }
}

/// Label of the slot starting at `base`, if it is one of the known slots.
pub fn slot_name_for(base: u32) -> Option<&'static str> {
    KNOWN_SLOTS
        .iter()
        .find(|(addr, _)| *addr == base)
        .map(|(_, name)| *name)
}

impl fmt::Display for SlotInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.magic_valid {
            return write!(f, "no slot info");
        }
        write!(
            f,
            "slot {} (kernel 0x{:08X}, userland 0x{:08X})",
            self.slot_name.as_deref().unwrap_or("?"),
            self.kernel_header_addr,
            self.userland_header_addr
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kernel: u32, userland: u32, trailing: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(SlotInfo::SIZE);
        data.extend_from_slice(&SLOT_INFO_MAGIC.to_be_bytes());
        data.extend_from_slice(&kernel.to_le_bytes());
        data.extend_from_slice(&userland.to_le_bytes());
        data.extend_from_slice(&trailing.to_be_bytes());
        data
    }

    #[test]
    fn test_resolves_known_slots() {
        let a = SlotInfo::decode(&record(0x9000_0008, 0x9001_0000, SLOT_INFO_MAGIC)).unwrap();
        assert!(a.magic_valid);
        assert_eq!(a.slot_name.as_deref(), Some("A"));
        assert_eq!(a.kernel_header_addr, 0x9000_0008);
        assert_eq!(a.userland_header_addr, 0x9001_0000);
        assert!(a.diagnostics.is_empty());

        let b = SlotInfo::decode(&record(0x9040_0008, 0x9041_0000, SLOT_INFO_MAGIC)).unwrap();
        assert_eq!(b.slot_name.as_deref(), Some("B"));

        let khi = SlotInfo::decode(&record(0x9018_0008, 0x9019_0000, SLOT_INFO_MAGIC)).unwrap();
        assert_eq!(khi.slot_name.as_deref(), Some("Khi"));
    }

    #[test]
    fn test_unknown_slot_is_a_diagnostic() {
        let info = SlotInfo::decode(&record(0x9020_0008, 0x9021_0000, SLOT_INFO_MAGIC)).unwrap();
        assert!(info.magic_valid);
        assert_eq!(info.slot_name, None);
        assert_eq!(
            info.diagnostics,
            vec![Diagnostic::UnresolvedSlot { base: 0x9020_0000 }]
        );
    }

    #[test]
    fn test_kernel_address_below_offset_does_not_panic() {
        let info = SlotInfo::decode(&record(0x4, 0, SLOT_INFO_MAGIC)).unwrap();
        assert_eq!(info.slot_name, None);
        assert_eq!(
            info.diagnostics,
            vec![Diagnostic::UnresolvedSlot { base: 0xFFFF_FFFC }]
        );
    }

    #[test]
    fn test_bad_trailing_magic_warns() {
        let info = SlotInfo::decode(&record(0x9000_0008, 0x9001_0000, 0)).unwrap();
        assert!(info.magic_valid);
        assert_eq!(info.slot_name.as_deref(), Some("A"));
        assert_eq!(
            info.diagnostics,
            vec![Diagnostic::StructuralWarning {
                record: RecordKind::SlotInfo,
                offset: 0x0C,
                expected: SLOT_INFO_MAGIC,
                actual: Some(0),
            }]
        );
    }

    #[test]
    fn test_invalid_magic() {
        let mut data = record(0x9000_0008, 0x9001_0000, SLOT_INFO_MAGIC);
        data[0] ^= 0xFF;
        let info = SlotInfo::decode(&data).unwrap();
        assert_eq!(info, SlotInfo::default());
    }

    #[test]
    fn test_short_buffer_rejected() {
        let data = record(0x9000_0008, 0x9001_0000, SLOT_INFO_MAGIC);
        assert!(matches!(
            SlotInfo::decode(&data[..15]),
            Err(DecodeError::BufferTooSmall {
                expected: 16,
                actual: 15
            })
        ));
    }
}
