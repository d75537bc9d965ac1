//! DfuSe (STM32 DFU extensions) helpers.
//!
//! DfuSe devices describe their memory in the alt-setting string descriptor:
//!
//! ```text
//! @Internal Flash  /0x08000000/04*016Kg,01*064Kg,07*128Kg
//! ```
//!
//! i.e. a name, then pairs of start address and comma separated sector groups
//! (`count*size` followed by a unit ` `/`K`/`M` and a one-letter access type).

use super::traits::TransportError;
use crate::model::MemorySegment;

/// DFU device states (DFU 1.1, table 6.3.1).
pub mod state {
    pub const DFU_DNLOAD_SYNC: u8 = 3;
    pub const DFU_DNBUSY: u8 = 4;
    pub const DFU_ERROR: u8 = 10;
}

/// Response to DFU_GETSTATUS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DfuStatus {
    pub status: u8,
    pub poll_timeout_ms: u32,
    pub state: u8,
}

impl DfuStatus {
    pub const SIZE: usize = 6;

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            status: data[0],
            poll_timeout_ms: u32::from_le_bytes([data[1], data[2], data[3], 0]),
            state: data[4],
        })
    }

    pub fn is_error(&self) -> bool {
        self.status != 0 || self.state == state::DFU_ERROR
    }

    /// Still processing a download or flash operation.
    pub fn is_busy(&self) -> bool {
        self.state == state::DFU_DNBUSY || self.state == state::DFU_DNLOAD_SYNC
    }
}

fn invalid(layout: &str) -> TransportError {
    TransportError::InvalidMemoryLayout(layout.to_string())
}

fn parse_address(s: &str) -> Option<u32> {
    let s = s.trim();
    let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    u32::from_str_radix(hex, 16).ok()
}

/// Parse one `count*size<unit><type>` group into its byte length.
fn parse_sector_group(s: &str) -> Option<u32> {
    let (count, rest) = s.trim().split_once('*')?;
    let count: u32 = count.trim().parse().ok()?;
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let size: u32 = rest[..digits_end].parse().ok()?;
    let multiplier = match rest[digits_end..].chars().next() {
        Some('K') => 1024,
        Some('M') => 1024 * 1024,
        Some(' ') | None => 1,
        // A bare access type letter means bytes.
        Some(c) if c.is_ascii_lowercase() => 1,
        Some(_) => return None,
    };
    count.checked_mul(size)?.checked_mul(multiplier)
}

/// Parse a DfuSe memory layout string into segments, one per sector group.
pub fn parse_memory_layout(layout: &str) -> Result<Vec<MemorySegment>, TransportError> {
    let body = layout.trim().strip_prefix('@').ok_or_else(|| invalid(layout))?;
    let mut parts = body.split('/');
    // Region name
    parts.next().ok_or_else(|| invalid(layout))?;

    let mut segments = Vec::new();
    loop {
        let Some(address) = parts.next() else { break };
        if address.trim().is_empty() {
            break;
        }
        let mut cursor = parse_address(address).ok_or_else(|| invalid(layout))?;
        let sectors = parts.next().ok_or_else(|| invalid(layout))?;
        for group in sectors.split(',').filter(|g| !g.trim().is_empty()) {
            let len = parse_sector_group(group).ok_or_else(|| invalid(layout))?;
            let end = cursor.checked_add(len).ok_or_else(|| invalid(layout))?;
            segments.push(MemorySegment::new(cursor, end));
            cursor = end;
        }
    }

    if segments.is_empty() {
        return Err(invalid(layout));
    }
    Ok(segments)
}
