//! Hardware model detection from the device's reported memory map.
//!
//! The calculator never reports its model directly. It is derived from the
//! total size of the internal and external flash windows advertised in the
//! DfuSe memory layout, except under the third-party firmware whose product
//! string identifies it and whose geometry cannot be trusted.

use std::fmt;

use serde::Serialize;

use crate::protocol::constants::*;

/// Address range as reported by the device's memory map (end exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemorySegment {
    pub start: u32,
    pub end: u32,
}

impl MemorySegment {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Byte extent of the segment.
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn starts_within(&self, low: u32, high: u32) -> bool {
        (low..=high).contains(&self.start)
    }
}

/// Calculator hardware variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceModel {
    Model0110,
    Model0110_0M,
    Model0110_16M,
    Model0100,
    Model0100_8M,
    Model0100_16M,
    Unknown,
}

impl DeviceModel {
    /// Whether this configuration ships from the factory.
    pub fn is_official(&self) -> bool {
        matches!(self, DeviceModel::Model0110 | DeviceModel::Model0100)
    }

    /// Collapse a modified configuration to the official model sharing its
    /// internal flash size.
    pub fn canonical(&self) -> DeviceModel {
        if self.is_official() {
            return *self;
        }
        let Some(row) = GEOMETRY_TABLE.iter().find(|r| r.model == *self) else {
            return DeviceModel::Unknown;
        };
        GEOMETRY_TABLE
            .iter()
            .find(|r| r.internal == row.internal && r.model.is_official())
            .map(|r| r.model)
            .unwrap_or(DeviceModel::Unknown)
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceModel::Model0110 => write!(f, "0110"),
            DeviceModel::Model0110_0M => write!(f, "0110-0M"),
            DeviceModel::Model0110_16M => write!(f, "0110-16M"),
            DeviceModel::Model0100 => write!(f, "0100"),
            DeviceModel::Model0100_8M => write!(f, "0100-8M"),
            DeviceModel::Model0100_16M => write!(f, "0100-16M"),
            DeviceModel::Unknown => write!(f, "unknown"),
        }
    }
}

struct GeometryRow {
    internal: u32,
    external: u32,
    model: DeviceModel,
}

const GEOMETRY_TABLE: &[GeometryRow] = &[
    GeometryRow {
        internal: INTERNAL_SIZE_N0110,
        external: EXTERNAL_SIZE_NONE,
        model: DeviceModel::Model0110_0M,
    },
    GeometryRow {
        internal: INTERNAL_SIZE_N0110,
        external: EXTERNAL_SIZE_8M,
        model: DeviceModel::Model0110,
    },
    GeometryRow {
        internal: INTERNAL_SIZE_N0110,
        external: EXTERNAL_SIZE_16M,
        model: DeviceModel::Model0110_16M,
    },
    GeometryRow {
        internal: INTERNAL_SIZE_N0100,
        external: EXTERNAL_SIZE_NONE,
        model: DeviceModel::Model0100,
    },
    GeometryRow {
        internal: INTERNAL_SIZE_N0100,
        external: EXTERNAL_SIZE_8M,
        model: DeviceModel::Model0100_8M,
    },
    GeometryRow {
        internal: INTERNAL_SIZE_N0100,
        external: EXTERNAL_SIZE_16M,
        model: DeviceModel::Model0100_16M,
    },
];

/// Total internal and external flash sizes advertised by `segments`.
pub fn flash_sizes(segments: &[MemorySegment]) -> (u32, u32) {
    let mut internal: u32 = 0;
    let mut external: u32 = 0;
    for segment in segments {
        if segment.starts_within(INTERNAL_FLASH_START, INTERNAL_FLASH_END) {
            internal = internal.saturating_add(segment.len());
        }
        if segment.starts_within(EXTERNAL_FLASH_START, EXTERNAL_FLASH_END) {
            external = external.saturating_add(segment.len());
        }
    }
    (internal, external)
}

/// Classify the connected hardware.
pub fn classify_model(
    segments: &[MemorySegment],
    product_name: &str,
    exclude_modded: bool,
) -> DeviceModel {
    let has_external = || {
        segments
            .iter()
            .any(|s| s.starts_within(EXTERNAL_FLASH_START, EXTERNAL_FLASH_END))
    };

    match product_name.trim() {
        PRODUCT_ALT_BOOTLOADER => return DeviceModel::Model0110,
        PRODUCT_ALT_RUNTIME => {
            return if has_external() {
                DeviceModel::Model0110
            } else {
                DeviceModel::Model0100
            };
        }
        _ => {}
    }

    let (internal, external) = flash_sizes(segments);
    let model = GEOMETRY_TABLE
        .iter()
        .find(|r| r.internal == internal && r.external == external)
        .map(|r| r.model)
        .unwrap_or(DeviceModel::Unknown);

    tracing::debug!(
        internal = %format!("0x{:X}", internal),
        external = %format!("0x{:X}", external),
        model = %model,
        "Classified memory geometry"
    );

    if exclude_modded {
        model.canonical()
    } else {
        model
    }
}
