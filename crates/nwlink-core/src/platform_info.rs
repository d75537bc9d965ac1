//! Platform info decoding.
//!
//! Firmware exposes a small record describing itself at a fixed address. Its
//! layout changed several times and two community forks append their own
//! blocks to it, so the decoder works in two steps:
//!
//! 1. [`classify`] picks a [`Layout`] from the sentinels alone, including where
//!    any fork blocks start.
//! 2. Field extraction reads fixed offsets for that layout.
//!
//! Byte order differs per field (sentinels are compared big-endian, addresses
//! are little-endian) and is kept exactly as the firmware writes it.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::diagnostic::{Diagnostic, RecordKind};
use crate::protocol::bytes::{fixed_str, sentinel_at, u32_be, u32_le};
use crate::protocol::constants::*;
use crate::slot_info::SlotInfo;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
}

/// What the device is running when it is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionMode {
    /// Firmware without a slotted bootloader.
    Legacy,
    /// The slotted bootloader, exposing kernel and userland headers.
    Bootloader,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Legacy => write!(f, "legacy"),
            ExecutionMode::Bootloader => write!(f, "bootloader"),
        }
    }
}

/// Which bootloader-resident header a buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeaderKind {
    Kernel,
    Userland,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StockFork {
    pub version: String,
    pub user: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AltFork {
    pub version: String,
    pub os_type: u32,
    pub is_official: bool,
}

/// Location of the user storage area in device RAM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageRegion {
    pub address: u32,
    pub size: u32,
}

/// External memory ranges advertised by newer userland headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExternalMemory {
    pub flash_start: u32,
    pub flash_end: u32,
    pub ram_start: u32,
    pub ram_end: u32,
}

impl ExternalMemory {
    pub fn flash_size(&self) -> u32 {
        self.flash_end.saturating_sub(self.flash_start)
    }

    pub fn ram_size(&self) -> u32 {
        self.ram_end.saturating_sub(self.ram_start)
    }
}

/// Decoded firmware metadata.
///
/// When `magic_valid` is false every other field keeps its default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlatformInfo {
    pub magic_valid: bool,
    pub mode: Option<ExecutionMode>,
    pub is_legacy_layout: bool,
    pub firmware_version: String,
    pub commit_hash: String,
    pub stock_fork: Option<StockFork>,
    pub alt_fork: Option<AltFork>,
    pub storage_region: Option<StorageRegion>,
    pub external_memory: Option<ExternalMemory>,
    pub active_slot: Option<SlotInfo>,
    pub diagnostics: Vec<Diagnostic>,
}

const VERSION_OFFSET: usize = 0x04;
const VERSION_LEN: usize = 8;
const COMMIT_OFFSET: usize = 0x0C;
const COMMIT_LEN: usize = 8;
const LAYOUT_MAGIC_OFFSET: usize = 0x1C;
const FORK_STR_LEN: usize = 16;

const LEGACY_MIN_LEN: usize = 0x40;
const KERNEL_MIN_LEN: usize = 0x18;
const USERLAND_MIN_LEN: usize = 0x28;

const KERNEL_TRAILING_MAGIC: usize = 0x14;
const USERLAND_TRAILING_MAGIC: usize = 0x24;

/// A sentinel expected `at` bytes past a candidate base.
struct SentinelCheck<'a> {
    at: usize,
    accepts: &'a [u32],
}

/// Old layout: fork blocks push the commit hash out by one of these offsets.
const LEGACY_FORK_OFFSETS: [usize; 3] = [8, 16, 32];

/// Current layout: first-party fork block start, tried in order.
const STOCK_FORK_BASES: [usize; 2] = [0x28, 0x20];
const STOCK_FORK_CHECKS: [SentinelCheck<'static>; 2] = [
    SentinelCheck {
        at: 0x00,
        accepts: &[STOCK_FORK_MAGIC],
    },
    SentinelCheck {
        at: 0x24,
        accepts: &[STOCK_FORK_MAGIC],
    },
];

/// The second-party block follows the first-party one at this distance.
const ALT_FORK_DISTANCE: usize = 0x28;
const ALT_FORK_CHECKS: [SentinelCheck<'static>; 2] = [
    SentinelCheck {
        at: 0x00,
        accepts: &[ALT_FORK_MAGIC],
    },
    SentinelCheck {
        at: 0x18,
        accepts: &[ALT_FORK_MAGIC],
    },
];

/// First base in `bases` for which every check holds.
fn first_match(data: &[u8], bases: &[usize], checks: &[SentinelCheck<'_>]) -> Option<usize> {
    bases.iter().copied().find(|&base| {
        checks.iter().all(|check| {
            base.checked_add(check.at)
                .is_some_and(|offset| sentinel_at(data, offset, check.accepts))
        })
    })
}

/// Where fork blocks start in a current-layout record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkBases {
    pub stock: Option<usize>,
    pub alt: Option<usize>,
}

impl ForkBases {
    fn locate(data: &[u8]) -> Self {
        let stock = first_match(data, &STOCK_FORK_BASES, &STOCK_FORK_CHECKS);
        let alt = match stock {
            Some(base) => first_match(data, &[base + ALT_FORK_DISTANCE], &ALT_FORK_CHECKS),
            None => {
                let bases = STOCK_FORK_BASES.map(|b| b + ALT_FORK_DISTANCE);
                first_match(data, &bases, &ALT_FORK_CHECKS)
            }
        };
        Self { stock, alt }
    }
}

/// Record layout generation, chosen from sentinels before any field is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Old runtime layout; a fork shifts the tail by `fork_offset`.
    V1 { fork_offset: Option<usize> },
    /// Current runtime layout.
    V2Runtime { forks: ForkBases },
    /// Bootloader-resident kernel or userland header.
    V2Bootloader { kind: HeaderKind, forks: ForkBases },
}

/// Smallest buffer that holds every fixed field for this combination.
pub fn min_len(mode: ExecutionMode, kind: HeaderKind) -> usize {
    match (mode, kind) {
        (ExecutionMode::Legacy, _) => LEGACY_MIN_LEN,
        (ExecutionMode::Bootloader, HeaderKind::Kernel) => KERNEL_MIN_LEN,
        (ExecutionMode::Bootloader, HeaderKind::Userland) => USERLAND_MIN_LEN,
    }
}

/// Select the layout of a record whose leading `magic` is already validated.
pub fn classify(data: &[u8], magic: u32, mode: ExecutionMode, kind: HeaderKind) -> Layout {
    match mode {
        ExecutionMode::Bootloader => Layout::V2Bootloader {
            kind,
            forks: ForkBases::locate(data),
        },
        ExecutionMode::Legacy if u32_be(data, LAYOUT_MAGIC_OFFSET) == Some(magic) => {
            Layout::V2Runtime {
                forks: ForkBases::locate(data),
            }
        }
        ExecutionMode::Legacy => {
            let accepts = [magic, STOCK_FORK_MAGIC];
            let checks = [SentinelCheck {
                at: LAYOUT_MAGIC_OFFSET,
                accepts: &accepts,
            }];
            Layout::V1 {
                fork_offset: first_match(data, &LEGACY_FORK_OFFSETS, &checks),
            }
        }
    }
}

fn storage_at(data: &[u8], offset: usize) -> Option<StorageRegion> {
    Some(StorageRegion {
        address: u32_le(data, offset)?,
        size: u32_le(data, offset + 4)?,
    })
}

impl PlatformInfo {
    /// Decode a platform info record.
    ///
    /// `kind` is only consulted in bootloader mode. Buffers shorter than
    /// [`min_len`] are rejected; every other malformation degrades into a
    /// partially populated record plus diagnostics.
    pub fn decode(
        data: &[u8],
        mode: ExecutionMode,
        kind: HeaderKind,
    ) -> Result<Self, DecodeError> {
        let expected = min_len(mode, kind);
        if data.len() < expected {
            return Err(DecodeError::BufferTooSmall {
                expected,
                actual: data.len(),
            });
        }

        let magic = match u32_be(data, 0) {
            Some(m) if PLATFORM_INFO_MAGICS.contains(&m) => m,
            other => {
                debug!(magic = ?other.map(|m| format!("0x{m:08X}")), "No platform info magic");
                return Ok(Self::default());
            }
        };

        let layout = classify(data, magic, mode, kind);
        debug!(?layout, "Platform info layout");

        let mut info = PlatformInfo {
            magic_valid: true,
            mode: Some(mode),
            is_legacy_layout: matches!(layout, Layout::V1 { .. }),
            firmware_version: fixed_str(data, VERSION_OFFSET, VERSION_LEN),
            ..Default::default()
        };

        match layout {
            Layout::V1 { fork_offset } => {
                let shift = fork_offset.unwrap_or(0);
                if fork_offset.is_some() {
                    info.stock_fork = Some(StockFork {
                        version: fixed_str(data, COMMIT_OFFSET, FORK_STR_LEN),
                        user: String::new(),
                    });
                }
                info.commit_hash = fixed_str(data, COMMIT_OFFSET + shift, COMMIT_LEN);
                info.storage_region = storage_at(data, 0x14 + shift);
            }
            Layout::V2Runtime { forks } => {
                info.read_forks(data, forks);
                info.commit_hash = fixed_str(data, COMMIT_OFFSET, COMMIT_LEN);
                info.storage_region = storage_at(data, 0x14);
            }
            Layout::V2Bootloader {
                kind: HeaderKind::Kernel,
                forks,
            } => {
                info.read_forks(data, forks);
                info.commit_hash = fixed_str(data, COMMIT_OFFSET, COMMIT_LEN);
                info.check_trailing_magic(
                    data,
                    RecordKind::KernelHeader,
                    KERNEL_TRAILING_MAGIC,
                    magic,
                );
            }
            Layout::V2Bootloader {
                kind: HeaderKind::Userland,
                forks,
            } => {
                info.read_forks(data, forks);
                info.storage_region = storage_at(data, 0x0C);
                info.external_memory = Some(ExternalMemory {
                    flash_start: u32_le(data, 0x14).unwrap_or_default(),
                    flash_end: u32_le(data, 0x18).unwrap_or_default(),
                    ram_start: u32_le(data, 0x1C).unwrap_or_default(),
                    ram_end: u32_le(data, 0x20).unwrap_or_default(),
                });
                info.check_trailing_magic(
                    data,
                    RecordKind::UserlandHeader,
                    USERLAND_TRAILING_MAGIC,
                    magic,
                );
            }
        }

        Ok(info)
    }

    fn read_forks(&mut self, data: &[u8], forks: ForkBases) {
        if let Some(base) = forks.stock {
            self.stock_fork = Some(StockFork {
                version: fixed_str(data, base + 0x04, FORK_STR_LEN),
                user: fixed_str(data, base + 0x14, FORK_STR_LEN),
            });
        }
        if let Some(base) = forks.alt {
            let os_type = u32_be(data, base + 0x14).unwrap_or_default();
            self.alt_fork = Some(AltFork {
                version: fixed_str(data, base + 0x04, FORK_STR_LEN),
                os_type,
                is_official: os_type == ALT_FORK_OFFICIAL_OS_TYPE,
            });
        }
    }

    fn check_trailing_magic(
        &mut self,
        data: &[u8],
        record: RecordKind,
        offset: usize,
        magic: u32,
    ) {
        let actual = u32_be(data, offset);
        if actual != Some(magic) {
            let diagnostic = Diagnostic::StructuralWarning {
                record,
                offset,
                expected: magic,
                actual,
            };
            warn!(%diagnostic, "Platform info structure is damaged");
            self.diagnostics.push(diagnostic);
        }
    }

    /// Whether the second-party fork is installed.
    pub fn alt_fork_installed(&self) -> bool {
        self.alt_fork.is_some()
    }
}

/// Free-function form of [`PlatformInfo::decode`].
pub fn decode_platform_info(
    data: &[u8],
    mode: ExecutionMode,
    kind: HeaderKind,
) -> Result<PlatformInfo, DecodeError> {
    PlatformInfo::decode(data, mode, kind)
}

impl fmt::Display for PlatformInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.magic_valid {
            return writeln!(f, "Platform info: invalid magic");
        }
        writeln!(
            f,
            "Platform info ({}{}):",
            self.mode.map(|m| m.to_string()).unwrap_or_default(),
            if self.is_legacy_layout { ", old layout" } else { "" }
        )?;
        writeln!(f, "  Version:  {}", self.firmware_version)?;
        writeln!(f, "  Commit:   {}", self.commit_hash)?;
        if let Some(fork) = &self.stock_fork {
            writeln!(f, "  Omega:    {} (user: {})", fork.version, fork.user)?;
        }
        if let Some(fork) = &self.alt_fork {
            writeln!(
                f,
                "  Upsilon:  {} (os type 0x{:08X}, {})",
                fork.version,
                fork.os_type,
                if fork.is_official { "official" } else { "unofficial" }
            )?;
        }
        if let Some(storage) = &self.storage_region {
            writeln!(
                f,
                "  Storage:  0x{:08X} ({} bytes)",
                storage.address, storage.size
            )?;
        }
        if let Some(ext) = &self.external_memory {
            writeln!(
                f,
                "  Ext flash: 0x{:08X}-0x{:08X} ({} KB)",
                ext.flash_start,
                ext.flash_end,
                ext.flash_size() / 1024
            )?;
            writeln!(
                f,
                "  Ext RAM:   0x{:08X}-0x{:08X} ({} KB)",
                ext.ram_start,
                ext.ram_end,
                ext.ram_size() / 1024
            )?;
        }
        if let Some(slot) = &self.active_slot {
            writeln!(f, "  Slot:     {}", slot)?;
        }
        for diagnostic in &self.diagnostics {
            writeln!(f, "  Warning:  {}", diagnostic)?;
        }
        Ok(())
    }
}
