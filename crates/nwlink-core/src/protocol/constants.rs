//! Device-resident magic values, addresses and record sizes.
//!
//! Magic values are given as they read from the device buffer in big-endian
//! order, which is how every sentinel check in this crate compares them.

// Platform info magics
pub const PLATFORM_INFO_MAGIC: u32 = 0xF00D_C0DE;
pub const USERLAND_HEADER_MAGIC: u32 = 0xFEED_C0DE;
pub const PLATFORM_INFO_MAGICS: [u32; 2] = [PLATFORM_INFO_MAGIC, USERLAND_HEADER_MAGIC];

// Community fork sentinels
pub const STOCK_FORK_MAGIC: u32 = 0xDEAD_BEEF;
pub const ALT_FORK_MAGIC: u32 = 0x5570_7369; // 'Upsi'
pub const ALT_FORK_OFFICIAL_OS_TYPE: u32 = 0x7982_7178;

// Slot info
pub const SLOT_INFO_MAGIC: u32 = 0xBADB_EEEF;
pub const SLOT_INFO_ADDRESS: u32 = 0x2000_0000;
pub const SLOT_INFO_LEN: u32 = 0x10;
pub const SLOT_HEADER_OFFSET: u32 = 8;
pub const SLOT_A_BASE: u32 = 0x9000_0000;
pub const SLOT_B_BASE: u32 = 0x9040_0000;
pub const SLOT_KHI_BASE: u32 = 0x9018_0000;

// Platform info reads
pub const LEGACY_PLATFORM_INFO_ADDRESS: u32 = 0x0800_01C4;
pub const PLATFORM_INFO_READ_LEN: u32 = 0x128;

/// Bytes read past the end of the storage region during a backup.
pub const STORAGE_FRAMING_LEN: u32 = 8;

// Memory windows used for model classification
pub const INTERNAL_FLASH_START: u32 = 0x0800_0000;
pub const INTERNAL_FLASH_END: u32 = 0x080F_FFFF;
pub const EXTERNAL_FLASH_START: u32 = 0x9000_0000;
pub const EXTERNAL_FLASH_END: u32 = 0x9FFF_FFFF;

pub const INTERNAL_SIZE_N0110: u32 = 0x1_0000;
pub const INTERNAL_SIZE_N0100: u32 = 0x10_0000;
pub const EXTERNAL_SIZE_NONE: u32 = 0;
pub const EXTERNAL_SIZE_8M: u32 = 0x80_0000;
pub const EXTERNAL_SIZE_16M: u32 = 0x100_0000;

// Product strings reported by the third-party firmware
pub const PRODUCT_ALT_BOOTLOADER: &str = "Upsilon Bootloader";
pub const PRODUCT_ALT_RUNTIME: &str = "Upsilon Calculator";

// USB identity
pub const NUMWORKS_VENDOR_ID: u16 = 0x0483;
pub const NUMWORKS_PRODUCT_ID: u16 = 0xA291;

// DFU class requests
pub const DFU_DNLOAD: u8 = 0x01;
pub const DFU_UPLOAD: u8 = 0x02;
pub const DFU_GETSTATUS: u8 = 0x03;
pub const DFU_CLRSTATUS: u8 = 0x04;
pub const DFU_ABORT: u8 = 0x06;

// DfuSe commands (sent as DNLOAD block 0)
pub const DFUSE_SET_ADDRESS: u8 = 0x21;

/// First block number carrying data in a DfuSe transfer.
pub const DFUSE_FIRST_DATA_BLOCK: u16 = 2;

pub const DEFAULT_TRANSFER_SIZE: u16 = 2048;
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
