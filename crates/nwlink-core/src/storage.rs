//! Storage image codec seam.
//!
//! The calculator's user storage is an opaque blob to this crate. A
//! [`StorageCodec`] turns the raw bytes read from the device into an image
//! and back; its internal file format is the codec's business.

use thiserror::Error;

use crate::protocol::constants::STORAGE_FRAMING_LEN;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Storage dump too small: {actual} bytes, minimum {minimum}")]
    DumpTooSmall { actual: usize, minimum: usize },
    #[error("Image too large: {size} bytes, capacity {capacity}")]
    ImageTooLarge { size: usize, capacity: u32 },
}

/// Converts between raw storage bytes and a structured image.
pub trait StorageCodec {
    type Image;

    /// Decode a storage dump (region plus trailing framing bytes).
    fn decode(&self, data: &[u8], alt_fork_installed: bool) -> Result<Self::Image, CodecError>;

    /// Encode `image` into at most `max_size` bytes.
    fn encode(
        &self,
        image: &Self::Image,
        max_size: u32,
        alt_fork_installed: bool,
    ) -> Result<Vec<u8>, CodecError>;
}

/// Raw storage contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawImage(pub Vec<u8>);

/// Codec that keeps the storage region byte-for-byte.
///
/// Decoding drops the framing bytes read past the region so that a backup
/// can be installed back unchanged; encoding zero-pads to capacity.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawStorageCodec;

impl StorageCodec for RawStorageCodec {
    type Image = RawImage;

    fn decode(&self, data: &[u8], _alt_fork_installed: bool) -> Result<RawImage, CodecError> {
        let framing = STORAGE_FRAMING_LEN as usize;
        if data.len() < framing {
            return Err(CodecError::DumpTooSmall {
                actual: data.len(),
                minimum: framing,
            });
        }
        Ok(RawImage(data[..data.len() - framing].to_vec()))
    }

    fn encode(
        &self,
        image: &RawImage,
        max_size: u32,
        _alt_fork_installed: bool,
    ) -> Result<Vec<u8>, CodecError> {
        let capacity = max_size as usize;
        if image.0.len() > capacity {
            return Err(CodecError::ImageTooLarge {
                size: image.0.len(),
                capacity: max_size,
            });
        }
        let mut out = image.0.clone();
        out.resize(capacity, 0);
        Ok(out)
    }
}
