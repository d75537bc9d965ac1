//! Bounds-checked field readers over raw device buffers.
//!
//! Every reader returns `None` instead of panicking when the field would run
//! past the end of the buffer.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Read a big-endian u32 at `offset`.
pub fn u32_be(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset.checked_add(4)?).map(BigEndian::read_u32)
}

/// Read a little-endian u32 at `offset`.
pub fn u32_le(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset.checked_add(4)?).map(LittleEndian::read_u32)
}

/// Read a NUL-terminated string occupying at most `max_len` bytes.
///
/// A field cut short by the end of the buffer yields whatever bytes remain.
pub fn fixed_str(data: &[u8], offset: usize, max_len: usize) -> String {
    let Some(tail) = data.get(offset..) else {
        return String::new();
    };
    let field = &tail[..tail.len().min(max_len)];
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// True if the big-endian u32 at `offset` is one of `accepted`.
pub fn sentinel_at(data: &[u8], offset: usize, accepted: &[u32]) -> bool {
    u32_be(data, offset).is_some_and(|v| accepted.contains(&v))
}
