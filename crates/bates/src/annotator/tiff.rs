//! Page counting for classic TIFF containers.
//!
//! A TIFF stores one image file directory (IFD) per page, chained through a
//! 4-byte "next IFD" offset. Counting pages walks that chain without
//! decoding any pixel data. Files that are not TIFF are treated as a single
//! page.

use crate::PageCount;
use std::collections::HashSet;

const HEADER_LEN: usize = 8;
const IFD_ENTRY_LEN: usize = 12;

#[derive(Clone, Copy)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u16(self, bytes: &[u8], at: usize) -> Option<u16> {
        let raw: [u8; 2] = bytes.get(at..at.checked_add(2)?)?.try_into().ok()?;
        Some(match self {
            Self::Little => u16::from_le_bytes(raw),
            Self::Big => u16::from_be_bytes(raw),
        })
    }

    fn u32(self, bytes: &[u8], at: usize) -> Option<u32> {
        let raw: [u8; 4] = bytes.get(at..at.checked_add(4)?)?.try_into().ok()?;
        Some(match self {
            Self::Little => u32::from_le_bytes(raw),
            Self::Big => u32::from_be_bytes(raw),
        })
    }
}

/// Counts the pages in `bytes`.
///
/// # Errors
///
/// Returns a reason string when the file is empty, is a BigTIFF, or has a
/// directory chain that is truncated or loops.
pub fn count_pages(bytes: &[u8]) -> Result<PageCount, String> {
    let order = match bytes.get(..4) {
        Some(b"II*\0") => ByteOrder::Little,
        Some(b"MM\0*") => ByteOrder::Big,
        Some(b"II+\0" | b"MM\0+") => return Err("BigTIFF is not supported".to_string()),
        _ if bytes.is_empty() => return Err("empty file".to_string()),
        _ => return Ok(1),
    };

    let mut offset = order
        .u32(bytes, 4)
        .ok_or_else(|| "truncated header".to_string())?;
    let mut seen = HashSet::new();
    let mut pages = 0;

    while offset != 0 {
        if !seen.insert(offset) {
            return Err(format!("directory chain loops at offset {offset}"));
        }
        let at = offset as usize;
        let entries = order
            .u16(bytes, at)
            .ok_or_else(|| format!("directory at offset {at} is out of bounds"))?;
        let next_at = at + 2 + usize::from(entries) * IFD_ENTRY_LEN;
        offset = order
            .u32(bytes, next_at)
            .ok_or_else(|| format!("directory at offset {at} is truncated"))?;
        pages += 1;
    }

    Ok(pages)
}

/// Builds a minimal little-endian TIFF with `pages` empty directories.
///
/// The result has no pixel data; it only carries the page structure, which
/// is enough for fixtures and benchmarks.
pub fn blank_tiff(pages: PageCount) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + pages as usize * 6);
    bytes.extend_from_slice(b"II*\0");
    let first = if pages == 0 { 0 } else { HEADER_LEN as u32 };
    bytes.extend_from_slice(&first.to_le_bytes());
    for page in 0..pages {
        // Zero entries, then the offset of the next directory.
        bytes.extend_from_slice(&0_u16.to_le_bytes());
        let next = if page + 1 == pages {
            0
        } else {
            (bytes.len() + 4) as u32
        };
        bytes.extend_from_slice(&next.to_le_bytes());
    }
    bytes
}
