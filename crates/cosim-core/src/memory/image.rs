use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::MemoryBackend;
use crate::SetupError;

/// Parses one two-digit hex byte; signs and non-ASCII text are rejected.
fn parse_hex_byte(pair: &[u8]) -> Option<u8> {
    let text = std::str::from_utf8(pair).ok()?;
    if !text.bytes().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(text, 16).ok()
}

/// Loads a hex memory image into per-channel backing stores.
///
/// Each line is a hex byte string whose rightmost byte has the lowest
/// address; consecutive lines occupy consecutive addresses. Bytes are
/// interleaved across channels at `line_bytes` granularity. Returns the
/// number of bytes loaded.
///
/// # Errors
///
/// Returns [`SetupError::ImageParse`] for malformed lines and
/// [`SetupError::ImageOutOfRange`] when a byte lands beyond a store.
pub fn load_image<R: BufRead>(
    reader: R,
    mems: &mut [&mut [u8]],
    line_bytes: usize,
    path: &Path,
) -> Result<u64, SetupError> {
    let channels = mems.len() as u64;
    let line = line_bytes.max(1) as u64;
    let mut start = 0u64;

    for (index, text) in reader.lines().enumerate() {
        let text = text.map_err(|source| SetupError::ImageRead {
            path: path.to_path_buf(),
            source,
        })?;
        let digits = text.trim_end().as_bytes();
        if digits.len() % 2 != 0 {
            return Err(SetupError::ImageParse {
                line: index + 1,
                reason: format!("odd number of hex digits ({})", digits.len()),
            });
        }
        if channels == 0 && !digits.is_empty() {
            return Err(SetupError::ImageOutOfRange { offset: start });
        }

        for (j, pair) in digits.rchunks(2).enumerate() {
            let byte = parse_hex_byte(pair).ok_or_else(|| SetupError::ImageParse {
                line: index + 1,
                reason: format!("invalid hex digits {:?}", String::from_utf8_lossy(pair)),
            })?;
            let addr = start + j as u64;
            let channel = ((addr / line) % channels) as usize;
            let offset = (addr / line / channels) * line + addr % line;
            let slot = match usize::try_from(offset) {
                Ok(offset) => mems[channel].get_mut(offset),
                Err(_) => None,
            };
            *slot.ok_or(SetupError::ImageOutOfRange { offset: addr })? = byte;
        }
        start += digits.len() as u64 / 2;
    }

    Ok(start)
}

/// Opens `path` and loads it into the backends' storage.
///
/// # Errors
///
/// Returns [`SetupError::ImageRead`] when the file cannot be read, plus
/// every error of [`load_image`].
pub fn load_image_file(
    path: &Path,
    backends: &mut [Box<dyn MemoryBackend>],
    line_bytes: usize,
) -> Result<u64, SetupError> {
    let file = File::open(path).map_err(|source| SetupError::ImageRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut mems: Vec<&mut [u8]> = backends.iter_mut().map(|b| b.data_mut()).collect();
    let loaded = load_image(BufReader::new(file), &mut mems, line_bytes, path)?;
    log::debug!("preloaded {loaded} bytes from {}", path.display());
    Ok(loaded)
}
