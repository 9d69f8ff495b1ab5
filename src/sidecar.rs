//! Side-car file holding tensor payloads outside the JSON document.
//!
//! The side-car is a raw concatenation of tensor payloads in the order they
//! were written, with no header. Each payload is optionally zlib-compressed.
//! The JSON document records where each payload starts and how many bytes it
//! occupies, see [`TensorRef`].

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::document::TensorRef;
use crate::error::ConvertError;

/// Compression level used when none is specified.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Location of a payload in the side-car stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Extent {
    /// Offset of the first byte of the payload.
    pub offset: u64,

    /// Number of bytes the payload occupies in the stream.
    pub size: u64,

    /// Size of the payload before compression, if it was compressed.
    pub original_size: Option<u64>,
}

/// Append-only writer for a side-car stream.
///
/// There is exactly one writer per stream. Payloads must be appended at the
/// current end of the stream, which callers track as the running offset
/// returned by each conversion step.
pub struct SideCar<'a> {
    writer: &'a mut dyn Write,
    len: u64,
    compression: Option<Compression>,
    payload_bytes: u64,
}

impl<'a> SideCar<'a> {
    /// Create a side-car that writes payloads uncompressed to `writer`.
    pub fn new(writer: &'a mut dyn Write) -> Self {
        SideCar {
            writer,
            len: 0,
            compression: None,
            payload_bytes: 0,
        }
    }

    /// Compress each payload with zlib at the given level (0-9).
    ///
    /// Levels above 9 are clamped.
    pub fn with_compression(mut self, level: u32) -> Self {
        self.compression = Some(Compression::new(level.min(9)));
        self
    }

    pub fn is_compressed(&self) -> bool {
        self.compression.is_some()
    }

    /// Return the number of bytes written to the stream so far.
    ///
    /// This is the offset at which the next payload must be appended.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Return the total size of the payloads appended so far, before
    /// compression.
    pub fn payload_bytes(&self) -> u64 {
        self.payload_bytes
    }

    /// Append a payload at `offset`.
    ///
    /// `offset` must equal [`len`](SideCar::len). The payload is compressed
    /// in full before any bytes are written to the underlying writer.
    pub fn append(&mut self, offset: u64, payload: &[u8]) -> Result<Extent, ConvertError> {
        if offset != self.len {
            return Err(ConvertError::OffsetMismatch {
                expected: self.len,
                actual: offset,
            });
        }

        let payload_len = payload.len() as u64;
        let (size, original_size) = match self.compression {
            Some(level) => {
                let compressed = compress(payload, level).map_err(ConvertError::SideCarWrite)?;
                self.writer
                    .write_all(&compressed)
                    .map_err(ConvertError::SideCarWrite)?;
                (compressed.len() as u64, Some(payload_len))
            }
            None => {
                self.writer
                    .write_all(payload)
                    .map_err(ConvertError::SideCarWrite)?;
                (payload_len, None)
            }
        };

        self.len += size;
        self.payload_bytes += payload_len;

        Ok(Extent {
            offset,
            size,
            original_size,
        })
    }
}

fn compress(data: &[u8], level: Compression) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), level);
    encoder.write_all(data)?;
    encoder.finish()
}

/// Read the payload of a side-car tensor back from the side-car contents.
///
/// Compressed payloads are decompressed. The result is the tensor's packed
/// little-endian elements, which can be decoded with
/// [`decode_elements`](crate::dtype::decode_elements).
pub fn read_payload(sidecar: &[u8], entry: &TensorRef) -> std::io::Result<Vec<u8>> {
    let range = usize::try_from(entry.weights_offset)
        .ok()
        .zip(usize::try_from(entry.weights_size).ok())
        .and_then(|(start, size)| Some(start..start.checked_add(size)?))
        .filter(|range| range.end <= sidecar.len())
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "data for tensor \"{}\" is outside the side-car file",
                    entry.name
                ),
            )
        })?;
    let stored = &sidecar[range];

    if !entry.compressed {
        return Ok(stored.to_vec());
    }

    let mut data = Vec::new();
    ZlibDecoder::new(stored).read_to_end(&mut data)?;

    if let Some(original_size) = entry.original_size {
        if data.len() as u64 != original_size {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "decompressed size {} does not match original size {}",
                    data.len(),
                    original_size
                ),
            ));
        }
    }

    Ok(data)
}
