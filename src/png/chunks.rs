//! PNG chunk framing and integrity checking.

use byteorder_lite::{BigEndian, ByteOrder};
use log::warn;

use crate::error::Error;

/// The first eight bytes of every PNG datastream.
pub const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// One framed chunk, CRC already verified (or waived).
pub(crate) struct RawChunk<'a> {
    pub chunk_type: [u8; 4],
    pub data: &'a [u8],
}

/// Splits a PNG byte stream into chunks, stopping after `IEND`.
pub(crate) fn split_chunks(data: &[u8], fail_on_crc: bool) -> Result<Vec<RawChunk<'_>>, Error> {
    if !data.starts_with(&SIGNATURE) {
        return Err(Error::UnknownFormat);
    }

    let mut chunks = Vec::new();
    let mut offset = SIGNATURE.len();
    while offset < data.len() {
        let header = data
            .get(offset..offset + 8)
            .ok_or(Error::InputTooShort("chunk header"))?;
        let length = BigEndian::read_u32(&header[..4]) as usize;
        let chunk_type: [u8; 4] = header[4..8].try_into().unwrap();

        let body_end = offset
            .checked_add(8 + length)
            .ok_or(Error::InputTooShort("chunk data"))?;
        let body = data
            .get(offset + 8..body_end)
            .ok_or(Error::InputTooShort("chunk data"))?;
        let stored = data
            .get(body_end..body_end + 4)
            .ok_or(Error::InputTooShort("chunk checksum"))?;

        // The checksum covers the type bytes and the payload.
        let stored = BigEndian::read_u32(stored);
        if stored != crc32(&chunk_type, body) {
            if fail_on_crc {
                return Err(Error::InvalidFormat("chunk CRC mismatch"));
            }
            warn!(
                "CRC mismatch in {} chunk, using it anyway",
                String::from_utf8_lossy(&chunk_type)
            );
        }

        chunks.push(RawChunk { chunk_type, data: body });
        offset = body_end + 4;

        if chunk_type == *b"IEND" {
            break;
        }
    }

    Ok(chunks)
}

/// Byte-wise CRC-32 over a chunk's type and payload.
pub(crate) fn crc32(chunk_type: &[u8; 4], data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in chunk_type.iter().chain(data) {
        crc = CRC_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8);
    }
    crc ^ 0xFFFF_FFFF
}

static CRC_TABLE: [u32; 256] = crc_table();

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 {
                0xEDB8_8320 ^ (c >> 1)
            } else {
                c >> 1
            };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}
