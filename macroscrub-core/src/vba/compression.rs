//! MS-OVBA compressed container codec (MS-OVBA 2.4.1)

use thiserror::Error;

/// Decompressed size of one chunk.
const CHUNK_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum OvbaError {
    #[error("compressed container is empty")]
    Empty,
    #[error("bad container signature byte {0:#04x}")]
    BadSignature(u8),
    #[error("chunk header is truncated")]
    TruncatedHeader,
    #[error("chunk signature bits {0:#x} are invalid")]
    BadChunkSignature(u16),
    #[error("chunk data is truncated")]
    TruncatedChunk,
    #[error("copy token is truncated")]
    TruncatedToken,
    #[error("copy token offset {offset} exceeds the {window} bytes produced so far")]
    BadTokenOffset { offset: usize, window: usize },
}

/// Decompress a compressed container, as found in the `VBA/dir` stream and
/// in module streams from their text offset onward.
pub fn decompress(container: &[u8]) -> Result<Vec<u8>, OvbaError> {
    let (&signature, chunks) = container.split_first().ok_or(OvbaError::Empty)?;
    if signature != 0x01 {
        return Err(OvbaError::BadSignature(signature));
    }

    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < chunks.len() {
        if pos + 2 > chunks.len() {
            return Err(OvbaError::TruncatedHeader);
        }
        let header = u16::from_le_bytes([chunks[pos], chunks[pos + 1]]);
        pos += 2;

        let signature_bits = (header & 0x7000) >> 12;
        if signature_bits != 0b011 {
            return Err(OvbaError::BadChunkSignature(signature_bits));
        }
        let compressed = header & 0x8000 != 0;
        let data_len = (header & 0x0FFF) as usize + 1;

        if pos + data_len > chunks.len() {
            return Err(OvbaError::TruncatedChunk);
        }
        let data = &chunks[pos..pos + data_len];
        pos += data_len;

        if compressed {
            decompress_chunk(data, &mut out)?;
        } else {
            out.extend_from_slice(data);
        }
    }

    Ok(out)
}

fn decompress_chunk(data: &[u8], out: &mut Vec<u8>) -> Result<(), OvbaError> {
    let start = out.len();
    let mut pos = 0usize;

    while pos < data.len() && out.len() - start < CHUNK_SIZE {
        let flags = data[pos];
        pos += 1;

        for bit in 0..8 {
            if pos >= data.len() || out.len() - start >= CHUNK_SIZE {
                break;
            }

            if flags & (1 << bit) == 0 {
                out.push(data[pos]);
                pos += 1;
                continue;
            }

            if pos + 2 > data.len() {
                return Err(OvbaError::TruncatedToken);
            }
            let token = u16::from_le_bytes([data[pos], data[pos + 1]]);
            pos += 2;

            let offset_bits = offset_bit_count(out.len() - start);
            let length_mask = (1u16 << (16 - offset_bits)) - 1;
            let offset = (token >> (16 - offset_bits)) as usize + 1;
            let length = (token & length_mask) as usize + 3;

            let window = out.len() - start;
            if offset > window {
                return Err(OvbaError::BadTokenOffset { offset, window });
            }

            for _ in 0..length {
                if out.len() - start >= CHUNK_SIZE {
                    break;
                }
                let byte = out[out.len() - offset];
                out.push(byte);
            }
        }
    }

    Ok(())
}

/// Number of offset bits in a copy token, derived from how much of the
/// current chunk has been produced. Clamped to 4..=12 per MS-OVBA.
fn offset_bit_count(produced: usize) -> u32 {
    let n = produced.saturating_sub(1);
    let bits = if n == 0 {
        0
    } else {
        usize::BITS - n.leading_zeros()
    };
    bits.clamp(4, 12)
}

/// Encode bytes as a compressed container made of raw (uncompressed)
/// chunks. The output round-trips through [`decompress`]; used to assemble
/// project binaries in fixtures and by external rebuild tooling.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / CHUNK_SIZE * 2 + 3);
    out.push(0x01);

    for chunk in data.chunks(CHUNK_SIZE) {
        let header = 0x3000u16 | (chunk.len() as u16 - 1);
        out.extend_from_slice(&header.to_le_bytes());
        out.extend_from_slice(chunk);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_chunks_round_trip() {
        let data = b"Sub Hello()\r\n    MsgBox \"hola\"\r\nEnd Sub\r\n";
        let container = compress(data);
        assert_eq!(decompress(&container).unwrap(), data);
    }

    #[test]
    fn multi_chunk_round_trip() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let container = compress(&data);
        assert_eq!(decompress(&container).unwrap(), data);
    }

    #[test]
    fn empty_input_round_trips() {
        assert_eq!(decompress(&compress(b"")).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn decompresses_literal_tokens() {
        // One compressed chunk, all-literal flag bytes.
        let payload = b"abcdefg";
        let mut chunk = Vec::new();
        chunk.push(0x00); // 8 literals follow
        chunk.extend_from_slice(payload);
        let mut container = vec![0x01];
        let header = 0xB000u16 | (chunk.len() as u16 - 1);
        container.extend_from_slice(&header.to_le_bytes());
        container.extend_from_slice(&chunk);

        assert_eq!(decompress(&container).unwrap(), payload);
    }

    #[test]
    fn decompresses_copy_tokens() {
        // "aaaa...": one literal 'a' then a copy token repeating it.
        // With 1 byte produced, offset uses 4 bits: token 0x0000 means
        // offset 1, length 3.
        let chunk: &[u8] = &[0b0000_0010, b'a', 0x00, 0x00];
        let mut container = vec![0x01];
        let header = 0xB000u16 | (chunk.len() as u16 - 1);
        container.extend_from_slice(&header.to_le_bytes());
        container.extend_from_slice(chunk);

        assert_eq!(decompress(&container).unwrap(), b"aaaa");
    }

    #[test]
    fn rejects_bad_signature() {
        assert!(matches!(
            decompress(&[0x02, 0x00, 0x30]),
            Err(OvbaError::BadSignature(0x02))
        ));
    }

    #[test]
    fn rejects_copy_before_start() {
        // Copy token as the very first element references nothing.
        let chunk: &[u8] = &[0b0000_0001, 0x00, 0x00];
        let mut container = vec![0x01];
        let header = 0xB000u16 | (chunk.len() as u16 - 1);
        container.extend_from_slice(&header.to_le_bytes());
        container.extend_from_slice(chunk);

        assert!(matches!(
            decompress(&container),
            Err(OvbaError::BadTokenOffset { .. })
        ));
    }
}
