//! Decoding of a single pack entry.

use crate::{PackError, Result};
use flate2::read::ZlibDecoder;
use gitipfs_storage::{ObjectId, ObjectType};
use std::io::Read;

/// Pack type code of an entry stored as a delta against an earlier offset.
pub(crate) const OFS_DELTA: u8 = 6;
/// Pack type code of an entry stored as a delta against a named object.
pub(crate) const REF_DELTA: u8 = 7;

/// A decoded pack entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackEntry {
    /// A complete object.
    Base {
        /// Type of the object.
        object_type: ObjectType,
        /// Inflated object data.
        data: Vec<u8>,
    },
    /// A delta against the entry `distance` bytes before this one.
    OfsDelta {
        /// Backwards distance to the base entry.
        distance: u64,
        /// Inflated delta instructions.
        delta: Vec<u8>,
    },
    /// A delta against the object with the given id.
    RefDelta {
        /// Id of the base object.
        base: ObjectId,
        /// Inflated delta instructions.
        delta: Vec<u8>,
    },
}

/// Decodes the entry at the start of `raw`.
///
/// `raw` must begin at the entry header; bytes after the compressed stream
/// are ignored.
pub fn parse_entry(raw: &[u8]) -> Result<PackEntry> {
    let (type_code, size, mut pos) = parse_header(raw)?;

    let entry = match type_code {
        OFS_DELTA => {
            let (distance, used) = parse_ofs_distance(&raw[pos..])?;
            pos += used;
            PackEntry::OfsDelta {
                distance,
                delta: inflate(&raw[pos..], size)?,
            }
        }
        REF_DELTA => {
            let end = pos + 20;
            if raw.len() < end {
                return Err(PackError::InvalidPack(
                    "truncated ref-delta base".to_string(),
                ));
            }
            let base = ObjectId::from_slice(&raw[pos..end])?;
            PackEntry::RefDelta {
                base,
                delta: inflate(&raw[end..], size)?,
            }
        }
        code => PackEntry::Base {
            object_type: ObjectType::from_pack_type(code)?,
            data: inflate(&raw[pos..], size)?,
        },
    };
    Ok(entry)
}

/// Reads the type/size header: returns `(type code, inflated size, header length)`.
fn parse_header(raw: &[u8]) -> Result<(u8, usize, usize)> {
    // First byte: (MSB=more bytes) (3 bits type) (4 bits size)
    let first = *raw
        .first()
        .ok_or_else(|| PackError::InvalidPack("empty entry".to_string()))?;
    let type_code = (first >> 4) & 0x07;
    let mut size = (first & 0x0F) as usize;
    let mut shift = 4;
    let mut pos = 1;
    let mut more = first & 0x80 != 0;

    // Additional size bytes (7 bits each, MSB=continue)
    while more {
        let byte = *raw
            .get(pos)
            .ok_or_else(|| PackError::InvalidPack("unexpected end in size".to_string()))?;
        if shift > 57 {
            return Err(PackError::InvalidPack("entry size overflows".to_string()));
        }
        size |= ((byte & 0x7F) as usize) << shift;
        shift += 7;
        pos += 1;
        more = byte & 0x80 != 0;
    }

    Ok((type_code, size, pos))
}

/// Reads the offset encoding used by OFS_DELTA: each continuation adds one
/// before shifting, so every distance has a single encoding.
fn parse_ofs_distance(raw: &[u8]) -> Result<(u64, usize)> {
    let truncated = || PackError::InvalidPack("truncated ofs-delta offset".to_string());
    let mut byte = *raw.first().ok_or_else(truncated)?;
    let mut distance = u64::from(byte & 0x7F);
    let mut pos = 1;
    while byte & 0x80 != 0 {
        byte = *raw.get(pos).ok_or_else(truncated)?;
        distance = distance
            .checked_add(1)
            .and_then(|d| d.checked_mul(128))
            .ok_or_else(|| PackError::InvalidPack("ofs-delta offset overflows".to_string()))?
            | u64::from(byte & 0x7F);
        pos += 1;
    }
    if distance == 0 {
        return Err(PackError::InvalidPack(
            "ofs-delta points at itself".to_string(),
        ));
    }
    Ok((distance, pos))
}

/// Encodes an OFS_DELTA distance.
pub(crate) fn encode_ofs_distance(mut distance: u64) -> Vec<u8> {
    let mut bytes = vec![(distance & 0x7F) as u8];
    distance >>= 7;
    while distance > 0 {
        distance -= 1;
        bytes.push(0x80 | (distance & 0x7F) as u8);
        distance >>= 7;
    }
    bytes.reverse();
    bytes
}

fn inflate(compressed: &[u8], size: usize) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut data = Vec::with_capacity(size.min(1 << 20));
    decoder
        .read_to_end(&mut data)
        .map_err(|e| PackError::InvalidPack(format!("decompression failed: {}", e)))?;
    if data.len() != size {
        return Err(PackError::InvalidPack(format!(
            "entry inflated to {} bytes, header says {}",
            data.len(),
            size
        )));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_base_entry() {
        // blob, size 5: 0b0_011_0101
        let mut raw = vec![0x35];
        raw.extend(zlib(b"hello"));
        raw.extend_from_slice(b"trailing bytes of the next entry");

        let entry = parse_entry(&raw).unwrap();
        assert_eq!(
            entry,
            PackEntry::Base {
                object_type: ObjectType::Blob,
                data: b"hello".to_vec(),
            }
        );
    }

    #[test]
    fn test_multi_byte_size() {
        let data = vec![b'x'; 300];
        // commit, 300 = 0b1_0010_1100: low nibble 0xC, then 300 >> 4 = 18
        let mut raw = vec![0x80 | (1 << 4) | 0x0C, 18];
        raw.extend(zlib(&data));

        match parse_entry(&raw).unwrap() {
            PackEntry::Base { object_type, data } => {
                assert_eq!(object_type, ObjectType::Commit);
                assert_eq!(data.len(), 300);
            }
            other => panic!("unexpected entry {:?}", other),
        }
    }

    #[test]
    fn test_ofs_delta_entry() {
        let mut raw = vec![(OFS_DELTA << 4) | 3];
        raw.extend(encode_ofs_distance(200));
        raw.extend(zlib(b"abc"));

        let entry = parse_entry(&raw).unwrap();
        assert_eq!(
            entry,
            PackEntry::OfsDelta {
                distance: 200,
                delta: b"abc".to_vec(),
            }
        );
    }

    #[test]
    fn test_ref_delta_entry() {
        let base = ObjectId::from_bytes([7u8; 20]);
        let mut raw = vec![(REF_DELTA << 4) | 2];
        raw.extend_from_slice(base.as_bytes());
        raw.extend(zlib(b"de"));

        let entry = parse_entry(&raw).unwrap();
        assert_eq!(
            entry,
            PackEntry::RefDelta {
                base,
                delta: b"de".to_vec(),
            }
        );
    }

    #[test]
    fn test_ofs_distance_encoding() {
        for distance in [1u64, 127, 128, 129, 16_511, 16_512, 1 << 30] {
            let encoded = encode_ofs_distance(distance);
            let (decoded, used) = parse_ofs_distance(&encoded).unwrap();
            assert_eq!(decoded, distance);
            assert_eq!(used, encoded.len());
        }
        // 128 takes two bytes: 0x80 0x00
        assert_eq!(encode_ofs_distance(128), vec![0x80, 0x00]);
    }

    #[test]
    fn test_size_mismatch() {
        let mut raw = vec![0x36]; // blob, size 6
        raw.extend(zlib(b"hello"));
        assert!(parse_entry(&raw).is_err());
    }

    #[test]
    fn test_invalid_type() {
        let mut raw = vec![0x05]; // type 0
        raw.extend(zlib(b"hello"));
        assert!(parse_entry(&raw).is_err());
    }

    #[test]
    fn test_truncated() {
        assert!(parse_entry(&[]).is_err());
        assert!(parse_entry(&[0xb5]).is_err());
        assert!(parse_entry(&[(REF_DELTA << 4) | 2, 1, 2, 3]).is_err());
        assert!(parse_entry(&[(OFS_DELTA << 4) | 2, 0x80]).is_err());
    }
}
