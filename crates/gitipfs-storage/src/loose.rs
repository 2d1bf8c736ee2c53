//! Loose object encoding: zlib over `"<type> <size>\0<data>"`.

use crate::{GitObject, ObjectType, Result, StorageError};
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Compresses an object into the loose-object format.
pub fn encode_loose(object: &GitObject) -> Result<Vec<u8>> {
    let header = format!("{} {}\0", object.object_type.as_str(), object.data.len());
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(header.as_bytes())
        .map_err(|e| StorageError::Compression(e.to_string()))?;
    encoder
        .write_all(&object.data)
        .map_err(|e| StorageError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| StorageError::Compression(e.to_string()))
}

/// Decompresses a loose object and rebuilds it, recomputing its id.
///
/// The size in the header must match the payload length.
pub fn decode_loose(compressed: &[u8]) -> Result<GitObject> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| StorageError::Compression(e.to_string()))?;

    // Parse header: "type size\0data"
    let null_pos = decompressed
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| StorageError::InvalidObject("missing null byte in header".to_string()))?;

    let header = String::from_utf8_lossy(&decompressed[..null_pos]);
    let (kind, size) = header
        .split_once(' ')
        .ok_or_else(|| StorageError::InvalidObject(format!("invalid header: {}", header)))?;

    let object_type = ObjectType::parse(kind)?;
    let size: usize = size
        .parse()
        .map_err(|_| StorageError::InvalidObject(format!("invalid size: {}", size)))?;

    let data = &decompressed[null_pos + 1..];
    if data.len() != size {
        return Err(StorageError::InvalidObject(format!(
            "size mismatch: header says {}, payload is {}",
            size,
            data.len()
        )));
    }

    Ok(GitObject::new(object_type, Bytes::copy_from_slice(data)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zlib(raw: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(raw).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_encode_decode() {
        let blob = GitObject::blob(b"hello\n".to_vec());
        let encoded = encode_loose(&blob).unwrap();
        let decoded = decode_loose(&encoded).unwrap();

        assert_eq!(decoded.id, blob.id);
        assert_eq!(decoded.object_type, ObjectType::Blob);
        assert_eq!(decoded.data, blob.data);
    }

    #[test]
    fn test_decode_git_written_bytes() {
        let decoded = decode_loose(&zlib(b"blob 6\0hello\n")).unwrap();
        assert_eq!(
            decoded.id.to_hex(),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let err = decode_loose(&zlib(b"blob 7\0hello\n")).unwrap_err();
        assert!(matches!(err, StorageError::InvalidObject(_)));
    }

    #[test]
    fn test_bad_header_rejected() {
        assert!(decode_loose(&zlib(b"blob6\0hello\n")).is_err());
        assert!(decode_loose(&zlib(b"blurb 6\0hello\n")).is_err());
        assert!(decode_loose(&zlib(b"blob 6 hello\n")).is_err());
    }

    #[test]
    fn test_not_zlib_rejected() {
        let err = decode_loose(b"plainly not zlib").unwrap_err();
        assert!(matches!(err, StorageError::Compression(_)));
    }
}
