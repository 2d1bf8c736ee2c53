//! Pack index (`.idx`) parsing, versions 1 and 2.

use crate::{PackError, Result};
use gitipfs_storage::ObjectId;
use sha1::{Digest, Sha1};

/// Magic bytes at the start of a version 2 index.
pub(crate) const IDX_SIGNATURE: &[u8; 4] = b"\xfftOc";
/// Size of the fanout table in bytes.
const FANOUT_LEN: usize = 256 * 4;
/// Size of a trailing SHA-1 checksum.
const CHECKSUM_LEN: usize = 20;
/// Flag marking a 31-bit offset as an index into the large offset table.
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// A parsed pack index: which objects a pack holds and where.
#[derive(Debug, Clone)]
pub struct PackIndex {
    version: u32,
    /// Object ids in ascending order.
    ids: Vec<ObjectId>,
    /// Pack offsets, parallel to `ids`.
    offsets: Vec<u64>,
    /// All offsets in ascending order, for computing entry lengths.
    sorted_offsets: Vec<u64>,
    pack_checksum: [u8; 20],
}

impl PackIndex {
    /// Parses an index file, verifying its trailing checksum.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < FANOUT_LEN + 2 * CHECKSUM_LEN {
            return Err(PackError::InvalidIndex("index too small".to_string()));
        }

        let body_len = data.len() - CHECKSUM_LEN;
        let mut hasher = Sha1::new();
        hasher.update(&data[..body_len]);
        if hasher.finalize().as_slice() != &data[body_len..] {
            return Err(PackError::InvalidIndex("checksum mismatch".to_string()));
        }

        let mut pack_checksum = [0u8; 20];
        pack_checksum.copy_from_slice(&data[body_len - CHECKSUM_LEN..body_len]);

        let (version, ids, offsets) = if &data[..4] == IDX_SIGNATURE {
            let version = read_u32(data, 4);
            if version != 2 {
                return Err(PackError::InvalidIndex(format!(
                    "unsupported version: {}",
                    version
                )));
            }
            let (ids, offsets) = parse_v2(data, body_len - CHECKSUM_LEN)?;
            (2, ids, offsets)
        } else {
            let (ids, offsets) = parse_v1(data, body_len - CHECKSUM_LEN)?;
            (1, ids, offsets)
        };

        if ids.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PackError::InvalidIndex("ids are not sorted".to_string()));
        }

        let mut sorted_offsets = offsets.clone();
        sorted_offsets.sort_unstable();

        Ok(Self {
            version,
            ids,
            offsets,
            sorted_offsets,
            pack_checksum,
        })
    }

    /// Returns the index format version (1 or 2).
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns the number of objects in the pack.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if the pack holds no objects.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns the object ids in ascending order.
    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }

    /// Returns the checksum of the pack this index describes.
    pub fn pack_checksum(&self) -> &[u8; 20] {
        &self.pack_checksum
    }

    /// Returns the pack offset of an object, if the pack holds it.
    pub fn lookup(&self, id: &ObjectId) -> Option<u64> {
        self.ids
            .binary_search(id)
            .ok()
            .map(|position| self.offsets[position])
    }

    /// Returns the length in bytes of the entry starting at `offset`.
    ///
    /// An entry runs up to the next entry or, for the last one, up to the
    /// pack's trailing checksum. `None` if no entry starts at `offset`.
    pub fn entry_len(&self, offset: u64, pack_size: u64) -> Option<u64> {
        let position = self.sorted_offsets.binary_search(&offset).ok()?;
        let end = match self.sorted_offsets.get(position + 1) {
            Some(next) => *next,
            None => pack_size.checked_sub(CHECKSUM_LEN as u64)?,
        };
        end.checked_sub(offset).filter(|len| *len > 0)
    }
}

fn read_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

fn read_u64(data: &[u8], pos: usize) -> u64 {
    (u64::from(read_u32(data, pos)) << 32) | u64::from(read_u32(data, pos + 4))
}

/// Reads the fanout table at `start` and returns the object count.
fn fanout_count(data: &[u8], start: usize) -> Result<usize> {
    let mut previous = 0;
    for bucket in 0..256 {
        let count = read_u32(data, start + bucket * 4);
        if count < previous {
            return Err(PackError::InvalidIndex(
                "fanout table is not monotonic".to_string(),
            ));
        }
        previous = count;
    }
    Ok(previous as usize)
}

fn parse_v1(data: &[u8], end: usize) -> Result<(Vec<ObjectId>, Vec<u64>)> {
    let count = fanout_count(data, 0)?;
    let table = FANOUT_LEN;
    if table + count * 24 != end {
        return Err(PackError::InvalidIndex(format!(
            "v1 index size does not match {} objects",
            count
        )));
    }

    let mut ids = Vec::with_capacity(count);
    let mut offsets = Vec::with_capacity(count);
    for i in 0..count {
        let pos = table + i * 24;
        offsets.push(u64::from(read_u32(data, pos)));
        ids.push(ObjectId::from_slice(&data[pos + 4..pos + 24])?);
    }
    Ok((ids, offsets))
}

fn parse_v2(data: &[u8], end: usize) -> Result<(Vec<ObjectId>, Vec<u64>)> {
    let count = fanout_count(data, 8)?;
    let ids_start = 8 + FANOUT_LEN;
    let crc_start = ids_start + count * 20;
    let offsets_start = crc_start + count * 4;
    let large_start = offsets_start + count * 4;
    if large_start > end || (end - large_start) % 8 != 0 {
        return Err(PackError::InvalidIndex(format!(
            "v2 index size does not match {} objects",
            count
        )));
    }
    let large_count = (end - large_start) / 8;

    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let pos = ids_start + i * 20;
        ids.push(ObjectId::from_slice(&data[pos..pos + 20])?);
    }

    let mut offsets = Vec::with_capacity(count);
    for i in 0..count {
        let raw = read_u32(data, offsets_start + i * 4);
        if raw & LARGE_OFFSET_FLAG == 0 {
            offsets.push(u64::from(raw));
        } else {
            let slot = (raw & !LARGE_OFFSET_FLAG) as usize;
            if slot >= large_count {
                return Err(PackError::InvalidIndex(format!(
                    "large offset slot {} out of range",
                    slot
                )));
            }
            offsets.push(read_u64(data, large_start + slot * 8));
        }
    }
    Ok((ids, offsets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PackBuilder;
    use gitipfs_storage::GitObject;

    fn sample_objects() -> Vec<GitObject> {
        (0..10)
            .map(|i| GitObject::blob(format!("object {}", i).into_bytes()))
            .collect()
    }

    fn build(version: u32) -> (Vec<GitObject>, Vec<u8>, PackIndex) {
        let objects = sample_objects();
        let mut builder = PackBuilder::new().index_version(version);
        for object in &objects {
            builder.add(object.clone());
        }
        let built = builder.build().unwrap();
        let index = PackIndex::parse(&built.index).unwrap();
        (objects, built.pack, index)
    }

    #[test]
    fn test_parse_v2() {
        let (objects, pack, index) = build(2);
        assert_eq!(index.version(), 2);
        assert_eq!(index.len(), objects.len());
        for object in &objects {
            let offset = index.lookup(&object.id).unwrap();
            assert!(offset >= 12);
            assert!(index.entry_len(offset, pack.len() as u64).is_some());
        }
    }

    #[test]
    fn test_parse_v1() {
        let (objects, _, index) = build(1);
        assert_eq!(index.version(), 1);
        for object in &objects {
            assert!(index.lookup(&object.id).is_some());
        }
    }

    #[test]
    fn test_pack_checksum_matches_pack_trailer() {
        let (_, pack, index) = build(2);
        assert_eq!(&pack[pack.len() - 20..], index.pack_checksum());
    }

    #[test]
    fn test_ids_sorted() {
        let (_, _, index) = build(2);
        assert!(index.ids().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_lookup_missing() {
        let (_, _, index) = build(2);
        assert_eq!(index.lookup(&ObjectId::from_bytes([0xee; 20])), None);
    }

    #[test]
    fn test_entry_lengths_cover_pack() {
        let (_, pack, index) = build(2);
        let pack_size = pack.len() as u64;
        let total: u64 = index
            .ids()
            .iter()
            .map(|id| {
                let offset = index.lookup(id).unwrap();
                index.entry_len(offset, pack_size).unwrap()
            })
            .sum();
        // header + entries + trailer
        assert_eq!(12 + total + 20, pack_size);
    }

    #[test]
    fn test_entry_len_unknown_offset() {
        let (_, pack, index) = build(2);
        assert_eq!(index.entry_len(13, pack.len() as u64), None);
    }

    #[test]
    fn test_empty_index() {
        let built = PackBuilder::new().build().unwrap();
        let index = PackIndex::parse(&built.index).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_corrupt_checksum() {
        let built = PackBuilder::new().build().unwrap();
        let mut data = built.index;
        let last = data.len() - 1;
        data[last] ^= 0xff;
        assert!(matches!(
            PackIndex::parse(&data),
            Err(PackError::InvalidIndex(_))
        ));
    }

    #[test]
    fn test_too_small() {
        assert!(PackIndex::parse(&[0u8; 100]).is_err());
    }
}
