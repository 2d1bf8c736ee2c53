//! Reading objects out of a pack through its index.

use crate::{apply_delta, parse_entry, PackEntry, PackError, PackIndex};
use gitipfs_storage::{GitObject, ObjectId, ObjectType};

/// Longest delta chain the resolver follows before giving up.
pub const MAX_DELTA_CHAIN: usize = 4096;

/// Random access to the bytes of a pack file.
///
/// Implemented for in-memory packs here; callers implement it for packs
/// that live elsewhere and are fetched by range.
pub trait PackData {
    /// Error returned by reads and base lookups.
    type Error: From<PackError>;

    /// Reads `len` bytes starting at `offset`.
    fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>, Self::Error>;

    /// Returns the total size of the pack in bytes.
    fn size(&self) -> u64;
}

impl PackData for [u8] {
    type Error = PackError;

    fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>, PackError> {
        let start = usize::try_from(offset)
            .map_err(|_| PackError::InvalidPack(format!("offset {} out of range", offset)))?;
        let end = start
            .checked_add(len as usize)
            .filter(|end| *end <= self.len())
            .ok_or_else(|| {
                PackError::InvalidPack(format!("range {}+{} past end of pack", offset, len))
            })?;
        Ok(self[start..end].to_vec())
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

impl PackData for Vec<u8> {
    type Error = PackError;

    fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>, PackError> {
        self.as_slice().read_range(offset, len)
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

/// Reads and reconstructs object `id` from a pack.
///
/// Offset deltas are followed within the pack. Ref deltas are resolved in the
/// pack when the base is listed in `index`, otherwise through `lookup_base`.
/// The result is re-hashed and must match `id`.
pub fn read_object<D, F>(
    index: &PackIndex,
    data: &D,
    id: &ObjectId,
    mut lookup_base: F,
) -> Result<GitObject, D::Error>
where
    D: PackData + ?Sized,
    F: FnMut(&ObjectId) -> Result<GitObject, D::Error>,
{
    let mut offset = index
        .lookup(id)
        .ok_or_else(|| PackError::ObjectNotFound(id.to_hex()))?;
    let pack_size = data.size();
    let mut deltas = Vec::new();

    let (object_type, mut content): (ObjectType, Vec<u8>) = loop {
        if deltas.len() > MAX_DELTA_CHAIN {
            return Err(PackError::ChainTooLong(MAX_DELTA_CHAIN).into());
        }
        let len = index.entry_len(offset, pack_size).ok_or_else(|| {
            PackError::InvalidPack(format!("no entry starts at offset {}", offset))
        })?;
        let raw = data.read_range(offset, len)?;
        match parse_entry(&raw)? {
            PackEntry::Base { object_type, data: inflated } => break (object_type, inflated),
            PackEntry::OfsDelta { distance, delta } => {
                deltas.push(delta);
                offset = offset.checked_sub(distance).ok_or_else(|| {
                    PackError::InvalidPack(format!(
                        "ofs-delta at {} reaches before the pack start",
                        offset
                    ))
                })?;
            }
            PackEntry::RefDelta { base, delta } => {
                deltas.push(delta);
                match index.lookup(&base) {
                    Some(base_offset) => offset = base_offset,
                    None => {
                        tracing::debug!(base = %base, "delta base outside pack");
                        let object = lookup_base(&base)?;
                        break (object.object_type, object.data.to_vec());
                    }
                }
            }
        }
    };

    for delta in deltas.iter().rev() {
        content = apply_delta(&content, delta)?;
    }

    let object = GitObject::new(object_type, content);
    object.verify(id).map_err(PackError::from)?;
    Ok(object)
}
