//! Pack and index writer.

use crate::delta::DeltaBuilder;
use crate::entry::{encode_ofs_distance, OFS_DELTA, REF_DELTA};
use crate::index::IDX_SIGNATURE;
use crate::{PackError, Result};
use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc};
use gitipfs_storage::{GitObject, ObjectId};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::io::Write;

/// Magic bytes at the start of a pack file.
const PACK_SIGNATURE: &[u8; 4] = b"PACK";
/// Pack file version we write.
const PACK_VERSION: u32 = 2;

enum Entry {
    Whole(GitObject),
    OfsDelta { base: ObjectId, target: GitObject },
    RefDelta { base: GitObject, target: GitObject },
}

/// A pack file together with its index.
#[derive(Debug, Clone)]
pub struct BuiltPack {
    /// The `.pack` bytes.
    pub pack: Vec<u8>,
    /// The `.idx` bytes.
    pub index: Vec<u8>,
}

/// Builds a pack file and its index from a set of objects.
pub struct PackBuilder {
    entries: Vec<Entry>,
    index_version: u32,
}

impl PackBuilder {
    /// Creates a new pack builder writing a version 2 index.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index_version: 2,
        }
    }

    /// Selects the index format (1 or 2).
    pub fn index_version(mut self, version: u32) -> Self {
        self.index_version = version;
        self
    }

    /// Adds a complete object to the pack.
    pub fn add(&mut self, object: GitObject) {
        self.entries.push(Entry::Whole(object));
    }

    /// Adds `target` as a delta against `base`, which must be added earlier.
    pub fn add_ofs_delta(&mut self, base: &ObjectId, target: GitObject) {
        self.entries.push(Entry::OfsDelta {
            base: *base,
            target,
        });
    }

    /// Adds `target` as a delta naming `base` by id. The base need not be
    /// in the pack, which makes it a thin pack.
    pub fn add_ref_delta(&mut self, base: GitObject, target: GitObject) {
        self.entries.push(Entry::RefDelta { base, target });
    }

    /// Builds the pack file and its index.
    pub fn build(self) -> Result<BuiltPack> {
        let mut pack = Vec::new();

        // Write header
        pack.extend_from_slice(PACK_SIGNATURE);
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());

        let mut written: HashMap<ObjectId, (u64, GitObject)> = HashMap::new();
        let mut records = Vec::with_capacity(self.entries.len());

        // Write objects
        for entry in self.entries {
            let offset = pack.len() as u64;
            let target = match entry {
                Entry::Whole(object) => {
                    write_entry(
                        &mut pack,
                        object.object_type.pack_type(),
                        &[],
                        &object.data,
                    )?;
                    object
                }
                Entry::OfsDelta { base, target } => {
                    let (base_offset, base_object) = written.get(&base).ok_or_else(|| {
                        PackError::InvalidPack(format!("delta base {} not in pack", base))
                    })?;
                    let delta = DeltaBuilder::diff(&base_object.data, &target.data);
                    let distance = encode_ofs_distance(offset - base_offset);
                    write_entry(&mut pack, OFS_DELTA, &distance, &delta)?;
                    target
                }
                Entry::RefDelta { base, target } => {
                    let delta = DeltaBuilder::diff(&base.data, &target.data);
                    write_entry(&mut pack, REF_DELTA, base.id.as_bytes(), &delta)?;
                    target
                }
            };
            let mut crc = Crc::new();
            crc.update(&pack[offset as usize..]);
            records.push((target.id, crc.sum(), offset));
            written.insert(target.id, (offset, target));
        }

        // Compute and append checksum
        let mut hasher = Sha1::new();
        hasher.update(&pack);
        let mut checksum = [0u8; 20];
        checksum.copy_from_slice(&hasher.finalize());
        pack.extend_from_slice(&checksum);

        records.sort_by(|a, b| a.0.cmp(&b.0));
        records.dedup_by(|a, b| a.0 == b.0);
        let index = match self.index_version {
            1 => write_index_v1(&records, &checksum),
            2 => write_index_v2(&records, &checksum),
            other => {
                return Err(PackError::InvalidIndex(format!(
                    "unsupported version: {}",
                    other
                )))
            }
        };

        Ok(BuiltPack { pack, index })
    }
}

impl Default for PackBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes a single entry: header, then `prefix` (delta base), then zlib data.
fn write_entry(pack: &mut Vec<u8>, type_code: u8, prefix: &[u8], data: &[u8]) -> Result<()> {
    let size = data.len();

    // Write type and size in variable-length encoding
    // First byte: (MSB=more bytes) (3 bits type) (4 bits size)
    let mut first_byte = (type_code << 4) | ((size & 0x0F) as u8);
    let mut remaining_size = size >> 4;

    if remaining_size > 0 {
        first_byte |= 0x80; // More bytes follow
    }
    pack.push(first_byte);

    // Additional size bytes (7 bits each, MSB=continue)
    while remaining_size > 0 {
        let mut byte = (remaining_size & 0x7F) as u8;
        remaining_size >>= 7;
        if remaining_size > 0 {
            byte |= 0x80;
        }
        pack.push(byte);
    }

    pack.extend_from_slice(prefix);

    // Compress and write data
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| PackError::InvalidPack(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| PackError::InvalidPack(e.to_string()))?;
    pack.extend_from_slice(&compressed);

    Ok(())
}

fn fanout(records: &[(ObjectId, u32, u64)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(256 * 4);
    let mut count = 0usize;
    for bucket in 0..=255u8 {
        while count < records.len() && records[count].0.as_bytes()[0] <= bucket {
            count += 1;
        }
        out.extend_from_slice(&(count as u32).to_be_bytes());
    }
    out
}

fn finish_index(mut index: Vec<u8>, pack_checksum: &[u8; 20]) -> Vec<u8> {
    index.extend_from_slice(pack_checksum);
    let mut hasher = Sha1::new();
    hasher.update(&index);
    let checksum = hasher.finalize();
    index.extend_from_slice(&checksum);
    index
}

fn write_index_v1(records: &[(ObjectId, u32, u64)], pack_checksum: &[u8; 20]) -> Vec<u8> {
    let mut index = fanout(records);
    for (id, _, offset) in records {
        index.extend_from_slice(&(*offset as u32).to_be_bytes());
        index.extend_from_slice(id.as_bytes());
    }
    finish_index(index, pack_checksum)
}

fn write_index_v2(records: &[(ObjectId, u32, u64)], pack_checksum: &[u8; 20]) -> Vec<u8> {
    let mut index = IDX_SIGNATURE.to_vec();
    index.extend_from_slice(&2u32.to_be_bytes());
    index.extend(fanout(records));
    for (id, _, _) in records {
        index.extend_from_slice(id.as_bytes());
    }
    for (_, crc, _) in records {
        index.extend_from_slice(&crc.to_be_bytes());
    }
    let mut large = Vec::new();
    for (_, _, offset) in records {
        if *offset < 0x8000_0000 {
            index.extend_from_slice(&(*offset as u32).to_be_bytes());
        } else {
            let slot = (large.len() / 8) as u32 | 0x8000_0000;
            index.extend_from_slice(&slot.to_be_bytes());
            large.extend_from_slice(&offset.to_be_bytes());
        }
    }
    index.extend(large);
    finish_index(index, pack_checksum)
}
