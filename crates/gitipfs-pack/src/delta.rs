//! Git delta format: a source size, a target size, then copy and insert ops.

use crate::{PackError, Result};

/// Copy op with a zero size field copies this many bytes.
const DEFAULT_COPY_SIZE: usize = 0x10000;
/// Longest literal run a single insert op can carry.
const MAX_INSERT: usize = 0x7F;

/// Applies `delta` to `base`, returning the reconstructed target.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let mut pos = 0;
    let source_size = read_varint(delta, &mut pos)?;
    let target_size = read_varint(delta, &mut pos)?;
    if source_size != base.len() {
        return Err(PackError::InvalidDelta(format!(
            "base is {} bytes, delta expects {}",
            base.len(),
            source_size
        )));
    }

    let mut target = Vec::with_capacity(target_size.min(1 << 20));
    while pos < delta.len() {
        let op = delta[pos];
        pos += 1;
        if op & 0x80 != 0 {
            let mut offset = 0usize;
            for (i, flag) in [0x01u8, 0x02, 0x04, 0x08].iter().enumerate() {
                if op & flag != 0 {
                    offset |= usize::from(next_byte(delta, &mut pos)?) << (8 * i);
                }
            }
            let mut size = 0usize;
            for (i, flag) in [0x10u8, 0x20, 0x40].iter().enumerate() {
                if op & flag != 0 {
                    size |= usize::from(next_byte(delta, &mut pos)?) << (8 * i);
                }
            }
            if size == 0 {
                size = DEFAULT_COPY_SIZE;
            }
            let end = offset
                .checked_add(size)
                .filter(|end| *end <= base.len())
                .ok_or_else(|| {
                    PackError::InvalidDelta(format!(
                        "copy {}+{} outside base of {} bytes",
                        offset,
                        size,
                        base.len()
                    ))
                })?;
            target.extend_from_slice(&base[offset..end]);
        } else if op != 0 {
            let len = usize::from(op);
            let end = pos + len;
            if end > delta.len() {
                return Err(PackError::InvalidDelta("truncated insert".to_string()));
            }
            target.extend_from_slice(&delta[pos..end]);
            pos = end;
        } else {
            return Err(PackError::InvalidDelta("reserved op 0".to_string()));
        }
        if target.len() > target_size {
            return Err(PackError::InvalidDelta(
                "delta overruns target size".to_string(),
            ));
        }
    }

    if target.len() != target_size {
        return Err(PackError::InvalidDelta(format!(
            "delta produced {} bytes, expected {}",
            target.len(),
            target_size
        )));
    }
    Ok(target)
}

fn next_byte(delta: &[u8], pos: &mut usize) -> Result<u8> {
    let byte = *delta
        .get(*pos)
        .ok_or_else(|| PackError::InvalidDelta("truncated copy op".to_string()))?;
    *pos += 1;
    Ok(byte)
}

fn read_varint(delta: &[u8], pos: &mut usize) -> Result<usize> {
    let mut value = 0usize;
    let mut shift = 0;
    loop {
        let byte = *delta
            .get(*pos)
            .ok_or_else(|| PackError::InvalidDelta("truncated size header".to_string()))?;
        *pos += 1;
        if shift > 56 {
            return Err(PackError::InvalidDelta("size header overflows".to_string()));
        }
        value |= usize::from(byte & 0x7F) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
}

fn write_varint(out: &mut Vec<u8>, mut value: usize) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Builds delta instructions against a known source.
#[derive(Debug, Clone)]
pub struct DeltaBuilder {
    source_size: usize,
    target_size: usize,
    ops: Vec<u8>,
}

impl DeltaBuilder {
    /// Starts a delta against a source of `source_size` bytes.
    pub fn new(source_size: usize) -> Self {
        Self {
            source_size,
            target_size: 0,
            ops: Vec::new(),
        }
    }

    /// Copies `len` bytes of the source starting at `offset`.
    pub fn copy(&mut self, offset: usize, len: usize) -> &mut Self {
        let mut offset = offset;
        let mut remaining = len;
        while remaining > 0 {
            let chunk = remaining.min(DEFAULT_COPY_SIZE);
            self.push_copy(offset, chunk);
            offset += chunk;
            remaining -= chunk;
        }
        self.target_size += len;
        self
    }

    /// Inserts literal bytes.
    pub fn insert(&mut self, data: &[u8]) -> &mut Self {
        for chunk in data.chunks(MAX_INSERT) {
            self.ops.push(chunk.len() as u8);
            self.ops.extend_from_slice(chunk);
        }
        self.target_size += data.len();
        self
    }

    /// Encodes the delta.
    pub fn finish(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.ops.len() + 20);
        write_varint(&mut out, self.source_size);
        write_varint(&mut out, self.target_size);
        out.extend_from_slice(&self.ops);
        out
    }

    /// Computes a delta turning `source` into `target` by sharing the
    /// common prefix and suffix and inserting everything in between.
    pub fn diff(source: &[u8], target: &[u8]) -> Vec<u8> {
        let prefix = source
            .iter()
            .zip(target)
            .take_while(|(a, b)| a == b)
            .count();
        let suffix = source[prefix..]
            .iter()
            .rev()
            .zip(target[prefix..].iter().rev())
            .take_while(|(a, b)| a == b)
            .count();

        let mut builder = Self::new(source.len());
        builder.copy(0, prefix);
        builder.insert(&target[prefix..target.len() - suffix]);
        builder.copy(source.len() - suffix, suffix);
        builder.finish()
    }

    fn push_copy(&mut self, offset: usize, size: usize) {
        let op_pos = self.ops.len();
        let mut op = 0x80u8;
        self.ops.push(op);
        for i in 0..4 {
            let byte = ((offset >> (8 * i)) & 0xFF) as u8;
            if byte != 0 {
                op |= 1 << i;
                self.ops.push(byte);
            }
        }
        // A size of exactly 0x10000 is encoded by omitting every size byte.
        if size != DEFAULT_COPY_SIZE {
            for i in 0..3 {
                let byte = ((size >> (8 * i)) & 0xFF) as u8;
                if byte != 0 {
                    op |= 0x10 << i;
                    self.ops.push(byte);
                }
            }
        }
        self.ops[op_pos] = op;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_and_insert() {
        let base = b"The quick brown fox jumps over the lazy dog";
        let mut builder = DeltaBuilder::new(base.len());
        builder.copy(0, 10).insert(b"red").copy(15, base.len() - 15);
        let target = apply_delta(base, &builder.finish()).unwrap();
        assert_eq!(target, b"The quick red fox jumps over the lazy dog");
    }

    #[test]
    fn test_diff() {
        let source = b"line one\nline two\nline three\n".to_vec();
        let target = b"line one\nline 2\nline three\n".to_vec();
        let delta = DeltaBuilder::diff(&source, &target);
        assert_eq!(apply_delta(&source, &delta).unwrap(), target);
        assert!(delta.len() < target.len());
    }

    #[test]
    fn test_diff_unrelated_and_empty() {
        assert_eq!(
            apply_delta(b"abc", &DeltaBuilder::diff(b"abc", b"xyz")).unwrap(),
            b"xyz"
        );
        assert_eq!(
            apply_delta(b"abc", &DeltaBuilder::diff(b"abc", b"")).unwrap(),
            b""
        );
        assert_eq!(
            apply_delta(b"", &DeltaBuilder::diff(b"", b"new")).unwrap(),
            b"new"
        );
    }

    #[test]
    fn test_large_copy_uses_default_size() {
        let base: Vec<u8> = (0..DEFAULT_COPY_SIZE * 2 + 5).map(|i| i as u8).collect();
        let mut builder = DeltaBuilder::new(base.len());
        builder.copy(0, base.len());
        let delta = builder.finish();
        assert_eq!(apply_delta(&base, &delta).unwrap(), base);
    }

    #[test]
    fn test_long_insert_is_chunked() {
        let literal = vec![b'z'; 1000];
        let mut builder = DeltaBuilder::new(0);
        builder.insert(&literal);
        assert_eq!(apply_delta(b"", &builder.finish()).unwrap(), literal);
    }

    #[test]
    fn test_source_size_mismatch() {
        let delta = DeltaBuilder::diff(b"abcd", b"abXd");
        assert!(matches!(
            apply_delta(b"abc", &delta),
            Err(PackError::InvalidDelta(_))
        ));
    }

    #[test]
    fn test_copy_out_of_bounds() {
        // source 3, target 10, copy offset 0 size 10
        let delta = [3, 10, 0x90, 10];
        assert!(apply_delta(b"abc", &delta).is_err());
    }

    #[test]
    fn test_reserved_op() {
        let delta = [0, 0, 0];
        assert!(apply_delta(b"", &delta).is_err());
    }

    #[test]
    fn test_target_size_mismatch() {
        // source 3, target 5, copy all 3 bytes
        let delta = [3, 5, 0x90, 3];
        assert!(apply_delta(b"abc", &delta).is_err());
    }
}
