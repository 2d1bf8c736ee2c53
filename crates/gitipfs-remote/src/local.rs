//! The local repository the helper fetches into and pushes from.

use crate::error::SetupError;
use crate::{Error, Result};
use gitipfs_pack::{PackData, PackIndex};
use gitipfs_storage::{
    decode_loose, encode_loose, parse_packed_refs, GitObject, ObjectId, Reference, StorageError,
};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How many symbolic refs are followed before giving up.
const MAX_SYMREF_DEPTH: usize = 5;

/// A pack in `objects/pack`, read by range from disk.
struct LocalPack {
    index: PackIndex,
    file: Mutex<File>,
    size: u64,
}

impl PackData for LocalPack {
    type Error = Error;

    fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// A git directory on disk (`GIT_DIR`).
pub struct LocalRepository {
    git_dir: PathBuf,
    packs: Mutex<Option<Arc<Vec<LocalPack>>>>,
}

impl LocalRepository {
    /// Opens the git directory at `git_dir`.
    pub fn open(git_dir: impl Into<PathBuf>) -> Result<Self> {
        let git_dir = git_dir.into();
        if !git_dir.join("objects").is_dir() {
            return Err(SetupError::NotARepository(git_dir.display().to_string()).into());
        }
        Ok(Self {
            git_dir,
            packs: Mutex::new(None),
        })
    }

    /// Returns the git directory.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn objects_dir(&self) -> PathBuf {
        self.git_dir.join("objects")
    }

    fn loose_path(&self, id: &ObjectId) -> PathBuf {
        self.objects_dir().join(id.loose_path())
    }

    /// Resolves a 40-hex id, a full ref name, or a short name to an object id.
    ///
    /// Short names are tried as `<name>`, `refs/<name>`, `refs/tags/<name>`
    /// and `refs/heads/<name>`, in that order.
    pub fn resolve_ref(&self, name: &str) -> Result<ObjectId> {
        if ObjectId::is_hex(name) {
            return Ok(ObjectId::from_hex(name)?);
        }

        let candidates = if name == "HEAD" || name.starts_with("refs/") {
            vec![name.to_string()]
        } else {
            vec![
                name.to_string(),
                format!("refs/{name}"),
                format!("refs/tags/{name}"),
                format!("refs/heads/{name}"),
            ]
        };

        for candidate in &candidates {
            if let Some(id) = self.follow_ref(candidate)? {
                return Ok(id);
            }
        }
        Err(StorageError::RefNotFound(name.to_string()).into())
    }

    /// Follows a full ref name through symbolic refs.
    fn follow_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        let mut current = name.to_string();
        for _ in 0..MAX_SYMREF_DEPTH {
            match self.read_ref(&current)? {
                None => return Ok(None),
                Some(Reference::Direct(id)) => return Ok(Some(id)),
                Some(Reference::Symbolic(target)) => current = target,
            }
        }
        Err(StorageError::InvalidRef(format!("symbolic ref loop at {name}")).into())
    }

    /// Reads a single ref from its loose file or from `packed-refs`.
    fn read_ref(&self, name: &str) -> Result<Option<Reference>> {
        if name.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
            return Err(StorageError::InvalidRef(name.to_string()).into());
        }
        let path = self.git_dir.join(name);
        if path.is_file() {
            let content = fs::read_to_string(&path)?;
            return Ok(Some(Reference::parse(&content)?));
        }

        match fs::read_to_string(self.git_dir.join("packed-refs")) {
            Ok(text) => Ok(parse_packed_refs(&text)?
                .into_iter()
                .find(|(packed, _)| packed == name)
                .map(|(_, id)| Reference::Direct(id))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Loads the indexes of all local packs, once.
    fn packs(&self) -> Result<Arc<Vec<LocalPack>>> {
        let mut guard = self.packs.lock();
        if let Some(packs) = guard.as_ref() {
            return Ok(Arc::clone(packs));
        }

        let mut packs = Vec::new();
        let pack_dir = self.objects_dir().join("pack");
        let entries = match fs::read_dir(&pack_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let empty = Arc::new(packs);
                *guard = Some(Arc::clone(&empty));
                return Ok(empty);
            }
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let idx_path = entry?.path();
            if idx_path.extension().and_then(|e| e.to_str()) != Some("idx") {
                continue;
            }
            let pack_path = idx_path.with_extension("pack");
            if !pack_path.is_file() {
                tracing::warn!(index = %idx_path.display(), "pack index without pack");
                continue;
            }
            let index = PackIndex::parse(&fs::read(&idx_path)?)?;
            let file = File::open(&pack_path)?;
            let size = file.metadata()?.len();
            tracing::debug!(pack = %pack_path.display(), objects = index.len(), "loaded local pack");
            packs.push(LocalPack {
                index,
                file: Mutex::new(file),
                size,
            });
        }

        let packs = Arc::new(packs);
        *guard = Some(Arc::clone(&packs));
        Ok(packs)
    }

    /// Returns true if the object is stored loose or in a local pack.
    pub fn has_object(&self, id: &ObjectId) -> Result<bool> {
        if self.loose_path(id).is_file() {
            return Ok(true);
        }
        Ok(self
            .packs()?
            .iter()
            .any(|pack| pack.index.lookup(id).is_some()))
    }

    /// Reads an object, loose first and then from local packs.
    pub fn read_object(&self, id: &ObjectId) -> Result<GitObject> {
        match fs::read(self.loose_path(id)) {
            Ok(compressed) => {
                let object = decode_loose(&compressed)?;
                object.verify(id)?;
                return Ok(object);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let packs = self.packs()?;
        for pack in packs.iter() {
            if pack.index.lookup(id).is_some() {
                return gitipfs_pack::read_object(&pack.index, pack, id, |base| {
                    self.read_object(base)
                });
            }
        }
        Err(Error::ObjectNotFound(id.to_hex()))
    }

    /// Writes an object as a loose object. Existing objects are left alone.
    ///
    /// The file is written under a temporary name and renamed into place, so
    /// a reader never sees a partial object.
    pub fn write_object(&self, object: &GitObject) -> Result<()> {
        let path = self.loose_path(&object.id);
        if path.is_file() {
            return Ok(());
        }
        let objects_dir = self.objects_dir();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let encoded = encode_loose(object)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&objects_dir)?;
        tmp.write_all(&encoded)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        tracing::trace!(id = %object.id, "wrote loose object");
        Ok(())
    }

    /// Returns every object reachable from `from` that is not reachable from
    /// any of the `exclude` tips, like `git rev-list --objects from --not exclude`.
    ///
    /// Tips that are not present locally are ignored.
    pub fn reachable(&self, from: &ObjectId, exclude: &[ObjectId]) -> Result<Vec<ObjectId>> {
        let mut excluded = HashSet::new();
        let mut tips = Vec::new();
        for tip in exclude {
            if self.has_object(tip)? {
                tips.push(*tip);
            } else {
                tracing::debug!(tip = %tip, "exclude tip not present locally");
            }
        }
        self.walk(&tips, &mut excluded)?;
        self.walk(&[*from], &mut excluded)
    }

    /// Breadth-first walk from `roots`, skipping (and recording) ids in
    /// `seen`. Returns the newly visited ids in visit order.
    fn walk(&self, roots: &[ObjectId], seen: &mut HashSet<ObjectId>) -> Result<Vec<ObjectId>> {
        let mut queue: VecDeque<ObjectId> = roots.iter().copied().collect();
        let mut visited = Vec::new();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            let object = self.read_object(&id)?;
            visited.push(id);
            queue.extend(object.links()?);
        }
        Ok(visited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitipfs_pack::PackBuilder;
    use tempfile::TempDir;

    const AUTHOR: &str = "Test <test@example.com> 1700000000 +0000";

    fn init() -> (TempDir, LocalRepository) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("objects")).unwrap();
        fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
        let repo = LocalRepository::open(dir.path()).unwrap();
        (dir, repo)
    }

    fn commit(repo: &LocalRepository, content: &[u8], parents: &[ObjectId]) -> ObjectId {
        let blob = GitObject::blob(content.to_vec());
        let tree = GitObject::tree(&[("100644", "file.txt", blob.id)]);
        let commit = GitObject::commit(&tree.id, parents, AUTHOR, AUTHOR, "message\n");
        for object in [&blob, &tree, &commit] {
            repo.write_object(object).unwrap();
        }
        commit.id
    }

    #[test]
    fn test_open_rejects_non_repository() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            LocalRepository::open(dir.path()),
            Err(Error::Setup(SetupError::NotARepository(_)))
        ));
    }

    #[test]
    fn test_write_and_read_loose() {
        let (_dir, repo) = init();
        let blob = GitObject::blob(b"hello\n".to_vec());
        assert!(!repo.has_object(&blob.id).unwrap());

        repo.write_object(&blob).unwrap();
        assert!(repo.has_object(&blob.id).unwrap());
        assert!(repo
            .git_dir()
            .join("objects/ce/013625030ba8dba906f756967f9e9ca394464a")
            .is_file());

        let read = repo.read_object(&blob.id).unwrap();
        assert_eq!(read.data, blob.data);

        // Writing again is a no-op.
        repo.write_object(&blob).unwrap();
    }

    #[test]
    fn test_read_missing_object() {
        let (_dir, repo) = init();
        let id = ObjectId::from_bytes([3u8; 20]);
        assert!(matches!(
            repo.read_object(&id),
            Err(Error::ObjectNotFound(_))
        ));
    }

    #[test]
    fn test_read_from_local_pack() {
        let (dir, repo) = init();
        let base = GitObject::blob(vec![b'x'; 400]);
        let mut changed = base.data.to_vec();
        changed.extend_from_slice(b" and more");
        let target = GitObject::blob(changed);

        let mut builder = PackBuilder::new();
        builder.add(base.clone());
        builder.add_ofs_delta(&base.id, target.clone());
        let built = builder.build().unwrap();
        let pack_dir = dir.path().join("objects/pack");
        fs::create_dir_all(&pack_dir).unwrap();
        fs::write(pack_dir.join("pack-test.pack"), &built.pack).unwrap();
        fs::write(pack_dir.join("pack-test.idx"), &built.index).unwrap();

        assert!(repo.has_object(&target.id).unwrap());
        assert_eq!(repo.read_object(&target.id).unwrap().data, target.data);
    }

    #[test]
    fn test_resolve_refs() {
        let (dir, repo) = init();
        let id = commit(&repo, b"one", &[]);
        let other = commit(&repo, b"two", &[id]);
        fs::write(dir.path().join("refs/heads/main"), format!("{id}\n")).unwrap();
        fs::write(dir.path().join("HEAD"), "ref: refs/heads/main\n").unwrap();
        fs::write(
            dir.path().join("packed-refs"),
            format!("# pack-refs with: peeled\n{other} refs/tags/v1\n"),
        )
        .unwrap();

        assert_eq!(repo.resolve_ref("refs/heads/main").unwrap(), id);
        assert_eq!(repo.resolve_ref("main").unwrap(), id);
        assert_eq!(repo.resolve_ref("HEAD").unwrap(), id);
        assert_eq!(repo.resolve_ref("v1").unwrap(), other);
        assert_eq!(repo.resolve_ref(&other.to_hex()).unwrap(), other);
        assert!(matches!(
            repo.resolve_ref("missing"),
            Err(Error::Storage(StorageError::RefNotFound(_)))
        ));
        assert!(repo.resolve_ref("refs/../HEAD").is_err());
    }

    #[test]
    fn test_symref_loop() {
        let (dir, repo) = init();
        fs::write(dir.path().join("refs/heads/a"), "ref: refs/heads/b\n").unwrap();
        fs::write(dir.path().join("refs/heads/b"), "ref: refs/heads/a\n").unwrap();
        assert!(repo.resolve_ref("refs/heads/a").is_err());
    }

    #[test]
    fn test_reachable_full_history() {
        let (_dir, repo) = init();
        let first = commit(&repo, b"one", &[]);
        let second = commit(&repo, b"two", &[first]);

        let objects = repo.reachable(&second, &[]).unwrap();
        // two commits, two trees, two blobs
        assert_eq!(objects.len(), 6);
        assert_eq!(objects[0], second);
        assert!(objects.contains(&first));
    }

    #[test]
    fn test_reachable_excludes_remote_tips() {
        let (_dir, repo) = init();
        let first = commit(&repo, b"one", &[]);
        let second = commit(&repo, b"two", &[first]);

        let objects = repo.reachable(&second, &[first]).unwrap();
        assert_eq!(objects.len(), 3);
        assert!(!objects.contains(&first));

        // An unknown tip (never fetched) is ignored.
        let unknown = ObjectId::from_bytes([5u8; 20]);
        assert_eq!(repo.reachable(&second, &[unknown]).unwrap().len(), 6);

        // Nothing to send when the remote already has everything.
        assert!(repo.reachable(&second, &[second]).unwrap().is_empty());
    }

    #[test]
    fn test_reachable_shared_blob_sent_once() {
        let (_dir, repo) = init();
        let first = commit(&repo, b"same", &[]);
        let second = commit(&repo, b"same", &[first]);
        // Same tree, same blob, so only the new commit is missing.
        let objects = repo.reachable(&second, &[first]).unwrap();
        assert_eq!(objects, vec![second]);
    }
}
