//! Shared fixtures for the helper's integration tests.

#![allow(dead_code)]

use gitipfs_remote::store::StoreResult;
use gitipfs_remote::{
    ContentStore, Engine, LocalRepository, MemoryStore, RemoteLocation, Session, TransportError,
};
use gitipfs_storage::{encode_loose, GitObject, ObjectId};
use std::fs;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const AUTHOR: &str = "Test <test@example.com> 1700000000 +0000";

/// Creates an empty git directory.
pub fn git_dir() -> (TempDir, LocalRepository) {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("objects")).unwrap();
    fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
    fs::write(dir.path().join("HEAD"), "ref: refs/heads/main\n").unwrap();
    let repo = LocalRepository::open(dir.path()).unwrap();
    (dir, repo)
}

/// Writes a commit with one file and returns its objects, commit last.
pub fn commit(
    repo: &LocalRepository,
    content: &str,
    parents: &[ObjectId],
) -> Vec<GitObject> {
    let blob = GitObject::blob(content.as_bytes().to_vec());
    let tree = GitObject::tree(&[("100644", "README", blob.id)]);
    let commit = GitObject::commit(&tree.id, parents, AUTHOR, AUTHOR, "update\n");
    let objects = vec![blob, tree, commit];
    for object in &objects {
        repo.write_object(object).unwrap();
    }
    objects
}

/// Points `refs/heads/<branch>` at `id`.
pub fn set_branch(dir: &TempDir, branch: &str, id: &ObjectId) {
    fs::write(dir.path().join("refs/heads").join(branch), format!("{id}\n")).unwrap();
}

/// Counts loose object files in a git directory.
pub fn loose_count(dir: &TempDir) -> usize {
    let objects = dir.path().join("objects");
    fs::read_dir(&objects)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().len() == 2)
        .map(|e| fs::read_dir(e.path()).unwrap().count())
        .sum()
}

/// Location of an empty repository at `<root>/repo`.
pub fn empty_remote(store: &MemoryStore) -> RemoteLocation {
    let root = store.empty_directory();
    RemoteLocation::parse(&format!("ipfs://ipfs/{root}/repo")).unwrap()
}

/// Publishes a file inside the repository at `location`, returning the moved location.
pub fn publish(
    store: &dyn ContentStore,
    location: &RemoteLocation,
    relative: &str,
    content: &[u8],
) -> RemoteLocation {
    let hash = store.add(content).unwrap();
    let root = store
        .patch_link(location.root(), &location.link_name(relative), &hash)
        .unwrap();
    location.with_root(root)
}

/// Publishes `object` as a loose object.
pub fn publish_loose(
    store: &dyn ContentStore,
    location: &RemoteLocation,
    object: &GitObject,
) -> RemoteLocation {
    let path = format!("objects/{}", object.id.loose_path());
    publish(store, location, &path, &encode_loose(object).unwrap())
}

/// Runs a session over `input` and returns the engine result and everything written.
pub fn drive<S: ContentStore>(
    session: &mut Session<S>,
    input: &str,
) -> (gitipfs_remote::Result<()>, String) {
    let mut output = Vec::new();
    let result = Engine::new(session, Cursor::new(input.as_bytes()), &mut output).run();
    (result, String::from_utf8(output).unwrap())
}

/// A store whose writes start failing after a number of successful `add` calls.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    adds_left: AtomicUsize,
    adds: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>, successful_adds: usize) -> Self {
        Self {
            inner,
            adds_left: AtomicUsize::new(successful_adds),
            adds: AtomicUsize::new(0),
        }
    }

    /// Number of `add` calls seen, including failed ones.
    pub fn adds(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }
}

impl ContentStore for FlakyStore {
    fn cat(&self, path: &str) -> StoreResult<Vec<u8>> {
        self.inner.cat(path)
    }

    fn cat_range(&self, path: &str, offset: u64, len: u64) -> StoreResult<Vec<u8>> {
        self.inner.cat_range(path, offset, len)
    }

    fn ls(&self, path: &str) -> StoreResult<Vec<gitipfs_remote::Link>> {
        self.inner.ls(path)
    }

    fn add(&self, data: &[u8]) -> StoreResult<String> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        let left = self.adds_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(TransportError::Status {
                status: 500,
                message: "connection reset by peer".to_string(),
            });
        }
        self.adds_left.store(left - 1, Ordering::SeqCst);
        self.inner.add(data)
    }

    fn patch_link(&self, root: &str, name: &str, target: &str) -> StoreResult<String> {
        self.inner.patch_link(root, name, target)
    }
}
