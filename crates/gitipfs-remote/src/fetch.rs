//! Object retrieval from the remote.
//!
//! An object is looked up by an ordered list of strategies: first as a
//! loose object under `objects/xx/yyyy`, then inside the packs under
//! `objects/pack`. A fetch batch pulls each requested object and everything
//! it reaches that the local repository does not have yet.

use crate::local::LocalRepository;
use crate::location::RemoteLocation;
use crate::store::{ContentStore, Link};
use crate::{Error, Result};
use gitipfs_pack::{PackData, PackError, PackIndex};
use gitipfs_storage::{decode_loose, GitObject, ObjectId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Directory holding packs inside a repository.
pub const PACK_DIR: &str = "objects/pack";

/// How many times delta bases may hop to another pack or loose object.
const MAX_BASE_DEPTH: usize = 64;

/// What a retrieval needs to reach the remote and the local repository.
pub struct FetchContext<'a> {
    /// The content store.
    pub store: &'a dyn ContentStore,
    /// The remote repository.
    pub location: &'a RemoteLocation,
    /// The local repository.
    pub local: &'a LocalRepository,
}

/// One way of locating an object on the remote.
pub trait Retrieval {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Retrieves `id`. `Ok(None)` means this strategy cannot locate it;
    /// errors are hard failures that end the lookup.
    fn retrieve(
        &self,
        fetcher: &ObjectFetcher,
        ctx: &FetchContext<'_>,
        id: &ObjectId,
        depth: usize,
    ) -> Result<Option<GitObject>>;
}

/// Reads `objects/xx/yyyy` and inflates it.
#[derive(Debug, Default)]
pub struct LooseStrategy;

impl Retrieval for LooseStrategy {
    fn name(&self) -> &'static str {
        "loose"
    }

    fn retrieve(
        &self,
        _fetcher: &ObjectFetcher,
        ctx: &FetchContext<'_>,
        id: &ObjectId,
        _depth: usize,
    ) -> Result<Option<GitObject>> {
        let path = ctx.location.join(&format!("objects/{}", id.loose_path()));
        match ctx.store.cat(&path) {
            Ok(bytes) => {
                let object = decode_loose(&bytes)?;
                object.verify(id)?;
                Ok(Some(object))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// A remote pack read one entry at a time.
struct RemotePack<'a> {
    store: &'a dyn ContentStore,
    path: String,
    size: u64,
}

impl PackData for RemotePack<'_> {
    type Error = Error;

    fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let bytes = self.store.cat_range(&self.path, offset, len)?;
        if bytes.len() as u64 != len {
            return Err(PackError::InvalidPack(format!(
                "{}: short read at {offset}, wanted {len} bytes, got {}",
                self.path,
                bytes.len()
            ))
            .into());
        }
        Ok(bytes)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Searches the remote's packs through their indexes.
///
/// Parsed indexes are kept by content hash; a hash always names the same
/// bytes, so entries never go stale.
#[derive(Default)]
pub struct PackedStrategy {
    indexes: Mutex<HashMap<String, Arc<PackIndex>>>,
}

impl PackedStrategy {
    fn index(&self, store: &dyn ContentStore, link: &Link) -> Result<Arc<PackIndex>> {
        if let Some(index) = self.indexes.lock().get(&link.hash) {
            return Ok(Arc::clone(index));
        }
        let bytes = store.cat(&format!("/ipfs/{}", link.hash))?;
        let index = Arc::new(PackIndex::parse(&bytes)?);
        tracing::debug!(pack = %link.name, objects = index.len(), "loaded remote pack index");
        self.indexes
            .lock()
            .insert(link.hash.clone(), Arc::clone(&index));
        Ok(index)
    }
}

impl Retrieval for PackedStrategy {
    fn name(&self) -> &'static str {
        "packed"
    }

    fn retrieve(
        &self,
        fetcher: &ObjectFetcher,
        ctx: &FetchContext<'_>,
        id: &ObjectId,
        depth: usize,
    ) -> Result<Option<GitObject>> {
        let links = match ctx.store.ls(&ctx.location.join(PACK_DIR)) {
            Ok(links) => links,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let by_name: HashMap<&str, &Link> = links.iter().map(|l| (l.name.as_str(), l)).collect();

        for idx_link in links.iter().filter(|l| l.name.ends_with(".idx")) {
            let stem = idx_link.name.trim_end_matches(".idx");
            let Some(pack_link) = by_name.get(format!("{stem}.pack").as_str()) else {
                tracing::warn!(index = %idx_link.name, "remote pack index without pack");
                continue;
            };
            let index = self.index(ctx.store, idx_link)?;
            if index.lookup(id).is_none() {
                continue;
            }

            let pack = RemotePack {
                store: ctx.store,
                path: format!("/ipfs/{}", pack_link.hash),
                size: pack_link.size,
            };
            let object = gitipfs_pack::read_object(&index, &pack, id, |base| {
                fetcher.resolve_base(ctx, base, depth + 1)
            })?;
            return Ok(Some(object));
        }
        Ok(None)
    }
}

/// Resolves object hashes through an ordered list of retrieval strategies.
pub struct ObjectFetcher {
    strategies: Vec<Box<dyn Retrieval>>,
}

impl Default for ObjectFetcher {
    fn default() -> Self {
        Self::new(vec![
            Box::new(LooseStrategy),
            Box::new(PackedStrategy::default()),
        ])
    }
}

impl ObjectFetcher {
    /// Creates a fetcher trying `strategies` in order.
    pub fn new(strategies: Vec<Box<dyn Retrieval>>) -> Self {
        Self { strategies }
    }

    /// Retrieves one object from the remote, trying each strategy in turn.
    pub fn locate(&self, ctx: &FetchContext<'_>, id: &ObjectId) -> Result<GitObject> {
        self.locate_at(ctx, id, 0)
    }

    fn locate_at(&self, ctx: &FetchContext<'_>, id: &ObjectId, depth: usize) -> Result<GitObject> {
        if depth > MAX_BASE_DEPTH {
            return Err(PackError::ChainTooLong(MAX_BASE_DEPTH).into());
        }
        for strategy in &self.strategies {
            if let Some(object) = strategy.retrieve(self, ctx, id, depth)? {
                tracing::debug!(id = %id, strategy = strategy.name(), "retrieved object");
                return Ok(object);
            }
            tracing::trace!(id = %id, strategy = strategy.name(), "strategy missed");
        }
        Err(Error::ObjectNotFound(id.to_hex()))
    }

    /// Finds a delta base: locally if present, else on the remote.
    fn resolve_base(
        &self,
        ctx: &FetchContext<'_>,
        base: &ObjectId,
        depth: usize,
    ) -> Result<GitObject> {
        if ctx.local.has_object(base)? {
            return ctx.local.read_object(base);
        }
        self.locate_at(ctx, base, depth)
    }

    /// Fetches a batch of `(hash, name)` requests and everything they reach
    /// that is missing locally. Returns the number of objects written.
    ///
    /// Each object is written atomically as soon as it is retrieved; any
    /// failure fails the whole batch.
    pub fn fetch_batch(
        &self,
        ctx: &FetchContext<'_>,
        requests: &[(ObjectId, String)],
    ) -> Result<usize> {
        let mut queue = VecDeque::new();
        let mut seen = HashSet::new();
        for (id, name) in requests {
            if id.is_null() {
                tracing::debug!(name = %name, "skipping request for the null id");
                continue;
            }
            if seen.insert(*id) {
                queue.push_back(*id);
            }
        }

        let mut written = 0;
        while let Some(id) = queue.pop_front() {
            if ctx.local.has_object(&id)? {
                continue;
            }
            let object = self.locate(ctx, &id)?;
            ctx.local.write_object(&object)?;
            written += 1;
            for link in object.links()? {
                if seen.insert(link) {
                    queue.push_back(link);
                }
            }
        }

        tracing::info!(requested = requests.len(), written, "fetch batch complete");
        Ok(written)
    }
}
