//! writing a tree and its sequences to a store
use crate::{
    archive::Archive,
    codec::{Alphabet, AlphabetKind},
    digest::NodeDigest,
    error::{Error, Result},
    layout::{
        encode_block, encode_manifest, Hierarchy, LeafData, Manifest, ALIGNMENT, BLOCKS,
        FORMAT_VERSION, LEAF_INDEX, MANIFEST, ROOT_NAME, TREE,
    },
    matrix::{AlignmentMeta, ChunkShape, MatrixWriter},
    source::SequenceSource,
    store::{BlockWriter, DirStore, ReadOnlyStore, WriterClaim},
    tree::{NodeId, StorageLink, Tree},
};
use fnv::{FnvHashMap, FnvHashSet};
use std::{
    collections::{btree_map, hash_map, BTreeMap},
    path::Path,
    time::Instant,
};
use tracing::*;

/// Configuration of a build
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// requested chunk shape, clamped to the matrix dimensions
    pub chunk_shape: ChunkShape,
    /// whether to replace the content of a store that is already populated
    pub overwrite: bool,
    pub alphabet: AlphabetKind,
    /// zstd level to use for compression of the leaf index and the hierarchy
    pub zstd_level: i32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            chunk_shape: ChunkShape::default(),
            overwrite: false,
            alphabet: AlphabetKind::Nucleotide,
            zstd_level: 10,
        }
    }
}

impl BuildOptions {
    /// options that produce many tiny chunks, to exercise chunk boundaries with few data
    pub fn debug() -> Self {
        Self {
            chunk_shape: ChunkShape::new(2, 3),
            overwrite: true,
            alphabet: AlphabetKind::Nucleotide,
            zstd_level: 1,
        }
    }

    pub fn with_chunk_shape(mut self, rows: u64, cols: u64) -> Self {
        self.chunk_shape = ChunkShape::new(rows, cols);
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_alphabet(mut self, alphabet: AlphabetKind) -> Self {
        self.alphabet = alphabet;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.chunk_shape.validate()?;
        if !(1..=22).contains(&self.zstd_level) {
            return Err(Error::InvalidOptions("zstd level must be between 1 and 22"));
        }
        Ok(())
    }
}

/// Writes `tree` and, if given, the sequences of its leaves to `store`.
///
/// If the store is already populated and `overwrite` is not set, nothing is written and the
/// existing content is opened instead. With `overwrite` the blocks of the previous build are
/// removed first. A build that fails removes the blocks it has written.
///
/// On success every node of `tree` carries a [`StorageLink`] to its container.
pub fn build<S, Src>(
    store: S,
    tree: &mut Tree,
    sequences: Option<&Src>,
    options: &BuildOptions,
) -> Result<Archive<S>>
where
    S: ReadOnlyStore + BlockWriter,
    Src: SequenceSource + ?Sized,
{
    options.validate()?;
    let _claim = WriterClaim::acquire(store.location())?;
    if is_populated(&store)? {
        if !options.overwrite {
            info!("{} is already populated, opening it", store.location());
            return Archive::open(store);
        }
        info!("clearing {}", store.location());
        store.clear()?;
    }
    let t0 = Instant::now();
    let rows = leaf_rows(tree)?;
    let (hierarchy, links) = build_hierarchy(tree, &rows)?;
    debug!(
        "hierarchy with {} containers for {} leaves",
        hierarchy.len(),
        rows.len()
    );
    let pending = PendingBuild::new(&store);
    let alignment = match sequences {
        Some(sequences) => write_alignment(&store, sequences, &rows, options)?,
        None => None,
    };
    if alignment.is_some() {
        store.sync(ALIGNMENT)?;
    }
    let leaf_data = LeafData { rows, alignment };
    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        num_leaves: leaf_data.rows.len() as u64,
        num_nodes: hierarchy.len() as u64,
        has_alignment: leaf_data.alignment.is_some(),
    };
    store.put(TREE, encode_block(&hierarchy, options.zstd_level)?)?;
    store.put(LEAF_INDEX, encode_block(&leaf_data, options.zstd_level)?)?;
    store.sync(TREE)?;
    store.sync(LEAF_INDEX)?;
    // the manifest marks the store as complete, so it goes last
    store.put(MANIFEST, encode_manifest(&manifest)?)?;
    store.sync(MANIFEST)?;
    pending.commit();
    for (id, link) in links {
        tree.set_storage_link(id, link);
    }
    info!(
        "built {} with {} leaves in {}s",
        store.location(),
        manifest.num_leaves,
        t0.elapsed().as_secs_f64()
    );
    Ok(Archive::new(store, leaf_data, hierarchy))
}

/// [`build`] into the directory `path`
pub fn build_at<Src>(
    path: impl AsRef<Path>,
    tree: &mut Tree,
    sequences: Option<&Src>,
    options: &BuildOptions,
) -> Result<Archive<DirStore>>
where
    Src: SequenceSource + ?Sized,
{
    build(DirStore::new(path.as_ref()), tree, sequences, options)
}

/// The blocks of a build that has not been committed yet.
///
/// Dropping it without [`PendingBuild::commit`] removes all blocks again, so a build that
/// fails leaves the store as empty as it found it and can simply be repeated.
struct PendingBuild<'a, W: BlockWriter> {
    store: &'a W,
    committed: bool,
}

impl<'a, W: BlockWriter> PendingBuild<'a, W> {
    fn new(store: &'a W) -> Self {
        Self {
            store,
            committed: false,
        }
    }

    /// to be called once the manifest is durable
    fn commit(mut self) {
        self.committed = true;
    }
}

impl<'a, W: BlockWriter> Drop for PendingBuild<'a, W> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let location = self.store.location();
        warn!("build of {} failed, removing its blocks", location);
        if let Err(cause) = self.store.clear() {
            error!("unable to remove the blocks of {}: {}", location, cause);
        }
    }
}

/// Whether any block of a previous build is present
fn is_populated<S: ReadOnlyStore>(store: &S) -> Result<bool> {
    for name in &BLOCKS {
        if store.size(name)?.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Assigns rows to leaves in traversal order
fn leaf_rows(tree: &Tree) -> Result<BTreeMap<String, u64>> {
    let mut rows = BTreeMap::new();
    for (row, id) in tree.leaves().enumerate() {
        let name = tree[id].name();
        if name.is_empty() {
            return Err(Error::UnnamedLeaf);
        }
        match rows.entry(name.to_owned()) {
            btree_map::Entry::Vacant(e) => {
                e.insert(row as u64);
            }
            btree_map::Entry::Occupied(_) => return Err(Error::DuplicateLeafName(name.into())),
        }
    }
    Ok(rows)
}

/// Streams all records into the matrix. Returns None if the source has no records.
fn write_alignment<W, Src>(
    store: &W,
    sequences: &Src,
    rows: &BTreeMap<String, u64>,
    options: &BuildOptions,
) -> Result<Option<AlignmentMeta>>
where
    W: BlockWriter,
    Src: SequenceSource + ?Sized,
{
    let t0 = Instant::now();
    let alphabet = options.alphabet;
    let mut records = sequences.records().map_err(Error::Source)?;
    let first = match records.next() {
        Some(first) => first.map_err(Error::Source)?,
        None => {
            warn!("sequence source is empty, building without alignment");
            return Ok(None);
        }
    };
    let cols = first.seq.len() as u64;
    if cols == 0 {
        return Err(Error::EmptySequence(first.id));
    }
    let meta = AlignmentMeta::new(rows.len() as u64, cols, options.chunk_shape, alphabet)?;
    debug!(
        "allocating {} bytes for {} in chunks of {:?}",
        meta.byte_len(),
        ALIGNMENT,
        meta.chunk
    );
    let writer = MatrixWriter::create(store, &meta)?;
    let mut written = vec![false; rows.len()];
    let mut codes = Vec::new();
    for record in std::iter::once(Ok(first)).chain(records) {
        let record = record.map_err(Error::Source)?;
        let row = *rows
            .get(&record.id)
            .ok_or_else(|| Error::UnexpectedRecord(record.id.clone()))?;
        if record.seq.is_empty() {
            return Err(Error::EmptySequence(record.id));
        }
        if written[row as usize] {
            return Err(Error::DuplicateRecord(record.id));
        }
        if record.seq.len() as u64 != cols {
            return Err(Error::SequenceLengthMismatch {
                name: record.id,
                expected: cols,
                found: record.seq.len() as u64,
            });
        }
        codes.clear();
        alphabet.encode_into(&record.seq, &mut codes)?;
        writer.write_row(row, &codes)?;
        written[row as usize] = true;
        trace!("wrote row {} for {}", row, record.id);
    }
    let missing = written.iter().filter(|x| !**x).count();
    if missing > 0 {
        warn!(
            "{} of {} leaves have no sequence and read as fully ambiguous",
            missing,
            rows.len()
        );
    }
    info!(
        "wrote {} sequences of length {} in {}s",
        rows.len() - missing,
        cols,
        t0.elapsed().as_secs_f64()
    );
    Ok(Some(meta))
}

/// Computes the container hierarchy in preorder, together with the link of every node.
///
/// Internal containers are named by the digest of their leaf set. Fails before anything is
/// written if two different leaf sets share a digest or two siblings share a name.
fn build_hierarchy(
    tree: &Tree,
    rows: &BTreeMap<String, u64>,
) -> Result<(Hierarchy, Vec<(NodeId, StorageLink)>)> {
    let order = tree.preorder().collect::<Vec<_>>();
    // leaf sets bottom up. A set is dropped as soon as the parent has consumed it.
    let mut sets: FnvHashMap<NodeId, Vec<&str>> = FnvHashMap::default();
    let mut digests: FnvHashMap<NodeId, NodeDigest> = FnvHashMap::default();
    let mut registry = IdentifierRegistry::default();
    for id in order.iter().rev() {
        let node = &tree[*id];
        if node.is_leaf() {
            sets.insert(*id, vec![node.name()]);
            continue;
        }
        let mut set = Vec::new();
        for child in node.children() {
            set.extend(sets.remove(child).unwrap_or_default());
        }
        set.sort_unstable();
        set.dedup();
        let digest = NodeDigest::of_sorted(&set);
        registry.register(digest, *id, &set, |other| tree.leaf_names_under(other))?;
        digests.insert(*id, digest);
        sets.insert(*id, set);
    }
    drop(sets);

    let mut hierarchy = Hierarchy::default();
    let mut links: FnvHashMap<NodeId, u32> = FnvHashMap::default();
    let mut siblings: FnvHashSet<(u32, String)> = FnvHashSet::default();
    for id in order {
        let node = &tree[id];
        let name = if id == tree.root() {
            ROOT_NAME.to_owned()
        } else if node.is_leaf() {
            node.name().to_owned()
        } else {
            digests
                .get(&id)
                .map(NodeDigest::to_hex)
                .ok_or(Error::InvalidTopology("internal node without digest"))?
        };
        let row = if node.is_leaf() {
            rows.get(node.name()).copied()
        } else {
            None
        };
        let parent = match node.parent() {
            Some(parent) if id != tree.root() => Some(
                *links
                    .get(&parent)
                    .ok_or(Error::InvalidTopology("node visited before its parent"))?,
            ),
            _ => None,
        };
        if let Some(parent) = parent {
            if !siblings.insert((parent, name.clone())) {
                return Err(Error::ContainerNameClash {
                    parent: hierarchy.names[parent as usize].clone(),
                    name,
                });
            }
        }
        let index = hierarchy.push(parent, name, tree.scalar_props(id), row);
        links.insert(id, index);
    }
    let links = links
        .into_iter()
        .map(|(id, index)| (id, StorageLink(index)))
        .collect();
    Ok((hierarchy, links))
}

/// Digests handed out so far. A repeated digest is only acceptable if it stands for the
/// same leaf set, which happens for chains of single child nodes.
struct IdentifierRegistry<K> {
    seen: FnvHashMap<NodeDigest, K>,
}

impl<K> Default for IdentifierRegistry<K> {
    fn default() -> Self {
        Self {
            seen: FnvHashMap::default(),
        }
    }
}

impl<K: Copy> IdentifierRegistry<K> {
    /// `set` must be sorted and deduplicated. `leaf_set_of` recomputes the set of the node
    /// that registered the digest first.
    fn register<'a>(
        &mut self,
        digest: NodeDigest,
        key: K,
        set: &[&'a str],
        leaf_set_of: impl FnOnce(K) -> Vec<&'a str>,
    ) -> Result<()> {
        match self.seen.entry(digest) {
            hash_map::Entry::Vacant(e) => {
                e.insert(key);
                Ok(())
            }
            hash_map::Entry::Occupied(e) => {
                let mut other = leaf_set_of(*e.get());
                other.sort_unstable();
                other.dedup();
                if other.as_slice() == set {
                    Ok(())
                } else {
                    Err(Error::IdentifierCollision(digest.to_hex()))
                }
            }
        }
    }
}
