//! handle to a completely written store
use crate::{
    error::{Error, Result},
    layout::{
        decode_block, decode_manifest, Hierarchy, LeafData, ALIGNMENT, BLOCKS, LEAF_INDEX,
        MANIFEST, TREE,
    },
    matrix::AlignmentMeta,
    store::ReadOnlyStore,
    tree::{Properties, StorageLink},
};
use std::{collections::BTreeMap, fmt, ops::Deref, sync::Arc};
use tracing::*;

/// A store together with its decoded leaf index and container hierarchy.
///
/// Clones are cheap and share everything. All operations only read, so an archive can be
/// used from many threads at once.
pub struct Archive<S>(Arc<ArchiveInner<S>>);

impl<S> fmt::Debug for Archive<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl<S> Clone for Archive<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<S> Deref for Archive<S> {
    type Target = ArchiveInner<S>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub struct ArchiveInner<S> {
    store: S,
    leaf_data: LeafData,
    pub(crate) hierarchy: Hierarchy,
}

impl<S> fmt::Debug for ArchiveInner<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("leaves", &self.leaf_data.rows.len())
            .field("containers", &self.hierarchy.len())
            .field("alignment", &self.leaf_data.alignment)
            .finish()
    }
}

impl<S> ArchiveInner<S> {
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn num_leaves(&self) -> u64 {
        self.leaf_data.rows.len() as u64
    }

    /// number of containers, one per tree node
    pub fn num_nodes(&self) -> u64 {
        self.hierarchy.len() as u64
    }

    /// Geometry of the sequence matrix, if the archive was built with sequences
    pub fn alignment(&self) -> Option<&AlignmentMeta> {
        self.leaf_data.alignment.as_ref()
    }

    pub fn leaf_data(&self) -> &LeafData {
        &self.leaf_data
    }

    /// Leaf names and their rows
    pub fn leaf_index(&self) -> &BTreeMap<String, u64> {
        &self.leaf_data.rows
    }

    pub fn row_of(&self, name: &str) -> Option<u64> {
        self.leaf_data.rows.get(name).copied()
    }

    pub fn root(&self) -> StorageLink {
        StorageLink(0)
    }

    pub fn node(&self, link: StorageLink) -> Result<StorageNode<'_>> {
        if (link.0 as usize) < self.hierarchy.len() {
            Ok(StorageNode {
                hierarchy: &self.hierarchy,
                index: link.0,
            })
        } else {
            Err(Error::InvalidLink(link.0))
        }
    }

    /// All leaf containers below a container, in preorder
    pub fn leaves_under(&self, link: StorageLink) -> Result<Vec<StorageLink>> {
        self.node(link)?;
        let mut res = Vec::new();
        let mut stack = vec![link.0];
        while let Some(index) = stack.pop() {
            let children = &self.hierarchy.children[index as usize];
            if children.is_empty() {
                res.push(StorageLink(index));
            } else {
                stack.extend(children.iter().rev());
            }
        }
        Ok(res)
    }
}

impl<S: ReadOnlyStore> Archive<S> {
    pub(crate) fn new(store: S, leaf_data: LeafData, hierarchy: Hierarchy) -> Self {
        Self(Arc::new(ArchiveInner {
            store,
            leaf_data,
            hierarchy,
        }))
    }

    /// Opens a completely written store.
    ///
    /// Fails with [`Error::CorruptStore`] if the store was never completely written or its
    /// blocks do not fit together.
    pub fn open(store: S) -> Result<Self> {
        let manifest = match store.size(MANIFEST)? {
            Some(_) => decode_manifest(&store.get(MANIFEST)?)?,
            None => {
                for name in &BLOCKS {
                    if store.size(name)?.is_some() {
                        return Err(Error::corrupt(
                            "manifest missing, the build was interrupted",
                        ));
                    }
                }
                return Err(Error::corrupt("store is empty, root container missing"));
            }
        };
        if store.size(TREE)?.is_none() {
            return Err(Error::corrupt("root container missing"));
        }
        let hierarchy: Hierarchy = decode_block(&store.get(TREE)?, TREE)?;
        if store.size(LEAF_INDEX)?.is_none() {
            return Err(Error::corrupt("leaf index missing"));
        }
        let leaf_data: LeafData = decode_block(&store.get(LEAF_INDEX)?, LEAF_INDEX)?;
        if manifest.num_leaves != leaf_data.rows.len() as u64
            || manifest.num_nodes != hierarchy.len() as u64
            || manifest.has_alignment != leaf_data.alignment.is_some()
        {
            return Err(Error::corrupt("manifest disagrees with the stored blocks"));
        }
        let n = leaf_data.rows.len() as u64;
        let mut seen = vec![false; leaf_data.rows.len()];
        for row in leaf_data.rows.values() {
            match seen.get_mut(*row as usize) {
                Some(x) if !*x => *x = true,
                _ => return Err(Error::corrupt(format!("row {} out of range or repeated", row))),
            }
        }
        if let Some(meta) = &leaf_data.alignment {
            meta.validate()?;
            if meta.rows != n {
                return Err(Error::corrupt(format!(
                    "matrix has {} rows for {} leaves",
                    meta.rows, n
                )));
            }
            match store.size(ALIGNMENT)? {
                Some(size) if size == meta.byte_len() => {}
                Some(size) => {
                    return Err(Error::corrupt(format!(
                        "matrix block has {} bytes, expected {}",
                        size,
                        meta.byte_len()
                    )))
                }
                None => return Err(Error::corrupt("matrix block missing")),
            }
        }
        hierarchy.validate(&leaf_data)?;
        info!(
            "opened archive with {} leaves and {} containers",
            n,
            hierarchy.len()
        );
        Ok(Self::new(store, leaf_data, hierarchy))
    }
}

/// A container of the stored hierarchy
#[derive(Clone, Copy)]
pub struct StorageNode<'a> {
    hierarchy: &'a Hierarchy,
    index: u32,
}

impl<'a> StorageNode<'a> {
    pub fn link(&self) -> StorageLink {
        StorageLink(self.index)
    }

    /// The container name: the leaf name for leaves, the hex digest of the leaf set for
    /// internal nodes, `tree` for the root
    pub fn name(&self) -> &'a str {
        &self.hierarchy.names[self.index as usize]
    }

    /// Scalar properties of the tree node
    pub fn attrs(&self) -> &'a Properties {
        &self.hierarchy.attrs[self.index as usize]
    }

    /// Matrix row, for leaves
    pub fn row(&self) -> Option<u64> {
        self.hierarchy.rows[self.index as usize]
    }

    pub fn parent(&self) -> Option<StorageLink> {
        self.hierarchy.parents[self.index as usize].map(StorageLink)
    }

    pub fn children(&self) -> impl Iterator<Item = StorageLink> + 'a {
        self.hierarchy.children[self.index as usize]
            .iter()
            .map(|x| StorageLink(*x))
    }

    pub fn is_leaf(&self) -> bool {
        self.hierarchy.is_leaf(self.index)
    }
}

impl<'a> fmt::Debug for StorageNode<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageNode")
            .field("link", &self.link())
            .field("name", &self.name())
            .field("row", &self.row())
            .finish()
    }
}
