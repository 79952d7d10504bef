//! reconstructing the tree model from a store
use crate::{
    archive::Archive,
    error::Result,
    store::{DirStore, ReadOnlyStore},
    tree::{StorageLink, Tree, NAME},
};
use std::{path::Path, time::Instant};
use tracing::*;

impl<S: ReadOnlyStore> Archive<S> {
    /// Rebuilds the tree from the stored hierarchy.
    ///
    /// The result is isomorphic to the tree the archive was built from. Every node carries
    /// the link to its container.
    pub fn load_tree(&self) -> Result<Tree> {
        let t0 = Instant::now();
        let hierarchy = &self.hierarchy;
        let mut tree = Tree::new();
        let root = tree.root();
        let mut stack = vec![(0u32, root)];
        while let Some((index, id)) = stack.pop() {
            let attrs = hierarchy.attrs[index as usize].clone();
            if !attrs.contains_key(NAME) && index > 0 && hierarchy.is_leaf(index) {
                tree.set_name(id, hierarchy.names[index as usize].clone());
            }
            tree.apply_props(id, attrs)?;
            tree.set_storage_link(id, StorageLink(index));
            // children are created in order, so the pushed ids come out reversed
            let children = hierarchy.children[index as usize]
                .iter()
                .map(|child| (*child, tree.add_child(id, "")))
                .collect::<Vec<_>>();
            stack.extend(children.into_iter().rev());
        }
        debug!(
            "loaded tree with {} nodes in {}s",
            hierarchy.len(),
            t0.elapsed().as_secs_f64()
        );
        Ok(tree)
    }
}

/// Opens the store in directory `path` and loads its tree
pub fn load(path: impl AsRef<Path>) -> Result<(Archive<DirStore>, Tree)> {
    let archive = Archive::open(DirStore::new(path.as_ref()))?;
    let tree = archive.load_tree()?;
    Ok((archive, tree))
}
