//! persisted blocks of an archive
//!
//! | block                 | content                                            |
//! |-----------------------|----------------------------------------------------|
//! | `leaf_data/index`     | leaf name to row map and matrix geometry           |
//! | `leaf_data/alignment` | the chunked matrix of symbol codes                 |
//! | `tree`                | the container hierarchy mirroring the tree         |
//! | `manifest`            | format version and counts, written last            |
//!
//! Everything except the matrix and the manifest is dag-cbor, zstd compressed. A store without
//! a manifest was never completely written.
use crate::{
    error::{Error, Result},
    matrix::AlignmentMeta,
    store::decompress_and_transform,
    tree::Properties,
};
use libipld::{
    cbor::DagCborCodec,
    codec::{Codec, Decode, Encode},
    DagCbor,
};
use std::{collections::BTreeMap, io::Write};

pub(crate) const MANIFEST: &str = "manifest";
pub(crate) const TREE: &str = "tree";
pub(crate) const LEAF_INDEX: &str = "leaf_data/index";
pub(crate) const ALIGNMENT: &str = "leaf_data/alignment";

/// All blocks a build writes
pub(crate) const BLOCKS: [&str; 4] = [MANIFEST, TREE, LEAF_INDEX, ALIGNMENT];

pub const FORMAT_VERSION: u32 = 1;

/// Name of the container that mirrors the root of the tree
pub const ROOT_NAME: &str = "tree";

#[derive(Debug, Clone, PartialEq, Eq, DagCbor)]
pub(crate) struct Manifest {
    pub format_version: u32,
    pub num_leaves: u64,
    pub num_nodes: u64,
    pub has_alignment: bool,
}

/// Leaf name to row index map plus geometry of the matrix, if there is one
#[derive(Debug, Clone, Default, PartialEq, DagCbor)]
pub struct LeafData {
    pub rows: BTreeMap<String, u64>,
    pub alignment: Option<AlignmentMeta>,
}

/// The persisted container hierarchy, as an arena in preorder.
///
/// Container 0 is the root. Every other container has a parent with a smaller index.
#[derive(Debug, Clone, Default, PartialEq, DagCbor)]
pub(crate) struct Hierarchy {
    pub names: Vec<String>,
    pub parents: Vec<Option<u32>>,
    pub children: Vec<Vec<u32>>,
    pub attrs: Vec<Properties>,
    pub rows: Vec<Option<u64>>,
}

impl Hierarchy {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Appends a container below `parent` and returns its index
    pub fn push(
        &mut self,
        parent: Option<u32>,
        name: String,
        attrs: Properties,
        row: Option<u64>,
    ) -> u32 {
        let index = self.names.len() as u32;
        self.names.push(name);
        self.parents.push(parent);
        self.children.push(Vec::new());
        self.attrs.push(attrs);
        self.rows.push(row);
        if let Some(parent) = parent {
            self.children[parent as usize].push(index);
        }
        index
    }

    pub fn is_leaf(&self, index: u32) -> bool {
        self.children[index as usize].is_empty()
    }

    /// Structural checks for a hierarchy read back from a store
    pub fn validate(&self, leaf_data: &LeafData) -> Result<()> {
        let n = self.names.len();
        if n == 0 {
            return Err(Error::corrupt("root container missing"));
        }
        if self.parents.len() != n
            || self.children.len() != n
            || self.attrs.len() != n
            || self.rows.len() != n
        {
            return Err(Error::corrupt("hierarchy arrays differ in length"));
        }
        if self.parents[0].is_some() || self.names[0] != ROOT_NAME {
            return Err(Error::corrupt("root container missing"));
        }
        let mut listed = vec![false; n];
        for (i, children) in self.children.iter().enumerate() {
            if i > 0 {
                match self.parents[i] {
                    Some(p) if (p as usize) < i => {}
                    _ => return Err(Error::corrupt(format!("container {} has no valid parent", i))),
                }
            }
            for child in children {
                if self.parents.get(*child as usize) != Some(&Some(i as u32)) {
                    return Err(Error::corrupt(format!("container {} has a stray child", i)));
                }
                if std::mem::replace(&mut listed[*child as usize], true) {
                    return Err(Error::corrupt(format!(
                        "container {} lists child {} twice",
                        i, child
                    )));
                }
            }
        }
        // every container but the root is listed by its parent
        if listed.iter().skip(1).any(|x| !*x) {
            return Err(Error::corrupt("container hierarchy is not a tree"));
        }
        let mut seen = vec![false; leaf_data.rows.len()];
        for i in 0..n {
            if !self.children[i].is_empty() {
                continue;
            }
            let row = match self.rows[i] {
                Some(row) => row,
                None if leaf_data.alignment.is_some() => {
                    return Err(Error::corrupt(format!(
                        "leaf container {:?} lacks its row index",
                        self.names[i]
                    )))
                }
                None => continue,
            };
            // a leaf that is also the root is named after the tree
            if i > 0 && leaf_data.rows.get(&self.names[i]) != Some(&row) {
                return Err(Error::corrupt(format!(
                    "row of leaf container {:?} disagrees with the leaf index",
                    self.names[i]
                )));
            }
            match seen.get_mut(row as usize) {
                Some(x) if !*x => *x = true,
                _ => return Err(Error::corrupt(format!("row {} is not unique", row))),
            }
        }
        if seen.iter().any(|x| !x) {
            return Err(Error::corrupt("leaf containers do not cover all rows"));
        }
        Ok(())
    }
}

/// dag-cbor encodes and zstd compresses a block
pub(crate) fn encode_block<T: Encode<DagCborCodec>>(value: &T, zstd_level: i32) -> Result<Vec<u8>> {
    let encoded = DagCborCodec.encode(value).map_err(Error::Cbor)?;
    let mut encoder = zstd::Encoder::new(Vec::new(), zstd_level)?;
    encoder.write_all(&encoded)?;
    // call finish to write the zstd frame
    Ok(encoder.finish()?)
}

/// inverse of [`encode_block`]. Anything that fails to decode is a corrupt store.
pub(crate) fn decode_block<T: Decode<DagCborCodec>>(data: &[u8], what: &str) -> Result<T> {
    let (_, res) = decompress_and_transform(data, &mut |bytes| DagCborCodec.decode::<T>(bytes))
        .map_err(|e| Error::corrupt(format!("{} does not decompress: {}", what, e)))?;
    res.map_err(|e| Error::corrupt(format!("{} does not decode: {}", what, e)))
}

pub(crate) fn encode_manifest(manifest: &Manifest) -> Result<Vec<u8>> {
    DagCborCodec.encode(manifest).map_err(Error::Cbor)
}

pub(crate) fn decode_manifest(data: &[u8]) -> Result<Manifest> {
    let manifest: Manifest = DagCborCodec
        .decode(data)
        .map_err(|e| Error::corrupt(format!("manifest does not decode: {}", e)))?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(Error::corrupt(format!(
            "unsupported format version {}",
            manifest.format_version
        )));
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec::AlphabetKind, matrix::ChunkShape, tree::Value};

    /// (A,(B,C))
    fn sample() -> (Hierarchy, LeafData) {
        let mut h = Hierarchy::default();
        let root = h.push(None, ROOT_NAME.into(), Properties::new(), None);
        h.push(Some(root), "A".into(), Properties::new(), Some(0));
        let x = h.push(Some(root), "x".into(), Properties::new(), None);
        h.push(Some(x), "B".into(), Properties::new(), Some(1));
        h.push(Some(x), "C".into(), Properties::new(), Some(2));
        let leaf_data = LeafData {
            rows: vec![("A".into(), 0), ("B".into(), 1), ("C".into(), 2)]
                .into_iter()
                .collect(),
            alignment: Some(
                AlignmentMeta::new(3, 4, ChunkShape::default(), AlphabetKind::Nucleotide)
                    .unwrap(),
            ),
        };
        (h, leaf_data)
    }

    #[test]
    fn valid_hierarchy() {
        let (h, leaf_data) = sample();
        assert!(h.validate(&leaf_data).is_ok());
        assert_eq!(h.children[0], vec![1, 2]);
        assert!(h.is_leaf(3));
    }

    #[test]
    fn missing_row() {
        let (mut h, leaf_data) = sample();
        h.rows[3] = None;
        assert!(matches!(h.validate(&leaf_data), Err(Error::CorruptStore(_))));
        // without a matrix rows are optional
        let no_matrix = LeafData {
            alignment: None,
            ..leaf_data.clone()
        };
        assert!(h.validate(&no_matrix).is_err());
        h.rows[4] = None;
        h.rows[1] = None;
        assert!(h.validate(&LeafData::default()).is_ok());
    }

    #[test]
    fn broken_links() {
        let (mut h, leaf_data) = sample();
        h.parents[3] = Some(4);
        assert!(h.validate(&leaf_data).is_err());
        let (mut h, leaf_data) = sample();
        h.children[0].push(3);
        assert!(h.validate(&leaf_data).is_err());
        let (mut h, leaf_data) = sample();
        h.names[0] = "other".into();
        assert!(h.validate(&leaf_data).is_err());
    }

    #[test]
    fn repeated_child() {
        // x lists B twice and C not at all, the number of child entries is unchanged
        let (mut h, leaf_data) = sample();
        h.children[2] = vec![3, 3];
        assert!(matches!(h.validate(&leaf_data), Err(Error::CorruptStore(_))));
        let (mut h, leaf_data) = sample();
        h.children[2] = vec![3];
        assert!(h.validate(&leaf_data).is_err());
    }

    #[test]
    fn block_encoding() -> anyhow::Result<()> {
        let (mut h, _) = sample();
        h.attrs[1].insert("dist".into(), Value::Float(0.5));
        let data = encode_block(&h, 10)?;
        let h1: Hierarchy = decode_block(&data, "tree")?;
        assert_eq!(h, h1);
        assert!(matches!(
            decode_block::<Hierarchy>(b"garbage", "tree"),
            Err(Error::CorruptStore(_))
        ));
        Ok(())
    }

    #[test]
    fn manifest_version() -> anyhow::Result<()> {
        let mut manifest = Manifest {
            format_version: FORMAT_VERSION,
            num_leaves: 3,
            num_nodes: 5,
            has_alignment: true,
        };
        assert_eq!(decode_manifest(&encode_manifest(&manifest)?)?, manifest);
        manifest.format_version = 99;
        assert!(decode_manifest(&encode_manifest(&manifest)?).is_err());
        Ok(())
    }
}
