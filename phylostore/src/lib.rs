//! # Phylostore
//!
//! Persistent phylogenetic trees together with the aligned sequences of their leaves.
//!
//! A build writes a tree and one sequence per leaf into a store of named blocks. The
//! sequences end up in a single matrix with one row per leaf, cut into fixed size chunks,
//! so that any set of leaves can be read over any column range by touching only the chunks
//! that hold the requested cells. The tree itself is mirrored as a hierarchy of containers.
//!
//! # Symbol codes
//!
//! Sequences are stored as 8 bit codes, see [`codec`]. Codes are chosen so that the
//! bitwise AND of the codes at one position is the code of the narrowest ambiguity class
//! covering them. A consensus over any number of rows is therefore a column wise AND, see
//! [`consensus`].
//!
//! # Identifiers
//!
//! Leaf containers are named after the leaf. Internal containers are named after the
//! sha2-256 digest of the set of leaf names below them, so the same clade gets the same
//! name in every build, independent of child order. The root container is always `tree`.
//!
//! # Persistence
//!
//! The hierarchy and the leaf index are [DAG-CBOR] encoded and [zstd] compressed. A manifest is
//! written as the very last block. A store that has blocks but no manifest was interrupted
//! while being built and is reported as corrupt.
//!
//! # Example
//!
//! ```
//! use phylostore::{build, newick, BuildOptions, MemStore, Record};
//!
//! let mut tree = newick::parse("((A,B),(C,D));")?;
//! let records = vec![
//!     Record::new("A", "ACGTA"),
//!     Record::new("B", "ACGTG"),
//!     Record::new("C", "ACGTA"),
//!     Record::new("D", "ACCTA"),
//! ];
//! let archive = build(MemStore::new(1 << 20), &mut tree, Some(&records), &BuildOptions::default())?;
//! let slice = archive.fetch(vec!["A", "B"], 3..5)?;
//! assert_eq!(slice.decode_row(1)?, "TG");
//! let loaded = archive.load_tree()?;
//! assert!(loaded.is_isomorphic(&tree));
//! # Ok::<(), phylostore::Error>(())
//! ```
//!
//! [DAG-CBOR]: https://ipld.io/specs/codecs/dag-cbor/spec/
//! [zstd]: https://en.wikipedia.org/wiki/Zstandard
// The `DagCbor` derive of libipld 0.14 generates code that relies on never type fallback.
#![allow(dependency_on_unit_never_type_fallback)]

pub mod archive;
pub mod build;
pub mod codec;
pub mod consensus;
pub mod digest;
pub mod error;
pub mod layout;
mod load;
pub mod matrix;
pub mod newick;
pub mod query;
pub mod source;
pub mod store;
pub mod tree;

pub use archive::{Archive, StorageNode};
pub use build::{build, build_at, BuildOptions};
pub use codec::{Alphabet, AlphabetKind, AminoAcid, Decoded, Nucleotide, GAP, UNKNOWN};
pub use consensus::{consensus, Consensus};
pub use digest::NodeDigest;
pub use error::{Error, ErrorKind, Result};
pub use load::load;
pub use matrix::{AlignmentMeta, ChunkShape};
pub use query::AlignmentSlice;
pub use source::{Record, SequenceSource};
pub use store::{BlockWriter, DirStore, MemStore, ReadOnlyStore};
pub use tree::{NodeId, Properties, StorageLink, Tree, Value};

#[cfg(test)]
extern crate quickcheck;
