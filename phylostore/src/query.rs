//! random access to the sequences of leaves and subtrees
use crate::{
    archive::Archive,
    codec::{Alphabet, AlphabetKind},
    consensus::consensus,
    error::{Error, Result},
    matrix::{read_cells, AlignmentMeta},
    store::ReadOnlyStore,
    tree::{NodeId, StorageLink, Tree},
};
use std::ops::Range;
use tracing::*;

/// A rectangular piece of the sequence matrix.
///
/// Rows are in ascending matrix order, one per requested leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentSlice {
    rows: Vec<u64>,
    columns: Range<u64>,
    codes: Vec<u8>,
    alphabet: AlphabetKind,
}

impl AlignmentSlice {
    /// matrix rows of the slice
    pub fn rows(&self) -> &[u64] {
        &self.rows
    }

    pub fn columns(&self) -> Range<u64> {
        self.columns.clone()
    }

    pub fn alphabet(&self) -> AlphabetKind {
        self.alphabet
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.width())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn width(&self) -> usize {
        (self.columns.end - self.columns.start) as usize
    }

    /// codes of the i-th row of the slice
    pub fn row(&self, i: usize) -> &[u8] {
        let width = self.width();
        &self.codes[i * width..(i + 1) * width]
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &[u8])> + '_ {
        self.rows.iter().copied().zip(self.codes.chunks(self.width().max(1)))
    }

    /// all codes, row after row
    pub fn codes(&self) -> &[u8] {
        &self.codes
    }

    pub fn decode_row(&self, i: usize) -> Result<String> {
        self.alphabet.decode_seq(self.row(i))
    }

    /// Column wise consensus over all rows of the slice
    pub fn consensus(&self) -> Result<Vec<u8>> {
        let rows = (0..self.rows.len()).map(|i| self.row(i)).collect::<Vec<_>>();
        consensus(&rows)
    }
}

impl<S: ReadOnlyStore> Archive<S> {
    /// Maps leaf names to their rows. The result is sorted and free of duplicates.
    pub fn resolve_rows<I, T>(&self, names: I) -> Result<Vec<u64>>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut rows = names
            .into_iter()
            .map(|name| {
                let name = name.as_ref();
                self.row_of(name)
                    .ok_or_else(|| Error::UnknownLeaf(name.to_owned()))
            })
            .collect::<Result<Vec<_>>>()?;
        rows.sort_unstable();
        rows.dedup();
        Ok(rows)
    }

    fn meta(&self) -> Result<&AlignmentMeta> {
        self.alignment().ok_or(Error::NoAlignment)
    }

    /// Reads the sequences of the named leaves in the column range `columns`.
    pub fn fetch<I, T>(&self, names: I, columns: Range<u64>) -> Result<AlignmentSlice>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.meta()?.check_columns(&columns)?;
        let rows = self.resolve_rows(names)?;
        self.fetch_rows(&rows, columns)
    }

    /// Reads whole matrix rows in the column range `columns`. Rows are sorted and
    /// deduplicated first.
    pub fn fetch_rows(&self, rows: &[u64], columns: Range<u64>) -> Result<AlignmentSlice> {
        let meta = self.meta()?;
        meta.check_columns(&columns)?;
        let mut rows = rows.to_vec();
        rows.sort_unstable();
        rows.dedup();
        if let Some(row) = rows.last().filter(|row| **row >= meta.rows) {
            return Err(Error::RowOutOfRange {
                row: *row,
                rows: meta.rows,
            });
        }
        debug!(
            "fetching {} rows in {}..{}, {} chunks",
            rows.len(),
            columns.start,
            columns.end,
            meta.chunks_touched(&rows, columns.clone())
        );
        let codes = read_cells(self.store(), meta, &rows, columns.clone())?;
        Ok(AlignmentSlice {
            rows,
            columns,
            codes,
            alphabet: meta.alphabet,
        })
    }

    /// Reads the sequences of all leaves below a container
    pub fn fetch_node(&self, link: StorageLink, columns: Range<u64>) -> Result<AlignmentSlice> {
        self.meta()?.check_columns(&columns)?;
        let mut rows = Vec::new();
        for leaf in self.leaves_under(link)? {
            let leaf = self.node(leaf)?;
            rows.push(
                leaf.row()
                    .ok_or_else(|| Error::corrupt(format!("leaf {:?} has no row", leaf.name())))?,
            );
        }
        self.fetch_rows(&rows, columns)
    }

    /// Reads the sequences of all leaves below a node of a tree attached to this archive
    pub fn fetch_subtree(
        &self,
        tree: &Tree,
        id: NodeId,
        columns: Range<u64>,
    ) -> Result<AlignmentSlice> {
        match tree.storage_link(id) {
            Some(link) => self.fetch_node(link, columns),
            None => self.fetch(tree.leaf_names_under(id), columns),
        }
    }

    /// Consensus codes of the named leaves in the column range `columns`
    pub fn consensus<I, T>(&self, names: I, columns: Range<u64>) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let slice = self.fetch(names, columns)?;
        slice.consensus()
    }
}
