//! geometry of the chunked sequence matrix
//!
//! The matrix has one row per leaf and one column per alignment position. It is cut into
//! equally sized chunks. Chunks are laid out chunk row by chunk row, each chunk holding its
//! cells in row major order. Chunks at the right and bottom edge are padded to the full
//! chunk shape, so the offset of every chunk is a plain multiple of the chunk size.
use crate::{
    codec::AlphabetKind,
    error::{Error, Result},
    layout::ALIGNMENT,
    store::{BlockWriter, ReadOnlyStore},
};
use libipld::DagCbor;
use std::{convert::TryFrom, ops::Range};

/// Requested number of rows and columns of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, DagCbor)]
pub struct ChunkShape {
    pub rows: u64,
    pub cols: u64,
}

impl ChunkShape {
    pub fn new(rows: u64, cols: u64) -> Self {
        Self { rows, cols }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(Error::InvalidChunkShape {
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }

    fn size(&self) -> u64 {
        self.rows * self.cols
    }
}

impl Default for ChunkShape {
    fn default() -> Self {
        Self::new(1000, 100_000)
    }
}

/// Shape and encoding of a stored matrix
#[derive(Debug, Clone, PartialEq, Eq, DagCbor)]
pub struct AlignmentMeta {
    /// number of rows, equal to the number of leaves
    pub rows: u64,
    /// common length of all sequences
    pub cols: u64,
    /// effective chunk shape, never larger than the matrix
    pub chunk: ChunkShape,
    pub alphabet: AlphabetKind,
}

impl AlignmentMeta {
    /// Geometry for a `rows` x `cols` matrix. The requested chunk shape is clamped to the
    /// matrix dimensions.
    pub fn new(rows: u64, cols: u64, requested: ChunkShape, alphabet: AlphabetKind) -> Result<Self> {
        requested.validate()?;
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidOptions("matrix must not be empty"));
        }
        let chunk = ChunkShape::new(requested.rows.min(rows), requested.cols.min(cols));
        let res = Self {
            rows,
            cols,
            chunk,
            alphabet,
        };
        // the whole matrix must be addressable
        res.checked_byte_len()
            .ok_or(Error::InvalidOptions("matrix too large"))?;
        Ok(res)
    }

    /// Checks metadata read back from a store
    pub(crate) fn validate(&self) -> Result<()> {
        let chunk = self.chunk;
        if self.rows == 0
            || self.cols == 0
            || chunk.rows == 0
            || chunk.cols == 0
            || chunk.rows > self.rows
            || chunk.cols > self.cols
            || self.checked_byte_len().is_none()
        {
            return Err(Error::corrupt(format!(
                "invalid matrix geometry {}x{} in chunks of {}x{}",
                self.rows, self.cols, chunk.rows, chunk.cols
            )));
        }
        Ok(())
    }

    /// number of chunk rows and chunk columns
    pub fn chunk_grid(&self) -> (u64, u64) {
        (
            div_ceil(self.rows, self.chunk.rows),
            div_ceil(self.cols, self.chunk.cols),
        )
    }

    /// Size of the matrix block, including the padding of the edge chunks
    pub fn byte_len(&self) -> u64 {
        self.checked_byte_len().unwrap_or(u64::MAX)
    }

    fn checked_byte_len(&self) -> Option<u64> {
        let (r, c) = self.chunk_grid();
        r.checked_mul(c)?.checked_mul(self.chunk.size())
    }

    /// Byte offset of a cell
    pub fn offset(&self, row: u64, col: u64) -> u64 {
        let (_, grid_cols) = self.chunk_grid();
        let chunk_row = row / self.chunk.rows;
        let chunk_col = col / self.chunk.cols;
        let chunk = chunk_row * grid_cols + chunk_col;
        let within = (row % self.chunk.rows) * self.chunk.cols + col % self.chunk.cols;
        chunk * self.chunk.size() + within
    }

    /// Splits a column range at chunk boundaries. Cells of one row inside one segment are
    /// contiguous in the matrix block.
    pub fn segments(&self, columns: Range<u64>) -> impl Iterator<Item = Range<u64>> {
        let width = self.chunk.cols;
        let end = columns.end;
        let mut start = columns.start;
        std::iter::from_fn(move || {
            if start >= end {
                return None;
            }
            let stop = ((start / width + 1) * width).min(end);
            let res = start..stop;
            start = stop;
            Some(res)
        })
    }

    /// Number of distinct chunks holding the given cells
    pub fn chunks_touched(&self, rows: &[u64], columns: Range<u64>) -> u64 {
        if columns.start >= columns.end {
            return 0;
        }
        let mut chunk_rows = rows.iter().map(|r| r / self.chunk.rows).collect::<Vec<_>>();
        chunk_rows.sort_unstable();
        chunk_rows.dedup();
        let chunk_cols =
            (columns.end - 1) / self.chunk.cols - columns.start / self.chunk.cols + 1;
        chunk_rows.len() as u64 * chunk_cols
    }

    /// Checks a column range against the sequence length
    pub fn check_columns(&self, columns: &Range<u64>) -> Result<()> {
        if columns.start >= columns.end || columns.end > self.cols {
            return Err(Error::ColumnRange {
                start: columns.start,
                end: columns.end,
                len: self.cols,
            });
        }
        Ok(())
    }
}

fn div_ceil(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

/// Writes encoded rows into a freshly allocated matrix block
pub(crate) struct MatrixWriter<'a, W> {
    writer: &'a W,
    meta: &'a AlignmentMeta,
}

impl<'a, W: BlockWriter> MatrixWriter<'a, W> {
    /// Allocates the matrix block. All cells start out as zero, which decodes as the
    /// fully ambiguous symbol.
    pub fn create(writer: &'a W, meta: &'a AlignmentMeta) -> Result<Self> {
        writer.allocate(ALIGNMENT, meta.byte_len())?;
        Ok(Self { writer, meta })
    }

    pub fn write_row(&self, row: u64, codes: &[u8]) -> Result<()> {
        debug_assert_eq!(codes.len() as u64, self.meta.cols);
        for segment in self.meta.segments(0..self.meta.cols) {
            let offset = self.meta.offset(row, segment.start);
            let data = &codes[segment.start as usize..segment.end as usize];
            self.writer.write_at(ALIGNMENT, offset, data)?;
        }
        Ok(())
    }
}

/// Reads a sub matrix. `rows` are matrix rows, the result has one row of
/// `columns.end - columns.start` codes per entry of `rows`, in the same order.
///
/// Each row is read with one ranged read per chunk column, so only chunks that hold
/// requested cells are touched.
pub(crate) fn read_cells<S: ReadOnlyStore>(
    store: &S,
    meta: &AlignmentMeta,
    rows: &[u64],
    columns: Range<u64>,
) -> Result<Vec<u8>> {
    let width = usize::try_from(columns.end - columns.start)
        .map_err(|_| Error::InvalidOptions("column range too large"))?;
    let mut res = vec![0u8; rows.len() * width];
    for (i, row) in rows.iter().enumerate() {
        let target = &mut res[i * width..(i + 1) * width];
        for segment in meta.segments(columns.clone()) {
            let from = (segment.start - columns.start) as usize;
            let to = (segment.end - columns.start) as usize;
            store.read_at(ALIGNMENT, meta.offset(*row, segment.start), &mut target[from..to])?;
        }
    }
    Ok(res)
}
