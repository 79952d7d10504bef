//! Column-wise consensus by bitwise AND over encoded rows
use crate::{
    codec::GAP,
    error::{Error, Result},
};

/// Consensus of equal length encoded rows.
///
/// Fails with [`Error::EmptyInput`] for zero rows and [`Error::RowLengthMismatch`] if the
/// rows differ in length.
pub fn consensus<R: AsRef<[u8]>>(rows: &[R]) -> Result<Vec<u8>> {
    let first = rows.first().ok_or(Error::EmptyInput)?;
    let mut acc = Consensus::new(first.as_ref().len());
    for row in rows {
        acc.push(row.as_ref())?;
    }
    acc.finish()
}

/// Incremental consensus, for folding over rows that arrive one at a time.
#[derive(Debug, Clone)]
pub struct Consensus {
    codes: Vec<u8>,
    rows: usize,
}

impl Consensus {
    pub fn new(len: usize) -> Self {
        Self {
            codes: vec![GAP; len],
            rows: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// number of rows folded in so far
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn push(&mut self, row: &[u8]) -> Result<()> {
        if row.len() != self.codes.len() {
            return Err(Error::RowLengthMismatch {
                index: self.rows,
                expected: self.codes.len(),
                found: row.len(),
            });
        }
        for (acc, code) in self.codes.iter_mut().zip(row) {
            *acc &= *code;
        }
        self.rows += 1;
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        if self.rows == 0 {
            return Err(Error::EmptyInput);
        }
        Ok(self.codes)
    }
}
