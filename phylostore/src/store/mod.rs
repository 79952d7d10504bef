//! interface to a block store
//!
//! A store is a flat namespace of named byte blocks. Small blocks are written and read as
//! a whole, the sequence matrix is a large block that is allocated once and then written
//! and read in pieces.
use crate::{
    error::{Error, Result},
    layout::BLOCKS,
};
use anyhow::anyhow;
use fnv::FnvHashSet;
use lazy_static::lazy_static;
use parking_lot::Mutex;
mod dir_store;
mod mem_store;
mod thread_local_zstd;

pub use dir_store::DirStore;
pub use mem_store::MemStore;
pub(crate) use thread_local_zstd::decompress_and_transform;

pub trait ReadOnlyStore: Send + Sync {
    /// reads an entire block
    fn get(&self, name: &str) -> anyhow::Result<Box<[u8]>>;

    /// fills `buf` from the given offset of a block. Reading past the end is an error.
    fn read_at(&self, name: &str, offset: u64, buf: &mut [u8]) -> anyhow::Result<()>;

    /// size of a block, or None if there is no such block
    fn size(&self, name: &str) -> anyhow::Result<Option<u64>>;
}

pub trait BlockWriter: Send + Sync {
    /// creates or replaces a block
    fn put(&self, name: &str, data: Vec<u8>) -> anyhow::Result<()>;

    /// creates or replaces a block of `len` zero bytes
    fn allocate(&self, name: &str, len: u64) -> anyhow::Result<()>;

    /// overwrites part of an existing block. Writing past the end is an error.
    fn write_at(&self, name: &str, offset: u64, data: &[u8]) -> anyhow::Result<()>;

    /// removes a block, if present
    fn remove(&self, name: &str) -> anyhow::Result<()>;

    /// makes all previous writes to a block durable
    fn sync(&self, name: &str) -> anyhow::Result<()>;

    /// removes the blocks of an archive, and nothing else
    fn clear(&self) -> anyhow::Result<()> {
        // the manifest goes first, so a partly cleared store reads as incomplete
        for name in &BLOCKS {
            self.remove(name)?;
        }
        Ok(())
    }

    /// identifies the destination, two writers with the same location write to the same
    /// blocks
    fn location(&self) -> String;
}

lazy_static! {
    static ref ACTIVE_WRITERS: Mutex<FnvHashSet<String>> = Mutex::new(FnvHashSet::default());
}

/// Exclusive claim on a store location for the duration of a build.
///
/// Claims only cover writers within this process. The claim is released when the guard is
/// dropped, so a failed or panicking build never leaves the location claimed.
#[derive(Debug)]
pub struct WriterClaim {
    location: String,
}

impl WriterClaim {
    pub fn acquire(location: String) -> Result<Self> {
        let mut active = ACTIVE_WRITERS.lock();
        if !active.insert(location.clone()) {
            return Err(Error::WriterActive(location));
        }
        tracing::debug!("claimed {}", location);
        Ok(Self { location })
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

impl Drop for WriterClaim {
    fn drop(&mut self) {
        ACTIVE_WRITERS.lock().remove(&self.location);
        tracing::debug!("released {}", self.location);
    }
}

/// checks that a ranged access stays inside a block of size `len`
pub(crate) fn check_range(name: &str, offset: u64, n: usize, len: u64) -> anyhow::Result<()> {
    let end = offset
        .checked_add(n as u64)
        .ok_or_else(|| anyhow!("offset overflow in {}", name))?;
    if end > len {
        return Err(anyhow!(
            "range {}..{} out of bounds for {} of size {}",
            offset,
            end,
            name,
            len
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_are_exclusive() {
        let a = WriterClaim::acquire("test:claims".into()).unwrap();
        assert!(matches!(
            WriterClaim::acquire("test:claims".into()),
            Err(Error::WriterActive(_))
        ));
        drop(a);
        assert!(WriterClaim::acquire("test:claims".into()).is_ok());
    }

    #[test]
    fn range_checks() {
        assert!(check_range("x", 0, 10, 10).is_ok());
        assert!(check_range("x", 1, 10, 10).is_err());
        assert!(check_range("x", u64::MAX, 1, 10).is_err());
    }
}
