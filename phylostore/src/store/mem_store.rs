use super::{check_range, BlockWriter, ReadOnlyStore};
use anyhow::anyhow;
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::{
    convert::TryFrom,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// A MemStore is a pure in memory store. Mostly useful for testing and benchmarks.
///
/// Clones share the same blocks.
#[derive(Clone)]
pub struct MemStore(Arc<Inner>);

struct Inner {
    id: u64,
    blocks: Mutex<Blocks>,
    max_size: usize,
}

#[derive(Debug, Default)]
struct Blocks {
    map: FnvHashMap<String, Vec<u8>>,
    current_size: usize,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

impl MemStore {
    pub fn new(max_size: usize) -> Self {
        Self(Arc::new(Inner {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
            blocks: Mutex::new(Blocks::default()),
            max_size,
        }))
    }

    /// A copy of all blocks, for comparing store contents
    pub fn snapshot(&self) -> FnvHashMap<String, Vec<u8>> {
        self.0.blocks.lock().map.clone()
    }

    fn put0(&self, name: &str, data: Vec<u8>) -> anyhow::Result<()> {
        let mut blocks = self.0.blocks.lock();
        let old = blocks.map.get(name).map(|x| x.len()).unwrap_or_default();
        if blocks.current_size - old + data.len() > self.0.max_size {
            anyhow::bail!("full");
        }
        blocks.current_size = blocks.current_size - old + data.len();
        blocks.map.insert(name.to_owned(), data);
        Ok(())
    }
}

impl ReadOnlyStore for MemStore {
    fn get(&self, name: &str) -> anyhow::Result<Box<[u8]>> {
        let blocks = self.0.blocks.lock();
        if let Some(value) = blocks.map.get(name) {
            Ok(value.clone().into())
        } else {
            Err(anyhow!("not there"))
        }
    }

    fn read_at(&self, name: &str, offset: u64, buf: &mut [u8]) -> anyhow::Result<()> {
        let blocks = self.0.blocks.lock();
        let data = blocks.map.get(name).ok_or_else(|| anyhow!("not there"))?;
        check_range(name, offset, buf.len(), data.len() as u64)?;
        let offset = offset as usize;
        buf.copy_from_slice(&data[offset..offset + buf.len()]);
        Ok(())
    }

    fn size(&self, name: &str) -> anyhow::Result<Option<u64>> {
        Ok(self.0.blocks.lock().map.get(name).map(|x| x.len() as u64))
    }
}

impl BlockWriter for MemStore {
    fn put(&self, name: &str, data: Vec<u8>) -> anyhow::Result<()> {
        self.put0(name, data)
    }

    fn allocate(&self, name: &str, len: u64) -> anyhow::Result<()> {
        let len = usize::try_from(len)?;
        self.put0(name, vec![0u8; len])
    }

    fn write_at(&self, name: &str, offset: u64, data: &[u8]) -> anyhow::Result<()> {
        let mut blocks = self.0.blocks.lock();
        let block = blocks
            .map
            .get_mut(name)
            .ok_or_else(|| anyhow!("not there"))?;
        check_range(name, offset, data.len(), block.len() as u64)?;
        let offset = offset as usize;
        block[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn remove(&self, name: &str) -> anyhow::Result<()> {
        let mut blocks = self.0.blocks.lock();
        if let Some(data) = blocks.map.remove(name) {
            blocks.current_size -= data.len();
        }
        Ok(())
    }

    fn sync(&self, name: &str) -> anyhow::Result<()> {
        if self.0.blocks.lock().map.contains_key(name) {
            Ok(())
        } else {
            Err(anyhow!("not there"))
        }
    }

    fn location(&self) -> String {
        format!("memory:{}", self.0.id)
    }
}
