use common::{abcd, temp_dir};
use phylostore::{
    build, build_at, load, store::WriterClaim, Archive, BlockWriter, BuildOptions, DirStore,
    Error, ErrorKind, MemStore, ReadOnlyStore,
};
use parking_lot::Mutex;
use std::sync::Arc;

mod common;

#[test]
fn directory_round_trip() -> anyhow::Result<()> {
    let dir = temp_dir("round-trip");
    let (mut tree, records) = abcd();
    build_at(&dir, &mut tree, Some(&records), &BuildOptions::debug())?;
    assert!(dir.join("manifest").is_file());
    assert!(dir.join("leaf_data").join("alignment").is_file());
    let (archive, loaded) = load(&dir)?;
    assert!(loaded.is_isomorphic(&tree));
    let slice = archive.fetch(vec!["B"], 3..7)?;
    assert_eq!(slice.decode_row(0)?, "TAGG");
    // links of the loaded tree point into the loaded archive
    let b = loaded.find_leaf("B").unwrap();
    let node = archive.node(loaded.storage_link(b).unwrap())?;
    assert_eq!(node.name(), "B");
    assert_eq!(node.row(), Some(1));
    DirStore::new(&dir).clear()?;
    Ok(())
}

#[test]
fn empty_store_is_corrupt() {
    let res = Archive::open(MemStore::new(1 << 20));
    assert!(matches!(res, Err(Error::CorruptStore(_))));
    let res = load(temp_dir("does-not-exist"));
    assert!(matches!(res, Err(Error::CorruptStore(_))));
}

#[test]
fn interrupted_build_is_detected() -> anyhow::Result<()> {
    let (mut tree, records) = abcd();
    let store = MemStore::new(1 << 20);
    build(store.clone(), &mut tree, Some(&records), &BuildOptions::default())?;
    // everything but the manifest made it to the store
    store.remove("manifest")?;
    let res = Archive::open(store.clone());
    assert!(matches!(res, Err(Error::CorruptStore(_))));
    assert_eq!(res.unwrap_err().kind(), ErrorKind::Integrity);
    // a build without overwrite does not paper over it
    let res = build(store.clone(), &mut tree, Some(&records), &BuildOptions::default());
    assert!(matches!(res, Err(Error::CorruptStore(_))));
    // a rebuild from scratch does
    let options = BuildOptions::default().with_overwrite(true);
    build(store.clone(), &mut tree, Some(&records), &options)?;
    assert!(Archive::open(store).is_ok());
    Ok(())
}

#[test]
fn damaged_blocks_are_detected() -> anyhow::Result<()> {
    let (mut tree, records) = abcd();
    let store = MemStore::new(1 << 20);
    build(store.clone(), &mut tree, Some(&records), &BuildOptions::default())?;
    let snapshot = store.snapshot();

    store.put("tree", b"not a hierarchy".to_vec())?;
    assert!(matches!(Archive::open(store.clone()), Err(Error::CorruptStore(_))));
    store.put("tree", snapshot["tree"].clone())?;

    store.put("leaf_data/alignment", vec![0; 7])?;
    assert!(matches!(Archive::open(store.clone()), Err(Error::CorruptStore(_))));
    store.remove("leaf_data/alignment")?;
    assert!(matches!(Archive::open(store.clone()), Err(Error::CorruptStore(_))));
    store.put("leaf_data/alignment", snapshot["leaf_data/alignment"].clone())?;

    store.remove("leaf_data/index")?;
    assert!(matches!(Archive::open(store.clone()), Err(Error::CorruptStore(_))));
    store.put("leaf_data/index", snapshot["leaf_data/index"].clone())?;

    let archive = Archive::open(store.clone())?;
    assert_eq!(archive.fetch(vec!["A"], 0..4)?.decode_row(0)?, "ACGT");
    assert_eq!(store.size("manifest")?, Some(snapshot["manifest"].len() as u64));
    Ok(())
}

#[test]
fn one_writer_per_store() -> anyhow::Result<()> {
    let (mut tree, records) = abcd();
    let store = MemStore::new(1 << 20);
    let claim = WriterClaim::acquire(store.location())?;
    let res = build(store.clone(), &mut tree, Some(&records), &BuildOptions::default());
    assert!(matches!(res, Err(Error::WriterActive(_))));
    assert_eq!(res.unwrap_err().kind(), ErrorKind::Resource);
    assert!(store.snapshot().is_empty());
    drop(claim);
    build(store, &mut tree, Some(&records), &BuildOptions::default())?;
    Ok(())
}

#[test]
fn store_errors_surface_as_resource_errors() {
    let (mut tree, records) = abcd();
    // too small for the matrix
    let store = MemStore::new(16);
    let res = build(store, &mut tree, Some(&records), &BuildOptions::default());
    assert!(matches!(res, Err(Error::Store(_))));
    assert_eq!(res.unwrap_err().kind(), ErrorKind::Resource);
}

/// Records the writes a build makes, in order
#[derive(Clone)]
struct JournalStore {
    inner: MemStore,
    journal: Arc<Mutex<Vec<String>>>,
}

impl JournalStore {
    fn log(&self, op: &str, name: &str) {
        self.journal.lock().push(format!("{} {}", op, name));
    }

    fn position(&self, entry: &str) -> Option<usize> {
        self.journal.lock().iter().position(|x| x == entry)
    }
}

impl ReadOnlyStore for JournalStore {
    fn get(&self, name: &str) -> anyhow::Result<Box<[u8]>> {
        self.inner.get(name)
    }

    fn read_at(&self, name: &str, offset: u64, buf: &mut [u8]) -> anyhow::Result<()> {
        self.inner.read_at(name, offset, buf)
    }

    fn size(&self, name: &str) -> anyhow::Result<Option<u64>> {
        self.inner.size(name)
    }
}

impl BlockWriter for JournalStore {
    fn put(&self, name: &str, data: Vec<u8>) -> anyhow::Result<()> {
        self.log("put", name);
        self.inner.put(name, data)
    }

    fn allocate(&self, name: &str, len: u64) -> anyhow::Result<()> {
        self.log("allocate", name);
        self.inner.allocate(name, len)
    }

    fn write_at(&self, name: &str, offset: u64, data: &[u8]) -> anyhow::Result<()> {
        self.inner.write_at(name, offset, data)
    }

    fn remove(&self, name: &str) -> anyhow::Result<()> {
        self.log("remove", name);
        self.inner.remove(name)
    }

    fn sync(&self, name: &str) -> anyhow::Result<()> {
        self.log("sync", name);
        self.inner.sync(name)
    }

    fn location(&self) -> String {
        self.inner.location()
    }
}

#[test]
fn data_is_durable_before_the_manifest() -> anyhow::Result<()> {
    let (mut tree, records) = abcd();
    let store = JournalStore {
        inner: MemStore::new(1 << 20),
        journal: Arc::new(Mutex::new(Vec::new())),
    };
    build(store.clone(), &mut tree, Some(&records), &BuildOptions::debug())?;
    let commit = store.position("put manifest").unwrap();
    for block in &["leaf_data/alignment", "tree", "leaf_data/index"] {
        let synced = store.position(&format!("sync {}", block)).unwrap();
        assert!(synced < commit, "{} synced after the manifest", block);
    }
    assert_eq!(
        store.journal.lock().last().map(String::as_str),
        Some("sync manifest")
    );
    // nothing is removed from a successful build
    assert!(store.position("remove manifest").is_none());
    Ok(())
}
