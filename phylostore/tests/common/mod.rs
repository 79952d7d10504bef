//! helper methods for the tests
#![allow(dead_code)]
use phylostore::{BlockWriter, MemStore, ReadOnlyStore, Record, Tree};
use quickcheck::{Arbitrary, Gen, TestResult};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// A random tree with uniquely named leaves, branch lengths and the odd custom property
#[derive(Debug, Clone)]
pub struct RandomTree(pub Tree);

impl Arbitrary for RandomTree {
    fn arbitrary(g: &mut Gen) -> Self {
        let n = usize::arbitrary(g) % 40 + 1;
        Self(random_tree(g, n))
    }
}

/// Grows a tree by repeatedly splitting a random leaf, then names the leaves
pub fn random_tree(g: &mut Gen, n: usize) -> Tree {
    let mut tree = Tree::new();
    let root = tree.root();
    let mut leaves = vec![root];
    while leaves.len() < n {
        let i = usize::arbitrary(g) % leaves.len();
        let node = leaves.swap_remove(i);
        leaves.push(tree.add_child(node, ""));
        leaves.push(tree.add_child(node, ""));
        // occasionally a node with a single child
        if bool::arbitrary(g) && u8::arbitrary(g) < 16 {
            let last = leaves.len() - 1;
            leaves[last] = tree.add_child(leaves[last], "");
        }
    }
    let ids = tree.preorder().collect::<Vec<_>>();
    for id in ids {
        if u8::arbitrary(g) < 128 {
            tree.set_dist(id, Some((u16::arbitrary(g) as f64) / 1000.0));
        }
        if u8::arbitrary(g) < 32 {
            tree.set_prop(id, "host", *g.choose(&["human", "bat", "pangolin"]).unwrap())
                .unwrap();
        }
    }
    let leaf_ids = tree.leaves().collect::<Vec<_>>();
    for (i, id) in leaf_ids.into_iter().enumerate() {
        tree.set_name(id, format!("L{}", i));
    }
    tree
}

/// One random sequence of length `len` per leaf, with gaps and unknowns
pub fn random_records(g: &mut Gen, tree: &Tree, len: usize) -> Vec<Record> {
    tree.leaf_names()
        .map(|name| {
            let seq = (0..len)
                .map(|_| *g.choose(b"ACGTACGTACGT-N").unwrap())
                .collect::<Vec<u8>>();
            Record::new(name, seq)
        })
        .collect()
}

/// The tree `((A,B),(C,D));` with four sequences of length 10 that only differ for B at
/// column 5
pub fn abcd() -> (Tree, Vec<Record>) {
    let tree = phylostore::newick::parse("((A,B),(C,D));").unwrap();
    let records = vec![
        Record::new("A", "ACGTACGTAC"),
        Record::new("B", "ACGTAGGTAC"),
        Record::new("C", "ACGTACGTAC"),
        Record::new("D", "ACGTACGTAC"),
    ];
    (tree, records)
}

/// A store that counts ranged reads and the bytes they return
#[derive(Clone)]
pub struct OpsCountingStore {
    pub inner: MemStore,
    reads: Arc<AtomicU64>,
    bytes: Arc<AtomicU64>,
}

impl OpsCountingStore {
    pub fn new(inner: MemStore) -> Self {
        Self {
            inner,
            reads: Arc::new(AtomicU64::default()),
            bytes: Arc::new(AtomicU64::default()),
        }
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }
}

impl ReadOnlyStore for OpsCountingStore {
    fn get(&self, name: &str) -> anyhow::Result<Box<[u8]>> {
        self.inner.get(name)
    }

    fn read_at(&self, name: &str, offset: u64, buf: &mut [u8]) -> anyhow::Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.bytes.fetch_add(buf.len() as u64, Ordering::SeqCst);
        self.inner.read_at(name, offset, buf)
    }

    fn size(&self, name: &str) -> anyhow::Result<Option<u64>> {
        self.inner.size(name)
    }
}

impl BlockWriter for OpsCountingStore {
    fn put(&self, name: &str, data: Vec<u8>) -> anyhow::Result<()> {
        self.inner.put(name, data)
    }

    fn allocate(&self, name: &str, len: u64) -> anyhow::Result<()> {
        self.inner.allocate(name, len)
    }

    fn write_at(&self, name: &str, offset: u64, data: &[u8]) -> anyhow::Result<()> {
        self.inner.write_at(name, offset, data)
    }

    fn remove(&self, name: &str) -> anyhow::Result<()> {
        self.inner.remove(name)
    }

    fn sync(&self, name: &str) -> anyhow::Result<()> {
        self.inner.sync(name)
    }

    fn location(&self) -> String {
        self.inner.location()
    }
}

/// A fresh, not yet existing directory below the system temp dir
pub fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "phylostore-test-{}-{}",
        name,
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

pub fn test(f: impl FnOnce() -> anyhow::Result<bool>) -> TestResult {
    match f() {
        Ok(success) => TestResult::from_bool(success),
        Err(cause) => TestResult::error(cause.to_string()),
    }
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
