use common::{random_records, random_tree, OpsCountingStore};
use phylostore::{build, BuildOptions, MemStore};
use quickcheck::Gen;
use std::time::Instant;

mod common;

#[test]
fn reads_are_bounded_by_touched_chunks() -> anyhow::Result<()> {
    common::init_logging();
    let mut g = Gen::new(100);
    let mut tree = random_tree(&mut g, 200);
    let records = random_records(&mut g, &tree, 1000);
    let store = OpsCountingStore::new(MemStore::new(usize::max_value()));
    let options = BuildOptions::default().with_chunk_shape(16, 64);
    let archive = build(store.clone(), &mut tree, Some(&records), &options)?;
    let meta = archive.alignment().unwrap().clone();

    let names = vec!["L3", "L17", "L150"];
    let columns = 100..300;
    let r0 = store.reads();
    let b0 = store.bytes();
    let t0 = Instant::now();
    let slice = archive.fetch(&names, columns.clone())?;
    let reads = store.reads() - r0;
    let bytes = store.bytes() - b0;
    let rows = archive.resolve_rows(&names)?;
    let segments = meta.segments(columns.clone()).count() as u64;
    // 100..300 in chunks of 64 columns: 100..128, 128..192, 192..256, 256..300
    assert_eq!(segments, 4);
    assert_eq!(reads, rows.len() as u64 * segments);
    // nothing outside the requested cells is read
    assert_eq!(bytes, 3 * 200);
    assert!(meta.chunks_touched(&rows, columns.clone()) <= reads);
    assert_eq!(slice.shape(), (3, 200));
    println!("{} reads, {} bytes, {}us", reads, bytes, t0.elapsed().as_micros());

    // a single cell is a single read
    let r0 = store.reads();
    archive.fetch(vec!["L42"], 999..1000)?;
    assert_eq!(store.reads() - r0, 1);

    // whole rows read the matrix row by row, one read per chunk column
    let r0 = store.reads();
    archive.fetch(vec!["L0", "L1"], 0..1000)?;
    assert_eq!(store.reads() - r0, 2 * meta.chunk_grid().1);
    Ok(())
}

#[test]
fn opening_reads_no_sequence_data() -> anyhow::Result<()> {
    let mut g = Gen::new(100);
    let mut tree = random_tree(&mut g, 50);
    let records = random_records(&mut g, &tree, 500);
    let store = OpsCountingStore::new(MemStore::new(usize::max_value()));
    build(store.clone(), &mut tree, Some(&records), &BuildOptions::debug())?;
    let r0 = store.reads();
    let archive = phylostore::Archive::open(store.clone())?;
    let loaded = archive.load_tree()?;
    assert!(loaded.is_isomorphic(&tree));
    assert_eq!(store.reads(), r0);
    Ok(())
}
