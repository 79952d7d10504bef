use phylostore::{build_at, Alphabet, load, newick, BlockWriter, BuildOptions, DirStore, SequenceSource};
use phylostore_utils::{
    fasta::{write_fasta, FastaFile},
    random::{pick_leaves, populate, RandomAlignment},
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::{collections::BTreeMap, fs, path::PathBuf};

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "phylostore-utils-test-{}-{}",
        name,
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    dir
}

#[test]
fn fasta_file_to_archive() -> anyhow::Result<()> {
    let dir = temp_dir("fasta");
    fs::create_dir_all(&dir)?;
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let random = populate(&mut rng, 40, None)?;
    let alignment = RandomAlignment::new(&random, 250, 7);
    let tree_file = dir.join("tree.nwk");
    let fasta_file = dir.join("seqs.fasta");
    fs::write(&tree_file, newick::write(&random))?;
    write_fasta(&alignment, fs::File::create(&fasta_file)?)?;

    let expected = alignment
        .records()?
        .map(|r| r.map(|r| (r.id, r.seq)))
        .collect::<anyhow::Result<BTreeMap<_, _>>>()?;

    let store = dir.join("store");
    let mut tree = newick::parse(&fs::read_to_string(&tree_file)?)?;
    let options = BuildOptions::default().with_chunk_shape(8, 64);
    build_at(&store, &mut tree, Some(&FastaFile::new(&fasta_file)), &options)?;

    let (archive, loaded) = load(&store)?;
    assert_eq!(archive.num_leaves(), 40);
    assert_eq!(
        loaded.leaf_names().collect::<Vec<_>>(),
        random.leaf_names().collect::<Vec<_>>()
    );
    let names = pick_leaves(&mut rng, &loaded, 5);
    let slice = archive.fetch(&names, 60..200)?;
    for (row, codes) in slice.iter() {
        let (name, _) = archive
            .leaf_index()
            .iter()
            .find(|(_, r)| **r == row)
            .unwrap();
        let text = archive.alignment().unwrap().alphabet.decode_seq(codes)?;
        assert_eq!(text.as_bytes(), &expected[name][60..200]);
    }
    DirStore::new(&store).clear()?;
    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn overwrite_keeps_inputs() -> anyhow::Result<()> {
    // the inputs live in the directory the archive is written to
    let dir = temp_dir("in-place");
    fs::create_dir_all(&dir)?;
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let random = populate(&mut rng, 12, None)?;
    let fasta_file = dir.join("seqs.fasta");
    write_fasta(
        &RandomAlignment::new(&random, 30, 3),
        fs::File::create(&fasta_file)?,
    )?;
    let fasta = FastaFile::new(&fasta_file);
    let options = BuildOptions::debug().with_overwrite(false);
    let mut tree = random.clone();
    build_at(&dir, &mut tree, Some(&fasta), &options)?;
    let before = fs::read(&fasta_file)?;

    let mut tree = random.clone();
    let archive = build_at(&dir, &mut tree, Some(&fasta), &options.with_overwrite(true))?;
    assert_eq!(fs::read(&fasta_file)?, before);
    assert_eq!(archive.num_leaves(), 12);
    let (_, loaded) = load(&dir)?;
    assert!(loaded.is_isomorphic(&random));
    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn missing_fasta_file() {
    let mut tree = newick::parse("(A,B);").unwrap();
    let dir = temp_dir("missing");
    let res = build_at(
        &dir,
        &mut tree,
        Some(&FastaFile::new(dir.join("nope.fasta"))),
        &BuildOptions::default(),
    );
    assert!(res.is_err());
    let _ = fs::remove_dir_all(&dir);
}
