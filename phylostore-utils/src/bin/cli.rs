use phylostore::{
    build_at, load, newick, Alphabet, AlphabetKind, Archive, BuildOptions, ChunkShape, DirStore,
    MemStore,
};
use phylostore_utils::{
    dump,
    fasta::{write_fasta, FastaFile},
    random::{pick_leaves, populate, RandomAlignment},
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::{fs, ops::Range, path::PathBuf, time::Instant};
use structopt::StructOpt;
use tracing::Level;

#[cfg(target_env = "musl")]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

pub type Error = anyhow::Error;
pub type Result<T> = anyhow::Result<T>;

#[derive(StructOpt)]
#[structopt(about = "CLI to work with phylostore archives")]
struct Opts {
    #[structopt(short, parse(from_occurrences = set_log_level), global = true)]
    #[allow(dead_code)] // log level will bet set in [`set_log_level`]
    /// Increase verbosity
    verbosity: u64,
    #[structopt(subcommand)]
    cmd: Command,
}

fn set_log_level(verbosity: u64) -> u64 {
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
    verbosity
}

#[derive(StructOpt)]
struct BuildOpts {
    #[structopt(long, default_value = "1000")]
    /// Rows per chunk
    chunk_rows: u64,
    #[structopt(long, default_value = "100000")]
    /// Columns per chunk
    chunk_cols: u64,
    #[structopt(long, default_value = "nt")]
    /// Alphabet of the sequences, "nt" or "aa"
    alphabet: AlphabetKind,
    #[structopt(long)]
    /// Replace an existing archive
    overwrite: bool,
}

impl BuildOpts {
    fn options(&self) -> BuildOptions {
        BuildOptions {
            chunk_shape: ChunkShape::new(self.chunk_rows, self.chunk_cols),
            overwrite: self.overwrite,
            alphabet: self.alphabet,
            ..BuildOptions::default()
        }
    }
}

#[derive(StructOpt)]
enum Command {
    /// Build an archive from a newick tree and an optional FASTA file
    Build {
        #[structopt(long)]
        /// The newick file
        tree: PathBuf,
        #[structopt(long)]
        /// FASTA file with one sequence per leaf
        fasta: Option<PathBuf>,
        #[structopt(long)]
        /// Directory of the archive
        store: PathBuf,
        #[structopt(flatten)]
        opts: BuildOpts,
    },
    /// Print a summary of an archive and its tree as newick
    Dump {
        #[structopt(long)]
        /// Directory of the archive
        store: PathBuf,
    },
    /// Traverse the stored hierarchy and dump it as dot. Can be piped directly:
    /// `phylostore-cli graph --store <..> | dot -Tpng -o output.png`.
    /// Internal containers are depicted as boxes, leaves as ellipses. Leaves without a
    /// row are greyed out.
    Graph {
        #[structopt(long)]
        /// Directory of the archive
        store: PathBuf,
    },
    /// Print the decoded sequences of some leaves in a column range
    Fetch {
        #[structopt(long)]
        /// Directory of the archive
        store: PathBuf,
        #[structopt(long)]
        /// First column
        start: u64,
        #[structopt(long)]
        /// Column after the last one
        end: u64,
        /// Leaf names
        leaves: Vec<String>,
    },
    /// Print the consensus of some leaves in a column range
    Consensus {
        #[structopt(long)]
        /// Directory of the archive
        store: PathBuf,
        #[structopt(long)]
        /// First column
        start: u64,
        #[structopt(long)]
        /// Column after the last one
        end: u64,
        /// Leaf names
        leaves: Vec<String>,
    },
    /// Write a random tree and alignment as newick and FASTA
    Random {
        #[structopt(long)]
        /// Number of leaves
        leaves: usize,
        #[structopt(long)]
        /// Length of the sequences
        len: usize,
        #[structopt(long, default_value = "0")]
        seed: u64,
        #[structopt(long)]
        /// Output newick file
        tree: PathBuf,
        #[structopt(long)]
        /// Output FASTA file
        fasta: PathBuf,
    },
    /// Benchmark building, loading and random access on random data
    Bench {
        #[structopt(long, default_value = "1000")]
        /// Number of leaves
        leaves: usize,
        #[structopt(long, default_value = "10000")]
        /// Length of the sequences
        len: usize,
        #[structopt(long, default_value = "100")]
        /// Number of random fetches
        fetches: usize,
        #[structopt(long, default_value = "10")]
        /// Leaves per fetch
        picks: usize,
        #[structopt(long, default_value = "0")]
        seed: u64,
        #[structopt(long)]
        /// Directory to build in, an in memory store is used if not given
        store: Option<PathBuf>,
        #[structopt(flatten)]
        opts: BuildOpts,
    },
}

fn print_rows(archive: &Archive<DirStore>, leaves: &[String], columns: Range<u64>) -> Result<()> {
    let slice = archive.fetch(leaves, columns)?;
    let names = archive
        .leaf_index()
        .iter()
        .map(|(name, row)| (*row, name.as_str()))
        .collect::<std::collections::BTreeMap<_, _>>();
    for (i, row) in slice.rows().iter().enumerate() {
        let name = names.get(row).copied().unwrap_or_default();
        println!("{}\t{}", name, slice.decode_row(i)?);
    }
    Ok(())
}

fn bench<S>(
    store: S,
    leaves: usize,
    len: usize,
    fetches: usize,
    picks: usize,
    seed: u64,
    options: &BuildOptions,
) -> Result<()>
where
    S: phylostore::ReadOnlyStore + phylostore::BlockWriter + Clone,
{
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut tree = populate(&mut rng, leaves, None)?;
    let mut alignment = RandomAlignment::new(&tree, len, seed);
    if options.alphabet == AlphabetKind::AminoAcid {
        alignment = alignment.amino_acids();
    }

    let t0 = Instant::now();
    phylostore::build(store.clone(), &mut tree, Some(&alignment), options)?;
    let tbuild = t0.elapsed();

    let t0 = Instant::now();
    let archive = Archive::open(store)?;
    let loaded = archive.load_tree()?;
    let tload = t0.elapsed();
    anyhow::ensure!(loaded.is_isomorphic(&tree), "loaded tree differs");

    let t0 = Instant::now();
    let mut cells = 0;
    for _ in 0..fetches {
        let names = pick_leaves(&mut rng, &tree, picks);
        let a = rng.gen_range(0..len as u64);
        let b = rng.gen_range(0..len as u64);
        let slice = archive.fetch(&names, a.min(b)..a.max(b) + 1)?;
        let (rows, cols) = slice.shape();
        cells += rows * cols;
    }
    let tfetch = t0.elapsed();
    println!("build {}", tbuild.as_secs_f64());
    println!("load {}", tload.as_secs_f64());
    println!("fetch {} ({} cells)", tfetch.as_secs_f64(), cells);
    Ok(())
}

fn main() -> Result<()> {
    let opts = Opts::from_args();
    match opts.cmd {
        Command::Build {
            tree,
            fasta,
            store,
            opts,
        } => {
            let mut tree = newick::parse(&fs::read_to_string(&tree)?)?;
            let fasta = fasta.map(FastaFile::new);
            let archive = build_at(&store, &mut tree, fasta.as_ref(), &opts.options())?;
            dump::summary(&archive, std::io::stdout())?;
        }
        Command::Dump { store } => {
            let (archive, tree) = load(&store)?;
            dump::summary(&archive, std::io::stdout())?;
            println!("{}", newick::write(&tree));
        }
        Command::Graph { store } => {
            let archive = Archive::open(DirStore::new(store))?;
            dump::graph(&archive, std::io::stdout())?;
        }
        Command::Fetch {
            store,
            start,
            end,
            leaves,
        } => {
            let archive = Archive::open(DirStore::new(store))?;
            print_rows(&archive, &leaves, start..end)?;
        }
        Command::Consensus {
            store,
            start,
            end,
            leaves,
        } => {
            let archive = Archive::open(DirStore::new(store))?;
            let codes = archive.consensus(&leaves, start..end)?;
            let alphabet = archive
                .alignment()
                .map(|meta| meta.alphabet)
                .unwrap_or(AlphabetKind::Nucleotide);
            println!("{}", alphabet.decode_seq(&codes)?);
        }
        Command::Random {
            leaves,
            len,
            seed,
            tree,
            fasta,
        } => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let random = populate(&mut rng, leaves, None)?;
            fs::write(&tree, newick::write(&random))?;
            let alignment = RandomAlignment::new(&random, len, seed);
            write_fasta(&alignment, fs::File::create(&fasta)?)?;
        }
        Command::Bench {
            leaves,
            len,
            fetches,
            picks,
            seed,
            store,
            opts,
        } => {
            let options = opts.options();
            println!(
                "benchmarking {} leaves with sequences of length {}",
                leaves, len
            );
            match store {
                Some(path) => bench(
                    DirStore::new(path),
                    leaves,
                    len,
                    fetches,
                    picks,
                    seed,
                    &options.with_overwrite(true),
                )?,
                None => bench(
                    MemStore::new(usize::max_value()),
                    leaves,
                    len,
                    fetches,
                    picks,
                    seed,
                    &options,
                )?,
            }
        }
    }
    Ok(())
}
