//! random trees and alignments for benchmarks and tests
use crate::error::{Error, Result};
use phylostore::{source::BoxedIter, Record, SequenceSource, Tree};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const NUCLEOTIDES: &[u8] = b"ACGT";
const AMINO_ACIDS: &[u8] = b"ACDEFGHIKLMNPQRSTVWY";

/// A random binary tree with `n` leaves and branch lengths in `[0, 1)`.
///
/// Leaves are named from `names` in traversal order, or `L0`, `L1`, ... if no names are
/// given.
pub fn populate<R: Rng + ?Sized>(rng: &mut R, n: usize, names: Option<&[String]>) -> Result<Tree> {
    let n = n.max(1);
    if let Some(names) = names {
        if names.len() < n {
            return Err(Error::NotEnoughNames {
                leaves: n,
                names: names.len(),
            });
        }
    }
    let mut tree = Tree::new();
    let mut leaves = vec![tree.root()];
    while leaves.len() < n {
        let node = leaves.swap_remove(rng.gen_range(0..leaves.len()));
        for _ in 0..2 {
            let child = tree.add_child(node, "");
            tree.set_dist(child, Some(rng.gen::<f64>()));
            leaves.push(child);
        }
    }
    let ids = tree.leaves().collect::<Vec<_>>();
    for (i, id) in ids.into_iter().enumerate() {
        let name = match names {
            Some(names) => names[i].clone(),
            None => format!("L{}", i),
        };
        tree.set_name(id, name);
    }
    Ok(tree)
}

/// `k` distinct leaf names of `tree`, picked at random
pub fn pick_leaves<R: Rng + ?Sized>(rng: &mut R, tree: &Tree, k: usize) -> Vec<String> {
    let names = tree.leaf_names().collect::<Vec<_>>();
    names
        .choose_multiple(rng, k)
        .map(|x| (*x).to_owned())
        .collect()
}

/// Uniformly random sequences for a fixed set of names.
///
/// The sequences are generated on the fly from a seed, so every pass yields the same
/// records and nothing is kept in memory.
#[derive(Debug, Clone)]
pub struct RandomAlignment {
    names: Vec<String>,
    len: usize,
    seed: u64,
    symbols: &'static [u8],
}

impl RandomAlignment {
    /// nucleotide sequences of length `len`, one per leaf of `tree`
    pub fn new(tree: &Tree, len: usize, seed: u64) -> Self {
        Self {
            names: tree.leaf_names().map(str::to_owned).collect(),
            len,
            seed,
            symbols: NUCLEOTIDES,
        }
    }

    pub fn amino_acids(mut self) -> Self {
        self.symbols = AMINO_ACIDS;
        self
    }

    /// length of every sequence
    pub fn seq_len(&self) -> usize {
        self.len
    }
}

impl SequenceSource for RandomAlignment {
    fn records(&self) -> anyhow::Result<BoxedIter<'_, anyhow::Result<Record>>> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let symbols = self.symbols;
        let len = self.len;
        Ok(Box::new(self.names.iter().map(move |name| {
            let seq = (0..len)
                .map(|_| symbols[rng.gen_range(0..symbols.len())])
                .collect::<Vec<_>>();
            Ok(Record::new(name.as_str(), seq))
        })))
    }
}
