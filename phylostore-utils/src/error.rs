#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Phylostore(#[from] phylostore::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("FASTA record {}: {}", .record, .reason)]
    Fasta { record: usize, reason: &'static str },

    #[error("Cannot name {} leaves with {} names", .leaves, .names)]
    NotEnoughNames { leaves: usize, names: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
