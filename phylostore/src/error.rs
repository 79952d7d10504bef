use crate::codec::AlphabetKind;

/// Broad category of an [`Error`], used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input (tree, sequences, options) is not acceptable.
    Validation,
    /// The persisted store is inconsistent or an identifier is ambiguous.
    Integrity,
    /// A query names something the store does not contain.
    Resolution,
    /// The storage backend or a sequence source failed, or the store is busy.
    Resource,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Leaf name {:?} found multiple times", .0)]
    DuplicateLeafName(String),

    #[error("Leaf without a name")]
    UnnamedLeaf,

    #[error("Sequence {:?} has length {}, expected {}", .name, .found, .expected)]
    SequenceLengthMismatch {
        name: String,
        expected: u64,
        found: u64,
    },

    #[error("Sequence {:?} is empty", .0)]
    EmptySequence(String),

    #[error("Sequence record {:?} does not match any leaf", .0)]
    UnexpectedRecord(String),

    #[error("Sequence record {:?} occurs more than once", .0)]
    DuplicateRecord(String),

    #[error("Unknown symbol {:?} for the {} alphabet", .symbol, .alphabet)]
    UnknownSymbol { symbol: char, alphabet: AlphabetKind },

    #[error("Code {:#010b} is not a valid {} code", .code, .alphabet)]
    UnknownCode { code: u8, alphabet: AlphabetKind },

    #[error("Consensus needs at least one row")]
    EmptyInput,

    #[error("Row {} has length {}, expected {}", .index, .found, .expected)]
    RowLengthMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("Invalid chunk shape {}x{}", .rows, .cols)]
    InvalidChunkShape { rows: u64, cols: u64 },

    #[error("Invalid options: {}", .0)]
    InvalidOptions(&'static str),

    #[error("Invalid property {:?}: {}", .key, .reason)]
    InvalidProperty { key: String, reason: &'static str },

    #[error("Invalid topology: {}", .0)]
    InvalidTopology(&'static str),

    #[error("Newick parse error at byte {}: {}", .position, .reason)]
    Newick { position: usize, reason: &'static str },

    #[error("Identifier {} is shared by two different leaf sets", .0)]
    IdentifierCollision(String),

    #[error("Container {:?} already exists below {:?}", .name, .parent)]
    ContainerNameClash { parent: String, name: String },

    #[error("Corrupt store: {}", .0)]
    CorruptStore(String),

    #[error("Unknown leaf {:?}", .0)]
    UnknownLeaf(String),

    #[error("Column range {}..{} is invalid for sequences of length {}", .start, .end, .len)]
    ColumnRange { start: u64, end: u64, len: u64 },

    #[error("Row {} is out of range for {} rows", .row, .rows)]
    RowOutOfRange { row: u64, rows: u64 },

    #[error("Store has no alignment")]
    NoAlignment,

    #[error("Store link {} is out of bounds", .0)]
    InvalidLink(u32),

    #[error("Another writer is active on {}", .0)]
    WriterActive(String),

    #[error("Sequence source failed: {}", .0)]
    Source(#[source] anyhow::Error),

    #[error(transparent)]
    Store(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Cbor encoding failed: {}", .0)]
    Cbor(#[source] anyhow::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            DuplicateLeafName(_)
            | UnnamedLeaf
            | SequenceLengthMismatch { .. }
            | EmptySequence(_)
            | UnexpectedRecord(_)
            | DuplicateRecord(_)
            | UnknownSymbol { .. }
            | UnknownCode { .. }
            | EmptyInput
            | RowLengthMismatch { .. }
            | InvalidChunkShape { .. }
            | InvalidOptions(_)
            | InvalidProperty { .. }
            | InvalidTopology(_)
            | Newick { .. } => ErrorKind::Validation,
            IdentifierCollision(_) | ContainerNameClash { .. } | CorruptStore(_) | Cbor(_) => {
                ErrorKind::Integrity
            }
            UnknownLeaf(_)
            | ColumnRange { .. }
            | RowOutOfRange { .. }
            | NoAlignment
            | InvalidLink(_) => ErrorKind::Resolution,
            WriterActive(_) | Source(_) | Store(_) | Io(_) => ErrorKind::Resource,
        }
    }

    pub(crate) fn corrupt(what: impl Into<String>) -> Self {
        Self::CorruptStore(what.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
