pub mod dump;
pub mod error;
pub mod fasta;
pub mod random;

pub use error::{Error, Result};
