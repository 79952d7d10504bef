//! streaming FASTA input and output
use crate::error::Error;
use anyhow::Context;
use bio::io::fasta;
use phylostore::{source::BoxedIter, Record, SequenceSource};
use std::{
    fs::File,
    io::{BufRead, BufReader, Read, Write},
    path::{Path, PathBuf},
};

/// Reads FASTA records one at a time.
///
/// The record id is the first whitespace delimited word of the header. Iteration stops
/// after the first error.
pub struct FastaRecords<B: BufRead> {
    records: fasta::Records<B>,
    /// number of records returned so far
    count: usize,
    done: bool,
}

/// Reads the FASTA records of `reader`
pub fn read_fasta<R: Read>(reader: R) -> FastaRecords<BufReader<R>> {
    FastaRecords {
        records: fasta::Reader::new(reader).records(),
        count: 0,
        done: false,
    }
}

impl<B: BufRead> Iterator for FastaRecords<B> {
    type Item = anyhow::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = match self.records.next()? {
            Ok(record) if record.id().is_empty() => Err(Error::Fasta {
                record: self.count,
                reason: "header without id",
            }),
            Ok(record) => Ok(Record::new(record.id(), record.seq())),
            Err(cause) => Err(Error::Io(cause)),
        };
        self.count += 1;
        if result.is_err() {
            self.done = true;
        }
        Some(result.map_err(Into::into))
    }
}

/// A FASTA file as sequence source. Every pass reopens the file.
#[derive(Debug, Clone)]
pub struct FastaFile {
    path: PathBuf,
}

impl FastaFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SequenceSource for FastaFile {
    fn records(&self) -> anyhow::Result<BoxedIter<'_, anyhow::Result<Record>>> {
        let file = File::open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        Ok(Box::new(read_fasta(file)))
    }
}

/// Writes all records of a source as FASTA, one line per sequence
pub fn write_fasta<S: SequenceSource + ?Sized>(
    source: &S,
    out: impl Write,
) -> anyhow::Result<()> {
    let mut writer = fasta::Writer::new(out);
    for record in source.records()? {
        let record = record?;
        writer.write(&record.id, None, &record.seq)?;
    }
    writer.flush()?;
    Ok(())
}
