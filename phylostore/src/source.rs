//! sources of named sequences
use std::fmt;

pub type BoxedIter<'a, T> = Box<dyn Iterator<Item = T> + 'a>;

/// A named sequence
#[derive(Clone, PartialEq, Eq)]
pub struct Record {
    pub id: String,
    pub seq: Vec<u8>,
}

impl Record {
    pub fn new(id: impl Into<String>, seq: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            seq: seq.into(),
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("seq", &String::from_utf8_lossy(&self.seq))
            .finish()
    }
}

/// Something that yields named sequences one at a time.
///
/// The builder consumes records as they come and never holds more than one of them, so a
/// source backed by a file can be arbitrarily large.
pub trait SequenceSource {
    /// Starts a pass over all records
    fn records(&self) -> anyhow::Result<BoxedIter<'_, anyhow::Result<Record>>>;
}

impl SequenceSource for [Record] {
    fn records(&self) -> anyhow::Result<BoxedIter<'_, anyhow::Result<Record>>> {
        Ok(Box::new(self.iter().cloned().map(Ok)))
    }
}

impl SequenceSource for Vec<Record> {
    fn records(&self) -> anyhow::Result<BoxedIter<'_, anyhow::Result<Record>>> {
        self.as_slice().records()
    }
}

impl<T: SequenceSource + ?Sized> SequenceSource for &T {
    fn records(&self) -> anyhow::Result<BoxedIter<'_, anyhow::Result<Record>>> {
        (**self).records()
    }
}
