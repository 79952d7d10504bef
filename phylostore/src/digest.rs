//! Content-derived identifiers of internal nodes
use sha2::{Digest, Sha256};
use std::{convert::TryInto, fmt};

/// Sha2-256 digest of a set of leaf names.
///
/// The names are sorted before hashing and each one is length prefixed, so the digest only
/// depends on the set and no two different sets share an encoding. The same set of leaves
/// gets the same identifier across rebuilds, whatever the order of the children.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeDigest([u8; 32]);

impl NodeDigest {
    pub fn of_leaf_set<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut names = names.into_iter().collect::<Vec<_>>();
        names.sort_unstable();
        names.dedup();
        Self::of_sorted(&names)
    }

    /// digest of names that are already sorted and deduplicated
    pub(crate) fn of_sorted(names: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((names.len() as u64).to_le_bytes());
        for name in names {
            hasher.update((name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
        }
        let result = hasher.finalize();
        NodeDigest(result.into())
    }

    pub fn read(data: &[u8]) -> anyhow::Result<Self> {
        Ok(Self(data.try_into()?))
    }

    /// Parses the hex form used as container name
    pub fn from_hex(text: &str) -> anyhow::Result<Self> {
        let bytes = hex::decode(text)?;
        Self::read(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for NodeDigest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for NodeDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.as_ref()))
    }
}
