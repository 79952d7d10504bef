//! 8 bit symbol codes that form consensus codes under bitwise AND
//!
//! Every alphabet assigns each concrete symbol a code such that the AND of the codes of
//! several symbols is the code of the ambiguity class covering all of them. The gap code
//! has all bits set, so it is the identity of the AND reduction: gaps never weaken a
//! consensus.
//!
//! The nucleotide table is the reference: a concrete base clears exactly one bit of the
//! low nibble, so any set of bases maps to a distinct code and all IUPAC ambiguity
//! letters fall out of the reduction.
//!
//! The amino acid table groups residues by BLOSUM62 similarity. The low nibble holds the
//! group mask, the high nibble distinguishes members. Residues from the same group reduce
//! to a group class, anything else reduces towards `X`.
use crate::error::{Error, Result};
use libipld::{
    cbor::DagCborCodec,
    codec::{Decode, Encode},
};
use std::{
    fmt,
    io::{Read, Seek, Write},
};

/// Code of the alignment gap. Neutral element of the consensus reduction.
pub const GAP: u8 = 0xff;

/// Code of a fully ambiguous position (`N` or `X`). Unwritten matrix cells hold this value.
pub const UNKNOWN: u8 = 0x00;

/// A decoded code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// a concrete symbol
    Symbol(char),
    /// an ambiguity letter or class
    Ambiguous(char),
    /// alignment gap
    Gap,
}

impl Decoded {
    pub fn as_char(self) -> char {
        match self {
            Decoded::Symbol(c) | Decoded::Ambiguous(c) => c,
            Decoded::Gap => '-',
        }
    }

    pub fn is_ambiguous(self) -> bool {
        matches!(self, Decoded::Ambiguous(_))
    }
}

/// The alphabet a sequence matrix was encoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlphabetKind {
    Nucleotide,
    AminoAcid,
}

impl fmt::Display for AlphabetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlphabetKind::Nucleotide => f.write_str("nucleotide"),
            AlphabetKind::AminoAcid => f.write_str("amino acid"),
        }
    }
}

/// persisted as a small integer
impl Encode<DagCborCodec> for AlphabetKind {
    fn encode<W: Write>(&self, c: DagCborCodec, w: &mut W) -> anyhow::Result<()> {
        let tag: u64 = match self {
            AlphabetKind::Nucleotide => 0,
            AlphabetKind::AminoAcid => 1,
        };
        tag.encode(c, w)
    }
}

impl Decode<DagCborCodec> for AlphabetKind {
    fn decode<R: Read + Seek>(c: DagCborCodec, r: &mut R) -> anyhow::Result<Self> {
        match u64::decode(c, r)? {
            0 => Ok(AlphabetKind::Nucleotide),
            1 => Ok(AlphabetKind::AminoAcid),
            x => Err(anyhow::anyhow!("unknown alphabet tag {}", x)),
        }
    }
}

impl std::str::FromStr for AlphabetKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "nt" | "nucleotide" | "dna" => Ok(Self::Nucleotide),
            "aa" | "amino-acid" | "protein" => Ok(Self::AminoAcid),
            x => Err(anyhow::anyhow!("unknown alphabet {:?}", x)),
        }
    }
}

impl Alphabet for AlphabetKind {
    fn kind(&self) -> AlphabetKind {
        *self
    }

    fn encode(&self, symbol: u8) -> Result<u8> {
        match self {
            AlphabetKind::Nucleotide => Nucleotide.encode(symbol),
            AlphabetKind::AminoAcid => AminoAcid.encode(symbol),
        }
    }

    fn decode(&self, code: u8) -> Result<Decoded> {
        match self {
            AlphabetKind::Nucleotide => Nucleotide.decode(code),
            AlphabetKind::AminoAcid => AminoAcid.decode(code),
        }
    }
}

/// Mapping between sequence symbols and 8 bit codes.
pub trait Alphabet {
    fn kind(&self) -> AlphabetKind;

    /// Encode a single symbol. Fails with [`Error::UnknownSymbol`] for symbols outside the
    /// alphabet.
    fn encode(&self, symbol: u8) -> Result<u8>;

    /// Decode a single code into a symbol or an ambiguity class.
    fn decode(&self, code: u8) -> Result<Decoded>;

    /// Encode a raw sequence, appending to `out`.
    fn encode_into(&self, seq: &[u8], out: &mut Vec<u8>) -> Result<()> {
        out.reserve(seq.len());
        for symbol in seq {
            out.push(self.encode(*symbol)?);
        }
        Ok(())
    }

    fn encode_seq(&self, seq: &[u8]) -> Result<Vec<u8>> {
        let mut res = Vec::new();
        self.encode_into(seq, &mut res)?;
        Ok(res)
    }

    fn decode_seq(&self, codes: &[u8]) -> Result<String> {
        codes
            .iter()
            .map(|code| self.decode(*code).map(Decoded::as_char))
            .collect()
    }
}

/// Nucleotides, including all IUPAC ambiguity letters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nucleotide;

/// Letters indexed by the set of bases they stand for (A=1, C=2, G=4, T=8).
const NT_LETTERS: [u8; 16] = *b"?ACMGRSVTWYHKDBN";

impl Nucleotide {
    fn mask(symbol: u8) -> Option<u8> {
        let mask = match symbol.to_ascii_uppercase() {
            b'A' => 0b0001,
            b'C' => 0b0010,
            b'G' => 0b0100,
            b'T' | b'U' => 0b1000,
            b'M' => 0b0011,
            b'R' => 0b0101,
            b'W' => 0b1001,
            b'S' => 0b0110,
            b'Y' => 0b1010,
            b'K' => 0b1100,
            b'V' => 0b0111,
            b'H' => 0b1011,
            b'D' => 0b1101,
            b'B' => 0b1110,
            b'N' | b'X' => 0b1111,
            _ => return None,
        };
        Some(mask)
    }
}

impl Alphabet for Nucleotide {
    fn kind(&self) -> AlphabetKind {
        AlphabetKind::Nucleotide
    }

    fn encode(&self, symbol: u8) -> Result<u8> {
        if symbol == b'-' || symbol == b'.' {
            return Ok(GAP);
        }
        Self::mask(symbol)
            .map(|mask| !mask & 0x0f)
            .ok_or(Error::UnknownSymbol {
                symbol: symbol as char,
                alphabet: AlphabetKind::Nucleotide,
            })
    }

    fn decode(&self, code: u8) -> Result<Decoded> {
        if code == GAP {
            return Ok(Decoded::Gap);
        }
        let mask = !code & 0x0f;
        if code > 0x0f || mask == 0 {
            return Err(Error::UnknownCode {
                code,
                alphabet: AlphabetKind::Nucleotide,
            });
        }
        let letter = NT_LETTERS[mask as usize] as char;
        Ok(if mask.count_ones() == 1 {
            Decoded::Symbol(letter)
        } else {
            Decoded::Ambiguous(letter)
        })
    }
}

/// Amino acids grouped by BLOSUM62 similarity.
#[derive(Debug, Clone, Copy, Default)]
pub struct AminoAcid;

/// concrete residues
const AA_CODES: [(u8, u8); 20] = [
    // small and polar
    (b'C', 0b0011_0011),
    (b'S', 0b0110_0011),
    (b'T', 0b1100_0011),
    // small and non-polar
    (b'P', 0b0011_0110),
    (b'A', 0b0110_0110),
    (b'G', 0b1100_0110),
    // polar or acidic
    (b'N', 0b0011_1100),
    (b'D', 0b0110_1100),
    (b'E', 0b1100_1100),
    (b'Q', 0b1001_1100),
    // basic
    (b'H', 0b0011_0101),
    (b'R', 0b0110_0101),
    (b'K', 0b1100_0101),
    // large and hydrophobic
    (b'M', 0b0011_1001),
    (b'L', 0b0110_1001),
    (b'I', 0b1100_1001),
    (b'V', 0b1001_1001),
    // aromatic
    (b'F', 0b0011_1010),
    (b'Y', 0b0110_1010),
    (b'W', 0b1100_1010),
];

/// IUPAC two-residue ambiguity letters, each the AND of its members
const AA_AMBIGUOUS: [(u8, u8); 3] = [
    // N or D
    (b'B', 0b0010_1100),
    // E or Q
    (b'Z', 0b1000_1100),
    // I or L
    (b'J', 0b0100_1001),
];

/// group masks in the low nibble and the letter used for the group class
const AA_GROUPS: [(u8, char); 6] = [
    (0b0011, 'p'),
    (0b0110, 's'),
    (0b1100, 'a'),
    (0b0101, '+'),
    (0b1001, 'l'),
    (0b1010, 'o'),
];

impl Alphabet for AminoAcid {
    fn kind(&self) -> AlphabetKind {
        AlphabetKind::AminoAcid
    }

    fn encode(&self, symbol: u8) -> Result<u8> {
        let upper = symbol.to_ascii_uppercase();
        match upper {
            b'-' | b'.' => return Ok(GAP),
            b'X' => return Ok(UNKNOWN),
            _ => {}
        }
        AA_CODES
            .iter()
            .chain(AA_AMBIGUOUS.iter())
            .find(|(letter, _)| *letter == upper)
            .map(|(_, code)| *code)
            .ok_or(Error::UnknownSymbol {
                symbol: symbol as char,
                alphabet: AlphabetKind::AminoAcid,
            })
    }

    fn decode(&self, code: u8) -> Result<Decoded> {
        if code == GAP {
            return Ok(Decoded::Gap);
        }
        if let Some((letter, _)) = AA_CODES.iter().find(|(_, c)| *c == code) {
            return Ok(Decoded::Symbol(*letter as char));
        }
        if let Some((letter, _)) = AA_AMBIGUOUS.iter().find(|(_, c)| *c == code) {
            return Ok(Decoded::Ambiguous(*letter as char));
        }
        let class = AA_GROUPS
            .iter()
            .find(|(mask, _)| code & 0x0f == *mask)
            .map(|(_, class)| *class)
            .unwrap_or('X');
        Ok(Decoded::Ambiguous(class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn nt(symbol: u8) -> u8 {
        Nucleotide.encode(symbol).unwrap()
    }

    fn aa(symbol: u8) -> u8 {
        AminoAcid.encode(symbol).unwrap()
    }

    #[test]
    fn a_and_g_is_r() {
        assert_eq!(nt(b'A') & nt(b'G'), nt(b'R'));
    }

    #[test]
    fn iupac_letters_are_the_and_of_their_members() {
        let table: &[(u8, &[u8])] = &[
            (b'M', b"AC"),
            (b'R', b"AG"),
            (b'W', b"AT"),
            (b'S', b"CG"),
            (b'Y', b"CT"),
            (b'K', b"GT"),
            (b'V', b"ACG"),
            (b'H', b"ACT"),
            (b'D', b"AGT"),
            (b'B', b"CGT"),
            (b'N', b"ACGT"),
        ];
        for (letter, members) in table {
            let reduced = members.iter().fold(GAP, |acc, s| acc & nt(*s));
            assert_eq!(reduced, nt(*letter), "{}", *letter as char);
            assert_eq!(
                Nucleotide.decode(reduced).unwrap(),
                Decoded::Ambiguous(*letter as char)
            );
        }
    }

    #[test]
    fn nucleotide_round_trip() {
        for symbol in b"ACGT" {
            assert_eq!(
                Nucleotide.decode(nt(*symbol)).unwrap(),
                Decoded::Symbol(*symbol as char)
            );
        }
        assert_eq!(nt(b'u'), nt(b'T'));
        assert_eq!(nt(b'a'), nt(b'A'));
        assert_eq!(nt(b'-'), GAP);
        assert_eq!(nt(b'N'), UNKNOWN);
        assert_eq!(Nucleotide.decode(GAP).unwrap(), Decoded::Gap);
        assert_eq!(
            Nucleotide.decode_seq(&Nucleotide.encode_seq(b"ACGTN-RY").unwrap()).unwrap(),
            "ACGTN-RY"
        );
    }

    #[test]
    fn nucleotide_rejects_unknown() {
        assert!(matches!(
            Nucleotide.encode(b'J'),
            Err(Error::UnknownSymbol { symbol: 'J', .. })
        ));
        assert!(matches!(
            Nucleotide.decode(0x0f),
            Err(Error::UnknownCode { code: 0x0f, .. })
        ));
        assert!(Nucleotide.decode(0x10).is_err());
    }

    #[test]
    fn gap_is_neutral() {
        for symbol in b"ACGTRYN" {
            assert_eq!(nt(*symbol) & GAP, nt(*symbol));
        }
        for symbol in b"CSTPAGWYFX" {
            assert_eq!(aa(*symbol) & GAP, aa(*symbol));
        }
    }

    #[test]
    fn amino_acid_codes_are_unique() {
        let mut codes = AA_CODES
            .iter()
            .chain(AA_AMBIGUOUS.iter())
            .map(|(_, c)| *c)
            .collect::<Vec<_>>();
        codes.push(GAP);
        codes.push(UNKNOWN);
        let n = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), n);
    }

    #[test]
    fn amino_acid_ambiguity() {
        assert_eq!(aa(b'N') & aa(b'D'), aa(b'B'));
        assert_eq!(aa(b'E') & aa(b'Q'), aa(b'Z'));
        assert_eq!(aa(b'I') & aa(b'L'), aa(b'J'));
        assert_eq!(
            AminoAcid.decode(aa(b'F') & aa(b'W')).unwrap(),
            Decoded::Ambiguous('o')
        );
        assert_eq!(
            AminoAcid.decode(aa(b'H') & aa(b'R') & aa(b'K')).unwrap(),
            Decoded::Ambiguous('+')
        );
        // different groups never reduce to a group class
        assert_eq!(
            AminoAcid.decode(aa(b'C') & aa(b'A')).unwrap(),
            Decoded::Ambiguous('X')
        );
        assert_eq!(AminoAcid.decode(aa(b'W')).unwrap(), Decoded::Symbol('W'));
        assert!(AminoAcid.encode(b'O').is_err());
    }

    #[test]
    fn alphabet_kind_dispatch() {
        assert_eq!(Alphabet::encode(&AlphabetKind::Nucleotide, b'G').unwrap(), nt(b'G'));
        assert_eq!(Alphabet::encode(&AlphabetKind::AminoAcid, b'G').unwrap(), aa(b'G'));
        assert_eq!("aa".parse::<AlphabetKind>().unwrap(), AlphabetKind::AminoAcid);
    }

    /// the reduction of any nonempty set of bases decodes to the letter of that set
    #[quickcheck]
    fn nucleotide_reduction_is_closed(symbols: Vec<u8>) -> bool {
        let bases = symbols
            .iter()
            .map(|x| b"ACGT"[(*x % 4) as usize])
            .collect::<Vec<_>>();
        if bases.is_empty() {
            return true;
        }
        let reduced = bases.iter().fold(GAP, |acc, s| acc & nt(*s));
        let decoded = Nucleotide.decode(reduced).unwrap().as_char() as u8;
        bases
            .iter()
            .all(|b| nt(decoded) & nt(*b) == nt(decoded))
    }
}
