//! Minimal CLVM program trees
//!
//! Just enough of the puzzle format to curry the standard puzzle and compute
//! the same tree hash the chain records as a coin's puzzle hash:
//!
//! - serialization: `0xff` pair, `0x80` nil, bytes `<= 0x7f` are one-byte
//!   atoms, anything else is a length-prefixed atom
//! - tree hash: `sha256(1 || atom)` for atoms, `sha256(2 || left || right)`
//!   for pairs

use sha2::{Digest, Sha256};

use crate::bytes::{decode_hex, Bytes32};
use crate::error::ListenerError;

const PAIR_MARKER: u8 = 0xff;
const NIL_MARKER: u8 = 0x80;
const MAX_SINGLE_BYTE: u8 = 0x7f;

// operator atoms used by currying
const OP_QUOTE: u8 = 0x01;
const OP_APPLY: u8 = 0x02;
const OP_CONS: u8 = 0x04;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Program {
    Atom(Vec<u8>),
    Pair(Box<Program>, Box<Program>),
}

impl Program {
    pub fn nil() -> Self {
        Program::Atom(Vec::new())
    }

    pub fn atom(bytes: impl Into<Vec<u8>>) -> Self {
        Program::Atom(bytes.into())
    }

    pub fn pair(left: Program, right: Program) -> Self {
        Program::Pair(Box::new(left), Box::new(right))
    }

    /// Proper list terminated by nil
    pub fn list(items: Vec<Program>) -> Self {
        items
            .into_iter()
            .rev()
            .fold(Program::nil(), |tail, item| Program::pair(item, tail))
    }

    pub fn from_hex(value: &str) -> Result<Self, ListenerError> {
        Self::from_bytes(&decode_hex(value)?)
    }

    /// Deserialize a complete program; trailing bytes are an error
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ListenerError> {
        let mut cursor = 0usize;
        let program = parse(bytes, &mut cursor)?;
        if cursor != bytes.len() {
            return Err(ListenerError::InvalidHex(format!(
                "{} trailing bytes after program",
                bytes.len() - cursor
            )));
        }
        Ok(program)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write(&mut out);
        out
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            Program::Pair(left, right) => {
                out.push(PAIR_MARKER);
                left.write(out);
                right.write(out);
            }
            Program::Atom(atom) => write_atom(atom, out),
        }
    }

    pub fn tree_hash(&self) -> Bytes32 {
        match self {
            Program::Atom(atom) => hash_atom(atom),
            Program::Pair(left, right) => hash_pair(&left.tree_hash(), &right.tree_hash()),
        }
    }

    /// Bind `args` as the leading arguments of this program:
    /// `(a (q . self) (c (q . arg1) (c (q . arg2) ... 1)))`
    pub fn curry(&self, args: Vec<Program>) -> Program {
        let environment = args.into_iter().rev().fold(
            Program::atom(vec![1u8]),
            |rest, arg| {
                Program::list(vec![
                    Program::atom(vec![OP_CONS]),
                    Program::pair(Program::atom(vec![OP_QUOTE]), arg),
                    rest,
                ])
            },
        );

        Program::list(vec![
            Program::atom(vec![OP_APPLY]),
            Program::pair(Program::atom(vec![OP_QUOTE]), self.clone()),
            environment,
        ])
    }
}

pub fn hash_atom(atom: &[u8]) -> Bytes32 {
    let mut hasher = Sha256::new();
    hasher.update([1u8]);
    hasher.update(atom);
    Bytes32::new(hasher.finalize().into())
}

pub fn hash_pair(left: &Bytes32, right: &Bytes32) -> Bytes32 {
    let mut hasher = Sha256::new();
    hasher.update([2u8]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Bytes32::new(hasher.finalize().into())
}

fn hash_list(items: &[Bytes32]) -> Bytes32 {
    items
        .iter()
        .rev()
        .fold(hash_atom(&[]), |tail, item| hash_pair(item, &tail))
}

/// Tree hash of `module` curried with arguments whose tree hashes are
/// `arg_hashes`, without materialising the curried program
pub fn curry_tree_hash(module_hash: &Bytes32, arg_hashes: &[Bytes32]) -> Bytes32 {
    let quote = hash_atom(&[OP_QUOTE]);
    let environment = arg_hashes.iter().rev().fold(hash_atom(&[1u8]), |rest, arg| {
        hash_list(&[hash_atom(&[OP_CONS]), hash_pair(&quote, arg), rest])
    });

    hash_list(&[
        hash_atom(&[OP_APPLY]),
        hash_pair(&quote, module_hash),
        environment,
    ])
}

fn parse(bytes: &[u8], cursor: &mut usize) -> Result<Program, ListenerError> {
    let first = next_byte(bytes, cursor)?;

    if first == PAIR_MARKER {
        let left = parse(bytes, cursor)?;
        let right = parse(bytes, cursor)?;
        return Ok(Program::pair(left, right));
    }
    if first == NIL_MARKER {
        return Ok(Program::nil());
    }
    if first <= MAX_SINGLE_BYTE {
        return Ok(Program::atom(vec![first]));
    }

    let length = decode_size(first, bytes, cursor)?;
    let end = cursor
        .checked_add(length)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| ListenerError::InvalidHex("atom runs past end of program".into()))?;
    let atom = bytes[*cursor..end].to_vec();
    *cursor = end;
    Ok(Program::Atom(atom))
}

/// Length prefix: the number of leading one bits in the first byte is the
/// number of bytes that make up the size
fn decode_size(first: u8, bytes: &[u8], cursor: &mut usize) -> Result<usize, ListenerError> {
    let mut mask = 0x80u8;
    let mut prefix_len = 0usize;
    let mut value = first;
    while value & mask != 0 {
        prefix_len += 1;
        value &= !mask;
        mask >>= 1;
    }
    if prefix_len > 5 {
        return Err(ListenerError::InvalidHex("atom length prefix too long".into()));
    }

    let mut size = value as u64;
    for _ in 1..prefix_len {
        size = (size << 8) | next_byte(bytes, cursor)? as u64;
    }
    usize::try_from(size).map_err(|_| ListenerError::InvalidHex("atom too large".into()))
}

fn write_atom(atom: &[u8], out: &mut Vec<u8>) {
    if atom.is_empty() {
        out.push(NIL_MARKER);
        return;
    }
    if atom.len() == 1 && atom[0] <= MAX_SINGLE_BYTE {
        out.push(atom[0]);
        return;
    }

    let len = atom.len() as u64;
    if len < 0x40 {
        out.push(0x80 | len as u8);
    } else if len < 0x2000 {
        out.push(0xc0 | (len >> 8) as u8);
        out.push(len as u8);
    } else if len < 0x10_0000 {
        out.push(0xe0 | (len >> 16) as u8);
        out.push((len >> 8) as u8);
        out.push(len as u8);
    } else if len < 0x800_0000 {
        out.push(0xf0 | (len >> 24) as u8);
        out.push((len >> 16) as u8);
        out.push((len >> 8) as u8);
        out.push(len as u8);
    } else {
        out.push(0xf8 | (len >> 32) as u8);
        out.push((len >> 24) as u8);
        out.push((len >> 16) as u8);
        out.push((len >> 8) as u8);
        out.push(len as u8);
    }
    out.extend_from_slice(atom);
}

fn next_byte(bytes: &[u8], cursor: &mut usize) -> Result<u8, ListenerError> {
    let byte = *bytes
        .get(*cursor)
        .ok_or_else(|| ListenerError::InvalidHex("unexpected end of program".into()))?;
    *cursor += 1;
    Ok(byte)
}
