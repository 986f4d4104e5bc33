use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModelError, Result};

/// Dense lookup key packing an opcode and its operand count
///
/// Layout is `opcode | (operand_count << 16)`, both halves 16 bits wide,
/// so distinct pairs never collide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextKey(u32);

impl ContextKey {
    /// Packs a context, failing with `InvalidContext` if either half needs more than 16 bits
    pub fn new(opcode: u32, operand_count: u32) -> Result<Self> {
        match (u16::try_from(opcode), u16::try_from(operand_count)) {
            (Ok(opcode), Ok(operand_count)) => Ok(Self::pack(opcode, operand_count)),
            _ => Err(ModelError::InvalidContext { opcode, operand_count }),
        }
    }

    pub const fn pack(opcode: u16, operand_count: u16) -> Self {
        Self(opcode as u32 | (operand_count as u32) << 16)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn opcode(self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    pub const fn operand_count(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// The key as a code table symbol
    pub fn symbol(self) -> u64 {
        u64::from(self.0)
    }

    /// Inverse of `symbol`, `None` for values wider than 32 bits
    pub fn from_symbol(symbol: u64) -> Option<Self> {
        u32::try_from(symbol).ok().map(Self)
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.opcode(), self.operand_count())
    }
}

/// Structural signature of an identifier slot: the instruction context plus
/// the operand position the identifier occupies.
///
/// Both sides know it before the identifier itself is coded.
pub fn slot_descriptor(key: ContextKey, operand_index: u16) -> u64 {
    u64::from(key.raw()) | u64::from(operand_index) << 32
}

/// Folds a descriptor to the 8 bits sent by the short descriptor fallback
pub fn short_descriptor(descriptor: u64) -> u8 {
    let folded = descriptor ^ (descriptor >> 32);
    let folded = folded ^ (folded >> 16);
    let folded = folded ^ (folded >> 8);
    (folded & 0xff) as u8
}
