use serde::{Deserialize, Serialize};

use crate::context::ContextKey;
use crate::error::{ModelError, Result};

/// A single operand of an instruction
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// Literal numeric or flag word
    Word(u32),
    /// Symbolic identifier
    Id(u32),
    /// Literal string
    String(String),
}

impl Operand {
    pub(crate) const WORD_TAG: u8 = 0;
    pub(crate) const ID_TAG: u8 = 1;
    pub(crate) const STRING_TAG: u8 = 2;
    pub(crate) const TAG_BITS: u8 = 2;

    pub(crate) fn tag(&self) -> u8 {
        match self {
            Operand::Word(_) => Self::WORD_TAG,
            Operand::Id(_) => Self::ID_TAG,
            Operand::String(_) => Self::STRING_TAG,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: u16,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(opcode: u16, operands: Vec<Operand>) -> Self {
        Self { opcode, operands }
    }

    /// Context key of this instruction, `InvalidContext` past 2^16 - 1 operands
    pub fn context(&self) -> Result<ContextKey> {
        let operand_count = u32::try_from(self.operands.len()).map_err(|_| ModelError::InvalidContext {
            opcode: u32::from(self.opcode),
            operand_count: u32::MAX,
        })?;
        ContextKey::new(u32::from(self.opcode), operand_count)
    }
}
