//! Table lookups and the escape protocol.
//!
//! Every lookup answers with a table or `Fallback`; coding through a table
//! answers with a value or `NoneOfTheAbove`. Callers branch on both.

use std::collections::HashMap;
use std::io::{Read, Write};

use super::{Model, NONE_OF_THE_ABOVE};
use crate::bit_io::{BitReader, BitWriter};
use crate::context::ContextKey;
use crate::entropy_coding::CodeTable;
use crate::error::{CodecError, Result};
use crate::stats::StringHistogram;

/// Outcome of a table lookup
#[derive(Debug)]
pub enum Selection<'a, T> {
    Table(&'a T),
    /// no table for this context, use the fallback coding
    Fallback,
}

impl<'a, T> Selection<'a, T> {
    pub fn table(self) -> Option<&'a T> {
        match self {
            Selection::Table(table) => Some(table),
            Selection::Fallback => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Selection::Fallback)
    }
}

impl<T> Clone for Selection<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Selection<'_, T> {}

impl<'a, T> From<Option<&'a T>> for Selection<'a, T> {
    fn from(table: Option<&'a T>) -> Self {
        table.map_or(Selection::Fallback, Selection::Table)
    }
}

/// A symbol coded through a table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Symbol {
    Value(u64),
    /// the escape; the real value follows through the fallback path
    NoneOfTheAbove,
}

impl Symbol {
    fn from_raw(raw: u64) -> Self {
        if raw == NONE_OF_THE_ABOVE {
            Symbol::NoneOfTheAbove
        } else {
            Symbol::Value(raw)
        }
    }
}

/// Which table codes the next opcode and operand count
#[derive(Clone, Copy, Debug)]
pub enum OpcodeTable<'a> {
    /// conditioned on the previous opcode, escapes to the global table
    Markov(&'a CodeTable),
    /// escapes to raw opcode and operand count
    Global(&'a CodeTable),
}

impl<'a> OpcodeTable<'a> {
    pub fn table(self) -> &'a CodeTable {
        match self {
            OpcodeTable::Markov(table) | OpcodeTable::Global(table) => table,
        }
    }
}

/// Code table over indices into a string vocabulary
#[derive(Debug)]
pub struct StringTable {
    vocabulary: Vec<String>,
    indices: HashMap<String, u64>,
    table: CodeTable,
}

impl StringTable {
    pub fn build(hist: &StringHistogram) -> Result<Self> {
        let (vocabulary, indexed) = hist.indexed()?;
        let table = CodeTable::build(&indexed)?;
        let indices = (0..).zip(&vocabulary).map(|(index, string)| (string.clone(), index)).collect();
        Ok(Self { vocabulary, indices, table })
    }

    pub fn index_of(&self, string: &str) -> Option<u64> {
        self.indices.get(string).copied()
    }

    pub fn string_at(&self, index: u64) -> Option<&str> {
        let index = usize::try_from(index).ok()?;
        self.vocabulary.get(index).map(String::as_str)
    }

    pub fn table(&self) -> &CodeTable {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }
}

impl Model {
    pub fn global_opcode_and_num_operands_table(&self) -> &CodeTable {
        &self.opcode_and_num_operands
    }

    /// `None` for opcodes without a Markov table and on tiers without Markov tables
    pub fn markov_opcode_and_num_operands_table(&self, prev_opcode: u16) -> Option<&CodeTable> {
        self.opcode_and_num_operands_markov.get(&prev_opcode)
    }

    /// The Markov table for `prev_opcode` when there is one, else the global table
    pub fn opcode_and_num_operands_table(&self, prev_opcode: Option<u16>) -> OpcodeTable<'_> {
        match prev_opcode.and_then(|prev| self.markov_opcode_and_num_operands_table(prev)) {
            Some(markov) => OpcodeTable::Markov(markov),
            None => OpcodeTable::Global(&self.opcode_and_num_operands),
        }
    }

    pub fn non_id_word_table(&self, key: ContextKey) -> Selection<'_, CodeTable> {
        self.non_id_words.get(&key).into()
    }

    pub fn literal_string_table(&self, key: ContextKey) -> Selection<'_, StringTable> {
        self.literal_strings.get(&key).into()
    }

    pub fn descriptor_has_coding_scheme(&self, descriptor: u64) -> bool {
        self.descriptors_with_coding_scheme.contains(&descriptor)
    }

    /// Descriptors outside the coverage set go straight to the fallback
    /// without touching the descriptor tables
    pub fn id_descriptor_table(&self, descriptor: u64) -> Selection<'_, CodeTable> {
        if !self.descriptor_has_coding_scheme(descriptor) {
            return Selection::Fallback;
        }
        #[cfg(test)]
        lookups::count();
        self.id_descriptors.get(&descriptor).into()
    }
}

/// Codes `value` through `table`, or the escape when the table does not cover it.
///
/// `Unencodable` when neither the value nor the escape is covered.
pub fn encode_symbol<W: Write>(
    table: &CodeTable,
    value: Option<u64>,
    writer: &mut BitWriter<W>,
) -> Result<Symbol, CodecError> {
    if let Some(value) = value.filter(|&v| v != NONE_OF_THE_ABOVE && table.covers(v)) {
        table.encode(value, writer)?;
        return Ok(Symbol::Value(value));
    }
    if table.covers(NONE_OF_THE_ABOVE) {
        table.encode(NONE_OF_THE_ABOVE, writer)?;
        return Ok(Symbol::NoneOfTheAbove);
    }
    Err(CodecError::Unencodable { symbol: value.unwrap_or(NONE_OF_THE_ABOVE) })
}

pub fn decode_symbol<R: Read>(table: &CodeTable, reader: &mut BitReader<R>) -> Result<Symbol, CodecError> {
    table.decode(reader).map(Symbol::from_raw)
}
