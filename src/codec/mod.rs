/*!
Instruction stream coding on top of a `Model`

A stream starts with a header: the magic `OPMD`, the model version (16 bits),
the model tier tag (8 bits) and the instruction count (varint). A decoder
rejects a stream whose version or tier differs from its model before reading
any symbol.

Each instruction is its (opcode, operand count) context followed by its
operands, each a 2-bit kind tag and a value. Every value is first offered to
the table the model selects for it; values no table covers travel through
the fallback codings.
*/

mod fallback;
pub(crate) mod ids;

use std::io::{Read, Write};

use self::ids::{IdTracker, NEW_ID_SYMBOL};
use crate::bit_io::{BitReader, BitWriter};
use crate::context::{slot_descriptor, ContextKey};
use crate::error::CodecError;
use crate::instruction::{Instruction, Operand};
use crate::models::{decode_symbol, encode_symbol, Model, OpcodeTable, Selection, Symbol};

const MAGIC: u32 = u32::from_be_bytes(*b"OPMD");
const MAGIC_BITS: u8 = 32;
const VERSION_BITS: u8 = 16;
const TIER_BITS: u8 = 8;

/// One encode session. Sessions keep their own history and only borrow the model.
pub struct Encoder<'m, W: Write> {
    model: &'m Model,
    writer: BitWriter<W>,
    prev_opcode: Option<u16>,
    ids: IdTracker,
    announced: u64,
    written: u64,
}

impl<'m, W: Write> Encoder<'m, W> {
    /// Writes the header; exactly `instruction_count` instructions must follow
    pub fn new(model: &'m Model, inner: W, instruction_count: u64) -> Result<Self, CodecError> {
        let mut writer = BitWriter::new(inner);
        writer.write_bits(u64::from(MAGIC), MAGIC_BITS)?;
        writer.write_bits(u64::from(model.version()), VERSION_BITS)?;
        writer.write_bits(u64::from(model.tier().tag()), TIER_BITS)?;
        writer.write_varint(instruction_count)?;
        Ok(Self {
            model,
            writer,
            prev_opcode: None,
            ids: IdTracker::default(),
            announced: instruction_count,
            written: 0,
        })
    }

    pub fn encode_instruction(&mut self, inst: &Instruction) -> Result<(), CodecError> {
        if self.written == self.announced {
            return Err(CodecError::CountMismatch { announced: self.announced, written: self.written + 1 });
        }
        let key = inst.context()?;
        self.encode_context(key)?;
        for (index, operand) in (0..=u16::MAX).zip(&inst.operands) {
            self.writer.write_bits(u64::from(operand.tag()), Operand::TAG_BITS)?;
            match operand {
                Operand::Word(word) => self.encode_word(key, *word)?,
                Operand::Id(id) => self.encode_id(key, index, *id)?,
                Operand::String(string) => self.encode_string(key, string)?,
            }
        }
        self.prev_opcode = Some(inst.opcode);
        self.written += 1;
        Ok(())
    }

    pub fn bits_written(&self) -> u64 {
        self.writer.bits_written()
    }

    /// Pads the last byte and hands back the inner writer
    pub fn finish(self) -> Result<W, CodecError> {
        if self.written != self.announced {
            return Err(CodecError::CountMismatch { announced: self.announced, written: self.written });
        }
        Ok(self.writer.finish()?)
    }

    fn encode_context(&mut self, key: ContextKey) -> Result<(), CodecError> {
        let symbol = key.symbol();
        if let OpcodeTable::Markov(markov) = self.model.opcode_and_num_operands_table(self.prev_opcode) {
            if let Symbol::Value(_) = encode_symbol(markov, Some(symbol), &mut self.writer)? {
                return Ok(());
            }
        }
        let global = self.model.global_opcode_and_num_operands_table();
        match encode_symbol(global, Some(symbol), &mut self.writer)? {
            Symbol::Value(_) => Ok(()),
            Symbol::NoneOfTheAbove => fallback::encode_context(key, &mut self.writer),
        }
    }

    fn encode_word(&mut self, key: ContextKey, word: u32) -> Result<(), CodecError> {
        if let Selection::Table(words) = self.model.non_id_word_table(key) {
            if let Symbol::Value(_) = encode_symbol(words, Some(u64::from(word)), &mut self.writer)? {
                return Ok(());
            }
        }
        fallback::encode_word(word, &mut self.writer)
    }

    fn encode_string(&mut self, key: ContextKey, string: &str) -> Result<(), CodecError> {
        if let Selection::Table(strings) = self.model.literal_string_table(key) {
            if let Symbol::Value(_) = encode_symbol(strings.table(), strings.index_of(string), &mut self.writer)? {
                return Ok(());
            }
        }
        fallback::encode_string(string, &mut self.writer)
    }

    fn encode_id(&mut self, key: ContextKey, index: u16, id: u32) -> Result<(), CodecError> {
        let descriptor = slot_descriptor(key, index);
        let coded = match self.model.id_descriptor_table(descriptor) {
            Selection::Table(table) => match encode_symbol(table, Some(self.ids.table_symbol(id)), &mut self.writer)? {
                Symbol::Value(NEW_ID_SYMBOL) => {
                    fallback::encode_new_id(&self.ids, id, &mut self.writer)?;
                    true
                }
                Symbol::Value(_) => true,
                Symbol::NoneOfTheAbove => false,
            },
            Selection::Fallback => false,
        };
        if !coded {
            fallback::encode_id(self.model.fallback_strategy(), &self.ids, id, &mut self.writer)?;
        }
        self.ids.touch(id, descriptor);
        Ok(())
    }
}

/// One decode session, the mirror of `Encoder`
pub struct Decoder<'m, R: Read> {
    model: &'m Model,
    reader: BitReader<R>,
    prev_opcode: Option<u16>,
    ids: IdTracker,
    remaining: u64,
}

impl<'m, R: Read> Decoder<'m, R> {
    /// Reads the header and checks it against `model`
    pub fn new(model: &'m Model, inner: R) -> Result<Self, CodecError> {
        let mut reader = BitReader::new(inner);
        if reader.read_bits(MAGIC_BITS)? != u64::from(MAGIC) {
            return Err(CodecError::BadMagic);
        }
        let version = reader.read_bits(VERSION_BITS)? as u16;
        let tier_tag = reader.read_bits(TIER_BITS)? as u8;
        model.check_stream(version, tier_tag)?;
        let remaining = reader.read_varint()?;
        Ok(Self { model, reader, prev_opcode: None, ids: IdTracker::default(), remaining })
    }

    /// Instructions left according to the header
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// `None` once every announced instruction has been decoded
    pub fn decode_instruction(&mut self) -> Result<Option<Instruction>, CodecError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let key = self.decode_context()?;
        let mut operands = Vec::with_capacity(usize::from(key.operand_count()));
        for index in 0..key.operand_count() {
            let operand = match self.reader.read_bits(Operand::TAG_BITS)? as u8 {
                Operand::WORD_TAG => Operand::Word(self.decode_word(key)?),
                Operand::ID_TAG => Operand::Id(self.decode_id(key, index)?),
                Operand::STRING_TAG => Operand::String(self.decode_string(key)?),
                _ => return Err(CodecError::Corrupt("unknown operand kind")),
            };
            operands.push(operand);
        }
        self.prev_opcode = Some(key.opcode());
        self.remaining -= 1;
        Ok(Some(Instruction::new(key.opcode(), operands)))
    }

    fn decode_context(&mut self) -> Result<ContextKey, CodecError> {
        if let OpcodeTable::Markov(markov) = self.model.opcode_and_num_operands_table(self.prev_opcode) {
            if let Symbol::Value(symbol) = decode_symbol(markov, &mut self.reader)? {
                return context_of(symbol);
            }
        }
        let global = self.model.global_opcode_and_num_operands_table();
        match decode_symbol(global, &mut self.reader)? {
            Symbol::Value(symbol) => context_of(symbol),
            Symbol::NoneOfTheAbove => fallback::decode_context(&mut self.reader),
        }
    }

    fn decode_word(&mut self, key: ContextKey) -> Result<u32, CodecError> {
        if let Selection::Table(words) = self.model.non_id_word_table(key) {
            if let Symbol::Value(word) = decode_symbol(words, &mut self.reader)? {
                return u32::try_from(word).map_err(|_| CodecError::Corrupt("word wider than 32 bits"));
            }
        }
        fallback::decode_word(&mut self.reader)
    }

    fn decode_string(&mut self, key: ContextKey) -> Result<String, CodecError> {
        if let Selection::Table(strings) = self.model.literal_string_table(key) {
            if let Symbol::Value(index) = decode_symbol(strings.table(), &mut self.reader)? {
                let string = strings.string_at(index).ok_or(CodecError::Corrupt("string index out of range"))?;
                return Ok(string.to_owned());
            }
        }
        fallback::decode_string(&mut self.reader)
    }

    fn decode_id(&mut self, key: ContextKey, index: u16) -> Result<u32, CodecError> {
        let descriptor = slot_descriptor(key, index);
        let coded = match self.model.id_descriptor_table(descriptor) {
            Selection::Table(table) => match decode_symbol(table, &mut self.reader)? {
                Symbol::Value(NEW_ID_SYMBOL) => Some(fallback::decode_new_id(&self.ids, &mut self.reader)?),
                Symbol::Value(symbol) => {
                    Some(self.ids.by_table_symbol(symbol).ok_or(CodecError::Corrupt("identifier rank out of range"))?)
                }
                Symbol::NoneOfTheAbove => None,
            },
            Selection::Fallback => None,
        };
        let id = match coded {
            Some(id) => id,
            None => fallback::decode_id(self.model.fallback_strategy(), &self.ids, &mut self.reader)?,
        };
        self.ids.touch(id, descriptor);
        Ok(id)
    }
}

impl<R: Read> Iterator for Decoder<'_, R> {
    type Item = Result<Instruction, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.decode_instruction() {
            Ok(inst) => inst.map(Ok),
            Err(err) => {
                // a failed stream yields nothing more
                self.remaining = 0;
                Some(Err(err))
            }
        }
    }
}

fn context_of(symbol: u64) -> Result<ContextKey, CodecError> {
    ContextKey::from_symbol(symbol).ok_or(CodecError::Corrupt("context symbol wider than 32 bits"))
}

/// Encodes a whole stream with `model`
pub fn encode(model: &Model, stream: &[Instruction]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = Encoder::new(model, Vec::new(), stream.len() as u64)?;
    for inst in stream {
        encoder.encode_instruction(inst)?;
    }
    encoder.finish()
}

/// Decodes a stream written by `encode` with an equivalent model
pub fn decode(model: &Model, bytes: &[u8]) -> Result<Vec<Instruction>, CodecError> {
    Decoder::new(model, bytes)?.collect()
}
