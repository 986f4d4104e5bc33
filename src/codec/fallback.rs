//! Table-free codings for values no table covers

use std::io::{Read, Write};

use super::ids::IdTracker;
use crate::bit_io::{BitReader, BitWriter};
use crate::context::ContextKey;
use crate::error::CodecError;
use crate::models::FallbackStrategy;

const OPCODE_BITS: u8 = 16;
const OPERAND_COUNT_BITS: u8 = 16;
const SHORT_DESCRIPTOR_BITS: u8 = 8;

pub(crate) fn encode_context<W: Write>(key: ContextKey, writer: &mut BitWriter<W>) -> Result<(), CodecError> {
    writer.write_bits(u64::from(key.opcode()), OPCODE_BITS)?;
    writer.write_bits(u64::from(key.operand_count()), OPERAND_COUNT_BITS)?;
    Ok(())
}

pub(crate) fn decode_context<R: Read>(reader: &mut BitReader<R>) -> Result<ContextKey, CodecError> {
    let opcode = reader.read_bits(OPCODE_BITS)? as u16;
    let operand_count = reader.read_bits(OPERAND_COUNT_BITS)? as u16;
    Ok(ContextKey::pack(opcode, operand_count))
}

pub(crate) fn encode_word<W: Write>(word: u32, writer: &mut BitWriter<W>) -> Result<(), CodecError> {
    writer.write_varint(u64::from(word))?;
    Ok(())
}

pub(crate) fn decode_word<R: Read>(reader: &mut BitReader<R>) -> Result<u32, CodecError> {
    u32::try_from(reader.read_varint()?).map_err(|_| CodecError::Corrupt("word wider than 32 bits"))
}

pub(crate) fn encode_string<W: Write>(string: &str, writer: &mut BitWriter<W>) -> Result<(), CodecError> {
    writer.write_varint(string.len() as u64)?;
    for &byte in string.as_bytes() {
        writer.write_bits(u64::from(byte), 8)?;
    }
    Ok(())
}

pub(crate) fn decode_string<R: Read>(reader: &mut BitReader<R>) -> Result<String, CodecError> {
    let len = usize::try_from(reader.read_varint()?).map_err(|_| CodecError::Corrupt("string too long"))?;
    // the length is untrusted, let the vector grow as bytes arrive
    let mut bytes = Vec::with_capacity(len.min(4096));
    for _ in 0..len {
        bytes.push(reader.read_bits(8)? as u8);
    }
    String::from_utf8(bytes).map_err(|_| CodecError::Corrupt("string is not utf-8"))
}

/// Flag bit, then either a reference to a known identifier or a new one
pub(crate) fn encode_id<W: Write>(
    strategy: FallbackStrategy,
    ids: &IdTracker,
    id: u32,
    writer: &mut BitWriter<W>,
) -> Result<(), CodecError> {
    if !ids.is_known(id) {
        writer.write_bit(1)?;
        return encode_new_id(ids, id, writer);
    }
    writer.write_bit(0)?;
    match strategy {
        FallbackStrategy::ShortDescriptor => {
            let (short, rank) = ids.short_rank(id).ok_or(CodecError::Corrupt("identifier without a definition"))?;
            writer.write_bits(u64::from(short), SHORT_DESCRIPTOR_BITS)?;
            writer.write_varint(rank as u64)?;
        }
        FallbackStrategy::RuleBased => {
            let rank = ids.rank(id).ok_or(CodecError::Corrupt("identifier without a definition"))?;
            writer.write_varint(rank as u64)?;
        }
    }
    Ok(())
}

pub(crate) fn decode_id<R: Read>(
    strategy: FallbackStrategy,
    ids: &IdTracker,
    reader: &mut BitReader<R>,
) -> Result<u32, CodecError> {
    if reader.read_bit()? == 1 {
        return decode_new_id(ids, reader);
    }
    let id = match strategy {
        FallbackStrategy::ShortDescriptor => {
            let short = reader.read_bits(SHORT_DESCRIPTOR_BITS)? as u8;
            ids.by_short_rank(short, read_rank(reader)?)
        }
        FallbackStrategy::RuleBased => ids.by_rank(read_rank(reader)?),
    };
    id.ok_or(CodecError::Corrupt("identifier rank out of range"))
}

/// One bit for "next in sequence", otherwise the identifier as a varint
pub(crate) fn encode_new_id<W: Write>(ids: &IdTracker, id: u32, writer: &mut BitWriter<W>) -> Result<(), CodecError> {
    if id == ids.next_id() {
        writer.write_bit(1)?;
    } else {
        writer.write_bit(0)?;
        writer.write_varint(u64::from(id))?;
    }
    Ok(())
}

pub(crate) fn decode_new_id<R: Read>(ids: &IdTracker, reader: &mut BitReader<R>) -> Result<u32, CodecError> {
    let id = if reader.read_bit()? == 1 {
        ids.next_id()
    } else {
        u32::try_from(reader.read_varint()?).map_err(|_| CodecError::Corrupt("identifier wider than 32 bits"))?
    };
    if ids.is_known(id) {
        return Err(CodecError::Corrupt("new identifier is already defined"));
    }
    Ok(id)
}

fn read_rank<R: Read>(reader: &mut BitReader<R>) -> Result<usize, CodecError> {
    usize::try_from(reader.read_varint()?).map_err(|_| CodecError::Corrupt("identifier rank out of range"))
}
