use std::io;
use thiserror::Error;

pub type Result<T, E = ModelError> = std::result::Result<T, E>;

/// Errors raised while building or binding a model
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("context out of range: opcode {opcode}, operand count {operand_count}")]
    InvalidContext { opcode: u32, operand_count: u32 },
    #[error("malformed statistics: {0}")]
    MalformedStatistics(String),
    #[error("incompatible model version: got v{found}, model has v{expected}")]
    IncompatibleModelVersion { expected: u16, found: u16 },
    #[error("incompatible model tier: stream has tag {found}, model has tag {expected}")]
    IncompatibleModelTier { expected: u8, found: u8 },
}

impl ModelError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedStatistics(reason.into())
    }
}

/// Errors raised by an encode or decode session
#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("unexpected end of compressed stream")]
    UnexpectedEof,
    #[error("not a compressed instruction stream")]
    BadMagic,
    #[error("symbol {symbol} is not covered by the selected table and the table has no escape")]
    Unencodable { symbol: u64 },
    #[error("header announced {announced} instructions, {written} were encoded")]
    CountMismatch { announced: u64, written: u64 },
    #[error("corrupt stream: {0}")]
    Corrupt(&'static str),
}
