pub mod bit_io;
pub mod codec;
pub mod context;
pub mod entropy_coding;
pub mod error;
pub mod instruction;
pub mod models;
pub mod stats;

pub use codec::{decode, encode, Decoder, Encoder};
pub use context::ContextKey;
pub use error::{CodecError, ModelError};
pub use instruction::{Instruction, Operand};
pub use models::{FallbackStrategy, Model, OpcodeTable, Selection, Symbol, Tier, MODEL_VERSION, NONE_OF_THE_ABOVE};
pub use stats::{StatisticsBundle, StatsCollector};
