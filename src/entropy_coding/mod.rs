pub mod package_merge;

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};

use self::package_merge::{canonical, first_codes, length_counts, package_merge_sorted};
use crate::bit_io::{BitReader, BitWriter};
use crate::error::{CodecError, ModelError, Result};

/// Longest code a table may assign
pub const MAX_CODE_LEN: u8 = 32;

/// Weighted symbol counts, symbol -> weight
pub type Histogram = BTreeMap<u64, u64>;

/// A prefix code word, `len` low bits of `bits` sent high bit first
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Code {
    pub bits: u64,
    pub len: u8,
}

/// Canonical, length-limited prefix code over u64 symbols.
///
/// Immutable once built; the same histogram always yields the same codes.
#[derive(Debug)]
pub struct CodeTable {
    codes: HashMap<u64, Code>,
    /// symbols ordered by (code length, symbol)
    symbols: Vec<u64>,
    /// per code length: first code, number of codes, index of the first symbol
    first_code: Vec<u64>,
    counts: Vec<u64>,
    first_index: Vec<usize>,
    max_len: u8,
}

impl CodeTable {
    pub fn build(histogram: &Histogram) -> Result<Self> {
        if histogram.is_empty() {
            return Err(ModelError::malformed("empty histogram"));
        }
        if let Some((symbol, _)) = histogram.iter().find(|(_, &weight)| weight == 0) {
            return Err(ModelError::malformed(format!("symbol {symbol} has zero weight")));
        }
        if histogram.values().try_fold(0u64, |acc, &w| acc.checked_add(w)).is_none() {
            return Err(ModelError::malformed("total weight overflows 64 bits"));
        }
        if (histogram.len() as u64) > 1 << MAX_CODE_LEN {
            return Err(ModelError::malformed("too many symbols for the code length limit"));
        }

        // ascending weight, ties keep symbol order (stable sort over BTreeMap order)
        let mut by_weight: Vec<(u64, u64)> = histogram.iter().map(|(&s, &w)| (s, w)).collect();
        by_weight.sort_by_key(|&(_, weight)| weight);
        let weights: Vec<u64> = by_weight.iter().map(|&(_, weight)| weight).collect();
        let sorted_lens = package_merge_sorted(&weights, MAX_CODE_LEN);

        let lens: BTreeMap<u64, u8> = by_weight.iter().map(|&(s, _)| s).zip(sorted_lens).collect();
        let symbols: Vec<u64> = lens.keys().copied().collect();
        let code_lens: Vec<u8> = lens.values().copied().collect();
        Ok(Self::from_code_lens(&symbols, &code_lens))
    }

    /// `symbols` ascending, `code_lens` parallel to it
    fn from_code_lens(symbols: &[u64], code_lens: &[u8]) -> Self {
        let codes = symbols
            .iter()
            .copied()
            .zip(canonical(code_lens))
            .map(|(symbol, (bits, len))| (symbol, Code { bits, len }))
            .collect();

        let max_len = code_lens.iter().copied().max().unwrap_or(0);
        let counts = length_counts(code_lens, max_len);
        let first_code = first_codes(code_lens, max_len);
        let mut first_index = Vec::with_capacity(counts.len());
        let mut seen = 0;
        for &count in &counts {
            first_index.push(seen);
            seen += count as usize;
        }

        let mut by_code: Vec<(u8, u64)> = code_lens.iter().copied().zip(symbols.iter().copied()).collect();
        by_code.sort_unstable();
        let symbols = by_code.into_iter().map(|(_, symbol)| symbol).collect();

        Self { codes, symbols, first_code, counts, first_index, max_len }
    }

    pub fn covers(&self, symbol: u64) -> bool {
        self.codes.contains_key(&symbol)
    }

    pub fn code(&self, symbol: u64) -> Option<Code> {
        self.codes.get(&symbol).copied()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn max_code_len(&self) -> u8 {
        self.max_len
    }

    /// Symbols in code order (shortest codes first)
    pub fn symbols(&self) -> impl Iterator<Item = u64> + '_ {
        self.symbols.iter().copied()
    }

    pub fn encode<W: Write>(&self, symbol: u64, writer: &mut BitWriter<W>) -> Result<(), CodecError> {
        let code = self.code(symbol).ok_or(CodecError::Unencodable { symbol })?;
        writer.write_bits(code.bits, code.len)?;
        Ok(())
    }

    pub fn decode<R: Read>(&self, reader: &mut BitReader<R>) -> Result<u64, CodecError> {
        // single symbol tables use a zero length code
        if self.max_len == 0 {
            return self.symbols.first().copied().ok_or(CodecError::Corrupt("empty code table"));
        }

        let mut code: u64 = 0;
        for len in 1..=usize::from(self.max_len) {
            code = (code << 1) | u64::from(reader.read_bit()?);
            let offset = code.wrapping_sub(self.first_code[len]);
            if offset < self.counts[len] {
                let index = self.first_index[len] + offset as usize;
                return self.symbols.get(index).copied().ok_or(CodecError::Corrupt("code out of range"));
            }
        }
        Err(CodecError::Corrupt("invalid prefix code"))
    }
}
