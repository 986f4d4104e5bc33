use std::collections::BTreeMap;

use super::{Histogram, StatisticsBundle, StringHistogram};
use crate::codec::ids::IdTracker;
use crate::context::{slot_descriptor, ContextKey};
use crate::error::Result;
use crate::instruction::{Instruction, Operand};
use crate::models::{MODEL_VERSION, NONE_OF_THE_ABOVE};

/// Knobs for turning raw counts into a bundle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectOptions {
    /// values seen fewer times than this are folded into the escape symbol
    pub min_count: u64,
    pub version: u16,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self { min_count: 1, version: MODEL_VERSION }
    }
}

/// Counts a training corpus into a `StatisticsBundle`.
///
/// Streams are walked exactly the way the encoder walks them, so every
/// symbol counted here is a symbol some table will be asked to code.
#[derive(Debug, Default)]
pub struct StatsCollector {
    opcode_and_num_operands: Histogram,
    markov: BTreeMap<u16, Histogram>,
    non_id_words: BTreeMap<ContextKey, Histogram>,
    id_descriptors: BTreeMap<u64, Histogram>,
    literal_strings: BTreeMap<ContextKey, BTreeMap<String, u64>>,
    instructions: u64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one stream; identifier history restarts with every stream
    pub fn add_stream(&mut self, stream: &[Instruction]) -> Result<()> {
        let mut ids = IdTracker::default();
        let mut prev_opcode = None;
        for inst in stream {
            let key = inst.context()?;
            *self.opcode_and_num_operands.entry(key.symbol()).or_default() += 1;
            if let Some(prev) = prev_opcode {
                *self.markov.entry(prev).or_default().entry(key.symbol()).or_default() += 1;
            }

            for (index, operand) in (0..=u16::MAX).zip(&inst.operands) {
                match operand {
                    Operand::Word(word) => {
                        let words = self.non_id_words.entry(key).or_default();
                        *words.entry(u64::from(*word)).or_default() += 1;
                    }
                    Operand::Id(id) => {
                        let descriptor = slot_descriptor(key, index);
                        let symbols = self.id_descriptors.entry(descriptor).or_default();
                        *symbols.entry(ids.table_symbol(*id)).or_default() += 1;
                        ids.touch(*id, descriptor);
                    }
                    Operand::String(string) => {
                        let strings = self.literal_strings.entry(key).or_default();
                        *strings.entry(string.clone()).or_default() += 1;
                    }
                }
            }
            prev_opcode = Some(inst.opcode);
            self.instructions += 1;
        }
        Ok(())
    }

    pub fn instruction_count(&self) -> u64 {
        self.instructions
    }

    pub fn finish(self, options: CollectOptions) -> StatisticsBundle {
        let min_count = options.min_count;
        let id_descriptors = prune_all(self.id_descriptors, min_count);
        let descriptors_with_coding_scheme = id_descriptors.keys().copied().collect();
        let literal_strings = self
            .literal_strings
            .into_iter()
            .map(|(key, strings)| (key, prune_strings(strings, min_count)))
            .collect();

        tracing::debug!(
            "Collected {} instructions, {} contexts, {} identifier slots",
            self.instructions,
            self.opcode_and_num_operands.len(),
            id_descriptors.len()
        );

        StatisticsBundle {
            version: options.version,
            opcode_and_num_operands: prune(self.opcode_and_num_operands, min_count),
            opcode_and_num_operands_markov: prune_all(self.markov, min_count),
            non_id_words: prune_all(self.non_id_words, min_count),
            id_descriptors,
            descriptors_with_coding_scheme,
            literal_strings,
        }
    }
}

/// Folds rare symbols into the escape weight; every table keeps an escape
fn prune(hist: Histogram, min_count: u64) -> Histogram {
    let (mut kept, rare): (Histogram, Histogram) = hist.into_iter().partition(|&(_, count)| count >= min_count);
    let escape: u64 = rare.values().sum();
    *kept.entry(NONE_OF_THE_ABOVE).or_default() += escape.max(1);
    kept
}

fn prune_all<K: Ord>(tables: BTreeMap<K, Histogram>, min_count: u64) -> BTreeMap<K, Histogram> {
    tables.into_iter().map(|(key, hist)| (key, prune(hist, min_count))).collect()
}

fn prune_strings(strings: BTreeMap<String, u64>, min_count: u64) -> StringHistogram {
    let (strings, rare): (BTreeMap<_, _>, BTreeMap<_, _>) =
        strings.into_iter().partition(|&(_, count)| count >= min_count);
    let escape: u64 = rare.values().sum();
    StringHistogram { strings, none_of_the_above: Some(escape.max(1)) }
}
