mod selection;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

pub use self::selection::{decode_symbol, encode_symbol, OpcodeTable, Selection, StringTable, Symbol};
use crate::context::ContextKey;
use crate::entropy_coding::CodeTable;
use crate::error::{ModelError, Result};
use crate::stats::StatisticsBundle;

/// Reserved symbol meaning "the value is not covered by this table"
pub const NONE_OF_THE_ABOVE: u64 = 1_111_111_111_111_111_111;

/// Version of the models this crate builds by default
pub const MODEL_VERSION: u16 = 1;

/// Model tiers, from the smallest to the most precise
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Lite,
    Mid,
    Max,
}

/// How identifiers without a usable table are coded
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FallbackStrategy {
    /// 8-bit digest of the defining slot plus a rank among its identifiers
    ShortDescriptor,
    /// recency rank among all identifiers
    RuleBased,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Lite, Tier::Mid, Tier::Max];

    /// Whether the tier fills the Markov table slot
    pub const fn uses_markov(self) -> bool {
        matches!(self, Tier::Max)
    }

    /// Whether the tier fills the word, identifier and string table slots
    pub const fn uses_context_tables(self) -> bool {
        matches!(self, Tier::Mid | Tier::Max)
    }

    pub const fn fallback_strategy(self) -> FallbackStrategy {
        match self {
            Tier::Lite | Tier::Mid => FallbackStrategy::ShortDescriptor,
            Tier::Max => FallbackStrategy::RuleBased,
        }
    }

    /// Tag written to stream headers
    pub const fn tag(self) -> u8 {
        match self {
            Tier::Lite => 0,
            Tier::Mid => 1,
            Tier::Max => 2,
        }
    }

    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Tier::Lite),
            1 => Some(Tier::Mid),
            2 => Some(Tier::Max),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Tier::Lite => "lite",
            Tier::Mid => "mid",
            Tier::Max => "max",
        })
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lite" => Ok(Tier::Lite),
            "mid" => Ok(Tier::Mid),
            "max" => Ok(Tier::Max),
            _ => Err(format!("unknown tier {s:?}, expected lite, mid or max")),
        }
    }
}

/// Number of tables in each optional slot of a model
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub markov: usize,
    pub non_id_words: usize,
    pub id_descriptors: usize,
    pub literal_strings: usize,
}

/// An immutable set of code tables for one tier.
///
/// Built once from a `StatisticsBundle`, then shared read-only between any
/// number of encode and decode sessions.
#[derive(Debug)]
pub struct Model {
    tier: Tier,
    version: u16,
    opcode_and_num_operands: CodeTable,
    opcode_and_num_operands_markov: HashMap<u16, CodeTable>,
    non_id_words: HashMap<ContextKey, CodeTable>,
    id_descriptors: HashMap<u64, CodeTable>,
    descriptors_with_coding_scheme: HashSet<u64>,
    literal_strings: HashMap<ContextKey, StringTable>,
}

impl Model {
    /// Builds a `MODEL_VERSION` model of `tier`
    pub fn new(tier: Tier, bundle: &StatisticsBundle) -> Result<Self> {
        Self::with_version(tier, MODEL_VERSION, bundle)
    }

    /// Builds the tables `tier` consumes; the rest of the bundle is ignored.
    ///
    /// The bundle must have been collected for `version`.
    pub fn with_version(tier: Tier, version: u16, bundle: &StatisticsBundle) -> Result<Self> {
        let model = Self::build(tier, version, bundle);
        match &model {
            Ok(model) => {
                let counts = model.table_counts();
                tracing::debug!(
                    "Built {} model v{}: {} opcode symbols, {} markov, {} word, {} descriptor, {} string tables",
                    tier,
                    model.version,
                    model.opcode_and_num_operands.symbol_count(),
                    counts.markov,
                    counts.non_id_words,
                    counts.id_descriptors,
                    counts.literal_strings
                );
            }
            Err(err) => tracing::warn!("Rejected statistics for {} model: {}", tier, err),
        }
        model
    }

    pub fn lite(bundle: &StatisticsBundle) -> Result<Self> {
        Self::new(Tier::Lite, bundle)
    }

    pub fn mid(bundle: &StatisticsBundle) -> Result<Self> {
        Self::new(Tier::Mid, bundle)
    }

    pub fn max(bundle: &StatisticsBundle) -> Result<Self> {
        Self::new(Tier::Max, bundle)
    }

    fn build(tier: Tier, version: u16, bundle: &StatisticsBundle) -> Result<Self> {
        if bundle.version != version {
            return Err(ModelError::IncompatibleModelVersion { expected: version, found: bundle.version });
        }

        let opcode_and_num_operands = CodeTable::build(&bundle.opcode_and_num_operands)
            .map_err(|err| in_table(err, "opcode table", "global"))?;

        let opcode_and_num_operands_markov = if tier.uses_markov() {
            build_tables(&bundle.opcode_and_num_operands_markov, "markov table after opcode", CodeTable::build)?
        } else {
            HashMap::new()
        };

        let (non_id_words, id_descriptors, descriptors_with_coding_scheme, literal_strings) =
            if tier.uses_context_tables() {
                bundle.check_descriptor_coverage()?;
                (
                    build_tables(&bundle.non_id_words, "word table for", CodeTable::build)?,
                    build_tables(&bundle.id_descriptors, "identifier table for descriptor", CodeTable::build)?,
                    bundle.descriptors_with_coding_scheme.iter().copied().collect(),
                    build_tables(&bundle.literal_strings, "string table for", StringTable::build)?,
                )
            } else {
                Default::default()
            };

        Ok(Self {
            tier,
            version,
            opcode_and_num_operands,
            opcode_and_num_operands_markov,
            non_id_words,
            id_descriptors,
            descriptors_with_coding_scheme,
            literal_strings,
        })
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn fallback_strategy(&self) -> FallbackStrategy {
        self.tier.fallback_strategy()
    }

    pub fn table_counts(&self) -> TableCounts {
        TableCounts {
            markov: self.opcode_and_num_operands_markov.len(),
            non_id_words: self.non_id_words.len(),
            id_descriptors: self.id_descriptors.len(),
            literal_strings: self.literal_strings.len(),
        }
    }

    /// Rejects streams written by a model of another version or tier
    pub fn check_stream(&self, version: u16, tier_tag: u8) -> Result<()> {
        if version != self.version {
            tracing::error!("Stream has model version {}, expected {}", version, self.version);
            return Err(ModelError::IncompatibleModelVersion { expected: self.version, found: version });
        }
        if tier_tag != self.tier.tag() {
            tracing::error!("Stream has model tier tag {}, expected {}", tier_tag, self.tier.tag());
            return Err(ModelError::IncompatibleModelTier { expected: self.tier.tag(), found: tier_tag });
        }
        Ok(())
    }
}

/// Builds one table per key in parallel; results stay in key order so the
/// first failing key is reported deterministically
fn build_tables<K, H, T, F>(stats: &BTreeMap<K, H>, what: &str, build: F) -> Result<HashMap<K, T>>
where
    K: Copy + Ord + Hash + fmt::Display + Send + Sync,
    H: Sync,
    T: Send,
    F: Fn(&H) -> Result<T> + Sync,
{
    let built: Vec<(K, Result<T>)> = stats.par_iter().map(|(&key, hist)| (key, build(hist))).collect();
    built
        .into_iter()
        .map(|(key, table)| table.map(|table| (key, table)).map_err(|err| in_table(err, what, key)))
        .collect()
}

fn in_table(err: ModelError, what: &str, key: impl fmt::Display) -> ModelError {
    match err {
        ModelError::MalformedStatistics(reason) => ModelError::malformed(format!("{what} {key}: {reason}")),
        other => other,
    }
}

#[cfg(test)]
mod tests;
