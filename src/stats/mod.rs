mod collect;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub use self::collect::{CollectOptions, StatsCollector};
pub use crate::entropy_coding::Histogram;
use crate::context::ContextKey;
use crate::error::{ModelError, Result};
use crate::models::NONE_OF_THE_ABOVE;

/// Histogram over literal strings.
///
/// Tables built from it code vocabulary indices; `none_of_the_above` is the
/// weight of the escape symbol, if the table has one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringHistogram {
    pub strings: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub none_of_the_above: Option<u64>,
}

impl StringHistogram {
    /// Vocabulary in index order and the index histogram
    pub fn indexed(&self) -> Result<(Vec<String>, Histogram)> {
        if let Some((string, _)) = self.strings.iter().find(|(_, &weight)| weight == 0) {
            return Err(ModelError::malformed(format!("string {string:?} has zero weight")));
        }
        let vocabulary: Vec<String> = self.strings.keys().cloned().collect();
        let mut histogram: Histogram = (0..).zip(self.strings.values().copied()).collect();
        if let Some(weight) = self.none_of_the_above {
            histogram.insert(NONE_OF_THE_ABOVE, weight);
        }
        Ok((vocabulary, histogram))
    }
}

/// Offline statistics every model tier is built from.
///
/// Pure data: the model never reads files, callers materialize a bundle
/// (usually with `from_json`) and hand it over.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsBundle {
    pub version: u16,
    /// over packed (opcode, operand count) keys
    pub opcode_and_num_operands: Histogram,
    /// previous opcode -> histogram over packed keys
    pub opcode_and_num_operands_markov: BTreeMap<u16, Histogram>,
    pub non_id_words: BTreeMap<ContextKey, Histogram>,
    /// slot descriptor -> histogram over identifier symbols
    pub id_descriptors: BTreeMap<u64, Histogram>,
    pub descriptors_with_coding_scheme: BTreeSet<u64>,
    pub literal_strings: BTreeMap<ContextKey, StringHistogram>,
}

impl StatisticsBundle {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// The coverage set and the descriptor tables must name the same descriptors
    pub fn check_descriptor_coverage(&self) -> Result<()> {
        if let Some(orphan) = self
            .descriptors_with_coding_scheme
            .iter()
            .find(|d| !self.id_descriptors.contains_key(d))
        {
            return Err(ModelError::malformed(format!(
                "descriptor {orphan} has a coding scheme but no table"
            )));
        }
        if let Some(unlisted) = self
            .id_descriptors
            .keys()
            .find(|d| !self.descriptors_with_coding_scheme.contains(d))
        {
            return Err(ModelError::malformed(format!(
                "descriptor {unlisted} has a table but no coding scheme"
            )));
        }
        Ok(())
    }
}
