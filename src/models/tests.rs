use super::selection::lookups;
use super::*;
use crate::bit_io::{BitReader, BitWriter};
use crate::context::slot_descriptor;
use crate::error::CodecError;
use crate::stats::{Histogram, StringHistogram};

const KEY: ContextKey = ContextKey::pack(12, 3);
const OTHER: ContextKey = ContextKey::pack(7, 1);

fn with_escape(pairs: &[(u64, u64)]) -> Histogram {
    pairs.iter().copied().chain([(NONE_OF_THE_ABOVE, 1)]).collect()
}

fn bundle() -> StatisticsBundle {
    let descriptor = slot_descriptor(KEY, 0);
    let mut bundle = StatisticsBundle { version: MODEL_VERSION, ..Default::default() };
    bundle.opcode_and_num_operands = with_escape(&[(KEY.symbol(), 50), (OTHER.symbol(), 20)]);
    bundle.opcode_and_num_operands_markov.insert(12, [(OTHER.symbol(), 9)].into());
    bundle.non_id_words.insert(KEY, with_escape(&[(0, 10), (1, 5)]));
    bundle.id_descriptors.insert(descriptor, with_escape(&[(0, 8), (1, 3)]));
    bundle.descriptors_with_coding_scheme.insert(descriptor);
    bundle.literal_strings.insert(
        KEY,
        StringHistogram { strings: [("main".to_string(), 4), ("entry".to_string(), 2)].into(), none_of_the_above: Some(1) },
    );
    bundle
}

fn code(table: &CodeTable, values: &[Option<u64>]) -> (Vec<Symbol>, Vec<Symbol>) {
    let mut writer = BitWriter::new(Vec::new());
    let encoded: Vec<Symbol> = values.iter().map(|&v| encode_symbol(table, v, &mut writer).unwrap()).collect();
    let bytes = writer.finish().unwrap();
    let mut reader = BitReader::new(bytes.as_slice());
    let decoded = values.iter().map(|_| decode_symbol(table, &mut reader).unwrap()).collect();
    (encoded, decoded)
}

#[test]
fn tiers_fill_their_own_slots() {
    let bundle = bundle();
    let lite = Model::lite(&bundle).unwrap();
    let mid = Model::mid(&bundle).unwrap();
    let max = Model::max(&bundle).unwrap();

    assert_eq!(lite.table_counts(), TableCounts::default());
    assert_eq!(
        mid.table_counts(),
        TableCounts { markov: 0, non_id_words: 1, id_descriptors: 1, literal_strings: 1 }
    );
    assert_eq!(
        max.table_counts(),
        TableCounts { markov: 1, non_id_words: 1, id_descriptors: 1, literal_strings: 1 }
    );

    assert_eq!(lite.fallback_strategy(), FallbackStrategy::ShortDescriptor);
    assert_eq!(mid.fallback_strategy(), FallbackStrategy::ShortDescriptor);
    assert_eq!(max.fallback_strategy(), FallbackStrategy::RuleBased);
}

#[test]
fn lite_always_falls_back_outside_the_global_table() {
    let lite = Model::lite(&bundle()).unwrap();
    assert!(lite.non_id_word_table(KEY).is_fallback());
    assert!(lite.literal_string_table(KEY).is_fallback());
    assert!(lite.id_descriptor_table(slot_descriptor(KEY, 0)).is_fallback());
    assert!(lite.markov_opcode_and_num_operands_table(12).is_none());
}

#[test]
fn models_declare_their_own_version() {
    for tier in Tier::ALL {
        assert_eq!(Model::new(tier, &bundle()).unwrap().version(), MODEL_VERSION);
    }

    let mut bundle = bundle();
    bundle.version = 4;
    assert_eq!(Model::with_version(Tier::Max, 4, &bundle).unwrap().version(), 4);
}

#[test]
fn bundle_for_another_version_is_rejected() {
    let mut bundle = bundle();
    bundle.version = 7;
    for tier in Tier::ALL {
        assert!(matches!(
            Model::new(tier, &bundle),
            Err(ModelError::IncompatibleModelVersion { expected: MODEL_VERSION, found: 7 })
        ));
    }
    assert!(matches!(
        Model::with_version(Tier::Mid, 6, &bundle),
        Err(ModelError::IncompatibleModelVersion { expected: 6, found: 7 })
    ));
}

#[test]
fn global_table_covers_every_counted_context() {
    let model = Model::lite(&bundle()).unwrap();
    let table = model.global_opcode_and_num_operands_table();
    let values = [Some(KEY.symbol()), Some(OTHER.symbol()), Some(KEY.symbol())];
    let (encoded, decoded) = code(table, &values);
    assert_eq!(encoded, decoded);
    assert_eq!(decoded[0], Symbol::Value(196620));
}

#[test]
fn markov_table_is_preferred() {
    let model = Model::max(&bundle()).unwrap();
    assert!(matches!(model.opcode_and_num_operands_table(Some(12)), OpcodeTable::Markov(_)));
    assert!(matches!(model.opcode_and_num_operands_table(Some(7)), OpcodeTable::Global(_)));
    assert!(matches!(model.opcode_and_num_operands_table(None), OpcodeTable::Global(_)));

    // single symbol Markov table costs nothing
    let markov = model.opcode_and_num_operands_table(Some(12)).table();
    assert_eq!(markov.code(OTHER.symbol()).map(|c| c.len), Some(0));
}

#[test]
fn mid_ignores_markov_statistics() {
    let model = Model::mid(&bundle()).unwrap();
    assert!(matches!(model.opcode_and_num_operands_table(Some(12)), OpcodeTable::Global(_)));
}

#[test]
fn uncovered_values_escape() {
    let model = Model::mid(&bundle()).unwrap();
    let words = model.non_id_word_table(KEY).table().unwrap();
    let (encoded, decoded) = code(words, &[Some(1), Some(999), None]);
    assert_eq!(encoded, [Symbol::Value(1), Symbol::NoneOfTheAbove, Symbol::NoneOfTheAbove]);
    assert_eq!(decoded, encoded);
}

#[test]
fn escape_value_itself_is_never_coded_as_a_value() {
    let model = Model::mid(&bundle()).unwrap();
    let words = model.non_id_word_table(KEY).table().unwrap();
    let (encoded, _) = code(words, &[Some(NONE_OF_THE_ABOVE)]);
    assert_eq!(encoded, [Symbol::NoneOfTheAbove]);
}

#[test]
fn table_without_escape_is_unencodable() {
    let model = Model::max(&bundle()).unwrap();
    let markov = model.markov_opcode_and_num_operands_table(12).unwrap();
    let mut writer = BitWriter::new(Vec::new());
    let result = encode_symbol(markov, Some(KEY.symbol()), &mut writer);
    assert!(matches!(result, Err(CodecError::Unencodable { symbol: 196620 })));
}

#[test]
fn strings_code_vocabulary_indices() {
    let model = Model::mid(&bundle()).unwrap();
    let strings = model.literal_string_table(KEY).table().unwrap();
    assert_eq!(strings.len(), 2);
    let index = strings.index_of("main").unwrap();
    assert_eq!(strings.string_at(index), Some("main"));
    assert_eq!(strings.index_of("exit"), None);
    assert_eq!(strings.string_at(2), None);
}

#[test]
fn uncovered_descriptor_skips_the_table_lookup() {
    let model = Model::mid(&bundle()).unwrap();
    assert!(model.id_descriptor_table(slot_descriptor(OTHER, 0)).is_fallback());
    assert!(model.id_descriptor_table(slot_descriptor(KEY, 2)).is_fallback());
    assert_eq!(lookups::id_table_lookups(), 0);

    assert!(model.id_descriptor_table(slot_descriptor(KEY, 0)).table().is_some());
    assert_eq!(lookups::id_table_lookups(), 1);
}

#[test]
fn orphaned_descriptor_is_malformed() {
    let mut bundle = bundle();
    bundle.descriptors_with_coding_scheme.insert(slot_descriptor(OTHER, 0));
    let err = Model::mid(&bundle).unwrap_err();
    assert!(matches!(err, ModelError::MalformedStatistics(_)));
    // tiers that never read descriptor tables do not validate them
    assert!(Model::lite(&bundle).is_ok());
}

#[test]
fn empty_markov_histogram_only_breaks_max() {
    let mut bundle = bundle();
    bundle.opcode_and_num_operands_markov.insert(3, Histogram::new());
    assert!(Model::mid(&bundle).is_ok());
    let err = Model::max(&bundle).unwrap_err();
    assert!(matches!(err, ModelError::MalformedStatistics(ref msg) if msg.contains("after opcode 3")));
}

#[test]
fn empty_global_histogram_is_malformed() {
    let bundle = StatisticsBundle { version: MODEL_VERSION, ..Default::default() };
    for tier in Tier::ALL {
        assert!(matches!(Model::new(tier, &bundle), Err(ModelError::MalformedStatistics(_))));
    }
}

#[test]
fn first_bad_table_is_reported() {
    let mut bundle = bundle();
    bundle.non_id_words.insert(ContextKey::pack(1, 1), Histogram::new());
    bundle.non_id_words.insert(ContextKey::pack(2, 1), Histogram::new());
    for _ in 0..8 {
        let err = Model::mid(&bundle).unwrap_err();
        assert!(matches!(err, ModelError::MalformedStatistics(ref msg) if msg.contains("1/1")));
    }
}

#[test]
fn same_bundle_same_codes() {
    let bundle = bundle();
    let a = Model::max(&bundle).unwrap();
    let b = Model::max(&bundle).unwrap();
    let (ga, gb) = (a.global_opcode_and_num_operands_table(), b.global_opcode_and_num_operands_table());
    for symbol in [KEY.symbol(), OTHER.symbol(), NONE_OF_THE_ABOVE] {
        assert_eq!(ga.code(symbol), gb.code(symbol));
    }
}

#[test]
fn check_stream_reports_version_before_tier() {
    let mut bundle = bundle();
    bundle.version = 4;
    let model = Model::with_version(Tier::Mid, 4, &bundle).unwrap();
    assert!(model.check_stream(4, Tier::Mid.tag()).is_ok());
    assert!(matches!(
        model.check_stream(5, Tier::Max.tag()),
        Err(ModelError::IncompatibleModelVersion { expected: 4, found: 5 })
    ));
    assert!(matches!(
        model.check_stream(4, Tier::Max.tag()),
        Err(ModelError::IncompatibleModelTier { expected: 1, found: 2 })
    ));
}

#[test]
fn tier_names_and_tags() {
    for tier in Tier::ALL {
        assert_eq!(tier.to_string().parse::<Tier>(), Ok(tier));
        assert_eq!(Tier::from_tag(tier.tag()), Some(tier));
    }
    assert_eq!("MAX".parse::<Tier>(), Ok(Tier::Max));
    assert!("huge".parse::<Tier>().is_err());
    assert_eq!(Tier::from_tag(3), None);
    assert_eq!(serde_json::to_string(&Tier::Mid).unwrap(), r#""mid""#);
}
