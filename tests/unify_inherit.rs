// tests/unify_inherit.rs
//
// Strategy fusion and meeting → commit inheritance through the public state.

use meeting_tagger::tagging::unify::dedup_fuse;
use meeting_tagger::tagging::{
    Category, Person, RawRuleSet, RuleBundle, RuntimeState, SynonymDictionary, TagKind, TagMode,
    TextMeta,
};
use meeting_tagger::TaggingConfig;

const RULES: &str = r#"
Finance/IFRS:
  patterns: ["\\bifrs\\b", "мсфо"]
  weight: 1.2
Business/Lavka: ["\\bлавк\\w*"]
"#;

fn synonyms() -> SynonymDictionary {
    let mut d = SynonymDictionary::new();
    d.insert("area/ifrs".into(), vec!["ifrs".into(), "мсфо".into()]);
    d.insert("area/audit".into(), vec!["аудит".into()]);
    d.insert("person/sasha_katanov".into(), vec!["катанов".into()]);
    d
}

fn state_with_mode(mode: TagMode) -> RuntimeState {
    let cfg = TaggingConfig {
        mode,
        ..TaggingConfig::default()
    };
    let st = RuntimeState::new(cfg);
    let bundle = RuleBundle::from_rules(RawRuleSet::from_yaml_str(RULES).expect("yaml"))
        .with_synonyms(synonyms())
        .with_people(vec![Person {
            name_en: "Valentin Dobrynin".into(),
            aliases: vec!["Валентин".into()],
        }]);
    st.reload_with(&bundle).expect("valid");
    st
}

fn strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

#[test]
fn same_concept_from_both_strategies_is_emitted_once_in_scored_spelling() {
    let (merged, m) = dedup_fuse(
        &strings(&["area/ifrs"]),
        &strings(&["Finance/Ifrs"]),
        Category::from_label,
    );
    assert_eq!(merged, vec!["Finance/Ifrs"]);
    assert_eq!(m.v1_priority_wins, 1);
}

#[test]
fn both_mode_merges_and_keeps_people_from_each_side() {
    let st = state_with_mode(TagMode::Both);
    let labels = st.tag_text(
        "Валентин и Катанов: аудит по МСФО для лавки",
        TagKind::Meeting,
    );
    assert_eq!(
        labels,
        vec![
            "People/Sasha Katanov",
            "People/Valentin Dobrynin",
            "Business/Lavka",
            "Finance/Audit",
            "Finance/IFRS",
        ]
    );
    assert_eq!(
        labels.iter().filter(|l| l.as_str() == "Finance/IFRS").count(),
        1
    );
}

#[test]
fn single_strategy_modes() {
    let text = "аудит по МСФО для лавки";

    let tokens_only = state_with_mode(TagMode::Tokens).tag_text(text, TagKind::Meeting);
    assert_eq!(tokens_only, vec!["Finance/Audit", "Finance/IFRS"]);

    let scored_only = state_with_mode(TagMode::Scored).tag_text(text, TagKind::Meeting);
    assert_eq!(scored_only, vec!["Business/Lavka", "Finance/IFRS"]);
}

#[test]
fn token_strategy_alone_keeps_its_own_naming() {
    let st = state_with_mode(TagMode::Both);
    let meta = TextMeta {
        title: String::new(),
        attendees: vec!["Sasha Katanov".into()],
    };
    assert_eq!(
        st.tag_text_tokens("аудит по МСФО", &meta),
        vec!["area/audit", "area/ifrs", "person/sasha_katanov"]
    );
    assert!(st.tag_text_tokens("", &TextMeta::default()).is_empty());
}

#[test]
fn commit_inherits_by_category() {
    let st = state_with_mode(TagMode::Both);
    let merged = st.merge_meeting_and_commit_tags(
        &strings(&["People/Alice", "Business/Lavka", "Finance/IFRS"]),
        &strings(&["Finance/Audit"]),
    );
    assert!(merged.contains(&"People/Alice".to_string()));
    assert!(merged.contains(&"Business/Lavka".to_string()));
    assert!(merged.contains(&"Finance/Audit".to_string()));
    assert!(!merged.contains(&"Finance/IFRS".to_string()));

    let stats = st.get_rules_stats();
    assert_eq!(stats.calls.inheritance.inherited_total, 2);
}

#[test]
fn commit_people_block_meeting_people() {
    let st = state_with_mode(TagMode::Both);
    let merged = st.merge_meeting_and_commit_tags(
        &strings(&["People/Alice", "Projects/EVM", "Misc/Internal"]),
        &strings(&["People/Bob"]),
    );
    assert_eq!(merged, vec!["People/Bob", "Projects/EVM"]);
}
