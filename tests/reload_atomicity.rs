// tests/reload_atomicity.rs
//
// Hot reload semantics of the runtime state.
//
// Covered:
// - rejected reload leaves behaviour unchanged and reports every error
// - accepted reload changes behaviour for subsequent calls
// - cache is invalidated by a reload
// - reload from files (tempfile) and validate_rules
// - concurrent readers during reloads always see a complete rule set
// - file-watch hot reload picks up an edited rules file

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use meeting_tagger::tagging::{
    start_hot_reload_thread, EngineState, RawRuleSet, RuleBundle, RuntimeState, TagKind,
    TaggingError,
};
use meeting_tagger::TaggingConfig;

fn bundle(yaml: &str) -> RuleBundle {
    RuleBundle::from_rules(RawRuleSet::from_yaml_str(yaml).expect("yaml"))
}

const V1: &str = r#"
Finance/IFRS: ["ifrs"]
Topic/Risk: ["risk"]
"#;

const V2: &str = r#"
Finance/IFRS: ["ifrs"]
Topic/Risk: ["risk"]
Topic/Deadline: ["deadline"]
"#;

const BROKEN: &str = r#"
Finance/IFRS: ["ifrs"]
Topic/Deadline: ["(deadline"]
Topic/Risk:
  patterns: ["risk"]
  weight: 42
"#;

#[test]
fn invalid_reload_keeps_previous_rules() {
    let st = RuntimeState::new(TaggingConfig::default());
    st.reload_with(&bundle(V1)).expect("v1");
    let text = "deadline risk for ifrs";
    let before = st.tag_text(text, TagKind::Meeting);

    let err = st.reload_with(&bundle(BROKEN)).unwrap_err();
    let errors = err.validation_errors().expect("validation error");
    assert_eq!(errors.len(), 2, "{errors:?}");
    assert!(errors.iter().any(|e| e.contains("Invalid regex in Topic/Deadline pattern 0")));
    assert!(errors.iter().any(|e| e.contains("Weight must be 0.0-10.0")));

    assert_eq!(st.version(), 1);
    assert_eq!(st.tag_text(text, TagKind::Meeting), before);
    assert_eq!(st.get_rules_stats().rules.total_rules, 2);
}

#[test]
fn valid_reload_changes_subsequent_calls_and_clears_cache() {
    let st = RuntimeState::new(TaggingConfig::default());
    st.reload_with(&bundle(V1)).expect("v1");
    let text = "deadline risk for ifrs";

    let old = st.tag_text(text, TagKind::Meeting);
    assert_eq!(old, vec!["Finance/IFRS", "Topic/Risk"]);
    assert_eq!(st.get_rules_stats().cache.size, 1);

    assert_eq!(st.reload_with(&bundle(V2)).expect("v2"), 3);
    assert_eq!(st.get_rules_stats().cache.size, 0);
    assert_eq!(
        st.tag_text(text, TagKind::Meeting),
        vec!["Finance/IFRS", "Topic/Deadline", "Topic/Risk"]
    );
    assert_eq!(st.version(), 2);
}

#[test]
fn reload_and_validate_from_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let rules = dir.path().join("rules.yaml");
    fs::write(&rules, V1).expect("write");

    let mut cfg = TaggingConfig::default();
    cfg.rules.path = rules.clone();
    let st = RuntimeState::from_config(cfg).expect("initial load");
    assert_eq!(st.state(), EngineState::Loaded);
    assert!(st.validate_rules().is_empty());

    fs::write(&rules, BROKEN).expect("write");
    assert_eq!(st.validate_rules().len(), 2);
    assert!(matches!(st.reload_rules(), Err(TaggingError::Validation(_))));
    assert_eq!(st.version(), 1);

    fs::remove_file(&rules).expect("remove");
    assert!(matches!(st.reload_rules(), Err(TaggingError::Io { .. })));
    assert_eq!(st.validate_rules().len(), 1);
    assert_eq!(st.state(), EngineState::Loaded);
}

#[test]
fn warnings_do_not_block_reload() {
    let st = RuntimeState::new(TaggingConfig::default());
    let messages = st.validate(&bundle("Flat: [\"x\"]"));
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("WARNING: "));
    assert_eq!(st.reload_with(&bundle("Flat: [\"x\"]")).expect("warn only"), 1);
}

#[test]
fn readers_never_see_a_partial_rule_set() {
    let st = Arc::new(RuntimeState::new(TaggingConfig::default()));
    st.reload_with(&bundle(V1)).expect("v1");

    let text = "deadline risk for ifrs";
    let v1: Vec<String> = vec!["Finance/IFRS".into(), "Topic/Risk".into()];
    let v2: Vec<String> = vec![
        "Finance/IFRS".into(),
        "Topic/Deadline".into(),
        "Topic/Risk".into(),
    ];

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let st = Arc::clone(&st);
            let (v1, v2) = (v1.clone(), v2.clone());
            thread::spawn(move || {
                for _ in 0..200 {
                    let got = st.tag_text(text, TagKind::Commit);
                    assert!(got == v1 || got == v2, "unexpected labels {got:?}");
                }
            })
        })
        .collect();

    for i in 0..20 {
        let yaml = if i % 2 == 0 { V2 } else { V1 };
        st.reload_with(&bundle(yaml)).expect("reload");
        let _ = st.reload_with(&bundle(BROKEN));
    }

    for r in readers {
        r.join().expect("reader thread");
    }
    assert_eq!(st.version(), 21);
}

#[serial_test::serial]
#[test]
fn file_watch_reloads_edited_rules() {
    let dir = tempfile::tempdir().expect("tempdir");
    let rules = dir.path().join("rules.yaml");
    fs::write(&rules, V1).expect("write");
    fs::File::options()
        .write(true)
        .open(&rules)
        .and_then(|f| f.set_modified(SystemTime::now() - Duration::from_secs(30)))
        .expect("backdate mtime");

    let mut cfg = TaggingConfig::default();
    cfg.rules.path = rules.clone();
    let st = Arc::new(RuntimeState::from_config(cfg).expect("initial load"));
    assert_eq!(st.version(), 1);

    std::env::set_var("TAGGING_HOT_RELOAD", "1");
    start_hot_reload_thread(Arc::clone(&st));
    std::env::remove_var("TAGGING_HOT_RELOAD");

    fs::write(&rules, V2).expect("rewrite");
    let mut waited = Duration::ZERO;
    while st.version() == 1 && waited < Duration::from_secs(10) {
        thread::sleep(Duration::from_millis(100));
        waited += Duration::from_millis(100);
    }

    assert_eq!(st.version(), 2, "rules file change not picked up");
    assert_eq!(
        st.tag_text("deadline risk for ifrs", TagKind::Meeting),
        vec!["Finance/IFRS", "Topic/Deadline", "Topic/Risk"]
    );
}
