// src/tagging/mod.rs
//! Tagging engine: rule store and compiler, the two matching strategies,
//! the unifier, meeting → commit inheritance and the hot-reloadable runtime state.

pub mod cache;
pub mod catalog;
pub mod category;
pub mod compiler;
pub mod error;
pub mod inherit;
pub mod scored;
pub mod state;
pub mod stats;
pub mod store;
pub mod tokens;
pub mod unify;

pub use catalog::{smart_sync, CatalogRule, HttpCatalog, RuleCatalog, SyncOutcome, SyncSource};
pub use category::{comparison_key, Category, InheritancePolicy};
pub use compiler::{CompileLimits, RuleSetSnapshot, ValidationReport};
pub use error::TaggingError;
pub use scored::ScoredTag;
pub use state::{
    spawn_cache_housekeeping, start_hot_reload_thread, EngineState, RuntimeState, TagKind,
};
pub use stats::TaggingStats;
pub use store::{BundlePaths, Person, RawRuleSet, RuleBundle, SynonymDictionary, TagRule};
pub use tokens::TextMeta;
pub use unify::{DedupMetrics, Strategy, TagMode};
