//! # flowtalk-pipeline
//!
//! The translation pipeline for FlowTalk: one inbound message becomes N
//! language-specific deliveries.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  TranslationPipeline (orchestrator)          │
//! │    in-flight dedup · bounded fan-out (8)     │
//! ├──────────────────────────────────────────────┤
//! │  ContentParser    mask/unmask ⟪P{i}⟫         │
//! │  LanguageDetector script + lexical + hi-rom  │
//! │  GlossaryProtector protect/restore ⟪G{j}⟫    │
//! ├──────────────────────────────────────────────┤
//! │  TranslationCache  sha256(normalized):target │
//! │  Translator        HTTPS / phrase table      │
//! ├──────────────────────────────────────────────┤
//! │  MessageRepository (implemented by the store)│
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use flowtalk_pipeline::{
//!     ContentParser, HttpTranslator, HttpTranslatorConfig, LanguageDetector,
//!     MemoryCache, ParserConfig, PipelineConfig, TranslationPipeline,
//! };
//!
//! let translator = Arc::new(HttpTranslator::new(HttpTranslatorConfig::new(
//!     api_key,
//!     "https://translate.example.com",
//! ))?);
//! let cache = Arc::new(MemoryCache::new(10_000, Duration::from_secs(3600)));
//! let pipeline = TranslationPipeline::new(
//!     ContentParser::new(ParserConfig::default()),
//!     LanguageDetector::new(),
//!     cache,
//!     translator,
//!     repository,
//!     PipelineConfig::default(),
//! );
//! ```

pub mod cache;
pub mod detector;
pub mod error;
pub mod fanout;
pub mod glossary;
pub mod lang;
pub mod orchestrator;
pub mod parser;
pub mod translator;

// ── re-exports ───────────────────────────────────────────────────────

pub use cache::{
    CacheStatsSnapshot, MemoryCache, NoopCache, TranslationCache, cache_key, normalize,
    spawn_cleanup,
};
pub use detector::{LanguageDetector, MixedDetection, MixedSegment};
pub use error::{PipelineError, Result};
pub use fanout::resolve_targets;
pub use glossary::{GlossaryEntry, GlossaryProtector, ProtectedTerm, TermCategory};
pub use lang::{Detection, Language};
pub use orchestrator::{
    MessageRepository, PipelineConfig, PipelineMessage, RunDisposition, TargetOutcome,
    TargetStatus, TranslationPipeline, TranslationSummary,
};
pub use parser::{ContentParser, MaskedContent, ParserConfig, Segment, SegmentKind};
pub use translator::{
    HttpTranslator, HttpTranslatorConfig, PhraseTableTranslator, Translator,
};
