//! Pipeline orchestration — one inbound message, N language deliveries.
//!
//! [`TranslationPipeline::translate_message`] drives the full flow: claim
//! the message (`sent → translating`), mask protected spans once, then fan
//! out per target language behind a bounded worker pool.  Each target
//! independently checks the shared cache, calls the translator on a miss,
//! restores glossary terms and code spans, and appends its translation.
//! Per-target failures never sink the message; only a fan-out where every
//! target failed settles as `failed`.
//!
//! Concurrent invocations for the same message are collapsed by an
//! in-flight guard, and the store's conditional writes make duplicate
//! appends harmless, so the whole operation is safe to retry.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::{TranslationCache, cache_key};
use crate::detector::LanguageDetector;
use crate::error::{PipelineError, Result};
use crate::glossary::{GlossaryEntry, GlossaryProtector};
use crate::lang::{Detection, Language};
use crate::parser::ContentParser;
use crate::translator::Translator;

// ── repository seam ──────────────────────────────────────────────────

/// The slice of a stored message the pipeline needs.
#[derive(Debug, Clone)]
pub struct PipelineMessage {
    /// Message identifier.
    pub id: String,
    /// The channel (or DM thread) the message belongs to.
    pub channel_id: String,
    /// Original text, never rewritten.
    pub content: String,
    /// Language detected at creation.
    pub source_language: Language,
}

/// Persistence operations the orchestrator depends on.
///
/// The store implements this; tests substitute an in-memory double.  All
/// mutating operations are conditional so concurrent orchestrator runs
/// cannot corrupt state.
#[async_trait::async_trait]
pub trait MessageRepository: Send + Sync {
    /// Fetch the message, or `None` when it does not exist.
    async fn load(&self, message_id: &str) -> Result<Option<PipelineMessage>>;

    /// Compare-and-swap `sent → translating`.  Returns false when the
    /// message was not in `sent` (another run already claimed it).
    async fn begin_translating(&self, message_id: &str) -> Result<bool>;

    /// Insert a translation unless one already exists for this target.
    /// Returns false on the duplicate (the later writer's value is
    /// silently dropped).
    async fn append_translation(
        &self,
        message_id: &str,
        target: Language,
        content: &str,
    ) -> Result<bool>;

    /// Settle `translating → translated` (success) or `translating →
    /// failed`.
    async fn finish(&self, message_id: &str, success: bool) -> Result<()>;
}

// ── outcomes ─────────────────────────────────────────────────────────

/// How a single target language fared.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetStatus {
    /// A translation was produced (or an identical one already existed).
    Translated {
        /// True when the cache supplied the value with no external call.
        from_cache: bool,
    },
    /// The target failed after the adapter's retries.
    Failed {
        /// Human-readable failure cause, for logs and diagnostics.
        reason: String,
    },
}

/// Per-target record in a run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetOutcome {
    /// The target language.
    pub target: Language,
    /// What happened for it.
    pub status: TargetStatus,
}

/// Where the whole message ended up after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDisposition {
    /// The message settled as `translated`.
    Translated,
    /// Every target failed; the message settled as `failed`.
    Failed,
    /// Nothing to do: another run owned the message, or it had already
    /// been processed.
    Skipped,
}

/// Summary of one `translate_message` invocation.
#[derive(Debug, Clone)]
pub struct TranslationSummary {
    /// The message that was processed.
    pub message_id: String,
    /// How the run settled.
    pub disposition: RunDisposition,
    /// Per-target outcomes (empty when skipped or nothing applied).
    pub targets: Vec<TargetOutcome>,
}

// ── pipeline ─────────────────────────────────────────────────────────

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum simultaneous per-target translation tasks.
    pub max_concurrent_translations: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_translations: 8,
        }
    }
}

/// The long-lived pipeline instance, created at startup and shared.
pub struct TranslationPipeline {
    parser: Arc<ContentParser>,
    detector: Arc<LanguageDetector>,
    cache: Arc<dyn TranslationCache>,
    translator: Arc<dyn Translator>,
    repository: Arc<dyn MessageRepository>,
    semaphore: Arc<Semaphore>,
    in_flight: DashMap<String, ()>,
}

impl TranslationPipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        parser: ContentParser,
        detector: LanguageDetector,
        cache: Arc<dyn TranslationCache>,
        translator: Arc<dyn Translator>,
        repository: Arc<dyn MessageRepository>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            parser: Arc::new(parser),
            detector: Arc::new(detector),
            cache,
            translator,
            repository,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_translations.max(1))),
            in_flight: DashMap::new(),
        }
    }

    /// Validate `content` and detect its source language.
    ///
    /// Used at post time: protected spans are masked first so code and
    /// links never skew detection.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidContent`] for content that fails
    /// validation; such messages are rejected before they are stored.
    pub fn detect_source(&self, content: &str) -> Result<Detection> {
        let masked = self.parser.mask(content)?;
        Ok(self.detector.detect(&masked.masked))
    }

    /// Access the shared cache (stats endpoints, shutdown flush).
    pub fn cache(&self) -> &Arc<dyn TranslationCache> {
        &self.cache
    }

    /// Translate a stored message into every applicable target language.
    ///
    /// Idempotent: a message not in `sent` state, or one that is already
    /// being processed by a concurrent invocation, yields a `Skipped`
    /// summary without duplicate work.
    ///
    /// # Errors
    ///
    /// Only repository failures abort the run (leaving the message in its
    /// current state for a later retry).  Translator failures are captured
    /// per target.
    pub async fn translate_message(
        &self,
        message_id: &str,
        targets: &[Language],
        community_terms: Vec<GlossaryEntry>,
    ) -> Result<TranslationSummary> {
        // Collapse concurrent invocations for the same message.
        if self.in_flight.insert(message_id.to_string(), ()).is_some() {
            debug!(message_id, "translation already in flight, skipping");
            return Ok(TranslationSummary {
                message_id: message_id.to_string(),
                disposition: RunDisposition::Skipped,
                targets: Vec::new(),
            });
        }
        let result = self.translate_locked(message_id, targets, community_terms).await;
        self.in_flight.remove(message_id);
        result
    }

    async fn translate_locked(
        &self,
        message_id: &str,
        targets: &[Language],
        community_terms: Vec<GlossaryEntry>,
    ) -> Result<TranslationSummary> {
        let skipped = || TranslationSummary {
            message_id: message_id.to_string(),
            disposition: RunDisposition::Skipped,
            targets: Vec::new(),
        };

        // Claim the message; losing the race means another run owns it.
        if !self.repository.begin_translating(message_id).await? {
            debug!(message_id, "message not in `sent` state, skipping");
            return Ok(skipped());
        }

        let message = self
            .repository
            .load(message_id)
            .await?
            .ok_or_else(|| PipelineError::MessageNotFound {
                message_id: message_id.to_string(),
            })?;

        // Drop the source language and duplicates; `Language` is already
        // the supported set, so nothing else can slip through.
        let targets: Vec<Language> = {
            let mut seen = std::collections::BTreeSet::new();
            targets
                .iter()
                .copied()
                .filter(|t| *t != message.source_language && seen.insert(*t))
                .collect()
        };

        if targets.is_empty() {
            self.repository.finish(message_id, true).await?;
            return Ok(TranslationSummary {
                message_id: message_id.to_string(),
                disposition: RunDisposition::Translated,
                targets: Vec::new(),
            });
        }

        // Parse once; every target shares the masked form.
        let masked = self.parser.mask(&message.content)?;
        if !masked.has_translatable_text() {
            debug!(message_id, "message is entirely protected spans");
            self.repository.finish(message_id, true).await?;
            return Ok(TranslationSummary {
                message_id: message_id.to_string(),
                disposition: RunDisposition::Translated,
                targets: Vec::new(),
            });
        }

        // Glossary protection is deterministic, so it is applied once and
        // shared by every cache-missing target.
        let protector = Arc::new(GlossaryProtector::with_community(community_terms));
        let (gloss_masked, gloss_terms) = protector.protect(&masked.masked);
        let gloss_masked = Arc::new(gloss_masked);
        let gloss_terms = Arc::new(gloss_terms);
        let segments = Arc::new(masked.segments);
        let message = Arc::new(message);

        let mut tasks: JoinSet<TargetOutcome> = JoinSet::new();
        for target in targets {
            let semaphore = Arc::clone(&self.semaphore);
            let cache = Arc::clone(&self.cache);
            let translator = Arc::clone(&self.translator);
            let repository = Arc::clone(&self.repository);
            let parser = Arc::clone(&self.parser);
            let protector = Arc::clone(&protector);
            let gloss_masked = Arc::clone(&gloss_masked);
            let gloss_terms = Arc::clone(&gloss_terms);
            let segments = Arc::clone(&segments);
            let message = Arc::clone(&message);

            tasks.spawn(async move {
                // Closed on shutdown only; a closed semaphore means the
                // process is going away and the target simply fails.
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return TargetOutcome {
                            target,
                            status: TargetStatus::Failed {
                                reason: "worker pool shut down".into(),
                            },
                        };
                    }
                };

                translate_one_target(
                    &message,
                    target,
                    &cache,
                    &*translator,
                    &*repository,
                    &parser,
                    &protector,
                    &gloss_masked,
                    &gloss_terms,
                    &segments,
                )
                .await
            });
        }

        let mut outcomes = Vec::new();
        let mut repository_failed = false;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    if let TargetStatus::Failed { reason } = &outcome.status {
                        if reason.starts_with("repository:") {
                            repository_failed = true;
                        }
                    }
                    outcomes.push(outcome);
                }
                Err(e) => {
                    warn!(message_id, error = %e, "translation task panicked");
                }
            }
        }
        outcomes.sort_by_key(|o| o.target);

        // A broken store means we cannot even record outcomes; leave the
        // message as-is so a retry can make progress.
        if repository_failed {
            return Err(PipelineError::Repository {
                reason: "translation writes failed; run aborted".into(),
            });
        }

        let succeeded = outcomes
            .iter()
            .filter(|o| matches!(o.status, TargetStatus::Translated { .. }))
            .count();
        let success = succeeded > 0;
        self.repository.finish(message_id, success).await?;

        info!(
            message_id,
            targets = outcomes.len(),
            succeeded,
            "translation fan-out settled"
        );

        Ok(TranslationSummary {
            message_id: message_id.to_string(),
            disposition: if success {
                RunDisposition::Translated
            } else {
                RunDisposition::Failed
            },
            targets: outcomes,
        })
    }
}

/// The per-target unit of work: cache lookup, translate on miss, restore,
/// append.
#[allow(clippy::too_many_arguments)]
async fn translate_one_target(
    message: &PipelineMessage,
    target: Language,
    cache: &Arc<dyn TranslationCache>,
    translator: &dyn Translator,
    repository: &dyn MessageRepository,
    parser: &ContentParser,
    protector: &GlossaryProtector,
    gloss_masked: &str,
    gloss_terms: &[crate::glossary::ProtectedTerm],
    segments: &[crate::parser::Segment],
) -> TargetOutcome {
    let key = cache_key(&message.content, target);

    if let Some(cached) = cache.get(&key) {
        debug!(message_id = %message.id, %target, "cache hit");
        return match repository
            .append_translation(&message.id, target, &cached)
            .await
        {
            Ok(_) => TargetOutcome {
                target,
                status: TargetStatus::Translated { from_cache: true },
            },
            Err(e) => TargetOutcome {
                target,
                status: TargetStatus::Failed {
                    reason: format!("repository: {e}"),
                },
            },
        };
    }

    let raw_out = match translator
        .translate(gloss_masked, message.source_language, target)
        .await
    {
        Ok(out) => out,
        Err(e) => {
            warn!(message_id = %message.id, %target, error = %e, "target translation failed");
            return TargetOutcome {
                target,
                status: TargetStatus::Failed {
                    reason: e.to_string(),
                },
            };
        }
    };

    let restored_gloss = protector.restore(&raw_out, gloss_terms);
    let final_text = parser.unmask(&restored_gloss, segments);

    // The value is useful across messages even if this append loses a
    // race, so cache before appending.
    cache.set(&key, final_text.clone());

    match repository
        .append_translation(&message.id, target, &final_text)
        .await
    {
        Ok(inserted) => {
            if !inserted {
                debug!(message_id = %message.id, %target, "duplicate translation dropped");
            }
            TargetOutcome {
                target,
                status: TargetStatus::Translated { from_cache: false },
            }
        }
        Err(e) => TargetOutcome {
            target,
            status: TargetStatus::Failed {
                reason: format!("repository: {e}"),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, NoopCache};
    use crate::parser::ParserConfig;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // ── test doubles ─────────────────────────────────────────────────

    #[derive(Debug, Clone, PartialEq)]
    enum RepoStatus {
        Sent,
        Translating,
        Translated,
        Failed,
    }

    struct StoredMessage {
        message: PipelineMessage,
        status: RepoStatus,
        translations: HashMap<Language, String>,
    }

    #[derive(Default)]
    struct MemoryRepository {
        messages: Mutex<HashMap<String, StoredMessage>>,
    }

    impl MemoryRepository {
        fn insert(&self, id: &str, content: &str, source: Language) {
            self.messages.lock().unwrap().insert(
                id.to_string(),
                StoredMessage {
                    message: PipelineMessage {
                        id: id.to_string(),
                        channel_id: "chan-1".into(),
                        content: content.to_string(),
                        source_language: source,
                    },
                    status: RepoStatus::Sent,
                    translations: HashMap::new(),
                },
            );
        }

        fn status(&self, id: &str) -> RepoStatus {
            self.messages.lock().unwrap()[id].status.clone()
        }

        fn translation(&self, id: &str, target: Language) -> Option<String> {
            self.messages.lock().unwrap()[id]
                .translations
                .get(&target)
                .cloned()
        }

        fn translation_count(&self, id: &str) -> usize {
            self.messages.lock().unwrap()[id].translations.len()
        }
    }

    #[async_trait::async_trait]
    impl MessageRepository for MemoryRepository {
        async fn load(&self, message_id: &str) -> Result<Option<PipelineMessage>> {
            Ok(self
                .messages
                .lock()
                .unwrap()
                .get(message_id)
                .map(|m| m.message.clone()))
        }

        async fn begin_translating(&self, message_id: &str) -> Result<bool> {
            let mut messages = self.messages.lock().unwrap();
            match messages.get_mut(message_id) {
                Some(stored) if stored.status == RepoStatus::Sent => {
                    stored.status = RepoStatus::Translating;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn append_translation(
            &self,
            message_id: &str,
            target: Language,
            content: &str,
        ) -> Result<bool> {
            let mut messages = self.messages.lock().unwrap();
            let stored = messages.get_mut(message_id).expect("message exists");
            if stored.translations.contains_key(&target) {
                return Ok(false);
            }
            stored.translations.insert(target, content.to_string());
            Ok(true)
        }

        async fn finish(&self, message_id: &str, success: bool) -> Result<()> {
            let mut messages = self.messages.lock().unwrap();
            let stored = messages.get_mut(message_id).expect("message exists");
            if stored.status == RepoStatus::Translating {
                stored.status = if success {
                    RepoStatus::Translated
                } else {
                    RepoStatus::Failed
                };
            }
            Ok(())
        }
    }

    /// Leaves text untouched — the round-trip property translator.
    struct IdentityTranslator {
        calls: AtomicUsize,
    }

    impl IdentityTranslator {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl Translator for IdentityTranslator {
        async fn translate(
            &self,
            text: &str,
            _source: Language,
            _target: Language,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.to_string())
        }
    }

    /// Tags output with the target so tests can tell translations apart.
    struct TaggingTranslator;

    #[async_trait::async_trait]
    impl Translator for TaggingTranslator {
        async fn translate(
            &self,
            text: &str,
            _source: Language,
            target: Language,
        ) -> Result<String> {
            Ok(format!("{target}:{text}"))
        }
    }

    struct FailingTranslator;

    #[async_trait::async_trait]
    impl Translator for FailingTranslator {
        async fn translate(
            &self,
            _text: &str,
            _source: Language,
            target: Language,
        ) -> Result<String> {
            Err(PipelineError::TranslationFailed {
                target,
                reason: "service down".into(),
            })
        }
    }

    fn pipeline(
        translator: Arc<dyn Translator>,
        repository: Arc<MemoryRepository>,
        cache: Arc<dyn TranslationCache>,
    ) -> TranslationPipeline {
        TranslationPipeline::new(
            ContentParser::new(ParserConfig::default()),
            LanguageDetector::new(),
            cache,
            translator,
            repository,
            PipelineConfig::default(),
        )
    }

    // ── scenarios ────────────────────────────────────────────────────

    #[tokio::test]
    async fn simple_fanout_translates_each_target() {
        let repo = Arc::new(MemoryRepository::default());
        repo.insert("m1", "Hello world", Language::En);
        let p = pipeline(
            Arc::new(TaggingTranslator),
            Arc::clone(&repo),
            Arc::new(MemoryCache::new(100, Duration::from_secs(60))),
        );

        let summary = p
            .translate_message("m1", &[Language::Es, Language::Fr], Vec::new())
            .await
            .unwrap();

        assert_eq!(summary.disposition, RunDisposition::Translated);
        assert_eq!(summary.targets.len(), 2);
        assert_eq!(repo.status("m1"), RepoStatus::Translated);
        assert_eq!(repo.translation("m1", Language::Es).unwrap(), "es:Hello world");
        assert_eq!(repo.translation("m1", Language::Fr).unwrap(), "fr:Hello world");
        assert!(repo.translation("m1", Language::En).is_none());
    }

    #[tokio::test]
    async fn source_language_is_never_a_target() {
        let repo = Arc::new(MemoryRepository::default());
        repo.insert("m1", "Hello world", Language::En);
        let p = pipeline(
            Arc::new(TaggingTranslator),
            Arc::clone(&repo),
            Arc::new(NoopCache),
        );

        let summary = p
            .translate_message("m1", &[Language::En, Language::Es], Vec::new())
            .await
            .unwrap();

        assert_eq!(summary.targets.len(), 1);
        assert_eq!(summary.targets[0].target, Language::Es);
    }

    #[tokio::test]
    async fn code_spans_survive_translation_verbatim() {
        let repo = Arc::new(MemoryRepository::default());
        let content = "Use `console.log()` like this:\n```js\nconsole.log(\"hello\")\n```";
        repo.insert("m1", content, Language::En);
        let p = pipeline(
            Arc::new(IdentityTranslator::new()),
            Arc::clone(&repo),
            Arc::new(NoopCache),
        );

        p.translate_message("m1", &[Language::Es], Vec::new())
            .await
            .unwrap();

        let translated = repo.translation("m1", Language::Es).unwrap();
        assert_eq!(translated, content);
        assert!(translated.contains("`console.log()`"));
        assert!(translated.contains("```js\nconsole.log(\"hello\")\n```"));
    }

    #[tokio::test]
    async fn glossary_terms_survive_translation() {
        let repo = Arc::new(MemoryRepository::default());
        repo.insert("m1", "FlowTalk is great", Language::En);
        let p = pipeline(
            Arc::new(TaggingTranslator),
            Arc::clone(&repo),
            Arc::new(NoopCache),
        );

        p.translate_message("m1", &[Language::Es], Vec::new())
            .await
            .unwrap();

        let translated = repo.translation("m1", Language::Es).unwrap();
        // The brand passed through masked and was restored verbatim.
        assert!(translated.contains("FlowTalk"));
        assert!(!translated.contains("⟪G0⟫"));
    }

    #[tokio::test]
    async fn cache_reuse_across_messages() {
        let repo = Arc::new(MemoryRepository::default());
        repo.insert("m1", "Good morning friends", Language::En);
        repo.insert("m2", "Good morning friends", Language::En);
        let translator = Arc::new(IdentityTranslator::new());
        let cache: Arc<dyn TranslationCache> =
            Arc::new(MemoryCache::new(100, Duration::from_secs(60)));
        let p = pipeline(
            Arc::clone(&translator) as Arc<dyn Translator>,
            Arc::clone(&repo),
            Arc::clone(&cache),
        );

        p.translate_message("m1", &[Language::Fr], Vec::new())
            .await
            .unwrap();
        let summary = p
            .translate_message("m2", &[Language::Fr], Vec::new())
            .await
            .unwrap();

        assert_eq!(translator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            summary.targets[0].status,
            TargetStatus::Translated { from_cache: true }
        );
        assert!(cache.stats().hits >= 1);
        assert!(repo.translation("m2", Language::Fr).is_some());
    }

    #[tokio::test]
    async fn noop_cache_still_translates() {
        let repo = Arc::new(MemoryRepository::default());
        repo.insert("m1", "Good morning friends", Language::En);
        repo.insert("m2", "Good morning friends", Language::En);
        let translator = Arc::new(IdentityTranslator::new());
        let p = pipeline(
            Arc::clone(&translator) as Arc<dyn Translator>,
            Arc::clone(&repo),
            Arc::new(NoopCache),
        );

        p.translate_message("m1", &[Language::Fr], Vec::new())
            .await
            .unwrap();
        p.translate_message("m2", &[Language::Fr], Vec::new())
            .await
            .unwrap();

        // Slower (two external calls) but identical results.
        assert_eq!(translator.calls.load(Ordering::SeqCst), 2);
        assert!(repo.translation("m1", Language::Fr).is_some());
        assert!(repo.translation("m2", Language::Fr).is_some());
    }

    #[tokio::test]
    async fn all_targets_failing_settles_failed() {
        let repo = Arc::new(MemoryRepository::default());
        repo.insert("m1", "Hello world", Language::En);
        let p = pipeline(
            Arc::new(FailingTranslator),
            Arc::clone(&repo),
            Arc::new(NoopCache),
        );

        let summary = p
            .translate_message("m1", &[Language::Es, Language::Fr], Vec::new())
            .await
            .unwrap();

        assert_eq!(summary.disposition, RunDisposition::Failed);
        assert_eq!(repo.status("m1"), RepoStatus::Failed);
        assert_eq!(repo.translation_count("m1"), 0);
    }

    #[tokio::test]
    async fn zero_applicable_targets_settles_translated() {
        let repo = Arc::new(MemoryRepository::default());
        repo.insert("m1", "Hello world", Language::En);
        let p = pipeline(
            Arc::new(FailingTranslator),
            Arc::clone(&repo),
            Arc::new(NoopCache),
        );

        let summary = p
            .translate_message("m1", &[Language::En], Vec::new())
            .await
            .unwrap();

        assert_eq!(summary.disposition, RunDisposition::Translated);
        assert!(summary.targets.is_empty());
        assert_eq!(repo.status("m1"), RepoStatus::Translated);
    }

    #[tokio::test]
    async fn entirely_code_message_settles_translated_with_no_translations() {
        let repo = Arc::new(MemoryRepository::default());
        repo.insert("m1", "```\nlet x = 1;\n```", Language::En);
        let p = pipeline(
            Arc::new(TaggingTranslator),
            Arc::clone(&repo),
            Arc::new(NoopCache),
        );

        let summary = p
            .translate_message("m1", &[Language::Es], Vec::new())
            .await
            .unwrap();

        assert_eq!(summary.disposition, RunDisposition::Translated);
        assert_eq!(repo.translation_count("m1"), 0);
        assert_eq!(repo.status("m1"), RepoStatus::Translated);
    }

    #[tokio::test]
    async fn second_invocation_is_idempotent() {
        let repo = Arc::new(MemoryRepository::default());
        repo.insert("m1", "Hello world", Language::En);
        let p = pipeline(
            Arc::new(TaggingTranslator),
            Arc::clone(&repo),
            Arc::new(NoopCache),
        );

        let first = p
            .translate_message("m1", &[Language::Es], Vec::new())
            .await
            .unwrap();
        let second = p
            .translate_message("m1", &[Language::Es], Vec::new())
            .await
            .unwrap();

        assert_eq!(first.disposition, RunDisposition::Translated);
        assert_eq!(second.disposition, RunDisposition::Skipped);
        assert_eq!(repo.translation_count("m1"), 1);
    }

    #[tokio::test]
    async fn partial_failure_settles_translated() {
        // Fails only the French target.
        struct HalfBroken;

        #[async_trait::async_trait]
        impl Translator for HalfBroken {
            async fn translate(
                &self,
                text: &str,
                _source: Language,
                target: Language,
            ) -> Result<String> {
                if target == Language::Fr {
                    Err(PipelineError::TranslationFailed {
                        target,
                        reason: "boom".into(),
                    })
                } else {
                    Ok(format!("{target}:{text}"))
                }
            }
        }

        let repo = Arc::new(MemoryRepository::default());
        repo.insert("m1", "Hello world", Language::En);
        let p = pipeline(Arc::new(HalfBroken), Arc::clone(&repo), Arc::new(NoopCache));

        let summary = p
            .translate_message("m1", &[Language::Es, Language::Fr], Vec::new())
            .await
            .unwrap();

        assert_eq!(summary.disposition, RunDisposition::Translated);
        assert_eq!(repo.status("m1"), RepoStatus::Translated);
        assert!(repo.translation("m1", Language::Es).is_some());
        assert!(repo.translation("m1", Language::Fr).is_none());
        let failed: Vec<_> = summary
            .targets
            .iter()
            .filter(|o| matches!(o.status, TargetStatus::Failed { .. }))
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].target, Language::Fr);
    }

    #[tokio::test]
    async fn missing_message_is_skipped() {
        let repo = Arc::new(MemoryRepository::default());
        let p = pipeline(
            Arc::new(TaggingTranslator),
            Arc::clone(&repo),
            Arc::new(NoopCache),
        );

        let result = p
            .translate_message("ghost", &[Language::Es], Vec::new())
            .await
            .unwrap();
        // begin_translating fails (no row), which reads as already-claimed.
        assert_eq!(result.disposition, RunDisposition::Skipped);
    }

    #[tokio::test]
    async fn detect_source_masks_before_detection() {
        let repo = Arc::new(MemoryRepository::default());
        let p = pipeline(
            Arc::new(TaggingTranslator),
            Arc::clone(&repo),
            Arc::new(NoopCache),
        );

        let detection = p
            .detect_source("hola gracias por todo `const x = new Map()` lo que haces")
            .unwrap();
        assert_eq!(detection.language, Language::Es);
    }

    #[tokio::test]
    async fn invalid_content_is_rejected_at_detection() {
        let repo = Arc::new(MemoryRepository::default());
        let p = pipeline(
            Arc::new(TaggingTranslator),
            Arc::clone(&repo),
            Arc::new(NoopCache),
        );

        assert!(matches!(
            p.detect_source("<script>alert(1)</script>"),
            Err(PipelineError::InvalidContent { .. })
        ));
    }
}
