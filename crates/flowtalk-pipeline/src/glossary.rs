//! Glossary protection — keeps brand names, acronyms, and product terms
//! verbatim through translation.
//!
//! Terms are matched case-insensitively on ASCII word boundaries with a
//! leftmost-longest automaton, so `GitHub API` wins over `API`.  Each match
//! is replaced by an opaque `⟪G{j}⟫` placeholder before the text reaches
//! the translator and restored afterwards.

use aho_corasick::{AhoCorasick, MatchKind};
use serde::{Deserialize, Serialize};

// ── entry types ──────────────────────────────────────────────────────

/// Why a term is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermCategory {
    /// Acronyms and technical vocabulary (API, HTTP, JSON).
    Technical,
    /// Brand and product names.
    Brand,
    /// People and places.
    ProperNoun,
    /// Community-supplied terms with no better bucket.
    Custom,
}

impl TermCategory {
    /// Database string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Brand => "brand",
            Self::ProperNoun => "proper_noun",
            Self::Custom => "custom",
        }
    }

    /// Parse the database string form.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "technical" => Some(Self::Technical),
            "brand" => Some(Self::Brand),
            "proper_noun" => Some(Self::ProperNoun),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// A single protected term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    /// Canonical dictionary form of the term.
    pub term: String,
    /// Classification, informational only.
    pub category: TermCategory,
    /// When true, restore exactly what the user typed; when false, restore
    /// the canonical form (acronyms come back uppercased even if typed
    /// lowercase).
    pub preserve_case: bool,
}

impl GlossaryEntry {
    /// Convenience constructor.
    pub fn new(term: impl Into<String>, category: TermCategory, preserve_case: bool) -> Self {
        Self {
            term: term.into(),
            category,
            preserve_case,
        }
    }
}

/// A glossary match captured during protection, needed for restore.
#[derive(Debug, Clone)]
pub struct ProtectedTerm {
    /// The exact substring that was matched.
    pub surface: String,
    /// The canonical form from the glossary entry.
    pub canonical: String,
    /// Whether restore should use `surface` or `canonical`.
    pub preserve_case: bool,
}

// ── default glossary ─────────────────────────────────────────────────

/// Built-in terms every community gets: technology acronyms, brands and
/// products, frameworks and tools, and programming language names.
fn default_entries() -> Vec<GlossaryEntry> {
    use TermCategory::*;

    let technical = [
        "API", "HTTP", "HTTPS", "JSON", "XML", "SQL", "HTML", "CSS", "URL", "REST", "GraphQL",
        "CPU", "GPU", "RAM", "SDK", "CLI", "IDE", "CI", "JWT", "OAuth", "TCP", "UDP", "DNS",
        "SSH", "TLS",
    ];
    let brands = [
        "FlowTalk", "GitHub", "GitLab", "Google", "Microsoft", "AWS", "Azure", "Docker",
        "Kubernetes", "Linux", "Windows", "macOS", "iOS", "Android", "Slack", "Discord",
        "PostgreSQL", "SQLite", "MongoDB", "Redis",
    ];
    let frameworks = [
        "React", "Vue", "Angular", "Django", "Flask", "Rails", "Spring", "Tokio", "Axum",
        "Express", "Node.js",
    ];
    let languages = [
        "Rust", "Python", "JavaScript", "TypeScript", "Java", "Kotlin", "Swift", "Ruby", "Go",
        "C++", "C#",
    ];

    let mut entries = Vec::new();
    // Acronyms restore their canonical uppercase form.
    entries.extend(
        technical
            .iter()
            .map(|t| GlossaryEntry::new(*t, Technical, false)),
    );
    // Names keep whatever casing the user typed.
    entries.extend(brands.iter().map(|t| GlossaryEntry::new(*t, Brand, true)));
    entries.extend(
        frameworks
            .iter()
            .map(|t| GlossaryEntry::new(*t, Brand, true)),
    );
    entries.extend(
        languages
            .iter()
            .map(|t| GlossaryEntry::new(*t, ProperNoun, true)),
    );
    entries
}

// ── protector ────────────────────────────────────────────────────────

/// Replaces glossary terms with placeholders and restores them.
///
/// Build one per message scope via [`GlossaryProtector::with_community`];
/// the automaton build is cheap relative to a translation call.
pub struct GlossaryProtector {
    entries: Vec<GlossaryEntry>,
    automaton: Option<AhoCorasick>,
}

impl GlossaryProtector {
    /// A protector over the bundled default glossary only.
    pub fn bundled() -> Self {
        Self::from_entries(default_entries())
    }

    /// A protector over the default glossary merged with community terms.
    ///
    /// A community term replaces a default term that is equal
    /// case-insensitively; a term is never present twice.
    pub fn with_community(community_terms: Vec<GlossaryEntry>) -> Self {
        let mut merged = community_terms;
        for entry in default_entries() {
            let duplicate = merged
                .iter()
                .any(|e| e.term.eq_ignore_ascii_case(&entry.term));
            if !duplicate {
                merged.push(entry);
            }
        }
        Self::from_entries(merged)
    }

    fn from_entries(mut entries: Vec<GlossaryEntry>) -> Self {
        // Longest first so overlapping terms prefer the longer match.
        entries.sort_by(|a, b| b.term.len().cmp(&a.term.len()));

        let patterns: Vec<&str> = entries.iter().map(|e| e.term.as_str()).collect();
        let automaton = if patterns.is_empty() {
            None
        } else {
            match AhoCorasick::builder()
                .ascii_case_insensitive(true)
                .match_kind(MatchKind::LeftmostLongest)
                .build(&patterns)
            {
                Ok(ac) => Some(ac),
                Err(e) => {
                    tracing::error!(error = %e, "failed to build glossary automaton");
                    None
                }
            }
        };

        Self { entries, automaton }
    }

    /// Number of terms in this protector.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no terms are loaded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every whole-word glossary match in `text` with `⟪G{j}⟫`.
    ///
    /// Returns the masked text and the ordered matches needed by
    /// [`GlossaryProtector::restore`].
    pub fn protect(&self, text: &str) -> (String, Vec<ProtectedTerm>) {
        let Some(automaton) = &self.automaton else {
            return (text.to_string(), Vec::new());
        };

        let mut masked = String::with_capacity(text.len());
        let mut terms = Vec::new();
        let mut cursor = 0;

        for mat in automaton.find_iter(text) {
            if !on_word_boundary(text, mat.start(), mat.end()) {
                continue;
            }
            let entry = &self.entries[mat.pattern().as_usize()];
            masked.push_str(&text[cursor..mat.start()]);
            masked.push_str(&format!("⟪G{}⟫", terms.len()));
            terms.push(ProtectedTerm {
                surface: text[mat.start()..mat.end()].to_string(),
                canonical: entry.term.clone(),
                preserve_case: entry.preserve_case,
            });
            cursor = mat.end();
        }
        masked.push_str(&text[cursor..]);

        (masked, terms)
    }

    /// Replace each `⟪G{j}⟫` placeholder in `text` with its term.
    ///
    /// `text` is typically translator output; placeholders the translator
    /// dropped are simply absent and their terms are not reinserted.
    pub fn restore(&self, text: &str, terms: &[ProtectedTerm]) -> String {
        let mut restored = text.to_string();
        for (j, term) in terms.iter().enumerate() {
            let replacement = if term.preserve_case {
                &term.surface
            } else {
                &term.canonical
            };
            restored = restored.replace(&format!("⟪G{j}⟫"), replacement);
        }
        restored
    }
}

/// ASCII word-boundary check: the characters adjacent to the match must not
/// be alphanumeric or `_`.
fn on_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let before_ok = text[..start].chars().next_back().is_none_or(|c| !is_word(c));
    let after_ok = text[end..].chars().next().is_none_or(|c| !is_word(c));
    before_ok && after_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brand_is_masked_and_restored() {
        let protector = GlossaryProtector::bundled();
        let (masked, terms) = protector.protect("FlowTalk is great");
        assert_eq!(masked, "⟪G0⟫ is great");
        assert_eq!(protector.restore(&masked, &terms), "FlowTalk is great");
    }

    #[test]
    fn surface_case_is_preserved_for_brands() {
        let protector = GlossaryProtector::bundled();
        let (masked, terms) = protector.protect("i love github actions");
        assert_eq!(protector.restore(&masked, &terms), "i love github actions");
    }

    #[test]
    fn acronyms_restore_canonical_case() {
        let protector = GlossaryProtector::bundled();
        let (masked, terms) = protector.protect("the api is down");
        assert_eq!(protector.restore(&masked, &terms), "the API is down");
    }

    #[test]
    fn longer_term_wins() {
        let protector = GlossaryProtector::with_community(vec![GlossaryEntry::new(
            "GitHub API",
            TermCategory::Technical,
            true,
        )]);
        let (masked, terms) = protector.protect("use the GitHub API today");
        assert_eq!(masked, "use the ⟪G0⟫ today");
        assert_eq!(terms[0].surface, "GitHub API");
    }

    #[test]
    fn no_match_inside_words() {
        let protector = GlossaryProtector::bundled();
        // "rapid" contains "api" but is not a glossary hit.
        let (masked, terms) = protector.protect("rapid growth");
        assert_eq!(masked, "rapid growth");
        assert!(terms.is_empty());
    }

    #[test]
    fn community_term_overrides_default() {
        let protector = GlossaryProtector::with_community(vec![GlossaryEntry::new(
            "api",
            TermCategory::Custom,
            true,
        )]);
        let (_, terms) = protector.protect("the api is down");
        // The community entry wins, so the typed surface is restored.
        assert!(terms[0].preserve_case);
        let count = protector
            .entries
            .iter()
            .filter(|e| e.term.eq_ignore_ascii_case("api"))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn multiple_terms_numbered_in_order() {
        let protector = GlossaryProtector::bundled();
        let (masked, terms) = protector.protect("Rust and Python and Go");
        assert_eq!(masked, "⟪G0⟫ and ⟪G1⟫ and ⟪G2⟫");
        assert_eq!(terms.len(), 3);
        assert_eq!(protector.restore(&masked, &terms), "Rust and Python and Go");
    }

    #[test]
    fn restore_survives_translated_text_around_placeholders() {
        let protector = GlossaryProtector::bundled();
        let (masked, terms) = protector.protect("FlowTalk is great");
        let translated = masked.replace("is great", "es genial");
        assert_eq!(protector.restore(&translated, &terms), "FlowTalk es genial");
    }

    #[test]
    fn empty_glossary_is_a_no_op() {
        let protector = GlossaryProtector::from_entries(Vec::new());
        let (masked, terms) = protector.protect("anything at all");
        assert_eq!(masked, "anything at all");
        assert!(terms.is_empty());
    }

    #[test]
    fn category_string_round_trip() {
        for cat in [
            TermCategory::Technical,
            TermCategory::Brand,
            TermCategory::ProperNoun,
            TermCategory::Custom,
        ] {
            assert_eq!(TermCategory::from_str(cat.as_str()), Some(cat));
        }
        assert_eq!(TermCategory::from_str("nope"), None);
    }
}
