//! Content parser — splits a message into translatable text and protected
//! spans.
//!
//! Code fences, inline code, URLs, mentions, and hashtags must pass through
//! translation verbatim.  The parser replaces each protected span with an
//! opaque token `⟪P{i}⟫` (the *masked form*), hands the masked text to the
//! translator, and restores the original spans afterwards.  The token form
//! survives translation unchanged because translation services treat the
//! `⟪…⟫` runs as untranslatable symbols.
//!
//! Masking and unmasking are exact inverses: for any input,
//! `unmask(mask(t).masked, &mask(t).segments) == t` byte for byte.

use regex::Regex;

use crate::error::{PipelineError, Result};

/// What kind of protected span a segment is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// A fenced code block: ```` ```lang\n…``` ````.  Non-nesting; inner
    /// single backticks are allowed.
    CodeFence,
    /// A single-line `` `…` `` span outside any fence.
    InlineCode,
    /// `http://` or `https://` up to the next whitespace.
    Url,
    /// `@username`.
    Mention,
    /// `#topic`.
    Hashtag,
    /// A pre-existing `⟪…⟫` run in the user's text.  Protecting these keeps
    /// unmasking unambiguous even for adversarial input.
    PlaceholderMarker,
}

/// One segment of a parsed message, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Translatable prose.
    Text(String),
    /// A span that must survive translation byte for byte.
    Protected { kind: SegmentKind, raw: String },
}

/// The masked form of a message plus everything needed to invert it.
#[derive(Debug, Clone)]
pub struct MaskedContent {
    /// The message with every protected span replaced by `⟪P{i}⟫`.
    pub masked: String,
    /// All segments in document order.  Protected segments are indexed by
    /// their position among protected segments only (the `i` in `⟪P{i}⟫`).
    pub segments: Vec<Segment>,
}

impl MaskedContent {
    /// True when the message contains prose worth translating; false for
    /// messages that are entirely code, links, and markers.
    pub fn has_translatable_text(&self) -> bool {
        self.segments.iter().any(|seg| match seg {
            Segment::Text(t) => !t.trim().is_empty(),
            Segment::Protected { .. } => false,
        })
    }
}

/// Parser configuration.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Maximum message length in Unicode code points.
    pub max_content_chars: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_content_chars: 4000,
        }
    }
}

/// Splits messages into translatable text and protected spans.
///
/// Construction compiles the span regexes once; share a parser via `Arc`
/// rather than rebuilding it per message.
pub struct ContentParser {
    config: ParserConfig,
    fence: Regex,
    inline: Regex,
    token: Regex,
}

/// Substrings that are rejected outright, checked case-insensitively.
const FORBIDDEN_PATTERNS: &[(&str, &str)] = &[
    ("<script", "script tags are not allowed"),
    ("</script", "script tags are not allowed"),
    ("javascript:", "javascript: URIs are not allowed"),
    ("data:text/html", "data:text/html URIs are not allowed"),
];

impl ContentParser {
    /// Create a parser with the given configuration.
    pub fn new(config: ParserConfig) -> Self {
        // Fences are matched greedily from ``` to the next closing ``` on
        // any later line; an unterminated fence is treated as plain text.
        let fence = Regex::new(r"(?s)```[A-Za-z0-9_+-]*\n.*?```")
            .expect("fence regex is valid");
        // Everything else is single-line.  Alternation order is priority at
        // equal start offsets.
        let inline = Regex::new(r"⟪[^⟪⟫\n]*⟫|`[^`\n]+`|https?://[^\s]+|@\w+|#\w+")
            .expect("inline regex is valid");
        let token = Regex::new(r"⟪P(\d+)⟫").expect("token regex is valid");
        Self {
            config,
            fence,
            inline,
            token,
        }
    }

    /// Validate `content` against length and forbidden-pattern rules.
    ///
    /// Returns every violation found.  An empty vector means the content is
    /// acceptable.  Unbalanced emphasis markers are deliberately not checked
    /// here; they are a rendering concern.
    pub fn validate(&self, content: &str) -> Vec<String> {
        let mut violations = Vec::new();

        let char_count = content.chars().count();
        if char_count > self.config.max_content_chars {
            violations.push(format!(
                "content is {char_count} characters, maximum is {}",
                self.config.max_content_chars
            ));
        }

        let lowered = content.to_lowercase();
        for (pattern, reason) in FORBIDDEN_PATTERNS {
            if lowered.contains(pattern) {
                let reason = (*reason).to_string();
                if !violations.contains(&reason) {
                    violations.push(reason);
                }
            }
        }

        violations
    }

    /// Parse `content` into ordered segments.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidContent`] listing every validation
    /// failure when the content is rejected.
    pub fn parse(&self, content: &str) -> Result<Vec<Segment>> {
        let violations = self.validate(content);
        if !violations.is_empty() {
            return Err(PipelineError::InvalidContent {
                reasons: violations,
            });
        }

        let mut segments = Vec::new();
        let mut cursor = 0;

        // Pass 1: fenced code blocks partition the document.
        for fence in self.fence.find_iter(content) {
            if fence.start() > cursor {
                self.segment_inline(&content[cursor..fence.start()], &mut segments);
            }
            segments.push(Segment::Protected {
                kind: SegmentKind::CodeFence,
                raw: fence.as_str().to_string(),
            });
            cursor = fence.end();
        }
        if cursor < content.len() {
            self.segment_inline(&content[cursor..], &mut segments);
        }

        Ok(segments)
    }

    /// Parse and mask in one step.
    ///
    /// # Errors
    ///
    /// Propagates validation failures from [`ContentParser::parse`].
    pub fn mask(&self, content: &str) -> Result<MaskedContent> {
        let segments = self.parse(content)?;

        let mut masked = String::with_capacity(content.len());
        let mut protected_index = 0;
        for segment in &segments {
            match segment {
                Segment::Text(text) => masked.push_str(text),
                Segment::Protected { .. } => {
                    masked.push_str(&placeholder(protected_index));
                    protected_index += 1;
                }
            }
        }

        Ok(MaskedContent { masked, segments })
    }

    /// Invert masking: replace each `⟪P{i}⟫` token in `masked` with the
    /// i-th protected segment's raw bytes.
    ///
    /// `masked` may have been rewritten by translation; only the tokens are
    /// required to have survived.  Tokens without a matching segment are
    /// left in place.  Restoration is a single pass, so a restored span
    /// that itself looks like a token is never expanded again.
    pub fn unmask(&self, masked: &str, segments: &[Segment]) -> String {
        let raws: Vec<&str> = segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Protected { raw, .. } => Some(raw.as_str()),
                Segment::Text(_) => None,
            })
            .collect();

        let mut restored = String::with_capacity(masked.len());
        let mut cursor = 0;
        for found in self.token.captures_iter(masked) {
            let whole = found.get(0).expect("capture 0 always present");
            let index: usize = match found[1].parse() {
                Ok(i) => i,
                Err(_) => continue,
            };
            restored.push_str(&masked[cursor..whole.start()]);
            match raws.get(index) {
                Some(raw) => restored.push_str(raw),
                None => restored.push_str(whole.as_str()),
            }
            cursor = whole.end();
        }
        restored.push_str(&masked[cursor..]);
        restored
    }

    /// Segment a fence-free slice into inline spans and text.
    fn segment_inline(&self, slice: &str, segments: &mut Vec<Segment>) {
        let mut cursor = 0;
        for found in self.inline.find_iter(slice) {
            if found.start() > cursor {
                segments.push(Segment::Text(slice[cursor..found.start()].to_string()));
            }
            let raw = found.as_str();
            let kind = classify_inline(raw);
            segments.push(Segment::Protected {
                kind,
                raw: raw.to_string(),
            });
            cursor = found.end();
        }
        if cursor < slice.len() {
            segments.push(Segment::Text(slice[cursor..].to_string()));
        }
    }
}

impl Default for ContentParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

/// The opaque token for the i-th protected span.
fn placeholder(index: usize) -> String {
    format!("⟪P{index}⟫")
}

/// Classify an inline match by its leading bytes.
fn classify_inline(raw: &str) -> SegmentKind {
    if raw.starts_with('⟪') {
        SegmentKind::PlaceholderMarker
    } else if raw.starts_with('`') {
        SegmentKind::InlineCode
    } else if raw.starts_with('@') {
        SegmentKind::Mention
    } else if raw.starts_with('#') {
        SegmentKind::Hashtag
    } else {
        SegmentKind::Url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ContentParser {
        ContentParser::default()
    }

    fn protected_count(segments: &[Segment]) -> usize {
        segments
            .iter()
            .filter(|s| matches!(s, Segment::Protected { .. }))
            .count()
    }

    #[test]
    fn plain_text_is_one_segment() {
        let segments = parser().parse("just some words").unwrap();
        assert_eq!(segments, vec![Segment::Text("just some words".into())]);
    }

    #[test]
    fn inline_code_is_protected() {
        let segments = parser().parse("use `println!` here").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Text("use ".into()),
                Segment::Protected {
                    kind: SegmentKind::InlineCode,
                    raw: "`println!`".into(),
                },
                Segment::Text(" here".into()),
            ]
        );
    }

    #[test]
    fn code_fence_with_language_tag() {
        let input = "look:\n```js\nconsole.log(\"hi\")\n```\ndone";
        let segments = parser().parse(input).unwrap();
        assert_eq!(
            segments[1],
            Segment::Protected {
                kind: SegmentKind::CodeFence,
                raw: "```js\nconsole.log(\"hi\")\n```".into(),
            }
        );
    }

    #[test]
    fn fence_swallows_inner_backticks() {
        let input = "```\na `b` c\n```";
        let segments = parser().parse(input).unwrap();
        assert_eq!(segments.len(), 1);
        assert!(matches!(
            &segments[0],
            Segment::Protected {
                kind: SegmentKind::CodeFence,
                ..
            }
        ));
    }

    #[test]
    fn unterminated_fence_is_text() {
        let input = "```js\nno closing fence";
        let segments = parser().parse(input).unwrap();
        assert_eq!(protected_count(&segments), 0);
    }

    #[test]
    fn urls_mentions_hashtags() {
        let segments = parser()
            .parse("ping @ana about https://example.com/x #launch")
            .unwrap();
        let kinds: Vec<_> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Protected { kind, .. } => Some(*kind),
                Segment::Text(_) => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![SegmentKind::Mention, SegmentKind::Url, SegmentKind::Hashtag]
        );
    }

    #[test]
    fn preexisting_markers_are_protected() {
        let segments = parser().parse("sneaky ⟪P0⟫ token").unwrap();
        assert!(segments.iter().any(|s| matches!(
            s,
            Segment::Protected {
                kind: SegmentKind::PlaceholderMarker,
                ..
            }
        )));
    }

    #[test]
    fn mask_numbers_protected_spans_in_order() {
        let masked = parser()
            .mask("a `x` b https://e.io c")
            .unwrap();
        assert_eq!(masked.masked, "a ⟪P0⟫ b ⟪P1⟫ c");
    }

    #[test]
    fn mask_unmask_round_trip() {
        let p = parser();
        let inputs = [
            "plain text only",
            "mixed `code` and https://a.b/c?q=1 and @user #tag",
            "```rust\nfn main() {}\n```",
            "text\n```py\nx = 1\n```\nmore `inline` text",
            "⟪P0⟫ already here",
            "",
        ];
        for input in inputs {
            let masked = p.mask(input).unwrap();
            assert_eq!(p.unmask(&masked.masked, &masked.segments), input);
        }
    }

    #[test]
    fn literal_marker_before_code_span_round_trips() {
        // The restored marker must not be expanded a second time.
        let p = parser();
        let input = "x ⟪P1⟫ y `c`";
        let masked = p.mask(input).unwrap();
        assert_eq!(masked.masked, "x ⟪P0⟫ y ⟪P1⟫");
        assert_eq!(p.unmask(&masked.masked, &masked.segments), input);
    }

    #[test]
    fn round_trip_under_identity_translation() {
        // Translation that leaves tokens alone but rewrites prose.
        let p = parser();
        let masked = p.mask("Use `console.log()` like this").unwrap();
        let translated = masked.masked.replace("Use", "Usa").replace("like this", "así");
        let restored = p.unmask(&translated, &masked.segments);
        assert!(restored.contains("`console.log()`"));
        assert!(restored.starts_with("Usa"));
    }

    #[test]
    fn script_tag_rejected() {
        let err = parser().parse("<script>alert(1)</script>").unwrap_err();
        match err {
            PipelineError::InvalidContent { reasons } => {
                assert!(!reasons.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn javascript_uri_rejected() {
        assert!(parser().parse("click javascript:alert(1)").is_err());
        assert!(parser().parse("click JAVASCRIPT:alert(1)").is_err());
    }

    #[test]
    fn over_length_rejected_with_reason() {
        let p = ContentParser::new(ParserConfig {
            max_content_chars: 10,
        });
        let violations = p.validate("this is definitely longer than ten");
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("maximum is 10"));
    }

    #[test]
    fn length_counts_code_points_not_bytes() {
        let p = ContentParser::new(ParserConfig {
            max_content_chars: 4,
        });
        // Four multibyte characters are within the limit.
        assert!(p.validate("ねこです").is_empty());
    }

    #[test]
    fn entirely_code_has_no_translatable_text() {
        let masked = parser().mask("```\nx\n```").unwrap();
        assert!(!masked.has_translatable_text());
        let masked = parser().mask("hello ```\nx\n```").unwrap();
        assert!(masked.has_translatable_text());
    }
}
