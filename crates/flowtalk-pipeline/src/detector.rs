//! Language detection with script, lexical, and romanization signals.
//!
//! Detection scores every supported language by (a) the fraction of tokens
//! found in a per-language frequent-word list, (b) regex pattern hits
//! normalized by text length, and (c) script bonuses for non-Latin
//! alphabets.  A dedicated wordlist catches Hindi written in Latin letters
//! ("Hinglish"), which script inspection alone would misread as English.
//!
//! The detector holds compiled regexes; build one at startup and share it.

use regex::Regex;

use crate::lang::{Detection, Language};

// ── tuning constants ─────────────────────────────────────────────────

/// Texts shorter than this (in code points, after cleaning) fall back to
/// the English default rather than guessing from noise.
const MIN_DETECTABLE_CHARS: usize = 10;

/// Awarded when a language's native script appears in the text.
const SCRIPT_BONUS: f64 = 0.8;

/// Spread across Romance languages when accented Latin vowels appear.
const ACCENT_BONUS: f64 = 0.1;

/// Awarded to German for umlauts and sharp s.
const UMLAUT_BONUS: f64 = 0.2;

/// Weight of regex pattern hits relative to wordlist hits.
const PATTERN_WEIGHT: f64 = 5.0;

/// Minimum romanized-Hindi score to consider the romanized branch at all.
const ROMANIZED_FLOOR: f64 = 0.15;

/// The romanized score must also beat this fraction of the English score.
const ROMANIZED_VS_ENGLISH: f64 = 0.5;

// ── wordlists ────────────────────────────────────────────────────────

const EN_WORDS: &[&str] = &[
    "the", "be", "to", "of", "and", "a", "in", "that", "have", "it", "for", "not", "on", "with",
    "you", "do", "this", "but", "from", "they", "say", "she", "will", "one", "all", "would",
    "there", "what", "about", "which", "when", "make", "can", "like", "time", "just", "know",
    "people", "into", "good", "some", "could", "them", "see", "other", "than", "then", "now",
    "is", "are", "was", "has", "hello", "thanks",
];

const ES_WORDS: &[&str] = &[
    "el", "la", "de", "que", "y", "a", "en", "un", "ser", "se", "no", "haber", "por", "con", "su",
    "para", "como", "estar", "tener", "le", "lo", "todo", "pero", "más", "hacer", "o", "poder",
    "decir", "este", "ir", "otro", "ese", "si", "me", "ya", "porque", "muy", "sin", "sobre",
    "también", "hasta", "hola", "gracias", "buenos", "días", "mundo",
];

const FR_WORDS: &[&str] = &[
    "le", "la", "de", "et", "les", "des", "est", "un", "une", "du", "que", "pas", "pour", "sur",
    "avec", "vous", "je", "tu", "nous", "dans", "ce", "il", "elle", "au", "plus", "ne", "se",
    "son", "mais", "comme", "faire", "être", "avoir", "tout", "bien", "bonjour", "merci", "oui",
    "monde",
];

const DE_WORDS: &[&str] = &[
    "der", "die", "das", "und", "ist", "ich", "nicht", "ein", "eine", "zu", "den", "mit", "sie",
    "auf", "für", "es", "im", "dem", "sich", "war", "wie", "wir", "auch", "aber", "nach", "bei",
    "nur", "noch", "haben", "werden", "kann", "hallo", "danke", "bitte", "welt",
];

const IT_WORDS: &[&str] = &[
    "il", "la", "di", "che", "e", "un", "una", "per", "non", "sono", "con", "mi", "si", "ho",
    "lo", "ma", "le", "se", "come", "della", "questo", "più", "anche", "molto", "tutto", "fare",
    "essere", "ciao", "grazie", "bene", "mondo",
];

const PT_WORDS: &[&str] = &[
    "o", "a", "de", "que", "e", "do", "da", "em", "um", "para", "é", "com", "não", "uma", "os",
    "no", "se", "na", "por", "mais", "as", "dos", "como", "mas", "foi", "ao", "ele", "das",
    "tem", "seu", "sua", "ou", "ser", "quando", "muito", "já", "está", "eu", "também", "olá",
    "obrigado", "mundo",
];

const RU_WORDS: &[&str] = &[
    "и", "в", "не", "на", "я", "быть", "он", "с", "что", "а", "по", "это", "она", "этот", "к",
    "но", "они", "мы", "как", "из", "у", "который", "то", "за", "свой", "привет", "спасибо",
    "да", "нет", "мир",
];

const JA_WORDS: &[&str] = &[
    "です", "ます", "の", "は", "を", "に", "が", "と", "した", "する", "こんにちは", "ありがとう",
];

const KO_WORDS: &[&str] = &[
    "입니다", "있습니다", "하는", "그리고", "하지만", "저는", "안녕하세요", "감사합니다",
];

const ZH_WORDS: &[&str] = &[
    "的", "是", "不", "我", "有", "了", "在", "人", "这", "你好", "谢谢", "世界",
];

const AR_WORDS: &[&str] = &[
    "في", "من", "على", "أن", "هذا", "إلى", "كان", "لا", "ما", "مرحبا", "شكرا",
];

const HI_WORDS: &[&str] = &[
    "है", "हैं", "का", "की", "के", "में", "से", "को", "और", "यह", "वह", "पर", "नहीं", "क्या",
    "मैं", "आप", "हम", "नमस्ते", "धन्यवाद",
];

/// Romanized Hindi — Hindi vocabulary as commonly typed in Latin letters.
const HI_ROMANIZED_WORDS: &[&str] = &[
    "hai", "hain", "nahi", "nahin", "kaise", "kya", "kyun", "kab", "kahan", "muje", "mujhe",
    "aap", "aapki", "aapka", "aapko", "chahiye", "karo", "karna", "raha", "rahi", "rahe",
    "tum", "tumhara", "mera", "meri", "hamara", "acha", "accha", "theek", "thik", "bhai",
    "yaar", "hoon", "hona", "batao", "bahut", "thoda", "abhi", "phir", "lekin", "matlab",
    "samajh", "dhanyavad", "namaste", "shukriya",
];

// ── detector ─────────────────────────────────────────────────────────

/// One scored sentence segment from [`LanguageDetector::detect_mixed`].
#[derive(Debug, Clone, PartialEq)]
pub struct MixedSegment {
    /// The sentence text.
    pub text: String,
    /// Its detected language.
    pub language: Language,
}

/// The result of mixed-language detection.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedDetection {
    /// The dominant language, weighted by character length.
    pub primary: Language,
    /// Per-sentence detections in document order.
    pub segments: Vec<MixedSegment>,
}

/// Scores text against the supported language set.
pub struct LanguageDetector {
    mask_token: Regex,
    sentence_split: Regex,
    patterns: Vec<(Language, Regex)>,
}

impl LanguageDetector {
    /// Build a detector, compiling all pattern regexes.
    pub fn new() -> Self {
        let mask_token = Regex::new(r"⟪[^⟪⟫]*⟫").expect("mask token regex is valid");
        let sentence_split = Regex::new(r"[.!?]+").expect("sentence split regex is valid");

        // Orthography patterns that survive lowercasing.
        let patterns = vec![
            (Language::Es, Regex::new(r"[¿¡ñ]|ción\b").expect("es pattern")),
            (Language::Fr, Regex::new(r"[çœ]|eau\b|aux\b").expect("fr pattern")),
            (Language::De, Regex::new(r"ß|sch\w+|\bnicht\b").expect("de pattern")),
            (Language::It, Regex::new(r"\w+zione\b|\bgli\b").expect("it pattern")),
            (Language::Pt, Regex::new(r"[ãõ]|ção\b").expect("pt pattern")),
            (Language::En, Regex::new(r"\w+(ing|tion)\b|\bwh\w+\b").expect("en pattern")),
        ];

        Self {
            mask_token,
            sentence_split,
            patterns,
        }
    }

    /// Detect the language of `text`.
    ///
    /// `text` is usually the parser's masked form; `⟪…⟫` tokens are
    /// stripped before scoring so protected spans never skew the signal.
    pub fn detect(&self, text: &str) -> Detection {
        // Patterns run on the lowered text so punctuation signals like `¿`
        // are still visible; tokens come from the fully cleaned form.
        let lowered = self
            .mask_token
            .replace_all(text, " ")
            .to_lowercase();
        let cleaned = self.clean(&lowered);
        if cleaned.chars().count() < MIN_DETECTABLE_CHARS {
            return Detection::default_english();
        }

        let tokens: Vec<&str> = cleaned.split_whitespace().collect();
        let char_len = cleaned.chars().count() as f64;

        let mut scores: Vec<(Language, f64)> = Language::ALL
            .iter()
            .map(|&lang| (lang, self.score_language(lang, &cleaned, &lowered, &tokens, char_len)))
            .collect();
        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let romanized_hi = wordlist_fraction(&tokens, HI_ROMANIZED_WORDS);
        let english = scores
            .iter()
            .find(|(l, _)| *l == Language::En)
            .map(|(_, s)| *s)
            .unwrap_or(0.0);

        if romanized_hi > ROMANIZED_FLOOR && romanized_hi > ROMANIZED_VS_ENGLISH * english {
            // Hindi typed in Latin letters.  Confidence comes from how far
            // the romanized score clears the best non-Hindi candidate.
            let best_other = scores
                .iter()
                .find(|(l, _)| *l != Language::Hi)
                .map(|(_, s)| *s)
                .unwrap_or(0.0);
            let fallbacks = top_fallbacks(&scores, Language::Hi);
            return Detection {
                language: Language::Hi,
                is_romanized: true,
                confidence: ratio_confidence(romanized_hi, best_other),
                fallbacks,
            };
        }

        let (top_lang, top_score) = scores[0];
        if top_score <= 0.0 {
            return Detection::default_english();
        }
        let second_score = scores[1].1;

        Detection {
            language: top_lang,
            is_romanized: false,
            confidence: ratio_confidence(top_score, second_score),
            fallbacks: top_fallbacks(&scores, top_lang),
        }
    }

    /// Split on sentence boundaries and detect each piece, weighting the
    /// primary language by character length.
    pub fn detect_mixed(&self, text: &str) -> MixedDetection {
        let mut segments = Vec::new();
        let mut weights: Vec<(Language, f64)> = Vec::new();

        for piece in self.sentence_split.split(text) {
            let trimmed = piece.trim();
            if trimmed.is_empty() {
                continue;
            }
            let detection = self.detect(trimmed);
            let weight = trimmed.chars().count() as f64;
            match weights.iter_mut().find(|(l, _)| *l == detection.language) {
                Some((_, w)) => *w += weight,
                None => weights.push((detection.language, weight)),
            }
            segments.push(MixedSegment {
                text: trimmed.to_string(),
                language: detection.language,
            });
        }

        let primary = weights
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(l, _)| *l)
            .unwrap_or(Language::En);

        MixedDetection { primary, segments }
    }

    /// True when detection confidence falls below 0.6.
    pub fn is_uncertain(&self, text: &str) -> bool {
        self.detect(text).confidence < 0.6
    }

    // ── scoring internals ────────────────────────────────────────────

    /// Strip punctuation and collapse whitespace on already-lowered text.
    fn clean(&self, lowered: &str) -> String {
        let mut cleaned = String::with_capacity(lowered.len());
        for c in lowered.chars() {
            if c.is_alphanumeric() {
                cleaned.push(c);
            } else {
                // Punctuation becomes a separator, never silently joined.
                cleaned.push(' ');
            }
        }
        cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn score_language(
        &self,
        lang: Language,
        cleaned: &str,
        lowered: &str,
        tokens: &[&str],
        char_len: f64,
    ) -> f64 {
        let words = match lang {
            Language::En => EN_WORDS,
            Language::Es => ES_WORDS,
            Language::Fr => FR_WORDS,
            Language::De => DE_WORDS,
            Language::It => IT_WORDS,
            Language::Pt => PT_WORDS,
            Language::Ru => RU_WORDS,
            Language::Ja => JA_WORDS,
            Language::Ko => KO_WORDS,
            Language::Zh => ZH_WORDS,
            Language::Ar => AR_WORDS,
            Language::Hi => HI_WORDS,
        };

        let mut score = wordlist_fraction(tokens, words);

        // CJK has no whitespace tokenization; also count substring hits.
        if matches!(lang, Language::Ja | Language::Zh | Language::Ko) {
            let hits = words.iter().filter(|w| cleaned.contains(*w)).count();
            score += hits as f64 / char_len;
        }

        if let Some((_, pattern)) = self.patterns.iter().find(|(l, _)| *l == lang) {
            let hits = pattern.find_iter(lowered).count() as f64;
            score += PATTERN_WEIGHT * hits / char_len.max(1.0);
        }

        score + script_bonus(lang, cleaned)
    }
}

impl Default for LanguageDetector {
    fn default() -> Self {
        Self::new()
    }
}

// ── free helpers ─────────────────────────────────────────────────────

/// Fraction of tokens present in `words`.
fn wordlist_fraction(tokens: &[&str], words: &[&str]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let hits = tokens.iter().filter(|t| words.contains(t)).count();
    hits as f64 / tokens.len() as f64
}

/// Script-presence bonuses.  A single character of a distinctive script is
/// strong evidence; accented Latin is weaker and shared across languages.
fn script_bonus(lang: Language, cleaned: &str) -> f64 {
    let has = |test: fn(char) -> bool| cleaned.chars().any(test);

    match lang {
        Language::Ru if has(|c| ('\u{0400}'..='\u{04FF}').contains(&c)) => SCRIPT_BONUS,
        Language::Zh if has(|c| ('\u{4E00}'..='\u{9FFF}').contains(&c)) => SCRIPT_BONUS,
        Language::Ja if has(|c| ('\u{3040}'..='\u{30FF}').contains(&c)) => SCRIPT_BONUS,
        Language::Ko
            if has(|c| {
                ('\u{AC00}'..='\u{D7AF}').contains(&c) || ('\u{1100}'..='\u{11FF}').contains(&c)
            }) =>
        {
            SCRIPT_BONUS
        }
        Language::Ar if has(|c| ('\u{0600}'..='\u{06FF}').contains(&c)) => SCRIPT_BONUS,
        Language::Hi if has(|c| ('\u{0900}'..='\u{097F}').contains(&c)) => SCRIPT_BONUS,
        Language::Es | Language::Fr | Language::It | Language::Pt
            if has(|c| "áéíóúàèìòùâêîôû".contains(c)) =>
        {
            ACCENT_BONUS
        }
        Language::De if has(|c| "äöüß".contains(c)) => UMLAUT_BONUS,
        _ => 0.0,
    }
}

/// Map the top-to-second score ratio onto confidence tiers.
fn ratio_confidence(top: f64, second: f64) -> f64 {
    if second <= 0.0 {
        return 0.9;
    }
    let ratio = top / second;
    if ratio > 2.0 {
        0.9
    } else if ratio > 1.5 {
        0.75
    } else if ratio > 1.2 {
        0.6
    } else {
        0.4
    }
}

/// Up to three runner-up languages with a positive score.
fn top_fallbacks(scores: &[(Language, f64)], winner: Language) -> Vec<Language> {
    scores
        .iter()
        .filter(|(l, s)| *l != winner && *s > 0.0)
        .take(3)
        .map(|(l, _)| *l)
        .collect()
}
