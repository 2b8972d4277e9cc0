//! Supported language codes.
//!
//! [`Language`] is the closed set of ISO 639-1 codes the relay translates
//! between.  Romanized Hindi (`hi-rom`) is a detection outcome, not a
//! member of this set — it is reported through [`Detection::is_romanized`]
//! and maps to [`Language::Hi`] for translation targets.

use serde::{Deserialize, Serialize};

/// A language the relay can detect and translate into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English.
    En,
    /// Spanish.
    Es,
    /// French.
    Fr,
    /// German.
    De,
    /// Italian.
    It,
    /// Portuguese.
    Pt,
    /// Russian.
    Ru,
    /// Japanese.
    Ja,
    /// Korean.
    Ko,
    /// Chinese.
    Zh,
    /// Arabic.
    Ar,
    /// Hindi.
    Hi,
}

impl Language {
    /// Every supported language, in a fixed order.
    pub const ALL: [Language; 12] = [
        Self::En,
        Self::Es,
        Self::Fr,
        Self::De,
        Self::It,
        Self::Pt,
        Self::Ru,
        Self::Ja,
        Self::Ko,
        Self::Zh,
        Self::Ar,
        Self::Hi,
    ];

    /// The ISO 639-1 code for this language.
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Es => "es",
            Self::Fr => "fr",
            Self::De => "de",
            Self::It => "it",
            Self::Pt => "pt",
            Self::Ru => "ru",
            Self::Ja => "ja",
            Self::Ko => "ko",
            Self::Zh => "zh",
            Self::Ar => "ar",
            Self::Hi => "hi",
        }
    }

    /// Parse an ISO 639-1 code.  Returns `None` for anything outside the
    /// supported set; `"hi-rom"` maps to [`Language::Hi`] since romanized
    /// Hindi is translated as Hindi.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" => Some(Self::En),
            "es" => Some(Self::Es),
            "fr" => Some(Self::Fr),
            "de" => Some(Self::De),
            "it" => Some(Self::It),
            "pt" => Some(Self::Pt),
            "ru" => Some(Self::Ru),
            "ja" => Some(Self::Ja),
            "ko" => Some(Self::Ko),
            "zh" => Some(Self::Zh),
            "ar" => Some(Self::Ar),
            "hi" | "hi-rom" => Some(Self::Hi),
            _ => None,
        }
    }

    /// Human-readable English name, used in logs and the phrase table.
    pub fn name(&self) -> &'static str {
        match self {
            Self::En => "English",
            Self::Es => "Spanish",
            Self::Fr => "French",
            Self::De => "German",
            Self::It => "Italian",
            Self::Pt => "Portuguese",
            Self::Ru => "Russian",
            Self::Ja => "Japanese",
            Self::Ko => "Korean",
            Self::Zh => "Chinese",
            Self::Ar => "Arabic",
            Self::Hi => "Hindi",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}

/// The outcome of language detection on a piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// The detected language.
    pub language: Language,
    /// True when the text is a native language written in Latin letters
    /// (e.g. Hindi typed as `"muje aapki help chahiye"`).
    pub is_romanized: bool,
    /// Detection confidence in `0.0..=1.0`.
    pub confidence: f64,
    /// Runner-up languages, best first.
    pub fallbacks: Vec<Language>,
}

impl Detection {
    /// The default detection for text too short or too ambiguous to score.
    pub fn default_english() -> Self {
        Self {
            language: Language::En,
            is_romanized: false,
            confidence: 0.3,
            fallbacks: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_round_trip() {
        for lang in Language::ALL {
            assert_eq!(Language::from_code(lang.as_code()), Some(lang));
        }
    }

    #[test]
    fn romanized_code_maps_to_hindi() {
        assert_eq!(Language::from_code("hi-rom"), Some(Language::Hi));
    }

    #[test]
    fn unknown_code_is_none() {
        assert_eq!(Language::from_code("tlh"), None);
        assert_eq!(Language::from_code(""), None);
    }

    #[test]
    fn code_parsing_is_case_insensitive() {
        assert_eq!(Language::from_code(" EN "), Some(Language::En));
        assert_eq!(Language::from_code("Fr"), Some(Language::Fr));
    }

    #[test]
    fn serde_uses_lowercase_codes() {
        let json = serde_json::to_string(&Language::De).unwrap();
        assert_eq!(json, "\"de\"");
        let back: Language = serde_json::from_str("\"pt\"").unwrap();
        assert_eq!(back, Language::Pt);
    }
}
