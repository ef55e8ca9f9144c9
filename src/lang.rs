// src/lang.rs
//! Recognized language codes and a small Unicode-script detector used when a feed
//! does not declare (or mis-declares) its language.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LangCode {
    En,
    Mr,
    Hi,
    Ta,
    Te,
    Kn,
    Gu,
    Bn,
    Pa,
    Ml,
    Or,
}

impl LangCode {
    pub const ALL: [LangCode; 11] = [
        LangCode::En,
        LangCode::Mr,
        LangCode::Hi,
        LangCode::Ta,
        LangCode::Te,
        LangCode::Kn,
        LangCode::Gu,
        LangCode::Bn,
        LangCode::Pa,
        LangCode::Ml,
        LangCode::Or,
    ];

    pub fn code(self) -> &'static str {
        match self {
            LangCode::En => "en",
            LangCode::Mr => "mr",
            LangCode::Hi => "hi",
            LangCode::Ta => "ta",
            LangCode::Te => "te",
            LangCode::Kn => "kn",
            LangCode::Gu => "gu",
            LangCode::Bn => "bn",
            LangCode::Pa => "pa",
            LangCode::Ml => "ml",
            LangCode::Or => "or",
        }
    }

    /// Human-readable name for reports.
    pub fn name(self) -> &'static str {
        match self {
            LangCode::En => "English",
            LangCode::Mr => "Marathi",
            LangCode::Hi => "Hindi",
            LangCode::Ta => "Tamil",
            LangCode::Te => "Telugu",
            LangCode::Kn => "Kannada",
            LangCode::Gu => "Gujarati",
            LangCode::Bn => "Bengali",
            LangCode::Pa => "Punjabi",
            LangCode::Ml => "Malayalam",
            LangCode::Or => "Odia",
        }
    }
}

impl fmt::Display for LangCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized language code: {0:?}")]
pub struct UnknownLanguage(pub String);

impl FromStr for LangCode {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase();
        // Accept regional tags like "mr-IN" / "hi_IN".
        let primary = norm.split(['-', '_']).next().unwrap_or_default();
        LangCode::ALL
            .into_iter()
            .find(|l| l.code() == primary)
            .ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

/// Ordered set of target languages for one batch.
pub type LanguageSet = BTreeSet<LangCode>;

/// Guess the language from the dominant script. Devanagari maps to Hindi since Marathi
/// shares the script; feeds in Marathi are expected to declare it.
pub fn detect_script_language(text: &str) -> Option<LangCode> {
    let mut counts = [0usize; 10];
    for ch in text.chars() {
        let idx = match ch as u32 {
            0x0900..=0x097F => 0, // Devanagari
            0x0980..=0x09FF => 1, // Bengali
            0x0A00..=0x0A7F => 2, // Gurmukhi
            0x0A80..=0x0AFF => 3, // Gujarati
            0x0B00..=0x0B7F => 4, // Oriya
            0x0B80..=0x0BFF => 5, // Tamil
            0x0C00..=0x0C7F => 6, // Telugu
            0x0C80..=0x0CFF => 7, // Kannada
            0x0D00..=0x0D7F => 8, // Malayalam
            _ if ch.is_ascii_alphabetic() => 9,
            _ => continue,
        };
        counts[idx] += 1;
    }

    let (best, n) = counts
        .iter()
        .enumerate()
        .max_by_key(|(_, n)| **n)
        .map(|(i, n)| (i, *n))?;
    if n == 0 {
        return None;
    }
    Some(match best {
        0 => LangCode::Hi,
        1 => LangCode::Bn,
        2 => LangCode::Pa,
        3 => LangCode::Gu,
        4 => LangCode::Or,
        5 => LangCode::Ta,
        6 => LangCode::Te,
        7 => LangCode::Kn,
        8 => LangCode::Ml,
        _ => LangCode::En,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codes_and_regional_tags() {
        assert_eq!("mr".parse::<LangCode>().unwrap(), LangCode::Mr);
        assert_eq!(" HI ".parse::<LangCode>().unwrap(), LangCode::Hi);
        assert_eq!("mr-IN".parse::<LangCode>().unwrap(), LangCode::Mr);
        assert!("fr".parse::<LangCode>().is_err());
    }

    #[test]
    fn detects_dominant_script() {
        assert_eq!(detect_script_language("नागपूर महानगरपालिका"), Some(LangCode::Hi));
        assert_eq!(detect_script_language("சென்னை மாநகராட்சி"), Some(LangCode::Ta));
        assert_eq!(detect_script_language("Ward 12 drive"), Some(LangCode::En));
        assert_eq!(detect_script_language("12 / 34"), None);
    }

    #[test]
    fn serde_uses_lowercase_codes() {
        let s = serde_json::to_string(&LangCode::Kn).unwrap();
        assert_eq!(s, "\"kn\"");
        let back: LangCode = serde_json::from_str("\"or\"").unwrap();
        assert_eq!(back, LangCode::Or);
    }
}
