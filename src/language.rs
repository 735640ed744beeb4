use whatlang::Lang;

const FALLBACK: &str = "en";

/// Detects the dominant language of `text` and returns a short code suitable
/// for prompt steering. Unreliable or empty detections fall back to English.
pub fn detect_language(text: &str) -> String {
    if text.trim().is_empty() {
        return FALLBACK.to_string();
    }

    match whatlang::detect(text) {
        Some(info) if info.is_reliable() => iso_639_1(info.lang()).to_string(),
        _ => FALLBACK.to_string(),
    }
}

// whatlang reports ISO 639-3; the prompts use the two-letter form the
// completion models respond to best. Unmapped languages keep the 639-3 code.
fn iso_639_1(lang: Lang) -> &'static str {
    match lang {
        Lang::Eng => "en",
        Lang::Fra => "fr",
        Lang::Deu => "de",
        Lang::Spa => "es",
        Lang::Por => "pt",
        Lang::Ita => "it",
        Lang::Nld => "nl",
        Lang::Rus => "ru",
        Lang::Ukr => "uk",
        Lang::Pol => "pl",
        Lang::Swe => "sv",
        Lang::Dan => "da",
        Lang::Fin => "fi",
        Lang::Tur => "tr",
        Lang::Ara => "ar",
        Lang::Heb => "he",
        Lang::Hin => "hi",
        Lang::Jpn => "ja",
        Lang::Kor => "ko",
        Lang::Cmn => "zh",
        other => other.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_falls_back() {
        assert_eq!(detect_language(""), "en");
        assert_eq!(detect_language("   \n "), "en");
    }

    #[test]
    fn detects_english_prose() {
        let text = "The quick brown fox jumps over the lazy dog. \
                    This sentence exists only to give the detector enough signal.";
        assert_eq!(detect_language(text), "en");
    }

    #[test]
    fn detects_french_prose() {
        let text = "Le renard brun saute par-dessus le chien paresseux. \
                    Cette phrase existe seulement pour donner assez de signal au détecteur.";
        assert_eq!(detect_language(text), "fr");
    }
}
