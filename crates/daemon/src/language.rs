//! ISO 639 language-code normalization.
//!
//! The selector (see [`crate::selector`]) only does exact matching on 3-letter
//! codes; it is the caller's job to normalize a 2-letter code or an English
//! language name before it ever reaches a job's `original_language` field or a
//! config's priority list. This module is that normalization step, kept here
//! because callers assembling jobs from upstream metadata need it and no
//! crate in the dependency stack already provides it.

/// Convert a 2-letter ISO 639-1 code to its 3-letter ISO 639-2/B equivalent.
/// Returns the input unchanged (lowercased) if it is not recognized.
pub fn iso_639_1_to_639_2(code: &str) -> String {
    let lower = code.trim().to_lowercase();
    match lower.as_str() {
        "en" => "eng",
        "ja" => "jpn",
        "fr" => "fre",
        "de" => "ger",
        "es" => "spa",
        "it" => "ita",
        "pt" => "por",
        "ru" => "rus",
        "zh" => "chi",
        "ko" => "kor",
        "nl" => "dut",
        "sv" => "swe",
        "no" => "nor",
        "da" => "dan",
        "fi" => "fin",
        "pl" => "pol",
        "tr" => "tur",
        "ar" => "ara",
        "hi" => "hin",
        "th" => "tha",
        _ => return lower,
    }
    .to_string()
}

/// Convert an English-language name (case-insensitive) to its 3-letter
/// ISO 639-2/B code. Returns the input unchanged (lowercased) if unrecognized.
pub fn language_name_to_code(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.as_str() {
        "english" => "eng",
        "japanese" => "jpn",
        "french" => "fre",
        "german" => "ger",
        "spanish" => "spa",
        "italian" => "ita",
        "portuguese" => "por",
        "russian" => "rus",
        "chinese" | "mandarin" => "chi",
        "korean" => "kor",
        "dutch" => "dut",
        "swedish" => "swe",
        "norwegian" => "nor",
        "danish" => "dan",
        "finnish" => "fin",
        "polish" => "pol",
        "turkish" => "tur",
        "arabic" => "ara",
        "hindi" => "hin",
        "thai" => "tha",
        _ => return lower,
    }
    .to_string()
}

/// Normalize any of a 2-letter code, a 3-letter code, or an English name to a
/// 3-letter ISO 639-2/B code. 3-letter input is passed through lowercased
/// without validation against a known-codes table.
pub fn normalize(input: &str) -> String {
    let trimmed = input.trim();
    match trimmed.len() {
        2 => iso_639_1_to_639_2(trimmed),
        3 => trimmed.to_lowercase(),
        _ => language_name_to_code(trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_two_letter_codes() {
        assert_eq!(iso_639_1_to_639_2("en"), "eng");
        assert_eq!(iso_639_1_to_639_2("JA"), "jpn");
    }

    #[test]
    fn unrecognized_two_letter_code_passes_through_lowercased() {
        assert_eq!(iso_639_1_to_639_2("ZZ"), "zz");
    }

    #[test]
    fn converts_language_names_case_insensitively() {
        assert_eq!(language_name_to_code("English"), "eng");
        assert_eq!(language_name_to_code("JAPANESE"), "jpn");
    }

    #[test]
    fn normalize_dispatches_by_input_length() {
        assert_eq!(normalize("en"), "eng");
        assert_eq!(normalize("ENG"), "eng");
        assert_eq!(normalize("English"), "eng");
    }
}
