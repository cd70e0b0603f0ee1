use regex::{Regex, RegexBuilder};

use crate::categorizer::similarity::partial_ratio;
use crate::error::ConfigurationError;
use crate::settings::CategorizerSettings;

/// Compiled, lowercased form of the categorizer settings.
///
/// Built once at startup; every list is validated here so that evaluation
/// itself cannot fail.
#[derive(Debug, Clone)]
pub struct PatternLibrary {
    primary_keywords: Vec<String>,
    secondary_keywords: Vec<String>,
    excluded_keywords: Vec<String>,
    excluded_senders: Vec<String>,
    regexes: Vec<Regex>,
    advanced_phrases: Vec<String>,
    important_attachment_keywords: Vec<String>,
    fuzzy_threshold: f64,
    advanced_fuzzy_threshold: f64,
}

fn lowercase_list(items: &[String], list: &'static str) -> Result<Vec<String>, ConfigurationError> {
    items
        .iter()
        .map(|item| {
            let trimmed = item.trim();
            if trimmed.is_empty() {
                Err(ConfigurationError::EmptyEntry { list })
            } else {
                Ok(trimmed.to_lowercase())
            }
        })
        .collect()
}

fn threshold(value: u8, name: &'static str) -> Result<f64, ConfigurationError> {
    if value > 100 {
        return Err(ConfigurationError::ThresholdOutOfRange { name, value });
    }
    Ok(f64::from(value))
}

fn contains_any(text: &str, needles: &[String]) -> bool {
    needles.iter().any(|needle| text.contains(needle.as_str()))
}

fn fuzzy_any(text: &str, needles: &[String], threshold: f64) -> bool {
    needles.iter().any(|needle| partial_ratio(needle, text) >= threshold)
}

impl PatternLibrary {
    pub fn new(settings: &CategorizerSettings) -> Result<Self, ConfigurationError> {
        let regexes = settings
            .regex_patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| ConfigurationError::InvalidPattern {
                        pattern: pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            primary_keywords: lowercase_list(&settings.primary_keywords, "primaryKeywords")?,
            secondary_keywords: lowercase_list(&settings.secondary_keywords, "secondaryKeywords")?,
            excluded_keywords: lowercase_list(&settings.excluded_keywords, "excludedKeywords")?,
            excluded_senders: lowercase_list(&settings.excluded_senders, "excludedSenders")?,
            regexes,
            advanced_phrases: lowercase_list(&settings.advanced_phrases, "advancedPhrases")?,
            important_attachment_keywords: lowercase_list(
                &settings.important_attachment_keywords,
                "importantAttachmentKeywords",
            )?,
            fuzzy_threshold: threshold(settings.fuzzy_threshold, "fuzzyThreshold")?,
            advanced_fuzzy_threshold: threshold(
                settings.advanced_fuzzy_threshold,
                "advancedFuzzyThreshold",
            )?,
        })
    }

    // All text arguments below are expected to be lowercased already.

    pub fn is_excluded_sender(&self, sender: &str) -> bool {
        contains_any(sender, &self.excluded_senders)
    }

    pub fn has_excluded_keyword(&self, subject: &str) -> bool {
        contains_any(subject, &self.excluded_keywords)
    }

    pub fn has_primary_keyword(&self, subject: &str) -> bool {
        contains_any(subject, &self.primary_keywords)
    }

    pub fn has_secondary_keyword(&self, subject: &str) -> bool {
        contains_any(subject, &self.secondary_keywords)
    }

    pub fn matches_regex(&self, subject: &str) -> bool {
        self.regexes.iter().any(|regex| regex.is_match(subject))
    }

    /// Any primary keyword scores at least `fuzzyThreshold` against `text`.
    pub fn fuzzy_primary_match(&self, text: &str) -> bool {
        fuzzy_any(text, &self.primary_keywords, self.fuzzy_threshold)
    }

    /// Any canonical intent phrase scores at least `advancedFuzzyThreshold` against `text`.
    pub fn advanced_phrase_match(&self, text: &str) -> bool {
        fuzzy_any(text, &self.advanced_phrases, self.advanced_fuzzy_threshold)
    }

    pub fn is_important_attachment(&self, file_name: &str) -> bool {
        contains_any(&file_name.to_lowercase(), &self.important_attachment_keywords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> PatternLibrary {
        PatternLibrary::new(&CategorizerSettings::default()).unwrap()
    }

    #[test]
    fn test_default_settings_compile() {
        let library = library();
        assert_eq!(library.regexes.len(), 6);
        assert_eq!(library.fuzzy_threshold, 90.0);
        assert_eq!(library.advanced_fuzzy_threshold, 75.0);
    }

    #[test]
    fn test_invalid_regex_is_rejected_at_load() {
        let settings = CategorizerSettings {
            regex_patterns: vec![r"\breset(.*password".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            PatternLibrary::new(&settings),
            Err(ConfigurationError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_empty_keyword_is_rejected_at_load() {
        let settings = CategorizerSettings {
            primary_keywords: vec!["reset".to_string(), "  ".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            PatternLibrary::new(&settings),
            Err(ConfigurationError::EmptyEntry { list: "primaryKeywords" })
        ));
    }

    #[test]
    fn test_threshold_above_hundred_is_rejected() {
        let settings = CategorizerSettings {
            advanced_fuzzy_threshold: 101,
            ..Default::default()
        };
        assert!(matches!(
            PatternLibrary::new(&settings),
            Err(ConfigurationError::ThresholdOutOfRange { name: "advancedFuzzyThreshold", .. })
        ));
    }

    #[test]
    fn test_keyword_lists_are_lowercased() {
        let library = library();
        assert!(library.has_excluded_keyword("ucube access request"));
        assert!(library.is_excluded_sender("le-helpdesk.ph"));
    }

    #[test]
    fn test_regexes_match_intent_phrases() {
        let library = library();
        assert!(library.matches_regex("please reset my password"));
        assert!(library.matches_regex("unlock user account"));
        assert!(library.matches_regex("CHANGE MOBILE NUMBER"));
        assert!(!library.matches_regex("password reset"));
    }

    #[test]
    fn test_attachment_names_are_checked_case_insensitively() {
        let library = library();
        assert!(library.is_important_attachment("Reset_Form.PDF"));
        assert!(!library.is_important_attachment("invoice.pdf"));
    }
}
