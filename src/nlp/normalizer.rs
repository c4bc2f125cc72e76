//! Transcript normalization
//!
//! Turns raw recognizer output into the canonical form the extractor and
//! classifier work on: lower-case, filler-free, with exercise aliases and
//! unit synonyms rewritten to one spelling each.

use crate::nlp::catalog::ExerciseCatalog;
use std::sync::Arc;

/// Multi-word fillers, removed before single words
const FILLER_PHRASES: &[&[&str]] = &[
    &["you", "know"],
    &["i", "mean"],
    &["kind", "of"],
    &["sort", "of"],
];

const FILLER_WORDS: &[&str] = &[
    "um", "umm", "uh", "uhh", "er", "erm", "hmm", "ah", "like", "basically", "actually",
    "just", "please", "so", "well",
];

fn unit_synonym(word: &str) -> Option<&'static str> {
    let canonical = match word {
        "lb" | "lbs" | "pound" | "pounds" => "lbs",
        "kg" | "kgs" | "kilo" | "kilos" | "kilogram" | "kilograms" => "kg",
        "min" | "mins" | "minute" | "minutes" => "min",
        "sec" | "secs" | "second" | "seconds" => "sec",
        "rep" | "reps" | "repetition" | "repetitions" => "reps",
        _ => return None,
    };
    Some(canonical)
}

/// Pure transcript normalizer over a shared exercise catalog
#[derive(Debug, Clone)]
pub struct TranscriptNormalizer {
    catalog: Arc<ExerciseCatalog>,
}

impl TranscriptNormalizer {
    pub fn new(catalog: Arc<ExerciseCatalog>) -> Self {
        Self { catalog }
    }

    /// Normalize a raw transcript; empty input yields an empty string
    pub fn normalize(&self, raw: &str) -> String {
        let cleaned = clean_characters(raw);
        let tokens: Vec<&str> = cleaned.split_whitespace().collect();
        let tokens = remove_fillers(&tokens);
        let tokens: Vec<&str> = tokens
            .into_iter()
            .map(|t| unit_synonym(t).unwrap_or(t))
            .collect();
        self.substitute_aliases(&tokens).join(" ")
    }

    /// Replace the longest alias window at each position with the canonical name
    fn substitute_aliases(&self, tokens: &[&str]) -> Vec<String> {
        let max_window = self.catalog.max_alias_words();
        let mut out = Vec::with_capacity(tokens.len());
        let mut i = 0;

        while i < tokens.len() {
            let longest = max_window.min(tokens.len() - i);
            let hit = (1..=longest).rev().find_map(|len| {
                let phrase = tokens[i..i + len].join(" ");
                self.catalog.lookup_alias(&phrase).map(|def| (len, def.name.clone()))
            });

            match hit {
                Some((len, name)) => {
                    out.extend(name.split(' ').map(str::to_string));
                    i += len;
                }
                None => {
                    out.push(tokens[i].to_string());
                    i += 1;
                }
            }
        }

        out
    }
}

/// Lower-case and strip punctuation, keeping decimal points inside numbers
/// and `@` as its own token; digits glued to letters are split apart
fn clean_characters(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len() + 8);
    let mut prev: Option<char> = None;

    for (i, &c) in chars.iter().enumerate() {
        let c = c.to_lowercase().next().unwrap_or(c);
        if c.is_alphanumeric() {
            if let Some(p) = prev {
                let boundary = (p.is_ascii_digit() && c.is_alphabetic())
                    || (p.is_alphabetic() && c.is_ascii_digit());
                if boundary {
                    out.push(' ');
                }
            }
            out.push(c);
            prev = Some(c);
            continue;
        }

        match c {
            '.' if prev.is_some_and(|p| p.is_ascii_digit())
                && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()) =>
            {
                out.push('.');
                prev = Some('.');
                continue;
            }
            '@' => out.push_str(" @ "),
            '\'' | '\u{2019}' => continue,
            _ => out.push(' '),
        }
        prev = None;
    }

    out
}

fn remove_fillers<'a>(tokens: &[&'a str]) -> Vec<&'a str> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;

    'outer: while i < tokens.len() {
        for phrase in FILLER_PHRASES {
            if tokens[i..].starts_with(phrase) {
                i += phrase.len();
                continue 'outer;
            }
        }
        if !FILLER_WORDS.contains(&tokens[i]) {
            out.push(tokens[i]);
        }
        i += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> TranscriptNormalizer {
        TranscriptNormalizer::new(Arc::new(ExerciseCatalog::builtin()))
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalizer().normalize(""), "");
        assert_eq!(normalizer().normalize("  ,, ?"), "");
    }

    #[test]
    fn test_lowercase_fillers_and_whitespace() {
        let n = normalizer();
        assert_eq!(n.normalize("Um, I   did  uh SQUATS"), "i did squat");
        assert_eq!(n.normalize("you know, log it"), "log it");
    }

    #[test]
    fn test_unit_synonyms() {
        let n = normalizer();
        assert_eq!(n.normalize("225 Pounds"), "225 lbs");
        assert_eq!(n.normalize("100 kilos for 5 repetitions"), "100 kg for 5 reps");
        assert_eq!(n.normalize("rest 2 minutes"), "rest 2 min");
    }

    #[test]
    fn test_digits_split_from_units() {
        assert_eq!(normalizer().normalize("225lbs"), "225 lbs");
        assert_eq!(normalizer().normalize("22.5kg."), "22.5 kg");
    }

    #[test]
    fn test_at_sign_is_a_token() {
        assert_eq!(normalizer().normalize("10@135"), "10 @ 135");
    }

    #[test]
    fn test_alias_substitution_longest_match() {
        let n = normalizer();
        assert_eq!(n.normalize("bench press"), "bench press");
        assert_eq!(n.normalize("did bench"), "did bench press");
        assert_eq!(n.normalize("incline bench 8"), "incline bench press 8");
        assert_eq!(n.normalize("Push-ups"), "push up");
    }

    #[test]
    fn test_apostrophes_dropped() {
        assert_eq!(normalizer().normalize("I'm done, don't log"), "im done dont log");
    }
}
