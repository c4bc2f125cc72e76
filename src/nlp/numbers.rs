//! Spoken number parsing
//!
//! Gym numbers are said the way plates are read: "two twenty five" is 225,
//! "one oh five" is 105. Windows are parsed from the longest supported
//! length down so compounds are consumed whole.

/// Longest word window the parser understands ("two hundred and twenty five")
pub const MAX_WORD_WINDOW: usize = 5;

fn unit_value(word: &str) -> Option<u32> {
    let value = match word {
        "zero" => 0,
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        _ => return None,
    };
    Some(value)
}

fn teen_value(word: &str) -> Option<u32> {
    let value = match word {
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "thirteen" => 13,
        "fourteen" => 14,
        "fifteen" => 15,
        "sixteen" => 16,
        "seventeen" => 17,
        "eighteen" => 18,
        "nineteen" => 19,
        _ => return None,
    };
    Some(value)
}

fn tens_value(word: &str) -> Option<u32> {
    let value = match word {
        "twenty" => 20,
        "thirty" => 30,
        "forty" => 40,
        "fifty" => 50,
        "sixty" => 60,
        "seventy" => 70,
        "eighty" => 80,
        "ninety" => 90,
        _ => return None,
    };
    Some(value)
}

fn nonzero_unit(word: &str) -> Option<u32> {
    unit_value(word).filter(|v| *v > 0)
}

/// Value of anything that can follow "hundred": 1-99
fn below_hundred(words: &[&str]) -> Option<u32> {
    match words {
        [w] => nonzero_unit(w).or_else(|| teen_value(w)).or_else(|| tens_value(w)),
        [t, u] => Some(tens_value(t)? + nonzero_unit(u)?),
        _ => None,
    }
}

/// True when the word can start a spoken number
pub fn is_number_word(word: &str) -> bool {
    unit_value(word).is_some()
        || teen_value(word).is_some()
        || tens_value(word).is_some()
        || matches!(word, "hundred" | "dozen")
}

/// Parse exactly `words` as one number, or `None` if the window is not a
/// single well-formed spoken number
pub fn parse_word_window(words: &[&str]) -> Option<u32> {
    match *words {
        [w] => match w {
            "hundred" => Some(100),
            "dozen" => Some(12),
            _ => unit_value(w).or_else(|| teen_value(w)).or_else(|| tens_value(w)),
        },
        [a, b] => {
            if let (Some(t), Some(u)) = (tens_value(a), nonzero_unit(b)) {
                return Some(t + u);
            }
            let hundreds = nonzero_unit(a)?;
            if b == "hundred" {
                return Some(hundreds * 100);
            }
            // "two twenty" = 220, "one fifteen" = 115
            let rest = tens_value(b).or_else(|| teen_value(b))?;
            Some(hundreds * 100 + rest)
        }
        [a, b, c] => {
            let hundreds = nonzero_unit(a)?;
            match b {
                "hundred" => Some(hundreds * 100 + below_hundred(&[c])?),
                "oh" => Some(hundreds * 100 + nonzero_unit(c)?),
                _ => Some(hundreds * 100 + tens_value(b)? + nonzero_unit(c)?),
            }
        }
        [a, b, c, d] => {
            let hundreds = nonzero_unit(a)?;
            if b != "hundred" {
                return None;
            }
            if c == "and" {
                Some(hundreds * 100 + below_hundred(&[d])?)
            } else {
                Some(hundreds * 100 + below_hundred(&[c, d])?)
            }
        }
        [a, "hundred", "and", c, d] => Some(nonzero_unit(a)? * 100 + below_hundred(&[c, d])?),
        _ => None,
    }
}

/// Parse a digit token such as "225" or "22.5"
pub fn parse_digits(token: &str) -> Option<f64> {
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    if token.matches('.').count() > 1 || token.starts_with('.') || token.ends_with('.') {
        return None;
    }
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_words() {
        assert_eq!(parse_word_window(&["eight"]), Some(8));
        assert_eq!(parse_word_window(&["twelve"]), Some(12));
        assert_eq!(parse_word_window(&["forty"]), Some(40));
        assert_eq!(parse_word_window(&["dozen"]), Some(12));
        assert_eq!(parse_word_window(&["bench"]), None);
    }

    #[test]
    fn test_two_word_compounds() {
        assert_eq!(parse_word_window(&["twenty", "five"]), Some(25));
        assert_eq!(parse_word_window(&["two", "hundred"]), Some(200));
        assert_eq!(parse_word_window(&["two", "twenty"]), Some(220));
        assert_eq!(parse_word_window(&["one", "fifteen"]), Some(115));
        assert_eq!(parse_word_window(&["twenty", "zero"]), None);
        assert_eq!(parse_word_window(&["five", "reps"]), None);
    }

    #[test]
    fn test_three_word_compounds() {
        assert_eq!(parse_word_window(&["two", "twenty", "five"]), Some(225));
        assert_eq!(parse_word_window(&["one", "oh", "five"]), Some(105));
        assert_eq!(parse_word_window(&["three", "hundred", "fifteen"]), Some(315));
        assert_eq!(parse_word_window(&["twenty", "five", "twenty"]), None);
    }

    #[test]
    fn test_four_word_compounds() {
        assert_eq!(
            parse_word_window(&["two", "hundred", "twenty", "five"]),
            Some(225)
        );
        assert_eq!(parse_word_window(&["two", "hundred", "and", "five"]), Some(205));
        assert_eq!(parse_word_window(&["two", "twenty", "five", "pounds"]), None);
    }

    #[test]
    fn test_five_word_compounds() {
        assert_eq!(
            parse_word_window(&["two", "hundred", "and", "twenty", "five"]),
            Some(225)
        );
        assert_eq!(
            parse_word_window(&["one", "hundred", "and", "thirty", "five"]),
            Some(135)
        );
        assert_eq!(parse_word_window(&["two", "hundred", "and", "five", "reps"]), None);
        assert_eq!(parse_word_window(&["two", "twenty", "and", "thirty", "five"]), None);
    }

    #[test]
    fn test_digits() {
        assert_eq!(parse_digits("225"), Some(225.0));
        assert_eq!(parse_digits("22.5"), Some(22.5));
        assert_eq!(parse_digits("2.2.5"), None);
        assert_eq!(parse_digits("10x"), None);
        assert_eq!(parse_digits("."), None);
    }
}
