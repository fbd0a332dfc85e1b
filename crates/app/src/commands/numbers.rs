//! Spoken-number parsing for repeat counts and workspace targets.

use once_cell::sync::Lazy;
use regex::Regex;

static ALNUM_TOKENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").unwrap());

/// Cardinals and count-words accepted in repeat expressions.
fn repeat_word_value(token: &str) -> Option<u32> {
    let value = match token {
        "a" | "an" | "one" | "once" => 1,
        "two" | "twice" => 2,
        "three" | "thrice" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
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
        "twenty" => 20,
        "thirty" => 30,
        _ => return None,
    };
    Some(value)
}

/// Extract multiplicative factors from a phrase like "three times two" or
/// "twenty one". The connectors `x`, `times`, `time`, `by` separate
/// factors; tens words compose with a following unit.
pub fn extract_repeat_factors(text: &str) -> Vec<u32> {
    let lower = text.to_lowercase();
    let tokens: Vec<&str> = ALNUM_TOKENS.find_iter(&lower).map(|m| m.as_str()).collect();

    let mut factors = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let tok = tokens[i];

        if tok.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(value) = tok.parse::<u32>() {
                if value > 0 {
                    factors.push(value);
                }
            }
            i += 1;
            continue;
        }

        if matches!(tok, "x" | "times" | "time" | "by") {
            i += 1;
            continue;
        }

        if matches!(tok, "twenty" | "thirty") {
            let mut value = repeat_word_value(tok).unwrap_or(0);
            if let Some(next) = tokens.get(i + 1) {
                if let Some(unit) = repeat_word_value(next) {
                    if (1..=9).contains(&unit) {
                        value += unit;
                        i += 1;
                    }
                }
            }
            factors.push(value);
            i += 1;
            continue;
        }

        if let Some(value) = repeat_word_value(tok) {
            if value > 0 {
                factors.push(value);
            }
        }
        i += 1;
    }

    factors
}

/// Product of the factors, clamped to `[1, max]`. An empty phrase yields
/// the (clamped) default.
pub fn parse_repeat_count(text: &str, default_value: u32, max: u32) -> u32 {
    let max = max.max(1);
    let factors = extract_repeat_factors(text);
    if factors.is_empty() {
        return default_value.clamp(1, max);
    }
    let mut total: u64 = 1;
    for factor in factors {
        total *= u64::from(factor.max(1));
        if total >= u64::from(max) {
            return max;
        }
    }
    (total as u32).clamp(1, max)
}

/// Workspace number and ordinal words.
pub fn workspace_number_word(word: &str) -> Option<&'static str> {
    let digit = match word {
        "zero" => "0",
        "one" | "first" => "1",
        "two" | "second" => "2",
        "three" | "third" => "3",
        "four" | "fourth" => "4",
        "five" | "fifth" => "5",
        "six" | "sixth" => "6",
        "seven" | "seventh" => "7",
        "eight" | "eighth" => "8",
        "nine" | "ninth" => "9",
        "ten" | "tenth" => "10",
        _ => return None,
    };
    Some(digit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_and_words_both_parse() {
        assert_eq!(parse_repeat_count("5", 1, 30), 5);
        assert_eq!(parse_repeat_count("five", 1, 30), 5);
        assert_eq!(parse_repeat_count("twice", 1, 30), 2);
        assert_eq!(parse_repeat_count("thrice", 1, 30), 3);
        assert_eq!(parse_repeat_count("a", 1, 30), 1);
    }

    #[test]
    fn tens_compose_with_units() {
        assert_eq!(extract_repeat_factors("twenty one"), vec![21]);
        assert_eq!(extract_repeat_factors("thirty"), vec![30]);
        assert_eq!(extract_repeat_factors("twenty"), vec![20]);
        // "twenty ten" does not compose; ten is out of unit range.
        assert_eq!(extract_repeat_factors("twenty ten"), vec![20, 10]);
    }

    #[test]
    fn connectors_turn_factors_into_a_product() {
        assert_eq!(parse_repeat_count("three times two", 1, 30), 6);
        assert_eq!(parse_repeat_count("2 x 4", 1, 30), 8);
        assert_eq!(parse_repeat_count("two by three", 1, 30), 6);
    }

    #[test]
    fn product_is_clamped() {
        assert_eq!(parse_repeat_count("ten times ten", 1, 30), 30);
        assert_eq!(parse_repeat_count("twenty one times", 1, 30), 21);
    }

    #[test]
    fn empty_and_junk_fall_back_to_default() {
        assert_eq!(parse_repeat_count("", 1, 30), 1);
        assert_eq!(parse_repeat_count("lots", 1, 30), 1);
        assert_eq!(parse_repeat_count("", 99, 30), 30);
    }

    #[test]
    fn workspace_words_map_to_digits() {
        assert_eq!(workspace_number_word("three"), Some("3"));
        assert_eq!(workspace_number_word("third"), Some("3"));
        assert_eq!(workspace_number_word("ten"), Some("10"));
        assert_eq!(workspace_number_word("eleventh"), None);
    }
}
