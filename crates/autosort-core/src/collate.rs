//! Natural-order string collation.
//!
//! Strings are NFKD-normalized and stripped of combining marks, so accents
//! never distinguish two titles. Digit runs compare by numeric value and
//! letters compare case-folded. When case matters, strings that are equal
//! after folding are ordered uppercase first.

use std::cmp::Ordering;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// One collation element. Variant order is the primary class order:
/// punctuation and whitespace, then numbers, then letters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Element {
    Symbol(char),
    /// Significant digit count, then the digits without leading zeros.
    Number(usize, String),
    Letter(char),
}

/// Sort key for one string, built once and compared many times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollationKey {
    primary: Vec<Element>,
    /// One entry per letter, `false` for uppercase so it sorts first.
    case: Vec<bool>,
}

impl CollationKey {
    pub fn new(text: &str) -> Self {
        let mut primary = Vec::new();
        let mut case = Vec::new();
        let mut digits = String::new();

        for c in text.nfkd().filter(|c| !is_combining_mark(*c)) {
            if c.is_ascii_digit() {
                digits.push(c);
                continue;
            }
            flush_number(&mut digits, &mut primary);

            if c.is_alphabetic() {
                case.push(!c.is_uppercase());
                primary.extend(c.to_lowercase().map(Element::Letter));
            } else {
                primary.push(Element::Symbol(c));
            }
        }
        flush_number(&mut digits, &mut primary);

        Self { primary, case }
    }
}

fn flush_number(digits: &mut String, out: &mut Vec<Element>) {
    if digits.is_empty() {
        return;
    }
    let significant = digits.trim_start_matches('0');
    out.push(Element::Number(significant.len(), significant.to_string()));
    digits.clear();
}

/// Compares strings with a fixed case sensitivity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Collator {
    case_insensitive: bool,
}

impl Collator {
    pub fn new(case_insensitive: bool) -> Self {
        Self { case_insensitive }
    }

    pub fn compare(&self, a: &CollationKey, b: &CollationKey) -> Ordering {
        let primary = a.primary.cmp(&b.primary);
        if primary != Ordering::Equal || self.case_insensitive {
            return primary;
        }
        a.case.cmp(&b.case)
    }
}
