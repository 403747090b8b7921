//! Natural (numeric-aware) string ordering
//!
//! Embedded runs of ASCII digits compare by numeric value, everything else
//! compares lexically, so `q2` sorts before `q10`.

use std::cmp::Ordering;

/// A maximal run of either digits or non-digits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digits)
            .map(|(idx, _)| idx)
            .unwrap_or(self.rest.len());

        let (head, tail) = self.rest.split_at(end);
        self.rest = tail;

        Some(if digits {
            Chunk::Digits(head)
        } else {
            Chunk::Text(head)
        })
    }
}

fn compare_digits(a: &str, b: &str) -> Ordering {
    let a_trimmed = a.trim_start_matches('0');
    let b_trimmed = b.trim_start_matches('0');

    // No integer parsing: digit runs can be arbitrarily long
    a_trimmed
        .len()
        .cmp(&b_trimmed.len())
        .then_with(|| a_trimmed.cmp(b_trimmed))
}

fn compare_chunks(a: Chunk<'_>, b: Chunk<'_>) -> Ordering {
    match (a, b) {
        (Chunk::Digits(x), Chunk::Digits(y)) => compare_digits(x, y),
        (Chunk::Text(x), Chunk::Text(y)) => x.cmp(y),
        (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
        (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
    }
}

/// Compare two strings using natural ordering
///
/// Strings that differ only in leading zeros (`q01` vs `q1`) compare equal
/// here; callers needing a total order break the tie themselves.
///
/// # Examples
///
/// ```
/// use gleaner_domain::natural_cmp;
/// use std::cmp::Ordering;
///
/// assert_eq!(natural_cmp("item2", "item10"), Ordering::Less);
/// assert_eq!(natural_cmp("item10", "item9"), Ordering::Greater);
/// assert_eq!(natural_cmp("a", "a"), Ordering::Equal);
/// ```
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks { rest: a };
    let mut right = Chunks { rest: b };

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = compare_chunks(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_runs_compare_by_value() {
        assert_eq!(natural_cmp("q2", "q10"), Ordering::Less);
        assert_eq!(natural_cmp("q100", "q99"), Ordering::Greater);
        assert_eq!(natural_cmp("page3_q12", "page3_q2"), Ordering::Greater);
    }

    #[test]
    fn test_text_runs_compare_lexically() {
        assert_eq!(natural_cmp("alpha", "beta"), Ordering::Less);
        assert_eq!(natural_cmp("q1a", "q1b"), Ordering::Less);
    }

    #[test]
    fn test_prefix_sorts_first() {
        assert_eq!(natural_cmp("q1", "q1_extra"), Ordering::Less);
        assert_eq!(natural_cmp("", "q1"), Ordering::Less);
    }

    #[test]
    fn test_leading_zeros_are_equal() {
        assert_eq!(natural_cmp("q01", "q1"), Ordering::Equal);
    }

    #[test]
    fn test_huge_digit_runs() {
        let a = format!("q{}", "9".repeat(40));
        let b = format!("q1{}", "0".repeat(40));
        assert_eq!(natural_cmp(&a, &b), Ordering::Less);
    }

    #[test]
    fn test_non_ascii_text() {
        assert_eq!(natural_cmp("câu2", "câu10"), Ordering::Less);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: the same prefix followed by integers orders by integer value
        #[test]
        fn prop_numeric_suffix_order(prefix in "[a-z_]{0,6}", a in 0u64..1_000_000, b in 0u64..1_000_000) {
            let left = format!("{}{}", prefix, a);
            let right = format!("{}{}", prefix, b);
            prop_assert_eq!(natural_cmp(&left, &right), a.cmp(&b));
        }

        /// Property: ordering is antisymmetric
        #[test]
        fn prop_antisymmetric(a in "[a-z0-9]{0,8}", b in "[a-z0-9]{0,8}") {
            prop_assert_eq!(natural_cmp(&a, &b), natural_cmp(&b, &a).reverse());
        }

        /// Property: strings without digits order exactly like `str::cmp`
        #[test]
        fn prop_plain_text_is_lexical(a in "[a-z]{0,8}", b in "[a-z]{0,8}") {
            prop_assert_eq!(natural_cmp(&a, &b), a.cmp(&b));
        }
    }
}
