//! Fuzzy scoring used to suggest close matches after an exact lookup misses.
//!
//! `score = 1 - levenshtein(a, b) / max(len(a), len(b))`, plus a bonus when one
//! string is a prefix of the other (or, failing that, contains it). Users tend to
//! type a ticker with a trailing typo or a truncated company name, and both cases
//! sit far apart by edit distance alone.

use std::cmp::Ordering;

pub const MAX_SUGGESTIONS: usize = 5;
pub const MIN_SCORE: f64 = 0.5;

const PREFIX_BONUS: f64 = 0.30;
const CONTAINS_BONUS: f64 = 0.15;

/// Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0; b_chars.len() + 1];

    for (i, a_ch) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, b_ch) in b_chars.iter().enumerate() {
            let substitution = previous[j] + usize::from(a_ch != *b_ch);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b_chars.len()]
}

/// Similarity of two already-normalized strings.
pub fn score(query: &str, candidate: &str) -> f64 {
    let longest = query.chars().count().max(candidate.chars().count());
    if longest == 0 {
        return 1.0;
    }

    let distance = levenshtein(query, candidate) as f64;
    let base = 1.0 - distance / longest as f64;

    let bonus = if candidate.starts_with(query) || query.starts_with(candidate) {
        PREFIX_BONUS
    } else if candidate.contains(query) || query.contains(candidate) {
        CONTAINS_BONUS
    } else {
        0.0
    };

    base + bonus
}

/// Ranks `(compare_key, value)` candidates against `query`.
///
/// Returns at most [`MAX_SUGGESTIONS`] values scoring at least [`MIN_SCORE`],
/// ordered by descending score and then alphabetically by value.
pub fn rank<'a, I>(query: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    if query.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(f64, &str)> = candidates
        .into_iter()
        .filter_map(|(key, value)| {
            let similarity = score(query, key);
            (similarity >= MIN_SCORE).then_some((similarity, value))
        })
        .collect();

    scored.sort_by(|(left_score, left), (right_score, right)| {
        match right_score.total_cmp(left_score) {
            Ordering::Equal => left.cmp(right),
            other => other,
        }
    });

    let mut suggestions: Vec<String> = Vec::with_capacity(MAX_SUGGESTIONS);
    for (_, value) in scored {
        if suggestions.iter().any(|existing| existing == value) {
            continue;
        }
        suggestions.push(value.to_owned());
        if suggestions.len() == MAX_SUGGESTIONS {
            break;
        }
    }
    suggestions
}
