//! Candidate scoring and selection.

use std::collections::HashSet;

use crate::ocr::parsing::parse_amount;
use crate::ocr::util::only_digits;

/// A parsed candidate with its feature score. Transient, per selection.
struct Candidate {
    amount: i64,
    raw: String,
    score: i32,
}

fn score_for(raw: &str) -> i32 {
    let low = raw.to_lowercase();
    let mut score = 0;
    if low.contains("rp") || low.contains("idr") {
        score += 10;
    }
    if low.contains("total") {
        score += 8;
    }
    if raw.contains('.') || raw.contains(',') {
        score += 5;
    }
    if raw.ends_with(",00") || raw.ends_with(".00") {
        score += 3;
    }
    if only_digits(raw).len() >= 4 {
        score += 1;
    }
    score
}

/// Selects the best amount from the candidate list.
///
/// Selection order: highest score, then largest parsed amount, then longest
/// raw, then lexicographically smallest raw. Returns `None` when nothing
/// parses, and also when several candidates tie at a score with no
/// distinguishing feature (score <= 1) while disagreeing on the amount:
/// multiple amounts with no winner.
pub fn best_amount_from_matches(matches: &[String]) -> Option<(i64, String)> {
    let mut candidates = Vec::new();
    for raw in matches {
        let Some(amount) = parse_amount(raw) else {
            continue;
        };
        if amount <= 0 {
            continue;
        }
        candidates.push(Candidate {
            amount,
            raw: raw.clone(),
            score: score_for(raw),
        });
    }
    if candidates.is_empty() {
        return None;
    }

    let top_score = candidates.iter().map(|c| c.score).max().unwrap_or(0);
    if candidates.len() >= 2 && top_score <= 1 {
        let top_amounts: HashSet<i64> = candidates
            .iter()
            .filter(|c| c.score == top_score)
            .map(|c| c.amount)
            .collect();
        if top_amounts.len() > 1 {
            return None;
        }
    }

    let mut best = &candidates[0];
    for candidate in &candidates[1..] {
        let replace = match candidate.score.cmp(&best.score) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => match candidate.amount.cmp(&best.amount) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Less => false,
                std::cmp::Ordering::Equal => {
                    candidate.raw.len() > best.raw.len()
                        || (candidate.raw.len() == best.raw.len() && candidate.raw < best.raw)
                }
            },
        };
        if replace {
            best = candidate;
        }
    }
    Some((best.amount, best.raw.clone()))
}
