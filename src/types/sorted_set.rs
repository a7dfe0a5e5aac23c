use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

/// Sorted set: a HashMap for O(1) score lookup by member, kept in sync with
/// a BTreeSet ordered by (score, member).
///
/// Members with equal scores are ordered by their bytes, so range queries
/// are deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortedSet {
    /// member -> score
    by_member: HashMap<Vec<u8>, f64>,
    /// (score, member), ascending
    ordered: BTreeSet<ScoreKey>,
}

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
struct ScoreKey {
    score_bits: u64, // IEEE 754 bits, transformed for ordering
    member: Vec<u8>,
}

impl ScoreKey {
    fn new(score: f64, member: Vec<u8>) -> Self {
        ScoreKey {
            score_bits: f64_to_orderable(score),
            member,
        }
    }

    fn score(&self) -> f64 {
        orderable_to_f64(self.score_bits)
    }
}

/// Transform f64 bits so that standard u64 ordering matches f64 ordering.
fn f64_to_orderable(f: f64) -> u64 {
    let bits = f.to_bits();
    if bits >> 63 == 1 {
        // Negative: flip all bits
        !bits
    } else {
        // Positive: flip sign bit
        bits ^ (1 << 63)
    }
}

fn orderable_to_f64(bits: u64) -> f64 {
    if bits >> 63 == 1 {
        f64::from_bits(bits ^ (1 << 63))
    } else {
        f64::from_bits(!bits)
    }
}

impl SortedSet {
    pub fn new() -> Self {
        SortedSet {
            by_member: HashMap::new(),
            ordered: BTreeSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_member.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_member.is_empty()
    }

    /// Add or update a member. Returns true if the member was new.
    pub fn add(&mut self, member: Vec<u8>, score: f64) -> bool {
        // -0.0 and 0.0 compare equal as scores
        let score = if score == 0.0 { 0.0 } else { score };
        match self.by_member.insert(member.clone(), score) {
            Some(old_score) => {
                self.ordered.remove(&ScoreKey::new(old_score, member.clone()));
                self.ordered.insert(ScoreKey::new(score, member));
                false
            }
            None => {
                self.ordered.insert(ScoreKey::new(score, member));
                true
            }
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.by_member.remove(member) {
            Some(score) => {
                self.ordered.remove(&ScoreKey::new(score, member.to_vec()));
                true
            }
            None => false,
        }
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.by_member.get(member).copied()
    }

    /// Members at rank positions `[start, stop]` inclusive, ascending.
    /// Negative indices count from the end; out-of-range bounds are clamped.
    pub fn range(&self, start: i64, stop: i64) -> Vec<(&[u8], f64)> {
        let len = self.len() as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

        if start > stop || start >= len {
            return vec![];
        }

        self.ordered
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .map(|k| (k.member.as_slice(), k.score()))
            .collect()
    }

    /// Members with scores in `[min, max]` inclusive, ascending.
    pub fn range_by_score(&self, min: f64, max: f64) -> Vec<(&[u8], f64)> {
        if min > max {
            return vec![];
        }
        let lower = ScoreKey::new(min, Vec::new());
        self.ordered
            .range((Bound::Included(lower), Bound::Unbounded))
            .take_while(|k| k.score() <= max)
            .map(|k| (k.member.as_slice(), k.score()))
            .collect()
    }
}

/// Render a score the way replies carry it: shortest round-trip form,
/// `inf`/`-inf` for infinities.
pub fn format_score(score: f64) -> String {
    if score == 0.0 {
        return "0".to_string();
    }
    score.to_string()
}
