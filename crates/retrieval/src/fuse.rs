//! Evidence fusion: score normalization, weighted combination, fingerprint
//! deduplication, and the bounded context window.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Team,
    Player,
    News,
    Match,
    Standing,
    Injury,
    Transfer,
    GraphNode,
    Sentinel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub kind: SourceKind,
    pub id: Option<i64>,
}

impl SourceRef {
    pub fn new(kind: SourceKind, id: i64) -> Self {
        Self { kind, id: Some(id) }
    }

    pub fn sentinel() -> Self {
        Self {
            kind: SourceKind::Sentinel,
            id: None,
        }
    }
}

/// One candidate context line before fusion. Exactly one of the two channel
/// scores is meaningful; the other stays at zero.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub text: String,
    pub source: SourceRef,
    pub fts_score: f64,
    pub graph_score: f64,
}

impl Candidate {
    pub fn fts(text: String, source: SourceRef, score: f64) -> Self {
        Self {
            text,
            source,
            fts_score: score,
            graph_score: 0.0,
        }
    }

    pub fn graph(text: String, source: SourceRef, score: f64) -> Self {
        Self {
            text,
            source,
            fts_score: 0.0,
            graph_score: score,
        }
    }
}

/// A fused evidence line in the final context window.
#[derive(Debug, Clone)]
pub struct EvidenceLine {
    pub text: String,
    pub source: SourceRef,
    pub score: f64,
}

/// Canonical fact fingerprint: lower-cased, whitespace-collapsed, first 50
/// characters. Collisions on a shared prefix are accepted as conservative
/// deduplication.
pub fn fingerprint(line: &str) -> String {
    let collapsed = line.to_lowercase();
    let mut out = String::with_capacity(50);
    let mut pending_space = false;
    for ch in collapsed.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
        if out.chars().count() >= 50 {
            break;
        }
    }
    out
}

/// Fuse candidates into the bounded context window.
///
/// FTS scores are normalized by the round's top FTS score; graph scores are
/// already in `[0,1]` (edge weight × depth decay). The final score is
/// `beta·fts + gamma·graph`; duplicates (by fingerprint) keep the
/// highest-scored instance.
pub fn fuse(candidates: Vec<Candidate>, beta: f64, gamma: f64, max_lines: usize) -> Vec<EvidenceLine> {
    let top_fts = candidates
        .iter()
        .map(|c| c.fts_score)
        .fold(0.0_f64, f64::max);

    let mut best: Vec<EvidenceLine> = Vec::new();
    let mut index: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for candidate in candidates {
        let fts_norm = if top_fts > 0.0 {
            (candidate.fts_score / top_fts).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let graph = candidate.graph_score.clamp(0.0, 1.0);
        let score = beta * fts_norm + gamma * graph;

        let key = fingerprint(&candidate.text);
        match index.get(&key) {
            Some(&slot) if best[slot].score >= score => {}
            Some(&slot) => {
                best[slot] = EvidenceLine {
                    text: candidate.text,
                    source: candidate.source,
                    score,
                };
            }
            None => {
                index.insert(key, best.len());
                best.push(EvidenceLine {
                    text: candidate.text,
                    source: candidate.source,
                    score,
                });
            }
        }
    }

    best.sort_by(|a, b| b.score.total_cmp(&a.score));
    best.truncate(max_lines);
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_collapses_case_and_whitespace() {
        assert_eq!(
            fingerprint("  Arsenal   is 1st\twith 39 points "),
            "arsenal is 1st with 39 points"
        );
    }

    #[test]
    fn fingerprint_truncates_at_fifty_chars() {
        let long = "x".repeat(80);
        assert_eq!(fingerprint(&long).chars().count(), 50);
    }

    #[test]
    fn fts_scores_normalize_against_round_top() {
        let lines = fuse(
            vec![
                Candidate::fts("top hit".into(), SourceRef::new(SourceKind::News, 1), 4.0),
                Candidate::fts("half hit".into(), SourceRef::new(SourceKind::News, 2), 2.0),
            ],
            0.6,
            0.4,
            20,
        );
        assert!((lines[0].score - 0.6).abs() < 1e-9);
        assert!((lines[1].score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn duplicates_keep_highest_scored_instance() {
        let lines = fuse(
            vec![
                Candidate::fts("Arsenal won the derby".into(), SourceRef::new(SourceKind::News, 1), 1.0),
                Candidate::graph(
                    "Arsenal  WON the Derby".into(),
                    SourceRef::new(SourceKind::GraphNode, 7),
                    1.0,
                ),
            ],
            0.6,
            0.4,
            20,
        );
        assert_eq!(lines.len(), 1);
        // beta·1.0 = 0.6 beats gamma·1.0 = 0.4, so the FTS instance survives.
        assert_eq!(lines[0].source.kind, SourceKind::News);
    }

    #[test]
    fn window_is_bounded_and_sorted_descending() {
        let candidates: Vec<Candidate> = (0..40)
            .map(|i| {
                Candidate::graph(
                    format!("fact number {i}"),
                    SourceRef::new(SourceKind::GraphNode, i),
                    (i as f64) / 40.0,
                )
            })
            .collect();
        let lines = fuse(candidates, 0.6, 0.4, 20);
        assert_eq!(lines.len(), 20);
        assert!(lines.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
