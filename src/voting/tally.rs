use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::models::{Ballot, Candidate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub candidate_id: String,
    pub name: String,
    pub votes: u64,
    /// Ballots naming this candidate; differs from `votes` when a write was lost.
    pub ballots: u64,
    pub rank: usize,
}

/// Disagreements between the `votes` collection and the candidate counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    CounterMismatch {
        candidate_id: String,
        counter: u64,
        ballots: u64,
    },
    DuplicateVoter {
        voter_id: String,
        ballots: usize,
    },
    OrphanBallot {
        ballot_id: String,
        candidate_id: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TallyReport {
    pub standings: Vec<Standing>,
    pub total_votes: u64,
    pub total_ballots: usize,
    pub leader: Option<String>,
    pub findings: Vec<Finding>,
    pub summary: String,
}

impl TallyReport {
    pub fn is_consistent(&self) -> bool {
        self.findings.is_empty()
    }
}

pub fn build_report(candidates: &[Candidate], ballots: &[Ballot]) -> TallyReport {
    let mut ballots_per_candidate: HashMap<&str, u64> = HashMap::new();
    // BTreeMap keeps findings in a stable order.
    let mut ballots_per_voter: BTreeMap<&str, usize> = BTreeMap::new();
    let mut findings = Vec::new();

    for ballot in ballots {
        *ballots_per_candidate
            .entry(ballot.candidate_id.as_str())
            .or_insert(0) += 1;
        *ballots_per_voter.entry(ballot.voter_id.as_str()).or_insert(0) += 1;

        if !candidates.iter().any(|c| c.id == ballot.candidate_id) {
            findings.push(Finding::OrphanBallot {
                ballot_id: ballot.id.clone(),
                candidate_id: ballot.candidate_id.clone(),
            });
        }
    }

    let mut standings: Vec<Standing> = candidates
        .iter()
        .map(|candidate| Standing {
            candidate_id: candidate.id.clone(),
            name: candidate.name.clone(),
            votes: candidate.total_votes,
            ballots: ballots_per_candidate
                .get(candidate.id.as_str())
                .copied()
                .unwrap_or(0),
            rank: 0,
        })
        .collect();
    standings.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.name.cmp(&b.name)));

    // Competition ranking: ties share a rank, the next rank skips.
    for i in 0..standings.len() {
        standings[i].rank = if i > 0 && standings[i].votes == standings[i - 1].votes {
            standings[i - 1].rank
        } else {
            i + 1
        };
    }

    for standing in &standings {
        if standing.votes != standing.ballots {
            findings.push(Finding::CounterMismatch {
                candidate_id: standing.candidate_id.clone(),
                counter: standing.votes,
                ballots: standing.ballots,
            });
        }
    }
    for (voter_id, count) in ballots_per_voter {
        if count > 1 {
            findings.push(Finding::DuplicateVoter {
                voter_id: voter_id.to_string(),
                ballots: count,
            });
        }
    }

    let total_votes = standings.iter().map(|s| s.votes).sum();
    let leader = standings
        .first()
        .filter(|s| s.votes > 0)
        .map(|s| s.candidate_id.clone());

    let summary = summarize(&standings, total_votes, ballots.len());

    TallyReport {
        standings,
        total_votes,
        total_ballots: ballots.len(),
        leader,
        findings,
        summary,
    }
}

fn summarize(standings: &[Standing], total_votes: u64, total_ballots: usize) -> String {
    if total_votes == 0 {
        return "No votes were cast.".to_string();
    }

    let mut summary = String::new();
    for standing in standings {
        let share = standing.votes as f64 * 100.0 / total_votes as f64;
        let line = if standing.rank == 1 {
            format!("{}. **{}**: {} votes ({:.1}%)", standing.rank, standing.name, standing.votes, share)
        } else {
            format!("{}. {}: {} votes ({:.1}%)", standing.rank, standing.name, standing.votes, share)
        };
        summary.push_str(&line);
        summary.push('\n');
    }
    summary.push_str(&format!("\n{} ballots recorded.", total_ballots));
    summary
}
