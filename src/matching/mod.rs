/// Generic criteria matcher
///
/// One ranking engine answers the "which X applies?" question: candidates
/// declare constraints per dimension and go through the same
/// filter-score-rank pass regardless of what they represent. Workflow
/// selection for a new record is the current consumer.
///
/// A candidate with no constraint on a dimension is a wildcard there. More
/// declared (non-wildcard) constraints means more specific, and more specific
/// wins. Equal top scores are returned together as an ambiguous result for
/// the caller to disambiguate.

use crate::workflow::types::Workflow;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Constraint dimensions a candidate may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Classification,
    Location,
    Department,
    Channel,
    RecordType,
}

/// One selectable candidate with its declared constraints.
///
/// A constraint is satisfied when the input criteria carry a value for that
/// dimension and the value is among the allowed set. Multi-valued sets cover
/// many-to-many assignments (a workflow assigned to several classifications).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    constraints: HashMap<Dimension, Vec<String>>,
}

impl Candidate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            constraints: HashMap::new(),
        }
    }

    /// Declare a single-valued constraint on a dimension.
    pub fn constrain(mut self, dim: Dimension, value: impl Into<String>) -> Self {
        self.constraints.insert(dim, vec![value.into()]);
        self
    }

    /// Declare a set-valued constraint; any listed value satisfies it.
    pub fn constrain_any(mut self, dim: Dimension, values: Vec<String>) -> Self {
        if !values.is_empty() {
            self.constraints.insert(dim, values);
        }
        self
    }

    /// Number of dimensions with an actual (non-wildcard) constraint.
    fn specificity(&self) -> usize {
        self.constraints.len()
    }

    fn satisfied_by(&self, criteria: &HashMap<Dimension, String>) -> bool {
        self.constraints.iter().all(|(dim, allowed)| {
            criteria
                .get(dim)
                .map(|value| allowed.iter().any(|a| a == value))
                .unwrap_or(false)
        })
    }
}

/// Outcome of a matching pass.
///
/// `single` is true only when exactly one candidate holds the top score, in
/// which case `matched_id` names it. Several tied survivors come back in
/// `matches` for the caller to disambiguate; no survivors is an empty result,
/// not an error.
#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    pub matches: Vec<String>,
    pub single: bool,
    pub matched_id: Option<String>,
}

impl MatchOutcome {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Run the filter-score-rank pass over the candidates.
///
/// 1. Keep candidates whose every declared constraint is satisfied.
/// 2. Score survivors by declared-constraint count.
/// 3. Return the whole top-scoring tier; a tier of one is a single match.
pub fn match_candidates(
    candidates: &[Candidate],
    criteria: &HashMap<Dimension, String>,
) -> MatchOutcome {
    let mut survivors: Vec<(&Candidate, usize)> = candidates
        .iter()
        .filter(|c| c.satisfied_by(criteria))
        .map(|c| (c, c.specificity()))
        .collect();

    survivors.sort_by(|a, b| b.1.cmp(&a.1));

    let top = match survivors.first() {
        Some(&(_, score)) => score,
        None => {
            return MatchOutcome {
                matches: Vec::new(),
                single: false,
                matched_id: None,
            }
        }
    };

    let matches: Vec<String> = survivors
        .iter()
        .take_while(|&&(_, score)| score == top)
        .map(|(c, _)| c.id.clone())
        .collect();

    let single = matches.len() == 1;
    let matched_id = if single { matches.first().cloned() } else { None };

    MatchOutcome {
        matches,
        single,
        matched_id,
    }
}

/// Build a matching candidate from a workflow's declared constraints.
///
/// Default workflows are the no-match fallback and are excluded from the
/// ranked pass; the engine falls back to them when the outcome is empty.
pub fn workflow_candidate(workflow: &Workflow) -> Candidate {
    let mut candidate = Candidate::new(workflow.id.clone())
        .constrain_any(Dimension::Classification, workflow.classifications.clone());
    if let Some(location) = &workflow.location {
        candidate = candidate.constrain(Dimension::Location, location.clone());
    }
    if let Some(department) = &workflow.department {
        candidate = candidate.constrain(Dimension::Department, department.clone());
    }
    if let Some(channel) = &workflow.channel {
        candidate = candidate.constrain(Dimension::Channel, channel.clone());
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria(pairs: &[(Dimension, &str)]) -> HashMap<Dimension, String> {
        pairs
            .iter()
            .map(|(d, v)| (*d, v.to_string()))
            .collect()
    }

    #[test]
    fn more_specific_candidate_wins() {
        // A constrains classification only, B classification+department,
        // C nothing (full wildcard).
        let candidates = vec![
            Candidate::new("A").constrain(Dimension::Classification, "net"),
            Candidate::new("B")
                .constrain(Dimension::Classification, "net")
                .constrain(Dimension::Department, "it"),
            Candidate::new("C"),
        ];

        let outcome = match_candidates(
            &candidates,
            &criteria(&[(Dimension::Classification, "net"), (Dimension::Department, "it")]),
        );

        assert!(outcome.single);
        assert_eq!(outcome.matched_id.as_deref(), Some("B"));
    }

    #[test]
    fn tied_scores_are_ambiguous() {
        let candidates = vec![
            Candidate::new("A").constrain(Dimension::Classification, "net"),
            Candidate::new("D").constrain(Dimension::Classification, "net"),
            Candidate::new("C"),
        ];

        let outcome =
            match_candidates(&candidates, &criteria(&[(Dimension::Classification, "net")]));

        assert!(!outcome.single);
        assert!(outcome.matched_id.is_none());
        assert_eq!(outcome.matches, vec!["A".to_string(), "D".to_string()]);
    }

    #[test]
    fn wildcard_survives_when_no_constraint_matches() {
        let candidates = vec![
            Candidate::new("A").constrain(Dimension::Classification, "net"),
            Candidate::new("C"),
        ];

        // Criteria carry a classification no candidate constrains on; only
        // the wildcard survives.
        let outcome =
            match_candidates(&candidates, &criteria(&[(Dimension::Classification, "hr")]));

        assert!(outcome.single);
        assert_eq!(outcome.matched_id.as_deref(), Some("C"));
    }

    #[test]
    fn declared_constraint_needs_a_criteria_value() {
        // B declares a department constraint but the criteria don't carry a
        // department at all, so B is filtered out.
        let candidates = vec![
            Candidate::new("A").constrain(Dimension::Classification, "net"),
            Candidate::new("B")
                .constrain(Dimension::Classification, "net")
                .constrain(Dimension::Department, "it"),
        ];

        let outcome =
            match_candidates(&candidates, &criteria(&[(Dimension::Classification, "net")]));

        assert!(outcome.single);
        assert_eq!(outcome.matched_id.as_deref(), Some("A"));
    }

    #[test]
    fn no_survivors_is_empty_not_an_error() {
        let candidates = vec![
            Candidate::new("A").constrain(Dimension::Classification, "net"),
        ];

        let outcome = match_candidates(&candidates, &criteria(&[]));

        assert!(outcome.is_empty());
        assert!(!outcome.single);
    }

    #[test]
    fn set_valued_constraint_matches_any_member() {
        let candidates = vec![Candidate::new("A").constrain_any(
            Dimension::Classification,
            vec!["net".to_string(), "hw".to_string()],
        )];

        let outcome =
            match_candidates(&candidates, &criteria(&[(Dimension::Classification, "hw")]));

        assert!(outcome.single);
        assert_eq!(outcome.matched_id.as_deref(), Some("A"));
    }
}
