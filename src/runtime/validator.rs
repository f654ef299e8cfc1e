/// Requirement validator
///
/// Evaluates every requirement on a transition independently, with no
/// short-circuit, so the caller gets the complete violation list in one
/// response and the client can render every problem at once.

use crate::record::types::{Record, RequirementViolation, TransitionPayload};
use crate::workflow::types::{Requirement, Transition};
use serde_json::Value;

/// Check a transition's requirements against the record and payload.
///
/// An empty result means the transition is eligible for execution.
pub fn validate(
    transition: &Transition,
    record: &Record,
    payload: &TransitionPayload,
) -> Vec<RequirementViolation> {
    transition
        .requirements
        .iter()
        .filter_map(|requirement| check(requirement, record, payload))
        .collect()
}

fn check(
    requirement: &Requirement,
    record: &Record,
    payload: &TransitionPayload,
) -> Option<RequirementViolation> {
    match requirement {
        Requirement::CommentRequired => {
            let present = payload
                .comment
                .as_deref()
                .map(|c| !c.trim().is_empty())
                .unwrap_or(false);
            (!present).then(|| RequirementViolation {
                requirement: "comment_required".to_string(),
                message: "a comment is required for this transition".to_string(),
            })
        }
        Requirement::FieldRequired { field } => {
            // The payload may supply the field with the request; otherwise it
            // must already be set on the record.
            let value = payload.fields.get(field).or_else(|| record.fields.get(field));
            let present = value.map(is_non_empty).unwrap_or(false);
            (!present).then(|| RequirementViolation {
                requirement: "field_required".to_string(),
                message: format!("field '{field}' must be non-empty"),
            })
        }
        Requirement::AttachmentRequired => {
            payload.attachments.is_empty().then(|| RequirementViolation {
                requirement: "attachment_required".to_string(),
                message: "an attachment is required for this transition".to_string(),
            })
        }
        Requirement::MinAttachments { min } => {
            (payload.attachments.len() < *min).then(|| RequirementViolation {
                requirement: "min_attachments".to_string(),
                message: format!(
                    "at least {} attachment(s) required, got {}",
                    min,
                    payload.attachments.len()
                ),
            })
        }
    }
}

fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{test_record, test_transition};
    use serde_json::json;

    #[test]
    fn all_violations_are_reported_together() {
        let mut transition = test_transition("tr-1", "st-new", "st-progress");
        transition.requirements = vec![
            Requirement::CommentRequired,
            Requirement::FieldRequired { field: "resolution".to_string() },
        ];

        let record = test_record("rec-1");
        let violations = validate(&transition, &record, &TransitionPayload::default());

        // Two independent requirements fail, two violations come back.
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].requirement, "comment_required");
        assert_eq!(violations[1].requirement, "field_required");
    }

    #[test]
    fn satisfied_requirements_produce_no_violations() {
        let mut transition = test_transition("tr-1", "st-new", "st-progress");
        transition.requirements = vec![
            Requirement::CommentRequired,
            Requirement::FieldRequired { field: "resolution".to_string() },
            Requirement::MinAttachments { min: 2 },
        ];

        let record = test_record("rec-1");
        let payload = TransitionPayload {
            comment: Some("done".to_string()),
            fields: [("resolution".to_string(), json!("fixed"))].into_iter().collect(),
            attachments: vec!["a.txt".to_string(), "b.txt".to_string()],
        };

        assert!(validate(&transition, &record, &payload).is_empty());
    }

    #[test]
    fn field_requirement_falls_back_to_the_record() {
        let mut transition = test_transition("tr-1", "st-new", "st-progress");
        transition.requirements =
            vec![Requirement::FieldRequired { field: "subject".to_string() }];

        let mut record = test_record("rec-1");
        record.fields.insert("subject".to_string(), json!("printer down"));

        assert!(validate(&transition, &record, &TransitionPayload::default()).is_empty());
    }

    #[test]
    fn blank_comment_does_not_count() {
        let mut transition = test_transition("tr-1", "st-new", "st-progress");
        transition.requirements = vec![Requirement::CommentRequired];

        let payload = TransitionPayload {
            comment: Some("   ".to_string()),
            ..Default::default()
        };

        let violations = validate(&transition, &test_record("rec-1"), &payload);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn min_attachments_counts_the_payload() {
        let mut transition = test_transition("tr-1", "st-new", "st-progress");
        transition.requirements = vec![
            Requirement::AttachmentRequired,
            Requirement::MinAttachments { min: 3 },
        ];

        let payload = TransitionPayload {
            attachments: vec!["a.txt".to_string()],
            ..Default::default()
        };

        let violations = validate(&transition, &test_record("rec-1"), &payload);
        // The single attachment satisfies the presence requirement but not
        // the minimum.
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].requirement, "min_attachments");
    }
}
