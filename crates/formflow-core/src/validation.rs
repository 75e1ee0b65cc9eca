use std::collections::HashSet;

use crate::{FormFlowError, Result, Submission, SubmissionDraft};

pub const SLUG_MIN_LEN: usize = 3;
pub const SLUG_MAX_LEN: usize = 50;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

impl Validate for SubmissionDraft {
    fn validate(&self) -> Result<()> {
        check_path_and_answers(
            &self.flow_path,
            self.answers
                .iter()
                .map(|a| (a.node_id.as_str(), a.answer_text.as_str())),
        )
    }
}

impl Validate for Submission {
    fn validate(&self) -> Result<()> {
        check_path_and_answers(
            &self.flow_path,
            self.answers
                .iter()
                .map(|a| (a.node_id.as_str(), a.answer_text.as_str())),
        )?;
        if let Some(answer) = self
            .answers
            .iter()
            .find(|a| a.response_id != self.response_id)
        {
            return Err(invalid(&format!(
                "answer for node '{}' belongs to response {}",
                answer.node_id, answer.response_id
            )));
        }
        Ok(())
    }
}

/// Answers are given as `(node_id, answer_text)` pairs.
fn check_path_and_answers<'a>(
    flow_path: &[String],
    answers: impl Iterator<Item = (&'a str, &'a str)>,
) -> Result<()> {
    if flow_path.is_empty() {
        return Err(invalid("flow_path must not be empty"));
    }
    if flow_path.iter().any(|id| id.trim().is_empty()) {
        return Err(invalid("flow_path contains a blank node id"));
    }

    let visited: HashSet<&str> = flow_path.iter().map(String::as_str).collect();
    for (node_id, answer_text) in answers {
        if node_id.trim().is_empty() {
            return Err(invalid("answer is missing its node id"));
        }
        if answer_text.trim().is_empty() {
            return Err(invalid(&format!("answer for node '{}' has no text", node_id)));
        }
        if !visited.contains(node_id) {
            return Err(invalid(&format!(
                "answer for node '{}' is not on the flow path",
                node_id
            )));
        }
    }

    Ok(())
}

fn invalid(reason: &str) -> FormFlowError {
    FormFlowError::InvalidSubmission(reason.to_string())
}

/// Trims and checks a custom slug: 3-50 chars of lowercase ascii, digits and hyphens.
pub fn validate_custom_slug(slug: &str) -> Result<String> {
    let slug = slug.trim();
    if slug.len() < SLUG_MIN_LEN || slug.len() > SLUG_MAX_LEN {
        return Err(FormFlowError::InvalidSlug(format!(
            "'{}' must be {}-{} characters",
            slug, SLUG_MIN_LEN, SLUG_MAX_LEN
        )));
    }
    let allowed = slug
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    if !allowed {
        return Err(FormFlowError::InvalidSlug(format!(
            "'{}' may only contain a-z, 0-9 and '-'",
            slug
        )));
    }
    Ok(slug.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnswerDraft, FormId};

    fn draft(path: &[&str]) -> SubmissionDraft {
        SubmissionDraft::new(FormId::new_v4(), path.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn accepts_a_well_formed_draft() {
        let d = draft(&["a", "b"]).with_answer(AnswerDraft::new("b", "42"));
        assert!(d.validate().is_ok());
    }

    #[test]
    fn rejects_blank_path_entries() {
        assert!(draft(&["a", " "]).validate().is_err());
    }

    #[test]
    fn rejects_answers_off_the_path() {
        let d = draft(&["a"]).with_answer(AnswerDraft::new("z", "text"));
        let err = d.validate().unwrap_err();
        assert!(err.to_string().contains("not on the flow path"));
    }

    #[test]
    fn rejects_blank_answer_text() {
        let d = draft(&["a"]).with_answer(AnswerDraft::new("a", "   "));
        assert!(d.validate().is_err());
    }

    #[test]
    fn built_submissions_are_checked_like_drafts() {
        let mut submission = draft(&["a", "b"])
            .with_answer(AnswerDraft::new("b", "42"))
            .into_submission()
            .unwrap();
        assert!(submission.validate().is_ok());

        submission.answers[0].response_id = uuid::Uuid::new_v4();
        assert!(submission.validate().is_err());

        submission.answers.clear();
        submission.flow_path.clear();
        let err = submission.validate().unwrap_err();
        assert!(matches!(err, FormFlowError::InvalidSubmission(_)));
    }

    #[test]
    fn custom_slug_rules() {
        assert_eq!(validate_custom_slug("  my-form-1 ").unwrap(), "my-form-1");
        assert!(validate_custom_slug("ab").is_err());
        assert!(validate_custom_slug("My-Form").is_err());
        assert!(validate_custom_slug("with space").is_err());
        assert!(validate_custom_slug(&"a".repeat(51)).is_err());
        assert!(validate_custom_slug(&"a".repeat(50)).is_ok());
    }
}
