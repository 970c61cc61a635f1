//! JD Parser: turns a raw job description into `StructuredJobDescription`.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm_client::{LlmError, TextCompletion};
use crate::models::resume::StructuredJobDescription;
use crate::rating::prompts::JD_STRUCTURE_PROMPT;
use crate::validation::{parse_as, ValidationFailure};

#[derive(Debug, Error)]
pub enum JdParseError {
    #[error("job description text is empty")]
    Empty,

    #[error("completion service failed: {0}")]
    Completion(#[from] LlmError),

    #[error(transparent)]
    Invalid(#[from] ValidationFailure),
}

pub async fn structure_job_description(
    jd_text: &str,
    llm: &dyn TextCompletion,
) -> Result<StructuredJobDescription, JdParseError> {
    if jd_text.trim().is_empty() {
        return Err(JdParseError::Empty);
    }

    let prompt = JD_STRUCTURE_PROMPT.replace("{jd_text}", jd_text);
    let raw = llm.complete(&prompt).await?;

    match parse_as::<StructuredJobDescription>(&raw) {
        Ok(jd) => {
            info!(
                "Structured job description: {} required skills",
                jd.required_skills.len()
            );
            Ok(jd)
        }
        Err(failure) => {
            warn!("Job description structuring failed: {failure}");
            debug!("Unusable job description reply: {}", failure.raw());
            Err(failure.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::testing::ScriptedCompletion;

    #[tokio::test]
    async fn test_structures_fenced_reply() {
        let llm = ScriptedCompletion::new(vec![Ok(r#"```json
{"job_title": "Data Engineer", "required_skills": ["SQL"], "preferred_skills": [],
 "required_experience_years": 3, "required_education": null,
 "key_responsibilities": ["Own pipelines"]}
```"#
            .to_string())]);

        let jd = structure_job_description("We need a data engineer", &llm)
            .await
            .unwrap();
        assert_eq!(jd.job_title.as_deref(), Some("Data Engineer"));
        assert_eq!(jd.required_experience_years, Some(3));
        assert!(llm.prompts()[0].contains("We need a data engineer"));
    }

    #[tokio::test]
    async fn test_empty_text_skips_completion() {
        let llm = ScriptedCompletion::new(vec![]);
        let err = structure_job_description("  ", &llm).await.unwrap_err();
        assert!(matches!(err, JdParseError::Empty));
        assert!(llm.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_prose_reply_is_invalid() {
        let llm = ScriptedCompletion::new(vec![Ok("I cannot help with that.".to_string())]);
        let err = structure_job_description("Backend role", &llm)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JdParseError::Invalid(ValidationFailure::ParseFailure { .. })
        ));
    }
}
