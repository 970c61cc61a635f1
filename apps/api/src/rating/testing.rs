//! Scripted collaborators for rating, scheduler and router tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::extraction::DocumentExtractor;
use crate::llm_client::{LlmError, TextCompletion};

type Responder = Box<dyn Fn(&str) -> Result<String, LlmError> + Send + Sync>;

/// Replies from a queue, or from a closure keyed on the prompt.
pub struct ScriptedCompletion {
    queue: Mutex<VecDeque<Result<String, LlmError>>>,
    responder: Option<Responder>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedCompletion {
    pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            queue: Mutex::new(replies.into()),
            responder: None,
            prompts: Mutex::new(vec![]),
            delay: None,
        }
    }

    pub fn from_fn(f: impl Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static) -> Self {
        Self {
            responder: Some(Box::new(f)),
            ..Self::new(vec![])
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl TextCompletion for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(responder) = &self.responder {
            return responder(prompt);
        }
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyContent))
    }
}

/// Serves resume text from memory. Unknown references fail like a missing file.
#[derive(Default)]
pub struct FakeExtractor {
    documents: HashMap<String, String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn with_document(mut self, reference: &str, text: &str) -> Self {
        self.documents
            .insert(reference.to_string(), text.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentExtractor for FakeExtractor {
    async fn extract(&self, reference: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.documents
            .get(reference)
            .cloned()
            .ok_or_else(|| anyhow!("Resume file not found: {reference}"))
    }

    fn backend_name(&self) -> &'static str {
        "fake"
    }
}

/// A well-formed resume structuring reply.
pub fn resume_reply(name: &str, skills: &[&str]) -> String {
    serde_json::json!({
        "name": name,
        "contact": {"email": null, "phone": null},
        "summary": null,
        "skills": skills,
        "experience": [],
        "education": []
    })
    .to_string()
}

/// A well-formed rating reply.
pub fn rating_reply(rating: i64) -> String {
    serde_json::json!({
        "rating": rating,
        "summary": format!("Scored {rating}"),
        "fits": ["SQL"],
        "lacks": []
    })
    .to_string()
}

/// A well-formed job description structuring reply.
pub fn jd_reply(title: &str) -> String {
    serde_json::json!({
        "job_title": title,
        "required_skills": ["SQL"],
        "preferred_skills": [],
        "required_experience_years": 2,
        "required_education": null,
        "key_responsibilities": []
    })
    .to_string()
}

/// Answers job description prompts with a "Data Analyst" JD, resume
/// structuring prompts with a resume, and rating prompts by looking up the
/// candidate name in `ratings`.
pub fn by_candidate(ratings: &[(&str, i64)]) -> ScriptedCompletion {
    let ratings: Vec<(String, i64)> = ratings
        .iter()
        .map(|(name, rating)| (name.to_string(), *rating))
        .collect();

    ScriptedCompletion::from_fn(move |prompt| {
        if prompt.contains("Job Description Text") {
            return Ok(jd_reply("Data Analyst"));
        }
        let is_rating = prompt.contains("Structured Job Requirements");
        for (name, rating) in &ratings {
            if prompt.contains(name.as_str()) {
                return Ok(if is_rating {
                    rating_reply(*rating)
                } else {
                    resume_reply(name, &["SQL"])
                });
            }
        }
        Ok("no candidate recognised".to_string())
    })
}
