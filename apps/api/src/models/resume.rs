use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceEntry {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EducationEntry {
    #[serde(default)]
    pub degree: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
    /// Models return this as either a number or a string.
    #[serde(default)]
    pub year: Option<Value>,
}

/// Canonical resume structure produced by the structuring prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredResume {
    pub name: Option<String>,
    #[serde(alias = "contact_info")]
    pub contact: Option<ContactInfo>,
    pub summary: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience: Vec<ExperienceEntry>,
    #[serde(default)]
    pub education: Vec<EducationEntry>,
}

/// Requirements extracted from a job description, stored per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredJobDescription {
    pub job_title: Option<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub preferred_skills: Vec<String>,
    #[serde(default)]
    pub required_experience_years: Option<u32>,
    #[serde(default)]
    pub required_education: Option<String>,
    #[serde(default)]
    pub key_responsibilities: Vec<String>,
}
