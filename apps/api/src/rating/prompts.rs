// Prompt templates for structuring and rating. Placeholders in `{braces}` are
// substituted with `str::replace`.

pub const RESUME_STRUCTURE_PROMPT: &str = r#"Analyze the resume text between the '---' markers and extract its key information as a single JSON object.

Fields:
- "name": the candidate's full name (string or null).
- "contact": an object with "email" and "phone" (strings or null).
- "summary": the SUMMARY or OBJECTIVE section text (string or null).
- "skills": key technical skills (list of strings). Prefer a dedicated SKILLS section; include clearly identifiable technical skills from experience or projects. Exclude soft skills unless listed as technical.
- "experience": list of objects with "title", "company", "duration" (as written, e.g. "Jan 2024 - Present") and "description" (responsibilities or achievements, newline-separated).
- "education": list of objects with "degree", "institution" and "year" (as written).

Use null for missing strings or objects and [] for missing lists. Use double quotes for keys and string values.

Resume Text:
---
{resume_text}
---"#;

pub const RATING_PROMPT: &str = r#"Act as an expert HR analyst. Evaluate the structured resume against the structured job requirements below.

Return a JSON object with exactly these keys:
- "rating": an integer from 0 to 100 for suitability. Be realistic about the REQUIREMENTS versus the candidate profile.
- "summary": a concise (1-2 sentence) justification highlighting key strengths and weaknesses.
- "fits": specific ways the resume MATCHES the requirements (e.g. "Has required skill: Python"). Maximum 5 items.
- "lacks": specific critical requirements the resume does NOT meet (e.g. "Missing required skill: AWS"). Maximum 5 items.

Structured Resume:
{resume_json}

Structured Job Requirements:
{jd_json}"#;

pub const JD_STRUCTURE_PROMPT: &str = r#"Analyze the job description between the '---' markers and extract its requirements as a JSON object with these keys:
- "job_title" (string or null)
- "required_skills" (list of strings)
- "preferred_skills" (list of strings)
- "required_experience_years" (integer or null)
- "required_education" (string or null)
- "key_responsibilities" (list of strings)

Use null or empty lists for missing information.

Job Description Text:
---
{jd_text}
---"#;
