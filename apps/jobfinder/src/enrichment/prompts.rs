// Default prompts for job enrichment. Each can be overridden from the environment.

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert talent researcher helping a \
    job-seeking candidate. Return concise JSON with insights tailored to the candidate profile.";

/// Placeholders: {candidate_profile}, {job_title}, {company}, {location}, {link}, {description}.
pub const DEFAULT_USER_PROMPT: &str = "You are supporting a candidate with the following profile: {candidate_profile}.

Evaluate this job posting and respond in strict JSON with keys 'fit_score', 'summary', and 'outreach_angle'.

Job Title: {job_title}
Company: {company}
Location: {location}
Link: {link}
Description: {description}

Return fit_score as a number from 0-100 summarizing overall fit, summary as a two-sentence overview \
referencing skills and requirements, and outreach_angle with a suggestion for how the candidate \
should position themselves when reaching out.";

pub const DEFAULT_CANDIDATE_PROFILE: &str = "Senior full-stack software engineer specializing in \
    Python, cloud platforms, and AI-driven products. Interested in impactful, collaborative teams.";
