//! Prompts for the exam-analysis completion request.
//!
//! Kept in one place so unit tests can inspect them without a live model.
//! Callers can override the system message via
//! [`crate::config::AnalyzerConfig::system_prompt`]; the user prompt is
//! always built by [`build_analysis_prompt`].

use crate::model::TopicDetails;

/// Default system message sent before the analysis prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an exam analysis AI. You MUST respond with ONLY valid JSON array. \
No markdown, no explanations, no code blocks. Just the JSON array.";

/// Build the user prompt embedding the serialised syllabus and the OCR text.
pub fn build_analysis_prompt(
    paper_text: &str,
    syllabus: &[TopicDetails],
) -> Result<String, serde_json::Error> {
    let syllabus_json = serde_json::to_string(syllabus)?;
    Ok(format!(
        r#"Analyze this exam paper against the syllabus and identify important topics.

SYLLABUS (JSON):
{syllabus_json}

EXAM PAPER TEXT:
{paper_text}

INSTRUCTIONS:
1. Match questions in the paper to subtopics in the syllabus (use semantic matching)
2. Extract the marks mentioned for each question (e.g., "2M", "5 marks", "10M")
3. Sum up all marks for each topic to get Total_Marks
4. List only the matched subtopic names in Important_Subtopics array

OUTPUT FORMAT (respond with ONLY this JSON, nothing else):
[
  {{
    "Topic": "topic name from syllabus",
    "Total_Marks": 15,
    "Important_Subtopics": ["subtopic1", "subtopic2"]
  }}
]

CRITICAL: Return ONLY the JSON array. No markdown, no code blocks, no explanations."#
    ))
}
