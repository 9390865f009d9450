//! Quiz composition and parsing.
//!
//! The model is asked for one raw JSON object. Parsing strips a code fence
//! if the model added one anyway, then checks the [`QuizSpec`] invariants.
//! Anything that fails becomes [`fallback_quiz`]; this module never returns
//! an error for malformed output.

use thiserror::Error;
use tracing::warn;

use crate::models::{KnowledgeChunk, QuizSpec};
use crate::retrieve::join_context;

#[derive(Debug, Error)]
enum GenerationMalformed {
    #[error("quiz output is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("quiz needs at least two options, got {0}")]
    TooFewOptions(usize),
    #[error("correct answer {0:?} is not one of the options")]
    AnswerNotInOptions(String),
}

pub fn quiz_prompt(chunks: &[KnowledgeChunk], topic: &str) -> String {
    format!(
        "You are an AI Tutor. Based on the following course content, generate a multiple-choice question to test the student's understanding of \"{topic}\".\n\
         \n\
         Course Content:\n\
         {context}\n\
         \n\
         Output Format:\n\
         You must return a valid JSON object with the following structure:\n\
         {{\n\
         \x20   \"question\": \"The question text\",\n\
         \x20   \"options\": [\"Option A\", \"Option B\", \"Option C\", \"Option D\"],\n\
         \x20   \"correct_answer\": \"The correct option text (must be one of the options)\",\n\
         \x20   \"explanation\": \"Brief explanation of why it is correct\"\n\
         }}\n\
         \n\
         Ensure the JSON is valid and has no markdown formatting (like ```json). Just the raw JSON string.\n",
        topic = topic,
        context = join_context(chunks),
    )
}

/// The quiz returned when generation output cannot be used.
pub fn fallback_quiz(topic: &str) -> QuizSpec {
    QuizSpec {
        question: format!(
            "Could not generate a structured quiz for {}. Please try again.",
            topic
        ),
        options: vec!["Error".to_string()],
        correct_answer: "Error".to_string(),
        explanation: "The model failed to produce valid JSON.".to_string(),
    }
}

/// Parse generation output into a quiz, falling back on any malformation.
pub fn parse_quiz_response(raw: &str, topic: &str) -> QuizSpec {
    match try_parse(raw) {
        Ok(quiz) => quiz,
        Err(e) => {
            warn!(topic, error = %e, "falling back to placeholder quiz");
            fallback_quiz(topic)
        }
    }
}

fn try_parse(raw: &str) -> Result<QuizSpec, GenerationMalformed> {
    let quiz: QuizSpec = serde_json::from_str(strip_code_fence(raw))?;
    if quiz.options.len() < 2 {
        return Err(GenerationMalformed::TooFewOptions(quiz.options.len()));
    }
    if !quiz.options.contains(&quiz.correct_answer) {
        return Err(GenerationMalformed::AnswerNotInOptions(quiz.correct_answer));
    }
    Ok(quiz)
}

fn strip_code_fence(raw: &str) -> &str {
    let mut content = raw.trim();
    if let Some(rest) = content.strip_prefix("```json") {
        content = rest;
    } else if let Some(rest) = content.strip_prefix("```") {
        content = rest;
    }
    if let Some(rest) = content.strip_suffix("```") {
        content = rest;
    }
    content.trim()
}
