//! Tutoring prompt composition.
//!
//! The student snapshot is rendered as two short bullet lists (profile and
//! progress) and embedded between the retrieved course material and the
//! fixed instruction block.

use crate::models::{KnowledgeChunk, StudentContext};
use crate::retrieve::join_context;

const NONE: &str = "None";

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        NONE.to_string()
    } else {
        items.join(", ")
    }
}

/// Render the student snapshot. Empty lists read as `None`.
pub fn format_student_context(student: &StudentContext) -> String {
    let quiz_scores = if student.quiz_scores.is_empty() {
        NONE.to_string()
    } else {
        student
            .quiz_scores
            .iter()
            .map(|(quiz, score)| format!("{}: {}", quiz, score))
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "Student Profile:\n\
         - Name: {}\n\
         - Learning Style: {}\n\
         - Strengths: {}\n\
         - Weaknesses: {}\n\
         \n\
         Student Progress:\n\
         - Completed: {}\n\
         - Quiz Scores: {}\n",
        student.name,
        student.learning_style,
        join_or_none(&student.strengths),
        join_or_none(&student.weaknesses),
        join_or_none(&student.completed_modules),
        quiz_scores,
    )
}

/// Build the question-answering prompt.
pub fn tutoring_prompt(chunks: &[KnowledgeChunk], student: &StudentContext, question: &str) -> String {
    format!(
        "You are an AI Tutor personalized for a specific student.\n\
         Use the following pieces of context (Course Material) to answer the question at the end.\n\
         \n\
         Course Material:\n\
         {context}\n\
         \n\
         Target Student Context:\n\
         {student}\n\
         Instructions:\n\
         - Adapt your explanation to the student's learning style.\n\
         - If the student is weak in a topic, provide extra examples.\n\
         - Reference their progress if relevant (e.g., \"Recall from Week 1...\").\n\
         - If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\
         \n\
         Question: {question}\n\
         Helpful Answer:\n",
        context = join_context(chunks),
        student = format_student_context(student),
        question = question,
    )
}
