//! Learning path planner.
//!
//! Stateless: the result depends only on the quiz-score mapping and, for
//! weak topics, on retrieved material and one generation call.
//!
//! | Quiz scores | Result |
//! |-------------|--------|
//! | none | [`LearningPathResult::Start`] |
//! | all `>= 75` | [`LearningPathResult::OnTrack`] |
//! | any `< 75` | [`LearningPathResult::NeedsImprovement`] with a 3-step plan |

use std::collections::{BTreeMap, HashSet};

use crate::error::{Result, TutorError};
use crate::generation::Generator;
use crate::index::KnowledgeIndex;
use crate::models::{KnowledgeChunk, LearningPathResult};
use crate::retrieve::{join_context, retrieve, PLAN_TOP_K_PER_TOPIC};
use crate::students::AI_QUIZ_PREFIX;

pub const WEAKNESS_THRESHOLD: f64 = 75.0;
pub const STUDY_PLAN_STEPS: usize = 3;

const TRAILING_TOKENS: &[&str] = &[" Quiz", "Test"];

/// Recover a topic label from a quiz name, e.g. `"Algebra Quiz"` → `"Algebra"`.
/// Tutor-generated quizzes lose their `[AI]` marker too.
pub fn topic_from_quiz_name(quiz_name: &str) -> String {
    let trimmed = quiz_name.trim();
    let mut topic = trimmed.strip_prefix(AI_QUIZ_PREFIX).unwrap_or(trimmed);
    loop {
        let stripped = TRAILING_TOKENS
            .iter()
            .find_map(|token| topic.strip_suffix(token));
        match stripped {
            Some(rest) => topic = rest.trim_end(),
            None => break,
        }
    }
    topic.trim().to_string()
}

/// Topics of quizzes scored below the threshold, in quiz-name order,
/// without duplicates.
pub fn weak_topics(quiz_scores: &BTreeMap<String, f64>) -> Vec<String> {
    let mut seen = HashSet::new();
    quiz_scores
        .iter()
        .filter(|&(_, &score)| score < WEAKNESS_THRESHOLD)
        .map(|(name, _)| topic_from_quiz_name(name))
        .filter(|topic| seen.insert(topic.clone()))
        .collect()
}

pub fn study_plan_prompt(weaknesses: &[String], material: &[KnowledgeChunk]) -> String {
    format!(
        "You are an expert Educational Planner.\n\
         The student has shown weaknesses in the following topics: {topics}.\n\
         \n\
         Using the available course materials below, create a structured {steps}-step study plan to help them improve.\n\
         For each step, recommend specific modules or concepts to review.\n\
         \n\
         Course Material:\n\
         {context}\n\
         \n\
         Study Plan:\n",
        topics = weaknesses.join(", "),
        steps = STUDY_PLAN_STEPS,
        context = join_context(material),
    )
}

/// Drop chunks whose text was already seen, keeping first-seen order.
pub fn dedup_by_text(chunks: Vec<KnowledgeChunk>) -> Vec<KnowledgeChunk> {
    let mut seen = HashSet::new();
    chunks
        .into_iter()
        .filter(|c| seen.insert(c.text.clone()))
        .collect()
}

/// Build a learning path. `pinned` recommendations are listed ahead of the
/// fixed ones for students without weak topics.
pub async fn learning_path(
    index: &KnowledgeIndex,
    generator: &dyn Generator,
    course_id: i64,
    quiz_scores: &BTreeMap<String, f64>,
    pinned: &[String],
) -> Result<LearningPathResult> {
    let with_pinned = |fixed: &str| {
        let mut seen = HashSet::new();
        pinned
            .iter()
            .map(|p| p.trim().to_string())
            .chain(std::iter::once(fixed.to_string()))
            .filter(|r| !r.is_empty() && seen.insert(r.clone()))
            .collect::<Vec<_>>()
    };

    if quiz_scores.is_empty() {
        return Ok(LearningPathResult::Start {
            message: "Welcome! Start by exploring the Course Introduction.".to_string(),
            recommendations: with_pinned("Review Course Introduction"),
        });
    }

    let weaknesses = weak_topics(quiz_scores);
    if weaknesses.is_empty() {
        return Ok(LearningPathResult::OnTrack {
            message: "Excellent work! You are performing well in all assessed topics.".to_string(),
            recommendations: with_pinned("Continue to the next module."),
        });
    }

    let mut material = Vec::new();
    for topic in &weaknesses {
        material.extend(retrieve(index, course_id, topic, PLAN_TOP_K_PER_TOPIC).await?);
    }
    let material = dedup_by_text(material);

    let study_plan = generator
        .generate(&study_plan_prompt(&weaknesses, &material))
        .await
        .map_err(TutorError::generation)?;

    Ok(LearningPathResult::NeedsImprovement {
        weaknesses,
        study_plan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbedder;
    use crate::models::{ChunkMetadata, ModuleType};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("1. Review algebra basics".to_string())
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    fn scores(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn empty_index() -> KnowledgeIndex {
        KnowledgeIndex::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(HashedEmbedder::new(32)),
            8,
        )
    }

    #[test]
    fn test_topic_from_quiz_name() {
        assert_eq!(topic_from_quiz_name("Algebra Quiz"), "Algebra");
        assert_eq!(topic_from_quiz_name("Calculus Test"), "Calculus");
        assert_eq!(topic_from_quiz_name("Algebra Quiz Quiz"), "Algebra");
        assert_eq!(topic_from_quiz_name("Pop Quiz Test"), "Pop");
        assert_eq!(topic_from_quiz_name("Geometry"), "Geometry");
        assert_eq!(topic_from_quiz_name("[AI] Photosynthesis Quiz"), "Photosynthesis");
    }

    #[test]
    fn test_weak_topics_threshold_is_exclusive() {
        let topics = weak_topics(&scores(&[
            ("Algebra Quiz", 74.9),
            ("Geometry Quiz", 75.0),
            ("[AI] Algebra Quiz", 10.0),
        ]));
        assert_eq!(topics, vec!["Algebra"]);
    }

    #[tokio::test]
    async fn test_boundaries() {
        let index = empty_index();
        let generator = RecordingGenerator {
            prompts: Mutex::new(Vec::new()),
        };

        let start = learning_path(&index, &generator, 1, &scores(&[]), &[])
            .await
            .unwrap();
        assert!(matches!(start, LearningPathResult::Start { .. }));

        let on_track = learning_path(&index, &generator, 1, &scores(&[("Algebra Quiz", 80.0)]), &[])
            .await
            .unwrap();
        assert!(matches!(on_track, LearningPathResult::OnTrack { .. }));

        let weak = learning_path(&index, &generator, 1, &scores(&[("Algebra Quiz", 60.0)]), &[])
            .await
            .unwrap();
        match weak {
            LearningPathResult::NeedsImprovement { weaknesses, study_plan } => {
                assert_eq!(weaknesses, vec!["Algebra"]);
                assert_eq!(study_plan, "1. Review algebra basics");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("following topics: Algebra."));
        assert!(prompts[0].contains("3-step study plan"));
    }

    #[tokio::test]
    async fn test_pinned_recommendations_come_first() {
        let index = empty_index();
        let generator = RecordingGenerator {
            prompts: Mutex::new(Vec::new()),
        };
        let pinned = vec!["Watch lecture 3".to_string()];
        let result = learning_path(&index, &generator, 1, &scores(&[]), &pinned)
            .await
            .unwrap();
        match result {
            LearningPathResult::Start { recommendations, .. } => {
                assert_eq!(
                    recommendations,
                    vec!["Watch lecture 3", "Review Course Introduction"]
                );
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pinned_recommendations_are_deduplicated() {
        let index = empty_index();
        let generator = RecordingGenerator {
            prompts: Mutex::new(Vec::new()),
        };
        let pinned = vec![
            "Review Course Introduction".to_string(),
            "Watch lecture 3".to_string(),
            "Watch lecture 3".to_string(),
        ];
        let result = learning_path(&index, &generator, 1, &scores(&[]), &pinned)
            .await
            .unwrap();
        match result {
            LearningPathResult::Start { recommendations, .. } => {
                assert_eq!(
                    recommendations,
                    vec!["Review Course Introduction", "Watch lecture 3"]
                );
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let on_track = learning_path(
            &index,
            &generator,
            1,
            &scores(&[("Algebra Quiz", 90.0)]),
            &["Continue to the next module.".to_string()],
        )
        .await
        .unwrap();
        match on_track {
            LearningPathResult::OnTrack { recommendations, .. } => {
                assert_eq!(recommendations, vec!["Continue to the next module."]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_dedup_keeps_first_seen_order() {
        let meta = ChunkMetadata::new(1, "S", "M", ModuleType::Page);
        let chunk = |t: &str| KnowledgeChunk {
            text: t.to_string(),
            metadata: meta.clone(),
        };
        let deduped = dedup_by_text(vec![chunk("b"), chunk("a"), chunk("b"), chunk("c")]);
        let texts: Vec<_> = deduped.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "a", "c"]);
    }
}
