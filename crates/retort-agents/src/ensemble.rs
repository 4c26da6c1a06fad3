use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use retort_core::config::ModelConfig;
use retort_core::error::{Result, RetortError};
use retort_core::traits::CompletionClient;
use retort_core::types::Message;
use retort_graph::{Node, NodeOutput, State, StateUpdate};

use crate::keys::{ANSWERS, RESEARCH, UNVERIFIED_ANSWERS, VERIFIED_ANSWERS};
use crate::{prompts, with_answer_format, with_system};

/// One member of the student ensemble. Appends its attempt into the
/// append-policy `answers` field, tagged with its own name.
pub struct StudentNode {
    name: String,
    tag: String,
    client: Arc<dyn CompletionClient>,
    model: ModelConfig,
}

impl StudentNode {
    pub fn new(index: usize, client: Arc<dyn CompletionClient>, model: ModelConfig) -> Self {
        Self {
            name: format!("student_{index}"),
            tag: format!("student-{index}"),
            client,
            model,
        }
    }
}

impl Node for StudentNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, state: &State) -> BoxFuture<'_, Result<NodeOutput>> {
        let prompt = with_answer_format(prompts::STUDENT, state);
        let messages = with_system(prompt, state);
        Box::pin(async move {
            let text = self.client.complete(&self.model, messages).await?;
            let answer = Message::assistant(text).named(&self.tag);
            let update = StateUpdate::new().set_messages(ANSWERS, vec![answer]);
            Ok(NodeOutput::follow(update))
        })
    }
}

#[derive(Debug, Deserialize)]
struct Verdict {
    verified: bool,
}

fn verdict_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "verified": { "type": "boolean" }
        },
        "required": ["verified"],
        "additionalProperties": false
    })
}

/// Reviews one student's answer and files it into `verified_answers` or
/// `unverified_answers`. Runs inside the student's fan-out branch, so it only
/// ever sees its own student's entry.
pub struct VerifierNode {
    name: String,
    student_tag: String,
    client: Arc<dyn CompletionClient>,
    model: ModelConfig,
}

impl VerifierNode {
    pub fn new(index: usize, client: Arc<dyn CompletionClient>, model: ModelConfig) -> Self {
        Self {
            name: format!("verifier_{index}"),
            student_tag: format!("student-{index}"),
            client,
            model,
        }
    }
}

impl Node for VerifierNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, state: &State) -> BoxFuture<'_, Result<NodeOutput>> {
        let answer = state
            .get_messages(ANSWERS)
            .into_iter()
            .find(|m| m.name.as_deref() == Some(&self.student_tag));
        Box::pin(async move {
            let answer = answer.ok_or_else(|| RetortError::NodeFailed {
                node: self.name.clone(),
                message: format!("no answer from {} to verify", self.student_tag),
            })?;

            let messages = vec![
                Message::system(prompts::VERIFIER),
                Message::user(format!("Student Answer: {}", answer.content))
                    .named(&self.student_tag),
            ];
            let value = self
                .client
                .complete_structured(&self.model, messages, &verdict_schema())
                .await?;
            let verdict: Verdict = serde_json::from_value(value)
                .map_err(|e| RetortError::StructuredOutput(e.to_string()))?;
            debug!(student = %self.student_tag, verified = verdict.verified, "Verifier decided");

            let key = if verdict.verified {
                VERIFIED_ANSWERS
            } else {
                UNVERIFIED_ANSWERS
            };
            let update = StateUpdate::new().set_messages(key, vec![answer]);
            Ok(NodeOutput::follow(update))
        })
    }
}

/// Where the professor reads the ensemble's answers from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSource {
    /// The flat `answers` field.
    Plain,
    /// The `verified_answers` / `unverified_answers` split the verifiers made.
    Verified,
}

/// Joins the ensemble: solves independently, weighs the student answers, and
/// synthesizes a final assessment.
pub struct ProfessorNode {
    client: Arc<dyn CompletionClient>,
    model: ModelConfig,
    source: AnswerSource,
    include_research: bool,
}

impl ProfessorNode {
    pub fn new(client: Arc<dyn CompletionClient>, model: ModelConfig, source: AnswerSource) -> Self {
        Self {
            client,
            model,
            source,
            include_research: false,
        }
    }

    /// Also surface the researcher's digest to the professor.
    pub fn with_research(mut self) -> Self {
        self.include_research = true;
        self
    }

    fn answers_block(&self, state: &State) -> String {
        let mut block = String::from("<answers>\n");
        match self.source {
            AnswerSource::Plain => {
                let answers = state.get_messages(ANSWERS);
                block.push_str(
                    &answers
                        .iter()
                        .enumerate()
                        .map(|(i, a)| format!("<student id=\"{i}\">\n{}\n</student>", a.content))
                        .collect::<Vec<_>>()
                        .join("\n\n"),
                );
            }
            AnswerSource::Verified => {
                let tagged = state
                    .get_messages(VERIFIED_ANSWERS)
                    .into_iter()
                    .map(|a| (a, true))
                    .chain(
                        state
                            .get_messages(UNVERIFIED_ANSWERS)
                            .into_iter()
                            .map(|a| (a, false)),
                    );
                block.push_str(
                    &tagged
                        .map(|(a, verified)| {
                            format!(
                                "<student name=\"{}\" is_verified=\"{verified}\">\n{}\n</student>",
                                a.name.as_deref().unwrap_or(""),
                                a.content
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n\n"),
                );
            }
        }
        block.push_str("\n</answers>");
        if self.include_research {
            let research = state.get_str(RESEARCH);
            if !research.is_empty() {
                block.push_str(&format!("\n<research>\n{research}\n</research>"));
            }
        }
        block
    }
}

impl Node for ProfessorNode {
    fn name(&self) -> &str {
        "professor"
    }

    fn run(&self, state: &State) -> BoxFuture<'_, Result<NodeOutput>> {
        let prompt = with_answer_format(prompts::PROFESSOR, state);
        let mut messages = with_system(prompt, state);
        messages.push(Message::user(self.answers_block(state)));
        Box::pin(async move {
            let text = self.client.complete(&self.model, messages).await?;
            let update = StateUpdate::new().message(Message::assistant(text).named("professor"));
            Ok(NodeOutput::follow(update))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_model, FakeCompletion};
    use retort_graph::{Route, RunInput, StateSchema};

    fn ensemble_schema() -> StateSchema {
        StateSchema::new()
            .append_field(ANSWERS)
            .append_field(VERIFIED_ANSWERS)
            .append_field(UNVERIFIED_ANSWERS)
    }

    #[tokio::test]
    async fn student_files_tagged_answer() {
        let client = Arc::new(FakeCompletion::new().reply("the answer is 42 g/mol"));
        let node = StudentNode::new(2, client, test_model());
        assert_eq!(node.name(), "student_2");

        let mut state = State::seeded(&RunInput::question("molar mass of propane?"));
        let out = node.run(&state).await.unwrap();
        state.merge(out.update, &ensemble_schema());

        let answers = state.get_messages(ANSWERS);
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].name.as_deref(), Some("student-2"));
        // The shared log is untouched; answers live in their own field.
        assert_eq!(state.messages().len(), 1);
    }

    #[tokio::test]
    async fn verifier_files_answer_by_verdict() {
        let schema = ensemble_schema();
        let mut state = State::seeded(&RunInput::question("q"));
        state.merge(
            StateUpdate::new().set_messages(
                ANSWERS,
                vec![Message::assistant("right").named("student-0")],
            ),
            &schema,
        );

        let client = Arc::new(
            FakeCompletion::new().structured_reply(serde_json::json!({ "verified": true })),
        );
        let node = VerifierNode::new(0, client, test_model());
        let out = node.run(&state).await.unwrap();
        assert_eq!(out.route, Route::Follow);
        state.merge(out.update, &schema);

        assert_eq!(state.get_messages(VERIFIED_ANSWERS).len(), 1);
        assert!(state.get_messages(UNVERIFIED_ANSWERS).is_empty());
    }

    #[tokio::test]
    async fn verifier_without_matching_answer_fails() {
        let state = State::seeded(&RunInput::question("q"));
        let client = Arc::new(FakeCompletion::new());
        let node = VerifierNode::new(3, client, test_model());
        let err = node.run(&state).await.unwrap_err();
        assert!(matches!(err, RetortError::NodeFailed { .. }));
    }

    #[tokio::test]
    async fn professor_formats_verified_and_unverified_blocks() {
        let schema = ensemble_schema();
        let mut state = State::seeded(&RunInput::question("q"));
        state.merge(
            StateUpdate::new()
                .set_messages(
                    VERIFIED_ANSWERS,
                    vec![Message::assistant("good").named("student-0")],
                )
                .set_messages(
                    UNVERIFIED_ANSWERS,
                    vec![Message::assistant("shaky").named("student-1")],
                ),
            &schema,
        );

        let client = Arc::new(FakeCompletion::new().reply("synthesis"));
        let node = ProfessorNode::new(client.clone(), test_model(), AnswerSource::Verified);
        node.run(&state).await.unwrap();

        let seen = client.seen.lock().unwrap();
        let block = &seen[0].last().unwrap().content;
        assert!(block.contains("<student name=\"student-0\" is_verified=\"true\">"));
        assert!(block.contains("<student name=\"student-1\" is_verified=\"false\">"));
    }

    #[tokio::test]
    async fn professor_includes_research_digest_when_asked() {
        let mut state = State::seeded(&RunInput::question("q"));
        state.merge(
            StateUpdate::new().set_str(RESEARCH, "arXiv says so"),
            &StateSchema::new(),
        );

        let client = Arc::new(FakeCompletion::new().reply("synthesis"));
        let node = ProfessorNode::new(client.clone(), test_model(), AnswerSource::Plain)
            .with_research();
        node.run(&state).await.unwrap();

        let seen = client.seen.lock().unwrap();
        let block = &seen[0].last().unwrap().content;
        assert!(block.contains("<research>\narXiv says so\n</research>"));
    }
}
