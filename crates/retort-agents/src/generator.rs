use std::sync::Arc;

use futures::future::BoxFuture;

use retort_core::config::ModelConfig;
use retort_core::error::Result;
use retort_core::traits::CompletionClient;
use retort_core::types::{Message, Role};
use retort_graph::{Node, NodeOutput, State, StateUpdate};

use crate::keys::GENERATIONS;
use crate::{prompts, with_system};

/// One attempt at the problem, counted in the `generations` field.
///
/// Early rounds use the smaller generator model; the last round of the loop
/// uses the primary model.
pub struct GenerateNode {
    client: Arc<dyn CompletionClient>,
    generator_model: ModelConfig,
    final_model: ModelConfig,
    rounds: u64,
}

impl GenerateNode {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        generator_model: ModelConfig,
        final_model: ModelConfig,
        rounds: u64,
    ) -> Self {
        Self {
            client,
            generator_model,
            final_model,
            rounds,
        }
    }
}

impl Node for GenerateNode {
    fn name(&self) -> &str {
        "generate"
    }

    fn run(&self, state: &State) -> BoxFuture<'_, Result<NodeOutput>> {
        let generations = state.get_u64(GENERATIONS);
        // This invocation bumps the counter to generations + 1; the round
        // that reaches `rounds` is the last one and gets the primary model.
        let model = if generations + 1 >= self.rounds {
            &self.final_model
        } else {
            &self.generator_model
        };
        let messages = with_system(prompts::STUDENT, state);
        Box::pin(async move {
            let text = self.client.complete(model, messages).await?;
            let update = StateUpdate::new()
                .message(Message::assistant(text).named("generate"))
                .set(GENERATIONS, (generations + 1).into());
            Ok(NodeOutput::follow(update))
        })
    }
}

/// Critiques the latest generation without solving the problem, then control
/// returns to `generate` for another round.
pub struct ReflectNode {
    client: Arc<dyn CompletionClient>,
    model: ModelConfig,
}

impl ReflectNode {
    pub fn new(client: Arc<dyn CompletionClient>, model: ModelConfig) -> Self {
        Self { client, model }
    }
}

impl Node for ReflectNode {
    fn name(&self) -> &str {
        "reflect"
    }

    fn run(&self, state: &State) -> BoxFuture<'_, Result<NodeOutput>> {
        let mut prompt = prompts::REFLECT.to_string();
        if let Some(question) = state.messages().iter().find(|m| m.role == Role::User) {
            prompt.push_str(&format!(
                "\nThis is the user's original question: {}",
                question.content
            ));
        }
        let messages = with_system(prompt, state);
        Box::pin(async move {
            let text = self.client.complete(&self.model, messages).await?;
            let update = StateUpdate::new().message(Message::assistant(text).named("reflect"));
            Ok(NodeOutput::follow(update))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_model, FakeCompletion};
    use retort_graph::{Route, RunInput, StateSchema};

    #[tokio::test]
    async fn generate_increments_the_round_counter() {
        let client = Arc::new(FakeCompletion::new().reply("attempt one"));
        let node = GenerateNode::new(client, test_model(), test_model(), 3);

        let mut state = State::seeded(&RunInput::question("balance H2 + O2"));
        let out = node.run(&state).await.unwrap();
        assert_eq!(out.route, Route::Follow);
        state.merge(out.update, &StateSchema::new());

        assert_eq!(state.get_u64(GENERATIONS), 1);
        assert_eq!(state.last_message().unwrap().name.as_deref(), Some("generate"));
    }

    #[tokio::test]
    async fn last_round_switches_to_the_primary_model() {
        let client = Arc::new(FakeCompletion::new());
        let mut final_model = test_model();
        final_model.model_id = "primary-model".to_string();
        let node = GenerateNode::new(client.clone(), test_model(), final_model, 3);

        let mut state = State::seeded(&RunInput::question("q"));
        for _ in 0..3 {
            let out = node.run(&state).await.unwrap();
            state.merge(out.update, &StateSchema::new());
        }

        let models = client.models.lock().unwrap();
        assert_eq!(
            *models,
            vec!["test-model", "test-model", "primary-model"]
        );
    }

    #[tokio::test]
    async fn reflect_carries_the_original_question_in_its_prompt() {
        let client = Arc::new(FakeCompletion::new().reply("critique"));
        let node = ReflectNode::new(client.clone(), test_model());

        let state = State::seeded(&RunInput::question("what is molarity?"));
        node.run(&state).await.unwrap();

        let seen = client.seen.lock().unwrap();
        assert!(seen[0][0].content.contains("what is molarity?"));
    }
}
