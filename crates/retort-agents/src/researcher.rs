use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use retort_core::config::ModelConfig;
use retort_core::error::{Result, RetortError};
use retort_core::traits::{CompletionClient, Tool};
use retort_core::types::Message;
use retort_graph::{Node, NodeOutput, State, StateUpdate};

use crate::keys::{ARXIV_QUERIES, RESEARCH, RESEARCHES};
use crate::{prompts, with_system};

/// Queries only the first three plan entries, matching the prompt's promise.
const MAX_QUERIES: usize = 3;

/// The structured plan the researcher asks the model for.
#[derive(Debug, Deserialize)]
struct ResearchPlan {
    #[allow(dead_code)]
    research_thoughts: String,
    #[serde(default)]
    smiles: String,
    #[serde(default)]
    arxiv: String,
}

fn plan_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "research_thoughts": {
                "type": "string",
                "description": "To research on this topic, I should look into..."
            },
            "smiles": {
                "type": "string",
                "description": "Comma separated SMILES strings to resolve to compounds, may be empty."
            },
            "arxiv": {
                "type": "string",
                "description": "Comma separated arXiv queries; only the first three are used."
            }
        },
        "required": ["research_thoughts", "smiles", "arxiv"],
        "additionalProperties": false
    })
}

/// Plans literature and compound lookups, runs them, and appends the digest
/// as tool evidence.
///
/// Queries already issued earlier in the run (the `arxiv_queries` field) are
/// skipped, so a validator sending the conversation back for more research
/// does not replay the same searches.
pub struct ResearcherNode {
    client: Arc<dyn CompletionClient>,
    model: ModelConfig,
    arxiv: Arc<dyn Tool>,
    pubchem: Option<Arc<dyn Tool>>,
}

impl ResearcherNode {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        model: ModelConfig,
        arxiv: Arc<dyn Tool>,
        pubchem: Option<Arc<dyn Tool>>,
    ) -> Self {
        Self {
            client,
            model,
            arxiv,
            pubchem,
        }
    }
}

impl Node for ResearcherNode {
    fn name(&self) -> &str {
        "researcher"
    }

    fn run(&self, state: &State) -> BoxFuture<'_, Result<NodeOutput>> {
        let messages = with_system(prompts::RESEARCHER, state);
        let seen_queries = state.get_str_set(ARXIV_QUERIES);
        let researches = state.get_u64(RESEARCHES);
        Box::pin(async move {
            let value = self
                .client
                .complete_structured(&self.model, messages, &plan_schema())
                .await?;
            let plan: ResearchPlan = serde_json::from_value(value)
                .map_err(|e| RetortError::StructuredOutput(e.to_string()))?;

            let mut queries: Vec<String> = Vec::new();
            for query in plan
                .arxiv
                .split(',')
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .take(MAX_QUERIES)
            {
                if !seen_queries.contains(query) && !queries.iter().any(|q| q == query) {
                    queries.push(query.to_string());
                }
            }
            info!(round = researches + 1, new_queries = queries.len(), "Research round");

            let mut documents = Vec::new();
            for query in &queries {
                documents.push(self.arxiv.invoke(query).await);
            }

            let smiles = plan.smiles.trim();
            let compounds = match (&self.pubchem, smiles.is_empty()) {
                (Some(pubchem), false) => pubchem.invoke(smiles).await,
                _ => "[]".to_string(),
            };

            let digest = format!(
                "arXiv research results:\n\n{}\n\nsmiles to compounds:\n\n{compounds}",
                documents.join("\n\n")
            );

            let update = StateUpdate::new()
                .message(Message::tool(&digest).named("researcher"))
                .set_str(RESEARCH, &digest)
                .set(RESEARCHES, (researches + 1).into())
                .set(ARXIV_QUERIES, json!(queries));
            Ok(NodeOutput::follow(update))
        })
    }
}
