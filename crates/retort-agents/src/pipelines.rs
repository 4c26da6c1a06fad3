//! The pipeline catalogue: each variant assembles one agent graph from the
//! nodes in this crate.

use std::str::FromStr;
use std::sync::Arc;

use retort_core::config::AppConfig;
use retort_core::error::{Result, RetortError};
use retort_core::traits::CompletionClient;
use retort_graph::{passthrough, ConditionalArm, Graph, StateSchema};
use retort_tools::ToolRegistry;

use crate::answerer::AnswererNode;
use crate::collaborator::{CollaboratorNode, InitNode};
use crate::ensemble::{AnswerSource, ProfessorNode, StudentNode, VerifierNode};
use crate::generator::{GenerateNode, ReflectNode};
use crate::keys::{ANSWERS, ARXIV_QUERIES, GENERATIONS, PAST_TASKS, UNVERIFIED_ANSWERS, VERIFIED_ANSWERS};
use crate::planner::PlannerNode;
use crate::prompts;
use crate::researcher::ResearcherNode;
use crate::validator::ValidatorNode;

/// The named pipelines. Selected by name on the command line and in task
/// reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    /// Single completion, no tools, no reflection.
    Direct,
    /// Bounded generate/reflect loop before answering.
    Reasoning,
    /// Parallel students synthesized by a professor.
    Ensemble,
    /// Parallel students, each checked by a verifier, synthesized by a
    /// professor that sees the verdicts.
    EnsembleAdvanced,
    /// One research round feeding a single answerer.
    Rag,
    /// Research round, one structured solve pass, then the answerer.
    RagReasoning,
    /// Research round feeding the student ensemble.
    EnsembleResearcher,
    /// Peer collaborators with tools, gated by the validator.
    Collaboration,
    /// Central planner dispatching tool-equipped workers.
    Planned,
}

impl Pipeline {
    pub const ALL: [Pipeline; 9] = [
        Pipeline::Direct,
        Pipeline::Reasoning,
        Pipeline::Ensemble,
        Pipeline::EnsembleAdvanced,
        Pipeline::Rag,
        Pipeline::RagReasoning,
        Pipeline::EnsembleResearcher,
        Pipeline::Collaboration,
        Pipeline::Planned,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Pipeline::Direct => "direct",
            Pipeline::Reasoning => "reasoning",
            Pipeline::Ensemble => "ensemble",
            Pipeline::EnsembleAdvanced => "ensemble_advanced",
            Pipeline::Rag => "rag",
            Pipeline::RagReasoning => "rag_reasoning",
            Pipeline::EnsembleResearcher => "ensemble_researcher",
            Pipeline::Collaboration => "collaboration",
            Pipeline::Planned => "planned",
        }
    }

    /// Assemble the compiled graph for this pipeline.
    pub fn build(
        self,
        client: Arc<dyn CompletionClient>,
        tools: Arc<ToolRegistry>,
        config: &AppConfig,
    ) -> Result<Graph> {
        match self {
            Pipeline::Direct => build_direct(client, config),
            Pipeline::Reasoning => build_reasoning(client, config),
            Pipeline::Ensemble => build_ensemble(client, config),
            Pipeline::EnsembleAdvanced => build_ensemble_advanced(client, config),
            Pipeline::Rag => build_rag(client, tools, config),
            Pipeline::RagReasoning => build_rag_reasoning(client, tools, config),
            Pipeline::EnsembleResearcher => build_ensemble_researcher(client, tools, config),
            Pipeline::Collaboration => build_collaboration(client, tools, config),
            Pipeline::Planned => build_planned(client, tools, config),
        }
    }
}

impl FromStr for Pipeline {
    type Err = RetortError;

    fn from_str(s: &str) -> Result<Self> {
        Pipeline::ALL
            .iter()
            .copied()
            .find(|p| p.name() == s)
            .ok_or_else(|| {
                let known = Pipeline::ALL.map(|p| p.name()).join(", ");
                RetortError::Config(format!("unknown pipeline '{s}' (known: {known})"))
            })
    }
}

impl std::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn research_tools(
    tools: &ToolRegistry,
) -> Result<(
    Arc<dyn retort_core::traits::Tool>,
    Option<Arc<dyn retort_core::traits::Tool>>,
)> {
    let arxiv = tools
        .get("arxiv")
        .ok_or_else(|| RetortError::ToolNotFound("arxiv".to_string()))?;
    Ok((arxiv, tools.get("pubchem")))
}

fn build_direct(client: Arc<dyn CompletionClient>, config: &AppConfig) -> Result<Graph> {
    Graph::builder()
        .node(AnswererNode::new(client, config.model.clone()))
        .entry("answerer")
        .terminal("answerer")
        .compile()
}

fn build_reasoning(client: Arc<dyn CompletionClient>, config: &AppConfig) -> Result<Graph> {
    let rounds = config.pipeline.num_generations;
    Graph::builder()
        .node(GenerateNode::new(
            client.clone(),
            config.small_model().clone(),
            config.model.clone(),
            rounds,
        ))
        .node(ReflectNode::new(client.clone(), config.small_model().clone()))
        .node(AnswererNode::new(client, config.model.clone()))
        .entry("generate")
        .conditional(
            "generate",
            vec![ConditionalArm::new("reflect", move |s| {
                s.get_u64(GENERATIONS) < rounds
            })],
            "answerer",
        )
        .edge("reflect", "generate")
        .terminal("answerer")
        .compile()
}

fn build_ensemble(client: Arc<dyn CompletionClient>, config: &AppConfig) -> Result<Graph> {
    let students: Vec<String> = (0..config.pipeline.num_generators)
        .map(|i| format!("student_{i}"))
        .collect();

    let mut builder = Graph::builder()
        .node(passthrough("start"))
        .node(ProfessorNode::new(
            client.clone(),
            config.model.clone(),
            AnswerSource::Plain,
        ))
        .node(AnswererNode::new(client.clone(), config.model.clone()).short())
        .schema(StateSchema::new().append_field(ANSWERS));
    for i in 0..config.pipeline.num_generators {
        builder = builder.node(StudentNode::new(
            i,
            client.clone(),
            config.small_model().clone(),
        ));
    }
    builder
        .entry("start")
        .fan_out("start", students.clone())
        .fan_in(students, "professor")
        .edge("professor", "answerer")
        .terminal("answerer")
        .compile()
}

fn build_ensemble_advanced(client: Arc<dyn CompletionClient>, config: &AppConfig) -> Result<Graph> {
    let n = config.pipeline.num_generators;
    let students: Vec<String> = (0..n).map(|i| format!("student_{i}")).collect();
    let verifiers: Vec<String> = (0..n).map(|i| format!("verifier_{i}")).collect();

    let mut builder = Graph::builder()
        .node(passthrough("start"))
        .node(ProfessorNode::new(
            client.clone(),
            config.model.clone(),
            AnswerSource::Verified,
        ))
        .node(AnswererNode::new(client.clone(), config.model.clone()).short())
        .schema(
            StateSchema::new()
                .append_field(ANSWERS)
                .append_field(VERIFIED_ANSWERS)
                .append_field(UNVERIFIED_ANSWERS),
        );
    for i in 0..n {
        builder = builder
            .node(StudentNode::new(i, client.clone(), config.small_model().clone()))
            .node(VerifierNode::new(i, client.clone(), config.small_model().clone()))
            .edge(format!("student_{i}"), format!("verifier_{i}"));
    }
    builder
        .entry("start")
        .fan_out("start", students)
        .fan_in(verifiers, "professor")
        .edge("professor", "answerer")
        .terminal("answerer")
        .compile()
}

fn build_rag(
    client: Arc<dyn CompletionClient>,
    tools: Arc<ToolRegistry>,
    config: &AppConfig,
) -> Result<Graph> {
    let (arxiv, pubchem) = research_tools(&tools)?;
    Graph::builder()
        .node(ResearcherNode::new(
            client.clone(),
            config.model.clone(),
            arxiv,
            pubchem,
        ))
        .node(AnswererNode::new(client, config.model.clone()))
        .schema(StateSchema::new().append_field(ARXIV_QUERIES))
        .entry("researcher")
        .edge("researcher", "answerer")
        .terminal("answerer")
        .compile()
}

fn build_rag_reasoning(
    client: Arc<dyn CompletionClient>,
    tools: Arc<ToolRegistry>,
    config: &AppConfig,
) -> Result<Graph> {
    let (arxiv, pubchem) = research_tools(&tools)?;
    Graph::builder()
        .node(ResearcherNode::new(
            client.clone(),
            config.model.clone(),
            arxiv,
            pubchem,
        ))
        .node(GenerateNode::new(
            client.clone(),
            config.small_model().clone(),
            config.model.clone(),
            1,
        ))
        .node(AnswererNode::new(client, config.model.clone()))
        .schema(StateSchema::new().append_field(ARXIV_QUERIES))
        .entry("researcher")
        .edge("researcher", "generate")
        .edge("generate", "answerer")
        .terminal("answerer")
        .compile()
}

fn build_ensemble_researcher(
    client: Arc<dyn CompletionClient>,
    tools: Arc<ToolRegistry>,
    config: &AppConfig,
) -> Result<Graph> {
    let (arxiv, pubchem) = research_tools(&tools)?;
    let students: Vec<String> = (0..config.pipeline.num_generators)
        .map(|i| format!("student_{i}"))
        .collect();

    let mut builder = Graph::builder()
        .node(ResearcherNode::new(
            client.clone(),
            config.model.clone(),
            arxiv,
            pubchem,
        ))
        .node(
            ProfessorNode::new(client.clone(), config.model.clone(), AnswerSource::Plain)
                .with_research(),
        )
        .node(AnswererNode::new(client.clone(), config.model.clone()).short())
        .schema(
            StateSchema::new()
                .append_field(ANSWERS)
                .append_field(ARXIV_QUERIES),
        );
    for i in 0..config.pipeline.num_generators {
        builder = builder.node(StudentNode::new(
            i,
            client.clone(),
            config.small_model().clone(),
        ));
    }
    builder
        .entry("researcher")
        .fan_out("researcher", students.clone())
        .fan_in(students, "professor")
        .edge("professor", "answerer")
        .terminal("answerer")
        .compile()
}

fn build_collaboration(
    client: Arc<dyn CompletionClient>,
    tools: Arc<ToolRegistry>,
    config: &AppConfig,
) -> Result<Graph> {
    let peers = ["researcher".to_string(), "chemist".to_string()];
    let answer_nodes = vec!["validator".to_string()];

    let researcher = CollaboratorNode::new(
        "researcher",
        prompts::RESEARCHER_CHARTER,
        client.clone(),
        config.model.clone(),
        tools.clone(),
        answer_nodes.clone(),
    )
    .with_colleagues(peers.clone());
    let chemist = CollaboratorNode::new(
        "chemist",
        prompts::CHEMIST_CHARTER,
        client.clone(),
        config.model.clone(),
        tools,
        answer_nodes,
    )
    .with_colleagues(peers);

    Graph::builder()
        .node(InitNode::new(client.clone(), config.model.clone()))
        .node(researcher)
        .node(chemist)
        .node(ValidatorNode::new(
            client.clone(),
            config.small_model().clone(),
            "researcher",
            "answerer",
        ))
        .node(AnswererNode::new(client, config.model.clone()))
        .entry("init")
        .edge("init", "researcher")
        .terminal("answerer")
        .compile()
}

fn build_planned(
    client: Arc<dyn CompletionClient>,
    tools: Arc<ToolRegistry>,
    config: &AppConfig,
) -> Result<Graph> {
    let workers = vec!["researcher".to_string(), "chemist".to_string()];
    // Workers report back to the planner when their task is done.
    let report_to = vec!["planner".to_string()];

    let researcher = CollaboratorNode::new(
        "researcher",
        prompts::RESEARCHER_CHARTER,
        client.clone(),
        config.model.clone(),
        tools.clone(),
        report_to.clone(),
    )
    .with_colleagues(workers.clone());
    let chemist = CollaboratorNode::new(
        "chemist",
        prompts::CHEMIST_CHARTER,
        client.clone(),
        config.model.clone(),
        tools,
        report_to,
    )
    .with_colleagues(workers.clone());

    Graph::builder()
        .node(PlannerNode::new(
            client.clone(),
            config.model.clone(),
            workers,
            "validator",
        ))
        .node(researcher)
        .node(chemist)
        .node(ValidatorNode::new(
            client.clone(),
            config.small_model().clone(),
            "planner",
            "answerer",
        ))
        .node(AnswererNode::new(client, config.model.clone()))
        .schema(StateSchema::new().append_field(PAST_TASKS))
        .entry("planner")
        .terminal("answerer")
        .compile()
}
