use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use retort_core::types::Message;

/// How a node's write to an auxiliary field combines with the existing value.
///
/// The message log always appends; auxiliary fields declare their policy in
/// the [`StateSchema`] at graph build time and keep it for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Concatenate sequences in arrival order; initialize if absent.
    Append,
    /// Last write wins.
    Replace,
}

/// Per-field merge policies, declared once when the graph is built.
///
/// Undeclared fields default to [`MergePolicy::Replace`], which matches the
/// counters and scalar hints (`generations`, `task`, `answer_structure`).
#[derive(Debug, Clone, Default)]
pub struct StateSchema {
    policies: HashMap<String, MergePolicy>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an append-policy field (e.g. `answers`, `verified_answers`).
    pub fn append_field(mut self, key: impl Into<String>) -> Self {
        self.policies.insert(key.into(), MergePolicy::Append);
        self
    }

    pub fn policy(&self, key: &str) -> MergePolicy {
        self.policies
            .get(key)
            .copied()
            .unwrap_or(MergePolicy::Replace)
    }
}

/// The partial state a node returns. Writes are ordered so that merging is
/// deterministic regardless of how the update was assembled.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub messages: Vec<Message>,
    pub aux: Vec<(String, serde_json::Value)>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one message to the conversation log.
    pub fn message(mut self, msg: Message) -> Self {
        self.messages.push(msg);
        self
    }

    /// Append several messages to the conversation log.
    pub fn extend_messages(mut self, msgs: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(msgs);
        self
    }

    /// Write an auxiliary field.
    pub fn set(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.aux.push((key.into(), value));
        self
    }

    pub fn set_str(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = serde_json::Value::String(value.into());
        self.set(key, value)
    }

    /// Write a message sequence into an auxiliary field (append-policy fields
    /// like `answers` hold tagged messages, not plain strings).
    pub fn set_messages(self, key: impl Into<String>, msgs: Vec<Message>) -> Self {
        let value = serde_json::to_value(msgs).unwrap_or(serde_json::Value::Array(vec![]));
        self.set(key, value)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.aux.is_empty()
    }
}

/// Typed seed for a run: the user's question plus an explicit answer-format
/// hint. The hint is a declared field, not a magic separator embedded in the
/// question text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInput {
    pub question: String,
    #[serde(default)]
    pub answer_format: Option<String>,
}

impl RunInput {
    pub fn question(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer_format: None,
        }
    }

    pub fn with_answer_format(mut self, format: impl Into<String>) -> Self {
        self.answer_format = Some(format.into());
        self
    }
}

/// Mutable record shared across one run: the ordered message log plus
/// free-form auxiliary fields.
///
/// State is only ever mutated through [`State::merge`], which the executor
/// applies one node output at a time (or batched in declaration order after a
/// fan-out joins). Nodes receive `&State` and cannot touch each other's
/// pending updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    messages: Vec<Message>,
    aux: HashMap<String, serde_json::Value>,
}

/// Auxiliary field name for the answer-format hint.
pub const ANSWER_STRUCTURE: &str = "answer_structure";

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a run: one user message, plus the answer-format hint if given.
    pub fn seeded(input: &RunInput) -> Self {
        let mut state = Self::new();
        state.messages.push(Message::user(&input.question));
        if let Some(ref format) = input.answer_format {
            state
                .aux
                .insert(ANSWER_STRUCTURE.into(), serde_json::Value::String(format.clone()));
        }
        state
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Whether any message in the log carries tool evidence.
    pub fn has_tool_evidence(&self) -> bool {
        self.messages.iter().any(|m| m.is_tool_evidence())
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.aux.get(key)
    }

    /// String field; empty string if absent or not a string.
    pub fn get_str(&self, key: &str) -> &str {
        self.aux.get(key).and_then(|v| v.as_str()).unwrap_or("")
    }

    /// String field as an Option; `None` when absent, empty, or null.
    pub fn get_opt_str(&self, key: &str) -> Option<&str> {
        self.aux
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Counter field; zero if absent.
    pub fn get_u64(&self, key: &str) -> u64 {
        self.aux.get(key).and_then(|v| v.as_u64()).unwrap_or(0)
    }

    /// Set-of-strings field; empty if absent. Ordered for determinism.
    pub fn get_str_set(&self, key: &str) -> BTreeSet<String> {
        self.aux
            .get(key)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Message-sequence field (e.g. `answers`); empty if absent.
    pub fn get_messages(&self, key: &str) -> Vec<Message> {
        self.aux
            .get(key)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// Apply one node's partial update under the schema's merge policies.
    ///
    /// Messages always concatenate. For each aux write, append-policy
    /// sequences concatenate in arrival order; everything else replaces.
    pub fn merge(&mut self, update: StateUpdate, schema: &StateSchema) {
        self.messages.extend(update.messages);
        for (key, value) in update.aux {
            match (schema.policy(&key), self.aux.get_mut(&key)) {
                (MergePolicy::Append, Some(serde_json::Value::Array(existing))) => {
                    match value {
                        serde_json::Value::Array(items) => existing.extend(items),
                        other => existing.push(other),
                    }
                }
                (MergePolicy::Append, None) => {
                    // Initialize as a sequence so later appends concatenate.
                    let value = match value {
                        arr @ serde_json::Value::Array(_) => arr,
                        other => serde_json::Value::Array(vec![other]),
                    };
                    self.aux.insert(key, value);
                }
                _ => {
                    self.aux.insert(key, value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_state_carries_question_and_format() {
        let input = RunInput::question("What is the pKa of acetic acid?")
            .with_answer_format("You MUST include the value in your answer.");
        let state = State::seeded(&input);
        assert_eq!(state.messages().len(), 1);
        assert_eq!(
            state.get_str(ANSWER_STRUCTURE),
            "You MUST include the value in your answer."
        );

        let bare = State::seeded(&RunInput::question("q"));
        assert_eq!(bare.get_opt_str(ANSWER_STRUCTURE), None);
    }

    #[test]
    fn absent_keys_read_as_defaults() {
        let state = State::new();
        assert_eq!(state.get_str("task"), "");
        assert_eq!(state.get_u64("generations"), 0);
        assert!(state.get_str_set("arxiv_queries").is_empty());
        assert!(state.get_messages("answers").is_empty());
    }

    #[test]
    fn messages_always_append() {
        let schema = StateSchema::new();
        let mut state = State::new();
        state.merge(StateUpdate::new().message(Message::user("q")), &schema);
        state.merge(
            StateUpdate::new().message(Message::assistant("a").named("student")),
            &schema,
        );
        assert_eq!(state.messages().len(), 2);
        assert_eq!(state.last_message().unwrap().name.as_deref(), Some("student"));
    }

    #[test]
    fn append_field_concatenates_k_updates() {
        let schema = StateSchema::new().append_field("answers");
        let mut state = State::new();
        for i in 0..4 {
            let msg = Message::assistant(format!("answer {i}")).named(format!("student-{i}"));
            state.merge(StateUpdate::new().set_messages("answers", vec![msg]), &schema);
        }
        let answers = state.get_messages("answers");
        assert_eq!(answers.len(), 4);
        assert_eq!(answers[0].name.as_deref(), Some("student-0"));
        assert_eq!(answers[3].name.as_deref(), Some("student-3"));
    }

    #[test]
    fn replace_field_last_write_wins() {
        let schema = StateSchema::new();
        let mut state = State::new();
        state.merge(StateUpdate::new().set("generations", 1.into()), &schema);
        state.merge(StateUpdate::new().set("generations", 2.into()), &schema);
        assert_eq!(state.get_u64("generations"), 2);
    }

    #[test]
    fn append_initializes_absent_key() {
        let schema = StateSchema::new().append_field("tags");
        let mut state = State::new();
        state.merge(
            StateUpdate::new().set("tags", serde_json::json!(["a"])),
            &schema,
        );
        state.merge(
            StateUpdate::new().set("tags", serde_json::json!(["b", "c"])),
            &schema,
        );
        assert_eq!(
            state.get("tags").unwrap(),
            &serde_json::json!(["a", "b", "c"])
        );
    }

    #[test]
    fn tool_evidence_visible_through_state() {
        let schema = StateSchema::new();
        let mut state = State::new();
        assert!(!state.has_tool_evidence());
        state.merge(
            StateUpdate::new().message(Message::tool("Command: Task completed.")),
            &schema,
        );
        assert!(!state.has_tool_evidence());
        state.merge(
            StateUpdate::new().message(Message::tool("arXiv results: ...")),
            &schema,
        );
        assert!(state.has_tool_evidence());
    }
}
