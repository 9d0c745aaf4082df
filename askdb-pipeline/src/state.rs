use askdb_core::{Append, ConversationTurn, Overwrite, Reducer, StateSchema};
use serde::{Deserialize, Serialize};

/// State of one conversation thread.
///
/// `messages` holds the turns of the current run and is reset for every user
/// input; `history` is the durable memory carried between runs.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineState {
    #[serde(default)]
    pub messages: Vec<ConversationTurn>,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    /// Failed validations in the current run.
    #[serde(default)]
    pub rework_attempts: u32,
}

impl PipelineState {
    pub fn new_run(question: impl Into<String>, history: Vec<ConversationTurn>) -> Self {
        Self {
            messages: vec![ConversationTurn::human(question)],
            history,
            rework_attempts: 0,
        }
    }

    /// Turns sent to a stage: durable history first, then this run.
    pub fn conversation(&self) -> Vec<ConversationTurn> {
        self.history
            .iter()
            .chain(self.messages.iter())
            .cloned()
            .collect()
    }

    pub fn last_assistant(&self) -> Option<&ConversationTurn> {
        self.messages.iter().rev().find(|turn| turn.is_assistant())
    }

    /// Most recent turn produced by the named stage.
    pub fn last_from(&self, label: &str) -> Option<&ConversationTurn> {
        self.messages
            .iter()
            .rev()
            .find(|turn| turn.is_assistant() && turn.label.as_deref() == Some(label))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineUpdate {
    #[serde(default)]
    pub messages: Vec<ConversationTurn>,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    #[serde(default)]
    pub rework_attempts: Option<u32>,
}

impl PipelineUpdate {
    pub fn message(turn: ConversationTurn) -> Self {
        Self {
            messages: vec![turn],
            ..Self::default()
        }
    }
}

impl StateSchema for PipelineState {
    type Update = PipelineUpdate;

    fn apply(current: &Self, update: Self::Update) -> Self {
        Self {
            messages: Append.reduce(current.messages.clone(), update.messages),
            history: Append.reduce(current.history.clone(), update.history),
            rework_attempts: match update.rework_attempts {
                Some(attempts) => Overwrite.reduce(current.rework_attempts, attempts),
                None => current.rework_attempts,
            },
        }
    }
}
