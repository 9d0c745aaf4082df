use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ExecutionConfig {
    pub max_steps: Option<usize>,
    /// Upper bound on how often a single node may run in one invocation.
    pub max_visits: Option<usize>,
    pub max_duration: Option<Duration>,
    pub node_timeout: Option<Duration>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_steps: Some(50),
            max_visits: Some(10),
            max_duration: None,
            node_timeout: None,
        }
    }
}

impl ExecutionConfig {
    pub fn merge(&self, overrides: &ExecutionOptions) -> Self {
        Self {
            max_steps: overrides.max_steps.or(self.max_steps),
            max_visits: overrides.max_visits.or(self.max_visits),
            max_duration: overrides.max_duration.or(self.max_duration),
            node_timeout: overrides.node_timeout.or(self.node_timeout),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ExecutionOptions {
    /// Checkpoints are written only when a thread id is supplied.
    pub thread_id: Option<String>,
    pub max_steps: Option<usize>,
    pub max_visits: Option<usize>,
    pub max_duration: Option<Duration>,
    pub node_timeout: Option<Duration>,
}

impl ExecutionOptions {
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Default::default()
        }
    }
}
