use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use askdb_core::{AskError, Checkpoint, Checkpointer, GraphState, StateSchema, StateUpdate, Value};

use crate::program::GraphProgram;
use crate::{ExecutionConfig, ExecutionOptions, GraphError, Observer};

/// Reserved target name that terminates a run.
pub const END: &str = "__end__";

#[derive(Clone, Debug)]
pub struct GraphContext {
    pub node: String,
    pub step: u64,
    pub thread_id: Option<String>,
}

#[async_trait::async_trait]
pub trait GraphNode<S: StateSchema>: Send + Sync {
    async fn invoke_with_context(
        &self,
        state: GraphState<S>,
        context: &GraphContext,
    ) -> Result<StateUpdate<S>, AskError>;
}

/// Picks a routing label from the state after a node ran.
pub type Router<S> = Arc<dyn Fn(&GraphState<S>) -> String + Send + Sync>;

enum Transition<S: StateSchema> {
    Direct(String),
    Conditional(Router<S>),
}

pub struct GraphBuilder<S: StateSchema> {
    nodes: HashMap<String, Box<dyn GraphNode<S>>>,
    transitions: HashMap<String, Transition<S>>,
    routes: HashMap<(String, String), String>,
    conflicts: Vec<(String, String)>,
    entry: Option<String>,
    config: ExecutionConfig,
    checkpointer: Option<Arc<dyn Checkpointer<S>>>,
    observer: Option<Arc<dyn Observer>>,
}

impl<S: StateSchema> Default for GraphBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StateSchema> GraphBuilder<S> {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            transitions: HashMap::new(),
            routes: HashMap::new(),
            conflicts: Vec::new(),
            entry: None,
            config: ExecutionConfig::default(),
            checkpointer: None,
            observer: None,
        }
    }

    pub fn add_node<N>(mut self, name: &str, node: N) -> Self
    where
        N: GraphNode<S> + 'static,
    {
        self.nodes.insert(name.to_string(), Box::new(node));
        self
    }

    pub fn set_entry(mut self, name: &str) -> Self {
        self.entry = Some(name.to_string());
        self
    }

    pub fn add_edge(mut self, from: &str, to: &str) -> Self {
        if self.transitions.contains_key(from) {
            self.conflicts.push((from.to_string(), to.to_string()));
        } else {
            self.transitions
                .insert(from.to_string(), Transition::Direct(to.to_string()));
        }
        self
    }

    /// Registers a router for `from` and the `(label, target)` pairs it may
    /// resolve to. A label outside `targets` fails the run.
    pub fn add_conditional_edges<F>(mut self, from: &str, router: F, targets: &[(&str, &str)]) -> Self
    where
        F: Fn(&GraphState<S>) -> String + Send + Sync + 'static,
    {
        if self.transitions.contains_key(from) {
            self.conflicts.push((from.to_string(), "<conditional>".to_string()));
            return self;
        }
        self.transitions
            .insert(from.to_string(), Transition::Conditional(Arc::new(router)));
        for (label, to) in targets {
            self.routes
                .insert((from.to_string(), label.to_string()), to.to_string());
        }
        self
    }

    pub fn with_default_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer<S>>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> Result<ExecutableGraph<S>, GraphError> {
        let entry = self.entry.ok_or(GraphError::MissingEntry)?;
        if !self.nodes.contains_key(&entry) {
            return Err(GraphError::MissingNode { node: entry });
        }
        if let Some((from, to)) = self.conflicts.into_iter().next() {
            return Err(GraphError::InvalidEdge { from, to });
        }

        let known = |name: &str| name == END || self.nodes.contains_key(name);
        let mut edges = Vec::new();
        for (from, transition) in &self.transitions {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::MissingNode { node: from.clone() });
            }
            if let Transition::Direct(to) = transition {
                if !known(to) {
                    return Err(GraphError::InvalidEdge {
                        from: from.clone(),
                        to: to.clone(),
                    });
                }
                edges.push((from.clone(), to.clone(), None));
            }
        }
        for ((from, label), to) in &self.routes {
            if !known(to) {
                return Err(GraphError::InvalidEdge {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
            edges.push((from.clone(), to.clone(), Some(label.clone())));
        }

        let mut names: Vec<String> = self.nodes.keys().cloned().collect();
        names.sort();
        let program = GraphProgram::from_edges(&names, &edges);

        Ok(ExecutableGraph {
            nodes: self.nodes,
            transitions: self.transitions,
            routes: self.routes,
            entry,
            config: self.config,
            checkpointer: self.checkpointer,
            observer: self.observer,
            program,
        })
    }
}

pub struct ExecutableGraph<S: StateSchema> {
    nodes: HashMap<String, Box<dyn GraphNode<S>>>,
    transitions: HashMap<String, Transition<S>>,
    routes: HashMap<(String, String), String>,
    entry: String,
    config: ExecutionConfig,
    checkpointer: Option<Arc<dyn Checkpointer<S>>>,
    observer: Option<Arc<dyn Observer>>,
    program: GraphProgram,
}

impl<S: StateSchema> ExecutableGraph<S> {
    pub fn program(&self) -> &GraphProgram {
        &self.program
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub async fn invoke_graph(&self, state: GraphState<S>) -> Result<GraphState<S>, GraphError> {
        self.invoke_graph_with_options(state, ExecutionOptions::default())
            .await
    }

    pub async fn invoke_graph_with_options(
        &self,
        state: GraphState<S>,
        options: ExecutionOptions,
    ) -> Result<GraphState<S>, GraphError> {
        let config = self.config.merge(&options);
        let started = Instant::now();
        let run = self.run(state, options.thread_id.as_deref(), &config);
        match config.max_duration {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                GraphError::Timeout {
                    node: None,
                    elapsed: started.elapsed(),
                }
            })?,
            None => run.await,
        }
    }

    async fn run(
        &self,
        mut state: GraphState<S>,
        thread_id: Option<&str>,
        config: &ExecutionConfig,
    ) -> Result<GraphState<S>, GraphError> {
        let mut current = self.entry.clone();
        let mut step: u64 = 0;
        let mut visits: HashMap<String, usize> = HashMap::new();

        while current != END {
            if let Some(max) = config.max_steps {
                if step as usize >= max {
                    return Err(GraphError::MaxStepsExceeded {
                        max,
                        reached: step as usize,
                    });
                }
            }
            let visit = visits.entry(current.clone()).or_insert(0);
            *visit += 1;
            if let Some(max) = config.max_visits {
                if *visit > max {
                    return Err(GraphError::MaxVisitsExceeded { node: current, max });
                }
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| GraphError::MissingNode {
                    node: current.clone(),
                })?;
            let context = GraphContext {
                node: current.clone(),
                step,
                thread_id: thread_id.map(str::to_string),
            };

            if let Some(observer) = &self.observer {
                observer.on_node_start(&current, &snapshot(&state.data)).await;
            }
            let started = Instant::now();
            let call = node.invoke_with_context(state.clone(), &context);
            let outcome = match config.node_timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result.map_err(|source| GraphError::NodeFailed {
                        node: current.clone(),
                        source,
                    }),
                    Err(_) => Err(GraphError::Timeout {
                        node: Some(current.clone()),
                        elapsed: started.elapsed(),
                    }),
                },
                None => call.await.map_err(|source| GraphError::NodeFailed {
                    node: current.clone(),
                    source,
                }),
            };
            let update = match outcome {
                Ok(update) => update,
                Err(err) => {
                    if let Some(observer) = &self.observer {
                        observer.on_error(&current, &err).await;
                    }
                    return Err(err);
                }
            };

            state = state.apply(update);
            step += 1;
            if let Some(observer) = &self.observer {
                observer
                    .on_node_end(&current, &snapshot(&state.data), started.elapsed().as_millis())
                    .await;
            }

            if let (Some(checkpointer), Some(thread_id)) = (&self.checkpointer, thread_id) {
                let checkpoint =
                    Checkpoint::new(thread_id.to_string(), state.clone(), step, current.clone());
                checkpointer
                    .save(&checkpoint)
                    .await
                    .map_err(|err| GraphError::Checkpoint(err.to_string()))?;
                if let Some(observer) = &self.observer {
                    observer.on_checkpoint_saved(&current, step).await;
                }
            }

            current = self.next_node(&current, &state)?;
        }

        Ok(state)
    }

    fn next_node(&self, current: &str, state: &GraphState<S>) -> Result<String, GraphError> {
        match self.transitions.get(current) {
            None => Ok(END.to_string()),
            Some(Transition::Direct(to)) => Ok(to.clone()),
            Some(Transition::Conditional(router)) => {
                let label = router(state);
                self.routes
                    .get(&(current.to_string(), label.clone()))
                    .cloned()
                    .ok_or_else(|| GraphError::UnknownRoute {
                        node: current.to_string(),
                        route: label,
                    })
            }
        }
    }
}

fn snapshot<S: StateSchema>(state: &S) -> Value {
    serde_json::to_value(state).unwrap_or(Value::Null)
}
