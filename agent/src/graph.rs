use std::{collections::HashSet, sync::Arc};

use parking_lot::RwLock;
use similarity::SimilarityEngine;

use crate::{agent::ReuseAgent, config::AgentConfig, model::State};

/// Running coverage bookkeeping over the observed state graph.
#[derive(Debug, Default)]
pub struct Graph {
    visited_activities: HashSet<String>,
    total_distri: u64,
}

impl Graph {
    /// Accounts one arrival at a state.
    pub fn add_state(&mut self, state: &Arc<State>) {
        self.total_distri += 1;
        self.visited_activities
            .insert(state.activity_name().to_owned());
        state.record_visit();
    }

    /// Activities reached so far this session.
    #[must_use]
    pub fn visited_activities(&self) -> &HashSet<String> {
        &self.visited_activities
    }

    /// Total count of state arrivals, revisits included.
    #[must_use]
    pub fn total_distri(&self) -> u64 {
        self.total_distri
    }
}

/// Owner of the exploration graph and the reuse agent.
///
/// The model holds the only strong reference chain: `Model → Agent`.
/// The agent links back through a weak reference, as does the background
/// persistence task, so dropping the model tears everything down.
#[derive(Debug)]
pub struct Model {
    graph: RwLock<Graph>,
    agent: Arc<ReuseAgent>,
}

impl Model {
    /// Creates a model with a default (fallback-only) similarity engine.
    #[must_use]
    pub fn new(config: AgentConfig) -> Arc<Self> {
        Self::with_engine(config, Arc::new(SimilarityEngine::new()))
    }

    /// Creates a model with the provided similarity engine.
    #[must_use]
    pub fn with_engine(config: AgentConfig, engine: Arc<SimilarityEngine>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            graph: RwLock::new(Graph::default()),
            agent: Arc::new(ReuseAgent::new(weak.clone(), config, engine)),
        })
    }

    /// The owned reuse agent.
    #[must_use]
    pub fn agent(&self) -> &Arc<ReuseAgent> {
        &self.agent
    }

    /// Accounts one arrival at a state.
    pub fn record_state(&self, state: &Arc<State>) {
        self.graph.write().add_state(state);
    }

    /// Snapshot of the visited activities.
    #[must_use]
    pub fn visited_activities(&self) -> HashSet<String> {
        self.graph.read().visited_activities().clone()
    }

    /// Total count of state arrivals.
    #[must_use]
    pub fn total_distri(&self) -> u64 {
        self.graph.read().total_distri()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_counts_arrivals_and_activities() {
        let mut graph = Graph::default();
        let state = Arc::new(State::new("com.app.MainActivity", Vec::new(), Vec::new()));
        graph.add_state(&state);
        graph.add_state(&state);
        assert_eq!(graph.total_distri(), 2);
        assert_eq!(graph.visited_activities().len(), 1);
        assert_eq!(state.visited_count(), 2);
    }

    #[test]
    fn model_owns_the_agent_and_shares_the_graph() {
        let model = Model::new(AgentConfig::default());
        let state = Arc::new(State::new("com.app.MainActivity", Vec::new(), Vec::new()));
        model.record_state(&state);
        assert_eq!(model.total_distri(), 1);
        assert!(model.visited_activities().contains("com.app.MainActivity"));
        assert!(model.agent().reuse_store().is_empty());
    }
}
