#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]
#![allow(clippy::module_name_repetitions)]

//! Reuse-driven action selection for GUI exploration.
//!
//! The host feeds observed screens in ([`ReuseAgent::observe`]) and asks
//! for the next action ([`ReuseAgent::select_action`]); the agent picks
//! by a fixed strategy cascade that favors actions with the best chance
//! of landing on unseen widgets, learns an n-step SARSA value over its
//! choices, records every landing in the reuse store, and exploits
//! sibling-platform models matched by widget similarity.
//!
//! ```no_run
//! use std::sync::Arc;
//! use agent::{AgentConfig, Model, PersistenceTask, State};
//!
//! let model = Model::new(AgentConfig::new().with_base_dir("/sdcard"));
//! let agent = model.agent();
//! agent.load_reuse_model("com.example.app");
//! let saver = PersistenceTask::spawn_default(agent).unwrap();
//!
//! # let screens: Vec<Arc<State>> = Vec::new();
//! for screen in screens {
//!     agent.observe(&screen);
//!     let _action = agent.select_action(&screen);
//!     // hand the action to the device bridge for execution
//! }
//! agent.shutdown();
//! saver.join();
//! ```

/// The reuse agent and its strategy cascade.
pub mod agent;
/// Agent tunables.
pub mod config;
/// Coverage graph and the owning model facade.
pub mod graph;
/// Widgets, actions, verbs, and screen states.
pub mod model;
/// Background model persistence.
pub mod persistence;

pub use agent::ReuseAgent;
pub use config::AgentConfig;
pub use graph::{Graph, Model};
pub use model::{Action, ActionVerb, State, Widget};
pub use persistence::PersistenceTask;
