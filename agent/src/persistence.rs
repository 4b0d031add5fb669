use std::{
    sync::{Arc, Weak},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{Context, Result};

use crate::agent::ReuseAgent;

/// Background worker flushing the reuse model at a fixed interval.
///
/// The worker holds only a weak reference to the agent: each tick it
/// upgrades, saves, and drops the strong handle again. A failed upgrade
/// is the termination signal, so the task dies within one interval of
/// the agent being dropped. An explicit shutdown is honored the same
/// way through the agent's shutdown flag.
#[derive(Debug)]
pub struct PersistenceTask {
    handle: JoinHandle<()>,
}

impl PersistenceTask {
    /// Spawns the saver thread for an agent.
    pub fn spawn(agent: &Arc<ReuseAgent>, interval: Duration) -> Result<Self> {
        let weak: Weak<ReuseAgent> = Arc::downgrade(agent);
        let handle = thread::Builder::new()
            .name("reuse-model-saver".to_owned())
            .spawn(move || run(&weak, interval))
            .context("spawning the reuse model saver thread")?;
        Ok(Self { handle })
    }

    /// Spawns the saver with the agent's configured interval.
    pub fn spawn_default(agent: &Arc<ReuseAgent>) -> Result<Self> {
        let interval = agent.config().save_interval;
        Self::spawn(agent, interval)
    }

    /// True once the worker has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Blocks until the worker exits.
    pub fn join(self) {
        if self.handle.join().is_err() {
            tracing::error!("reuse model saver thread panicked");
        }
    }
}

fn run(agent: &Weak<ReuseAgent>, interval: Duration) {
    loop {
        match agent.upgrade() {
            None => break,
            Some(agent) => {
                if agent.is_shutdown() {
                    break;
                }
                agent.force_save();
                tracing::debug!("periodic reuse model save");
            }
        }
        thread::sleep(interval);
    }
    tracing::debug!("reuse model saver exiting");
}
