use std::{
    collections::{HashSet, VecDeque},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use parking_lot::Mutex;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use reuse::{
    local_model_path, ActionAttributes, ActionMatch, ExternalModelRegistry, ReuseStore,
};
use similarity::SimilarityEngine;

use crate::{
    config::{AgentConfig, ALPHA_START, ALPHA_THRESHOLDS, ENTROPY_ALPHA, QUALITY_FLOOR},
    graph::Model,
    model::{Action, ActionVerb, State},
};

/// File name used before a package has been bound.
const DEFAULT_MODEL_FILE_NAME: &str = "fastbot.widget.fbm";

/// The reuse-driven action selector.
///
/// Owns the session's mutable [`ReuseStore`], the read-only sibling
/// platform registry, the SARSA reward/action windows, and the session
/// PRNG. Created and owned by [`Model`]; it links back to the model
/// through a weak reference so the ownership graph stays acyclic.
pub struct ReuseAgent {
    model: Weak<Model>,
    config: AgentConfig,
    engine: Arc<SimilarityEngine>,
    store: ReuseStore,
    registry: ExternalModelRegistry,
    rng: Mutex<SmallRng>,
    current_state: Mutex<Option<Arc<State>>>,
    previous_actions: Mutex<VecDeque<Arc<Action>>>,
    reward_cache: Mutex<VecDeque<f64>>,
    visited_widgets: Mutex<HashSet<u64>>,
    alpha: Mutex<f64>,
    save_path: Mutex<Option<PathBuf>>,
    shutdown: AtomicBool,
}

impl std::fmt::Debug for ReuseAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReuseAgent")
            .field("platform", &self.config.platform)
            .field("store_len", &self.store.len())
            .field("external_platforms", &self.registry.platform_count())
            .finish()
    }
}

impl ReuseAgent {
    /// Creates an agent bound to its owning model.
    #[must_use]
    pub fn new(model: Weak<Model>, config: AgentConfig, engine: Arc<SimilarityEngine>) -> Self {
        let rng = config
            .rng_seed
            .map_or_else(SmallRng::from_entropy, SmallRng::seed_from_u64);
        let registry = ExternalModelRegistry::new(config.match_threshold);
        Self {
            model,
            engine,
            store: ReuseStore::new(),
            registry,
            rng: Mutex::new(rng),
            current_state: Mutex::new(None),
            previous_actions: Mutex::new(VecDeque::new()),
            reward_cache: Mutex::new(VecDeque::new()),
            visited_widgets: Mutex::new(HashSet::new()),
            alpha: Mutex::new(ALPHA_START),
            save_path: Mutex::new(None),
            shutdown: AtomicBool::new(false),
            config,
        }
    }

    /// The agent's configuration.
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The session's mutable reuse store.
    #[must_use]
    pub fn reuse_store(&self) -> &ReuseStore {
        &self.store
    }

    /// The sibling-platform registry.
    #[must_use]
    pub fn external_registry(&self) -> &ExternalModelRegistry {
        &self.registry
    }

    /// Notifies the agent that the session landed on a state.
    pub fn observe(&self, state: &Arc<State>) {
        if let Some(model) = self.model.upgrade() {
            model.record_state(state);
        }
        *self.current_state.lock() = Some(Arc::clone(state));
    }

    /// Picks the next action for the current state and folds the landing
    /// into the reuse model and Q-values.
    ///
    /// The strategy cascade is fixed: unknown action, best exploration
    /// bonus, unvisited action, Q-value argmax, ε-greedy, then the BACK
    /// fallback. Selection always returns a concrete action.
    pub fn select_action(&self, state: &Arc<State>) -> Arc<Action> {
        *self.current_state.lock() = Some(Arc::clone(state));
        let action = self.select_new_action(state);
        self.update_strategy(state, &action);
        action.record_visit();
        action
    }

    fn select_new_action(&self, state: &Arc<State>) -> Arc<Action> {
        if let Some(action) = self.select_unknown_action(state) {
            tracing::debug!(hash = action.hash(), "selected action unknown to any model");
            return action;
        }
        if let Some(action) = self.select_best_known_action(state) {
            tracing::debug!(hash = action.hash(), "selected action by exploration bonus");
            return action;
        }
        if let Some(action) = {
            let mut rng = self.rng.lock();
            state.random_pick_unvisited_action(&mut rng)
        } {
            tracing::debug!(hash = action.hash(), "selected unvisited action");
            return action;
        }
        if let Some(action) = self.select_by_q_value(state) {
            tracing::debug!(hash = action.hash(), "selected action by q-value");
            return action;
        }
        if let Some(action) = self.select_epsilon_greedy(state) {
            tracing::debug!(hash = action.hash(), "selected action epsilon-greedily");
            return action;
        }
        tracing::warn!("no selectable action, falling back to BACK");
        state
            .back_action()
            .unwrap_or_else(|| Arc::new(Action::new(ActionVerb::Back, state.activity_name())))
    }

    /// Stage 1: a model-act action absent from the local store with no
    /// external match and no visits, drawn by priority weight.
    fn select_unknown_action(&self, state: &Arc<State>) -> Option<Arc<Action>> {
        let mut candidates = Vec::new();
        for action in state.actions() {
            if !action.is_model_act() || action.visited_count() > 0 {
                continue;
            }
            if self.store.contains(action.hash()) {
                continue;
            }
            if self.find_external(action).is_some() {
                continue;
            }
            candidates.push(Arc::clone(action));
        }
        let total: i64 = candidates
            .iter()
            .map(|action| i64::from(action.priority()))
            .sum();
        if total <= 0 {
            return None;
        }
        let mut draw = self.rng.lock().gen_range(0..total);
        for action in candidates {
            if draw < i64::from(action.priority()) {
                return Some(action);
            }
            draw -= i64::from(action.priority());
        }
        None
    }

    /// Stage 2: among unvisited target actions known to the local store
    /// or a sibling model, the Gumbel-perturbed best widget probability.
    fn select_best_known_action(&self, state: &Arc<State>) -> Option<Arc<Action>> {
        if self.store.is_empty() && self.registry.is_empty() {
            return None;
        }
        let visited = self.visited_widgets.lock().clone();
        let current = state.widget_descriptors();
        let mut best: Option<(f64, Arc<Action>)> = None;
        for action in state.target_actions() {
            if action.visited_count() > 0 {
                continue;
            }
            let quality = if self.store.contains(action.hash()) {
                self.store
                    .probability_of_visiting_new_widgets(action.hash(), &visited)
                    .unwrap_or(0.0)
            } else if let Some(matched) = self.find_external(&action) {
                self.registry
                    .unvisited_ratio(&self.engine, &matched, &visited, &current)
            } else {
                continue;
            };
            if quality <= QUALITY_FLOOR {
                continue;
            }
            let perturbed = 10.0 * quality + self.gumbel_noise();
            if best.as_ref().map_or(true, |(value, _)| perturbed > *value) {
                best = Some((perturbed, action));
            }
        }
        best.map(|(_, action)| action)
    }

    /// Stage 4: Gumbel-perturbed argmax over `Q / temperature`.
    fn select_by_q_value(&self, state: &Arc<State>) -> Option<Arc<Action>> {
        let mut best: Option<(f64, Arc<Action>)> = None;
        for action in state.actions() {
            let perturbed = action.q_value() / ENTROPY_ALPHA + self.gumbel_noise();
            if best.as_ref().map_or(true, |(value, _)| perturbed > *value) {
                best = Some((perturbed, Arc::clone(action)));
            }
        }
        best.map(|(_, action)| action)
    }

    /// Stage 5: greedy max-Q with probability 1 − ε, else uniform.
    fn select_epsilon_greedy(&self, state: &Arc<State>) -> Option<Arc<Action>> {
        if self.e_greedy() {
            state.greedy_pick_max_q_value(true)
        } else {
            let mut rng = self.rng.lock();
            state.random_pick_action(&mut rng, true)
        }
    }

    /// Returns false with probability ε.
    fn e_greedy(&self) -> bool {
        self.rng.lock().gen::<f64>() >= self.config.epsilon
    }

    /// `−ln(−ln u)` with `u` uniform in `(0, 1)`; adding this to a
    /// quality value makes the argmax sample proportional to `exp(q)`.
    fn gumbel_noise(&self) -> f64 {
        let mut u: f64 = self.rng.lock().gen();
        if u < f64::MIN_POSITIVE {
            u = f64::MIN_POSITIVE;
        }
        -(-u.ln()).ln()
    }

    /// Cached-or-fresh sibling-platform match for an action.
    fn find_external(&self, action: &Action) -> Option<ActionMatch> {
        if let Some(hit) = self.registry.cached_match(action.hash()) {
            return Some(hit);
        }
        let descriptor = action.descriptor()?;
        self.registry
            .find_similar_action(&self.engine, action.hash(), &descriptor)
    }

    /// Runs the SARSA bookkeeping for a freshly chosen action: reward of
    /// the previous action, reuse-model record, n-step Q write-back,
    /// window maintenance, and the visited-widget update.
    fn update_strategy(&self, state: &Arc<State>, chosen: &Arc<Action>) {
        let has_previous = !self.previous_actions.lock().is_empty();
        if has_previous {
            self.compute_reward(state);
            self.record_observation(state);
            self.apply_n_step(chosen.q_value());
        }
        {
            let mut previous = self.previous_actions.lock();
            previous.push_back(Arc::clone(chosen));
            while previous.len() > self.config.sarsa_steps {
                previous.pop_front();
            }
        }
        let mut visited = self.visited_widgets.lock();
        for widget in state.widgets() {
            visited.insert(widget.hash());
        }
    }

    /// Reward of the most recently executed action given the state it
    /// landed on, appended to the reward window.
    fn compute_reward(&self, state: &Arc<State>) -> f64 {
        self.update_alpha();
        let Some(last) = self.previous_actions.lock().back().cloned() else {
            return 0.0;
        };
        let visited = self.visited_widgets.lock().clone();
        let current = state.widget_descriptors();

        let mut reward = if self.store.contains(last.hash()) {
            self.store
                .probability_of_visiting_new_widgets(last.hash(), &visited)
                .unwrap_or(0.0)
        } else if let Some(matched) = self.find_external(&last) {
            self.registry
                .unvisited_ratio(&self.engine, &matched, &visited, &current)
        } else {
            1.0
        };
        // A recorded action that never led anywhere new is still novel
        // relative to this session.
        if reward.abs() < QUALITY_FLOOR {
            reward = 1.0;
        }
        reward /= f64::from(last.visited_count() + 1).sqrt();

        let state_denom = f64::from(state.visited_count() + 1).sqrt();
        let mut widget_sum = 0.0;
        for widget in state.widgets() {
            widget_sum += self.widget_expectation(state, widget.hash(), &visited) / state_denom;
        }
        reward += widget_sum;

        if let Some(model) = self.model.upgrade() {
            tracing::debug!(
                reward,
                visited_activities = model.visited_activities().len(),
                "reward of latest action"
            );
        }
        let mut cache = self.reward_cache.lock();
        cache.push_back(reward);
        while cache.len() > self.config.sarsa_steps {
            cache.pop_front();
        }
        reward
    }

    /// Contribution of one widget to the landed state's expectation:
    /// 0.5 per visited locally-known action targeting it, 0.7 per
    /// externally matched action, 1.0 per unknown action, plus the
    /// action's own new-widget probability.
    fn widget_expectation(&self, state: &State, widget_hash: u64, visited: &HashSet<u64>) -> f64 {
        let mut value = 0.0;
        for action in state.actions() {
            let Some(target) = action.target() else {
                continue;
            };
            if target.hash() != widget_hash {
                continue;
            }
            if self.store.contains(action.hash()) {
                if action.visited_count() >= 1 {
                    value += 0.5;
                }
            } else if self.find_external(action).is_some() {
                value += 0.7;
            } else {
                value += 1.0;
            }
            value += self
                .store
                .probability_of_visiting_new_widgets(action.hash(), visited)
                .unwrap_or(1.0);
        }
        value
    }

    /// Steps the learning rate down as total state arrivals grow.
    fn update_alpha(&self) {
        let total = self.model.upgrade().map_or(0, |model| model.total_distri());
        let mut alpha = ALPHA_START;
        for threshold in ALPHA_THRESHOLDS {
            if total > threshold {
                alpha -= 0.1;
            }
        }
        *self.alpha.lock() = alpha.max(self.config.alpha_floor);
    }

    /// Accumulates the n-step return over the reward window, newest
    /// first, seeded with the freshly chosen action's Q-value, and
    /// writes the update back to the oldest action in the window only.
    fn apply_n_step(&self, bootstrap: f64) {
        let rewards: Vec<f64> = self.reward_cache.lock().iter().copied().collect();
        if rewards.is_empty() {
            return;
        }
        let mut value = bootstrap;
        for reward in rewards.iter().rev() {
            value = reward + self.config.gamma * value;
        }
        let oldest = self.previous_actions.lock().front().cloned();
        if let Some(action) = oldest {
            let q = action.q_value();
            let alpha = *self.alpha.lock();
            action.set_q_value(q + alpha * (value - q));
            tracing::trace!(hash = action.hash(), q, value, alpha, "q-value updated");
        }
    }

    /// Records the landing of the last executed action: every widget of
    /// the landed state, under the store mutex.
    fn record_observation(&self, state: &Arc<State>) {
        let Some(last) = self.previous_actions.lock().back().cloned() else {
            return;
        };
        let widgets = state.widget_descriptors();
        self.store.record(last.hash(), last.attributes(), &widgets);
    }

    /// Binds the agent to a package: loads the local model (tolerating a
    /// missing or corrupt file) and scans for sibling-platform models.
    pub fn load_reuse_model(&self, package: &str) {
        let path = local_model_path(&self.config.base_dir, package);
        *self.save_path.lock() = Some(path.clone());
        if let Err(err) = self.store.load(&path) {
            tracing::warn!(
                error = %err,
                path = %path.display(),
                "local reuse model unavailable, starting empty"
            );
        }
        let hints = self.current_state_hints();
        self.registry
            .auto_load(&self.config.base_dir, package, &self.config.platform, &hints);
    }

    /// Saves the reuse model to `path`, the bound package path, or the
    /// default file under the base directory, in that order. Returns
    /// whether a file was written (an empty store is skipped).
    pub fn save_reuse_model(&self, path: Option<&Path>) -> Result<bool> {
        let target = path.map(Path::to_path_buf).unwrap_or_else(|| {
            self.save_path.lock().clone().unwrap_or_else(|| {
                self.config.base_dir.join(DEFAULT_MODEL_FILE_NAME)
            })
        });
        self.store
            .save(&target, &self.config.platform)
            .with_context(|| format!("saving reuse model to {}", target.display()))
    }

    /// Best-effort save that logs instead of propagating failures; the
    /// in-memory store is retained for the next attempt either way.
    pub fn force_save(&self) {
        if let Err(err) = self.save_reuse_model(None) {
            tracing::warn!(error = %err, "reuse model save failed, retaining in memory");
        }
    }

    /// Stops the persistence task, flushes once, and clears the stores.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.force_save();
        self.store.clear();
        self.registry.clear();
        tracing::info!("reuse agent shut down");
    }

    /// True once [`Self::shutdown`] has run.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Attributes of the current state's actions, used to synthesize
    /// missing attribute rows when loading sibling models.
    fn current_state_hints(&self) -> IndexMap<u64, ActionAttributes> {
        let mut hints = IndexMap::new();
        if let Some(state) = self.current_state.lock().clone() {
            for action in state.actions() {
                hints.insert(action.hash(), action.attributes());
            }
        }
        hints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Widget;
    use reuse::platform_model_path;
    use similarity::WidgetDescriptor;

    const ACTIVITY: &str = "com.app.MainActivity";

    fn seeded_model(seed: u64) -> Arc<Model> {
        Model::new(AgentConfig::new().with_rng_seed(seed))
    }

    fn click_on(text: &str) -> (Arc<Widget>, Arc<Action>) {
        let widget = Arc::new(Widget::new(text, ACTIVITY, format!("id/{text}")));
        let action = Arc::new(Action::on_widget(
            ActionVerb::Click,
            Arc::clone(&widget),
            ACTIVITY,
        ));
        (widget, action)
    }

    fn state_of(pairs: &[(Arc<Widget>, Arc<Action>)]) -> Arc<State> {
        let widgets = pairs.iter().map(|(w, _)| Arc::clone(w)).collect();
        let actions = pairs.iter().map(|(_, a)| Arc::clone(a)).collect();
        Arc::new(State::new(ACTIVITY, widgets, actions))
    }

    #[test]
    fn novel_state_draws_an_unknown_action() {
        let model = seeded_model(3);
        let agent = model.agent();
        let pairs = [click_on("a"), click_on("b"), click_on("c")];
        let state = state_of(&pairs);
        agent.observe(&state);
        let chosen = agent.select_action(&state);
        assert!(pairs.iter().any(|(_, a)| a.hash() == chosen.hash()));
        // Nothing is recorded before the next state is observed.
        assert!(agent.reuse_store().is_empty());
        assert_eq!(chosen.visited_count(), 1);
    }

    #[test]
    fn locally_known_action_wins_by_exploration_bonus() {
        let model = seeded_model(11);
        let agent = model.agent();
        let (widget, _) = click_on("play");
        let action = Arc::new(
            Action::on_widget(ActionVerb::Click, Arc::clone(&widget), ACTIVITY).with_hash(42),
        );
        agent.reuse_store().record(
            42,
            action.attributes(),
            &[(7, WidgetDescriptor::new("Queue", ACTIVITY, ""))],
        );
        agent.reuse_store().record(
            42,
            action.attributes(),
            &[(7, WidgetDescriptor::new("Queue", ACTIVITY, ""))],
        );
        agent.reuse_store().record(
            42,
            action.attributes(),
            &[(7, WidgetDescriptor::new("Queue", ACTIVITY, ""))],
        );

        let state = Arc::new(State::new(ACTIVITY, vec![widget], vec![Arc::clone(&action)]));
        agent.observe(&state);
        let chosen = agent.select_action(&state);
        // Widget 7 is unseen, so the probability is 3/3 before the
        // perturbation and the known action beats the empty stage 1.
        assert_eq!(chosen.hash(), 42);
    }

    #[test]
    fn externally_matched_action_wins_with_external_bonus() {
        let dir = tempfile::tempdir().unwrap();
        let package = "com.example.app";

        // A tablet model with one action landing on three widgets.
        let external = ReuseStore::new();
        let attrs = ActionAttributes {
            action_type: ActionVerb::Click.code(),
            activity: "com.example.MainActivity".into(),
            target: WidgetDescriptor::new(
                "Play",
                "com.example.MainActivity",
                "com.example:id/play_button",
            ),
        };
        for _ in 0..5 {
            external.record(99, attrs.clone(), &[(1, WidgetDescriptor::new("Home", "com.example.HomeActivity", ""))]);
        }
        for _ in 0..3 {
            external.record(99, attrs.clone(), &[(2, WidgetDescriptor::default())]);
        }
        for _ in 0..2 {
            external.record(99, attrs.clone(), &[(3, WidgetDescriptor::default())]);
        }
        external
            .save(&platform_model_path(dir.path(), package, "tablet"), "tablet")
            .unwrap();

        let model = Model::new(
            AgentConfig::new()
                .with_base_dir(dir.path())
                .with_rng_seed(5),
        );
        let agent = model.agent();
        agent.load_reuse_model(package);
        assert_eq!(agent.external_registry().platform_count(), 1);

        let widget = Arc::new(Widget::new("Play", ACTIVITY, "com.app:id/play_btn"));
        let action = Arc::new(Action::on_widget(
            ActionVerb::Click,
            Arc::clone(&widget),
            ACTIVITY,
        ));
        let state = Arc::new(State::new(
            ACTIVITY,
            vec![Arc::clone(&widget)],
            vec![Arc::clone(&action)],
        ));
        agent.observe(&state);
        let chosen = agent.select_action(&state);
        assert_eq!(chosen.hash(), action.hash());
        // The successful match is cached for the rest of the session.
        let cached = agent.external_registry().cached_match(action.hash()).unwrap();
        assert_eq!(cached.external_action_hash, 99);
        assert!(cached.similarity >= agent.config().match_threshold);
    }

    #[test]
    fn first_step_writes_no_q_value() {
        let model = seeded_model(1);
        let agent = model.agent();
        let pairs = [click_on("a"), click_on("b")];
        let state = state_of(&pairs);
        agent.observe(&state);
        let chosen = agent.select_action(&state);
        assert!(agent.reward_cache.lock().is_empty());
        assert!((chosen.q_value()).abs() < 1e-12);
        for (_, action) in &pairs {
            assert!(action.q_value().abs() < 1e-12);
        }
    }

    #[test]
    fn second_step_records_the_landing() {
        let model = seeded_model(2);
        let agent = model.agent();
        let first = [click_on("a")];
        let state1 = state_of(&first);
        agent.observe(&state1);
        let executed = agent.select_action(&state1);

        let second = [click_on("b"), click_on("c")];
        let state2 = state_of(&second);
        agent.observe(&state2);
        let before = agent.reuse_store().total_observations();
        agent.select_action(&state2);

        // The landing of the executed action is recorded: one count per
        // widget of the landed state.
        let entry = agent.reuse_store().entry(executed.hash()).unwrap();
        assert_eq!(entry.widgets.len(), 2);
        assert_eq!(
            agent.reuse_store().total_observations(),
            before + state2.widgets().len() as i64
        );
        assert_eq!(agent.reward_cache.lock().len(), 1);
    }

    #[test]
    fn windows_stay_bounded_over_many_steps() {
        let model = seeded_model(4);
        let agent = model.agent();
        for step in 0..8 {
            let pairs = [click_on(&format!("w{step}"))];
            let state = state_of(&pairs);
            agent.observe(&state);
            agent.select_action(&state);
            assert!(agent.reward_cache.lock().len() <= 5);
            assert!(agent.previous_actions.lock().len() <= 5);
        }
        assert_eq!(agent.previous_actions.lock().len(), 5);
        assert_eq!(agent.reward_cache.lock().len(), 5);
    }

    #[test]
    fn n_step_return_updates_only_the_oldest_action() {
        let model = seeded_model(6);
        let agent = model.agent();
        let actions: Vec<Arc<Action>> = (0..5)
            .map(|i| Arc::new(Action::new(ActionVerb::Back, ACTIVITY).with_hash(i)))
            .collect();
        {
            let mut previous = agent.previous_actions.lock();
            for action in &actions {
                previous.push_back(Arc::clone(action));
            }
        }
        {
            let mut cache = agent.reward_cache.lock();
            for reward in [0.1, 0.2, 0.3, 0.4, 0.5] {
                cache.push_back(reward);
            }
        }
        *agent.alpha.lock() = 0.5;
        agent.apply_n_step(0.0);

        // Newest reward applied first: G = 0.1 + 0.9(0.2 + 0.9(0.3 +
        // 0.9(0.4 + 0.9 * 0.5))).
        let expected_g = 0.1 + 0.9 * (0.2 + 0.9 * (0.3 + 0.9 * (0.4 + 0.9 * 0.5)));
        assert!((actions[0].q_value() - 0.5 * expected_g).abs() < 1e-9);
        for action in &actions[1..] {
            assert!(action.q_value().abs() < 1e-12);
        }
    }

    #[test]
    fn alpha_steps_down_at_visit_thresholds() {
        let model = seeded_model(8);
        let agent = model.agent();
        let state = Arc::new(State::new(ACTIVITY, Vec::new(), Vec::new()));
        agent.update_alpha();
        assert!((*agent.alpha.lock() - 0.5).abs() < 1e-12);

        for _ in 0..20_001 {
            model.record_state(&state);
        }
        agent.update_alpha();
        assert!((*agent.alpha.lock() - 0.4).abs() < 1e-12);

        for _ in 0..230_000 {
            model.record_state(&state);
        }
        // All four thresholds crossed: 0.5 - 0.4 clamps at the floor.
        agent.update_alpha();
        assert!((*agent.alpha.lock() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn empty_state_returns_the_back_fallback() {
        let model = seeded_model(10);
        let agent = model.agent();
        let state = Arc::new(State::new(ACTIVITY, Vec::new(), Vec::new()));
        agent.observe(&state);
        let chosen = agent.select_action(&state);
        assert_eq!(chosen.verb(), ActionVerb::Back);
        assert_eq!(chosen.activity(), ACTIVITY);
    }

    #[test]
    fn epsilon_toggle_follows_the_exploration_rate() {
        let always_greedy = Model::new(AgentConfig::new().with_epsilon(0.0).with_rng_seed(1));
        for _ in 0..32 {
            assert!(always_greedy.agent().e_greedy());
        }
        let never_greedy = Model::new(AgentConfig::new().with_epsilon(1.0).with_rng_seed(1));
        for _ in 0..32 {
            assert!(!never_greedy.agent().e_greedy());
        }
    }

    #[test]
    fn visited_widgets_accumulate_after_selection() {
        let model = seeded_model(12);
        let agent = model.agent();
        let pairs = [click_on("a"), click_on("b")];
        let state = state_of(&pairs);
        agent.observe(&state);
        agent.select_action(&state);
        let visited = agent.visited_widgets.lock();
        for (widget, _) in &pairs {
            assert!(visited.contains(&widget.hash()));
        }
    }

    #[test]
    fn shutdown_flushes_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let model = Model::new(
            AgentConfig::new()
                .with_base_dir(dir.path())
                .with_rng_seed(13),
        );
        let agent = model.agent();
        agent.reuse_store().record(
            1,
            ActionAttributes::default(),
            &[(2, WidgetDescriptor::new("a", ACTIVITY, ""))],
        );
        agent.shutdown();
        assert!(agent.is_shutdown());
        assert!(agent.reuse_store().is_empty());
        assert!(dir.path().join(DEFAULT_MODEL_FILE_NAME).exists());
    }
}
