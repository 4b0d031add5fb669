use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use parking_lot::Mutex;
use rand::{rngs::SmallRng, Rng};
use reuse::{stable_hash64, ActionAttributes};
use similarity::WidgetDescriptor;

/// User-level verbs the exploration engine can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionVerb {
    /// No-op placeholder.
    Nop,
    /// Navigate back.
    Back,
    /// Type text into the focused input.
    Feed,
    /// Tap a widget.
    Click,
    /// Long-press a widget.
    LongClick,
    /// Scroll from the top edge downwards.
    ScrollTopDown,
    /// Scroll from the bottom edge upwards.
    ScrollBottomUp,
    /// Scroll from the left edge to the right.
    ScrollLeftRight,
    /// Scroll from the right edge to the left.
    ScrollRightLeft,
    /// Repeated bottom-up scroll.
    ScrollBottomUpN,
}

impl ActionVerb {
    /// Stable numeric code used in fingerprints and model files.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Nop => 0,
            Self::Back => 1,
            Self::Feed => 2,
            Self::Click => 3,
            Self::LongClick => 4,
            Self::ScrollTopDown => 5,
            Self::ScrollBottomUp => 6,
            Self::ScrollLeftRight => 7,
            Self::ScrollRightLeft => 8,
            Self::ScrollBottomUpN => 9,
        }
    }

    /// Verbs eligible for exploration modeling; BACK and FEED are
    /// navigation-only and excluded from cross-platform matching.
    #[must_use]
    pub const fn is_model_act(self) -> bool {
        matches!(
            self,
            Self::Click
                | Self::LongClick
                | Self::ScrollTopDown
                | Self::ScrollBottomUp
                | Self::ScrollLeftRight
                | Self::ScrollRightLeft
                | Self::ScrollBottomUpN
        )
    }
}

/// An identified UI element of one observed screen.
#[derive(Debug, Clone)]
pub struct Widget {
    hash: u64,
    text: String,
    activity: String,
    resource_id: String,
    icon_base64: Option<String>,
}

impl Widget {
    /// Creates a widget; the fingerprint is derived from the attributes.
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        activity: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        let text = text.into();
        let activity = activity.into();
        let resource_id = resource_id.into();
        let hash = stable_hash64(format!("w|{text}|{activity}|{resource_id}").as_bytes());
        Self {
            hash,
            text,
            activity,
            resource_id,
            icon_base64: None,
        }
    }

    /// Attaches a base64-encoded icon.
    #[must_use]
    pub fn with_icon(mut self, icon_base64: impl Into<String>) -> Self {
        self.icon_base64 = Some(icon_base64.into());
        self
    }

    /// Overrides the producer-assigned fingerprint.
    #[must_use]
    pub fn with_hash(mut self, hash: u64) -> Self {
        self.hash = hash;
        self
    }

    /// Stable 64-bit fingerprint.
    #[must_use]
    pub const fn hash(&self) -> u64 {
        self.hash
    }

    /// Displayed text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Activity the widget was observed on.
    #[must_use]
    pub fn activity(&self) -> &str {
        &self.activity
    }

    /// Android resource id.
    #[must_use]
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// True when an icon payload is attached.
    #[must_use]
    pub const fn has_icon(&self) -> bool {
        self.icon_base64.is_some()
    }

    /// The icon payload, if any.
    #[must_use]
    pub fn icon_base64(&self) -> Option<&str> {
        self.icon_base64.as_deref()
    }

    /// The widget's matchable attributes.
    #[must_use]
    pub fn descriptor(&self) -> WidgetDescriptor {
        WidgetDescriptor {
            text: self.text.clone(),
            activity: self.activity.clone(),
            resource_id: self.resource_id.clone(),
            icon_base64: self.icon_base64.clone().unwrap_or_default(),
        }
    }
}

/// A (verb, widget) pair the engine can execute on a screen.
///
/// Visit count and Q-value mutate during the session while the rest of
/// the action is immutable, so both live behind interior mutability and
/// actions are shared as `Arc<Action>`.
#[derive(Debug)]
pub struct Action {
    hash: u64,
    verb: ActionVerb,
    target: Option<Arc<Widget>>,
    activity: String,
    priority: i32,
    visited: AtomicU32,
    q_value: Mutex<f64>,
}

impl Action {
    /// Creates a widget-less action (BACK, FEED).
    #[must_use]
    pub fn new(verb: ActionVerb, activity: impl Into<String>) -> Self {
        Self::build(verb, None, activity.into())
    }

    /// Creates an action targeting a widget.
    #[must_use]
    pub fn on_widget(verb: ActionVerb, target: Arc<Widget>, activity: impl Into<String>) -> Self {
        Self::build(verb, Some(target), activity.into())
    }

    fn build(verb: ActionVerb, target: Option<Arc<Widget>>, activity: String) -> Self {
        let widget_hash = target.as_ref().map_or(0, |widget| widget.hash());
        let hash = stable_hash64(
            format!("a|{}|{widget_hash}|{activity}", verb.code()).as_bytes(),
        );
        Self {
            hash,
            verb,
            target,
            activity,
            priority: 1,
            visited: AtomicU32::new(0),
            q_value: Mutex::new(0.0),
        }
    }

    /// Overrides the producer-assigned fingerprint.
    #[must_use]
    pub fn with_hash(mut self, hash: u64) -> Self {
        self.hash = hash;
        self
    }

    /// Sets the sampling priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Stable 64-bit fingerprint.
    #[must_use]
    pub const fn hash(&self) -> u64 {
        self.hash
    }

    /// The action's verb.
    #[must_use]
    pub const fn verb(&self) -> ActionVerb {
        self.verb
    }

    /// Numeric verb code.
    #[must_use]
    pub const fn action_type(&self) -> i32 {
        self.verb.code()
    }

    /// Target widget, absent for navigation verbs.
    #[must_use]
    pub const fn target(&self) -> Option<&Arc<Widget>> {
        self.target.as_ref()
    }

    /// Activity the action belongs to.
    #[must_use]
    pub fn activity(&self) -> &str {
        &self.activity
    }

    /// True for verbs eligible for exploration modeling.
    #[must_use]
    pub const fn is_model_act(&self) -> bool {
        self.verb.is_model_act()
    }

    /// Sampling priority.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Times the action has been executed this session.
    #[must_use]
    pub fn visited_count(&self) -> u32 {
        self.visited.load(Ordering::Relaxed)
    }

    /// Marks one execution.
    pub fn record_visit(&self) {
        self.visited.fetch_add(1, Ordering::Relaxed);
    }

    /// Current Q-value.
    #[must_use]
    pub fn q_value(&self) -> f64 {
        *self.q_value.lock()
    }

    /// Replaces the Q-value.
    pub fn set_q_value(&self, value: f64) {
        *self.q_value.lock() = value;
    }

    /// Matchable attributes of the target widget, under the action's
    /// activity. `None` for widget-less actions.
    #[must_use]
    pub fn descriptor(&self) -> Option<WidgetDescriptor> {
        let target = self.target.as_ref()?;
        Some(WidgetDescriptor {
            text: target.text().to_owned(),
            activity: self.activity.clone(),
            resource_id: target.resource_id().to_owned(),
            icon_base64: target.icon_base64().unwrap_or_default().to_owned(),
        })
    }

    /// Attributes persisted alongside the action's reuse entry.
    #[must_use]
    pub fn attributes(&self) -> ActionAttributes {
        ActionAttributes {
            action_type: self.action_type(),
            activity: self.activity.clone(),
            target: self.descriptor().unwrap_or_default(),
        }
    }
}

/// One observed screen: an activity, its widgets, and the actions the
/// host derived from them.
#[derive(Debug)]
pub struct State {
    activity: String,
    widgets: Vec<Arc<Widget>>,
    actions: Vec<Arc<Action>>,
    visited: AtomicU32,
}

impl State {
    /// Creates a state snapshot.
    #[must_use]
    pub fn new(
        activity: impl Into<String>,
        widgets: Vec<Arc<Widget>>,
        actions: Vec<Arc<Action>>,
    ) -> Self {
        Self {
            activity: activity.into(),
            widgets,
            actions,
            visited: AtomicU32::new(0),
        }
    }

    /// Activity name of the screen.
    #[must_use]
    pub fn activity_name(&self) -> &str {
        &self.activity
    }

    /// Widgets of the screen.
    #[must_use]
    pub fn widgets(&self) -> &[Arc<Widget>] {
        &self.widgets
    }

    /// All actions, including navigation-only ones.
    #[must_use]
    pub fn actions(&self) -> &[Arc<Action>] {
        &self.actions
    }

    /// Actions with exploration verbs (navigation-only verbs excluded).
    #[must_use]
    pub fn target_actions(&self) -> Vec<Arc<Action>> {
        self.actions
            .iter()
            .filter(|action| action.is_model_act())
            .cloned()
            .collect()
    }

    /// Times this state has been reached.
    #[must_use]
    pub fn visited_count(&self) -> u32 {
        self.visited.load(Ordering::Relaxed)
    }

    /// Marks one arrival at this state.
    pub fn record_visit(&self) {
        self.visited.fetch_add(1, Ordering::Relaxed);
    }

    /// Uniform draw over the actions, optionally restricted to those
    /// with a positive priority.
    #[must_use]
    pub fn random_pick_action(&self, rng: &mut SmallRng, priority_filter: bool) -> Option<Arc<Action>> {
        let candidates: Vec<&Arc<Action>> = self
            .actions
            .iter()
            .filter(|action| !priority_filter || action.priority() > 0)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..candidates.len());
        Some(Arc::clone(candidates[index]))
    }

    /// Uniform draw over the actions not yet executed this session.
    #[must_use]
    pub fn random_pick_unvisited_action(&self, rng: &mut SmallRng) -> Option<Arc<Action>> {
        let candidates: Vec<&Arc<Action>> = self
            .actions
            .iter()
            .filter(|action| action.visited_count() == 0)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..candidates.len());
        Some(Arc::clone(candidates[index]))
    }

    /// Action with the highest Q-value, optionally restricted to those
    /// with a positive priority.
    #[must_use]
    pub fn greedy_pick_max_q_value(&self, priority_filter: bool) -> Option<Arc<Action>> {
        self.actions
            .iter()
            .filter(|action| !priority_filter || action.priority() > 0)
            .max_by(|a, b| {
                a.q_value()
                    .partial_cmp(&b.q_value())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned()
    }

    /// The screen's BACK action, if the host provided one.
    #[must_use]
    pub fn back_action(&self) -> Option<Arc<Action>> {
        self.actions
            .iter()
            .find(|action| action.verb() == ActionVerb::Back)
            .cloned()
    }

    /// The widgets as `(fingerprint, descriptor)` pairs.
    #[must_use]
    pub fn widget_descriptors(&self) -> Vec<(u64, WidgetDescriptor)> {
        self.widgets
            .iter()
            .map(|widget| (widget.hash(), widget.descriptor()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn click(widget: &Arc<Widget>) -> Arc<Action> {
        Arc::new(Action::on_widget(
            ActionVerb::Click,
            Arc::clone(widget),
            widget.activity().to_owned(),
        ))
    }

    #[test]
    fn fingerprints_are_stable_and_distinct() {
        let widget = Arc::new(Widget::new("Play", "com.app.MainActivity", "id/play"));
        let again = Arc::new(Widget::new("Play", "com.app.MainActivity", "id/play"));
        assert_eq!(widget.hash(), again.hash());

        let clicked = click(&widget);
        let long = Arc::new(Action::on_widget(
            ActionVerb::LongClick,
            Arc::clone(&widget),
            "com.app.MainActivity",
        ));
        assert_ne!(clicked.hash(), long.hash());
    }

    #[test]
    fn model_act_excludes_navigation_verbs() {
        assert!(ActionVerb::Click.is_model_act());
        assert!(ActionVerb::ScrollBottomUpN.is_model_act());
        assert!(!ActionVerb::Back.is_model_act());
        assert!(!ActionVerb::Feed.is_model_act());
    }

    #[test]
    fn target_actions_filter_navigation() {
        let widget = Arc::new(Widget::new("Play", "com.app.A", "id/play"));
        let state = State::new(
            "com.app.A",
            vec![Arc::clone(&widget)],
            vec![Arc::new(Action::new(ActionVerb::Back, "com.app.A")), click(&widget)],
        );
        let targets = state.target_actions();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].verb(), ActionVerb::Click);
    }

    #[test]
    fn unvisited_pick_ignores_visited_actions() {
        let widget = Arc::new(Widget::new("Play", "com.app.A", "id/play"));
        let a = click(&widget);
        let b = Arc::new(Action::new(ActionVerb::Back, "com.app.A"));
        a.record_visit();
        let state = State::new("com.app.A", vec![widget], vec![a, Arc::clone(&b)]);
        let mut rng = SmallRng::seed_from_u64(7);
        let picked = state.random_pick_unvisited_action(&mut rng).unwrap();
        assert_eq!(picked.hash(), b.hash());
    }

    #[test]
    fn greedy_pick_prefers_the_highest_q() {
        let widget = Arc::new(Widget::new("Play", "com.app.A", "id/play"));
        let a = click(&widget);
        let b = Arc::new(Action::new(ActionVerb::Back, "com.app.A"));
        b.set_q_value(2.5);
        let state = State::new("com.app.A", vec![widget], vec![a, Arc::clone(&b)]);
        let picked = state.greedy_pick_max_q_value(true).unwrap();
        assert_eq!(picked.hash(), b.hash());
    }

    #[test]
    fn descriptor_uses_the_action_activity() {
        let widget = Arc::new(Widget::new("Play", "com.app.WidgetHome", "id/play"));
        let action = Arc::new(Action::on_widget(
            ActionVerb::Click,
            widget,
            "com.app.MainActivity",
        ));
        let descriptor = action.descriptor().unwrap();
        assert_eq!(descriptor.activity, "com.app.MainActivity");
        assert_eq!(descriptor.text, "Play");
    }

    #[test]
    fn q_value_and_visits_mutate_through_shared_refs() {
        let action = Arc::new(Action::new(ActionVerb::Back, "com.app.A"));
        let clone = Arc::clone(&action);
        clone.set_q_value(1.25);
        clone.record_visit();
        assert!((action.q_value() - 1.25).abs() < 1e-12);
        assert_eq!(action.visited_count(), 1);
    }
}
