use std::{collections::HashSet, path::Path};

use indexmap::IndexMap;
use parking_lot::Mutex;
use similarity::WidgetDescriptor;

use crate::codec::{
    self, ActionSimilarityAttributes, ActivityWidgetMap, CodecError, ReuseEntryRecord,
    WidgetCount, WidgetReuseModel, WidgetSimilarityAttributes,
};

/// Captured attributes of a recorded action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionAttributes {
    /// Numeric verb code.
    pub action_type: i32,
    /// Activity the action was observed on.
    pub activity: String,
    /// Attributes of the target widget.
    pub target: WidgetDescriptor,
}

/// One widget's accumulated landing count and latest attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidgetObservation {
    /// Times the widget was observed after the owning action.
    pub count: i32,
    /// Most recently observed attributes.
    pub attrs: WidgetDescriptor,
}

/// The landing distribution recorded for one action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReuseEntry {
    /// Widget fingerprint to observation.
    pub widgets: IndexMap<u64, WidgetObservation>,
}

impl ReuseEntry {
    /// Sum of all widget counts.
    #[must_use]
    pub fn total_count(&self) -> i64 {
        self.widgets.values().map(|obs| i64::from(obs.count)).sum()
    }

    /// Sum of counts of widgets absent from the visited set.
    #[must_use]
    pub fn unvisited_count(&self, visited: &HashSet<u64>) -> i64 {
        self.widgets
            .iter()
            .filter(|(hash, _)| !visited.contains(*hash))
            .map(|(_, obs)| i64::from(obs.count))
            .sum()
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    entries: IndexMap<u64, ReuseEntry>,
    attributes: IndexMap<u64, ActionAttributes>,
}

/// The mutable action-to-widget reuse model of the running session.
///
/// A single mutex guards the maps; every operation snapshots or mutates
/// under the lock and releases it before any I/O or embedding work.
#[derive(Debug, Default)]
pub struct ReuseStore {
    inner: Mutex<StoreInner>,
}

impl ReuseStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one observation: the widgets of the state reached after
    /// executing the action. Counts increment by one per widget and the
    /// action/widget attributes are refreshed to the latest observation.
    pub fn record(
        &self,
        action_hash: u64,
        attrs: ActionAttributes,
        widgets: &[(u64, WidgetDescriptor)],
    ) {
        let mut inner = self.inner.lock();
        let entry = inner.entries.entry(action_hash).or_default();
        for (widget_hash, descriptor) in widgets {
            let observation = entry.widgets.entry(*widget_hash).or_default();
            observation.count += 1;
            observation.attrs = descriptor.clone();
            tracing::trace!(action_hash, widget_hash, count = observation.count, "reuse count");
        }
        inner.attributes.insert(action_hash, attrs);
    }

    /// True if the action has a recorded entry.
    #[must_use]
    pub fn contains(&self, action_hash: u64) -> bool {
        self.inner.lock().entries.contains_key(&action_hash)
    }

    /// Snapshot of one action's entry.
    #[must_use]
    pub fn entry(&self, action_hash: u64) -> Option<ReuseEntry> {
        self.inner.lock().entries.get(&action_hash).cloned()
    }

    /// Snapshot of one action's recorded attributes.
    #[must_use]
    pub fn attributes(&self, action_hash: u64) -> Option<ActionAttributes> {
        self.inner.lock().attributes.get(&action_hash).cloned()
    }

    /// Ratio of unvisited to total widget count for an action, or `None`
    /// when the action has no entry.
    ///
    /// This is the empirical probability that executing the action again
    /// lands on a widget not yet seen this session.
    #[must_use]
    pub fn probability_of_visiting_new_widgets(
        &self,
        action_hash: u64,
        visited: &HashSet<u64>,
    ) -> Option<f64> {
        let inner = self.inner.lock();
        let entry = inner.entries.get(&action_hash)?;
        let total = entry.total_count();
        let unvisited = entry.unvisited_count(visited);
        if total > 0 && unvisited > 0 {
            Some(unvisited as f64 / total as f64)
        } else {
            Some(0.0)
        }
    }

    /// Number of recorded actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// True when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Sum of every widget count across all entries.
    #[must_use]
    pub fn total_observations(&self) -> i64 {
        self.inner
            .lock()
            .entries
            .values()
            .map(ReuseEntry::total_count)
            .sum()
    }

    /// Drops all entries and attributes.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.attributes.clear();
    }

    /// Serializes the store to a model file.
    ///
    /// An empty store is not written; the previous file, if any, stays
    /// in place. The maps are snapshotted under the mutex and encoding
    /// plus I/O run after the lock is released.
    pub fn save(&self, path: impl AsRef<Path>, platform: &str) -> Result<bool, CodecError> {
        let model = {
            let inner = self.inner.lock();
            if inner.entries.is_empty() {
                tracing::debug!("reuse store empty, skipping save");
                return Ok(false);
            }
            to_schema(&inner, platform)
        };
        codec::write_model(path.as_ref(), &model)?;
        tracing::info!(
            path = %path.as_ref().display(),
            actions = model.entries.len(),
            "reuse model saved"
        );
        Ok(true)
    }

    /// Replaces the store contents from a model file.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<(), CodecError> {
        let model = codec::read_model(path.as_ref())?;
        let (entries, attributes) = from_schema(model);
        let mut inner = self.inner.lock();
        inner.entries = entries;
        inner.attributes = attributes;
        tracing::info!(
            path = %path.as_ref().display(),
            actions = inner.entries.len(),
            "reuse model loaded"
        );
        Ok(())
    }
}

fn to_schema(inner: &StoreInner, platform: &str) -> WidgetReuseModel {
    let entries = inner
        .entries
        .iter()
        .map(|(action_hash, entry)| ReuseEntryRecord {
            action_hash: *action_hash,
            activities: vec![ActivityWidgetMap {
                activity: String::new(),
                widgets: entry
                    .widgets
                    .iter()
                    .map(|(widget_hash, observation)| WidgetCount {
                        widget_hash: *widget_hash,
                        count: observation.count,
                        similarity_attrs: Some(to_widget_attrs(&observation.attrs)),
                    })
                    .collect(),
            }],
            similarity_attrs: inner.attributes.get(action_hash).map(|attrs| {
                ActionSimilarityAttributes {
                    action_type: attrs.action_type,
                    activity_name: attrs.activity.clone(),
                    target_widget: to_widget_attrs(&attrs.target),
                }
            }),
        })
        .collect();
    WidgetReuseModel {
        entries,
        platform: Some(platform.to_owned()),
        has_similarity_attrs: true,
    }
}

/// Collapses a schema model into the in-memory maps, merging activity
/// buckets. A widget present in several buckets keeps its maximum count.
pub(crate) fn from_schema(
    model: WidgetReuseModel,
) -> (IndexMap<u64, ReuseEntry>, IndexMap<u64, ActionAttributes>) {
    let mut entries = IndexMap::new();
    let mut attributes = IndexMap::new();
    for record in model.entries {
        let mut entry = ReuseEntry::default();
        for bucket in record.activities {
            for widget in bucket.widgets {
                let observation = entry.widgets.entry(widget.widget_hash).or_default();
                observation.count = observation.count.max(widget.count);
                if let Some(attrs) = widget.similarity_attrs {
                    observation.attrs = from_widget_attrs(attrs);
                }
            }
        }
        if entry.widgets.is_empty() {
            continue;
        }
        if let Some(attrs) = record.similarity_attrs {
            attributes.insert(
                record.action_hash,
                ActionAttributes {
                    action_type: attrs.action_type,
                    activity: attrs.activity_name,
                    target: from_widget_attrs(attrs.target_widget),
                },
            );
        }
        entries.insert(record.action_hash, entry);
    }
    (entries, attributes)
}

pub(crate) fn to_widget_attrs(descriptor: &WidgetDescriptor) -> WidgetSimilarityAttributes {
    WidgetSimilarityAttributes {
        text: descriptor.text.clone(),
        activity_name: descriptor.activity.clone(),
        resource_id: descriptor.resource_id.clone(),
        icon_base64: descriptor.icon_base64.clone(),
    }
}

pub(crate) fn from_widget_attrs(attrs: WidgetSimilarityAttributes) -> WidgetDescriptor {
    WidgetDescriptor {
        text: attrs.text,
        activity: attrs.activity_name,
        resource_id: attrs.resource_id,
        icon_base64: attrs.icon_base64,
    }
}
