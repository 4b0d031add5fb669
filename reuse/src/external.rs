use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use similarity::{SimilarityEngine, WidgetDescriptor, DEFAULT_MATCH_THRESHOLD};

use crate::{
    codec::{self, CodecError},
    platform_model_path,
    store::{from_schema, ActionAttributes},
    PLATFORM_TAGS,
};

/// A successful cross-platform action match.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionMatch {
    /// Platform tag of the matched model.
    pub platform: String,
    /// Fingerprint of the matched external action.
    pub external_action_hash: u64,
    /// Composite similarity that produced the match.
    pub similarity: f64,
    /// Widget counts recorded for the matched action.
    pub widget_counts: IndexMap<u64, i32>,
}

/// A sibling-platform reuse model, read-only for the session.
#[derive(Debug, Clone)]
pub struct ExternalPlatformModel {
    platform: String,
    path: PathBuf,
    entries: IndexMap<u64, IndexMap<u64, i32>>,
    action_attrs: Vec<(u64, ActionAttributes)>,
    widget_attrs: IndexMap<u64, WidgetDescriptor>,
}

impl ExternalPlatformModel {
    /// Loads one platform model file.
    ///
    /// Action-attribute rows absent from the file are synthesized from
    /// `hints` (attributes of same-fingerprint actions in the currently
    /// active state); the synthesis is never written back to the file.
    pub fn load(
        path: impl AsRef<Path>,
        platform: &str,
        hints: &IndexMap<u64, ActionAttributes>,
    ) -> Result<Self, CodecError> {
        let model = codec::read_model(path.as_ref())?;
        let (entries, attributes) = from_schema(model);

        let mut counts = IndexMap::new();
        let mut widget_attrs = IndexMap::new();
        for (action_hash, entry) in &entries {
            let mut widget_counts = IndexMap::new();
            for (widget_hash, observation) in &entry.widgets {
                widget_counts.insert(*widget_hash, observation.count);
                if !observation.attrs.is_blank() {
                    widget_attrs.insert(*widget_hash, observation.attrs.clone());
                }
            }
            counts.insert(*action_hash, widget_counts);
        }

        let mut action_attrs: Vec<(u64, ActionAttributes)> = attributes.into_iter().collect();
        let known: HashSet<u64> = action_attrs.iter().map(|(hash, _)| *hash).collect();
        let mut synthesized = 0_usize;
        for action_hash in counts.keys() {
            if known.contains(action_hash) {
                continue;
            }
            if let Some(seed) = hints.get(action_hash) {
                action_attrs.push((*action_hash, seed.clone()));
                synthesized += 1;
            }
        }
        tracing::info!(
            platform,
            path = %path.as_ref().display(),
            actions = counts.len(),
            attrs = action_attrs.len(),
            synthesized,
            "external platform model loaded"
        );
        Ok(Self {
            platform: platform.to_owned(),
            path: path.as_ref().to_path_buf(),
            entries: counts,
            action_attrs,
            widget_attrs,
        })
    }

    /// Platform tag of this model.
    #[must_use]
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// File the model was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of recorded actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the model holds no actions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Widget counts of one action.
    #[must_use]
    pub fn widget_counts(&self, action_hash: u64) -> Option<&IndexMap<u64, i32>> {
        self.entries.get(&action_hash)
    }

    /// Attributes of one widget, when the model recorded them.
    #[must_use]
    pub fn widget_attributes(&self, widget_hash: u64) -> Option<&WidgetDescriptor> {
        self.widget_attrs.get(&widget_hash)
    }
}

/// Holds the loaded sibling-platform models together with the match
/// cache and the proven-similar widget index.
///
/// The model set is replaced wholesale by the loader and read without a
/// lock afterwards; cache and index take their own short-lived mutexes.
/// No mutex is ever held across a similarity computation.
#[derive(Debug)]
pub struct ExternalModelRegistry {
    platforms: RwLock<Arc<Vec<ExternalPlatformModel>>>,
    match_cache: Mutex<HashMap<u64, ActionMatch>>,
    widget_index: Mutex<HashMap<String, HashMap<u64, HashSet<u64>>>>,
    threshold: f64,
}

impl Default for ExternalModelRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl ExternalModelRegistry {
    /// Creates a registry with the given match threshold.
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            platforms: RwLock::new(Arc::new(Vec::new())),
            match_cache: Mutex::new(HashMap::new()),
            widget_index: Mutex::new(HashMap::new()),
            threshold,
        }
    }

    /// The configured match threshold.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Scans `base_dir` for sibling models of `package` and loads every
    /// platform other than `current_platform`. Pre-existing models, the
    /// match cache, and the widget index are dropped first. Returns the
    /// number of models loaded; unreadable files are logged and skipped.
    pub fn auto_load(
        &self,
        base_dir: impl AsRef<Path>,
        package: &str,
        current_platform: &str,
        hints: &IndexMap<u64, ActionAttributes>,
    ) -> usize {
        let mut loaded = Vec::new();
        for platform in PLATFORM_TAGS {
            if platform == current_platform {
                continue;
            }
            let path = platform_model_path(base_dir.as_ref(), package, platform);
            if !path.exists() {
                continue;
            }
            match ExternalPlatformModel::load(&path, platform, hints) {
                Ok(model) => loaded.push(model),
                Err(err) => {
                    tracing::warn!(platform, error = %err, "skipping unreadable platform model");
                }
            }
        }
        let count = loaded.len();
        *self.platforms.write() = Arc::new(loaded);
        self.match_cache.lock().clear();
        self.widget_index.lock().clear();
        tracing::info!(package, count, "external platform scan complete");
        count
    }

    /// Number of loaded platform models.
    #[must_use]
    pub fn platform_count(&self) -> usize {
        self.platforms.read().len()
    }

    /// True when no platform model is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.platforms.read().is_empty()
    }

    /// Snapshot of the loaded models.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<ExternalPlatformModel>> {
        Arc::clone(&self.platforms.read())
    }

    /// Cached successful match for a local action, if any.
    #[must_use]
    pub fn cached_match(&self, local_action_hash: u64) -> Option<ActionMatch> {
        let cache = self.match_cache.lock();
        cache
            .get(&local_action_hash)
            .filter(|hit| hit.similarity >= self.threshold)
            .cloned()
    }

    /// Finds an external action similar to the local one.
    ///
    /// The cache is consulted first. Otherwise every loaded platform's
    /// action attributes are scanned in order and the first similarity
    /// at or above the threshold wins; there is no argmax pass. Only
    /// successful matches are cached.
    #[must_use]
    pub fn find_similar_action(
        &self,
        engine: &SimilarityEngine,
        local_action_hash: u64,
        local: &WidgetDescriptor,
    ) -> Option<ActionMatch> {
        if let Some(hit) = self.cached_match(local_action_hash) {
            tracing::debug!(local_action_hash, platform = %hit.platform, "match cache hit");
            return Some(hit);
        }
        if local.is_blank() {
            return None;
        }
        let platforms = self.snapshot();
        for model in platforms.iter() {
            for (external_hash, attrs) in &model.action_attrs {
                if attrs.target.is_blank() && attrs.activity.is_empty() {
                    continue;
                }
                let candidate = descriptor_of(attrs);
                let similarity = engine.widget_similarity(local, &candidate);
                if similarity < self.threshold {
                    continue;
                }
                let widget_counts = model
                    .widget_counts(*external_hash)
                    .cloned()
                    .unwrap_or_default();
                let matched = ActionMatch {
                    platform: model.platform.clone(),
                    external_action_hash: *external_hash,
                    similarity,
                    widget_counts,
                };
                self.match_cache
                    .lock()
                    .insert(local_action_hash, matched.clone());
                tracing::debug!(
                    local_action_hash,
                    external_hash,
                    platform = %matched.platform,
                    similarity,
                    "external action matched"
                );
                return Some(matched);
            }
        }
        None
    }

    /// Whether an external widget counts as visited this session.
    ///
    /// True on an exact fingerprint hit, an index hit against a visited
    /// local widget, or a fresh similarity match against any visited
    /// widget of the current state (which is then recorded in the index).
    #[must_use]
    pub fn is_widget_already_visited(
        &self,
        engine: &SimilarityEngine,
        platform: &str,
        external_widget_hash: u64,
        visited: &HashSet<u64>,
        current_widgets: &[(u64, WidgetDescriptor)],
    ) -> bool {
        if visited.contains(&external_widget_hash) {
            return true;
        }
        {
            let index = self.widget_index.lock();
            if let Some(similar) = index
                .get(platform)
                .and_then(|widgets| widgets.get(&external_widget_hash))
            {
                if similar.iter().any(|hash| visited.contains(hash)) {
                    return true;
                }
            }
        }
        let platforms = self.snapshot();
        let Some(attrs) = platforms
            .iter()
            .find(|model| model.platform == platform)
            .and_then(|model| model.widget_attributes(external_widget_hash))
        else {
            return false;
        };
        for (local_hash, descriptor) in current_widgets {
            if !visited.contains(local_hash) {
                continue;
            }
            let similarity = engine.widget_similarity(descriptor, attrs);
            if similarity >= self.threshold {
                self.widget_index
                    .lock()
                    .entry(platform.to_owned())
                    .or_default()
                    .entry(external_widget_hash)
                    .or_default()
                    .insert(*local_hash);
                tracing::debug!(
                    platform,
                    external_widget_hash,
                    local_hash,
                    similarity,
                    "external widget proven visited"
                );
                return true;
            }
        }
        false
    }

    /// Ratio of unvisited to total widget count in a matched external
    /// entry, judging visitedness per [`Self::is_widget_already_visited`].
    #[must_use]
    pub fn unvisited_ratio(
        &self,
        engine: &SimilarityEngine,
        matched: &ActionMatch,
        visited: &HashSet<u64>,
        current_widgets: &[(u64, WidgetDescriptor)],
    ) -> f64 {
        let mut total = 0_i64;
        let mut unvisited = 0_i64;
        for (widget_hash, count) in &matched.widget_counts {
            total += i64::from(*count);
            let seen = self.is_widget_already_visited(
                engine,
                &matched.platform,
                *widget_hash,
                visited,
                current_widgets,
            );
            if !seen {
                unvisited += i64::from(*count);
            }
        }
        if total == 0 {
            return 0.0;
        }
        unvisited as f64 / total as f64
    }

    /// Drops every loaded model plus the cache and index.
    pub fn clear(&self) {
        *self.platforms.write() = Arc::new(Vec::new());
        self.match_cache.lock().clear();
        self.widget_index.lock().clear();
    }
}

fn descriptor_of(attrs: &ActionAttributes) -> WidgetDescriptor {
    WidgetDescriptor {
        text: attrs.target.text.clone(),
        activity: attrs.activity.clone(),
        resource_id: attrs.target.resource_id.clone(),
        icon_base64: attrs.target.icon_base64.clone(),
    }
}
