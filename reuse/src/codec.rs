use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Magic bytes opening every serialized reuse model.
pub const MODEL_MAGIC: [u8; 4] = *b"FBRM";

/// Format tag of the legacy activity-keyed schema.
pub const FORMAT_ACTIVITY_KEYED: u16 = 1;
/// Format tag of the widget-keyed schema with similarity attributes.
pub const FORMAT_WIDGET_KEYED: u16 = 2;

/// Failures reading or writing a model file.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Filesystem failure.
    #[error("model file i/o: {0}")]
    Io(#[from] io::Error),
    /// The file is shorter than the magic/version header.
    #[error("model file truncated")]
    Truncated,
    /// The file does not open with the expected magic bytes.
    #[error("not a reuse model file")]
    BadMagic,
    /// The format tag is newer than this reader understands.
    #[error("unsupported model format version {0}")]
    UnsupportedVersion(u16),
    /// The payload failed to decode.
    #[error("model payload decode: {0}")]
    Payload(#[from] bincode::Error),
}

/// Root of the serialized model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetReuseModel {
    /// One record per action fingerprint.
    pub entries: Vec<ReuseEntryRecord>,
    /// Platform tag the model was captured on.
    pub platform: Option<String>,
    /// True when entries carry similarity attributes.
    pub has_similarity_attrs: bool,
}

/// Serialized landing distribution of one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReuseEntryRecord {
    /// Fingerprint of the recorded action.
    pub action_hash: u64,
    /// Widget buckets; the current writer emits a single unnamed bucket,
    /// older writers grouped widgets per activity.
    pub activities: Vec<ActivityWidgetMap>,
    /// Attributes of the action for cross-platform matching.
    pub similarity_attrs: Option<ActionSimilarityAttributes>,
}

/// A bucket of widget counts, optionally tagged with an activity name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityWidgetMap {
    /// Activity tag; empty in the current schema.
    pub activity: String,
    /// Widgets observed after the action, with counts.
    pub widgets: Vec<WidgetCount>,
}

/// Count of one widget landed on after an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetCount {
    /// Fingerprint of the landed widget.
    pub widget_hash: u64,
    /// Times the widget was observed after the action.
    pub count: i32,
    /// Attributes of the widget for cross-platform matching.
    pub similarity_attrs: Option<WidgetSimilarityAttributes>,
}

/// Attributes of an action's target widget plus its verb code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSimilarityAttributes {
    /// Numeric verb code.
    pub action_type: i32,
    /// Activity the action was observed on.
    pub activity_name: String,
    /// Attributes of the target widget.
    pub target_widget: WidgetSimilarityAttributes,
}

/// The four matchable attributes of a widget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetSimilarityAttributes {
    /// Displayed text.
    pub text: String,
    /// Activity the widget was observed on.
    pub activity_name: String,
    /// Android resource id.
    pub resource_id: String,
    /// Base64-encoded icon, empty when absent.
    pub icon_base64: String,
}

/// Legacy activity-keyed model root (format version 1).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityReuseModel {
    /// One record per action fingerprint.
    pub entries: Vec<ActivityReuseEntry>,
}

/// Legacy record: activities reached by one action, with counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityReuseEntry {
    /// Fingerprint of the recorded action.
    pub action_hash: u64,
    /// Activities reached, with visit counts.
    pub targets: Vec<ActivityTimes>,
}

/// Visit count of one activity in the legacy schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityTimes {
    /// Activity name.
    pub activity: String,
    /// Times the activity was reached.
    pub times: i32,
}

/// FNV-1a over a byte string; used for fingerprints that must be stable
/// across processes and runs.
#[must_use]
pub fn stable_hash64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Serializes a model under the current format version.
pub fn encode_model(model: &WidgetReuseModel) -> Result<Vec<u8>, CodecError> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&MODEL_MAGIC);
    bytes.extend_from_slice(&FORMAT_WIDGET_KEYED.to_le_bytes());
    bincode::serialize_into(&mut bytes, model)?;
    Ok(bytes)
}

/// Parses either format version into the widget-keyed representation.
///
/// Legacy activity-keyed entries are mapped to one pseudo-widget per
/// activity, keyed by the stable hash of the activity name, so their
/// counts stay usable for probability queries.
pub fn decode_model(bytes: &[u8]) -> Result<WidgetReuseModel, CodecError> {
    if bytes.len() < MODEL_MAGIC.len() + 2 {
        return Err(CodecError::Truncated);
    }
    let (header, payload) = bytes.split_at(MODEL_MAGIC.len() + 2);
    if header[..MODEL_MAGIC.len()] != MODEL_MAGIC {
        return Err(CodecError::BadMagic);
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    match version {
        FORMAT_WIDGET_KEYED => Ok(bincode::deserialize(payload)?),
        FORMAT_ACTIVITY_KEYED => {
            let legacy: ActivityReuseModel = bincode::deserialize(payload)?;
            Ok(upgrade_legacy(legacy))
        }
        other => Err(CodecError::UnsupportedVersion(other)),
    }
}

fn upgrade_legacy(legacy: ActivityReuseModel) -> WidgetReuseModel {
    let entries = legacy
        .entries
        .into_iter()
        .map(|entry| ReuseEntryRecord {
            action_hash: entry.action_hash,
            activities: vec![ActivityWidgetMap {
                activity: String::new(),
                widgets: entry
                    .targets
                    .into_iter()
                    .map(|target| WidgetCount {
                        widget_hash: stable_hash64(target.activity.as_bytes()),
                        count: target.times,
                        similarity_attrs: Some(WidgetSimilarityAttributes {
                            activity_name: target.activity,
                            ..WidgetSimilarityAttributes::default()
                        }),
                    })
                    .collect(),
            }],
            similarity_attrs: None,
        })
        .collect();
    WidgetReuseModel {
        entries,
        platform: None,
        has_similarity_attrs: false,
    }
}

/// Reads and decodes a model file.
pub fn read_model(path: impl AsRef<Path>) -> Result<WidgetReuseModel, CodecError> {
    let bytes = fs::read(path.as_ref())?;
    decode_model(&bytes)
}

/// Encodes and writes a model file.
pub fn write_model(path: impl AsRef<Path>, model: &WidgetReuseModel) -> Result<(), CodecError> {
    let bytes = encode_model(model)?;
    fs::write(path.as_ref(), bytes)?;
    Ok(())
}
