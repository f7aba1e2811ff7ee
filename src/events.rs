//! Event and tag extraction
//!
//! Two responsibilities: trigger-onset detection from a thresholded
//! logical channel, and tag-based windowed extraction.
//!
//! Protocol extraction builds (or extends) a tree
//! `protocols_data -> {label ->} {category -> frame_<idx>}` under the
//! selected parent; re-runs append into the existing groups. Tag
//! extraction rebuilds a `TagData` group per frame destructively. The two
//! re-run policies are deliberately different and must not be unified.

use chrono::Utc;
use tracing::{info, warn};

use crate::series::{
    AttrValue, Series, ATTR_CREATED_AT, ATTR_MRL, ATTR_SUBCLIP, ATTR_TRIGGER_TIME, ATTR_TSTART,
    ATTR_TSTOP,
};
use crate::store::{Node, NodeId, Store};
use crate::{Error, Result};

/// Fixed group name created by protocol extraction
pub const PROTOCOLS_GROUP: &str = "protocols_data";
/// Fixed group name rebuilt by tag extraction
pub const TAG_DATA_GROUP: &str = "TagData";
/// Subgroup holding absolute tag times
pub const TAG_TIMES_ABSOLUTE: &str = "TagTimes_absolute";
/// Subgroup holding tag times relative to the frame's trigger
pub const TAG_TIMES_FROM_TRIGGER: &str = "TagTimes_fromTrigger";

/// The tag alphabet: single-letter codes `A` through `T`
pub const TAG_ALPHABET: [char; 20] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S',
    'T',
];

/// Trigger category, encoded by magnitude in the trigger channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerCategory {
    /// Channel value 1: protocol step without a stimulus trigger
    NonTrigger,
    /// Channel value 2: manually issued trigger
    Manual,
    /// Channel value 3: protocol-issued stimulus trigger
    Trigger,
    /// Channel value 4: homing step
    Homing,
    /// Channel value 5: control step
    Control,
}

impl TriggerCategory {
    /// All categories, in group-creation order
    pub const ALL: [Self; 5] = [
        Self::Trigger,
        Self::NonTrigger,
        Self::Manual,
        Self::Control,
        Self::Homing,
    ];

    /// Decode a channel value. Unrecognized codes are a metadata error,
    /// not a silent extra case.
    ///
    /// # Errors
    /// Returns [`Error::UnknownTriggerCode`] for any code outside 1..=5.
    pub fn from_code(code: i64, step: usize) -> Result<Self> {
        match code {
            1 => Ok(Self::NonTrigger),
            2 => Ok(Self::Manual),
            3 => Ok(Self::Trigger),
            4 => Ok(Self::Homing),
            5 => Ok(Self::Control),
            _ => Err(Error::UnknownTriggerCode { code, step }),
        }
    }

    /// The channel value encoding this category
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::NonTrigger => 1,
            Self::Manual => 2,
            Self::Trigger => 3,
            Self::Homing => 4,
            Self::Control => 5,
        }
    }

    /// Tree group name for this category
    #[must_use]
    pub fn group_name(self) -> &'static str {
        match self {
            Self::NonTrigger => "non_triggers",
            Self::Manual => "manual",
            Self::Trigger => "triggers",
            Self::Homing => "homing",
            Self::Control => "control",
        }
    }
}

/// Detect trigger onsets: threshold the channel at 0.5 into a boolean
/// active mask (guards against near-zero noise), then return the indices
/// where the mask transitions low to high (first difference equals 1).
/// An initial high sample is not an onset.
#[must_use]
pub fn detect_trigger_onsets(triggers: &[f64]) -> Vec<usize> {
    let mut onsets = Vec::new();
    let mut prev_active = triggers.first().is_some_and(|&v| v > 0.5);
    for (i, &v) in triggers.iter().enumerate().skip(1) {
        let active = v > 0.5;
        if active && !prev_active {
            onsets.push(i);
        }
        prev_active = active;
    }
    onsets
}

/// Per-source extraction window around a trigger time
#[derive(Debug, Clone, Copy)]
pub struct EventWindow {
    /// Time before the trigger, ms
    pub baseline_ms: f64,
    /// Time after the trigger, ms
    pub duration_ms: f64,
}

/// Options for protocol extraction
#[derive(Debug, Clone, Default)]
pub struct ProtocolOptions {
    /// Extract per-onset windows from these sources (absolute slash paths
    /// resolved against the store roots). Requires `window`.
    pub sources: Vec<String>,
    /// Window to extract around each trigger time
    pub window: Option<EventWindow>,
}

/// A per-item recoverable failure in a batch operation
#[derive(Debug)]
pub struct ItemFailure {
    /// Path of the item that failed
    pub item: String,
    /// Human-readable reason
    pub reason: String,
}

/// Summary of a protocol-extraction run
#[derive(Debug, Default)]
pub struct ProtocolReport {
    /// Trigger onsets detected in the channel
    pub onsets: Vec<usize>,
    /// Frame nodes created by this run
    pub frames_created: usize,
    /// Event children extracted under frame nodes
    pub events_extracted: usize,
    /// Recoverable per-item failures; the batch continued past them
    pub failures: Vec<ItemFailure>,
}

/// Reference to a video segment used instead of eagerly decoding frames
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualClip {
    /// Media resource locator (path) of the source video
    pub mrl: String,
    /// Window start, ms
    pub tstart_ms: f64,
    /// Window stop, ms
    pub tstop_ms: f64,
    /// Trigger time relative to the window start, ms
    pub trigger_offset_ms: f64,
}

impl VirtualClip {
    /// Write this descriptor into an event child's attribute bag
    pub fn write_attrs(&self, series: &mut Series) {
        let attrs = series.attrs_mut();
        attrs.set_video(true);
        attrs.set(ATTR_MRL, AttrValue::Text(self.mrl.clone()));
        attrs.set(ATTR_SUBCLIP, AttrValue::Flag(true));
        attrs.set(ATTR_TSTART, AttrValue::Scalar(self.tstart_ms));
        attrs.set(ATTR_TSTOP, AttrValue::Scalar(self.tstop_ms));
        attrs.set(ATTR_TRIGGER_TIME, AttrValue::Scalar(self.trigger_offset_ms));
    }

    /// Read a descriptor back from an event child, if it is one
    #[must_use]
    pub fn read_attrs(series: &Series) -> Option<Self> {
        let attrs = series.attrs();
        if !attrs.is_video() {
            return None;
        }
        Some(Self {
            mrl: attrs.get(ATTR_MRL)?.as_text()?.to_owned(),
            tstart_ms: attrs.get(ATTR_TSTART)?.as_scalar()?,
            tstop_ms: attrs.get(ATTR_TSTOP)?.as_scalar()?,
            trigger_offset_ms: attrs.get(ATTR_TRIGGER_TIME)?.as_scalar()?,
        })
    }
}

/// Parse a protocol label list from its quoted text form
/// (`"['vis_73pc', 'vis_00pc']"`-style blobs become `[vis_73pc, vis_00pc]`).
#[must_use]
pub fn parse_label_list(text: &str) -> Vec<String> {
    text.split('\'')
        .skip(1)
        .step_by(2)
        .map(str::to_owned)
        .collect()
}

/// Process stimulation protocols from a trigger channel.
///
/// The selected `parent` must hold an `Indices` child (the trigger channel
/// with its own `sample_period`) and may hold a `Names` child whose
/// `labels` attribute lists one protocol label per trigger. With labels
/// present, frames are grouped per label; without, all frames land in
/// category groups directly under `protocols_data` (a warning is logged,
/// mirroring the trigger-levels-only fallback).
///
/// First run creates `protocols_data` with all five category groups;
/// re-runs locate the existing groups and append (incremental policy).
///
/// # Errors
/// Returns [`Error::MissingMetadata`] if the parent has no `Indices`
/// child. Per-source failures are recorded in the report, not raised.
pub fn extract_protocols(
    store: &mut Store,
    parent: NodeId,
    opts: &ProtocolOptions,
) -> Result<ProtocolReport> {
    let (labels, channel) = read_protocol_inputs(store, parent)?;
    let mut report = ProtocolReport {
        onsets: detect_trigger_onsets(&channel.samples),
        ..ProtocolReport::default()
    };
    info!(
        count = report.onsets.len(),
        parent = %store.path_of(parent),
        "trigger onsets detected"
    );

    // Resolve extraction sources up front; a miss is recoverable.
    let mut sources = Vec::new();
    for path in &opts.sources {
        let segments: Vec<&str> = path.split('/').collect();
        match store.resolve(&segments) {
            Ok(id) => sources.push(id),
            Err(e) => {
                warn!(source = %path, "extraction source not found");
                report.failures.push(ItemFailure {
                    item: path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    let protocols_group = match store.find_child(parent, PROTOCOLS_GROUP) {
        Some(id) => id,
        None => {
            let id = store.add_child(parent, Node::group(PROTOCOLS_GROUP));
            let mut provenance = Series::empty(PROTOCOLS_GROUP);
            provenance
                .attrs_mut()
                .set(ATTR_CREATED_AT, AttrValue::Text(Utc::now().to_rfc3339()));
            store.set_series(id, provenance);
            id
        }
    };

    match labels {
        Some(labels) => {
            if labels.len() != report.onsets.len() {
                warn!(
                    labels = labels.len(),
                    onsets = report.onsets.len(),
                    "label count does not match onset count; extra entries ignored"
                );
            }
            let onsets = report.onsets.clone();
            for (label, &onset) in labels.iter().zip(&onsets) {
                let label_group = ensure_category_groups(store, protocols_group, Some(label.as_str()));
                place_frame(store, label_group, onset, &channel, &sources, opts, &mut report);
            }
        }
        None => {
            warn!("protocol details not found; using trigger levels only");
            ensure_category_groups(store, protocols_group, None);
            let onsets = report.onsets.clone();
            for &onset in &onsets {
                place_frame(
                    store,
                    protocols_group,
                    onset,
                    &channel,
                    &sources,
                    opts,
                    &mut report,
                );
            }
        }
    }
    Ok(report)
}

struct TriggerChannel {
    samples: Vec<f64>,
    dt: f64,
}

fn read_protocol_inputs(
    store: &Store,
    parent: NodeId,
) -> Result<(Option<Vec<String>>, TriggerChannel)> {
    let mut labels = None;
    let mut channel = None;
    for &child in store.node(parent).children() {
        let node = store.node(child);
        let name = node.display_name();
        if name.contains("Names") {
            labels = node
                .series()
                .and_then(|s| s.attrs().get("labels"))
                .and_then(AttrValue::as_text)
                .map(parse_label_list)
                .filter(|l| !l.is_empty());
        } else if name.contains("Indices") {
            channel = node.series().map(|s| TriggerChannel {
                samples: s.samples().to_vec(),
                dt: s.sample_period(),
            });
        }
    }
    let channel = channel.ok_or_else(|| Error::MissingMetadata {
        item: store.path_of(parent),
        attribute: "Indices".to_owned(),
    })?;
    Ok((labels, channel))
}

/// Make sure all five category groups exist under the (label) group,
/// creating the label group itself first when needed.
fn ensure_category_groups(store: &mut Store, parent: NodeId, label: Option<&str>) -> NodeId {
    let group = match label {
        Some(label) => store
            .find_child(parent, label)
            .unwrap_or_else(|| store.add_child(parent, Node::group(label))),
        None => parent,
    };
    for category in TriggerCategory::ALL {
        if store.find_child(group, category.group_name()).is_none() {
            store.add_child(group, Node::group(category.group_name()));
        }
    }
    group
}

fn place_frame(
    store: &mut Store,
    group: NodeId,
    onset: usize,
    channel: &TriggerChannel,
    sources: &[NodeId],
    opts: &ProtocolOptions,
    report: &mut ProtocolReport,
) {
    let code = channel.samples[onset] as i64;
    let category = match TriggerCategory::from_code(code, onset) {
        Ok(c) => c,
        Err(e) => {
            warn!(step = onset, code, "skipping frame with unknown trigger code");
            report.failures.push(ItemFailure {
                item: format!("{}/frame_{onset}", store.path_of(group)),
                reason: e.to_string(),
            });
            return;
        }
    };
    let category_group = store
        .find_child(group, category.group_name())
        .unwrap_or_else(|| store.add_child(group, Node::group(category.group_name())));

    let frame_name = format!("frame_{onset}");
    let frame = match store.find_child(category_group, &frame_name) {
        Some(id) => id,
        None => {
            report.frames_created += 1;
            store.add_child(category_group, Node::group(frame_name))
        }
    };

    if let Some(window) = opts.window {
        let trigger_time_ms = onset as f64 * channel.dt;
        for &source in sources {
            match extract_event(store, frame, source, trigger_time_ms, window) {
                Ok(()) => report.events_extracted += 1,
                Err(e) => report.failures.push(ItemFailure {
                    item: store.path_of(source),
                    reason: e.to_string(),
                }),
            }
        }
    }
}

/// Pull one per-onset window from `source` into a new child of `frame`.
/// Video sources get a [`VirtualClip`] descriptor instead of samples,
/// deferring decoding to the external video subsystem.
fn extract_event(
    store: &mut Store,
    frame: NodeId,
    source: NodeId,
    trigger_time_ms: f64,
    window: EventWindow,
) -> Result<()> {
    let start_ms = trigger_time_ms - window.baseline_ms;
    let stop_ms = trigger_time_ms + window.duration_ms;
    let trigger_offset_ms = trigger_time_ms - start_ms;

    let src = store
        .node(source)
        .series()
        .ok_or_else(|| Error::MissingMetadata {
            item: store.path_of(source),
            attribute: "series".to_owned(),
        })?;

    let child_series = if src.attrs().is_video() {
        let mrl = src
            .attrs()
            .get(ATTR_MRL)
            .and_then(AttrValue::as_text)
            .ok_or_else(|| Error::MissingMetadata {
                item: store.path_of(source),
                attribute: ATTR_MRL.to_owned(),
            })?
            .to_owned();
        let mut series = Series::empty(format!("clip_{}", src.name()));
        VirtualClip {
            mrl,
            tstart_ms: start_ms,
            tstop_ms: stop_ms,
            trigger_offset_ms,
        }
        .write_attrs(&mut series);
        series
    } else {
        let dt = src.sample_period();
        let i0 = ((start_ms / dt).round().max(0.0)) as usize;
        let i1 = (((stop_ms / dt).round().max(0.0)) as usize).min(src.len());
        let samples = src.samples()[i0.min(i1)..i1].to_vec();
        let mut series = Series::new(src.name(), samples, dt)?;
        let attrs = series.attrs_mut();
        attrs.set(ATTR_TSTART, AttrValue::Scalar(start_ms));
        attrs.set(ATTR_TSTOP, AttrValue::Scalar(stop_ms));
        attrs.set(ATTR_TRIGGER_TIME, AttrValue::Scalar(trigger_offset_ms));
        series
    };
    store.add_child(frame, Node::leaf(child_series));
    Ok(())
}

/// Options for tag extraction
#[derive(Debug, Clone)]
pub struct TagOptions {
    /// Display name of the stream child carrying tag attributes
    pub stream_name: String,
    /// Also emit times relative to the frame's trigger time
    pub relative_to_trigger: bool,
}

impl Default for TagOptions {
    fn default() -> Self {
        Self {
            stream_name: "Video stream".to_owned(),
            relative_to_trigger: false,
        }
    }
}

/// Outcome of tag extraction for one frame
#[derive(Debug, Default)]
pub struct TagReport {
    /// Tag letters found with non-empty time lists
    pub tags: Vec<char>,
    /// Set when the frame was skipped (no stream child); recoverable
    pub skipped: Option<String>,
}

/// Scan the frame's stream child for `VideoTag_<letter>` attributes and
/// materialize a `TagData` group with absolute (and optionally
/// trigger-relative) time lists.
///
/// Regeneration is destructive: an existing `TagData` group is deleted and
/// fully rebuilt, never merged incrementally.
///
/// # Errors
/// Returns [`Error::MissingMetadata`] when relative times were requested
/// but the stream has no trigger-time attribute. This is a hard stop for
/// the frame; batch callers continue with sibling frames.
pub fn extract_tag_data(store: &mut Store, frame: NodeId, opts: &TagOptions) -> Result<TagReport> {
    if store.find_child(frame, TAG_DATA_GROUP).is_some() {
        store.remove_child(frame, TAG_DATA_GROUP)?;
    }

    let Some(stream) = store.find_child(frame, &opts.stream_name) else {
        let reason = format!("no '{}' child", opts.stream_name);
        warn!(frame = %store.path_of(frame), %reason, "skipping frame");
        return Ok(TagReport {
            skipped: Some(reason),
            ..TagReport::default()
        });
    };
    let Some(stream_series) = store.node(stream).series() else {
        let reason = format!("'{}' child holds no series", opts.stream_name);
        warn!(frame = %store.path_of(frame), %reason, "skipping frame");
        return Ok(TagReport {
            skipped: Some(reason),
            ..TagReport::default()
        });
    };

    // Collect the tags present in the stream, with their recorded times.
    let mut found: Vec<(char, Vec<f64>)> = Vec::new();
    for letter in TAG_ALPHABET {
        let key = format!("VideoTag_{letter}");
        if let Some(times) = stream_series.attrs().get(&key).and_then(AttrValue::as_list) {
            if !times.is_empty() {
                found.push((letter, times.to_vec()));
            }
        }
    }

    let trigger_time = if opts.relative_to_trigger {
        let t = stream_series
            .attrs()
            .get(ATTR_TRIGGER_TIME)
            .and_then(AttrValue::as_scalar)
            .ok_or_else(|| Error::MissingMetadata {
                item: store.path_of(frame),
                attribute: ATTR_TRIGGER_TIME.to_owned(),
            })?;
        Some(t)
    } else {
        None
    };

    let tag_data = store.add_child(frame, Node::group(TAG_DATA_GROUP));
    let mut provenance = Series::empty(TAG_DATA_GROUP);
    provenance
        .attrs_mut()
        .set(ATTR_CREATED_AT, AttrValue::Text(Utc::now().to_rfc3339()));
    store.set_series(tag_data, provenance);

    let absolute = store.add_child(tag_data, Node::group(TAG_TIMES_ABSOLUTE));
    for (letter, times) in &found {
        let series = Series::new(format!("VideoTag_{letter}"), times.clone(), 1.0)?;
        store.add_child(absolute, Node::leaf(series));
    }

    if let Some(trigger_time) = trigger_time {
        let relative = store.add_child(tag_data, Node::group(TAG_TIMES_FROM_TRIGGER));
        for (letter, times) in &found {
            let shifted: Vec<f64> = times.iter().map(|t| t - trigger_time).collect();
            let series = Series::new(format!("VideoTag_{letter}"), shifted, 1.0)?;
            store.add_child(relative, Node::leaf(series));
        }
    }

    Ok(TagReport {
        tags: found.into_iter().map(|(letter, _)| letter).collect(),
        skipped: None,
    })
}

/// Traversal depth for [`iterate_frames`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterLevel {
    /// Yield the selected protocol nodes themselves
    Protocol,
    /// Yield protocol/trigger-group pairs
    Trigger,
    /// Yield protocol/trigger-group/frame triples
    Frame,
}

/// One step of a protocol-tree traversal
#[derive(Debug, Clone, Copy)]
pub struct FrameRef {
    /// Selected protocol node
    pub protocol: NodeId,
    /// Trigger-category group, when descending past protocol level
    pub trigger: Option<NodeId>,
    /// Frame node, when descending to frame level
    pub frame: Option<NodeId>,
}

/// Walk selected protocol nodes down to the requested level, yielding one
/// entry per visited node. Batch analyses share this traversal so they all
/// agree on what "per frame" means.
#[must_use]
pub fn iterate_frames(store: &Store, selection: &[NodeId], level: IterLevel) -> Vec<FrameRef> {
    let mut out = Vec::new();
    for &protocol in selection {
        if level == IterLevel::Protocol {
            out.push(FrameRef {
                protocol,
                trigger: None,
                frame: None,
            });
            continue;
        }
        for &trigger in store.node(protocol).children() {
            if level == IterLevel::Trigger {
                out.push(FrameRef {
                    protocol,
                    trigger: Some(trigger),
                    frame: None,
                });
                continue;
            }
            for &frame in store.node(trigger).children() {
                out.push(FrameRef {
                    protocol,
                    trigger: Some(trigger),
                    frame: Some(frame),
                });
            }
        }
    }
    out
}

/// Summary of a batch tag-extraction run
#[derive(Debug, Default)]
pub struct TagBatchReport {
    /// Frames whose `TagData` group was rebuilt
    pub rebuilt: usize,
    /// Frames skipped for recoverable reasons (no stream child)
    pub skipped: usize,
    /// Hard per-frame failures; sibling frames continued
    pub failures: Vec<ItemFailure>,
}

/// Run [`extract_tag_data`] over every frame reachable from the selected
/// protocol nodes. Hard failures (missing trigger time) are recorded and
/// the batch continues with sibling frames.
pub fn extract_tag_batch(
    store: &mut Store,
    selection: &[NodeId],
    opts: &TagOptions,
) -> TagBatchReport {
    let mut report = TagBatchReport::default();
    for frame_ref in iterate_frames(store, selection, IterLevel::Frame) {
        let Some(frame) = frame_ref.frame else {
            continue;
        };
        match extract_tag_data(store, frame, opts) {
            Ok(r) if r.skipped.is_some() => report.skipped += 1,
            Ok(_) => report.rebuilt += 1,
            Err(e) => report.failures.push(ItemFailure {
                item: store.path_of(frame),
                reason: e.to_string(),
            }),
        }
    }
    report
}
