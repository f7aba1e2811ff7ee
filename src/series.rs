//! Sample-indexed series and typed attribute bag
//!
//! A [`Series`] is a named array of `f64` samples with a uniform sample
//! period (ms per sample) and an open attribute set. The required keys
//! (`sample_period`, `is_video`) are typed fields validated at
//! construction; everything else lives in an open extension map keyed by
//! string (tag time lists, virtual-clip descriptors, trigger times).

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Attribute key for the trigger time recorded on extracted event children
pub const ATTR_TRIGGER_TIME: &str = "trigger_time";
/// Attribute key for the window start time (ms) of an extracted event
pub const ATTR_TSTART: &str = "tstart";
/// Attribute key for the window stop time (ms) of an extracted event
pub const ATTR_TSTOP: &str = "tstop";
/// Attribute key for a video source's media resource locator
pub const ATTR_MRL: &str = "mrl";
/// Attribute key marking an event child as a virtual subclip
pub const ATTR_SUBCLIP: &str = "subclip";
/// Attribute key for the creation timestamp of a derived group
pub const ATTR_CREATED_AT: &str = "created_at";

/// Attribute value: scalar, text, flag or a list of floats.
///
/// An empty `List` is legal in memory; the persistence walk maps it to a
/// group rather than a dataset (storage-format limitation of the excluded
/// layer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    /// A single float value
    Scalar(f64),
    /// A text value
    Text(String),
    /// A boolean flag
    Flag(bool),
    /// An ordered list of floats (e.g. tag times in ms)
    List(Vec<f64>),
}

impl AttrValue {
    /// The scalar payload, if this is a `Scalar`
    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// The text payload, if this is a `Text`
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The list payload, if this is a `List`
    #[must_use]
    pub fn as_list(&self) -> Option<&[f64]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }
}

/// Typed attribute bag with required keys and an open extension map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrMap {
    /// Milliseconds represented by one sample (`dt`). Always `> 0`.
    sample_period: f64,
    /// Whether the owning series references video rather than samples
    is_video: bool,
    /// Open extension map for domain-specific attributes
    ext: FxHashMap<String, AttrValue>,
}

impl AttrMap {
    /// Create an attribute bag, validating the sample period.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSamplePeriod`] if `sample_period` is not
    /// positive and finite.
    pub fn new(sample_period: f64) -> Result<Self> {
        if !(sample_period.is_finite() && sample_period > 0.0) {
            return Err(Error::InvalidSamplePeriod(sample_period));
        }
        Ok(Self {
            sample_period,
            is_video: false,
            ext: FxHashMap::default(),
        })
    }

    /// Sample period in ms per sample
    #[must_use]
    pub fn sample_period(&self) -> f64 {
        self.sample_period
    }

    /// Whether the owning series is a video reference
    #[must_use]
    pub fn is_video(&self) -> bool {
        self.is_video
    }

    /// Mark the owning series as a video reference
    pub fn set_video(&mut self, is_video: bool) {
        self.is_video = is_video;
    }

    /// Look up an extension attribute
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.ext.get(key)
    }

    /// Insert or replace an extension attribute
    pub fn set(&mut self, key: impl Into<String>, value: AttrValue) {
        self.ext.insert(key.into(), value);
    }

    /// Remove an extension attribute, returning it if present
    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        self.ext.remove(key)
    }

    /// Whether the extension map contains `key`
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.ext.contains_key(key)
    }

    /// Iterate extension attributes in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.ext.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A named, uniformly-sampled numeric sequence with attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    name: String,
    samples: Vec<f64>,
    attrs: AttrMap,
}

impl Series {
    /// Create a series with the given sample period (ms per sample).
    ///
    /// # Errors
    /// Returns [`Error::InvalidSamplePeriod`] if `sample_period` is not
    /// positive and finite.
    pub fn new(name: impl Into<String>, samples: Vec<f64>, sample_period: f64) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            samples,
            attrs: AttrMap::new(sample_period)?,
        })
    }

    /// Create an empty series with the default 1 ms sample period.
    /// Used for nodes that only carry attributes (e.g. virtual clips).
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            samples: Vec::new(),
            attrs: AttrMap {
                sample_period: 1.0,
                is_video: false,
                ext: FxHashMap::default(),
            },
        }
    }

    /// Series name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sample values
    #[must_use]
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Replace the sample values in place (producer re-runs)
    pub fn set_samples(&mut self, samples: Vec<f64>) {
        self.samples = samples;
    }

    /// Number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the series holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample period in ms per sample
    #[must_use]
    pub fn sample_period(&self) -> f64 {
        self.attrs.sample_period()
    }

    /// Total duration covered, in ms
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 * self.attrs.sample_period()
    }

    /// Attribute bag
    #[must_use]
    pub fn attrs(&self) -> &AttrMap {
        &self.attrs
    }

    /// Mutable attribute bag
    pub fn attrs_mut(&mut self) -> &mut AttrMap {
        &mut self.attrs
    }

    /// The native time axis: `index * sample_period` for each sample
    #[must_use]
    pub fn native_time_axis(&self) -> Vec<f64> {
        let dt = self.attrs.sample_period();
        (0..self.samples.len()).map(|i| i as f64 * dt).collect()
    }
}
