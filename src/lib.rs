//! # Ethotrace: hierarchical data-tree engine for neuroscience recordings
//!
//! Ethotrace is the analysis core of a recording browser for multi-modal
//! neuroscience experiments (behavioral video, tracked coordinates,
//! photometry traces, stimulus protocol logs). It provides:
//!
//! - a hierarchical [`store::Store`] of named nodes with unique-name
//!   enforcement, path addressing and a flat leaf list for save/restore;
//! - sample-rate-aware [`align`]ment arithmetic and piecewise-linear
//!   resampling across series with different sample periods;
//! - trigger-onset detection and protocol/tag extraction ([`events`]) that
//!   materialize derived groups in the store, preserving the linkage to
//!   their source;
//! - baseline-relative dF/F and z-score conversion ([`derived`]);
//! - a nonlinear least-squares curve [`fit`] adapter with a fixed model
//!   registry.
//!
//! UI, plotting, video decoding and file I/O are external collaborators:
//! they call into this crate with explicit parameters (no global session
//! state) and consume plain values back.
//!
//! ## Example
//!
//! ```rust
//! use ethotrace::events::{self, ProtocolOptions};
//! use ethotrace::series::{AttrValue, Series};
//! use ethotrace::store::{Node, Store};
//!
//! # fn main() -> ethotrace::Result<()> {
//! let mut store = Store::new();
//! let session = store.add_root(Node::group("session"));
//!
//! // Protocol log: a trigger channel plus per-step labels
//! let channel = Series::new("Indices", vec![0.0, 0.0, 3.0, 0.0, 1.0], 20.0)?;
//! store.add_child(session, Node::leaf(channel));
//! let mut names = Series::empty("Names");
//! names.attrs_mut().set("labels", AttrValue::Text("['vis_73pc', 'vis_73pc']".into()));
//! let names_node = store.add_child(session, Node::group("Names"));
//! store.set_series(names_node, names);
//!
//! let report = events::extract_protocols(&mut store, session, &ProtocolOptions::default())?;
//! assert_eq!(report.onsets, vec![2, 4]);
//! assert!(store.resolve(&["session", "protocols_data", "vis_73pc", "triggers", "frame_2"]).is_ok());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod align;
pub mod derived;
pub mod error;
pub mod events;
pub mod fit;
pub mod series;
pub mod snapshot;
pub mod store;

pub use error::{Error, Result};
