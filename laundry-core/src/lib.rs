//! # laundry-core
//!
//! Clip classification for the laundry-room alert pipeline.
//!
//! ## Architecture
//!
//! ```text
//! ObjectCreatedNotification ─► BatchHandler ─► ObjectStore::fetch ─► StagedClip
//!                                                                      │
//!                                                            ClipClassifier
//!                                                   (decode_wav → RMS gate →
//!                                                    AdaptiveVad + peak scan)
//!                                                                      │
//!                                             DetectionEvent ─► ResultSink::deliver
//! ```
//!
//! The classifier is pure and synchronous: it never fails, reporting a
//! neutral result for anything it cannot analyse.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod batch;
pub mod classifier;
pub mod error;
pub mod events;
pub mod storage;
pub mod transport;
pub mod vad;

// Convenience re-exports for downstream crates
pub use audio::{decode_wav, read_wav_file, AudioClip};
pub use batch::{BatchHandler, BatchReport};
pub use classifier::{ClassifierConfig, ClipAnalysis, ClipClassifier, ClipStats, EventPolicy};
pub use error::AlertError;
pub use events::{ClassificationResult, DetectionEvent, ObjectCreatedNotification};
pub use storage::{LocalObjectStore, ObjectStore, StagedClip};
pub use transport::{DeliveryError, HttpSink, MemorySink, ResultSink, RetryPolicy};
pub use vad::{AdaptiveVad, VadConfig, VadDecision, VoiceActivityDetector};
