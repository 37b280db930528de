//! scribed: transcription cache and dispatch engine.
//!
//! Accepts short audio clips, identifies their spoken language, and produces
//! a transcript. Incoming audio is fingerprinted and looked up in a durable
//! content-addressable cache; on a miss it is normalized to a canonical form,
//! routed to a low-latency inline transcription call or a polled background
//! job depending on duration, and the result is cached for identical future
//! uploads. All transient storage (local temp files and remote blobs) is
//! scoped to one request and removed on every exit path.
//!
//! The HTTP layer, the language-identification model, the speech provider,
//! and object storage are collaborators consumed through the capability
//! traits in [`detect`], [`provider`], and [`storage::blob`].

pub mod audio;
pub mod cache;
pub mod config;
pub mod detect;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod logging;
pub mod provider;
pub mod storage;

pub use dispatch::{EngineLimits, TranscriptionDispatcher};
pub use error::{AudioError, JobError, ProcessingError};
pub use provider::TranscriptionResult;
