//! # Realtime Audio Subsystem
//!
//! The realtime audio multiplexer (C6), the upstream provider adapter
//! contract (C7), and the pure event normalizer (C8). Audio framing and VAD
//! translation live in [`crate::audio`] and [`crate::vad`] respectively.

pub mod any_adapter;
pub mod normalizer;
pub mod session;

pub use any_adapter::AnyRealtimeAdapter;
pub use normalizer::{normalize, RealtimeProviderKind, UnifiedEvent};
pub use session::{
    ClientEvent, RealtimeSession, RealtimeSessionConfig, RealtimeUpstreamAdapter, SessionState,
};

use thiserror::Error;

/// Errors a realtime upstream adapter (C7) can surface from connect/send.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("upstream connect timed out")]
    ConnectTimeout,
    #[error("upstream connection closed")]
    UpstreamClosed,
    #[error("upstream transport error: {0}")]
    Transport(String),
}
