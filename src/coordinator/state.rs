//! Producer state machine
//!
//! ```text
//!                 ensure_default_running()
//!   NoProducer ─────────────────────────────► SyntheticActive ◄─┐
//!       │                                        │     ▲        │
//!       │ start_external()        start_external()│     │        │ ensure_default_running()
//!       │                                        ▼     │        │ (idempotent)
//!       └──────────────────────────────────► ExternalActive ────┘
//!                                          stop_external() / process exit
//!                                               → SyntheticActive
//! ```
//!
//! `shutdown()` returns to `NoProducer` from any state.

use serde::Serialize;

/// Which producer is feeding the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ProducerState {
    /// Nothing running; nobody has asked for the stream yet
    #[default]
    #[serde(rename = "no_producer")]
    NoProducer,
    /// The synthetic generator is broadcasting
    #[serde(rename = "synthetic")]
    SyntheticActive,
    /// An external process is broadcasting
    #[serde(rename = "external")]
    ExternalActive,
}

impl ProducerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProducerState::NoProducer => "no_producer",
            ProducerState::SyntheticActive => "synthetic",
            ProducerState::ExternalActive => "external",
        }
    }

    /// Whether some producer is broadcasting
    pub fn is_active(&self) -> bool {
        !matches!(self, ProducerState::NoProducer)
    }

    pub fn is_external(&self) -> bool {
        matches!(self, ProducerState::ExternalActive)
    }
}

impl std::fmt::Display for ProducerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
