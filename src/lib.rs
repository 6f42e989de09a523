// Error types shared by every layer
pub mod error;

// Session settings loaded from JSON
pub mod config;

// Two-way table between logical values and the tokens an instrument uses for them
pub mod bidict;

// Logical operations and the per-model command tables
pub mod commands;

// Supported oscilloscope models and their vendor dialects
pub mod devices;

// Ways of moving SCPI messages to and from an instrument: VXI-11, raw socket, and an in-memory loopback
pub mod transport;

// Preamble parsing, binary block framing and sample scaling
pub mod waveform;

// A connection to one oscilloscope, with typed getters and setters
pub mod session;

// Per-channel view of a session
pub mod channel;

pub use channel::{Channel, ChannelState};
pub use commands::{dictionary, Operation};
pub use config::SessionConfig;
pub use devices::{Identity, Model};
pub use error::{Result, ScopeError};
pub use session::{Session, State, Timebase};
pub use transport::Transport;
pub use waveform::{Preamble, Signal, TransferFormat};
