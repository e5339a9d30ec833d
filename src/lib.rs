//! Surface Mapper
//!
//! Maps a MIDI control surface onto application commands through views and
//! modes. Physical [`control::Control`]s are routed by [`pattern::MessagePattern`],
//! decoded, and handed to the [`component::Component`] that currently owns them
//! in the active [`view`] and mode stack. Output is deduplicated per control and
//! batched by the [`output::OutputDispatcher`] until the host flushes.
//!
//! Everything is owned by one explicit [`session::Session`] and driven from a
//! single thread: the host calls `init`, feeds inbound messages, fires due timers,
//! calls `flush` at its batching boundary and `exit` on shutdown.

pub mod actions;
pub mod component;
pub mod config;
pub mod control;
pub mod error;
pub mod host;
pub mod message;
pub mod output;
pub mod pattern;
pub mod ports;
pub mod scheduler;
pub mod session;
pub mod view;

pub use error::{Error, Result};
pub use message::{Message, MidiMessage, SysexMessage};
pub use pattern::MessagePattern;
pub use session::Session;

/// Reserved name of the mode that is always active, below every other mode.
pub const BASE_MODE: &str = "__BASE__";
