//! Error types for the mapping core.
//!
//! Configuration mistakes (bad patterns, conflicts, view graph problems) and
//! state violations surface as [`Error`] and are never swallowed by the core.
//! The host binary wraps them in `anyhow` with context.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid message pattern \"{pattern}\": {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid sysex data \"{data}\": {reason}")]
    InvalidSysex { data: String, reason: String },

    #[error("control must specify at least one pattern")]
    NoPatterns,

    #[error("controls \"{first}\" and \"{second}\" have conflicting patterns {first_pattern} and {second_pattern}")]
    PatternConflict {
        first: String,
        second: String,
        first_pattern: String,
        second_pattern: String,
    },

    #[error("duplicate control name \"{0}\"")]
    DuplicateControl(String),

    #[error("invalid value {value} for control \"{control}\" with value range {min} to {max}")]
    ValueOutOfRange {
        control: String,
        value: i32,
        min: i32,
        max: i32,
    },

    #[error("message \"{message}\" does not match any pattern on control \"{control}\"")]
    PatternMismatch { control: String, message: String },

    #[error("no registered control matches message \"{0}\"")]
    UnmatchedMessage(String),

    #[error("controls have already been registered")]
    ControlsAlreadyRegistered,

    #[error("views have already been registered")]
    ViewsAlreadyRegistered,

    #[error("unknown control \"{0}\"")]
    UnknownControl(String),

    #[error("unknown view \"{0}\"")]
    UnknownView(String),

    #[error("duplicate view name \"{0}\"")]
    DuplicateView(String),

    #[error("view \"{view}\" extends \"{parent}\" which has not been validated")]
    ParentNotValidated { view: String, parent: String },

    #[error("circular view dependency between: {}", .views.join(", "))]
    CircularViewDependency { views: Vec<String> },

    #[error("duplicate control \"{control}\" registration in view \"{view}\" mode \"{mode}\"")]
    DuplicateRegistration {
        view: String,
        mode: String,
        control: String,
    },

    #[error("the base mode \"{0}\" cannot be activated or deactivated")]
    ReservedMode(String),

    #[error("failed to send to port {port}: {reason}")]
    Send { port: u8, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
