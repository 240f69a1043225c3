//! Core library for declarative confetti effects.
//!
//! A [`FireConfig`] (preset name plus free-form options) enters through the
//! [`EventBridge`], is resolved by the [`FireController`] and expanded by the
//! preset engine into a time-sequenced series of [`ShotParams`], each handed
//! to a [`Renderer`]. Everything runs on a virtual millisecond timeline that
//! the host advances, so effects are deterministic under test and real-time
//! hosts only need to feed in elapsed wall-clock time.

pub mod bridge;
pub mod builder;
pub mod config;
pub mod controller;
pub mod error;
pub mod options;
pub mod preset;
pub mod random;
pub mod render;
pub mod timeline;

pub use bridge::{ConfettiSource, EngineLoader, EventBridge};
pub use builder::ConfettiBuilder;
pub use config::{BridgeConfig, ConfettiSettings, ControllerConfig, RefirePolicy};
pub use controller::{EffectSession, ElementId, FireController, SessionId, SessionState};
pub use error::{ConfettiError, Result};
pub use options::{FireConfig, Options, Origin, PresetName};
pub use random::RandomSource;
pub use render::{Renderer, ShapeSpec, ShotLog, ShotParams, TracingRenderer};
pub use timeline::{Millis, TimerQueue};
