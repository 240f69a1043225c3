//! The [`FireConfig`] message and its free-form option bag.
//!
//! Options arrive as an arbitrary JSON object produced by the config
//! builders. Reading them never fails: a key with the wrong type is treated
//! exactly like a missing key, so every caller falls back to a default.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::Result;

/// Keys that steer dispatch or scheduling and are never forwarded to the
/// renderer.
pub const CONTROL_KEYS: [&str; 4] = ["duration", "emoji", "customShape", "matrix"];

/// Named, pre-choreographed effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PresetName {
    Fireworks,
    Snow,
    SideCannons,
    Realistic,
    School,
}

impl PresetName {
    pub const ALL: [PresetName; 5] = [
        PresetName::Fireworks,
        PresetName::Snow,
        PresetName::SideCannons,
        PresetName::Realistic,
        PresetName::School,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PresetName::Fireworks => "fireworks",
            PresetName::Snow => "snow",
            PresetName::SideCannons => "sideCannons",
            PresetName::Realistic => "realistic",
            PresetName::School => "school",
        }
    }
}

impl fmt::Display for PresetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresetName {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        PresetName::ALL
            .into_iter()
            .find(|preset| preset.as_str() == value)
            .ok_or_else(|| format!("unknown preset `{value}`"))
    }
}

/// Normalised viewport coordinate where particles spawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    pub x: f64,
    pub y: f64,
}

impl Default for Origin {
    fn default() -> Self {
        Self { x: 0.5, y: 0.5 }
    }
}

impl Origin {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Free-form option bag carried by a [`FireConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(Map<String, Value>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a JSON value. Anything but an object becomes an empty bag.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self(map.clone()),
            _ => Self::default(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns a fresh bag holding `defaults` overridden by every key of
    /// `self`. Neither input is modified.
    pub fn merged_over(&self, defaults: &[(&str, Value)]) -> Options {
        let mut merged = Map::with_capacity(defaults.len() + self.0.len());
        for (key, value) in defaults {
            merged.insert((*key).to_string(), value.clone());
        }
        for (key, value) in &self.0 {
            merged.insert(key.clone(), value.clone());
        }
        Options(merged)
    }

    /// Finite JSON number stored under `key`.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.0
            .get(key)
            .and_then(Value::as_f64)
            .filter(|value| value.is_finite())
    }

    /// Like [`Options::number`] but only accepts values strictly above zero.
    pub fn positive(&self, key: &str) -> Option<f64> {
        self.number(key).filter(|value| *value > 0.0)
    }

    /// Whole, non-negative count stored under `key`. Fractions are floored.
    pub fn count(&self, key: &str) -> Option<u32> {
        self.number(key)
            .map(|value| value.max(0.0).floor().min(u32::MAX as f64) as u32)
    }

    /// Non-empty string stored under `key`.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Effect duration in milliseconds, if a positive one was supplied.
    pub fn duration_ms(&self) -> Option<u64> {
        self.positive("duration").map(|ms| ms.round().max(1.0) as u64)
    }

    /// Colour list, only when every entry is a string and the list is not
    /// empty.
    pub fn colors(&self) -> Option<Vec<String>> {
        let entries = self.0.get("colors")?.as_array()?;
        if entries.is_empty() {
            return None;
        }
        entries
            .iter()
            .map(|entry| entry.as_str().map(str::to_string))
            .collect()
    }

    /// Origin with missing axes filled from `fallback`.
    pub fn origin_or(&self, fallback: Origin) -> Origin {
        let Some(Value::Object(origin)) = self.0.get("origin") else {
            return fallback;
        };
        let axis = |key: &str| {
            origin
                .get(key)
                .and_then(Value::as_f64)
                .filter(|value| value.is_finite())
        };
        Origin {
            x: axis("x").unwrap_or(fallback.x),
            y: axis("y").unwrap_or(fallback.y),
        }
    }

    /// Transformation matrix for SVG path shapes.
    pub fn matrix(&self) -> Option<Vec<f64>> {
        self.0
            .get("matrix")?
            .as_array()?
            .iter()
            .map(|entry| entry.as_f64().filter(|value| value.is_finite()))
            .collect()
    }
}

impl From<Map<String, Value>> for Options {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// The sole message crossing into the core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FireConfig {
    #[serde(default, deserialize_with = "lenient_preset")]
    pub preset: Option<PresetName>,
    #[serde(default, deserialize_with = "lenient_options")]
    pub options: Options,
}

impl FireConfig {
    pub fn new(preset: Option<PresetName>, options: Options) -> Self {
        Self { preset, options }
    }

    pub fn preset(preset: PresetName) -> Self {
        Self::new(Some(preset), Options::new())
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Parses JSON text. Only malformed JSON is an error; unexpected shapes
    /// degrade to the empty config.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(&value))
    }

    /// Builds a config from an arbitrary JSON value without failing.
    pub fn from_value(value: &Value) -> Self {
        let Value::Object(map) = value else {
            return Self::default();
        };
        Self {
            preset: map.get("preset").and_then(preset_from_value),
            options: map.get("options").map(Options::from_value).unwrap_or_default(),
        }
    }

    /// Unwraps a broadcast payload. Multi-argument broadcasts arrive as an
    /// array whose first element is the config.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        match payload {
            Value::Object(_) => Some(Self::from_value(payload)),
            Value::Array(items) => items.first().and_then(Self::from_payload),
            _ => None,
        }
    }
}

fn preset_from_value(value: &Value) -> Option<PresetName> {
    let name = value.as_str()?;
    match name.parse() {
        Ok(preset) => Some(preset),
        Err(reason) => {
            tracing::debug!(%reason, "ignoring preset");
            None
        }
    }
}

fn lenient_preset<'de, D>(deserializer: D) -> std::result::Result<Option<PresetName>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(preset_from_value(&value))
}

fn lenient_options<'de, D>(deserializer: D) -> std::result::Result<Options, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(Options::from_value(&value))
}
