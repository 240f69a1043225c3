use std::{cell::RefCell, rc::Rc};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::options::{Options, Origin, CONTROL_KEYS};

/// Palette used by the renderer when a shot names no colours.
pub const DEFAULT_COLORS: [&str; 7] = [
    "#26ccff", "#a25afd", "#ff5e7e", "#88ff5a", "#fcff42", "#ffa62d", "#ff36ff",
];

/// Keys that [`ShotParams::from_options`] maps onto typed fields.
const SHOT_KEYS: [&str; 14] = [
    "particleCount",
    "angle",
    "spread",
    "startVelocity",
    "decay",
    "gravity",
    "drift",
    "ticks",
    "scalar",
    "origin",
    "colors",
    "shapes",
    "zIndex",
    "flat",
];

/// Shape a particle is drawn with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ShapeSpec {
    Circle,
    Square,
    Star,
    /// Glyph rasterised by the renderer, usually an emoji.
    Text { text: String, scalar: f64 },
    /// SVG path description with an optional transformation matrix.
    Path {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        matrix: Option<Vec<f64>>,
    },
}

impl ShapeSpec {
    /// Resolves one of the named primitives.
    pub fn named(name: &str) -> Option<Self> {
        match name {
            "circle" => Some(ShapeSpec::Circle),
            "square" => Some(ShapeSpec::Square),
            "star" => Some(ShapeSpec::Star),
            _ => None,
        }
    }

    pub fn text(text: impl Into<String>, scalar: f64) -> Self {
        ShapeSpec::Text {
            text: text.into(),
            scalar,
        }
    }

    pub fn path(path: impl Into<String>, matrix: Option<Vec<f64>>) -> Self {
        ShapeSpec::Path {
            path: path.into(),
            matrix,
        }
    }
}

/// Parameters of a single renderer call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotParams {
    pub particle_count: u32,
    pub angle: f64,
    pub spread: f64,
    pub start_velocity: f64,
    pub decay: f64,
    pub gravity: f64,
    pub drift: f64,
    pub ticks: u32,
    pub scalar: f64,
    pub origin: Origin,
    pub colors: Vec<String>,
    pub shapes: Vec<ShapeSpec>,
    pub z_index: i64,
    pub flat: bool,
    /// Unrecognised option keys, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ShotParams {
    fn default() -> Self {
        Self {
            particle_count: 50,
            angle: 90.0,
            spread: 45.0,
            start_velocity: 45.0,
            decay: 0.9,
            gravity: 1.0,
            drift: 0.0,
            ticks: 200,
            scalar: 1.0,
            origin: Origin::default(),
            colors: DEFAULT_COLORS.iter().map(|color| color.to_string()).collect(),
            shapes: vec![ShapeSpec::Square, ShapeSpec::Circle],
            z_index: 100,
            flat: false,
            extra: Map::new(),
        }
    }
}

impl ShotParams {
    /// Overlays every recognised key of `options` on the renderer defaults.
    pub fn from_options(options: &Options) -> Self {
        let defaults = Self::default();

        let shapes = options
            .get("shapes")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| name.as_str().and_then(ShapeSpec::named))
                    .collect::<Vec<_>>()
            })
            .filter(|shapes| !shapes.is_empty())
            .unwrap_or(defaults.shapes);

        let extra = options
            .iter()
            .filter(|(key, _)| {
                !SHOT_KEYS.contains(&key.as_str()) && !CONTROL_KEYS.contains(&key.as_str())
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            particle_count: options.count("particleCount").unwrap_or(defaults.particle_count),
            angle: options.number("angle").unwrap_or(defaults.angle),
            spread: options.number("spread").unwrap_or(defaults.spread),
            start_velocity: options
                .number("startVelocity")
                .unwrap_or(defaults.start_velocity),
            decay: options.number("decay").unwrap_or(defaults.decay),
            gravity: options.number("gravity").unwrap_or(defaults.gravity),
            drift: options.number("drift").unwrap_or(defaults.drift),
            ticks: options.count("ticks").unwrap_or(defaults.ticks),
            scalar: options.number("scalar").unwrap_or(defaults.scalar),
            origin: options.origin_or(defaults.origin),
            colors: options.colors().unwrap_or(defaults.colors),
            shapes,
            z_index: options
                .number("zIndex")
                .map(|z| z as i64)
                .unwrap_or(defaults.z_index),
            flat: options
                .get("flat")
                .and_then(Value::as_bool)
                .unwrap_or(defaults.flat),
            extra,
        }
    }

    pub fn with_particle_count(mut self, count: u32) -> Self {
        self.particle_count = count;
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }
}

/// Drawing primitive that spawns and animates one shot worth of particles.
pub trait Renderer {
    fn emit(&mut self, shot: &ShotParams);
}

impl<F> Renderer for F
where
    F: FnMut(&ShotParams),
{
    fn emit(&mut self, shot: &ShotParams) {
        self(shot)
    }
}

/// Renderer that records every shot. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct ShotLog {
    shots: Rc<RefCell<Vec<ShotParams>>>,
}

impl ShotLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.shots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shots.borrow().is_empty()
    }

    pub fn shots(&self) -> Vec<ShotParams> {
        self.shots.borrow().clone()
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<ShotParams> {
        std::mem::take(&mut *self.shots.borrow_mut())
    }
}

impl Renderer for ShotLog {
    fn emit(&mut self, shot: &ShotParams) {
        self.shots.borrow_mut().push(shot.clone());
    }
}

/// Renderer that reports each shot through `tracing`.
#[derive(Debug, Default)]
pub struct TracingRenderer {
    emitted: u64,
}

impl TracingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

impl Renderer for TracingRenderer {
    fn emit(&mut self, shot: &ShotParams) {
        self.emitted += 1;
        tracing::info!(
            shot = self.emitted,
            particles = shot.particle_count,
            angle = shot.angle,
            spread = shot.spread,
            x = shot.origin.x,
            y = shot.origin.y,
            "emit"
        );
    }
}
