//! Preset engine: pure translation from a preset and its options into shots.
//!
//! One-shot choreographies ([`realistic`], [`basic`]) return their shots
//! directly. Delayed ones ([`emoji`], [`custom_shape`]) return a [`Volleys`]
//! plan, and the timed presets return a [`Cadence`] whose [`Cadence::tick`]
//! is asked for shots on every period until the duration runs out. Timing
//! itself is owned by the controller.

use serde_json::{json, Value};

use crate::{
    options::{Options, Origin, PresetName},
    random::RandomSource,
    render::{ShapeSpec, ShotParams},
    timeline::Millis,
};

pub const FIREWORKS_PERIOD_MS: Millis = 250;
pub const SNOW_PERIOD_MS: Millis = 50;
pub const SIDE_CANNONS_PERIOD_MS: Millis = 200;
pub const SCHOOL_PERIOD_MS: Millis = 250;

pub const DEFAULT_DURATION_MS: Millis = 5000;
pub const SCHOOL_DURATION_MS: Millis = 3000;

/// Offsets of the three delayed volleys used by glyph and path effects.
pub const VOLLEY_OFFSETS_MS: [Millis; 3] = [0, 100, 200];

const SCHOOL_PARTICLES: u32 = 50;
const REALISTIC_PARTICLES: u32 = 200;
const SHAPE_PARTICLES: u32 = 30;
const EMOJI_TINY_PARTICLES: u32 = 5;
const EMOJI_CIRCLE_PARTICLES: u32 = 15;
const SHAPE_SCALAR: f64 = 2.0;

/// Presets that emit repeatedly until their duration elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedPreset {
    Fireworks,
    Snow,
    SideCannons,
    School,
}

impl TimedPreset {
    pub fn from_preset(preset: PresetName) -> Option<Self> {
        match preset {
            PresetName::Fireworks => Some(TimedPreset::Fireworks),
            PresetName::Snow => Some(TimedPreset::Snow),
            PresetName::SideCannons => Some(TimedPreset::SideCannons),
            PresetName::School => Some(TimedPreset::School),
            PresetName::Realistic => None,
        }
    }

    pub fn period_ms(self) -> Millis {
        match self {
            TimedPreset::Fireworks => FIREWORKS_PERIOD_MS,
            TimedPreset::Snow => SNOW_PERIOD_MS,
            TimedPreset::SideCannons => SIDE_CANNONS_PERIOD_MS,
            TimedPreset::School => SCHOOL_PERIOD_MS,
        }
    }

    pub fn default_duration_ms(self) -> Millis {
        match self {
            TimedPreset::School => SCHOOL_DURATION_MS,
            _ => DEFAULT_DURATION_MS,
        }
    }

    pub fn name(self) -> PresetName {
        match self {
            TimedPreset::Fireworks => PresetName::Fireworks,
            TimedPreset::Snow => PresetName::Snow,
            TimedPreset::SideCannons => PresetName::SideCannons,
            TimedPreset::School => PresetName::School,
        }
    }
}

/// Periodic emission plan for a timed preset.
#[derive(Debug, Clone, PartialEq)]
pub struct Cadence {
    pub preset: TimedPreset,
    pub period_ms: Millis,
    pub duration_ms: Millis,
    template: ShotParams,
    fixed_drift: Option<f64>,
}

impl Cadence {
    /// Resolves defaults for `preset` under the caller's `options`.
    pub fn new(preset: TimedPreset, options: &Options) -> Self {
        let duration_ms = options
            .duration_ms()
            .unwrap_or_else(|| preset.default_duration_ms());

        let (template, fixed_drift) = match preset {
            TimedPreset::Fireworks => (ShotParams::from_options(&burst_options(options)), None),
            TimedPreset::School => {
                let template = ShotParams::from_options(&burst_options(options))
                    .with_particle_count(SCHOOL_PARTICLES);
                (template, None)
            }
            TimedPreset::Snow => {
                let merged = options.merged_over(&[
                    ("particleCount", json!(1)),
                    ("startVelocity", json!(0)),
                    ("ticks", json!(200)),
                    ("gravity", json!(0.3)),
                    ("scalar", json!(1.2)),
                    ("colors", json!(["#ffffff", "#99ccff"])),
                ]);
                let mut template = ShotParams::from_options(&merged);
                template.shapes = vec![ShapeSpec::Circle];
                (template, options.number("drift"))
            }
            TimedPreset::SideCannons => {
                let merged = options.merged_over(&[
                    ("particleCount", json!(3)),
                    ("angle", json!(60)),
                    ("spread", json!(55)),
                    ("startVelocity", json!(60)),
                ]);
                (ShotParams::from_options(&merged), None)
            }
        };

        Self {
            preset,
            period_ms: preset.period_ms(),
            duration_ms,
            template,
            fixed_drift,
        }
    }

    /// Shots for one tick with `time_left` ms remaining before the deadline.
    pub fn tick(&self, time_left: Millis, random: &mut dyn RandomSource) -> Vec<ShotParams> {
        match self.preset {
            TimedPreset::Fireworks | TimedPreset::School => {
                let scale = time_left as f64 / self.duration_ms as f64;
                let count = (self.template.particle_count as f64 * scale).floor() as u32;
                let left = Origin::new(random.in_range(0.1, 0.3), random.next_f64() - 0.2);
                let right = Origin::new(random.in_range(0.7, 0.9), random.next_f64() - 0.2);
                vec![
                    self.template
                        .clone()
                        .with_particle_count(count)
                        .with_origin(left),
                    self.template
                        .clone()
                        .with_particle_count(count)
                        .with_origin(right),
                ]
            }
            TimedPreset::Snow => {
                let origin = Origin::new(random.next_f64(), random.next_f64() * 0.99 - 0.2);
                let drift = match self.fixed_drift {
                    Some(drift) => drift,
                    None => random.next_f64() - 0.5,
                };
                let mut shot = self.template.clone().with_origin(origin);
                shot.drift = drift;
                vec![shot]
            }
            TimedPreset::SideCannons => {
                let y = self.template.origin.y;
                let left = self.template.clone().with_origin(Origin::new(0.0, y));
                let mut right = self.template.clone().with_origin(Origin::new(1.0, y));
                right.angle = 180.0 - self.template.angle;
                vec![left, right]
            }
        }
    }
}

/// Fixed shots repeated at each of [`VOLLEY_OFFSETS_MS`].
#[derive(Debug, Clone, PartialEq)]
pub struct Volleys {
    pub offsets_ms: Vec<Millis>,
    pub shots: Vec<ShotParams>,
}

/// Ratio of the total and the overrides of each `realistic` burst.
const REALISTIC_BURSTS: [(f64, &[(&str, f64)]); 5] = [
    (0.25, &[("spread", 26.0), ("startVelocity", 55.0)]),
    (0.2, &[("spread", 60.0)]),
    (0.35, &[("spread", 100.0), ("decay", 0.91), ("scalar", 0.8)]),
    (
        0.1,
        &[
            ("spread", 120.0),
            ("startVelocity", 25.0),
            ("decay", 0.92),
            ("scalar", 1.2),
        ],
    ),
    (0.1, &[("spread", 120.0), ("startVelocity", 45.0)]),
];

/// Five stacked bursts splitting `particleCount` (default 200) by fixed
/// ratios.
pub fn realistic(options: &Options) -> Vec<ShotParams> {
    let total = options.count("particleCount").unwrap_or(REALISTIC_PARTICLES);
    let mut base = options.merged_over(&[("angle", json!(90))]);
    let origin = options.origin_or(Origin::new(0.5, 0.7));
    base.set("origin", json!({ "x": origin.x, "y": origin.y }));

    REALISTIC_BURSTS
        .iter()
        .map(|(ratio, overrides)| {
            let mut burst = base.clone();
            for (key, value) in overrides.iter() {
                burst.set(*key, *value);
            }
            ShotParams::from_options(&burst)
                .with_particle_count((total as f64 * ratio).floor() as u32)
        })
        .collect()
}

/// Main glyph burst, a tiny glyph burst and a half-scale circle burst per
/// volley. Every volley repeats all three, so a renderer sees nine calls.
pub fn emoji(glyph: &str, options: &Options) -> Volleys {
    let merged = shape_options(options);
    let scalar = merged.number("scalar").unwrap_or(SHAPE_SCALAR);

    let mut main = ShotParams::from_options(&merged);
    main.shapes = vec![ShapeSpec::text(glyph, scalar)];
    main.particle_count = options.count("particleCount").unwrap_or(SHAPE_PARTICLES);

    let tiny = main.clone().with_particle_count(EMOJI_TINY_PARTICLES);

    let mut circles = main.clone().with_particle_count(EMOJI_CIRCLE_PARTICLES);
    circles.scalar = scalar / 2.0;
    circles.shapes = vec![ShapeSpec::Circle];

    Volleys {
        offsets_ms: VOLLEY_OFFSETS_MS.to_vec(),
        shots: vec![main, tiny, circles],
    }
}

/// One burst per volley drawn with a shape built from an SVG path.
pub fn custom_shape(path: &str, options: &Options) -> Volleys {
    let merged = shape_options(options);
    let mut shot = ShotParams::from_options(&merged);
    shot.shapes = vec![ShapeSpec::path(path, options.matrix())];
    shot.particle_count = options.count("particleCount").unwrap_or(SHAPE_PARTICLES);

    Volleys {
        offsets_ms: VOLLEY_OFFSETS_MS.to_vec(),
        shots: vec![shot],
    }
}

/// Single shot with the options taken verbatim.
pub fn basic(options: &Options) -> ShotParams {
    ShotParams::from_options(options)
}

fn burst_options(options: &Options) -> Options {
    options.merged_over(&[
        ("particleCount", json!(50)),
        ("startVelocity", json!(30)),
        ("spread", json!(360)),
        ("ticks", json!(60)),
        ("zIndex", json!(0)),
    ])
}

fn shape_options(options: &Options) -> Options {
    options.merged_over(&[
        ("scalar", Value::from(SHAPE_SCALAR)),
        ("spread", json!(360)),
        ("ticks", json!(60)),
        ("gravity", json!(0)),
        ("decay", json!(0.96)),
        ("startVelocity", json!(20)),
    ])
}
