//! Fluent construction of a [`FireConfig`] plus component behaviour.
//!
//! Randomised helpers such as [`ConfettiBuilder::random_direction`] resolve
//! their values once, while building, so the config that crosses into the
//! core is always concrete.

use serde_json::{json, Value};

use crate::{
    bridge::ConfettiSource,
    options::{FireConfig, Options, PresetName},
    random::{self, RandomSource},
    timeline::Millis,
};

/// Colours of the `stars` helper.
pub const STAR_COLORS: [&str; 5] = ["FFE400", "FFBD00", "E89400", "FFCA6C", "FDFFB8"];

pub struct ConfettiBuilder {
    preset: Option<PresetName>,
    options: Options,
    auto_fire: bool,
    delay: Option<Millis>,
    trigger: Option<String>,
    random: Box<dyn RandomSource>,
}

impl Default for ConfettiBuilder {
    fn default() -> Self {
        Self::with_random(random::entropy())
    }
}

impl ConfettiBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder whose randomised helpers draw from `random`.
    pub fn with_random(random: Box<dyn RandomSource>) -> Self {
        Self {
            preset: None,
            options: Options::new(),
            auto_fire: false,
            delay: None,
            trigger: None,
            random,
        }
    }

    pub fn preset(mut self, preset: Option<PresetName>) -> Self {
        self.preset = preset;
        self
    }

    /// Replaces the whole option bag.
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Sets a single option key.
    pub fn option(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.options.set(key, value);
        self
    }

    pub fn auto_fire(mut self, enabled: bool) -> Self {
        self.auto_fire = enabled;
        self
    }

    pub fn delay(mut self, milliseconds: Millis) -> Self {
        self.delay = Some(milliseconds);
        self
    }

    pub fn trigger(mut self, event: impl Into<String>) -> Self {
        self.trigger = Some(event.into());
        self
    }

    pub fn basic(self) -> Self {
        self.with_defaults(&[
            ("particleCount", json!(100)),
            ("spread", json!(70)),
            ("origin", json!({"y": 0.6})),
        ])
    }

    /// Angle, spread and count are drawn now, not when the effect fires.
    pub fn random_direction(mut self) -> Self {
        let angle = self.random_int(55, 125);
        let spread = self.random_int(50, 70);
        let count = self.random_int(50, 100);
        self.with_defaults(&[
            ("angle", json!(angle)),
            ("spread", json!(spread)),
            ("particleCount", json!(count)),
            ("origin", json!({"y": 0.6})),
        ])
    }

    pub fn fireworks(mut self, duration: Millis) -> Self {
        self.preset = Some(PresetName::Fireworks);
        self.with_defaults(&[
            ("duration", json!(duration)),
            ("startVelocity", json!(30)),
            ("spread", json!(360)),
            ("ticks", json!(60)),
            ("particleCount", json!(50)),
        ])
    }

    /// Drift is fixed to ±0.4 for the whole effect.
    pub fn snow(mut self, duration: Millis) -> Self {
        self.preset = Some(PresetName::Snow);
        let drift = if self.random.next_f64() < 0.5 { -0.4 } else { 0.4 };
        self.with_defaults(&[
            ("duration", json!(duration)),
            ("particleCount", json!(1)),
            ("startVelocity", json!(0)),
            ("ticks", json!(200)),
            ("gravity", json!(0.3)),
            ("spread", json!(90)),
            ("drift", json!(drift)),
            ("scalar", json!(1.2)),
        ])
    }

    pub fn stars(self) -> Self {
        self.with_defaults(&[
            ("spread", json!(360)),
            ("ticks", json!(50)),
            ("gravity", json!(0)),
            ("decay", json!(0.94)),
            ("startVelocity", json!(30)),
            ("shapes", json!(["star"])),
            ("colors", json!(STAR_COLORS)),
        ])
    }

    pub fn side_cannons(mut self, duration: Millis) -> Self {
        self.preset = Some(PresetName::SideCannons);
        self.with_defaults(&[
            ("duration", json!(duration)),
            ("particleCount", json!(3)),
            ("angle", json!(60)),
            ("spread", json!(55)),
            ("startVelocity", json!(60)),
        ])
    }

    pub fn realistic(mut self) -> Self {
        self.preset = Some(PresetName::Realistic);
        self
    }

    pub fn school(mut self, duration: Millis) -> Self {
        self.preset = Some(PresetName::School);
        self.with_defaults(&[("duration", json!(duration))])
    }

    pub fn emoji(self, glyph: &str) -> Self {
        self.with_defaults(&[
            ("emoji", json!(glyph)),
            ("scalar", json!(2)),
            ("spread", json!(360)),
            ("ticks", json!(60)),
            ("gravity", json!(0)),
            ("decay", json!(0.96)),
            ("startVelocity", json!(20)),
        ])
    }

    pub fn custom_shape(self, svg_path: &str) -> Self {
        self.with_defaults(&[("customShape", json!(svg_path)), ("scalar", json!(2))])
    }

    pub fn colors<I, S>(mut self, colors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let colors: Vec<Value> = colors
            .into_iter()
            .map(|color| Value::String(color.into()))
            .collect();
        self.options.set("colors", colors);
        self
    }

    pub fn particle_count(mut self, count: u32) -> Self {
        self.options.set("particleCount", count);
        self
    }

    pub fn origin(mut self, x: Option<f64>, y: Option<f64>) -> Self {
        let mut origin = serde_json::Map::new();
        if let Some(x) = x {
            origin.insert("x".to_string(), json!(x));
        }
        if let Some(y) = y {
            origin.insert("y".to_string(), json!(y));
        }
        self.options.set("origin", Value::Object(origin));
        self
    }

    pub fn build(&self) -> FireConfig {
        FireConfig::new(self.preset, self.options.clone())
    }

    /// Helper defaults sit under whatever was already set on the builder.
    fn with_defaults(mut self, defaults: &[(&str, Value)]) -> Self {
        self.options = self.options.merged_over(defaults);
        self
    }

    fn random_int(&mut self, min: i64, max: i64) -> i64 {
        let span = (max - min + 1) as f64;
        min + (self.random.next_f64() * span).floor() as i64
    }
}

impl ConfettiSource for ConfettiBuilder {
    fn confetti_config(&self) -> FireConfig {
        self.build()
    }

    fn should_auto_fire(&self) -> bool {
        self.auto_fire
    }

    fn delay(&self) -> Option<Millis> {
        self.delay
    }

    fn trigger(&self) -> Option<String> {
        self.trigger.clone()
    }
}

impl std::fmt::Debug for ConfettiBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfettiBuilder")
            .field("preset", &self.preset)
            .field("options", &self.options)
            .field("auto_fire", &self.auto_fire)
            .field("delay", &self.delay)
            .field("trigger", &self.trigger)
            .finish()
    }
}
