//! Fire controller: resolves a [`FireConfig`] to an effect and supervises the
//! timers of every running [`EffectSession`].

use std::collections::{HashMap, VecDeque};

use crate::{
    config::{ControllerConfig, RefirePolicy},
    options::{FireConfig, PresetName},
    preset::{self, Cadence, TimedPreset, Volleys},
    random::{self, RandomSource},
    render::{Renderer, ShotParams},
    timeline::{Millis, TimerId, TimerQueue},
};

/// Number of ended sessions whose final state is remembered.
pub const FINISHED_HISTORY: usize = 64;

/// UI element that owns sessions and components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

/// Identifier of one running effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

/// Effect selected for a config, in dispatch priority order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect<'a> {
    Emoji(&'a str),
    CustomShape(&'a str),
    Preset(PresetName),
    Basic,
}

impl<'a> Effect<'a> {
    pub fn resolve(config: &'a FireConfig) -> Self {
        if let Some(glyph) = config.options.text("emoji") {
            Effect::Emoji(glyph)
        } else if let Some(path) = config.options.text("customShape") {
            Effect::CustomShape(path)
        } else if let Some(preset) = config.preset {
            Effect::Preset(preset)
        } else {
            Effect::Basic
        }
    }
}

/// Lifecycle of a session. Sessions that are idle do not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone)]
enum SessionPlan {
    Cadence(Cadence),
    Volleys { shots: Vec<ShotParams>, remaining: usize },
}

/// Runtime lifetime of one timed or delayed effect.
#[derive(Debug, Clone)]
pub struct EffectSession {
    pub id: SessionId,
    pub owner: Option<ElementId>,
    pub started_at: Millis,
    pub deadline: Millis,
    pub state: SessionState,
    plan: SessionPlan,
    timers: Vec<TimerId>,
}

impl EffectSession {
    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }
}

/// Turns fire requests into renderer calls over time.
pub struct FireController {
    config: ControllerConfig,
    renderer: Box<dyn Renderer>,
    random: Box<dyn RandomSource>,
    timers: TimerQueue<SessionId>,
    sessions: HashMap<SessionId, EffectSession>,
    finished: VecDeque<(SessionId, SessionState)>,
    next_session: u64,
    now: Millis,
}

impl FireController {
    pub fn new(renderer: impl Renderer + 'static) -> Self {
        Self::with_random(renderer, random::entropy())
    }

    pub fn with_random(renderer: impl Renderer + 'static, random: Box<dyn RandomSource>) -> Self {
        Self {
            config: ControllerConfig::default(),
            renderer: Box::new(renderer),
            random,
            timers: TimerQueue::new(),
            sessions: HashMap::new(),
            finished: VecDeque::new(),
            next_session: 0,
            now: 0,
        }
    }

    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn now(&self) -> Millis {
        self.now
    }

    pub fn next_due(&self) -> Option<Millis> {
        self.timers.next_due()
    }

    pub fn active_sessions(&self) -> impl Iterator<Item = &EffectSession> {
        self.sessions.values()
    }

    pub fn is_idle(&self) -> bool {
        self.sessions.is_empty()
    }

    /// State of a session. Ended sessions are remembered for the last
    /// [`FINISHED_HISTORY`] endings, after which this returns `None`.
    pub fn session_state(&self, id: SessionId) -> Option<SessionState> {
        if let Some(session) = self.sessions.get(&id) {
            return Some(session.state);
        }
        self.finished
            .iter()
            .find(|(finished, _)| *finished == id)
            .map(|(_, state)| *state)
    }

    /// Fires an effect that no element owns.
    pub fn fire(&mut self, config: &FireConfig) {
        self.launch(None, config);
    }

    /// Fires an effect owned by `owner`; [`FireController::teardown`] stops it.
    pub fn fire_on(&mut self, owner: ElementId, config: &FireConfig) {
        if self.config.refire == RefirePolicy::SingleFlight {
            self.teardown(owner);
        }
        self.launch(Some(owner), config);
    }

    /// Cancels every session owned by `owner`.
    pub fn teardown(&mut self, owner: ElementId) -> usize {
        let owned: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|session| session.owner == Some(owner))
            .map(|session| session.id)
            .collect();
        for id in &owned {
            self.finish(*id, SessionState::Cancelled);
        }
        owned.len()
    }

    pub fn cancel(&mut self, id: SessionId) -> bool {
        if self.sessions.contains_key(&id) {
            self.finish(id, SessionState::Cancelled);
            true
        } else {
            false
        }
    }

    pub fn cancel_all(&mut self) {
        let ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        for id in ids {
            self.finish(id, SessionState::Cancelled);
        }
    }

    /// Runs every timer due up to `now`, then moves the clock to `now`.
    pub fn advance_to(&mut self, now: Millis) {
        while let Some(fired) = self.timers.pop_due(now) {
            self.now = self.now.max(fired.due);
            self.run_tick(fired.target);
        }
        self.now = self.now.max(now);
    }

    fn launch(&mut self, owner: Option<ElementId>, config: &FireConfig) -> Option<SessionId> {
        // Work on a copy so the caller's options are never touched.
        let options = config.options.clone();

        match Effect::resolve(config) {
            Effect::Emoji(glyph) => {
                let id = self.start_volleys(owner, preset::emoji(glyph, &options));
                tracing::debug!(?id, glyph, "emoji effect started");
                Some(id)
            }
            Effect::CustomShape(path) => {
                let id = self.start_volleys(owner, preset::custom_shape(path, &options));
                tracing::debug!(?id, "custom shape effect started");
                Some(id)
            }
            Effect::Preset(PresetName::Realistic) => {
                for shot in preset::realistic(&options) {
                    self.renderer.emit(&shot);
                }
                None
            }
            Effect::Preset(name) => {
                let timed = TimedPreset::from_preset(name)?;
                let id = self.start_cadence(owner, Cadence::new(timed, &options));
                tracing::debug!(?id, preset = %name, "timed effect started");
                Some(id)
            }
            Effect::Basic => {
                self.renderer.emit(&preset::basic(&options));
                None
            }
        }
    }

    fn start_cadence(&mut self, owner: Option<ElementId>, cadence: Cadence) -> SessionId {
        let id = self.allocate_session();
        let timer = self.timers.schedule_every(self.now, cadence.period_ms, id);
        let session = EffectSession {
            id,
            owner,
            started_at: self.now,
            deadline: self.now.saturating_add(cadence.duration_ms),
            state: SessionState::Running,
            plan: SessionPlan::Cadence(cadence),
            timers: vec![timer],
        };
        self.sessions.insert(id, session);
        id
    }

    fn start_volleys(&mut self, owner: Option<ElementId>, volleys: Volleys) -> SessionId {
        let id = self.allocate_session();
        let timers: Vec<TimerId> = volleys
            .offsets_ms
            .iter()
            .map(|offset| self.timers.schedule_at(self.now.saturating_add(*offset), id))
            .collect();
        let last = volleys.offsets_ms.iter().copied().max().unwrap_or(0);
        let session = EffectSession {
            id,
            owner,
            started_at: self.now,
            deadline: self.now.saturating_add(last),
            state: SessionState::Running,
            plan: SessionPlan::Volleys {
                shots: volleys.shots,
                remaining: timers.len(),
            },
            timers,
        };
        self.sessions.insert(id, session);
        id
    }

    fn allocate_session(&mut self) -> SessionId {
        let id = SessionId(self.next_session);
        self.next_session += 1;
        id
    }

    fn run_tick(&mut self, id: SessionId) {
        let now = self.now;
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };

        let (shots, done) = match &mut session.plan {
            SessionPlan::Cadence(cadence) => {
                if now >= session.deadline {
                    (Vec::new(), true)
                } else {
                    let shots = cadence.tick(session.deadline - now, &mut *self.random);
                    (shots, false)
                }
            }
            SessionPlan::Volleys { shots, remaining } => {
                *remaining = remaining.saturating_sub(1);
                (shots.clone(), *remaining == 0)
            }
        };

        for shot in &shots {
            self.renderer.emit(shot);
        }

        if done {
            self.finish(id, SessionState::Expired);
        }
    }

    fn finish(&mut self, id: SessionId, state: SessionState) {
        let Some(session) = self.sessions.remove(&id) else {
            return;
        };
        for timer in &session.timers {
            self.timers.cancel(*timer);
        }
        tracing::debug!(?id, ?state, at = self.now, "session finished");
        if self.finished.len() == FINISHED_HISTORY {
            self.finished.pop_front();
        }
        self.finished.push_back((id, state));
    }
}

impl std::fmt::Debug for FireController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FireController")
            .field("config", &self.config)
            .field("now", &self.now)
            .field("sessions", &self.sessions.len())
            .field("timers", &self.timers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{options::Options, random::ScriptedRandom, render::ShapeSpec, ShotLog};

    fn harness() -> (FireController, ShotLog) {
        let log = ShotLog::new();
        let controller =
            FireController::with_random(log.clone(), Box::new(ScriptedRandom::new([0.5])));
        (controller, log)
    }

    /// Advances one millisecond at a time and tags each shot with its instant.
    fn run_until(
        controller: &mut FireController,
        log: &ShotLog,
        until: Millis,
    ) -> Vec<(Millis, ShotParams)> {
        let mut shots = Vec::new();
        for now in controller.now()..=until {
            controller.advance_to(now);
            shots.extend(log.drain().into_iter().map(|shot| (now, shot)));
        }
        shots
    }

    fn config(value: serde_json::Value) -> FireConfig {
        FireConfig::from_value(&value)
    }

    fn instants(shots: &[(Millis, ShotParams)]) -> Vec<Millis> {
        shots.iter().map(|(at, _)| *at).collect()
    }

    #[test]
    fn empty_config_fires_one_default_shot() {
        let (mut controller, log) = harness();
        controller.fire(&FireConfig::default());

        assert_eq!(log.drain(), vec![ShotParams::default()]);
        assert!(controller.is_idle());
        assert!(run_until(&mut controller, &log, 1000).is_empty());
    }

    #[test]
    fn dispatch_prefers_emoji_then_custom_shape_then_preset() {
        let both = config(json!({
            "preset": "fireworks",
            "options": {"emoji": "🎉", "customShape": "M0 0"},
        }));
        assert_eq!(Effect::resolve(&both), Effect::Emoji("🎉"));

        let shape = config(json!({"preset": "snow", "options": {"customShape": "M0 0"}}));
        assert_eq!(Effect::resolve(&shape), Effect::CustomShape("M0 0"));

        let preset = config(json!({"preset": "snow", "options": {"emoji": ""}}));
        assert_eq!(Effect::resolve(&preset), Effect::Preset(PresetName::Snow));

        let unknown = config(json!({"preset": "glitter", "options": {}}));
        assert_eq!(Effect::resolve(&unknown), Effect::Basic);
    }

    #[test]
    fn fireworks_duration_bounds_the_emission_window() {
        let (mut controller, log) = harness();
        controller.fire(&config(json!({"preset": "fireworks", "options": {"duration": 1000}})));

        let shots = run_until(&mut controller, &log, 3000);
        assert_eq!(instants(&shots), vec![250, 250, 500, 500, 750, 750]);
        assert_eq!(shots[0].1.particle_count, 37);
        assert_eq!(shots[4].1.particle_count, 12);
        assert!(controller.is_idle());
        assert_eq!(controller.next_due(), None);
    }

    #[test]
    fn every_timed_preset_stops_before_its_duration() {
        for (preset, period) in [("fireworks", 250), ("snow", 50), ("sideCannons", 200), ("school", 250)] {
            let (mut controller, log) = harness();
            controller.fire(&config(json!({"preset": preset, "options": {"duration": 900}})));

            let shots = run_until(&mut controller, &log, 2000);
            let last = shots.last().map(|(at, _)| *at).unwrap();
            assert!(last < 900, "{preset} emitted at {last}");
            assert_eq!(last, (899 / period) * period, "{preset}");
            assert!(controller.is_idle(), "{preset} left its scheduler running");
        }
    }

    #[test]
    fn default_durations_apply() {
        let (mut controller, log) = harness();
        controller.fire(&FireConfig::preset(PresetName::School));
        let shots = run_until(&mut controller, &log, 6000);
        assert_eq!(shots.last().unwrap().0, 2750);

        let (mut controller, log) = harness();
        controller.fire(&config(json!({"preset": "sideCannons", "options": {"duration": "long"}})));
        let shots = run_until(&mut controller, &log, 6000);
        assert_eq!(shots.last().unwrap().0, 4800);
    }

    #[test]
    fn emoji_fires_three_volleys() {
        let (mut controller, log) = harness();
        controller.fire(&config(json!({"options": {"emoji": "⭐", "particleCount": 12}})));
        assert!(log.is_empty());

        let shots = run_until(&mut controller, &log, 1000);
        assert_eq!(instants(&shots), vec![0, 0, 0, 100, 100, 100, 200, 200, 200]);
        for volley in shots.chunks(3) {
            assert_eq!(volley[0].1.particle_count, 12);
            assert_eq!(volley[0].1.shapes, vec![ShapeSpec::text("⭐", 2.0)]);
            assert_eq!(volley[1].1.particle_count, 5);
            assert_eq!(volley[2].1.shapes, vec![ShapeSpec::Circle]);
            assert_eq!(volley[2].1.scalar, 1.0);
        }
        assert!(controller.is_idle());
    }

    #[test]
    fn custom_shape_fires_one_burst_per_volley() {
        let (mut controller, log) = harness();
        controller.fire(&config(json!({"options": {"customShape": "M0 10 L5 0 L10 10z"}})));

        let shots = run_until(&mut controller, &log, 500);
        assert_eq!(instants(&shots), vec![0, 100, 200]);
        assert!(shots.iter().all(|(_, shot)| shot.particle_count == 30));
    }

    #[test]
    fn realistic_fires_immediately() {
        let (mut controller, log) = harness();
        controller.fire(&FireConfig::preset(PresetName::Realistic));

        assert_eq!(log.len(), 5);
        assert!(controller.is_idle());
    }

    #[test]
    fn colors_reach_every_basic_shot_unmodified() {
        let (mut controller, log) = harness();
        controller.fire(&config(json!({"options": {"colors": ["#ff0000", "#00ff00"]}})));

        let shots = log.shots();
        assert_eq!(shots.len(), 1);
        assert_eq!(shots[0].colors, vec!["#ff0000", "#00ff00"]);
    }

    #[test]
    fn hostile_options_never_panic() {
        let (mut controller, log) = harness();
        controller.fire(&config(json!({
            "preset": "fireworks",
            "options": {"duration": -1, "particleCount": {"a": 1}, "colors": "red", "origin": 5},
        })));

        let shots = run_until(&mut controller, &log, 300);
        assert_eq!(shots.len(), 2);
        assert_eq!(shots[0].1.colors, ShotParams::default().colors);
    }

    #[test]
    fn caller_options_are_not_mutated() {
        let (mut controller, _log) = harness();
        let options = Options::new().with("duration", 500);
        let request = FireConfig::new(Some(PresetName::Fireworks), options.clone());
        controller.fire(&request);

        assert_eq!(request.options, options);
    }

    #[test]
    fn teardown_cancels_in_flight_sessions() {
        let (mut controller, log) = harness();
        let element = ElementId(1);
        controller.fire_on(element, &config(json!({"preset": "snow", "options": {"duration": 5000}})));

        let before = run_until(&mut controller, &log, 100);
        assert_eq!(instants(&before), vec![50, 100]);
        let id = controller.active_sessions().next().unwrap().id;

        assert_eq!(controller.teardown(element), 1);
        assert_eq!(controller.session_state(id), Some(SessionState::Cancelled));
        assert!(run_until(&mut controller, &log, 6000).is_empty());
        assert_eq!(controller.next_due(), None);
    }

    #[test]
    fn teardown_only_touches_the_owner() {
        let (mut controller, log) = harness();
        let fireworks = config(json!({"preset": "fireworks", "options": {"duration": 600}}));
        controller.fire_on(ElementId(1), &fireworks);
        controller.fire_on(ElementId(2), &fireworks);
        controller.fire(&fireworks);

        controller.teardown(ElementId(1));
        let shots = run_until(&mut controller, &log, 1000);
        assert_eq!(instants(&shots), vec![250, 250, 250, 250, 500, 500, 500, 500]);
    }

    #[test]
    fn overlapping_refires_run_independently() {
        let (mut controller, log) = harness();
        let request = config(json!({"preset": "sideCannons", "options": {"duration": 500}}));
        controller.fire_on(ElementId(7), &request);
        controller.advance_to(100);
        controller.fire_on(ElementId(7), &request);

        assert_eq!(controller.active_sessions().count(), 2);
        let shots = run_until(&mut controller, &log, 1000);
        assert_eq!(instants(&shots), vec![200, 200, 300, 300, 400, 400, 500, 500]);
    }

    #[test]
    fn single_flight_cancels_the_previous_session() {
        let (controller, log) = harness();
        let mut controller = controller.with_config(ControllerConfig {
            refire: RefirePolicy::SingleFlight,
        });
        let request = config(json!({"preset": "sideCannons", "options": {"duration": 500}}));
        controller.fire_on(ElementId(7), &request);
        controller.advance_to(100);
        controller.fire_on(ElementId(7), &request);

        assert_eq!(controller.active_sessions().count(), 1);
        let shots = run_until(&mut controller, &log, 1000);
        assert_eq!(instants(&shots), vec![300, 300, 500, 500]);
    }

    #[test]
    fn expired_sessions_report_their_state() {
        let (mut controller, log) = harness();
        controller.fire(&config(json!({"preset": "snow", "options": {"duration": 100}})));
        let id = controller.active_sessions().next().unwrap().id;
        assert_eq!(controller.session_state(id), Some(SessionState::Running));

        run_until(&mut controller, &log, 200);
        assert_eq!(controller.session_state(id), Some(SessionState::Expired));
    }

    #[test]
    fn ended_session_history_is_bounded() {
        let (mut controller, _log) = harness();
        let request = FireConfig::preset(PresetName::Snow);
        controller.fire(&request);
        let first = controller.active_sessions().next().unwrap().id;
        controller.cancel(first);
        assert_eq!(controller.session_state(first), Some(SessionState::Cancelled));

        for _ in 0..FINISHED_HISTORY {
            controller.fire(&request);
            controller.cancel_all();
        }
        assert_eq!(controller.session_state(first), None);
        assert!(controller.finished.len() <= FINISHED_HISTORY);
    }

    #[test]
    fn huge_durations_late_in_the_timeline_do_not_overflow() {
        let (mut controller, log) = harness();
        controller.advance_to(1000);
        controller.fire(&config(json!({"preset": "snow", "options": {"duration": 1e20}})));

        let shots = run_until(&mut controller, &log, 1100);
        assert_eq!(instants(&shots), vec![1050, 1100]);
        let session = controller.active_sessions().next().unwrap();
        assert_eq!(session.deadline, Millis::MAX);
        assert!(session.is_running());
    }

    #[test]
    fn cancel_all_clears_every_timer() {
        let (mut controller, log) = harness();
        controller.fire(&FireConfig::preset(PresetName::Snow));
        controller.fire(&config(json!({"options": {"emoji": "🦄"}})));
        controller.cancel_all();

        assert!(controller.is_idle());
        assert!(run_until(&mut controller, &log, 500).is_empty());
    }
}
