//! Event bridge between page signals and the [`FireController`].
//!
//! Components are mounted with their static config. A component either fires
//! once after its delay (auto-fire), or whenever its named trigger is
//! dispatched. Independently of any component, a single page-wide listener
//! accepts broadcast payloads that carry their own [`FireConfig`].
//!
//! The controller is loaded lazily through an [`EngineLoader`]. Load failures
//! are logged and the triggering signal is dropped; the next signal retries.

use std::collections::HashMap;

use serde_json::Value;

use crate::{
    config::ConfettiSettings,
    controller::{ElementId, FireController},
    options::FireConfig,
    timeline::{Millis, TimerQueue},
    Result,
};

/// Contract met by anything that can describe a confetti component.
pub trait ConfettiSource {
    fn confetti_config(&self) -> FireConfig;

    fn should_auto_fire(&self) -> bool {
        false
    }

    fn delay(&self) -> Option<Millis> {
        None
    }

    fn trigger(&self) -> Option<String> {
        None
    }
}

impl ConfettiSource for FireConfig {
    fn confetti_config(&self) -> FireConfig {
        self.clone()
    }
}

/// Produces the fire controller on first use.
pub trait EngineLoader {
    fn load(&mut self) -> Result<FireController>;
}

impl<F> EngineLoader for F
where
    F: FnMut() -> Result<FireController>,
{
    fn load(&mut self) -> Result<FireController> {
        self()
    }
}

#[derive(Debug, Clone)]
struct MountedComponent {
    config: FireConfig,
    trigger: Option<String>,
}

/// Routes auto-fire timers, trigger events and broadcasts to the controller.
pub struct EventBridge {
    settings: ConfettiSettings,
    loader: Box<dyn EngineLoader>,
    engine: Option<FireController>,
    components: HashMap<ElementId, MountedComponent>,
    auto_fire: TimerQueue<ElementId>,
    listener_installed: bool,
    now: Millis,
}

impl EventBridge {
    pub fn new(settings: ConfettiSettings, loader: impl EngineLoader + 'static) -> Self {
        Self {
            settings,
            loader: Box::new(loader),
            engine: None,
            components: HashMap::new(),
            auto_fire: TimerQueue::new(),
            listener_installed: false,
            now: 0,
        }
    }

    /// Bridge whose engine is already available.
    pub fn with_engine(settings: ConfettiSettings, engine: FireController) -> Self {
        let mut bridge = Self::new(settings, || -> Result<FireController> {
            Err(crate::ConfettiError::engine_load("engine was supplied preloaded"))
        });
        bridge.engine = Some(engine);
        bridge
    }

    pub fn settings(&self) -> &ConfettiSettings {
        &self.settings
    }

    pub fn now(&self) -> Millis {
        self.now
    }

    pub fn engine(&self) -> Option<&FireController> {
        self.engine.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.is_some()
    }

    /// Loads the engine ahead of the first signal when preloading is enabled.
    pub fn preload(&mut self) -> bool {
        if !self.settings.bridge.preload {
            return self.is_loaded();
        }
        self.ensure_engine().is_some()
    }

    /// Registers the page-wide broadcast listener. Repeated calls are no-ops.
    pub fn install_listener(&mut self) {
        if self.listener_installed {
            return;
        }
        self.listener_installed = true;
        tracing::debug!(event = %self.settings.bridge.broadcast_event, "broadcast listener installed");
        self.preload();
    }

    pub fn uninstall_listener(&mut self) {
        if std::mem::take(&mut self.listener_installed) {
            tracing::debug!(event = %self.settings.bridge.broadcast_event, "broadcast listener removed");
        }
    }

    /// Number of page-wide listeners, never more than one.
    pub fn listener_count(&self) -> usize {
        usize::from(self.listener_installed)
    }

    /// Mounts a component on `element`, replacing anything mounted there.
    pub fn mount(&mut self, element: ElementId, source: &dyn ConfettiSource) {
        self.unmount(element);

        let config = source.confetti_config();
        if source.should_auto_fire() {
            let delay = source.delay().unwrap_or(0);
            self.auto_fire.schedule_at(self.now.saturating_add(delay), element);
            tracing::debug!(?element, delay, "auto-fire scheduled");
        }

        let trigger = source.trigger().filter(|name| !name.is_empty());
        self.components.insert(element, MountedComponent { config, trigger });
    }

    /// Removes a component and cancels everything it started.
    pub fn unmount(&mut self, element: ElementId) {
        if self.components.remove(&element).is_none() {
            return;
        }
        self.auto_fire.cancel_where(|target| *target == element);
        if let Some(engine) = self.engine.as_mut() {
            let cancelled = engine.teardown(element);
            tracing::debug!(?element, cancelled, "component unmounted");
        }
    }

    /// Delivers a named page event.
    pub fn dispatch(&mut self, event: &str, payload: Option<&Value>) {
        let mut bound: Vec<ElementId> = self
            .components
            .iter()
            .filter(|(_, component)| component.trigger.as_deref() == Some(event))
            .map(|(element, _)| *element)
            .collect();
        bound.sort();
        for element in bound {
            self.fire_component(element);
        }

        if self.listener_installed && event == self.settings.bridge.broadcast_event {
            let config = match payload.and_then(FireConfig::from_payload) {
                Some(config) => config,
                None => {
                    tracing::warn!(event, ?payload, "broadcast without a config object, firing defaults");
                    FireConfig::default()
                }
            };
            if let Some(engine) = self.ensure_engine() {
                engine.fire(&config);
            }
        }
    }

    /// Runs auto-fire timers and effect ticks up to `now`, in time order.
    pub fn advance_to(&mut self, now: Millis) {
        while let Some(fired) = self.auto_fire.pop_due(now) {
            self.now = self.now.max(fired.due);
            if let Some(engine) = self.engine.as_mut() {
                engine.advance_to(self.now);
            }
            self.fire_component(fired.target);
        }
        self.now = self.now.max(now);
        if let Some(engine) = self.engine.as_mut() {
            engine.advance_to(self.now);
        }
    }

    /// Earliest pending auto-fire or effect tick.
    pub fn next_due(&self) -> Option<Millis> {
        let engine_due = self.engine.as_ref().and_then(FireController::next_due);
        match (self.auto_fire.next_due(), engine_due) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// True when nothing is scheduled and no effect is running.
    pub fn is_idle(&self) -> bool {
        self.auto_fire.is_empty() && self.engine.as_ref().map_or(true, FireController::is_idle)
    }

    /// Page unload: removes the listener, every component and every effect.
    pub fn shutdown(&mut self) {
        self.uninstall_listener();
        self.components.clear();
        self.auto_fire.clear();
        if let Some(engine) = self.engine.as_mut() {
            engine.cancel_all();
        }
    }

    fn fire_component(&mut self, element: ElementId) {
        let Some(config) = self
            .components
            .get(&element)
            .map(|component| component.config.clone())
        else {
            return;
        };
        if let Some(engine) = self.ensure_engine() {
            engine.fire_on(element, &config);
        }
    }

    fn ensure_engine(&mut self) -> Option<&mut FireController> {
        if self.engine.is_none() {
            match self.loader.load() {
                Ok(mut engine) => {
                    engine.advance_to(self.now);
                    tracing::debug!("confetti engine loaded");
                    self.engine = Some(engine);
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to load confetti engine");
                    return None;
                }
            }
        }
        self.engine.as_mut()
    }
}

impl std::fmt::Debug for EventBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBridge")
            .field("settings", &self.settings)
            .field("engine", &self.engine)
            .field("components", &self.components.len())
            .field("listener_installed", &self.listener_installed)
            .field("now", &self.now)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use serde_json::json;

    use super::*;
    use crate::{
        builder::ConfettiBuilder, config::BridgeConfig, random::ScriptedRandom, ConfettiError,
        ShotLog,
    };

    fn loader(log: &ShotLog, loads: &Rc<Cell<u32>>) -> impl EngineLoader + 'static {
        let log = log.clone();
        let loads = loads.clone();
        move || -> Result<FireController> {
            loads.set(loads.get() + 1);
            Ok(FireController::with_random(
                log.clone(),
                Box::new(ScriptedRandom::new([0.5])),
            ))
        }
    }

    fn lazy_settings() -> ConfettiSettings {
        ConfettiSettings {
            bridge: BridgeConfig {
                preload: false,
                ..BridgeConfig::default()
            },
            ..ConfettiSettings::default()
        }
    }

    fn run_until(bridge: &mut EventBridge, log: &ShotLog, until: Millis) -> Vec<Millis> {
        let mut instants = Vec::new();
        for now in bridge.now()..=until {
            bridge.advance_to(now);
            instants.extend(log.drain().into_iter().map(|_| now));
        }
        instants
    }

    #[test]
    fn broadcast_plays_fireworks_for_exactly_its_duration() {
        let log = ShotLog::new();
        let loads = Rc::new(Cell::new(0));
        let mut bridge = EventBridge::new(ConfettiSettings::default(), loader(&log, &loads));
        bridge.install_listener();

        bridge.advance_to(1000);
        bridge.dispatch(
            "confetti",
            Some(&json!({"preset": "fireworks", "options": {"duration": 1000}})),
        );
        assert!(log.is_empty());

        let instants = run_until(&mut bridge, &log, 4000);
        assert_eq!(instants, vec![1250, 1250, 1500, 1500, 1750, 1750]);
        assert!(bridge.is_idle());
    }

    #[test]
    fn listener_is_registered_once() {
        let log = ShotLog::new();
        let loads = Rc::new(Cell::new(0));
        let mut bridge = EventBridge::new(ConfettiSettings::default(), loader(&log, &loads));

        bridge.install_listener();
        bridge.install_listener();
        bridge.install_listener();
        assert_eq!(bridge.listener_count(), 1);
        assert_eq!(loads.get(), 1);

        bridge.dispatch("confetti", Some(&json!({"preset": null, "options": {}})));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn broadcast_is_ignored_without_listener() {
        let log = ShotLog::new();
        let loads = Rc::new(Cell::new(0));
        let mut bridge = EventBridge::new(ConfettiSettings::default(), loader(&log, &loads));

        bridge.dispatch("confetti", Some(&json!({"options": {}})));
        assert!(log.is_empty());

        bridge.install_listener();
        bridge.uninstall_listener();
        bridge.dispatch("confetti", Some(&json!({"options": {}})));
        assert!(log.is_empty());
        assert_eq!(bridge.listener_count(), 0);
    }

    #[test]
    fn engine_loads_lazily_on_first_broadcast() {
        let log = ShotLog::new();
        let loads = Rc::new(Cell::new(0));
        let mut bridge = EventBridge::new(lazy_settings(), loader(&log, &loads));
        bridge.install_listener();
        assert!(!bridge.is_loaded());

        bridge.dispatch("confetti", Some(&json!([{"preset": "realistic", "options": {}}])));
        bridge.dispatch("confetti", Some(&json!({"preset": "realistic"})));
        assert_eq!(loads.get(), 1);
        assert_eq!(log.len(), 10);
    }

    #[test]
    fn load_failures_are_absorbed_and_retried() {
        let log = ShotLog::new();
        let attempts = Rc::new(Cell::new(0));
        let engine_log = log.clone();
        let counter = attempts.clone();
        let mut bridge = EventBridge::new(lazy_settings(), move || -> Result<FireController> {
            counter.set(counter.get() + 1);
            if counter.get() == 1 {
                Err(ConfettiError::engine_load("network hiccup"))
            } else {
                Ok(FireController::new(engine_log.clone()))
            }
        });
        bridge.install_listener();

        bridge.dispatch("confetti", Some(&json!({"options": {}})));
        assert!(log.is_empty());
        assert!(!bridge.is_loaded());

        bridge.dispatch("confetti", Some(&json!({"options": {}})));
        assert_eq!(attempts.get(), 2);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn malformed_payload_fires_a_default_shot() {
        let log = ShotLog::new();
        let loads = Rc::new(Cell::new(0));
        let mut bridge = EventBridge::new(ConfettiSettings::default(), loader(&log, &loads));
        bridge.install_listener();

        bridge.dispatch("confetti", Some(&json!("party")));
        bridge.dispatch("confetti", None);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn custom_broadcast_event_name() {
        let log = ShotLog::new();
        let loads = Rc::new(Cell::new(0));
        let settings = ConfettiSettings {
            bridge: BridgeConfig {
                broadcast_event: "celebrate".to_string(),
                ..BridgeConfig::default()
            },
            ..ConfettiSettings::default()
        };
        let mut bridge = EventBridge::new(settings, loader(&log, &loads));
        bridge.install_listener();

        bridge.dispatch("confetti", Some(&json!({})));
        assert!(log.is_empty());
        bridge.dispatch("celebrate", Some(&json!({})));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn auto_fire_waits_for_its_delay() {
        let log = ShotLog::new();
        let loads = Rc::new(Cell::new(0));
        let mut bridge = EventBridge::new(lazy_settings(), loader(&log, &loads));

        let component = ConfettiBuilder::new().basic().auto_fire(true).delay(300);
        bridge.mount(ElementId(1), &component);

        assert_eq!(bridge.next_due(), Some(300));
        assert_eq!(run_until(&mut bridge, &log, 1000), vec![300]);
        assert_eq!(loads.get(), 1);
    }

    #[test]
    fn auto_fire_defaults_to_no_delay() {
        let log = ShotLog::new();
        let loads = Rc::new(Cell::new(0));
        let mut bridge = EventBridge::new(ConfettiSettings::default(), loader(&log, &loads));
        bridge.advance_to(40);

        bridge.mount(ElementId(3), &ConfettiBuilder::new().auto_fire(true));
        assert_eq!(run_until(&mut bridge, &log, 100), vec![40]);
    }

    #[test]
    fn auto_fired_sessions_tick_from_their_fire_time() {
        let log = ShotLog::new();
        let loads = Rc::new(Cell::new(0));
        let mut bridge = EventBridge::new(ConfettiSettings::default(), loader(&log, &loads));
        let component = ConfettiBuilder::new()
            .side_cannons(500)
            .auto_fire(true)
            .delay(100);
        bridge.mount(ElementId(1), &component);

        bridge.advance_to(5000);
        assert_eq!(log.len(), 4);

        let log = ShotLog::new();
        let mut bridge = EventBridge::new(ConfettiSettings::default(), loader(&log, &Rc::new(Cell::new(0))));
        bridge.mount(ElementId(1), &component);
        assert_eq!(run_until(&mut bridge, &log, 5000), vec![300, 300, 500, 500]);
    }

    #[test]
    fn trigger_fires_static_config_and_ignores_payload() {
        let log = ShotLog::new();
        let loads = Rc::new(Cell::new(0));
        let mut bridge = EventBridge::new(ConfettiSettings::default(), loader(&log, &loads));
        let component = ConfettiBuilder::new()
            .basic()
            .colors(["#ff0000"])
            .trigger("order-placed");
        bridge.mount(ElementId(9), &component);

        bridge.dispatch("order-placed", Some(&json!({"options": {"colors": ["#000000"]}})));
        bridge.dispatch("something-else", None);

        let shots = log.shots();
        assert_eq!(shots.len(), 1);
        assert_eq!(shots[0].particle_count, 100);
        assert_eq!(shots[0].colors, vec!["#ff0000"]);
    }

    #[test]
    fn unmount_cancels_pending_and_running_effects() {
        let log = ShotLog::new();
        let loads = Rc::new(Cell::new(0));
        let mut bridge = EventBridge::new(ConfettiSettings::default(), loader(&log, &loads));

        bridge.mount(ElementId(1), &ConfettiBuilder::new().snow(5000).trigger("go"));
        bridge.mount(ElementId(2), &ConfettiBuilder::new().auto_fire(true).delay(500));
        bridge.dispatch("go", None);

        assert_eq!(run_until(&mut bridge, &log, 100), vec![50, 100]);
        bridge.unmount(ElementId(1));
        bridge.unmount(ElementId(2));

        assert!(run_until(&mut bridge, &log, 6000).is_empty());
        assert!(bridge.is_idle());
        bridge.dispatch("go", None);
        assert!(log.is_empty());
    }

    #[test]
    fn shutdown_silences_the_page() {
        let log = ShotLog::new();
        let loads = Rc::new(Cell::new(0));
        let mut bridge = EventBridge::new(ConfettiSettings::default(), loader(&log, &loads));
        bridge.install_listener();
        bridge.dispatch("confetti", Some(&json!({"preset": "snow"})));
        bridge.mount(ElementId(4), &ConfettiBuilder::new().auto_fire(true).delay(10));

        bridge.shutdown();
        assert!(run_until(&mut bridge, &log, 1000).is_empty());
        assert_eq!(bridge.listener_count(), 0);
        assert!(bridge.is_idle());
    }

    #[test]
    fn preloaded_engine_is_used_directly() {
        let log = ShotLog::new();
        let mut bridge = EventBridge::with_engine(
            ConfettiSettings::default(),
            FireController::new(log.clone()),
        );
        bridge.install_listener();
        bridge.dispatch("confetti", Some(&json!({"options": {"emoji": "🎈"}})));
        bridge.advance_to(200);

        assert_eq!(log.len(), 9);
    }
}
