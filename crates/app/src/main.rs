use std::{
    cell::Cell,
    path::PathBuf,
    rc::Rc,
    thread,
    time::{Duration, Instant},
};

use clap::{Args, Parser, Subcommand};
use confetti_core::{
    random, ConfettiBuilder, ConfettiError, ConfettiSettings, ControllerConfig, ElementId,
    EngineLoader, EventBridge, FireConfig, FireController, Millis, Options, PresetName, Renderer,
    ShotParams, TracingRenderer,
};
use tracing_subscriber::EnvFilter;

/// Element that hosts the component mounted for `--delay`.
const DEMO_ELEMENT: ElementId = ElementId(1);

fn main() -> confetti_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fire(request) => run_fire(&request),
        Commands::Plan(request) => run_plan(&request),
    }
}

fn run_fire(request: &FireRequest) -> confetti_core::Result<()> {
    let settings = request.settings()?;
    let config = request.fire_config()?;
    tracing::info!(preset = ?config.preset, "firing in real time");

    let loader = engine_loader(TracingRenderer::new(), request.seed, settings.controller.clone());
    let mut bridge = EventBridge::new(settings, loader);
    request.deliver(&mut bridge, config)?;

    let started = Instant::now();
    loop {
        let elapsed = started.elapsed().as_millis() as Millis;
        bridge.advance_to(elapsed);
        if bridge.is_idle() {
            break;
        }
        let wait = bridge
            .next_due()
            .map(|due| due.saturating_sub(elapsed))
            .unwrap_or(1);
        thread::sleep(Duration::from_millis(wait.max(1)));
    }

    bridge.shutdown();
    tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "effect finished");
    Ok(())
}

fn run_plan(request: &FireRequest) -> confetti_core::Result<()> {
    let settings = request.settings()?;
    let config = request.fire_config()?;

    let clock = Rc::new(Cell::new(0));
    let renderer = {
        let clock = clock.clone();
        move |shot: &ShotParams| print_shot(clock.get(), shot)
    };
    let loader = engine_loader(renderer, request.seed, settings.controller.clone());
    let mut bridge = EventBridge::new(settings, loader);
    request.deliver(&mut bridge, config)?;

    while let Some(due) = bridge.next_due() {
        clock.set(due);
        bridge.advance_to(due);
    }

    bridge.shutdown();
    Ok(())
}

fn print_shot(at: Millis, shot: &ShotParams) {
    let line = serde_json::json!({ "at": at, "shot": shot });
    match serde_json::to_string(&line) {
        Ok(text) => println!("{text}"),
        Err(err) => tracing::warn!(error = %err, "could not serialise shot"),
    }
}

/// Hands out a controller exactly once; later loads report the engine as
/// already taken.
fn engine_loader<R>(renderer: R, seed: Option<u64>, config: ControllerConfig) -> impl EngineLoader
where
    R: Renderer + 'static,
{
    let mut renderer = Some(renderer);
    move || -> confetti_core::Result<FireController> {
        let renderer = renderer
            .take()
            .ok_or_else(|| ConfettiError::engine_load("renderer already in use"))?;
        let random = match seed {
            Some(seed) => random::seeded(seed),
            None => random::entropy(),
        };
        Ok(FireController::with_random(renderer, random).with_config(config.clone()))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Declarative confetti effects", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play an effect in real time, logging every shot.
    Fire(FireRequest),
    /// Simulate an effect instantly and print each shot as a JSON line.
    Plan(FireRequest),
}

#[derive(Args, Debug)]
struct FireRequest {
    /// Named preset to play.
    #[arg(short, long)]
    preset: Option<PresetName>,
    /// Preset options as a JSON object.
    #[arg(short, long)]
    options: Option<String>,
    /// Complete config as JSON; takes precedence over --preset/--options.
    #[arg(short, long, conflicts_with_all = ["preset", "options"])]
    config: Option<String>,
    /// Seed for reproducible randomness.
    #[arg(long)]
    seed: Option<u64>,
    /// JSON settings file for the controller and the bridge.
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Mount an auto-firing component with this delay instead of broadcasting.
    #[arg(long)]
    delay: Option<Millis>,
}

impl FireRequest {
    fn settings(&self) -> confetti_core::Result<ConfettiSettings> {
        match &self.settings {
            Some(path) => ConfettiSettings::from_path(path),
            None => Ok(ConfettiSettings::default()),
        }
    }

    fn fire_config(&self) -> confetti_core::Result<FireConfig> {
        if let Some(text) = &self.config {
            return FireConfig::from_json(text);
        }
        let options = match &self.options {
            Some(text) => {
                let value: serde_json::Value = serde_json::from_str(text)?;
                if !value.is_object() {
                    return Err(ConfettiError::msg("--options must be a JSON object"));
                }
                Options::from_value(&value)
            }
            None => Options::new(),
        };
        Ok(FireConfig::new(self.preset, options))
    }

    fn deliver(&self, bridge: &mut EventBridge, config: FireConfig) -> confetti_core::Result<()> {
        match self.delay {
            Some(delay) => {
                let component = ConfettiBuilder::new()
                    .preset(config.preset)
                    .options(config.options)
                    .auto_fire(true)
                    .delay(delay);
                bridge.mount(DEMO_ELEMENT, &component);
            }
            None => {
                bridge.install_listener();
                let event = bridge.settings().bridge.broadcast_event.clone();
                let payload = serde_json::to_value(&config)?;
                bridge.dispatch(&event, Some(&payload));
            }
        }
        Ok(())
    }
}
