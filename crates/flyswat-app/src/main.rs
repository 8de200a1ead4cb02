use anyhow::Result;
use flyswat_core::{
    SimEvent, SpawnMode, SpawnSettings, SwarmConfig, SwarmObserver, SwarmState, TickReport,
};
use flyswat_geom::{Point2, Rect};
use tracing::{info, warn};

const TICK_SECONDS: f32 = 1.0 / 60.0;
const SCRIPT_SECONDS: u32 = 30;

fn main() -> Result<()> {
    init_tracing();
    let mut swarm = bootstrap_swarm()?;
    info!("Starting FlySwat simulation shell");
    run_script(&mut swarm);
    report(&swarm);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn bootstrap_swarm() -> Result<SwarmState> {
    let config = SwarmConfig {
        bounds: Rect::from_size(Point2::new(0.0, 0.0), 1280.0, 800.0),
        spawn: SpawnSettings {
            mode: SpawnMode::Auto,
            initial_count: 8,
            max_count: 16,
            interval_seconds: 10.0,
            edge_margin: 24.0,
        },
        history_capacity: 600,
        ..SwarmConfig::default()
    };
    let swarm = SwarmState::with_observer(config, Box::new(SummaryLogger::default()))?;
    Ok(swarm)
}

/// Logs one structured summary line per simulated second.
#[derive(Debug, Default)]
struct SummaryLogger {
    ticks_seen: u64,
}

impl SwarmObserver for SummaryLogger {
    fn on_tick(&mut self, report: &TickReport<'_>) {
        self.ticks_seen += 1;
        if self.ticks_seen % 60 == 0 {
            let summary = report.summary;
            info!(
                tick = summary.tick.0,
                live = summary.live,
                decaying = summary.decaying,
                avg_suspicion = summary.average_suspicion,
                avg_agitation = summary.average_agitation,
                "swarm summary",
            );
        }
    }
}

/// Scripted pointer choreography: a slow drag-and-release over the middle of
/// the screen, a hover pass, then a hard pull from a corner.
fn run_script(swarm: &mut SwarmState) {
    let total_ticks = SCRIPT_SECONDS * 60;
    for tick in 0..total_ticks {
        match tick {
            300 => swarm.pointer_pressed(Point2::new(640.0, 400.0)),
            301..=340 => {
                let t = (tick - 300) as f32;
                swarm.pointer_dragged(Point2::new(640.0 + t * 4.0, 400.0 + t * 2.0));
            }
            341 => swarm.pointer_released(),
            600..=660 => {
                let t = (tick - 600) as f32;
                swarm.pointer_moved(Point2::new(200.0 + t * 8.0, 300.0));
            }
            900 => swarm.pointer_pressed(Point2::new(40.0, 40.0)),
            901..=930 => {
                let t = (tick - 900) as f32;
                swarm.pointer_dragged(Point2::new(40.0 + t * 14.0, 40.0 + t * 10.0));
            }
            931 => swarm.pointer_released(),
            _ => {}
        }
        for event in swarm.step(TICK_SECONDS).events {
            log_event(&event);
        }
    }
}

fn log_event(event: &SimEvent) {
    match event {
        SimEvent::FlySpawned { id, position } => {
            info!(?id, x = position.x, y = position.y, "fly spawned");
        }
        SimEvent::StrikeResolved { position, kills } => {
            info!(x = position.x, y = position.y, kills, "strike resolved");
        }
        SimEvent::FlyDied { id, quiet, .. } => {
            info!(?id, quiet, "fly died");
        }
        SimEvent::PopulationCleared => {
            info!("population cleared");
        }
    }
}

fn report(swarm: &SwarmState) {
    if let Some(summary) = swarm.history().last() {
        info!(
            tick = summary.tick.0,
            live = summary.live,
            deaths = summary.deaths,
            strikes = summary.strikes,
            "Script complete",
        );
    } else {
        warn!("Script completed without tick summaries");
    }
}
