use flyswat_core::{
    Personality, SimEvent, SpawnMode, SpawnSettings, SwarmConfig, SwarmObserver, SwarmState, Tick,
    TickReport, TickSummary,
};
use flyswat_geom::{Point2, Rect};
use std::sync::{Arc, Mutex};

fn scripted_config(seed: u64) -> SwarmConfig {
    SwarmConfig {
        rng_seed: Some(seed),
        bounds: Rect::from_size(Point2::new(0.0, 0.0), 800.0, 600.0),
        spawn: SpawnSettings {
            mode: SpawnMode::Auto,
            initial_count: 6,
            max_count: 15,
            interval_seconds: 8.0,
            edge_margin: 24.0,
        },
        ..SwarmConfig::default()
    }
}

/// Drive one swarm through a fixed pointer script and return its final state
/// fingerprint: tick, live count, and every fly position in order.
fn run_scripted(seed: u64, ticks: u32) -> (Tick, usize, Vec<(f32, f32)>) {
    let mut swarm = SwarmState::new(scripted_config(seed)).expect("swarm");
    for step in 0..ticks {
        match step {
            40 => swarm.pointer_pressed(Point2::new(120.0, 90.0)),
            41..=55 => swarm.pointer_dragged(Point2::new(
                120.0 + (step - 40) as f32 * 12.0,
                90.0 + (step - 40) as f32 * 6.0,
            )),
            56 => swarm.pointer_released(),
            120 => swarm.pointer_moved(Point2::new(400.0, 300.0)),
            200 => swarm.pointer_pressed(Point2::new(600.0, 450.0)),
            201..=210 => swarm.pointer_dragged(Point2::new(600.0, 450.0 - (step - 200) as f32 * 20.0)),
            211 => swarm.pointer_released(),
            _ => {}
        }
        swarm.step(1.0 / 60.0);
    }
    let positions = swarm
        .flies()
        .map(|(_, fly)| (fly.position.x, fly.position.y))
        .collect();
    (swarm.tick(), swarm.live_count(), positions)
}

#[test]
fn seeded_swarm_advances_deterministically() {
    let a = run_scripted(0xDEADBEEF, 300);
    let b = run_scripted(0xDEADBEEF, 300);
    assert_eq!(a.0, Tick(300));
    assert_eq!(a, b, "identical seeds and input scripts must replay exactly");
}

#[test]
fn different_seeds_diverge() {
    let a = run_scripted(1, 300);
    let b = run_scripted(2, 300);
    assert_ne!(a.2, b.2, "different seeds should produce different swarms");
}

#[test]
fn drag_release_kills_fly_behind_the_swing() {
    let config = SwarmConfig {
        rng_seed: Some(7),
        bounds: Rect::from_size(Point2::new(-300.0, -300.0), 600.0, 600.0),
        spawn: SpawnSettings {
            mode: SpawnMode::None,
            initial_count: 1,
            max_count: 40,
            interval_seconds: 60.0,
            edge_margin: 24.0,
        },
        ..SwarmConfig::default()
    };
    let mut swarm = SwarmState::new(config).expect("swarm");
    let id = swarm.spawn_fly(Point2::new(50.0, 0.0));

    // Pull straight back from the origin; the swept region covers the fly.
    swarm.pointer_pressed(Point2::new(0.0, 0.0));
    swarm.pointer_dragged(Point2::new(100.0, 0.0));
    let threat = swarm.threat_cone().expect("threat cone while dragging");
    assert!(
        !threat.contains(Point2::new(50.0, 0.0)),
        "during the drag the warning cone points away from the fly"
    );
    swarm.pointer_released();

    let mut kills = 0;
    for _ in 0..30 {
        for event in swarm.step(1.0 / 60.0).events {
            if let SimEvent::StrikeResolved { kills: k, .. } = event {
                kills += k;
            }
        }
    }
    assert_eq!(kills, 1);
    assert!(!swarm.fly(id).expect("fly").alive);
}

#[derive(Default)]
struct SpySink {
    summaries: Vec<TickSummary>,
    events: Vec<SimEvent>,
}

struct SpyObserver {
    sink: Arc<Mutex<SpySink>>,
}

impl SwarmObserver for SpyObserver {
    fn on_tick(&mut self, report: &TickReport<'_>) {
        let Ok(mut sink) = self.sink.lock() else { return };
        sink.summaries.push(report.summary.clone());
        sink.events.extend(report.events.iter().cloned());
    }
}

#[test]
fn observer_receives_every_tick_and_event() {
    let sink = Arc::new(Mutex::new(SpySink::default()));
    let observer = SpyObserver { sink: sink.clone() };
    let config = SwarmConfig {
        rng_seed: Some(11),
        spawn: SpawnSettings {
            mode: SpawnMode::Auto,
            initial_count: 3,
            max_count: 10,
            interval_seconds: 5.0,
            edge_margin: 24.0,
        },
        ..SwarmConfig::default()
    };
    let mut swarm = SwarmState::with_observer(config, Box::new(observer)).expect("swarm");

    for _ in 0..60 {
        swarm.step(1.0 / 60.0);
    }
    swarm.kill_all(false);
    swarm.step(1.0 / 60.0);

    let sink = sink.lock().expect("sink");
    assert_eq!(sink.summaries.len(), 61, "one summary per tick");
    assert_eq!(sink.summaries.last().expect("summary").live, 0);
    let deaths = sink
        .events
        .iter()
        .filter(|event| matches!(event, SimEvent::FlyDied { quiet: false, .. }))
        .count();
    assert_eq!(deaths, 3);
    assert!(
        sink.events
            .iter()
            .any(|event| matches!(event, SimEvent::PopulationCleared)),
        "clearing the swarm must be announced once"
    );
}

#[test]
fn regression_seed_42_matches_baseline() {
    let mut swarm = SwarmState::new(scripted_config(42)).expect("swarm");
    for _ in 0..240 {
        swarm.step(1.0 / 60.0);
    }

    let summaries: Vec<_> = swarm.history().cloned().collect();
    assert!(!summaries.is_empty(), "expected tick summaries");
    let last = summaries.last().expect("latest summary");
    assert_eq!(last.tick, Tick(240));
    assert_eq!(last.live, 6, "no swats, no deaths, no interval elapsed");
    assert_eq!(last.deaths, 0);
    assert_eq!(last.strikes, 0);
    assert!(
        (0.0..=1.0).contains(&last.average_suspicion),
        "suspicion average stays normalized, got {}",
        last.average_suspicion
    );
    assert!(
        (0.0..=1.0).contains(&last.average_agitation),
        "agitation average stays normalized, got {}",
        last.average_agitation
    );
    for (_, fly) in swarm.flies() {
        assert!(fly.position.x.is_finite() && fly.position.y.is_finite());
        assert!(matches!(
            fly.personality,
            Personality::Lazy | Personality::Nervous | Personality::Erratic
        ));
    }
}
