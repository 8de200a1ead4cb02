//! Core simulation types for the FlySwat workspace: the fly behavior state
//! machine, the swatter threat-cone controller, suspicion scoring, and the
//! swarm tick pipeline that couples them.

use flyswat_geom::{Point2, Rect, ThreatCone, Vec2};
use rand::{Rng, RngCore, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::f32::consts::{PI, TAU};
use thiserror::Error;
use tracing::debug;

new_key_type! {
    /// Stable handle for flies backed by a generational slot map.
    pub struct FlyId;
}

fn clamp01(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// High level simulation clock (ticks processed since boot).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Errors that can occur when constructing swarm state.
#[derive(Debug, Error)]
pub enum SwarmConfigError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Spawn policy mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SpawnMode {
    /// Population changes only through explicit calls.
    None,
    /// A fixed-interval timer tops the population up toward the cap.
    #[default]
    Auto,
}

/// Spawn policy configuration supplied by collaborators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SpawnSettings {
    pub mode: SpawnMode,
    /// Population seeded immediately and restored on settings changes.
    pub initial_count: u32,
    /// Hard population cap for automatic spawning.
    pub max_count: u32,
    /// Seconds between automatic spawn attempts.
    pub interval_seconds: f32,
    /// Inset from the screen edge for automatic spawn positions.
    pub edge_margin: f32,
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self {
            mode: SpawnMode::Auto,
            initial_count: 5,
            max_count: 12,
            interval_seconds: 20.0,
            edge_margin: 24.0,
        }
    }
}

impl SpawnSettings {
    /// Validate the collaborator-facing bounds: counts in [1, 40], interval
    /// in [1, 300] seconds.
    pub fn validate(&self) -> Result<(), SwarmConfigError> {
        if !(1..=40).contains(&self.initial_count) || !(1..=40).contains(&self.max_count) {
            return Err(SwarmConfigError::InvalidConfig(
                "spawn counts must be between 1 and 40",
            ));
        }
        if self.initial_count > self.max_count {
            return Err(SwarmConfigError::InvalidConfig(
                "initial_count cannot exceed max_count",
            ));
        }
        if !(1.0..=300.0).contains(&self.interval_seconds) {
            return Err(SwarmConfigError::InvalidConfig(
                "interval_seconds must be between 1 and 300",
            ));
        }
        if self.edge_margin < 0.0 {
            return Err(SwarmConfigError::InvalidConfig(
                "edge_margin must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Agitation dynamics: geometric decay, stochastic spikes, scare jumps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AgitationConfig {
    /// Per-tick geometric decay factor.
    pub decay_factor: f32,
    /// Poisson-style spike probability per second.
    pub spike_chance: f32,
    pub spike_min: f32,
    pub spike_max: f32,
    /// Agitation added when a fly is scared.
    pub scare_boost: f32,
}

impl Default for AgitationConfig {
    fn default() -> Self {
        Self {
            decay_factor: 0.995,
            spike_chance: 0.10,
            spike_min: 0.08,
            spike_max: 0.30,
            scare_boost: 0.45,
        }
    }
}

/// Tuning for the pure suspicion scoring model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SuspicionConfig {
    /// Decay per second with no active cone.
    pub passive_decay: f32,
    /// Decay per second while outside an active cone.
    pub active_decay: f32,
    pub proximity_weight: f32,
    pub stretch_weight: f32,
    /// Cone stretch multipliers mapped linearly onto [0, 1].
    pub stretch_range: (f32, f32),
    pub build_multiplier: f32,
    /// Per-recent-swat amplification of the build rate.
    pub swat_impact: f32,
    /// Seconds before an unsuspicious fly notices a released swat.
    pub base_notice_time: f32,
    /// Fractional notice-time reduction at full suspicion.
    pub notice_reduction: f32,
    /// Minimum seconds between cone-triggered flees per fly.
    pub flee_cooldown: f32,
}

impl Default for SuspicionConfig {
    fn default() -> Self {
        Self {
            passive_decay: 0.08,
            active_decay: 0.25,
            proximity_weight: 0.65,
            stretch_weight: 0.35,
            stretch_range: (1.0, 3.0),
            build_multiplier: 0.9,
            swat_impact: 0.35,
            base_notice_time: 0.9,
            notice_reduction: 0.8,
            flee_cooldown: 1.5,
        }
    }
}

/// Swatter drag and strike tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SwatterConfig {
    pub min_radius: f32,
    pub max_radius: f32,
    /// Sub-linear exponent applied to drag distance when deriving the radius.
    pub radius_exponent: f32,
    /// Total cone arc in radians.
    pub arc_angle: f32,
    /// Pixels of over-drag that read as one unit of stretch.
    pub stretch_scale: f32,
    /// Base 180-degree swing time; harder pulls swing faster.
    pub swing_duration: f32,
    pub swing_speed_boost: f32,
    /// Fraction of the swing after which the strike resolves.
    pub strike_delay_fraction: f32,
    pub fade_duration: f32,
    /// Half-life of the recent-swat pressure counter, seconds.
    pub swat_half_life: f32,
    pub max_recent_swats: f32,
}

impl Default for SwatterConfig {
    fn default() -> Self {
        Self {
            min_radius: 60.0,
            max_radius: 220.0,
            radius_exponent: 0.85,
            arc_angle: 1.15,
            stretch_scale: 80.0,
            swing_duration: 0.30,
            swing_speed_boost: 1.5,
            strike_delay_fraction: 0.45,
            fade_duration: 0.35,
            swat_half_life: 4.0,
            max_recent_swats: 6.0,
        }
    }
}

/// Movement and target-selection tuning shared by every personality.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BehaviorConfig {
    /// Distance to the flight target that counts as arrival.
    pub approach_threshold: f32,
    /// Flight progress past which arrival is forced.
    pub overshoot_limit: f32,
    pub max_flight_speed: f32,
    /// Chance a normal flight tries to cluster near another fly.
    pub cluster_chance: f32,
    pub cluster_radius: f32,
    /// Minimum distance for uniformly sampled targets.
    pub target_min_distance: f32,
    pub target_attempts: u32,
    /// Flee distance as a fraction of the screen diagonal.
    pub flee_distance_min: f32,
    pub flee_distance_max: f32,
    /// Escape rectangle margin outside the render bounds.
    pub escape_margin: f32,
    /// Inset of the rectangle return flights target.
    pub safe_margin: f32,
    /// Inset of the rectangle outside which the soft nudge applies.
    pub soft_margin: f32,
    /// Acceleration of the soft inward nudge, px/s^2.
    pub soft_nudge: f32,
    /// Fraction of the bounds annotated flies keep to.
    pub annotation_box_fraction: f32,
    /// Gain pulling a circling fly toward its orbit point.
    pub circling_pull: f32,
    /// Per-tick hover velocity damping.
    pub hover_damping: f32,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            approach_threshold: 12.0,
            overshoot_limit: 1.15,
            max_flight_speed: 900.0,
            cluster_chance: 0.35,
            cluster_radius: 90.0,
            target_min_distance: 60.0,
            target_attempts: 8,
            flee_distance_min: 0.10,
            flee_distance_max: 0.30,
            escape_margin: 120.0,
            safe_margin: 40.0,
            soft_margin: 16.0,
            soft_nudge: 180.0,
            annotation_box_fraction: 0.35,
            circling_pull: 4.0,
            hover_damping: 0.985,
        }
    }
}

/// Strike hit-testing and proximity-scare tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StrikeConfig {
    /// Half extent of the axis-aligned hitbox around a fly's position.
    pub hitbox_half_extent: f32,
    /// Pointer distance that scares a fly.
    pub scare_radius: f32,
}

impl Default for StrikeConfig {
    fn default() -> Self {
        Self {
            hitbox_half_extent: 14.0,
            scare_radius: 48.0,
        }
    }
}

/// Death splatter tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GoopConfig {
    pub particles_min: usize,
    pub particles_max: usize,
    /// Seconds over which a particle fades out.
    pub fade_seconds: f32,
    /// Per-tick geometric velocity damping.
    pub damping: f32,
    pub burst_speed: f32,
    pub size_min: f32,
    pub size_max: f32,
}

impl Default for GoopConfig {
    fn default() -> Self {
        Self {
            particles_min: 4,
            particles_max: 7,
            fade_seconds: 6.0,
            damping: 0.92,
            burst_speed: 120.0,
            size_min: 2.0,
            size_max: 6.0,
        }
    }
}

/// Static configuration for a fly swarm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwarmConfig {
    /// Optional RNG seed for reproducible swarms.
    pub rng_seed: Option<u64>,
    /// Initial render bounds; collaborators refresh these each tick.
    pub bounds: Rect,
    pub spawn: SpawnSettings,
    pub agitation: AgitationConfig,
    pub suspicion: SuspicionConfig,
    pub swatter: SwatterConfig,
    pub behavior: BehaviorConfig,
    pub strike: StrikeConfig,
    pub goop: GoopConfig,
    /// Maximum number of recent tick summaries retained in-memory.
    pub history_capacity: usize,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            rng_seed: None,
            bounds: Rect::from_size(Point2::new(0.0, 0.0), 1280.0, 800.0),
            spawn: SpawnSettings::default(),
            agitation: AgitationConfig::default(),
            suspicion: SuspicionConfig::default(),
            swatter: SwatterConfig::default(),
            behavior: BehaviorConfig::default(),
            strike: StrikeConfig::default(),
            goop: GoopConfig::default(),
            history_capacity: 256,
        }
    }
}

impl SwarmConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), SwarmConfigError> {
        if self.bounds.width() <= 0.0 || self.bounds.height() <= 0.0 {
            return Err(SwarmConfigError::InvalidConfig(
                "render bounds must have positive extent",
            ));
        }
        self.spawn.validate()?;
        let agitation = &self.agitation;
        if !(0.0..=1.0).contains(&agitation.decay_factor)
            || agitation.spike_chance < 0.0
            || agitation.spike_min < 0.0
            || agitation.spike_max <= agitation.spike_min
            || agitation.scare_boost < 0.0
        {
            return Err(SwarmConfigError::InvalidConfig(
                "agitation decay must be in [0, 1], spike range ascending, rates non-negative",
            ));
        }
        let swatter = &self.swatter;
        if swatter.min_radius <= 0.0 || swatter.max_radius <= swatter.min_radius {
            return Err(SwarmConfigError::InvalidConfig(
                "swatter radii must satisfy 0 < min < max",
            ));
        }
        if swatter.radius_exponent <= 0.0
            || swatter.stretch_scale <= 0.0
            || swatter.swing_duration <= 0.0
            || swatter.fade_duration <= 0.0
            || swatter.swat_half_life <= 0.0
            || !(0.0..=1.0).contains(&swatter.strike_delay_fraction)
            || !(swatter.arc_angle > 0.0 && swatter.arc_angle <= TAU)
        {
            return Err(SwarmConfigError::InvalidConfig(
                "swatter timings must be positive, arc in (0, 2pi], delay fraction in [0, 1]",
            ));
        }
        let suspicion = &self.suspicion;
        if suspicion.passive_decay < 0.0
            || suspicion.active_decay < 0.0
            || suspicion.proximity_weight < 0.0
            || suspicion.stretch_weight < 0.0
            || suspicion.build_multiplier < 0.0
            || suspicion.swat_impact < 0.0
            || suspicion.base_notice_time < 0.0
            || suspicion.flee_cooldown <= 0.0
            || suspicion.stretch_range.1 <= suspicion.stretch_range.0
        {
            return Err(SwarmConfigError::InvalidConfig(
                "suspicion rates must be non-negative, cooldown positive, stretch range ascending",
            ));
        }
        let behavior = &self.behavior;
        if behavior.approach_threshold <= 0.0
            || behavior.overshoot_limit <= 1.0
            || behavior.max_flight_speed <= 0.0
            || !(0.0..=1.0).contains(&behavior.cluster_chance)
            || behavior.cluster_radius <= 0.0
            || behavior.target_attempts == 0
            || behavior.flee_distance_min <= 0.0
            || behavior.flee_distance_max <= behavior.flee_distance_min
        {
            return Err(SwarmConfigError::InvalidConfig(
                "behavior thresholds must be positive, overshoot > 1, flee range ascending",
            ));
        }
        if self.strike.hitbox_half_extent <= 0.0 || self.strike.scare_radius <= 0.0 {
            return Err(SwarmConfigError::InvalidConfig(
                "strike hitbox and scare radius must be positive",
            ));
        }
        let goop = &self.goop;
        if goop.particles_min == 0
            || goop.particles_max < goop.particles_min
            || goop.fade_seconds <= 0.0
            || !(0.0..=1.0).contains(&goop.damping)
            || goop.burst_speed <= 0.0
            || goop.size_max < goop.size_min
        {
            return Err(SwarmConfigError::InvalidConfig(
                "goop particle counts, fade window, burst speed, and sizes must be well-formed",
            ));
        }
        if self.history_capacity == 0 {
            return Err(SwarmConfigError::InvalidConfig(
                "history_capacity must be non-zero",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG, seeding from entropy if no seed is set.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

/// Inclusive sampling range for a personality trait.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TraitRange {
    pub min: f32,
    pub max: f32,
}

impl TraitRange {
    /// Construct a new range.
    #[must_use]
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Sample a value from the range.
    #[must_use]
    pub fn sample(&self, rng: &mut dyn RngCore) -> f32 {
        if self.max > self.min {
            rng.random_range(self.min..self.max)
        } else {
            self.min
        }
    }
}

/// Fixed movement-noise and timing bundle owned by a personality.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PersonalityTraits {
    pub jitter_intensity: f32,
    pub jitter_interval: f32,
    /// Per-second chance of an extra hover impulse kick.
    pub kick_chance: f32,
    pub hover_speed_cap: f32,
    pub stutter_frequency: f32,
    pub stutter_intensity: f32,
    pub arc_height: TraitRange,
    pub flight_duration: TraitRange,
    pub circle_radius: TraitRange,
    pub circle_speed: TraitRange,
    pub settle_time: TraitRange,
    pub hover_duration: TraitRange,
    pub circle_dwell: TraitRange,
    pub wobble_amplitude: f32,
    pub wobble_frequency: f32,
    /// Per-axis chaotic offset amplitude; zero disables the term.
    pub direction_chaos: f32,
    /// Lower agitation bound at which this personality takes over.
    pub agitation_lower: f32,
}

/// Trait bundle for unhurried flies.
pub const LAZY_TRAITS: PersonalityTraits = PersonalityTraits {
    jitter_intensity: 18.0,
    jitter_interval: 0.50,
    kick_chance: 0.04,
    hover_speed_cap: 40.0,
    stutter_frequency: 6.0,
    stutter_intensity: 2.0,
    arc_height: TraitRange::new(10.0, 28.0),
    flight_duration: TraitRange::new(1.6, 2.6),
    circle_radius: TraitRange::new(18.0, 34.0),
    circle_speed: TraitRange::new(1.2, 2.2),
    settle_time: TraitRange::new(0.5, 0.9),
    hover_duration: TraitRange::new(2.5, 5.0),
    circle_dwell: TraitRange::new(1.5, 3.5),
    wobble_amplitude: 3.0,
    wobble_frequency: 1.2,
    direction_chaos: 0.0,
    agitation_lower: 0.0,
};

/// Trait bundle for skittish flies.
pub const NERVOUS_TRAITS: PersonalityTraits = PersonalityTraits {
    jitter_intensity: 34.0,
    jitter_interval: 0.22,
    kick_chance: 0.12,
    hover_speed_cap: 70.0,
    stutter_frequency: 11.0,
    stutter_intensity: 5.0,
    arc_height: TraitRange::new(18.0, 44.0),
    flight_duration: TraitRange::new(0.9, 1.7),
    circle_radius: TraitRange::new(26.0, 48.0),
    circle_speed: TraitRange::new(2.4, 4.2),
    settle_time: TraitRange::new(0.3, 0.6),
    hover_duration: TraitRange::new(1.2, 2.8),
    circle_dwell: TraitRange::new(0.8, 2.0),
    wobble_amplitude: 6.0,
    wobble_frequency: 2.4,
    direction_chaos: 0.0,
    agitation_lower: 0.30,
};

/// Trait bundle for frantic flies; the only one with directional chaos.
pub const ERRATIC_TRAITS: PersonalityTraits = PersonalityTraits {
    jitter_intensity: 55.0,
    jitter_interval: 0.12,
    kick_chance: 0.22,
    hover_speed_cap: 110.0,
    stutter_frequency: 17.0,
    stutter_intensity: 9.0,
    arc_height: TraitRange::new(26.0, 60.0),
    flight_duration: TraitRange::new(0.55, 1.1),
    circle_radius: TraitRange::new(30.0, 64.0),
    circle_speed: TraitRange::new(3.5, 6.5),
    settle_time: TraitRange::new(0.15, 0.4),
    hover_duration: TraitRange::new(0.6, 1.6),
    circle_dwell: TraitRange::new(0.5, 1.4),
    wobble_amplitude: 9.0,
    wobble_frequency: 3.6,
    direction_chaos: 26.0,
    agitation_lower: 0.75,
};

/// Personality classes derived from the current agitation level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Personality {
    #[default]
    Lazy,
    Nervous,
    Erratic,
}

impl Personality {
    /// Classify agitation against the trait bundles' lower bounds.
    #[must_use]
    pub fn classify(agitation: f32) -> Self {
        if agitation >= ERRATIC_TRAITS.agitation_lower {
            Self::Erratic
        } else if agitation >= NERVOUS_TRAITS.agitation_lower {
            Self::Nervous
        } else {
            Self::Lazy
        }
    }

    /// The fixed trait bundle for this personality.
    #[must_use]
    pub const fn traits(self) -> &'static PersonalityTraits {
        match self {
            Self::Lazy => &LAZY_TRAITS,
            Self::Nervous => &NERVOUS_TRAITS,
            Self::Erratic => &ERRATIC_TRAITS,
        }
    }
}

/// One splatter particle left behind at a death position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoopParticle {
    pub position: Point2,
    pub velocity: Vec2,
    pub size: f32,
    pub age: f32,
}

/// Per-fly threat-awareness accumulator mutated by the suspicion model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuspicionState {
    /// Awareness in [0, 1]; 1.0 triggers a flee.
    pub level: f32,
    pub time_in_cone: f32,
    pub last_flee_at: f64,
    /// Swing stamp of the release this fly has already reacted to.
    pub noticed_stamp: Option<u64>,
}

impl Default for SuspicionState {
    fn default() -> Self {
        Self {
            level: 0.0,
            time_in_cone: 0.0,
            last_flee_at: f64::NEG_INFINITY,
            noticed_stamp: None,
        }
    }
}

/// Most recent swat release, tagged with its swing stamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReleaseInfo {
    pub at: f64,
    pub stamp: u64,
}

/// Threat context handed to the suspicion model each tick.
#[derive(Debug, Clone, Copy)]
pub struct ThreatSample<'a> {
    pub cone: Option<&'a ThreatCone>,
    pub release: Option<ReleaseInfo>,
    pub recent_swats: f32,
}

/// Outcome of one suspicion evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspicionVerdict {
    Calm,
    Flee,
}

impl SuspicionConfig {
    /// Score one fly against the active threat for this tick. Pure except for
    /// the accumulator writes into `state`.
    pub fn evaluate(
        &self,
        state: &mut SuspicionState,
        position: Point2,
        sample: ThreatSample<'_>,
        now: f64,
        dt: f32,
    ) -> SuspicionVerdict {
        let Some(cone) = sample.cone else {
            state.level = clamp01(state.level - self.passive_decay * dt);
            state.time_in_cone = 0.0;
            return SuspicionVerdict::Calm;
        };
        if !cone.contains(position) {
            state.level = clamp01(state.level - self.active_decay * dt);
            state.time_in_cone = 0.0;
            return SuspicionVerdict::Calm;
        }

        if let Some(release) = sample.release {
            if state.noticed_stamp != Some(release.stamp) {
                // Suspicious flies notice faster; the delay floors at zero
                // rather than going retroactively negative.
                let delay = (self.base_notice_time
                    * (1.0 - state.level * self.notice_reduction))
                    .max(0.0);
                if now - release.at >= f64::from(delay) {
                    state.noticed_stamp = Some(release.stamp);
                    if now - state.last_flee_at >= f64::from(self.flee_cooldown) {
                        state.last_flee_at = now;
                        return SuspicionVerdict::Flee;
                    }
                }
            }
        }

        state.time_in_cone += dt;
        let proximity = (1.0 - cone.origin().distance(position) / cone.radius()).max(0.0);
        let (low, high) = self.stretch_range;
        let stretch_factor = ((cone.stretch() - low) / (high - low)).clamp(0.0, 1.0);
        let pressure = 1.0 + sample.recent_swats * self.swat_impact;
        let build = (proximity * self.proximity_weight + stretch_factor * self.stretch_weight)
            * pressure
            * self.build_multiplier;
        state.level = clamp01(state.level + build * dt);

        if state.level >= 1.0 && now - state.last_flee_at >= f64::from(self.flee_cooldown) {
            state.last_flee_at = now;
            return SuspicionVerdict::Flee;
        }
        SuspicionVerdict::Calm
    }
}

/// In-progress flight from a start point toward a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightPlan {
    pub start: Point2,
    pub target: Point2,
    pub duration: f32,
    pub elapsed: f32,
    pub arc_height: f32,
    pub stutter_phase: f32,
    pub wobble_phase: f32,
    pub chaos_phase: (f32, f32),
    /// Escape flight triggered by a scare or cone flee.
    pub fleeing: bool,
    /// Forced return flight after leaving the escape rectangle.
    pub returning: bool,
}

/// Orbit around a fixed point with smooth velocity settling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CirclePlan {
    pub center: Point2,
    pub radius: f32,
    pub angular_speed: f32,
    pub angle: f32,
    pub settle_total: f32,
    pub settle_remaining: f32,
    pub dwell_remaining: f32,
}

/// Behavior state machine: Hovering -> Flying -> Circling -> Hovering, with
/// scare and escape overrides jumping straight to Flying.
#[derive(Debug, Clone, PartialEq)]
pub enum FlyBehavior {
    Hovering { remaining: f32, jitter_timer: f32 },
    Flying(FlightPlan),
    Circling(CirclePlan),
}

/// Discriminant of [`FlyBehavior`] for views and assertions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BehaviorKind {
    Hovering,
    Flying,
    Circling,
}

impl FlyBehavior {
    /// Current state discriminant.
    #[must_use]
    pub const fn kind(&self) -> BehaviorKind {
        match self {
            Self::Hovering { .. } => BehaviorKind::Hovering,
            Self::Flying(_) => BehaviorKind::Flying,
            Self::Circling(_) => BehaviorKind::Circling,
        }
    }
}

/// One autonomous fly.
#[derive(Debug, Clone, PartialEq)]
pub struct Fly {
    pub position: Point2,
    pub velocity: Vec2,
    pub alive: bool,
    pub agitation: f32,
    pub personality: Personality,
    pub suspicion: SuspicionState,
    pub behavior: FlyBehavior,
    pub goop: SmallVec<[GoopParticle; 8]>,
    pub annotation: Option<String>,
}

impl Fly {
    /// Spawn a fresh fly at `position` with randomized agitation and timers.
    pub fn spawn(position: Point2, rng: &mut dyn RngCore) -> Self {
        let agitation = rng.random_range(0.0..0.35);
        let personality = Personality::classify(agitation);
        let traits = personality.traits();
        Self {
            position,
            velocity: Vec2::zero(),
            alive: true,
            agitation,
            personality,
            suspicion: SuspicionState::default(),
            behavior: FlyBehavior::Hovering {
                remaining: traits.hover_duration.sample(rng),
                jitter_timer: traits.jitter_interval,
            },
            goop: SmallVec::new(),
            annotation: None,
        }
    }

    /// Rendered heading, derived solely from the current velocity.
    #[must_use]
    pub fn heading(&self) -> f32 {
        if self.velocity.length_squared() > 0.0 {
            self.velocity.heading()
        } else {
            0.0
        }
    }
}

/// Snapshot of one goop particle for collaborators.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct GoopView {
    pub position: Point2,
    pub size: f32,
    pub opacity: f32,
}

/// Snapshot of one fly for collaborators (renderer, audio).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FlyView {
    pub id: FlyId,
    pub position: Point2,
    pub rotation: f32,
    pub alive: bool,
    pub suspicion: f32,
    pub agitation: f32,
    pub personality: Personality,
    pub behavior: BehaviorKind,
    pub goop: Vec<GoopView>,
    pub annotation: Option<String>,
}

/// Discrete simulation events emitted from the tick pipeline.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum SimEvent {
    FlySpawned { id: FlyId, position: Point2 },
    StrikeResolved { position: Point2, kills: usize },
    FlyDied { id: FlyId, position: Point2, quiet: bool },
    PopulationCleared,
}

/// Events emitted after processing a swarm tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickEvents {
    pub tick: Tick,
    pub events: Vec<SimEvent>,
}

/// Aggregate statistics sampled at the end of each tick.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TickSummary {
    pub tick: Tick,
    pub live: usize,
    /// Dead flies still decaying goop.
    pub decaying: usize,
    pub deaths: usize,
    pub strikes: usize,
    pub average_suspicion: f32,
    pub average_agitation: f32,
}

/// Per-tick payload forwarded to observers.
#[derive(Debug, Clone, Copy)]
pub struct TickReport<'a> {
    pub summary: &'a TickSummary,
    pub events: &'a [SimEvent],
}

/// Observer sink invoked after each tick.
pub trait SwarmObserver: Send {
    fn on_tick(&mut self, report: &TickReport<'_>);
}

/// No-op observer sink.
#[derive(Debug, Default)]
pub struct NullObserver;

impl SwarmObserver for NullObserver {
    fn on_tick(&mut self, _report: &TickReport<'_>) {}
}

/// Typed one-shot actions deferred to a later point on the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScheduledAction {
    ResolveStrike { stamp: u64 },
    FinishSwing { stamp: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    due: f64,
    action: ScheduledAction,
}

/// Deadline store for time-deferred one-shot effects. Actions carry the swing
/// stamp they were scheduled for; firing against a stale stamp is a no-op at
/// the call site, so cancellation is just letting an entry expire.
#[derive(Debug, Default)]
struct Scheduler {
    entries: Vec<Scheduled>,
}

impl Scheduler {
    fn schedule(&mut self, due: f64, action: ScheduledAction) {
        self.entries.push(Scheduled { due, action });
    }

    /// Remove and return all due actions, earliest first.
    fn drain_due(&mut self, now: f64) -> Vec<ScheduledAction> {
        let mut due: Vec<Scheduled> = Vec::new();
        self.entries.retain(|entry| {
            if entry.due <= now {
                due.push(*entry);
                false
            } else {
                true
            }
        });
        due.sort_by(|a, b| a.due.partial_cmp(&b.due).unwrap_or(std::cmp::Ordering::Equal));
        due.into_iter().map(|entry| entry.action).collect()
    }

    fn pending(&self) -> usize {
        self.entries.len()
    }
}

/// Post-release swing animation state; ephemeral between release and fade-out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingState {
    /// Visible cone captured at release, pointing along the drag.
    pub cone: ThreatCone,
    /// Rotation swept so far, up to pi.
    pub rotation: f32,
    pub opacity: f32,
    pub stretch: f32,
    pub stretch_intensity: f32,
    /// Stretch-scaled 180-degree swing time.
    pub swing_time: f32,
    pub fade_remaining: f32,
    pub rotating: bool,
    pub stamp: u64,
}

/// Deferred work orders produced by a drag release.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingCommand {
    pub stamp: u64,
    pub strike_at: f64,
    pub finish_at: f64,
}

/// Owns drag-interaction state and derives the live, mirrored, and strike
/// cones from pointer input.
#[derive(Debug)]
pub struct SwatterController {
    config: SwatterConfig,
    dragging: bool,
    origin: Point2,
    drag_vector: Vec2,
    radius: f32,
    stretch_px: f32,
    stretch_intensity: f32,
    recent_swats: f32,
    recent_updated: f64,
    last_release: Option<ReleaseInfo>,
    strike_cone: Option<ThreatCone>,
    swing: Option<SwingState>,
    swing_stamp: u64,
}

impl SwatterController {
    /// Construct an idle controller.
    #[must_use]
    pub fn new(config: SwatterConfig) -> Self {
        Self {
            radius: config.min_radius,
            config,
            dragging: false,
            origin: Point2::default(),
            drag_vector: Vec2::zero(),
            stretch_px: 0.0,
            stretch_intensity: 0.0,
            recent_swats: 0.0,
            recent_updated: 0.0,
            last_release: None,
            strike_cone: None,
            swing: None,
            swing_stamp: 0,
        }
    }

    /// Begin a drag, implicitly cancelling any in-flight strike or swing.
    pub fn start_drag(&mut self, origin: Point2, now: f64) {
        self.decay_recent(now);
        self.dragging = true;
        self.origin = origin;
        self.drag_vector = Vec2::zero();
        self.radius = self.config.min_radius;
        self.stretch_px = 0.0;
        self.stretch_intensity = 0.0;
        self.swing_stamp += 1;
        self.swing = None;
        self.strike_cone = None;
        self.last_release = None;
    }

    /// Update the drag vector and the derived radius/stretch scalars.
    pub fn update_drag(&mut self, point: Point2) {
        if !self.dragging {
            return;
        }
        self.drag_vector = self.origin.vector_to(point);
        let distance = self.drag_vector.length();
        let raw = self.config.min_radius + distance.powf(self.config.radius_exponent);
        self.radius = raw.clamp(self.config.min_radius, self.config.max_radius);
        self.stretch_px = (raw - self.config.max_radius).max(0.0);
        self.stretch_intensity =
            (2.0 / PI) * (self.stretch_px / self.config.stretch_scale).atan();
    }

    /// Release the drag, capturing the final cones and scheduling orders for
    /// the delayed strike and swing finish. Returns `None` for a degenerate
    /// (zero-length) drag.
    pub fn end_drag(&mut self, now: f64) -> Option<SwingCommand> {
        if !self.dragging {
            return None;
        }
        self.dragging = false;
        let visible = self.derived_cone()?;
        let mirrored = visible.mirrored();
        // The swing carries the swatter through to the drag endpoint; the
        // lethal volume points back along the swept path.
        let strike = mirrored.translated(self.drag_vector);
        self.swing_stamp += 1;
        let stamp = self.swing_stamp;
        let swing_time = self.config.swing_duration
            / (1.0 + self.stretch_intensity * self.config.swing_speed_boost);
        self.strike_cone = Some(strike);
        self.last_release = Some(ReleaseInfo { at: now, stamp });
        self.swing = Some(SwingState {
            cone: visible,
            rotation: 0.0,
            opacity: 1.0,
            stretch: self.stretch_multiplier(),
            stretch_intensity: self.stretch_intensity,
            swing_time,
            fade_remaining: self.config.fade_duration,
            rotating: true,
            stamp,
        });
        Some(SwingCommand {
            stamp,
            strike_at: now + f64::from(swing_time * self.config.strike_delay_fraction),
            finish_at: now + f64::from(swing_time + self.config.fade_duration),
        })
    }

    /// Advance the rotate-then-fade swing animation.
    pub fn tick(&mut self, dt: f32) {
        let fade_duration = self.config.fade_duration;
        if let Some(swing) = &mut self.swing {
            if swing.rotating {
                swing.rotation += (PI / swing.swing_time) * dt;
                if swing.rotation >= PI {
                    swing.rotation = PI;
                    swing.rotating = false;
                }
            } else {
                swing.fade_remaining = (swing.fade_remaining - dt).max(0.0);
                swing.opacity = swing.fade_remaining / fade_duration;
            }
        }
    }

    /// Hand out the strike cone for `stamp`, or `None` when the order is
    /// stale (a newer drag started) or the cone was already cleared.
    pub fn strike_for(&mut self, stamp: u64) -> Option<ThreatCone> {
        if stamp == self.swing_stamp {
            self.strike_cone
        } else {
            None
        }
    }

    /// Finalize the swing for `stamp`; a stale stamp is a no-op.
    pub fn finish_swing(&mut self, stamp: u64) -> bool {
        if self.swing.as_ref().is_some_and(|swing| swing.stamp == stamp) {
            self.swing = None;
            self.strike_cone = None;
            self.last_release = None;
            true
        } else {
            false
        }
    }

    /// Record a resolved strike into the decayed pressure counter.
    pub fn record_strike(&mut self, now: f64) {
        self.decay_recent(now);
        self.recent_swats = (self.recent_swats + 1.0).min(self.config.max_recent_swats);
    }

    fn decay_recent(&mut self, now: f64) {
        let elapsed = (now - self.recent_updated).max(0.0) as f32;
        if elapsed > 0.0 && self.recent_swats > 0.0 {
            self.recent_swats *= 0.5_f32.powf(elapsed / self.config.swat_half_life);
        }
        self.recent_updated = now;
    }

    fn stretch_multiplier(&self) -> f32 {
        1.0 + self.stretch_px / self.config.stretch_scale
    }

    fn derived_cone(&self) -> Option<ThreatCone> {
        ThreatCone::new(
            self.origin,
            self.drag_vector,
            self.radius,
            self.config.arc_angle,
            self.stretch_multiplier(),
        )
    }

    /// Cone pointing along the drag, only while dragging.
    #[must_use]
    pub fn dragged_cone(&self) -> Option<ThreatCone> {
        if self.dragging {
            self.derived_cone()
        } else {
            None
        }
    }

    /// 180-degree mirror of the dragged cone, only while dragging.
    #[must_use]
    pub fn mirrored_cone(&self) -> Option<ThreatCone> {
        self.dragged_cone().map(|cone| cone.mirrored())
    }

    /// The single cone flies consult: mirrored while dragging, the saved
    /// strike cone during the post-release animation, else none.
    #[must_use]
    pub fn active_threat_cone(&self) -> Option<ThreatCone> {
        if self.dragging {
            self.mirrored_cone()
        } else {
            self.strike_cone
        }
    }

    /// Most recent release, while its swing is still in flight.
    #[must_use]
    pub const fn last_release(&self) -> Option<ReleaseInfo> {
        self.last_release
    }

    /// Current decayed recent-swat pressure.
    #[must_use]
    pub const fn recent_swats(&self) -> f32 {
        self.recent_swats
    }

    /// Whether a drag is in progress.
    #[must_use]
    pub const fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Current smooth stretch intensity in [0, 1).
    #[must_use]
    pub const fn stretch_intensity(&self) -> f32 {
        self.stretch_intensity
    }

    /// Current derived reach.
    #[must_use]
    pub const fn radius(&self) -> f32 {
        self.radius
    }

    /// Swing animation state, when one is in flight.
    #[must_use]
    pub const fn swing(&self) -> Option<&SwingState> {
        self.swing.as_ref()
    }
}

/// Fly store with generational handles and stable insertion-order iteration.
#[derive(Debug, Default)]
pub struct FlyArena {
    slots: SlotMap<FlyId, Fly>,
    order: Vec<FlyId>,
}

impl FlyArena {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored flies, dead-and-decaying included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true when no flies are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns true if `id` refers to a stored fly.
    #[must_use]
    pub fn contains(&self, id: FlyId) -> bool {
        self.slots.contains_key(id)
    }

    /// Insert a new fly, returning its handle.
    pub fn insert(&mut self, fly: Fly) -> FlyId {
        let id = self.slots.insert(fly);
        self.order.push(id);
        id
    }

    /// Remove `id`, preserving the insertion order of the rest.
    pub fn remove(&mut self, id: FlyId) -> Option<Fly> {
        let fly = self.slots.remove(id)?;
        self.order.retain(|&other| other != id);
        Some(fly)
    }

    /// Borrow the fly behind `id`.
    #[must_use]
    pub fn get(&self, id: FlyId) -> Option<&Fly> {
        self.slots.get(id)
    }

    /// Mutably borrow the fly behind `id`.
    #[must_use]
    pub fn get_mut(&mut self, id: FlyId) -> Option<&mut Fly> {
        self.slots.get_mut(id)
    }

    /// Handles in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = FlyId> + '_ {
        self.order.iter().copied()
    }

    /// Flies in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (FlyId, &Fly)> + '_ {
        self.order.iter().filter_map(|&id| self.slots.get(id).map(|fly| (id, fly)))
    }
}

/// Flight intents used when building a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlightKind {
    Normal,
    Flee,
    Return,
}

fn random_point_in(rect: Rect, rng: &mut SmallRng) -> Point2 {
    Point2::new(
        rng.random_range(rect.min.x..=rect.max.x),
        rng.random_range(rect.min.y..=rect.max.y),
    )
}

/// Choose a flight target and sample the plan's noise parameters from the
/// fly's *current* personality.
fn make_flight_plan(
    rng: &mut SmallRng,
    traits: &PersonalityTraits,
    cfg: &BehaviorConfig,
    bounds: Rect,
    others: &[(FlyId, Point2)],
    self_id: FlyId,
    position: Point2,
    annotated: bool,
    kind: FlightKind,
) -> FlightPlan {
    let target_bounds = bounds.inset(cfg.safe_margin);
    let target = match kind {
        FlightKind::Return => random_point_in(target_bounds, rng),
        _ if annotated => random_point_in(bounds.central_box(cfg.annotation_box_fraction), rng),
        FlightKind::Flee => {
            let distance = bounds.diagonal()
                * rng.random_range(cfg.flee_distance_min..cfg.flee_distance_max);
            let candidate = position.offset(Vec2::from_angle(rng.random_range(0.0..TAU)).scaled(distance));
            bounds.clamp_point(candidate)
        }
        FlightKind::Normal => {
            let mut chosen = None;
            if rng.random::<f32>() < cfg.cluster_chance {
                let candidates: Vec<Point2> = others
                    .iter()
                    .filter(|(id, _)| *id != self_id)
                    .map(|(_, pos)| *pos)
                    .collect();
                if !candidates.is_empty() {
                    // Single candidate, silently dropped when out of bounds.
                    let anchor = candidates[rng.random_range(0..candidates.len())];
                    let offset = Vec2::from_angle(rng.random_range(0.0..TAU))
                        .scaled(rng.random_range(0.0..cfg.cluster_radius));
                    let candidate = anchor.offset(offset);
                    if bounds.contains(candidate) {
                        chosen = Some(candidate);
                    }
                }
            }
            chosen.unwrap_or_else(|| {
                let mut candidate = random_point_in(target_bounds, rng);
                for _ in 1..cfg.target_attempts {
                    if candidate.distance(position) > cfg.target_min_distance {
                        break;
                    }
                    candidate = random_point_in(target_bounds, rng);
                }
                candidate
            })
        }
    };
    FlightPlan {
        start: position,
        target,
        duration: traits.flight_duration.sample(rng),
        elapsed: 0.0,
        arc_height: traits.arc_height.sample(rng),
        stutter_phase: rng.random_range(0.0..TAU),
        wobble_phase: rng.random_range(0.0..TAU),
        chaos_phase: (rng.random_range(0.0..TAU), rng.random_range(0.0..TAU)),
        fleeing: kind == FlightKind::Flee,
        returning: kind == FlightKind::Return,
    }
}

/// OR-of-corners hit test: a fly is struck when any corner of its bounding
/// box falls inside the cone.
fn fly_hit_by(cone: &ThreatCone, position: Point2, half_extent: f32) -> bool {
    let corners = [
        Point2::new(position.x - half_extent, position.y - half_extent),
        Point2::new(position.x - half_extent, position.y + half_extent),
        Point2::new(position.x + half_extent, position.y - half_extent),
        Point2::new(position.x + half_extent, position.y + half_extent),
    ];
    corners.iter().any(|corner| cone.contains(*corner))
}

/// Aggregate swarm state: the fly population, the swatter, and the staged
/// tick pipeline coupling them.
pub struct SwarmState {
    config: SwarmConfig,
    tick: Tick,
    clock: f64,
    rng: SmallRng,
    flies: FlyArena,
    swatter: SwatterController,
    scheduler: Scheduler,
    bounds: Rect,
    spawn_timer: f32,
    cleared_pending: bool,
    observer: Box<dyn SwarmObserver>,
    history: VecDeque<TickSummary>,
    pending_events: Vec<SimEvent>,
    last_deaths: usize,
    last_strikes: usize,
}

impl std::fmt::Debug for SwarmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwarmState")
            .field("tick", &self.tick)
            .field("clock", &self.clock)
            .field("fly_count", &self.flies.len())
            .field("pending_actions", &self.scheduler.pending())
            .finish()
    }
}

impl SwarmState {
    /// Instantiate a new swarm using the supplied configuration.
    pub fn new(config: SwarmConfig) -> Result<Self, SwarmConfigError> {
        Self::with_observer(config, Box::new(NullObserver))
    }

    /// Instantiate a new swarm with an observer sink.
    pub fn with_observer(
        config: SwarmConfig,
        observer: Box<dyn SwarmObserver>,
    ) -> Result<Self, SwarmConfigError> {
        config.validate()?;
        let rng = config.seeded_rng();
        let bounds = config.bounds;
        let history_capacity = config.history_capacity;
        let swatter = SwatterController::new(config.swatter);
        let mut state = Self {
            config,
            tick: Tick::zero(),
            clock: 0.0,
            rng,
            flies: FlyArena::new(),
            swatter,
            scheduler: Scheduler::default(),
            bounds,
            spawn_timer: 0.0,
            cleared_pending: false,
            observer,
            history: VecDeque::with_capacity(history_capacity),
            pending_events: Vec::new(),
            last_deaths: 0,
            last_strikes: 0,
        };
        if state.config.spawn.mode == SpawnMode::Auto {
            state.ensure_initial_population(state.config.spawn.initial_count as usize);
        }
        Ok(state)
    }

    /// Execute one simulation tick, returning the emitted events.
    pub fn step(&mut self, dt: f32) -> TickEvents {
        if !(dt > 0.0 && dt.is_finite()) {
            return TickEvents {
                tick: self.tick,
                events: Vec::new(),
            };
        }
        self.clock += f64::from(dt);
        self.tick = self.tick.next();

        self.swatter.tick(dt);
        self.stage_scheduler();
        self.stage_spawn(dt);
        self.stage_agitation(dt);
        self.stage_suspicion(dt);
        self.stage_behavior(dt);
        self.stage_boundary(dt);
        self.stage_goop(dt);
        self.stage_cleanup();
        self.stage_summary();

        let events = std::mem::take(&mut self.pending_events);
        if let Some(summary) = self.history.back() {
            self.observer.on_tick(&TickReport {
                summary,
                events: &events,
            });
        }
        TickEvents {
            tick: self.tick,
            events,
        }
    }

    fn stage_scheduler(&mut self) {
        let now = self.clock;
        for action in self.scheduler.drain_due(now) {
            match action {
                ScheduledAction::ResolveStrike { stamp } => {
                    if let Some(cone) = self.swatter.strike_for(stamp) {
                        self.resolve_strike(&cone);
                    }
                }
                ScheduledAction::FinishSwing { stamp } => {
                    self.swatter.finish_swing(stamp);
                }
            }
        }
    }

    fn stage_spawn(&mut self, dt: f32) {
        if self.config.spawn.mode != SpawnMode::Auto {
            return;
        }
        self.spawn_timer += dt;
        let interval = self.config.spawn.interval_seconds;
        if self.spawn_timer < interval {
            return;
        }
        // Discard any banked excess; one oversized dt never yields a burst
        // of spawns faster than the interval.
        self.spawn_timer = 0.0;
        if self.live_count() < self.config.spawn.max_count as usize {
            let position = self.random_edge_position();
            self.spawn_fly(position);
        }
    }

    fn stage_agitation(&mut self, dt: f32) {
        let cfg = self.config.agitation;
        let ids: Vec<FlyId> = self.flies.ids().collect();
        let rng = &mut self.rng;
        for id in ids {
            let Some(fly) = self.flies.get_mut(id) else { continue };
            if !fly.alive {
                continue;
            }
            fly.agitation *= cfg.decay_factor;
            if rng.random::<f32>() < cfg.spike_chance * dt {
                fly.agitation += rng.random_range(cfg.spike_min..cfg.spike_max);
            }
            fly.agitation = clamp01(fly.agitation);
            fly.personality = Personality::classify(fly.agitation);
        }
    }

    fn stage_suspicion(&mut self, dt: f32) {
        let now = self.clock;
        let cone = self.swatter.active_threat_cone();
        let release = self.swatter.last_release();
        let recent = self.swatter.recent_swats();
        let cfg = self.config.suspicion;
        let boost = self.config.agitation.scare_boost;
        let ids: Vec<FlyId> = self.flies.ids().collect();
        let mut fleeing: Vec<FlyId> = Vec::new();
        for id in ids {
            let Some(fly) = self.flies.get_mut(id) else { continue };
            if !fly.alive {
                continue;
            }
            let sample = ThreatSample {
                cone: cone.as_ref(),
                release,
                recent_swats: recent,
            };
            let position = fly.position;
            if cfg.evaluate(&mut fly.suspicion, position, sample, now, dt) == SuspicionVerdict::Flee
            {
                fly.agitation = clamp01(fly.agitation + boost);
                fleeing.push(id);
            }
        }
        for id in fleeing {
            self.start_flee_flight(id);
        }
    }

    fn stage_behavior(&mut self, dt: f32) {
        let bounds = self.bounds;
        let cfg = self.config.behavior;
        let snapshot: Vec<(FlyId, Point2)> = self
            .flies
            .iter()
            .filter(|(_, fly)| fly.alive)
            .map(|(id, fly)| (id, fly.position))
            .collect();
        let ids: Vec<FlyId> = self.flies.ids().collect();
        let rng = &mut self.rng;
        for id in ids {
            let Some(fly) = self.flies.get_mut(id) else { continue };
            if !fly.alive {
                continue;
            }
            let traits = fly.personality.traits();
            let annotated = fly.annotation.is_some();
            let position = fly.position;
            let mut next: Option<FlyBehavior> = None;
            match &mut fly.behavior {
                FlyBehavior::Hovering {
                    remaining,
                    jitter_timer,
                } => {
                    *jitter_timer -= dt;
                    if *jitter_timer <= 0.0 {
                        *jitter_timer = traits.jitter_interval;
                        let kick = Vec2::from_angle(rng.random_range(0.0..TAU))
                            .scaled(rng.random_range(0.0..traits.jitter_intensity));
                        fly.velocity = fly.velocity + kick;
                    }
                    if rng.random::<f32>() < traits.kick_chance * dt {
                        let kick = Vec2::from_angle(rng.random_range(0.0..TAU))
                            .scaled(traits.jitter_intensity * 1.5);
                        fly.velocity = fly.velocity + kick;
                    }
                    fly.velocity = fly
                        .velocity
                        .scaled(cfg.hover_damping)
                        .clamped_length(traits.hover_speed_cap);
                    fly.position = fly.position.offset(fly.velocity.scaled(dt));
                    *remaining -= dt;
                    if *remaining <= 0.0 {
                        let plan = make_flight_plan(
                            rng,
                            traits,
                            &cfg,
                            bounds,
                            &snapshot,
                            id,
                            fly.position,
                            annotated,
                            FlightKind::Normal,
                        );
                        next = Some(FlyBehavior::Flying(plan));
                    }
                }
                FlyBehavior::Flying(plan) => {
                    plan.elapsed += dt;
                    let progress = if plan.duration > 0.0 && plan.duration.is_finite() {
                        plan.elapsed / plan.duration
                    } else {
                        // Degenerate flight data lands immediately.
                        cfg.overshoot_limit + 1.0
                    };
                    let eased = progress.min(1.0);
                    let base = plan.start.lerp(plan.target, eased);
                    let fade = ((1.0 - progress) / 0.2).clamp(0.0, 1.0);
                    let t = plan.elapsed;
                    let arc = -plan.arc_height * (PI * eased).sin();
                    let stutter = traits.stutter_intensity
                        * (0.6
                            * (TAU * traits.stutter_frequency * t + plan.stutter_phase).sin()
                            + 0.4
                                * (TAU * traits.stutter_frequency * 1.7 * t
                                    + plan.stutter_phase
                                    + 1.3)
                                    .sin());
                    let wobble = traits.wobble_amplitude
                        * (TAU * traits.wobble_frequency * t + plan.wobble_phase).sin();
                    let mut offset = Vec2::new(stutter, arc + wobble);
                    if traits.direction_chaos > 0.0 {
                        offset = offset
                            + Vec2::new(
                                traits.direction_chaos
                                    * (TAU * 0.9 * t + plan.chaos_phase.0).sin(),
                                traits.direction_chaos
                                    * (TAU * 1.3 * t + plan.chaos_phase.1).sin(),
                            );
                    }
                    let new_pos = base.offset(offset.scaled(fade));
                    fly.velocity = position
                        .vector_to(new_pos)
                        .scaled(1.0 / dt)
                        .clamped_length(cfg.max_flight_speed);
                    fly.position = new_pos;
                    if fly.position.distance(plan.target) < cfg.approach_threshold
                        || progress > cfg.overshoot_limit
                    {
                        let settle = traits.settle_time.sample(rng).max(1e-3);
                        let direction = if rng.random::<bool>() { 1.0 } else { -1.0 };
                        next = Some(FlyBehavior::Circling(CirclePlan {
                            center: plan.target,
                            radius: traits.circle_radius.sample(rng),
                            angular_speed: traits.circle_speed.sample(rng) * direction,
                            angle: plan.target.vector_to(fly.position).heading(),
                            settle_total: settle,
                            settle_remaining: settle,
                            dwell_remaining: traits.circle_dwell.sample(rng),
                        }));
                    }
                }
                FlyBehavior::Circling(plan) => {
                    plan.angle += plan.angular_speed * dt;
                    let orbit = plan
                        .center
                        .offset(Vec2::from_angle(plan.angle).scaled(plan.radius));
                    let desired = fly.position.vector_to(orbit).scaled(cfg.circling_pull);
                    plan.settle_remaining = (plan.settle_remaining - dt).max(0.0);
                    let progress =
                        1.0 - (plan.settle_remaining / plan.settle_total).clamp(0.0, 1.0);
                    let ease = progress * (2.0 - progress);
                    fly.velocity = fly.velocity + (desired - fly.velocity).scaled(ease);
                    fly.position = fly.position.offset(fly.velocity.scaled(dt));
                    plan.dwell_remaining -= dt;
                    if plan.dwell_remaining <= 0.0 {
                        next = Some(FlyBehavior::Hovering {
                            remaining: traits.hover_duration.sample(rng),
                            jitter_timer: traits.jitter_interval,
                        });
                    }
                }
            }
            // At most one transition per tick.
            if let Some(behavior) = next {
                fly.behavior = behavior;
            }
        }
    }

    fn stage_boundary(&mut self, dt: f32) {
        let bounds = self.bounds;
        let cfg = self.config.behavior;
        let escape = bounds.expanded(cfg.escape_margin);
        let soft = bounds.inset(cfg.soft_margin);
        let center = bounds.center();
        let ids: Vec<FlyId> = self.flies.ids().collect();
        let rng = &mut self.rng;
        for id in ids {
            let Some(fly) = self.flies.get_mut(id) else { continue };
            if !fly.alive {
                continue;
            }
            if !escape.contains(fly.position) {
                let already_returning =
                    matches!(&fly.behavior, FlyBehavior::Flying(plan) if plan.returning);
                if !already_returning {
                    let traits = fly.personality.traits();
                    let plan = make_flight_plan(
                        rng,
                        traits,
                        &cfg,
                        bounds,
                        &[],
                        id,
                        fly.position,
                        false,
                        FlightKind::Return,
                    );
                    fly.behavior = FlyBehavior::Flying(plan);
                }
            } else if !soft.contains(fly.position) {
                if let Some(inward) = fly.position.vector_to(center).normalized() {
                    fly.velocity = fly.velocity + inward.scaled(cfg.soft_nudge * dt);
                }
            }
        }
    }

    fn stage_goop(&mut self, dt: f32) {
        let cfg = self.config.goop;
        let ids: Vec<FlyId> = self.flies.ids().collect();
        for id in ids {
            let Some(fly) = self.flies.get_mut(id) else { continue };
            if fly.alive || fly.goop.is_empty() {
                continue;
            }
            for particle in fly.goop.iter_mut() {
                particle.age += dt;
                particle.position = particle.position.offset(particle.velocity.scaled(dt));
                particle.velocity = particle.velocity.scaled(cfg.damping);
            }
            fly.goop.retain(|particle| particle.age < cfg.fade_seconds);
        }
    }

    fn stage_cleanup(&mut self) {
        // Dead flies stay until their splatter has fully faded.
        let spent: Vec<FlyId> = self
            .flies
            .iter()
            .filter(|(_, fly)| !fly.alive && fly.goop.is_empty())
            .map(|(id, _)| id)
            .collect();
        for id in spent {
            self.flies.remove(id);
        }
    }

    fn stage_summary(&mut self) {
        let mut live = 0usize;
        let mut decaying = 0usize;
        let mut suspicion_sum = 0.0f32;
        let mut agitation_sum = 0.0f32;
        for (_, fly) in self.flies.iter() {
            if fly.alive {
                live += 1;
                suspicion_sum += fly.suspicion.level;
                agitation_sum += fly.agitation;
            } else if !fly.goop.is_empty() {
                decaying += 1;
            }
        }
        let summary = TickSummary {
            tick: self.tick,
            live,
            decaying,
            deaths: self.last_deaths,
            strikes: self.last_strikes,
            average_suspicion: if live > 0 {
                suspicion_sum / live as f32
            } else {
                0.0
            },
            average_agitation: if live > 0 {
                agitation_sum / live as f32
            } else {
                0.0
            },
        };
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary);
        self.last_deaths = 0;
        self.last_strikes = 0;
    }

    fn resolve_strike(&mut self, cone: &ThreatCone) {
        let now = self.clock;
        self.swatter.record_strike(now);
        let half = self.config.strike.hitbox_half_extent;
        let victims: Vec<FlyId> = self
            .flies
            .iter()
            .filter(|(_, fly)| fly.alive && fly_hit_by(cone, fly.position, half))
            .map(|(id, _)| id)
            .collect();
        let kills = victims.len();
        for id in victims {
            self.kill_fly(id, false, false);
        }
        debug!(kills, "strike resolved");
        self.last_strikes += 1;
        self.pending_events.push(SimEvent::StrikeResolved {
            position: cone.origin(),
            kills,
        });
        self.check_population_cleared();
    }

    fn kill_fly(&mut self, id: FlyId, quiet: bool, single_particle: bool) {
        let cfg = self.config.goop;
        let rng = &mut self.rng;
        let Some(fly) = self.flies.get_mut(id) else { return };
        if !fly.alive {
            return;
        }
        fly.alive = false;
        fly.velocity = Vec2::zero();
        let count = if single_particle {
            1
        } else {
            rng.random_range(cfg.particles_min..=cfg.particles_max)
        };
        for _ in 0..count {
            let direction = Vec2::from_angle(rng.random_range(0.0..TAU));
            fly.goop.push(GoopParticle {
                position: fly.position,
                velocity: direction.scaled(rng.random_range(0.0..cfg.burst_speed)),
                size: rng.random_range(cfg.size_min..=cfg.size_max),
                age: 0.0,
            });
        }
        let position = fly.position;
        self.pending_events.push(SimEvent::FlyDied {
            id,
            position,
            quiet,
        });
        self.last_deaths += 1;
    }

    fn check_population_cleared(&mut self) {
        if self.cleared_pending && self.live_count() == 0 {
            self.pending_events.push(SimEvent::PopulationCleared);
            self.cleared_pending = false;
        }
    }

    fn start_flee_flight(&mut self, id: FlyId) {
        let bounds = self.bounds;
        let cfg = self.config.behavior;
        let rng = &mut self.rng;
        let Some(fly) = self.flies.get_mut(id) else { return };
        if !fly.alive {
            return;
        }
        // A fly already mid-flee only refreshes its agitation.
        if matches!(&fly.behavior, FlyBehavior::Flying(plan) if plan.fleeing) {
            return;
        }
        let traits = fly.personality.traits();
        // Annotation carry outranks the flee target policy.
        let plan = make_flight_plan(
            rng,
            traits,
            &cfg,
            bounds,
            &[],
            id,
            fly.position,
            fly.annotation.is_some(),
            FlightKind::Flee,
        );
        fly.behavior = FlyBehavior::Flying(plan);
    }

    fn scare_flies_near(&mut self, point: Point2) {
        let radius_sq = self.config.strike.scare_radius * self.config.strike.scare_radius;
        let boost = self.config.agitation.scare_boost;
        let scared: Vec<FlyId> = self
            .flies
            .iter()
            .filter(|(_, fly)| {
                fly.alive && fly.position.vector_to(point).length_squared() <= radius_sq
            })
            .map(|(id, _)| id)
            .collect();
        for &id in &scared {
            if let Some(fly) = self.flies.get_mut(id) {
                fly.agitation = clamp01(fly.agitation + boost);
            }
        }
        for id in scared {
            self.start_flee_flight(id);
        }
    }

    fn random_edge_position(&mut self) -> Point2 {
        let bounds = self.bounds;
        let margin = self.config.spawn.edge_margin;
        let rng = &mut self.rng;
        let along_x = rng.random_range(bounds.min.x..=bounds.max.x);
        let along_y = rng.random_range(bounds.min.y..=bounds.max.y);
        match rng.random_range(0..4u8) {
            0 => Point2::new(along_x, bounds.min.y + margin),
            1 => Point2::new(along_x, bounds.max.y - margin),
            2 => Point2::new(bounds.min.x + margin, along_y),
            _ => Point2::new(bounds.max.x - margin, along_y),
        }
    }

    /// Begin a pointer drag; nearby flies are scared by the contact.
    pub fn pointer_pressed(&mut self, point: Point2) {
        let now = self.clock;
        self.swatter.start_drag(point, now);
        self.scare_flies_near(point);
    }

    /// Continue a pointer drag.
    pub fn pointer_dragged(&mut self, point: Point2) {
        self.swatter.update_drag(point);
        self.scare_flies_near(point);
    }

    /// Release the pointer, scheduling the delayed strike and swing finish.
    pub fn pointer_released(&mut self) {
        let now = self.clock;
        if let Some(command) = self.swatter.end_drag(now) {
            self.scheduler.schedule(
                command.strike_at,
                ScheduledAction::ResolveStrike {
                    stamp: command.stamp,
                },
            );
            self.scheduler.schedule(
                command.finish_at,
                ScheduledAction::FinishSwing {
                    stamp: command.stamp,
                },
            );
        }
    }

    /// Hover movement without a drag; still scares nearby flies.
    pub fn pointer_moved(&mut self, point: Point2) {
        self.scare_flies_near(point);
    }

    /// Refresh the render bounds from the host display.
    pub fn set_bounds(&mut self, bounds: Rect) {
        if bounds.width() > 0.0 && bounds.height() > 0.0 {
            self.bounds = bounds;
        }
    }

    /// Replace the spawn settings, re-seeding the population up to the new
    /// initial count. Never reduces the live population.
    pub fn set_spawn_settings(&mut self, settings: SpawnSettings) -> Result<(), SwarmConfigError> {
        settings.validate()?;
        self.config.spawn = settings;
        self.ensure_initial_population(settings.initial_count as usize);
        Ok(())
    }

    /// Top the live population up to `count`; never kills to shrink.
    pub fn ensure_initial_population(&mut self, count: usize) {
        while self.live_count() < count {
            let position = random_point_in(
                self.bounds.inset(self.config.behavior.safe_margin),
                &mut self.rng,
            );
            self.spawn_fly(position);
        }
    }

    /// Spawn one fly at `position`, returning its handle.
    pub fn spawn_fly(&mut self, position: Point2) -> FlyId {
        let fly = Fly::spawn(position, &mut self.rng);
        let id = self.flies.insert(fly);
        self.cleared_pending = true;
        self.pending_events.push(SimEvent::FlySpawned { id, position });
        id
    }

    /// Kill every live fly with a reduced single-particle splatter, sweeping
    /// stale corpses first. `quiet` suppresses the death sound cue.
    pub fn kill_all(&mut self, quiet: bool) {
        let stale: Vec<FlyId> = self
            .flies
            .iter()
            .filter(|(_, fly)| !fly.alive && fly.goop.is_empty())
            .map(|(id, _)| id)
            .collect();
        for id in stale {
            self.flies.remove(id);
        }
        let live: Vec<FlyId> = self
            .flies
            .iter()
            .filter(|(_, fly)| fly.alive)
            .map(|(id, _)| id)
            .collect();
        let count = live.len();
        for id in live {
            self.kill_fly(id, quiet, true);
        }
        debug!(count, quiet, "killed all flies");
        self.check_population_cleared();
    }

    /// Attach or clear a text annotation on a fly.
    pub fn set_annotation(&mut self, id: FlyId, annotation: Option<String>) -> bool {
        if let Some(fly) = self.flies.get_mut(id) {
            fly.annotation = annotation;
            true
        } else {
            false
        }
    }

    /// Replace the observer sink.
    pub fn set_observer(&mut self, observer: Box<dyn SwarmObserver>) {
        self.observer = observer;
    }

    /// Number of live flies.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.flies.iter().filter(|(_, fly)| fly.alive).count()
    }

    /// Number of stored flies, decaying corpses included.
    #[must_use]
    pub fn fly_count(&self) -> usize {
        self.flies.len()
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Seconds of simulated time processed so far.
    #[must_use]
    pub const fn clock(&self) -> f64 {
        self.clock
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub const fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// Current render bounds.
    #[must_use]
    pub const fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Read-only access to the swatter controller.
    #[must_use]
    pub const fn swatter(&self) -> &SwatterController {
        &self.swatter
    }

    /// Borrow the fly behind `id`.
    #[must_use]
    pub fn fly(&self, id: FlyId) -> Option<&Fly> {
        self.flies.get(id)
    }

    /// Mutably borrow the fly behind `id`.
    #[must_use]
    pub fn fly_mut(&mut self, id: FlyId) -> Option<&mut Fly> {
        self.flies.get_mut(id)
    }

    /// Flies in insertion order.
    pub fn flies(&self) -> impl Iterator<Item = (FlyId, &Fly)> + '_ {
        self.flies.iter()
    }

    /// Iterate over retained tick summaries.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }

    /// Cone to draw: the dragged cone while dragging, else the rotating
    /// swing cone while one is animating.
    #[must_use]
    pub fn visible_cone(&self) -> Option<ThreatCone> {
        if let Some(cone) = self.swatter.dragged_cone() {
            return Some(cone);
        }
        let swing = self.swatter.swing()?;
        ThreatCone::new(
            swing.cone.origin(),
            swing.cone.direction().rotated(swing.rotation),
            swing.cone.radius(),
            swing.cone.arc_angle(),
            swing.cone.stretch(),
        )
    }

    /// The fly-facing threat cone, for audio and other reactive systems.
    #[must_use]
    pub fn threat_cone(&self) -> Option<ThreatCone> {
        self.swatter.active_threat_cone()
    }

    /// Snapshot every fly for collaborators.
    #[must_use]
    pub fn fly_views(&self) -> Vec<FlyView> {
        let fade = self.config.goop.fade_seconds;
        self.flies
            .iter()
            .map(|(id, fly)| FlyView {
                id,
                position: fly.position,
                rotation: fly.heading(),
                alive: fly.alive,
                suspicion: fly.suspicion.level,
                agitation: fly.agitation,
                personality: fly.personality,
                behavior: fly.behavior.kind(),
                goop: fly
                    .goop
                    .iter()
                    .map(|particle| GoopView {
                        position: particle.position,
                        size: particle.size,
                        opacity: (1.0 - particle.age / fade).clamp(0.0, 1.0),
                    })
                    .collect(),
                annotation: fly.annotation.clone(),
            })
            .collect()
    }
}
