//! Adaptive request pacing.
//!
//! Keeps a short request history per target and derives the wait before the
//! next request from how dense that history is. Each target moves between
//! three pacing modes; transitions are rate-limited so bursty traffic cannot
//! make the mode oscillate.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::{debug, info};
use rand::Rng;

/// Base-delay envelope applied to a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacingMode {
    Aggressive,
    Normal,
    Conservative,
}

impl PacingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PacingMode::Aggressive => "aggressive",
            PacingMode::Normal => "normal",
            PacingMode::Conservative => "conservative",
        }
    }
}

impl fmt::Display for PacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// History older than this is discarded.
    pub retention: Duration,
    /// Window over which request frequency is counted.
    pub frequency_window: Duration,
    /// Minimum time between two mode transitions of one target.
    pub mode_hysteresis: Duration,
    /// Uniform base-delay ranges in seconds.
    pub aggressive_range: (f64, f64),
    pub normal_range: (f64, f64),
    pub conservative_range: (f64, f64),
    /// Symmetric jitter added to the base delay, in seconds.
    pub jitter: f64,
    /// Bounds applied to the jittered base delay, in seconds.
    pub min_delay: f64,
    pub max_base_delay: f64,
    /// Frequency above which a target turns conservative.
    pub conservative_above: usize,
    /// Frequency below which a target turns aggressive.
    pub aggressive_below: usize,
    /// Frequency above which the burst penalty kicks in.
    pub burst_threshold: usize,
    pub burst_penalty: f64,
    /// Ceiling on the penalised delay.
    pub max_delay: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(5 * 60),
            frequency_window: Duration::from_secs(60),
            mode_hysteresis: Duration::from_secs(60),
            aggressive_range: (1.0, 3.0),
            normal_range: (2.0, 5.0),
            conservative_range: (5.0, 10.0),
            jitter: 0.5,
            min_delay: 0.5,
            max_base_delay: 10.0,
            conservative_above: 5,
            aggressive_below: 2,
            burst_threshold: 3,
            burst_penalty: 1.5,
            max_delay: Duration::from_secs(5 * 60),
        }
    }
}

impl PacingConfig {
    fn range(&self, mode: PacingMode) -> (f64, f64) {
        match mode {
            PacingMode::Aggressive => self.aggressive_range,
            PacingMode::Normal => self.normal_range,
            PacingMode::Conservative => self.conservative_range,
        }
    }

    fn desired_mode(&self, frequency: usize) -> PacingMode {
        if frequency > self.conservative_above {
            PacingMode::Conservative
        } else if frequency < self.aggressive_below {
            PacingMode::Aggressive
        } else {
            PacingMode::Normal
        }
    }
}

/// Interface for pacing controllers consulted before every paced request.
pub trait RequestPacer: Send + Sync {
    /// Record a request to `target` and return how long to wait before
    /// sending it.
    fn delay_for(&self, target: &str) -> Duration;

    /// Forget targets with no recent history. Returns how many were dropped.
    fn evict_idle(&self) -> usize {
        0
    }
}

#[derive(Debug, Clone)]
struct PacingState {
    history: VecDeque<Instant>,
    mode: PacingMode,
    mode_changed_at: Instant,
}

impl PacingState {
    fn new(now: Instant) -> Self {
        Self {
            history: VecDeque::new(),
            mode: PacingMode::Normal,
            mode_changed_at: now,
        }
    }

    fn prune(&mut self, now: Instant, retention: Duration) {
        while self
            .history
            .front()
            .is_some_and(|ts| now.saturating_duration_since(*ts) >= retention)
        {
            self.history.pop_front();
        }
    }

    fn frequency(&self, now: Instant, window: Duration) -> usize {
        self.history
            .iter()
            .rev()
            .take_while(|ts| now.saturating_duration_since(**ts) < window)
            .count()
    }
}

/// Snapshot of one target's pacing state for observability.
#[derive(Debug, Clone, Copy)]
pub struct PacingSnapshot {
    pub mode: PacingMode,
    pub mode_changed_at: Instant,
    pub frequency: usize,
    pub history_len: usize,
}

/// Default pacing controller keyed by target identifier.
#[derive(Debug, Default)]
pub struct AdaptivePacing {
    config: PacingConfig,
    targets: DashMap<String, PacingState>,
}

impl AdaptivePacing {
    pub fn new(config: PacingConfig) -> Self {
        Self {
            config,
            targets: DashMap::new(),
        }
    }

    pub fn config(&self) -> &PacingConfig {
        &self.config
    }

    /// [`RequestPacer::delay_for`] evaluated at an explicit instant.
    pub fn delay_for_at(&self, target: &str, now: Instant) -> Duration {
        let (mode, frequency) = self.observe(target, now);
        let delay = self.sample_delay(mode, frequency, &mut rand::thread_rng());
        debug!(
            "Delay for {}: {:.2}s (mode: {}, {} req/window)",
            target,
            delay.as_secs_f64(),
            mode,
            frequency
        );
        delay
    }

    /// Record a request at `now`, update the mode if the hysteresis window
    /// allows it, and return the mode together with the current frequency.
    pub fn observe(&self, target: &str, now: Instant) -> (PacingMode, usize) {
        let mut state = self
            .targets
            .entry(target.to_string())
            .or_insert_with(|| PacingState::new(now));

        state.prune(now, self.config.retention);
        state.history.push_back(now);
        let frequency = state.frequency(now, self.config.frequency_window);

        if now.saturating_duration_since(state.mode_changed_at) >= self.config.mode_hysteresis {
            let desired = self.config.desired_mode(frequency);
            if desired != state.mode {
                info!(
                    "Pacing for {} switched {} -> {} due to frequency {}",
                    target, state.mode, desired, frequency
                );
                state.mode = desired;
                state.mode_changed_at = now;
            }
        }

        (state.mode, frequency)
    }

    /// Draw a delay for `mode` and apply the burst penalty for `frequency`.
    pub fn sample_delay<R: Rng + ?Sized>(
        &self,
        mode: PacingMode,
        frequency: usize,
        rng: &mut R,
    ) -> Duration {
        let (min, max) = self.config.range(mode);
        let jitter = self.config.jitter;
        let base = rng.gen_range(min..=max) + rng.gen_range(-jitter..=jitter);
        let mut delay = base.clamp(self.config.min_delay, self.config.max_base_delay);

        if frequency > self.config.burst_threshold {
            let excess = i32::try_from(frequency - self.config.burst_threshold).unwrap_or(i32::MAX);
            delay *= self.config.burst_penalty.powi(excess);
        }

        Duration::try_from_secs_f64(delay)
            .unwrap_or(Duration::MAX)
            .min(self.config.max_delay)
    }

    pub fn mode(&self, target: &str) -> Option<PacingMode> {
        self.targets.get(target).map(|state| state.mode)
    }

    pub fn snapshot(&self, target: &str, now: Instant) -> Option<PacingSnapshot> {
        self.targets.get(target).map(|state| PacingSnapshot {
            mode: state.mode,
            mode_changed_at: state.mode_changed_at,
            frequency: state.frequency(now, self.config.frequency_window),
            history_len: state
                .history
                .iter()
                .filter(|ts| now.saturating_duration_since(**ts) < self.config.retention)
                .count(),
        })
    }

    /// Drop targets whose whole history has aged out. Returns how many were
    /// evicted.
    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let before = self.targets.len();
        let retention = self.config.retention;
        self.targets.retain(|_, state| {
            state
                .history
                .back()
                .is_some_and(|ts| now.saturating_duration_since(*ts) < retention)
        });
        before - self.targets.len()
    }
}

impl RequestPacer for AdaptivePacing {
    fn delay_for(&self, target: &str) -> Duration {
        self.delay_for_at(target, Instant::now())
    }

    fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }
}
