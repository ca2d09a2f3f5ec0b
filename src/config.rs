//! Layout configuration
//!
//! Every force constant is caller-supplied. Graph views disagree on charge,
//! link distance and collision radius, so nothing here is treated as the one
//! correct value; the defaults are the ones the link-graph view uses.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Default Constants
// =============================================================================

/// Default simulation extent (width and height of the seeding square)
pub const DEFAULT_EXTENT: f64 = 800.0;

/// Default link rest length
pub const DEFAULT_LINK_DISTANCE: f64 = 160.0;

/// Default many-body strength (negative = repulsion)
pub const DEFAULT_CHARGE: f64 = -40.0;

/// Default Barnes-Hut theta (0 = exact, larger = coarser)
pub const DEFAULT_THETA: f64 = 0.9;

/// Default minimum distance for many-body calculations (avoids singularity)
pub const DEFAULT_DISTANCE_MIN: f64 = 1.0;

/// Default collision disc radius
pub const DEFAULT_COLLISION_RADIUS: f64 = 45.0;

/// Default velocity multiplier applied each tick
pub const DEFAULT_VELOCITY_DECAY: f64 = 0.6;

/// Default minimum alpha before the simulation counts as cooled
pub const DEFAULT_ALPHA_MIN: f64 = 0.001;

/// Number of ticks over which alpha cools from 1 to `alpha_min` by default
pub const DEFAULT_ALPHA_DECAY_TICKS: f64 = 300.0;

/// Default tick budget
pub const DEFAULT_MAX_TICKS: u64 = 100;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid YAML for [`LayoutConfig`]
    #[error("parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value is out of range
    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// When a simulation instance stops on its own.
///
/// One policy per instance: a tick budget or a wall-clock budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Stop once the tick counter reaches this value
    Ticks(u64),
    /// Stop once this many milliseconds have elapsed since (re)start
    WallClockMs(u64),
}

impl Termination {
    pub fn wall_clock(&self) -> Option<Duration> {
        match self {
            Termination::Ticks(_) => None,
            Termination::WallClockMs(ms) => Some(Duration::from_millis(*ms)),
        }
    }
}

impl Default for Termination {
    fn default() -> Self {
        Termination::Ticks(DEFAULT_MAX_TICKS)
    }
}

/// Physics parameters for one simulation instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceConfig {
    /// Link rest length
    pub link_distance: f64,
    /// Link strength; `None` uses `1 / min(degree(source), degree(target))`
    pub link_strength: Option<f64>,
    /// Many-body strength (negative = repulsion)
    pub charge: f64,
    /// Barnes-Hut approximation threshold
    pub theta: f64,
    /// Minimum distance for many-body calculations
    pub distance_min: f64,
    /// Optional cutoff beyond which nodes do not repel
    pub distance_max: Option<f64>,
    /// Fraction of the centroid offset corrected per tick
    pub center_strength: f64,
    /// Collision disc radius
    pub collision_radius: f64,
    /// Fraction of an overlap resolved per iteration
    pub collision_strength: f64,
    /// Collision passes per tick
    pub collision_iterations: u32,
    /// Velocity multiplier (friction)
    pub velocity_decay: f64,
    /// Alpha below which the simulation counts as cooled
    pub alpha_min: f64,
    /// Alpha decay rate; `None` derives it from [`DEFAULT_ALPHA_DECAY_TICKS`]
    pub alpha_decay: Option<f64>,
    /// Alpha approaches this value instead of zero
    pub alpha_target: f64,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            link_distance: DEFAULT_LINK_DISTANCE,
            link_strength: None,
            charge: DEFAULT_CHARGE,
            theta: DEFAULT_THETA,
            distance_min: DEFAULT_DISTANCE_MIN,
            distance_max: None,
            center_strength: 1.0,
            collision_radius: DEFAULT_COLLISION_RADIUS,
            collision_strength: 1.0,
            collision_iterations: 1,
            velocity_decay: DEFAULT_VELOCITY_DECAY,
            alpha_min: DEFAULT_ALPHA_MIN,
            alpha_decay: None,
            alpha_target: 0.0,
        }
    }
}

impl ForceConfig {
    /// Effective alpha decay rate
    pub fn alpha_decay(&self) -> f64 {
        self.alpha_decay
            .unwrap_or_else(|| 1.0 - self.alpha_min.powf(1.0 / DEFAULT_ALPHA_DECAY_TICKS))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });

        if !(self.link_distance.is_finite() && self.link_distance >= 0.0) {
            return invalid("link_distance", "must be a finite non-negative number");
        }
        if !self.charge.is_finite() {
            return invalid("charge", "must be finite");
        }
        if !(self.theta.is_finite() && self.theta >= 0.0) {
            return invalid("theta", "must be a finite non-negative number");
        }
        if !(self.distance_min.is_finite() && self.distance_min > 0.0) {
            return invalid("distance_min", "must be positive");
        }
        if self
            .distance_max
            .is_some_and(|max| max <= self.distance_min)
        {
            return invalid("distance_max", "must exceed distance_min");
        }
        if !(self.collision_radius.is_finite() && self.collision_radius >= 0.0) {
            return invalid("collision_radius", "must be a finite non-negative number");
        }
        if !(0.0..=1.0).contains(&self.velocity_decay) {
            return invalid("velocity_decay", "must be within [0, 1]");
        }
        if !(self.alpha_min > 0.0 && self.alpha_min < 1.0) {
            return invalid("alpha_min", "must be within (0, 1)");
        }
        if self
            .alpha_decay
            .is_some_and(|decay| !(0.0..=1.0).contains(&decay))
        {
            return invalid("alpha_decay", "must be within [0, 1]");
        }
        Ok(())
    }
}

/// Per-graph overrides carried on an `updateGraph` message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collision_radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ticks: Option<u64>,
}

/// Top-level configuration for a host or worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Width of the square new nodes are seeded into
    pub width: f64,
    /// Height of the square new nodes are seeded into
    pub height: f64,
    /// Seed for initial positions and jiggle; `None` seeds from entropy
    pub seed: Option<u64>,
    /// Minimum delay between ticking rounds in the worker
    pub tick_interval_ms: u64,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub termination: Termination,
    pub forces: ForceConfig,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_EXTENT,
            height: DEFAULT_EXTENT,
            seed: None,
            tick_interval_ms: 0,
            termination: Termination::default(),
            forces: ForceConfig::default(),
        }
    }
}

impl LayoutConfig {
    /// Load and validate a YAML config file
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Parse and validate YAML config text
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: LayoutConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.width.is_finite() && self.width > 0.0) {
            return Err(ConfigError::Invalid {
                field: "width",
                reason: "must be positive",
            });
        }
        if !(self.height.is_finite() && self.height > 0.0) {
            return Err(ConfigError::Invalid {
                field: "height",
                reason: "must be positive",
            });
        }
        if matches!(
            self.termination,
            Termination::Ticks(0) | Termination::WallClockMs(0)
        ) {
            return Err(ConfigError::Invalid {
                field: "termination",
                reason: "budget must be non-zero",
            });
        }
        self.forces.validate()
    }

    /// Force parameters and termination policy for one graph
    pub fn resolve(&self, overrides: Option<&ForceOverrides>) -> (ForceConfig, Termination) {
        let mut forces = self.forces.clone();
        let mut termination = self.termination;
        if let Some(overrides) = overrides {
            if let Some(charge) = overrides.charge.filter(|c| c.is_finite()) {
                forces.charge = charge;
            }
            if let Some(distance) = overrides
                .link_distance
                .filter(|d| d.is_finite() && *d >= 0.0)
            {
                forces.link_distance = distance;
            }
            if let Some(radius) = overrides
                .collision_radius
                .filter(|r| r.is_finite() && *r >= 0.0)
            {
                forces.collision_radius = radius;
            }
            if let Some(max) = overrides.max_ticks.filter(|m| *m > 0) {
                termination = Termination::Ticks(max);
            }
        }
        (forces, termination)
    }
}
