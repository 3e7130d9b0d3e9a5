//! Experiment configuration.
//!
//! An experiment file is a JSON document whose field names follow the lab
//! notation (`K_3D`, `eta_3D`, `annihilationDist`, ...). It is parsed once into
//! an immutable [`ExperimentConfig`], validated, and reduced to the
//! [`FilmConstants`] that the physics threads through every call.
//!
//! ```json
//! {
//!   "K_3D": 1.0e-11, "h": 1.0e-6, "eta_3D": 0.01,
//!   "k_B": 1.380649e-23, "T": 300.0, "ra": 1.0e-7,
//!   "annihilationDist": 2.0e-6,
//!   "t0": 0.0, "tn": 400.0, "n": 200000, "saveRate": 500,
//!   "velocityType": "yurke",
//!   "expType": "quench",
//!   "quench": { "count": 200, "width": 6.0e-4, "height": 4.35e-4 },
//!   "seed": 100
//! }
//! ```

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// MARK: Errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read experiment file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed experiment file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid parameter `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// MARK: Enumerations
/// Pairwise interaction law used by the velocity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VelocityLaw {
    /// Inverse-distance law: `denom = r²`.
    Sqrt,
    /// Logarithmically corrected law: `denom = r² ln(r / ra)`.
    Yurke,
}

/// How overlapping annihilation candidates are resolved into pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnnihilationPolicy {
    /// Scan in population order and take the first partner in range.
    /// Order dependent; a defect already taken can be picked again as a partner.
    FirstMatch,
    /// Closest pairs first, each defect used at most once.
    #[default]
    NearestPair,
}

/// How the initial population is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentType {
    #[default]
    Place,
    Quench,
}

// MARK: Data Structures
/// A single hand-placed defect in a `place` experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefectSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub strength: f64,
    pub position: Vector2<f64>,
    #[serde(default = "default_orientation")]
    pub orientation: f64,
}

/// Random bulk placement parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuenchConfig {
    pub count: usize,
    pub width: f64,  // m
    pub height: f64, // m
}

impl Default for QuenchConfig {
    fn default() -> Self {
        QuenchConfig {
            count: 200,
            width: 6e-4,
            height: 435e-6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentConfig {
    #[serde(rename = "K_3D")]
    pub k_3d: f64, // N, Frank elastic constant
    pub h: f64, // m, film thickness
    #[serde(rename = "eta_3D")]
    pub eta_3d: f64, // Pa·s, bulk viscosity
    #[serde(rename = "k_B")]
    pub k_b: f64, // J/K
    #[serde(rename = "T")]
    pub temperature: f64, // K
    pub ra: f64, // m, core radius
    pub annihilation_dist: f64, // m
    pub t0: f64, // s
    pub tn: f64, // s
    pub n: usize,
    pub save_rate: usize,
    #[serde(rename = "velocityType")]
    pub velocity_law: VelocityLaw,
    #[serde(default)]
    pub annihilation_policy: AnnihilationPolicy,
    #[serde(default = "default_min_separation")]
    pub min_separation: f64, // m
    #[serde(rename = "expType", default)]
    pub experiment_type: ExperimentType,
    #[serde(default)]
    pub defects: Vec<DefectSpec>,
    #[serde(default)]
    pub quench: QuenchConfig,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_render_frames")]
    pub render_frames: bool,
}

fn default_orientation() -> f64 {
    PI
}

fn default_min_separation() -> f64 {
    1e-12
}

fn default_render_frames() -> bool {
    true
}

// MARK: Implementation
impl ExperimentConfig {
    /// Read, parse and validate an experiment file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: ExperimentConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("K_3D", self.k_3d)?;
        positive("h", self.h)?;
        positive("eta_3D", self.eta_3d)?;
        positive("ra", self.ra)?;
        positive("minSeparation", self.min_separation)?;
        non_negative("k_B", self.k_b)?;
        non_negative("T", self.temperature)?;
        non_negative("annihilationDist", self.annihilation_dist)?;
        finite("t0", self.t0)?;
        finite("tn", self.tn)?;

        if self.tn <= self.t0 {
            let reason = format!("end time {} must exceed start time {}", self.tn, self.t0);
            return Err(invalid("tn", reason));
        }
        if self.save_rate == 0 {
            return Err(invalid("saveRate", "must be at least 1".to_string()));
        }

        match self.experiment_type {
            ExperimentType::Place => {
                if self.defects.is_empty() {
                    let reason = "a `place` experiment needs at least one defect".to_string();
                    return Err(invalid("defects", reason));
                }
                for spec in &self.defects {
                    if !(spec.strength.is_finite() && spec.strength != 0.0) {
                        let reason = format!("strength {} is not a signed charge", spec.strength);
                        return Err(invalid("defects", reason));
                    }
                    if !(spec.position.x.is_finite() && spec.position.y.is_finite()) {
                        return Err(invalid("defects", "positions must be finite".to_string()));
                    }
                }
            }
            ExperimentType::Quench => {
                positive("quench.width", self.quench.width)?;
                positive("quench.height", self.quench.height)?;
            }
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

fn finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, format!("{value} is not finite")))
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("{value} must be positive")))
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    finite(field, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("{value} must not be negative")))
    }
}

// MARK: Derived Constants
/// Quantities computed once per run from an [`ExperimentConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilmConstants {
    pub k_2d: f64,    // N
    pub eta_2d: f64,  // N·s/m
    pub mobility: f64, // m²/s, K_2D / eta_2D
    pub core_radius: f64,
    pub dt: f64,
    pub diffusion: f64, // m²/s
    pub sigma: f64,     // Brownian standard deviation per axis
    pub annihilation_dist: f64,
    pub min_separation: f64,
    pub law: VelocityLaw,
    pub policy: AnnihilationPolicy,
}

impl FilmConstants {
    pub fn from_config(config: &ExperimentConfig) -> Self {
        let k_2d = config.k_3d * config.h;
        let eta_2d = config.eta_3d * config.h;
        let dt = if config.n == 0 {
            0.0
        } else {
            (config.tn - config.t0) / config.n as f64
        };
        let diffusion = config.k_b * config.temperature / (6.0 * PI * config.eta_3d * config.ra);

        FilmConstants {
            k_2d,
            eta_2d,
            mobility: k_2d / eta_2d,
            core_radius: config.ra,
            dt,
            diffusion,
            sigma: (4.0 * diffusion).sqrt(),
            annihilation_dist: config.annihilation_dist,
            min_separation: config.min_separation,
            law: config.velocity_law,
            policy: config.annihilation_policy,
        }
    }
}
