//! Dynamics of topological point defects in a thin liquid-crystal film.
//!
//! Defects of charge ±1 drift in each other's elastic field (RK4), diffuse
//! under Brownian noise and annihilate in opposite pairs.

pub mod config;
pub mod defect;
pub mod output;
pub mod physics;
pub mod setup;
pub mod simulation;
pub mod visualisation;

pub use config::{AnnihilationPolicy, ExperimentConfig, FilmConstants, VelocityLaw};
pub use defect::{Defect, Population};
pub use output::{NullSink, OutputSink, RunOutput};
pub use physics::{BrownianStep, StochasticStep, ZeroNoise};
pub use simulation::{RunState, Simulation, SimulationError, SimulationStats};
