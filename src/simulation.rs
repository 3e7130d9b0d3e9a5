// External crates
use crate::config::{ConfigError, ExperimentConfig, FilmConstants};
use crate::defect::Population;
use crate::output::{OutputError, OutputSink};
use crate::physics::{self, PhysicsError, StochasticStep};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Steps between progress updates.
pub const PROGRESS_INTERVAL: usize = 100;

// MARK: Errors
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Physics(#[from] PhysicsError),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error("checkpoint I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("checkpoint is not valid JSON: {0}")]
    Checkpoint(#[from] serde_json::Error),
}

// MARK: Data Structures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Initialized,
    Running,
    Completed,
}

/// Series sampled alongside each saved frame; `annihilated_pairs` is a running total.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SimulationStats {
    pub time_points: Vec<f64>,
    pub defect_count: Vec<usize>,
    pub net_charge: Vec<f64>,
    pub annihilated_pairs: usize,
}

impl SimulationStats {
    fn record(&mut self, time: f64, population: &Population) {
        self.time_points.push(time);
        self.defect_count.push(population.len());
        self.net_charge.push(population.net_charge());
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Simulation {
    config: ExperimentConfig,
    film: FilmConstants,
    population: Population,
    step: usize,
    time: f64,
    state: RunState,
    pub stats: SimulationStats,
    #[serde(skip, default = "default_progress")]
    show_progress: bool,
}

fn default_progress() -> bool {
    true
}

// MARK: Implementation
impl Simulation {
    pub fn new(config: ExperimentConfig, population: Population) -> Result<Self, SimulationError> {
        config.validate()?;
        let film = FilmConstants::from_config(&config);

        Ok(Simulation {
            config,
            film,
            population,
            step: 0,
            time: 0.0,
            state: RunState::Initialized,
            stats: SimulationStats::default(),
            show_progress: true,
        })
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn film(&self) -> &FilmConstants {
        &self.film
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn step_index(&self) -> usize {
        self.step
    }

    /// Elapsed simulated time since the first step.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Advance every defect by one step, then resolve annihilations.
    ///
    /// Each defect is integrated against the population as it stood at the
    /// start of the step; positions are committed together afterwards.
    /// Returns the number of annihilated pairs.
    pub fn advance(&mut self, noise: &mut dyn StochasticStep) -> Result<usize, SimulationError> {
        let snapshot = self.population.defects();
        let positions = (0..snapshot.len())
            .map(|i| physics::step(i, snapshot, &self.film, &mut *noise))
            .collect::<Result<Vec<_>, _>>()?;
        self.population.commit_positions(positions);

        let annihilations = physics::find_annihilations(
            self.population.defects(),
            self.film.annihilation_dist,
            self.film.policy,
        );
        let pairs = annihilations.pairs.len();
        if pairs > 0 {
            let removed = self.population.remove_indices(&annihilations.removed());
            debug!(
                step = self.step,
                pairs,
                removed = ?removed,
                remaining = self.population.len(),
                "Annihilation"
            );
            self.stats.annihilated_pairs += pairs;
        }

        self.step += 1;
        self.time = self.step as f64 * self.film.dt;
        Ok(pairs)
    }

    /// Run until `n` steps have been taken, handing state to `sink` along the way.
    ///
    /// A fresh simulation starts at step 0; one restored from a checkpoint
    /// resumes where it stopped. The loop never exits early, even once the
    /// population is empty.
    pub fn run(
        &mut self,
        sink: &mut dyn OutputSink,
        noise: &mut dyn StochasticStep,
    ) -> Result<(), SimulationError> {
        let steps = self.config.n;
        let save_rate = self.config.save_rate;

        info!(
            defects = self.population.len(),
            steps,
            dt = self.film.dt,
            law = ?self.film.law,
            policy = ?self.film.policy,
            "Running simulation"
        );
        self.state = RunState::Running;

        let progress_bar = if self.show_progress {
            ProgressBar::new(steps as u64)
        } else {
            ProgressBar::hidden()
        };
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        progress_bar.set_position(self.step as u64);

        while self.step < steps {
            let i = self.step;
            let elapsed = i as f64 * self.film.dt;

            if i % PROGRESS_INTERVAL == 0 {
                let percent = 100.0 * i as f64 / steps as f64;
                let defects = self.population.len();
                progress_bar.set_message(format!("{percent:.1}% | defects: {defects}"));
                debug!(step = i, percent, defects = self.population.len(), "Progress");
            }

            sink.record_count(elapsed, self.population.len())?;

            if i % save_rate == 0 {
                self.stats.record(elapsed, &self.population);
                sink.save_frame(i, &self.population)?;
            }

            self.advance(noise)?;
            progress_bar.inc(1);
        }

        sink.finish()?;
        self.state = RunState::Completed;
        progress_bar.finish_with_message(format!("done | defects: {}", self.population.len()));
        info!(
            remaining = self.population.len(),
            annihilated_pairs = self.stats.annihilated_pairs,
            "Simulation complete"
        );
        Ok(())
    }

    // Save checkpoint for resuming simulation later
    pub fn save_checkpoint(&self, path: impl AsRef<Path>) -> Result<(), SimulationError> {
        let path = path.as_ref();
        info!(path = %path.display(), step = self.step, "Saving checkpoint");
        let file = File::create(path)?;
        serde_json::to_writer(file, self)?;
        Ok(())
    }

    // Load checkpoint to resume simulation
    pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<Self, SimulationError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading checkpoint");
        let file = File::open(path)?;
        let sim: Simulation = serde_json::from_reader(BufReader::new(file))?;
        sim.config.validate()?;
        Ok(sim)
    }

    pub fn save_statistics(&self, path: impl AsRef<Path>) -> Result<(), SimulationError> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(file, &self.stats)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnnihilationPolicy;
    use crate::defect::Defect;
    use crate::output::NullSink;
    use crate::physics::{BrownianStep, ZeroNoise};
    use nalgebra::Vector2;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::tempdir;

    fn config(n: usize) -> ExperimentConfig {
        let json = format!(
            r#"{{
                "K_3D": 1.0e-11, "h": 1.0e-6, "eta_3D": 0.01,
                "k_B": 1.380649e-23, "T": 300.0, "ra": 1.0e-7,
                "annihilationDist": 2.0e-6,
                "t0": 0.0, "tn": {tn}, "n": {n}, "saveRate": 5,
                "velocityType": "sqrt",
                "defects": [{{ "strength": 1.0, "position": [0.0, 0.0] }}]
            }}"#,
            tn = 0.01 * n.max(1) as f64
        );
        ExperimentConfig::from_json(&json).expect("valid config")
    }

    fn square() -> Population {
        Population::new(vec![
            Defect::plus("defect1", Vector2::new(1e-4, 1e-4), 0.0),
            Defect::minus("defect2", Vector2::new(-1e-4, 1e-4), 0.0),
            Defect::plus("defect3", Vector2::new(-1e-4, -1e-4), 0.0),
            Defect::minus("defect4", Vector2::new(1e-4, -1e-4), 0.0),
        ])
        .expect("unique names")
    }

    #[test]
    fn positions_use_step_start_snapshot() {
        let mut sim = Simulation::new(config(10), square()).expect("sim").with_progress(false);
        let before = sim.population().clone();
        let expected: Vec<Vector2<f64>> = (0..before.len())
            .map(|i| {
                before.defects()[i].position()
                    + physics::rk4_drift(i, before.defects(), sim.film()).expect("finite")
            })
            .collect();

        sim.advance(&mut ZeroNoise).expect("step");

        let after: Vec<Vector2<f64>> = sim.population().iter().map(Defect::position).collect();
        assert_eq!(after, expected);
        assert_eq!(sim.step_index(), 1);
        assert_eq!(sim.time(), sim.film().dt);
    }

    #[test]
    fn run_reaches_completed_and_records_stats() {
        let mut sim = Simulation::new(config(20), square()).expect("sim").with_progress(false);
        assert_eq!(sim.state(), RunState::Initialized);

        sim.run(&mut NullSink, &mut ZeroNoise).expect("run");

        assert_eq!(sim.state(), RunState::Completed);
        assert_eq!(sim.step_index(), sim.config().n);
        assert!((sim.time() - 20.0 * sim.film().dt).abs() < 1e-12);
        // Stats follow the save cadence: saveRate 5 over 20 steps samples 0, 5, 10, 15.
        let dt = sim.film().dt;
        assert_eq!(sim.stats.time_points, vec![0.0, 5.0 * dt, 10.0 * dt, 15.0 * dt]);
        assert_eq!(sim.stats.defect_count.len(), 4);
        assert_eq!(sim.stats.net_charge.len(), 4);
        assert!(sim.stats.net_charge.iter().all(|&q| q == 0.0));
    }

    #[test]
    fn coincident_defects_abort_the_step() {
        let stacked = || {
            Population::new(vec![
                Defect::plus("defect1", Vector2::new(1e-4, 0.0), 0.0),
                Defect::minus("defect2", Vector2::new(1e-4, 0.0), 0.0),
            ])
            .expect("unique names")
        };

        let mut sim = Simulation::new(config(10), stacked()).expect("sim").with_progress(false);
        let err = sim.advance(&mut ZeroNoise).expect_err("singular");
        assert!(matches!(err, SimulationError::Physics(PhysicsError::Singular { .. })));
        assert_eq!(sim.step_index(), 0);
        assert_eq!(sim.population(), &stacked());

        let mut sim = Simulation::new(config(10), stacked()).expect("sim").with_progress(false);
        let err = sim.run(&mut NullSink, &mut ZeroNoise).expect_err("singular");
        assert!(matches!(err, SimulationError::Physics(PhysicsError::Singular { .. })));
        assert_ne!(sim.state(), RunState::Completed);
        assert_eq!(sim.population().len(), 2);
    }

    #[test]
    fn annihilation_policy_is_read_from_config() {
        let chain = || {
            Population::new(vec![
                Defect::plus("a", Vector2::new(-1e-6, 0.0), 0.0),
                Defect::minus("b", Vector2::new(0.0, 0.0), 0.0),
                Defect::plus("c", Vector2::new(1e-6, 0.0), 0.0),
            ])
            .expect("unique names")
        };
        let with_policy = |policy: Option<&str>| {
            let policy = policy
                .map(|p| format!(r#""annihilationPolicy": "{p}","#))
                .unwrap_or_default();
            let json = format!(
                r#"{{
                    "K_3D": 1.0e-11, "h": 1.0e-6, "eta_3D": 0.01,
                    "k_B": 1.380649e-23, "T": 0.0, "ra": 1.0e-7,
                    "annihilationDist": 2.0e-6, {policy}
                    "t0": 0.0, "tn": 1.0e-4, "n": 10, "saveRate": 1,
                    "velocityType": "sqrt",
                    "defects": [{{ "strength": 1.0, "position": [0.0, 0.0] }}]
                }}"#
            );
            ExperimentConfig::from_json(&json).expect("valid config")
        };

        // The reference scan lets `c` claim `b` again: three defects gone.
        let mut sim = Simulation::new(with_policy(Some("firstMatch")), chain())
            .expect("sim")
            .with_progress(false);
        assert_eq!(sim.film().policy, AnnihilationPolicy::FirstMatch);
        assert_eq!(sim.advance(&mut ZeroNoise).expect("step"), 2);
        assert!(sim.population().is_empty());

        let mut sim = Simulation::new(with_policy(None), chain())
            .expect("sim")
            .with_progress(false);
        assert_eq!(sim.film().policy, AnnihilationPolicy::NearestPair);
        assert_eq!(sim.advance(&mut ZeroNoise).expect("step"), 1);
        assert_eq!(sim.population().len(), 1);
    }

    #[test]
    fn checkpoint_resumes_identically() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("checkpoint.json");

        let mut original = Simulation::new(config(10), square()).expect("sim").with_progress(false);
        let mut noise =
            BrownianStep::from_film(StdRng::seed_from_u64(3), original.film()).expect("noise");
        for _ in 0..3 {
            original.advance(&mut noise).expect("step");
        }
        original.save_checkpoint(&path).expect("save");

        let mut restored = Simulation::load_checkpoint(&path).expect("load").with_progress(false);
        assert_eq!(restored.step_index(), 3);
        assert_eq!(restored.population(), original.population());

        original.run(&mut NullSink, &mut ZeroNoise).expect("run");
        restored.run(&mut NullSink, &mut ZeroNoise).expect("run");
        assert_eq!(restored.population(), original.population());
        assert_eq!(restored.step_index(), 10);
    }
}
