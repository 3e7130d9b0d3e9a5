use crate::config::{ExperimentConfig, ExperimentType, QuenchConfig};
use crate::defect::{Defect, Population, PopulationError};
use nalgebra::Vector2;
use rand::Rng;
use std::f64::consts::PI;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Build the initial population described by the experiment.
pub fn initial_population<R: Rng>(
    config: &ExperimentConfig,
    rng: &mut R,
) -> Result<Population, PopulationError> {
    match config.experiment_type {
        ExperimentType::Place => place_defects(config),
        ExperimentType::Quench => quench(&config.quench, rng),
    }
}

/// Hand-placed defects. Unnamed entries become `defect<i>` (1-based).
pub fn place_defects(config: &ExperimentConfig) -> Result<Population, PopulationError> {
    let defects = config
        .defects
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let name = spec.name.clone().unwrap_or_else(|| format!("defect{}", i + 1));
            Defect::new(name, spec.strength, spec.position, spec.orientation)
        })
        .collect();

    let population = Population::new(defects)?;
    info!(defects = population.len(), "Placed defects");
    Ok(population)
}

/// Random bulk placement after a rapid quench.
///
/// Positions are uniform in a `width × height` box centred on the origin. The
/// first half are +1, the rest −1.
pub fn quench<R: Rng>(params: &QuenchConfig, rng: &mut R) -> Result<Population, PopulationError> {
    let positives = params.count / 2;
    let mut defects = Vec::with_capacity(params.count);

    for i in 0..params.count {
        let position = Vector2::new(
            params.width * (rng.random::<f64>() - 0.5),
            params.height * (rng.random::<f64>() - 0.5),
        );
        let name = format!("defect{}", i + 1);
        if i < positives {
            defects.push(Defect::plus(name, position, PI));
        } else {
            defects.push(Defect::minus(name, position, PI));
        }
    }

    let population = Population::new(defects)?;
    info!(defects = population.len(), net_charge = population.net_charge(), "Quenched film");
    Ok(population)
}

// MARK: Run Directory
/// Output location of one run: `<root>/exp<k>/{frames,data}`.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    number: usize,
    root: PathBuf,
}

impl RunDirectory {
    /// Allocate the next `exp<k>` under `runs_root`, creating it if needed.
    pub fn prepare(runs_root: impl AsRef<Path>) -> io::Result<Self> {
        let runs_root = runs_root.as_ref();
        fs::create_dir_all(runs_root)?;

        let existing = fs::read_dir(runs_root)?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("exp"))
            .count();

        let number = existing + 1;
        let root = runs_root.join(format!("exp{number}"));
        fs::create_dir(&root)?;
        fs::create_dir(root.join("frames"))?;
        fs::create_dir(root.join("data"))?;

        info!(run = number, path = %root.display(), "Prepared run directory");
        Ok(RunDirectory { number, root })
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join("frames")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }
}
