use anyhow::{Context, Result};
use clap::Parser;
use defect_dynamics::physics::BrownianStep;
use defect_dynamics::setup::{self, RunDirectory};
use defect_dynamics::visualisation;
use defect_dynamics::{ExperimentConfig, RunOutput, Simulation};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "defect-dynamics", about = "Point-defect dynamics in thin liquid-crystal films")]
struct Args {
    /// Experiment description (JSON)
    #[arg(short, long, default_value = "experiments/default.json")]
    experiment: PathBuf,

    /// Directory holding the numbered run folders
    #[arg(long, default_value = "runs")]
    runs_dir: PathBuf,

    /// RNG seed, overriding the experiment file
    #[arg(long)]
    seed: Option<u64>,

    /// Step count, overriding the experiment file
    #[arg(long)]
    steps: Option<usize>,

    /// Skip PNG rendering (position logs and counts are still written)
    #[arg(long)]
    no_frames: bool,

    /// Assemble the frames into a video with ffmpeg afterwards
    #[arg(long)]
    video: bool,

    /// Video frame rate
    #[arg(long, default_value_t = 30)]
    fps: u32,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = ExperimentConfig::load(&args.experiment)
        .with_context(|| format!("loading experiment {}", args.experiment.display()))?;
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(steps) = args.steps {
        config.n = steps;
    }
    if args.no_frames {
        config.render_frames = false;
    }
    config.validate().context("validating overrides")?;

    let seed = config.seed.unwrap_or_else(rand::random);
    info!(seed, "Seeding RNG");
    let mut rng = StdRng::seed_from_u64(seed);

    let population =
        setup::initial_population(&config, &mut rng).context("building initial population")?;
    let run = RunDirectory::prepare(&args.runs_dir).context("preparing run directory")?;
    let mut output = RunOutput::create(&run, config.n, config.render_frames)?;

    let mut sim = Simulation::new(config, population)?;
    let mut noise = BrownianStep::from_film(rng, sim.film())?;
    sim.run(&mut output, &mut noise)?;

    sim.save_statistics(run.root().join("stats.json"))?;
    sim.save_checkpoint(run.root().join("final_state.json"))?;

    if args.video {
        visualisation::frames_to_video(&run, args.fps)?;
    }

    info!(run = run.number(), "Run finished");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
