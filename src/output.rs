// Persistence of run artifacts: population time series, per-defect position
// logs and rendered frames.
use crate::defect::Population;
use crate::setup::RunDirectory;
use crate::visualisation;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to render frame: {0}")]
    Render(String),
    #[error("video assembly failed: {0}")]
    Video(String),
}

impl OutputError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> OutputError {
        let path = path.into();
        move |source| OutputError::Io { path, source }
    }
}

/// Receiver of everything the simulation loop hands off.
pub trait OutputSink {
    /// Called once per step with the elapsed simulated time.
    fn record_count(&mut self, time: f64, count: usize) -> Result<(), OutputError>;

    /// Called on the save cadence.
    fn save_frame(&mut self, step: usize, population: &Population) -> Result<(), OutputError>;

    fn finish(&mut self) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn record_count(&mut self, _time: f64, _count: usize) -> Result<(), OutputError> {
        Ok(())
    }

    fn save_frame(&mut self, _step: usize, _population: &Population) -> Result<(), OutputError> {
        Ok(())
    }
}

// MARK: Run Output
/// Writes a run's artifacts into its [`RunDirectory`].
pub struct RunOutput {
    run: RunDirectory,
    counts_path: PathBuf,
    counts: BufWriter<File>,
    pad_width: usize,
    render_frames: bool,
}

impl RunOutput {
    /// Open `data/number.csv` and write its two header rows.
    pub fn create(
        run: &RunDirectory,
        total_steps: usize,
        render_frames: bool,
    ) -> Result<Self, OutputError> {
        let counts_path = run.data_dir().join("number.csv");
        let file = File::create(&counts_path).map_err(OutputError::io(&counts_path))?;
        let mut counts = BufWriter::new(file);
        writeln!(counts, "time,number")
            .and_then(|_| writeln!(counts, "s,"))
            .map_err(OutputError::io(&counts_path))?;

        Ok(RunOutput {
            run: run.clone(),
            counts_path,
            counts,
            pad_width: total_steps.to_string().len(),
            render_frames,
        })
    }

    pub fn run(&self) -> &RunDirectory {
        &self.run
    }

    /// `frames/<step>.png`, zero padded to the digit count of the total step count.
    pub fn frame_path(&self, step: usize) -> PathBuf {
        self.run
            .frames_dir()
            .join(format!("{:0width$}.png", step, width = self.pad_width))
    }

    fn append_positions(&self, population: &Population) -> Result<(), OutputError> {
        let data_dir = self.run.data_dir();
        for defect in population {
            let path = data_dir.join(format!("{}.txt", defect.name()));
            let position = defect.position();
            // Debug formatting keeps the trailing `.0` the analysis scripts expect.
            let line = format!(
                "{:?} {:?} {:?} {:?}",
                defect.strength(),
                position.x,
                position.y,
                defect.orientation()
            );
            append_line(&path, &line)?;
        }
        Ok(())
    }
}

fn append_line(path: &Path, line: &str) -> Result<(), OutputError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(OutputError::io(path))?;
    writeln!(file, "{line}").map_err(OutputError::io(path))
}

impl OutputSink for RunOutput {
    fn record_count(&mut self, time: f64, count: usize) -> Result<(), OutputError> {
        writeln!(self.counts, "{time},{count}").map_err(OutputError::io(&self.counts_path))
    }

    fn save_frame(&mut self, step: usize, population: &Population) -> Result<(), OutputError> {
        self.append_positions(population)?;
        if self.render_frames {
            visualisation::render_frame(&self.frame_path(step), population)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        self.counts.flush().map_err(OutputError::io(&self.counts_path))
    }
}
