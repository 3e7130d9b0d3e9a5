use crate::defect::Population;
use crate::output::OutputError;
use crate::setup::RunDirectory;
use plotters::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

const FRAME_SIZE: (u32, u32) = (1200, 900);
// Board extent in micrometres.
const X_RANGE: (f64, f64) = (-600.0, 600.0);
const Y_RANGE: (f64, f64) = (-435.0, 435.0);
const METRES_TO_MICRONS: f64 = 1e6;

fn render_error<E: std::fmt::Display>(err: E) -> OutputError {
    OutputError::Render(err.to_string())
}

/// Draw the board as a PNG: +1 defects red, −1 defects blue.
pub fn render_frame(path: &Path, population: &Population) -> Result<(), OutputError> {
    let root = BitMapBackend::new(path, FRAME_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(render_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Number of defects: {}", population.len()), ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(45)
        .y_label_area_size(60)
        .build_cartesian_2d(X_RANGE.0..X_RANGE.1, Y_RANGE.0..Y_RANGE.1)
        .map_err(render_error)?;

    chart
        .configure_mesh()
        .x_desc("x-position (µm)")
        .y_desc("y-position (µm)")
        .draw()
        .map_err(render_error)?;

    chart
        .draw_series(population.iter().map(|defect| {
            let position = defect.position() * METRES_TO_MICRONS;
            let color = if defect.strength() > 0.0 { RED } else { BLUE };
            Circle::new((position.x, position.y), 3, color.filled())
        }))
        .map_err(render_error)?;

    root.present().map_err(render_error)?;
    Ok(())
}

/// Assemble `frames/*.png` into `video.mp4` with an external `ffmpeg`.
pub fn frames_to_video(run: &RunDirectory, fps: u32) -> Result<PathBuf, OutputError> {
    let output = run.root().join("video.mp4");
    let pattern = run.frames_dir().join("*.png");

    let status = Command::new("ffmpeg")
        .args(["-y", "-loglevel", "error", "-framerate"])
        .arg(fps.to_string())
        .args(["-pattern_type", "glob", "-i"])
        .arg(&pattern)
        .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
        .arg(&output)
        .status()
        .map_err(|e| OutputError::Video(format!("could not launch ffmpeg: {e}")))?;

    if !status.success() {
        return Err(OutputError::Video(format!("ffmpeg exited with {status}")));
    }

    info!(path = %output.display(), "Assembled video");
    Ok(output)
}
