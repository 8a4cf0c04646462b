use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use colored::*;
use std::fs;
use std::path::Path;
use std::time::Duration;

use moodcam::args::Args;
use moodcam::camera::{CameraSource, FrameSource};
use moodcam::classifier::{ClassifierClient, EmotionAnalyzer};
use moodcam::config::AppConfig;
use moodcam::output::WindowOutput;
use moodcam::quotes::QuoteCatalog;
use moodcam::render::{self, OverlayStyle, TextPainter};
use moodcam::session::{CaptureSession, SessionState};
use moodcam::signal::ReadinessSignal;
use moodcam::ttf::FontRenderer;
use moodcam::types::AnalysisOutcome;

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list {
        let cameras = nokhwa::query(nokhwa::utils::ApiBackend::Auto)?;
        println!("Available Cameras:");
        println!("{:<5} | {:<30} | {:<10}", "Index", "Name", "Misc");
        println!("{}", "-".repeat(60));
        for cam in cameras {
            println!(
                "{:<5} | {:<30} | {:?}",
                cam.index(),
                cam.human_name(),
                cam.misc()
            );
        }
        return Ok(());
    }

    let config = AppConfig::load(&args.config)?;

    if let Some(image_path) = &args.image {
        return run_photo(image_path, &config);
    }

    run_live(&args, &config)
}

fn make_painter(config: &AppConfig) -> TextPainter {
    TextPainter::new(
        FontRenderer::try_load(&config.ui.font_family),
        config.ui.font_size_pt as f32,
        config.ui.bitmap_scale,
    )
}

fn make_style(config: &AppConfig) -> OverlayStyle {
    OverlayStyle {
        highlight_faces: config.ui.highlight_faces,
        ..OverlayStyle::default()
    }
}

fn run_live(args: &Args, config: &AppConfig) -> Result<()> {
    // 1. Scratch/captures directory must exist before the classifier can
    //    use it for snapshot handoff.
    fs::create_dir_all(&config.paths.captures_dir)?;

    // 2. Collaborators
    let quotes = QuoteCatalog::load(&config.paths.quotes_file);
    let classifier = ClassifierClient::spawn(
        &config.classifier.program,
        &config.classifier.args,
        &config.paths.captures_dir,
    )?;

    // 3. Camera. Acquisition failure is fatal and surfaced right here.
    let camera = match CameraSource::new(args.cam_index) {
        Ok(cam) => cam,
        Err(e) => {
            eprintln!("{}", format!("Could not open camera: {e:#}").red());
            return Err(e);
        }
    };
    let width = camera.width() as usize;
    let height = camera.height() as usize;

    // 4. Window + session
    let mut window = WindowOutput::new(&config.ui.window_title, width, height)?;
    let mut session = CaptureSession::start(
        Box::new(camera),
        Box::new(classifier),
        quotes,
        ReadinessSignal::new(config.paths.signal_file.clone()),
        config.paths.captures_dir.clone(),
        make_painter(config),
        make_style(config),
        Duration::from_millis(config.timing.error_hold_ms),
        Duration::from_millis(config.timing.noface_hold_ms),
    )?;

    println!("Press 's' to scan your emotion, 'r' to reset, 'q' to quit.");

    while window.is_open() && session.state() != SessionState::Terminated {
        for key in window.keys_pressed() {
            match key {
                minifb::Key::S => session.request_scan(),
                minifb::Key::R => session.request_reset(),
                minifb::Key::Q | minifb::Key::Escape => session.request_quit(),
                _ => {}
            }
        }
        if session.state() == SessionState::Terminated {
            break;
        }

        session.tick()?;

        if let Some(frame) = session.display_frame() {
            window.update(frame)?;
        }
    }

    // Window closed or quit requested: either way run full teardown.
    session.request_quit();
    Ok(())
}

/// Analyze a single image file, annotate it, persist it under the
/// captures directory with a timestamped name, and show the result until
/// the window is dismissed.
fn run_photo(image_path: &Path, config: &AppConfig) -> Result<()> {
    fs::create_dir_all(&config.paths.captures_dir)?;

    let mut classifier = ClassifierClient::spawn(
        &config.classifier.program,
        &config.classifier.args,
        &config.paths.captures_dir,
    )?;

    let mut image = image::open(image_path)
        .with_context(|| format!("Error loading image {}", image_path.display()))?
        .to_rgb8();

    let painter = make_painter(config);
    let style = make_style(config);

    match classifier.analyze_path(image_path) {
        AnalysisOutcome::Detections(faces) => {
            render::draw_detections(&mut image, &faces, &painter, &style);
        }
        AnalysisOutcome::NoFace => {
            println!("No face found in {}.", image_path.display());
        }
        AnalysisOutcome::AnalysisError(reason) => {
            eprintln!("{}", format!("Error detecting emotion: {}", reason).red());
            render::draw_error_banner(&mut image, &painter, &style);
        }
    }

    let stem = image_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("photo");
    let ext = image_path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("jpg");
    let filename = format!("{}_{}.{}", stem, Local::now().format("%Y%m%d_%H%M%S"), ext);
    let save_path = config.paths.captures_dir.join(filename);
    image::DynamicImage::ImageRgb8(image.clone())
        .save(&save_path)
        .with_context(|| format!("Failed to save processed image {}", save_path.display()))?;
    println!("Saved processed image to {}", save_path.display());

    let mut window = WindowOutput::new(
        &config.ui.window_title,
        image.width() as usize,
        image.height() as usize,
    )?;
    window.update(&image)?;
    while window.is_open() {
        if window.is_key_down(minifb::Key::Q) || window.is_key_down(minifb::Key::Escape) {
            break;
        }
        window.refresh()?;
    }

    Ok(())
}
