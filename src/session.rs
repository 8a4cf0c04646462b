use crate::camera::FrameSource;
use crate::classifier::EmotionAnalyzer;
use crate::quotes::QuoteCatalog;
use crate::render::{self, OverlayStyle, TextPainter};
use crate::signal::ReadinessSignal;
use crate::types::{AnalysisOutcome, Emotion, Frame};
use anyhow::{Context, Result};
use chrono::Local;
use colored::*;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed but not yet streaming (no camera acquired).
    Idle,
    /// Live view: every tick pulls one frame.
    Streaming,
    /// A snapshot is with the classifier. The loop blocks here for the
    /// full classifier latency; there is no cancellation.
    Scanning,
    /// A result (or error banner) is on screen; frame pulls are paused.
    ResultDisplayed,
    /// Camera released, signal cleared. Final.
    Terminated,
}

/// One camera-acquisition-to-release lifetime: owns the device handle,
/// the current frame, and the interaction state machine.
pub struct CaptureSession {
    source: Option<Box<dyn FrameSource>>,
    analyzer: Box<dyn EmotionAnalyzer>,
    quotes: QuoteCatalog,
    signal: ReadinessSignal,
    captures_dir: PathBuf,
    painter: TextPainter,
    style: OverlayStyle,
    error_hold: Duration,
    noface_hold: Duration,

    state: SessionState,
    live_frame: Option<Frame>,
    held_frame: Option<Frame>,
    /// Set on the auto-resume paths (error banner, no face); the success
    /// path leaves it empty and waits for an explicit reset.
    resume_at: Option<Instant>,
}

impl CaptureSession {
    /// Take ownership of an acquired camera, write the readiness signal,
    /// and enter the live view. The captures directory is created here so
    /// later writes cannot fail on a missing parent.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        source: Box<dyn FrameSource>,
        analyzer: Box<dyn EmotionAnalyzer>,
        quotes: QuoteCatalog,
        signal: ReadinessSignal,
        captures_dir: PathBuf,
        painter: TextPainter,
        style: OverlayStyle,
        error_hold: Duration,
        noface_hold: Duration,
    ) -> Result<Self> {
        fs::create_dir_all(&captures_dir).with_context(|| {
            format!("Failed to create captures directory {}", captures_dir.display())
        })?;

        let mut session = Self {
            source: Some(source),
            analyzer,
            quotes,
            signal,
            captures_dir,
            painter,
            style,
            error_hold,
            noface_hold,
            state: SessionState::Idle,
            live_frame: None,
            held_frame: None,
            resume_at: None,
        };

        // Camera is acquired; tell the launcher we are live.
        session.signal.signal()?;
        session.state = SessionState::Streaming;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The frame to blit this tick: the held result while one is shown,
    /// the live frame otherwise.
    pub fn display_frame(&self) -> Option<&Frame> {
        match self.state {
            SessionState::ResultDisplayed => self.held_frame.as_ref(),
            _ => self.live_frame.as_ref(),
        }
    }

    pub fn tick(&mut self) -> Result<()> {
        self.tick_at(Instant::now())
    }

    /// One scheduler tick. Pulls a frame while streaming; while a result
    /// is held, resumes the live view once an auto-resume deadline has
    /// passed. A frame pull failure is fatal for the session: teardown
    /// runs and the error propagates to whoever started us.
    pub fn tick_at(&mut self, now: Instant) -> Result<()> {
        match self.state {
            SessionState::Streaming => {
                let grabbed = match self.source.as_mut() {
                    Some(source) => source.grab(),
                    None => return Ok(()),
                };
                match grabbed {
                    Ok(frame) => {
                        self.live_frame = Some(frame);
                        Ok(())
                    }
                    Err(e) => {
                        self.teardown();
                        Err(e).context("Failed to grab frame; ending session")
                    }
                }
            }
            SessionState::ResultDisplayed => {
                if let Some(deadline) = self.resume_at {
                    if now >= deadline {
                        self.resume();
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn request_scan(&mut self) {
        self.scan_at(Instant::now());
    }

    /// Snapshot the current frame and run it through the classifier. The
    /// classifier call blocks; live pulls stay suspended until the result
    /// is dismissed.
    pub fn scan_at(&mut self, now: Instant) {
        if self.state != SessionState::Streaming {
            return;
        }
        let Some(snapshot) = self.live_frame.clone() else {
            return;
        };

        self.state = SessionState::Scanning;
        println!("Image captured. Analyzing emotion...");
        let outcome = self.analyzer.analyze(&snapshot);
        self.apply_outcome(snapshot, outcome, now);
    }

    fn apply_outcome(&mut self, snapshot: Frame, outcome: AnalysisOutcome, now: Instant) {
        match outcome {
            AnalysisOutcome::Detections(faces) => {
                let mut annotated = snapshot;
                render::draw_detections(&mut annotated, &faces, &self.painter, &self.style);

                // The first detection is the primary one: it picks the
                // quote and names the capture file.
                let primary = faces.first();
                let dominant = primary.map(|f| f.dominant);
                if let Some(emotion) = dominant {
                    println!("Detected emotion: {}", emotion);
                    let quote = self.quotes.pick(emotion.label());
                    println!("Displayed quote: {}", quote);
                    let max_width = (annotated.width() as usize).saturating_sub(20);
                    render::draw_wrapped_text(
                        &mut annotated,
                        &self.painter,
                        &self.style,
                        &quote,
                        (10, 40),
                        max_width,
                        self.style.quote_color,
                    );
                }

                self.persist_capture(&annotated, dominant);

                self.held_frame = Some(annotated);
                self.resume_at = None;
                self.state = SessionState::ResultDisplayed;
            }
            AnalysisOutcome::NoFace => {
                // Nothing usable, nothing alarming: show the plain
                // snapshot briefly, then resume.
                println!("No face found in the snapshot.");
                self.held_frame = Some(snapshot);
                self.resume_at = Some(now + self.noface_hold);
                self.state = SessionState::ResultDisplayed;
            }
            AnalysisOutcome::AnalysisError(reason) => {
                eprintln!("{}", format!("Error detecting emotion: {}", reason).red());
                let mut banner = snapshot;
                render::draw_error_banner(&mut banner, &self.painter, &self.style);
                self.held_frame = Some(banner);
                self.resume_at = Some(now + self.error_hold);
                self.state = SessionState::ResultDisplayed;
            }
        }
    }

    /// Write the annotated capture. A failed write is reported but never
    /// ends the session.
    fn persist_capture(&self, annotated: &Frame, dominant: Option<Emotion>) {
        let filename = capture_filename(dominant);
        let path = self.captures_dir.join(&filename);
        let img = image::DynamicImage::ImageRgb8(annotated.clone());
        match img.save(&path) {
            Ok(()) => println!("Image saved as {}.", path.display()),
            Err(e) => eprintln!(
                "{}",
                format!("Failed to save capture {}: {}", path.display(), e).red()
            ),
        }
    }

    /// Dismiss a held result and return to the live view.
    pub fn request_reset(&mut self) {
        if self.state == SessionState::ResultDisplayed {
            self.resume();
        }
    }

    fn resume(&mut self) {
        self.held_frame = None;
        self.resume_at = None;
        self.state = SessionState::Streaming;
    }

    /// End the session from any state: release the camera, clear the
    /// readiness signal.
    pub fn request_quit(&mut self) {
        if self.state != SessionState::Terminated {
            println!("Exiting...");
            self.teardown();
        }
    }

    fn teardown(&mut self) {
        self.source = None; // drops the camera handle
        if let Err(e) = self.signal.clear() {
            eprintln!("{}", format!("{e:#}").red());
        }
        self.state = SessionState::Terminated;
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        // Best effort teardown for every exit path, including panics
        // unwinding through the loop.
        if self.state != SessionState::Terminated {
            self.source = None;
            let _ = self.signal.clear();
        }
    }
}

/// Filesystem-safe capture filename: the dominant label (lowercased,
/// spaces replaced) when there is one, a timestamp otherwise.
pub fn capture_filename(dominant: Option<Emotion>) -> String {
    match dominant {
        Some(emotion) => format!("{}.jpg", sanitize_label(emotion.label())),
        None => format!("{}.jpg", Local::now().format("%Y%m%d_%H%M%S")),
    }
}

pub fn sanitize_label(label: &str) -> String {
    label.trim().to_lowercase().replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EmotionScores, FaceDetection, Rect};
    use std::collections::VecDeque;

    struct FakeSource {
        frames_left: i32,
    }

    impl FakeSource {
        fn endless() -> Box<Self> {
            Box::new(Self { frames_left: i32::MAX })
        }

        fn failing_after(n: i32) -> Box<Self> {
            Box::new(Self { frames_left: n })
        }
    }

    impl FrameSource for FakeSource {
        fn grab(&mut self) -> Result<Frame> {
            if self.frames_left <= 0 {
                anyhow::bail!("device went away");
            }
            self.frames_left -= 1;
            Ok(Frame::from_pixel(64, 48, image::Rgb([10, 20, 30])))
        }

        fn width(&self) -> u32 {
            64
        }

        fn height(&self) -> u32 {
            48
        }

        fn name(&self) -> String {
            "fake".to_string()
        }
    }

    struct FakeAnalyzer {
        outcomes: VecDeque<AnalysisOutcome>,
    }

    impl FakeAnalyzer {
        fn scripted(outcomes: Vec<AnalysisOutcome>) -> Box<Self> {
            Box::new(Self {
                outcomes: outcomes.into(),
            })
        }
    }

    impl EmotionAnalyzer for FakeAnalyzer {
        fn analyze(&mut self, _frame: &Frame) -> AnalysisOutcome {
            self.outcomes
                .pop_front()
                .unwrap_or(AnalysisOutcome::NoFace)
        }

        fn analyze_path(&mut self, _path: &std::path::Path) -> AnalysisOutcome {
            self.analyze(&Frame::new(1, 1))
        }
    }

    fn happy_face() -> FaceDetection {
        FaceDetection {
            region: Rect::new(10.0, 10.0, 20.0, 20.0),
            scores: EmotionScores {
                happy: 90.0,
                ..Default::default()
            },
            dominant: crate::types::Emotion::Happy,
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        session: CaptureSession,
        signal: ReadinessSignal,
        captures_dir: PathBuf,
    }

    fn fixture(source: Box<dyn FrameSource>, outcomes: Vec<AnalysisOutcome>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let captures_dir = dir.path().join("captures");
        let signal = ReadinessSignal::new(dir.path().join("camera_ready.signal"));
        let session = CaptureSession::start(
            source,
            FakeAnalyzer::scripted(outcomes),
            QuoteCatalog::parse("[happy]\nSmile!"),
            signal.clone(),
            captures_dir.clone(),
            TextPainter::bitmap(1),
            OverlayStyle::default(),
            Duration::from_millis(100),
            Duration::from_millis(50),
        )
        .unwrap();
        Fixture {
            _dir: dir,
            session,
            signal,
            captures_dir,
        }
    }

    #[test]
    fn start_enters_streaming_and_signals() {
        let f = fixture(FakeSource::endless(), vec![]);
        assert_eq!(f.session.state(), SessionState::Streaming);
        assert!(f.signal.is_signaled());
        assert!(f.captures_dir.exists());
    }

    #[test]
    fn successful_scan_holds_until_reset() {
        let mut f = fixture(
            FakeSource::endless(),
            vec![AnalysisOutcome::Detections(vec![happy_face()])],
        );
        let t0 = Instant::now();
        f.session.tick_at(t0).unwrap();
        f.session.scan_at(t0);
        assert_eq!(f.session.state(), SessionState::ResultDisplayed);
        assert!(f.session.display_frame().is_some());

        // No amount of ticking resumes the live view on its own.
        f.session.tick_at(t0 + Duration::from_secs(3600)).unwrap();
        assert_eq!(f.session.state(), SessionState::ResultDisplayed);

        f.session.request_reset();
        assert_eq!(f.session.state(), SessionState::Streaming);
    }

    #[test]
    fn successful_scan_persists_annotated_capture() {
        let mut f = fixture(
            FakeSource::endless(),
            vec![AnalysisOutcome::Detections(vec![happy_face()])],
        );
        let t0 = Instant::now();
        f.session.tick_at(t0).unwrap();
        f.session.scan_at(t0);
        assert!(f.captures_dir.join("happy.jpg").exists());
    }

    #[test]
    fn failed_scan_auto_resumes_after_hold() {
        let mut f = fixture(
            FakeSource::endless(),
            vec![AnalysisOutcome::AnalysisError("backend down".into())],
        );
        let t0 = Instant::now();
        f.session.tick_at(t0).unwrap();
        f.session.scan_at(t0);
        assert_eq!(f.session.state(), SessionState::ResultDisplayed);

        // Before the hold elapses the banner stays.
        f.session.tick_at(t0 + Duration::from_millis(10)).unwrap();
        assert_eq!(f.session.state(), SessionState::ResultDisplayed);

        // After the hold the live view resumes without a reset.
        f.session.tick_at(t0 + Duration::from_millis(150)).unwrap();
        assert_eq!(f.session.state(), SessionState::Streaming);
    }

    #[test]
    fn noface_scan_auto_resumes_and_persists_nothing() {
        let mut f = fixture(FakeSource::endless(), vec![AnalysisOutcome::NoFace]);
        let t0 = Instant::now();
        f.session.tick_at(t0).unwrap();
        f.session.scan_at(t0);
        assert_eq!(f.session.state(), SessionState::ResultDisplayed);
        f.session.tick_at(t0 + Duration::from_millis(60)).unwrap();
        assert_eq!(f.session.state(), SessionState::Streaming);
        let entries: Vec<_> = std::fs::read_dir(&f.captures_dir).unwrap().collect();
        assert!(entries.is_empty());
    }

    #[test]
    fn scan_without_a_frame_is_ignored() {
        let mut f = fixture(FakeSource::endless(), vec![]);
        f.session.request_scan();
        assert_eq!(f.session.state(), SessionState::Streaming);
    }

    #[test]
    fn grab_failure_is_fatal_and_clears_signal() {
        let mut f = fixture(FakeSource::failing_after(1), vec![]);
        let t0 = Instant::now();
        f.session.tick_at(t0).unwrap();
        let err = f.session.tick_at(t0 + Duration::from_millis(1));
        assert!(err.is_err());
        assert_eq!(f.session.state(), SessionState::Terminated);
        assert!(!f.signal.is_signaled());
    }

    #[test]
    fn quit_from_any_state_terminates_and_clears_signal() {
        let mut f = fixture(
            FakeSource::endless(),
            vec![AnalysisOutcome::Detections(vec![happy_face()])],
        );
        let t0 = Instant::now();
        f.session.tick_at(t0).unwrap();
        f.session.scan_at(t0);
        assert_eq!(f.session.state(), SessionState::ResultDisplayed);

        f.session.request_quit();
        assert_eq!(f.session.state(), SessionState::Terminated);
        assert!(!f.signal.is_signaled());

        // Further requests are no-ops.
        f.session.request_scan();
        f.session.request_reset();
        assert_eq!(f.session.state(), SessionState::Terminated);
    }

    #[test]
    fn drop_clears_signal_as_best_effort() {
        let dir = tempfile::tempdir().unwrap();
        let signal = ReadinessSignal::new(dir.path().join("camera_ready.signal"));
        {
            let _session = CaptureSession::start(
                FakeSource::endless(),
                FakeAnalyzer::scripted(vec![]),
                QuoteCatalog::default(),
                signal.clone(),
                dir.path().join("captures"),
                TextPainter::bitmap(1),
                OverlayStyle::default(),
                Duration::from_millis(100),
                Duration::from_millis(50),
            )
            .unwrap();
            assert!(signal.is_signaled());
        }
        assert!(!signal.is_signaled());
    }

    #[test]
    fn filenames_are_filesystem_safe() {
        assert_eq!(
            capture_filename(Some(crate::types::Emotion::Happy)),
            "happy.jpg"
        );
        assert_eq!(sanitize_label("Mixed Case Label"), "mixed_case_label");
        // Timestamp fallback: stable shape, no spaces.
        let name = capture_filename(None);
        assert!(name.ends_with(".jpg"));
        assert!(!name.contains(' '));
    }
}
