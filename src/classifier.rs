use crate::types::{AnalysisOutcome, Emotion, EmotionScores, FaceDetection, Frame, Rect};
use anyhow::{Context, Result};
use colored::*;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

/// The analysis call boundary. Implementations return an outcome, never a
/// propagated error: transport failures surface as `AnalysisError` so the
/// session can recover locally.
pub trait EmotionAnalyzer {
    fn analyze(&mut self, frame: &Frame) -> AnalysisOutcome;

    /// Analyze an image already on disk (still-photo path).
    fn analyze_path(&mut self, path: &Path) -> AnalysisOutcome;
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    image_path: &'a str,
}

#[derive(Deserialize)]
struct RegionWire {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
}

#[derive(Deserialize)]
struct FaceWire {
    region: Option<RegionWire>,
    #[serde(default)]
    emotion: EmotionScores,
    dominant_emotion: Option<String>,
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    status: String,
    #[serde(default)]
    faces: Vec<FaceWire>,
    error: Option<String>,
}

/// Child-process classifier speaking JSON lines: one request object per
/// line on stdin, one response object per line on stdout.
///
/// Known limitation: there is no timeout or cancellation for an in-flight
/// call, so a hung classifier stalls the caller for as long as it stays
/// silent.
pub struct ClassifierClient {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    scratch_dir: PathBuf,
}

impl ClassifierClient {
    /// Spawn the configured classifier command. `scratch_dir` is where
    /// snapshot files are written for the call; it must exist.
    pub fn spawn(program: &str, args: &[String], scratch_dir: &Path) -> Result<Self> {
        println!("Launching classifier: {} {}", program, args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to spawn classifier process '{program}'"))?;

        let stdin = child
            .stdin
            .take()
            .context("Failed to open stdin to classifier")?;
        let stdout = child
            .stdout
            .take()
            .context("Failed to open stdout from classifier")?;

        println!("{}", "Classifier process started".green());

        Ok(Self {
            process: child,
            stdin,
            stdout: BufReader::new(stdout),
            scratch_dir: scratch_dir.to_path_buf(),
        })
    }

    /// One blocking request/response exchange.
    fn request(&mut self, image_path: &Path) -> Result<String> {
        let request = AnalyzeRequest {
            image_path: image_path
                .to_str()
                .context("Snapshot path is not valid UTF-8")?,
        };
        let request_json = serde_json::to_string(&request)?;
        writeln!(self.stdin, "{}", request_json).context("Failed to write to classifier stdin")?;
        self.stdin.flush()?;

        let mut response_line = String::new();
        let read = self
            .stdout
            .read_line(&mut response_line)
            .context("Failed to read from classifier stdout")?;
        if read == 0 {
            anyhow::bail!("Classifier closed its output stream");
        }
        Ok(response_line)
    }
}

impl EmotionAnalyzer for ClassifierClient {
    fn analyze(&mut self, frame: &Frame) -> AnalysisOutcome {
        // The classifier wants a file, so the snapshot takes a round trip
        // through the scratch dir and is removed again afterwards.
        let temp_path = self.scratch_dir.join("temp.jpg");
        if let Err(e) = image::DynamicImage::ImageRgb8(frame.clone()).save(&temp_path) {
            return AnalysisOutcome::AnalysisError(format!("Failed to save snapshot: {e}"));
        }

        let outcome = self.analyze_path(&temp_path);
        let _ = std::fs::remove_file(&temp_path);
        outcome
    }

    fn analyze_path(&mut self, path: &Path) -> AnalysisOutcome {
        match self.request(path) {
            Ok(line) => decode_response_line(&line),
            Err(e) => AnalysisOutcome::AnalysisError(format!("{e:#}")),
        }
    }
}

impl Drop for ClassifierClient {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

/// Map one response line onto an outcome. An unparseable line or a
/// reported failure is an `AnalysisError`; success with zero faces is
/// `NoFace`.
pub fn decode_response_line(line: &str) -> AnalysisOutcome {
    let response: AnalyzeResponse = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            return AnalysisOutcome::AnalysisError(format!("Bad classifier response: {e}"))
        }
    };

    if response.status != "success" {
        return AnalysisOutcome::AnalysisError(
            response
                .error
                .unwrap_or_else(|| "classifier reported failure".to_string()),
        );
    }

    if response.faces.is_empty() {
        return AnalysisOutcome::NoFace;
    }

    let detections = response.faces.into_iter().map(decode_face).collect();
    AnalysisOutcome::Detections(detections)
}

fn decode_face(face: FaceWire) -> FaceDetection {
    // A missing region decodes to an empty rect, which the renderer skips.
    let region = face
        .region
        .map(|r| Rect::new(r.x, r.y, r.w, r.h))
        .unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0));

    let dominant = face
        .dominant_emotion
        .as_deref()
        .and_then(Emotion::parse)
        .unwrap_or_else(|| face.emotion.dominant());

    FaceDetection {
        region,
        scores: face.emotion,
        dominant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_with_faces_decodes_detections() {
        let line = r#"{
            "status": "success",
            "faces": [{
                "region": {"x": 10.0, "y": 20.0, "w": 100.0, "h": 120.0},
                "emotion": {"angry": 10.0, "disgust": 5.0, "sad": 20.0, "happy": 65.0},
                "dominant_emotion": "happy"
            }]
        }"#;
        match decode_response_line(line) {
            AnalysisOutcome::Detections(faces) => {
                assert_eq!(faces.len(), 1);
                assert_eq!(faces[0].dominant, Emotion::Happy);
                assert_eq!(faces[0].region, Rect::new(10.0, 20.0, 100.0, 120.0));
                assert_eq!(faces[0].scores.stress_grade(), 35.0);
            }
            other => panic!("expected detections, got {other:?}"),
        }
    }

    #[test]
    fn success_with_no_faces_is_noface() {
        let line = r#"{"status": "success", "faces": []}"#;
        assert!(matches!(
            decode_response_line(line),
            AnalysisOutcome::NoFace
        ));
    }

    #[test]
    fn reported_error_becomes_analysis_error() {
        let line = r#"{"status": "error", "error": "no face could be detected"}"#;
        match decode_response_line(line) {
            AnalysisOutcome::AnalysisError(reason) => {
                assert_eq!(reason, "no face could be detected");
            }
            other => panic!("expected analysis error, got {other:?}"),
        }
    }

    #[test]
    fn garbage_line_becomes_analysis_error() {
        assert!(matches!(
            decode_response_line("not json at all"),
            AnalysisOutcome::AnalysisError(_)
        ));
    }

    #[test]
    fn missing_dominant_falls_back_to_argmax() {
        let line = r#"{
            "status": "success",
            "faces": [{
                "region": {"x": 0.0, "y": 0.0, "w": 50.0, "h": 50.0},
                "emotion": {"sad": 80.0, "happy": 10.0}
            }]
        }"#;
        match decode_response_line(line) {
            AnalysisOutcome::Detections(faces) => assert_eq!(faces[0].dominant, Emotion::Sad),
            other => panic!("expected detections, got {other:?}"),
        }
    }

    #[test]
    fn missing_region_decodes_to_empty_rect() {
        let line = r#"{
            "status": "success",
            "faces": [{"emotion": {"neutral": 99.0}}]
        }"#;
        match decode_response_line(line) {
            AnalysisOutcome::Detections(faces) => assert!(faces[0].region.is_empty()),
            other => panic!("expected detections, got {other:?}"),
        }
    }
}
