use serde::{Deserialize, Serialize};
use std::fmt;

/// An owned RGB raster frame, as pulled from the camera.
pub type Frame = image::ImageBuffer<image::Rgb<u8>, Vec<u8>>;

/// The fixed label set the classifier reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
}

impl Emotion {
    /// Declaration order doubles as the argmax tie-break order.
    pub const ALL: [Emotion; 7] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprise,
        Emotion::Neutral,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Emotion::Angry => "angry",
            Emotion::Disgust => "disgust",
            Emotion::Fear => "fear",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Surprise => "surprise",
            Emotion::Neutral => "neutral",
        }
    }

    /// Capitalized form for overlay lines ("Happy: 65.0%").
    pub fn title(&self) -> &'static str {
        match self {
            Emotion::Angry => "Angry",
            Emotion::Disgust => "Disgust",
            Emotion::Fear => "Fear",
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Surprise => "Surprise",
            Emotion::Neutral => "Neutral",
        }
    }

    pub fn parse(s: &str) -> Option<Emotion> {
        let needle = s.trim().to_lowercase();
        Emotion::ALL.iter().copied().find(|e| e.label() == needle)
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-label confidences in [0,100]. These are independent scores, not a
/// probability simplex: the sum is not assumed to be 100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionScores {
    pub angry: f32,
    pub disgust: f32,
    pub fear: f32,
    pub happy: f32,
    pub sad: f32,
    pub surprise: f32,
    pub neutral: f32,
}

impl EmotionScores {
    pub fn get(&self, emotion: Emotion) -> f32 {
        match emotion {
            Emotion::Angry => self.angry,
            Emotion::Disgust => self.disgust,
            Emotion::Fear => self.fear,
            Emotion::Happy => self.happy,
            Emotion::Sad => self.sad,
            Emotion::Surprise => self.surprise,
            Emotion::Neutral => self.neutral,
        }
    }

    /// Argmax over labels. Ties go to the label listed first in
    /// `Emotion::ALL`, so identical score maps always pick the same label.
    pub fn dominant(&self) -> Emotion {
        let mut best = Emotion::ALL[0];
        let mut best_score = self.get(best);
        for &e in &Emotion::ALL[1..] {
            let s = self.get(e);
            if s > best_score {
                best = e;
                best_score = s;
            }
        }
        best
    }

    /// (label, score) pairs by descending score. Sort is stable, so equal
    /// scores keep declaration order.
    pub fn sorted_desc(&self) -> Vec<(Emotion, f32)> {
        let mut pairs: Vec<(Emotion, f32)> =
            Emotion::ALL.iter().map(|&e| (e, self.get(e))).collect();
        pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        pairs
    }

    /// Sum of the negative-affect scores (angry, disgust, fear, sad),
    /// clamped to [0,100].
    pub fn stress_grade(&self) -> f32 {
        let sum = self.angry + self.disgust + self.fear + self.sad;
        sum.clamp(0.0, 100.0)
    }
}

/// Axis-aligned region within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Classifier regions are not guaranteed valid.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// One classifier result: where the face is and how it scored.
#[derive(Debug, Clone)]
pub struct FaceDetection {
    pub region: Rect,
    pub scores: EmotionScores,
    pub dominant: Emotion,
}

/// What came back from an analysis call. Callers branch on the variant;
/// a failed classification is data, not a propagated error.
#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    Detections(Vec<FaceDetection>),
    NoFace,
    AnalysisError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stress_grade_sums_negative_scores() {
        let scores = EmotionScores {
            angry: 10.0,
            disgust: 5.0,
            fear: 0.0,
            sad: 20.0,
            happy: 65.0,
            ..Default::default()
        };
        assert_eq!(scores.stress_grade(), 35.0);
    }

    #[test]
    fn stress_grade_is_clamped() {
        let high = EmotionScores {
            angry: 90.0,
            disgust: 90.0,
            fear: 90.0,
            sad: 90.0,
            ..Default::default()
        };
        assert_eq!(high.stress_grade(), 100.0);

        let negative = EmotionScores {
            angry: -50.0,
            ..Default::default()
        };
        assert_eq!(negative.stress_grade(), 0.0);
    }

    #[test]
    fn stress_grade_monotonic_in_each_negative_label() {
        let base = EmotionScores {
            angry: 10.0,
            disgust: 10.0,
            fear: 10.0,
            sad: 10.0,
            ..Default::default()
        };
        let grade = base.stress_grade();
        for bumped in [
            EmotionScores { angry: 15.0, ..base },
            EmotionScores { disgust: 15.0, ..base },
            EmotionScores { fear: 15.0, ..base },
            EmotionScores { sad: 15.0, ..base },
        ] {
            assert!(bumped.stress_grade() >= grade);
        }
    }

    #[test]
    fn dominant_breaks_ties_deterministically() {
        // All zeros: first label in declaration order wins.
        let flat = EmotionScores::default();
        assert_eq!(flat.dominant(), Emotion::Angry);

        let tied = EmotionScores {
            happy: 50.0,
            neutral: 50.0,
            ..Default::default()
        };
        assert_eq!(tied.dominant(), Emotion::Happy);
    }

    #[test]
    fn sorted_desc_orders_by_score() {
        let scores = EmotionScores {
            angry: 10.0,
            happy: 65.0,
            sad: 20.0,
            ..Default::default()
        };
        let sorted = scores.sorted_desc();
        assert_eq!(sorted[0].0, Emotion::Happy);
        assert_eq!(sorted[1].0, Emotion::Sad);
        assert_eq!(sorted[2].0, Emotion::Angry);
        assert_eq!(sorted.len(), 7);
    }

    #[test]
    fn emotion_labels_round_trip() {
        for e in Emotion::ALL {
            assert_eq!(Emotion::parse(e.label()), Some(e));
        }
        assert_eq!(Emotion::parse("Happy "), Some(Emotion::Happy));
        assert_eq!(Emotion::parse("bored"), None);
    }
}
