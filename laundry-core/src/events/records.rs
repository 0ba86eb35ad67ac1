use serde::{Deserialize, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Classification result
// ---------------------------------------------------------------------------

/// Outcome of classifying one clip.
///
/// `is_voice` always mirrors `is_speech`; both names are kept because
/// downstream consumers read either.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub has_sound: bool,
    pub is_speech: bool,
    pub is_voice: bool,
    pub is_clapping: bool,
    /// Nominally in [0.0, 1.0]; not clamped.
    pub confidence: f32,
}

impl ClassificationResult {
    /// Result reported for silent clips and for any failure.
    pub const NEUTRAL: Self = Self {
        has_sound: false,
        is_speech: false,
        is_voice: false,
        is_clapping: false,
        confidence: 0.0,
    };

    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }
}

impl Default for ClassificationResult {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

// ---------------------------------------------------------------------------
// Detection event (result sink payload)
// ---------------------------------------------------------------------------

/// JSON body delivered to the result sink for one processed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub filename: String,
    /// RFC 3339 timestamp of the upload that produced the clip.
    pub timestamp: String,
    pub has_sound: bool,
    pub is_clapping: bool,
    pub is_speech: bool,
    pub is_voice: bool,
    #[serde(serialize_with = "finite_or_zero")]
    pub confidence: f32,
}

impl DetectionEvent {
    pub fn new(
        filename: impl Into<String>,
        timestamp: impl Into<String>,
        result: &ClassificationResult,
    ) -> Self {
        Self {
            filename: filename.into(),
            timestamp: timestamp.into(),
            has_sound: result.has_sound,
            is_clapping: result.is_clapping,
            is_speech: result.is_speech,
            is_voice: result.is_voice,
            confidence: result.confidence,
        }
    }

    pub fn result(&self) -> ClassificationResult {
        ClassificationResult {
            has_sound: self.has_sound,
            is_speech: self.is_speech,
            is_voice: self.is_voice,
            is_clapping: self.is_clapping,
            confidence: self.confidence,
        }
    }
}

/// JSON has no NaN/Inf; send silence-level confidence instead of `null`.
fn finite_or_zero<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
    let value = if value.is_finite() { *value } else { 0.0 };
    serializer.serialize_f32(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_result_is_all_false_and_zero() {
        let r = ClassificationResult::default();
        assert!(!r.has_sound && !r.is_speech && !r.is_voice && !r.is_clapping);
        assert_eq!(r.confidence, 0.0);
        assert!(r.is_neutral());
    }

    #[test]
    fn result_serializes_with_snake_case_fields() {
        let r = ClassificationResult {
            has_sound: true,
            is_speech: true,
            is_voice: true,
            is_clapping: false,
            confidence: 0.8,
        };
        let json = serde_json::to_value(r).expect("serialize result");
        assert_eq!(json["has_sound"], true);
        assert_eq!(json["is_speech"], true);
        assert_eq!(json["is_voice"], true);
        assert_eq!(json["is_clapping"], false);
        let conf = json["confidence"].as_f64().expect("confidence is a number");
        assert!((conf - 0.8).abs() < 1e-6);
    }

    #[test]
    fn detection_event_carries_all_payload_fields() {
        let r = ClassificationResult {
            has_sound: true,
            is_speech: false,
            is_voice: false,
            is_clapping: true,
            confidence: 0.9,
        };
        let event = DetectionEvent::new("test.wav", "2023-10-27T10:00:00Z", &r);
        let json = serde_json::to_value(&event).expect("serialize event");

        let obj = json.as_object().expect("event is an object");
        assert_eq!(obj.len(), 7);
        assert_eq!(json["filename"], "test.wav");
        assert_eq!(json["timestamp"], "2023-10-27T10:00:00Z");
        assert_eq!(json["has_sound"], true);
        assert_eq!(json["is_clapping"], true);
        assert_eq!(json["is_speech"], false);
        assert_eq!(json["is_voice"], false);
        assert_eq!(event.result(), r);
    }

    #[test]
    fn non_finite_confidence_serializes_as_zero() {
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let r = ClassificationResult {
                confidence: bad,
                ..ClassificationResult::NEUTRAL
            };
            let event = DetectionEvent::new("a.wav", "t", &r);
            let json = serde_json::to_value(&event).expect("serialize event");
            assert_eq!(json["confidence"].as_f64(), Some(0.0));
        }
    }

    #[test]
    fn out_of_range_confidence_is_not_clamped() {
        let r = ClassificationResult {
            confidence: 1.5,
            ..ClassificationResult::NEUTRAL
        };
        let json = serde_json::to_value(DetectionEvent::new("a.wav", "t", &r)).unwrap();
        assert_eq!(json["confidence"].as_f64(), Some(1.5));
    }

    #[test]
    fn unicode_filename_survives_serialization() {
        let event = DetectionEvent::new("test_文件_🎵.wav", "t", &ClassificationResult::NEUTRAL);
        let text = serde_json::to_string(&event).unwrap();
        let back: DetectionEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back.filename, "test_文件_🎵.wav");
    }
}
