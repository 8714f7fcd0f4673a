//! Affective state derived from recent form.

use serde::{Deserialize, Serialize};
use terrace_store::FormString;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoodTag {
    Euphoric,
    Hopeful,
    Anxious,
    Depressed,
}

impl MoodTag {
    pub fn as_str(self) -> &'static str {
        match self {
            MoodTag::Euphoric => "euphoric",
            MoodTag::Hopeful => "hopeful",
            MoodTag::Anxious => "anxious",
            MoodTag::Depressed => "depressed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "euphoric" => Some(MoodTag::Euphoric),
            "hopeful" => Some(MoodTag::Hopeful),
            "anxious" => Some(MoodTag::Anxious),
            "depressed" => Some(MoodTag::Depressed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MoodSnapshot {
    pub tag: MoodTag,
    /// How strongly the tag applies, in [0,1].
    pub intensity: f64,
    /// Points ratio over the recorded results.
    pub ratio: f64,
    /// False when no finished matches existed and the neutral default applied.
    pub derived_from_form: bool,
}

/// Map a form string to a mood.
///
/// Points are 3/1/0 per W/D/L; the ratio is points over the maximum available
/// from the recorded slots. Good runs carry the ratio as intensity; bad runs
/// carry its complement, so a winless streak feels as strong as a perfect one.
///
/// | ratio       | tag       |
/// |-------------|-----------|
/// | >= 0.80     | euphoric  |
/// | 0.60 - 0.79 | hopeful   |
/// | 0.40 - 0.59 | anxious   |
/// | < 0.40      | depressed |
pub fn derive_mood(form: &FormString) -> MoodSnapshot {
    let played = form.played();
    if played == 0 {
        return MoodSnapshot {
            tag: MoodTag::Hopeful,
            intensity: 0.5,
            ratio: 0.5,
            derived_from_form: false,
        };
    }

    let ratio = f64::from(form.points()) / (3.0 * played as f64);
    let (tag, intensity) = if ratio >= 0.80 {
        (MoodTag::Euphoric, ratio)
    } else if ratio >= 0.60 {
        (MoodTag::Hopeful, ratio)
    } else if ratio >= 0.40 {
        (MoodTag::Anxious, 1.0 - ratio)
    } else {
        (MoodTag::Depressed, 1.0 - ratio)
    };

    MoodSnapshot {
        tag,
        intensity: intensity.clamp(0.0, 1.0),
        ratio,
        derived_from_form: true,
    }
}
