//! Match Metadata
//!
//! Typed form of the metadata blob stored on a session row. Parsed and
//! validated once at the boundary; everything inside the crate works with
//! [`MatchMetadata`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::table::TableConfig;
use crate::replay::shot_log::ShotLogEntry;

/// Lowest AI difficulty
pub const MIN_DIFFICULTY: u8 = 1;

/// Highest AI difficulty
pub const MAX_DIFFICULTY: u8 = 100;

/// Supported game variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameType {
    /// Standard 8-ball
    #[default]
    #[serde(alias = "EightBall", alias = "8ball")]
    EightBall,
}

/// Metadata blob rejected at the boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetadataError {
    /// Not the expected JSON shape
    #[error("malformed metadata: {0}")]
    Malformed(String),

    /// Scale outside the accepted range
    #[error("invalid adjustment scale {0}")]
    InvalidScale(f64),

    /// AI difficulty outside 1..=100
    #[error("ai difficulty {0} outside [1, 100]")]
    InvalidDifficulty(u8),

    /// Zero duration budget
    #[error("max duration must be positive")]
    InvalidDuration,
}

/// Per-match configuration plus the shot log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMetadata {
    /// Seed of the match generator
    pub match_seed: u64,
    /// Engine scale
    pub adjustment_scale: f64,
    /// Variant
    #[serde(default)]
    pub game_type: GameType,
    /// Set when p2 is played by the AI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_difficulty: Option<u8>,
    /// Wall-clock budget for the whole match
    pub max_duration_seconds: u64,
    /// Applied shots, in application order
    #[serde(default)]
    pub shot_log: Vec<ShotLogEntry>,
}

impl MatchMetadata {
    /// Metadata for a new match with an empty log.
    pub fn new(
        match_seed: u64,
        adjustment_scale: f64,
        ai_difficulty: Option<u8>,
        max_duration_seconds: u64,
    ) -> Result<Self, MetadataError> {
        let metadata = Self {
            match_seed,
            adjustment_scale,
            game_type: GameType::EightBall,
            ai_difficulty,
            max_duration_seconds,
            shot_log: Vec::new(),
        };
        metadata.validate()?;
        Ok(metadata)
    }

    /// Parse and validate a JSON blob.
    pub fn from_blob(blob: &serde_json::Value) -> Result<Self, MetadataError> {
        let metadata: MatchMetadata = serde_json::from_value(blob.clone())
            .map_err(|e| MetadataError::Malformed(e.to_string()))?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// JSON blob for the session row.
    pub fn to_blob(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Check field ranges.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if TableConfig::from_scale(self.adjustment_scale).is_err() {
            return Err(MetadataError::InvalidScale(self.adjustment_scale));
        }
        if let Some(difficulty) = self.ai_difficulty {
            if !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&difficulty) {
                return Err(MetadataError::InvalidDifficulty(difficulty));
            }
        }
        if self.max_duration_seconds == 0 {
            return Err(MetadataError::InvalidDuration);
        }
        Ok(())
    }

    /// Sequence number for the next logged shot.
    pub fn next_seq(&self) -> u64 {
        self.shot_log.iter().map(|e| e.seq).max().unwrap_or(0) + 1
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_blob() {
        let blob = json!({
            "matchSeed": 42,
            "adjustmentScale": 0.02,
            "gameType": "EIGHT_BALL",
            "aiDifficulty": 60,
            "maxDurationSeconds": 300,
            "shotLog": []
        });
        let metadata = MatchMetadata::from_blob(&blob).unwrap();
        assert_eq!(metadata.match_seed, 42);
        assert_eq!(metadata.ai_difficulty, Some(60));
        assert_eq!(metadata.next_seq(), 1);
        assert_eq!(MatchMetadata::from_blob(&metadata.to_blob()).unwrap(), metadata);
    }

    #[test]
    fn test_defaults_and_aliases() {
        let blob = json!({
            "matchSeed": 1,
            "adjustmentScale": 0.5,
            "gameType": "EightBall",
            "maxDurationSeconds": 60
        });
        let metadata = MatchMetadata::from_blob(&blob).unwrap();
        assert_eq!(metadata.game_type, GameType::EightBall);
        assert!(metadata.shot_log.is_empty());
        assert_eq!(metadata.ai_difficulty, None);
    }

    #[test]
    fn test_rejects_bad_blobs() {
        let base = json!({
            "matchSeed": 1,
            "adjustmentScale": 0.02,
            "maxDurationSeconds": 60
        });

        let mut blob = base.clone();
        blob["adjustmentScale"] = json!(3.0);
        assert_eq!(MatchMetadata::from_blob(&blob), Err(MetadataError::InvalidScale(3.0)));

        let mut blob = base.clone();
        blob["aiDifficulty"] = json!(0);
        assert_eq!(MatchMetadata::from_blob(&blob), Err(MetadataError::InvalidDifficulty(0)));

        let mut blob = base.clone();
        blob["maxDurationSeconds"] = json!(0);
        assert_eq!(MatchMetadata::from_blob(&blob), Err(MetadataError::InvalidDuration));

        let mut blob = base.clone();
        blob["gameType"] = json!("NINE_BALL");
        assert!(matches!(MatchMetadata::from_blob(&blob), Err(MetadataError::Malformed(_))));

        assert!(matches!(
            MatchMetadata::from_blob(&json!("not an object")),
            Err(MetadataError::Malformed(_))
        ));
    }
}
