//! Clause risk classification
//!
//! The backend reports risk either as a bare level ("High"), as free text
//! carrying a score ("High (8/10)", "Risk score: 7/10"), or as a number.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref LEVEL_WORD: Regex = Regex::new(r"(?i)\b(low|medium|moderate|high)\b").unwrap();
    static ref SCORE_OUT_OF_TEN: Regex = Regex::new(r"(\d{1,2})(?:\.\d+)?\s*/\s*10\b").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Bucket a 0-10 score
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=3 => RiskLevel::Low,
            4..=6 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed risk information for one clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    /// Score out of ten when the backend supplied one
    pub score: Option<u8>,
    /// Original text as received
    pub raw: String,
}

impl RiskAssessment {
    /// Parse free-text risk. Returns `None` when neither a level word nor a
    /// score can be found; unknown risk is never defaulted.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let score = SCORE_OUT_OF_TEN
            .captures(trimmed)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u8>().ok())
            .filter(|s| *s <= 10)
            .or_else(|| trimmed.parse::<f64>().ok().and_then(score_from_number));

        let level = LEVEL_WORD
            .captures(trimmed)
            .and_then(|c| c.get(1))
            .map(|m| match m.as_str().to_ascii_lowercase().as_str() {
                "low" => RiskLevel::Low,
                "high" => RiskLevel::High,
                _ => RiskLevel::Medium,
            })
            .or_else(|| score.map(RiskLevel::from_score))?;

        Some(Self {
            level,
            score,
            raw: trimmed.to_string(),
        })
    }

    /// Risk reported as a bare number on a 0-10 scale
    pub fn from_number(value: f64) -> Option<Self> {
        let score = score_from_number(value)?;
        Some(Self {
            level: RiskLevel::from_score(score),
            score: Some(score),
            raw: value.to_string(),
        })
    }
}

fn score_from_number(value: f64) -> Option<u8> {
    if value.is_finite() && (0.0..=10.0).contains(&value) {
        Some(value.round() as u8)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_level() {
        let r = RiskAssessment::parse("Medium").unwrap();
        assert_eq!(r.level, RiskLevel::Medium);
        assert_eq!(r.score, None);
    }

    #[test]
    fn test_parse_level_with_score() {
        let r = RiskAssessment::parse("High (8/10)").unwrap();
        assert_eq!(r.level, RiskLevel::High);
        assert_eq!(r.score, Some(8));
        assert_eq!(r.raw, "High (8/10)");
    }

    #[test]
    fn test_parse_score_only() {
        let r = RiskAssessment::parse("Risk score: 2/10").unwrap();
        assert_eq!(r.level, RiskLevel::Low);
        assert_eq!(r.score, Some(2));

        let r = RiskAssessment::parse("5").unwrap();
        assert_eq!(r.level, RiskLevel::Medium);
    }

    #[test]
    fn test_moderate_maps_to_medium() {
        assert_eq!(RiskAssessment::parse("moderate").unwrap().level, RiskLevel::Medium);
    }

    #[test]
    fn test_unknown_risk_is_none() {
        assert!(RiskAssessment::parse("").is_none());
        assert!(RiskAssessment::parse("n/a").is_none());
        assert!(RiskAssessment::from_number(42.0).is_none());
    }
}
