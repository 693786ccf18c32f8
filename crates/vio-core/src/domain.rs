//! # Violation & Appeal Vocabularies
//!
//! Closed enumerations shared by every layer. Each type has a single
//! canonical wire string (`as_str()`), a `Display` that matches it, and a
//! fallible `FromStr` that accepts the canonical string case-insensitively.
//! There is no permissive passthrough: an unknown value is a [`CoreError`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{normalize_token, CoreError};

// ─── Violation type ─────────────────────────────────────────────────

/// What the trip did wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationType {
    RouteViolation,
    ForeignArea,
    MismatchPlate,
    OverCapacity,
    NoAreaWork,
    OverContractLimit,
    System,
}

impl ViolationType {
    /// All violation types, in declaration order.
    pub fn all() -> &'static [ViolationType] {
        &[
            Self::RouteViolation,
            Self::ForeignArea,
            Self::MismatchPlate,
            Self::OverCapacity,
            Self::NoAreaWork,
            Self::OverContractLimit,
            Self::System,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RouteViolation => "ROUTE_VIOLATION",
            Self::ForeignArea => "FOREIGN_AREA",
            Self::MismatchPlate => "MISMATCH_PLATE",
            Self::OverCapacity => "OVER_CAPACITY",
            Self::NoAreaWork => "NO_AREA_WORK",
            Self::OverContractLimit => "OVER_CONTRACT_LIMIT",
            Self::System => "SYSTEM",
        }
    }
}

impl std::fmt::Display for ViolationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViolationType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "ROUTE_VIOLATION" => Ok(Self::RouteViolation),
            "FOREIGN_AREA" => Ok(Self::ForeignArea),
            "MISMATCH_PLATE" => Ok(Self::MismatchPlate),
            "OVER_CAPACITY" => Ok(Self::OverCapacity),
            "NO_AREA_WORK" => Ok(Self::NoAreaWork),
            "OVER_CONTRACT_LIMIT" => Ok(Self::OverContractLimit),
            "SYSTEM" => Ok(Self::System),
            _ => Err(CoreError::unknown("violation type", s)),
        }
    }
}

// ─── Detection source ───────────────────────────────────────────────

/// How a violation was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectedBy {
    /// Automated licence-plate recognition camera.
    #[serde(rename = "LPR")]
    PlateMatch,
    /// Volume sensor at the unloading point.
    #[serde(rename = "VOLUME")]
    VolumeSensor,
    /// GPS track analysis.
    #[serde(rename = "GPS")]
    LocationTracking,
    /// Inferred by the system from trip state.
    #[serde(rename = "SYSTEM")]
    SystemInferred,
}

impl DetectedBy {
    pub fn all() -> &'static [DetectedBy] {
        &[
            Self::PlateMatch,
            Self::VolumeSensor,
            Self::LocationTracking,
            Self::SystemInferred,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlateMatch => "LPR",
            Self::VolumeSensor => "VOLUME",
            Self::LocationTracking => "GPS",
            Self::SystemInferred => "SYSTEM",
        }
    }

    /// Whether this source is one of the camera/sensor/system detections that
    /// the technical scope is limited to.
    pub fn is_technical(&self) -> bool {
        TECHNICAL_DETECTIONS.contains(self)
    }
}

/// Detection sources visible to the technical (landfill diagnostics) scope.
pub const TECHNICAL_DETECTIONS: [DetectedBy; 3] = [
    DetectedBy::PlateMatch,
    DetectedBy::VolumeSensor,
    DetectedBy::SystemInferred,
];

impl std::fmt::Display for DetectedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectedBy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "LPR" => Ok(Self::PlateMatch),
            "VOLUME" => Ok(Self::VolumeSensor),
            "GPS" => Ok(Self::LocationTracking),
            "SYSTEM" => Ok(Self::SystemInferred),
            _ => Err(CoreError::unknown("detection source", s)),
        }
    }
}

// ─── Severity ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn all() -> &'static [Severity] {
        &[Self::Low, Self::Medium, Self::High]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            _ => Err(CoreError::unknown("severity", s)),
        }
    }
}

// ─── Appeal reason ──────────────────────────────────────────────────

/// Why the appellant contests the violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    CameraError,
    TransitPath,
    WrongAssignment,
    Other,
}

impl ReasonCode {
    pub fn all() -> &'static [ReasonCode] {
        &[
            Self::CameraError,
            Self::TransitPath,
            Self::WrongAssignment,
            Self::Other,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CameraError => "CAMERA_ERROR",
            Self::TransitPath => "TRANSIT_PATH",
            Self::WrongAssignment => "WRONG_ASSIGNMENT",
            Self::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasonCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "CAMERA_ERROR" => Ok(Self::CameraError),
            "TRANSIT_PATH" => Ok(Self::TransitPath),
            "WRONG_ASSIGNMENT" => Ok(Self::WrongAssignment),
            "OTHER" => Ok(Self::Other),
            _ => Err(CoreError::unknown("appeal reason code", s)),
        }
    }
}

// ─── Attachment file type ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    #[serde(rename = "IMAGE")]
    Image,
    #[serde(rename = "VIDEO")]
    Video,
    #[serde(rename = "DOC")]
    Document,
}

impl FileType {
    pub fn all() -> &'static [FileType] {
        &[Self::Image, Self::Video, Self::Document]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "IMAGE",
            Self::Video => "VIDEO",
            Self::Document => "DOC",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "IMAGE" => Ok(Self::Image),
            "VIDEO" => Ok(Self::Video),
            "DOC" => Ok(Self::Document),
            _ => Err(CoreError::unknown("attachment file type", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_type_parses_every_canonical_name() {
        for t in ViolationType::all() {
            assert_eq!(t.as_str().parse::<ViolationType>().unwrap(), *t);
        }
    }

    #[test]
    fn parsing_is_case_insensitive_and_trims() {
        assert_eq!(" lpr ".parse::<DetectedBy>().unwrap(), DetectedBy::PlateMatch);
        assert_eq!("high".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!(
            "camera_error".parse::<ReasonCode>().unwrap(),
            ReasonCode::CameraError
        );
        assert_eq!("doc".parse::<FileType>().unwrap(), FileType::Document);
    }

    #[test]
    fn unknown_values_are_rejected() {
        assert!("SPEEDING".parse::<ViolationType>().is_err());
        assert!("RADAR".parse::<DetectedBy>().is_err());
        assert!("".parse::<Severity>().is_err());
        assert!("MISC".parse::<ReasonCode>().is_err());
        assert!("PDF".parse::<FileType>().is_err());
    }

    #[test]
    fn serde_matches_as_str() {
        for d in DetectedBy::all() {
            let json = serde_json::to_string(d).unwrap();
            assert_eq!(json, format!("\"{}\"", d.as_str()));
        }
        for f in FileType::all() {
            let json = serde_json::to_string(f).unwrap();
            assert_eq!(json, format!("\"{}\"", f.as_str()));
        }
        for t in ViolationType::all() {
            let json = serde_json::to_string(t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn technical_detections_exclude_gps() {
        assert!(DetectedBy::PlateMatch.is_technical());
        assert!(DetectedBy::VolumeSensor.is_technical());
        assert!(DetectedBy::SystemInferred.is_technical());
        assert!(!DetectedBy::LocationTracking.is_technical());
    }

    #[test]
    fn display_matches_as_str() {
        for s in Severity::all() {
            assert_eq!(s.to_string(), s.as_str());
        }
        for r in ReasonCode::all() {
            assert_eq!(r.to_string(), r.as_str());
        }
    }
}
