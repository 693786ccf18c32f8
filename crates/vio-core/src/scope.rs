//! # Visibility Scope
//!
//! A [`Scope`] is the request-scoped view of which violations and appeals a
//! principal may see. It is derived from the principal on every request and
//! never cached. A scope grants visibility only; whether the caller may act
//! on a visible row is decided separately by the authorization policy.
//!
//! ## Default deny
//!
//! A scope whose restriction set is empty admits nothing. An oversight body
//! with no child contractors, or a driver token without a driver id, sees
//! zero rows, never an unscoped listing.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::DetectedBy;

/// Visibility boundary for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    /// Unrestricted.
    City,
    /// An oversight body and the active contractor organizations under it.
    Oversight {
        org_id: Uuid,
        contractor_ids: Vec<Uuid>,
    },
    /// A single contractor organization.
    Contractor { org_id: Uuid },
    /// A single driver. `None` when the token carried no driver id.
    Driver { driver_id: Option<Uuid> },
    /// City-wide, limited to camera/sensor/system detections.
    Technical,
}

/// The facts about a violation that scope checks depend on, taken from its
/// trip → ticket → contractor linkage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribution {
    pub contractor_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub detected_by: DetectedBy,
}

/// Scope resolution failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// The role has no scope (e.g. landfill operator users).
    #[error("role {role} is not allowed to access violations")]
    Unsupported { role: String },
}

impl Scope {
    /// Whether a violation with the given attribution is visible.
    pub fn admits(&self, facts: &Attribution) -> bool {
        match self {
            Self::City => true,
            Self::Oversight { contractor_ids, .. } => match facts.contractor_id {
                Some(c) => contractor_ids.contains(&c),
                None => false,
            },
            Self::Contractor { org_id } => facts.contractor_id == Some(*org_id),
            Self::Driver { driver_id } => match driver_id {
                Some(d) => facts.driver_id == Some(*d),
                None => false,
            },
            Self::Technical => facts.detected_by.is_technical(),
        }
    }

    /// Whether this scope covers work done by `contractor_id`. Used when
    /// an oversight body files a violation manually against a trip.
    pub fn covers_contractor(&self, contractor_id: Option<Uuid>) -> bool {
        match self {
            Self::City | Self::Technical => true,
            Self::Oversight { contractor_ids, .. } => {
                contractor_id.is_some_and(|c| contractor_ids.contains(&c))
            }
            Self::Contractor { org_id } => contractor_id == Some(*org_id),
            Self::Driver { .. } => false,
        }
    }

    /// Whether this scope can never admit a row.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Oversight { contractor_ids, .. } => contractor_ids.is_empty(),
            Self::Driver { driver_id } => driver_id.is_none(),
            Self::City | Self::Contractor { .. } | Self::Technical => false,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::City => "CITY",
            Self::Oversight { .. } => "OVERSIGHT",
            Self::Contractor { .. } => "CONTRACTOR",
            Self::Driver { .. } => "DRIVER",
            Self::Technical => "TECHNICAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(contractor: Option<Uuid>, driver: Option<Uuid>, by: DetectedBy) -> Attribution {
        Attribution {
            contractor_id: contractor,
            driver_id: driver,
            detected_by: by,
        }
    }

    #[test]
    fn city_admits_everything() {
        assert!(Scope::City.admits(&facts(None, None, DetectedBy::LocationTracking)));
    }

    #[test]
    fn oversight_without_children_admits_nothing() {
        let scope = Scope::Oversight {
            org_id: Uuid::new_v4(),
            contractor_ids: vec![],
        };
        assert!(scope.is_empty());
        let c = Uuid::new_v4();
        assert!(!scope.admits(&facts(Some(c), None, DetectedBy::PlateMatch)));
        assert!(!scope.admits(&facts(None, None, DetectedBy::PlateMatch)));
    }

    #[test]
    fn oversight_admits_only_children() {
        let child = Uuid::new_v4();
        let scope = Scope::Oversight {
            org_id: Uuid::new_v4(),
            contractor_ids: vec![child],
        };
        assert!(scope.admits(&facts(Some(child), None, DetectedBy::LocationTracking)));
        assert!(!scope.admits(&facts(Some(Uuid::new_v4()), None, DetectedBy::PlateMatch)));
    }

    #[test]
    fn contractor_admits_own_org() {
        let org = Uuid::new_v4();
        let scope = Scope::Contractor { org_id: org };
        assert!(scope.admits(&facts(Some(org), None, DetectedBy::VolumeSensor)));
        assert!(!scope.admits(&facts(Some(Uuid::new_v4()), None, DetectedBy::VolumeSensor)));
        assert!(!scope.admits(&facts(None, None, DetectedBy::VolumeSensor)));
    }

    #[test]
    fn driver_without_id_admits_nothing() {
        let scope = Scope::Driver { driver_id: None };
        assert!(scope.is_empty());
        assert!(!scope.admits(&facts(None, None, DetectedBy::SystemInferred)));
        assert!(!scope.admits(&facts(None, Some(Uuid::new_v4()), DetectedBy::SystemInferred)));
    }

    #[test]
    fn driver_admits_own_trips() {
        let d = Uuid::new_v4();
        let scope = Scope::Driver { driver_id: Some(d) };
        assert!(scope.admits(&facts(None, Some(d), DetectedBy::LocationTracking)));
        assert!(!scope.admits(&facts(None, Some(Uuid::new_v4()), DetectedBy::LocationTracking)));
    }

    #[test]
    fn technical_excludes_gps_detections() {
        let scope = Scope::Technical;
        assert!(scope.admits(&facts(None, None, DetectedBy::PlateMatch)));
        assert!(scope.admits(&facts(None, None, DetectedBy::VolumeSensor)));
        assert!(scope.admits(&facts(None, None, DetectedBy::SystemInferred)));
        assert!(!scope.admits(&facts(None, None, DetectedBy::LocationTracking)));
    }

    #[test]
    fn covers_contractor_for_manual_creation() {
        let child = Uuid::new_v4();
        let scope = Scope::Oversight {
            org_id: Uuid::new_v4(),
            contractor_ids: vec![child],
        };
        assert!(scope.covers_contractor(Some(child)));
        assert!(!scope.covers_contractor(Some(Uuid::new_v4())));
        assert!(!scope.covers_contractor(None));
        assert!(Scope::City.covers_contractor(None));
    }
}
