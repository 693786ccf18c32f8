//! # Principals & Roles
//!
//! The authenticated caller as asserted by the identity provider. A
//! [`Principal`] is built once per request from verified token claims and
//! never mutated afterwards.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{normalize_token, CoreError};

/// Organizational role of a caller.
///
/// The landfill operator role used to be a single `TOO_ADMIN` role; it is
/// now split into admin and user variants. `TOO_ADMIN` is still accepted
/// as an alias for [`Role::LandfillAdmin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// City authority (akimat): unrestricted visibility, reviews appeals.
    #[serde(rename = "AKIMAT_ADMIN")]
    CityAuthority,
    /// Housing & utilities oversight body: sees its contractors, reviews appeals.
    #[serde(rename = "KGU_ZKH_ADMIN")]
    OversightBody,
    /// Landfill operator admin: camera/system diagnostics only.
    #[serde(rename = "LANDFILL_ADMIN", alias = "TOO_ADMIN")]
    LandfillAdmin,
    /// Landfill operator user: no access to violations.
    #[serde(rename = "LANDFILL_USER")]
    LandfillUser,
    /// Contractor organization admin.
    #[serde(rename = "CONTRACTOR_ADMIN")]
    ContractorAdmin,
    /// Truck driver.
    #[serde(rename = "DRIVER")]
    Driver,
}

impl Role {
    pub fn all() -> &'static [Role] {
        &[
            Self::CityAuthority,
            Self::OversightBody,
            Self::LandfillAdmin,
            Self::LandfillUser,
            Self::ContractorAdmin,
            Self::Driver,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CityAuthority => "AKIMAT_ADMIN",
            Self::OversightBody => "KGU_ZKH_ADMIN",
            Self::LandfillAdmin => "LANDFILL_ADMIN",
            Self::LandfillUser => "LANDFILL_USER",
            Self::ContractorAdmin => "CONTRACTOR_ADMIN",
            Self::Driver => "DRIVER",
        }
    }

    /// City authority or oversight body.
    pub fn is_reviewer(&self) -> bool {
        matches!(self, Self::CityAuthority | Self::OversightBody)
    }

    /// Driver or contractor admin, the parties an appeal can come from.
    pub fn is_appellant(&self) -> bool {
        matches!(self, Self::Driver | Self::ContractorAdmin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "AKIMAT_ADMIN" => Ok(Self::CityAuthority),
            "KGU_ZKH_ADMIN" => Ok(Self::OversightBody),
            "LANDFILL_ADMIN" | "TOO_ADMIN" => Ok(Self::LandfillAdmin),
            "LANDFILL_USER" => Ok(Self::LandfillUser),
            "CONTRACTOR_ADMIN" => Ok(Self::ContractorAdmin),
            "DRIVER" => Ok(Self::Driver),
            _ => Err(CoreError::unknown("role", s)),
        }
    }
}

/// Identity of the caller for the duration of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    /// Organization the user belongs to. For contractor admins this is the
    /// contractor organization; for oversight bodies the parent organization.
    pub org_id: Uuid,
    pub role: Role,
    /// Present for drivers; `None` otherwise (or when the token omits it).
    pub driver_id: Option<Uuid>,
}

impl Principal {
    /// Whether this principal is the driver identified by `driver_id`.
    /// A principal without a driver id never matches.
    pub fn is_driver_of(&self, driver_id: Option<Uuid>) -> bool {
        self.role == Role::Driver
            && matches!((self.driver_id, driver_id), (Some(mine), Some(theirs)) if mine == theirs)
    }

    /// Whether this principal administers the contractor `contractor_id`.
    pub fn is_contractor_of(&self, contractor_id: Option<Uuid>) -> bool {
        self.role == Role::ContractorAdmin && contractor_id == Some(self.org_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role, driver_id: Option<Uuid>) -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            role,
            driver_id,
        }
    }

    #[test]
    fn legacy_landfill_alias_parses_to_admin() {
        assert_eq!("TOO_ADMIN".parse::<Role>().unwrap(), Role::LandfillAdmin);
        assert_eq!("landfill_admin".parse::<Role>().unwrap(), Role::LandfillAdmin);
        let via_serde: Role = serde_json::from_str("\"TOO_ADMIN\"").unwrap();
        assert_eq!(via_serde, Role::LandfillAdmin);
    }

    #[test]
    fn every_role_roundtrips_through_as_str() {
        for role in Role::all() {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), *role);
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!("SUPERUSER".parse::<Role>().is_err());
    }

    #[test]
    fn reviewer_and_appellant_sets_are_disjoint() {
        for role in Role::all() {
            assert!(!(role.is_reviewer() && role.is_appellant()), "{role}");
        }
        assert!(!Role::LandfillAdmin.is_reviewer());
        assert!(!Role::LandfillAdmin.is_appellant());
    }

    #[test]
    fn driver_match_requires_both_ids() {
        let d = Uuid::new_v4();
        assert!(principal(Role::Driver, Some(d)).is_driver_of(Some(d)));
        assert!(!principal(Role::Driver, Some(d)).is_driver_of(Some(Uuid::new_v4())));
        assert!(!principal(Role::Driver, None).is_driver_of(None));
        assert!(!principal(Role::Driver, Some(d)).is_driver_of(None));
        assert!(!principal(Role::ContractorAdmin, Some(d)).is_driver_of(Some(d)));
    }

    #[test]
    fn contractor_match_uses_org_id() {
        let p = principal(Role::ContractorAdmin, None);
        assert!(p.is_contractor_of(Some(p.org_id)));
        assert!(!p.is_contractor_of(Some(Uuid::new_v4())));
        assert!(!p.is_contractor_of(None));
    }
}
