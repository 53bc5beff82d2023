//! Staff roles and the actor recorded on every stock change.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use salonstock_core::{DomainError, DomainResult};

/// Closed set of staff roles.
///
/// Role strings arriving at the boundary are parsed into this enum; unknown
/// values are rejected instead of being compared as free-form text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Owner,
    Manager,
    Receptionist,
    Stylist,
    Therapist,
}

impl StaffRole {
    pub const ALL: [StaffRole; 5] = [
        StaffRole::Owner,
        StaffRole::Manager,
        StaffRole::Receptionist,
        StaffRole::Stylist,
        StaffRole::Therapist,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StaffRole::Owner => "owner",
            StaffRole::Manager => "manager",
            StaffRole::Receptionist => "receptionist",
            StaffRole::Stylist => "stylist",
            StaffRole::Therapist => "therapist",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            StaffRole::Owner => "Owner",
            StaffRole::Manager => "Manager",
            StaffRole::Receptionist => "Receptionist",
            StaffRole::Stylist => "Stylist",
            StaffRole::Therapist => "Therapist",
        }
    }
}

impl core::fmt::Display for StaffRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StaffRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        StaffRole::ALL
            .into_iter()
            .find(|r| r.as_str() == wanted)
            .ok_or_else(|| DomainError::validation(format!("unknown staff role: {s}")))
    }
}

/// Who performed a stock change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: StaffRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: StaffRole) -> DomainResult<Self> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(DomainError::validation("actor id cannot be empty"));
        }
        Ok(Self { id, role })
    }
}

impl core::fmt::Display for Actor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.id, self.role)
    }
}
