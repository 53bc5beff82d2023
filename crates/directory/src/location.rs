use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use salonstock_core::{DomainError, DomainResult, Entity, LocationId};

/// Id of the synthetic home-service location.
pub const HOME_LOCATION_ID: &str = "home";
/// Id of the synthetic e-commerce location.
pub const ONLINE_LOCATION_ID: &str = "online";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationStatus {
    Active,
    Inactive,
}

/// Physical salon, or one of the synthetic channels.
///
/// Synthetic locations share the schema of physical ones; the kind only
/// matters for display and channel-specific figures (shop availability).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    Physical,
    Home,
    Online,
}

impl LocationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LocationStatus::Active => "active",
            LocationStatus::Inactive => "inactive",
        }
    }
}

impl core::str::FromStr for LocationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(LocationStatus::Active),
            "inactive" => Ok(LocationStatus::Inactive),
            other => Err(DomainError::validation(format!("unknown location status: {other}"))),
        }
    }
}

impl LocationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LocationKind::Physical => "physical",
            LocationKind::Home => "home",
            LocationKind::Online => "online",
        }
    }
}

impl core::str::FromStr for LocationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "physical" => Ok(LocationKind::Physical),
            "home" => Ok(LocationKind::Home),
            "online" => Ok(LocationKind::Online),
            other => Err(DomainError::validation(format!("unknown location kind: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub status: LocationStatus,
    pub kind: LocationKind,
    pub created_at: DateTime<Utc>,
}

impl Entity for Location {
    type Id = LocationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn is_active(&self) -> bool {
        self.status == LocationStatus::Active
    }
}

impl Location {
    /// The synthetic home-service location.
    pub fn home(now: DateTime<Utc>) -> Self {
        Self {
            id: LocationId::parse(HOME_LOCATION_ID).expect("static id is valid"),
            name: "Home Service".to_string(),
            status: LocationStatus::Active,
            kind: LocationKind::Home,
            created_at: now,
        }
    }

    /// The synthetic online-shop location.
    pub fn online(now: DateTime<Utc>) -> Self {
        Self {
            id: LocationId::parse(ONLINE_LOCATION_ID).expect("static id is valid"),
            name: "Online Store".to_string(),
            status: LocationStatus::Active,
            kind: LocationKind::Online,
            created_at: now,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.kind != LocationKind::Physical
    }

    /// Key used for name-based de-duplication.
    pub fn name_key(&self) -> String {
        normalize_name(&self.name)
    }
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Input for creating a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLocation {
    pub id: LocationId,
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: LocationKind,
    #[serde(default = "default_status")]
    pub status: LocationStatus,
}

fn default_kind() -> LocationKind {
    LocationKind::Physical
}

fn default_status() -> LocationStatus {
    LocationStatus::Active
}

impl NewLocation {
    pub fn into_location(self, now: DateTime<Utc>) -> DomainResult<Location> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(Location {
            id: self.id,
            name: name.to_string(),
            status: self.status,
            kind: self.kind,
            created_at: now,
        })
    }
}

/// Result of a name-based de-duplication pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupOutcome {
    pub locations: Vec<Location>,
    /// How many records were dropped as duplicates.
    pub removed: usize,
}

/// Keep exactly one record per logical location.
///
/// Records are compared by normalised name (case and whitespace folded) and by
/// id; the first-seen record wins and input order is otherwise preserved.
pub fn dedup_by_name(locations: impl IntoIterator<Item = Location>) -> DedupOutcome {
    let mut seen_names = HashSet::new();
    let mut seen_ids = HashSet::new();
    let mut kept = Vec::new();
    let mut removed = 0;

    for location in locations {
        let fresh_name = !seen_names.contains(&location.name_key());
        let fresh_id = !seen_ids.contains(&location.id);
        if fresh_name && fresh_id {
            seen_names.insert(location.name_key());
            seen_ids.insert(location.id.clone());
            kept.push(location);
        } else {
            removed += 1;
        }
    }

    DedupOutcome {
        locations: kept,
        removed,
    }
}

/// Merge the authoritative list with a fallback source.
///
/// Primary records always take precedence: fallback entries are appended
/// after them, so any name (or id) collision resolves to the primary record.
pub fn merge_locations(primary: Vec<Location>, fallback: Vec<Location>) -> DedupOutcome {
    dedup_by_name(primary.into_iter().chain(fallback))
}
