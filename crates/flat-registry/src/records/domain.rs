use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a stored flat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatId(pub u64);

impl fmt::Display for FlatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a stored house.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HouseId(pub u64);

impl fmt::Display for HouseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Moderation status of a flat.
///
/// `Moderating` marks a transition in flight and is never a resting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlatStatus {
    Created,
    Approved,
    Declined,
    Moderating,
}

impl FlatStatus {
    pub fn label(&self) -> &'static str {
        match self {
            FlatStatus::Created => "created",
            FlatStatus::Approved => "approved",
            FlatStatus::Declined => "declined",
            FlatStatus::Moderating => "moderating",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FlatStatus::Moderating)
    }

    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "created" => Ok(FlatStatus::Created),
            "approved" => Ok(FlatStatus::Approved),
            "declined" => Ok(FlatStatus::Declined),
            "moderating" => Ok(FlatStatus::Moderating),
            _ => Err(ValidationError::UnknownStatus(raw.to_string())),
        }
    }
}

impl fmt::Display for FlatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A status a caller may ask the moderation workflow to move a flat into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetStatus(FlatStatus);

impl TargetStatus {
    pub fn new(status: FlatStatus) -> Result<Self, ValidationError> {
        if status.is_transient() {
            return Err(ValidationError::TransientTarget);
        }
        Ok(Self(status))
    }

    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        Self::new(FlatStatus::parse(raw)?)
    }

    pub fn status(&self) -> FlatStatus {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flat {
    pub id: FlatId,
    pub house_id: HouseId,
    pub flat_number: u32,
    pub price: u64,
    pub rooms: u32,
    pub status: FlatStatus,
}

/// Flat attributes supplied by the creation path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFlat {
    pub house_id: HouseId,
    pub flat_number: u32,
    pub price: u64,
    pub rooms: u32,
}

impl NewFlat {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.flat_number == 0 {
            return Err(ValidationError::Field {
                field: "flat_number",
                reason: "must be positive",
            });
        }
        if self.rooms == 0 {
            return Err(ValidationError::Field {
                field: "rooms",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct House {
    pub id: HouseId,
    pub address: String,
    pub year: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub developer: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHouse {
    pub address: String,
    pub year: u16,
    #[serde(default)]
    pub developer: Option<String>,
}

impl NewHouse {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.address.trim().is_empty() {
            return Err(ValidationError::Field {
                field: "address",
                reason: "must not be empty",
            });
        }
        if self.year == 0 {
            return Err(ValidationError::Field {
                field: "year",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

/// Recipient address for house notifications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        let valid = match trimmed.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !domain.contains('@')
                    && !trimmed.contains(char::is_whitespace)
            }
            None => false,
        };

        if valid {
            Ok(Self(trimmed.to_ascii_lowercase()))
        } else {
            Err(ValidationError::InvalidEmail(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Email {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who is looking at a house listing; decides which statuses are visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Client,
    Moderator,
}

impl UserRole {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(UserRole::Client),
            "moderator" => Ok(UserRole::Moderator),
            _ => Err(ValidationError::UnknownRole(raw.to_string())),
        }
    }

    pub fn can_see(&self, status: FlatStatus) -> bool {
        match self {
            UserRole::Moderator => true,
            UserRole::Client => status == FlatStatus::Approved,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown flat status '{0}'")]
    UnknownStatus(String),
    #[error("'moderating' cannot be requested as a target status")]
    TransientTarget,
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error("unknown user role '{0}'")]
    UnknownRole(String),
    #[error("{field} {reason}")]
    Field {
        field: &'static str,
        reason: &'static str,
    },
}
