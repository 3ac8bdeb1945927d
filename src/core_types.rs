//! Core types used throughout the engine
//!
//! Identifier newtypes, the closed `Role` / `Category` enumerations and the
//! `Actor` identity that every mutating operation is evaluated against.
//!
//! Free-text role and category values are canonicalized here, at the
//! boundary. Everything past this module compares enum values only.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(ulid::Ulid);

        impl $name {
            /// Generate a new unique identifier
            pub fn new() -> Self {
                Self(ulid::Ulid::new())
            }

            /// Get the inner ULID value
            pub fn inner(&self) -> ulid::Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(ulid::Ulid::from_string(s)?))
            }
        }
    };
}

ulid_id!(
    /// Case identifier (ULID, sortable by creation time)
    CaseId
);
ulid_id!(
    /// Offer identifier
    OfferId
);
ulid_id!(
    /// Payment identifier (local; the gateway order id is tracked separately)
    PaymentId
);
ulid_id!(
    /// Audit event identifier
    AuditEventId
);

/// User ID - assigned by the user directory, immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

// ============================================================================
// Role
// ============================================================================

/// Platform role of an authenticated user.
///
/// Ownership of a particular case is a relationship, not a role: a `Client`
/// owns the cases they create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Client,
    Provider,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "CLIENT",
            Role::Provider => "PROVIDER",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "client" | "user" | "owner" => Ok(Role::Client),
            "provider" | "lawyer" | "advocate" => Ok(Role::Provider),
            "admin" | "administrator" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

// ============================================================================
// Category
// ============================================================================

/// Practice area of a case, matched against provider specializations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Criminal,
    Civil,
    Family,
    Property,
    Corporate,
    Tax,
    Labour,
    Consumer,
    Other,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Criminal,
        Category::Civil,
        Category::Family,
        Category::Property,
        Category::Corporate,
        Category::Tax,
        Category::Labour,
        Category::Consumer,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Criminal => "CRIMINAL",
            Category::Civil => "CIVIL",
            Category::Family => "FAMILY",
            Category::Property => "PROPERTY",
            Category::Corporate => "CORPORATE",
            Category::Tax => "TAX",
            Category::Labour => "LABOUR",
            Category::Consumer => "CONSUMER",
            Category::Other => "OTHER",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    /// Case-insensitive, tolerant of the spellings users actually type
    /// ("Real Estate", "employment", "divorce").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == '_' { ' ' } else { c })
            .collect();
        let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

        match normalized.as_str() {
            "criminal" | "criminal law" => Ok(Category::Criminal),
            "civil" | "civil law" => Ok(Category::Civil),
            "family" | "family law" | "divorce" => Ok(Category::Family),
            "property" | "real estate" | "land" => Ok(Category::Property),
            "corporate" | "business" | "company" => Ok(Category::Corporate),
            "tax" | "taxation" => Ok(Category::Tax),
            "labour" | "labor" | "employment" => Ok(Category::Labour),
            "consumer" | "consumer protection" => Ok(Category::Consumer),
            "other" | "general" => Ok(Category::Other),
            _ => Err(format!("Invalid category: {}", s)),
        }
    }
}

// ============================================================================
// Actor
// ============================================================================

/// Reserved id for background tasks; never issued to a real user.
pub const SYSTEM_USER: UserId = UserId(0);

/// The authenticated identity performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
    /// Declared practice areas (meaningful for providers only)
    #[serde(default)]
    pub specializations: Vec<Category>,
}

impl Actor {
    pub fn new(id: UserId, role: Role) -> Self {
        Self {
            id,
            role,
            specializations: Vec::new(),
        }
    }

    pub fn provider(id: UserId, specializations: Vec<Category>) -> Self {
        Self {
            id,
            role: Role::Provider,
            specializations,
        }
    }

    /// Identity recorded for scheduler-driven changes.
    pub fn system() -> Self {
        Self::new(SYSTEM_USER, Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn specializes_in(&self, category: Category) -> bool {
        self.specializations.contains(&category)
    }
}
