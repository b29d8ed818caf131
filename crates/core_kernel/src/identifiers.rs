//! Strongly-typed identifiers for domain entities
//!
//! Using newtype wrappers around UUIDs provides type safety and prevents
//! accidental mixing of different identifier types. Identifiers are totally
//! ordered so that "ascending id" is a stable tie-break everywhere.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates a new time-ordered identifier (v7)
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns the identifier prefix for display
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // Strip prefix if present
                let uuid_str = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(uuid_str)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

// Household directory
define_id!(UserId, "USR");
define_id!(GroupId, "GRP");

// Bills
define_id!(BillId, "BILL");
define_id!(ConsumptionId, "CONS");
define_id!(AllocationId, "ALLOC");
define_id!(TemplateId, "TPL");
define_id!(PredictionId, "PRED");

// Loans
define_id!(LoanId, "LOAN");
define_id!(LoanPaymentId, "LPAY");

/// Whether a subject is a single user or a household group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    User,
    Group,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::User => "user",
            SubjectType::Group => "group",
        }
    }
}

/// A party that can be allocated a share of a bill
///
/// The derived ordering (users before groups, then ascending id) is the
/// deterministic order used when rounding remainders are handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "subject_type", content = "subject_id", rename_all = "snake_case")]
pub enum Subject {
    User(UserId),
    Group(GroupId),
}

impl Subject {
    pub fn subject_type(&self) -> SubjectType {
        match self {
            Subject::User(_) => SubjectType::User,
            Subject::Group(_) => SubjectType::Group,
        }
    }

    /// Returns the raw UUID regardless of subject type
    pub fn uuid(&self) -> Uuid {
        match self {
            Subject::User(id) => *id.as_uuid(),
            Subject::Group(id) => *id.as_uuid(),
        }
    }

    /// Rebuilds a subject from its stored (type, uuid) pair
    pub fn from_parts(subject_type: SubjectType, id: Uuid) -> Self {
        match subject_type {
            SubjectType::User => Subject::User(UserId::from_uuid(id)),
            SubjectType::Group => Subject::Group(GroupId::from_uuid(id)),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::User(id) => write!(f, "{}", id),
            Subject::Group(id) => write!(f, "{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bill_id_display() {
        let id = BillId::new();
        assert!(id.to_string().starts_with("BILL-"));
    }

    #[test]
    fn test_id_parsing() {
        let original = LoanId::new();
        let parsed: LoanId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_subject_ordering_puts_users_first() {
        let group = Subject::Group(GroupId::from_uuid(Uuid::nil()));
        let user = Subject::User(UserId::from_uuid(Uuid::max()));
        assert!(user < group);
    }

    #[test]
    fn test_subject_round_trips_through_parts() {
        let subject = Subject::Group(GroupId::new());
        let rebuilt = Subject::from_parts(subject.subject_type(), subject.uuid());
        assert_eq!(subject, rebuilt);
    }
}
