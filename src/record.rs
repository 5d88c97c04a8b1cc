//! Record definition
//!
//! The address-book entry exchanged between client and server.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RolodexError};

/// A single address-book entry, keyed by `name`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Unique, case-sensitive key. Never empty once stored.
    pub name: String,

    pub street: String,
    pub suburb: String,
    pub phone: String,
    pub email: String,
}

impl Record {
    /// Create a record with only a name set
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_street(mut self, street: impl Into<String>) -> Self {
        self.street = street.into();
        self
    }

    pub fn with_suburb(mut self, suburb: impl Into<String>) -> Self {
        self.suburb = suburb.into();
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = phone.into();
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Reject records that cannot be stored
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)
    }
}

/// Reject names that cannot identify a record
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RolodexError::InvalidInput(
            "record name must not be empty".to_string(),
        ));
    }
    Ok(())
}
