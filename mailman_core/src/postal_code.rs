//! Norwegian postal codes.

use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::error::InvalidPostalCode;

/// Exactly four ASCII digits, e.g. `0150`.
///
/// Leading zeros are significant, so the code is kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PostalCode(String);

impl PostalCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PostalCode {
    type Err = InvalidPostalCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(PostalCode(s.to_string()))
        } else {
            Err(InvalidPostalCode { raw: s.to_string() })
        }
    }
}

impl fmt::Display for PostalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
