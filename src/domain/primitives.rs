//! Domain primitives: identifiers and timestamps.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    pub fn as_ms(&self) -> i64 {
        self.0
    }
}

/// Rejected identifier input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("identifier must be non-empty and at most {max} characters")]
pub struct IdParseError {
    pub max: usize,
}

const MAX_ID_LEN: usize = 128;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                $name(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() || trimmed.len() > MAX_ID_LEN {
                    return Err(IdParseError { max: MAX_ID_LEN });
                }
                Ok($name(trimmed.to_string()))
            }
        }
    };
}

string_id!(
    /// Identifier of an affiliate record.
    AffiliateId
);
string_id!(
    /// Identifier of the user account that owns an affiliate.
    UserId
);
string_id!(
    /// Identifier of a purchase/order.
    OrderId
);
string_id!(
    /// Identifier of a commission record.
    CommissionId
);
string_id!(
    /// Identifier of a withdrawal request.
    WithdrawalId
);

/// Public referral code shared in affiliate links.
///
/// Codes are compared case-insensitively and stored upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferralCode(pub String);

impl ReferralCode {
    pub fn new(code: impl Into<String>) -> Self {
        ReferralCode(code.into().trim().to_uppercase())
    }

    /// Derive a code from an affiliate id: first 8 bytes of its SHA-256, hex.
    pub fn derive(affiliate_id: &AffiliateId) -> Self {
        use sha2::{Digest, Sha256};

        let hash = Sha256::digest(affiliate_id.as_str().as_bytes());
        ReferralCode(hex::encode_upper(&hash[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReferralCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
