#![forbid(unsafe_code)]

mod admission;
mod drain;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub use admission::{AdmissionError, BatchWindow, DEFAULT_MAX_CLAIM_VALUE};
pub use drain::{DrainQueue, DrainState, Wake};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("wallet address is invalid")]
    InvalidAddress,
    #[error("signing key is invalid")]
    InvalidSigningKey,
    #[error("claim id is invalid")]
    InvalidClaimId,
}

/// Correlation id attached to every request when it is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClaimId(Ulid);

impl ClaimId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ClaimId {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<String> for ClaimId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let parsed = Ulid::from_string(&value).map_err(|_| DomainError::InvalidClaimId)?;
        Ok(Self(parsed))
    }
}

impl core::fmt::Display for ClaimId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wallet address used as the admission uniqueness key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_address(&value)?;
        Ok(Self(value))
    }
}

impl TryFrom<&str> for WalletAddress {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_owned())
    }
}

impl From<WalletAddress> for String {
    fn from(value: WalletAddress) -> Self {
        value.0
    }
}

impl core::fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Secret handed through to handlers untouched. `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey(String);

impl SigningKey {
    #[must_use]
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SigningKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() || value.len() > 4096 {
            return Err(DomainError::InvalidSigningKey);
        }
        Ok(Self(value))
    }
}

impl core::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// The sending wallet a dispatcher releases work on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    address: WalletAddress,
    signing_key: SigningKey,
}

impl Origin {
    #[must_use]
    pub fn new(address: WalletAddress, signing_key: SigningKey) -> Self {
        Self {
            address,
            signing_key,
        }
    }

    #[must_use]
    pub fn address(&self) -> &WalletAddress {
        &self.address
    }

    #[must_use]
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

/// A single claim or payout request. Fields are fixed once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    id: ClaimId,
    address: WalletAddress,
    value: u64,
    fields: BTreeMap<String, String>,
}

impl ClaimRequest {
    #[must_use]
    pub fn new(address: WalletAddress, value: u64) -> Self {
        Self {
            id: ClaimId::new(),
            address,
            value,
            fields: BTreeMap::new(),
        }
    }

    /// Attaches opaque metadata that is carried through to the handler.
    #[must_use]
    pub fn with_fields(mut self, fields: BTreeMap<String, String>) -> Self {
        self.fields = fields;
        self
    }

    #[must_use]
    pub fn id(&self) -> ClaimId {
        self.id
    }

    #[must_use]
    pub fn address(&self) -> &WalletAddress {
        &self.address
    }

    #[must_use]
    pub fn value(&self) -> u64 {
        self.value
    }

    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

fn validate_address(value: &str) -> Result<(), DomainError> {
    if !(1..=128).contains(&value.len()) {
        return Err(DomainError::InvalidAddress);
    }

    if value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Ok(());
    }

    Err(DomainError::InvalidAddress)
}
