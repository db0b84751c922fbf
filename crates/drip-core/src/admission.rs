use std::collections::HashSet;

use crate::{ClaimRequest, WalletAddress};

/// Largest value a single claim may carry.
pub const DEFAULT_MAX_CLAIM_VALUE: u64 = 5_000;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("value exceeds single-claim cap: value={value} cap={cap}")]
    ValueExceedsCap { value: u64, cap: u64 },
    #[error("address within cooldown window")]
    AddressCoolingDown,
    #[error("address already queued")]
    AddressAlreadyQueued,
}

impl AdmissionError {
    /// Stable machine-readable reason, used for metrics labels and API errors.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ValueExceedsCap { .. } => "value_exceeds_cap",
            Self::AddressCoolingDown => "address_cooling_down",
            Self::AddressAlreadyQueued => "address_already_queued",
        }
    }
}

/// Pending requests for the current flush window plus the cooldown deny list.
///
/// An address is denied from the moment it is admitted until the next bulk
/// [`reset_deny_list`](Self::reset_deny_list), however close that reset is.
#[derive(Debug)]
pub struct BatchWindow {
    max_value: u64,
    pending: Vec<ClaimRequest>,
    pending_addresses: HashSet<WalletAddress>,
    denied: HashSet<WalletAddress>,
}

impl Default for BatchWindow {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CLAIM_VALUE)
    }
}

impl BatchWindow {
    #[must_use]
    pub fn new(max_value: u64) -> Self {
        Self {
            max_value,
            pending: Vec::new(),
            pending_addresses: HashSet::new(),
            denied: HashSet::new(),
        }
    }

    /// Runs the admission checks and, on success, queues the request and
    /// denies its address.
    ///
    /// # Errors
    /// Returns [`AdmissionError`] for the first failed check: value cap, then
    /// cooldown, then duplicate. A denied address that is still pending is
    /// reported as [`AdmissionError::AddressAlreadyQueued`].
    pub fn admit(&mut self, request: ClaimRequest) -> Result<(), AdmissionError> {
        if request.value() > self.max_value {
            return Err(AdmissionError::ValueExceedsCap {
                value: request.value(),
                cap: self.max_value,
            });
        }

        let address = request.address();
        let queued = self.pending_addresses.contains(address);
        if self.denied.contains(address) {
            if queued {
                return Err(AdmissionError::AddressAlreadyQueued);
            }
            return Err(AdmissionError::AddressCoolingDown);
        }
        if queued {
            return Err(AdmissionError::AddressAlreadyQueued);
        }

        self.denied.insert(address.clone());
        self.pending_addresses.insert(address.clone());
        self.pending.push(request);
        Ok(())
    }

    /// Removes and returns every pending request in admission order. The deny
    /// list is left untouched.
    pub fn take_batch(&mut self) -> Vec<ClaimRequest> {
        self.pending_addresses.clear();
        std::mem::take(&mut self.pending)
    }

    /// Clears the whole deny list at once and returns how many addresses it held.
    pub fn reset_deny_list(&mut self) -> usize {
        let released = self.denied.len();
        self.denied.clear();
        released
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn denied_len(&self) -> usize {
        self.denied.len()
    }

    #[must_use]
    pub fn is_denied(&self, address: &WalletAddress) -> bool {
        self.denied.contains(address)
    }

    #[must_use]
    pub fn is_pending(&self, address: &WalletAddress) -> bool {
        self.pending_addresses.contains(address)
    }

    #[must_use]
    pub fn max_value(&self) -> u64 {
        self.max_value
    }
}
