//! Withdrawal PIN gate.
//!
//! PINs are exactly four ASCII digits and are stored only as Argon2id PHC
//! strings with a per-hash random salt.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, Duration, Utc};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MarketError, MarketResult};
use crate::events::MarketEvent;
use crate::market::Marketplace;

pub const PIN_LENGTH: usize = 4;
/// Consecutive failed checks before the PIN is locked.
pub const MAX_PIN_ATTEMPTS: u32 = 5;
pub const PIN_LOCKOUT_MINUTES: i64 = 15;

/// Failed PIN checks since the last success. Tracked for users with and
/// without a PIN alike.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinFailures {
    pub count: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Argon2 cost parameters for PIN hashing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PinCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl PinCost {
    /// Smallest cost Argon2 accepts. For tests and local development only.
    pub fn minimal() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: Params::MIN_T_COST,
            parallelism: Params::MIN_P_COST,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinOutcome {
    Verified,
    Mismatch,
    NotConfigured,
}

pub struct PinHasher {
    argon: Argon2<'static>,
    // verified against when no PIN exists, so both failure paths cost the same
    decoy: String,
}

impl std::fmt::Debug for PinHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinHasher").finish_non_exhaustive()
    }
}

impl PinHasher {
    pub fn new(cost: PinCost) -> MarketResult<Self> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| MarketError::Validation(format!("invalid PIN hashing cost: {e}")))?;
        let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut hasher = Self {
            argon,
            decoy: String::new(),
        };
        hasher.decoy = hasher.hash("0000")?;
        Ok(hasher)
    }

    pub fn hash(&self, pin: &str) -> MarketResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon
            .hash_password(pin.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| MarketError::Internal(format!("PIN hashing failed: {e}")))
    }

    pub fn verify(&self, pin: &str, stored: Option<&str>) -> PinOutcome {
        match stored {
            Some(phc) => {
                if self.matches(pin, phc) {
                    PinOutcome::Verified
                } else {
                    PinOutcome::Mismatch
                }
            }
            None => {
                let _ = self.matches(pin, &self.decoy);
                PinOutcome::NotConfigured
            }
        }
    }

    fn matches(&self, pin: &str, phc: &str) -> bool {
        match PasswordHash::new(phc) {
            Ok(parsed) => self
                .argon
                .verify_password(pin.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "stored PIN hash is unreadable");
                false
            }
        }
    }
}

pub fn validate_pin_format(pin: &str) -> MarketResult<()> {
    if pin.len() == PIN_LENGTH && pin.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(MarketError::Validation(format!(
            "PIN must be exactly {PIN_LENGTH} digits"
        )))
    }
}

impl Marketplace {
    pub fn has_pin(&self, user_id: Uuid) -> MarketResult<bool> {
        let tables = self.store.read();
        tables.user(user_id)?;
        Ok(tables.pins.contains_key(&user_id))
    }

    /// Set the withdrawal PIN for the first time.
    pub fn setup_pin(&self, user_id: Uuid, pin: &str) -> MarketResult<()> {
        validate_pin_format(pin)?;
        let hash = self.pins.hash(pin)?;

        let mut tables = self.store.write();
        tables.user(user_id)?;
        if tables.pins.contains_key(&user_id) {
            return Err(MarketError::PinAlreadyConfigured);
        }
        tables.pins.insert(user_id, hash);
        tables.publish(MarketEvent::PinConfigured { user_id });
        Ok(())
    }

    /// Replace the PIN after re-proving the current one.
    pub fn change_pin(&self, user_id: Uuid, current: &str, new_pin: &str) -> MarketResult<()> {
        validate_pin_format(new_pin)?;
        let (outcome, stored) = self.check_pin(user_id, current, Utc::now())?;
        if outcome != PinOutcome::Verified {
            return Err(MarketError::PinRejected);
        }
        let hash = self.pins.hash(new_pin)?;

        let mut tables = self.store.write();
        // a concurrent change between the read and this write wins; ours is rejected
        if tables.pins.get(&user_id) != stored.as_ref() {
            return Err(MarketError::PinRejected);
        }
        tables.pins.insert(user_id, hash);
        tables.publish(MarketEvent::PinChanged { user_id });
        Ok(())
    }

    /// Check a PIN. After [`MAX_PIN_ATTEMPTS`] failures in a row every check
    /// fails with [`MarketError::PinLocked`] for [`PIN_LOCKOUT_MINUTES`].
    pub fn verify_pin(&self, user_id: Uuid, pin: &str) -> MarketResult<PinOutcome> {
        self.check_pin(user_id, pin, Utc::now())
            .map(|(outcome, _)| outcome)
    }

    pub(crate) fn check_pin(
        &self,
        user_id: Uuid,
        pin: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<(PinOutcome, Option<String>)> {
        let stored = {
            let tables = self.store.read();
            tables.user(user_id)?;
            let locked = tables
                .pin_failures
                .get(&user_id)
                .and_then(|f| f.locked_until)
                .is_some_and(|until| until > now);
            if locked {
                return Err(MarketError::PinLocked);
            }
            tables.pins.get(&user_id).cloned()
        };
        let outcome = self.pins.verify(pin, stored.as_deref());

        let mut tables = self.store.write();
        if outcome == PinOutcome::Verified {
            tables.pin_failures.remove(&user_id);
            return Ok((outcome, stored));
        }
        let failures = tables.pin_failures.entry(user_id).or_default();
        if failures.locked_until.is_some_and(|until| until > now) {
            return Err(MarketError::PinLocked);
        }
        failures.count += 1;
        if failures.count >= MAX_PIN_ATTEMPTS {
            let until = now + Duration::minutes(PIN_LOCKOUT_MINUTES);
            *failures = PinFailures {
                count: 0,
                locked_until: Some(until),
            };
            tables.publish(MarketEvent::PinLocked { user_id, until });
        }
        Ok((outcome, stored))
    }

    /// Verify and collapse mismatch and missing PIN into
    /// [`MarketError::PinRejected`].
    pub fn require_pin(&self, user_id: Uuid, pin: &str) -> MarketResult<()> {
        match self.verify_pin(user_id, pin)? {
            PinOutcome::Verified => Ok(()),
            PinOutcome::Mismatch | PinOutcome::NotConfigured => Err(MarketError::PinRejected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::tests::{market, verified_user};
    use crate::models::UserType;

    #[test]
    fn pin_format() {
        assert!(validate_pin_format("0420").is_ok());
        assert!(validate_pin_format("123").is_err());
        assert!(validate_pin_format("12345").is_err());
        assert!(validate_pin_format("12a4").is_err());
        assert!(validate_pin_format("١٢٣٤").is_err());
    }

    #[test]
    fn hashes_are_salted() {
        let hasher = PinHasher::new(PinCost::minimal()).unwrap();
        let a = hasher.hash("1234").unwrap();
        let b = hasher.hash("1234").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
        assert!(!a.contains("1234$"));
    }

    #[test]
    fn setup_then_verify() {
        let market = market();
        let user = verified_user(&market, UserType::Freelancer);

        assert!(!market.has_pin(user).unwrap());
        assert_eq!(
            market.verify_pin(user, "1234").unwrap(),
            PinOutcome::NotConfigured
        );

        market.setup_pin(user, "1234").unwrap();
        assert!(market.has_pin(user).unwrap());
        assert_eq!(market.verify_pin(user, "1234").unwrap(), PinOutcome::Verified);
        assert_eq!(market.verify_pin(user, "4321").unwrap(), PinOutcome::Mismatch);
    }

    #[test]
    fn setup_only_once() {
        let market = market();
        let user = verified_user(&market, UserType::Freelancer);
        market.setup_pin(user, "1234").unwrap();
        assert_eq!(
            market.setup_pin(user, "5678").unwrap_err(),
            MarketError::PinAlreadyConfigured
        );
        assert_eq!(market.verify_pin(user, "1234").unwrap(), PinOutcome::Verified);
    }

    #[test]
    fn change_requires_current_pin() {
        let market = market();
        let user = verified_user(&market, UserType::Freelancer);
        market.setup_pin(user, "1234").unwrap();

        assert_eq!(
            market.change_pin(user, "0000", "5678").unwrap_err(),
            MarketError::PinRejected
        );
        market.change_pin(user, "1234", "5678").unwrap();
        assert_eq!(market.verify_pin(user, "5678").unwrap(), PinOutcome::Verified);
        assert_eq!(market.verify_pin(user, "1234").unwrap(), PinOutcome::Mismatch);
    }

    #[test]
    fn change_without_pin_is_rejected() {
        let market = market();
        let user = verified_user(&market, UserType::Freelancer);
        assert_eq!(
            market.change_pin(user, "1234", "5678").unwrap_err(),
            MarketError::PinRejected
        );
    }

    #[test]
    fn require_pin_hides_missing_pin() {
        let market = market();
        let with_pin = verified_user(&market, UserType::Freelancer);
        let without_pin = verified_user(&market, UserType::Freelancer);
        market.setup_pin(with_pin, "1234").unwrap();

        let wrong = market.require_pin(with_pin, "9999").unwrap_err();
        let missing = market.require_pin(without_pin, "9999").unwrap_err();
        assert_eq!(wrong, missing);
        assert_eq!(wrong.to_string(), missing.to_string());
    }

    #[test]
    fn repeated_failures_lock_the_pin() {
        let market = market();
        let user = verified_user(&market, UserType::Freelancer);
        market.setup_pin(user, "1234").unwrap();
        let now = Utc::now();

        for _ in 0..MAX_PIN_ATTEMPTS {
            let (outcome, _) = market.check_pin(user, "0000", now).unwrap();
            assert_eq!(outcome, PinOutcome::Mismatch);
        }
        assert_eq!(
            market.check_pin(user, "1234", now).unwrap_err(),
            MarketError::PinLocked
        );
        assert_eq!(
            market.change_pin(user, "1234", "5678").unwrap_err(),
            MarketError::PinLocked
        );

        let later = now + Duration::minutes(PIN_LOCKOUT_MINUTES + 1);
        let (outcome, _) = market.check_pin(user, "1234", later).unwrap();
        assert_eq!(outcome, PinOutcome::Verified);
    }

    #[test]
    fn success_resets_the_failure_count() {
        let market = market();
        let user = verified_user(&market, UserType::Freelancer);
        market.setup_pin(user, "1234").unwrap();

        for _ in 0..2 {
            for _ in 0..MAX_PIN_ATTEMPTS - 1 {
                assert_eq!(market.verify_pin(user, "0000").unwrap(), PinOutcome::Mismatch);
            }
            assert_eq!(market.verify_pin(user, "1234").unwrap(), PinOutcome::Verified);
        }
    }

    #[test]
    fn missing_pin_locks_the_same_way() {
        let market = market();
        let user = verified_user(&market, UserType::Freelancer);
        for _ in 0..MAX_PIN_ATTEMPTS {
            assert_eq!(
                market.require_pin(user, "0000").unwrap_err(),
                MarketError::PinRejected
            );
        }
        assert_eq!(
            market.require_pin(user, "0000").unwrap_err(),
            MarketError::PinLocked
        );
        assert!(market
            .events()
            .iter()
            .any(|e| matches!(e, MarketEvent::PinLocked { user_id, .. } if *user_id == user)));
    }
}
