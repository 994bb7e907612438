use bigdecimal::BigDecimal;
use std::fmt;

use crate::domain::REVERSAL_SUFFIX;

pub const ACCOUNT_NUMBER_MAX_LEN: usize = 34;
pub const IDEMPOTENCY_KEY_MAX_LEN: usize = 128;
pub const AMOUNT_MAX_SCALE: i64 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_account_number(field: &'static str, account_number: &str) -> ValidationResult {
    validate_required(field, account_number)?;
    validate_max_len(field, account_number, ACCOUNT_NUMBER_MAX_LEN)?;

    if !account_number.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err(ValidationError::new(
            field,
            "must contain only letters and digits",
        ));
    }

    Ok(())
}

pub fn validate_amount(amount: &BigDecimal) -> ValidationResult {
    if *amount <= BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    if amount.with_scale(AMOUNT_MAX_SCALE) != *amount {
        return Err(ValidationError::new(
            "amount",
            format!("must have at most {} decimal places", AMOUNT_MAX_SCALE),
        ));
    }

    Ok(())
}

/// The `-REVERSAL` suffix is reserved for compensation records; accepting it
/// from callers would let a request collide with a reversal leg.
pub fn validate_idempotency_key(key: &str) -> ValidationResult {
    validate_required("idempotencyKey", key)?;
    validate_max_len("idempotencyKey", key, IDEMPOTENCY_KEY_MAX_LEN)?;

    if key.ends_with(REVERSAL_SUFFIX) {
        return Err(ValidationError::new(
            "idempotencyKey",
            format!("must not end with {}", REVERSAL_SUFFIX),
        ));
    }

    Ok(())
}

pub fn validate_transfer(
    sender_account_number: &str,
    receiver_account_number: &str,
    amount: &BigDecimal,
    idempotency_key: &str,
) -> ValidationResult {
    validate_account_number("senderAccountNumber", sender_account_number)?;
    validate_account_number("receiverAccountNumber", receiver_account_number)?;
    if sender_account_number == receiver_account_number {
        return Err(ValidationError::new(
            "receiverAccountNumber",
            "must differ from senderAccountNumber",
        ));
    }
    validate_amount(amount)?;
    validate_idempotency_key(idempotency_key)
}

pub fn validate_single_leg(account_number: &str, amount: &BigDecimal, idempotency_key: &str) -> ValidationResult {
    validate_account_number("accountNumber", account_number)?;
    validate_amount(amount)?;
    validate_idempotency_key(idempotency_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(&dec("0.01")).is_ok());
        assert!(validate_amount(&dec("100.1234")).is_ok());
        assert!(validate_amount(&dec("0")).is_err());
        assert!(validate_amount(&dec("-5")).is_err());
        assert!(validate_amount(&dec("1.23456")).is_err());
    }

    #[test]
    fn test_validate_account_number() {
        assert!(validate_account_number("accountNumber", "ACC1001").is_ok());
        assert!(validate_account_number("accountNumber", "").is_err());
        assert!(validate_account_number("accountNumber", "ACC 1").is_err());
        assert!(validate_account_number("accountNumber", &"9".repeat(35)).is_err());
    }

    #[test]
    fn test_validate_idempotency_key() {
        assert!(validate_idempotency_key("k1").is_ok());
        assert!(validate_idempotency_key("   ").is_err());
        assert!(validate_idempotency_key(&"k".repeat(129)).is_err());

        let err = validate_idempotency_key("k1-REVERSAL").unwrap_err();
        assert_eq!(err.field, "idempotencyKey");
    }

    #[test]
    fn test_validate_transfer_rejects_self_transfer() {
        let err = validate_transfer("A1", "A1", &dec("10"), "k1").unwrap_err();
        assert_eq!(err.field, "receiverAccountNumber");
        assert!(validate_transfer("A1", "B1", &dec("10"), "k1").is_ok());
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("amount", "must be greater than zero");
        assert_eq!(err.to_string(), "amount: must be greater than zero");
    }
}
