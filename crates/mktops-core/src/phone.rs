//! Brazilian phone-number canonicalization.
//!
//! Lead phones arrive in every imaginable shape: bare landline-style mobiles
//! from before the ninth digit, numbers with and without the country code,
//! carrier-prefix zeros, punctuation. [`normalize_phone`] collapses them to
//! the canonical `+55DDNNNNNNNNN` form or rejects them outright — a number
//! that cannot be resolved is stored as absent, never guessed.

/// Canonical length of a Brazilian mobile number: 2-digit DDD + 9 digits.
const NATIONAL_LEN: usize = 11;

/// Normalize a raw phone string to `+55` international format.
///
/// Steps, in order:
/// 1. Strip every non-digit character.
/// 2. Drop a single leading carrier `0`.
/// 3. Drop a redundant `55` country prefix when the remaining digit count
///    says it is a prefix and not a DDD (i.e. more than 11 digits total).
/// 4. Insert the mobile `9` after the DDD when exactly 10 digits remain
///    (old-format 8-digit number).
///
/// Returns `None` when the result is not exactly 11 digits.
#[must_use]
pub fn normalize_phone(raw: &str) -> Option<String> {
    let mut digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    if let Some(stripped) = digits.strip_prefix('0') {
        digits = stripped.to_string();
    }

    // DDD 55 exists (Rio Grande do Sul), so "55" is only a country prefix
    // when stripping it still leaves a full national number.
    if digits.len() > NATIONAL_LEN {
        if let Some(stripped) = digits.strip_prefix("55") {
            digits = stripped.to_string();
        }
    }

    if digits.len() == NATIONAL_LEN - 1 {
        digits.insert(2, '9');
    }

    if digits.len() != NATIONAL_LEN {
        return None;
    }

    Some(format!("+55{digits}"))
}

#[cfg(test)]
mod tests {
    use super::normalize_phone;

    #[test]
    fn inserts_ninth_digit_for_old_format_numbers() {
        assert_eq!(
            normalize_phone("61 8626-6334").as_deref(),
            Some("+5561986266334")
        );
    }

    #[test]
    fn strips_country_prefix_from_full_numbers() {
        assert_eq!(
            normalize_phone("+55 61 99862-6334").as_deref(),
            Some("+5561998626334")
        );
    }

    #[test]
    fn keeps_ddd_55_numbers_intact() {
        // 55 here is the DDD, not the country code.
        assert_eq!(
            normalize_phone("55 99862-6334").as_deref(),
            Some("+5555998626334")
        );
    }

    #[test]
    fn strips_carrier_zero() {
        assert_eq!(
            normalize_phone("061 99862-6334").as_deref(),
            Some("+5561998626334")
        );
    }

    #[test]
    fn rejects_too_short() {
        assert_eq!(normalize_phone("123"), None);
    }

    #[test]
    fn rejects_too_long() {
        assert_eq!(normalize_phone("55 61 99862 63345 9"), None);
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(normalize_phone(""), None);
        assert_eq!(normalize_phone("sem telefone"), None);
    }

    #[test]
    fn country_prefix_and_old_format_combined() {
        // 55 + 10 digits: strip prefix, then insert the 9.
        assert_eq!(
            normalize_phone("+55 (61) 8626-6334").as_deref(),
            Some("+5561986266334")
        );
    }
}
