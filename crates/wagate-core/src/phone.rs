//! Recipient address normalization.

/// Turn a user-supplied phone number into a recipient address.
///
/// Non-digits are dropped, a leading `0` is replaced with `country_code`, and
/// `domain` is appended. Applying it to its own output yields the same address.
pub fn normalize_recipient(raw: &str, country_code: &str, domain: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    let mut formatted = match digits.strip_prefix('0') {
        Some(rest) => format!("{country_code}{rest}"),
        None => digits,
    };

    if !formatted.ends_with(domain) {
        formatted.push_str(domain);
    }

    formatted
}

/// The user part of a recipient address (everything before `@`).
pub fn recipient_user(address: &str) -> &str {
    address.split('@').next().unwrap_or(address)
}
