/// Strip formatting from a phone number and check it is `+` followed by
/// 4 to 15 digits.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let normalized: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')'))
        .collect();

    let digits = normalized.strip_prefix('+')?;
    if (4..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(normalized)
    } else {
        None
    }
}
