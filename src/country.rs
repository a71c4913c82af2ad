//! Country calling-code to ISO country-code mapping.

/// Calling codes, longest codes first so prefix matching is unambiguous.
const CALLING_CODES: &[(&str, &str)] = &[
    ("20", "EG"),
    ("27", "ZA"),
    ("30", "GR"),
    ("31", "NL"),
    ("32", "BE"),
    ("33", "FR"),
    ("34", "ES"),
    ("36", "HU"),
    ("39", "IT"),
    ("40", "RO"),
    ("41", "CH"),
    ("43", "AT"),
    ("44", "GB"),
    ("45", "DK"),
    ("46", "SE"),
    ("47", "NO"),
    ("48", "PL"),
    ("49", "DE"),
    ("51", "PE"),
    ("52", "MX"),
    ("54", "AR"),
    ("55", "BR"),
    ("56", "CL"),
    ("57", "CO"),
    ("58", "VE"),
    ("60", "MY"),
    ("61", "AU"),
    ("62", "ID"),
    ("63", "PH"),
    ("64", "NZ"),
    ("65", "SG"),
    ("66", "TH"),
    ("81", "JP"),
    ("82", "KR"),
    ("84", "VN"),
    ("86", "CN"),
    ("90", "TR"),
    ("91", "IN"),
    ("92", "PK"),
    ("93", "AF"),
    ("94", "LK"),
    ("95", "MM"),
    ("98", "IR"),
    ("1", "US"),
    ("7", "RU"),
];

/// Derive the ISO country code from a phone number such as `+34612345678`
/// or `0034612345678`.
#[must_use]
pub fn from_phone(phone: &str) -> Option<&'static str> {
    let clean: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();

    let digits = if let Some(rest) = clean.strip_prefix('+') {
        rest
    } else if let Some(rest) = clean.strip_prefix("00") {
        rest
    } else {
        return None;
    };

    // Longest match wins: try 3-digit codes down to 1-digit.
    for len in (1..=3).rev() {
        let Some(prefix) = digits.get(..len) else {
            continue;
        };
        if let Some((_, iso)) = CALLING_CODES.iter().find(|(code, _)| *code == prefix) {
            return Some(iso);
        }
    }
    None
}
