//! Small helpers shared by the import and purge commands.

/// Keep only ASCII digits. VAT columns arrive as "30-12345678-9" and similar.
pub fn digits_only(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Strip control characters that break the XML-RPC payload
/// (everything below 0x20 except tab, newline and carriage return).
pub fn strip_control_chars(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

/// Normalize a lookup key the way the reference-data maps do:
/// trimmed, uppercased, spaces removed.
pub fn normalize_key(value: &str) -> String {
    value
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Parse the spreadsheet booleans seen in the source files
/// (`VERDADERO` from the Spanish exports, plus the usual spellings).
pub fn parse_flexible_bool(value: &str) -> bool {
    matches!(
        value.trim().to_uppercase().as_str(),
        "VERDADERO" | "TRUE" | "1" | "SI" | "YES"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_only_strips_separators() {
        assert_eq!(digits_only("30-71234567-8"), "30712345678");
        assert_eq!(digits_only("CUIT 20.123.456/7"), "201234567");
        assert_eq!(digits_only(""), "");
    }

    #[test]
    fn strip_control_chars_keeps_whitespace() {
        assert_eq!(strip_control_chars("a\x00b\x1fc"), "abc");
        assert_eq!(strip_control_chars("line1\nline2\tend"), "line1\nline2\tend");
    }

    #[test]
    fn normalize_key_matches_reference_maps() {
        assert_eq!(normalize_key(" cuit "), "CUIT");
        assert_eq!(normalize_key("IVA Responsable Inscripto"), "IVARESPONSABLEINSCRIPTO");
    }

    #[test]
    fn flexible_bool_accepts_spanish_spreadsheets() {
        assert!(parse_flexible_bool("VERDADERO"));
        assert!(parse_flexible_bool(" true "));
        assert!(!parse_flexible_bool("FALSO"));
        assert!(!parse_flexible_bool(""));
    }
}
