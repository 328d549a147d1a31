use encoding_rs::WINDOWS_1252;
use once_cell::sync::Lazy;
use regex::Regex;

static FIRST_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\.\d+|\d+").expect("number pattern should compile"));

/// First integer or decimal substring, e.g. `"19"` in `"rvu19a"`.
pub fn first_number(s: &str) -> Option<&str> {
    FIRST_NUMBER.find(s).map(|m| m.as_str())
}

/// Decode Windows-1252 bytes. A leading BOM is kept as text, not sniffed.
pub fn decode_windows_1252(bytes: &[u8]) -> String {
    WINDOWS_1252
        .decode_without_bom_handling(bytes)
        .0
        .into_owned()
}
