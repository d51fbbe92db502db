//! GSM 7-bit default alphabet codec for USSD payloads.
//!
//! The text forms (`encode_7bit`/`decode_7bit`) keep each character as
//! itself after mapping it onto the alphabet; the hex forms emit each
//! septet value as two uppercase hex digits. Encoding never fails:
//! characters outside the alphabet become spaces.

/// Escape to the extension table. Never produced by the encoder.
const ESCAPE: char = '\u{1B}';

/// GSM 03.38 default alphabet, indexed by septet value.
#[rustfmt::skip]
const ALPHABET: [char; 128] = [
    '@', '£', '$', '¥', 'è', 'é', 'ù', 'ì',
    'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å',
    'Δ', '_', 'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ',
    'Σ', 'Θ', 'Ξ', ESCAPE, 'Æ', 'æ', 'ß', 'É',
    ' ', '!', '"', '#', '¤', '%', '&', '\'',
    '(', ')', '*', '+', ',', '-', '.', '/',
    '0', '1', '2', '3', '4', '5', '6', '7',
    '8', '9', ':', ';', '<', '=', '>', '?',
    '¡', 'A', 'B', 'C', 'D', 'E', 'F', 'G',
    'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O',
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W',
    'X', 'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '§',
    '¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g',
    'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o',
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w',
    'x', 'y', 'z', 'ä', 'ö', 'ñ', 'ü', 'à',
];

/// Septet used in place of unsupported characters.
const SPACE: u8 = 0x20;

/// Returns the septet value of `c`, if it is in the default alphabet.
#[must_use]
pub fn septet(c: char) -> Option<u8> {
    if c == ESCAPE {
        return None;
    }
    ALPHABET.iter().position(|&a| a == c).map(|i| i as u8)
}

/// Returns the character for a septet value, if it maps to one.
#[must_use]
pub fn char_for_septet(value: u8) -> Option<char> {
    ALPHABET
        .get(usize::from(value))
        .copied()
        .filter(|&c| c != ESCAPE)
}

/// Returns true if every character of `text` is in the default alphabet.
#[must_use]
pub fn is_gsm7_compatible(text: &str) -> bool {
    text.chars().all(|c| septet(c).is_some())
}

/// Upper-cases `text` and maps it onto the alphabet, replacing
/// unsupported characters with a space.
#[must_use]
pub fn encode_7bit(text: &str) -> String {
    text.to_uppercase()
        .chars()
        .map(|c| if septet(c).is_some() { c } else { ' ' })
        .collect()
}

/// Like [`encode_7bit`], emitting each septet as two uppercase hex digits.
#[must_use]
pub fn encode_hex_7bit(text: &str) -> String {
    text.to_uppercase()
        .chars()
        .map(|c| format!("{:02X}", septet(c).unwrap_or(SPACE)))
        .collect()
}

/// Inverse of [`encode_7bit`]. Characters pass through unchanged.
#[must_use]
pub fn decode_7bit(text: &str) -> String {
    text.chars()
        .map(|c| septet(c).and_then(char_for_septet).unwrap_or(c))
        .collect()
}

/// Inverse of [`encode_hex_7bit`].
///
/// Each hex pair is mapped through the alphabet; values without a mapping
/// become the character with that code, pairs that are not hex are kept
/// verbatim and a trailing odd digit is dropped.
#[must_use]
pub fn decode_hex_7bit(hex_text: &str) -> String {
    let chars: Vec<char> = hex_text.chars().collect();
    let mut decoded = String::with_capacity(chars.len() / 2);

    for pair in chars.chunks_exact(2) {
        let pair: String = pair.iter().collect();
        match u8::from_str_radix(&pair, 16) {
            Ok(code) => decoded.push(char_for_septet(code).unwrap_or(char::from(code))),
            Err(_) => decoded.push_str(&pair),
        }
    }

    decoded
}

/// Decodes UCS-2 text sent as big-endian hex (USSD DCS 72).
///
/// Returns `None` if the input is not hex or not valid UTF-16.
#[must_use]
pub fn decode_ucs2_hex(hex_text: &str) -> Option<String> {
    let bytes = hex::decode(hex_text).ok()?;
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

/// Returns true if `text` is a non-empty, even-length run of hex digits.
#[must_use]
pub fn looks_like_hex(text: &str) -> bool {
    !text.is_empty() && text.len() % 2 == 0 && text.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Keeps only `[0-9*#+A-Za-z]` and upper-cases the result.
#[must_use]
pub fn sanitize_for_ussd(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '#' | '+'))
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
