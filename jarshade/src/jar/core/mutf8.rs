//! Java "modified UTF-8" as stored in `CONSTANT_Utf8` entries.
//!
//! Differs from standard UTF-8 in two ways: U+0000 is written as the two
//! byte sequence `C0 80`, and supplementary characters are written as a
//! surrogate pair where each half is encoded as a three byte sequence.

/// Decode modified UTF-8. Returns `None` for malformed input, in which case
/// callers should leave the constant untouched.
pub fn decode(bytes: &[u8]) -> Option<String> {
    // Fast path: plain ASCII without NUL is identical in both encodings
    if bytes.iter().all(|b| *b != 0 && *b < 0x80) {
        return std::str::from_utf8(bytes).ok().map(str::to_owned);
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 & 0x80 == 0 {
            if b0 == 0 {
                return None;
            }
            units.push(u16::from(b0));
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let b1 = *bytes.get(i + 1)?;
            if b1 & 0xC0 != 0x80 {
                return None;
            }
            units.push((u16::from(b0 & 0x1F) << 6) | u16::from(b1 & 0x3F));
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let b1 = *bytes.get(i + 1)?;
            let b2 = *bytes.get(i + 2)?;
            if b1 & 0xC0 != 0x80 || b2 & 0xC0 != 0x80 {
                return None;
            }
            units.push(
                (u16::from(b0 & 0x0F) << 12) | (u16::from(b1 & 0x3F) << 6) | u16::from(b2 & 0x3F),
            );
            i += 3;
        } else {
            return None;
        }
    }

    String::from_utf16(&units).ok()
}

/// Encode a string as modified UTF-8.
pub fn encode(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for unit in text.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_unchanged() {
        assert_eq!(encode("org/foo/Bar"), b"org/foo/Bar".to_vec());
        assert_eq!(decode(b"org/foo/Bar").as_deref(), Some("org/foo/Bar"));
    }

    #[test]
    fn nul_uses_two_bytes() {
        assert_eq!(encode("a\0b"), vec![b'a', 0xC0, 0x80, b'b']);
        assert_eq!(decode(&[b'a', 0xC0, 0x80, b'b']).as_deref(), Some("a\0b"));
    }

    #[test]
    fn supplementary_characters_use_surrogate_pairs() {
        let text = "x\u{1F600}";
        let encoded = encode(text);
        assert_eq!(encoded.len(), 1 + 6);
        assert_eq!(decode(&encoded).as_deref(), Some(text));
    }

    #[test]
    fn raw_nul_and_four_byte_forms_are_rejected() {
        assert_eq!(decode(&[b'a', 0]), None);
        assert_eq!(decode("\u{1F600}".as_bytes()), None);
    }
}
