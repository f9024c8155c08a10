use crate::core::error::ValidationError;

/// Decode URL-encoded bytes (percent-encoding)
///
/// Announce query values such as info_hash arrive percent-encoded and
/// decode to raw binary, so this works on bytes rather than UTF-8.
pub fn url_decode(encoded: &str) -> Result<Vec<u8>, ValidationError> {
    let mut decoded = Vec::with_capacity(encoded.len());
    let mut bytes = encoded.bytes();

    while let Some(byte) = bytes.next() {
        match byte {
            b'%' => {
                let hex1 = bytes.next().ok_or_else(|| {
                    ValidationError::InvalidEscape("incomplete percent-encoding".to_string())
                })?;
                let hex2 = bytes.next().ok_or_else(|| {
                    ValidationError::InvalidEscape("incomplete percent-encoding".to_string())
                })?;

                let high = hex_value(hex1)?;
                let low = hex_value(hex2)?;
                decoded.push(high << 4 | low);
            }
            // '+' is decoded as space in URL encoding
            b'+' => decoded.push(b' '),
            _ => decoded.push(byte),
        }
    }

    Ok(decoded)
}

/// Percent-encode raw bytes for use in a query string
///
/// Everything outside the unreserved set is escaped, which is what a
/// raw 20-byte infohash needs to survive a tracker announce URL.
pub fn url_encode(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 3);

    for &byte in bytes {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push('%');
                encoded.push(char::from_digit((byte >> 4) as u32, 16).unwrap().to_ascii_uppercase());
                encoded.push(char::from_digit((byte & 0x0f) as u32, 16).unwrap().to_ascii_uppercase());
            }
        }
    }

    encoded
}

fn hex_value(byte: u8) -> Result<u8, ValidationError> {
    match byte {
        b'0'..=b'9' => Ok(byte - b'0'),
        b'a'..=b'f' => Ok(byte - b'a' + 10),
        b'A'..=b'F' => Ok(byte - b'A' + 10),
        _ => Err(ValidationError::InvalidEscape(format!(
            "invalid hex digit 0x{byte:02x}"
        ))),
    }
}
