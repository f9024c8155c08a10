use crate::bencode::value::Value;
use crate::core::error::DecodeError;
use std::ops::Range;

/// Hard bound on container nesting; recursion past this would risk the
/// parser's own stack on crafted input
const MAX_DEPTH: usize = 100;

/// Decode a complete bencode document
///
/// The decoder is strict: integers may not carry leading zeros or a
/// negative zero, byte string lengths may not carry leading zeros, and
/// dictionary keys must be unique. Every document the decoder accepts
/// re-encodes to the exact input bytes, which is what keeps untouched
/// torrent structures byte-stable.
pub fn decode(data: &[u8]) -> Result<Value, DecodeError> {
    let mut decoder = Decoder::new(data);
    let value = decoder.parse_value()?;

    if decoder.pos != data.len() {
        return Err(DecodeError::TrailingData { offset: decoder.pos });
    }

    Ok(value)
}

/// Find the raw byte range of one value inside the root dictionary
///
/// Used to pull the `info` value out of a torrent file exactly as it
/// appeared on disk. Returns `None` if the key is absent.
pub fn root_value_span(data: &[u8], key: &[u8]) -> Result<Option<Range<usize>>, DecodeError> {
    let mut decoder = Decoder::new(data);

    if decoder.next()? != b'd' {
        return Err(DecodeError::InvalidPrefix {
            byte: data[0],
            offset: 0,
        });
    }

    let mut span = None;

    loop {
        if decoder.peek()? == b'e' {
            decoder.pos += 1;
            break;
        }

        let key_offset = decoder.pos;
        let entry_key = decoder.parse_byte_string()?;
        let start = decoder.pos;
        decoder.parse_value()?;

        if entry_key == key {
            if span.is_some() {
                return Err(DecodeError::DuplicateKey { offset: key_offset });
            }
            span = Some(start..decoder.pos);
        }
    }

    if decoder.pos != data.len() {
        return Err(DecodeError::TrailingData { offset: decoder.pos });
    }

    Ok(span)
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    fn descend(&mut self) -> Result<(), DecodeError> {
        if self.depth == MAX_DEPTH {
            return Err(DecodeError::TooDeep { offset: self.pos });
        }
        self.depth += 1;
        Ok(())
    }

    fn peek(&self) -> Result<u8, DecodeError> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEof { offset: self.pos })
    }

    fn next(&mut self) -> Result<u8, DecodeError> {
        let byte = self.peek()?;
        self.pos += 1;
        Ok(byte)
    }

    fn parse_value(&mut self) -> Result<Value, DecodeError> {
        match self.peek()? {
            b'i' => self.parse_integer(),
            b'l' => self.parse_list(),
            b'd' => self.parse_dict(),
            b'0'..=b'9' => Ok(Value::Bytes(self.parse_byte_string()?)),
            byte => Err(DecodeError::InvalidPrefix {
                byte,
                offset: self.pos,
            }),
        }
    }

    fn parse_integer(&mut self) -> Result<Value, DecodeError> {
        let offset = self.pos;
        self.pos += 1; // 'i'

        let start = self.pos;
        while self.peek()? != b'e' {
            self.pos += 1;
        }

        let body = &self.data[start..self.pos];
        self.pos += 1; // 'e'

        let digits = match body.first() {
            Some(b'-') => &body[1..],
            _ => body,
        };

        // Reject empty, sign-only, non-digit, leading-zero, and -0 forms
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(DecodeError::InvalidInteger { offset });
        }
        if digits.len() > 1 && digits[0] == b'0' {
            return Err(DecodeError::InvalidInteger { offset });
        }
        if body[0] == b'-' && digits == b"0" {
            return Err(DecodeError::InvalidInteger { offset });
        }

        let text = std::str::from_utf8(body).map_err(|_| DecodeError::InvalidInteger { offset })?;
        let value = text
            .parse::<i64>()
            .map_err(|_| DecodeError::InvalidInteger { offset })?;

        Ok(Value::Int(value))
    }

    fn parse_byte_string(&mut self) -> Result<Vec<u8>, DecodeError> {
        let offset = self.pos;

        let start = self.pos;
        while self.peek()? != b':' {
            self.pos += 1;
        }

        let digits = &self.data[start..self.pos];
        self.pos += 1; // ':'

        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(DecodeError::InvalidLength { offset });
        }
        if digits.len() > 1 && digits[0] == b'0' {
            return Err(DecodeError::InvalidLength { offset });
        }

        let text = std::str::from_utf8(digits).map_err(|_| DecodeError::InvalidLength { offset })?;
        let len = text
            .parse::<usize>()
            .map_err(|_| DecodeError::InvalidLength { offset })?;

        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(DecodeError::UnexpectedEof {
                offset: self.data.len(),
            })?;

        let bytes = self.data[self.pos..end].to_vec();
        self.pos = end;

        Ok(bytes)
    }

    fn parse_list(&mut self) -> Result<Value, DecodeError> {
        self.descend()?;
        self.pos += 1; // 'l'

        let mut items = Vec::new();
        while self.peek()? != b'e' {
            items.push(self.parse_value()?);
        }
        self.pos += 1; // 'e'

        self.depth -= 1;
        Ok(Value::List(items))
    }

    fn parse_dict(&mut self) -> Result<Value, DecodeError> {
        self.descend()?;
        self.pos += 1; // 'd'

        let mut entries: Vec<(Vec<u8>, Value)> = Vec::new();
        while self.peek()? != b'e' {
            if !self.peek()?.is_ascii_digit() {
                return Err(DecodeError::InvalidKey { offset: self.pos });
            }
            let key_offset = self.pos;
            let key = self.parse_byte_string()?;
            if entries.iter().any(|(k, _)| *k == key) {
                return Err(DecodeError::DuplicateKey { offset: key_offset });
            }
            let value = self.parse_value()?;
            entries.push((key, value));
        }
        self.pos += 1; // 'e'

        self.depth -= 1;
        Ok(Value::Dict(entries))
    }
}
