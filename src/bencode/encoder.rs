use crate::bencode::value::Value;

pub trait BencodeEncode {
    fn bencode(&self, buf: &mut Vec<u8>);
}

impl BencodeEncode for i64 {
    fn bencode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(b"i");

        let mut buffer = itoa::Buffer::new();
        buf.extend_from_slice(buffer.format(*self).as_bytes());
        buf.extend_from_slice(b"e");
    }
}

impl BencodeEncode for &[u8] {
    fn bencode(&self, buf: &mut Vec<u8>) {
        let mut buffer = itoa::Buffer::new();
        buf.extend_from_slice(buffer.format(self.len()).as_bytes());
        buf.extend_from_slice(b":");
        buf.extend_from_slice(self);
    }
}

impl BencodeEncode for &str {
    fn bencode(&self, buf: &mut Vec<u8>) {
        self.as_bytes().bencode(buf);
    }
}

impl BencodeEncode for Vec<u8> {
    fn bencode(&self, buf: &mut Vec<u8>) {
        self.as_slice().bencode(buf);
    }
}

/// Encode a parsed value back to bytes
///
/// Dictionary keys are written in parsed order, never re-sorted, so an
/// untouched tree re-encodes to the exact bytes it was decoded from.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_into(value, &mut buf);
    buf
}

pub fn encode_into(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Int(n) => n.bencode(buf),
        Value::Bytes(bytes) => bytes.bencode(buf),
        Value::List(items) => {
            buf.extend_from_slice(b"l");
            for item in items {
                encode_into(item, buf);
            }
            buf.extend_from_slice(b"e");
        }
        Value::Dict(entries) => {
            buf.extend_from_slice(b"d");
            for (key, value) in entries {
                key.bencode(buf);
                encode_into(value, buf);
            }
            buf.extend_from_slice(b"e");
        }
    }
}
