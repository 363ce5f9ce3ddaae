use super::value::Value;

fn encode_bytes(out: &mut Vec<u8>, s: &[u8]) {
    out.extend_from_slice(s.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(s);
}

fn encode_int(out: &mut Vec<u8>, i: i64) {
    out.push(b'i');
    out.extend_from_slice(i.to_string().as_bytes());
    out.push(b'e');
}

fn encode_list(out: &mut Vec<u8>, list: &[Value]) {
    out.push(b'l');
    for item in list {
        encode_value(out, item);
    }
    out.push(b'e');
}

fn encode_dict(out: &mut Vec<u8>, dict: &std::collections::BTreeMap<Vec<u8>, Value>) {
    out.push(b'd');
    // BTreeMap iterates in ascending key order, which is exactly the
    // lexicographic order bencode dictionaries require.
    for (key, value) in dict {
        encode_bytes(out, key);
        encode_value(out, value);
    }
    out.push(b'e');
}

fn encode_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Bytes(b) => encode_bytes(out, b),
        Value::Int(i) => encode_int(out, *i),
        Value::List(l) => encode_list(out, l),
        Value::Dict(d) => encode_dict(out, d),
    }
}

/// Encodes a [`Value`] into its bencode byte representation.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_value(&mut out, value);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_string() {
        assert_eq!(encode(&Value::Bytes(b"spam".to_vec())), b"4:spam");
    }

    #[test]
    fn encodes_zero() {
        assert_eq!(encode(&Value::Int(0)), b"i0e");
    }

    #[test]
    fn encodes_negative() {
        assert_eq!(encode(&Value::Int(-42)), b"i-42e");
    }
}
