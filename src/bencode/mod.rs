mod decode;
mod encode;
mod value;

pub use decode::decode;
pub use encode::encode;
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn round_trips_sorted_dict() {
        let mut map = BTreeMap::new();
        map.insert(b"zebra".to_vec(), Value::Int(1));
        map.insert(b"apple".to_vec(), Value::Bytes(b"fruit".to_vec()));
        let value = Value::Dict(map);
        let bytes = encode(&value);
        assert_eq!(bytes, b"d5:apple5:fruit5:zebrai1ee");
        assert_eq!(decode(&bytes).unwrap(), value);
    }

    #[test]
    fn round_trips_nested_list() {
        let value = Value::List(vec![Value::Int(-1), Value::Bytes(b"spam".to_vec())]);
        let bytes = encode(&value);
        assert_eq!(bytes, b"li-1e4:spame");
        assert_eq!(decode(&bytes).unwrap(), value);
    }

    #[test]
    fn scrape_style_dict_preserves_raw_20_byte_keys() {
        let raw_hash: Vec<u8> = (0u8..20).collect();
        let mut files = BTreeMap::new();
        files.insert(
            raw_hash.clone(),
            Value::Dict(BTreeMap::from([(b"complete".to_vec(), Value::Int(3))])),
        );
        let mut top = BTreeMap::new();
        top.insert(b"files".to_vec(), Value::Dict(files));
        let value = Value::Dict(top);
        let bytes = encode(&value);
        let decoded = decode(&bytes).unwrap();
        let files = decoded.as_dict().unwrap().get(b"files".as_slice()).unwrap();
        let entry = files.as_dict().unwrap().get(raw_hash.as_slice()).unwrap();
        assert_eq!(
            entry.as_dict().unwrap().get(b"complete".as_slice()).unwrap().as_int().unwrap(),
            3
        );
    }
}
