use crate::error::Error;
use std::collections::BTreeMap;

// dict keys are raw bytes, sorted by BTreeMap's byte ordering already
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bytes(Vec<u8>),
    Int(i64),
    List(Vec<Value>),
    Dict(BTreeMap<Vec<u8>, Value>),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::Bytes(s.as_ref().as_bytes().to_vec())
    }

    pub fn as_bytes(&self) -> Result<&[u8], Error> {
        match self {
            Value::Bytes(b) => Ok(b),
            other => Err(Error::BadBencode(format!("expected byte string, got {other:?}"))),
        }
    }

    pub fn as_str(&self) -> Result<&str, Error> {
        std::str::from_utf8(self.as_bytes()?)
            .map_err(|e| Error::BadBencode(format!("byte string is not utf-8: {e}")))
    }

    pub fn as_int(&self) -> Result<i64, Error> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(Error::BadBencode(format!("expected integer, got {other:?}"))),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], Error> {
        match self {
            Value::List(l) => Ok(l),
            other => Err(Error::BadBencode(format!("expected list, got {other:?}"))),
        }
    }

    pub fn as_dict(&self) -> Result<&BTreeMap<Vec<u8>, Value>, Error> {
        match self {
            Value::Dict(d) => Ok(d),
            other => Err(Error::BadBencode(format!("expected dict, got {other:?}"))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_dict().ok()?.get(key.as_bytes())
    }

    pub fn require(&self, key: &str) -> Result<&Value, Error> {
        self.get(key)
            .ok_or_else(|| Error::BadBencode(format!("missing key {key:?}")))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::string(v)
    }
}
