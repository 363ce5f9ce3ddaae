use super::value::Value;
use crate::error::Error;
use std::collections::BTreeMap;

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn peek(&self) -> Result<u8, Error> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or_else(|| Error::BadBencode("unexpected end of input".into()))
    }

    fn advance(&mut self) -> Result<u8, Error> {
        let byte = self.peek()?;
        self.pos += 1;
        Ok(byte)
    }

    fn expect(&mut self, expected: u8) -> Result<(), Error> {
        let got = self.advance()?;
        if got != expected {
            return Err(Error::BadBencode(format!(
                "expected '{}', got '{}'",
                expected as char, got as char
            )));
        }
        Ok(())
    }

    fn read_until(&mut self, delim: u8) -> Result<&'a [u8], Error> {
        let start = self.pos;
        while self.peek()? != delim {
            self.pos += 1;
        }
        let slice = &self.buf[start..self.pos];
        self.pos += 1; // consume delimiter
        Ok(slice)
    }

    fn decode_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let len_bytes = self.read_until(b':')?;
        if len_bytes.is_empty() || (len_bytes[0] == b'0' && len_bytes.len() > 1) {
            return Err(Error::BadBencode("bad length prefix".into()));
        }
        let len_str = std::str::from_utf8(len_bytes)
            .map_err(|_| Error::BadBencode("non-numeric length prefix".into()))?;
        let len: usize = len_str
            .parse()
            .map_err(|_| Error::BadBencode("non-numeric length prefix".into()))?;
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| Error::BadBencode("length prefix overflow".into()))?;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| Error::BadBencode("truncated byte string".into()))?
            .to_vec();
        self.pos = end;
        Ok(bytes)
    }

    fn decode_int(&mut self) -> Result<i64, Error> {
        self.expect(b'i')?;
        let digits = self.read_until(b'e')?;
        let s = std::str::from_utf8(digits)
            .map_err(|_| Error::BadBencode("non-numeric integer body".into()))?;
        if s.is_empty() {
            return Err(Error::BadBencode("empty integer body".into()));
        }
        if s == "-0" {
            return Err(Error::BadBencode("negative zero is not allowed".into()));
        }
        let unsigned = s.strip_prefix('-').unwrap_or(s);
        if unsigned.len() > 1 && unsigned.starts_with('0') {
            return Err(Error::BadBencode("leading zeros are not allowed".into()));
        }
        s.parse()
            .map_err(|_| Error::BadBencode("non-numeric integer body".into()))
    }

    fn decode_list(&mut self) -> Result<Vec<Value>, Error> {
        self.expect(b'l')?;
        let mut items = Vec::new();
        while self.peek()? != b'e' {
            items.push(self.decode_value()?);
        }
        self.pos += 1; // consume 'e'
        Ok(items)
    }

    fn decode_dict(&mut self) -> Result<BTreeMap<Vec<u8>, Value>, Error> {
        self.expect(b'd')?;
        let mut dict = BTreeMap::new();
        while self.peek()? != b'e' {
            let key = self.decode_bytes()?;
            let value = self.decode_value()?;
            dict.insert(key, value);
        }
        self.pos += 1; // consume 'e'
        Ok(dict)
    }

    fn decode_value(&mut self) -> Result<Value, Error> {
        match self.peek()? {
            b'0'..=b'9' => self.decode_bytes().map(Value::Bytes),
            b'i' => self.decode_int().map(Value::Int),
            b'l' => self.decode_list().map(Value::List),
            b'd' => self.decode_dict().map(Value::Dict),
            other => Err(Error::BadBencode(format!(
                "unexpected byte '{}'",
                other as char
            ))),
        }
    }
}

pub fn decode(bytes: &[u8]) -> Result<Value, Error> {
    let mut decoder = Decoder::new(bytes);
    let value = decoder.decode_value()?;
    if decoder.pos != bytes.len() {
        return Err(Error::BadBencode("trailing bytes after value".into()));
    }
    Ok(value)
}
