use crate::error::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt};

// reads n (<= 8) bytes at off as a big-endian uint
pub fn read_uint(buf: &[u8], n: usize, off: usize) -> Result<u64> {
    if n > 8 {
        return Err(Error::ProtocolViolation(format!(
            "read_uint: width {n} exceeds 8 bytes"
        )));
    }
    let end = off
        .checked_add(n)
        .ok_or_else(|| Error::ProtocolViolation("read_uint: offset overflow".into()))?;
    let slice = buf
        .get(off..end)
        .ok_or_else(|| Error::UnexpectedEof)?;
    let mut value: u64 = 0;
    for &byte in slice {
        value = (value << 8) | u64::from(byte);
    }
    Ok(value)
}

pub fn write_uint(v: u64, buf: &mut [u8], n: usize, off: usize) -> Result<()> {
    if n > 8 {
        return Err(Error::ProtocolViolation(format!(
            "write_uint: width {n} exceeds 8 bytes"
        )));
    }
    let end = off
        .checked_add(n)
        .ok_or_else(|| Error::ProtocolViolation("write_uint: offset overflow".into()))?;
    if end > buf.len() {
        return Err(Error::ProtocolViolation(format!(
            "write_uint: offset {off} + width {n} exceeds buffer of length {}",
            buf.len()
        )));
    }
    for i in 0..n {
        let shift = 8 * (n - 1 - i);
        buf[off + i] = (v >> shift) as u8;
    }
    Ok(())
}

pub async fn read_n<R: AsyncRead + Unpin>(stream: &mut R, n: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|_| Error::UnexpectedEof)?;
    Ok(buf)
}

fn is_unreserved(byte: u8) -> bool {
    matches!(byte, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~')
        || (45..=57).contains(&byte) && byte != 47
}

// unreserved bytes pass through, everything else becomes %xx lowercase hex
pub fn encode_binary(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for &byte in data {
        if is_unreserved(byte) {
            out.push(byte as char);
        } else {
            out.push('%');
            out.push_str(&hex::encode([byte]));
        }
    }
    out
}

pub fn decode_binary(s: &str) -> Result<Vec<u8>> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex_pair = bytes
                .get(i + 1..i + 3)
                .ok_or_else(|| Error::BadUrl("truncated percent-escape".into()))?;
            let hex_str = std::str::from_utf8(hex_pair)
                .map_err(|_| Error::BadUrl("non-ascii percent-escape".into()))?;
            let value = u8::from_str_radix(hex_str, 16)
                .map_err(|_| Error::BadUrl("invalid percent-escape".into()))?;
            out.push(value);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_uint_big_endian() {
        let buf = [0x00, 0x00, 0x01, 0x02];
        assert_eq!(read_uint(&buf, 4, 0).unwrap(), 0x0102);
    }

    #[test]
    fn read_uint_width_one() {
        let buf = [0xff];
        assert_eq!(read_uint(&buf, 1, 0).unwrap(), 0xff);
    }

    #[test]
    fn read_uint_truncated_fails() {
        let buf = [0x01, 0x02];
        assert!(read_uint(&buf, 4, 0).is_err());
    }

    #[test]
    fn write_uint_round_trips() {
        let mut buf = [0u8; 8];
        write_uint(0x0102_0304, &mut buf, 4, 2).unwrap();
        assert_eq!(read_uint(&buf, 4, 2).unwrap(), 0x0102_0304);
    }

    #[test]
    fn write_uint_rejects_out_of_bounds() {
        let mut buf = [0u8; 2];
        assert!(write_uint(1, &mut buf, 4, 0).is_err());
    }

    #[test]
    fn encode_binary_passes_unreserved() {
        assert_eq!(encode_binary(b"Az09-._~"), "Az09-._~");
    }

    #[test]
    fn encode_binary_escapes_others() {
        assert_eq!(encode_binary(&[0x00, 0xff]), "%00%ff");
    }

    #[test]
    fn encode_decode_round_trip_for_20_byte_hash() {
        let hash: [u8; 20] = *b"abcdefghijklmnopqrst";
        let encoded = encode_binary(&hash);
        let decoded = decode_binary(&encoded).unwrap();
        assert_eq!(decoded, hash);
    }

    #[tokio::test]
    async fn read_n_reads_exact_bytes() {
        let data = b"hello world".to_vec();
        let mut cursor = std::io::Cursor::new(data.clone());
        let got = read_n(&mut cursor, 5).await.unwrap();
        assert_eq!(got, b"hello");
    }

    #[tokio::test]
    async fn read_n_fails_on_early_eof() {
        let data = b"hi".to_vec();
        let mut cursor = std::io::Cursor::new(data);
        let err = read_n(&mut cursor, 5).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof));
    }
}
