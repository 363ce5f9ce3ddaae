use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bittorrent::bencode::Value;
use std::collections::BTreeMap;

// bencoded {failure reason} body, the http-side counterpart of the udp error frame
#[derive(Debug)]
pub struct ErrResp {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl ErrResp {
    pub fn new(status: StatusCode, reason: impl Into<String>) -> Self {
        let mut dict = BTreeMap::new();
        dict.insert(b"failure reason".to_vec(), Value::Bytes(reason.into().into_bytes()));
        let body = bittorrent::bencode::encode(&Value::Dict(dict));
        Self { status, body }
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, reason)
    }

    pub fn server_error(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, reason)
    }
}

impl IntoResponse for ErrResp {
    fn into_response(self) -> Response {
        (self.status, self.body).into_response()
    }
}