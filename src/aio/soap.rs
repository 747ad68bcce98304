use std::time::Duration;

use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{client::Client, Body, Request};
use tokio::time::timeout;

use crate::errors::RequestError;

#[derive(Clone, Debug)]
pub struct Action(String);

impl Action {
    pub fn new(action: &str) -> Action {
        Action(action.into())
    }
}

const HEADER_NAME: &str = "SOAPAction";

/// POST `body` to `url` and return the response text, whatever its HTTP status.
///
/// Gateways report UPnP faults with a 500 status and a SOAP body, so the status
/// is left for the caller's parser to interpret. Each stage of the exchange is
/// bounded by `limit`.
pub async fn send_async(url: &str, action: Action, body: &str, limit: Duration) -> Result<String, RequestError> {
    let client = Client::new();

    let req = Request::builder()
        .uri(url)
        .method("POST")
        .header(HEADER_NAME, action.0)
        .header(CONTENT_TYPE, "text/xml; charset=\"utf-8\"")
        .header(CONTENT_LENGTH, body.len() as u64)
        .body(Body::from(body.to_string()))?;

    let resp = timeout(limit, client.request(req)).await??;
    let bytes = timeout(limit, hyper::body::to_bytes(resp.into_body())).await??;

    String::from_utf8(bytes.to_vec()).map_err(|err| RequestError::InvalidResponse(err.to_string()))
}
