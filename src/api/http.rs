//! Request execution shared by the agent and partner clients.

use crate::{Error, Result};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;
use url::Url;

/// Send a prepared request; anything but 200 is an error.
///
/// An empty 200 body comes back as `Value::Null`.
pub(crate) async fn execute(request: RequestBuilder, method: &Method, url: &Url) -> Result<Value> {
    let response = request.send().await?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(Error::Status {
            method: method.to_string(),
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}
