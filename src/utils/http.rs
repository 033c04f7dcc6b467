use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;

use crate::error::{BackendError, BackendResult};

/// Attach the project key and the caller's bearer token to a request.
///
/// `bearer` is the session's access token, or the anon key itself for
/// requests made before anyone is signed in.
pub fn with_credentials(builder: RequestBuilder, anon_key: &str, bearer: &str) -> RequestBuilder {
    builder
        .header("apikey", anon_key)
        .bearer_auth(bearer)
}

/// Passes 2xx responses through and turns everything else into a `BackendError`.
pub async fn ensure_success(response: Response) -> BackendResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(error_for_status(status, &body))
}

/// Maps an error status and its body to a `BackendError`.
pub fn error_for_status(status: StatusCode, body: &str) -> BackendError {
    let message = backend_message(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized(message),
        _ => BackendError::Rejected {
            status: status.as_u16(),
            message,
        },
    }
}

/// PostgREST answers with `message`, GoTrue with `msg` or `error_description`.
fn backend_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(Value::as_str))
        })
        .map(str::to_string)
        .unwrap_or_else(|| {
            if body.is_empty() {
                "no details".to_string()
            } else {
                body.to_string()
            }
        })
}
