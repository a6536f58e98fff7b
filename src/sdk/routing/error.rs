use serde::Deserialize;
use thiserror::Error;

/// ORS error code for "could not find routable point".
pub const ORS_UNROUTABLE_POINT: u32 = 2010;

// Helper structs to parse the JSON error response from ORS
#[derive(Deserialize, Debug)]
pub struct OrsErrorDetail {
    pub code: u32,
    pub message: String,
}
#[derive(Deserialize, Debug)]
pub struct OrsErrorPayload {
    pub error: OrsErrorDetail,
}

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("A point was not routable on the road network: {0}")]
    UnroutablePoint(String),

    #[error("API Error (Code {code}): {message}")]
    ApiError { code: u32, message: String },

    // Body that isn't the structured ORS error
    #[error("Unstructured API Error ({status}): {body}")]
    RawApiError { status: u16, body: String },

    #[error("Underlying request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("No route found in success response")]
    NoRoute,
}

impl RoutingError {
    /// Maps a non-success directions response onto an error.
    pub fn from_response(status: u16, body: String) -> Self {
        match serde_json::from_str::<OrsErrorPayload>(&body) {
            Ok(payload) if payload.error.code == ORS_UNROUTABLE_POINT => {
                RoutingError::UnroutablePoint(payload.error.message)
            }
            Ok(payload) => RoutingError::ApiError {
                code: payload.error.code,
                message: payload.error.message,
            },
            Err(_) => RoutingError::RawApiError { status, body },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_error_bodies() {
        let unroutable = r#"{"error":{"code":2010,"message":"Could not find routable point within a radius of 350.0 meters"}}"#;
        assert!(matches!(
            RoutingError::from_response(404, unroutable.to_string()),
            RoutingError::UnroutablePoint(_)
        ));

        let quota = r#"{"error":{"code":2004,"message":"Request parameters exceed the server configuration limits"}}"#;
        assert!(matches!(
            RoutingError::from_response(400, quota.to_string()),
            RoutingError::ApiError { code: 2004, .. }
        ));

        let raw = r#"{"error":"Access to this API has been disallowed"}"#;
        assert!(matches!(
            RoutingError::from_response(403, raw.to_string()),
            RoutingError::RawApiError { status: 403, .. }
        ));
    }
}
