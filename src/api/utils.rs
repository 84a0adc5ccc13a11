//! Stateless request checks shared by handlers

use crate::api::error::ApiError;

/// Accepts `application/json` with optional parameters, nothing else
pub fn require_json(content_type: &str) -> Result<(), ApiError> {
    let media_type: mime::Mime = content_type
        .parse()
        .map_err(|_| ApiError::InvalidPayload(format!("unparseable Content-Type '{content_type}'")))?;

    if media_type.essence_str() != mime::APPLICATION_JSON.essence_str() {
        return Err(ApiError::InvalidPayload(format!(
            "Content-Type must be application/json, got {}",
            media_type.essence_str()
        )));
    }

    Ok(())
}
