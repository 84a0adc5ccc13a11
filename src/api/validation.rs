use thiserror::Error;

use super::models::IngestRequest;

const MAX_REFERENCE_LEN: usize = 2048;

#[derive(Debug, Error)]
pub enum RequestValidationError {
    #[error("file_path must not be empty")]
    EmptyReference,
    #[error("file_path exceeds 2048 bytes")]
    ReferenceTooLong,
    #[error("file_path must not contain control characters")]
    ControlCharacters,
}

pub fn validate_request(request: &IngestRequest) -> Result<(), RequestValidationError> {
    let reference = request.file_path.trim();

    if reference.is_empty() {
        return Err(RequestValidationError::EmptyReference);
    }

    if reference.len() > MAX_REFERENCE_LEN {
        return Err(RequestValidationError::ReferenceTooLong);
    }

    if reference.chars().any(char::is_control) {
        return Err(RequestValidationError::ControlCharacters);
    }

    Ok(())
}
