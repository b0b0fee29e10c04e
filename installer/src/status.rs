//! HTTP status classification for release downloads.
//!
//! Only the 2xx range lets the pipeline continue. A response without a status
//! code is represented as `0` and rejected like any other failure.

use thiserror::Error;

/// Lowest status code treated as success.
const SUCCESS_MIN: u16 = 200;

/// Highest status code treated as success.
const SUCCESS_MAX: u16 = 299;

/// The release store answered with a status outside `200..=299`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unexpected HTTP status code '{code}'")]
pub struct StatusError {
    /// The rejected status code (`0` when the response carried none).
    pub code: u16,
}

/// Classify a response status code.
///
/// # Errors
///
/// Returns [`StatusError`] carrying `code` for anything outside
/// `200..=299`.
///
/// # Examples
///
/// ```
/// use cish_installer::status::validate;
///
/// assert!(validate(200).is_ok());
/// assert!(validate(299).is_ok());
/// assert_eq!(validate(404).map_err(|e| e.code), Err(404));
/// assert!(validate(0).is_err());
/// ```
pub const fn validate(code: u16) -> Result<(), StatusError> {
    match code {
        SUCCESS_MIN..=SUCCESS_MAX => Ok(()),
        _ => Err(StatusError { code }),
    }
}
