use shared::protocol::MAX_FIELD_LEN;
use url::Url;
use crate::error::{PollerError, Result};

/// Checks a service name and URL before anything is sent to the registry.
/// Local and private-network hosts are accepted.
pub fn validate_service(name: &str, url: &str) -> Result<()> {
    validate_name(name)?;
    validate_url(url)?;
    Ok(())
}

pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(PollerError::Validation("Service name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_FIELD_LEN {
        return Err(PollerError::Validation(format!(
            "Service name is longer than {MAX_FIELD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_url(url: &str) -> Result<()> {
    let invalid = || PollerError::Validation("Service URL is invalid".to_string());

    if url.chars().count() > MAX_FIELD_LEN {
        return Err(PollerError::Validation(format!(
            "Service URL is longer than {MAX_FIELD_LEN} characters"
        )));
    }

    let parsed = Url::parse(url.trim()).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid());
    }
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(invalid()),
    }
}
