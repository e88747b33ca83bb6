//! Input validation for identifiers that cross the backend-protocol
//! boundary: tenant slugs, sub_ids, meeting ids/names.

use crate::canned::{MEETING_ID_LENGTH, MEETING_NAME_LENGTH};
use crate::error::{B3lbError, Result};

/// Tenant slug: 2-10 uppercase ASCII letters.
pub fn validate_tenant_slug(slug: &str) -> Result<()> {
    if slug.len() < 2 || slug.len() > 10 {
        return Err(B3lbError::ValidationError(
            "tenant slug must be between 2 and 10 characters".into(),
        ));
    }
    if !slug.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(B3lbError::ValidationError(
            "tenant slug must be all uppercase ASCII letters".into(),
        ));
    }
    Ok(())
}

/// Secret sub_id: 0-999, 0 reserved as the tenant-wide aggregation root.
pub fn validate_sub_id(sub_id: i32) -> Result<()> {
    if !(0..=999).contains(&sub_id) {
        return Err(B3lbError::ValidationError(
            "sub_id must be between 0 and 999".into(),
        ));
    }
    Ok(())
}

pub fn validate_meeting_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > MEETING_ID_LENGTH {
        return Err(B3lbError::ValidationError(format!(
            "meeting id must be 1-{} characters",
            MEETING_ID_LENGTH
        )));
    }
    Ok(())
}

pub fn validate_meeting_name(name: &str) -> Result<()> {
    if name.len() < 2 || name.len() > MEETING_NAME_LENGTH {
        return Err(B3lbError::ValidationError(format!(
            "meeting name must be 2-{} characters",
            MEETING_NAME_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_slug_accepts_valid() {
        assert!(validate_tenant_slug("AB").is_ok());
        assert!(validate_tenant_slug("ABCDEFGHIJ").is_ok());
    }

    #[test]
    fn tenant_slug_rejects_lowercase_and_bad_length() {
        assert!(validate_tenant_slug("ab").is_err());
        assert!(validate_tenant_slug("A").is_err());
        assert!(validate_tenant_slug("ABCDEFGHIJK").is_err());
    }

    #[test]
    fn sub_id_range() {
        assert!(validate_sub_id(0).is_ok());
        assert!(validate_sub_id(999).is_ok());
        assert!(validate_sub_id(1000).is_err());
        assert!(validate_sub_id(-1).is_err());
    }

    #[test]
    fn meeting_id_length() {
        assert!(validate_meeting_id("abc").is_ok());
        assert!(validate_meeting_id("").is_err());
        assert!(validate_meeting_id(&"a".repeat(101)).is_err());
    }
}
