//! Field constraints of the stored collections. These are checked before a
//! record is written, so that a bad value is reported with the name of the
//! offending field rather than as a raw constraint violation.

use crate::Error;

pub fn required(field: &str, value: &str, max: usize) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::ValidationFailed(format!("`{field}` is required")));
    }
    max_len(field, value, max)
}

pub fn max_len(field: &str, value: &str, max: usize) -> Result<(), Error> {
    match value.chars().count() <= max {
        true => Ok(()),
        false => Err(Error::ValidationFailed(format!(
            "`{field}` must be at most {max} characters long"
        ))),
    }
}

pub fn non_negative(field: &str, value: i64) -> Result<(), Error> {
    match value >= 0 {
        true => Ok(()),
        false => Err(Error::ValidationFailed(format!(
            "`{field}` must not be negative"
        ))),
    }
}

#[cfg(test)]
#[test]
fn test_required() {
    assert!(required("name", "Central High", 200).is_ok());
    assert!(required("name", "   ", 200).is_err());
    assert!(required("name", &"x".repeat(201), 200).is_err());
    assert!(max_len("district", "", 200).is_ok());
}
