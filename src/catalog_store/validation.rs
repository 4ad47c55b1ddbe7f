//! Field-level domain checks shared by every backend.

use super::error::{CatalogError, CatalogResult};
use super::models::{RATING_MAX, RATING_MIN};

/// Reject empty (or whitespace-only) values for required name fields.
pub(crate) fn check_non_empty(field: &'static str, value: &str) -> CatalogResult<()> {
    if value.trim().is_empty() {
        return Err(CatalogError::InvalidValue {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Ratings are integers in [`RATING_MIN`, `RATING_MAX`].
pub(crate) fn check_rating_range(rating: i32) -> CatalogResult<()> {
    if !(RATING_MIN..=RATING_MAX).contains(&rating) {
        return Err(CatalogError::InvalidValue {
            field: "rating",
            reason: format!(
                "must be between {} and {}, got {}",
                RATING_MIN, RATING_MAX, rating
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_whitespace_names_are_rejected() {
        assert!(check_non_empty("name", "Beatles").is_ok());
        assert!(matches!(
            check_non_empty("name", ""),
            Err(CatalogError::InvalidValue { field: "name", .. })
        ));
        assert!(matches!(
            check_non_empty("username", "   "),
            Err(CatalogError::InvalidValue { field: "username", .. })
        ));
    }

    #[test]
    fn rating_bounds_are_inclusive() {
        for rating in RATING_MIN..=RATING_MAX {
            assert!(check_rating_range(rating).is_ok());
        }
        for rating in [0, 6, -1, 100] {
            assert!(matches!(
                check_rating_range(rating),
                Err(CatalogError::InvalidValue { field: "rating", .. })
            ));
        }
    }
}
