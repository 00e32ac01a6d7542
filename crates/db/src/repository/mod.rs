//! Repository functions, one function per database operation.
//!
//! Every function takes a `&DbPool` and returns a `Result<T, DbError>`.
//! Plain SQL with no business logic.

pub mod runs;
pub mod steps;

use std::fmt::Display;

use crate::DbError;

/// Convert a counter into its column type, refusing to truncate.
pub(crate) fn fit<S, T>(column: &'static str, value: S) -> Result<T, DbError>
where
    S: Copy + Display,
    T: TryFrom<S>,
{
    T::try_from(value).map_err(|_| DbError::OutOfRange {
        column,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fitting_values_convert() {
        let tokens: i64 = fit("tokens_in", 1_500u64).unwrap();
        assert_eq!(tokens, 1_500);
        let index: i32 = fit("step_index", 3usize).unwrap();
        assert_eq!(index, 3);
    }

    #[test]
    fn oversized_values_are_rejected() {
        let err = fit::<u64, i64>("tokens_out", u64::MAX).unwrap_err();
        assert!(matches!(err, DbError::OutOfRange { column: "tokens_out", .. }));
        assert_eq!(
            err.to_string(),
            format!("tokens_out = {} does not fit its column", u64::MAX)
        );
        assert!(fit::<usize, i32>("step_index", usize::MAX).is_err());
    }
}
