//! Uniform success/failure view of one statement execution.

use crate::transport::ResultSet;

/// Whether a statement succeeded, plus the server message when it did not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub succeeded: bool,
    pub message: Option<String>,
}

impl Outcome {
    pub fn success() -> Self {
        Self {
            succeeded: true,
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            message: Some(message.into()),
        }
    }

    /// `Ok(())` on success, otherwise the error `on_failure` builds from the
    /// server message (empty when the server sent none).
    pub fn into_result<E>(self, on_failure: impl FnOnce(String) -> E) -> Result<(), E> {
        if self.succeeded {
            Ok(())
        } else {
            Err(on_failure(self.message.unwrap_or_default()))
        }
    }
}

impl From<&ResultSet> for Outcome {
    fn from(result: &ResultSet) -> Self {
        match result.error_msg() {
            None => Self::success(),
            Some(message) => Self::failure(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_is_kept() {
        let outcome = Outcome::from(&ResultSet::failure(-1, "Existed!"));
        assert_eq!(outcome, Outcome::failure("Existed!"));
        let err = outcome.into_result(|m| m).unwrap_err();
        assert_eq!(err, "Existed!");
    }

    #[test]
    fn success_has_no_message() {
        let outcome = Outcome::from(&ResultSet::empty());
        assert!(outcome.succeeded);
        assert!(outcome.into_result(|m| m).is_ok());
    }
}
