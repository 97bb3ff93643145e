use thiserror::Error;

use crate::{policy::CapTableError, rules::RuleBookError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    RuleBook(#[from] RuleBookError),
    #[error("invalid objection caps: {0}")]
    Caps(#[from] CapTableError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Stable machine-readable class used in CLI payloads and startup logs.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::RuleBook(_)) => "rule_book",
            Self::Domain(DomainError::Caps(_)) => "objection_caps",
            Self::Integration(_) => "integration",
            Self::Configuration(_) => "config_validation",
        }
    }
}

impl From<RuleBookError> for ApplicationError {
    fn from(value: RuleBookError) -> Self {
        Self::Domain(DomainError::RuleBook(value))
    }
}

impl From<CapTableError> for ApplicationError {
    fn from(value: CapTableError) -> Self {
        Self::Domain(DomainError::Caps(value))
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::Difficulty;
    use crate::errors::{ApplicationError, DomainError};
    use crate::policy::CapTableError;
    use crate::rules::RuleBookError;

    #[test]
    fn rule_book_error_lifts_into_application_error() {
        let error = ApplicationError::from(RuleBookError::NoDeferrals);

        assert!(matches!(error, ApplicationError::Domain(DomainError::RuleBook(_))));
        assert_eq!(error.error_class(), "rule_book");
        assert_eq!(error.to_string(), "rule book must list at least one deferral phrase");
    }

    #[test]
    fn cap_error_message_names_the_difficulty() {
        let error = ApplicationError::from(CapTableError::InvertedInterval {
            difficulty: Difficulty::Hard,
            min_cap: 5,
            max_cap: 4,
        });

        assert_eq!(error.error_class(), "objection_caps");
        assert_eq!(error.to_string(), "invalid objection caps: hard: min_cap 5 exceeds max_cap 4");
    }

    #[test]
    fn configuration_error_has_its_own_class() {
        let error = ApplicationError::Configuration("bad base url".to_owned());
        assert_eq!(error.error_class(), "config_validation");
        assert_eq!(error.to_string(), "configuration failure: bad base url");
    }
}
