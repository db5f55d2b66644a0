use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;

/// Who submitted a survey. The pipeline never inspects the variant beyond
/// [`Submitter::stable_key`], so identified-user variants can be added
/// without touching the orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Submitter {
    Anonymous { stable_key: String },
}

impl Submitter {
    /// Builds an anonymous submitter from a stable originating-context key,
    /// e.g. the client's remote address. Repeated submissions from the same
    /// source collide predictably on this key.
    pub fn anonymous(stable_key: impl Into<String>) -> DomainResult<Self> {
        let stable_key = stable_key.into();
        if stable_key.trim().is_empty() {
            return Err(DomainError::Validation(
                "submitter stable_key is required".into(),
            ));
        }
        Ok(Self::Anonymous { stable_key })
    }

    pub fn stable_key(&self) -> &str {
        match self {
            Self::Anonymous { stable_key } => stable_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_rejects_blank_key() {
        assert!(Submitter::anonymous("   ").is_err());
    }

    #[test]
    fn stable_key_round_trips() {
        let submitter = Submitter::anonymous("10.0.0.7").unwrap();
        assert_eq!(submitter.stable_key(), "10.0.0.7");
    }
}
