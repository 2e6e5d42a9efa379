use thiserror::Error;

/// A literal substitution: every occurrence of `anchor` becomes `replacement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRule {
    /// Identifier used in outcomes and logs
    pub id: String,
    /// Exact text to search for (no regex, no fuzzy matching)
    pub anchor: String,
    /// Exact text substituted for each occurrence
    pub replacement: String,
    /// Whether the caller treats an unmatched anchor as a failure
    pub required: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("rule '{rule_id}' has an empty anchor")]
    EmptyAnchor { rule_id: String },

    #[error("rule id '{rule_id}' is used more than once in the same run")]
    DuplicateId { rule_id: String },
}

impl RuleError {
    pub fn rule_id(&self) -> &str {
        match self {
            RuleError::EmptyAnchor { rule_id } | RuleError::DuplicateId { rule_id } => rule_id,
        }
    }
}

impl PatchRule {
    pub fn new(
        id: impl Into<String>,
        anchor: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            anchor: anchor.into(),
            replacement: replacement.into(),
            required: false,
        }
    }

    /// Mark the rule as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Structural checks that do not depend on the document.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.anchor.is_empty() {
            return Err(RuleError::EmptyAnchor {
                rule_id: self.id.clone(),
            });
        }
        Ok(())
    }

    /// The rule that undoes this one: `replacement → anchor`.
    ///
    /// Only a true inverse when the replacement text does not already occur
    /// elsewhere in the document.
    pub fn inverse(&self) -> Self {
        Self {
            id: format!("{}.inverse", self.id),
            anchor: self.replacement.clone(),
            replacement: self.anchor.clone(),
            required: self.required,
        }
    }
}
