//! Confirmation batch - the de-duplicated set of signatures one waiter tracks

use crate::error::{AppError, AppResult};
use std::collections::HashSet;

/// Non-empty, de-duplicated list of transaction signatures.
///
/// Keeps first-occurrence order so the `join` frame and log lines are stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationBatch {
    signatures: Vec<String>,
    index: HashSet<String>,
}

impl ConfirmationBatch {
    /// Build a batch, collapsing duplicates
    ///
    /// Fails on an empty input or on a blank signature.
    pub fn new<I, S>(signatures: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ordered = Vec::new();
        let mut index = HashSet::new();

        for signature in signatures {
            let signature = signature.into();
            if signature.trim().is_empty() {
                return Err(AppError::Validation(
                    "signature must not be blank".to_string(),
                ));
            }
            if index.insert(signature.clone()) {
                ordered.push(signature);
            }
        }

        if ordered.is_empty() {
            return Err(AppError::Validation(
                "at least one signature is required".to_string(),
            ));
        }

        Ok(Self {
            signatures: ordered,
            index,
        })
    }

    /// Number of distinct signatures
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Always false for a constructed batch
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.index.contains(signature)
    }

    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.signatures.iter().map(String::as_str)
    }
}
