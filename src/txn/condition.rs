use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use super::TxnKind;
use crate::ConditionError;
use crate::RequestError;
use crate::Result;
use crate::Revision;
use crate::REVISION_INVALID;

/// Per-key precondition checked against the key's current revision
///
/// `actual` below is the key's current revision, 0 when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    /// Always passes
    Unconditional,
    /// Writes only: the key must not exist
    Create,
    /// The key must exist
    Required,
    /// `actual == r`
    RevisionEqual(Revision),
    /// `actual != r`
    RevisionNotEqual(Revision),
    /// `actual < r`
    RevisionLess(Revision),
    /// `actual <= r`
    RevisionLessOrEqual(Revision),
    /// `actual > r`
    RevisionGreater(Revision),
    /// `actual >= r`
    RevisionGreaterOrEqual(Revision),
}

/// Revision comparison operator carried by a failed condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Comparison {
    pub fn holds(
        self,
        actual: Revision,
        requested: Revision,
    ) -> bool {
        match self {
            Comparison::Equal => actual == requested,
            Comparison::NotEqual => actual != requested,
            Comparison::Less => actual < requested,
            Comparison::LessOrEqual => actual <= requested,
            Comparison::Greater => actual > requested,
            Comparison::GreaterOrEqual => actual >= requested,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let op = match self {
            Comparison::Equal => "==",
            Comparison::NotEqual => "!=",
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::Greater => ">",
            Comparison::GreaterOrEqual => ">=",
        };
        f.write_str(op)
    }
}

impl Condition {
    /// Revision comparison of this condition, if it is one
    pub fn comparison(self) -> Option<(Comparison, Revision)> {
        match self {
            Condition::RevisionEqual(r) => Some((Comparison::Equal, r)),
            Condition::RevisionNotEqual(r) => Some((Comparison::NotEqual, r)),
            Condition::RevisionLess(r) => Some((Comparison::Less, r)),
            Condition::RevisionLessOrEqual(r) => Some((Comparison::LessOrEqual, r)),
            Condition::RevisionGreater(r) => Some((Comparison::Greater, r)),
            Condition::RevisionGreaterOrEqual(r) => Some((Comparison::GreaterOrEqual, r)),
            Condition::Unconditional | Condition::Create | Condition::Required => None,
        }
    }

    /// Whether the key's current revision must be fetched before committing
    pub fn needs_revision(self) -> bool {
        !matches!(self, Condition::Unconditional)
    }

    /// Reject conditions that make no sense for `kind`, before any I/O
    pub(crate) fn validate(
        self,
        key: &str,
        kind: TxnKind,
    ) -> Result<()> {
        if self == Condition::Create && kind != TxnKind::Write {
            return Err(RequestError::BadArgCondition {
                key: key.to_string(),
                condition: Some(self),
                operation: kind,
            }
            .into());
        }
        if let Some((_, requested)) = self.comparison() {
            if requested == REVISION_INVALID {
                return Err(RequestError::BadArgRevision {
                    key: key.to_string(),
                    condition: self,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Evaluate against the key's current revision
    pub fn evaluate(
        self,
        key: &str,
        actual: Revision,
    ) -> Result<()> {
        match self {
            Condition::Unconditional => Ok(()),
            Condition::Create => check_absent(key, actual),
            Condition::Required => check_present(key, actual),
            _ => match self.comparison() {
                Some((comparison, requested)) => check_revision(key, comparison, requested, actual),
                None => Ok(()),
            },
        }
    }
}

fn check_absent(
    key: &str,
    actual: Revision,
) -> Result<()> {
    if actual == REVISION_INVALID {
        Ok(())
    } else {
        Err(ConditionError::AlreadyExists { key: key.to_string() }.into())
    }
}

fn check_present(
    key: &str,
    actual: Revision,
) -> Result<()> {
    if actual != REVISION_INVALID {
        Ok(())
    } else {
        Err(ConditionError::NotFound { key: key.to_string() }.into())
    }
}

fn check_revision(
    key: &str,
    comparison: Comparison,
    requested: Revision,
    actual: Revision,
) -> Result<()> {
    if comparison.holds(actual, requested) {
        Ok(())
    } else {
        Err(ConditionError::ConditionFail {
            key: key.to_string(),
            requested,
            condition: comparison,
            actual,
        }
        .into())
    }
}
