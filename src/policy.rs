//! Mount-policy records and the baseline comparison.
//!
//! A [`MountPolicy`] mirrors the three fields of an OCI runtime-spec mount
//! that take part in validation. Candidates received from the host are
//! compared field-for-field against one or more baseline records. Comparison
//! is exact: no path normalisation and no case folding.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A filesystem mount policy: where, what kind, and from where.
///
/// Serialises with the OCI field names (`destination`, `type`, `source`).
/// Any other field present on the wire (for example `options`) is ignored and
/// never participates in a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountPolicy {
    /// Mount target path inside the container.
    pub destination: String,

    /// Mount type (e.g. `physical-disk`).
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Mount source on the host.
    #[serde(default)]
    pub source: String,
}

impl MountPolicy {
    /// Build a policy from its three fields.
    pub fn new(
        destination: impl Into<String>,
        kind: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            destination: destination.into(),
            kind: kind.into(),
            source: source.into(),
        }
    }

    /// Compare `candidate` against this baseline and return the first field
    /// that differs, checked in the order destination, type, source.
    pub fn first_mismatch(&self, candidate: &MountPolicy) -> Option<PolicyMismatch> {
        let checks = [
            (PolicyField::Destination, &self.destination, &candidate.destination),
            (PolicyField::Type, &self.kind, &candidate.kind),
            (PolicyField::Source, &self.source, &candidate.source),
        ];

        checks
            .into_iter()
            .find(|(_, expected, actual)| expected != actual)
            .map(|(field, expected, actual)| PolicyMismatch {
                field,
                expected: expected.clone(),
                actual: actual.clone(),
            })
    }
}

impl fmt::Display for MountPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.destination, self.kind, self.source)
    }
}

/// `true` iff all three fields of `candidate` equal those of `baseline`.
pub fn validate(baseline: &MountPolicy, candidate: &MountPolicy) -> bool {
    baseline.destination == candidate.destination
        && baseline.kind == candidate.kind
        && baseline.source == candidate.source
}

/// One of the three compared fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyField {
    /// [`MountPolicy::destination`].
    Destination,
    /// [`MountPolicy::kind`].
    Type,
    /// [`MountPolicy::source`].
    Source,
}

impl PolicyField {
    /// Wire name of the field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Destination => "destination",
            Self::Type => "type",
            Self::Source => "source",
        }
    }
}

impl fmt::Display for PolicyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The first field on which a candidate diverged from a baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyMismatch {
    /// Which field differed.
    pub field: PolicyField,
    /// Baseline value.
    pub expected: String,
    /// Candidate value.
    pub actual: String,
}

impl fmt::Display for PolicyMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected: {}, got: {}",
            self.field, self.expected, self.actual
        )
    }
}

/// Result of judging a candidate against a [`PolicySet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// The candidate matched the baseline at this index.
    Allowed {
        /// Index of the matching baseline.
        baseline: usize,
    },
    /// No baseline matched. One mismatch per baseline, in baseline order.
    Denied {
        /// First mismatching field against each baseline.
        mismatches: Vec<PolicyMismatch>,
    },
}

impl Evaluation {
    /// The boolean verdict sent back to the host.
    pub fn verdict(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// The baseline records a candidate may match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySet {
    baselines: Vec<MountPolicy>,
}

impl PolicySet {
    /// Build a set from configured baselines. An empty set denies everything.
    pub fn new(baselines: Vec<MountPolicy>) -> Self {
        Self { baselines }
    }

    /// A set holding exactly one baseline.
    pub fn single(baseline: MountPolicy) -> Self {
        Self::new(vec![baseline])
    }

    /// Configured baselines, in order.
    pub fn baselines(&self) -> &[MountPolicy] {
        &self.baselines
    }

    /// Judge `candidate`: allowed iff it matches any baseline exactly.
    pub fn evaluate(&self, candidate: &MountPolicy) -> Evaluation {
        let mut mismatches = Vec::with_capacity(self.baselines.len());
        for (index, baseline) in self.baselines.iter().enumerate() {
            match baseline.first_mismatch(candidate) {
                None => return Evaluation::Allowed { baseline: index },
                Some(mismatch) => mismatches.push(mismatch),
            }
        }
        Evaluation::Denied { mismatches }
    }
}
