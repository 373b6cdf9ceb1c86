//! Cluster placement constraints.
//!
//! A definition may declare `run_on` conditions (all must match a cluster's
//! labels) and `not_run_on` conditions (any match excludes the cluster).
//! [`PlacementSpec::validate`] rejects specs whose constraints can never be
//! satisfied together; it runs when a definition is registered.

use crate::error::PlacementError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Label match operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    In,
    NotIn,
    Exists,
    NotExists,
}

impl Operator {
    /// Name used in exported placement JSON.
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Eq => "Eq",
            Operator::Ne => "Ne",
            Operator::In => "In",
            Operator::NotIn => "NotIn",
            Operator::Exists => "Exists",
            Operator::NotExists => "NotExists",
        }
    }
}

/// A single label test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCondition {
    pub key: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl LabelCondition {
    fn first(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let actual = labels.get(&self.key).map(String::as_str);
        match self.operator {
            Operator::Eq => actual.is_some() && actual == self.first(),
            Operator::Ne => actual != self.first(),
            Operator::In => actual.is_some_and(|a| self.values.iter().any(|v| v == a)),
            Operator::NotIn => !actual.is_some_and(|a| self.values.iter().any(|v| v == a)),
            Operator::Exists => actual.is_some(),
            Operator::NotExists => actual.is_none(),
        }
    }
}

impl fmt::Display for LabelCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.first().unwrap_or_default();
        match self.operator {
            Operator::Eq => write!(f, "{} = {}", self.key, value),
            Operator::Ne => write!(f, "{} != {}", self.key, value),
            Operator::In => write!(f, "{} in ({})", self.key, self.values.join(", ")),
            Operator::NotIn => write!(f, "{} not in ({})", self.key, self.values.join(", ")),
            Operator::Exists => write!(f, "{} exists", self.key),
            Operator::NotExists => write!(f, "{} not exists", self.key),
        }
    }
}

/// A placement condition tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlacementCondition {
    Label(LabelCondition),
    All(Vec<PlacementCondition>),
    Any(Vec<PlacementCondition>),
    Not(Box<PlacementCondition>),
}

impl PlacementCondition {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            PlacementCondition::Label(label) => label.matches(labels),
            PlacementCondition::All(conds) => conds.iter().all(|c| c.matches(labels)),
            PlacementCondition::Any(conds) => conds.iter().any(|c| c.matches(labels)),
            PlacementCondition::Not(inner) => !inner.matches(labels),
        }
    }

    fn as_label(&self) -> Option<&LabelCondition> {
        match self {
            PlacementCondition::Label(label) => Some(label),
            _ => None,
        }
    }
}

impl fmt::Display for PlacementCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |conds: &[PlacementCondition], sep: &str| {
            conds
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(sep)
        };
        match self {
            PlacementCondition::Label(label) => write!(f, "{}", label),
            PlacementCondition::All(conds) => write!(f, "all({})", join(conds, " AND ")),
            PlacementCondition::Any(conds) => write!(f, "any({})", join(conds, " OR ")),
            PlacementCondition::Not(inner) => write!(f, "not({})", inner),
        }
    }
}

/// Builder returned by [`label`].
#[derive(Debug, Clone)]
pub struct LabelSelector {
    key: String,
}

impl LabelSelector {
    fn build(self, operator: Operator, values: Vec<String>) -> PlacementCondition {
        PlacementCondition::Label(LabelCondition {
            key: self.key,
            operator,
            values,
        })
    }

    pub fn eq(self, value: impl Into<String>) -> PlacementCondition {
        self.build(Operator::Eq, vec![value.into()])
    }

    pub fn ne(self, value: impl Into<String>) -> PlacementCondition {
        self.build(Operator::Ne, vec![value.into()])
    }

    pub fn is_in<I, S>(self, values: I) -> PlacementCondition
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.build(Operator::In, values.into_iter().map(Into::into).collect())
    }

    pub fn not_in<I, S>(self, values: I) -> PlacementCondition
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.build(Operator::NotIn, values.into_iter().map(Into::into).collect())
    }

    pub fn exists(self) -> PlacementCondition {
        self.build(Operator::Exists, Vec::new())
    }

    pub fn not_exists(self) -> PlacementCondition {
        self.build(Operator::NotExists, Vec::new())
    }
}

/// Start a label condition on `key`.
pub fn label(key: impl Into<String>) -> LabelSelector {
    LabelSelector { key: key.into() }
}

pub fn all(conds: impl IntoIterator<Item = PlacementCondition>) -> PlacementCondition {
    PlacementCondition::All(conds.into_iter().collect())
}

pub fn any(conds: impl IntoIterator<Item = PlacementCondition>) -> PlacementCondition {
    PlacementCondition::Any(conds.into_iter().collect())
}

pub fn not(cond: PlacementCondition) -> PlacementCondition {
    PlacementCondition::Not(Box::new(cond))
}

/// Outcome of [`PlacementSpec::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    pub eligible: bool,
    pub reason: String,
}

/// Run-on and not-run-on constraints of one definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub run_on: Vec<PlacementCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_run_on: Vec<PlacementCondition>,
}

impl PlacementSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_on(mut self, cond: PlacementCondition) -> Self {
        self.run_on.push(cond);
        self
    }

    pub fn not_run_on(mut self, cond: PlacementCondition) -> Self {
        self.not_run_on.push(cond);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.run_on.is_empty() && self.not_run_on.is_empty()
    }

    /// Decide whether a cluster with `labels` may run the definition.
    pub fn evaluate(&self, labels: &BTreeMap<String, String>) -> Eligibility {
        if self.is_empty() {
            return Eligibility {
                eligible: true,
                reason: "no placement constraints".to_string(),
            };
        }
        if let Some(failed) = self.run_on.iter().find(|c| !c.matches(labels)) {
            return Eligibility {
                eligible: false,
                reason: format!("runOn conditions not satisfied: {}", failed),
            };
        }
        if let Some(excluded) = self.not_run_on.iter().find(|c| c.matches(labels)) {
            return Eligibility {
                eligible: false,
                reason: format!("excluded by notRunOn condition: {}", excluded),
            };
        }
        let mut reason = String::new();
        if !self.run_on.is_empty() {
            let met: Vec<String> = self.run_on.iter().map(ToString::to_string).collect();
            reason.push_str(&format!("runOn satisfied ({})", met.join(", ")));
        }
        if !self.not_run_on.is_empty() {
            if !reason.is_empty() {
                reason.push_str(", ");
            }
            reason.push_str("not excluded by notRunOn");
        }
        Eligibility {
            eligible: true,
            reason,
        }
    }

    /// Reject constraints that would make the definition ineligible
    /// everywhere.
    pub fn validate(&self) -> Result<(), PlacementError> {
        for run in &self.run_on {
            for not_run in &self.not_run_on {
                if let Some(reason) = conditions_conflict(run, not_run) {
                    return Err(PlacementError {
                        message: format!(
                            "conflicting placement constraints: {} - definition may never be eligible to run",
                            reason
                        ),
                        run_on: run.to_string(),
                        not_run_on: not_run.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn conditions_conflict(run: &PlacementCondition, not_run: &PlacementCondition) -> Option<String> {
    if run == not_run {
        return Some(format!(
            "identical condition '{}' in both RunOn and NotRunOn",
            run
        ));
    }
    let required = required_conditions(run);
    let excluders = excluding_conditions(not_run);
    for req in &required {
        for excl in &excluders {
            if let Some(reason) = leaf_conflict(req, excl) {
                return Some(reason);
            }
        }
    }
    composite_conflict(run, not_run)
}

/// Conditions that must hold for `cond` to hold.
fn required_conditions(cond: &PlacementCondition) -> Vec<&PlacementCondition> {
    match cond {
        PlacementCondition::All(inner) => inner.iter().flat_map(required_conditions).collect(),
        other => vec![other],
    }
}

/// Conditions any one of which makes `cond` hold.
fn excluding_conditions(cond: &PlacementCondition) -> Vec<&PlacementCondition> {
    match cond {
        PlacementCondition::Any(inner) => inner.iter().flat_map(excluding_conditions).collect(),
        other => vec![other],
    }
}

fn leaf_conflict(required: &PlacementCondition, excluder: &PlacementCondition) -> Option<String> {
    if let (Some(req), Some(excl)) = (required.as_label(), excluder.as_label()) {
        return label_conflict(req, excl);
    }

    // Every option of a required Any is excluded by the same label.
    if let (PlacementCondition::Any(options), Some(excl)) = (required, excluder.as_label()) {
        let all_excluded = !options.is_empty()
            && options.iter().all(|option| {
                option
                    .as_label()
                    .is_some_and(|label| label_conflict(label, excl).is_some())
            });
        if all_excluded {
            return Some(format!(
                "all options in '{}' are excluded by '{}'",
                required, excl
            ));
        }
    }

    // A single-member All excluder behaves like its member.
    if let (Some(req), PlacementCondition::All(members)) = (required.as_label(), excluder) {
        if let [only] = members.as_slice() {
            if let Some(label) = only.as_label() {
                return label_conflict(req, label);
            }
        }
    }

    None
}

fn label_conflict(run: &LabelCondition, not_run: &LabelCondition) -> Option<String> {
    if run.key != not_run.key {
        return None;
    }
    let key = &run.key;
    let run_value = run.first().unwrap_or_default();
    let not_run_value = not_run.first().unwrap_or_default();

    match (run.operator, not_run.operator) {
        (Operator::Eq | Operator::In, Operator::Exists) => Some(format!(
            "RunOn requires '{key}' to have a specific value, but NotRunOn excludes when '{key}' exists"
        )),
        (Operator::Exists, Operator::Exists) => {
            Some(format!("'{key} exists' is in both RunOn and NotRunOn"))
        }
        (Operator::Eq, Operator::Eq)
            if !run.values.is_empty() && !not_run.values.is_empty() && run_value == not_run_value =>
        {
            Some(format!(
                "'{key} = {run_value}' is required by RunOn but excluded by NotRunOn"
            ))
        }
        (Operator::In, Operator::In)
            if run.values.iter().all(|v| not_run.values.contains(v)) =>
        {
            Some(format!(
                "all values for '{key}' required by RunOn ({}) are excluded by NotRunOn",
                run.values.join(", ")
            ))
        }
        (Operator::Eq, Operator::In)
            if !run.values.is_empty() && not_run.values.iter().any(|v| v == run_value) =>
        {
            Some(format!(
                "'{key} = {run_value}' is required by RunOn but '{run_value}' is in NotRunOn exclusion list"
            ))
        }
        (Operator::In, Operator::Eq)
            if run.values.len() == 1 && !not_run.values.is_empty() && run_value == not_run_value =>
        {
            Some(format!(
                "the only allowed value '{not_run_value}' for '{key}' is excluded by NotRunOn"
            ))
        }
        (Operator::Exists, Operator::NotExists) => Some(format!(
            "'{key}' must exist (RunOn) but must not exist (NotRunOn)"
        )),
        _ => None,
    }
}

fn composite_conflict(run: &PlacementCondition, not_run: &PlacementCondition) -> Option<String> {
    match (run, not_run) {
        (PlacementCondition::Any(_), PlacementCondition::Any(_)) => {
            let run_leaves = leaf_labels(run);
            let not_run_leaves = leaf_labels(not_run);
            let covered = run_leaves.iter().all(|a| {
                not_run_leaves
                    .iter()
                    .any(|b| a == b || label_conflict(a, b).is_some())
            });
            (covered && !run_leaves.is_empty()).then(|| {
                format!(
                    "Any conditions overlap: RunOn({}) conflicts with NotRunOn({})",
                    run, not_run
                )
            })
        }
        (PlacementCondition::All(required), PlacementCondition::Any(excluders)) => {
            for req in required {
                for excl in excluders {
                    if req == excl {
                        return Some(format!(
                            "'{}' is required by All() but excluded by Any() in NotRunOn",
                            req
                        ));
                    }
                    if let (Some(a), Some(b)) = (req.as_label(), excl.as_label()) {
                        if let Some(reason) = label_conflict(a, b) {
                            return Some(format!(
                                "condition in All() conflicts with Any() in NotRunOn: {}",
                                reason
                            ));
                        }
                    }
                }
            }
            None
        }
        _ => None,
    }
}

/// Every label condition in the tree, depth first.
pub fn leaf_labels(cond: &PlacementCondition) -> Vec<&LabelCondition> {
    match cond {
        PlacementCondition::Label(label) => vec![label],
        PlacementCondition::All(inner) | PlacementCondition::Any(inner) => {
            inner.iter().flat_map(leaf_labels).collect()
        }
        PlacementCondition::Not(inner) => leaf_labels(inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_display() {
        assert_eq!(label("provider").eq("aws").to_string(), "provider = aws");
        assert_eq!(
            label("provider").is_in(["aws", "gcp"]).to_string(),
            "provider in (aws, gcp)"
        );
        assert_eq!(label("gpu").exists().to_string(), "gpu exists");
        assert_eq!(
            all([label("provider").eq("aws"), label("env").eq("prod")]).to_string(),
            "all(provider = aws AND env = prod)"
        );
        assert_eq!(not(label("env").eq("dev")).to_string(), "not(env = dev)");
        assert_eq!(any([]).to_string(), "any()");
    }

    #[test]
    fn test_evaluate() {
        let spec = PlacementSpec::new()
            .run_on(label("provider").eq("aws"))
            .not_run_on(label("cluster-type").eq("vcluster"));

        let ok = spec.evaluate(&labels(&[("provider", "aws"), ("cluster-type", "eks")]));
        assert!(ok.eligible);
        assert!(ok.reason.contains("provider = aws"));

        let excluded = spec.evaluate(&labels(&[("provider", "aws"), ("cluster-type", "vcluster")]));
        assert!(!excluded.eligible);
        assert!(excluded.reason.contains("excluded by notRunOn"));

        let unmatched = spec.evaluate(&labels(&[("provider", "gcp")]));
        assert!(!unmatched.eligible);
        assert!(unmatched.reason.contains("runOn conditions not satisfied"));

        let empty = PlacementSpec::new().evaluate(&BTreeMap::new());
        assert!(empty.eligible);
        assert!(empty.reason.contains("no placement constraints"));
    }

    #[test]
    fn test_label_operators() {
        let l = labels(&[("provider", "aws")]);
        assert!(label("provider").ne("gcp").matches(&l));
        assert!(label("region").ne("x").matches(&l));
        assert!(label("provider").not_in(["gcp"]).matches(&l));
        assert!(label("region").not_exists().matches(&l));
        assert!(!any([]).matches(&l));
        assert!(all([]).matches(&l));
    }

    #[test]
    fn test_validate_conflicts() {
        let conflicting = [
            (label("cloud").eq("aws"), label("cloud").eq("aws")),
            (label("cloud").eq("aws"), label("cloud").exists()),
            (label("cloud").exists(), label("cloud").exists()),
            (label("cloud").is_in(["a", "b"]), label("cloud").is_in(["a", "b", "c"])),
            (label("cloud").eq("aws"), label("cloud").is_in(["aws", "gcp"])),
            (label("cloud").is_in(["aws"]), label("cloud").eq("aws")),
            (label("gpu").exists(), label("gpu").not_exists()),
            (
                all([label("a").eq("1"), label("b").eq("2")]),
                any([label("b").eq("2"), label("c").eq("3")]),
            ),
            (
                any([label("p").eq("aws"), label("p").eq("gcp")]),
                label("p").exists(),
            ),
        ];
        for (run, not_run) in conflicting {
            let spec = PlacementSpec::new().run_on(run.clone()).not_run_on(not_run.clone());
            let err = spec.validate().unwrap_err();
            assert_eq!(err.run_on, run.to_string());
            assert!(err.message.starts_with("conflicting placement constraints"));
        }
    }

    #[test]
    fn test_validate_accepts_compatible() {
        let compatible = [
            (label("cloud").eq("aws"), label("cloud").eq("gcp")),
            (label("cloud").is_in(["aws", "gcp"]), label("cloud").eq("aws")),
            (label("gpu").not_exists(), label("gpu").exists()),
            (
                label("a").eq("1"),
                all([label("a").eq("1"), label("b").eq("2")]),
            ),
        ];
        for (run, not_run) in compatible {
            let spec = PlacementSpec::new().run_on(run).not_run_on(not_run);
            assert!(spec.validate().is_ok());
        }
    }
}
