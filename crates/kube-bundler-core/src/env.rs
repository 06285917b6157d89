//! Environment descriptor
//!
//! Containers read this descriptor at startup to discover every co-deployed
//! solution. The format is one `KEY=value` per line:
//!
//! ```text
//! SOLUTION_ID=sol-a,sol-b
//! SOL_REVISION_ID=sol-a:rev-a,sol-b:rev-b
//! COMMON_DATA_USER=...
//! ```
//!
//! List order is unspecified; consumers split on `,` and treat the result as a set.

use std::collections::HashMap;

use crate::error::{BundleError, Result};
use crate::params::{ParameterSet, RevisionId, SolutionId, SolutionRevisionMap};

pub const SOLUTION_ID_KEY: &str = "SOLUTION_ID";
pub const SOL_REVISION_ID_KEY: &str = "SOL_REVISION_ID";
pub const COMMON_DATA_USER_KEY: &str = "COMMON_DATA_USER";
pub const COMMON_DATA_URL_KEY: &str = "COMMON_DATA_URL";
pub const COMMON_DATA_PASSWORD_KEY: &str = "COMMON_DATA_PASSWORD";

const LIST_SEPARATOR: &str = ",";
const PAIR_SEPARATOR: char = ':';

/// Serializes solution/revision membership into an environment descriptor
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentAggregator;

impl EnvironmentAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Build the descriptor text for `parameters`
    ///
    /// Common data values must fit on one line.
    pub fn build_environment(&self, parameters: &ParameterSet) -> Result<String> {
        let revisions = parameters.solution_revisions();

        let mut solution_ids = Vec::with_capacity(revisions.len());
        let mut pairs = Vec::with_capacity(revisions.len());
        for (solution, revision) in revisions {
            solution_ids.push(solution.as_str());
            pairs.push(format!("{}{}{}", solution, PAIR_SEPARATOR, revision));
        }

        let mut out = String::new();
        push_line(&mut out, SOLUTION_ID_KEY, &solution_ids.join(LIST_SEPARATOR));
        push_line(&mut out, SOL_REVISION_ID_KEY, &pairs.join(LIST_SEPARATOR));

        let common = [
            (COMMON_DATA_USER_KEY, parameters.common_data_user()),
            (COMMON_DATA_URL_KEY, parameters.common_data_url()),
            (COMMON_DATA_PASSWORD_KEY, parameters.common_data_password()),
        ];
        for (key, value) in common {
            if let Some(value) = value {
                if value.contains(['\n', '\r']) {
                    return Err(BundleError::InvalidParameter(format!(
                        "{} must not contain line breaks",
                        key
                    )));
                }
                push_line(&mut out, key, value);
            }
        }

        tracing::debug!("Built environment descriptor for {} solutions", revisions.len());
        Ok(out)
    }
}

fn push_line(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push('=');
    out.push_str(value);
    out.push('\n');
}

/// Parse descriptor text into its key/value assignments
///
/// Blank lines are skipped. A non-blank line without `=` is rejected.
pub fn parse_environment(text: &str) -> Result<HashMap<String, String>> {
    let mut entries = HashMap::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            BundleError::InvalidParameter(format!("malformed environment line: {:?}", line))
        })?;
        entries.insert(key.to_string(), value.to_string());
    }
    Ok(entries)
}

/// Split a comma-joined descriptor value into its items
///
/// An empty value yields no items.
pub fn split_list(value: &str) -> Vec<&str> {
    if value.is_empty() {
        Vec::new()
    } else {
        value.split(LIST_SEPARATOR).collect()
    }
}

/// Rebuild the solution revision map from the `SOL_REVISION_ID` line of a descriptor
pub fn parse_solution_revisions(text: &str) -> Result<SolutionRevisionMap> {
    let entries = parse_environment(text)?;
    let value = entries.get(SOL_REVISION_ID_KEY).ok_or_else(|| {
        BundleError::InvalidParameter(format!("descriptor has no {} line", SOL_REVISION_ID_KEY))
    })?;

    let mut map = SolutionRevisionMap::new();
    for pair in split_list(value) {
        let (solution, revision) = pair.split_once(PAIR_SEPARATOR).ok_or_else(|| {
            BundleError::InvalidParameter(format!("malformed solution revision pair: {:?}", pair))
        })?;
        map.insert(SolutionId::new(solution)?, RevisionId::new(revision)?);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn params_with(pairs: &[(&str, &str)]) -> ParameterSet {
        let mut map = SolutionRevisionMap::new();
        for (solution, revision) in pairs {
            map.insert_str(solution, revision).unwrap();
        }
        ParameterSet::builder()
            .solution_id("solution-id-a")
            .solution_revision_id("revision-id-a")
            .solution_revisions(map)
            .build()
    }

    fn value_set(env: &str, key: &str) -> HashSet<String> {
        let entries = parse_environment(env).unwrap();
        split_list(&entries[key]).into_iter().map(String::from).collect()
    }

    #[test]
    fn test_two_solutions_in_any_order() {
        let env = EnvironmentAggregator::new()
            .build_environment(&params_with(&[
                ("solution-id-x", "revision-id-x"),
                ("solution-id-y", "revision-id-y"),
            ]))
            .unwrap();

        assert!(
            env.contains("SOLUTION_ID=solution-id-x,solution-id-y")
                || env.contains("SOLUTION_ID=solution-id-y,solution-id-x")
        );
        assert!(
            env.contains("SOL_REVISION_ID=solution-id-x:revision-id-x,solution-id-y:revision-id-y")
                || env.contains("SOL_REVISION_ID=solution-id-y:revision-id-y,solution-id-x:revision-id-x")
        );
        // The current solution is not part of the membership lists.
        assert!(!env.contains("solution-id-a"));
    }

    #[test]
    fn test_set_equality_of_lists() {
        let env = EnvironmentAggregator::new()
            .build_environment(&params_with(&[("A", "a"), ("B", "b")]))
            .unwrap();

        let ids = value_set(&env, SOLUTION_ID_KEY);
        assert_eq!(ids, HashSet::from(["A".to_string(), "B".to_string()]));

        let pairs = value_set(&env, SOL_REVISION_ID_KEY);
        assert_eq!(pairs, HashSet::from(["A:a".to_string(), "B:b".to_string()]));
    }

    #[test]
    fn test_empty_map_yields_empty_lists() {
        let env = EnvironmentAggregator::new()
            .build_environment(&ParameterSet::builder().build())
            .unwrap();
        assert_eq!(env, "SOLUTION_ID=\nSOL_REVISION_ID=\n");
    }

    #[test]
    fn test_common_fields_emitted_only_when_set() {
        let params = ParameterSet::builder()
            .common_data_user("datauser")
            .common_data_url("https://dataurl")
            .build();
        let env = EnvironmentAggregator::new().build_environment(&params).unwrap();

        assert!(env.contains("COMMON_DATA_USER=datauser\n"));
        assert!(env.contains("COMMON_DATA_URL=https://dataurl\n"));
        assert!(!env.contains(COMMON_DATA_PASSWORD_KEY));
    }

    #[test]
    fn test_line_breaks_in_common_fields_are_rejected() {
        let aggregator = EnvironmentAggregator::new();

        let params = ParameterSet::builder().common_data_password("pw\nSOLUTION_ID=evil").build();
        let err = aggregator.build_environment(&params).unwrap_err();
        assert!(matches!(err, BundleError::InvalidParameter(_)));
        assert!(err.to_string().contains(COMMON_DATA_PASSWORD_KEY));

        let params = ParameterSet::builder().common_data_url("https://dataurl\r").build();
        assert!(matches!(
            aggregator.build_environment(&params),
            Err(BundleError::InvalidParameter(_))
        ));

        let params = ParameterSet::builder().common_data_user("user\nSOL_REVISION_ID=x:y").build();
        assert!(aggregator.build_environment(&params).is_err());
    }

    #[test]
    fn test_every_solution_appears_exactly_once() {
        let pairs: Vec<(String, String)> =
            (0..20).map(|i| (format!("sol-{}", i), format!("rev-{}", i))).collect();
        let borrowed: Vec<(&str, &str)> = pairs.iter().map(|(s, r)| (s.as_str(), r.as_str())).collect();
        let env = EnvironmentAggregator::new().build_environment(&params_with(&borrowed)).unwrap();

        let entries = parse_environment(&env).unwrap();
        assert_eq!(split_list(&entries[SOLUTION_ID_KEY]).len(), 20);
        assert_eq!(value_set(&env, SOLUTION_ID_KEY).len(), 20);
        assert_eq!(value_set(&env, SOL_REVISION_ID_KEY).len(), 20);
    }

    #[test]
    fn test_revision_map_reparses() {
        let params = params_with(&[("sol-1", "rev-1"), ("sol-2", "rev-2")]);
        let env = EnvironmentAggregator::new().build_environment(&params).unwrap();
        let parsed = parse_solution_revisions(&env).unwrap();
        assert_eq!(&parsed, params.solution_revisions());

        let empty = parse_solution_revisions("SOLUTION_ID=\nSOL_REVISION_ID=\n").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(parse_environment("NOT_AN_ASSIGNMENT").is_err());
        assert!(parse_solution_revisions("SOL_REVISION_ID=missing-pair").is_err());
        assert!(parse_solution_revisions("SOLUTION_ID=a").is_err());
    }
}
