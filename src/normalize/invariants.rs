//! Invariant candidate selection from type-check results.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::Value;

use super::NormalizeError;
use crate::engine::RunResponse;

/// Declarations that name the initial-state and transition relations.
pub const RESERVED_DECLARATIONS: [&str; 2] = ["Init", "Next"];

/// Declaration types the engine reports for boolean-valued operators.
const BOOLEAN_TYPES: [&str; 2] = ["Bool", "(() => Bool)"];

#[derive(Deserialize)]
struct TypecheckPayload {
    modules: Vec<Module>,
}

#[derive(Deserialize)]
struct Module {
    #[serde(default)]
    declarations: Vec<Value>,
}

/// Extract invariant candidates from a type-check reply.
///
/// Only the first module is inspected. An engine-reported failure yields no
/// candidates.
///
/// # Errors
///
/// Returns [`NormalizeError`] when a success payload is not the expected
/// module listing.
pub fn invariant_candidates(response: &RunResponse) -> Result<Vec<String>, NormalizeError> {
    let RunResponse::Success { payload } = response else {
        return Ok(Vec::new());
    };
    let parsed: TypecheckPayload =
        serde_json::from_str(payload).map_err(|source| NormalizeError::Malformed {
            what: "type-check payload",
            source,
        })?;
    let Some(module) = parsed.modules.into_iter().next() else {
        return Ok(Vec::new());
    };
    let names = module
        .declarations
        .iter()
        .filter(|declaration| is_boolean(declaration))
        .filter_map(|declaration| declaration.get("name").and_then(Value::as_str))
        .filter(|name| !RESERVED_DECLARATIONS.contains(name))
        .map(ToOwned::to_owned);
    Ok(rank_invariant_candidates(names))
}

fn is_boolean(declaration: &Value) -> bool {
    declaration
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|kind| BOOLEAN_TYPES.contains(&kind))
}

/// Deduplicate and order candidate names.
///
/// This is a presentation heuristic: names containing `inv` in any case come
/// first, and each group is sorted lexicographically.
#[must_use]
pub fn rank_invariant_candidates(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let unique: BTreeSet<String> = names.into_iter().collect();
    let mut ranked: Vec<String> = unique.into_iter().collect();
    ranked.sort_by_key(|name| !looks_like_invariant(name));
    ranked
}

fn looks_like_invariant(name: &str) -> bool { name.to_ascii_lowercase().contains("inv") }

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn typecheck_reply(declarations: &Value) -> RunResponse {
        RunResponse::success(json!({"modules": [{"declarations": declarations}]}).to_string())
    }

    #[rstest]
    fn selects_boolean_declarations_in_ranked_order() {
        let reply = typecheck_reply(&json!([
            {"name": "InvA", "type": "Bool"},
            {"name": "Zeta", "type": "(() => Bool)"},
            {"name": "InvB", "type": "Bool"},
            {"name": "x", "type": "Int"},
        ]));

        let names = invariant_candidates(&reply).expect("candidates");
        assert_eq!(names, ["InvA", "InvB", "Zeta"]);
    }

    #[rstest]
    fn excludes_reserved_relations() {
        let reply = typecheck_reply(&json!([
            {"name": "Init", "type": "Bool"},
            {"name": "Next", "type": "(() => Bool)"},
            {"name": "Safe", "type": "Bool"},
        ]));

        assert_eq!(invariant_candidates(&reply).expect("candidates"), ["Safe"]);
    }

    #[rstest]
    fn declarations_without_a_type_are_skipped() {
        let reply = typecheck_reply(&json!([{"name": "Loose"}, {"type": "Bool"}]));
        assert!(invariant_candidates(&reply).expect("candidates").is_empty());
    }

    #[rstest]
    fn engine_failure_yields_no_candidates() {
        let reply = RunResponse::failure("PASS_FAILURE", "{\"msg\":\"parse error\"}");
        assert!(invariant_candidates(&reply).expect("candidates").is_empty());
    }

    #[rstest]
    fn empty_module_list_yields_no_candidates() {
        let reply = RunResponse::success("{\"modules\": []}");
        assert!(invariant_candidates(&reply).expect("candidates").is_empty());
    }

    #[rstest]
    #[case("not json")]
    #[case("{\"modules\": 3}")]
    #[case("[]")]
    fn malformed_payload_is_an_upstream_error(#[case] payload: &str) {
        let err = invariant_candidates(&RunResponse::success(payload)).expect_err("malformed");
        assert!(matches!(err, NormalizeError::Malformed { .. }));
    }

    #[rstest]
    #[case(&["b", "a", "b"], &["a", "b"])]
    #[case(&["Safety", "typeINV", "alpha"], &["typeINV", "Safety", "alpha"])]
    #[case(&["Zinv", "Ainv", "B"], &["Ainv", "Zinv", "B"])]
    fn ranks_candidates(#[case] input: &[&str], #[case] expected: &[&str]) {
        let ranked = rank_invariant_candidates(input.iter().map(|name| (*name).to_owned()));
        assert_eq!(ranked, expected);
    }
}
