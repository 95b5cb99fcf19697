//! In-memory filter evaluation.
//!
//! Used when a filter cannot be pushed down to the backend: candidates are
//! fetched unfiltered and tested here one by one.
//!
//! - Attribute names and string comparisons are case-insensitive.
//! - Strings that both parse as instants compare chronologically.
//! - `null`, `""`, `[]` and `{}` count as absent.
//! - A leaf on a multi-valued attribute holds when any value satisfies it.

use std::{cmp::Ordering, slice};

use serde_json::{Map, Value};

use crate::{
    filter::{Comparison, ComparisonKind, Filter, FilterVisitor, Literal},
    path::Path,
    schema::parse_timestamp,
};

/// Evaluates filters against JSON candidates.
///
/// A candidate that is a JSON object is searched for each leaf's path; any
/// other candidate is itself the value every leaf compares against.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn matches(&self, filter: &Filter, candidate: &Value) -> bool {
        filter.accept(self, candidate)
    }

    /// Keep only the candidates matching `filter`.
    pub fn retain(&self, filter: &Filter, candidates: &mut Vec<Value>) {
        let total = candidates.len();
        candidates.retain(|candidate| self.matches(filter, candidate));
        tracing::debug!(total, kept = candidates.len(), "Filtered candidates in memory");
    }

    /// Values at `path` inside `candidate`, with multi-valued attributes
    /// flattened.
    fn resolve<'v>(&self, candidate: &'v Value, path: &Path) -> Vec<&'v Value> {
        if !candidate.is_object() || path.is_root() {
            return elements(candidate).iter().collect();
        }

        let mut current = vec![candidate];
        for (i, segment) in path.segments().iter().enumerate() {
            let mut next = Vec::new();
            for value in current {
                for element in elements(value) {
                    let Value::Object(map) = element else {
                        continue;
                    };
                    let scope = match segment.namespace() {
                        Some(urn) if i == 0 => {
                            // A lone URN path may name the extension container itself
                            if path.size() == 1
                                && let Some(container) =
                                    get_ignore_case(map, &format!("{}:{}", urn, segment.name()))
                            {
                                next.push(container);
                                continue;
                            }
                            let Some(scope) = extension(map, urn) else {
                                continue;
                            };
                            scope
                        }
                        _ => map,
                    };
                    if let Some(found) = get_ignore_case(scope, segment.name()) {
                        next.push(found);
                    }
                }
            }
            current = next;
        }

        let mut resolved: Vec<&Value> = current.into_iter().flat_map(elements).collect();
        if let Some(value_filter) = path.value_filter() {
            resolved.retain(|element| value_filter.accept(self, element));
        }
        resolved
    }
}

impl<'v> FilterVisitor<&'v Value> for Evaluator {
    type Output = bool;

    fn visit_comparison(&self, comparison: &Comparison, candidate: &'v Value) -> bool {
        let resolved = self.resolve(candidate, &comparison.path);

        match (comparison.kind, &comparison.value) {
            (ComparisonKind::Presence, _) => resolved.into_iter().any(is_present),
            (ComparisonKind::Equals, Some(Literal::Null)) => !resolved.into_iter().any(is_present),
            (kind, Some(literal)) if !literal.is_null() => resolved
                .into_iter()
                .any(|value| compare(value, kind, literal)),
            _ => false,
        }
    }

    fn visit_and(&self, operands: &[Filter], candidate: &'v Value) -> bool {
        operands.iter().all(|op| op.accept(self, candidate))
    }

    fn visit_or(&self, operands: &[Filter], candidate: &'v Value) -> bool {
        operands.iter().any(|op| op.accept(self, candidate))
    }

    fn visit_not(&self, inner: &Filter, candidate: &'v Value) -> bool {
        !inner.accept(self, candidate)
    }

    fn visit_complex(&self, path: &Path, inner: &Filter, candidate: &'v Value) -> bool {
        self.resolve(candidate, path)
            .into_iter()
            .any(|element| inner.accept(self, element))
    }
}

/// Evaluate `filter` against `candidate`.
pub fn evaluate(filter: &Filter, candidate: &Value) -> bool {
    Evaluator.matches(filter, candidate)
}

fn elements(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items.as_slice(),
        other => slice::from_ref(other),
    }
}

fn get_ignore_case<'v>(map: &'v Map<String, Value>, name: &str) -> Option<&'v Value> {
    map.get(name).or_else(|| {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

fn extension<'v>(map: &'v Map<String, Value>, urn: &str) -> Option<&'v Map<String, Value>> {
    get_ignore_case(map, urn).and_then(Value::as_object)
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

fn compare(value: &Value, kind: ComparisonKind, literal: &Literal) -> bool {
    match (value, literal) {
        (Value::String(s), Literal::String(l)) => compare_strings(s, l, kind),
        (Value::Number(n), Literal::Number(l)) => {
            n.as_f64().is_some_and(|n| compare_numbers(n, *l, kind))
        }
        (Value::String(s), Literal::Number(l)) => s
            .trim()
            .parse::<f64>()
            .is_ok_and(|n| compare_numbers(n, *l, kind)),
        (Value::Number(n), Literal::String(l)) => match (n.as_f64(), l.trim().parse::<f64>()) {
            (Some(n), Ok(l)) => compare_numbers(n, l, kind),
            _ => false,
        },
        (Value::Bool(b), Literal::Boolean(l)) => kind == ComparisonKind::Equals && b == l,
        (Value::Bool(b), Literal::String(l)) => {
            kind == ComparisonKind::Equals && l.eq_ignore_ascii_case(if *b { "true" } else { "false" })
        }
        (Value::String(s), Literal::Boolean(l)) => {
            kind == ComparisonKind::Equals && s.eq_ignore_ascii_case(if *l { "true" } else { "false" })
        }
        _ => false,
    }
}

fn compare_strings(value: &str, literal: &str, kind: ComparisonKind) -> bool {
    if (kind == ComparisonKind::Equals || kind.is_ordering())
        && let (Some(a), Some(b)) = (parse_timestamp(value), parse_timestamp(literal))
    {
        return satisfies(kind, a.cmp(&b));
    }

    let value = value.to_lowercase();
    let literal = literal.to_lowercase();
    match kind {
        ComparisonKind::Contains => value.contains(&literal),
        ComparisonKind::StartsWith => value.starts_with(&literal),
        ComparisonKind::EndsWith => value.ends_with(&literal),
        kind => satisfies(kind, value.cmp(&literal)),
    }
}

fn compare_numbers(value: f64, literal: f64, kind: ComparisonKind) -> bool {
    value
        .partial_cmp(&literal)
        .is_some_and(|ordering| satisfies(kind, ordering))
}

fn satisfies(kind: ComparisonKind, ordering: Ordering) -> bool {
    match kind {
        ComparisonKind::Equals => ordering == Ordering::Equal,
        ComparisonKind::GreaterThan => ordering == Ordering::Greater,
        ComparisonKind::GreaterThanOrEqual => ordering != Ordering::Less,
        ComparisonKind::LessThan => ordering == Ordering::Less,
        ComparisonKind::LessThanOrEqual => ordering != Ordering::Greater,
        _ => false,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::{filter::parse_filter, schema::SCHEMA_ENTERPRISE_USER};

    fn user() -> Value {
        json!({
            "schemas": [
                "urn:ietf:params:scim:schemas:core:2.0:User",
                "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User"
            ],
            "id": "2819c223",
            "userName": "bjensen",
            "name": { "givenName": "Barbara", "familyName": "Jensen" },
            "title": "",
            "active": true,
            "loginCount": 42,
            "nickName": null,
            "emails": [
                { "value": "bjensen@example.com", "type": "work", "primary": true },
                { "value": "babs@jensen.org", "type": "home" }
            ],
            "groups": [],
            "meta": { "created": "2010-01-23T04:56:22Z", "lastModified": "2011-05-13T04:42:34Z" },
            "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User": {
                "employeeNumber": "701984",
                "manager": { "value": "26118915" }
            }
        })
    }

    fn eval(filter: &str, candidate: &Value) -> bool {
        evaluate(&parse_filter(filter).unwrap(), candidate)
    }

    #[rstest]
    #[case::equals("userName eq \"bjensen\"", true)]
    #[case::equals_case_insensitive("USERNAME eq \"BJensen\"", true)]
    #[case::not_equals("userName ne \"bjensen\"", false)]
    #[case::nested("name.familyName sw \"jen\"", true)]
    #[case::contains("name.givenName co \"BAR\"", true)]
    #[case::ends_with("userName ew \"SEN\"", true)]
    #[case::boolean("active eq true", true)]
    #[case::boolean_ordering("active gt false", false)]
    #[case::number("loginCount gt 40", true)]
    #[case::number_equals("loginCount eq 42", true)]
    #[case::number_as_text("loginCount eq \"42\"", true)]
    #[case::string_ordering("userName lt \"c\"", true)]
    #[case::multi_valued_any("emails.value ew \"jensen.org\"", true)]
    #[case::multi_valued_none("emails.value ew \"example.net\"", false)]
    #[case::missing_attribute("nickName eq \"Babs\"", false)]
    #[case::and("userName eq \"bjensen\" and active eq true", true)]
    #[case::or("userName eq \"x\" or loginCount le 42", true)]
    #[case::not("not (active eq true)", false)]
    fn test_leaf_semantics(#[case] filter: &str, #[case] expected: bool) {
        assert_eq!(eval(filter, &user()), expected, "{}", filter);
    }

    #[rstest]
    #[case::empty_string("title", false)]
    #[case::null("nickName", false)]
    #[case::missing("displayName", false)]
    #[case::empty_array("groups", false)]
    #[case::value("userName", true)]
    #[case::boolean("active", true)]
    #[case::array("emails", true)]
    #[case::object("name", true)]
    fn test_presence_and_null_equivalence(#[case] attr: &str, #[case] present: bool) {
        assert_eq!(eval(&format!("{} pr", attr), &user()), present);
        assert_eq!(eval(&format!("{} eq null", attr), &user()), !present);
        assert_eq!(eval(&format!("{} ne null", attr), &user()), present);
    }

    #[test]
    fn test_timestamps_compare_chronologically() {
        let user = user();
        assert!(eval("meta.lastModified gt \"2011-05-13T00:00:00Z\"", &user));
        assert!(!eval("meta.lastModified lt \"2011-05-13T06:00:00+02:00\"", &user));
        assert!(eval("meta.lastModified eq \"2011-05-13T06:42:34+02:00\"", &user));
        assert!(eval("meta.created le \"2010-01-24\"", &user));
    }

    #[test]
    fn test_value_path() {
        let user = user();
        assert!(eval("emails[type eq \"work\" and value co \"example.com\"]", &user));
        assert!(!eval("emails[type eq \"work\" and value co \"jensen.org\"]", &user));
        assert!(eval("emails[type eq \"home\"].value ew \".org\"", &user));
        assert!(!eval("emails[type eq \"other\"]", &user));
        assert!(eval("name[givenName eq \"Barbara\"]", &user));
    }

    #[test]
    fn test_path_value_filter_restricts_elements() {
        let path = Path::parse("emails.value")
            .unwrap()
            .with_value_filter(parse_filter("value ew \".org\"").unwrap());
        let filter = Filter::presence(path);
        assert!(evaluate(&filter, &user()));

        let path = Path::parse("emails[primary eq true]").unwrap();
        assert!(evaluate(&Filter::presence(path), &user()));

        let path = Path::parse("emails[type eq \"mobile\"]").unwrap();
        assert!(!evaluate(&Filter::presence(path), &user()));
    }

    #[test]
    fn test_extension_attributes() {
        let user = user();
        assert!(eval(
            "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:employeeNumber eq \"701984\"",
            &user
        ));
        assert!(eval(
            "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:manager.value pr",
            &user
        ));
        assert!(!eval(
            "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:department pr",
            &user
        ));
    }

    #[test]
    fn test_namespaced_path_ignores_core_attributes() {
        let flat = json!({ "employeeNumber": "701984", "title": "Engineer" });
        assert!(!eval(
            "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:employeeNumber eq \"701984\"",
            &flat
        ));
        assert!(!eval(
            "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:title pr",
            &flat
        ));

        // Same answer whether or not the extension container is present
        let mut with_container = flat.clone();
        with_container[SCHEMA_ENTERPRISE_USER] = json!({ "department": "Tour Operations" });
        assert!(!eval(
            "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:title pr",
            &with_container
        ));
    }

    #[test]
    fn test_number_equality_is_exact() {
        assert!(eval("x eq 1e-17", &json!(1e-17)));
        assert!(!eval("x eq 2e-17", &json!(1e-17)));
        assert!(eval("x eq 0.1", &json!(0.1)));
        assert!(eval("x eq 10", &json!("10")));
    }

    #[test]
    fn test_extension_container_presence() {
        let filter = "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User pr";
        assert!(eval(filter, &user()));
        assert!(!eval(filter, &json!({ "userName": "bjensen" })));
        assert!(!eval(filter, &json!({ SCHEMA_ENTERPRISE_USER: {} })));
    }

    #[test]
    fn test_scalar_candidates() {
        assert!(eval("surname sw \"AD\"", &json!("Adams")));
        assert!(!eval("surname sw \"AD\"", &json!("Lovelace")));
        assert!(!eval("x pr", &Value::Null));
        assert!(eval("x eq null", &Value::Null));
        assert!(eval("x eq null", &json!("")));
        assert!(eval("x ge 10", &json!(10)));
        assert!(eval("x eq \"b\"", &json!(["a", "B"])));
        assert!(!eval("x pr", &json!([])));
    }

    #[test]
    fn test_empty_junctions() {
        let candidate = user();
        assert!(evaluate(&Filter::and(vec![]), &candidate));
        assert!(!evaluate(&Filter::or(vec![]), &candidate));
    }

    #[test]
    fn test_retain() {
        let mut candidates = vec![
            json!({ "userName": "alice", "active": true }),
            json!({ "userName": "bob", "active": false }),
            json!({ "userName": "carol" }),
        ];
        let filter = parse_filter("active eq true or not (active pr)").unwrap();
        Evaluator::new().retain(&filter, &mut candidates);

        let names: Vec<&str> = candidates
            .iter()
            .filter_map(|c| c["userName"].as_str())
            .collect();
        assert_eq!(names, ["alice", "carol"]);
    }
}
