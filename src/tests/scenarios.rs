use rstest::rstest;
use serde_json::{Value, json};

use crate::{
    error::{EngineError, ErrorResponse, ScimErrorType},
    evaluate::evaluate,
    filter::{ComparisonKind, Filter, Literal, parse_filter},
    path::Path,
    projection::{ProjectionSpec, trim},
    query::{ListParams, QueryLimits, SearchPlan, SearchRequest},
    schema::{SCHEMA_ENTERPRISE_USER, SchemaRegistry},
    translate::{BackendFilter, BackendOperator, BackendValue, Translation, translate},
};

fn path(text: &str) -> Path {
    Path::parse(text).unwrap()
}

fn users() -> Vec<Value> {
    vec![
        json!({
            "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User", SCHEMA_ENTERPRISE_USER],
            "id": "1",
            "userName": "bjensen",
            "name": { "givenName": "Barbara", "familyName": "Jensen" },
            "nickName": "Babs",
            "active": true,
            "emails": [
                { "value": "bjensen@example.com", "type": "work", "primary": true },
                { "value": "babs@jensen.org", "type": "home" }
            ],
            "meta": { "lastModified": "2011-05-13T04:42:34Z" },
            SCHEMA_ENTERPRISE_USER: { "department": "Tour Operations", "employeeNumber": "701984" }
        }),
        json!({
            "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
            "id": "2",
            "userName": "jsmith",
            "name": { "givenName": "John", "familyName": "Smith" },
            "active": false,
            "emails": [{ "value": "jsmith@example.org", "type": "work" }],
            "meta": { "lastModified": "2019-01-01T00:00:00Z" }
        }),
        json!({
            "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
            "id": "3",
            "userName": "adams",
            "name": { "givenName": "Ada", "familyName": "Adams" },
            "nickName": "",
            "active": true,
            "emails": [{ "value": "ada@example.com", "type": "home" }],
            "meta": { "lastModified": "2020-06-30T12:00:00Z" }
        }),
    ]
}

fn ids(documents: &[Value]) -> Vec<&str> {
    documents.iter().filter_map(|d| d["id"].as_str()).collect()
}

#[test]
fn test_ancestor_inclusion() {
    let document = json!({
        "name": { "givenName": "Ada", "familyName": "Lovelace" },
        "active": true
    });
    let spec = ProjectionSpec::include([path("name.givenName")]);
    assert_eq!(trim(&document, &spec), json!({ "name": { "givenName": "Ada" } }));
}

#[test]
fn test_exclusion_symmetry() {
    let document = json!({
        "name": { "givenName": "Ada", "familyName": "Lovelace" },
        "active": true
    });
    let spec = ProjectionSpec::exclude([path("name.familyName")]);
    assert_eq!(
        trim(&document, &spec),
        json!({ "name": { "givenName": "Ada" }, "active": true })
    );
}

#[test]
fn test_negation_polarity() {
    let registry = SchemaRegistry::builtin().unwrap();
    let user = registry.get("User").unwrap();

    let negated = Filter::not(Filter::compare(
        ComparisonKind::GreaterThan,
        path("meta.version"),
        5_i64,
    ));
    let expected = Filter::compare(ComparisonKind::LessThanOrEqual, path("meta.version"), 5_i64);

    assert_eq!(
        translate(&negated, user).unwrap(),
        translate(&expected, user).unwrap()
    );
    assert_eq!(
        translate(&expected, user).unwrap(),
        Translation::Translated(BackendFilter::condition(
            "usr_row_ver",
            BackendOperator::Le,
            BackendValue::Integer(5)
        ))
    );
}

#[test]
fn test_fallback_propagation() {
    let registry = SchemaRegistry::builtin().unwrap();
    let user = registry.get("User").unwrap();

    let filter = Filter::and(vec![
        Filter::equals(path("userName"), "x"),
        Filter::equals(path("nickName"), "y"),
    ]);
    assert_eq!(translate(&filter, user).unwrap(), Translation::NotTranslatable);

    // Also below a negation and inside a disjunction
    let filter = Filter::or(vec![
        Filter::equals(path("userName"), "x"),
        Filter::not(filter),
    ]);
    assert_eq!(translate(&filter, user).unwrap(), Translation::NotTranslatable);
}

#[rstest]
#[case::starts_with(ComparisonKind::StartsWith, "AD", true)]
#[case::ends_with(ComparisonKind::EndsWith, "AMS", true)]
#[case::contains(ComparisonKind::Contains, "dam", true)]
#[case::equals(ComparisonKind::Equals, "ADAMS", true)]
#[case::no_match(ComparisonKind::StartsWith, "Ev", false)]
fn test_case_insensitive_matching(
    #[case] kind: ComparisonKind,
    #[case] literal: &str,
    #[case] expected: bool,
) {
    let filter = Filter::compare(kind, path("familyName"), literal);
    assert_eq!(evaluate(&filter, &json!("Adams")), expected);
}

#[test]
fn test_null_equivalence() {
    let presence = Filter::presence(path("nickName"));
    let equals_null = Filter::equals(path("nickName"), Literal::Null);

    assert!(!evaluate(&presence, &Value::Null));
    assert!(evaluate(&equals_null, &Value::Null));

    // Empty strings count as absent inside documents too
    let documents = users();
    assert!(evaluate(&presence, &documents[0]));
    assert!(!evaluate(&presence, &documents[1]));
    assert!(!evaluate(&presence, &documents[2]));
    assert!(evaluate(&equals_null, &documents[2]));
}

#[test]
fn test_parse_error_position() {
    let err = parse_filter("emails[type eq]").unwrap_err();
    assert_eq!(err.position, 14);

    let response = ErrorResponse::from(&EngineError::from(err));
    assert_eq!(response.status, "400");
    assert_eq!(response.scim_type, Some(ScimErrorType::InvalidFilter));
}

#[test]
fn test_pagination_clamp() {
    let params = ListParams {
        start_index: Some(0),
        count: Some(-5),
        ..Default::default()
    };
    let request = SearchRequest::from_params(&params, &QueryLimits::default()).unwrap();
    assert_eq!(request.page.offset(), 0);
    assert_eq!(request.page.start_index(), 1);
    assert_eq!(request.page.limit(), 0);
}

#[rstest]
#[case::pushdown(r#"userName eq "bjensen""#, false, vec!["1"])]
#[case::enterprise_extension(
    r#"urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:department eq "Tour Operations""#,
    false,
    vec!["1"]
)]
#[case::timestamp_order(r#"meta.lastModified gt "2015-01-01T00:00:00Z""#, false, vec!["2", "3"])]
#[case::negated_boolean(r#"not (active eq true)"#, false, vec!["2"])]
#[case::unknown_attribute(r#"nickName pr"#, true, vec!["1"])]
#[case::value_path(r#"emails[type eq "work" and value ew "example.com"]"#, true, vec!["1"])]
#[case::value_path_sub_attribute(r#"emails[type eq "home"].value co "jensen""#, true, vec!["1"])]
#[case::mixed(r#"active eq true and name.givenName sw "a""#, false, vec!["3"])]
fn test_search_pipeline(
    #[case] filter: &str,
    #[case] in_memory: bool,
    #[case] expected: Vec<&str>,
) {
    let registry = SchemaRegistry::builtin().unwrap();
    let user = registry.get("User").unwrap();

    let params = ListParams {
        filter: Some(filter.to_string()),
        ..Default::default()
    };
    let request = SearchRequest::from_params(&params, &QueryLimits::default()).unwrap();
    let plan = SearchPlan::for_request(&request, user).unwrap();
    assert_eq!(matches!(plan, SearchPlan::InMemory(_)), in_memory, "{filter}");

    // Whatever the plan, the in-memory evaluator agrees with the expected rows
    let parsed = request.filter.as_ref().unwrap();
    let mut candidates = users();
    candidates.retain(|candidate| evaluate(parsed, candidate));
    assert_eq!(ids(&candidates), expected);
}

#[test]
fn test_list_request_end_to_end() {
    let registry = SchemaRegistry::builtin().unwrap();
    let user = registry.get("User").unwrap();

    let params = ListParams {
        filter: Some(r#"emails[type eq "work"] or nickName pr"#.to_string()),
        start_index: Some(2),
        count: Some(5),
        attributes: Some("userName,emails.value".to_string()),
        ..Default::default()
    };
    let request = SearchRequest::from_params(&params, &QueryLimits::default()).unwrap();
    let plan = SearchPlan::for_request(&request, user).unwrap();

    let mut candidates = users();
    plan.apply_in_memory(&mut candidates);
    assert_eq!(ids(&candidates), vec!["1", "2"]);

    let page = request.page.apply(candidates);
    let returned: Vec<Value> = page.iter().map(|d| trim(d, &request.projection)).collect();
    assert_eq!(
        returned,
        vec![json!({
            "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
            "id": "2",
            "userName": "jsmith",
            "emails": [{ "value": "jsmith@example.org" }]
        })]
    );
}

#[test]
fn test_invalid_literal_surfaces() {
    let registry = SchemaRegistry::builtin().unwrap();
    let user = registry.get("User").unwrap();

    let params = ListParams {
        filter: Some(r#"meta.version gt "five" or nickName pr"#.to_string()),
        ..Default::default()
    };
    let request = SearchRequest::from_params(&params, &QueryLimits::default()).unwrap();
    let err = SearchPlan::for_request(&request, user).unwrap_err();

    let response = ErrorResponse::from(&EngineError::from(err));
    assert_eq!(response.scim_type, Some(ScimErrorType::InvalidValue));
}

#[test]
fn test_shared_registry() {
    let registry = SchemaRegistry::shared().unwrap();
    let group = registry.get("group").unwrap();

    let filter = parse_filter(r#"displayName eq "Tour Guides""#).unwrap();
    assert_eq!(
        translate(&filter, group).unwrap().into_option(),
        Some(BackendFilter::condition(
            "ugp_name",
            BackendOperator::Eq,
            BackendValue::Text("Tour Guides".to_string())
        ))
    );
}
