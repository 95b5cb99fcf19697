use proptest::{collection, prelude::*, sample};
use serde_json::{Map, Value};

use crate::{
    evaluate::evaluate,
    filter::{Comparison, ComparisonKind, Filter, Literal, ParserLimits, parse_filter_with},
    path::Path,
    projection::{ProjectionSpec, trim},
    schema::{SCHEMA_ENTERPRISE_USER, SchemaRegistry},
    translate::translate,
};

const ATTRIBUTES: &[&str] = &[
    "userName",
    "displayName",
    "title",
    "active",
    "type",
    "value",
    "meta.version",
    "meta.lastModified",
    "name.givenName",
    "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:department",
];

const MULTI_VALUED: &[&str] = &["emails", "addresses"];

const KINDS: &[ComparisonKind] = &[
    ComparisonKind::Presence,
    ComparisonKind::Equals,
    ComparisonKind::Contains,
    ComparisonKind::StartsWith,
    ComparisonKind::EndsWith,
    ComparisonKind::GreaterThan,
    ComparisonKind::GreaterThanOrEqual,
    ComparisonKind::LessThan,
    ComparisonKind::LessThanOrEqual,
];

fn attribute() -> impl Strategy<Value = Path> {
    sample::select(ATTRIBUTES).prop_map(|text| Path::parse(text).unwrap())
}

fn literal() -> impl Strategy<Value = Literal> {
    prop_oneof![
        "[ -~]{0,12}".prop_map(Literal::String),
        (-1.0e6..1.0e6f64).prop_map(Literal::Number),
        any::<bool>().prop_map(Literal::Boolean),
        Just(Literal::Null),
    ]
}

fn leaf() -> impl Strategy<Value = Filter> {
    (attribute(), sample::select(KINDS), literal()).prop_map(|(path, kind, value)| {
        let value = (kind != ComparisonKind::Presence).then_some(value);
        Filter::Compare(Comparison { kind, path, value })
    })
}

/// Filters that never nest a value path inside another.
fn value_filter() -> impl Strategy<Value = Filter> {
    prop_oneof![
        3 => leaf(),
        1 => collection::vec(leaf(), 2..4).prop_map(Filter::And),
        1 => collection::vec(leaf(), 2..4).prop_map(Filter::Or),
    ]
}

fn filter() -> impl Strategy<Value = Filter> {
    leaf().prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            collection::vec(inner.clone(), 2..4).prop_map(Filter::And),
            collection::vec(inner.clone(), 2..4).prop_map(Filter::Or),
            inner.prop_map(Filter::not),
            (sample::select(MULTI_VALUED), value_filter())
                .prop_map(|(name, inner)| Filter::complex(Path::build(None, name), inner)),
        ]
    })
}

const KEYS: &[&str] = &["name", "givenName", "emails", "value", "type", "active", SCHEMA_ENTERPRISE_USER];

const PROJECTED: &[&str] = &[
    "name",
    "name.givenName",
    "emails",
    "emails.value",
    "active",
    "type",
    SCHEMA_ENTERPRISE_USER,
    "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:value",
];

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-100i64..100).prop_map(Value::from),
        "[a-z]{0,4}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            collection::vec(inner.clone(), 0..3).prop_map(Value::Array),
            object(inner),
        ]
    })
}

fn object(values: impl Strategy<Value = Value>) -> impl Strategy<Value = Value> {
    collection::btree_map(sample::select(KEYS), values, 0..4).prop_map(|entries| {
        Value::Object(
            entries
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect::<Map<_, _>>(),
        )
    })
}

fn projection() -> impl Strategy<Value = ProjectionSpec> {
    (any::<bool>(), collection::vec(sample::select(PROJECTED), 0..3)).prop_map(
        |(excluded, paths)| {
            let paths = paths.into_iter().map(|p| Path::parse(p).unwrap());
            if excluded {
                ProjectionSpec::exclude(paths)
            } else {
                ProjectionSpec::include(paths)
            }
        },
    )
}

proptest! {
    #[test]
    fn prop_render_parse_round_trip(filter in filter()) {
        let rendered = filter.to_string();
        let limits = ParserLimits {
            max_length: usize::MAX,
            ..Default::default()
        };
        let parsed = parse_filter_with(&rendered, limits);
        prop_assert!(parsed.is_ok(), "{} failed to parse: {:?}", rendered, parsed);
        prop_assert_eq!(parsed.unwrap(), filter);
    }

    #[test]
    fn prop_double_negation_translates_unchanged(filter in filter()) {
        let registry = SchemaRegistry::shared().unwrap();
        let user = registry.get("User").unwrap();

        let doubled = Filter::not(Filter::not(filter.clone()));
        prop_assert_eq!(translate(&doubled, user), translate(&filter, user));
    }

    #[test]
    fn prop_not_inverts_evaluation(filter in filter(), document in object(json_value())) {
        prop_assert_eq!(
            evaluate(&Filter::not(filter.clone()), &document),
            !evaluate(&filter, &document)
        );
    }

    #[test]
    fn prop_trim_idempotent(document in object(json_value()), spec in projection()) {
        let once = trim(&document, &spec);
        let twice = trim(&once, &spec);
        prop_assert_eq!(twice, once);
    }
}
