use std::collections::HashSet;

use tritium_rs::registry::{MetricName, REDACTED};

fn requests() -> MetricName {
    MetricName::builder()
        .safe_name("requests")
        .put_safe_tag("endpoint", "get")
        .put_unsafe_tag("user", "alice")
        .build()
}

#[test]
fn equality_ignores_insertion_order_and_classification() {
    let a = MetricName::builder()
        .safe_name("requests")
        .put_safe_tag("endpoint", "get")
        .put_safe_tag("user", "alice")
        .build();
    let b = MetricName::builder()
        .put_unsafe_tag("user", "alice")
        .put_safe_tag("endpoint", "get")
        .safe_name("requests")
        .build();

    assert_eq!(a, b);
    assert_eq!(a, requests());
    let set: HashSet<MetricName> = [a, b, requests()].into_iter().collect();
    assert_eq!(set.len(), 1);
}

#[test]
fn name_and_tag_values_distinguish() {
    let other_value = requests().to_builder().put_safe_tag("endpoint", "put").build();
    let other_name = requests().to_builder().safe_name("responses").build();
    let extra_tag = requests().to_builder().put_safe_tag("code", "200").build();

    assert_ne!(requests(), other_value);
    assert_ne!(requests(), other_name);
    assert_ne!(requests(), extra_tag);
}

#[test]
fn a_key_lives_in_one_map_only() {
    let name = MetricName::builder()
        .safe_name("x")
        .put_unsafe_tag("k", "secret")
        .put_safe_tag("k", "public")
        .build();

    assert_eq!(name.safe_tags().get("k").map(String::as_str), Some("public"));
    assert!(name.unsafe_tags().is_empty());
    assert_eq!(name.tag("k"), Some("public"));
}

#[test]
fn duplicate_keys_overwrite() {
    let name = MetricName::builder()
        .safe_name("x")
        .put_all_safe_tags([("k", "1"), ("k", "2")])
        .build();
    assert_eq!(name.tag("k"), Some("2"));
    assert_eq!(name.tags().count(), 1);
}

#[test]
fn display_redacts_unsafe_values() {
    assert_eq!(
        requests().to_string(),
        format!("requests{{endpoint=get,user={REDACTED}}}")
    );
    assert_eq!(MetricName::of("bare").to_string(), "bare");
    // The raw value is still available to code that asks for it.
    assert_eq!(requests().tag("user"), Some("alice"));
}

#[test]
fn serialization_redacts_unsafe_values() {
    let json = serde_json::to_value(requests()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "name": "requests",
            "tags": { "endpoint": "get", "user": "{REDACTED}" }
        })
    );
}

#[test]
fn tags_iterate_in_key_order_across_maps() {
    let name = MetricName::builder()
        .safe_name("x")
        .put_safe_tag("b", "2")
        .put_unsafe_tag("a", "1")
        .put_unsafe_tag("c", "3")
        .build();
    let keys: Vec<&str> = name.tags().map(|(k, _)| k).collect();
    assert_eq!(keys, ["a", "b", "c"]);
}
