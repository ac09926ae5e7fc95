use crate::error::EmbernetErrorKind;
use crate::router::PathPattern;

#[test]
fn literal_pattern_matches_exactly() {
    let pattern = PathPattern::compile("/hello").unwrap();
    assert!(pattern.matches("/hello").is_some());
    assert!(pattern.matches("/hello/").is_none());
    assert!(pattern.matches("/hell").is_none());
    assert_eq!(pattern.arity(), 0);
    assert_eq!(pattern.literal_segments(), 1);
}

#[test]
fn string_placeholder_captures_segment() {
    let pattern = PathPattern::compile("/users/{name}").unwrap();
    let captures = pattern.matches("/users/alice").unwrap();
    assert_eq!(captures, vec![("name".to_string(), "alice".to_string())]);
    assert!(pattern.matches("/users/").is_none());
    assert!(pattern.matches("/users/alice/posts").is_none());
}

#[test]
fn int_placeholder_refuses_non_digits() {
    let pattern = PathPattern::compile("/users/{id:int}").unwrap();
    let captures = pattern.matches("/users/42").unwrap();
    assert_eq!(captures, vec![("id".to_string(), "42".to_string())]);
    assert!(pattern.matches("/users/abc").is_none());
    assert!(pattern.matches("/users/4a2").is_none());
}

#[test]
fn uuid_placeholder_matches_hyphenated_form() {
    let pattern = PathPattern::compile("/jobs/{job:uuid}").unwrap();
    let id = "0d9f2b8a-3f11-4aed-9c1a-54dcf2f3a901";
    let captures = pattern.matches(&format!("/jobs/{}", id)).unwrap();
    assert_eq!(captures[0].1, id);
    assert!(pattern.matches("/jobs/not-a-uuid").is_none());
}

#[test]
fn regex_escape_hatch_applies_custom_pattern() {
    let pattern = PathPattern::compile("/files/{name:regex:[a-z]{3}}").unwrap();
    assert!(pattern.matches("/files/abc").is_some());
    assert!(pattern.matches("/files/abcd").is_none());
    assert!(pattern.matches("/files/ABC").is_none());
}

#[test]
fn captures_come_back_in_template_order() {
    let pattern = PathPattern::compile("/a/{x}/b/{y:int}").unwrap();
    let captures = pattern.matches("/a/one/b/2").unwrap();
    assert_eq!(
        captures,
        vec![
            ("x".to_string(), "one".to_string()),
            ("y".to_string(), "2".to_string()),
        ]
    );
    assert_eq!(pattern.arity(), 2);
    assert_eq!(pattern.literal_segments(), 2);
}

#[test]
fn unknown_placeholder_type_rejects_registration() {
    let err = PathPattern::compile("/users/{id:float}").unwrap_err();
    assert_eq!(err.kind, EmbernetErrorKind::InvalidPattern);
}

#[test]
fn repeated_placeholder_name_rejects_registration() {
    let err = PathPattern::compile("/a/{id}/b/{id}").unwrap_err();
    assert_eq!(err.kind, EmbernetErrorKind::InvalidPattern);
}

#[test]
fn mixed_literal_and_placeholder_segment_rejects() {
    let err = PathPattern::compile("/users/v{id}").unwrap_err();
    assert_eq!(err.kind, EmbernetErrorKind::InvalidPattern);
}

#[test]
fn template_must_start_with_slash() {
    let err = PathPattern::compile("users/{id}").unwrap_err();
    assert_eq!(err.kind, EmbernetErrorKind::InvalidPattern);
}

#[test]
fn literal_dots_are_not_wildcards() {
    let pattern = PathPattern::compile("/api/v1.0/ping").unwrap();
    assert!(pattern.matches("/api/v1.0/ping").is_some());
    assert!(pattern.matches("/api/v1x0/ping").is_none());
}
