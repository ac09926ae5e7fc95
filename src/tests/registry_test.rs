use crate::error::EmbernetErrorKind;
use crate::requirement::{RequirementInfo, RequirementKind};
use crate::router::{pattern::PathPattern, EndpointHandler, RouteRegistry};
use crate::types::{box_handler, Priority, Scheme, SchemeFamily};

fn handler() -> EndpointHandler {
    EndpointHandler::Http(box_handler(|ex| async move { ex }))
}

fn method_requirement(methods: &[&str]) -> Vec<(String, RequirementInfo)> {
    vec![(
        "method".to_string(),
        RequirementInfo::new(
            RequirementKind::Storing,
            methods.iter().map(|m| m.to_string()).collect(),
        ),
    )]
}

fn register(
    registry: &RouteRegistry,
    template: &str,
    methods: &[&str],
    priority: Priority,
) -> Result<crate::router::EndpointId, crate::error::EmbernetError> {
    registry.register(
        SchemeFamily::Http,
        PathPattern::compile(template).unwrap(),
        priority,
        method_requirement(methods),
        Vec::new(),
        handler(),
    )
}

#[test]
fn lookup_returns_every_matching_mapping_with_captures() {
    let registry = RouteRegistry::new();
    register(&registry, "/users/{id:int}", &["GET"], Priority::Normal).unwrap();
    register(&registry, "/users/{id:int}", &["POST"], Priority::Normal).unwrap();
    register(&registry, "/other", &["GET"], Priority::Normal).unwrap();

    let matched = registry.lookup(Scheme::Http, "/users/7");
    assert_eq!(matched.len(), 2);
    for (_, captures) in &matched {
        assert_eq!(captures, &vec![("id".to_string(), "7".to_string())]);
    }
}

#[test]
fn exact_duplicate_is_rejected() {
    let registry = RouteRegistry::new();
    register(&registry, "/dup", &["GET"], Priority::Normal).unwrap();
    let err = register(&registry, "/dup", &["GET"], Priority::Normal).unwrap_err();
    assert_eq!(err.kind, EmbernetErrorKind::DuplicateEndpoint);
}

#[test]
fn same_pattern_with_different_method_set_is_accepted() {
    let registry = RouteRegistry::new();
    register(&registry, "/dup", &["GET"], Priority::Normal).unwrap();
    register(&registry, "/dup", &["POST"], Priority::Normal).unwrap();
    assert_eq!(registry.len(SchemeFamily::Http), 2);
}

#[test]
fn same_pattern_with_different_priority_is_accepted() {
    let registry = RouteRegistry::new();
    register(&registry, "/dup", &["GET"], Priority::Normal).unwrap();
    register(&registry, "/dup", &["GET"], Priority::High).unwrap();
    assert_eq!(registry.len(SchemeFamily::Http), 2);
}

#[test]
fn unregister_removes_only_the_owned_mapping() {
    let registry = RouteRegistry::new();
    let first = register(&registry, "/a", &["GET"], Priority::Normal).unwrap();
    let second = register(&registry, "/a", &["POST"], Priority::Normal).unwrap();

    registry.unregister(first);
    assert_eq!(registry.len(SchemeFamily::Http), 1);
    let survivors = registry.lookup(Scheme::Http, "/a");
    assert_eq!(survivors.len(), 1);
    // Survivors keep their identity after removal.
    assert_eq!(survivors[0].0.id(), second);

    registry.unregister(second);
    assert!(registry.is_empty(SchemeFamily::Http));
}

#[test]
fn unregister_unknown_id_is_a_noop() {
    let registry = RouteRegistry::new();
    let id = register(&registry, "/a", &["GET"], Priority::Normal).unwrap();
    registry.unregister(id);
    registry.unregister(id);
    assert!(registry.is_empty(SchemeFamily::Http));
}

#[test]
fn families_are_disjoint() {
    let registry = RouteRegistry::new();
    register(&registry, "/shared", &["GET"], Priority::Normal).unwrap();
    assert!(registry.lookup(Scheme::Ws, "/shared").is_empty());
    assert_eq!(registry.lookup(Scheme::Http, "/shared").len(), 1);
    assert_eq!(registry.lookup(Scheme::Https, "/shared").len(), 1);
}
