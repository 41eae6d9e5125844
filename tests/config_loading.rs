//! Integration tests for identity config loading and validation.

use signpost::config::model::IdentitySet;
use signpost::config::validation::validate;

fn load_example() -> String {
    let path = "example/signpost.yaml";
    std::fs::read_to_string(path).unwrap_or_else(|e| panic!("failed to read {path}: {e}"))
}

#[test]
fn example_config_loads_and_validates() {
    let set: IdentitySet = serde_yml::from_str(&load_example()).unwrap();
    validate(&set).unwrap();

    assert!(set.default_identity().is_some());
    assert_eq!(set.named().count(), 2);

    let (_, search) = set
        .named()
        .find(|(host, _)| host.as_str() == "search.internal.example.com")
        .unwrap();
    assert_eq!(search.name.as_deref(), Some("es"));
    assert_eq!(search.region.as_deref(), Some("us-west-2"));
    assert!(search
        .role_arn
        .as_deref()
        .unwrap()
        .starts_with("arn:aws:iam::"));
}

#[test]
fn config_without_default_fails_validation() {
    let yaml = r"
identities:
  search.internal:
    name: es
    region: us-west-2
";
    let set: IdentitySet = serde_yml::from_str(yaml).unwrap();
    assert!(validate(&set).is_err());
}

#[test]
fn unknown_fields_are_rejected() {
    let yaml = r"
identities:
  default:
    region: us-east-1
    unknown-knob: true
";
    assert!(serde_yml::from_str::<IdentitySet>(yaml).is_err());
}

#[test]
fn empty_default_identity_is_allowed() {
    let yaml = r"
identities:
  default: {}
";
    let set: IdentitySet = serde_yml::from_str(yaml).unwrap();
    validate(&set).unwrap();
}

#[tokio::test]
async fn loader_surfaces_missing_files() {
    let err = signpost::config::load(std::path::Path::new("does-not-exist.yaml"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn loader_reads_the_example_file() {
    let set = signpost::config::load(std::path::Path::new("example/signpost.yaml"))
        .await
        .unwrap();
    assert_eq!(set.identities.len(), 3);
}
