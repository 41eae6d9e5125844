//! Identity configuration validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`IdentitySet`] for
//! structural errors: a missing `default` entry, empty host keys, empty
//! override values, and malformed role ARNs. Returns a list of
//! [`ValidationError`] values with per-field suggestions.

use super::model::IdentitySet;
use crate::error::ValidationError;

pub fn validate(set: &IdentitySet) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if set.default_identity().is_none() {
        errors.push(ValidationError {
            identity: "(root)".into(),
            field: "identities.default".into(),
            message: "a 'default' identity is required".into(),
            suggestion: Some("add an 'identities.default:' entry; an empty one is fine".into()),
        });
    }

    for (key, identity) in &set.identities {
        if key.is_empty() {
            errors.push(ValidationError {
                identity: "(root)".into(),
                field: "identities".into(),
                message: "host key cannot be empty".into(),
                suggestion: None,
            });
            continue;
        }

        if let Some(ref role_arn) = identity.role_arn {
            if !role_arn.starts_with("arn:") {
                errors.push(ValidationError {
                    identity: key.clone(),
                    field: "role-arn".into(),
                    message: format!("'{role_arn}' is not an ARN"),
                    suggestion: Some("expected arn:aws:iam::<account>:role/<name>".into()),
                });
            }
        }

        let overrides = [
            ("name", &identity.name),
            ("region", &identity.region),
            ("host", &identity.host),
        ];
        for (field, value) in overrides {
            if value.as_deref() == Some("") {
                errors.push(ValidationError {
                    identity: key.clone(),
                    field: field.into(),
                    message: format!("{field} cannot be empty when set"),
                    suggestion: Some(format!("remove the {field} key to inherit the default")),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::Identity;
    use std::collections::HashMap;

    fn set_with(entries: Vec<(&str, Identity)>) -> IdentitySet {
        IdentitySet {
            identities: entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn missing_default_is_an_error() {
        let set = set_with(vec![("search.internal", Identity::default())]);
        let errors = validate(&set).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "identities.default");
    }

    #[test]
    fn malformed_role_arn_is_an_error() {
        let set = set_with(vec![
            ("default", Identity::default()),
            (
                "search.internal",
                Identity {
                    role_arn: Some("not-an-arn".into()),
                    ..Identity::default()
                },
            ),
        ]);
        let errors = validate(&set).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].identity, "search.internal");
        assert_eq!(errors[0].field, "role-arn");
    }

    #[test]
    fn empty_override_value_is_an_error() {
        let set = set_with(vec![
            ("default", Identity::default()),
            (
                "search.internal",
                Identity {
                    region: Some(String::new()),
                    ..Identity::default()
                },
            ),
        ]);
        let errors = validate(&set).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "region");
    }

    #[test]
    fn complete_set_passes() {
        let set = set_with(vec![
            ("default", Identity::default()),
            (
                "search.internal",
                Identity {
                    name: Some("es".into()),
                    region: Some("us-west-2".into()),
                    host: Some("search-abc.us-west-2.es.amazonaws.com".into()),
                    role_arn: Some("arn:aws:iam::123456789012:role/search".into()),
                },
            ),
        ]);
        assert!(validate(&set).is_ok());
    }
}
