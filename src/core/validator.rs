//! Decides whether every name a template reads can be resolved before anything is rendered.

use crate::core::context::Context;
use crate::core::inventory::{variables_of, TemplateSyntaxError};
use crate::domain::model::Template;
use serde::Serialize;
use std::collections::BTreeSet;

/// Names provided by the orchestration runtime at deploy time (gathered facts).
pub const DEFAULT_EXTERNAL_NAMES: &[&str] = &[
    "ansible_user_dir",
    "ansible_user",
    "inventory_hostname",
    "ansible_hostname",
    "ansible_os_family",
    "ansible_distribution",
    "ansible_architecture",
    "ansible_facts",
    "ansible_env",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Valid,
    /// `missing` is sorted and holds every unresolved name, not just the first.
    Invalid { missing: Vec<String> },
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }

    pub fn missing(&self) -> &[String] {
        match self {
            Verdict::Valid => &[],
            Verdict::Invalid { missing } => missing,
        }
    }
}

/// Allow-list of names that cannot be resolved statically but are known to exist at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalNames {
    names: BTreeSet<String>,
}

impl Default for ExternalNames {
    fn default() -> Self {
        Self::from_names(DEFAULT_EXTERNAL_NAMES.iter().copied())
    }
}

impl ExternalNames {
    pub fn empty() -> Self {
        Self {
            names: BTreeSet::new(),
        }
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn extend<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(
            names
                .into_iter()
                .map(Into::into)
                .map(|n: String| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        );
    }

    /// Exact match, or match on the head of a dotted reference (`ansible_facts.os`).
    pub fn contains(&self, reference: &str) -> bool {
        if self.names.contains(reference) {
            return true;
        }
        reference
            .split_once('.')
            .is_some_and(|(head, _)| self.names.contains(head))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Checks an already computed inventory against `ctx`. Pure: no I/O, no rendering.
pub fn validate_references<'a, I>(references: I, ctx: &Context, external: &ExternalNames) -> Verdict
where
    I: IntoIterator<Item = &'a str>,
{
    let missing: BTreeSet<&str> = references
        .into_iter()
        .filter(|name| !ctx.resolves(name) && !external.contains(name))
        .collect();

    if missing.is_empty() {
        Verdict::Valid
    } else {
        Verdict::Invalid {
            missing: missing.into_iter().map(str::to_string).collect(),
        }
    }
}

/// Inventories `template` and validates every reference against `ctx`.
pub fn validate(
    template: &Template,
    ctx: &Context,
    external: &ExternalNames,
) -> Result<Verdict, TemplateSyntaxError> {
    let references = variables_of(template)?;
    let verdict = validate_references(references.iter().map(String::as_str), ctx, external);
    if let Verdict::Invalid { missing } = &verdict {
        tracing::debug!(
            service = %template.service,
            template = %template.name,
            ?missing,
            "template references unresolved variables"
        );
    }
    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};

    fn ctx(value: Value) -> Context {
        match value {
            Value::Object(map) => Context::from_map(map),
            _ => Context::from_map(Map::new()),
        }
    }

    #[test]
    fn test_missing_nested_field_is_reported() {
        let context = ctx(json!({"service": {"port": 8080}, "host": {}}));
        let template = Template::new("web", "app.conf.j2", "{{ service.port }} {{ host.ip }}");
        let verdict = validate(&template, &context, &ExternalNames::empty()).unwrap();
        assert_eq!(
            verdict,
            Verdict::Invalid {
                missing: vec!["host.ip".to_string()]
            }
        );
    }

    #[test]
    fn test_all_present_is_valid() {
        let context = ctx(json!({"service": {"port": 8080}, "host": {"ip": "10.0.0.2"}}));
        let template = Template::new("web", "app.conf.j2", "{{ service.port }} {{ host.ip }}");
        assert!(validate(&template, &context, &ExternalNames::empty())
            .unwrap()
            .is_valid());
    }

    #[test]
    fn test_every_missing_name_is_collected() {
        let context = ctx(json!({"a": 1, "c": 3}));
        let verdict =
            validate_references(["a", "b", "c", "d", "b"], &context, &ExternalNames::empty());
        assert_eq!(verdict.missing(), ["b", "d"]);
    }

    #[test]
    fn test_external_names_match_exact_or_head() {
        let external = ExternalNames::default();
        let context = Context::new();
        assert!(validate_references(
            ["ansible_user_dir", "ansible_facts.distribution", "inventory_hostname"],
            &context,
            &external
        )
        .is_valid());
        assert_eq!(
            validate_references(["ansible_user_dirs"], &context, &external).missing(),
            ["ansible_user_dirs"]
        );
    }

    #[test]
    fn test_extended_allow_list() {
        let mut external = ExternalNames::empty();
        external.extend(["vault_token", " ", "secrets"]);
        let context = Context::new();
        assert!(validate_references(["vault_token", "secrets.db"], &context, &external).is_valid());
        assert_eq!(external.iter().count(), 2);
    }

    #[test]
    fn test_default_filter_does_not_exempt_a_missing_name() {
        let template = Template::new("web", "t.j2", "{{ password | default('x') }}");
        let verdict = validate(&template, &Context::new(), &ExternalNames::empty()).unwrap();
        assert_eq!(verdict.missing(), ["password"]);
    }

    #[test]
    fn test_syntax_error_is_not_a_verdict() {
        let template = Template::new("web", "t.j2", "{% if x %}");
        assert!(validate(&template, &Context::new(), &ExternalNames::empty()).is_err());
    }
}
