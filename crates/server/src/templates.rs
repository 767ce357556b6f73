//! Variable substitution and template-schema validation.
//!
//! Placeholders use the `{{name}}` form. Rendering replaces every occurrence
//! of a provided variable; unresolved placeholders are left verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use utoipa::ToSchema;

/// Declared type of a template variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    Text,
    Url,
    Number,
}

impl VariableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableKind::Text => "text",
            VariableKind::Url => "url",
            VariableKind::Number => "number",
        }
    }
}

/// One entry of a template's declared variable schema.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: VariableKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

/// Outcome of validating provided variables against a declared schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub missing: Vec<String>,
    pub invalid: Vec<String>,
}

/// Render a template by replacing every `{{name}}` occurrence with the
/// string form of `variables[name]`. Unknown placeholders stay verbatim.
pub fn render(template: &str, variables: &HashMap<String, Value>) -> String {
    let mut rendered = template.to_string();
    for (name, value) in variables {
        let placeholder = format!("{{{{{name}}}}}");
        if rendered.contains(&placeholder) {
            rendered = rendered.replace(&placeholder, &value_to_string(value));
        }
    }
    rendered
}

/// List the placeholder names referenced by a template, in order of first
/// appearance.
pub fn parse_variables(template: &str) -> Vec<String> {
    let mut variables = Vec::new();
    let bytes = template.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && bytes[i + 1] == b'{' {
            let start = i + 2;
            let mut end = start;
            while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                end += 1;
            }
            if end > start && end + 1 < bytes.len() && bytes[end] == b'}' && bytes[end + 1] == b'}'
            {
                let name = &template[start..end];
                if !variables.iter().any(|v| v == name) {
                    variables.push(name.to_string());
                }
                i = end + 2;
                continue;
            }
        }
        i += 1;
    }
    variables
}

/// Validate provided variables against a declared schema.
///
/// Required-but-absent names land in `missing`; present-but-mistyped names
/// land in `invalid` with a human-readable expectation.
pub fn validate_variables(
    variables: &HashMap<String, Value>,
    schema: &[TemplateVariable],
) -> ValidationOutcome {
    let mut missing = Vec::new();
    let mut invalid = Vec::new();

    for declared in schema {
        match variables.get(&declared.name) {
            None => {
                if declared.required {
                    missing.push(declared.name.clone());
                }
            }
            Some(value) => {
                if !matches_kind(value, declared.kind) {
                    invalid.push(format!(
                        "{} (expected {})",
                        declared.name,
                        declared.kind.as_str()
                    ));
                }
            }
        }
    }

    ValidationOutcome {
        valid: missing.is_empty() && invalid.is_empty(),
        missing,
        invalid,
    }
}

/// Generate a URL-safe slug from a display name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true; // suppress a leading dash
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

fn matches_kind(value: &Value, kind: VariableKind) -> bool {
    match kind {
        VariableKind::Text => value.is_string(),
        VariableKind::Number => match value {
            Value::Number(_) => true,
            Value::String(s) => s.parse::<f64>().is_ok(),
            _ => false,
        },
        VariableKind::Url => matches!(value, Value::String(s) if s.starts_with("http")),
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn render_substitutes_known_variables() {
        let rendered = render("Hi {{n}}", &vars(&[("n", json!("Bob"))]));
        assert_eq!(rendered, "Hi Bob");
    }

    #[test]
    fn render_leaves_unknown_placeholders_verbatim() {
        let rendered = render("Hi {{n}}", &HashMap::new());
        assert_eq!(rendered, "Hi {{n}}");
    }

    #[test]
    fn render_stringifies_numbers() {
        let rendered = render(
            "Balance: {{balance}} EUR",
            &vars(&[("balance", json!(42))]),
        );
        assert_eq!(rendered, "Balance: 42 EUR");
    }

    #[test]
    fn render_replaces_repeated_placeholders() {
        let rendered = render("{{x}} and {{x}}", &vars(&[("x", json!("a"))]));
        assert_eq!(rendered, "a and a");
    }

    #[test]
    fn parse_finds_placeholders_in_order() {
        let found = parse_variables("Hello {{name}}, balance {{balance}} ({{name}})");
        assert_eq!(found, vec!["name".to_string(), "balance".to_string()]);
    }

    #[test]
    fn parse_ignores_malformed_placeholders() {
        assert!(parse_variables("{{ spaced }} {single} {{unterminated").is_empty());
    }

    #[test]
    fn validate_reports_missing_required() {
        let schema = vec![TemplateVariable {
            name: "x".into(),
            kind: VariableKind::Number,
            required: true,
            default_value: None,
        }];
        let outcome = validate_variables(&HashMap::new(), &schema);
        assert!(!outcome.valid);
        assert_eq!(outcome.missing, vec!["x".to_string()]);
        assert!(outcome.invalid.is_empty());
    }

    #[test]
    fn validate_reports_type_mismatch() {
        let schema = vec![TemplateVariable {
            name: "x".into(),
            kind: VariableKind::Number,
            required: true,
            default_value: None,
        }];
        let outcome = validate_variables(&vars(&[("x", json!("abc"))]), &schema);
        assert!(!outcome.valid);
        assert!(outcome.missing.is_empty());
        assert_eq!(outcome.invalid, vec!["x (expected number)".to_string()]);
    }

    #[test]
    fn validate_accepts_numeric_string() {
        let schema = vec![TemplateVariable {
            name: "x".into(),
            kind: VariableKind::Number,
            required: true,
            default_value: None,
        }];
        let outcome = validate_variables(&vars(&[("x", json!("42"))]), &schema);
        assert!(outcome.valid);
    }

    #[test]
    fn validate_url_requires_http_prefix() {
        let schema = vec![TemplateVariable {
            name: "link".into(),
            kind: VariableKind::Url,
            required: false,
            default_value: None,
        }];
        assert!(validate_variables(&vars(&[("link", json!("https://example.org"))]), &schema).valid);
        assert!(!validate_variables(&vars(&[("link", json!("ftp://example.org"))]), &schema).valid);
    }

    #[test]
    fn optional_absent_variable_is_valid() {
        let schema = vec![TemplateVariable {
            name: "x".into(),
            kind: VariableKind::Text,
            required: false,
            default_value: Some("fallback".into()),
        }];
        assert!(validate_variables(&HashMap::new(), &schema).valid);
    }

    #[test]
    fn slugify_normalizes_names() {
        assert_eq!(slugify("Deploy Alerts"), "deploy-alerts");
        assert_eq!(slugify("  CI // Builds!  "), "ci-builds");
        assert_eq!(slugify("Ops"), "ops");
    }
}
