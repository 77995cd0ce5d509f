//! Consolidated rule files.
//!
//! Each manager turns its finalized cache entries into a [`RuleFile`] and writes it
//! once per generation pass. Rendering goes through a small `tera` template with a
//! `starlark` filter that turns attribute values into literals; output is fully
//! determined by the rule list, so re-runs produce byte-identical files.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tera::{Context, Tera};

use crate::cache::CacheEntry;
use crate::core::{BuildError, Result};
use crate::utils::fs::atomic_write;

const RULE_FILE_TEMPLATE: &str = r#"# @generated by buckforge. Do not edit.
{% for rule in rules %}
{{ rule.rule_type }}(
    name = {{ rule.name | starlark }},
{%- for key, value in rule.attrs %}
    {{ key }} = {{ value | starlark }},
{%- endfor %}
    visibility = {{ rule.visibility | starlark }},
)
{% endfor %}"#;

/// Attribute value of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Str(String),
    List(Vec<String>),
    Bool(bool),
}

/// One rule invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub rule_type: String,
    pub name: String,
    pub attrs: BTreeMap<String, AttrValue>,
    pub visibility: Vec<String>,
}

impl Rule {
    pub fn new(rule_type: &str, name: impl Into<String>) -> Self {
        Self {
            rule_type: rule_type.to_string(),
            name: name.into(),
            attrs: BTreeMap::new(),
            visibility: vec!["PUBLIC".to_string()],
        }
    }

    pub fn attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attrs.insert(key.to_string(), AttrValue::Str(value.into()));
        self
    }

    pub fn list(mut self, key: &str, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.attrs
            .insert(key.to_string(), AttrValue::List(values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn flag(mut self, key: &str, value: bool) -> Self {
        self.attrs.insert(key.to_string(), AttrValue::Bool(value));
        self
    }

    /// `prebuilt_jar` (or `android_prebuilt_aar`) exposing one cached file.
    pub fn prebuilt(entry: &CacheEntry) -> Self {
        let rule_type = if entry.artifact().extension() == "aar" {
            "android_prebuilt_aar"
        } else {
            "prebuilt_jar"
        };
        let attr = if rule_type == "prebuilt_jar" { "binary_jar" } else { "aar" };
        Self::new(rule_type, entry.rule_name())
            .attr(attr, entry.file_name())
            .attr("maven_coords", entry.key().to_string())
    }

    /// `:name` reference to this rule from the same file.
    pub fn local_target(&self) -> String {
        format!(":{}", self.name)
    }
}

/// All rules of one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleFile {
    rules: Vec<Rule>,
}

impl RuleFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn render(&self, category: &str) -> Result<String> {
        let mut tera = Tera::default();
        tera.register_filter("starlark", starlark_filter);

        let mut context = Context::new();
        context.insert("rules", &self.rules);

        tera.render_str(RULE_FILE_TEMPLATE, &context).map_err(|source| BuildError::Render {
            category: category.to_string(),
            source,
        })
    }

    /// Render and atomically replace the file at `path`.
    pub fn write(&self, path: &Path, category: &str) -> Result<()> {
        let rendered = self.render(category)?;
        atomic_write(path, rendered.as_bytes())
            .map_err(|e| BuildError::io(format!("writing rule file {}", path.display()), e))?;
        tracing::debug!(target: "manager", "Wrote {} rules to {}", self.rules.len(), path.display());
        Ok(())
    }
}

fn starlark_filter(value: &tera::Value, _args: &HashMap<String, tera::Value>) -> tera::Result<tera::Value> {
    starlark_literal(value).map(tera::Value::String)
}

fn starlark_literal(value: &tera::Value) -> tera::Result<String> {
    match value {
        tera::Value::String(s) => Ok(quote(s)),
        tera::Value::Bool(true) => Ok("True".to_string()),
        tera::Value::Bool(false) => Ok("False".to_string()),
        tera::Value::Number(n) => Ok(n.to_string()),
        tera::Value::Array(items) => {
            let items: tera::Result<Vec<String>> = items.iter().map(starlark_literal).collect();
            Ok(format!("[{}]", items?.join(", ")))
        }
        other => Err(tera::Error::msg(format!("starlark filter cannot render {other}"))),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn renders_attributes_sorted_and_quoted() {
        let mut file = RuleFile::new();
        file.push(
            Rule::new("java_annotation_processor", "auto-value")
                .attr("processor_class", "com.google.auto.value.processor.AutoValueProcessor")
                .list("deps", [":com.google.auto.value.auto-value-1.6"])
                .flag("does_not_affect_abi", true),
        );

        let rendered = file.render("processor").unwrap();
        let expected = r#"# @generated by buckforge. Do not edit.

java_annotation_processor(
    name = "auto-value",
    deps = [":com.google.auto.value.auto-value-1.6"],
    does_not_affect_abi = True,
    processor_class = "com.google.auto.value.processor.AutoValueProcessor",
    visibility = ["PUBLIC"],
)
"#;
        assert_eq!(rendered, expected);
    }

    #[test]
    fn quotes_are_escaped() {
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[test]
    fn write_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("external/BUCK");
        let mut file = RuleFile::new();
        file.push(Rule::new("prebuilt_jar", "junit.junit-4.12").attr("binary_jar", "junit.junit-4.12.jar"));

        file.write(&path, "external").unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        file.write(&path, "external").unwrap();
        assert_eq!(first, std::fs::read_to_string(&path).unwrap());
        assert!(first.contains("binary_jar = \"junit.junit-4.12.jar\""));
    }
}
