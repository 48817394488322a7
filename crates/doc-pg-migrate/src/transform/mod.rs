//! Named value transforms.
//!
//! A transform computes or repairs one field's value from the row context.
//! Entities bind transforms by name; the registry resolves names, including
//! the `default:` and `if_exists:` prefixes that wrap another transform.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::core::{Record, SchemaEntity};
use crate::error::{MigrateError, Result};

/// Everything a transform may look at.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    /// The whole in-flight batch of the entity.
    pub records: &'a [Record],
    /// The record being coerced.
    pub record: &'a Record,
    /// Field value before the transform; `Null` when absent.
    pub value: &'a Value,
    /// 1-based row counter.
    pub row: usize,
    /// Name of the field being coerced.
    pub field: &'a str,
}

impl TransformContext<'_> {
    /// Look up a sibling field of the current record.
    pub fn sibling(&self, key: &str) -> &Value {
        self.record.get(key).unwrap_or(&Value::Null)
    }
}

pub type TransformFn = Arc<dyn Fn(&TransformContext<'_>) -> Result<Value> + Send + Sync>;

/// Wrap a closure as a [`TransformFn`].
pub fn transform<F>(f: F) -> TransformFn
where
    F: Fn(&TransformContext<'_>) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Run `inner` only when the value is absent.
pub fn default_fn(inner: TransformFn) -> TransformFn {
    transform(move |ctx| {
        if ctx.value.is_null() {
            inner(ctx)
        } else {
            Ok(ctx.value.clone())
        }
    })
}

/// Run `inner` only when the value is present.
pub fn if_exists(inner: TransformFn) -> TransformFn {
    transform(move |ctx| {
        if ctx.value.is_null() {
            Ok(Value::Null)
        } else {
            inner(ctx)
        }
    })
}

/// Remove all whitespace and split on commas. Empty segments are dropped.
pub fn split_list(s: &str) -> Vec<String> {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    compact
        .split(',')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Comma separated string to list; absent becomes an empty list.
pub fn to_list(ctx: &TransformContext<'_>) -> Result<Value> {
    Ok(match ctx.value {
        Value::String(s) => Value::from(split_list(s)),
        Value::Null => Value::Array(Vec::new()),
        other => other.clone(),
    })
}

/// A fresh random UUID string.
pub fn new_uuid(_ctx: &TransformContext<'_>) -> Result<Value> {
    Ok(Value::String(uuid::Uuid::new_v4().to_string()))
}

/// TLDs that are accepted without a scheme besides two-letter country codes.
const KNOWN_TLDS: &[&str] = &["com", "net", "org", "fun", "app", "dev", "xyz"];

/// Repair a user-supplied URL.
///
/// `none` and unrecognisable links become empty; `http://` is upgraded;
/// scheme-less links with a plausible TLD get `https://`. With
/// `support = true` a space-free link is treated as a Discord invite.
pub fn parse_link(link: &str, support: bool) -> String {
    let link = link.trim();
    if link.eq_ignore_ascii_case("none") {
        return String::new();
    }
    if let Some(rest) = link.strip_prefix("http://") {
        return format!("https://{}", rest);
    }
    if link.starts_with("https://") {
        return link.to_string();
    }

    info!("Possibly invalid URL found: {}", link);

    if support && !link.contains(' ') {
        let link = link.replacen("www", "", 1);
        let code = ["discord.gg/", "discord.com/invite/", "discord.com/"]
            .iter()
            .find_map(|prefix| link.strip_prefix(prefix))
            .unwrap_or(&link);
        let fixed = format!("https://discord.gg/{}", code);
        info!("Fixed support link to {}", fixed);
        return fixed;
    }

    let host = link.split('/').next().unwrap_or_default();
    let labels: Vec<&str> = host.split('.').collect();
    let tld = labels.last().copied().unwrap_or_default();
    if labels.len() > 1 && (tld.len() == 2 || KNOWN_TLDS.contains(&tld)) {
        let fixed = format!("https://{}", link);
        info!("Fixed link to {}", fixed);
        return fixed;
    }

    warn!("Removing invalid link: {}", link);
    String::new()
}

fn repair_links(value: &Value, support: bool) -> Value {
    match value {
        Value::String(s) => Value::String(parse_link(s, support)),
        // A list of `{name, value}` links; `Support` entries are invites.
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(obj) => {
                        let name = obj.get("name").and_then(Value::as_str).unwrap_or_default();
                        let raw = obj.get("value").and_then(Value::as_str)?;
                        let fixed = parse_link(raw, support || name == "Support");
                        if fixed.is_empty() {
                            return None;
                        }
                        let mut out = Map::new();
                        out.insert("name".into(), Value::String(name.to_string()));
                        out.insert("value".into(), Value::String(fixed));
                        Some(Value::Object(out))
                    }
                    other => Some(repair_links(other, support)),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Registry of transforms by name.
#[derive(Clone)]
pub struct TransformRegistry {
    transforms: HashMap<String, TransformFn>,
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.transforms.keys().collect();
        names.sort();
        f.debug_struct("TransformRegistry").field("transforms", &names).finish()
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TransformRegistry {
    pub fn empty() -> Self {
        Self {
            transforms: HashMap::new(),
        }
    }

    /// Registry preloaded with `to_list`, `uuid`, `uuid_default`, `link`
    /// and `support_link`.
    pub fn with_builtins() -> Self {
        let mut reg = Self::empty();
        reg.register("to_list", transform(to_list));
        reg.register("uuid", transform(new_uuid));
        reg.register("uuid_default", default_fn(transform(new_uuid)));
        reg.register(
            "link",
            if_exists(transform(|ctx| Ok(repair_links(ctx.value, false)))),
        );
        reg.register(
            "support_link",
            if_exists(transform(|ctx| Ok(repair_links(ctx.value, true)))),
        );
        reg
    }

    pub fn register(&mut self, name: impl Into<String>, f: TransformFn) {
        self.transforms.insert(name.into(), f);
    }

    /// Resolve a transform name, honouring `default:` and `if_exists:`.
    pub fn resolve(&self, name: &str) -> Option<TransformFn> {
        let name = name.trim();
        if let Some(inner) = name.strip_prefix("default:") {
            return self.resolve(inner).map(default_fn);
        }
        if let Some(inner) = name.strip_prefix("if_exists:") {
            return self.resolve(inner).map(if_exists);
        }
        self.transforms.get(name).cloned()
    }

    /// Fail on any entity field bound to an unknown transform.
    pub fn validate(&self, entities: &[SchemaEntity]) -> Result<()> {
        for entity in entities {
            for field in &entity.fields {
                if let Some(name) = &field.transform {
                    if self.resolve(name).is_none() {
                        return Err(MigrateError::Config(format!(
                            "{}.{}: unknown transform '{}'",
                            entity.name, field.name, name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
