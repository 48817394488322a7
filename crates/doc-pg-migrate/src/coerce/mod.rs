//! Value coercion engine.
//!
//! Resolves one field of one source record into the value that gets bound
//! to the INSERT. The steps run in a fixed order and any of them may
//! short-circuit:
//!
//! 1. lookup by source key (alternates in order; `""` counts as absent)
//! 2. the bound transform, whose result replaces the value unconditionally
//! 3. absent values: `SKIP` drops the row, a literal default fills in,
//!    otherwise the operator is asked
//! 4. timestamp columns: epoch millis, RFC 3339, `NOW`, source temporals
//! 5. the source's extended-type parser
//! 6. comma-separated list splitting for `to_list` fields

pub mod timestamp;

use serde_json::Value;

use crate::core::{
    FieldDescriptor, Notifier, NotifyLevel, OperatorPrompt, Record, Source, SqlValue,
};
use crate::ddl::is_function_call;
use crate::error::{MigrateError, Result};
use crate::prompt::resolve_input;
use crate::resolver::ResolvedField;
use crate::transform::{split_list, TransformContext, TransformRegistry};
use crate::core::value::{is_array_type, is_temporal_type};

pub use timestamp::{coerce_timestamp, parse_timestamp_str};

/// Outcome of coercing one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    Value(SqlValue),
    /// Drop the whole record.
    SkipRow,
}

/// Collaborators and batch state shared by every field of a row.
pub struct CoercionContext<'a> {
    pub entity: &'a str,
    /// The whole in-flight batch.
    pub records: &'a [Record],
    /// 1-based row counter.
    pub row: usize,
    pub source: &'a dyn Source,
    pub transforms: &'a TransformRegistry,
    pub prompt: &'a dyn OperatorPrompt,
    pub notifier: &'a dyn Notifier,
    pub debug: bool,
}

impl CoercionContext<'_> {
    fn error(&self, field: &FieldDescriptor, message: impl Into<String>) -> MigrateError {
        MigrateError::Coercion {
            entity: self.entity.to_string(),
            field: field.name.clone(),
            row: self.row,
            message: message.into(),
        }
    }
}

fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// First present value among the field's source keys.
pub fn lookup(field: &FieldDescriptor, record: &Record) -> Value {
    field
        .source
        .iter()
        .filter_map(|key| record.get(key))
        .find(|v| !is_absent(v))
        .cloned()
        .unwrap_or(Value::Null)
}

/// What a literal default turns into at insert time.
enum DefaultValue {
    /// Let the database evaluate the column default.
    Database,
    Literal(Value),
}

fn literal_default(expr: &str, sql_type: &str) -> DefaultValue {
    let expr = expr.trim();
    let temporal = is_temporal_type(sql_type);

    if is_function_call(expr) && !(temporal && expr.contains(timestamp::NOW_TOKEN)) {
        return DefaultValue::Database;
    }

    if expr == "{}" {
        let ty = sql_type.trim().to_ascii_lowercase();
        return DefaultValue::Literal(if is_array_type(&ty) {
            Value::Array(Vec::new())
        } else if ty.starts_with("json") {
            Value::Object(Default::default())
        } else {
            Value::String(expr.to_string())
        });
    }

    DefaultValue::Literal(match resolve_input(expr) {
        Value::String(s) => {
            let unquoted = s
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
                .map(|s| s.replace("''", "'"))
                .unwrap_or(s);
            Value::String(unquoted)
        }
        other => other,
    })
}

/// Coerce one field of one record.
pub async fn coerce(
    field: &FieldDescriptor,
    resolved: &ResolvedField,
    record: &Record,
    ctx: &CoercionContext<'_>,
) -> Result<Coerced> {
    let sql_type = resolved.sql_type.as_str();

    if ctx.debug {
        ctx.notifier.notify(
            NotifyLevel::Debug,
            &format!(
                "Table: {} Field: {} Type: {}",
                ctx.entity,
                field.name,
                resolved.column_spec()
            ),
        );
    }

    let mut value = lookup(field, record);

    if let Some(name) = &field.transform {
        let transform = ctx.transforms.resolve(name).ok_or_else(|| {
            MigrateError::Config(format!(
                "{}.{}: unknown transform '{}'",
                ctx.entity, field.name, name
            ))
        })?;
        let tctx = TransformContext {
            records: ctx.records,
            record,
            value: &value,
            row: ctx.row,
            field: &field.name,
        };
        value = transform(&tctx)?;
    }

    if is_absent(&value) {
        match field.default.as_deref() {
            Some(_) if field.skips_when_absent() => {
                ctx.notifier.notify(
                    NotifyLevel::Warning,
                    &format!(
                        "Skipping row {} of {}: {} is empty",
                        ctx.row, ctx.entity, resolved.dest
                    ),
                );
                return Ok(Coerced::SkipRow);
            }
            Some(expr) => match literal_default(expr, sql_type) {
                DefaultValue::Database => return Ok(Coerced::Value(SqlValue::Default)),
                DefaultValue::Literal(v) => value = v,
            },
            None => {
                let answer = ctx
                    .prompt
                    .ask(&format!(
                        "What should the value of {} be? (currently null)",
                        resolved.dest
                    ))
                    .await?;
                value = resolve_input(&answer);
            }
        }
    }

    if field.log {
        ctx.notifier.notify(
            NotifyLevel::Info,
            &format!("Setting {} ({}) to {}", resolved.source, resolved.dest, value),
        );
    }

    if value.is_null() {
        return Ok(Coerced::Value(SqlValue::Null));
    }

    if is_temporal_type(sql_type) {
        let t = coerce_timestamp(&value, ctx.source).map_err(|e| ctx.error(field, e))?;
        return Ok(Coerced::Value(SqlValue::Timestamp(t)));
    }

    if let Some(parsed) = ctx.source.ext_parse(&value) {
        return Ok(Coerced::Value(parsed));
    }

    if field.to_list && !field.native_type.is_sequence() {
        if let Value::String(s) = &value {
            return Ok(Coerced::Value(SqlValue::TextArray(split_list(s))));
        }
    }

    Ok(Coerced::Value(SqlValue::from_json(&value, sql_type)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NativeType;
    use crate::notify::RecordingNotifier;
    use crate::prompt::{HeadlessPrompt, ScriptedPrompt};
    use crate::resolver::resolve_field;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    struct PlainSource;

    #[async_trait]
    impl Source for PlainSource {
        async fn list_entities(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn get_records(&self, _: &str) -> Result<Vec<Record>> {
            Ok(vec![])
        }
        async fn get_count(&self, _: &str) -> Result<usize> {
            Ok(0)
        }
        fn source_type(&self) -> &str {
            "plain"
        }
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    async fn coerce_with(
        field: &FieldDescriptor,
        rec: &Record,
        prompt: &dyn OperatorPrompt,
        notifier: &dyn Notifier,
    ) -> Result<Coerced> {
        let resolved = resolve_field("bots", field).unwrap();
        let transforms = TransformRegistry::with_builtins();
        let ctx = CoercionContext {
            entity: "bots",
            records: std::slice::from_ref(rec),
            row: 1,
            source: &PlainSource,
            transforms: &transforms,
            prompt,
            notifier,
            debug: false,
        };
        coerce(field, &resolved, rec, &ctx).await
    }

    async fn coerce_one(field: &FieldDescriptor, rec: &Record) -> Result<Coerced> {
        coerce_with(field, rec, &HeadlessPrompt, &RecordingNotifier::default()).await
    }

    #[tokio::test]
    async fn test_empty_string_equals_absent() {
        let field = FieldDescriptor::new("Note", "note", NativeType::String)
            .same_dest()
            .default_value("none given");
        let empty = coerce_one(&field, &record(json!({"note": ""}))).await.unwrap();
        let absent = coerce_one(&field, &record(json!({}))).await.unwrap();
        assert_eq!(empty, absent);
        assert_eq!(empty, Coerced::Value(SqlValue::Text("none given".into())));
    }

    #[tokio::test]
    async fn test_alternate_source_keys() {
        let field = FieldDescriptor::new(
            "Owner",
            crate::core::SourceKeys::new(["main_owner", "owner"]),
            NativeType::String,
        )
        .dest("owner");
        let out = coerce_one(&field, &record(json!({"main_owner": "", "owner": "bob"})))
            .await
            .unwrap();
        assert_eq!(out, Coerced::Value(SqlValue::Text("bob".into())));
    }

    #[tokio::test]
    async fn test_to_list_scenario() {
        let field = FieldDescriptor::new("Tags", "tags", NativeType::String)
            .same_dest()
            .to_list();
        let out = coerce_one(&field, &record(json!({"tags": "music, fun,games"})))
            .await
            .unwrap();
        assert_eq!(
            out,
            Coerced::Value(SqlValue::TextArray(vec![
                "music".into(),
                "fun".into(),
                "games".into()
            ]))
        );
    }

    #[tokio::test]
    async fn test_native_sequences_skip_list_splitting() {
        let field = FieldDescriptor::new("Tags", "tags", "Vec<String>".parse().unwrap())
            .same_dest()
            .to_list();
        let out = coerce_one(&field, &record(json!({"tags": ["a,b"]}))).await.unwrap();
        assert_eq!(out, Coerced::Value(SqlValue::TextArray(vec!["a,b".into()])));
    }

    #[tokio::test]
    async fn test_timestamp_scenarios() {
        let field = FieldDescriptor::new("Date", "date", NativeType::DateTime).same_dest();
        let expected = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap();

        let epoch = coerce_one(&field, &record(json!({"date": 1_700_000_000_000i64})))
            .await
            .unwrap();
        assert_eq!(epoch, Coerced::Value(SqlValue::Timestamp(expected)));

        let rfc = coerce_one(&field, &record(json!({"date": "2023-11-14T22:13:20Z"})))
            .await
            .unwrap();
        assert_eq!(rfc, epoch);

        let before = Utc::now();
        match coerce_one(&field, &record(json!({"date": "NOW"}))).await.unwrap() {
            Coerced::Value(SqlValue::Timestamp(t)) => assert!(t >= before),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bad_timestamp_is_fatal() {
        let field = FieldDescriptor::new("Date", "date", NativeType::DateTime).same_dest();
        let err = coerce_one(&field, &record(json!({"date": "last tuesday"})))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Coercion { row: 1, .. }));
    }

    #[tokio::test]
    async fn test_skip_default_skips_row() {
        let notifier = RecordingNotifier::default();
        let field = FieldDescriptor::new("Owner", "owner", NativeType::String)
            .same_dest()
            .default_value("SKIP");
        let out = coerce_with(&field, &record(json!({})), &HeadlessPrompt, &notifier)
            .await
            .unwrap();
        assert_eq!(out, Coerced::SkipRow);
        assert!(notifier.contains(NotifyLevel::Warning, "Skipping row 1"));
    }

    #[tokio::test]
    async fn test_function_defaults_defer_to_database() {
        let field = FieldDescriptor::new("Token", "token", NativeType::String)
            .same_dest()
            .default_value("uuid_generate_v4()::text");
        let out = coerce_one(&field, &record(json!({}))).await.unwrap();
        assert_eq!(out, Coerced::Value(SqlValue::Default));

        let stamp = FieldDescriptor::new("Created", "created", NativeType::DateTime)
            .same_dest()
            .default_value("NOW()");
        let out = coerce_one(&stamp, &record(json!({}))).await.unwrap();
        assert!(matches!(out, Coerced::Value(SqlValue::Timestamp(_))));
    }

    #[tokio::test]
    async fn test_literal_defaults() {
        let quoted = FieldDescriptor::new("Reason", "reason", NativeType::String)
            .same_dest()
            .default_value("'No reason'");
        assert_eq!(
            coerce_one(&quoted, &record(json!({}))).await.unwrap(),
            Coerced::Value(SqlValue::Text("No reason".into()))
        );

        let empty_list = FieldDescriptor::new("Tags", "tags", "Vec<String>".parse().unwrap())
            .same_dest()
            .default_value("{}");
        assert_eq!(
            coerce_one(&empty_list, &record(json!({}))).await.unwrap(),
            Coerced::Value(SqlValue::TextArray(vec![]))
        );

        let flag = FieldDescriptor::new("Nsfw", "nsfw", NativeType::Bool)
            .same_dest()
            .default_value("false");
        assert_eq!(
            coerce_one(&flag, &record(json!({}))).await.unwrap(),
            Coerced::Value(SqlValue::Bool(false))
        );
    }

    #[tokio::test]
    async fn test_missing_value_asks_operator() {
        let prompt = ScriptedPrompt::new(["true"]);
        let field = FieldDescriptor::new("Certified", "certified", NativeType::Bool).same_dest();
        let out = coerce_with(
            &field,
            &record(json!({})),
            &prompt,
            &RecordingNotifier::default(),
        )
        .await
        .unwrap();
        assert_eq!(out, Coerced::Value(SqlValue::Bool(true)));
        assert_eq!(
            prompt.asked().await,
            vec!["What should the value of certified be? (currently null)"]
        );
    }

    #[tokio::test]
    async fn test_headless_missing_value_fails() {
        let field = FieldDescriptor::new("Certified", "certified", NativeType::Bool).same_dest();
        let err = coerce_one(&field, &record(json!({}))).await.unwrap_err();
        assert!(matches!(err, MigrateError::Prompt(_)));
    }

    #[tokio::test]
    async fn test_transform_sees_context() {
        let mut transforms = TransformRegistry::with_builtins();
        transforms.register(
            "owner_from_sibling",
            crate::transform::transform(|ctx| {
                Ok(json!(format!("{}#{}", ctx.sibling("name").as_str().unwrap_or(""), ctx.row)))
            }),
        );
        let field = FieldDescriptor::new("Owner", "owner", NativeType::String)
            .same_dest()
            .transform("owner_from_sibling");
        let rec = record(json!({"name": "x"}));
        let resolved = resolve_field("bots", &field).unwrap();
        let notifier = RecordingNotifier::default();
        let ctx = CoercionContext {
            entity: "bots",
            records: std::slice::from_ref(&rec),
            row: 3,
            source: &PlainSource,
            transforms: &transforms,
            prompt: &HeadlessPrompt,
            notifier: &notifier,
            debug: false,
        };
        let out = coerce(&field, &resolved, &rec, &ctx).await.unwrap();
        assert_eq!(out, Coerced::Value(SqlValue::Text("x#3".into())));
    }
}
