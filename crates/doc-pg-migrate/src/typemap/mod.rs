//! Type mapping from field native types to PostgreSQL.

use crate::core::NativeType;

/// Map a native field type to a PostgreSQL column type.
///
/// `to_list` marks a scalar that is stored as an array after
/// comma-splitting; it appends `[]` unless the type is already an array.
pub fn native_to_postgres(native: &NativeType, to_list: bool) -> String {
    let base = match native.pointee() {
        NativeType::List(inner) => format!("{}[]", scalar_type(inner.pointee())),
        other => scalar_type(other),
    };

    if to_list && !base.ends_with("[]") && base != "jsonb" {
        format!("{}[]", base)
    } else {
        base
    }
}

fn scalar_type(native: &NativeType) -> String {
    match native {
        // Text
        NativeType::String => "text".to_string(),

        // Boolean
        NativeType::Bool => "boolean".to_string(),

        // Integer types
        NativeType::I8 | NativeType::I16 => "smallint".to_string(),
        NativeType::I32 => "integer".to_string(),
        NativeType::I64 => "bigint".to_string(),

        // Floating point
        NativeType::F32 => "real".to_string(),
        NativeType::F64 => "double precision".to_string(),

        // Date/time
        NativeType::DateTime => "timestamptz".to_string(),

        // Maps are always stored as JSON
        NativeType::Map => "jsonb".to_string(),

        NativeType::Optional(inner) => scalar_type(inner),
        NativeType::List(inner) => format!("{}[]", scalar_type(inner)),

        // Anything else is already a SQL type name
        NativeType::Named(name) => name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(ty: &str) -> String {
        native_to_postgres(&ty.parse().unwrap(), false)
    }

    #[test]
    fn test_fixed_substitutions() {
        assert_eq!(map("String"), "text");
        assert_eq!(map("bool"), "boolean");
        assert_eq!(map("i8"), "smallint");
        assert_eq!(map("i16"), "smallint");
        assert_eq!(map("i32"), "integer");
        assert_eq!(map("i64"), "bigint");
        assert_eq!(map("DateTime"), "timestamptz");
    }

    #[test]
    fn test_wrappers() {
        assert_eq!(map("Option<String>"), "text");
        assert_eq!(map("Vec<String>"), "text[]");
        assert_eq!(map("Option<Vec<i64>>"), "bigint[]");
        assert_eq!(map("HashMap<String, Value>"), "jsonb");
        assert_eq!(map("Option<Map>"), "jsonb");
    }

    #[test]
    fn test_to_list_appends_array_suffix_once() {
        let s: NativeType = "String".parse().unwrap();
        assert_eq!(native_to_postgres(&s, true), "text[]");
        let v: NativeType = "Vec<String>".parse().unwrap();
        assert_eq!(native_to_postgres(&v, true), "text[]");
    }

    #[test]
    fn test_named_types_pass_through() {
        assert_eq!(map("uuid"), "uuid");
    }
}
