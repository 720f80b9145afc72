//! Three-state field reads over untyped JSON objects.

use super::error::{ValidationError, ValidationResult};
use serde_json::{Map, Value};

/// A field as found in a provider payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    /// Key not present.
    Absent,
    /// Key present with an explicit `null`.
    Null,
    Present(T),
}

impl<T> Field<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Present(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Field::Present(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Field::Absent => Field::Absent,
            Field::Null => Field::Null,
            Field::Present(v) => Field::Present(f(v)),
        }
    }

    pub fn unwrap_or(self, default: T) -> T {
        self.into_option().unwrap_or(default)
    }

    /// Present value or a `required` error naming `path`.
    pub fn require(self, path: &str) -> ValidationResult<T> {
        match self {
            Field::Present(v) => Ok(v),
            _ => Err(ValidationError::required(path)),
        }
    }
}

impl<T: Default> Field<T> {
    pub fn unwrap_or_default(self) -> T {
        self.into_option().unwrap_or_default()
    }
}

/// Typed reader over one JSON object, tracking its path for error messages.
///
/// Each accessor takes the accepted key spellings in priority order (English
/// first, then the Spanish names some prompts produce).
pub struct ObjectReader<'a> {
    obj: &'a Map<String, Value>,
    path: String,
}

impl<'a> ObjectReader<'a> {
    pub fn root(value: &'a Value) -> ValidationResult<Self> {
        match value {
            Value::Object(obj) => Ok(Self {
                obj,
                path: String::new(),
            }),
            other => Err(ValidationError::malformed("", "object", other)),
        }
    }

    fn child_path(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        }
    }

    /// Path of `names[0]` under this object.
    pub fn path_of(&self, names: &[&str]) -> String {
        self.child_path(names.first().copied().unwrap_or(""))
    }

    pub fn raw(&self, names: &[&str]) -> Field<&'a Value> {
        for name in names {
            if let Some(v) = self.obj.get(*name) {
                return if v.is_null() { Field::Null } else { Field::Present(v) };
            }
        }
        Field::Absent
    }

    pub fn string(&self, names: &[&str]) -> ValidationResult<Field<String>> {
        match self.raw(names) {
            Field::Present(Value::String(s)) => Ok(Field::Present(s.clone())),
            Field::Present(other) => Err(ValidationError::malformed(self.path_of(names), "string", other)),
            Field::Null => Ok(Field::Null),
            Field::Absent => Ok(Field::Absent),
        }
    }

    /// Number, or a string holding one (`"7.5"`).
    pub fn number(&self, names: &[&str]) -> ValidationResult<Field<f64>> {
        match self.raw(names) {
            Field::Present(Value::Number(n)) => n
                .as_f64()
                .map(Field::Present)
                .ok_or_else(|| ValidationError::new("number out of range", self.path_of(names))),
            Field::Present(v @ Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Field::Present)
                .ok_or_else(|| ValidationError::malformed(self.path_of(names), "number", v)),
            Field::Present(other) => Err(ValidationError::malformed(self.path_of(names), "number", other)),
            Field::Null => Ok(Field::Null),
            Field::Absent => Ok(Field::Absent),
        }
    }

    /// Nutrient quantity. Unit suffixes are stripped (`"12 g"`, `"350mg"`);
    /// a string that still does not parse reads as null.
    pub fn nutrient(&self, names: &[&str]) -> ValidationResult<Field<f64>> {
        match self.raw(names) {
            Field::Present(Value::String(s)) => Ok(match parse_quantity(s) {
                Some(n) => Field::Present(n),
                None => Field::Null,
            }),
            _ => self.number(names),
        }
    }

    pub fn string_list(&self, names: &[&str]) -> ValidationResult<Field<Vec<String>>> {
        match self.raw(names) {
            Field::Present(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    match item {
                        Value::String(s) => out.push(s.clone()),
                        Value::Null => {}
                        other => {
                            return Err(ValidationError::malformed(
                                format!("{}[{}]", self.path_of(names), i),
                                "string",
                                other,
                            ))
                        }
                    }
                }
                Ok(Field::Present(out))
            }
            Field::Present(other) => Err(ValidationError::malformed(self.path_of(names), "array", other)),
            Field::Null => Ok(Field::Null),
            Field::Absent => Ok(Field::Absent),
        }
    }

    pub fn object(&self, names: &[&str]) -> ValidationResult<Field<ObjectReader<'a>>> {
        match self.raw(names) {
            Field::Present(Value::Object(obj)) => Ok(Field::Present(ObjectReader {
                obj,
                path: self.path_of(names),
            })),
            Field::Present(other) => Err(ValidationError::malformed(self.path_of(names), "object", other)),
            Field::Null => Ok(Field::Null),
            Field::Absent => Ok(Field::Absent),
        }
    }

    /// Entries of this object as child readers; non-object values are malformed.
    pub fn object_entries(&self) -> ValidationResult<Vec<(String, ObjectReader<'a>)>> {
        let mut out = Vec::with_capacity(self.obj.len());
        for (key, value) in self.obj {
            match value {
                Value::Object(obj) => out.push((
                    key.clone(),
                    ObjectReader {
                        obj,
                        path: self.child_path(key),
                    },
                )),
                Value::Null => {}
                other => return Err(ValidationError::malformed(self.child_path(key), "object", other)),
            }
        }
        Ok(out)
    }
}

/// Parse `"12 g"`, `"350mg"`, `"120 kcal"`, `"1,5 g"` into a number.
pub fn parse_quantity(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().to_lowercase();
    let numeric: String = cleaned
        .trim_end_matches(|c: char| c.is_alphabetic() || c.is_whitespace() || c == '%')
        .trim_start_matches(['<', '>', '~', '≈'])
        .trim()
        .replace(',', ".");
    if numeric.is_empty() {
        return None;
    }
    numeric.parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_null_present() {
        let value = json!({"a": "x", "b": null});
        let r = ObjectReader::root(&value).unwrap();
        assert_eq!(r.string(&["a"]).unwrap(), Field::Present("x".to_string()));
        assert_eq!(r.string(&["b"]).unwrap(), Field::Null);
        assert_eq!(r.string(&["c"]).unwrap(), Field::Absent);
    }

    #[test]
    fn test_alias_lookup() {
        let value = json!({"nombre": "Avena"});
        let r = ObjectReader::root(&value).unwrap();
        assert_eq!(r.string(&["name", "nombre"]).unwrap().into_option().as_deref(), Some("Avena"));
    }

    #[test]
    fn test_malformed_names_path() {
        let value = json!({"general_rating": {"score": [1, 2]}});
        let r = ObjectReader::root(&value).unwrap();
        let rating = r.object(&["general_rating"]).unwrap().into_option().unwrap();
        let err = rating.number(&["score"]).unwrap_err();
        assert_eq!(err.path, "general_rating.score");
        assert!(err.message.contains("expected number"));
    }

    #[test]
    fn test_numeric_strings() {
        let value = json!({"score": " 7.5 ", "bad": "seven"});
        let r = ObjectReader::root(&value).unwrap();
        assert_eq!(r.number(&["score"]).unwrap(), Field::Present(7.5));
        assert!(r.number(&["bad"]).is_err());
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("12 g"), Some(12.0));
        assert_eq!(parse_quantity("350mg"), Some(350.0));
        assert_eq!(parse_quantity("120 kcal"), Some(120.0));
        assert_eq!(parse_quantity("1,5 g"), Some(1.5));
        assert_eq!(parse_quantity("<0.5 g"), Some(0.5));
        assert_eq!(parse_quantity("trazas"), None);
        assert_eq!(parse_quantity(""), None);
    }

    #[test]
    fn test_nutrient_unparsable_is_null() {
        let value = json!({"sodium": "n/a", "protein": "8 g", "fat": 3});
        let r = ObjectReader::root(&value).unwrap();
        assert_eq!(r.nutrient(&["sodium"]).unwrap(), Field::Null);
        assert_eq!(r.nutrient(&["protein"]).unwrap(), Field::Present(8.0));
        assert_eq!(r.nutrient(&["fat"]).unwrap(), Field::Present(3.0));
    }

    #[test]
    fn test_string_list_rejects_non_strings() {
        let value = json!({"allergens": ["milk", 3]});
        let r = ObjectReader::root(&value).unwrap();
        let err = r.string_list(&["allergens"]).unwrap_err();
        assert_eq!(err.path, "allergens[1]");
    }

    #[test]
    fn test_root_must_be_object() {
        assert!(ObjectReader::root(&json!([1])).is_err());
        assert!(Field::<u8>::Null.require("x").is_err());
    }
}
