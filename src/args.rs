//! Collecting raw argument fragments from request data.

use crate::error::{CmdError, Result};
use crate::quote::QuoteDialect;
use serde_json::Value;
use std::fmt;

/// A value that can stand in the value position of a key/value pair
pub trait ArgumentValue {
    /// True for the "absent" marker (`None`, JSON `null`)
    fn is_null(&self) -> bool;

    /// Textual form used as the argument token
    fn to_argument(&self) -> String;
}

impl ArgumentValue for str {
    fn is_null(&self) -> bool {
        false
    }

    fn to_argument(&self) -> String {
        self.to_string()
    }
}

impl ArgumentValue for String {
    fn is_null(&self) -> bool {
        false
    }

    fn to_argument(&self) -> String {
        self.clone()
    }
}

impl ArgumentValue for Value {
    fn is_null(&self) -> bool {
        Value::is_null(self)
    }

    fn to_argument(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl<T: ArgumentValue + ?Sized> ArgumentValue for &T {
    fn is_null(&self) -> bool {
        (**self).is_null()
    }

    fn to_argument(&self) -> String {
        (**self).to_argument()
    }
}

impl<T: ArgumentValue> ArgumentValue for Option<T> {
    fn is_null(&self) -> bool {
        self.as_ref().map_or(true, ArgumentValue::is_null)
    }

    fn to_argument(&self) -> String {
        self.as_ref().map(ArgumentValue::to_argument).unwrap_or_default()
    }
}

/// Ordered list of unescaped argument fragments for one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentCollector {
    fragments: Vec<String>,
}

impl ArgumentCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw fragments in insertion order
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Append a single fragment
    pub fn append(&mut self, fragment: impl Into<String>) -> &mut Self {
        self.fragments.push(fragment.into());
        self
    }

    /// Append every fragment of `fragments` in order; `None` is a no-op
    pub fn append_all<I, S>(&mut self, fragments: Option<I>) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(fragments) = fragments {
            self.fragments.extend(fragments.into_iter().map(Into::into));
        }
        self
    }

    /// Append named parameters.
    ///
    /// A key that is non-blank after trimming becomes its own token ahead of
    /// the value token. A blank key contributes only the value, and nothing at
    /// all when the value is null.
    pub fn append_key_values<I, K, V>(&mut self, pairs: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: ArgumentValue,
    {
        for (key, value) in pairs {
            let key = key.as_ref().trim();

            if !key.is_empty() {
                self.fragments.push(key.to_string());
                self.fragments.push(value.to_argument());
            } else if !value.is_null() {
                self.fragments.push(value.to_argument());
            }
        }
        self
    }

    /// Append pairs from a raw query string such as `a=1&b=two%20words`.
    /// An entry without `=` is a positional value.
    pub fn append_query(&mut self, query: &str) -> &mut Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let pairs: Vec<(String, Option<String>)> = query
            .split('&')
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.split_once('=') {
                Some((key, value)) => (decode_component(key), Some(decode_component(value))),
                None => (String::new(), Some(decode_component(entry))),
            })
            .collect();
        self.append_key_values(pairs)
    }

    /// Append a JSON request body.
    ///
    /// An array contributes each element, an object its key/value pairs, a
    /// scalar one token, and `null` nothing. Array elements and object values
    /// must themselves be scalars.
    pub fn append_structured(&mut self, body: &Value) -> Result<&mut Self> {
        match body {
            Value::Null => {}
            Value::Array(items) => {
                let mut fragments = Vec::with_capacity(items.len());
                for item in items {
                    ensure_scalar(item)?;
                    fragments.push(item.to_argument());
                }
                self.append_all(Some(fragments));
            }
            Value::Object(map) => {
                for value in map.values() {
                    ensure_scalar(value)?;
                }
                self.append_key_values(map.iter());
            }
            scalar => {
                self.append(scalar.to_argument());
            }
        }
        Ok(self)
    }

    /// Join all fragments, each passed through `escape`, with one space
    pub fn render<F>(&self, escape: F, force_quote: bool) -> String
    where
        F: Fn(&str, bool) -> String,
    {
        self.fragments
            .iter()
            .map(|fragment| escape(fragment, force_quote))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Render using the quoting rules of `dialect`
    pub fn render_for(&self, dialect: QuoteDialect, force_quote: bool) -> String {
        self.render(|fragment, force| dialect.escape(Some(fragment), force), force_quote)
    }
}

impl fmt::Display for ArgumentCollector {
    /// Fragments joined without any escaping
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fragments.join(" "))
    }
}

fn ensure_scalar(value: &Value) -> Result<()> {
    match value {
        Value::Array(_) => Err(CmdError::InvalidArgumentShape(format!(
            "nested array {value} is not a scalar"
        ))),
        Value::Object(_) => Err(CmdError::InvalidArgumentShape(format!(
            "nested object {value} is not a scalar"
        ))),
        _ => Ok(()),
    }
}

fn decode_component(component: &str) -> String {
    url::form_urlencoded::parse(format!("v={component}").as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}
