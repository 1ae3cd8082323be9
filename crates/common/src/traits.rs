// flowdbg - Message Flow Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Collaborator traits and their default in-memory implementations.
//!
//! The debugger core never evaluates condition languages, renders message
//! dumps, or coerces types itself; it goes through the seams defined here. A
//! real engine substitutes its own expression language, dumping facility and
//! converter registry. The default implementations keep the library usable
//! and testable standalone:
//!
//! - [`SimpleExpressionResolver`] - a one-comparison condition language
//! - [`DefaultMessageDumper`] - spec-shaped XML and JSON message documents
//! - [`DefaultTypeConverter`] - string/integer/float/boolean coercions

use std::{error::Error, fmt, str::FromStr, sync::Arc};

use eyre::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{normalize_expression, Exchange, MessageBody};

/// A compiled condition over an exchange.
///
/// Evaluation returns `Err` when the underlying expression cannot be applied
/// to the exchange at hand; callers at the dispatch boundary treat that as a
/// non-match and log it, never as a pipeline failure.
#[auto_impl::auto_impl(&, Arc)]
pub trait Predicate: Send + Sync {
    /// Evaluates the condition against the exchange.
    fn matches(&self, exchange: &Exchange) -> Result<bool>;

    /// The source text this predicate was compiled from.
    fn expression(&self) -> &str;
}

/// Compiles condition expressions into [`Predicate`]s.
///
/// Compilation happens at breakpoint registration time, not at match time,
/// so malformed expressions are rejected up front.
#[auto_impl::auto_impl(&, Arc)]
pub trait ExpressionResolver: Send + Sync {
    /// Compiles `expression` written in `language` into a predicate.
    fn create_predicate(&self, language: &str, expression: &str) -> Result<Arc<dyn Predicate>>;
}

/// Renders an exchange's message as a transportable document.
#[auto_impl::auto_impl(&, Arc)]
pub trait MessageDumper: Send + Sync {
    /// Renders the message as an XML document.
    fn dump_as_xml(&self, exchange: &Exchange, options: &DumpOptions) -> Result<String>;

    /// Renders the message as a JSON document.
    fn dump_as_json(&self, exchange: &Exchange, options: &DumpOptions) -> Result<String>;
}

/// Coerces a value to a named target type in the context of an exchange.
#[auto_impl::auto_impl(&, Arc)]
pub trait TypeConverter: Send + Sync {
    /// Converts `value` to `target_type`, or fails with [`NoTypeConversion`].
    fn convert_to(
        &self,
        target_type: &str,
        exchange: &Exchange,
        value: Value,
    ) -> std::result::Result<Value, NoTypeConversion>;
}

/// Raised when a [`TypeConverter`] has no conversion for the requested
/// target type and value.
#[derive(Debug, Clone)]
pub struct NoTypeConversion {
    target: String,
    value: String,
}

impl NoTypeConversion {
    /// Creates a conversion failure for the given target type and offending value.
    pub fn new(target: impl Into<String>, value: impl fmt::Display) -> Self {
        Self { target: target.into(), value: value.to_string() }
    }

    /// The target type that could not be produced.
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl fmt::Display for NoTypeConversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no type conversion available to '{}' from value '{}'", self.target, self.value)
    }
}

impl Error for NoTypeConversion {}

/// Caps and inclusion flags applied when dumping a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpOptions {
    /// Maximum number of characters of body text to include; 0 disables the cap.
    pub body_max_chars: usize,
    /// Whether stream-typed bodies are read into the dump.
    pub body_include_streams: bool,
    /// Whether file-typed bodies are referenced in the dump.
    pub body_include_files: bool,
    /// Whether exchange-scoped properties are included.
    pub include_exchange_properties: bool,
    /// Whether exchange-scoped variables are included.
    pub include_exchange_variables: bool,
    /// Whether an attached exception is included.
    pub include_exception: bool,
    /// Indentation width for pretty-printed documents; 0 emits compact output.
    pub indent: usize,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            body_max_chars: 128 * 1024,
            body_include_streams: false,
            body_include_files: true,
            include_exchange_properties: true,
            include_exchange_variables: true,
            include_exception: true,
            indent: 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Default expression resolver
// ---------------------------------------------------------------------------

/// The condition language understood by [`SimpleExpressionResolver`].
pub const SIMPLE_LANGUAGE: &str = "simple";

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Body,
    ExchangeId,
    Header(String),
    Property(String),
    Variable(String),
}

impl FromStr for Operand {
    type Err = eyre::Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(name) = s.strip_prefix("header:") {
            return Ok(Self::Header(name.to_string()));
        }
        if let Some(name) = s.strip_prefix("property:") {
            return Ok(Self::Property(name.to_string()));
        }
        if let Some(name) = s.strip_prefix("variable:") {
            return Ok(Self::Variable(name.to_string()));
        }
        match s {
            "body" => Ok(Self::Body),
            "exchangeId" => Ok(Self::ExchangeId),
            other => bail!("unknown operand '{other}'"),
        }
    }
}

impl Operand {
    fn resolve(&self, exchange: &Exchange) -> Option<Value> {
        match self {
            Self::Body => exchange.body().map(|body| match body {
                MessageBody::Value(value) => value,
                MessageBody::Stream(text) => Value::String(text),
                MessageBody::File(path) => Value::String(path.display().to_string()),
            }),
            Self::ExchangeId => Some(Value::String(exchange.exchange_id().to_string())),
            Self::Header(name) => exchange.header(name),
            Self::Property(name) => exchange.property(name),
            Self::Variable(name) => exchange.variable(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
}

// Two-character operators first so "==" is not split as "=", "=".
const COMPARISONS: &[(&str, Comparison)] = &[
    ("==", Comparison::Eq),
    ("!=", Comparison::Ne),
    (">=", Comparison::Ge),
    ("<=", Comparison::Le),
    (">", Comparison::Gt),
    ("<", Comparison::Lt),
    ("contains", Comparison::Contains),
];

fn parse_literal(s: &str) -> Value {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        return Value::String(s[1..s.len() - 1].to_string());
    }
    if s == "true" {
        return Value::Bool(true);
    }
    if s == "false" {
        return Value::Bool(false);
    }
    if let Ok(int) = s.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = s.parse::<f64>() {
        return Value::from(float);
    }
    Value::String(s.to_string())
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// A single-comparison predicate of the `simple` language.
#[derive(Debug, Clone)]
struct SimplePredicate {
    expression: String,
    operand: Operand,
    comparison: Option<(Comparison, Value)>,
}

impl SimplePredicate {
    fn evaluate(&self, actual: Option<Value>) -> bool {
        let Some((comparison, expected)) = &self.comparison else {
            // Bare operand is a truthiness test.
            return match actual {
                None | Some(Value::Null) | Some(Value::Bool(false)) => false,
                Some(Value::String(s)) => !s.is_empty(),
                Some(_) => true,
            };
        };

        let Some(actual) = actual else {
            return *comparison == Comparison::Ne;
        };

        match comparison {
            Comparison::Eq | Comparison::Ne => {
                let equal = match (value_as_number(&actual), value_as_number(expected)) {
                    (Some(a), Some(b)) => a == b,
                    _ => value_as_text(&actual) == value_as_text(expected),
                };
                (*comparison == Comparison::Eq) == equal
            }
            Comparison::Gt | Comparison::Ge | Comparison::Lt | Comparison::Le => {
                match (value_as_number(&actual), value_as_number(expected)) {
                    (Some(a), Some(b)) => match comparison {
                        Comparison::Gt => a > b,
                        Comparison::Ge => a >= b,
                        Comparison::Lt => a < b,
                        Comparison::Le => a <= b,
                        _ => unreachable!(),
                    },
                    _ => false,
                }
            }
            Comparison::Contains => value_as_text(&actual).contains(&value_as_text(expected)),
        }
    }
}

impl Predicate for SimplePredicate {
    fn matches(&self, exchange: &Exchange) -> Result<bool> {
        Ok(self.evaluate(self.operand.resolve(exchange)))
    }

    fn expression(&self) -> &str {
        &self.expression
    }
}

/// Resolver for the built-in `simple` condition language.
///
/// The language covers one comparison per expression:
/// `<operand> [<op> <literal>]`, where the operand is `body`, `exchangeId`,
/// `header:NAME`, `property:NAME` or `variable:NAME`; the operator is one of
/// `==`, `!=`, `>`, `>=`, `<`, `<=`, `contains`; and the literal is a
/// single-quoted string, a number or a boolean. A bare operand tests for a
/// present, non-empty, non-false value. Anything richer belongs to the
/// engine's own expression language behind [`ExpressionResolver`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleExpressionResolver;

impl ExpressionResolver for SimpleExpressionResolver {
    fn create_predicate(&self, language: &str, expression: &str) -> Result<Arc<dyn Predicate>> {
        if language != SIMPLE_LANGUAGE {
            bail!("unsupported condition language '{language}', only '{SIMPLE_LANGUAGE}' is built in");
        }

        let expression = normalize_expression(expression);
        if expression.is_empty() {
            bail!("empty condition expression");
        }

        for (token, comparison) in COMPARISONS {
            let needle = format!(" {token} ");
            if let Some(pos) = expression.find(&needle) {
                let operand = Operand::from_str(expression[..pos].trim())?;
                let literal = parse_literal(&expression[pos + needle.len()..]);
                return Ok(Arc::new(SimplePredicate {
                    expression,
                    operand,
                    comparison: Some((*comparison, literal)),
                }));
            }
        }

        let operand = Operand::from_str(expression.as_str())?;
        Ok(Arc::new(SimplePredicate { expression, operand, comparison: None }))
    }
}

// ---------------------------------------------------------------------------
// Default message dumper
// ---------------------------------------------------------------------------

/// Renders the standard `<message>` XML and `{"message": ...}` JSON
/// documents from an exchange's current state.
///
/// A sub-part that fails to serialize is omitted from the document rather
/// than failing the whole dump.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMessageDumper;

fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn clip(text: String, max_chars: usize) -> (String, bool) {
    if max_chars > 0 && text.chars().count() > max_chars {
        (text.chars().take(max_chars).collect(), true)
    } else {
        (text, false)
    }
}

/// The body rendered as text, or `None` when the options exclude this body
/// kind. The boolean reports whether the text was clipped at the cap.
fn body_text(body: &MessageBody, options: &DumpOptions) -> Option<(String, bool)> {
    let text = match body {
        MessageBody::Value(Value::String(s)) => s.clone(),
        MessageBody::Value(value) => value.to_string(),
        MessageBody::Stream(text) => {
            if !options.body_include_streams {
                return None;
            }
            text.clone()
        }
        MessageBody::File(path) => {
            if !options.body_include_files {
                return None;
            }
            path.display().to_string()
        }
    };
    Some(clip(text, options.body_max_chars))
}

fn body_kind(body: &MessageBody) -> &'static str {
    match body {
        MessageBody::Value(_) => "value",
        MessageBody::Stream(_) => "stream",
        MessageBody::File(_) => "file",
    }
}

impl DefaultMessageDumper {
    fn write_xml_map(
        out: &mut String,
        pad: &str,
        section: &str,
        entry: &str,
        entries: &std::collections::BTreeMap<String, Value>,
    ) {
        if entries.is_empty() {
            return;
        }
        out.push_str(&format!("{pad}<{section}>\n"));
        for (key, value) in entries {
            // A value that cannot be rendered is skipped, not fatal.
            let Ok(rendered) = serde_json::to_string(value) else {
                debug!(key = %key, "skipping unrenderable {entry} in XML dump");
                continue;
            };
            let rendered = rendered.trim_matches('"').to_string();
            out.push_str(&format!(
                "{pad}{pad}<{entry} key=\"{}\">{}</{entry}>\n",
                xml_escape(key),
                xml_escape(&rendered)
            ));
        }
        out.push_str(&format!("{pad}</{section}>\n"));
    }

    fn json_map(entries: &std::collections::BTreeMap<String, Value>) -> Value {
        Value::Object(entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

impl MessageDumper for DefaultMessageDumper {
    fn dump_as_xml(&self, exchange: &Exchange, options: &DumpOptions) -> Result<String> {
        let pad = " ".repeat(options.indent);
        let mut out = String::new();
        out.push_str(&format!(
            "<message exchangeId=\"{}\">\n",
            xml_escape(exchange.exchange_id())
        ));

        Self::write_xml_map(&mut out, &pad, "headers", "header", &exchange.headers());
        if options.include_exchange_properties {
            Self::write_xml_map(
                &mut out,
                &pad,
                "exchangeProperties",
                "exchangeProperty",
                &exchange.properties(),
            );
        }
        if options.include_exchange_variables {
            Self::write_xml_map(
                &mut out,
                &pad,
                "exchangeVariables",
                "exchangeVariable",
                &exchange.variables(),
            );
        }

        if let Some(body) = exchange.body() {
            match body_text(&body, options) {
                Some((text, clipped)) => {
                    let clipped_attr = if clipped { " clipped=\"true\"" } else { "" };
                    out.push_str(&format!(
                        "{pad}<body type=\"{}\"{clipped_attr}>{}</body>\n",
                        body_kind(&body),
                        xml_escape(&text)
                    ));
                }
                None => {
                    out.push_str(&format!(
                        "{pad}<body type=\"{}\" omitted=\"true\"/>\n",
                        body_kind(&body)
                    ));
                }
            }
        }

        if options.include_exception {
            if let Some(exception) = exchange.exception() {
                out.push_str(&format!("{pad}<exception>{}</exception>\n", xml_escape(&exception)));
            }
        }

        out.push_str("</message>");
        Ok(out)
    }

    fn dump_as_json(&self, exchange: &Exchange, options: &DumpOptions) -> Result<String> {
        let mut message = serde_json::Map::new();
        message
            .insert("exchangeId".to_string(), Value::String(exchange.exchange_id().to_string()));

        let headers = exchange.headers();
        if !headers.is_empty() {
            message.insert("headers".to_string(), Self::json_map(&headers));
        }
        if options.include_exchange_properties {
            let properties = exchange.properties();
            if !properties.is_empty() {
                message.insert("exchangeProperties".to_string(), Self::json_map(&properties));
            }
        }
        if options.include_exchange_variables {
            let variables = exchange.variables();
            if !variables.is_empty() {
                message.insert("exchangeVariables".to_string(), Self::json_map(&variables));
            }
        }

        if let Some(body) = exchange.body() {
            let rendered = match (&body, body_text(&body, options)) {
                // A plain value body keeps its structure unless it was clipped.
                (MessageBody::Value(value), Some((_, false))) => Some(value.clone()),
                (_, Some((text, _))) => Some(Value::String(text)),
                (_, None) => None,
            };
            match rendered {
                Some(value) => {
                    message.insert("body".to_string(), value);
                }
                None => {
                    message.insert(
                        "bodyOmitted".to_string(),
                        Value::String(body_kind(&body).to_string()),
                    );
                }
            }
        }

        if options.include_exception {
            if let Some(exception) = exchange.exception() {
                message.insert("exception".to_string(), Value::String(exception));
            }
        }

        let document = Value::Object(
            [("message".to_string(), Value::Object(message))].into_iter().collect(),
        );
        let dumped = if options.indent > 0 {
            serde_json::to_string_pretty(&document)?
        } else {
            serde_json::to_string(&document)?
        };
        Ok(dumped)
    }
}

// ---------------------------------------------------------------------------
// Default type converter
// ---------------------------------------------------------------------------

/// Coercions between the JSON scalar types, addressed by target type name:
/// `string`/`text`, `int`/`integer`/`long`, `float`/`double`,
/// `bool`/`boolean`, and `json` (parses a string as a JSON document).
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTypeConverter;

impl TypeConverter for DefaultTypeConverter {
    fn convert_to(
        &self,
        target_type: &str,
        _exchange: &Exchange,
        value: Value,
    ) -> std::result::Result<Value, NoTypeConversion> {
        match target_type {
            "string" | "text" => Ok(Value::String(value_as_text(&value))),
            "int" | "integer" | "long" => match &value {
                Value::Number(n) if n.as_i64().is_some() => Ok(value),
                Value::Number(n) => n
                    .as_f64()
                    .map(|f| Value::from(f as i64))
                    .ok_or_else(|| NoTypeConversion::new(target_type, &value)),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| NoTypeConversion::new(target_type, &value)),
                Value::Bool(b) => Ok(Value::from(*b as i64)),
                _ => Err(NoTypeConversion::new(target_type, &value)),
            },
            "float" | "double" => value_as_number(&value)
                .map(Value::from)
                .ok_or_else(|| NoTypeConversion::new(target_type, &value)),
            "bool" | "boolean" => match &value {
                Value::Bool(_) => Ok(value),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
                _ => Err(NoTypeConversion::new(target_type, &value)),
            },
            "json" => match &value {
                Value::String(s) => serde_json::from_str(s)
                    .map_err(|_| NoTypeConversion::new(target_type, &value)),
                _ => Ok(value),
            },
            _ => Err(NoTypeConversion::new(target_type, &value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exchange() -> Exchange {
        let exchange = Exchange::new("ex-1", "route-a");
        exchange.set_body(Some("hello world".into()));
        exchange.set_header("priority", json!("high"));
        exchange.set_header("attempts", json!(3));
        exchange.set_property("region", json!("eu"));
        exchange.set_variable("checked", json!(true));
        exchange
    }

    fn predicate(expr: &str) -> Arc<dyn Predicate> {
        SimpleExpressionResolver.create_predicate(SIMPLE_LANGUAGE, expr).unwrap()
    }

    #[test]
    fn test_simple_language_comparisons() {
        let exchange = exchange();

        assert!(predicate("header:priority == 'high'").matches(&exchange).unwrap());
        assert!(!predicate("header:priority == 'low'").matches(&exchange).unwrap());
        assert!(predicate("header:priority != 'low'").matches(&exchange).unwrap());
        assert!(predicate("header:attempts > 2").matches(&exchange).unwrap());
        assert!(predicate("header:attempts >= 3").matches(&exchange).unwrap());
        assert!(!predicate("header:attempts < 3").matches(&exchange).unwrap());
        assert!(predicate("body contains 'world'").matches(&exchange).unwrap());
        assert!(predicate("property:region == 'eu'").matches(&exchange).unwrap());
        assert!(predicate("variable:checked == true").matches(&exchange).unwrap());
        assert!(predicate("exchangeId == 'ex-1'").matches(&exchange).unwrap());
    }

    #[test]
    fn test_simple_language_missing_operand() {
        let exchange = exchange();

        assert!(!predicate("header:missing == 'x'").matches(&exchange).unwrap());
        assert!(predicate("header:missing != 'x'").matches(&exchange).unwrap());
        assert!(!predicate("header:missing > 1").matches(&exchange).unwrap());
        assert!(!predicate("header:missing").matches(&exchange).unwrap());
    }

    #[test]
    fn test_simple_language_truthiness() {
        let exchange = exchange();
        assert!(predicate("header:priority").matches(&exchange).unwrap());
        assert!(predicate("body").matches(&exchange).unwrap());

        exchange.set_header("empty", json!(""));
        assert!(!predicate("header:empty").matches(&exchange).unwrap());
        exchange.set_header("off", json!(false));
        assert!(!predicate("header:off").matches(&exchange).unwrap());
    }

    #[test]
    fn test_simple_language_numeric_string_comparison() {
        let exchange = Exchange::new("ex-2", "route-a");
        exchange.set_header("count", json!("42"));
        assert!(predicate("header:count == 42").matches(&exchange).unwrap());
        assert!(predicate("header:count > 41").matches(&exchange).unwrap());
    }

    #[test]
    fn test_simple_language_rejects_bad_input() {
        let resolver = SimpleExpressionResolver;
        assert!(resolver.create_predicate("xpath", "//a").is_err());
        assert!(resolver.create_predicate(SIMPLE_LANGUAGE, "").is_err());
        assert!(resolver.create_predicate(SIMPLE_LANGUAGE, "unknown:x == 1").is_err());
    }

    #[test]
    fn test_predicate_reports_expression() {
        let p = predicate("header:priority   ==   'high'");
        assert_eq!(p.expression(), "header:priority == 'high'");
    }

    #[test]
    fn test_xml_dump_contains_sections() {
        let exchange = exchange();
        let xml = DefaultMessageDumper.dump_as_xml(&exchange, &DumpOptions::default()).unwrap();

        assert!(xml.starts_with("<message exchangeId=\"ex-1\">"));
        assert!(xml.contains("<header key=\"priority\">high</header>"));
        assert!(xml.contains("<exchangeProperty key=\"region\">eu</exchangeProperty>"));
        assert!(xml.contains("<exchangeVariable key=\"checked\">true</exchangeVariable>"));
        assert!(xml.contains("<body type=\"value\">hello world</body>"));
        assert!(xml.ends_with("</message>"));
    }

    #[test]
    fn test_xml_dump_escapes_markup() {
        let exchange = Exchange::new("ex-3", "route-a");
        exchange.set_body(Some("<a & b>".into()));
        let xml = DefaultMessageDumper.dump_as_xml(&exchange, &DumpOptions::default()).unwrap();
        assert!(xml.contains("&lt;a &amp; b&gt;"));
    }

    #[test]
    fn test_dump_honors_inclusion_flags() {
        let exchange = exchange();
        exchange.set_exception(Some("boom".to_string()));
        let options = DumpOptions {
            include_exchange_properties: false,
            include_exchange_variables: false,
            include_exception: false,
            ..Default::default()
        };

        let xml = DefaultMessageDumper.dump_as_xml(&exchange, &options).unwrap();
        assert!(!xml.contains("exchangeProperty"));
        assert!(!xml.contains("exchangeVariable"));
        assert!(!xml.contains("exception"));

        let json = DefaultMessageDumper.dump_as_json(&exchange, &options).unwrap();
        assert!(!json.contains("exchangeProperties"));
        assert!(!json.contains("exception"));
    }

    #[test]
    fn test_dump_stream_body_excluded_by_default() {
        let exchange = Exchange::new("ex-4", "route-a");
        exchange.set_body(Some(MessageBody::Stream("streamed".to_string())));

        let xml = DefaultMessageDumper.dump_as_xml(&exchange, &DumpOptions::default()).unwrap();
        assert!(xml.contains("<body type=\"stream\" omitted=\"true\"/>"));

        let options = DumpOptions { body_include_streams: true, ..Default::default() };
        let xml = DefaultMessageDumper.dump_as_xml(&exchange, &options).unwrap();
        assert!(xml.contains("<body type=\"stream\">streamed</body>"));
    }

    #[test]
    fn test_dump_clips_body_at_cap() {
        let exchange = Exchange::new("ex-5", "route-a");
        exchange.set_body(Some("abcdefghij".into()));
        let options = DumpOptions { body_max_chars: 4, ..Default::default() };

        let xml = DefaultMessageDumper.dump_as_xml(&exchange, &options).unwrap();
        assert!(xml.contains("<body type=\"value\" clipped=\"true\">abcd</body>"));

        let json = DefaultMessageDumper.dump_as_json(&exchange, &options).unwrap();
        assert!(json.contains("\"abcd\""));
    }

    #[test]
    fn test_json_dump_shape() {
        let exchange = exchange();
        let dumped = DefaultMessageDumper.dump_as_json(&exchange, &DumpOptions::default()).unwrap();
        let parsed: Value = serde_json::from_str(&dumped).unwrap();

        assert_eq!(parsed["message"]["exchangeId"], json!("ex-1"));
        assert_eq!(parsed["message"]["headers"]["priority"], json!("high"));
        assert_eq!(parsed["message"]["body"], json!("hello world"));
    }

    #[test]
    fn test_type_converter_scalars() {
        let exchange = Exchange::new("ex-6", "route-a");
        let converter = DefaultTypeConverter;

        assert_eq!(converter.convert_to("string", &exchange, json!(42)).unwrap(), json!("42"));
        assert_eq!(converter.convert_to("int", &exchange, json!("42")).unwrap(), json!(42));
        assert_eq!(converter.convert_to("integer", &exchange, json!(true)).unwrap(), json!(1));
        assert_eq!(
            converter.convert_to("bool", &exchange, json!("TRUE")).unwrap(),
            json!(true)
        );
        assert_eq!(
            converter.convert_to("json", &exchange, json!("{\"a\":1}")).unwrap(),
            json!({"a": 1})
        );
    }

    #[test]
    fn test_type_converter_failures() {
        let exchange = Exchange::new("ex-7", "route-a");
        let converter = DefaultTypeConverter;

        let err = converter.convert_to("int", &exchange, json!("not-a-number")).unwrap_err();
        assert_eq!(err.target(), "int");
        assert!(converter.convert_to("bool", &exchange, json!(3)).is_err());
        assert!(converter.convert_to("uuid", &exchange, json!("x")).is_err());
        assert!(converter.convert_to("json", &exchange, json!("{broken")).is_err());
    }
}
