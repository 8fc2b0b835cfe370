//! Request matching implementations.
//!
//! A [`Matcher`] inspects one value selected from a request and reports one of
//! three outcomes: matched, not matched, or failed to evaluate. Matchers of a
//! mock are combined by conjunction; disjunction is expressed with [`AnyOf`],
//! which wraps other matchers. New matcher types can be added by implementing
//! the trait without touching the store or dispatcher.

use std::hash::Hasher;
use std::sync::Arc;

use fnv::{FnvHashMap, FnvHasher};
use regex::Regex;

use crate::error::ConfigError;
use crate::value::Value;

/// Result of evaluating a matcher against a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched,
    NotMatched,
    /// The matcher could not evaluate the value. This is not a "no match":
    /// it disqualifies the owning mock and is reported as a diagnostic.
    Failed(String),
}

impl MatchOutcome {
    /// Convert a plain predicate result.
    pub fn from_bool(matched: bool) -> Self {
        if matched {
            Self::Matched
        } else {
            Self::NotMatched
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched)
    }
}

/// Scratch space shared by all matchers evaluated for one request against one mock.
///
/// Matchers may record intermediate results here so that later matchers in
/// the same chain can reuse them.
#[derive(Debug, Default, Clone)]
pub struct Params {
    values: FnvHashMap<String, Value>,
}

impl Params {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Matcher trait for extensible request matching.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Evaluate the matcher.
    ///
    /// # Parameters
    ///
    /// - `actual` - Value selected from the request, `None` when absent
    /// - `params` - Shared evaluation context for the current mock
    ///
    /// # Returns
    ///
    /// Returns the three-state outcome of the evaluation.
    fn evaluate(&self, actual: Option<&Value>, params: &mut Params) -> MatchOutcome;

    /// Human readable description used in mismatch diagnostics.
    fn describe(&self) -> String;
}

/// Deep equality against an expected value.
#[derive(Debug, Clone)]
pub struct EqualTo {
    pub expected: Value,
}

impl EqualTo {
    /// Create a new equality matcher.
    ///
    /// # Parameters
    ///
    /// - `expected` - Value the request part must equal
    ///
    /// # Returns
    ///
    /// Returns a new `EqualTo` instance.
    pub fn new(expected: impl Into<Value>) -> Self {
        Self { expected: expected.into() }
    }
}

impl Matcher for EqualTo {
    fn evaluate(&self, actual: Option<&Value>, _params: &mut Params) -> MatchOutcome {
        match actual {
            Some(actual) => MatchOutcome::from_bool(self.expected.deep_eq(actual)),
            None => MatchOutcome::NotMatched,
        }
    }

    fn describe(&self) -> String {
        format!("equal to {}", self.expected)
    }
}

/// Case-insensitive text equality.
#[derive(Debug, Clone)]
pub struct EqualToIgnoreCase {
    pub expected: String,
}

impl EqualToIgnoreCase {
    pub fn new(expected: impl Into<String>) -> Self {
        Self { expected: expected.into() }
    }
}

impl Matcher for EqualToIgnoreCase {
    fn evaluate(&self, actual: Option<&Value>, _params: &mut Params) -> MatchOutcome {
        let Some(actual) = actual else {
            return MatchOutcome::NotMatched;
        };
        match actual.as_text() {
            Ok(text) => MatchOutcome::from_bool(text.eq_ignore_ascii_case(&self.expected)),
            Err(_) => MatchOutcome::NotMatched,
        }
    }

    fn describe(&self) -> String {
        format!("equal to {:?} ignoring case", self.expected)
    }
}

/// Substring matcher. Lists match when any item contains the needle.
#[derive(Debug, Clone)]
pub struct Contains {
    pub needle: String,
}

impl Contains {
    pub fn new(needle: impl Into<String>) -> Self {
        Self { needle: needle.into() }
    }
}

impl Matcher for Contains {
    fn evaluate(&self, actual: Option<&Value>, _params: &mut Params) -> MatchOutcome {
        let Some(actual) = actual else {
            return MatchOutcome::NotMatched;
        };
        for item in actual.items() {
            match item.as_text() {
                Ok(text) if text.contains(self.needle.as_str()) => return MatchOutcome::Matched,
                Ok(_) => {}
                Err(e) => return MatchOutcome::Failed(e),
            }
        }
        MatchOutcome::NotMatched
    }

    fn describe(&self) -> String {
        format!("containing {:?}", self.needle)
    }
}

/// Regex matcher for pattern-based value matching.
#[derive(Debug)]
pub struct MatchesRegex {
    pub pattern: Regex,
}

impl MatchesRegex {
    /// Compile a regex matcher.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPattern` if the pattern does not compile.
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        Ok(Self { pattern: compile(pattern)? })
    }
}

impl Matcher for MatchesRegex {
    fn evaluate(&self, actual: Option<&Value>, _params: &mut Params) -> MatchOutcome {
        let Some(actual) = actual else {
            return MatchOutcome::NotMatched;
        };
        for item in actual.items() {
            match item.as_text() {
                Ok(text) if self.pattern.is_match(&text) => return MatchOutcome::Matched,
                Ok(_) => {}
                Err(e) => return MatchOutcome::Failed(e),
            }
        }
        MatchOutcome::NotMatched
    }

    fn describe(&self) -> String {
        format!("matching /{}/", self.pattern.as_str())
    }
}

/// Matcher for the request path, either exact or by regular expression.
#[derive(Debug)]
pub enum PathMatcher {
    Exact(String),
    Pattern(Regex),
}

impl PathMatcher {
    pub fn exact(path: impl Into<String>) -> Self {
        Self::Exact(path.into())
    }

    /// Compile a path pattern.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPattern` if the pattern does not compile.
    pub fn pattern(pattern: &str) -> Result<Self, ConfigError> {
        Ok(Self::Pattern(compile(pattern)?))
    }
}

impl Matcher for PathMatcher {
    fn evaluate(&self, actual: Option<&Value>, _params: &mut Params) -> MatchOutcome {
        let Some(Ok(path)) = actual.map(Value::as_text) else {
            return MatchOutcome::NotMatched;
        };
        match self {
            Self::Exact(expected) => MatchOutcome::from_bool(path == expected.as_str()),
            Self::Pattern(pattern) => MatchOutcome::from_bool(pattern.is_match(&path)),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Exact(expected) => format!("equal to {expected:?}"),
            Self::Pattern(pattern) => format!("matching /{}/", pattern.as_str()),
        }
    }
}

/// Structural JSON equality.
///
/// The parsed document is stored in [`Params`] keyed by a fingerprint of the
/// raw bytes, so several JSON matchers on the same body parse it only once.
#[derive(Debug, Clone)]
pub struct JsonEqualTo {
    pub expected: serde_json::Value,
}

impl JsonEqualTo {
    pub fn new(expected: serde_json::Value) -> Self {
        Self { expected }
    }

    fn cache_key(raw: &[u8]) -> String {
        let mut hasher = FnvHasher::default();
        hasher.write(raw);
        format!("json.{:016x}", hasher.finish())
    }
}

impl Matcher for JsonEqualTo {
    fn evaluate(&self, actual: Option<&Value>, params: &mut Params) -> MatchOutcome {
        let raw = match actual {
            None => return MatchOutcome::NotMatched,
            Some(Value::Json(doc)) => return MatchOutcome::from_bool(doc == &self.expected),
            Some(value) => match value.as_bytes() {
                Some(raw) => raw,
                None => return MatchOutcome::Failed(format!("{value} is not a JSON document")),
            },
        };
        if raw.is_empty() {
            return MatchOutcome::NotMatched;
        }

        let key = Self::cache_key(raw);
        if let Some(Value::Json(doc)) = params.get(&key) {
            return MatchOutcome::from_bool(doc == &self.expected);
        }

        match serde_json::from_slice::<serde_json::Value>(raw) {
            Ok(doc) => {
                let matched = doc == self.expected;
                params.insert(key, Value::Json(doc));
                MatchOutcome::from_bool(matched)
            }
            Err(e) => MatchOutcome::Failed(format!("body is not valid JSON: {e}")),
        }
    }

    fn describe(&self) -> String {
        format!("JSON equal to {}", self.expected)
    }
}

/// Matches whenever the selected value is present.
#[derive(Debug, Clone, Copy, Default)]
pub struct Present;

impl Matcher for Present {
    fn evaluate(&self, actual: Option<&Value>, _params: &mut Params) -> MatchOutcome {
        MatchOutcome::from_bool(actual.is_some())
    }

    fn describe(&self) -> String {
        "present".to_string()
    }
}

/// Disjunction over sub-matchers.
///
/// Matches as soon as one sub-matcher matches. A sub-matcher failure is only
/// reported when no other sub-matcher matched.
#[derive(Debug, Clone)]
pub struct AnyOf {
    pub matchers: Vec<Arc<dyn Matcher>>,
}

impl AnyOf {
    pub fn new(matchers: Vec<Arc<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AnyOf {
    fn evaluate(&self, actual: Option<&Value>, params: &mut Params) -> MatchOutcome {
        let mut failure = None;
        for matcher in &self.matchers {
            match matcher.evaluate(actual, params) {
                MatchOutcome::Matched => return MatchOutcome::Matched,
                MatchOutcome::NotMatched => {}
                MatchOutcome::Failed(detail) => {
                    failure.get_or_insert(detail);
                }
            }
        }
        failure.map_or(MatchOutcome::NotMatched, MatchOutcome::Failed)
    }

    fn describe(&self) -> String {
        let parts: Vec<String> = self.matchers.iter().map(|m| m.describe()).collect();
        format!("any of ({})", parts.join(" | "))
    }
}

/// Negation of a matcher. Failures propagate unchanged.
#[derive(Debug, Clone)]
pub struct Not {
    pub inner: Arc<dyn Matcher>,
}

impl Not {
    pub fn new(inner: impl Matcher + 'static) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

impl Matcher for Not {
    fn evaluate(&self, actual: Option<&Value>, params: &mut Params) -> MatchOutcome {
        match self.inner.evaluate(actual, params) {
            MatchOutcome::Matched => MatchOutcome::NotMatched,
            MatchOutcome::NotMatched => MatchOutcome::Matched,
            failed @ MatchOutcome::Failed(_) => failed,
        }
    }

    fn describe(&self) -> String {
        format!("not {}", self.inner.describe())
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern)
        .map_err(|source| ConfigError::InvalidPattern { pattern: pattern.to_string(), source })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    /// Test an expected string compared with an absent value is a plain mismatch.
    #[test]
    fn test_equal_to_absent_value() {
        let matcher = EqualTo::new("test");
        let outcome = matcher.evaluate(None, &mut Params::default());
        assert_eq!(outcome, MatchOutcome::NotMatched);
    }

    /// Test byte arrays compare element-wise, including empty ones.
    #[test]
    fn test_equal_to_bytes() {
        let value = Value::from(&b"test"[..]);
        let matcher = EqualTo::new(value.clone());
        assert!(matcher.evaluate(Some(&value), &mut Params::default()).is_matched());

        let empty = EqualTo::new(Vec::new());
        let actual = Value::Bytes(Bytes::new());
        assert!(empty.evaluate(Some(&actual), &mut Params::default()).is_matched());

        let longer = Value::from(&b"tests"[..]);
        let outcome = matcher.evaluate(Some(&longer), &mut Params::default());
        assert_eq!(outcome, MatchOutcome::NotMatched);
    }

    /// Test regex and contains matchers, including failure on non UTF-8 input.
    #[test]
    fn test_text_matchers() {
        let regex = MatchesRegex::new(r"^/users/\d+$").expect("valid regex");
        let path = Value::from("/users/42");
        assert!(regex.evaluate(Some(&path), &mut Params::default()).is_matched());

        let binary = Value::from(vec![0xff, 0x00]);
        assert!(matches!(
            regex.evaluate(Some(&binary), &mut Params::default()),
            MatchOutcome::Failed(_)
        ));

        let contains = Contains::new("json");
        let header = Value::List(vec![Value::from("text/plain"), Value::from("application/json")]);
        assert!(contains.evaluate(Some(&header), &mut Params::default()).is_matched());

        assert!(MatchesRegex::new("(").is_err());
    }

    /// Test exact and pattern path matching.
    #[test]
    fn test_path_matcher() {
        let root = Value::from("/test");
        let nested = Value::from("/test/1");

        let exact = PathMatcher::exact("/test");
        assert!(exact.evaluate(Some(&root), &mut Params::default()).is_matched());
        assert!(!exact.evaluate(Some(&nested), &mut Params::default()).is_matched());

        let pattern = PathMatcher::pattern(r"^/test/\w+$").expect("valid regex");
        assert!(pattern.evaluate(Some(&nested), &mut Params::default()).is_matched());
        assert!(!pattern.evaluate(Some(&root), &mut Params::default()).is_matched());
    }

    /// Test JSON bodies are parsed once and shared through params.
    #[test]
    fn test_json_equal_to_caches_document() {
        let body = Value::from(&br#"{"name": "mock", "tags": [1, 2]}"#[..]);
        let mut params = Params::default();

        let matcher = JsonEqualTo::new(serde_json::json!({"tags": [1, 2], "name": "mock"}));
        assert!(matcher.evaluate(Some(&body), &mut params).is_matched());
        assert_eq!(params.len(), 1);
        assert!(params.contains(&JsonEqualTo::cache_key(body.as_bytes().expect("raw body"))));

        let other = JsonEqualTo::new(serde_json::json!({"name": "other"}));
        assert_eq!(other.evaluate(Some(&body), &mut params), MatchOutcome::NotMatched);
        assert_eq!(params.len(), 1);

        let broken = Value::from("{not json");
        assert!(matches!(
            matcher.evaluate(Some(&broken), &mut Params::default()),
            MatchOutcome::Failed(_)
        ));
    }

    /// Test disjunction and negation composites.
    #[test]
    fn test_composites() {
        let any = AnyOf::new(vec![Arc::new(EqualTo::new("GET")), Arc::new(EqualTo::new("HEAD"))]);
        assert!(any.evaluate(Some(&Value::from("HEAD")), &mut Params::default()).is_matched());
        assert!(!any.evaluate(Some(&Value::from("POST")), &mut Params::default()).is_matched());

        let regex = MatchesRegex::new("^a").expect("valid regex");
        let any = AnyOf::new(vec![Arc::new(regex), Arc::new(EqualTo::new(vec![0xff]))]);
        assert!(any.evaluate(Some(&Value::from(vec![0xff])), &mut Params::default()).is_matched());

        let not = Not::new(Present);
        assert!(not.evaluate(None, &mut Params::default()).is_matched());
        assert!(!not.evaluate(Some(&Value::from("x")), &mut Params::default()).is_matched());
    }
}
