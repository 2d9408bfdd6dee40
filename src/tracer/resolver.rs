use std::collections::HashSet;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::runtime::{ManagedRuntime, NativeRuntime, Overload};
use crate::{Error, Result};

/// Suffix an external hooking framework appends to method names it already
/// replaced. Such methods are never wrapped a second time.
pub const ALREADY_HOOKED_MARKER: &str = "[XposedHooked]";

/// Operator-supplied method selector, one per `--include-method`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TracePattern(String);

impl TracePattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TracePattern {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Matcher for qualified method names (`Class.method` or a native
/// `-[Class selector:]`).
///
/// - `*` matches any run of characters, `?` exactly one.
/// - A pattern without wildcards matches anywhere in the name.
/// - `class!method` is accepted as `class.method`.
/// - A trailing `/i` makes the match case-insensitive.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    regex: Regex,
}

impl PatternMatcher {
    pub fn new(pattern: &TracePattern) -> Result<Self> {
        let raw = pattern.as_str().trim();
        let (body, case_insensitive) = match raw.strip_suffix("/i") {
            Some(body) => (body, true),
            None => (raw, false),
        };
        if body.is_empty() {
            return Err(Error::InvalidPattern {
                pattern: pattern.as_str().to_string(),
                reason: "pattern is empty".to_string(),
            });
        }

        let body = body.replace('!', ".");
        let source = if body.contains(['*', '?']) {
            let mut re = String::from("^");
            for c in body.chars() {
                match c {
                    '*' => re.push_str(".*"),
                    '?' => re.push('.'),
                    other => re.push_str(&regex::escape(&other.to_string())),
                }
            }
            re.push('$');
            re
        } else {
            regex::escape(&body)
        };

        let regex = RegexBuilder::new(&source)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| Error::InvalidPattern {
                pattern: pattern.as_str().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { regex })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// How a resolved method is reached.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchTarget {
    /// Managed method: every overload gets its own wrapper.
    Overloads(Vec<Overload>),
    /// Native method: one implementation address.
    Address { address: u64, symbol: String },
}

/// A resolved interception target.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodMatch {
    pub class_name: String,
    pub method_name: String,
    pub target: MatchTarget,
}

impl MethodMatch {
    pub fn qualified_name(&self) -> String {
        match &self.target {
            MatchTarget::Overloads(_) => format!("{}.{}", self.class_name, self.method_name),
            MatchTarget::Address { symbol, .. } => symbol.clone(),
        }
    }

    pub fn overload_count(&self) -> usize {
        match &self.target {
            MatchTarget::Overloads(overloads) => overloads.len(),
            MatchTarget::Address { .. } => 1,
        }
    }
}

fn compile_all(patterns: &[TracePattern]) -> Vec<(&TracePattern, PatternMatcher)> {
    if patterns.is_empty() {
        tracing::warn!("No include patterns given, nothing will be traced");
    }
    patterns
        .iter()
        .filter_map(|p| match PatternMatcher::new(p) {
            Ok(m) => Some((p, m)),
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        })
        .collect()
}

/// Expand patterns against the loaded classes of a managed runtime.
///
/// Patterns are OR-combined in the order given; a method matched by several
/// patterns is reported once, at its first match.
pub fn resolve_managed<R: ManagedRuntime + ?Sized>(
    runtime: &R,
    patterns: &[TracePattern],
) -> Vec<MethodMatch> {
    let matchers = compile_all(patterns);
    if matchers.is_empty() {
        return Vec::new();
    }

    let classes = runtime.loaded_classes();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut matches = Vec::new();

    for (pattern, matcher) in &matchers {
        let before = matches.len();
        for class in &classes {
            for method in &class.methods {
                if !matcher.matches(&format!("{}.{}", class.name, method)) {
                    continue;
                }
                if method.ends_with(ALREADY_HOOKED_MARKER) {
                    tracing::debug!("Skipping already hooked {}.{}", class.name, method);
                    continue;
                }
                if !seen.insert((class.name.clone(), method.clone())) {
                    continue;
                }
                let overloads = match runtime.overloads(&class.name, method) {
                    Ok(o) if !o.is_empty() => o,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!("Cannot list overloads of {}.{}: {}", class.name, method, e);
                        continue;
                    }
                };
                matches.push(MethodMatch {
                    class_name: class.name.clone(),
                    method_name: method.clone(),
                    target: MatchTarget::Overloads(overloads),
                });
            }
        }
        if matches.len() == before {
            tracing::warn!("Pattern '{}' matched no new methods", pattern.as_str());
        }
    }

    tracing::info!("Resolved {} methods from {} patterns", matches.len(), patterns.len());
    matches
}

/// Expand patterns against the method table of a native-object runtime.
/// Duplicates are detected by implementation address.
pub fn resolve_native<R: NativeRuntime + ?Sized>(
    runtime: &R,
    patterns: &[TracePattern],
) -> Vec<MethodMatch> {
    let matchers = compile_all(patterns);
    if matchers.is_empty() {
        return Vec::new();
    }

    let symbols = runtime.methods();
    let mut seen: HashSet<u64> = HashSet::new();
    let mut matches = Vec::new();

    for (pattern, matcher) in &matchers {
        let before = matches.len();
        for symbol in &symbols {
            if !matcher.matches(&symbol.name) || !seen.insert(symbol.address) {
                continue;
            }
            let (class_name, method_name) = split_native_name(&symbol.name);
            matches.push(MethodMatch {
                class_name,
                method_name,
                target: MatchTarget::Address {
                    address: symbol.address,
                    symbol: symbol.name.clone(),
                },
            });
        }
        if matches.len() == before {
            tracing::warn!("Pattern '{}' matched no new methods", pattern.as_str());
        }
    }

    tracing::info!("Resolved {} methods from {} patterns", matches.len(), patterns.len());
    matches
}

/// `-[NSString stringByAppendingString:]` -> (`NSString`, `stringByAppendingString:`).
fn split_native_name(name: &str) -> (String, String) {
    let inner = name
        .trim_start_matches(['-', '+'])
        .trim_start_matches('[')
        .trim_end_matches(']');
    match inner.split_once(' ') {
        Some((class, selector)) => (class.to_string(), selector.to_string()),
        None => (String::new(), name.to_string()),
    }
}

/// Number of real arguments encoded in a selector: one per `:` segment.
pub fn selector_arity(name: &str) -> usize {
    let (_, selector) = split_native_name(name);
    selector.matches(':').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(p: &str) -> PatternMatcher {
        PatternMatcher::new(&TracePattern::new(p)).unwrap()
    }

    #[test]
    fn test_substring_without_wildcards() {
        let m = matcher("getName");
        assert!(m.matches("com.example.User.getName"));
        assert!(m.matches("com.example.User.getNameLength"));
        assert!(!m.matches("com.example.User.setName"));
    }

    #[test]
    fn test_star_is_anchored() {
        let m = matcher("*.getName");
        assert!(m.matches("com.example.User.getName"));
        assert!(!m.matches("com.example.User.getNameLength"));
    }

    #[test]
    fn test_question_mark() {
        let m = matcher("*.get?");
        assert!(m.matches("a.B.getX"));
        assert!(!m.matches("a.B.getXY"));
    }

    #[test]
    fn test_bang_separator() {
        let m = matcher("com.example.User!get*");
        assert!(m.matches("com.example.User.getName"));
        assert!(!m.matches("com.example.Admin.getName"));
    }

    #[test]
    fn test_case_insensitive_suffix() {
        let m = matcher("*.GETNAME/i");
        assert!(m.matches("a.User.getName"));
        assert!(!matcher("*.GETNAME").matches("a.User.getName"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let m = matcher("-[NSString *]");
        assert!(m.matches("-[NSString length]"));
        assert!(!m.matches("+[NSString string]"));
        assert!(!m.matches("-[NSStringX length]"));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let err = PatternMatcher::new(&TracePattern::new("  ")).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
        assert!(PatternMatcher::new(&TracePattern::new("/i")).is_err());
    }

    #[test]
    fn test_split_native_name() {
        assert_eq!(
            split_native_name("-[NSString stringByAppendingString:]"),
            ("NSString".to_string(), "stringByAppendingString:".to_string())
        );
        assert_eq!(
            split_native_name("+[UIColor colorWithRed:green:blue:alpha:]"),
            ("UIColor".to_string(), "colorWithRed:green:blue:alpha:".to_string())
        );
        assert_eq!(split_native_name("objc_msgSend"), (String::new(), "objc_msgSend".to_string()));
    }

    #[test]
    fn test_selector_arity() {
        assert_eq!(selector_arity("-[NSString length]"), 0);
        assert_eq!(selector_arity("-[NSDictionary objectForKey:]"), 1);
        assert_eq!(selector_arity("+[UIColor colorWithRed:green:blue:alpha:]"), 4);
    }

    #[test]
    fn test_pattern_serde_is_plain_string() {
        let p = TracePattern::new("*.getName");
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"*.getName\"");
    }
}
