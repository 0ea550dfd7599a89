//! `http.re`: regular expression matching and substitution
//!
//! Compiled patterns are cached in a [`RegexScope`] that lives for exactly
//! one invocation. The scope is opened right before the script runs and
//! cleared when it finishes, whatever the outcome.

use super::capabilities::{Capability, Namespace};
use super::HttpApi;
use parking_lot::Mutex;
use regex::{Captures, Regex, RegexBuilder};
use rhai::{Array, Dynamic, EvalAltResult, Map};
use std::collections::HashMap;
use std::sync::Arc;

type RegexResult<T> = Result<T, Box<EvalAltResult>>;

#[derive(Debug, Default)]
struct ScopeState {
    open: bool,
    compiled: HashMap<(String, String), Regex>,
}

/// Per-invocation compiled pattern cache
#[derive(Debug, Clone, Default)]
pub struct RegexScope {
    state: Arc<Mutex<ScopeState>>,
}

impl RegexScope {
    /// Create a closed scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the scope; it closes when the returned guard drops
    pub fn open(&self) -> RegexScopeGuard {
        self.state.lock().open = true;
        RegexScopeGuard {
            scope: self.clone(),
        }
    }

    /// Whether the scope is open
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Number of patterns compiled in this scope
    pub fn compiled(&self) -> usize {
        self.state.lock().compiled.len()
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.open = false;
        state.compiled.clear();
    }

    fn regex(&self, pattern: &str, flags: &str) -> RegexResult<Regex> {
        let mut state = self.state.lock();
        if !state.open {
            return Err("regex used outside of a running header filter".into());
        }
        let key = (pattern.to_string(), flags.to_string());
        if let Some(re) = state.compiled.get(&key) {
            return Ok(re.clone());
        }
        let re = compile(pattern, flags)?;
        state.compiled.insert(key, re.clone());
        Ok(re)
    }
}

/// Closes a [`RegexScope`] on drop
#[derive(Debug)]
pub struct RegexScopeGuard {
    scope: RegexScope,
}

impl Drop for RegexScopeGuard {
    fn drop(&mut self) {
        self.scope.close();
    }
}

/// Compile `pattern` with option letters
///
/// `i` case-insensitive, `m` multi-line, `s` dot matches newline, `x`
/// extended, `a` anchored at the subject start. `u`, `o`, `j` and `d` are
/// accepted and ignored.
fn compile(pattern: &str, flags: &str) -> RegexResult<Regex> {
    let source = if flags.contains('a') {
        format!(r"\A(?:{pattern})")
    } else {
        pattern.to_string()
    };

    let mut builder = RegexBuilder::new(&source);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            'a' | 'u' | 'o' | 'j' | 'd' => {}
            other => return Err(format!("unknown regex option '{other}'").into()),
        }
    }

    builder
        .build()
        .map_err(|e| format!("failed to compile regex \"{pattern}\": {e}").into())
}

/// Captures as a map keyed by group index and name; unmatched groups are `()`
fn captures_map(re: &Regex, caps: &Captures<'_>) -> Map {
    let mut map = Map::new();
    for (i, name) in re.capture_names().enumerate() {
        let value = caps
            .get(i)
            .map_or(Dynamic::UNIT, |m| m.as_str().to_string().into());
        if let Some(name) = name {
            map.insert(name.into(), value.clone());
        }
        map.insert(i.to_string().into(), value);
    }
    map
}

/// Regex functions bound to the invocation's [`RegexScope`]
#[derive(Debug, Clone)]
pub struct RegexApi {
    scope: RegexScope,
}

impl RegexApi {
    pub(crate) fn new(scope: RegexScope) -> Self {
        Self { scope }
    }

    /// First match as a capture map, `()` when nothing matches
    pub fn find(&self, subject: &str, pattern: &str, flags: &str) -> RegexResult<Dynamic> {
        let re = self.scope.regex(pattern, flags)?;
        Ok(re
            .captures(subject)
            .map_or(Dynamic::UNIT, |caps| Dynamic::from_map(captures_map(&re, &caps))))
    }

    /// Every match as an array of capture maps
    pub fn find_all(&self, subject: &str, pattern: &str, flags: &str) -> RegexResult<Array> {
        let re = self.scope.regex(pattern, flags)?;
        Ok(re
            .captures_iter(subject)
            .map(|caps| Dynamic::from_map(captures_map(&re, &caps)))
            .collect())
    }

    /// Replace the first match; `$1` and `${name}` expand captures
    pub fn sub(&self, subject: &str, pattern: &str, replace: &str, flags: &str) -> RegexResult<String> {
        let re = self.scope.regex(pattern, flags)?;
        Ok(re.replace(subject, replace).into_owned())
    }

    /// Replace every match
    pub fn gsub(&self, subject: &str, pattern: &str, replace: &str, flags: &str) -> RegexResult<String> {
        let re = self.scope.regex(pattern, flags)?;
        Ok(re.replace_all(subject, replace).into_owned())
    }
}

pub(crate) fn capabilities() -> Vec<Capability> {
    vec![
        Capability::new("re", Namespace::Http, |engine| {
            engine
                .register_type_with_name::<RegexApi>("RegexApi")
                .register_get("re", |api: &mut HttpApi| api.re());
        }),
        Capability::new("find", Namespace::Re, |engine| {
            engine
                .register_fn("find", |re: &mut RegexApi, s: &str, p: &str| re.find(s, p, ""))
                .register_fn("find", |re: &mut RegexApi, s: &str, p: &str, f: &str| {
                    re.find(s, p, f)
                });
        }),
        Capability::new("find_all", Namespace::Re, |engine| {
            engine
                .register_fn("find_all", |re: &mut RegexApi, s: &str, p: &str| {
                    re.find_all(s, p, "")
                })
                .register_fn("find_all", |re: &mut RegexApi, s: &str, p: &str, f: &str| {
                    re.find_all(s, p, f)
                });
        }),
        Capability::new("sub", Namespace::Re, |engine| {
            engine
                .register_fn("sub", |re: &mut RegexApi, s: &str, p: &str, r: &str| {
                    re.sub(s, p, r, "")
                })
                .register_fn(
                    "sub",
                    |re: &mut RegexApi, s: &str, p: &str, r: &str, f: &str| re.sub(s, p, r, f),
                );
        }),
        Capability::new("gsub", Namespace::Re, |engine| {
            engine
                .register_fn("gsub", |re: &mut RegexApi, s: &str, p: &str, r: &str| {
                    re.gsub(s, p, r, "")
                })
                .register_fn(
                    "gsub",
                    |re: &mut RegexApi, s: &str, p: &str, r: &str, f: &str| re.gsub(s, p, r, f),
                );
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_with_named_groups() {
        let scope = RegexScope::new();
        let _open = scope.open();
        let api = RegexApi::new(scope.clone());

        let m = api
            .find("hello 1234", r"(?P<word>[a-z]+) (\d+)", "")
            .unwrap()
            .cast::<Map>();
        assert_eq!(m["0"].clone().into_string().unwrap(), "hello 1234");
        assert_eq!(m["word"].clone().into_string().unwrap(), "hello");
        assert_eq!(m["2"].clone().into_string().unwrap(), "1234");

        assert!(api.find("hello", r"\d+", "").unwrap().is_unit());
    }

    #[test]
    fn test_flags() {
        let scope = RegexScope::new();
        let _open = scope.open();
        let api = RegexApi::new(scope);

        assert!(!api.find("HELLO", "hello", "i").unwrap().is_unit());
        assert!(api.find("say hello", "hello", "a").unwrap().is_unit());
        assert!(api.find("x", "x", "q").is_err());
    }

    #[test]
    fn test_substitution() {
        let scope = RegexScope::new();
        let _open = scope.open();
        let api = RegexApi::new(scope);

        assert_eq!(api.sub("a1b2", r"\d", "#", "").unwrap(), "a#b2");
        assert_eq!(api.gsub("a1b2", r"\d", "#", "").unwrap(), "a#b#");
        assert_eq!(
            api.gsub("k=v", r"(\w)=(\w)", "$2=$1", "").unwrap(),
            "v=k"
        );
        assert_eq!(api.find_all("a1b2c3", r"\d", "").unwrap().len(), 3);
    }

    #[test]
    fn test_scope_brackets_compilation() {
        let scope = RegexScope::new();
        let api = RegexApi::new(scope.clone());
        assert!(api.find("x", "x", "").is_err());

        {
            let _open = scope.open();
            api.find("x", "x", "").unwrap();
            api.find("x", "x", "").unwrap();
            assert_eq!(scope.compiled(), 1);
        }
        assert!(!scope.is_open());
        assert_eq!(scope.compiled(), 0);
    }

    #[test]
    fn test_bad_pattern() {
        let scope = RegexScope::new();
        let _open = scope.open();
        let err = RegexApi::new(scope).find("x", "(", "").unwrap_err();
        assert!(err.to_string().contains("failed to compile regex"));
    }
}
