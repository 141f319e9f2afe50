//! XDG-style variable expansion.
//!
//! Evaluates value expressions of the freedesktop `user-dirs.dirs` form:
//! single- and double-quoted segments, backslash escapes, and recursive
//! `$VAR` substitution. Variable lookup goes through an extended
//! environment that synthesises `EXEC_DIR`, `CWD`, and the `XDG_*`
//! defaults relative to `$HOME` when the variables are unset.

use std::collections::HashMap;

use crate::context;
use crate::fs::native;
use crate::storage::SooBuf;

/// Where variable values come from: the process environment, or a fixed
/// table (hermetic initialisation and tests).
#[derive(Clone)]
pub(crate) enum EnvSource {
    Process,
    /// Hermetic table for controlled initialisation.
    #[allow(dead_code)]
    Fixed(HashMap<String, String>),
}

impl EnvSource {
    pub(crate) fn get(&self, key: &str) -> Option<String> {
        match self {
            EnvSource::Process => std::env::var(key).ok().filter(|v| !v.is_empty()),
            EnvSource::Fixed(map) => map.get(key).cloned().filter(|v| !v.is_empty()),
        }
    }

    pub(crate) fn home(&self) -> Option<String> {
        self.get("HOME")
    }
}

/// Reads an extended environment variable: host variables plus the
/// synthetic `EXEC_DIR`/`CWD` values and XDG defaults.
pub(crate) fn read_env_ext(env: &EnvSource, key: &str) -> Option<String> {
    let home_join = |suffix: &str| {
        env.home()
            .map(|home| native::merge_paths(&[&home, suffix]))
    };
    match key {
        "EXEC_DIR" => env.get("EXEC_DIR").or_else(|| {
            native::exec_path().map(|exe| native::parent_dir(&exe).to_owned())
        }),
        "CWD" => std::env::current_dir()
            .ok()
            .map(|dir| native::from_native(&dir.to_string_lossy()).into_owned()),
        "XDG_DATA_HOME" => env.get(key).or_else(|| home_join(".local/share")),
        "XDG_CONFIG_HOME" => env.get(key).or_else(|| home_join(".config")),
        "XDG_STATE_HOME" => env.get(key).or_else(|| home_join(".local/state")),
        "XDG_CACHE_HOME" => env.get(key).or_else(|| home_join(".cache")),
        "XDG_RUNTIME_DIR" => env.get(key).or_else(runtime_dir_default),
        _ => env.get(key),
    }
}

#[cfg(unix)]
fn runtime_dir_default() -> Option<String> {
    Some(format!("/run/user/{}", unsafe { libc::geteuid() }))
}

#[cfg(not(unix))]
fn runtime_dir_default() -> Option<String> {
    None
}

/// Evaluates an XDG-style value expression against the process
/// environment.
///
/// Quoting follows the `user-dirs.dirs` rules; `$VAR` expands through the
/// extended environment; the result is normalised by stripping trailing
/// slashes.
///
/// # Examples
///
/// ```rust
/// use poolcore::fs::read_variable;
///
/// assert_eq!(read_variable("\"plain/path/\""), "plain/path");
/// ```
pub fn read_variable(expression: &str) -> String {
    expand_value(&EnvSource::Process, expression)
}

pub(crate) fn expand_value(env: &EnvSource, expression: &str) -> String {
    context::perform_temporary(None, |pool| {
        let mut out: SooBuf<u8, 1> = SooBuf::new(pool);
        let mut cursor = Cursor::new(expression.trim());
        while !cursor.is_empty() {
            match cursor.peek() {
                b'"' => read_double_quoted(env, &mut cursor, &mut out),
                b'\'' => read_single_quoted(&mut cursor, &mut out),
                b'$' => read_substitution(env, &mut cursor, &mut out),
                _ => {
                    let chunk = cursor.read_until(|b| matches!(b, b'"' | b'\'' | b'$'));
                    out.append(chunk);
                }
            }
        }
        let expanded = std::str::from_utf8(out.as_slice())
            .unwrap_or_default()
            .trim_end_matches('/');
        expanded.to_owned()
    })
}

fn read_single_quoted(cursor: &mut Cursor<'_>, out: &mut SooBuf<u8, 1>) {
    cursor.bump();
    while !cursor.is_empty() {
        let chunk = cursor.read_until(|b| matches!(b, b'\'' | b'\\'));
        out.append(chunk);
        match cursor.peek_opt() {
            Some(b'\\') => {
                cursor.bump();
                if let Some(escaped) = cursor.bump_opt() {
                    out.push(escaped);
                }
            }
            Some(b'\'') => {
                cursor.bump();
                return;
            }
            _ => return,
        }
    }
}

fn read_double_quoted(env: &EnvSource, cursor: &mut Cursor<'_>, out: &mut SooBuf<u8, 1>) {
    cursor.bump();
    while !cursor.is_empty() {
        let chunk = cursor.read_until(|b| matches!(b, b'"' | b'\\' | b'$' | b'\''));
        out.append(chunk);
        match cursor.peek_opt() {
            Some(b'\\') => {
                cursor.bump();
                if let Some(escaped) = cursor.bump_opt() {
                    out.push(escaped);
                }
            }
            Some(b'$') => read_substitution(env, cursor, out),
            Some(b'\'') => read_single_quoted(cursor, out),
            Some(b'"') => {
                cursor.bump();
                return;
            }
            _ => return,
        }
    }
}

fn read_substitution(env: &EnvSource, cursor: &mut Cursor<'_>, out: &mut SooBuf<u8, 1>) {
    cursor.bump();
    let name = cursor.read_until(|b| {
        matches!(b, b'"' | b'\'' | b'$' | b'/') || b.is_ascii_whitespace()
    });
    if name.is_empty() {
        return;
    }
    if let Ok(name) = std::str::from_utf8(name) {
        if let Some(value) = read_env_ext(env, name) {
            out.append(value.as_bytes());
        }
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self {
        Cursor {
            bytes: s.as_bytes(),
            pos: 0,
        }
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    #[inline]
    fn peek(&self) -> u8 {
        self.bytes[self.pos]
    }

    #[inline]
    fn peek_opt(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    #[inline]
    fn bump(&mut self) {
        self.pos += 1;
    }

    #[inline]
    fn bump_opt(&mut self) -> Option<u8> {
        let byte = self.peek_opt()?;
        self.pos += 1;
        Some(byte)
    }

    fn read_until(&mut self, stop: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.pos;
        while let Some(byte) = self.bytes.get(self.pos) {
            if stop(*byte) {
                break;
            }
            self.pos += 1;
        }
        &self.bytes[start..self.pos]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(pairs: &[(&str, &str)]) -> EnvSource {
        EnvSource::Fixed(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn plain_and_quoted_values() {
        let env = fixed(&[]);
        assert_eq!(expand_value(&env, "plain"), "plain");
        assert_eq!(expand_value(&env, "\"quoted/path\""), "quoted/path");
        assert_eq!(expand_value(&env, "'single $HOME'"), "single $HOME");
        assert_eq!(expand_value(&env, "  spaced  "), "spaced");
    }

    #[test]
    fn variable_substitution() {
        let env = fixed(&[("HOME", "/home/u")]);
        assert_eq!(expand_value(&env, "\"$HOME/Downloads\""), "/home/u/Downloads");
        assert_eq!(expand_value(&env, "$HOME"), "/home/u");
    }

    #[test]
    fn xdg_defaults_derive_from_home() {
        let env = fixed(&[("HOME", "/home/u")]);
        assert_eq!(
            read_env_ext(&env, "XDG_CONFIG_HOME").as_deref(),
            Some("/home/u/.config")
        );
        assert_eq!(
            read_env_ext(&env, "XDG_DATA_HOME").as_deref(),
            Some("/home/u/.local/share")
        );

        let env = fixed(&[("HOME", "/home/u"), ("XDG_CONFIG_HOME", "/custom/cfg")]);
        assert_eq!(
            read_env_ext(&env, "XDG_CONFIG_HOME").as_deref(),
            Some("/custom/cfg")
        );
    }

    #[test]
    fn trailing_slashes_are_stripped() {
        let env = fixed(&[("VAR", "/a/b/")]);
        assert_eq!(expand_value(&env, "\"$VAR/\""), "/a/b");
    }

    #[test]
    fn escapes_inside_quotes() {
        let env = fixed(&[]);
        assert_eq!(expand_value(&env, "\"a\\\"b\""), "a\"b");
        assert_eq!(expand_value(&env, "'a\\'b'"), "a'b");
    }

    #[test]
    fn missing_variable_expands_to_nothing() {
        let env = fixed(&[]);
        assert_eq!(expand_value(&env, "\"$NOPE/tail\""), "/tail");
    }
}
