//! Credential scrubbing for everything that ends up in a flare.
//!
//! The built-in rules cover the credential shapes we routinely find in
//! status output, logs and configuration files. They are always applied,
//! after any caller-supplied [`Replacer`], so a custom rule can never
//! disable them or reintroduce a secret through its replacement text.
//!
//! Password and secret assignments are redacted up to the end of the line
//! unless the value is quoted, since such values may contain any
//! separator. Every built-in pattern is confined to a single line. Scrubbing a buffer
//! line by line therefore gives the same result as scrubbing it whole,
//! which is what the streaming [`RedactingWriter`](super::redacting_writer::RedactingWriter)
//! relies on.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::bytes::{Captures, Regex};

use crate::error::{FlareError, Result};

lazy_static! {
    /// Built-in credential rules, in evaluation order.
    ///
    /// Each rule runs over the output of the previous one.
    static ref CREDENTIAL_PATTERNS: Vec<(Regex, &'static str)> = vec![
        // Authorization headers, with or without an auth scheme
        (Regex::new(r#"(?i)(authorization["']?[ \t]*[:=][ \t]*["']?(?:(?:bearer|basic|token|negotiate)[ \t]+)?)[^\s"',]+"#).expect("authorization pattern"),
         "${1}********"),

        // Passwords and secrets: a quoted value as a whole, otherwise the rest of the line
        (Regex::new(r#"(?i)([a-z0-9_.-]*(?:secret|passw(?:or)?d|pwd|credentials?)[a-z0-9_.-]*["']?[ \t]*[:=][ \t]*)(?:(")[^"\r\n]*"|(')[^'\r\n]*'|\S[^\r\n]*)"#).expect("password pattern"),
         "${1}${2}${3}********${2}${3}"),

        // API keys and tokens: a quoted value as a whole, otherwise up to the next separator
        (Regex::new(r#"(?i)([a-z0-9_.-]*(?:api_?key|app_?key|access_?key|token)[a-z0-9_.-]*["']?[ \t]*[:=][ \t]*(?:(?:bearer|basic)[ \t]+)?)(?:(")[^"\r\n]*"|(')[^'\r\n]*'|["']?[^\s"',;&]+)"#).expect("key/value pattern"),
         "${1}${2}${3}********${2}${3}"),

        // Bearer tokens outside of an Authorization header
        (Regex::new(r"(?i)(bearer[ \t]+)[A-Za-z0-9\-._~+/]+=*").expect("bearer pattern"),
         "${1}********"),

        // Passwords embedded in URLs
        (Regex::new(r"([a-zA-Z][a-zA-Z0-9+.-]*://[^:/@\s]+):([^@/\s]+)@").expect("url pattern"),
         "${1}:********@"),

        // GitHub tokens
        (Regex::new(r"gh[pousr]_[A-Za-z0-9_]{36,}").expect("github pattern"),
         "********"),

        // Slack tokens
        (Regex::new(r"xox[baprs]-[A-Za-z0-9-]+").expect("slack pattern"),
         "********"),

        // AWS access key ids
        (Regex::new(r"AKIA[0-9A-Z]{16}").expect("aws pattern"),
         "********"),

        // 32 character API keys, keep the last 5 characters
        (Regex::new(r"\b[a-fA-F0-9]{27}([a-fA-F0-9]{5})\b").expect("api key pattern"),
         "***************************${1}"),

        // 40 character application keys, keep the last 5 characters
        (Regex::new(r"\b[a-fA-F0-9]{35}([a-fA-F0-9]{5})\b").expect("app key pattern"),
         "***********************************${1}"),
    ];

    /// Files holding raw key material; never copied into a flare
    static ref SENSITIVE_PATH_PATTERNS: Vec<regex::Regex> = vec![
        regex::Regex::new(r"(?i)(^|[/\\])\.ssh[/\\]").expect("ssh dir"),
        regex::Regex::new(r"(?i)(^|[/\\])\.aws[/\\]").expect("aws dir"),
        regex::Regex::new(r"(?i)(^|[/\\])\.gnupg[/\\]").expect("gnupg dir"),
        regex::Regex::new(r"(?i)id_(rsa|dsa|ecdsa|ed25519)").expect("ssh key"),
        regex::Regex::new(r"(?i)\.pem$").expect("pem"),
        regex::Regex::new(r"(?i)\.key$").expect("key"),
        regex::Regex::new(r"(?i)\.p12$").expect("p12"),
        regex::Regex::new(r"(?i)\.pfx$").expect("pfx"),
        regex::Regex::new(r"(?i)\.jks$").expect("jks"),
    ];
}

/// Replacement function for a [`Replacer`].
pub type ReplaceFn = Arc<dyn Fn(&Captures) -> Vec<u8> + Send + Sync>;

/// What a [`Replacer`] substitutes for a match.
#[derive(Clone)]
pub enum Replacement {
    /// Literal bytes; `$1` / `${name}` capture references are expanded
    Literal(Vec<u8>),
    /// Computed from the captures of each match
    Func(ReplaceFn),
}

/// A single redaction rule: a pattern plus what to replace it with.
#[derive(Clone)]
pub struct Replacer {
    pattern: Regex,
    replacement: Replacement,
}

impl Replacer {
    /// Build a rule with a literal replacement.
    ///
    /// Fails with [`FlareError::RedactionConfig`] if `pattern` does not compile.
    pub fn literal(pattern: &str, replacement: &str) -> Result<Self> {
        Ok(Self {
            pattern: compile(pattern)?,
            replacement: Replacement::Literal(replacement.as_bytes().to_vec()),
        })
    }

    /// Build a rule whose replacement is computed per match.
    pub fn with_fn<F>(pattern: &str, f: F) -> Result<Self>
    where
        F: Fn(&Captures) -> Vec<u8> + Send + Sync + 'static,
    {
        Ok(Self {
            pattern: compile(pattern)?,
            replacement: Replacement::Func(Arc::new(f)),
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Apply this rule to `input`.
    pub fn apply<'a>(&self, input: &'a [u8]) -> Cow<'a, [u8]> {
        match &self.replacement {
            Replacement::Literal(rep) => self.pattern.replace_all(input, rep.as_slice()),
            Replacement::Func(f) => self.pattern.replace_all(input, |caps: &Captures| f(caps)),
        }
    }
}

impl fmt::Debug for Replacer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.replacement {
            Replacement::Literal(_) => "literal",
            Replacement::Func(_) => "func",
        };
        f.debug_struct("Replacer")
            .field("pattern", &self.pattern.as_str())
            .field("replacement", &kind)
            .finish()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| FlareError::RedactionConfig(format!("invalid pattern '{}': {}", pattern, e)))
}

/// Scrubber combining the built-in rules with extra replacers.
///
/// Extra replacers run first, in registration order; the built-in rules
/// always run last.
#[derive(Debug, Clone, Default)]
pub struct Scrubber {
    replacers: Vec<Replacer>,
}

impl Scrubber {
    /// A scrubber that only applies the built-in rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a scrubber from `(pattern, replacement)` pairs, failing on the
    /// first pattern that does not compile.
    pub fn from_rules<'a, I>(rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut scrubber = Self::new();
        for (pattern, replacement) in rules {
            scrubber.add_replacer(Replacer::literal(pattern, replacement)?);
        }
        Ok(scrubber)
    }

    pub fn add_replacer(&mut self, replacer: Replacer) {
        self.replacers.push(replacer);
    }

    /// Scrub `input`, returning the redacted bytes.
    pub fn scrub(&self, input: &[u8]) -> Vec<u8> {
        let mut result = input.to_vec();
        for replacer in &self.replacers {
            if let Cow::Owned(replaced) = replacer.apply(&result) {
                result = replaced;
            }
        }
        scrub_builtin(result)
    }
}

fn scrub_builtin(mut data: Vec<u8>) -> Vec<u8> {
    for (pattern, replacement) in CREDENTIAL_PATTERNS.iter() {
        if let Cow::Owned(replaced) = pattern.replace_all(&data, replacement.as_bytes()) {
            data = replaced;
        }
    }
    data
}

/// Scrub credentials from a byte buffer using the built-in rules.
///
/// # Example
///
/// ```
/// use rs_flare::security::credential_scrubber::scrub;
///
/// let scrubbed = scrub(b"api_key=ABCDEF1234");
/// assert_eq!(scrubbed, b"api_key=********".to_vec());
/// ```
pub fn scrub(input: &[u8]) -> Vec<u8> {
    scrub_builtin(input.to_vec())
}

/// Scrub credentials from a string using the built-in rules.
pub fn scrub_str(input: &str) -> String {
    String::from_utf8_lossy(&scrub(input.as_bytes())).into_owned()
}

/// Check if a path looks like raw key material.
///
/// # Arguments
///
/// * `path` - The file path to check
///
/// # Returns
///
/// * `true` if the file should never be copied into a flare
/// * `false` otherwise
pub fn is_sensitive_path(path: &str) -> bool {
    SENSITIVE_PATH_PATTERNS.iter().any(|p| p.is_match(path))
}

/// Scrub a file path to hide the name of a sensitive file.
///
/// The directory part is kept for debugging.
pub fn scrub_path(path: &str) -> String {
    if !is_sensitive_path(path) {
        return path.to_string();
    }

    if let Some(pos) = path.rfind(|c| c == '/' || c == '\\') {
        format!("{}/[REDACTED_SENSITIVE_FILE]", &path[..pos])
    } else {
        "[REDACTED_SENSITIVE_FILE]".to_string()
    }
}

/// Whether an environment variable name suggests its value is a secret.
pub fn looks_like_secret_name(name: &str) -> bool {
    let upper = name.to_uppercase();
    ["KEY", "TOKEN", "SECRET", "PASSWORD", "PASSWD", "CREDENTIAL", "AUTH"]
        .iter()
        .any(|needle| upper.contains(needle))
}

/// Create a safe error message that scrubs credentials.
///
/// # Arguments
///
/// * `context` - The error context
/// * `error` - The underlying error
///
/// # Returns
///
/// A formatted error string with credentials scrubbed
pub fn safe_error_message(context: &str, error: &impl fmt::Display) -> String {
    scrub_str(&format!("{}: {}", context, error))
}
