// src/path.rs
//
// Request path parsing.
//
// The configured URL pattern is compiled once into an anchored regex. Every
// request path passes the unsafe-path check *before* the match, so traversal
// segments and shell metacharacters never reach the file system or the
// resize command even when the pattern would accept them.

use crate::error::{ResizeServerError, Result};
use once_cell::sync::Lazy;
use regex::{Match, Regex};

/// Maximum width or height accepted from a request path.
/// Same bound as the one used by libvips/sharp for decoded images.
pub const MAX_DIMENSION: u32 = 32768;

/// Pattern used when none is configured.
pub const DEFAULT_URL_PATTERN: &str = "/cache/:width:x:height:/:image:";

const PLACEHOLDERS: [(&str, &str); 4] = [
    (":width:", "(?P<width>[0-9]*)"),
    (":height:", "(?P<height>[0-9]*)"),
    (":image:", "(?P<image>.*?)"),
    (":any_dir:", "[^/]+"),
];

// colon, semicolon, backslash, NUL, dot-only segments, empty segments
static UNSAFE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[:;\\\x00]|/\.+(?:/|$)|//").expect("unsafe path pattern is a valid regex")
});

/// Result of a successful parse. Paths are relative to their roots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedRequest {
    pub width: u32,
    pub height: u32,
    /// Original image, relative to the source root
    pub source: String,
    /// Cached variant, relative to the save root
    pub target: String,
}

#[derive(Clone, Debug)]
pub struct PathParser {
    pattern: Regex,
    base_url: Option<String>,
}

impl PathParser {
    /// Compile `pattern`, optionally mounted under `base_url`.
    ///
    /// Redundant slashes between the base URL and the pattern are ignored.
    pub fn new(pattern: &str, base_url: &str) -> Result<Self> {
        validate_pattern(pattern)?;

        let base_url = base_url.trim_end_matches('/');
        let full_pattern = if base_url.is_empty() {
            pattern.to_string()
        } else {
            format!("{}/{}", base_url, pattern.trim_start_matches('/'))
        };

        Ok(Self {
            pattern: compile_pattern(&full_pattern)?,
            base_url: (!base_url.is_empty()).then(|| base_url.to_string()),
        })
    }

    pub fn parse(&self, path: &str) -> Result<ParsedRequest> {
        if UNSAFE_PATH.is_match(path) {
            return Err(ResizeServerError::invalid_path(
                path.to_string(),
                "contains unsafe characters or segments",
            ));
        }

        let captures = self.pattern.captures(path).ok_or_else(|| {
            ResizeServerError::invalid_path(path.to_string(), "does not match the URL pattern")
        })?;

        let source = captures
            .name("image")
            .map(|m| m.as_str().trim_start_matches('/'))
            .unwrap_or_default();
        if source.is_empty() {
            return Err(ResizeServerError::invalid_path(
                path.to_string(),
                "image name is empty",
            ));
        }

        let width = parse_dimension(captures.name("width"))?;
        let height = parse_dimension(captures.name("height"))?;
        let (width, height) = match (width, height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, w),
            (None, Some(h)) => (0, h),
            (None, None) => {
                return Err(ResizeServerError::invalid_path(
                    path.to_string(),
                    "no dimensions given",
                ))
            }
        };
        if width == 0 && height == 0 {
            return Err(ResizeServerError::invalid_path(
                path.to_string(),
                "dimensions are zero",
            ));
        }

        let relative = match &self.base_url {
            Some(base) => path.strip_prefix(base.as_str()).unwrap_or(path),
            None => path,
        };

        Ok(ParsedRequest {
            width,
            height,
            source: source.to_string(),
            target: relative.trim_start_matches('/').to_string(),
        })
    }
}

/// Empty or absent captures yield `None`.
fn parse_dimension(capture: Option<Match<'_>>) -> Result<Option<u32>> {
    let Some(digits) = capture.map(|m| m.as_str()).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let value = digits.parse::<u64>().unwrap_or(u64::MAX);
    if value > MAX_DIMENSION as u64 {
        return Err(ResizeServerError::dimension_exceeds_limit(
            value,
            MAX_DIMENSION,
        ));
    }
    Ok(Some(value as u32))
}

fn validate_pattern(pattern: &str) -> Result<()> {
    if !pattern.contains(":image:") {
        return Err(ResizeServerError::invalid_config(
            "url_pattern",
            pattern.to_string(),
            "pattern must contain the :image: placeholder",
        ));
    }
    if !pattern.contains(":width:") && !pattern.contains(":height:") {
        return Err(ResizeServerError::invalid_config(
            "url_pattern",
            pattern.to_string(),
            "pattern must contain :width: or :height:",
        ));
    }
    Ok(())
}

/// Literal text is escaped, placeholders become their sub-expressions.
fn compile_pattern(pattern: &str) -> Result<Regex> {
    let mut expression = String::with_capacity(pattern.len() * 2);
    expression.push('^');

    let mut rest = pattern;
    while !rest.is_empty() {
        let next = PLACEHOLDERS
            .iter()
            .filter_map(|(name, replacement)| rest.find(name).map(|i| (i, *name, *replacement)))
            .min_by_key(|(index, _, _)| *index);

        match next {
            Some((index, name, replacement)) => {
                expression.push_str(&regex::escape(&rest[..index]));
                expression.push_str(replacement);
                rest = &rest[index + name.len()..];
            }
            None => {
                expression.push_str(&regex::escape(rest));
                break;
            }
        }
    }
    expression.push('$');

    Regex::new(&expression).map_err(|e| {
        ResizeServerError::invalid_config("url_pattern", pattern.to_string(), e.to_string())
    })
}
