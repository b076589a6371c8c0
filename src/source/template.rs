//! Download URL templates.
//!
//! Catalog items describe their download links with placeholders, in either of
//! two spellings:
//!
//! ```text
//! ~/${tag}/naiveproxy-${tag}-${system}-${ARCHITECTURE}${suffix_name}
//! ~/{{ tag }}/Bitwarden-Portable-{{ tag[9:18] }}.exe
//! ```
//!
//! Recognized names are `tag` (alias `version`), `system`, `arch` (alias
//! `ARCHITECTURE`) and `suffix_name` (alias `suffix`). A `[a:b]` slice selects
//! characters `a..b` of the value, clamped to its length.

use crate::{Error, Result};
use regex::Regex;

const PLACEHOLDER_PATTERN: &str = r"\$\{\s*([A-Za-z_]+)\s*(?:\[(\d*):(\d*)\])?\s*\}|\{\{\s*([A-Za-z_]+)\s*(?:\[(\d*):(\d*)\])?\s*\}\}";

/// Values substituted into a template
#[derive(Clone, Copy, Debug)]
pub struct TemplateVars<'a> {
    /// Release tag or version
    pub tag: &'a str,
    /// Upstream system name
    pub system: &'a str,
    /// Upstream architecture name
    pub arch: &'a str,
    /// Artifact suffix
    pub suffix: &'a str,
}

impl<'a> TemplateVars<'a> {
    fn lookup(&self, name: &str) -> Option<&'a str> {
        match name {
            "tag" | "version" => Some(self.tag),
            "system" => Some(self.system),
            "arch" | "ARCHITECTURE" => Some(self.arch),
            "suffix_name" | "suffix" => Some(self.suffix),
            _ => None,
        }
    }
}

/// Substitute every placeholder of `template`
///
/// # Errors
///
/// [`Error::Template`] for unknown placeholder names and malformed slices.
pub fn render(template: &str, vars: &TemplateVars<'_>) -> Result<String> {
    let re = Regex::new(PLACEHOLDER_PATTERN)
        .map_err(|e| Error::Template(format!("invalid placeholder pattern: {}", e)))?;

    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in re.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        // Groups 1-3 belong to `${..}`, 4-6 to `{{ .. }}`
        let (name, start, end) = match caps.get(1) {
            Some(name) => (name.as_str(), caps.get(2), caps.get(3)),
            None => match caps.get(4) {
                Some(name) => (name.as_str(), caps.get(5), caps.get(6)),
                None => continue,
            },
        };

        let value = vars.lookup(name).ok_or_else(|| {
            Error::Template(format!("unknown placeholder '{}' in '{}'", name, template))
        })?;

        out.push_str(&template[last..whole.start()]);
        if whole.as_str().contains('[') {
            let start = parse_bound(start.map(|m| m.as_str()), 0, template)?;
            let end = parse_bound(end.map(|m| m.as_str()), usize::MAX, template)?;
            out.push_str(&slice_chars(value, start, end));
        } else {
            out.push_str(value);
        }
        last = whole.end();
    }
    out.push_str(&template[last..]);

    Ok(out)
}

/// Render `template` and require the result to be an absolute URL
pub fn render_url(template: &str, vars: &TemplateVars<'_>) -> Result<String> {
    let rendered = render(template, vars)?;
    ensure_url(&rendered)?;
    Ok(rendered)
}

/// Reject strings that do not parse as absolute URLs
pub fn ensure_url(candidate: &str) -> Result<()> {
    url::Url::parse(candidate)
        .map(|_| ())
        .map_err(|e| Error::Template(format!("'{}' is not a valid URL: {}", candidate, e)))
}

fn parse_bound(raw: Option<&str>, default: usize, template: &str) -> Result<usize> {
    match raw {
        None | Some("") => Ok(default),
        Some(digits) => digits
            .parse()
            .map_err(|_| Error::Template(format!("bad slice bound in '{}'", template))),
    }
}

fn slice_chars(value: &str, start: usize, end: usize) -> String {
    if start >= end {
        return String::new();
    }
    value.chars().skip(start).take(end - start).collect()
}
