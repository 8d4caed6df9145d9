//! Output escapers
//!
//! The active escaper is chosen by the `{mode ...}` directive or by the
//! encoding argument to `process`; when neither is given, output passes
//! through unchanged.

use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Escaper {
    /// Identity; the default
    #[default]
    Raw,
    Html,
    Css,
    Js,
    Url,
}

impl Escaper {
    /// Select an escaper by name; unknown names fall back to `Raw`
    pub fn get(name: &str) -> Escaper {
        match name {
            "html" => Escaper::Html,
            "css" => Escaper::Css,
            "js" => Escaper::Js,
            "url" => Escaper::Url,
            _ => Escaper::Raw,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Escaper::Raw => "raw",
            Escaper::Html => "html",
            Escaper::Css => "css",
            Escaper::Js => "js",
            Escaper::Url => "url",
        }
    }

    /// Encode a string for this output context
    pub fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
        match self {
            Escaper::Raw => Cow::Borrowed(input),
            Escaper::Html => html_escape(input),
            Escaper::Css => css_escape(input),
            Escaper::Js => js_escape(input),
            Escaper::Url => url_escape(input),
        }
    }
}

fn html_escape(input: &str) -> Cow<'_, str> {
    if !input.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// CSS identifier escaping: everything outside `[A-Za-z0-9_-]` becomes a
/// `\XX ` hex escape (the trailing space terminates the escape sequence).
fn css_escape(input: &str) -> Cow<'_, str> {
    if input
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
        } else {
            out.push_str(&format!("\\{:X} ", c as u32));
        }
    }
    Cow::Owned(out)
}

fn js_escape(input: &str) -> Cow<'_, str> {
    if !input.contains(['"', '\'', '\\', '\n', '\r', '\t', '<', '>']) {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '<' => out.push_str("\\x3C"),
            '>' => out.push_str("\\x3E"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Percent-encoding; the RFC 3986 unreserved set passes through
fn url_escape(input: &str) -> Cow<'_, str> {
    if input
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~'))
    {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len() + 8);
    for b in input.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    Cow::Owned(out)
}
