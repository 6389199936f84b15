// src/pipeline/builtin.rs

//! Stages implemented in-process.

use anyhow::{Context, Result};
use regex::Regex;

use crate::pipeline::stage::{Asset, StageFuture, TransformError, TransformStage};

/// Text minifier for CSS, JS and HTML.
///
/// Drops `/* ... */` and `<!-- ... -->` comments and `//` line comments that
/// start a statement, collapses whitespace runs to one space and removes the
/// space around `{`, `}` and `;`. Quoted strings (on a single line) are
/// copied verbatim. A stripped line comment leaves its line break behind, so
/// code on the following line never ends up behind a comment.
#[derive(Debug, Clone)]
pub struct Minify {
    tokens: Regex,
}

impl Minify {
    pub fn new() -> Result<Self> {
        let tokens = Regex::new(
            r#"(?s)(?P<str>"(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*')|(?P<block>/\*.*?\*/|<!--.*?-->)|(?P<line>//[^\n]*)|(?P<ws>\s+)"#,
        )
        .context("compiling minify token pattern")?;
        Ok(Self { tokens })
    }

    pub fn minify_str(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        let mut after_line_comment = false;

        for caps in self.tokens.captures_iter(text) {
            let Some(m) = caps.get(0) else { continue };
            if m.start() > last {
                out.push_str(&text[last..m.start()]);
                after_line_comment = false;
            }
            last = m.end();

            if caps.name("str").is_some() {
                out.push_str(m.as_str());
                after_line_comment = false;
            } else if caps.name("block").is_some() {
                // dropped
            } else if caps.name("line").is_some() {
                let starts_statement = out
                    .chars()
                    .next_back()
                    .is_none_or(|c| c.is_whitespace() || matches!(c, ';' | '{' | '}'));
                if !starts_statement {
                    // e.g. the `//` of `url(http://...)`
                    out.push_str(m.as_str());
                }
                after_line_comment = true;
            } else {
                let prev = out.chars().next_back();
                let next = text[m.end()..].chars().next();
                if after_line_comment && !out.is_empty() {
                    if prev.is_some_and(char::is_whitespace) {
                        out.pop();
                    }
                    out.push('\n');
                    after_line_comment = false;
                    continue;
                }
                let tight = prev.is_none_or(|c| c.is_whitespace() || matches!(c, '{' | '}' | ';'))
                    || next.is_none_or(|c| matches!(c, '{' | '}' | ';'));
                if !tight {
                    out.push(' ');
                }
            }
        }
        out.push_str(&text[last..]);
        out.trim().to_string()
    }
}

impl TransformStage for Minify {
    fn name(&self) -> &str {
        "minify"
    }

    fn apply<'a>(&'a self, mut asset: Asset) -> StageFuture<'a> {
        Box::pin(async move {
            let text = std::str::from_utf8(&asset.bytes).map_err(|err| {
                TransformError::for_asset(self.name(), &asset, format!("input is not UTF-8: {err}"))
            })?;
            let minified = self.minify_str(text);
            // Never grow the output.
            if minified.len() < asset.bytes.len() {
                asset.bytes = minified.into_bytes();
            }
            Ok(asset)
        })
    }
}
