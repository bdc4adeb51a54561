//! Parser for the metadata header block at the top of a plugin's main file
//!
//! ```text
//! <?php
//! /**
//!  * Plugin Name: Hello Git
//!  * Version: 1.2.0
//!  * Git URI: https://github.com/acme/hello-git
//!  * Git Branch: main
//!  */
//! ```

use std::sync::LazyLock;

use regex::Regex;

/// Only the beginning of a file is searched for headers
pub const HEADER_READ_LIMIT: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    PluginUri,
    Version,
    Description,
    Author,
    AuthorUri,
    RequiresAtLeast,
    TestedUpTo,
    GitUri,
    GitBranch,
}

const FIELDS: &[(Field, &str)] = &[
    (Field::Name, "Plugin Name"),
    (Field::PluginUri, "Plugin URI"),
    (Field::Version, "Version"),
    (Field::Description, "Description"),
    (Field::Author, "Author"),
    (Field::AuthorUri, "Author URI"),
    (Field::RequiresAtLeast, "Requires at least"),
    (Field::TestedUpTo, "Tested up to"),
    (Field::GitUri, "Git URI"),
    (Field::GitBranch, "Git Branch"),
];

static HEADER_PATTERNS: LazyLock<Vec<(Field, Regex)>> = LazyLock::new(|| {
    FIELDS
        .iter()
        .map(|(field, label)| {
            let pattern = format!(
                r"(?mi)^(?:[ \t]*<\?php)?[ \t/*#@]*{}:(.*)$",
                regex::escape(label)
            );
            (
                *field,
                Regex::new(&pattern).expect("header pattern is a valid regex"),
            )
        })
        .collect()
});

/// Metadata declared in a plugin header block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginHeaders {
    pub name: Option<String>,
    pub plugin_uri: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub author_uri: Option<String>,
    pub requires: Option<String>,
    pub tested: Option<String>,
    pub git_uri: Option<String>,
    pub git_branch: Option<String>,
}

/// Extract header values from the beginning of `content`
///
/// Empty values are treated as absent.
pub fn parse_headers(content: &str) -> PluginHeaders {
    let content = truncate_to_limit(content);
    let mut headers = PluginHeaders::default();

    for (field, pattern) in HEADER_PATTERNS.iter() {
        let value = pattern
            .captures(content)
            .and_then(|caps| caps.get(1))
            .map(|m| cleanup_header_comment(m.as_str()))
            .filter(|v| !v.is_empty());

        let slot = match field {
            Field::Name => &mut headers.name,
            Field::PluginUri => &mut headers.plugin_uri,
            Field::Version => &mut headers.version,
            Field::Description => &mut headers.description,
            Field::Author => &mut headers.author,
            Field::AuthorUri => &mut headers.author_uri,
            Field::RequiresAtLeast => &mut headers.requires,
            Field::TestedUpTo => &mut headers.tested,
            Field::GitUri => &mut headers.git_uri,
            Field::GitBranch => &mut headers.git_branch,
        };
        *slot = value;
    }

    headers
}

fn truncate_to_limit(content: &str) -> &str {
    if content.len() <= HEADER_READ_LIMIT {
        return content;
    }
    let mut end = HEADER_READ_LIMIT;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    &content[..end]
}

/// Strip a trailing comment or PHP close tag from a header value
fn cleanup_header_comment(value: &str) -> String {
    let value = value.trim();
    let value = value
        .find("*/")
        .or_else(|| value.find("?>"))
        .map_or(value, |end| &value[..end]);
    value.trim().to_string()
}
