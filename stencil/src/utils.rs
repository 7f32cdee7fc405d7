//! Pure string helpers backing the built-in filters.
use std::fmt;

use heck::{ToKebabCase, ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};

/// Displays a string with HTML special characters escaped.
pub struct HtmlEscape<'a>(pub &'a str);

impl<'a> fmt::Display for HtmlEscape<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0;
        let mut start = 0;
        for (idx, c) in s.char_indices() {
            let replacement = match c {
                '<' => "&lt;",
                '>' => "&gt;",
                '&' => "&amp;",
                '"' => "&quot;",
                '\'' => "&#x27;",
                _ => continue,
            };
            if start < idx {
                ok!(f.write_str(&s[start..idx]));
            }
            ok!(f.write_str(replacement));
            start = idx + c.len_utf8();
        }
        f.write_str(&s[start..])
    }
}

/// Uppercases the first character.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lowercases the first character.
pub fn lcfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Uppercases the first character of every whitespace separated word.
pub fn title(s: &str) -> String {
    let mut rv = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start {
            rv.extend(c.to_uppercase());
        } else {
            rv.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    rv
}

pub fn camel(s: &str) -> String {
    s.to_lower_camel_case()
}

pub fn pascal(s: &str) -> String {
    s.to_upper_camel_case()
}

pub fn snake(s: &str) -> String {
    s.to_snake_case()
}

pub fn kebab(s: &str) -> String {
    s.to_kebab_case()
}

pub fn slugify(s: &str) -> String {
    slug::slugify(s)
}

/// Keeps the first `limit` characters.
pub fn truncate(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}

/// Keeps the first `limit` words, normalizing the whitespace between them.
pub fn limit_words(s: &str, limit: usize) -> String {
    s.split_whitespace().take(limit).collect::<Vec<_>>().join(" ")
}

/// Trims the string and collapses whitespace runs into single spaces.
pub fn squish(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn rot13(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'a'..='m' | 'A'..='M' => (c as u8 + 13) as char,
            'n'..='z' | 'N'..='Z' => (c as u8 - 13) as char,
            _ => c,
        })
        .collect()
}

pub fn reverse(s: &str) -> String {
    s.chars().rev().collect()
}

/// Inserts `<br>` before every newline.
pub fn nl2br(s: &str) -> String {
    let mut rv = String::with_capacity(s.len());
    for line in s.split_inclusive('\n') {
        match line.strip_suffix('\n') {
            Some(rest) => {
                let (rest, cr) = match rest.strip_suffix('\r') {
                    Some(rest) => (rest, "\r"),
                    None => (rest, ""),
                };
                rv.push_str(rest);
                rv.push_str("<br>");
                rv.push_str(cr);
                rv.push('\n');
            }
            None => rv.push_str(line),
        }
    }
    rv
}

/// Removes anything that looks like a markup tag.
pub fn strip_tags(s: &str) -> String {
    let mut rv = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => rv.push(c),
            _ => {}
        }
    }
    rv
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_html_escape() {
        assert_eq!(
            HtmlEscape("<a href=\"x\">Tom & 'Jerry'</a>").to_string(),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;/a&gt;"
        );
        assert_eq!(HtmlEscape("plain ünïcode").to_string(), "plain ünïcode");
    }

    #[test]
    fn test_case_helpers() {
        assert_eq!(capitalize("hello world"), "Hello world");
        assert_eq!(lcfirst("Hello"), "hello");
        assert_eq!(title("hello  big world"), "Hello  Big World");
        assert_eq!(camel("user first_name"), "userFirstName");
        assert_eq!(pascal("user first_name"), "UserFirstName");
        assert_eq!(snake("UserFirstName"), "user_first_name");
        assert_eq!(kebab("UserFirstName"), "user-first-name");
        assert_eq!(slugify("Hello, World!"), "hello-world");
    }

    #[test]
    fn test_truncation() {
        assert_eq!(truncate("héllo", 3), "hél");
        assert_eq!(truncate("hi", 10), "hi");
        assert_eq!(limit_words("one two  three four", 2), "one two");
    }

    #[test]
    fn test_whitespace_and_markup() {
        assert_eq!(squish("  a \n\t b   c "), "a b c");
        assert_eq!(nl2br("a\nb\r\nc"), "a<br>\nb<br>\r\nc");
        assert_eq!(strip_tags("<p>Hi <b>there</b></p>"), "Hi there");
        assert_eq!(rot13("Hello"), "Uryyb");
        assert_eq!(reverse("abc"), "cba");
    }
}
