//! Template tokenizer.
//!
//! Segments raw template source into a flat stream of [`Token`]s: literal
//! text, `{{ expression }}` substitutions, and the control tags recognized by
//! the engine. The expression text inside each tag is carried verbatim for
//! the expression parser to consume later.

use crate::error::{TemplateError, TemplateResult};

/// A token produced by the template tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A literal text segment.
    Text(String),
    /// A variable substitution: `{{ expression }}`. Carries the trimmed
    /// expression text.
    Variable(String),
    /// `{% if expression %}`.
    If(String),
    /// `{% elif expression %}`.
    Elif(String),
    /// `{% else %}`.
    Else,
    /// `{% endif %}`.
    EndIf,
    /// `{% for targets in list ... %}`. Carries the header text after the
    /// `for` keyword.
    For(String),
    /// `{% endfor %}`.
    EndFor,
    /// `{% raw %}...{% endraw %}`. Carries the verbatim interior; nothing
    /// inside a raw block is scanned for tags.
    Raw(String),
}

/// Tokenizes a template source string.
///
/// # Errors
///
/// Returns a `Syntax` error for unclosed `{{`/`{%`, unknown tag keywords,
/// and trailing content on bare tags, and an `UnterminatedBlock` error when
/// a `{% raw %}` has no matching `{% endraw %}`.
pub fn tokenize(source: &str) -> TemplateResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut remaining = source;

    while !remaining.is_empty() {
        match find_next_open(remaining) {
            None => {
                tokens.push(Token::Text(remaining.to_string()));
                break;
            }
            Some((pos, tag_type)) => {
                if pos > 0 {
                    tokens.push(Token::Text(remaining[..pos].to_string()));
                }

                let after_open = &remaining[pos + 2..];

                match tag_type {
                    TagType::Variable => {
                        let Some(end) = after_open.find("}}") else {
                            return Err(TemplateError::Syntax(
                                "unclosed variable tag: expected '}}'".to_string(),
                            ));
                        };
                        let content = after_open[..end].trim().to_string();
                        tokens.push(Token::Variable(content));
                        remaining = &after_open[end + 2..];
                    }
                    TagType::Block => {
                        let Some(end) = after_open.find("%}") else {
                            return Err(TemplateError::Syntax(
                                "unclosed block tag: expected '%}'".to_string(),
                            ));
                        };
                        let content = after_open[..end].trim();
                        let rest = &after_open[end + 2..];
                        if content == "raw" {
                            let (raw, past) = scan_raw(rest)?;
                            tokens.push(Token::Raw(raw.to_string()));
                            remaining = past;
                        } else {
                            tokens.push(block_token(content)?);
                            remaining = rest;
                        }
                    }
                }
            }
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy)]
enum TagType {
    Variable, // {{
    Block,    // {%
}

/// Finds the earliest tag opening in the source.
fn find_next_open(s: &str) -> Option<(usize, TagType)> {
    let var = s.find("{{").map(|pos| (pos, TagType::Variable));
    let block = s.find("{%").map(|pos| (pos, TagType::Block));
    match (var, block) {
        (Some(v), Some(b)) => Some(if v.0 <= b.0 { v } else { b }),
        (v, b) => v.or(b),
    }
}

/// Classifies the trimmed content of a `{% ... %}` tag.
fn block_token(content: &str) -> TemplateResult<Token> {
    let (keyword, rest) = match content.find(char::is_whitespace) {
        Some(idx) => (&content[..idx], content[idx..].trim_start()),
        None => (content, ""),
    };

    match keyword {
        "if" => Ok(Token::If(rest.to_string())),
        "elif" => Ok(Token::Elif(rest.to_string())),
        "for" => Ok(Token::For(rest.to_string())),
        "else" | "endif" | "endfor" if !rest.is_empty() => Err(TemplateError::Syntax(format!(
            "unexpected content after '{keyword}' tag: '{rest}'"
        ))),
        "else" => Ok(Token::Else),
        "endif" => Ok(Token::EndIf),
        "endfor" => Ok(Token::EndFor),
        "endraw" => Err(TemplateError::Syntax(
            "unexpected 'endraw' outside a raw block".to_string(),
        )),
        // A bare `raw` is consumed before classification, so reaching here
        // means the tag carried extra content.
        "raw" => Err(TemplateError::Syntax(format!(
            "unexpected content after 'raw' tag: '{rest}'"
        ))),
        "" => Err(TemplateError::Syntax("empty block tag".to_string())),
        other => Err(TemplateError::Syntax(format!("unknown tag '{other}'"))),
    }
}

/// Captures everything up to the matching `{% endraw %}` verbatim.
///
/// Returns the raw interior and the source past the closing tag.
fn scan_raw(s: &str) -> TemplateResult<(&str, &str)> {
    let mut search_from = 0;
    while let Some(rel) = s[search_from..].find("{%") {
        let open = search_from + rel;
        let after_open = &s[open + 2..];
        let Some(close) = after_open.find("%}") else {
            return Err(TemplateError::Syntax(
                "unclosed block tag: expected '%}'".to_string(),
            ));
        };
        if after_open[..close].trim() == "endraw" {
            let past = &after_open[close + 2..];
            return Ok((&s[..open], past));
        }
        search_from = open + 2;
    }
    Err(TemplateError::UnterminatedBlock(
        "missing 'endraw' for a 'raw' block tag".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text() {
        let tokens = tokenize("Hello world").unwrap();
        assert_eq!(tokens, vec![Token::Text("Hello world".to_string())]);
    }

    #[test]
    fn test_empty_template() {
        let tokens = tokenize("").unwrap();
        assert!(tokens.is_empty());
    }

    #[test]
    fn test_variable_tag() {
        let tokens = tokenize("{{ name }}").unwrap();
        assert_eq!(tokens, vec![Token::Variable("name".to_string())]);
    }

    #[test]
    fn test_variable_whitespace_trimming() {
        let tokens = tokenize("{{   name   }}").unwrap();
        assert_eq!(tokens, vec![Token::Variable("name".to_string())]);
    }

    #[test]
    fn test_variable_with_filter() {
        let tokens = tokenize("{{ name|int }}").unwrap();
        assert_eq!(tokens, vec![Token::Variable("name|int".to_string())]);
    }

    #[test]
    fn test_if_tag() {
        let tokens = tokenize("{% if condition %}").unwrap();
        assert_eq!(tokens, vec![Token::If("condition".to_string())]);
    }

    #[test]
    fn test_if_else_endif() {
        let tokens = tokenize("{% if x %}yes{% else %}no{% endif %}").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::If("x".to_string()),
                Token::Text("yes".to_string()),
                Token::Else,
                Token::Text("no".to_string()),
                Token::EndIf,
            ]
        );
    }

    #[test]
    fn test_elif_tag() {
        let tokens = tokenize("{% elif x == 2 %}").unwrap();
        assert_eq!(tokens, vec![Token::Elif("x == 2".to_string())]);
    }

    #[test]
    fn test_for_tag() {
        let tokens = tokenize("{% for item in items %}{{ item }}{% endfor %}").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::For("item in items".to_string()),
                Token::Variable("item".to_string()),
                Token::EndFor,
            ]
        );
    }

    #[test]
    fn test_mixed_content() {
        let tokens = tokenize("Hello {{ name }}! {% if show %}visible{% endif %}").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Text("Hello ".to_string()),
                Token::Variable("name".to_string()),
                Token::Text("! ".to_string()),
                Token::If("show".to_string()),
                Token::Text("visible".to_string()),
                Token::EndIf,
            ]
        );
    }

    #[test]
    fn test_adjacent_tags() {
        let tokens = tokenize("{{ a }}{{ b }}").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Variable("a".to_string()),
                Token::Variable("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_raw_block() {
        let tokens = tokenize("{% raw %}{{ not_parsed }}{% endraw %}").unwrap();
        assert_eq!(tokens, vec![Token::Raw("{{ not_parsed }}".to_string())]);
    }

    #[test]
    fn test_raw_block_with_tags_inside() {
        let tokens = tokenize("{% raw %}{% if x %}{% endraw %}after").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Raw("{% if x %}".to_string()),
                Token::Text("after".to_string()),
            ]
        );
    }

    #[test]
    fn test_raw_unterminated() {
        let err = tokenize("{% raw %}never closed").unwrap_err();
        assert!(matches!(err, TemplateError::UnterminatedBlock(_)));
    }

    #[test]
    fn test_stray_endraw() {
        let err = tokenize("{% endraw %}").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax(_)));
    }

    #[test]
    fn test_unclosed_variable() {
        let err = tokenize("{{ name ").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax(_)));
    }

    #[test]
    fn test_unclosed_block() {
        let err = tokenize("{% if ").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax(_)));
    }

    #[test]
    fn test_unknown_tag() {
        let err = tokenize("{% bogus %}").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("bogus"));
    }

    #[test]
    fn test_else_with_trailing_content() {
        let err = tokenize("{% else junk %}").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax(_)));
    }

    #[test]
    fn test_text_with_single_braces() {
        let tokens = tokenize("a { b } c").unwrap();
        assert_eq!(tokens, vec![Token::Text("a { b } c".to_string())]);
    }

    #[test]
    fn test_for_with_filter_and_recursive() {
        let tokens = tokenize("{% for x in items if x recursive %}{% endfor %}").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::For("x in items if x recursive".to_string()),
                Token::EndFor,
            ]
        );
    }
}
