//! Component markup scanner.
//!
//! Splits an article body into markdown text and component elements such as
//! `<Collapsible id="intro">…</Collapsible>` or `<Image src="/a.png" />`.
//! Only tags whose name starts with an uppercase letter are components;
//! lowercase HTML is left for the markdown renderer. Fenced code blocks and
//! inline code spans are opaque.

use std::collections::BTreeMap;

/// A node in the scanned body.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupNode {
    /// Markdown source between component tags
    Text(String),
    /// A component element
    Element(Element),
}

/// A component element with its props and children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Component name (e.g., "Image")
    pub name: String,

    /// Props by name
    pub props: BTreeMap<String, PropValue>,

    /// Child nodes (empty for self-closing elements)
    pub children: Vec<MarkupNode>,

    /// Whether self-closing
    pub self_closing: bool,

    /// Line of the opening tag (1-indexed)
    pub line: usize,
}

impl Element {
    /// Look up a prop by name.
    pub fn prop(&self, name: &str) -> Option<&PropValue> {
        self.props.get(name)
    }
}

/// A prop value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    /// String literal: `alt="Diagram"` or `alt={"Diagram"}`
    String(String),
    /// Numeric literal: `width={600}`
    Number(f64),
    /// Boolean literal or bare attribute: `defaultOpen`
    Boolean(bool),
    /// Any other braced expression, kept verbatim
    Expression(String),
}

impl PropValue {
    /// Get as string if it's a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Errors produced while scanning component markup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarkupError {
    #[error("line {line}: import/export statements are not allowed in articles")]
    ModuleStatement { line: usize },

    #[error("line {line}: unterminated <{name}> tag")]
    UnterminatedTag { name: String, line: usize },

    #[error("line {line}: <{name}> is never closed")]
    UnclosedElement { name: String, line: usize },

    #[error("line {line}: expected </{expected}> but found </{found}>")]
    MismatchedClose {
        expected: String,
        found: String,
        line: usize,
    },

    #[error("line {line}: </{name}> has no matching opening tag")]
    UnexpectedClose { name: String, line: usize },

    #[error("line {line}: invalid attribute on <{name}>: {message}")]
    InvalidAttribute {
        name: String,
        line: usize,
        message: String,
    },
}

/// Scan a body into markdown text and component elements.
pub fn parse_markup(body: &str) -> Result<Vec<MarkupNode>, MarkupError> {
    let mut scanner = Scanner::new(body);
    let mut stack: Vec<Frame> = vec![Frame::root()];
    let mut text = String::new();

    while !scanner.is_eof() {
        if scanner.at_line_start() {
            let line = scanner.current_line();
            let indent = line.len() - line.trim_start().len();

            if indent < 4 {
                if let Some(fence) = fence_marker(line.trim_start()) {
                    text.push_str(scanner.take_fenced_block(fence));
                    continue;
                }
            }

            if stack.len() == 1 && indent == 0 && is_module_statement(line) {
                return Err(MarkupError::ModuleStatement {
                    line: scanner.line,
                });
            }
        }

        let rest = scanner.rest();
        if rest.starts_with('`') {
            text.push_str(scanner.take_code_span());
        } else if starts_open_tag(rest) {
            flush_text(&mut text, &mut stack);
            let (element, self_closing) = scanner.take_open_tag()?;
            if self_closing {
                push_node(&mut stack, MarkupNode::Element(element));
            } else {
                stack.push(Frame {
                    element: Some(element),
                    children: Vec::new(),
                });
            }
        } else if starts_close_tag(rest) {
            flush_text(&mut text, &mut stack);
            let line = scanner.line;
            let name = scanner.take_close_tag()?;
            close_element(&mut stack, name, line)?;
        } else {
            text.push(scanner.bump());
        }
    }

    flush_text(&mut text, &mut stack);

    if stack.len() > 1 {
        let open = stack.pop().and_then(|f| f.element);
        if let Some(element) = open {
            return Err(MarkupError::UnclosedElement {
                name: element.name,
                line: element.line,
            });
        }
    }

    Ok(stack.pop().map(|f| f.children).unwrap_or_default())
}

/// An element under construction, or the document root.
struct Frame {
    element: Option<Element>,
    children: Vec<MarkupNode>,
}

impl Frame {
    fn root() -> Self {
        Self {
            element: None,
            children: Vec::new(),
        }
    }
}

fn push_node(stack: &mut [Frame], node: MarkupNode) {
    if let Some(top) = stack.last_mut() {
        top.children.push(node);
    }
}

fn flush_text(text: &mut String, stack: &mut [Frame]) {
    if !text.is_empty() {
        push_node(stack, MarkupNode::Text(std::mem::take(text)));
    }
}

fn close_element(stack: &mut Vec<Frame>, name: String, line: usize) -> Result<(), MarkupError> {
    if stack.len() == 1 {
        return Err(MarkupError::UnexpectedClose { name, line });
    }

    let Some(Frame {
        element: Some(mut element),
        children,
    }) = stack.pop()
    else {
        return Err(MarkupError::UnexpectedClose { name, line });
    };

    if element.name != name {
        return Err(MarkupError::MismatchedClose {
            expected: element.name,
            found: name,
            line,
        });
    }

    element.children = children;
    push_node(stack, MarkupNode::Element(element));
    Ok(())
}

fn starts_open_tag(rest: &str) -> bool {
    let mut chars = rest.chars();
    chars.next() == Some('<') && chars.next().is_some_and(|c| c.is_ascii_uppercase())
}

fn starts_close_tag(rest: &str) -> bool {
    rest.starts_with("</") && rest[2..].starts_with(|c: char| c.is_ascii_uppercase())
}

fn is_module_statement(line: &str) -> bool {
    line.starts_with("import ") || line.starts_with("export ")
}

/// Return the fence string (e.g. "```") if the line opens a fenced block.
fn fence_marker(line: &str) -> Option<&str> {
    for ch in ['`', '~'] {
        let run = line.len() - line.trim_start_matches(ch).len();
        if run >= 3 {
            return Some(&line[..run]);
        }
    }
    None
}

/// Cursor over the body that tracks the current line number.
struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0, line: 1 }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.src.as_bytes()[self.pos - 1] == b'\n'
    }

    fn current_line(&self) -> &'a str {
        let rest = self.rest();
        let end = rest.find('\n').unwrap_or(rest.len());
        rest[..end].trim_end_matches('\r')
    }

    fn bump(&mut self) -> char {
        let c = self.rest().chars().next().unwrap_or('\0');
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        c
    }

    /// Advance by `len` bytes and return the consumed slice.
    fn advance(&mut self, len: usize) -> &'a str {
        let taken = &self.src[self.pos..self.pos + len];
        self.line += taken.matches('\n').count();
        self.pos += len;
        taken
    }

    fn skip_whitespace(&mut self) {
        while self.rest().starts_with(|c: char| c.is_whitespace()) {
            self.bump();
        }
    }

    /// Consume a fenced code block through its closing fence (or EOF).
    fn take_fenced_block(&mut self, fence: &str) -> &'a str {
        let start = self.pos;
        let marker = fence.chars().next().unwrap_or('`');
        let mut first = true;

        while !self.is_eof() {
            let line = self.current_line();
            let trimmed = line.trim();
            let closes = !first
                && trimmed.len() >= fence.len()
                && trimmed.chars().all(|c| c == marker);

            let rest = self.rest();
            let len = rest.find('\n').map(|p| p + 1).unwrap_or(rest.len());
            self.advance(len);
            first = false;

            if closes {
                break;
            }
        }

        &self.src[start..self.pos]
    }

    /// Consume an inline code span, or just the backtick run when unmatched.
    fn take_code_span(&mut self) -> &'a str {
        let rest = self.rest();
        let run = rest.len() - rest.trim_start_matches('`').len();
        let ticks = &rest[..run];
        let after = &rest[run..];

        let mut search = 0;
        while let Some(found) = after[search..].find(ticks) {
            let at = search + found;
            let closing_run = after[at..].len() - after[at..].trim_start_matches('`').len();
            if closing_run == run {
                return self.advance(run + at + run);
            }
            search = at + closing_run;
        }

        self.advance(run)
    }

    fn take_name(&mut self) -> &'a str {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        self.advance(len)
    }

    /// Parse `<Name attr="…" …>` or `<Name … />`.
    fn take_open_tag(&mut self) -> Result<(Element, bool), MarkupError> {
        let line = self.line;
        self.advance(1);
        let name = self.take_name().to_string();
        let mut props = BTreeMap::new();

        loop {
            self.skip_whitespace();
            let rest = self.rest();

            if rest.is_empty() {
                return Err(MarkupError::UnterminatedTag { name, line });
            }
            if rest.starts_with("/>") {
                self.advance(2);
                return Ok((element(name, props, true, line), true));
            }
            if rest.starts_with('>') {
                self.advance(1);
                return Ok((element(name, props, false, line), false));
            }
            if !rest.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
                return Err(MarkupError::InvalidAttribute {
                    name,
                    line: self.line,
                    message: format!("unexpected character '{}'", rest.chars().next().unwrap_or(' ')),
                });
            }

            let attr_len = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ':'))
                .unwrap_or(rest.len());
            let attr = self.advance(attr_len).to_string();

            self.skip_whitespace();
            if !self.rest().starts_with('=') {
                props.insert(attr, PropValue::Boolean(true));
                continue;
            }
            self.advance(1);
            self.skip_whitespace();

            let value = self.take_attr_value(&name, &attr)?;
            props.insert(attr, value);
        }
    }

    fn take_attr_value(&mut self, name: &str, attr: &str) -> Result<PropValue, MarkupError> {
        let line = self.line;
        let rest = self.rest();
        let invalid = |message: &str| MarkupError::InvalidAttribute {
            name: name.to_string(),
            line,
            message: format!("{attr}: {message}"),
        };

        match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let end = rest[1..]
                    .find(quote)
                    .ok_or_else(|| invalid("unterminated string"))?;
                let raw = self.advance(end + 2);
                Ok(PropValue::String(raw[1..raw.len() - 1].to_string()))
            }
            Some('{') => {
                let len = braced_len(rest).ok_or_else(|| invalid("unbalanced braces"))?;
                let raw = self.advance(len);
                let inner = raw[1..raw.len() - 1].trim();
                if inner.starts_with("...") {
                    return Err(invalid("spread attributes are not supported"));
                }
                Ok(expression_value(inner))
            }
            _ => Err(invalid("expected a quoted or braced value")),
        }
    }

    /// Parse `</Name>`.
    fn take_close_tag(&mut self) -> Result<String, MarkupError> {
        let line = self.line;
        self.advance(2);
        let name = self.take_name().to_string();
        self.skip_whitespace();
        if !self.rest().starts_with('>') {
            return Err(MarkupError::UnterminatedTag { name, line });
        }
        self.advance(1);
        Ok(name)
    }
}

fn element(
    name: String,
    props: BTreeMap<String, PropValue>,
    self_closing: bool,
    line: usize,
) -> Element {
    Element {
        name,
        props,
        children: Vec::new(),
        self_closing,
        line,
    }
}

/// Length in bytes of a `{…}` group, honoring nested braces and string literals.
fn braced_len(src: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in src.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Interpret the literal forms allowed inside braces.
fn expression_value(inner: &str) -> PropValue {
    match inner {
        "true" => return PropValue::Boolean(true),
        "false" => return PropValue::Boolean(false),
        _ => {}
    }

    if let Ok(n) = inner.parse::<f64>() {
        if n.is_finite() {
            return PropValue::Number(n);
        }
    }

    for quote in ['"', '\'', '`'] {
        if inner.len() >= 2 && inner.starts_with(quote) && inner.ends_with(quote) {
            let body = &inner[1..inner.len() - 1];
            let interpolates = quote == '`' && body.contains("${");
            if !body.contains(quote) && !interpolates {
                return PropValue::String(body.to_string());
            }
        }
    }

    PropValue::Expression(inner.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn single_element(body: &str) -> Element {
        let nodes = parse_markup(body).unwrap();
        nodes
            .into_iter()
            .find_map(|n| match n {
                MarkupNode::Element(e) => Some(e),
                MarkupNode::Text(_) => None,
            })
            .expect("an element")
    }

    #[test]
    fn plain_markdown_is_one_text_node() {
        let body = "# Title\n\nSome <em>html</em> and text.\n";

        let nodes = parse_markup(body).unwrap();

        assert_eq!(nodes, vec![MarkupNode::Text(body.to_string())]);
    }

    #[test]
    fn parses_self_closing_with_props() {
        let img = single_element(r#"<Image src="/a.png" alt='Alt' width={600} priority />"#);

        assert_eq!(img.name, "Image");
        assert!(img.self_closing);
        assert_eq!(img.prop("src"), Some(&PropValue::String("/a.png".into())));
        assert_eq!(img.prop("alt"), Some(&PropValue::String("Alt".into())));
        assert_eq!(img.prop("width"), Some(&PropValue::Number(600.0)));
        assert_eq!(img.prop("priority"), Some(&PropValue::Boolean(true)));
    }

    #[test]
    fn parses_nested_children() {
        let body = "<Collapsible id=\"intro\">\n<CollapsibleTrigger>Intro</CollapsibleTrigger>\n<CollapsibleContent>\n\nHello **world**\n\n</CollapsibleContent>\n</Collapsible>\n";

        let outer = single_element(body);

        assert_eq!(outer.name, "Collapsible");
        let names: Vec<_> = outer
            .children
            .iter()
            .filter_map(|c| match c {
                MarkupNode::Element(e) => Some(e.name.as_str()),
                MarkupNode::Text(_) => None,
            })
            .collect();
        assert_eq!(names, vec!["CollapsibleTrigger", "CollapsibleContent"]);
    }

    #[test]
    fn multi_line_tags_track_lines() {
        let body = "Intro\n\n<Image\n  src=\"/x.png\"\n  alt=\"x\"\n/>\n\n<Oops>\n";

        let err = parse_markup(body).unwrap_err();

        assert_eq!(
            err,
            MarkupError::UnclosedElement {
                name: "Oops".into(),
                line: 8
            }
        );
    }

    #[test]
    fn tags_in_code_are_text() {
        let body = "```tsx\n<Widget />\n```\n\nUse `<Widget />` inline.\n";

        let nodes = parse_markup(body).unwrap();

        assert_eq!(nodes, vec![MarkupNode::Text(body.to_string())]);
    }

    #[test]
    fn rejects_module_statements() {
        let err = parse_markup("import Foo from './foo'\n\n<Foo />").unwrap_err();

        assert_eq!(err, MarkupError::ModuleStatement { line: 1 });
    }

    #[test]
    fn rejects_mismatched_and_stray_close() {
        let mismatched = parse_markup("<Accordion>\n</Collapsible>").unwrap_err();
        assert!(matches!(mismatched, MarkupError::MismatchedClose { line: 2, .. }));

        let stray = parse_markup("text </Accordion>").unwrap_err();
        assert!(matches!(stray, MarkupError::UnexpectedClose { .. }));
    }

    #[test]
    fn keeps_braced_expressions() {
        let el = single_element("<Image src={imageUrl} alt={\"Cover\"} />");

        assert_eq!(
            el.prop("src"),
            Some(&PropValue::Expression("imageUrl".into()))
        );
        assert_eq!(el.prop("alt"), Some(&PropValue::String("Cover".into())));
    }

    #[test]
    fn rejects_unterminated_tag() {
        let err = parse_markup("<Image src=\"/a.png\"").unwrap_err();

        assert!(matches!(err, MarkupError::UnterminatedTag { .. }));
    }

    #[test]
    fn braced_len_handles_strings_and_nesting() {
        assert_eq!(braced_len("{a}"), Some(3));
        assert_eq!(braced_len("{ {x: '}'} } rest"), Some(12));
        assert_eq!(braced_len("{ open"), None);
    }
}
