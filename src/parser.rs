//! Recursive descent parser for PTL markup
//!
//! Turns lexer tokens into a validated `Node` tree. Every tag must be
//! registered, every attribute must validate against the tag's prop schema,
//! and conditional/loop/handler tags are converted into their specialized
//! node forms here. Parse errors are fatal and carry a node path plus the
//! offending line, so the template author sees exactly what to fix.

use crate::ast::*;
use crate::error::{Result, TemplateError};
use crate::expr::{parse_expression, Expr};
use crate::lexer::{Lexer, Token, TokenType};
use crate::registry::{ComponentCategory, Registry};
use crate::types::{Value, MAX_ACTIONS_PER_HANDLER, MAX_NESTING_DEPTH, MAX_SOURCE_LEN};
use std::collections::BTreeMap;

pub struct Parser<'a> {
    tokens: Vec<Token>,
    current: usize,
    registry: &'a Registry,
    max_depth: usize,
    max_source_len: usize,
    path: Vec<String>,
    next_handler_id: usize,
}

impl<'a> Parser<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            tokens: Vec::new(),
            current: 0,
            registry,
            max_depth: MAX_NESTING_DEPTH,
            max_source_len: MAX_SOURCE_LEN,
            path: Vec::new(),
            next_handler_id: 0,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_source_len(mut self, max_source_len: usize) -> Self {
        self.max_source_len = max_source_len;
        self
    }

    /// Parse a complete template source into its node forest.
    pub fn parse(&mut self, source: &str) -> Result<Vec<Node>> {
        if source.len() > self.max_source_len {
            return Err(TemplateError::limit_exceeded(
                "source length",
                self.max_source_len,
            ));
        }
        self.tokens = Lexer::new(source).tokenize()?;
        self.current = 0;
        self.path.clear();
        self.next_handler_id = 0;

        let mut nodes = Vec::new();
        while !self.check_eof() {
            if let Some(node) = self.parse_node()? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    fn parse_node(&mut self) -> Result<Option<Node>> {
        match self.peek().token_type.clone() {
            TokenType::Text(text) => {
                let line = self.peek().line;
                self.advance();
                let segments = self.split_interpolation(&text, line)?;
                if segments.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(Node::Text { segments }))
                }
            }
            TokenType::TagOpen(name) => {
                let node = self.parse_tag(&name)?;
                Ok(Some(node))
            }
            TokenType::TagClose(name) => {
                let line = self.peek().line;
                Err(self.err(line, format!("closing tag </{}> has no opening tag", name)))
            }
            other => {
                let line = self.peek().line;
                Err(self.err(line, format!("unexpected {}", other)))
            }
        }
    }

    fn parse_tag(&mut self, tag: &str) -> Result<Node> {
        let line = self.peek().line;
        self.advance(); // TagOpen

        if self.path.len() >= self.max_depth {
            return Err(self.err(
                line,
                format!("nesting depth exceeds the maximum of {}", self.max_depth),
            ));
        }

        let registration = match self.registry.get(tag) {
            Some(r) => r.clone(),
            None => {
                return Err(self.err(line, format!("unknown tag <{}>", tag)));
            }
        };

        self.path.push(tag.to_string());
        let result = self.parse_tag_inner(tag, &registration.category, line);
        self.path.pop();
        result
    }

    fn parse_tag_inner(
        &mut self,
        tag: &str,
        category: &ComponentCategory,
        line: usize,
    ) -> Result<Node> {
        let raw_attrs = self.parse_attributes(tag)?;
        let props = self.validate_props(tag, line, &raw_attrs)?;

        let self_closing = match &self.peek().token_type {
            TokenType::TagSelfClose => {
                self.advance();
                true
            }
            TokenType::TagEnd => {
                self.advance();
                false
            }
            other => {
                let msg = format!("expected '>' or '/>', found {}", other);
                let l = self.peek().line;
                return Err(self.err(l, msg));
            }
        };

        let children = if self_closing {
            Vec::new()
        } else {
            self.parse_children(tag)?
        };

        self.specialize(tag, category, line, props, raw_attrs, children)
    }

    fn parse_children(&mut self, tag: &str) -> Result<Vec<Node>> {
        let mut children = Vec::new();
        loop {
            match self.peek().token_type.clone() {
                TokenType::TagClose(name) => {
                    let line = self.peek().line;
                    if name != tag {
                        return Err(self.err(
                            line,
                            format!("expected </{}>, found </{}>", tag, name),
                        ));
                    }
                    self.advance();
                    return Ok(children);
                }
                TokenType::Eof => {
                    let line = self.peek().line;
                    return Err(self.err(line, format!("unclosed tag <{}>", tag)));
                }
                _ => {
                    if let Some(node) = self.parse_node()? {
                        children.push(node);
                    }
                }
            }
        }
    }

    fn parse_attributes(&mut self, tag: &str) -> Result<BTreeMap<String, String>> {
        let mut attrs = BTreeMap::new();
        while let TokenType::AttrName(name) = self.peek().token_type.clone() {
            let attr_line = self.peek().line;
            self.advance();
            if !matches!(self.peek().token_type, TokenType::Equals) {
                return Err(self.err(
                    attr_line,
                    format!("attribute '{}' on <{}> has no value", name, tag),
                ));
            }
            self.advance();
            let value = match self.peek().token_type.clone() {
                TokenType::AttrValue(v) => {
                    self.advance();
                    v
                }
                _ => {
                    return Err(self.err(
                        attr_line,
                        format!("attribute '{}' on <{}> expects a quoted value", name, tag),
                    ));
                }
            };
            if attrs.insert(name.clone(), value).is_some() {
                return Err(self.err(
                    attr_line,
                    format!("duplicate attribute '{}' on <{}>", name, tag),
                ));
            }
        }
        Ok(attrs)
    }

    /// Validate raw attributes against the tag's schema: unknown props and
    /// missing required props are hard errors; optional props fall back to
    /// their defaults.
    fn validate_props(
        &self,
        tag: &str,
        line: usize,
        raw: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, Value>> {
        let registration = self.registry.get(tag).expect("tag checked by caller");
        let mut props = BTreeMap::new();

        for (name, value) in raw {
            let schema = registration.prop(name).ok_or_else(|| {
                self.err(line, format!("unknown prop '{}' on <{}>", name, tag))
            })?;
            let coerced = schema.coerce(value).map_err(|msg| {
                self.err(line, format!("prop '{}' on <{}>: {}", name, tag, msg))
            })?;
            props.insert(name.clone(), coerced);
        }

        for (name, schema) in &registration.props {
            if props.contains_key(name) {
                continue;
            }
            if schema.required {
                return Err(self.err(
                    line,
                    format!("missing required prop '{}' on <{}>", name, tag),
                ));
            }
            if let Some(default) = &schema.default {
                props.insert(name.clone(), default.clone());
            }
        }

        Ok(props)
    }

    fn specialize(
        &mut self,
        tag: &str,
        category: &ComponentCategory,
        line: usize,
        props: BTreeMap<String, Value>,
        raw_attrs: BTreeMap<String, String>,
        children: Vec<Node>,
    ) -> Result<Node> {
        match tag {
            "Show" => {
                let when = self.expr_prop(&props, "when", line)?;
                Ok(Node::Conditional(ConditionalBlock::Show {
                    when,
                    children,
                    line,
                }))
            }
            "Choose" => self.build_choose(line, children),
            "When" | "Otherwise" => {
                // Kept as plain components here; the enclosing <Choose> folds
                // them into its branches.
                let inside_choose =
                    self.path.len() >= 2 && self.path[self.path.len() - 2] == "Choose";
                if !inside_choose {
                    return Err(
                        self.err(line, format!("<{}> is only valid inside <Choose>", tag))
                    );
                }
                Ok(Node::Component {
                    tag: tag.to_string(),
                    props,
                    children,
                    line,
                })
            }
            "IfOwner" => Ok(Node::Conditional(ConditionalBlock::IfOwner {
                children,
                line,
            })),
            "IfVisitor" => Ok(Node::Conditional(ConditionalBlock::IfVisitor {
                children,
                line,
            })),
            "ForEach" => {
                let source = self.expr_prop(&props, "source", line)?;
                let item = self.string_prop(&props, "item");
                let index = props
                    .get("index")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                Ok(Node::Loop {
                    source,
                    item,
                    index,
                    children,
                    line,
                })
            }
            "OnClick" => {
                if self.path.len() < 2 || self.path[self.path.len() - 2] != "Button" {
                    return Err(
                        self.err(line, "<OnClick> is only valid inside <Button>".to_string())
                    );
                }
                let actions = self.build_actions(line, children)?;
                let id = self.next_handler_id;
                self.next_handler_id += 1;
                Ok(Node::Handler {
                    id,
                    event: "click".to_string(),
                    actions,
                    line,
                })
            }
            _ => match category {
                ComponentCategory::Action => Err(self.err(
                    line,
                    format!("action <{}> is only valid inside <OnClick>", tag),
                )),
                ComponentCategory::Html => Ok(Node::Element {
                    tag: tag.to_string(),
                    attrs: raw_attrs,
                    children,
                    line,
                }),
                _ => Ok(Node::Component {
                    tag: tag.to_string(),
                    props,
                    children,
                    line,
                }),
            },
        }
    }

    fn build_choose(&self, line: usize, children: Vec<Node>) -> Result<Node> {
        let mut whens = Vec::new();
        let mut otherwise: Option<Vec<Node>> = None;

        for child in children {
            match child {
                Node::Component { tag, props, children, line: child_line } if tag == "When" => {
                    if otherwise.is_some() {
                        return Err(self.err(
                            child_line,
                            "<When> may not follow <Otherwise>".to_string(),
                        ));
                    }
                    let condition = self.expr_prop(&props, "condition", child_line)?;
                    whens.push(WhenBranch {
                        condition,
                        children,
                    });
                }
                Node::Component { tag, children, line: child_line, .. } if tag == "Otherwise" => {
                    if otherwise.is_some() {
                        return Err(self.err(
                            child_line,
                            "<Choose> may have at most one <Otherwise>".to_string(),
                        ));
                    }
                    otherwise = Some(children);
                }
                Node::Text { segments } if is_blank(&segments) => {}
                other => {
                    return Err(self.err(
                        other.line(),
                        "<Choose> may only contain <When> and <Otherwise>".to_string(),
                    ));
                }
            }
        }

        Ok(Node::Conditional(ConditionalBlock::Choose {
            whens,
            otherwise,
            line,
        }))
    }

    fn build_actions(&self, line: usize, children: Vec<Node>) -> Result<Vec<ActionNode>> {
        let mut actions = Vec::new();
        for child in children {
            match child {
                Node::Component { tag, props, children, line: child_line } => {
                    if !children.is_empty() {
                        return Err(self.err(
                            child_line,
                            format!("action <{}> may not have children", tag),
                        ));
                    }
                    let kind = self.build_action_kind(&tag, &props, child_line)?;
                    actions.push(ActionNode {
                        kind,
                        line: child_line,
                    });
                }
                Node::Text { segments } if is_blank(&segments) => {}
                other => {
                    return Err(self.err(
                        other.line(),
                        "<OnClick> may only contain action tags".to_string(),
                    ));
                }
            }
        }
        if actions.len() > MAX_ACTIONS_PER_HANDLER {
            return Err(self.err(
                line,
                format!(
                    "handler exceeds the maximum of {} actions",
                    MAX_ACTIONS_PER_HANDLER
                ),
            ));
        }
        Ok(actions)
    }

    fn build_action_kind(
        &self,
        tag: &str,
        props: &BTreeMap<String, Value>,
        line: usize,
    ) -> Result<ActionKind> {
        let kind = match tag {
            "Set" => ActionKind::Set {
                var: self.string_prop(props, "var"),
                expr: self.expr_prop(props, "expr", line)?,
            },
            "Toggle" => ActionKind::Toggle {
                var: self.string_prop(props, "var"),
            },
            "Increment" => ActionKind::Increment {
                var: self.string_prop(props, "var"),
                min: props.get("min").and_then(|v| v.as_number()),
                max: props.get("max").and_then(|v| v.as_number()),
            },
            "Decrement" => ActionKind::Decrement {
                var: self.string_prop(props, "var"),
                min: props.get("min").and_then(|v| v.as_number()),
                max: props.get("max").and_then(|v| v.as_number()),
            },
            "Filter" => ActionKind::Filter {
                source: self.expr_prop(props, "source", line)?,
                target: self.string_prop(props, "target"),
                predicate: self.expr_prop(props, "where", line)?,
            },
            "Sort" => ActionKind::Sort {
                source: self.expr_prop(props, "source", line)?,
                target: self.string_prop(props, "target"),
                by: self.expr_prop(props, "by", line)?,
                descending: props.get("order").and_then(|v| v.as_str()) == Some("desc"),
            },
            "Transform" => ActionKind::Transform {
                source: self.expr_prop(props, "source", line)?,
                target: self.string_prop(props, "target"),
                expr: self.expr_prop(props, "expr", line)?,
            },
            "Find" => ActionKind::Find {
                source: self.expr_prop(props, "source", line)?,
                target: self.string_prop(props, "target"),
                predicate: self.expr_prop(props, "where", line)?,
            },
            "Count" => ActionKind::Count {
                source: self.expr_prop(props, "source", line)?,
                target: self.string_prop(props, "target"),
                predicate: self.optional_expr_prop(props, "where", line)?,
            },
            "Sum" => ActionKind::Sum {
                source: self.expr_prop(props, "source", line)?,
                target: self.string_prop(props, "target"),
                property: self.optional_expr_prop(props, "property", line)?,
            },
            "Get" => ActionKind::Get {
                source: self.expr_prop(props, "source", line)?,
                target: self.string_prop(props, "target"),
                at: self.expr_prop(props, "at", line)?,
            },
            _ => {
                return Err(self.err(
                    line,
                    format!("<{}> is not an action tag", tag),
                ));
            }
        };
        Ok(kind)
    }

    /// Split a text run into literal and expression segments. `{{` and `}}`
    /// escape literal braces.
    fn split_interpolation(&self, text: &str, line: usize) -> Result<Vec<TextSegment>> {
        let chars: Vec<char> = text.chars().collect();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut i = 0;
        let mut cur_line = line;

        while i < chars.len() {
            match chars[i] {
                '\n' => {
                    cur_line += 1;
                    literal.push('\n');
                    i += 1;
                }
                '{' if chars.get(i + 1) == Some(&'{') => {
                    literal.push('{');
                    i += 2;
                }
                '}' if chars.get(i + 1) == Some(&'}') => {
                    literal.push('}');
                    i += 2;
                }
                '{' => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && chars[end] != '}' {
                        end += 1;
                    }
                    if end == chars.len() {
                        return Err(self.err(cur_line, "unclosed '{' in text".to_string()));
                    }
                    let src: String = chars[start..end].iter().collect();
                    let expr = parse_expression(&src).map_err(|e| {
                        self.err(cur_line, e.to_string())
                    })?;
                    if !literal.is_empty() {
                        segments.push(TextSegment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(TextSegment::Expr(expr));
                    i = end + 1;
                }
                '}' => {
                    return Err(self.err(cur_line, "unmatched '}' in text".to_string()));
                }
                c => {
                    literal.push(c);
                    i += 1;
                }
            }
        }
        if !literal.is_empty() {
            segments.push(TextSegment::Literal(literal));
        }
        // Whitespace-only runs between tags carry no content.
        if segments.len() == 1 {
            if let TextSegment::Literal(s) = &segments[0] {
                if s.trim().is_empty() {
                    return Ok(Vec::new());
                }
            }
        }
        Ok(segments)
    }

    fn expr_prop(&self, props: &BTreeMap<String, Value>, name: &str, line: usize) -> Result<Expr> {
        let raw = props
            .get(name)
            .and_then(|v| v.as_str())
            .ok_or_else(|| self.err(line, format!("missing expression prop '{}'", name)))?;
        parse_expression(raw).map_err(|e| self.err(line, e.to_string()))
    }

    fn optional_expr_prop(
        &self,
        props: &BTreeMap<String, Value>,
        name: &str,
        line: usize,
    ) -> Result<Option<Expr>> {
        match props.get(name).and_then(|v| v.as_str()) {
            Some(raw) => {
                let expr = parse_expression(raw).map_err(|e| self.err(line, e.to_string()))?;
                Ok(Some(expr))
            }
            None => Ok(None),
        }
    }

    fn string_prop(&self, props: &BTreeMap<String, Value>, name: &str) -> String {
        props
            .get(name)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.current < self.tokens.len() - 1 {
            self.current += 1;
        }
    }

    fn check_eof(&self) -> bool {
        matches!(self.peek().token_type, TokenType::Eof)
    }

    fn err(&self, line: usize, message: impl Into<String>) -> TemplateError {
        let path = if self.path.is_empty() {
            "template root".to_string()
        } else {
            self.path.join("/")
        };
        TemplateError::parse(path, line, message)
    }
}

fn is_blank(segments: &[TextSegment]) -> bool {
    segments.iter().all(|s| match s {
        TextSegment::Literal(text) => text.trim().is_empty(),
        TextSegment::Expr(_) => false,
    })
}
