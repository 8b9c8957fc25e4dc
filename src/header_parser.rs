//! Header Front End
//!
//! A declaration-level parser for C++ headers. It understands the subset of
//! the language that shapes an exported API: namespaces, linkage blocks,
//! classes with bases and access sections, enums, functions, methods,
//! constructors, variables, aliases, and `template`/`friend` wrappers.
//! Function bodies and constructs it does not model are skipped.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::ast::{
    Access, AstEntity, AstParameter, BuiltinKind, CppType, DeclFlags, EntityKind, RefKind,
    TranslationUnit,
};
use crate::frontend::{CompileConfig, DeclarationIndex, Frontend, FrontendError};

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(
        r#"(?x)
          (?P<ws>\s+)
        | (?P<comment>//[^\n]*|/\*[\s\S]*?\*/)
        | (?P<string>(?:u8|u|U|L)?"(?:[^"\\\n]|\\.)*")
        | (?P<char>'(?:[^'\\\n]|\\.)*')
        | (?P<number>(?:0[xX][0-9a-fA-F']+|[0-9][0-9']*(?:\.[0-9]*)?(?:[eE][+-]?[0-9]+)?|\.[0-9]+(?:[eE][+-]?[0-9]+)?)[uUlLfF]*)
        | (?P<ident>[A-Za-z_][A-Za-z0-9_]*)
        | (?P<punct>::|->|&&|\|\||<<=|<=|>=|==|!=|\+\+|--|\+=|-=|\*=|/=|\.\.\.|\[\[|[{}()\[\];:,<>=*&~!+\-/%^|?.\#@$])
        "#
    )
    .unwrap();

    /// Export macros such as `URHO3D_API` that prefix declarations.
    static ref EXPORT_MACRO_RE: Regex = Regex::new(r"^[A-Z][A-Z0-9_]*_(API|EXPORT)$").unwrap();

    static ref DIRECTIVE_RE: Regex = Regex::new(r"^\s*#\s*([a-z_]+)\s*(.*)$").unwrap();

    static ref DEFINED_RE: Regex =
        Regex::new(r"^(!)?\s*defined\s*\(?\s*([A-Za-z_][A-Za-z0-9_]*)\s*\)?$").unwrap();

    static ref BUILTIN_WORDS: HashSet<&'static str> = [
        "void", "bool", "char", "signed", "unsigned", "short", "int", "long", "float", "double",
        "wchar_t", "char16_t", "char32_t",
    ]
    .into_iter()
    .collect();
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRONT END
// ═══════════════════════════════════════════════════════════════════════════════

/// The crate's built-in [`Frontend`].
pub struct HeaderFrontend {
    index: DeclarationIndex,
}

impl HeaderFrontend {
    pub fn new(index: DeclarationIndex) -> Self {
        HeaderFrontend { index }
    }

    /// Factory suitable for [`crate::discovery::parse_namespace`].
    pub fn factory(index: &DeclarationIndex) -> Box<dyn Frontend> {
        Box::new(HeaderFrontend::new(index.clone()))
    }
}

impl Frontend for HeaderFrontend {
    fn parse(
        &mut self,
        path: &Path,
        config: &CompileConfig,
    ) -> Result<TranslationUnit, FrontendError> {
        let source = fs::read_to_string(path)?;
        parse_source(&source, path, config, &self.index)
    }
}

/// Parse header text that was already loaded.
pub fn parse_source(
    source: &str,
    path: &Path,
    config: &CompileConfig,
    index: &DeclarationIndex,
) -> Result<TranslationUnit, FrontendError> {
    let (cleaned, directives) = preprocess(source, config);
    let tokens = tokenize(&cleaned, config)?;

    let mut parser = HeaderParser {
        tokens,
        pos: 0,
        path,
        index,
        aliases: HashMap::new(),
        scope: Vec::new(),
    };
    let mut children = parser.parse_declarations(None, Access::Public)?;
    if let Some(tok) = parser.peek() {
        return Err(FrontendError::Syntax {
            line: tok.line,
            message: format!("unexpected '{}'", tok.text),
        });
    }

    children.extend(directives);
    children.sort_by_key(|e| e.line);

    Ok(TranslationUnit::new(path.to_path_buf(), children))
}

// ═══════════════════════════════════════════════════════════════════════════════
// PREPROCESSING
// ═══════════════════════════════════════════════════════════════════════════════

struct Conditional {
    active: bool,
    taken: bool,
    parent_active: bool,
}

/// Blank out directive lines and inactive conditional regions, keeping line
/// numbers stable. Returns the cleaned text and the include/define entities.
fn preprocess(source: &str, config: &CompileConfig) -> (String, Vec<AstEntity>) {
    let mut local_defines: HashSet<String> = HashSet::new();
    let mut stack: Vec<Conditional> = Vec::new();
    let mut directives = Vec::new();
    let mut out = String::with_capacity(source.len());

    let is_defined = |name: &str, locals: &HashSet<String>| {
        locals.contains(name) || config.define(name).is_some()
    };

    let lines: Vec<&str> = source.lines().collect();
    let mut i = 0;
    while i < lines.len() {
        let line_no = (i + 1) as u32;
        let active = stack.last().map_or(true, |c| c.active);

        if let Some(cap) = DIRECTIVE_RE.captures(lines[i]) {
            // Join continuation lines.
            let mut body = cap[2].to_string();
            let mut consumed = 1;
            while body.ends_with('\\') && i + consumed < lines.len() {
                body.pop();
                body.push(' ');
                body.push_str(lines[i + consumed].trim());
                consumed += 1;
            }
            let body = strip_line_comment(&body);

            match &cap[1] {
                "if" => {
                    let value = active && evaluate_condition(&body, &local_defines, &is_defined);
                    stack.push(Conditional {
                        active: value,
                        taken: value,
                        parent_active: active,
                    });
                }
                "ifdef" | "ifndef" => {
                    let defined = is_defined(body.trim(), &local_defines);
                    let value = active && (defined == (&cap[1] == "ifdef"));
                    stack.push(Conditional {
                        active: value,
                        taken: value,
                        parent_active: active,
                    });
                }
                "elif" => {
                    if let Some(top) = stack.last_mut() {
                        let value = top.parent_active
                            && !top.taken
                            && evaluate_condition(&body, &local_defines, &is_defined);
                        top.active = value;
                        top.taken |= value;
                    }
                }
                "else" => {
                    if let Some(top) = stack.last_mut() {
                        top.active = top.parent_active && !top.taken;
                        top.taken = true;
                    }
                }
                "endif" => {
                    stack.pop();
                }
                "define" if active => {
                    let mut parts = body.trim().splitn(2, |c: char| c.is_whitespace());
                    let head = parts.next().unwrap_or_default();
                    let name = head.split('(').next().unwrap_or_default().to_string();
                    if !name.is_empty() {
                        local_defines.insert(name.clone());
                        let mut entity = AstEntity::new(EntityKind::MacroDefinition, &name);
                        entity.value = parts.next().map(|v| v.trim().to_string());
                        entity.line = line_no;
                        directives.push(entity);
                    }
                }
                "undef" if active => {
                    local_defines.remove(body.trim());
                }
                "include" if active => {
                    let target = body
                        .trim()
                        .trim_matches(|c| c == '"' || c == '<' || c == '>')
                        .to_string();
                    let mut entity = AstEntity::new(EntityKind::IncludeDirective, &target);
                    entity.line = line_no;
                    directives.push(entity);
                }
                _ => {}
            }

            for _ in 0..consumed {
                out.push('\n');
            }
            i += consumed;
            continue;
        }

        if active {
            out.push_str(lines[i]);
        }
        out.push('\n');
        i += 1;
    }

    (out, directives)
}

fn strip_line_comment(body: &str) -> String {
    match body.find("//") {
        Some(idx) => body[..idx].trim().to_string(),
        None => body.trim().to_string(),
    }
}

fn evaluate_condition(
    expr: &str,
    locals: &HashSet<String>,
    is_defined: &dyn Fn(&str, &HashSet<String>) -> bool,
) -> bool {
    let expr = expr.trim();
    if expr == "0" {
        return false;
    }
    if let Some(cap) = DEFINED_RE.captures(expr) {
        let defined = is_defined(&cap[2], locals);
        return if cap.get(1).is_some() {
            !defined
        } else {
            defined
        };
    }
    // Anything richer is assumed to hold.
    true
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEXING
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Ident,
    Number,
    Str,
    Char,
    Punct,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    text: String,
    line: u32,
}

fn tokenize(source: &str, config: &CompileConfig) -> Result<Vec<Token>, FrontendError> {
    let mut tokens = Vec::new();
    let mut offset = 0;
    let mut line = 1u32;

    while offset < source.len() {
        let Some(cap) = TOKEN_RE.captures_at(source, offset) else {
            break;
        };
        let whole = cap.get(0).map(|m| (m.start(), m.end())).unwrap_or((offset, offset));
        if whole.0 != offset || whole.1 == offset {
            let bad = source[offset..].chars().next().unwrap_or(' ');
            return Err(FrontendError::Syntax {
                line,
                message: format!("unexpected character '{}'", bad),
            });
        }
        let text = &source[whole.0..whole.1];

        let kind = if cap.name("ws").is_some() || cap.name("comment").is_some() {
            None
        } else if cap.name("string").is_some() {
            Some(TokenKind::Str)
        } else if cap.name("char").is_some() {
            Some(TokenKind::Char)
        } else if cap.name("number").is_some() {
            Some(TokenKind::Number)
        } else if cap.name("ident").is_some() {
            Some(TokenKind::Ident)
        } else {
            Some(TokenKind::Punct)
        };

        if let Some(kind) = kind {
            if kind == TokenKind::Ident {
                if let Some(replacement) = config.define(text) {
                    // Object-like macro from the compile flags.
                    if !replacement.is_empty() {
                        let mut expanded = tokenize(replacement, &CompileConfig::default())?;
                        for tok in &mut expanded {
                            tok.line = line;
                        }
                        tokens.extend(expanded);
                    }
                    line += text.matches('\n').count() as u32;
                    offset = whole.1;
                    continue;
                }
            }
            tokens.push(Token {
                kind,
                text: text.to_string(),
                line,
            });
        }

        line += text.matches('\n').count() as u32;
        offset = whole.1;
    }

    Ok(tokens)
}

/// Re-spell a token run as source text.
fn join_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut prev: Option<&Token> = None;
    for tok in tokens {
        if let Some(p) = prev {
            let word = |t: &Token| {
                matches!(
                    t.kind,
                    TokenKind::Ident | TokenKind::Number | TokenKind::Str | TokenKind::Char
                )
            };
            if (word(p) && word(tok)) || p.text == "," {
                out.push(' ');
            }
        }
        out.push_str(&tok.text);
        prev = Some(tok);
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSING
// ═══════════════════════════════════════════════════════════════════════════════

struct HeaderParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    path: &'a Path,
    index: &'a DeclarationIndex,
    aliases: HashMap<String, CppType>,
    scope: Vec<String>,
}

type ParseResult<T> = Result<T, FrontendError>;

impl<'a> HeaderParser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead)
    }

    fn peek_is(&self, text: &str) -> bool {
        self.peek().map_or(false, |t| t.text == text)
    }

    fn peek_at_is(&self, ahead: usize, text: &str) -> bool {
        self.peek_at(ahead).map_or(false, |t| t.text == text)
    }

    fn peek_ident(&self) -> Option<&str> {
        self.peek()
            .filter(|t| t.kind == TokenKind::Ident)
            .map(|t| t.text.as_str())
    }

    fn line(&self) -> u32 {
        self.peek()
            .or_else(|| self.tokens.last())
            .map_or(0, |t| t.line)
    }

    fn next(&mut self) -> ParseResult<Token> {
        let tok = self.tokens.get(self.pos).cloned().ok_or_else(|| FrontendError::Syntax {
            line: self.line(),
            message: "unexpected end of file".to_string(),
        })?;
        self.pos += 1;
        Ok(tok)
    }

    fn eat(&mut self, text: &str) -> bool {
        if self.peek_is(text) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, text: &str) -> ParseResult<()> {
        if self.eat(text) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", text)))
        }
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match self.peek_ident() {
            Some(name) => {
                let name = name.to_string();
                self.pos += 1;
                Ok(name)
            }
            None => Err(self.error("expected identifier".to_string())),
        }
    }

    fn error(&self, message: String) -> FrontendError {
        let found = self
            .peek()
            .map(|t| format!(", found '{}'", t.text))
            .unwrap_or_else(|| ", found end of file".to_string());
        FrontendError::Syntax {
            line: self.line(),
            message: format!("{}{}", message, found),
        }
    }

    fn qualified(&self, name: &str) -> String {
        if self.scope.is_empty() {
            name.to_string()
        } else {
            format!("{}::{}", self.scope.join("::"), name)
        }
    }

    /// Skip a balanced `open ... close` group; the cursor must be on `open`.
    fn skip_balanced(&mut self, open: &str, close: &str) -> ParseResult<Vec<Token>> {
        self.expect(open)?;
        let mut depth = 1;
        let mut inner = Vec::new();
        loop {
            let tok = self.next()?;
            if tok.text == open {
                depth += 1;
            } else if tok.text == close {
                depth -= 1;
                if depth == 0 {
                    return Ok(inner);
                }
            }
            inner.push(tok);
        }
    }

    /// Recover from an unsupported construct: skip to the end of the
    /// declaration without swallowing the enclosing scope's `}`.
    fn skip_declaration(&mut self) -> ParseResult<()> {
        let mut depth = 0usize;
        while let Some(tok) = self.peek() {
            match tok.text.as_str() {
                "(" | "[" => depth += 1,
                ")" | "]" => depth = depth.saturating_sub(1),
                "{" => {
                    self.skip_balanced("{", "}")?;
                    if depth == 0 {
                        self.eat(";");
                        return Ok(());
                    }
                    continue;
                }
                "}" if depth == 0 => return Ok(()),
                ";" if depth == 0 => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => {}
            }
            self.pos += 1;
        }
        Ok(())
    }

    /// Collect tokens up to (not including) one of `stops` at nesting depth 0.
    fn collect_until(&mut self, stops: &[&str]) -> ParseResult<Vec<Token>> {
        let mut depth = 0usize;
        let mut out = Vec::new();
        loop {
            let Some(tok) = self.peek() else {
                return Err(self.error("unterminated expression".to_string()));
            };
            if depth == 0 && stops.contains(&tok.text.as_str()) {
                return Ok(out);
            }
            match tok.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => {
                    if depth == 0 {
                        return Ok(out);
                    }
                    depth -= 1;
                }
                _ => {}
            }
            out.push(tok.clone());
            self.pos += 1;
        }
    }

    fn parse_declarations(
        &mut self,
        class_name: Option<&str>,
        default_access: Access,
    ) -> ParseResult<Vec<AstEntity>> {
        let mut entities = Vec::new();
        let mut access = default_access;

        while let Some(tok) = self.peek() {
            if tok.text == "}" {
                break;
            }
            if tok.text == ";" {
                self.pos += 1;
                continue;
            }

            if class_name.is_some()
                && matches!(tok.text.as_str(), "public" | "protected" | "private")
                && self.peek_at_is(1, ":")
            {
                let line = tok.line;
                access = match tok.text.as_str() {
                    "public" => Access::Public,
                    "protected" => Access::Protected,
                    _ => Access::Private,
                };
                self.pos += 2;
                let mut spec = AstEntity::new(EntityKind::AccessSpecifier, access.as_str());
                spec.access = access;
                spec.line = line;
                entities.push(spec);
                continue;
            }

            let start = self.pos;
            let line = tok.line;
            let parsed = match self.parse_declaration(class_name) {
                Ok(parsed) => parsed,
                Err(err) => {
                    // Drop the one declaration; an unbalanced scope still fails the header.
                    self.pos = start;
                    if self.skip_declaration().is_err() || self.pos == start {
                        return Err(err);
                    }
                    debug!("Skipped declaration at line {}: {}", line, err);
                    let mut skipped = AstEntity::new(EntityKind::Unexposed, "");
                    skipped.line = line;
                    vec![skipped]
                }
            };

            for mut entity in parsed {
                if class_name.is_some() {
                    entity.access = access;
                }
                entities.push(entity);
            }
        }

        Ok(entities)
    }

    fn parse_declaration(&mut self, class_name: Option<&str>) -> ParseResult<Vec<AstEntity>> {
        let line = self.line();
        let head = self.peek().map(|t| t.text.clone()).unwrap_or_default();

        let mut entities = match head.as_str() {
            "namespace" => self.parse_namespace()?,
            "extern" if self.peek_at(1).map_or(false, |t| t.kind == TokenKind::Str) => {
                vec![self.parse_linkage(class_name)?]
            }
            "template" => self.parse_template(class_name)?,
            "class" | "struct" | "union" => self.parse_class_or_elaborated(class_name)?,
            "enum" => self.parse_enum()?,
            "using" => self.parse_using()?,
            "typedef" => self.parse_typedef()?,
            "static_assert" => {
                self.pos += 1;
                let inner = self.skip_balanced("(", ")")?;
                self.eat(";");
                let mut entity = AstEntity::new(EntityKind::StaticAssert, "");
                entity.value = Some(join_tokens(&inner));
                vec![entity]
            }
            "friend" => {
                self.pos += 1;
                vec![self.parse_friend(class_name)?]
            }
            _ => self.parse_member(class_name)?,
        };

        for entity in &mut entities {
            if entity.line == 0 {
                entity.line = line;
            }
        }
        Ok(entities)
    }

    fn parse_namespace(&mut self) -> ParseResult<Vec<AstEntity>> {
        self.expect("namespace")?;
        let mut names = Vec::new();
        while let Some(name) = self.peek_ident() {
            names.push(name.to_string());
            self.pos += 1;
            if !self.eat("::") {
                break;
            }
        }

        if self.eat("=") {
            let target = self.collect_until(&[";"])?;
            self.eat(";");
            let mut alias =
                AstEntity::new(EntityKind::NamespaceAlias, names.first().map_or("", |s| s.as_str()));
            alias.value = Some(join_tokens(&target));
            return Ok(vec![alias]);
        }

        if names.is_empty() {
            names.push(String::new());
        }
        for name in &names {
            self.scope.push(name.clone());
        }
        self.expect("{")?;
        let children = self.parse_declarations(None, Access::Public);
        for _ in &names {
            self.scope.pop();
        }
        let children = children?;
        self.expect("}")?;

        // `namespace A::B { }` nests B inside A.
        let mut entity: Option<AstEntity> = None;
        for name in names.iter().rev() {
            let mut ns = AstEntity::new(EntityKind::Namespace, name);
            ns.children = match entity.take() {
                Some(inner) => vec![inner],
                None => children.clone(),
            };
            entity = Some(ns);
        }
        Ok(entity.into_iter().collect())
    }

    fn parse_linkage(&mut self, class_name: Option<&str>) -> ParseResult<AstEntity> {
        self.expect("extern")?;
        let lang = self.next()?.text.trim_matches('"').to_string();
        let mut linkage = AstEntity::new(EntityKind::LanguageLinkage, &lang);
        if self.eat("{") {
            linkage.children = self.parse_declarations(class_name, Access::Public)?;
            self.expect("}")?;
        } else {
            linkage.children = self.parse_declaration(class_name)?;
        }
        Ok(linkage)
    }

    fn parse_template(&mut self, class_name: Option<&str>) -> ParseResult<Vec<AstEntity>> {
        self.expect("template")?;
        let params = self.parse_template_parameters()?;
        let specialization = params.is_empty();

        let inner = self.parse_declaration(class_name)?;
        let mut out = Vec::new();
        for mut entity in inner {
            let kind = match (entity.kind, specialization) {
                (EntityKind::Class, false) => EntityKind::ClassTemplate,
                (EntityKind::Class, true) | (EntityKind::ClassTemplateSpecialization, _) => {
                    EntityKind::ClassTemplateSpecialization
                }
                (k, false) if k.is_function_like() => EntityKind::FunctionTemplate,
                (k, true) if k.is_function_like() => EntityKind::FunctionTemplateSpecialization,
                (EntityKind::TypeAlias, _) => EntityKind::AliasTemplate,
                (k, _) if k.is_variable_like() => EntityKind::VariableTemplate,
                _ => {
                    out.push(entity);
                    continue;
                }
            };

            let mut wrapper = AstEntity::new(kind, &entity.name);
            wrapper.access = entity.access;
            wrapper.line = entity.line;
            if kind.is_container() {
                entity.templated = true;
                wrapper.children = params.clone();
                wrapper.children.push(entity);
            }
            out.push(wrapper);
        }
        Ok(out)
    }

    fn parse_template_parameters(&mut self) -> ParseResult<Vec<AstEntity>> {
        self.expect("<")?;
        let mut params = Vec::new();
        let mut depth = 1usize;
        let mut current: Vec<Token> = Vec::new();

        let flush = |current: &mut Vec<Token>, params: &mut Vec<AstEntity>| {
            if current.is_empty() {
                return;
            }
            let first = current[0].text.as_str();
            let kind = match first {
                "typename" | "class" => EntityKind::TemplateTypeParameter,
                "template" => EntityKind::TemplateTemplateParameter,
                _ => EntityKind::NonTypeTemplateParameter,
            };
            let stop = current
                .iter()
                .position(|t| t.text == "=")
                .unwrap_or(current.len());
            let name = current[..stop]
                .iter()
                .rev()
                .find(|t| t.kind == TokenKind::Ident)
                .map(|t| t.text.clone())
                .unwrap_or_default();
            let mut param = AstEntity::new(kind, &name);
            param.line = current[0].line;
            params.push(param);
            current.clear();
        };

        loop {
            let tok = self.next()?;
            match tok.text.as_str() {
                "<" => depth += 1,
                ">" => {
                    depth -= 1;
                    if depth == 0 {
                        flush(&mut current, &mut params);
                        return Ok(params);
                    }
                }
                "," if depth == 1 => {
                    flush(&mut current, &mut params);
                    continue;
                }
                _ => {}
            }
            current.push(tok);
        }
    }

    fn parse_friend(&mut self, class_name: Option<&str>) -> ParseResult<AstEntity> {
        let mut friend = AstEntity::new(EntityKind::Friend, "");
        if matches!(self.peek().map(|t| t.text.as_str()), Some("class" | "struct"))
            && self.peek_at(2).map_or(false, |t| t.text == ";")
        {
            self.pos += 1;
            friend.name = self.expect_ident()?;
            self.eat(";");
            return Ok(friend);
        }

        let inner = self.parse_declaration(class_name)?;
        for mut entity in inner {
            entity.friended = true;
            if friend.name.is_empty() {
                friend.name = entity.name.clone();
            }
            friend.children.push(entity);
        }
        Ok(friend)
    }

    fn parse_class_or_elaborated(
        &mut self,
        outer_class: Option<&str>,
    ) -> ParseResult<Vec<AstEntity>> {
        let start = self.pos;
        let keyword = self.next()?.text;
        let line = self.line();

        // Attributes and export macros before the class name.
        let mut names = Vec::new();
        loop {
            if self.peek_is("[[") {
                self.pos += 1;
                self.collect_until(&["]"])?;
                self.expect("]")?;
                self.expect("]")?;
                continue;
            }
            let Some(ident) = self.peek_ident().map(str::to_string) else {
                break;
            };
            self.pos += 1;
            if self.peek_is("(") {
                self.skip_balanced("(", ")")?;
                continue;
            }
            names.push(ident);
            while self.eat("::") {
                let part = self.expect_ident()?;
                if let Some(last) = names.last_mut() {
                    last.push_str("::");
                    last.push_str(&part);
                }
            }
        }

        let is_final = names.len() > 1 && names.last().map_or(false, |n| n == "final");
        if is_final {
            names.pop();
        }
        let name = names.pop().unwrap_or_default();

        let mut specialization = false;
        if self.peek_is("<") {
            self.parse_template_parameters()?;
            specialization = true;
            self.eat("final");
        }

        match self.peek().map(|t| t.text.as_str()) {
            Some("{") | Some(":") => {}
            Some(";") if names.iter().all(|n| EXPORT_MACRO_RE.is_match(n)) => {
                // Forward declaration.
                self.pos += 1;
                return Ok(Vec::new());
            }
            _ => {
                // `struct Foo value;` and friends: an elaborated type specifier.
                self.pos = start + 1;
                return self.parse_member(outer_class);
            }
        }

        let default_access = if keyword == "class" {
            Access::Private
        } else {
            Access::Public
        };

        let mut entity = AstEntity::new(
            if specialization {
                EntityKind::ClassTemplateSpecialization
            } else {
                EntityKind::Class
            },
            &name,
        );
        entity.line = line;
        entity.flags |= DeclFlags::DEFINITION;

        if self.eat(":") {
            loop {
                let mut base_access = default_access;
                let mut is_virtual = false;
                while let Some(word) = self.peek_ident() {
                    match word {
                        "public" => base_access = Access::Public,
                        "protected" => base_access = Access::Protected,
                        "private" => base_access = Access::Private,
                        "virtual" => is_virtual = true,
                        _ => break,
                    }
                    self.pos += 1;
                }
                let base_line = self.line();
                let ty = self.parse_type()?;
                let mut base = AstEntity::new(EntityKind::BaseClass, &ty.to_string());
                base.access = base_access;
                base.ty = Some(ty);
                base.line = base_line;
                if is_virtual {
                    base.flags |= DeclFlags::VIRTUAL;
                }
                entity.children.push(base);
                if !self.eat(",") {
                    break;
                }
            }
        }

        self.expect("{")?;
        self.scope.push(name.clone());
        let members = self.parse_declarations(Some(&name), default_access);
        self.scope.pop();
        entity.children.extend(members?);
        self.expect("}")?;

        if !specialization && !name.is_empty() {
            let qualified = self.qualified(&name);
            self.index.record(&qualified, self.path);
        }

        // Declarators after the body, `} instance;`.
        if !self.eat(";") {
            self.skip_declaration()?;
        }

        Ok(vec![entity])
    }

    fn parse_enum(&mut self) -> ParseResult<Vec<AstEntity>> {
        self.expect("enum")?;
        let line = self.line();
        let mut entity = AstEntity::new(EntityKind::Enum, "");
        if self.eat("class") || self.eat("struct") {
            entity.flags |= DeclFlags::SCOPED;
        }
        if let Some(name) = self.peek_ident() {
            entity.name = name.to_string();
            self.pos += 1;
        }
        if self.eat(":") {
            entity.ty = Some(self.parse_type()?);
        }
        if self.eat(";") {
            return Ok(Vec::new());
        }
        if !self.peek_is("{") {
            // `enum Mode value;`
            self.skip_declaration()?;
            return Ok(Vec::new());
        }

        self.expect("{")?;
        while !self.peek_is("}") {
            let value_line = self.line();
            let name = self.expect_ident()?;
            let mut value = AstEntity::new(EntityKind::EnumValue, &name);
            value.line = value_line;
            if self.eat("=") {
                let expr = self.collect_until(&[",", "}"])?;
                value.value = Some(join_tokens(&expr));
            }
            entity.children.push(value);
            if !self.eat(",") {
                break;
            }
        }
        self.expect("}")?;
        if !self.eat(";") {
            self.skip_declaration()?;
        }

        entity.line = line;
        entity.flags |= DeclFlags::DEFINITION;
        if !entity.name.is_empty() {
            let qualified = self.qualified(&entity.name);
            self.index.record(&qualified, self.path);
        }
        Ok(vec![entity])
    }

    fn parse_using(&mut self) -> ParseResult<Vec<AstEntity>> {
        self.expect("using")?;
        if self.eat("namespace") {
            let target = self.collect_until(&[";"])?;
            self.eat(";");
            return Ok(vec![AstEntity::new(
                EntityKind::UsingDirective,
                &join_tokens(&target),
            )]);
        }

        if self.peek_ident().is_some() && self.peek_at_is(1, "=") {
            let name = self.expect_ident()?;
            self.expect("=")?;
            let ty = self.parse_type()?;
            if !self.eat(";") {
                self.skip_declaration()?;
            }
            self.register_alias(&name, &ty);
            let mut alias = AstEntity::new(EntityKind::TypeAlias, &name);
            alias.ty = Some(ty);
            return Ok(vec![alias]);
        }

        let target = self.collect_until(&[";"])?;
        self.eat(";");
        Ok(vec![AstEntity::new(
            EntityKind::UsingDeclaration,
            &join_tokens(&target),
        )])
    }

    fn parse_typedef(&mut self) -> ParseResult<Vec<AstEntity>> {
        self.expect("typedef")?;
        let start = self.pos;
        let ty = match self.parse_type() {
            Ok(ty) => ty,
            Err(_) => {
                self.pos = start;
                self.skip_declaration()?;
                return Ok(vec![AstEntity::new(EntityKind::Unexposed, "typedef")]);
            }
        };
        if let Some((name, pointer)) = self.parse_function_pointer(&ty)? {
            if !self.eat(";") {
                self.skip_declaration()?;
            }
            self.register_alias(&name, &pointer);
            let mut alias = AstEntity::new(EntityKind::TypeAlias, &name);
            alias.ty = Some(pointer);
            return Ok(vec![alias]);
        }
        match self.peek_ident().map(str::to_string) {
            Some(name) if self.peek_at_is(1, ";") => {
                self.pos += 2;
                self.register_alias(&name, &ty);
                let mut alias = AstEntity::new(EntityKind::TypeAlias, &name);
                alias.ty = Some(ty);
                Ok(vec![alias])
            }
            _ => {
                // Array typedefs are not modelled.
                self.skip_declaration()?;
                Ok(vec![AstEntity::new(EntityKind::Unexposed, "typedef")])
            }
        }
    }

    fn register_alias(&mut self, name: &str, target: &CppType) {
        let qualified = self.qualified(name);
        self.aliases.insert(name.to_string(), target.clone());
        self.aliases.insert(qualified, target.clone());
    }

    /// Functions, methods, constructors, destructors and variables.
    fn parse_member(&mut self, class_name: Option<&str>) -> ParseResult<Vec<AstEntity>> {
        let start = self.pos;
        let mut flags = DeclFlags::empty();

        loop {
            if self.peek_is("[[") {
                self.pos += 1;
                self.collect_until(&["]"])?;
                self.expect("]")?;
                self.expect("]")?;
                continue;
            }
            let Some(word) = self.peek_ident() else {
                break;
            };
            let flag = match word {
                "static" => DeclFlags::STATIC,
                "virtual" => DeclFlags::VIRTUAL,
                "inline" | "__forceinline" => DeclFlags::INLINE,
                "explicit" => DeclFlags::EXPLICIT,
                "constexpr" => DeclFlags::CONSTEXPR,
                "extern" | "mutable" | "thread_local" => DeclFlags::empty(),
                w if EXPORT_MACRO_RE.is_match(w) => DeclFlags::empty(),
                _ => break,
            };
            flags |= flag;
            self.pos += 1;
        }

        // Destructor.
        if self.peek_is("~") {
            self.pos += 1;
            let name = format!("~{}", self.expect_ident()?);
            let mut entity = AstEntity::new(EntityKind::Destructor, &name);
            self.skip_balanced("(", ")")?;
            self.parse_function_tail(&mut entity)?;
            entity.flags |= flags;
            return Ok(vec![entity]);
        }

        // Constructor.
        if let (Some(class), Some(ident)) = (class_name, self.peek_ident()) {
            if ident == class && self.peek_at_is(1, "(") {
                self.pos += 1;
                let mut entity = AstEntity::new(EntityKind::Constructor, class);
                entity.parameters = self.parse_parameters()?;
                self.parse_function_tail(&mut entity)?;
                entity.flags |= flags;
                return Ok(vec![entity]);
            }
        }

        // Conversion operator.
        if self.peek_is("operator") {
            self.pos += 1;
            let ty = self.parse_type()?;
            let mut entity = AstEntity::new(EntityKind::ConversionOp, &format!("operator {}", ty));
            entity.return_type = Some(ty);
            entity.parameters = self.parse_parameters()?;
            self.parse_function_tail(&mut entity)?;
            entity.flags |= flags;
            return Ok(vec![entity]);
        }

        let base_type = match self.parse_type() {
            Ok(ty) => ty,
            Err(_) => {
                self.pos = start;
                self.skip_declaration()?;
                return Ok(vec![AstEntity::new(EntityKind::Unexposed, "")]);
            }
        };

        let mut out = Vec::new();
        let mut ty = base_type.clone();
        loop {
            // Operators.
            if self.peek_is("operator") {
                self.pos += 1;
                let mut name = String::from("operator");
                while !self.peek_is("(") || name == "operator" {
                    let tok = self.next()?;
                    name.push_str(&tok.text);
                    if tok.text == "(" {
                        self.expect(")")?;
                        name.push(')');
                    }
                }
                let mut entity = AstEntity::new(function_kind(class_name), &name);
                entity.return_type = Some(ty);
                entity.parameters = self.parse_parameters()?;
                self.parse_function_tail(&mut entity)?;
                entity.flags |= flags;
                out.push(entity);
                return Ok(out);
            }

            if let Some((name, pointer)) = self.parse_function_pointer(&ty)? {
                let kind = if class_name.is_some() {
                    EntityKind::MemberVariable
                } else {
                    EntityKind::Variable
                };
                let mut entity = AstEntity::new(kind, &name);
                entity.ty = Some(pointer);
                entity.flags |= flags;
                out.push(entity);
                if !self.eat(";") {
                    self.skip_declaration()?;
                }
                return Ok(out);
            }

            // Member pointers and other declarators are not modelled.
            let Some(name) = self.peek_ident().map(str::to_string) else {
                self.pos = start;
                self.skip_declaration()?;
                return Ok(vec![AstEntity::new(EntityKind::Unexposed, "")]);
            };
            self.pos += 1;

            if self.peek_is("::") {
                // Out-of-line member definition.
                self.skip_declaration()?;
                return Ok(out);
            }

            if self.peek_is("(") {
                let mut entity = AstEntity::new(function_kind(class_name), &name);
                entity.return_type = Some(ty);
                entity.parameters = self.parse_parameters()?;
                self.parse_function_tail(&mut entity)?;
                entity.flags |= flags;
                out.push(entity);
                return Ok(out);
            }

            let mut kind = if class_name.is_some() {
                EntityKind::MemberVariable
            } else {
                EntityKind::Variable
            };

            while self.peek_is("[") {
                let size = self.skip_balanced("[", "]")?;
                ty = CppType::Array {
                    element: Box::new(ty),
                    size: if size.is_empty() {
                        None
                    } else {
                        Some(join_tokens(&size))
                    },
                };
            }

            let mut value = None;
            if self.eat(":") {
                kind = EntityKind::Bitfield;
                self.collect_until(&[",", ";", "=", "{"])?;
            }
            if self.eat("=") {
                let expr = self.collect_until(&[",", ";"])?;
                value = Some(join_tokens(&expr));
            } else if self.peek_is("{") {
                let expr = self.skip_balanced("{", "}")?;
                value = Some(join_tokens(&expr));
            }

            let mut entity = AstEntity::new(kind, &name);
            entity.ty = Some(ty);
            entity.value = value;
            entity.flags |= flags;
            out.push(entity);

            if self.eat(",") {
                // Further declarators share the specifiers, not the indirections.
                ty = strip_declarator(&base_type);
                ty = self.parse_declarator_ops(ty);
                continue;
            }
            if !self.eat(";") {
                self.skip_declaration()?;
            }
            return Ok(out);
        }
    }

    /// `(*name)(args)` after a return type. The declarator name may be
    /// omitted; the type stays opaque.
    fn parse_function_pointer(
        &mut self,
        ret: &CppType,
    ) -> ParseResult<Option<(String, CppType)>> {
        if !(self.peek_is("(") && self.peek_at_is(1, "*")) {
            return Ok(None);
        }
        self.pos += 2;
        self.eat("const");
        let mut name = String::new();
        if let Some(ident) = self.peek_ident() {
            name = ident.to_string();
            self.pos += 1;
        }
        self.expect(")")?;
        let args = self.skip_balanced("(", ")")?;
        if self.eat("noexcept") && self.peek_is("(") {
            self.skip_balanced("(", ")")?;
        }
        let spelling = format!("{} (*)({})", ret, join_tokens(&args));
        Ok(Some((name, CppType::Unexposed { spelling })))
    }

    fn parse_parameters(&mut self) -> ParseResult<Vec<AstParameter>> {
        self.expect("(")?;
        let mut params = Vec::new();
        if self.eat(")") {
            return Ok(params);
        }
        if self.peek_is("void") && self.peek_at_is(1, ")") {
            self.pos += 2;
            return Ok(params);
        }

        loop {
            if self.eat("...") {
                params.push(AstParameter {
                    name: String::new(),
                    ty: CppType::Unexposed {
                        spelling: "...".to_string(),
                    },
                    default_value: None,
                });
            } else {
                while self.peek_is("[[") {
                    self.pos += 1;
                    self.collect_until(&["]"])?;
                    self.expect("]")?;
                    self.expect("]")?;
                }
                let mut ty = self.parse_type()?;
                let mut name = String::new();
                if let Some((pointer_name, pointer)) = self.parse_function_pointer(&ty)? {
                    name = pointer_name;
                    ty = pointer;
                } else if let Some(ident) = self.peek_ident() {
                    name = ident.to_string();
                    self.pos += 1;
                }
                while self.peek_is("[") {
                    self.skip_balanced("[", "]")?;
                    ty = CppType::pointer(ty);
                }
                let mut default_value = None;
                if self.eat("=") {
                    let expr = self.collect_until(&[",", ")"])?;
                    default_value = Some(join_tokens(&expr));
                }
                params.push(AstParameter {
                    name,
                    ty,
                    default_value,
                });
            }

            if self.eat(",") {
                continue;
            }
            self.expect(")")?;
            return Ok(params);
        }
    }

    /// Qualifiers, pure/default/delete markers, initializer lists and body.
    fn parse_function_tail(&mut self, entity: &mut AstEntity) -> ParseResult<()> {
        loop {
            match self.peek().map(|t| t.text.as_str()) {
                Some("const") => {
                    entity.flags |= DeclFlags::CONST;
                    self.pos += 1;
                }
                Some("noexcept") | Some("throw") => {
                    self.pos += 1;
                    if self.peek_is("(") {
                        self.skip_balanced("(", ")")?;
                    }
                }
                Some("override") | Some("final") | Some("volatile") | Some("&")
                | Some("&&") => {
                    if matches!(self.peek().map(|t| t.text.as_str()), Some("override")) {
                        entity.flags |= DeclFlags::VIRTUAL;
                    }
                    self.pos += 1;
                }
                Some("->") => {
                    self.pos += 1;
                    entity.return_type = Some(self.parse_type()?);
                }
                Some("=") => {
                    self.pos += 1;
                    let tok = self.next()?;
                    match tok.text.as_str() {
                        "0" => entity.flags |= DeclFlags::PURE | DeclFlags::VIRTUAL,
                        "default" => entity.flags |= DeclFlags::DEFAULTED,
                        "delete" => entity.flags |= DeclFlags::DELETED,
                        _ => {}
                    }
                }
                Some(":") => {
                    // Constructor initializer list runs up to the body.
                    self.pos += 1;
                    while !self.peek_is("{") {
                        let tok = self.next()?;
                        if self.peek_is("(") {
                            self.skip_balanced("(", ")")?;
                        } else if tok.kind == TokenKind::Ident && self.peek_is("{") {
                            // Brace-initialized member: `x_{0}`.
                            self.skip_balanced("{", "}")?;
                        }
                    }
                }
                Some("{") => {
                    self.skip_balanced("{", "}")?;
                    self.eat(";");
                    entity.flags |= DeclFlags::DEFINITION;
                    return Ok(());
                }
                Some(";") => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => return Err(self.error("malformed function declaration".to_string())),
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Types
    // ───────────────────────────────────────────────────────────────────────────

    fn parse_type(&mut self) -> ParseResult<CppType> {
        let mut is_const = false;
        let mut is_volatile = false;
        loop {
            match self.peek().map(|t| t.text.as_str()) {
                Some("const") => is_const = true,
                Some("volatile") => is_volatile = true,
                Some("typename") | Some("struct") | Some("class") | Some("enum") => {}
                _ => break,
            }
            self.pos += 1;
        }

        let mut ty = self.parse_base_type()?;

        loop {
            match self.peek().map(|t| t.text.as_str()) {
                Some("const") => is_const = true,
                Some("volatile") => is_volatile = true,
                _ => break,
            }
            self.pos += 1;
        }
        if is_const || is_volatile {
            ty = CppType::CvQualified {
                inner: Box::new(ty),
                is_const,
                is_volatile,
            };
        }

        Ok(self.parse_declarator_ops(ty))
    }

    fn parse_declarator_ops(&mut self, mut ty: CppType) -> CppType {
        loop {
            match self.peek().map(|t| t.text.as_str()) {
                Some("*") => {
                    self.pos += 1;
                    ty = CppType::pointer(ty);
                    let mut is_const = false;
                    let mut is_volatile = false;
                    loop {
                        match self.peek().map(|t| t.text.as_str()) {
                            Some("const") => is_const = true,
                            Some("volatile") => is_volatile = true,
                            _ => break,
                        }
                        self.pos += 1;
                    }
                    if is_const || is_volatile {
                        ty = CppType::CvQualified {
                            inner: Box::new(ty),
                            is_const,
                            is_volatile,
                        };
                    }
                }
                Some("&") => {
                    self.pos += 1;
                    ty = CppType::Reference {
                        referee: Box::new(ty),
                        ref_kind: RefKind::LValue,
                    };
                }
                Some("&&") => {
                    self.pos += 1;
                    ty = CppType::Reference {
                        referee: Box::new(ty),
                        ref_kind: RefKind::RValue,
                    };
                }
                _ => return ty,
            }
        }
    }

    fn parse_base_type(&mut self) -> ParseResult<CppType> {
        // Builtin keyword sequences: `unsigned long long int`.
        let mut words = Vec::new();
        while let Some(word) = self.peek_ident() {
            if !BUILTIN_WORDS.contains(word) {
                break;
            }
            words.push(word.to_string());
            self.pos += 1;
        }
        if !words.is_empty() {
            return builtin_from_words(&words).map(CppType::builtin).ok_or_else(|| {
                self.error(format!("unsupported builtin type '{}'", words.join(" ")))
            });
        }

        match self.peek_ident() {
            Some("auto") => {
                self.pos += 1;
                return Ok(CppType::Unexposed {
                    spelling: "auto".to_string(),
                });
            }
            Some("decltype") => {
                self.pos += 1;
                let inner = self.skip_balanced("(", ")")?;
                return Ok(CppType::Unexposed {
                    spelling: format!("decltype({})", join_tokens(&inner)),
                });
            }
            _ => {}
        }

        let mut name = String::new();
        if self.eat("::") {
            name.push_str("::");
        }
        loop {
            let part = self.expect_ident()?;
            name.push_str(&part);

            if self.peek_is("<") {
                let arguments = self.parse_template_arguments()?;
                if self.peek_is("::") {
                    // Dependent member of an instantiation: keep the spelling.
                    self.pos += 1;
                    let rest = self.expect_ident()?;
                    let args = arguments
                        .iter()
                        .map(|a| a.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    return Ok(CppType::Unexposed {
                        spelling: format!("{}<{}>::{}", name, args, rest),
                    });
                }
                return Ok(CppType::TemplateInstantiation {
                    template: name,
                    arguments,
                });
            }

            if self.peek_is("::") && self.peek_at(1).map_or(false, |t| t.kind == TokenKind::Ident)
            {
                self.pos += 1;
                name.push_str("::");
                continue;
            }
            break;
        }

        if name == "std::nullptr_t" || name == "nullptr_t" {
            return Ok(CppType::builtin(BuiltinKind::Nullptr));
        }
        let canonical = match self.aliases.get(&name) {
            Some(target) => Some(target.clone()),
            None => self.aliases.get(&self.qualified(&name)).cloned(),
        }
        .map(Box::new);
        Ok(CppType::UserDefined { name, canonical })
    }

    fn parse_template_arguments(&mut self) -> ParseResult<Vec<CppType>> {
        self.expect("<")?;
        let mut arguments = Vec::new();
        if self.eat(">") {
            return Ok(arguments);
        }
        loop {
            let start = self.pos;
            let is_type = self
                .peek()
                .map_or(false, |t| t.kind == TokenKind::Ident || t.text == "::");
            let parsed = if is_type { self.parse_type().ok() } else { None };
            let arg = match parsed {
                Some(ty) if self.peek_is(",") || self.peek_is(">") => ty,
                _ => {
                    self.pos = start;
                    let expr = self.collect_until(&[",", ">"])?;
                    CppType::Unexposed {
                        spelling: join_tokens(&expr),
                    }
                }
            };
            arguments.push(arg);
            if self.eat(",") {
                continue;
            }
            self.expect(">")?;
            return Ok(arguments);
        }
    }
}

/// The specifier part of a declarator's type, shared by `int* a, b;`.
fn strip_declarator(ty: &CppType) -> CppType {
    match ty {
        CppType::Pointer { pointee } => strip_declarator(pointee),
        CppType::Reference { referee, .. } => strip_declarator(referee),
        CppType::Array { element, .. } => strip_declarator(element),
        CppType::CvQualified { inner, .. }
            if matches!(**inner, CppType::Pointer { .. } | CppType::Reference { .. }) =>
        {
            strip_declarator(inner)
        }
        other => other.clone(),
    }
}

fn function_kind(class_name: Option<&str>) -> EntityKind {
    if class_name.is_some() {
        EntityKind::MemberFunction
    } else {
        EntityKind::Function
    }
}

fn builtin_from_words(words: &[String]) -> Option<BuiltinKind> {
    let count = |w: &str| words.iter().filter(|x| x.as_str() == w).count();
    let unsigned = count("unsigned") > 0;
    let signed = count("signed") > 0;
    let longs = count("long");

    let kind = if count("void") > 0 {
        BuiltinKind::Void
    } else if count("bool") > 0 {
        BuiltinKind::Bool
    } else if count("wchar_t") > 0 {
        BuiltinKind::WChar
    } else if count("char16_t") > 0 {
        BuiltinKind::Char16
    } else if count("char32_t") > 0 {
        BuiltinKind::Char32
    } else if count("float") > 0 {
        BuiltinKind::Float
    } else if count("double") > 0 {
        if longs > 0 {
            BuiltinKind::LongDouble
        } else {
            BuiltinKind::Double
        }
    } else if count("char") > 0 {
        if unsigned {
            BuiltinKind::UChar
        } else if signed {
            BuiltinKind::SChar
        } else {
            BuiltinKind::Char
        }
    } else if count("short") > 0 {
        if unsigned {
            BuiltinKind::UShort
        } else {
            BuiltinKind::Short
        }
    } else if longs >= 2 {
        if unsigned {
            BuiltinKind::ULongLong
        } else {
            BuiltinKind::LongLong
        }
    } else if longs == 1 {
        if unsigned {
            BuiltinKind::ULong
        } else {
            BuiltinKind::Long
        }
    } else if count("int") > 0 || unsigned || signed {
        if unsigned {
            BuiltinKind::UInt
        } else {
            BuiltinKind::Int
        }
    } else {
        return None;
    };
    Some(kind)
}
