//! Recursive-descent parser for the canonical schema form

use super::{AliasInfo, Argument, DefaultValue, Schema, TypeKind};
use crate::error::ParseError;

/// Upper bound on `N` in `int[N]`; scalar defaults are expanded to N items
const MAX_FIXED_LIST_LEN: usize = 1024;

type PResult<T> = Result<T, ParseError>;

pub(super) fn parse_schema(text: &str) -> PResult<Schema> {
    let mut parser = Parser::new(text);
    let schema = parser.schema()?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(schema)
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            offset: self.pos,
            text: self.text.to_string(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    /// Next byte without skipping whitespace
    fn peek_raw(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.peek_raw()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek_raw(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> PResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{}`", token)))
        }
    }

    fn at_ident_start(&mut self) -> bool {
        matches!(self.peek(), Some(c) if c.is_ascii_alphabetic() || c == b'_')
    }

    /// `[A-Za-z_][A-Za-z0-9_]*`, optionally with interior dots
    fn word(&mut self, allow_dots: bool, what: &str) -> PResult<&'a str> {
        if !self.at_ident_start() {
            return Err(self.error(format!("expected {}", what)));
        }
        let start = self.pos;
        while let Some(c) = self.peek_raw() {
            let dotted = allow_dots
                && c == b'.'
                && self
                    .text
                    .as_bytes()
                    .get(self.pos + 1)
                    .is_some_and(|n| n.is_ascii_alphabetic() || *n == b'_');
            if c.is_ascii_alphanumeric() || c == b'_' || dotted {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(&self.text[start..self.pos])
    }

    fn ident(&mut self) -> PResult<&'a str> {
        self.word(false, "identifier")
    }

    fn schema(&mut self) -> PResult<Schema> {
        let mut name = self.ident()?.to_string();
        if self.eat("::") {
            name = format!("{}::{}", name, self.ident()?);
        }
        let overload_name = if self.eat(".") {
            self.ident()?.to_string()
        } else {
            String::new()
        };

        self.expect("(")?;
        let (arguments, is_vararg) = self.arguments()?;
        self.expect(")")?;
        self.expect("->")?;
        let (returns, is_varret) = self.returns()?;

        Ok(Schema {
            name,
            overload_name,
            arguments,
            returns,
            is_vararg,
            is_varret,
        })
    }

    fn arguments(&mut self) -> PResult<(Vec<Argument>, bool)> {
        let mut arguments = Vec::new();
        let mut kwarg_only = false;
        let mut is_vararg = false;
        if self.peek() == Some(b')') {
            return Ok((arguments, is_vararg));
        }
        loop {
            if is_vararg {
                return Err(self.error("`...` must be the last argument"));
            }
            if self.eat("...") {
                is_vararg = true;
            } else if self.eat("*") {
                if kwarg_only {
                    return Err(self.error("duplicate `*` marker"));
                }
                kwarg_only = true;
            } else {
                let mut arg = self.argument()?;
                arg.kwarg_only = kwarg_only;
                arguments.push(arg);
            }
            if !self.eat(",") {
                return Ok((arguments, is_vararg));
            }
        }
    }

    fn argument(&mut self) -> PResult<Argument> {
        let (ty, alias_info, fixed_len) = self.annotated_type()?;
        let name = self.word(false, "argument name")?.to_string();
        let default = if self.eat("=") {
            let value = self.default_value()?;
            Some(coerce_default(value, &ty, fixed_len))
        } else {
            None
        };
        Ok(Argument {
            name,
            ty,
            fixed_len,
            default,
            kwarg_only: false,
            alias_info,
        })
    }

    fn returns(&mut self) -> PResult<(Vec<Argument>, bool)> {
        if self.eat("...") {
            return Ok((Vec::new(), true));
        }
        if !self.eat("(") {
            return Ok((vec![self.return_value(false)?], false));
        }
        let mut returns = Vec::new();
        if self.eat(")") {
            return Ok((returns, false));
        }
        loop {
            returns.push(self.return_value(true)?);
            if !self.eat(",") {
                break;
            }
        }
        self.expect(")")?;
        Ok((returns, false))
    }

    fn return_value(&mut self, allow_name: bool) -> PResult<Argument> {
        let (ty, alias_info, fixed_len) = self.annotated_type()?;
        let name = if allow_name && self.at_ident_start() {
            self.ident()?.to_string()
        } else {
            String::new()
        };
        Ok(Argument {
            name,
            ty,
            fixed_len,
            default: None,
            kwarg_only: false,
            alias_info,
        })
    }

    /// A type together with its alias annotation and fixed list length
    fn annotated_type(&mut self) -> PResult<(TypeKind, Option<AliasInfo>, Option<usize>)> {
        let (mut ty, mut alias) = self.base_type()?;
        let mut fixed_len = None;
        loop {
            if self.eat("[") {
                if fixed_len.is_some() {
                    return Err(self.error("fixed-size lists may only appear outermost"));
                }
                fixed_len = self.optional_len()?;
                self.expect("]")?;
                ty = TypeKind::list(ty);
                alias = alias.map(|elem| AliasInfo {
                    contained: vec![elem],
                    ..AliasInfo::default()
                });
                if self.peek_raw() == Some(b'(') {
                    let own = self.alias_annotation()?;
                    let container = alias.get_or_insert_with(AliasInfo::default);
                    container.before_sets = own.before_sets;
                    container.after_sets = own.after_sets;
                    container.is_write = own.is_write;
                }
            } else if self.eat("?") {
                ty = TypeKind::optional(ty);
            } else {
                return Ok((ty, alias, fixed_len));
            }
        }
    }

    /// A type inside a tuple, dict or future; annotations are not allowed there
    fn inner_type(&mut self) -> PResult<TypeKind> {
        let (ty, alias, fixed_len) = self.annotated_type()?;
        if alias.is_some() || fixed_len.is_some() {
            return Err(self.error("annotations are not supported inside container types"));
        }
        Ok(ty)
    }

    fn base_type(&mut self) -> PResult<(TypeKind, Option<AliasInfo>)> {
        if self.eat("(") {
            let mut elems = Vec::new();
            if !self.eat(")") {
                loop {
                    elems.push(self.inner_type()?);
                    if !self.eat(",") {
                        break;
                    }
                }
                self.expect(")")?;
            }
            return Ok((TypeKind::Tuple(elems), None));
        }

        let ident = self.word(true, "type")?;
        let constructor = self.peek_raw() == Some(b'(');
        match ident {
            "Dict" if constructor => {
                self.expect("(")?;
                let key = self.inner_type()?;
                self.expect(",")?;
                let value = self.inner_type()?;
                self.expect(")")?;
                Ok((TypeKind::Dict(Box::new(key), Box::new(value)), None))
            }
            "Future" if constructor => {
                self.expect("(")?;
                let inner = self.inner_type()?;
                self.expect(")")?;
                Ok((TypeKind::Future(Box::new(inner)), None))
            }
            other => {
                let alias = if constructor {
                    Some(self.alias_annotation()?)
                } else {
                    None
                };
                Ok((TypeKind::from_ident(other), alias))
            }
        }
    }

    fn optional_len(&mut self) -> PResult<Option<usize>> {
        self.skip_ws();
        let start = self.pos;
        while matches!(self.peek_raw(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Ok(None);
        }
        match self.text[start..self.pos].parse::<usize>() {
            Ok(n) if n <= MAX_FIXED_LIST_LEN => Ok(Some(n)),
            _ => Err(self.error("invalid list length")),
        }
    }

    /// `(a)`, `(a!)`, `(a|b)`, `(*)`, `(a -> *)`
    fn alias_annotation(&mut self) -> PResult<AliasInfo> {
        self.expect("(")?;
        let before_sets = self.alias_sets()?;
        let mut is_write = self.eat("!");
        let after_sets = if self.eat("->") {
            let sets = self.alias_sets()?;
            is_write |= self.eat("!");
            sets
        } else {
            before_sets.clone()
        };
        self.expect(")")?;
        Ok(AliasInfo {
            before_sets,
            after_sets,
            is_write,
            contained: Vec::new(),
        })
    }

    fn alias_sets(&mut self) -> PResult<Vec<String>> {
        if self.eat("*") {
            return Ok(vec!["*".to_string()]);
        }
        let mut sets = vec![self.ident()?.to_string()];
        while self.eat("|") {
            sets.push(self.ident()?.to_string());
        }
        Ok(sets)
    }

    fn default_value(&mut self) -> PResult<DefaultValue> {
        match self.peek() {
            Some(b'[') => {
                self.pos += 1;
                let mut items = Vec::new();
                if self.eat("]") {
                    return Ok(DefaultValue::List(items));
                }
                loop {
                    items.push(self.default_value()?);
                    if !self.eat(",") {
                        break;
                    }
                }
                self.expect("]")?;
                Ok(DefaultValue::List(items))
            }
            Some(quote @ (b'"' | b'\'')) => self.string_literal(quote as char),
            Some(c) if c == b'-' || c.is_ascii_digit() => self.number(),
            Some(_) if self.at_ident_start() => {
                let word = self.word(true, "default value")?;
                Ok(match word {
                    "None" => DefaultValue::None,
                    "True" => DefaultValue::Bool(true),
                    "False" => DefaultValue::Bool(false),
                    "inf" => DefaultValue::Float(f64::INFINITY),
                    "nan" => DefaultValue::Float(f64::NAN),
                    other => DefaultValue::Ident(other.to_string()),
                })
            }
            _ => Err(self.error("expected default value")),
        }
    }

    fn string_literal(&mut self, quote: char) -> PResult<DefaultValue> {
        let start = self.pos;
        let mut value = String::new();
        let mut chars = self.rest().char_indices().skip(1);
        while let Some((offset, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, escaped)) => value.push(escaped),
                    None => break,
                },
                c if c == quote => {
                    self.pos = start + offset + c.len_utf8();
                    return Ok(DefaultValue::Str(value));
                }
                c => value.push(c),
            }
        }
        Err(self.error("unterminated string literal"))
    }

    fn number(&mut self) -> PResult<DefaultValue> {
        let start = self.pos;
        if self.rest().starts_with("-inf") {
            self.pos += 4;
            return Ok(DefaultValue::Float(f64::NEG_INFINITY));
        }
        if self.peek_raw() == Some(b'-') {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(c) = self.peek_raw() {
            match c {
                b'0'..=b'9' => {}
                b'.' => is_float = true,
                b'e' | b'E' => {
                    is_float = true;
                    if matches!(self.text.as_bytes().get(self.pos + 1), Some(b'+' | b'-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
            self.pos += 1;
        }
        let literal = &self.text[start..self.pos];
        let parsed = if is_float {
            literal.parse().map(DefaultValue::Float).ok()
        } else {
            literal.parse().map(DefaultValue::Int).ok()
        };
        parsed.ok_or_else(|| self.error(format!("invalid number `{}`", literal)))
    }
}

/// Normalize a default to its argument type: ints become floats for
/// `float` arguments, and a scalar for an `int[N]` expands to N copies.
fn coerce_default(value: DefaultValue, ty: &TypeKind, fixed_len: Option<usize>) -> DefaultValue {
    match (ty.strip_optional(), value) {
        (_, DefaultValue::None) => DefaultValue::None,
        (TypeKind::Float, DefaultValue::Int(v)) => DefaultValue::Float(v as f64),
        (TypeKind::List(elem), DefaultValue::List(items)) => DefaultValue::List(
            items
                .into_iter()
                .map(|item| coerce_default(item, elem, None))
                .collect(),
        ),
        (TypeKind::List(elem), scalar) => match fixed_len {
            Some(n) => DefaultValue::List(vec![coerce_default(scalar, elem, None); n]),
            None => scalar,
        },
        (_, value) => value,
    }
}
