//! Type annotation parsing.
//!
//! The lexer hands over a whole annotation such as `!array<!int,4>` as one
//! `Type` token whose payload is the text after the leading `!`. This module
//! parses that text:
//!
//! ```text
//! type  := name ( '<' args '>' )?
//! arg   := '!'? type | integer | identifier
//! fn    := 'fn' '<' ( arg (',' arg)* )? '->' arg '>'
//! ```

use kiln_ir::{LenExpr, Span, StringInterner, TokenKind, TypeExpr};

use crate::{ParseError, ParseErrorKind, Parser};

struct TypeText<'s> {
    text: &'s str,
    pos: usize,
    interner: &'s StringInterner,
}

type TyResult<T> = Result<T, String>;

impl<'s> TypeText<'s> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.text[self.pos..].starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> TyResult<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(format!("expected `{c}` at offset {}", self.pos))
        }
    }

    fn word(&mut self) -> &'s str {
        let rest = &self.text[self.pos..];
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn parse_arg_type(&mut self) -> TyResult<TypeExpr> {
        self.eat('!');
        self.parse_type()
    }

    fn parse_type(&mut self) -> TyResult<TypeExpr> {
        let name = self.word();
        if name.is_empty() {
            return Err("missing type name".to_string());
        }
        match name {
            "int" | "frac" => {
                if self.eat('<') {
                    let bits = self.parse_number()?;
                    self.expect('>')?;
                    let bits = u32::try_from(bits).map_err(|_| "bit width too large".to_string())?;
                    sized(name, bits)
                } else if name == "int" {
                    Ok(TypeExpr::Int)
                } else {
                    Ok(TypeExpr::Frac)
                }
            }
            "bool" => Ok(TypeExpr::Bool),
            "str" => Ok(TypeExpr::Str),
            "ptr" => Ok(TypeExpr::Ptr),
            "none" => Ok(TypeExpr::None),
            "array" => {
                self.expect('<')?;
                let elem = self.parse_arg_type()?;
                self.expect(',')?;
                let len = self.parse_len()?;
                self.expect('>')?;
                Ok(TypeExpr::Array(Box::new(elem), len))
            }
            "tuple" => {
                self.expect('<')?;
                let mut elems = vec![self.parse_arg_type()?];
                while self.eat(',') {
                    elems.push(self.parse_arg_type()?);
                }
                self.expect('>')?;
                Ok(TypeExpr::Tuple(elems))
            }
            "fn" => {
                self.expect('<')?;
                let mut params = Vec::new();
                if !self.eat_str("->") {
                    params.push(self.parse_arg_type()?);
                    while self.eat(',') {
                        params.push(self.parse_arg_type()?);
                    }
                    if !self.eat_str("->") {
                        return Err("expected `->` in function type".to_string());
                    }
                }
                let ret = self.parse_arg_type()?;
                self.expect('>')?;
                Ok(TypeExpr::Fn(params, Box::new(ret)))
            }
            other if other.starts_with(|c: char| c.is_ascii_uppercase()) => {
                Ok(TypeExpr::Var(self.interner.intern(other)))
            }
            other => Err(format!("unknown type `{other}`")),
        }
    }

    fn parse_number(&mut self) -> TyResult<u64> {
        let word = self.word();
        word.parse::<u64>()
            .map_err(|_| format!("expected a number, found `{word}`"))
    }

    fn parse_len(&mut self) -> TyResult<LenExpr> {
        match self.peek() {
            Some(c) if c.is_ascii_digit() => Ok(LenExpr::Fixed(self.parse_number()?)),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let word = self.word();
                Ok(LenExpr::Var(self.interner.intern(word)))
            }
            _ => Err("expected array length".to_string()),
        }
    }
}

fn sized(base: &str, bits: u32) -> TyResult<TypeExpr> {
    match (base, bits) {
        ("int", 8 | 16 | 32 | 64) => Ok(TypeExpr::SizedInt(bits)),
        ("frac", 32 | 64) => Ok(TypeExpr::SizedFrac(bits)),
        _ => Err(format!("unsupported size `{bits}` for `{base}`")),
    }
}

/// Parse the payload of a `Type` token.
pub(crate) fn parse_type_text(
    text: &str,
    span: Span,
    interner: &StringInterner,
) -> Result<TypeExpr, ParseError> {
    let mut parser = TypeText {
        text,
        pos: 0,
        interner,
    };
    let result = parser.parse_type().and_then(|ty| {
        if parser.pos == text.len() {
            Ok(ty)
        } else {
            Err(format!("unexpected `{}`", &text[parser.pos..]))
        }
    });
    result.map_err(|msg| ParseError::new(span, ParseErrorKind::InvalidType(msg)))
}

impl Parser<'_> {
    /// Consume a `Type` token and parse it.
    pub(crate) fn parse_type_annotation(&mut self) -> Result<TypeExpr, ParseError> {
        let token = self.cursor.current();
        match token.kind {
            TokenKind::Type(name) => {
                self.cursor.advance();
                parse_type_text(self.interner.lookup(name), token.span, self.interner)
            }
            _ => Err(self.unexpected("type annotation")),
        }
    }

    /// Parse an optional `-> !type` return annotation.
    pub(crate) fn parse_return_annotation(&mut self) -> Result<Option<TypeExpr>, ParseError> {
        if self.cursor.check(TokenKind::Arrow) {
            self.cursor.advance();
            self.parse_type_annotation().map(Some)
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn ty(text: &str) -> Result<TypeExpr, ParseErrorKind> {
        let interner = StringInterner::new();
        parse_type_text(text, Span::DUMMY, &interner).map_err(|e| e.kind)
    }

    #[test]
    fn primitives_and_sized() {
        assert_eq!(ty("int"), Ok(TypeExpr::Int));
        assert_eq!(ty("frac<32>"), Ok(TypeExpr::SizedFrac(32)));
        assert_eq!(ty("int<8>"), Ok(TypeExpr::SizedInt(8)));
        assert!(ty("int<7>").is_err());
    }

    #[test]
    fn nested_aggregates() {
        assert_eq!(
            ty("array<!array<!int,2>,3>"),
            Ok(TypeExpr::Array(
                Box::new(TypeExpr::Array(Box::new(TypeExpr::Int), LenExpr::Fixed(2))),
                LenExpr::Fixed(3)
            ))
        );
        assert_eq!(
            ty("tuple<!int,!bool>"),
            Ok(TypeExpr::Tuple(vec![TypeExpr::Int, TypeExpr::Bool]))
        );
    }

    #[test]
    fn function_types() {
        assert_eq!(
            ty("fn<!int,!frac->!bool>"),
            Ok(TypeExpr::Fn(
                vec![TypeExpr::Int, TypeExpr::Frac],
                Box::new(TypeExpr::Bool)
            ))
        );
        assert_eq!(
            ty("fn<->!none>"),
            Ok(TypeExpr::Fn(vec![], Box::new(TypeExpr::None)))
        );
    }

    #[test]
    fn generic_variables() {
        let interner = StringInterner::new();
        let parsed = parse_type_text("array<!T,N>", Span::DUMMY, &interner).map_err(|e| e.kind);
        assert_eq!(
            parsed,
            Ok(TypeExpr::Array(
                Box::new(TypeExpr::Var(interner.intern("T"))),
                LenExpr::Var(interner.intern("N"))
            ))
        );
    }

    #[test]
    fn unknown_and_trailing_text() {
        assert!(matches!(ty("widget"), Err(ParseErrorKind::InvalidType(_))));
        assert!(matches!(ty("int>"), Err(ParseErrorKind::InvalidType(_))));
    }
}
