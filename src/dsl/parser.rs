//! Parser for the design text.

use std::collections::HashMap;

use super::ast::*;
use super::lexer::{parse_coord, parse_value, Lexer, Token, TokenKind};
use crate::design::Rect;
use crate::error::{IrError, Result};

/// Line-oriented parser for design text.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
}

impl<'a> Parser<'a> {
    pub fn new(lexer: Lexer<'a>) -> Self {
        Self { lexer }
    }

    /// Parse the whole design description.
    pub fn parse(&mut self) -> Result<DesignAst> {
        let mut ast = DesignAst::new();

        loop {
            let (tokens, at_eof) = self.next_line()?;
            if !tokens.is_empty() {
                let mut line = LineCursor::new(tokens);
                self.parse_directive(&mut line, &mut ast)?;
            }
            if at_eof {
                break;
            }
        }

        Ok(ast)
    }

    fn next_line(&mut self) -> Result<(Vec<Token>, bool)> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.lexer.next_token()?;
            match tok.kind {
                TokenKind::Newline => return Ok((tokens, false)),
                TokenKind::Eof => return Ok((tokens, true)),
                _ => tokens.push(tok),
            }
        }
    }

    fn parse_directive(&mut self, line: &mut LineCursor, ast: &mut DesignAst) -> Result<()> {
        let head = line.next_token()?;
        if head.kind != TokenKind::Directive {
            return Err(IrError::parse(
                head.line,
                format!("expected a directive, got '{}'", head.text),
            ));
        }
        let line_no = head.line;

        match head.text.to_lowercase().as_str() {
            ".units" => {
                let dbu = line.coord()?;
                if dbu <= 0 {
                    return Err(IrError::parse(line_no, "database units per micron must be positive"));
                }
                ast.dbu_per_micron = Some(dbu);
            }
            ".die" => {
                ast.die = Some(line.rect()?);
            }
            ".layer" => {
                let name = line.identifier()?;
                let params = line.params()?;
                ast.layers.push(LayerDef {
                    name,
                    params,
                    line: line_no,
                });
            }
            ".net" => {
                let name = line.identifier()?;
                let kind = line.identifier()?;
                let voltage = if line.at_end() { None } else { Some(line.value()?) };
                ast.nets.push(NetDef {
                    name,
                    kind,
                    voltage,
                    line: line_no,
                });
            }
            ".supply" => {
                let voltage = line.value()?;
                let corner = line.named_identifiers("corner")?.into_iter().next();
                ast.supplies.insert(corner, voltage);
            }
            ".wire" => {
                let net = line.identifier()?;
                let layer = line.identifier()?;
                let rect = line.rect()?;
                ast.wires.push(WireDef {
                    net,
                    layer,
                    rect,
                    line: line_no,
                });
            }
            ".via" => {
                ast.vias.push(self.parse_via(line, line_no)?);
            }
            ".macro" => {
                let name = line.identifier()?;
                let rect = line.rect()?;
                let mut level = None;
                let mut pass_through = Vec::new();
                while !line.at_end() {
                    let (key, value) = line.key_value()?;
                    match key.as_str() {
                        "level" => {
                            let parsed = parse_coord(&value.text)
                                .filter(|l| *l > 0)
                                .ok_or_else(|| IrError::parse(line_no, format!("invalid macro level '{}'", value.text)))?;
                            level = Some(parsed as u32);
                        }
                        "pass" => pass_through.push(value.text),
                        _ => {
                            return Err(IrError::parse(line_no, format!("unknown macro parameter '{}'", key)));
                        }
                    }
                }
                ast.macros.push(MacroDef {
                    name,
                    rect,
                    level,
                    pass_through,
                    line: line_no,
                });
            }
            ".pin" => {
                let net = line.identifier()?;
                let layer = line.identifier()?;
                let rect = line.rect()?;
                ast.pins.push(PinDef {
                    net,
                    layer,
                    rect,
                    line: line_no,
                });
            }
            ".inst" => {
                let name = line.identifier()?;
                let rect = line.rect()?;
                let power = line.value()?;
                let nets = line.named_identifiers("net")?;
                ast.instances.push(InstDef {
                    name,
                    rect,
                    power,
                    nets,
                    line: line_no,
                });
            }
            ".power" => {
                let instance = line.identifier()?;
                let corner = line.identifier()?;
                let power = line.value()?;
                ast.corner_powers.push(CornerPowerDef {
                    instance,
                    corner,
                    power,
                    line: line_no,
                });
            }
            ".parasitic" => {
                let net = line.identifier()?;
                let layer = line.identifier()?;
                let from = (line.coord()?, line.coord()?);
                let to = (line.coord()?, line.coord()?);
                let resistance = line.value()?;
                ast.parasitics.push(ParasiticDef {
                    net,
                    layer,
                    from,
                    to,
                    resistance,
                    line: line_no,
                });
            }
            other => {
                return Err(IrError::parse(line_no, format!("unknown directive: {}", other)));
            }
        }

        if !line.at_end() {
            let extra = line.next_token()?;
            return Err(IrError::parse(
                line_no,
                format!("unexpected trailing token '{}'", extra.text),
            ));
        }
        Ok(())
    }

    fn parse_via(&mut self, line: &mut LineCursor, line_no: usize) -> Result<ViaDef> {
        let net = line.identifier()?;
        let bottom = line.identifier()?;
        let top = line.identifier()?;
        let mut cuts = Vec::new();
        let mut bottom_enclosure = None;
        let mut top_enclosure = None;
        let mut params = HashMap::new();

        while !line.at_end() {
            let key = line.identifier()?;
            match line.peek_kind() {
                Some(TokenKind::OpenParen) => {
                    line.next_token()?;
                    let rect = line.rect()?;
                    line.expect(TokenKind::CloseParen)?;
                    match key.to_lowercase().as_str() {
                        "cut" => cuts.push(rect),
                        "bot" | "bottom" => bottom_enclosure = Some(rect),
                        "top" => top_enclosure = Some(rect),
                        other => {
                            return Err(IrError::parse(line_no, format!("unknown via box '{}'", other)));
                        }
                    }
                }
                Some(TokenKind::Equals) => {
                    line.next_token()?;
                    let value = line.value()?;
                    params.insert(key.to_lowercase(), value);
                }
                _ => {
                    return Err(IrError::parse(
                        line_no,
                        format!("expected '(' or '=' after '{}'", key),
                    ));
                }
            }
        }

        if cuts.is_empty() {
            return Err(IrError::parse(line_no, "via has no cut boxes"));
        }

        Ok(ViaDef {
            net,
            bottom,
            top,
            cuts,
            bottom_enclosure,
            top_enclosure,
            params,
            line: line_no,
        })
    }
}

/// Cursor over the tokens of a single line.
struct LineCursor {
    tokens: std::vec::IntoIter<Token>,
    peeked: Option<Token>,
    line: usize,
}

impl LineCursor {
    fn new(tokens: Vec<Token>) -> Self {
        let line = tokens.first().map(|t| t.line).unwrap_or(0);
        Self {
            tokens: tokens.into_iter(),
            peeked: None,
            line,
        }
    }

    fn peek_kind(&mut self) -> Option<TokenKind> {
        if self.peeked.is_none() {
            self.peeked = self.tokens.next();
        }
        self.peeked.as_ref().map(|t| t.kind)
    }

    fn at_end(&mut self) -> bool {
        self.peek_kind().is_none()
    }

    fn next_token(&mut self) -> Result<Token> {
        self.peeked
            .take()
            .or_else(|| self.tokens.next())
            .ok_or_else(|| IrError::parse(self.line, "unexpected end of line"))
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        let tok = self.next_token()?;
        if tok.kind != kind {
            return Err(IrError::parse(
                tok.line,
                format!("expected {:?}, got '{}'", kind, tok.text),
            ));
        }
        Ok(tok)
    }

    fn identifier(&mut self) -> Result<String> {
        Ok(self.expect(TokenKind::Identifier)?.text)
    }

    fn value(&mut self) -> Result<f64> {
        let tok = self.expect(TokenKind::Number)?;
        parse_value(&tok.text)
            .ok_or_else(|| IrError::parse(tok.line, format!("invalid number: {}", tok.text)))
    }

    fn coord(&mut self) -> Result<i64> {
        let tok = self.expect(TokenKind::Number)?;
        parse_coord(&tok.text).ok_or_else(|| {
            IrError::parse(tok.line, format!("coordinates must be integer DBU, got {}", tok.text))
        })
    }

    fn rect(&mut self) -> Result<Rect> {
        let x0 = self.coord()?;
        let y0 = self.coord()?;
        let x1 = self.coord()?;
        let y1 = self.coord()?;
        Ok(Rect::new(x0, y0, x1, y1))
    }

    /// `key=value`, where value may be a number or an identifier.
    fn key_value(&mut self) -> Result<(String, Token)> {
        let key = self.identifier()?.to_lowercase();
        self.expect(TokenKind::Equals)?;
        let value = self.next_token()?;
        if !matches!(value.kind, TokenKind::Number | TokenKind::Identifier) {
            return Err(IrError::parse(
                value.line,
                format!("missing value for parameter '{}'", key),
            ));
        }
        Ok((key, value))
    }

    /// Remaining `key=<number>` pairs.
    fn params(&mut self) -> Result<HashMap<String, f64>> {
        let mut params = HashMap::new();
        while !self.at_end() {
            let (key, value) = self.key_value()?;
            let number = parse_value(&value.text).ok_or_else(|| {
                IrError::parse(value.line, format!("invalid value for '{}': {}", key, value.text))
            })?;
            params.insert(key, number);
        }
        Ok(params)
    }

    /// Remaining `<name>=<identifier>` pairs; any other key is an error.
    fn named_identifiers(&mut self, name: &str) -> Result<Vec<String>> {
        let mut values = Vec::new();
        while !self.at_end() {
            let (key, value) = self.key_value()?;
            if key != name {
                return Err(IrError::parse(value.line, format!("unknown parameter '{}'", key)));
            }
            values.push(value.text);
        }
        Ok(values)
    }
}
