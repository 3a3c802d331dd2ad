//! Reader for the text form produced by [`Function::display`].
//!
//! Reading a printed function gives back an equal [`Function`]: blocks,
//! variable types, slots, loop metadata, flags and spans.

use kiln_ir::{BinaryOp, Span, StringInterner, UnaryOp};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::ir::{
    Block, BlockId, CallConv, Const, Function, FunctionFlags, Induction, Instr, LoopInfo, Slot,
    SlotId, Terminator, Ty, Value, VarId,
};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ReadError {
    /// 1-based line number.
    pub line: usize,
    pub message: String,
}

type Parse<T> = Result<T, String>;

/// Parse one function in printed form.
pub fn read_function(text: &str, interner: &StringInterner) -> Result<Function, ReadError> {
    let mut reader = Reader::new(interner);
    let mut last = 0;
    for (i, raw) in text.lines().enumerate() {
        last = i + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        reader.line(line).map_err(|message| ReadError {
            line: i + 1,
            message,
        })?;
    }
    reader.finish().map_err(|message| ReadError {
        line: last,
        message,
    })
}

#[derive(PartialEq, Eq)]
enum State {
    Start,
    Header,
    /// Inside a block; `true` once its terminator was read.
    Block(bool),
    Done,
}

struct Reader<'a> {
    interner: &'a StringInterner,
    state: State,
    func: Option<Function>,
    blocks: Vec<Block>,
    types: FxHashMap<u32, Ty>,
}

impl<'a> Reader<'a> {
    fn new(interner: &'a StringInterner) -> Self {
        Reader {
            interner,
            state: State::Start,
            func: None,
            blocks: Vec::new(),
            types: FxHashMap::default(),
        }
    }

    fn func_mut(&mut self) -> Parse<&mut Function> {
        self.func.as_mut().ok_or_else(|| "expected `func` header".to_owned())
    }

    fn line(&mut self, line: &str) -> Parse<()> {
        match self.state {
            State::Start => {
                self.header(line)?;
                self.state = State::Header;
                Ok(())
            }
            State::Done => Err(format!("unexpected `{line}` after end of function")),
            State::Header | State::Block(_) if line == "}" => {
                if self.state != State::Block(true) {
                    return Err("block without terminator".to_owned());
                }
                self.state = State::Done;
                Ok(())
            }
            State::Header | State::Block(true) if line.starts_with("bb") => self.block_header(line),
            State::Header => self.header_item(line),
            State::Block(true) => Err(format!("`{line}` after block terminator")),
            State::Block(false) => self.block_line(line),
        }
    }

    fn header(&mut self, line: &str) -> Parse<()> {
        let rest = line
            .strip_prefix("func @")
            .and_then(|rest| rest.strip_suffix(" {"))
            .ok_or_else(|| format!("expected `func @name -> type {{`, found `{line}`"))?;
        let (name, mut rest) = rest
            .split_once(" -> ")
            .ok_or_else(|| "missing return type".to_owned())?;

        let mut flags = FunctionFlags::empty();
        let mut entry = BlockId::new(0);
        while let Some((head, last)) = rest.rsplit_once(' ') {
            if let Some(list) = last.strip_prefix("flags=") {
                for flag in list.split(',') {
                    flags |= FunctionFlags::NAMES
                        .iter()
                        .find(|(_, n)| *n == flag)
                        .map(|(f, _)| *f)
                        .ok_or_else(|| format!("unknown flag `{flag}`"))?;
                }
            } else if let Some(block) = last.strip_prefix("entry=") {
                entry = parse_block_id(block)?;
            } else {
                break;
            }
            rest = head;
        }

        let mut func = Function::new(self.interner.intern(name), parse_ty(rest)?);
        func.blocks.clear();
        func.entry = entry;
        func.flags = flags;
        self.func = Some(func);
        Ok(())
    }

    fn header_item(&mut self, line: &str) -> Parse<()> {
        if let Some(rest) = line.strip_prefix("slot $") {
            let (head, ty) = rest
                .split_once(": ")
                .ok_or_else(|| format!("malformed slot `{line}`"))?;
            let (index, name) = match head.split_once(' ') {
                Some((index, name)) => (index, Some(self.interner.intern(name))),
                None => (head, None),
            };
            let ty = parse_ty(ty)?;
            let func = self.func_mut()?;
            if parse_u32(index)? as usize != func.slots.len() {
                return Err(format!("slot ${index} out of order"));
            }
            func.slots.push(Slot { name, ty });
            Ok(())
        } else if let Some(rest) = line.strip_prefix("loop ") {
            let info = parse_loop(rest)?;
            self.func_mut()?.loops.push(info);
            Ok(())
        } else if let Some(rest) = line.strip_prefix("dead ") {
            let (var, ty) = rest
                .split_once(": ")
                .ok_or_else(|| format!("malformed dead variable `{line}`"))?;
            let var = parse_var(var)?;
            self.define(var, parse_ty(ty)?)
        } else {
            Err(format!("unexpected `{line}` in function header"))
        }
    }

    fn define(&mut self, var: VarId, ty: Ty) -> Parse<()> {
        if self.types.insert(var.raw(), ty).is_some() {
            return Err(format!("%{} defined twice", var.raw()));
        }
        Ok(())
    }

    fn block_header(&mut self, line: &str) -> Parse<()> {
        let head = line
            .strip_suffix(':')
            .ok_or_else(|| format!("expected block header, found `{line}`"))?;
        let (id, params) = match head.split_once('(') {
            Some((id, params)) => (
                id,
                params
                    .strip_suffix(')')
                    .ok_or_else(|| "unclosed block parameter list".to_owned())?,
            ),
            None => (head, ""),
        };
        let id = parse_block_id(id)?;
        if id.index() != self.blocks.len() {
            return Err(format!("bb{} out of order", id.raw()));
        }
        let mut block = Block::new(id);
        for param in split_list(params) {
            let (var, ty) = param
                .split_once(": ")
                .ok_or_else(|| format!("malformed block parameter `{param}`"))?;
            let var = parse_var(var)?;
            self.define(var, parse_ty(ty)?)?;
            block.params.push(var);
        }
        self.blocks.push(block);
        self.state = State::Block(false);
        Ok(())
    }

    fn block_line(&mut self, line: &str) -> Parse<()> {
        if let Some(terminator) = self.terminator(line)? {
            if let Some(block) = self.blocks.last_mut() {
                block.terminator = terminator;
            }
            self.state = State::Block(true);
            return Ok(());
        }

        let (line, span) = split_span(line);
        let instr = if line.starts_with('%') {
            let (lhs, rhs) = line
                .split_once(" = ")
                .ok_or_else(|| format!("malformed definition `{line}`"))?;
            let (var, ty) = lhs
                .split_once(": ")
                .ok_or_else(|| format!("missing type in `{lhs}`"))?;
            let var = parse_var(var)?;
            let ty = parse_ty(ty)?;
            let instr = self.defining_instr(var, &ty, rhs)?;
            self.define(var, ty)?;
            instr
        } else {
            self.effect_instr(line)?
        };
        if let Some(block) = self.blocks.last_mut() {
            block.push(instr, span);
        }
        Ok(())
    }

    fn terminator(&self, line: &str) -> Parse<Option<Terminator>> {
        let (op, rest) = line.split_once(' ').unwrap_or((line, ""));
        Ok(Some(match op {
            "ret" if rest.is_empty() => Terminator::Return(None),
            "ret" => Terminator::Return(Some(parse_var(rest)?)),
            "unreachable" => Terminator::Unreachable,
            "jump" => {
                let (target, args) = match rest.split_once('(') {
                    Some((target, args)) => (
                        target,
                        parse_vars(
                            args.strip_suffix(')')
                                .ok_or_else(|| "unclosed jump arguments".to_owned())?,
                        )?,
                    ),
                    None => (rest, Vec::new()),
                };
                Terminator::Jump {
                    target: parse_block_id(target)?,
                    args,
                }
            }
            "branch" => {
                let parts = split_list(rest);
                let [cond, then_block, else_block] = parts.as_slice() else {
                    return Err(format!("malformed branch `{line}`"));
                };
                Terminator::Branch {
                    cond: parse_var(cond)?,
                    then_block: parse_block_id(then_block)?,
                    else_block: parse_block_id(else_block)?,
                }
            }
            _ => return Ok(None),
        }))
    }

    fn defining_instr(&self, dst: VarId, ty: &Ty, rhs: &str) -> Parse<Instr> {
        let (op, rest) = rhs.split_once(' ').unwrap_or((rhs, ""));
        let value = |value: Value| -> Parse<Instr> { Ok(Instr::Let { dst, value }) };
        match op {
            "const" => value(Value::Const(self.parse_const(ty, rest)?)),
            "copy" => value(Value::Var(parse_var(rest)?)),
            "cast" => value(Value::Cast(parse_var(rest)?)),
            "call" | "tail" => self.parse_call(Some(dst), rhs),
            "load" => Ok(Instr::Load {
                dst,
                slot: parse_slot(rest)?,
            }),
            "global" => Ok(Instr::LoadGlobal {
                dst,
                global: self.interner.intern(strip_at(rest)?),
            }),
            "index" => {
                let (slot, index) = parse_subscript(rest)?;
                Ok(Instr::IndexLoad {
                    dst,
                    slot,
                    index: parse_var(index)?,
                })
            }
            "array" => Ok(Instr::MakeArray {
                dst,
                elems: parse_vars(delimited(rest, '[', ']')?)?,
            }),
            "tuple" => Ok(Instr::MakeTuple {
                dst,
                elems: parse_vars(delimited(rest, '(', ')')?)?,
            }),
            "extract" => {
                let (tuple, index) = pair(rest)?;
                Ok(Instr::Extract {
                    dst,
                    tuple: parse_var(tuple)?,
                    index: parse_u32(index)?,
                })
            }
            "alloc" => Ok(Instr::Alloc {
                dst,
                size: parse_var(rest)?,
            }),
            "vload" => {
                let (slot, start) = parse_subscript(rest)?;
                Ok(Instr::VecLoad {
                    dst,
                    slot,
                    start: parse_u64(start)?,
                })
            }
            _ => {
                if let Some(op) = BinaryOp::from_mnemonic(op) {
                    let (lhs, rhs) = pair(rest)?;
                    return value(Value::Binary {
                        op,
                        lhs: parse_var(lhs)?,
                        rhs: parse_var(rhs)?,
                    });
                }
                if let Some(op) = UnaryOp::from_mnemonic(op) {
                    return value(Value::Unary {
                        op,
                        operand: parse_var(rest)?,
                    });
                }
                if let Some(op) = op.strip_prefix('v').and_then(BinaryOp::from_mnemonic) {
                    let (lhs, rhs) = pair(rest)?;
                    return Ok(Instr::VecBinary {
                        dst,
                        op,
                        lhs: parse_var(lhs)?,
                        rhs: parse_var(rhs)?,
                    });
                }
                Err(format!("unknown instruction `{op}`"))
            }
        }
    }

    fn effect_instr(&self, line: &str) -> Parse<Instr> {
        let (op, rest) = line.split_once(' ').unwrap_or((line, ""));
        match op {
            "call" | "tail" => self.parse_call(None, line),
            "store" => {
                let (target, value) = rest
                    .split_once(", ")
                    .ok_or_else(|| format!("malformed store `{line}`"))?;
                let value = parse_var(value)?;
                if target.contains('[') {
                    let (slot, index) = parse_subscript(target)?;
                    Ok(Instr::IndexStore {
                        slot,
                        index: parse_var(index)?,
                        value,
                    })
                } else {
                    Ok(Instr::Store {
                        slot: parse_slot(target)?,
                        value,
                    })
                }
            }
            "vstore" => {
                let (target, value) = pair(rest)?;
                let (slot, start) = parse_subscript(target)?;
                Ok(Instr::VecStore {
                    slot,
                    start: parse_u64(start)?,
                    value: parse_var(value)?,
                })
            }
            "bounds_check" => {
                let (index, len) = pair(rest)?;
                Ok(Instr::BoundsCheck {
                    index: parse_var(index)?,
                    len: parse_u64(len)?,
                })
            }
            "free" => Ok(Instr::Free {
                ptr: parse_var(rest)?,
            }),
            "release" => Ok(Instr::Release {
                ptr: parse_var(rest)?,
            }),
            _ => Err(format!("unknown instruction `{op}`")),
        }
    }

    fn parse_call(&self, dst: Option<VarId>, text: &str) -> Parse<Instr> {
        let (tail, text) = match text.strip_prefix("tail ") {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let rest = text
            .strip_prefix("call @")
            .ok_or_else(|| format!("malformed call `{text}`"))?;
        let (callee, rest) = rest
            .split_once('(')
            .ok_or_else(|| "missing call arguments".to_owned())?;
        let (args, rest) = rest
            .split_once(')')
            .ok_or_else(|| "unclosed call arguments".to_owned())?;
        let conv = match rest.trim() {
            "" => CallConv::Native,
            conv => {
                let library = conv
                    .strip_prefix("c ")
                    .ok_or_else(|| format!("unknown calling convention `{conv}`"))?;
                let (library, rest) = unquote(library)?;
                if !rest.is_empty() {
                    return Err(format!("trailing `{rest}` after call"));
                }
                CallConv::C {
                    library: self.interner.intern(&library),
                }
            }
        };
        Ok(Instr::Call {
            dst,
            callee: self.interner.intern(callee),
            args: parse_vars(args)?,
            conv,
            tail,
        })
    }

    fn parse_const(&self, ty: &Ty, text: &str) -> Parse<Const> {
        let bad = || format!("invalid {ty} constant `{text}`");
        match ty {
            Ty::Int(_) => text.parse().map(Const::Int).map_err(|_| bad()),
            Ty::Float(_) => text.parse::<f64>().map(Const::float).map_err(|_| bad()),
            Ty::Bool => match text {
                "true" => Ok(Const::Bool(true)),
                "false" => Ok(Const::Bool(false)),
                _ => Err(bad()),
            },
            Ty::Str => {
                let (s, rest) = unquote(text)?;
                if !rest.is_empty() {
                    return Err(bad());
                }
                Ok(Const::Str(self.interner.intern(&s)))
            }
            _ => Err(format!("no constants of type {ty}")),
        }
    }

    fn finish(mut self) -> Parse<Function> {
        if self.state != State::Done {
            return Err("unexpected end of input".to_owned());
        }
        let mut func = self.func.take().ok_or_else(|| "empty input".to_owned())?;
        let count = self.types.keys().max().map_or(0, |max| *max as usize + 1);
        let mut var_types = Vec::with_capacity(count);
        for i in 0..count {
            // Every id below the maximum is either defined or listed as dead.
            let raw = u32::try_from(i).map_err(|_| "too many variables".to_owned())?;
            let ty = self
                .types
                .remove(&raw)
                .ok_or_else(|| format!("%{i} has no type"))?;
            var_types.push(ty);
        }
        func.var_types = var_types;
        func.blocks = std::mem::take(&mut self.blocks);
        if func.entry.index() >= func.blocks.len() {
            return Err(format!("entry bb{} does not exist", func.entry.raw()));
        }
        func.params = func.blocks[func.entry.index()].params.clone();
        Ok(func)
    }
}

fn parse_loop(text: &str) -> Parse<LoopInfo> {
    let mut fields: FxHashMap<&str, &str> = FxHashMap::default();
    for field in text.split_whitespace() {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| format!("malformed loop field `{field}`"))?;
        fields.insert(key, value);
    }
    let get = |key: &str| {
        fields
            .get(key)
            .copied()
            .ok_or_else(|| format!("loop is missing `{key}`"))
    };
    let blocks = get("blocks")?
        .split(',')
        .filter(|b| !b.is_empty())
        .map(parse_block_id)
        .collect::<Parse<Vec<_>>>()?;
    let induction = if fields.contains_key("induction") {
        let parse_int = |key: &str| {
            get(key)?
                .parse::<i64>()
                .map_err(|_| format!("invalid loop `{key}`"))
        };
        let cmp = get("cmp")?;
        Some(Induction {
            slot: parse_slot(get("induction")?)?,
            init: parse_int("init")?,
            bound: parse_int("bound")?,
            step: parse_int("step")?,
            cmp: BinaryOp::from_mnemonic(cmp).ok_or_else(|| format!("unknown comparison `{cmp}`"))?,
        })
    } else {
        None
    };
    Ok(LoopInfo {
        preheader: parse_block_id(get("preheader")?)?,
        header: parse_block_id(get("header")?)?,
        latch: parse_block_id(get("latch")?)?,
        exit: parse_block_id(get("exit")?)?,
        blocks,
        induction,
    })
}

/// Split a trailing ` @start..end` span off an instruction line.
fn split_span(line: &str) -> (&str, Option<Span>) {
    if let Some((head, tail)) = line.rsplit_once(" @") {
        if let Some((start, end)) = tail.split_once("..") {
            if let (Ok(start), Ok(end)) = (start.parse(), end.parse()) {
                return (head, Some(Span::new(start, end)));
            }
        }
    }
    (line, None)
}

/// Split a `, `-separated list, leaving commas nested inside types alone.
fn split_list(text: &str) -> Vec<&str> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let bytes = text.as_bytes();
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'[' | b'(' | b'<' => depth += 1,
            // The `>` of an arrow closes nothing.
            b'>' if i > 0 && bytes[i - 1] == b'-' => {}
            b']' | b')' | b'>' => depth -= 1,
            b',' if depth == 0 => {
                items.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(text[start..].trim());
    items
}

fn pair(text: &str) -> Parse<(&str, &str)> {
    text.split_once(", ")
        .ok_or_else(|| format!("expected two operands, found `{text}`"))
}

fn delimited(text: &str, open: char, close: char) -> Parse<&str> {
    text.strip_prefix(open)
        .and_then(|t| t.strip_suffix(close))
        .ok_or_else(|| format!("expected `{open}...{close}`, found `{text}`"))
}

fn strip_at(text: &str) -> Parse<&str> {
    text.strip_prefix('@')
        .ok_or_else(|| format!("expected `@name`, found `{text}`"))
}

fn parse_u32(text: &str) -> Parse<u32> {
    text.parse().map_err(|_| format!("invalid number `{text}`"))
}

fn parse_u64(text: &str) -> Parse<u64> {
    text.parse().map_err(|_| format!("invalid number `{text}`"))
}

fn parse_var(text: &str) -> Parse<VarId> {
    let raw = text
        .strip_prefix('%')
        .ok_or_else(|| format!("expected variable, found `{text}`"))?;
    parse_u32(raw).map(VarId::new)
}

fn parse_vars(text: &str) -> Parse<Vec<VarId>> {
    split_list(text).into_iter().map(parse_var).collect()
}

fn parse_slot(text: &str) -> Parse<SlotId> {
    let raw = text
        .strip_prefix('$')
        .ok_or_else(|| format!("expected slot, found `{text}`"))?;
    parse_u32(raw).map(SlotId::new)
}

fn parse_block_id(text: &str) -> Parse<BlockId> {
    let raw = text
        .strip_prefix("bb")
        .ok_or_else(|| format!("expected block, found `{text}`"))?;
    parse_u32(raw).map(BlockId::new)
}

/// `$slot[inner]`.
fn parse_subscript(text: &str) -> Parse<(SlotId, &str)> {
    let (slot, inner) = text
        .split_once('[')
        .ok_or_else(|| format!("expected `$slot[..]`, found `{text}`"))?;
    let inner = inner
        .strip_suffix(']')
        .ok_or_else(|| format!("unclosed subscript in `{text}`"))?;
    Ok((parse_slot(slot)?, inner))
}

/// Parse a quoted, escaped string literal; returns the contents and the
/// text after the closing quote.
fn unquote(text: &str) -> Parse<(String, &str)> {
    let body = text
        .strip_prefix('"')
        .ok_or_else(|| format!("expected string literal, found `{text}`"))?;
    let mut out = String::new();
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((out, body[i + 1..].trim_start())),
            '\\' => {
                let (_, esc) = chars
                    .next()
                    .ok_or_else(|| "unterminated escape".to_owned())?;
                match esc {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    '\\' | '"' | '\'' => out.push(esc),
                    'u' => {
                        let mut hex = String::new();
                        if chars.next().map(|(_, c)| c) != Some('{') {
                            return Err("malformed unicode escape".to_owned());
                        }
                        for (_, c) in chars.by_ref() {
                            if c == '}' {
                                break;
                            }
                            hex.push(c);
                        }
                        let code = u32::from_str_radix(&hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| format!("invalid unicode escape `{hex}`"))?;
                        out.push(code);
                    }
                    other => return Err(format!("invalid escape `\\{other}`")),
                }
            }
            c => out.push(c),
        }
    }
    Err("unterminated string literal".to_owned())
}

/// Parse a printed [`Ty`].
pub fn parse_ty(text: &str) -> Result<Ty, String> {
    let mut parser = TyParser { text, pos: 0 };
    let ty = parser.ty()?;
    if parser.pos != text.len() {
        return Err(format!("trailing `{}` after type", &text[parser.pos..]));
    }
    Ok(ty)
}

struct TyParser<'a> {
    text: &'a str,
    pos: usize,
}

impl TyParser<'_> {
    fn rest(&self) -> &str {
        &self.text[self.pos..]
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Parse<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(format!("expected `{token}` in type `{}`", self.text))
        }
    }

    fn number(&mut self) -> Parse<u64> {
        let digits = self.rest().bytes().take_while(u8::is_ascii_digit).count();
        let n = self.rest()[..digits]
            .parse()
            .map_err(|_| format!("expected number in type `{}`", self.text))?;
        self.pos += digits;
        Ok(n)
    }

    fn bits(&mut self) -> Parse<u32> {
        u32::try_from(self.number()?).map_err(|_| format!("bit width too large in `{}`", self.text))
    }

    fn list(&mut self, close: &str) -> Parse<Vec<Ty>> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.ty()?);
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(", ")?;
        }
    }

    fn ty(&mut self) -> Parse<Ty> {
        for (keyword, ty) in [
            ("bool", Ty::Bool),
            ("str", Ty::Str),
            ("ptr", Ty::Ptr),
            ("none", Ty::None),
        ] {
            if self.eat(keyword) {
                return Ok(ty);
            }
        }
        if self.eat("fn(") {
            let params = self.list(")")?;
            self.expect(" -> ")?;
            return Ok(Ty::Fn(params, Box::new(self.ty()?)));
        }
        if self.eat("i") {
            return Ok(Ty::Int(self.bits()?));
        }
        if self.eat("f") {
            return Ok(Ty::Float(self.bits()?));
        }
        if self.eat("[") {
            let elem = self.ty()?;
            self.expect("; ")?;
            let len = self.number()?;
            self.expect("]")?;
            return Ok(Ty::Array(Box::new(elem), len));
        }
        if self.eat("(") {
            return Ok(Ty::Tuple(self.list(")")?));
        }
        if self.eat("<") {
            let width = self.bits()?;
            self.expect(" x ")?;
            let elem = self.ty()?;
            self.expect(">")?;
            return Ok(Ty::Vector(Box::new(elem), width));
        }
        Err(format!("unknown type `{}`", self.text))
    }
}

#[cfg(test)]
mod tests;
