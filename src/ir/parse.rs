use std::{collections::HashMap, path::Path};

use etrace::some_or;
use thiserror::Error;

use super::*;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: expected {expected}, found `{found}`")]
    Unexpected {
        line: usize,
        expected: &'static str,
        found: String,
    },
    #[error("line {line}: expected {expected}, found end of line")]
    EndOfLine { line: usize, expected: &'static str },
    #[error("line {line}: unknown type `{name}`")]
    UnknownType { line: usize, name: String },
    #[error("line {line}: unknown instruction `{name}`")]
    UnknownOpcode { line: usize, name: String },
    #[error("line {line}: `{name}` is not defined")]
    Undefined { line: usize, name: String },
    #[error("line {line}: `{name}` is defined twice")]
    Redefined { line: usize, name: String },
    #[error("line {line}: `%{name}` is used before its definition")]
    UseBeforeDef { line: usize, name: String },
    #[error("line {line}: result of `{opcode}` must be named")]
    Unnamed { line: usize, opcode: String },
    #[error("line {line}: `{opcode}` of type void cannot be named")]
    NamedVoid { line: usize, opcode: String },
    #[error("line {line}: body of `{name}` is not closed")]
    Unclosed { line: usize, name: String },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read input: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

pub fn load_module(path: &Path) -> Result<Module, LoadError> {
    let code = std::fs::read_to_string(path)?;
    Ok(parse_module(&code)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Punct(char),
    Arrow,
}

impl Token {
    fn text(&self) -> String {
        match self {
            Token::Word(w) => w.clone(),
            Token::Punct(c) => c.to_string(),
            Token::Arrow => "->".to_string(),
        }
    }
}

fn tokenize(line: &str) -> Vec<Token> {
    let mut tokens = vec![];
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            ';' => break,
            '/' if chars.peek() == Some(&'/') => break,
            '-' if chars.peek() == Some(&'>') => {
                chars.next();
                tokens.push(Token::Arrow);
            }
            '(' | ')' | ',' | ':' | '=' | '{' | '}' => tokens.push(Token::Punct(c)),
            c if c.is_whitespace() => {}
            c => {
                let mut word = c.to_string();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || matches!(c, '_' | '.' | '%' | '@' | '$') {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    tokens
}

struct Cursor {
    line: usize,
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    fn new(line: usize, text: &str) -> Self {
        Self {
            line,
            tokens: tokenize(text),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn is_done(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn next(&mut self, expected: &'static str) -> Result<Token, ParseError> {
        let token = some_or!(
            self.tokens.get(self.pos).cloned(),
            return Err(ParseError::EndOfLine {
                line: self.line,
                expected
            })
        );
        self.pos += 1;
        Ok(token)
    }

    fn unexpected(&self, expected: &'static str, token: &Token) -> ParseError {
        ParseError::Unexpected {
            line: self.line,
            expected,
            found: token.text(),
        }
    }

    fn word(&mut self, expected: &'static str) -> Result<String, ParseError> {
        match self.next(expected)? {
            Token::Word(w) => Ok(w),
            t => Err(self.unexpected(expected, &t)),
        }
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(&Token::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char, expected: &'static str) -> Result<(), ParseError> {
        let token = self.next(expected)?;
        if token == Token::Punct(c) {
            Ok(())
        } else {
            Err(self.unexpected(expected, &token))
        }
    }

    fn finish(&self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(self.unexpected("end of line", t)),
        }
    }

    fn sigiled(&mut self, sigil: char, expected: &'static str) -> Result<String, ParseError> {
        let word = self.word(expected)?;
        match word.strip_prefix(sigil) {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            _ => Err(self.unexpected(expected, &Token::Word(word))),
        }
    }

    fn ty(&mut self, void: bool) -> Result<Ty, ParseError> {
        let name = self.word("a type")?;
        match name.as_str() {
            "ptr" => Ok(Ty::Ptr),
            "int" => Ok(Ty::Int),
            "void" if void => Ok(Ty::Void),
            _ => Err(ParseError::UnknownType {
                line: self.line,
                name,
            }),
        }
    }
}

struct Signature {
    name: String,
    line: usize,
    params: Vec<Param>,
    ret_ty: Ty,
    body: Vec<(usize, String)>,
}

struct ModuleParser {
    globals: Vec<Global>,
    externs: Vec<String>,
    signatures: Vec<Signature>,
}

pub fn parse_module(code: &str) -> Result<Module, ParseError> {
    let mut parser = ModuleParser {
        globals: vec![],
        externs: vec![],
        signatures: vec![],
    };
    parser.parse_items(code)?;

    let fn_ids: HashMap<_, _> = parser
        .signatures
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.clone(), FnId(i)))
        .collect();
    let global_ids: HashMap<_, _> = parser
        .globals
        .iter()
        .enumerate()
        .map(|(i, g)| (g.name.clone(), GlobalId(i)))
        .collect();

    let mut functions = vec![];
    for (i, sig) in parser.signatures.iter().enumerate() {
        let body = BodyParser {
            func: FnId(i),
            fn_ids: &fn_ids,
            global_ids: &global_ids,
            externs: &parser.externs,
            locals: HashMap::new(),
        };
        functions.push(body.parse(sig)?);
    }
    Ok(Module::new(parser.globals, functions, parser.externs))
}

impl ModuleParser {
    fn parse_items(&mut self, code: &str) -> Result<(), ParseError> {
        let mut names = HashMap::new();
        let mut current: Option<Signature> = None;
        for (i, text) in code.lines().enumerate() {
            let line = i + 1;
            let mut cursor = Cursor::new(line, text);
            if cursor.is_done() {
                continue;
            }

            if let Some(sig) = &mut current {
                if cursor.eat('}') {
                    cursor.finish()?;
                    self.signatures.extend(current.take());
                } else {
                    sig.body.push((line, text.to_string()));
                }
                continue;
            }

            let keyword = cursor.word("`fn`, `extern` or `global`")?;
            let (name, sig) = match keyword.as_str() {
                "global" => {
                    let name = cursor.sigiled('@', "a global name")?;
                    cursor.finish()?;
                    self.globals.push(Global { name: name.clone() });
                    (name, None)
                }
                "extern" => {
                    let kw = cursor.word("`fn`")?;
                    if kw != "fn" {
                        return Err(cursor.unexpected("`fn`", &Token::Word(kw)));
                    }
                    let name = cursor.word("a function name")?;
                    let name = name.strip_prefix('@').unwrap_or(&name).to_string();
                    cursor.finish()?;
                    self.externs.push(name.clone());
                    (name, None)
                }
                "fn" => {
                    let sig = Self::parse_signature(&mut cursor)?;
                    (sig.name.clone(), Some(sig))
                }
                _ => {
                    return Err(cursor.unexpected(
                        "`fn`, `extern` or `global`",
                        &Token::Word(keyword.clone()),
                    ))
                }
            };
            if names.insert(name.clone(), line).is_some() {
                return Err(ParseError::Redefined { line, name });
            }
            current = sig;
        }
        if let Some(sig) = current {
            return Err(ParseError::Unclosed {
                line: sig.line,
                name: sig.name,
            });
        }
        Ok(())
    }

    fn parse_signature(cursor: &mut Cursor) -> Result<Signature, ParseError> {
        let name = cursor.word("a function name")?;
        let name = name.strip_prefix('@').unwrap_or(&name).to_string();
        cursor.expect('(', "`(`")?;
        let mut params: Vec<Param> = vec![];
        if !cursor.eat(')') {
            loop {
                let pname = cursor.sigiled('%', "a parameter name")?;
                cursor.expect(':', "`:`")?;
                let ty = cursor.ty(false)?;
                if params.iter().any(|p| p.name == pname) {
                    return Err(ParseError::Redefined {
                        line: cursor.line,
                        name: pname,
                    });
                }
                params.push(Param { name: pname, ty });
                if cursor.eat(')') {
                    break;
                }
                cursor.expect(',', "`,` or `)`")?;
            }
        }
        let ret_ty = match cursor.peek() {
            Some(Token::Arrow) => {
                cursor.pos += 1;
                cursor.ty(true)?
            }
            _ => Ty::Void,
        };
        cursor.expect('{', "`{`")?;
        cursor.finish()?;
        Ok(Signature {
            name,
            line: cursor.line,
            params,
            ret_ty,
            body: vec![],
        })
    }
}

struct BodyParser<'a> {
    func: FnId,
    fn_ids: &'a HashMap<String, FnId>,
    global_ids: &'a HashMap<String, GlobalId>,
    externs: &'a [String],
    locals: HashMap<String, ValueRef>,
}

impl BodyParser<'_> {
    fn parse(mut self, sig: &Signature) -> Result<Function, ParseError> {
        for (i, p) in sig.params.iter().enumerate() {
            self.locals
                .insert(p.name.clone(), ValueRef::Param(self.func, i as _));
        }

        // Every definition is known up front so that `phi` can refer forward.
        for (i, (line, text)) in sig.body.iter().enumerate() {
            let mut cursor = Cursor::new(*line, text);
            let name = some_or!(Self::result_name(&mut cursor)?, continue);
            let v = ValueRef::Inst(self.func, i as _);
            if self.locals.insert(name.clone(), v).is_some() {
                return Err(ParseError::Redefined { line: *line, name });
            }
        }

        let mut insts = vec![];
        for (i, (line, text)) in sig.body.iter().enumerate() {
            let mut cursor = Cursor::new(*line, text);
            let name = Self::result_name(&mut cursor)?;
            let inst = self.parse_inst(i as _, name, &mut cursor)?;
            cursor.finish()?;
            insts.push(inst);
        }

        Ok(Function {
            name: sig.name.clone(),
            params: sig.params.clone(),
            ret_ty: sig.ret_ty,
            insts,
        })
    }

    fn result_name(cursor: &mut Cursor) -> Result<Option<String>, ParseError> {
        let is_def = matches!(cursor.peek(), Some(Token::Word(w)) if w.starts_with('%'))
            && cursor.tokens.get(1) == Some(&Token::Punct('='));
        if !is_def {
            return Ok(None);
        }
        let name = cursor.sigiled('%', "a value name")?;
        cursor.expect('=', "`=`")?;
        Ok(Some(name))
    }

    fn parse_inst(
        &self,
        idx: u32,
        name: Option<String>,
        cursor: &mut Cursor,
    ) -> Result<Inst, ParseError> {
        let line = cursor.line;
        let opcode = cursor.word("an instruction")?;
        let (ty, kind) = match opcode.as_str() {
            "alloca" => (Ty::Ptr, InstKind::Alloca),
            "gep" => {
                let base = self.operand(idx, cursor, false)?;
                cursor.expect(',', "`,`")?;
                let offset = self.operand(idx, cursor, false)?;
                (Ty::Ptr, InstKind::Gep { base, offset })
            }
            "bitcast" => (Ty::Ptr, InstKind::BitCast(self.operand(idx, cursor, false)?)),
            "load" => {
                let ty = cursor.ty(false)?;
                (ty, InstKind::Load(self.operand(idx, cursor, false)?))
            }
            "store" => {
                let value = self.operand(idx, cursor, false)?;
                cursor.expect(',', "`,`")?;
                let ptr = self.operand(idx, cursor, false)?;
                (Ty::Void, InstKind::Store { value, ptr })
            }
            "select" => {
                let ty = cursor.ty(false)?;
                let cond = self.operand(idx, cursor, false)?;
                cursor.expect(',', "`,`")?;
                let then = self.operand(idx, cursor, false)?;
                cursor.expect(',', "`,`")?;
                let els = self.operand(idx, cursor, false)?;
                (ty, InstKind::Select { cond, then, els })
            }
            "phi" => {
                let ty = cursor.ty(false)?;
                let mut ops = vec![self.operand(idx, cursor, true)?];
                while cursor.eat(',') {
                    ops.push(self.operand(idx, cursor, true)?);
                }
                (ty, InstKind::Phi(ops))
            }
            "add" | "sub" | "mul" | "icmp" => {
                let op = match opcode.as_str() {
                    "add" => BinOp::Add,
                    "sub" => BinOp::Sub,
                    "mul" => BinOp::Mul,
                    _ => BinOp::ICmp,
                };
                let l = self.operand(idx, cursor, false)?;
                cursor.expect(',', "`,`")?;
                let r = self.operand(idx, cursor, false)?;
                (Ty::Int, InstKind::Binary(op, l, r))
            }
            "call" => {
                let ty = cursor.ty(true)?;
                let callee = cursor.sigiled('@', "a callee")?;
                let callee = self.callee(line, callee)?;
                cursor.expect('(', "`(`")?;
                let mut args = vec![];
                if !cursor.eat(')') {
                    loop {
                        args.push(self.operand(idx, cursor, false)?);
                        if cursor.eat(')') {
                            break;
                        }
                        cursor.expect(',', "`,` or `)`")?;
                    }
                }
                (ty, InstKind::Call { callee, args })
            }
            "ret" => {
                let value = if cursor.is_done() {
                    None
                } else {
                    Some(self.operand(idx, cursor, false)?)
                };
                (Ty::Void, InstKind::Ret(value))
            }
            _ => {
                return Err(ParseError::UnknownOpcode {
                    line,
                    name: opcode.clone(),
                })
            }
        };

        match (&name, ty) {
            (Some(_), Ty::Void) => Err(ParseError::NamedVoid { line, opcode }),
            (None, Ty::Ptr | Ty::Int) => Err(ParseError::Unnamed { line, opcode }),
            _ => Ok(Inst { name, ty, kind }),
        }
    }

    fn callee(&self, line: usize, name: String) -> Result<Callee, ParseError> {
        if let Some(f) = self.fn_ids.get(&name) {
            Ok(Callee::Defined(*f))
        } else if self.externs.contains(&name) || ALLOCATORS.contains(&name.as_str()) {
            Ok(Callee::External(name))
        } else {
            Err(ParseError::Undefined {
                line,
                name: format!("@{}", name),
            })
        }
    }

    fn operand(
        &self,
        idx: u32,
        cursor: &mut Cursor,
        forward: bool,
    ) -> Result<Operand, ParseError> {
        let line = cursor.line;
        let word = cursor.word("an operand")?;
        if word == "null" {
            return Ok(Operand::Null);
        }
        if let Ok(n) = word.parse::<i64>() {
            return Ok(Operand::Const(n));
        }
        if let Some(name) = word.strip_prefix('@') {
            let g = some_or!(
                self.global_ids.get(name),
                return Err(ParseError::Undefined { line, name: word })
            );
            return Ok(Operand::Value(ValueRef::Global(*g)));
        }
        let name = some_or!(
            word.strip_prefix('%'),
            return Err(cursor.unexpected("an operand", &Token::Word(word)))
        );
        let v = *some_or!(
            self.locals.get(name),
            return Err(ParseError::Undefined { line, name: word })
        );
        if let ValueRef::Inst(_, def) = v {
            if !forward && def >= idx {
                return Err(ParseError::UseBeforeDef {
                    line,
                    name: name.to_string(),
                });
            }
        }
        Ok(Operand::Value(v))
    }
}
