//! Built-in function implementations (spec.md 6.3). Dispatched by the
//! [`BuiltinId`] Sema resolved via `crate::builtins::resolve`; `exit` is
//! intercepted by the evaluator itself (it needs to set the process exit
//! code rather than return a `Value`) and never reaches [`call`].

use std::io::{self, BufRead, Write};

use metro_core::ids::BuiltinId;
use metro_core::token::Location;

use crate::error::RuntimeError;
use crate::sema::decls::DeclTable;

use super::value::Value;

pub fn call(id: BuiltinId, receiver: Option<Value>, mut args: Vec<Value>, loc: Location, table: &DeclTable) -> Result<Value, RuntimeError> {
    match crate::builtins::name_of(id) {
        "print" => {
            let text: String = args.iter().map(|v| v.display_with(table)).collect();
            let _ = io::stdout().write_all(text.as_bytes());
            Ok(Value::Int(text.len() as i64))
        }
        "println" => {
            let mut text: String = args.iter().map(|v| v.display_with(table)).collect();
            text.push('\n');
            let _ = io::stdout().write_all(text.as_bytes());
            Ok(Value::Int(text.len() as i64))
        }
        "id" => Ok(Value::string(args[0].identity_string())),
        "type" => Ok(Value::string(args[0].type_name())),
        "to_string" => Ok(Value::string(args[0].display_with(table))),
        "length" => match &args[0] {
            Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
            _ => unreachable!("Sema only resolves length() against a String argument"),
        },
        "push" => {
            let recv = receiver.expect("push is a self-function built-in");
            if let Value::Vector(v) = recv {
                v.borrow_mut().push(args.pop().expect("push takes exactly one argument"));
            }
            Ok(Value::None)
        }
        "substr" => {
            let recv = receiver.expect("substr is a self-function built-in");
            let start = match &args[0] {
                Value::Int(i) => (*i).max(0) as usize,
                Value::USize(u) => *u as usize,
                _ => unreachable!("Sema only resolves substr() against an Int/USize argument"),
            };
            match recv {
                Value::String(s) => Ok(Value::string(s.chars().skip(start).collect::<String>())),
                _ => unreachable!("Sema only resolves substr() against a String receiver"),
            }
        }
        "replace" => {
            let recv = receiver.expect("replace is a self-function built-in");
            let (Value::String(from), Value::String(to)) = (&args[0], &args[1]) else {
                unreachable!("Sema only resolves replace() against String arguments")
            };
            match recv {
                Value::String(s) => Ok(Value::string(s.replace(from.as_ref(), to.as_ref()))),
                _ => unreachable!("Sema only resolves replace() against a String receiver"),
            }
        }
        "input" => {
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line).map_err(|e| RuntimeError::Builtin { span: loc, message: format!("failed to read stdin: {e}") })?;
            if line.ends_with('\n') {
                line.pop();
                if line.ends_with('\r') {
                    line.pop();
                }
            }
            Ok(Value::string(line))
        }
        "open" => {
            let Value::String(path) = &args[0] else { unreachable!("Sema only resolves open() against a String argument") };
            std::fs::read_to_string(path.as_ref())
                .map(Value::string)
                .map_err(|e| RuntimeError::FileOpenFailure { span: loc, path: path.to_string(), reason: e.to_string() })
        }
        other => unreachable!("builtin '{other}' is not dispatched here"),
    }
}
