//! Argument checking for native functions called from scripts.
//!
//! Argument positions in messages are 1-based, as scripts count them.

use crate::script::{ScriptError, ScriptFunction, UserData, Value};

/// Fail unless at least `n` arguments were passed.
pub fn check_args(args: &[Value], n: usize) -> Result<(), ScriptError> {
    if args.len() < n {
        return Err(ScriptError::new(format!("missing argument #{}", args.len() + 1)));
    }
    Ok(())
}

fn arg(args: &[Value], idx: usize) -> Result<&Value, ScriptError> {
    args.get(idx)
        .ok_or_else(|| ScriptError::new(format!("missing argument #{}", idx + 1)))
}

fn wrong_kind(idx: usize, kind: &str) -> ScriptError {
    let article = if kind.starts_with(['a', 'e', 'i', 'o', 'u']) {
        "an"
    } else {
        "a"
    };
    ScriptError::new(format!("#{} must be {article} {kind}", idx + 1))
}

pub fn string_arg(args: &[Value], idx: usize) -> Result<&str, ScriptError> {
    arg(args, idx)?.as_str().ok_or_else(|| wrong_kind(idx, "string"))
}

pub fn int_arg(args: &[Value], idx: usize) -> Result<i64, ScriptError> {
    arg(args, idx)?.as_int().ok_or_else(|| wrong_kind(idx, "integer"))
}

pub fn function_arg(args: &[Value], idx: usize) -> Result<&ScriptFunction, ScriptError> {
    arg(args, idx)?
        .as_function()
        .ok_or_else(|| wrong_kind(idx, "function"))
}

pub fn table_arg(args: &[Value], idx: usize) -> Result<&[(Value, Value)], ScriptError> {
    match arg(args, idx)? {
        Value::Table(entries) => Ok(entries),
        _ => Err(wrong_kind(idx, "table")),
    }
}

/// Extract a userdata handle of type `T`; `kind` names it in the error message.
pub fn userdata_arg<T: UserData + Clone>(
    args: &[Value],
    idx: usize,
    kind: &str,
) -> Result<T, ScriptError> {
    arg(args, idx)?
        .as_userdata::<T>()
        .cloned()
        .ok_or_else(|| wrong_kind(idx, kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_arguments_are_reported_by_position() {
        let err = check_args(&[Value::Nil], 3).unwrap_err();
        assert_eq!(err.message(), "missing argument #2");
        let err = string_arg(&[], 0).unwrap_err();
        assert_eq!(err.message(), "missing argument #1");
    }

    #[test]
    fn wrong_kinds_are_reported_by_position() {
        let args = [Value::from("x"), Value::Int(1)];
        assert_eq!(string_arg(&args, 0).unwrap(), "x");
        assert_eq!(int_arg(&args, 1).unwrap(), 1);
        assert_eq!(int_arg(&args, 0).unwrap_err().message(), "#1 must be an integer");
        assert_eq!(table_arg(&args, 1).unwrap_err().message(), "#2 must be a table");
        assert_eq!(
            function_arg(&args, 0).unwrap_err().message(),
            "#1 must be a function"
        );
    }
}
