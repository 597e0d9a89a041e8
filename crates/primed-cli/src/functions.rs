//! Built-in node functions available to project files.

use serde_json::{json, Number, Value};

/// Signature shared by every built-in.
pub type Builtin = fn(&[Value]) -> Result<Vec<Value>, String>;

/// Names accepted in a node's `func` field.
pub const BUILTIN_NAMES: [&str; 6] = ["multiply", "square", "cube", "identity", "sum", "results"];

pub fn lookup(name: &str) -> Option<Builtin> {
    let func: Builtin = match name {
        "multiply" => multiply,
        "square" => square,
        "cube" => cube,
        "identity" => identity,
        "sum" => sum,
        "results" => results,
        _ => return None,
    };
    Some(func)
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

enum Num {
    Int(i64),
    Float(f64),
}

fn num(value: &Value) -> Result<Num, String> {
    match value {
        Value::Number(n) => Ok(n
            .as_i64()
            .map(Num::Int)
            .unwrap_or_else(|| Num::Float(n.as_f64().unwrap_or(f64::NAN)))),
        other => Err(format!("expected a number, got {other}")),
    }
}

fn to_value(n: Num) -> Result<Value, String> {
    match n {
        Num::Int(i) => Ok(json!(i)),
        Num::Float(f) => Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| format!("{f} is not a finite number")),
    }
}

fn fold(args: &[Value], init: i64, int_op: fn(i64, i64) -> Option<i64>, float_op: fn(f64, f64) -> f64) -> Result<Value, String> {
    let mut acc = Num::Int(init);
    for arg in args {
        acc = match (acc, num(arg)?) {
            (Num::Int(a), Num::Int(b)) => match int_op(a, b) {
                Some(v) => Num::Int(v),
                None => return Err("integer overflow".into()),
            },
            (Num::Int(a), Num::Float(b)) => Num::Float(float_op(a as f64, b)),
            (Num::Float(a), Num::Int(b)) => Num::Float(float_op(a, b as f64)),
            (Num::Float(a), Num::Float(b)) => Num::Float(float_op(a, b)),
        };
    }
    to_value(acc)
}

fn single<'a>(args: &'a [Value], func: &str) -> Result<&'a Value, String> {
    match args {
        [value] => Ok(value),
        _ => Err(format!("{func} takes exactly one input, got {}", args.len())),
    }
}

fn multiply(args: &[Value]) -> Result<Vec<Value>, String> {
    Ok(vec![fold(args, 1, i64::checked_mul, |a, b| a * b)?])
}

fn sum(args: &[Value]) -> Result<Vec<Value>, String> {
    Ok(vec![fold(args, 0, i64::checked_add, |a, b| a + b)?])
}

fn square(args: &[Value]) -> Result<Vec<Value>, String> {
    let x = single(args, "square")?;
    Ok(vec![fold(&[x.clone(), x.clone()], 1, i64::checked_mul, |a, b| a * b)?])
}

fn cube(args: &[Value]) -> Result<Vec<Value>, String> {
    let x = single(args, "cube")?;
    let cubed = fold(&[x.clone(), x.clone(), x.clone()], 1, i64::checked_mul, |a, b| a * b)?;
    Ok(vec![cubed])
}

// ---------------------------------------------------------------------------
// Structural
// ---------------------------------------------------------------------------

fn identity(args: &[Value]) -> Result<Vec<Value>, String> {
    Ok(args.to_vec())
}

/// Wraps its input as `{"results": value}`.
fn results(args: &[Value]) -> Result<Vec<Value>, String> {
    let x = single(args, "results")?;
    Ok(vec![json!({ "results": x })])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Result<Vec<Value>, String> {
        lookup(name).expect("builtin exists")(args)
    }

    #[test]
    fn every_listed_name_resolves() {
        for name in BUILTIN_NAMES {
            assert!(lookup(name).is_some(), "{name} missing");
        }
        assert!(lookup("divide").is_none());
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        assert_eq!(call("multiply", &[json!(2), json!(3)]).unwrap(), vec![json!(6)]);
        assert_eq!(call("square", &[json!(8)]).unwrap(), vec![json!(64)]);
        assert_eq!(call("cube", &[json!(4)]).unwrap(), vec![json!(64)]);
        assert_eq!(call("sum", &[json!(1), json!(2), json!(3)]).unwrap(), vec![json!(6)]);
    }

    #[test]
    fn mixed_arithmetic_promotes_to_float() {
        assert_eq!(call("multiply", &[json!(2), json!(1.5)]).unwrap(), vec![json!(3.0)]);
    }

    #[test]
    fn bad_inputs_are_reported() {
        assert!(call("square", &[json!("x")]).unwrap_err().contains("expected a number"));
        assert!(call("cube", &[]).unwrap_err().contains("exactly one input"));
        assert_eq!(
            call("multiply", &[json!(i64::MAX), json!(2)]).unwrap_err(),
            "integer overflow"
        );
    }

    #[test]
    fn results_wraps_its_input() {
        assert_eq!(call("results", &[json!(64)]).unwrap(), vec![json!({"results": 64})]);
        assert_eq!(call("identity", &[json!(1), json!(2)]).unwrap(), vec![json!(1), json!(2)]);
    }
}
