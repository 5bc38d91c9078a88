//! Built‑in functions installed in the global scope before user code runs.

use chrono::Utc;
use log::debug;

use crate::value::{NativeFunction, Value};

#[allow(clippy::approx_constant)]
const PI: f64 = 3.14159265359;

const IEL: &str = "Pronom personnel sujet de la troisième personne du singulier et du pluriel, \n employé pour évoquer une personne quel que soit son genre.";

/// Every native, in installation order.
pub fn globals<'a>() -> Vec<NativeFunction<'a>> {
    vec![
        NativeFunction {
            name: "clock",
            arity: 0,
            func: clock,
        },
        NativeFunction {
            name: "pi",
            arity: 0,
            func: pi,
        },
        NativeFunction {
            name: "iel",
            arity: 0,
            func: iel,
        },
        NativeFunction {
            name: "div",
            arity: 1,
            func: div,
        },
    ]
}

/// Wall‑clock time in seconds since the Unix epoch.
fn clock<'a>(_args: &[Value<'a>]) -> Result<Value<'a>, String> {
    let seconds: f64 = Utc::now().timestamp_millis() as f64 / 1000.0;

    debug!("Native function 'clock' returned: {}", seconds);

    Ok(Value::Number(seconds))
}

fn pi<'a>(_args: &[Value<'a>]) -> Result<Value<'a>, String> {
    Ok(Value::Number(PI))
}

fn iel<'a>(_args: &[Value<'a>]) -> Result<Value<'a>, String> {
    Ok(Value::String(IEL.to_string()))
}

/// Halves its argument.  No dedicated type check: a non‑number fails like
/// any other arithmetic on a non‑number.
fn div<'a>(args: &[Value<'a>]) -> Result<Value<'a>, String> {
    match args {
        [Value::Number(n)] => Ok(Value::Number(n / 2.0)),
        _ => Err("Operands must be numbers.".to_string()),
    }
}
