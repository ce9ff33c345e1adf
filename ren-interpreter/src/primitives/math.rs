use crate::error::{ErrorId, RenError};
use crate::invokable::Return;
use crate::primitives::NativeInfo;
use crate::universe::Universe;
use crate::value::convert::{IntoValue, Number};
use crate::value::Cell;
use crate::vm_objects::frame::Frame;
use rand::distributions::Uniform;
use rand::Rng;

pub static NATIVES: &[NativeInfo] = &[
    ("add", self::add),
    ("subtract", self::subtract),
    ("multiply", self::multiply),
    ("divide", self::divide),
    ("remainder", self::remainder),
    ("negate", self::negate),
    ("random", self::random),
];

/// Decimal results that left the finite range are overflows, as integer ones are.
fn finite(value: f64) -> Result<Number, ErrorId> {
    if value.is_finite() {
        Ok(Number::Decimal(value))
    } else {
        Err(ErrorId::Overflow)
    }
}

/// Applies an operator to two numbers: checked on integers, through `f64` as soon as either
/// side is a decimal.
fn arith(
    frame: &Frame,
    on_integers: fn(i64, i64) -> Option<i64>,
    on_decimals: fn(f64, f64) -> f64,
) -> Result<Return, RenError> {
    let a: Number = frame.get(1)?;
    let b: Number = frame.get(2)?;
    let result = match (a, b) {
        (Number::Integer(a), Number::Integer(b)) => on_integers(a, b).map(Number::Integer).ok_or(ErrorId::Overflow)?,
        (a, b) => finite(on_decimals(a.as_f64(), b.as_f64()))?,
    };
    Ok(Return::Local(result.into_value()))
}

fn add(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    arith(frame, i64::checked_add, |a, b| a + b)
}

fn subtract(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    arith(frame, i64::checked_sub, |a, b| a - b)
}

fn multiply(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    arith(frame, i64::checked_mul, |a, b| a * b)
}

/// Division stays in integers while it is exact, and gives a decimal otherwise.
fn divide(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let a: Number = frame.get(1)?;
    let b: Number = frame.get(2)?;
    if b.as_f64() == 0.0 {
        return Err(ErrorId::ZeroDivide.into());
    }
    let result = match (a, b) {
        (Number::Integer(a), Number::Integer(b)) if a.checked_rem(b) == Some(0) => {
            Number::Integer(a.checked_div(b).ok_or(ErrorId::Overflow)?)
        }
        (a, b) => finite(a.as_f64() / b.as_f64())?,
    };
    Ok(Return::Local(result.into_value()))
}

fn remainder(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let b: Number = frame.get(2)?;
    if b.as_f64() == 0.0 {
        return Err(ErrorId::ZeroDivide.into());
    }
    arith(frame, i64::checked_rem, |a, b| a % b)
}

fn negate(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let value: Number = frame.get(1)?;
    let result = match value {
        Number::Integer(value) => Number::Integer(value.checked_neg().ok_or(ErrorId::Overflow)?),
        Number::Decimal(value) => Number::Decimal(-value),
    };
    Ok(Return::Local(result.into_value()))
}

/// A random integer from 1 to the argument, a random decimal below it, or a random item of a series.
fn random(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    const SIGNATURE: &str = "random";

    let value = frame.arg(1);
    let mut rng = rand::thread_rng();
    if let Some(limit) = value.as_integer() {
        if limit < 1 {
            return Err(ErrorId::OutOfRange(format!("{}: {}", SIGNATURE, limit)).into());
        }
        return Ok(Return::Local(Cell::integer(rng.sample(Uniform::new_inclusive(1, limit)))));
    }
    if let Some(limit) = value.as_decimal() {
        return Ok(Return::Local(Cell::decimal(rng.gen::<f64>() * limit)));
    }
    if let Some((array, index, specifier)) = value.as_array() {
        let items = array.to_vec_from(index);
        if items.is_empty() {
            return Ok(Return::Local(Cell::null()));
        }
        let picked = &items[rng.gen_range(0..items.len())];
        return Ok(Return::Local(crate::bind::derelativize(picked, specifier)));
    }
    if let Some((text, index)) = value.as_string() {
        let chars = text.chars_from(index);
        if chars.is_empty() {
            return Ok(Return::Local(Cell::null()));
        }
        return Ok(Return::Local(Cell::char(chars[rng.gen_range(0..chars.len())])));
    }
    Err(ErrorId::BadPath(format!("{} on {}", SIGNATURE, value.type_of())).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_overflow_is_an_error() {
        assert_eq!(finite(1.5), Ok(Number::Decimal(1.5)));
        assert_eq!(finite(f64::INFINITY), Err(ErrorId::Overflow));
        assert_eq!(finite(f64::NAN), Err(ErrorId::Overflow));
    }
}
