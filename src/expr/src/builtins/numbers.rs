//! Number pipes, number conditions and the `Math` keys

use crate::condition::{BasicConditionResolver, ConditionHandler};
use crate::context::ExprContext;
use crate::error::{ExprError, Result};
use crate::key::{BasicKeyResolver, ConstKeyHandler, Key, KeyHandler};
use crate::pipe::{BasicPipeTransformResolver, PipeTransform};
use crate::value::{map_items, number, to_number};
use serde_json::Value;
use std::cmp::Ordering;

const DEFAULT_FRACTION_DIGITS: usize = 3;

fn parse_arg<T: std::str::FromStr>(pipe: &str, args: &[String]) -> Result<Option<T>> {
    match args.first() {
        None => Ok(None),
        Some(arg) => arg.trim().parse::<T>().map(Some).map_err(|_| ExprError::InvalidPipeArgs {
            pipe: pipe.to_string(),
            reason: format!("'{}' is not a number", arg),
        }),
    }
}

fn group_thousands(integral: &str) -> String {
    let (sign, digits) = match integral.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", integral),
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    format!("{}{}", sign, out)
}

/// Formats a number with grouping and a fixed or maximum number of decimals
///
/// Without an argument up to three fraction digits are kept. Non-numeric
/// input formats as an empty string.
#[derive(Default)]
pub struct NumberPipe {
    fraction_digits: Option<usize>,
}

impl NumberPipe {
    fn format(&self, value: f64) -> String {
        let digits = self.fraction_digits.unwrap_or(DEFAULT_FRACTION_DIGITS);
        let mut text = format!("{:.*}", digits, value);
        if self.fraction_digits.is_none() && text.contains('.') {
            text = text.trim_end_matches('0').trim_end_matches('.').to_string();
        }
        match text.split_once('.') {
            Some((integral, fraction)) => format!("{}.{}", group_thousands(integral), fraction),
            None => group_thousands(&text),
        }
    }
}

impl PipeTransform for NumberPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        match value {
            Value::Null => Value::Null,
            Value::Number(n) => {
                Value::String(n.as_f64().map(|f| self.format(f)).unwrap_or_default())
            }
            _ => Value::String(String::new()),
        }
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        self.fraction_digits = parse_arg("number", args)?;
        Ok(())
    }
}

/// Rounds half away from zero to a number of decimal places
#[derive(Default)]
pub struct RoundPipe {
    precision: i32,
}

impl PipeTransform for RoundPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        let scale = 10f64.powi(self.precision);
        map_items(value, |item| match item {
            Value::Number(n) => n
                .as_f64()
                .map(|f| number((f * scale).round() / scale))
                .unwrap_or(Value::Null),
            other => other,
        })
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        self.precision = parse_arg("round", args)?.unwrap_or(0);
        Ok(())
    }
}

/// Binary arithmetic with a configured right-hand operand
///
/// Values that do not coerce to a number become null.
pub struct ArithmeticPipe {
    name: &'static str,
    op: fn(f64, f64) -> f64,
    operand: f64,
}

impl ArithmeticPipe {
    pub fn new(name: &'static str, op: fn(f64, f64) -> f64) -> Self {
        Self { name, op, operand: 0.0 }
    }
}

impl PipeTransform for ArithmeticPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        match to_number(&value) {
            Some(n) => {
                let result = (self.op)(n, self.operand);
                if result.is_finite() {
                    number(result)
                } else {
                    Value::Null
                }
            }
            None => Value::Null,
        }
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        if let Some(operand) = parse_arg(self.name, args)? {
            self.operand = operand;
        }
        Ok(())
    }
}

/// Clamps numbers to an upper (`max`) or lower (`min`) bound
pub struct BoundPipe {
    name: &'static str,
    bound: Option<f64>,
    ordering: Ordering,
}

impl BoundPipe {
    pub fn max() -> Self {
        Self {
            name: "max",
            bound: None,
            ordering: Ordering::Greater,
        }
    }

    pub fn min() -> Self {
        Self {
            name: "min",
            bound: None,
            ordering: Ordering::Less,
        }
    }
}

impl PipeTransform for BoundPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        match (&value, self.bound) {
            (Value::Number(n), Some(bound)) => match n
                .as_f64()
                .and_then(|f| f.partial_cmp(&bound))
            {
                Some(ordering) if ordering == self.ordering => number(bound),
                _ => value,
            },
            _ => value,
        }
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        self.bound = parse_arg(self.name, args)?;
        Ok(())
    }
}

/// Register the number pipes
pub fn pipes() -> BasicPipeTransformResolver {
    let arithmetic: [(&'static str, fn(f64, f64) -> f64); 6] = [
        ("times", |a, b| a * b),
        ("multiply", |a, b| a * b),
        ("div", |a, b| a / b),
        ("plus", |a, b| a + b),
        ("add", |a, b| a + b),
        ("minus", |a, b| a - b),
    ];

    let mut resolver = BasicPipeTransformResolver::new()
        .pipe::<NumberPipe>("number")
        .pipe::<RoundPipe>("round")
        .transform("max", || Box::new(BoundPipe::max()))
        .transform("min", || Box::new(BoundPipe::min()));
    for (name, op) in arithmetic {
        resolver = resolver.transform(name, move || Box::new(ArithmeticPipe::new(name, op)));
    }
    resolver
}

/// Uniform sample from `[0, 1)`
#[derive(Debug, Default)]
pub struct RandomKeyHandler;

impl KeyHandler for RandomKeyHandler {
    fn call(&self, _key: &Key, _context: &ExprContext) -> Value {
        number(rand::random::<f64>())
    }
}

/// Register `Math:PI` and `Math:random`
pub fn keys() -> BasicKeyResolver {
    BasicKeyResolver::new()
        .key(
            Key::new("Math", "PI"),
            ConstKeyHandler::new(number(std::f64::consts::PI)),
        )
        .key(Key::new("Math", "random"), RandomKeyHandler)
}

// ============================================================================
// Conditions
// ============================================================================

fn first_number(value: &Value) -> Option<f64> {
    match value {
        Value::Array(items) => items.first().and_then(to_number),
        other => to_number(other),
    }
}

/// Orders absent values below any number
fn compare(k: Option<f64>, v: Option<f64>) -> Option<Ordering> {
    match (k, v) {
        (None, None) => Some(Ordering::Equal),
        (None, Some(_)) => Some(Ordering::Less),
        (Some(_), None) => Some(Ordering::Greater),
        (Some(k), Some(v)) => k.partial_cmp(&v),
    }
}

/// Compares the first key value with the first operand numerically
#[derive(Clone, Copy)]
pub struct NumberCompare(pub fn(Ordering) -> bool);

impl ConditionHandler for NumberCompare {
    fn test(&self, key_value: &Value, values: &Value) -> bool {
        compare(first_number(key_value), first_number(values)).map_or(false, self.0)
    }
}

/// Register the number conditions
pub fn conditions() -> BasicConditionResolver {
    BasicConditionResolver::new()
        .condition("NumberEquals", NumberCompare(Ordering::is_eq))
        .condition("NumberGreaterThan", NumberCompare(Ordering::is_gt))
        .condition("NumberGreaterThanEquals", NumberCompare(Ordering::is_ge))
        .condition("NumberLessThan", NumberCompare(Ordering::is_lt))
        .condition("NumberLessThanEquals", NumberCompare(Ordering::is_le))
}
