//! List pipes

use crate::context::ExprContext;
use crate::error::{ExprError, Result};
use crate::pipe::{BasicPipeTransformResolver, PipeTransform};
use crate::value::{lookup_path, to_text};
use serde_json::{Map, Value};

/// Applies a function to array input; other values pass through unchanged
#[derive(Clone, Copy)]
pub struct ListPipe(pub fn(Vec<Value>) -> Value);

impl PipeTransform for ListPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        match value {
            Value::Array(items) => (self.0)(items),
            other => other,
        }
    }
}

/// Length of an array or string; null for anything else
#[derive(Default)]
pub struct SizePipe;

impl PipeTransform for SizePipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        match value {
            Value::Array(items) => Value::from(items.len()),
            Value::String(s) => Value::from(s.chars().count()),
            _ => Value::Null,
        }
    }
}

fn is_blank(value: &Value) -> bool {
    to_text(value).map_or(true, |s| s.trim().is_empty())
}

fn count_arg(pipe: &str, args: &[String]) -> Result<usize> {
    match args.first() {
        None => Ok(0),
        Some(arg) => arg.trim().parse().map_err(|_| ExprError::InvalidPipeArgs {
            pipe: pipe.to_string(),
            reason: format!("'{}' is not a count", arg),
        }),
    }
}

/// First (`take`) or last (`takeLast`) `n` items of an array or characters
/// of a string; null for anything else
#[derive(Default)]
pub struct TakePipe {
    count: usize,
    from_end: bool,
}

impl TakePipe {
    pub fn last() -> Self {
        Self {
            count: 0,
            from_end: true,
        }
    }

    fn range(&self, len: usize) -> std::ops::Range<usize> {
        let count = self.count.min(len);
        if self.from_end {
            len - count..len
        } else {
            0..count
        }
    }
}

impl PipeTransform for TakePipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        match value {
            Value::Array(items) => {
                let range = self.range(items.len());
                Value::Array(items.into_iter().skip(range.start).take(range.len()).collect())
            }
            Value::String(s) => {
                let range = self.range(s.chars().count());
                Value::String(s.chars().skip(range.start).take(range.len()).collect())
            }
            _ => Value::Null,
        }
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        self.count = count_arg(if self.from_end { "takeLast" } else { "take" }, args)?;
        Ok(())
    }
}

/// Items (or characters) from `start` to `end` inclusive, clamped to the
/// input; unparseable bounds count as zero
#[derive(Default)]
pub struct SlicePipe {
    start: usize,
    end: usize,
}

impl SlicePipe {
    fn bounds(&self, len: usize) -> Option<(usize, usize)> {
        if self.start > self.end || self.start >= len {
            return None;
        }
        Some((self.start, self.end.min(len - 1) - self.start + 1))
    }
}

impl PipeTransform for SlicePipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        match value {
            Value::Array(items) => match self.bounds(items.len()) {
                Some((skip, take)) => {
                    Value::Array(items.into_iter().skip(skip).take(take).collect())
                }
                None => Value::Array(Vec::new()),
            },
            Value::String(s) => match self.bounds(s.chars().count()) {
                Some((skip, take)) => Value::String(s.chars().skip(skip).take(take).collect()),
                None => Value::String(String::new()),
            },
            _ => Value::Null,
        }
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        let bound = |i: usize| args.get(i).and_then(|a| a.trim().parse().ok()).unwrap_or(0);
        self.start = bound(0);
        self.end = bound(1);
        Ok(())
    }
}

/// Indexes items by the text of a dotted path: `[{id: a}]` becomes
/// `{a: {id: a}}`
///
/// Later items win on duplicate keys. Items without the path are dropped.
#[derive(Default)]
pub struct AssociateByPipe {
    path: Option<String>,
}

impl PipeTransform for AssociateByPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        let Some(path) = self.path.as_deref() else {
            return Value::Null;
        };
        let items = match value {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        let mut out = Map::new();
        for item in items {
            if let Some(key) = lookup_path(&item, path).and_then(to_text) {
                out.insert(key, item);
            }
        }
        Value::Object(out)
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        self.path = args
            .first()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        Ok(())
    }
}

pub fn pipes() -> BasicPipeTransformResolver {
    BasicPipeTransformResolver::new()
        .transform("first", || {
            Box::new(ListPipe(|items| items.into_iter().next().unwrap_or(Value::Null)))
        })
        .transform("last", || {
            Box::new(ListPipe(|items| items.into_iter().last().unwrap_or(Value::Null)))
        })
        .transform("reversed", || {
            Box::new(ListPipe(|items| Value::Array(items.into_iter().rev().collect())))
        })
        .transform("notNull", || {
            Box::new(ListPipe(|items| {
                Value::Array(items.into_iter().filter(|v| !v.is_null()).collect())
            }))
        })
        .transform("notBlank", || {
            Box::new(ListPipe(|items| {
                Value::Array(items.into_iter().filter(|v| !is_blank(v)).collect())
            }))
        })
        .transform("filterNotNull", || {
            Box::new(ListPipe(|items| {
                Value::Array(items.into_iter().filter(|v| !v.is_null()).collect())
            }))
        })
        .transform("filterNotBlank", || {
            Box::new(ListPipe(|items| {
                Value::Array(items.into_iter().filter(|v| !is_blank(v)).collect())
            }))
        })
        .transform("firstNotBlank", || {
            Box::new(ListPipe(|items| {
                items.into_iter().find(|v| !is_blank(v)).unwrap_or(Value::Null)
            }))
        })
        .transform("lastNotBlank", || {
            Box::new(ListPipe(|items| {
                items.into_iter().rev().find(|v| !is_blank(v)).unwrap_or(Value::Null)
            }))
        })
        .pipe::<SizePipe>("size")
        .pipe::<TakePipe>("take")
        .transform("takeLast", || Box::new(TakePipe::last()))
        .pipe::<SlicePipe>("slice")
        .pipe::<AssociateByPipe>("associateBy")
}
