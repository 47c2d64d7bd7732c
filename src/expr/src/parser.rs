//! Interpolation expression parser
//!
//! Text outside `${...}` segments becomes constant parts; each segment is
//! `key | pipe:arg:arg | pipe`. Keys and pipes are resolved when the text is
//! parsed, so an expression that parses cleanly can always be evaluated.

use crate::error::{ExprError, Result};
use crate::expr::{Expr, Part, PipePart};
use crate::key::{Key, KeyResolver};
use crate::pipe::{PipeTransform, PipeTransformResolver};
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, OnceLock};

const ESCAPED_COLON: &str = "\\:";
const COLON_PLACEHOLDER: &str = "\u{0}COLON\u{0}";

fn pipe_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").expect("pipe pattern is a valid regex"))
}

/// Parses interpolation strings against fixed key and pipe resolvers
#[derive(Clone)]
pub struct ExprParser {
    keys: Arc<dyn KeyResolver>,
    pipes: Arc<dyn PipeTransformResolver>,
}

impl ExprParser {
    pub fn new(keys: Arc<dyn KeyResolver>, pipes: Arc<dyn PipeTransformResolver>) -> Self {
        Self { keys, pipes }
    }

    pub fn keys(&self) -> &Arc<dyn KeyResolver> {
        &self.keys
    }

    /// Compile `text` into an expression
    ///
    /// # Errors
    ///
    /// Fails when a key or pipe cannot be resolved, a key is malformed, a pipe
    /// segment has no name, or a pipe rejects its arguments.
    pub fn parse(&self, text: &str) -> Result<Expr> {
        let pattern = pipe_pattern();
        let literals: Vec<&str> = pattern.split(text).collect();
        let segments: Vec<&str> = pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .collect();

        if literals.len() != segments.len() + 1 {
            return Err(ExprError::Internal(format!(
                "expected {} literal segments around {} pipes, found {}",
                segments.len() + 1,
                segments.len(),
                literals.len()
            )));
        }

        let mut parts = Vec::with_capacity(literals.len() + segments.len());
        for (i, literal) in literals.iter().enumerate() {
            if !literal.is_empty() {
                parts.push(Part::Const(Value::String((*literal).to_string())));
            }
            if let Some(segment) = segments.get(i) {
                parts.push(Part::Pipe(self.parse_pipe(segment)?));
            }
        }
        Ok(Expr::from_parts(parts))
    }

    fn parse_pipe(&self, segment: &str) -> Result<PipePart> {
        let mut stages = segment.split('|');
        let key = Key::parse(stages.next().unwrap_or_default())?;
        let handler = self
            .keys
            .find(&key)
            .ok_or_else(|| ExprError::KeyNotFound(key.to_string()))?;

        let transforms = stages
            .map(|stage| self.parse_transform(stage))
            .collect::<Result<Vec<_>>>()?;

        Ok(PipePart::new(key, handler, transforms))
    }

    fn parse_transform(&self, stage: &str) -> Result<Box<dyn PipeTransform>> {
        let tokens = split_args(stage);
        let (name, args) = match tokens.split_first() {
            Some((name, args)) if !name.trim().is_empty() => (name.trim(), args),
            _ => return Err(ExprError::InvalidPipe(stage.to_string())),
        };

        let mut transform = self
            .pipes
            .find(name)
            .ok_or_else(|| ExprError::PipeNotFound(name.to_string()))?;
        transform.args(args)?;
        Ok(transform)
    }
}

/// Split a pipe stage on `:`, treating `\:` as a literal colon
fn split_args(stage: &str) -> Vec<String> {
    stage
        .replace(ESCAPED_COLON, COLON_PLACEHOLDER)
        .split(':')
        .map(|token| token.replace(COLON_PLACEHOLDER, ":"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExprContext;
    use crate::key::{BasicKeyResolver, ConstKeyHandler};
    use crate::pipe::BasicPipeTransformResolver;
    use serde_json::json;

    #[derive(Default)]
    struct Upper;

    impl PipeTransform for Upper {
        fn transform(&self, value: Value, _context: &ExprContext) -> Value {
            match value {
                Value::String(s) => Value::String(s.to_uppercase()),
                other => other,
            }
        }
    }

    #[derive(Default)]
    struct Wrap {
        args: Vec<String>,
    }

    impl PipeTransform for Wrap {
        fn transform(&self, value: Value, _context: &ExprContext) -> Value {
            match value {
                Value::String(s) => Value::String(format!("{}{}", s, self.args.join("|"))),
                other => other,
            }
        }

        fn args(&mut self, args: &[String]) -> Result<()> {
            self.args = args.to_vec();
            Ok(())
        }
    }

    fn parser() -> ExprParser {
        let keys = BasicKeyResolver::new()
            .key(Key::new("claims", "org"), ConstKeyHandler::new(json!("root")))
            .key(
                Key::new("ident", "orgPath"),
                ConstKeyHandler::new(json!(["root", "auto", "em2m"])),
            )
            .key(Key::new("field", "missing"), ConstKeyHandler::new(Value::Null));
        let pipes = BasicPipeTransformResolver::new()
            .pipe::<Upper>("upperCase")
            .pipe::<Wrap>("wrap");
        ExprParser::new(Arc::new(keys), Arc::new(pipes))
    }

    fn eval(text: &str) -> Value {
        parser().parse(text).unwrap().call(&ExprContext::new()).unwrap()
    }

    #[test]
    fn test_literal_only() {
        assert_eq!(eval("plain text"), json!("plain text"));
        assert_eq!(eval(""), json!(""));
    }

    #[test]
    fn test_single_key_keeps_type() {
        assert_eq!(eval("${ident:orgPath}"), json!(["root", "auto", "em2m"]));
        assert_eq!(eval("${ missing }"), Value::Null);
    }

    #[test]
    fn test_interpolation() {
        assert_eq!(eval("org=${claims:org | upperCase}!"), json!("org=ROOT!"));
        assert_eq!(eval("${claims:org}${claims:org}"), json!("rootroot"));
        assert_eq!(eval("[${missing}]"), json!("[]"));
    }

    #[test]
    fn test_pipe_args_and_escapes() {
        assert_eq!(eval("${claims:org | wrap:a:b}"), json!("roota|b"));
        assert_eq!(eval(r"${claims:org | wrap:12\:30}"), json!("root12:30"));
    }

    #[test]
    fn test_configuration_errors() {
        let p = parser();
        assert_eq!(
            p.parse("${claims:sub}").unwrap_err(),
            ExprError::KeyNotFound("claims:sub".to_string())
        );
        assert_eq!(
            p.parse("${claims:org | nope}").unwrap_err(),
            ExprError::PipeNotFound("nope".to_string())
        );
        assert!(matches!(p.parse("${claims:org | }"), Err(ExprError::InvalidPipe(_))));
        assert!(matches!(p.parse("${a:b:c}"), Err(ExprError::InvalidKey(_))));
    }

    #[test]
    fn test_split_args() {
        assert_eq!(split_args("number:2"), vec!["number", "2"]);
        assert_eq!(split_args(r"append:\:x"), vec!["append", ":x"]);
    }
}
