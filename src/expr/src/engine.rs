//! Expression engine facade with compiled expression caching

use crate::builtins;
use crate::condition::{
    BasicConditionResolver, CompiledCondition, Condition, ConditionExpr, ConditionResolver,
};
use crate::context::ExprContext;
use crate::error::{ExprError, Result};
use crate::exec::{BasicExecResolver, ExecResolver};
use crate::expr::Expr;
use crate::key::{BasicKeyResolver, Key, KeyResolver};
use crate::parser::ExprParser;
use crate::pipe::{BasicPipeTransformResolver, PipeTransformResolver};
use crate::tree::TreeParser;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Default number of cached expressions
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Builder for [`ExprEngine`]
///
/// Resolvers are consulted in the order they are added. The standard library,
/// when enabled, is consulted after all of them.
pub struct ExprEngineBuilder {
    keys: Vec<Arc<dyn KeyResolver>>,
    pipes: Vec<Arc<dyn PipeTransformResolver>>,
    conditions: Vec<Arc<dyn ConditionResolver>>,
    execs: Vec<Arc<dyn ExecResolver>>,
    standard: bool,
    cache_capacity: usize,
}

impl Default for ExprEngineBuilder {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            pipes: Vec::new(),
            conditions: Vec::new(),
            execs: Vec::new(),
            standard: false,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl ExprEngineBuilder {
    pub fn keys(mut self, resolver: Arc<dyn KeyResolver>) -> Self {
        self.keys.push(resolver);
        self
    }

    pub fn pipes(mut self, resolver: Arc<dyn PipeTransformResolver>) -> Self {
        self.pipes.push(resolver);
        self
    }

    pub fn conditions(mut self, resolver: Arc<dyn ConditionResolver>) -> Self {
        self.conditions.push(resolver);
        self
    }

    pub fn execs(mut self, resolver: Arc<dyn ExecResolver>) -> Self {
        self.execs.push(resolver);
        self
    }

    /// Append the built-in keys, pipes, conditions and exec handlers
    pub fn with_standard_library(mut self) -> Self {
        self.standard = true;
        self
    }

    /// Maximum number of expressions kept by [`ExprEngine::compile`]; 0 disables caching
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn build(mut self) -> ExprEngine {
        if self.standard {
            self.keys.push(Arc::new(builtins::keys()));
            self.pipes.push(Arc::new(builtins::pipes()));
            self.conditions.push(builtins::conditions());
            self.execs.push(Arc::new(builtins::execs()));
        }

        let keys: Arc<dyn KeyResolver> =
            Arc::new(BasicKeyResolver::with_delegates(HashMap::new(), self.keys));
        let pipes: Arc<dyn PipeTransformResolver> = Arc::new(
            self.pipes
                .into_iter()
                .fold(BasicPipeTransformResolver::new(), |r, d| r.delegate(d)),
        );
        let conditions: Arc<dyn ConditionResolver> = Arc::new(
            self.conditions
                .into_iter()
                .fold(BasicConditionResolver::new(), |r, d| r.delegate(d)),
        );
        let execs: Arc<dyn ExecResolver> = Arc::new(
            self.execs
                .into_iter()
                .fold(BasicExecResolver::new(), |r, d| r.delegate(d)),
        );

        let parser = ExprParser::new(keys.clone(), pipes);
        let tree = TreeParser::new(parser.clone(), execs);

        ExprEngine {
            keys,
            conditions,
            parser,
            tree,
            cache: Arc::new(DashMap::new()),
            cache_capacity: self.cache_capacity,
        }
    }
}

/// Parses and evaluates expressions against frozen resolver chains
///
/// The engine is immutable after construction apart from its expression
/// cache and can be shared between threads.
pub struct ExprEngine {
    keys: Arc<dyn KeyResolver>,
    conditions: Arc<dyn ConditionResolver>,
    parser: ExprParser,
    tree: TreeParser,
    /// Compiled expression cache (thread-safe)
    cache: Arc<DashMap<String, Arc<Expr>>>,
    cache_capacity: usize,
}

impl ExprEngine {
    pub fn builder() -> ExprEngineBuilder {
        ExprEngineBuilder::default()
    }

    /// Engine with only the standard library registered
    pub fn standard() -> Self {
        Self::builder().with_standard_library().build()
    }

    /// Global key resolver
    pub fn keys(&self) -> &Arc<dyn KeyResolver> {
        &self.keys
    }

    pub fn parser(&self) -> &ExprParser {
        &self.parser
    }

    /// Parse an interpolation string without caching
    pub fn parse(&self, text: &str) -> Result<Expr> {
        self.parser.parse(text)
    }

    /// Parse an interpolation string, reusing a cached compilation
    pub fn compile(&self, text: &str) -> Result<Arc<Expr>> {
        if let Some(expr) = self.cache.get(text) {
            return Ok(expr.clone());
        }

        let expr = Arc::new(self.parser.parse(text)?);
        if self.cache_capacity > 0 {
            if self.cache.len() >= self.cache_capacity {
                debug!(size = self.cache.len(), "expression cache full, clearing");
                self.cache.clear();
            }
            self.cache.insert(text.to_string(), expr.clone());
        }
        Ok(expr)
    }

    /// Compile (cached) and evaluate an interpolation string
    pub fn eval(&self, text: &str, context: &ExprContext) -> Result<Value> {
        self.compile(text)?.call(context)
    }

    /// Compile a JSON document into a tree expression
    pub fn parse_tree(&self, document: &Value) -> Result<Expr> {
        self.tree.parse(document)
    }

    /// Resolve operators, keys and operands of a condition list
    ///
    /// # Errors
    ///
    /// Fails on an unknown operator or an operand that does not parse. A key
    /// unknown to the global resolver is accepted; it must then be supplied
    /// by the context at evaluation time.
    pub fn compile_conditions(&self, conditions: &[Condition]) -> Result<ConditionExpr> {
        if conditions.is_empty() {
            return Ok(ConditionExpr::always());
        }
        let compiled = conditions
            .iter()
            .map(|condition| self.compile_condition(condition))
            .collect::<Result<Vec<_>>>()?;
        Ok(ConditionExpr::All(compiled))
    }

    fn compile_condition(&self, condition: &Condition) -> Result<CompiledCondition> {
        let handler = self
            .conditions
            .get_condition(&condition.op)
            .ok_or_else(|| ExprError::ConditionNotFound(condition.op.clone()))?;
        let key = Key::parse(&condition.key)?;
        let key_handler = self.keys.find(&key);
        let operands = condition
            .value
            .iter()
            .map(|operand| self.parser.parse(operand))
            .collect::<Result<Vec<_>>>()?;
        Ok(CompiledCondition::new(condition.clone(), key, key_handler, handler, operands))
    }

    /// Parse and compile a condition document
    pub fn compile_condition_document(&self, document: &Value) -> Result<ConditionExpr> {
        let conditions = crate::condition::parse_conditions(document)?;
        self.compile_conditions(&conditions)
    }

    /// Whether every condition passes for the context
    pub fn test_conditions(&self, conditions: &[Condition], context: &ExprContext) -> Result<bool> {
        self.compile_conditions(conditions)?.call(context)
    }

    /// Value of a key, preferring the context-local resolver
    pub fn key_value(&self, key: &str, context: &ExprContext) -> Result<Value> {
        let key = Key::parse(key)?;
        let handler = context
            .keys()
            .and_then(|keys| keys.find(&key))
            .or_else(|| self.keys.find(&key))
            .ok_or_else(|| ExprError::KeyNotFound(key.to_string()))?;
        Ok(handler.call(&key, context))
    }

    /// Clear the compiled expression cache
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            size: self.cache.len(),
            capacity: self.cache_capacity,
        }
    }
}

/// Expression cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::ConstKeyHandler;
    use serde_json::json;

    fn engine() -> ExprEngine {
        let keys = BasicKeyResolver::new()
            .key(
                Key::new("ident", "orgPath"),
                ConstKeyHandler::new(json!(["root", "auto", "em2m"])),
            )
            .key(Key::new("ident", "organization"), ConstKeyHandler::new(json!("em2m")))
            .key(Key::new("claims", "org"), ConstKeyHandler::new(json!("root")))
            .key(Key::new("report", "ReportType"), ConstKeyHandler::new(json!("maintenance")))
            .key(Key::new("ident", "role"), ConstKeyHandler::new(json!("sales")));
        ExprEngine::builder()
            .keys(Arc::new(keys))
            .with_standard_library()
            .cache_capacity(2)
            .build()
    }

    #[test]
    fn test_eval_with_standard_pipes() {
        let engine = engine();
        let ctx = ExprContext::new();
        assert_eq!(
            engine.eval("${ident:organization | upperCase}/${ident:orgPath | last}", &ctx).unwrap(),
            json!("EM2M/em2m")
        );
        assert_eq!(engine.eval("${Math:PI | number:2}", &ctx).unwrap(), json!("3.14"));
    }

    #[test]
    fn test_cache_is_bounded() {
        let engine = engine();
        let ctx = ExprContext::new();
        engine.eval("a", &ctx).unwrap();
        engine.eval("b", &ctx).unwrap();
        assert_eq!(engine.cache_stats().size, 2);
        engine.eval("c", &ctx).unwrap();
        assert_eq!(engine.cache_stats(), CacheStats { size: 1, capacity: 2 });

        engine.clear_cache();
        assert_eq!(engine.cache_stats().size, 0);
    }

    #[test]
    fn test_conditions() {
        let engine = engine();
        let ctx = ExprContext::new();
        let conditions = vec![
            Condition::new(
                "ForAnyValue:StringEquals",
                "ident:orgPath",
                vec!["${ident:organization}".into()],
            ),
            Condition::new("stringEquals", "report:ReportType", vec!["maintenance".into()]),
        ];
        assert!(engine.test_conditions(&conditions, &ctx).unwrap());

        let failing = vec![
            conditions[0].clone(),
            Condition::new("StringEquals", "claims:org", vec!["em2m".into()]),
        ];
        assert!(!engine.test_conditions(&failing, &ctx).unwrap());
        assert!(engine.test_conditions(&[], &ctx).unwrap());
    }

    #[test]
    fn test_condition_errors() {
        let engine = engine();
        let ctx = ExprContext::new();

        let unknown_op = vec![Condition::new("Nope", "claims:org", vec!["root".into()])];
        assert_eq!(
            engine.test_conditions(&unknown_op, &ctx).unwrap_err(),
            ExprError::ConditionNotFound("Nope".to_string())
        );

        let unknown_key = vec![Condition::new("StringEquals", "claims:sub", vec!["1".into()])];
        let compiled = engine.compile_conditions(&unknown_key).unwrap();
        assert_eq!(
            compiled.call(&ctx).unwrap_err(),
            ExprError::KeyNotFound("claims:sub".to_string())
        );

        let local: Arc<dyn KeyResolver> = Arc::new(
            BasicKeyResolver::new()
                .key(Key::new("claims", "sub"), ConstKeyHandler::new(json!("1"))),
        );
        assert!(compiled.call(&ExprContext::new().with_keys(local)).unwrap());
    }

    #[test]
    fn test_context_keys_take_precedence() {
        let engine = engine();
        let local: Arc<dyn KeyResolver> = Arc::new(
            BasicKeyResolver::new()
                .key(Key::new("ident", "role"), ConstKeyHandler::new(json!("admin"))),
        );
        let ctx = ExprContext::new().with_keys(local);

        assert_eq!(engine.key_value("ident:role", &ctx).unwrap(), json!("admin"));
        assert_eq!(engine.eval("${ident:role}", &ctx).unwrap(), json!("admin"));
        assert_eq!(engine.key_value("ident:role", &ExprContext::new()).unwrap(), json!("sales"));
        assert!(matches!(
            engine.key_value("ident:unknown", &ExprContext::new()),
            Err(ExprError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_condition_document() {
        let engine = engine();
        let expr = engine
            .compile_condition_document(&json!({
                "StringLike": { "claims:org": "ro*" },
                "Bool": { "path:flags.enabled": true }
            }))
            .unwrap();
        let ctx = ExprContext::new().with("flags", json!({"enabled": true}));
        assert!(expr.call(&ctx).unwrap());
        assert_eq!(expr.conditions().len(), 2);
    }
}
