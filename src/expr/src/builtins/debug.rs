//! `log` pipe and exec handler

use crate::context::ExprContext;
use crate::error::Result;
use crate::exec::{BasicExecResolver, ExecCall, ExecHandler};
use crate::pipe::{BasicPipeTransformResolver, PipeTransform};
use crate::value::to_text;
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

fn emit(level: &str, message: &str) {
    match level {
        "trace" => trace!(target: "warrant_expr::log", "{}", message),
        "debug" => debug!(target: "warrant_expr::log", "{}", message),
        "warn" => warn!(target: "warrant_expr::log", "{}", message),
        "error" => error!(target: "warrant_expr::log", "{}", message),
        _ => info!(target: "warrant_expr::log", "{}", message),
    }
}

/// Logs the value passing through and returns it unchanged
pub struct LogPipe {
    level: String,
}

impl Default for LogPipe {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl PipeTransform for LogPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        emit(&self.level, &value.to_string());
        value
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        if let Some(level) = args.first() {
            self.level = level.trim().to_lowercase();
        }
        Ok(())
    }
}

/// Logs the `value` parameter at `level` (parameter or config, default info)
#[derive(Debug, Default)]
pub struct LogHandler;

impl ExecHandler for LogHandler {
    fn call(&self, call: ExecCall<'_>, _context: &ExprContext) -> Result<Value> {
        let level = call
            .params
            .get("level")
            .or_else(|| call.config.get("level"))
            .and_then(to_text)
            .unwrap_or_else(|| "info".to_string());
        if let Some(message) = call.params.get("value").and_then(to_text) {
            emit(&level.to_lowercase(), &message);
        }
        Ok(Value::Null)
    }
}

pub fn pipes() -> BasicPipeTransformResolver {
    BasicPipeTransformResolver::new().pipe::<LogPipe>("log")
}

pub fn execs() -> BasicExecResolver {
    BasicExecResolver::new().handler("log", LogHandler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn test_log_pipe_passes_value_through() {
        let mut pipe = LogPipe::default();
        pipe.args(&["DEBUG".to_string()]).unwrap();
        assert_eq!(pipe.level, "debug");
        assert_eq!(pipe.transform(json!({"a": 1}), &ExprContext::new()), json!({"a": 1}));
    }

    #[test]
    fn test_log_handler_returns_null() {
        let config = Map::new();
        let mut params = Map::new();
        params.insert("value".to_string(), json!("hello"));
        let call = ExecCall {
            op: "log",
            config: &config,
            params: &params,
        };
        assert_eq!(LogHandler.call(call, &ExprContext::new()).unwrap(), Value::Null);
    }
}
