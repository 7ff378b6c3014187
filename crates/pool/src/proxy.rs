use serde_json::Value;

use crate::error::{ExecutionError, PoolError};
use crate::future::TaskFuture;
use crate::registry::METHODS;
use crate::scheduler::Pool;

/// Name-based call surface over [`Pool::exec`] for the methods a worker
/// reports through the built-in `methods` call.
#[derive(Debug, Clone)]
pub struct Proxy {
    pool: Pool,
    methods: Vec<String>,
}

impl Proxy {
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn has(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m == name)
    }

    /// `exec(name, args)`, refusing names the worker did not report.
    pub fn call(&self, name: &str, args: Vec<Value>) -> TaskFuture<Value> {
        if !self.has(name) {
            return TaskFuture::rejected(PoolError::InvalidMethod(format!(
                "method '{name}' is not exposed by the workers"
            )));
        }
        self.pool.exec(name, args)
    }
}

impl Pool {
    /// Ask a worker which methods it exposes and wrap them in a [`Proxy`].
    pub fn proxy(&self) -> TaskFuture<Proxy> {
        let pool = self.clone();
        self.exec(METHODS, Vec::new()).then(move |listing| {
            let items = match listing {
                Value::Array(items) => items,
                other => {
                    return Err(PoolError::Execution(ExecutionError::Failed(format!(
                        "unexpected method listing: {other}"
                    ))))
                }
            };
            let methods = items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            Ok(Proxy { pool, methods })
        })
    }
}
