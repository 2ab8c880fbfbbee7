//! jq transformation engine backed by jaq.
//!
//! Queries are compiled against jaq's core natives plus its standard
//! library, so the usual jq builtins (`map`, `select`, `length`, ...) are
//! available.

use std::fmt;
use std::sync::{Arc, LazyLock};

use jaq_interpret::{Ctx, Filter, FilterT, ParseCtx, RcIter, Val};
use jaq_syn::{Def, Spanned};
use serde_json::Value;

use crate::transform::{CompileError, RuntimeError, TransformEngine};

/// A query that compiled successfully.
///
/// The compiled filter holds no jaq values, so the handle can move to
/// whichever thread runs it.
#[derive(Debug, Clone)]
pub struct JqProgram {
    source: Arc<str>,
    filter: Arc<Filter>,
}

impl JqProgram {
    /// The query text.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// jq engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct JqEngine;

impl JqEngine {
    pub fn new() -> Self {
        Self
    }
}

/// The jaq standard library, parsed once per process.
static STD_DEFS: LazyLock<Vec<Def>> = LazyLock::new(jaq_std::std);

/// Name each unresolved reference by its kind and the query text it spans.
fn unresolved<E: fmt::Display>(query: &str, errs: &[Spanned<E>]) -> String {
    errs.iter()
        .map(|(err, span)| match query.get(span.clone()) {
            Some(text) => format!("{err} `{text}`"),
            None => err.to_string(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl TransformEngine for JqEngine {
    type Program = JqProgram;

    fn compile(&self, query: &str) -> Result<JqProgram, CompileError> {
        let mut defs = ParseCtx::new(Vec::new());
        defs.insert_natives(jaq_core::core());
        defs.insert_defs(STD_DEFS.iter().cloned());

        let (main, errs) = jaq_parse::parse(query, jaq_parse::main());
        if !errs.is_empty() {
            let message = errs
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CompileError { message });
        }
        let main = main.ok_or_else(|| CompileError {
            message: "empty query".to_string(),
        })?;

        let filter = defs.compile(main);
        if !defs.errs.is_empty() {
            return Err(CompileError {
                message: unresolved(query, &defs.errs),
            });
        }
        Ok(JqProgram {
            source: Arc::from(query),
            filter: Arc::new(filter),
        })
    }

    fn run(&self, program: &JqProgram, input: Value) -> Result<Vec<Value>, RuntimeError> {
        let inputs = RcIter::new(core::iter::empty());
        let mut results = Vec::new();
        for output in program
            .filter
            .run((Ctx::new([], &inputs), Val::from(input)))
        {
            match output {
                Ok(val) => results.push(Value::from(val)),
                Err(e) => {
                    return Err(RuntimeError {
                        message: e.to_string(),
                    })
                }
            }
        }
        Ok(results)
    }
}
