//! Invocation of registered procedures by qualified name

use crate::procedure::{HandlerFn, ProcedureDescriptor, ProcedureKind, RegisteredProcedure};
use async_trait::async_trait;
use causeway_core::introspect::is_void_like;
use causeway_core::{ProcedureError, Schema};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One call into a procedure
pub struct ProcedureCall<C> {
    pub kind: ProcedureKind,
    /// Qualified name, e.g. `users.byId`
    pub name: String,
    /// Decoded input; `None` when nothing was sent
    pub input: Option<Value>,
    pub ctx: Arc<C>,
}

/// Invokes a procedure by kind and qualified name.
///
/// Implementations own input validation, handler execution and output
/// validation. Failures surface as [`ProcedureError`] and are encoded by
/// the gateway.
#[async_trait]
pub trait ProcedureCaller<C>: Send + Sync
where
    C: Send + Sync + 'static,
{
    async fn call(&self, call: ProcedureCall<C>) -> Result<Value, ProcedureError>;
}

struct TableEntry<C> {
    descriptor: Arc<ProcedureDescriptor>,
    handler: HandlerFn<C>,
}

/// Default caller: validates against the descriptor schemas around the handler
pub struct ProcedureTable<C> {
    procedures: HashMap<String, TableEntry<C>>,
}

impl<C: Send + Sync + 'static> ProcedureTable<C> {
    pub fn new(procedures: impl IntoIterator<Item = RegisteredProcedure<C>>) -> Self {
        let procedures = procedures
            .into_iter()
            .map(|procedure| {
                (
                    procedure.name,
                    TableEntry {
                        descriptor: procedure.descriptor,
                        handler: procedure.handler,
                    },
                )
            })
            .collect();
        Self { procedures }
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }
}

/// Validate input against the procedure's input schema.
///
/// A void input schema yields an empty object regardless of what was sent.
fn validate_input(schema: Option<&Schema>, input: Option<Value>) -> Result<Value, ProcedureError> {
    let Some(schema) = schema else {
        return Ok(input.unwrap_or(Value::Null));
    };
    if is_void_like(schema) {
        return Ok(Value::Object(Map::new()));
    }
    schema
        .validate(input)
        .map(|value| value.unwrap_or(Value::Null))
        .map_err(ProcedureError::input_validation)
}

fn validate_output(schema: Option<&Schema>, output: Value) -> Result<Value, ProcedureError> {
    let Some(schema) = schema else {
        return Ok(output);
    };
    let output = if output.is_null() && is_void_like(schema) {
        None
    } else {
        Some(output)
    };
    schema
        .validate(output)
        .map(|value| value.unwrap_or(Value::Null))
        .map_err(ProcedureError::output_validation)
}

#[async_trait]
impl<C: Send + Sync + 'static> ProcedureCaller<C> for ProcedureTable<C> {
    async fn call(&self, call: ProcedureCall<C>) -> Result<Value, ProcedureError> {
        let entry = match self.procedures.get(&call.name) {
            Some(entry) if entry.descriptor.kind == call.kind => entry,
            _ => return Err(ProcedureError::not_found()),
        };

        debug!("Calling {} procedure {}", call.kind, call.name);

        let input = validate_input(entry.descriptor.input.as_ref(), call.input)?;
        let output = (entry.handler)(input, call.ctx).await?;
        validate_output(entry.descriptor.output.as_ref(), output)
    }
}
