//! Schema bootstrapper

use rmpv::Value;
use tracing::{debug, info};

use crate::engine::{Evaluator, Space};

use super::errors::{BootstrapError, BootstrapResult, BootstrapStep};
use super::types::SpaceSchema;

/// Provisions `schema` and resolves the id of its space.
pub async fn bootstrap<V>(evaluator: &V, schema: &SpaceSchema) -> BootstrapResult<Space>
where
    V: Evaluator + ?Sized,
{
    for (step, expr) in schema.statements() {
        debug!(space = %schema.name, %step, "applying schema statement");
        evaluator
            .eval(&expr)
            .await
            .map_err(|source| BootstrapError::Step { step, source })?;
    }

    let result = evaluator
        .eval(&schema.space_id_expr())
        .await
        .map_err(|source| BootstrapError::Step {
            step: BootstrapStep::ResolveId,
            source,
        })?;

    let id = result
        .first()
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| BootstrapError::MissingSpaceId(schema.name.clone()))?;

    info!(space = %schema.name, id, "schema ready");
    Ok(Space {
        id,
        name: schema.name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures_util::future::BoxFuture;

    use super::*;
    use crate::engine::{EngineError, EngineResult};

    /// Records statements and answers the id lookup with a fixed value.
    struct ScriptedEvaluator {
        seen: Mutex<Vec<String>>,
        space_id: Value,
        fail_on: Option<usize>,
    }

    impl ScriptedEvaluator {
        fn new(space_id: Value) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                space_id,
                fail_on: None,
            }
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Evaluator for ScriptedEvaluator {
        fn eval<'a>(&'a self, expr: &'a str) -> BoxFuture<'a, EngineResult<Vec<Value>>> {
            Box::pin(async move {
                let call = {
                    let mut seen = self.seen.lock().unwrap();
                    seen.push(expr.to_string());
                    seen.len() - 1
                };
                if self.fail_on == Some(call) {
                    return Err(EngineError::Server {
                        code: 32,
                        message: "Access denied".to_string(),
                    });
                }
                if expr.starts_with("return") {
                    Ok(vec![self.space_id.clone()])
                } else {
                    Ok(Vec::new())
                }
            })
        }
    }

    #[tokio::test]
    async fn test_bootstrap_runs_statements_in_order() {
        let evaluator = ScriptedEvaluator::new(Value::from(512u32));
        let schema = SpaceSchema::key_value("key_value").unwrap();

        let space = bootstrap(&evaluator, &schema).await.unwrap();
        assert_eq!(space.id, 512);
        assert_eq!(space.name, "key_value");

        let seen = evaluator.seen();
        assert_eq!(seen.len(), 4);
        assert!(seen[0].starts_with("box.schema.space.create"));
        assert!(seen[1].contains(":format("));
        assert!(seen[2].contains(":create_index("));
        assert_eq!(seen[3], "return box.space.key_value.id");
    }

    #[tokio::test]
    async fn test_bootstrap_is_repeatable() {
        let evaluator = ScriptedEvaluator::new(Value::from(512u32));
        let schema = SpaceSchema::key_value("key_value").unwrap();

        let first = bootstrap(&evaluator, &schema).await.unwrap();
        let second = bootstrap(&evaluator, &schema).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_failed_statement_stops_bootstrap() {
        let mut evaluator = ScriptedEvaluator::new(Value::from(512u32));
        evaluator.fail_on = Some(1);
        let schema = SpaceSchema::key_value("key_value").unwrap();

        let err = bootstrap(&evaluator, &schema).await.unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::Step {
                step: BootstrapStep::Format,
                ..
            }
        ));
        assert_eq!(evaluator.seen().len(), 2);
    }

    #[tokio::test]
    async fn test_non_numeric_space_id_is_fatal() {
        let evaluator = ScriptedEvaluator::new(Value::Nil);
        let schema = SpaceSchema::key_value("key_value").unwrap();

        let err = bootstrap(&evaluator, &schema).await.unwrap_err();
        assert!(matches!(err, BootstrapError::MissingSpaceId(_)));
    }
}
