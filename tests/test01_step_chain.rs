use std::sync::Arc;

use sql_chain::prelude::*;
use sql_chain::test_utils::{PoolEvent, ScriptedPool, rows_set};

/// Echoes each statement back as a one-row set; anything mentioning `boom` fails.
fn echo_pool() -> ScriptedPool {
    ScriptedPool::new(|call| {
        if call.sql.contains("boom") {
            return Err(SqlChainError::DriverError(
                "Invalid object name 'boom'.".into(),
            ));
        }
        Ok(vec![rows_set(
            &["sql"],
            vec![vec![SqlValue::Text(call.sql.to_string())]],
        )])
    })
}

fn echoed(sets: &StepResults, name: &str) -> Option<String> {
    sets.get(name)?
        .rows()
        .first()?
        .get("sql")?
        .as_text()
        .map(str::to_string)
}

#[tokio::test]
async fn plain_chain_returns_every_named_step() -> Result<(), Box<dyn std::error::Error>> {
    let pool = echo_pool();
    let sets = PlainContext::with_pool(Arc::new(pool.clone()))
        .step("first", StepDefinition::query("select 1"))
        .step("second", StepDefinition::query("select 2"))
        .step("third", StepDefinition::query("select 3"))
        .run()
        .await?;

    assert_eq!(sets.len(), 3);
    assert_eq!(echoed(&sets, "first").as_deref(), Some("select 1"));
    assert_eq!(echoed(&sets, "second").as_deref(), Some("select 2"));
    assert_eq!(echoed(&sets, "third").as_deref(), Some("select 3"));
    assert_eq!(pool.executed(), vec!["select 1", "select 2", "select 3"]);
    assert_eq!(pool.leased(), 0);
    Ok(())
}

#[tokio::test]
async fn chain_stops_at_first_failing_step() {
    let pool = echo_pool();
    let failure = PlainContext::with_pool(Arc::new(pool.clone()))
        .step("a", StepDefinition::query("select 1"))
        .step("b", StepDefinition::query("select * from boom"))
        .step("c", StepDefinition::query("select 3"))
        .run()
        .await
        .unwrap_err();

    assert_eq!(failure.error.step_name(), Some("b"));
    match &failure.error {
        SqlChainError::QueryError {
            statement, source, ..
        } => {
            assert_eq!(statement, "select * from boom");
            assert!(matches!(**source, SqlChainError::DriverError(_)));
        }
        other => panic!("expected a query error, got {other:?}"),
    }

    assert_eq!(failure.completed.len(), 1);
    assert!(failure.completed.contains("a"));
    assert!(!failure.completed.contains("b"));
    assert!(failure.rollback_error.is_none());

    // `c` never reached the server
    assert_eq!(pool.executed(), vec!["select 1", "select * from boom"]);
    assert_eq!(pool.leased(), 0);
}

#[tokio::test]
async fn connection_is_released_on_success_and_on_failure() {
    let pool = echo_pool();

    PlainContext::with_pool(Arc::new(pool.clone()))
        .step("ok", StepDefinition::query("select 1"))
        .run()
        .await
        .unwrap();
    PlainContext::with_pool(Arc::new(pool.clone()))
        .step("bad", StepDefinition::query("boom"))
        .run()
        .await
        .unwrap_err();

    let events = pool.events();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, PoolEvent::Acquired(_)))
            .count(),
        2
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, PoolEvent::Released(_)))
            .count(),
        2
    );
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, PoolEvent::Began(_) | PoolEvent::Committed(_)))
    );
    assert_eq!(pool.leased(), 0);
}

#[tokio::test]
async fn acquire_failure_is_a_pool_error_with_no_results() {
    let pool = echo_pool();
    pool.fail_next_acquire("Login failed for user 'sa'.");

    let failure = PlainContext::with_pool(Arc::new(pool.clone()))
        .step("a", StepDefinition::query("select 1"))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(failure.error, SqlChainError::PoolError(_)));
    assert!(failure.completed.is_empty());
    assert!(pool.executed().is_empty());
}

#[tokio::test]
async fn invalid_steps_never_touch_the_pool() {
    let pool = echo_pool();

    let failure = PlainContext::with_pool(Arc::new(pool.clone()))
        .step("fine", StepDefinition::query("select 1"))
        .step(
            "bad",
            StepDefinition::prepared("select @i1").param("i1", "not a number", ParamType::Int),
        )
        .run()
        .await
        .unwrap_err();
    assert!(matches!(failure.error, SqlChainError::ParameterError(_)));

    let failure = PlainContext::with_pool(Arc::new(pool.clone()))
        .step("same", StepDefinition::query("select 1"))
        .step("same", StepDefinition::query("select 2"))
        .run()
        .await
        .unwrap_err();
    assert!(matches!(failure.error, SqlChainError::ConfigError(_)));

    assert!(pool.events().is_empty());
}

#[tokio::test]
async fn json_step_definitions_run_like_typed_ones() -> Result<(), Box<dyn std::error::Error>> {
    let pool = echo_pool();
    let sets = PlainContext::with_pool(Arc::new(pool.clone()))
        .step(
            "lookup",
            serde_json::json!({
                "preparedSql": "select * from NodeTestTable where i1 = @i1",
                "params": { "i1": { "val": 7, "type": "int" } }
            }),
        )
        .run()
        .await?;

    let statement = sets["lookup"].rows()[0]
        .get("sql")
        .and_then(SqlValue::as_text)
        .unwrap_or_default()
        .to_string();
    assert!(statement.starts_with("EXEC sp_executesql N'select * from NodeTestTable"));
    assert!(statement.contains("N'@i1 int'"));
    Ok(())
}

#[tokio::test]
async fn concurrent_chains_use_separate_connections() {
    let pool = echo_pool();

    let left = PlainContext::with_pool(Arc::new(pool.clone()))
        .step("a1", StepDefinition::query("select 'a1'"))
        .step("a2", StepDefinition::query("select 'a2'"))
        .run();
    let right = PlainContext::with_pool(Arc::new(pool.clone()))
        .step("b1", StepDefinition::query("select 'b1'"))
        .step("b2", StepDefinition::query("select 'b2'"))
        .run();
    let (left, right) = tokio::join!(left, right);
    assert_eq!(left.unwrap().len(), 2);
    assert_eq!(right.unwrap().len(), 2);

    let conn_of = |needle: &str| {
        pool.events().into_iter().find_map(|e| match e {
            PoolEvent::Executed { conn, sql } if sql.contains(needle) => Some(conn),
            _ => None,
        })
    };
    assert_eq!(conn_of("'a1'"), conn_of("'a2'"));
    assert_eq!(conn_of("'b1'"), conn_of("'b2'"));
    assert_ne!(conn_of("'a1'"), conn_of("'b1'"));
    assert_eq!(pool.leased(), 0);
}
