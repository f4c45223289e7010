use std::sync::Arc;

use sql_chain::prelude::*;
use sql_chain::test_utils::{ScriptedPool, rows_set, status_set};

/// Answers the handful of statements these tests send.
fn scripted(server: &str) -> (ConnectionConfig, ScriptedPool) {
    let config = ConnectionConfig::new(server, "tds_node_test", "sa", "pw");
    let pool = ScriptedPool::new(|call| {
        let one = |col: &str, v: i64| rows_set(&[col], vec![vec![SqlValue::Int(v)]]);
        if call.sql.contains("dbo.AddOne") {
            let input = call.param("input").and_then(SqlValue::as_int).unwrap_or(0);
            return Ok(vec![status_set(0, &[("result", SqlValue::Int(input + 1))])]);
        }
        if call.sql.contains("dbo.NodeTestMultipleProc") {
            return Ok(vec![one("a", 1), one("b", 2), status_set(0, &[])]);
        }
        if call.sql.contains("SCOPE_IDENTITY") {
            return Ok(vec![one("NewId", 1)]);
        }
        if call.sql.contains("select 1 as a") {
            return Ok(vec![one("a", 1), one("b", 2)]);
        }
        Ok(vec![rows_set(
            &["sql"],
            vec![vec![SqlValue::Text(call.sql.to_string())]],
        )])
    });
    register_pool(config.clone(), Arc::new(pool.clone()));
    (config, pool)
}

#[tokio::test]
async fn default_config_stands_in_for_an_omitted_one() -> Result<(), Box<dyn std::error::Error>> {
    let (config, pool) = scripted("default-config");
    let step = || StepDefinition::query("select getdate() as now");

    reset_default_config();
    assert!(matches!(
        execute(None, step()).await,
        Err(SqlChainError::ConfigError(_))
    ));
    assert!(pool.events().is_empty());

    set_default_config(config.clone());
    let implicit = execute(None, step()).await?;
    let explicit = execute(Some(&config), step()).await?;
    assert_eq!(implicit.rows(), explicit.rows());

    let sets = PlainContext::from_default()
        .step("now", step())
        .run()
        .await?;
    assert_eq!(sets["now"].rows(), explicit.rows());

    reset_default_config();
    assert_eq!(pool.executed().len(), 3);
    assert_eq!(pool.leased(), 0);
    Ok(())
}

#[tokio::test]
async fn single_step_execute_returns_the_step_result() -> Result<(), Box<dyn std::error::Error>> {
    let (config, _pool) = scripted("single-step");
    let result = execute(
        Some(&config),
        StepDefinition::query(
            "insert into NodeTestTable (v1, i1) values ('x', 1); select SCOPE_IDENTITY() as NewId",
        ),
    )
    .await?;

    assert!(!result.is_multiple());
    assert_eq!(result.rows()[0].get("NewId"), Some(&SqlValue::Int(1)));
    assert_eq!(result.return_value(), None);
    Ok(())
}

#[tokio::test]
async fn single_step_failure_is_the_step_error() {
    let (config, pool) = scripted("single-step-failure");
    pool.fail_next_acquire("connection refused");
    let err = execute(Some(&config), StepDefinition::query("select 1"))
        .await
        .unwrap_err();
    assert!(matches!(err, SqlChainError::PoolError(_)));
}

#[tokio::test]
async fn multiple_keeps_every_record_set() -> Result<(), Box<dyn std::error::Error>> {
    let (config, _pool) = scripted("multiple-sets");

    for step in [
        StepDefinition::query("select 1 as a; select 2 as b"),
        StepDefinition::prepared("select 1 as a; select 2 as b"),
    ] {
        let result = execute(Some(&config), step.multiple(true)).await?;
        assert!(result.is_multiple());
        assert_eq!(result.record_sets().len(), 2);
        assert_eq!(result.record_sets()[0].rows()[0].get("a"), Some(&SqlValue::Int(1)));
        assert_eq!(result.record_sets()[1].rows()[0].get("b"), Some(&SqlValue::Int(2)));
        assert_eq!(result.return_value(), None);
    }

    let flattened = execute(
        Some(&config),
        StepDefinition::query("select 1 as a; select 2 as b"),
    )
    .await?;
    assert_eq!(flattened.rows().len(), 1);
    assert_eq!(flattened.rows()[0].get("a"), Some(&SqlValue::Int(1)));
    Ok(())
}

#[tokio::test]
async fn procedures_report_their_return_value() -> Result<(), Box<dyn std::error::Error>> {
    let (config, _pool) = scripted("procedures");

    let result = execute(
        Some(&config),
        StepDefinition::procedure("dbo.NodeTestMultipleProc").multiple(true),
    )
    .await?;
    assert_eq!(result.record_sets().len(), 2);
    assert_eq!(result.return_value(), Some(0));

    let single = execute(
        Some(&config),
        StepDefinition::procedure("dbo.NodeTestMultipleProc"),
    )
    .await?;
    assert_eq!(single.rows()[0].get("a"), Some(&SqlValue::Int(1)));
    assert_eq!(single.return_value(), Some(0));
    Ok(())
}

#[tokio::test]
async fn procedure_output_parameters_come_back_by_name() -> Result<(), Box<dyn std::error::Error>>
{
    let (config, pool) = scripted("output-params");

    let result = execute(
        Some(&config),
        StepDefinition::procedure("dbo.AddOne")
            .param("input", 41, ParamType::Int)
            .output("result", ParamType::Int),
    )
    .await?;

    assert_eq!(result.return_value(), Some(0));
    assert_eq!(result.output_param("result"), Some(&SqlValue::Int(42)));
    assert_eq!(result.output_param("@result"), Some(&SqlValue::Int(42)));
    assert!(result.rows().is_empty());

    let sent = pool.executed();
    assert!(sent[0].contains(
        "EXEC @__return_value = dbo.AddOne @input = @P1, @result = @__out_result OUTPUT;"
    ));
    Ok(())
}
