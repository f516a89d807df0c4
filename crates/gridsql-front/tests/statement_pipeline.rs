use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use gridsql_front::{
    DriverState, ExecutionContext, ExecutionTarget, FrontendConfig, FrontendError, OptionValue,
    ScalarValue, SessionState, SqlState, SqliteEngine, StatementOutcome, StatementRouter,
    StreamingSettings,
};

async fn memory_router() -> Result<StatementRouter> {
    let engine = SqliteEngine::connect("sqlite::memory:").await?;
    StatementRouter::from_config(&FrontendConfig::default(), Arc::new(engine))
}

fn rows(outcome: StatementOutcome) -> Vec<Vec<ScalarValue>> {
    match outcome {
        StatementOutcome::Rows(result) => result.rows,
        other => panic!("expected rows, got {other:?}"),
    }
}

#[tokio::test]
async fn mixes_directives_and_forwarded_sql() -> Result<()> {
    let router = memory_router().await?;
    let mut state = SessionState::new();
    let ctx = ExecutionContext::default();

    router
        .execute("CREATE TABLE city (id INTEGER PRIMARY KEY, name TEXT)", &mut state, &ctx)
        .await?;
    let outcome = router
        .execute("SET STREAMING ON BATCH_SIZE 256 ORDERED;", &mut state, &ctx)
        .await?;
    assert!(matches!(outcome, StatementOutcome::Command(_)));

    router
        .execute("INSERT INTO city VALUES (1, 'Set streaming on')", &mut state, &ctx)
        .await?;
    let found = rows(
        router
            .execute("SELECT name FROM city WHERE id = 1", &mut state, &ctx)
            .await?,
    );
    assert_eq!(found, vec![vec![ScalarValue::Text("Set streaming on".into())]]);

    let settings = StreamingSettings::from_state(&state, &StreamingSettings::default());
    assert!(settings.enabled);
    assert!(settings.ordered);
    assert_eq!(settings.batch_size, 256);
    Ok(())
}

#[tokio::test]
async fn front_end_errors_stop_before_the_engine() -> Result<()> {
    let router = memory_router().await?;
    let mut state = SessionState::new();
    let ctx = ExecutionContext::default();

    let err = router.execute("SELECT 'abc", &mut state, &ctx).await.unwrap_err();
    assert!(matches!(err, FrontendError::Lexical { position: 7, .. }));

    let err = router
        .execute("SET STREAMING ON BATCH_SIZE 1 BATCH_SIZE 2", &mut state, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, FrontendError::DuplicateOption { .. }));
    assert_eq!(err.diagnostic().sql_state, SqlState::SyntaxErrorOrAccessViolation);
    assert_eq!(state.get_option("streaming.enabled"), None);
    Ok(())
}

#[tokio::test]
async fn engine_diagnostics_are_preserved() -> Result<()> {
    let router = memory_router().await?;
    let mut state = SessionState::new();

    let err = router
        .execute("SELECT * FROM nowhere", &mut state, &ExecutionContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FrontendError::Forward(_)));
    assert!(err.to_string().contains("no such table"));

    let err = router
        .execute(
            "SELECT 1",
            &mut state,
            &ExecutionContext::default().with_target(ExecutionTarget::DataNodes {
                cache: "orders".into(),
            }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.sql_state(), SqlState::OptionalFeatureNotImplemented);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = router
        .execute(
            "SELECT 1",
            &mut state,
            &ExecutionContext::default()
                .with_cancel(cancel)
                .with_timeout(Duration::from_secs(1)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.sql_state(), SqlState::OperationCanceled);
    Ok(())
}

#[tokio::test]
async fn state_survives_across_statements_on_disk() -> Result<()> {
    let dir = tempdir()?;
    let engine = SqliteEngine::connect_file(&dir.path().join("pipeline.db")).await?;
    let router = StatementRouter::from_config(&FrontendConfig::default(), Arc::new(engine))?;
    let mut state = SessionState::new().with_option("client", OptionValue::Text("it".into()));
    let ctx = ExecutionContext::default();

    router.execute("CREATE TABLE t (v INTEGER)", &mut state, &ctx).await?;
    router.execute("INSERT INTO t VALUES (1), (2), (3)", &mut state, &ctx).await?;
    router.execute("set streaming 1", &mut state, &ctx).await?;
    router.execute("SET STREAMING 0", &mut state, &ctx).await?;

    let total = rows(router.execute("SELECT sum(v) FROM t", &mut state, &ctx).await?);
    assert_eq!(total, vec![vec![ScalarValue::Integer(6)]]);
    assert_eq!(
        state.get_option("streaming.enabled"),
        Some(OptionValue::Boolean(false))
    );
    assert_eq!(state.get_option("client"), Some(OptionValue::Text("it".into())));

    let nodes = router.topology().await?;
    assert_eq!(nodes.len(), 1);
    Ok(())
}
