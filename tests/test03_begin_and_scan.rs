use sql_helpers::test_utils::{CallLog, MockDb, MockRows, MockTxBeginor};
use sql_helpers::{
    BeginSource, Context, Db, DbError, RowValues, Scannable, Scanner, Tx, begin, scan_one_into,
};

#[derive(Default)]
struct Account {
    id: i64,
    owner: String,
    balance: Option<f64>,
}

impl Scannable for Account {
    fn scan_from(&mut self, scanner: &mut dyn Scanner) -> Result<(), DbError> {
        scanner.scan(&mut [&mut self.id, &mut self.owner, &mut self.balance])
    }
}

#[tokio::test]
async fn test03_begin_query_commit() -> Result<(), DbError> {
    let ctx = Context::background();
    let log = CallLog::default();
    let db = MockDb::new(log.clone());

    let mut tx = begin(&ctx, None, &db as &dyn Db).await?;
    tx.exec_context(&ctx, "INSERT INTO t VALUES ($1)", &[RowValues::Int(1)])
        .await?;
    tx.commit().await?;
    assert!(tx.rollback().await.unwrap_err().is_tx_done());
    assert!(matches!(
        tx.begin(&ctx, &Default::default()).await.err(),
        Some(DbError::NestedTransaction)
    ));
    assert!(matches!(tx.close().await, Err(DbError::CannotCloseTx)));
    assert_eq!(
        log.calls(),
        ["db.begin", "tx.exec", "tx.commit", "tx.rollback"]
    );
    Ok(())
}

#[tokio::test]
async fn test03_begin_from_beginor_and_reject_unknown() {
    let ctx = Context::background();
    let log = CallLog::default();
    let beginor = MockTxBeginor::new(log.clone());
    assert!(begin(&ctx, None, BeginSource::beginor(&beginor)).await.is_ok());
    assert_eq!(log.calls(), ["begin"]);

    let not_a_db = String::from("postgres://localhost");
    let err = begin(&ctx, None, BeginSource::inspect(&not_a_db))
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("String"), "{err}");
}

#[tokio::test]
async fn test03_scan_one_into_struct() -> Result<(), DbError> {
    let ctx = Context::background();
    let log = CallLog::default();
    let db = MockDb::new(log.clone()).with_rows(
        MockRows::new()
            .with_log(log.clone())
            .with_row(vec![
                RowValues::Int(7),
                RowValues::Text("bob".into()),
                RowValues::Null,
            ])
            .with_row(vec![
                RowValues::Int(8),
                RowValues::Text("eve".into()),
                RowValues::Float(1.0),
            ]),
    );
    let rows = db
        .query_context(&ctx, "SELECT id, owner, balance FROM accounts", &[])
        .await?;
    let mut account = Account::default();
    scan_one_into(rows, &mut account).await?;
    assert_eq!(account.id, 7);
    assert_eq!(account.owner, "bob");
    assert_eq!(account.balance, None);
    assert_eq!(log.count("rows.next"), 1);
    assert_eq!(log.count("rows.close"), 1);
    Ok(())
}

#[tokio::test]
async fn test03_scan_one_reports_no_rows() {
    let rows = MockRows::new();
    let mut id = 0_i64;
    let err = sql_helpers::scan_one(rows, &mut [&mut id]).await.unwrap_err();
    assert!(err.is_no_rows());
}
