use std::sync::Arc;

use repors::backends::{InMemoryBackend, ResponseBuilder, ScriptedResponse};
use repors::{
    DriverConfig, Model, RelationDef, ReporsError, RepositoryDriver, Result, SqlValue,
};

// Test record types: a datum with a many-to-many tags relation.
#[derive(Debug, Default, Clone, PartialEq)]
struct MyDatum {
    id: Option<i64>,
    name: Option<String>,
    home_planet: Option<String>,
}

impl MyDatum {
    fn named(name: &str) -> Self {
        Self {
            id: None,
            name: Some(name.to_string()),
            home_planet: None,
        }
    }
}

impl Model for MyDatum {
    fn table_name() -> &'static str {
        "my_datum"
    }
    fn key(&self) -> SqlValue {
        self.id.into()
    }
    fn fields(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("name", self.name.clone().into()),
            ("home_planet", self.home_planet.clone().into()),
        ]
    }
    fn apply(&mut self, columns: &[String], values: &[SqlValue]) -> Result<()> {
        for (column, value) in columns.iter().zip(values) {
            match column.as_str() {
                "id" => self.id = value.as_i64(),
                "name" => self.name = value.as_str().map(str::to_string),
                "home_planet" => self.home_planet = value.as_str().map(str::to_string),
                _ => {}
            }
        }
        Ok(())
    }
    fn relations() -> &'static [RelationDef] {
        &[RelationDef {
            name: "tags",
            join_table: "my_datum_tag",
            owner_column: "my_datum_id",
            related_column: "tag_id",
            related_table: "tag",
        }]
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Tag {
    id: Option<i64>,
    name: Option<String>,
}

impl Tag {
    fn with_id(id: i64) -> Self {
        Self {
            id: Some(id),
            name: None,
        }
    }
}

impl Model for Tag {
    fn table_name() -> &'static str {
        "tag"
    }
    fn key(&self) -> SqlValue {
        self.id.into()
    }
    fn fields(&self) -> Vec<(&'static str, SqlValue)> {
        vec![("name", self.name.clone().into())]
    }
    fn apply(&mut self, columns: &[String], values: &[SqlValue]) -> Result<()> {
        for (column, value) in columns.iter().zip(values) {
            match column.as_str() {
                "id" => self.id = value.as_i64(),
                "name" => self.name = value.as_str().map(str::to_string),
                _ => {}
            }
        }
        Ok(())
    }
}

fn driver_over(backend: &InMemoryBackend, descriptors: &[&str]) -> RepositoryDriver {
    RepositoryDriver::with_connector(
        Arc::new(backend.clone()),
        descriptors.iter().map(|s| s.to_string()).collect(),
        DriverConfig::default(),
    )
    .expect("driver construction failed")
}

fn driver_with_limit(
    backend: &InMemoryBackend,
    descriptors: &[&str],
    retry_limit: u32,
) -> RepositoryDriver {
    RepositoryDriver::with_connector(
        Arc::new(backend.clone()),
        descriptors.iter().map(|s| s.to_string()).collect(),
        DriverConfig { retry_limit },
    )
    .expect("driver construction failed")
}

#[test]
fn test_empty_descriptor_list_is_rejected() {
    let backend = InMemoryBackend::new();
    let result = RepositoryDriver::with_connector(
        Arc::new(backend),
        Vec::new(),
        DriverConfig::default(),
    );
    assert!(matches!(result, Err(ReporsError::Usage { .. })));
}

#[tokio::test]
async fn test_save_inserts_unkeyed_record() {
    let backend = InMemoryBackend::new();
    let driver = driver_over(&backend, &["primary"]);

    driver.save(&MyDatum::named("io")).await.unwrap();

    backend.assert_last_statement(
        "INSERT INTO my_datum (name) VALUES ($1)",
        &[SqlValue::Text("io".into())],
    );
    backend.assert_statement_count(1);
}

#[tokio::test]
async fn test_save_upserts_keyed_record() {
    let backend = InMemoryBackend::new();
    let driver = driver_over(&backend, &["primary"]);

    let datum = MyDatum {
        id: Some(3),
        name: Some("io".into()),
        home_planet: Some("jupiter".into()),
    };
    driver.save(&datum).await.unwrap();

    backend.assert_last_statement(
        "INSERT INTO my_datum (id, name, home_planet) VALUES ($1, $2, $3) \
         ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, home_planet = EXCLUDED.home_planet",
        &[
            SqlValue::Int64(3),
            SqlValue::Text("io".into()),
            SqlValue::Text("jupiter".into()),
        ],
    );
}

#[tokio::test]
async fn test_save_multiple_runs_in_one_transaction() {
    let backend = InMemoryBackend::new();
    let driver = driver_over(&backend, &["primary"]);

    let a = MyDatum::named("io");
    let b = MyDatum::named("europa");
    driver.save_multiple(&[&a, &b]).await.unwrap();

    let sql = backend.executed_sql();
    assert_eq!(sql.len(), 4);
    assert_eq!(sql[0], "BEGIN");
    assert_eq!(sql[1], "INSERT INTO my_datum (name) VALUES ($1)");
    assert_eq!(sql[2], "INSERT INTO my_datum (name) VALUES ($1)");
    assert_eq!(sql[3], "COMMIT");
}

#[tokio::test]
async fn test_save_multiple_empty_is_a_noop() {
    let backend = InMemoryBackend::new();
    let driver = driver_over(&backend, &["primary"]);

    driver.save_multiple::<MyDatum>(&[]).await.unwrap();

    backend.assert_statement_count(0);
    assert_eq!(backend.connect_count(), 0);
}

#[tokio::test]
async fn test_save_multiple_rolls_back_on_first_failure() {
    let backend = InMemoryBackend::new().with_responses([
        ScriptedResponse::RowsAffected(0), // BEGIN
        ScriptedResponse::Error(ReporsError::Backend(
            "duplicate key value violates unique constraint".to_string(),
        )),
    ]);
    let driver = driver_over(&backend, &["primary"]);

    let a = MyDatum::named("io");
    let b = MyDatum::named("europa");
    let err = driver.save_multiple(&[&a, &b]).await.unwrap_err();

    match err {
        ReporsError::Tagged { tag, message } => {
            assert_eq!(tag, "svm");
            assert!(message.contains("duplicate key"));
        }
        other => panic!("expected Tagged error, got {:?}", other),
    }
    let sql = backend.executed_sql();
    assert_eq!(sql.last().map(String::as_str), Some("ROLLBACK"));
    // The second insert never ran.
    assert_eq!(sql.len(), 3);
}

#[tokio::test]
async fn test_update_reports_rows_affected() {
    let backend = InMemoryBackend::new().with_response(ScriptedResponse::RowsAffected(3));
    let driver = driver_over(&backend, &["primary"]);

    let template = MyDatum::named("io");
    let affected = driver
        .update(&template, &[("home_planet", SqlValue::Text("mars".into()))])
        .await
        .unwrap();

    assert_eq!(affected, 3);
    backend.assert_last_statement(
        "UPDATE my_datum SET home_planet = $1 WHERE name = $2",
        &[SqlValue::Text("mars".into()), SqlValue::Text("io".into())],
    );
}

#[tokio::test]
async fn test_update_single_commits_on_exactly_one_row() {
    let backend = InMemoryBackend::new().with_responses([
        ScriptedResponse::RowsAffected(0), // BEGIN
        ScriptedResponse::RowsAffected(1),
    ]);
    let driver = driver_over(&backend, &["primary"]);

    let template = MyDatum::named("io");
    driver
        .update_single(&template, &[("home_planet", SqlValue::Text("mars".into()))])
        .await
        .unwrap();

    let sql = backend.executed_sql();
    assert_eq!(sql.last().map(String::as_str), Some("COMMIT"));
}

#[tokio::test]
async fn test_update_single_fails_on_row_count_mismatch() {
    for affected in [0u64, 2] {
        let backend = InMemoryBackend::new().with_responses([
            ScriptedResponse::RowsAffected(0), // BEGIN
            ScriptedResponse::RowsAffected(affected),
        ]);
        let driver = driver_over(&backend, &["primary"]);

        let template = MyDatum::named("io");
        let err = driver
            .update_single(&template, &[("home_planet", SqlValue::Text("mars".into()))])
            .await
            .unwrap_err();

        match err {
            ReporsError::UnexpectedRowCount { expected, actual } => {
                assert_eq!(expected, 1);
                assert_eq!(actual, affected);
            }
            other => panic!("expected UnexpectedRowCount, got {:?}", other),
        }
        let sql = backend.executed_sql();
        assert_eq!(sql.last().map(String::as_str), Some("ROLLBACK"));
    }
}

#[tokio::test]
async fn test_delete_by_key() {
    let backend = InMemoryBackend::new();
    let driver = driver_over(&backend, &["primary"]);

    let datum = MyDatum {
        id: Some(9),
        name: None,
        home_planet: None,
    };
    driver.delete(&datum).await.unwrap();

    backend.assert_last_statement("DELETE FROM my_datum WHERE id = $1", &[SqlValue::Int64(9)]);
}

#[tokio::test]
async fn test_delete_without_key_is_a_usage_error() {
    let backend = InMemoryBackend::new();
    let driver = driver_over(&backend, &["primary"]);

    let err = driver.delete(&MyDatum::named("io")).await.unwrap_err();

    assert!(matches!(
        err,
        ReporsError::Usage {
            operation: "delete",
            ..
        }
    ));
    backend.assert_statement_count(0);
    assert_eq!(backend.connect_count(), 0);
}

#[tokio::test]
async fn test_delete_multiple_rejects_unkeyed_record_before_any_backend_call() {
    let backend = InMemoryBackend::new();
    let driver = driver_over(&backend, &["primary"]);

    let keyed = MyDatum {
        id: Some(1),
        name: None,
        home_planet: None,
    };
    let unkeyed = MyDatum::named("io");
    let err = driver.delete_multiple(&[&keyed, &unkeyed]).await.unwrap_err();

    assert!(matches!(
        err,
        ReporsError::Usage {
            operation: "delete_multiple",
            ..
        }
    ));
    backend.assert_statement_count(0);
    assert_eq!(backend.connect_count(), 0);
}

#[tokio::test]
async fn test_delete_multiple_runs_in_one_transaction() {
    let backend = InMemoryBackend::new();
    let driver = driver_over(&backend, &["primary"]);

    let a = MyDatum {
        id: Some(1),
        name: None,
        home_planet: None,
    };
    let b = MyDatum {
        id: Some(2),
        name: None,
        home_planet: None,
    };
    driver.delete_multiple(&[&a, &b]).await.unwrap();

    let sql = backend.executed_sql();
    assert_eq!(
        sql,
        vec![
            "BEGIN".to_string(),
            "DELETE FROM my_datum WHERE id = $1".to_string(),
            "DELETE FROM my_datum WHERE id = $1".to_string(),
            "COMMIT".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_delete_multiple_empty_is_a_noop() {
    let backend = InMemoryBackend::new();
    let driver = driver_over(&backend, &["primary"]);

    driver.delete_multiple::<MyDatum>(&[]).await.unwrap();

    backend.assert_statement_count(0);
}

#[tokio::test]
async fn test_get_or_create_round_trip() {
    let backend = InMemoryBackend::new().with_responses([
        // First call: nothing matches the template, so the insert runs.
        ResponseBuilder::new().build(),
        ResponseBuilder::new()
            .columns(&["id", "name", "home_planet"])
            .row(vec![
                SqlValue::Int64(7),
                SqlValue::Text("io".into()),
                SqlValue::Null,
            ])
            .build(),
        // Second call: the template matches the stored row.
        ResponseBuilder::new()
            .columns(&["id", "name", "home_planet"])
            .row(vec![
                SqlValue::Int64(7),
                SqlValue::Text("io".into()),
                SqlValue::Null,
            ])
            .build(),
    ]);
    let driver = driver_over(&backend, &["primary"]);

    let mut first = MyDatum::named("io");
    let created = driver.get_or_create(&mut first).await.unwrap();
    assert!(created);
    assert_eq!(first.id, Some(7));
    backend.assert_last_statement(
        "INSERT INTO my_datum (name) VALUES ($1) RETURNING *",
        &[SqlValue::Text("io".into())],
    );

    let mut second = MyDatum::named("io");
    let created = driver.get_or_create(&mut second).await.unwrap();
    assert!(!created);
    assert_eq!(second.id, first.id);
    backend.assert_last_statement(
        "SELECT * FROM my_datum WHERE name = $1 ORDER BY id ASC LIMIT 1",
        &[SqlValue::Text("io".into())],
    );
}

#[tokio::test]
async fn test_first_where_not_found() {
    let backend = InMemoryBackend::new();
    let driver = driver_over(&backend, &["primary"]);

    let mut datum = MyDatum::default();
    let err = driver
        .first_where(&mut datum, "name = $1", &[SqlValue::Text("nope".into())])
        .await
        .unwrap_err();

    assert!(matches!(err, ReporsError::NotFound));
    backend.assert_last_statement(
        "SELECT * FROM my_datum WHERE name = $1 ORDER BY id ASC LIMIT 1",
        &[SqlValue::Text("nope".into())],
    );
}

#[tokio::test]
async fn test_last_where_orders_descending() {
    let backend = InMemoryBackend::new().with_response(
        ResponseBuilder::new()
            .columns(&["id", "name", "home_planet"])
            .row(vec![
                SqlValue::Int64(12),
                SqlValue::Text("io".into()),
                SqlValue::Null,
            ])
            .build(),
    );
    let driver = driver_over(&backend, &["primary"]);

    let mut datum = MyDatum::default();
    driver
        .last_where(&mut datum, "name = $1", &[SqlValue::Text("io".into())])
        .await
        .unwrap();

    assert_eq!(datum.id, Some(12));
    backend.assert_last_statement(
        "SELECT * FROM my_datum WHERE name = $1 ORDER BY id DESC LIMIT 1",
        &[SqlValue::Text("io".into())],
    );
}

#[tokio::test]
async fn test_find_where_replaces_destination_contents() {
    let backend = InMemoryBackend::new().with_response(
        ResponseBuilder::new()
            .columns(&["id", "name", "home_planet"])
            .row(vec![
                SqlValue::Int64(1),
                SqlValue::Text("io".into()),
                SqlValue::Null,
            ])
            .row(vec![
                SqlValue::Int64(2),
                SqlValue::Text("europa".into()),
                SqlValue::Null,
            ])
            .build(),
    );
    let driver = driver_over(&backend, &["primary"]);

    let mut found = vec![MyDatum::named("stale")];
    driver
        .find_where(&mut found, "home_planet = $1", &[SqlValue::Text("jupiter".into())])
        .await
        .unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].id, Some(1));
    assert_eq!(found[1].name.as_deref(), Some("europa"));
    backend.assert_last_statement(
        "SELECT * FROM my_datum WHERE home_planet = $1",
        &[SqlValue::Text("jupiter".into())],
    );
}

#[tokio::test]
async fn test_find_where_limit_offset_pages_by_key_descending() {
    let backend = InMemoryBackend::new();
    let driver = driver_over(&backend, &["primary"]);

    let mut found: Vec<MyDatum> = Vec::new();
    driver
        .find_where_limit_offset(&mut found, 10, 20, "home_planet = $1", &[
            SqlValue::Text("jupiter".into()),
        ])
        .await
        .unwrap();

    assert!(found.is_empty());
    backend.assert_last_statement(
        "SELECT * FROM my_datum WHERE home_planet = $1 ORDER BY id DESC LIMIT 10 OFFSET 20",
        &[SqlValue::Text("jupiter".into())],
    );
}

#[tokio::test]
async fn test_count_where() {
    let backend = InMemoryBackend::new().with_response(
        ResponseBuilder::new()
            .columns(&["count"])
            .row(vec![SqlValue::Int64(5)])
            .build(),
    );
    let driver = driver_over(&backend, &["primary"]);

    let count = driver
        .count_where::<MyDatum>("home_planet = $1", &[SqlValue::Text("jupiter".into())])
        .await
        .unwrap();

    assert_eq!(count, 5);
    backend.assert_last_statement(
        "SELECT COUNT(*) FROM my_datum WHERE home_planet = $1",
        &[SqlValue::Text("jupiter".into())],
    );
}

#[tokio::test]
async fn test_count_related() {
    let backend = InMemoryBackend::new().with_response(
        ResponseBuilder::new()
            .columns(&["count"])
            .row(vec![SqlValue::Int64(2)])
            .build(),
    );
    let driver = driver_over(&backend, &["primary"]);

    let datum = MyDatum {
        id: Some(1),
        name: None,
        home_planet: None,
    };
    let count = driver.count_related(&datum, "tags").await.unwrap();

    assert_eq!(count, 2);
    backend.assert_last_statement(
        "SELECT COUNT(*) FROM my_datum_tag WHERE my_datum_id = $1",
        &[SqlValue::Int64(1)],
    );
}

#[tokio::test]
async fn test_append_related_inserts_join_rows() {
    let backend = InMemoryBackend::new();
    let driver = driver_over(&backend, &["primary"]);

    let datum = MyDatum {
        id: Some(1),
        name: None,
        home_planet: None,
    };
    let red = Tag::with_id(7);
    let blue = Tag::with_id(9);
    driver
        .append_related(&datum, "tags", &[&red, &blue])
        .await
        .unwrap();

    backend.assert_last_statement(
        "INSERT INTO my_datum_tag (my_datum_id, tag_id) VALUES ($1, $2), ($1, $3)",
        &[SqlValue::Int64(1), SqlValue::Int64(7), SqlValue::Int64(9)],
    );
}

#[tokio::test]
async fn test_delete_related_removes_join_rows() {
    let backend = InMemoryBackend::new();
    let driver = driver_over(&backend, &["primary"]);

    let datum = MyDatum {
        id: Some(1),
        name: None,
        home_planet: None,
    };
    let red = Tag::with_id(7);
    driver.delete_related(&datum, "tags", &[&red]).await.unwrap();

    backend.assert_last_statement(
        "DELETE FROM my_datum_tag WHERE my_datum_id = $1 AND tag_id IN ($2)",
        &[SqlValue::Int64(1), SqlValue::Int64(7)],
    );
}

#[tokio::test]
async fn test_clear_related() {
    let backend = InMemoryBackend::new();
    let driver = driver_over(&backend, &["primary"]);

    let datum = MyDatum {
        id: Some(1),
        name: None,
        home_planet: None,
    };
    driver.clear_related(&datum, "tags").await.unwrap();

    backend.assert_last_statement(
        "DELETE FROM my_datum_tag WHERE my_datum_id = $1",
        &[SqlValue::Int64(1)],
    );
}

#[tokio::test]
async fn test_find_related_populates_far_side_records() {
    let backend = InMemoryBackend::new().with_response(
        ResponseBuilder::new()
            .columns(&["id", "name"])
            .row(vec![SqlValue::Int64(7), SqlValue::Text("red".into())])
            .row(vec![SqlValue::Int64(9), SqlValue::Text("blue".into())])
            .build(),
    );
    let driver = driver_over(&backend, &["primary"]);

    let datum = MyDatum {
        id: Some(1),
        name: None,
        home_planet: None,
    };
    let mut tags: Vec<Tag> = Vec::new();
    driver.find_related(&datum, "tags", &mut tags).await.unwrap();

    assert_eq!(tags.len(), 2);
    assert_eq!(tags[0].name.as_deref(), Some("red"));
    assert_eq!(tags[1].id, Some(9));
    backend.assert_last_statement(
        "SELECT tag.* FROM tag JOIN my_datum_tag ON my_datum_tag.tag_id = tag.id \
         WHERE my_datum_tag.my_datum_id = $1",
        &[SqlValue::Int64(1)],
    );
}

#[tokio::test]
async fn test_unknown_relation_is_rejected_before_any_backend_call() {
    let backend = InMemoryBackend::new();
    let driver = driver_over(&backend, &["primary"]);

    let datum = MyDatum {
        id: Some(1),
        name: None,
        home_planet: None,
    };
    let err = driver.count_related(&datum, "moons").await.unwrap_err();

    match err {
        ReporsError::UnknownRelation(name) => assert_eq!(name, "moons"),
        other => panic!("expected UnknownRelation, got {:?}", other),
    }
    backend.assert_statement_count(0);
    assert_eq!(backend.connect_count(), 0);
}

#[tokio::test]
async fn test_retry_cap_makes_exactly_limit_plus_one_attempts() {
    let retriable = || {
        ScriptedResponse::Error(ReporsError::Backend(
            "Error 1020 - not_committed while committing".to_string(),
        ))
    };
    let backend =
        InMemoryBackend::new().with_responses([retriable(), retriable(), retriable()]);
    let driver = driver_with_limit(&backend, &["primary"], 2);

    let err = driver
        .exec("UPDATE my_datum SET home_planet = $1", &[SqlValue::Null])
        .await
        .unwrap_err();

    match err {
        ReporsError::RetriesExceeded {
            attempts,
            limit,
            message,
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(limit, 2);
            assert!(message.contains("1020 - not_committed"));
        }
        other => panic!("expected RetriesExceeded, got {:?}", other),
    }
    backend.assert_statement_count(3);
}

#[tokio::test]
async fn test_retriable_error_retries_until_success() {
    let retriable = || {
        ScriptedResponse::Error(ReporsError::Backend(
            "1007 - past_version".to_string(),
        ))
    };
    let backend = InMemoryBackend::new().with_responses([retriable(), retriable()]);
    let driver = driver_with_limit(&backend, &["primary"], 0);

    driver.exec("SELECT 1", &[]).await.unwrap();

    backend.assert_statement_count(3);
}

#[tokio::test]
async fn test_connection_error_invalidates_and_next_call_rotates() {
    let backend = InMemoryBackend::new().with_response(ScriptedResponse::Error(
        ReporsError::Backend("dial tcp 10.0.0.1:5432: connection refused".to_string()),
    ));
    let driver = driver_over(&backend, &["alpha", "beta", "gamma"]);

    let err = driver.exec("SELECT 1", &[]).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "dial tcp 10.0.0.1:5432: connection refused"
    );
    assert_eq!(backend.dialed_descriptors(), vec!["alpha".to_string()]);

    // The dead handle was discarded; the next call dials the next
    // descriptor in rotation and succeeds.
    driver.exec("SELECT 1", &[]).await.unwrap();
    assert_eq!(
        backend.dialed_descriptors(),
        vec!["alpha".to_string(), "beta".to_string()]
    );
}

#[tokio::test]
async fn test_non_connection_error_keeps_the_live_connection() {
    let backend = InMemoryBackend::new().with_response(ScriptedResponse::Error(
        ReporsError::Backend(r#"role "x" does not exist"#.to_string()),
    ));
    let driver = driver_over(&backend, &["alpha", "beta"]);

    let err = driver.exec("SELECT 1", &[]).await.unwrap_err();
    match err {
        ReporsError::Tagged { tag, message } => {
            assert_eq!(tag, "exe");
            assert!(message.contains("does not exist"));
        }
        other => panic!("expected Tagged error, got {:?}", other),
    }

    driver.exec("SELECT 1", &[]).await.unwrap();
    // Still on the first connection.
    assert_eq!(backend.connect_count(), 1);
}

#[tokio::test]
async fn test_rotation_wraps_around_the_descriptor_list() {
    let refused = || {
        ScriptedResponse::Error(ReporsError::Backend(
            "dial tcp 10.0.0.1:5432: connection refused".to_string(),
        ))
    };
    let backend = InMemoryBackend::new().with_responses([refused(), refused(), refused()]);
    let driver = driver_over(&backend, &["alpha", "beta"]);

    for _ in 0..3 {
        let _ = driver.exec("SELECT 1", &[]).await.unwrap_err();
    }

    assert_eq!(
        backend.dialed_descriptors(),
        vec!["alpha".to_string(), "beta".to_string(), "alpha".to_string()]
    );
}

#[tokio::test]
async fn test_connect_failure_is_not_retried() {
    let backend = InMemoryBackend::new()
        .with_connect_failure(ReporsError::Connection("dial timeout".to_string()));
    let driver = driver_over(&backend, &["alpha", "beta"]);

    let err = driver.exec("SELECT 1", &[]).await.unwrap_err();
    assert!(matches!(err, ReporsError::Connection(_)));
    assert_eq!(backend.connect_count(), 1);
    backend.assert_statement_count(0);

    // The caller decides whether to retry; a fresh call dials the next
    // descriptor.
    driver.exec("SELECT 1", &[]).await.unwrap();
    assert_eq!(
        backend.dialed_descriptors(),
        vec!["alpha".to_string(), "beta".to_string()]
    );
}

#[tokio::test]
async fn test_close_is_idempotent_and_forces_reconnect() {
    let backend = InMemoryBackend::new();
    let driver = driver_over(&backend, &["alpha", "beta"]);

    driver.exec("SELECT 1", &[]).await.unwrap();
    driver.close().await;
    driver.close().await;
    driver.exec("SELECT 1", &[]).await.unwrap();

    assert_eq!(
        backend.dialed_descriptors(),
        vec!["alpha".to_string(), "beta".to_string()]
    );
}

#[tokio::test]
async fn test_concurrent_operations_share_one_connection() {
    let backend = InMemoryBackend::new();
    let driver = Arc::new(driver_over(&backend, &["primary"]));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let driver = Arc::clone(&driver);
        handles.push(tokio::spawn(async move {
            driver.exec("SELECT 1", &[]).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(backend.connect_count(), 1);
    backend.assert_statement_count(8);
}
