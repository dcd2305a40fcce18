//! Tests for the table builder, run against an in-memory executor.

use super::{TableQb, table};
use crate::error::{TableError, TableResult};
use crate::executor::Executor;
use crate::record::{FetchStyle, Record};
use crate::value::Value;
use serde::Deserialize;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Execute(String, Vec<Value>),
    FetchAll(String, Vec<Value>, FetchStyle),
    FetchOne(String, Vec<Value>, FetchStyle),
    Insert(String, Vec<(String, Value)>),
    Update(String, Vec<(String, Value)>, String, Vec<Value>),
    Delete(String, Option<String>, Vec<Value>),
    PrimaryKey(String),
}

/// Records every call and answers with canned rows.
#[derive(Default)]
struct Recorder {
    rows: Vec<Record>,
    primary_key: Option<String>,
    fail: bool,
    calls: Mutex<Vec<Call>>,
}

impl Recorder {
    fn with_rows(rows: Vec<Record>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: Call) -> TableResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.fail {
            return Err(TableError::Other("connection reset".into()));
        }
        Ok(())
    }

    fn shaped(&self, style: FetchStyle) -> Vec<Record> {
        self.rows
            .iter()
            .map(|r| match style {
                FetchStyle::Named => r.clone(),
                FetchStyle::Positional => Record::positional(r.values().to_vec()),
            })
            .collect()
    }
}

fn owned(data: &[(&str, Value)]) -> Vec<(String, Value)> {
    data.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

impl Executor for Recorder {
    async fn execute(&self, sql: &str, params: &[Value]) -> TableResult<u64> {
        self.push(Call::Execute(sql.into(), params.to_vec()))?;
        Ok(0)
    }

    async fn fetch_all(
        &self,
        sql: &str,
        params: &[Value],
        style: FetchStyle,
    ) -> TableResult<Vec<Record>> {
        self.push(Call::FetchAll(sql.into(), params.to_vec(), style))?;
        Ok(self.shaped(style))
    }

    async fn fetch_one(
        &self,
        sql: &str,
        params: &[Value],
        style: FetchStyle,
    ) -> TableResult<Option<Record>> {
        self.push(Call::FetchOne(sql.into(), params.to_vec(), style))?;
        Ok(self.shaped(style).into_iter().next())
    }

    async fn insert(&self, table: &str, data: &[(&str, Value)]) -> TableResult<Option<Value>> {
        self.push(Call::Insert(table.into(), owned(data)))?;
        Ok(Some(Value::Int(42)))
    }

    async fn update(
        &self,
        table: &str,
        data: &[(&str, Value)],
        predicate: &str,
        params: &[Value],
    ) -> TableResult<u64> {
        self.push(Call::Update(
            table.into(),
            owned(data),
            predicate.into(),
            params.to_vec(),
        ))?;
        Ok(3)
    }

    async fn delete(
        &self,
        table: &str,
        predicate: Option<&str>,
        params: &[Value],
    ) -> TableResult<u64> {
        self.push(Call::Delete(
            table.into(),
            predicate.map(str::to_string),
            params.to_vec(),
        ))?;
        Ok(2)
    }

    async fn primary_key(&self, table: &str) -> TableResult<Option<String>> {
        self.push(Call::PrimaryKey(table.into()))?;
        Ok(self.primary_key.clone())
    }

    fn last_statement(&self) -> Option<String> {
        self.calls().into_iter().rev().find_map(|call| match call {
            Call::Execute(sql, _) | Call::FetchAll(sql, _, _) | Call::FetchOne(sql, _, _) => {
                Some(sql)
            }
            _ => None,
        })
    }
}

fn user(id: i64, name: &str) -> Record {
    Record::from_pairs([("id", Value::from(id)), ("name", Value::from(name))])
}

// ==================== Assembly ====================

#[test]
fn test_fresh_builder() {
    let qb = TableQb::new("users");
    assert_eq!(qb.to_sql().unwrap(), "SELECT * FROM users");
    assert!(qb.params().is_empty());
}

#[test]
fn test_users_example() {
    let mut qb = TableQb::new("users");
    qb.select_fields("id,name")
        .where_("age > ?", [18])
        .order_by("id DESC")
        .limit(10);

    let (sql, params) = qb.build().unwrap();
    assert_eq!(
        sql,
        "SELECT id,name FROM users WHERE age > ? ORDER BY id DESC LIMIT 10"
    );
    assert_eq!(params, vec![Value::Int(18)]);
}

#[test]
fn test_select_fields_prefix() {
    for fields in ["id", "id,name", "count(*) AS n", "u.*"] {
        let mut qb = TableQb::new("users");
        qb.select_fields(fields).where_raw("active");
        let sql = qb.to_sql().unwrap();
        assert!(sql.starts_with(&format!("SELECT {fields} FROM users")), "{sql}");
    }
}

#[test]
fn test_empty_fields_select_star() {
    let mut qb = TableQb::new("users");
    qb.select_fields("id").select_fields("");
    assert_eq!(qb.to_sql().unwrap(), "SELECT * FROM users");
}

#[test]
fn test_full_fragment_order() {
    let mut qb = TableQb::new("users");
    qb.select_fields("u.id, count(o.id)")
        .alias("u")
        .add_join("LEFT JOIN orders o ON o.user_id = u.id")
        .add_join("LEFT JOIN teams t ON t.id = u.team_id")
        .where_("u.active = ? AND t.name = ?", [Value::from(true), Value::from("core")])
        .group_by("u.id")
        .having("count(o.id) > 1")
        .order_by("u.id")
        .limit_offset(20, 40);

    assert_eq!(
        qb.to_sql().unwrap(),
        "SELECT u.id, count(o.id) FROM users AS u \
         LEFT JOIN orders o ON o.user_id = u.id LEFT JOIN teams t ON t.id = u.team_id \
         WHERE u.active = ? AND t.name = ? \
         GROUP BY u.id HAVING count(o.id) > 1 \
         ORDER BY u.id LIMIT 20 OFFSET 40"
    );
    assert_eq!(qb.params(), &[Value::Bool(true), Value::Text("core".into())]);
}

#[test]
fn test_limit_offset_order() {
    let mut qb = TableQb::new("users");
    qb.limit_offset(5, 10);
    assert_eq!(qb.to_sql().unwrap(), "SELECT * FROM users LIMIT 5 OFFSET 10");

    let mut qb = TableQb::new("users");
    qb.offset(10).limit(5);
    assert_eq!(qb.to_sql().unwrap(), "SELECT * FROM users LIMIT 5 OFFSET 10");
}

#[test]
fn test_zero_limit_and_offset_are_emitted() {
    let mut qb = TableQb::new("users");
    qb.limit(0).offset(0);
    assert_eq!(qb.to_sql().unwrap(), "SELECT * FROM users LIMIT 0 OFFSET 0");
}

#[test]
fn test_empty_fragments_are_skipped() {
    let mut qb = TableQb::new("users");
    qb.alias("").where_raw("").order_by("").group_by("").having("");
    assert_eq!(qb.to_sql().unwrap(), "SELECT * FROM users");
}

#[test]
fn test_union_before_where() {
    let mut qb = TableQb::new("users");
    qb.select_fields("id")
        .add_union("SELECT id FROM archived")
        .where_("id > ?", [100])
        .order_by("id");

    let sql = qb.to_sql().unwrap();
    assert_eq!(
        sql,
        "SELECT id FROM users UNION SELECT id FROM archived WHERE id > ? ORDER BY id"
    );
    let union = sql.find("UNION SELECT id FROM archived").unwrap();
    let where_ = sql.find("WHERE").unwrap();
    assert!(union < where_);
}

#[test]
fn test_multiple_unions() {
    let mut qb = TableQb::new("users");
    qb.select_fields("id")
        .add_union("SELECT id FROM archived")
        .add_union("SELECT id FROM deleted");
    assert_eq!(
        qb.to_sql().unwrap(),
        "SELECT id FROM users UNION SELECT id FROM archived UNION SELECT id FROM deleted"
    );
}

#[test]
fn test_having_requires_group_by() {
    let mut qb = TableQb::new("orders");
    qb.having("sum(total) > 10");
    assert!(!qb.to_sql().unwrap().contains("HAVING"));

    qb.group_by("customer_id");
    assert_eq!(
        qb.to_sql().unwrap(),
        "SELECT * FROM orders GROUP BY customer_id HAVING sum(total) > 10"
    );
}

#[test]
fn test_where_replaces_previous() {
    let mut qb = TableQb::new("users");
    qb.where_("a = ? AND b = ?", [1, 2]).where_("c = ?", [3]);
    let (sql, params) = qb.build().unwrap();
    assert_eq!(sql, "SELECT * FROM users WHERE c = ?");
    assert_eq!(params, vec![Value::Int(3)]);

    qb.where_raw("deleted_at IS NULL");
    assert!(qb.params().is_empty());
}

#[test]
fn test_setters_overwrite() {
    let mut qb = TableQb::new("users");
    qb.order_by("id").order_by("name").alias("a").alias("b");
    assert_eq!(qb.to_sql().unwrap(), "SELECT * FROM users AS b ORDER BY name");
}

#[test]
fn test_empty_table_is_config_error() {
    let mut qb = TableQb::new("");
    qb.select_fields("id");
    assert!(qb.to_sql().unwrap_err().is_config());
    assert!(qb.build().unwrap_err().is_config());
}

#[test]
fn test_reset() {
    let mut qb = TableQb::new("users");
    qb.select_fields("id").where_("id = ?", [1]).limit(1);
    qb.reset();
    assert_eq!(qb.to_sql().unwrap(), "SELECT * FROM users");
    assert!(qb.params().is_empty());
}

// ==================== Terminal reads ====================

#[tokio::test]
async fn test_fetch_all_delegates_and_resets() {
    let db = Recorder::with_rows(vec![user(1, "ann"), user(2, "bob")]);
    let mut qb = table(&db, "users");

    let rows = qb
        .select_fields("id,name")
        .where_("age > ?", [18])
        .fetch_all()
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get("name"), Some(&Value::from("bob")));
    assert_eq!(
        db.calls(),
        vec![Call::FetchAll(
            "SELECT id,name FROM users WHERE age > ?".into(),
            vec![Value::Int(18)],
            FetchStyle::Named,
        )]
    );
    assert_eq!(qb.to_sql().unwrap(), "SELECT * FROM users");
    assert!(qb.params().is_empty());
}

#[tokio::test]
async fn test_fetch_one() {
    let db = Recorder::with_rows(vec![user(7, "cy")]);
    let mut qb = table(&db, "users");

    let row = qb.where_("id = ?", [7]).fetch_one().await.unwrap().unwrap();
    assert_eq!(row.get("id"), Some(&Value::Int(7)));
    assert_eq!(
        db.calls(),
        vec![Call::FetchOne(
            "SELECT * FROM users WHERE id = ?".into(),
            vec![Value::Int(7)],
            FetchStyle::Named,
        )]
    );
    assert_eq!(qb.to_sql().unwrap(), "SELECT * FROM users");
}

#[tokio::test]
async fn test_fetch_one_not_found() {
    let db = Recorder::default();
    let mut qb = table(&db, "users");
    assert_eq!(qb.where_("id = ?", [0]).fetch_one().await.unwrap(), None);
}

#[tokio::test]
async fn test_reset_after_executor_failure() {
    let db = Recorder::failing();
    let mut qb = table(&db, "users");

    let err = qb
        .select_fields("id")
        .add_join("JOIN teams t ON t.id = users.team_id")
        .where_("t.id = ?", [1])
        .limit(3)
        .fetch_all()
        .await
        .unwrap_err();

    assert!(matches!(err, TableError::Other(_)));
    assert_eq!(qb.to_sql().unwrap(), "SELECT * FROM users");
    assert!(qb.params().is_empty());
}

#[tokio::test]
async fn test_reset_after_config_error() {
    let db = Recorder::default();
    let mut qb = table(&db, "");

    qb.select_fields("id").where_("id = ?", [1]);
    assert!(qb.fetch_all().await.unwrap_err().is_config());
    assert!(qb.params().is_empty());
    assert!(db.calls().is_empty());
}

#[test]
fn test_reset_when_read_is_dropped_unpolled() {
    let db = Recorder::with_rows(vec![user(1, "ann")]);
    let mut qb = table(&db, "users");

    qb.select_fields("id").where_("id = ?", [1]).limit(1);
    drop(qb.fetch_all());
    assert_eq!(qb.to_sql().unwrap(), "SELECT * FROM users");
    assert!(qb.params().is_empty());

    qb.order_by("id");
    drop(qb.scalar(Some("count(*)")));
    assert_eq!(qb.to_sql().unwrap(), "SELECT * FROM users");

    assert!(db.calls().is_empty());
}

#[tokio::test]
async fn test_fetch_as() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: i64,
        name: String,
    }

    let db = Recorder::with_rows(vec![user(1, "ann"), user(2, "bob")]);
    let mut qb = table(&db, "users");

    let users: Vec<User> = qb.fetch_all_as().await.unwrap();
    assert_eq!(
        users,
        vec![
            User { id: 1, name: "ann".into() },
            User { id: 2, name: "bob".into() },
        ]
    );

    let first: Option<User> = qb.fetch_one_as().await.unwrap();
    assert_eq!(first.map(|u| u.id), Some(1));
}

#[tokio::test]
async fn test_scalar_found() {
    let db = Recorder::with_rows(vec![Record::from_pairs([("count", 12i64)])]);
    let mut qb = table(&db, "users");

    let count = qb
        .where_("age > ?", [18])
        .scalar(Some("count(*)"))
        .await
        .unwrap();

    assert_eq!(count, Some(Value::Int(12)));
    assert_eq!(
        db.calls(),
        vec![Call::FetchOne(
            "SELECT count(*) FROM users WHERE age > ? LIMIT 1".into(),
            vec![Value::Int(18)],
            FetchStyle::Positional,
        )]
    );
    assert_eq!(qb.to_sql().unwrap(), "SELECT * FROM users");
}

#[tokio::test]
async fn test_scalar_not_found() {
    let db = Recorder::default();
    let mut qb = table(&db, "users");
    assert_eq!(qb.scalar(Some("id")).await.unwrap(), None);

    let db = Recorder::with_rows(vec![Record::positional(Vec::new())]);
    let mut qb = table(&db, "users");
    assert_eq!(qb.scalar(None).await.unwrap(), None);
}

#[tokio::test]
async fn test_scalar_keeps_configured_projection() {
    let db = Recorder::with_rows(vec![Record::positional(vec![Value::from("ann")])]);
    let mut qb = table(&db, "users");

    let name = qb
        .select_fields("name")
        .order_by("id")
        .limit(50)
        .scalar(None)
        .await
        .unwrap();

    assert_eq!(name.as_ref().and_then(Value::as_str), Some("ann"));
    assert_eq!(
        db.last_statement().as_deref(),
        Some("SELECT name FROM users ORDER BY id LIMIT 1")
    );
    assert_eq!(qb.last_sql(), db.last_statement());
}

// ==================== Mutations ====================

#[tokio::test]
async fn test_mutations_ignore_fragments() {
    let db = Recorder::default();
    let mut qb = table(&db, "users");
    qb.select_fields("id")
        .alias("u")
        .add_join("JOIN teams t ON true")
        .add_union("SELECT 1")
        .where_("id = ?", [1])
        .order_by("id")
        .limit(1);

    let id = qb
        .insert(&[("name", Value::from("ann")), ("age", Value::from(30))])
        .await
        .unwrap();
    assert_eq!(id, Some(Value::Int(42)));

    let updated = qb
        .update(&[("name", Value::from("bo"))], "id = ?", &[Value::Int(9)])
        .await
        .unwrap();
    assert_eq!(updated, 3);

    let deleted = qb.delete(Some("id = ?"), &[Value::Int(9)]).await.unwrap();
    assert_eq!(deleted, 2);
    qb.delete_all().await.unwrap();

    assert_eq!(
        db.calls(),
        vec![
            Call::Insert(
                "users".into(),
                vec![
                    ("name".into(), Value::from("ann")),
                    ("age".into(), Value::Int(30)),
                ],
            ),
            Call::Update(
                "users".into(),
                vec![("name".into(), Value::from("bo"))],
                "id = ?".into(),
                vec![Value::Int(9)],
            ),
            Call::Delete("users".into(), Some("id = ?".into()), vec![Value::Int(9)]),
            Call::Delete("users".into(), None, vec![]),
        ]
    );

    // Still configured: mutations neither read nor clear the fragments.
    assert_eq!(
        qb.to_sql().unwrap(),
        "SELECT id FROM users AS u JOIN teams t ON true UNION SELECT 1 WHERE id = ? ORDER BY id LIMIT 1"
    );
}

#[tokio::test]
async fn test_mutations_need_table() {
    let db = Recorder::default();
    let qb = table(&db, " ");
    assert!(qb.insert(&[("a", Value::Null)]).await.unwrap_err().is_config());
    assert!(qb.delete_all().await.unwrap_err().is_config());
    assert!(db.calls().is_empty());
}

// ==================== Metadata ====================

#[tokio::test]
async fn test_primary_key_cached() {
    let db = Recorder {
        primary_key: Some("id".into()),
        ..Recorder::default()
    };
    let mut qb = table(&db, "users");

    assert_eq!(qb.primary_key().await.unwrap().as_deref(), Some("id"));
    qb.where_raw("true").fetch_all().await.unwrap();
    assert_eq!(qb.primary_key().await.unwrap().as_deref(), Some("id"));

    let lookups = db
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::PrimaryKey(_)))
        .count();
    assert_eq!(lookups, 1);
}

#[tokio::test]
async fn test_missing_primary_key_cached() {
    let db = Recorder::default();
    let qb = table(&db, "logs");
    assert_eq!(qb.primary_key().await.unwrap(), None);
    assert_eq!(qb.primary_key().await.unwrap(), None);
    assert_eq!(db.calls(), vec![Call::PrimaryKey("logs".into())]);
}

#[tokio::test]
async fn test_unbound_builder() {
    let mut qb = TableQb::new("users");
    qb.where_("id = ?", [1]);

    assert!(qb.fetch_all().await.unwrap_err().is_config());
    assert_eq!(qb.to_sql().unwrap(), "SELECT * FROM users");
    assert!(qb.scalar(None).await.unwrap_err().is_config());
    assert!(qb.delete_all().await.unwrap_err().is_config());
    assert!(qb.primary_key().await.unwrap_err().is_config());
    assert_eq!(qb.last_sql(), None);
}

#[tokio::test]
async fn test_bind_keeps_fragments() {
    let mut qb = TableQb::new("users");
    qb.select_fields("id").where_("id = ?", [5]);

    let db = Recorder::with_rows(vec![user(5, "eve")]);
    let mut bound = qb.bind(&db);
    let row = bound.fetch_one().await.unwrap();

    assert!(row.is_some());
    assert_eq!(
        db.calls(),
        vec![Call::FetchOne(
            "SELECT id FROM users WHERE id = ?".into(),
            vec![Value::Int(5)],
            FetchStyle::Named,
        )]
    );
    assert_eq!(bound.table_name(), "users");
}

#[tokio::test]
async fn test_execute_passthrough() {
    let db = Recorder::default();
    let affected = (&db).execute("VACUUM users", &[]).await.unwrap();
    assert_eq!(affected, 0);
    assert_eq!(db.last_statement().as_deref(), Some("VACUUM users"));
}
