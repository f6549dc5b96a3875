use wsdb::WorkspaceDb;
use wsdb::catalog::Catalog;
use wsdb::catalog::types::{ColumnType, Row};
use wsdb::config::WorkspaceConfig;
use wsdb::declarative::TableSpec;
use wsdb::query::plan::{Order, col};
use wsdb::repository::{
    RepositoryError, RowDecodeError, TryFromRow, WorkspaceRepository, i64_at, opt_i64_at,
    text_at,
};
use wsdb::workspace::{WorkspaceAction, WorkspaceContext};

#[derive(Debug, Clone, PartialEq)]
struct Note {
    id: i64,
    body: String,
    workspace_id: i64,
    action: Option<i64>,
}

impl TryFromRow for Note {
    fn try_from_row(row: Row) -> Result<Self, RowDecodeError> {
        Ok(Self {
            id: i64_at(&row, 0, "id")?,
            body: text_at(&row, 1, "body")?.to_string(),
            workspace_id: i64_at(&row, 2, "workspace_id")?,
            action: opt_i64_at(&row, 3, "workspace_action")?,
        })
    }
}

/// Decodes `body` as an integer to force a decode failure.
#[derive(Debug)]
struct Misread;

impl TryFromRow for Misread {
    fn try_from_row(row: Row) -> Result<Self, RowDecodeError> {
        i64_at(&row, 1, "body")?;
        Ok(Misread)
    }
}

fn open() -> WorkspaceDb {
    let mut catalog = Catalog::new();
    TableSpec::new("note")
        .auto_increment_column("id")
        .column("body", ColumnType::Text, false)
        .primary_key(&["id"])
        .apply(&mut catalog)
        .expect("note");
    WorkspaceDb::open(catalog, WorkspaceConfig::strict()).expect("open")
}

#[test]
fn typed_reads_are_scoped_to_the_caller() {
    let db = open();
    let alice = WorkspaceContext::new(10);
    let bob = WorkspaceContext::new(20);

    let (mine, theirs, first) = db
        .transaction(|store, tx| -> Result<_, RepositoryError> {
            let notes = WorkspaceRepository::<Note>::new(store, &alice, "note")?;
            let others = WorkspaceRepository::<Note>::new(store, &bob, "note")?;
            notes.insert(tx, notes.criteria().add("body", "one"))?;
            notes.insert(tx, notes.criteria().add("body", "two"))?;
            others.insert(tx, others.criteria().add("body", "elsewhere"))?;

            let mine = notes.find(tx, notes.criteria().order_by("id", Order::Desc))?;
            let theirs = others.count(tx, others.criteria())?;
            let first = notes.find_one(
                tx,
                notes.criteria().add_expr("body", col("body").like("t%")),
            )?;
            Ok((mine, theirs, first))
        })
        .expect("reads");

    assert_eq!(
        mine.iter().map(|n| n.body.as_str()).collect::<Vec<_>>(),
        vec!["two", "one"]
    );
    assert!(mine.iter().all(|n| n.workspace_id == 10));
    assert!(mine.iter().all(|n| n.action == Some(WorkspaceAction::Created.code())));
    assert_eq!(theirs, 1);
    assert_eq!(first.map(|n| n.id), Some(2));
}

#[test]
fn history_decodes_archived_states_in_revision_order() {
    let db = open();
    let ctx = WorkspaceContext::new(4);

    let history = db
        .transaction(|store, tx| -> Result<_, RepositoryError> {
            let notes = WorkspaceRepository::<Note>::new(store, &ctx, "note")?;
            notes.insert(tx, notes.criteria().add("body", "draft"))?;
            notes.update(
                tx,
                notes.criteria().add("id", 1),
                notes.criteria().add("body", "final"),
            )?;
            notes.delete(tx, notes.criteria().add("id", 1))?;
            notes.history(tx, notes.criteria().add("id", 1))
        })
        .expect("history");

    let summary: Vec<_> = history
        .iter()
        .map(|entry| (entry.rev, entry.action, entry.record.body.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (1, Some(WorkspaceAction::Created), "draft"),
            (2, Some(WorkspaceAction::Updated), "final"),
            (3, Some(WorkspaceAction::Deleted), "final"),
        ]
    );
    assert!(history.iter().all(|entry| entry.record.id == 1));
}

#[test]
fn history_of_another_workspace_is_empty() {
    let db = open();
    let owner = WorkspaceContext::new(1);
    let stranger = WorkspaceContext::new(2);
    let seen = db
        .transaction(|store, tx| -> Result<_, RepositoryError> {
            let notes = WorkspaceRepository::<Note>::new(store, &owner, "note")?;
            notes.insert(tx, notes.criteria().add("body", "secret"))?;
            notes.delete(tx, notes.criteria().add("id", 1))?;
            let peek = WorkspaceRepository::<Note>::new(store, &stranger, "note")?;
            peek.history(tx, peek.criteria())
        })
        .expect("history");
    assert!(seen.is_empty());
}

#[test]
fn decode_failures_surface_as_repository_errors() {
    let db = open();
    let ctx = WorkspaceContext::new(1);
    let err = db
        .transaction(|store, tx| -> Result<_, RepositoryError> {
            let notes = WorkspaceRepository::<Misread>::new(store, &ctx, "note")?;
            notes.insert(tx, notes.criteria().add("body", "text"))?;
            notes.find(tx, notes.criteria())
        })
        .expect_err("decode");
    assert!(matches!(
        err,
        RepositoryError::Decode(RowDecodeError::TypeMismatch { .. })
    ));
    // The failed read rolled the insert back.
    assert_eq!(db.storage().row_count("note").expect("rows"), 0);
}

#[test]
fn unknown_tables_cannot_back_a_repository() {
    let db = open();
    let ctx = WorkspaceContext::new(1);
    let err = WorkspaceRepository::<Note>::new(db.interceptor(), &ctx, "missing")
        .err()
        .expect("not governed");
    assert_eq!(err.code(), wsdb::error::WsdbErrorCode::NotGoverned);
}
