use criterion::{Criterion, black_box, criterion_group, criterion_main};
use wsdb::WorkspaceDb;
use wsdb::catalog::Catalog;
use wsdb::catalog::types::ColumnType;
use wsdb::config::WorkspaceConfig;
use wsdb::declarative::TableSpec;
use wsdb::query::plan::Criteria;
use wsdb::workspace::{GovernedStore, WorkspaceContext};

const TABLE_NAME: &str = "users";
const SEEDED_ROWS: i64 = 10_000;
const WORKSPACES: i64 = 8;

fn setup_db(seed_rows: i64) -> WorkspaceDb {
    let mut catalog = Catalog::new();
    TableSpec::new(TABLE_NAME)
        .column("id", ColumnType::Integer, false)
        .column("name", ColumnType::Text, false)
        .column("age", ColumnType::Integer, false)
        .primary_key(&["id"])
        .apply(&mut catalog)
        .expect("table");
    let db = WorkspaceDb::open(catalog, WorkspaceConfig::strict()).expect("open");
    db.transaction(|store, tx| {
        for id in 0..seed_rows {
            let ctx = WorkspaceContext::new(id % WORKSPACES);
            store.insert(
                &ctx,
                tx,
                Criteria::for_table(TABLE_NAME)
                    .add("id", id)
                    .add("name", format!("user-{id}"))
                    .add("age", 18 + id % 60),
            )?;
        }
        Ok::<_, wsdb::error::WsdbError>(())
    })
    .expect("seed");
    db
}

fn bench_governed_paths(c: &mut Criterion) {
    let db = setup_db(SEEDED_ROWS);
    let ctx = WorkspaceContext::new(3);

    c.bench_function("scoped_select_by_age", |b| {
        b.iter(|| {
            let rows = db
                .transaction(|store, tx| {
                    store.select(&ctx, tx, Criteria::for_table(TABLE_NAME).add("age", 42))
                })
                .expect("select");
            black_box(rows.len());
        })
    });

    c.bench_function("update_with_backup_single_row", |b| {
        let mut n = 0_i64;
        b.iter(|| {
            n += 1;
            let updated = db
                .transaction(|store, tx| {
                    store.update(
                        &ctx,
                        tx,
                        Criteria::for_table(TABLE_NAME)
                            .add("id", 3)
                            .add("workspace_id", 3),
                        Criteria::new().add("age", 18 + n % 60),
                    )
                })
                .expect("update");
            black_box(updated);
        })
    });

    c.bench_function("insert_then_delete_with_double_archive", |b| {
        let mut id = SEEDED_ROWS;
        b.iter(|| {
            id += 1;
            let deleted = db
                .transaction(|store, tx| {
                    store.insert(
                        &ctx,
                        tx,
                        Criteria::for_table(TABLE_NAME)
                            .add("id", id)
                            .add("name", "temp")
                            .add("age", 30),
                    )?;
                    store.delete(&ctx, tx, Criteria::for_table(TABLE_NAME).add("id", id))
                })
                .expect("delete");
            black_box(deleted);
        })
    });
}

criterion_group!(benches, bench_governed_paths);
criterion_main!(benches);
