mod common;

use audited_unit_of_work::{StaticUserContext, UnitOfWorkError, UnitOfWorkOptions};
use chrono::{TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use common::{cleanup_database, factory, setup_database, Customer, LedgerEntry};

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
async fn test_bulk_insert_generates_ids_and_stamps_batch() {
    let pool = setup_database().await;
    // Small chunks so the batch is streamed in several pieces
    let factory = factory(&pool, Arc::new(StaticUserContext::new("importer"))).with_options(
        UnitOfWorkOptions {
            bulk_chunk_bytes: 1024,
            ..UnitOfWorkOptions::default()
        },
    );

    let mut customers: Vec<Customer> = (0..250)
        .map(|i| Customer::new(&format!("Customer{i}")))
        .collect();
    customers[7].name = "Tab\tNew\nLine\\Slash".to_string();
    customers[8].email = None;

    let mut uow = factory
        .create_unit_of_work()
        .await
        .expect("Failed to create unit of work");
    let rows = uow
        .bulk_insert(&mut customers, None)
        .await
        .expect("Failed to bulk insert");
    assert_eq!(rows, 250);
    uow.commit().await.expect("Failed to commit");
    uow.dispose().await;

    let ids: HashSet<Uuid> = customers.iter().map(|c| c.id).collect();
    assert_eq!(ids.len(), 250, "Every customer should get a distinct id");
    assert!(!ids.contains(&Uuid::nil()));

    let stamp = customers[0].audit.created;
    assert!(customers
        .iter()
        .all(|c| c.audit.created == stamp && c.audit.created_by == "importer"));
    assert!(customers.iter().all(|c| c.audit.last_modified.is_none()));

    let mut verify = factory
        .create_unit_of_work()
        .await
        .expect("Failed to create verify unit of work");
    let stored = verify
        .get_all::<Customer>()
        .await
        .expect("Failed to get customers");
    assert_eq!(stored.len(), 250);
    let stored_ids: HashSet<Uuid> = stored.iter().map(|c| c.id).collect();
    assert_eq!(stored_ids, ids);

    let escaped = verify
        .get::<Customer>(customers[7].id)
        .await
        .expect("Failed to get customer")
        .expect("Customer should exist");
    assert_eq!(escaped.name, "Tab\tNew\nLine\\Slash");
    assert_eq!(escaped.audit.created_by, "importer");
    let no_email = verify
        .get::<Customer>(customers[8].id)
        .await
        .expect("Failed to get customer")
        .expect("Customer should exist");
    assert!(no_email.email.is_none());
    verify.dispose().await;

    cleanup_database(&pool).await;
    pool.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
async fn test_bulk_insert_keeps_supplied_ids_and_timestamps() {
    let pool = setup_database().await;
    let factory = factory(&pool, Arc::new(StaticUserContext::new("importer")));

    let booked_at = Utc
        .with_ymd_and_hms(2024, 2, 29, 23, 59, 58)
        .single()
        .expect("valid timestamp");
    let mut entries = vec![
        LedgerEntry::new("cash", 5, booked_at),
        LedgerEntry::new("cash", 7, booked_at),
    ];
    let mut customer = Customer::new("Preset");
    let preset = Uuid::new_v4();
    customer.id = preset;

    let mut uow = factory
        .create_unit_of_work()
        .await
        .expect("Failed to create unit of work");
    let rows = uow
        .bulk_insert(&mut entries, None)
        .await
        .expect("Failed to bulk insert entries");
    assert_eq!(rows, 2);
    assert!(entries.iter().all(|e| e.id == 0), "Store-assigned ids are not read back");
    uow.bulk_insert(std::slice::from_mut(&mut customer), None)
        .await
        .expect("Failed to bulk insert customer");
    assert_eq!(customer.id, preset);

    let stored = uow
        .get_all::<LedgerEntry>()
        .await
        .expect("Failed to get entries");
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|e| e.booked_at == booked_at && e.id > 0));
    uow.commit().await.expect("Failed to commit");
    uow.dispose().await;

    cleanup_database(&pool).await;
    pool.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
async fn test_bulk_insert_into_explicit_table() {
    let pool = setup_database().await;
    sqlx::query(r#"CREATE TABLE "CustomerArchive" (LIKE "Customer")"#)
        .execute(&pool)
        .await
        .expect("Failed to create archive table");
    let factory = factory(&pool, Arc::new(StaticUserContext::new("archiver")));

    let mut customers = vec![Customer::new("Old"), Customer::new("Older")];
    let mut uow = factory
        .create_unit_of_work()
        .await
        .expect("Failed to create unit of work");
    uow.bulk_insert(&mut customers, Some("CustomerArchive"))
        .await
        .expect("Failed to bulk insert");

    let (archived,): (i64,) = uow
        .query_single(r#"SELECT COUNT(*) FROM "CustomerArchive""#, &[])
        .await
        .expect("Failed to count archive");
    assert_eq!(archived, 2);
    assert!(uow
        .get_all::<Customer>()
        .await
        .expect("Failed to get customers")
        .is_empty());
    uow.rollback().await.expect("Failed to rollback");
    uow.dispose().await;

    sqlx::query(r#"DROP TABLE IF EXISTS "CustomerArchive""#)
        .execute(&pool)
        .await
        .expect("Failed to drop archive table");
    cleanup_database(&pool).await;
    pool.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
async fn test_bulk_insert_without_copy_support_is_rejected() {
    let pool = setup_database().await;

    for options in [
        UnitOfWorkOptions {
            bulk_copy: false,
            ..UnitOfWorkOptions::default()
        },
        UnitOfWorkOptions {
            read_only: true,
            ..UnitOfWorkOptions::default()
        },
    ] {
        let factory =
            factory(&pool, Arc::new(StaticUserContext::new("importer"))).with_options(options);
        let mut customers = vec![Customer::new("Never")];

        let mut uow = factory
            .create_unit_of_work()
            .await
            .expect("Failed to create unit of work");
        let result = uow.bulk_insert(&mut customers, None).await;
        assert!(matches!(
            result,
            Err(UnitOfWorkError::UnsupportedCapability { ref table, .. }) if table == "Customer"
        ));
        // Nothing was prepared, let alone sent
        assert!(customers[0].id.is_nil());
        assert!(customers[0].audit.created_by.is_empty());

        // The transaction is still usable
        assert!(uow
            .get_all::<Customer>()
            .await
            .expect("Failed to get customers")
            .is_empty());
        uow.rollback().await.expect("Failed to rollback");
        uow.dispose().await;
    }

    cleanup_database(&pool).await;
    pool.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
async fn test_failed_bulk_insert_leaves_outcome_to_caller() {
    let pool = setup_database().await;
    let factory = factory(&pool, Arc::new(StaticUserContext::new("importer")));

    let mut uow = factory
        .create_unit_of_work()
        .await
        .expect("Failed to create unit of work");
    let mut first = Customer::new("Unique");
    uow.insert(&mut first).await.expect("Failed to insert customer");

    let mut batch = vec![Customer::new("Fresh"), first.clone()];
    let result = uow.bulk_insert(&mut batch, None).await;
    assert!(matches!(result, Err(UnitOfWorkError::Store(_))));
    assert!(!uow.is_completed());
    assert!(uow.is_aborted());
    uow.rollback().await.expect("Failed to rollback");
    uow.dispose().await;

    let mut verify = factory
        .create_unit_of_work()
        .await
        .expect("Failed to create verify unit of work");
    assert!(verify
        .get_all::<Customer>()
        .await
        .expect("Failed to get customers")
        .is_empty());
    verify.dispose().await;

    cleanup_database(&pool).await;
    pool.close().await;
}
