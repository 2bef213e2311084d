//! Storage Module Tests
//!
//! ## Test Scopes
//! - **Catalog**: loan, return and renewal rules, including the renewal limit.
//! - **Engine**: persistence after successful mutations only, rollback on a failed write.
//! - **Replication**: the mirror is written after the settle delay, never by the backup.
//! - **Snapshots**: seeding, peer initialisation, recovery from a missing or corrupt
//!   own snapshot and newest-wins reconciliation.
//! - **Liveness**: probe replies over loopback UDP.

#[cfg(test)]
mod tests {
    use crate::protocol::{IntentKind, WorkerIntent};
    use crate::storage::catalog::{
        BookRecord, Catalog, CatalogError, LOAN_PERIOD_DAYS, Loan, MAX_RENEWALS, timestamp,
    };
    use crate::storage::engine::{InstanceRole, StorageEngine};
    use crate::storage::liveness::{self, LivenessResponder};
    use crate::storage::replication::Replicator;
    use crate::storage::snapshot::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore, bootstrap};

    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    fn sample_catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.insert("LIB001", BookRecord::with_copies(2));
        catalog.insert("LIB002", BookRecord::with_copies(0));
        catalog
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn intent(kind: IntentKind, code: &str, user: &str) -> WorkerIntent {
        WorkerIntent::new(kind, code, user)
    }

    /// Store whose writes always fail.
    struct BrokenStore;

    #[async_trait]
    impl SnapshotStore for BrokenStore {
        async fn load(&self) -> Result<Option<crate::storage::snapshot::Snapshot>> {
            Ok(None)
        }

        async fn save(&self, _catalog: &Catalog) -> Result<()> {
            Err(anyhow!("disk full"))
        }

        fn describe(&self) -> String {
            "broken".to_string()
        }
    }

    /// Store that cannot be read and must not be written.
    struct UnreadableStore;

    #[async_trait]
    impl SnapshotStore for UnreadableStore {
        async fn load(&self) -> Result<Option<crate::storage::snapshot::Snapshot>> {
            Err(anyhow!("permission denied"))
        }

        async fn save(&self, _catalog: &Catalog) -> Result<()> {
            panic!("unreadable peer must not be overwritten");
        }

        fn describe(&self) -> String {
            "unreadable".to_string()
        }
    }

    // ============================================================
    // CATALOG TESTS
    // ============================================================

    #[test]
    fn test_loan_takes_a_copy() {
        let mut catalog = sample_catalog();
        let due = catalog.lend("LIB001", "u1", noon()).unwrap();

        let record = catalog.get("LIB001").unwrap();
        assert_eq!(record.available_copies, 1);
        assert_eq!(record.loans.len(), 1);
        assert_eq!(due, noon() + ChronoDuration::days(LOAN_PERIOD_DAYS));
        assert_eq!(record.loan_of("u1").unwrap().renewals, 0);
    }

    #[test]
    fn test_loan_rejections() {
        let mut catalog = sample_catalog();

        assert_eq!(catalog.lend("NOPE", "u1", noon()), Err(CatalogError::NotFound));
        assert_eq!(catalog.lend("LIB002", "u1", noon()), Err(CatalogError::Unavailable));
        assert_eq!(catalog.get("LIB002").unwrap().available_copies, 0);
    }

    #[test]
    fn test_return_requires_active_loan() {
        let mut catalog = sample_catalog();

        assert_eq!(catalog.return_copy("LIB001", "u1"), Err(CatalogError::NoActiveLoan));
        assert_eq!(catalog.return_copy("NOPE", "u1"), Err(CatalogError::NotFound));
        assert_eq!(catalog.get("LIB001").unwrap().available_copies, 2);
    }

    #[test]
    fn test_return_at_copy_limit_is_rejected_intact() {
        let mut catalog = Catalog::new();
        catalog.insert(
            "LIB009",
            BookRecord {
                available_copies: u32::MAX,
                loans: vec![Loan {
                    borrower: "u1".to_string(),
                    started_at: noon(),
                    due_at: noon() + ChronoDuration::days(LOAN_PERIOD_DAYS),
                    renewals: 0,
                }],
                extra: Default::default(),
            },
        );

        assert_eq!(catalog.return_copy("LIB009", "u1"), Err(CatalogError::CopyCountOverflow));
        let book = catalog.get("LIB009").unwrap();
        assert_eq!(book.available_copies, u32::MAX);
        assert_eq!(book.loans.len(), 1, "Loan is kept when the return fails");
    }

    #[test]
    fn test_return_removes_only_first_loan_of_borrower() {
        let mut catalog = sample_catalog();
        catalog.lend("LIB001", "u1", noon()).unwrap();
        catalog.lend("LIB001", "u1", noon()).unwrap();

        catalog.return_copy("LIB001", "u1").unwrap();

        let record = catalog.get("LIB001").unwrap();
        assert_eq!(record.available_copies, 1);
        assert_eq!(record.loans.len(), 1);
    }

    #[test]
    fn test_renewal_limit() {
        let mut catalog = sample_catalog();
        catalog.lend("LIB001", "u1", noon()).unwrap();

        for n in 1..=MAX_RENEWALS {
            let later = noon() + ChronoDuration::days(n as i64);
            let due = catalog.renew("LIB001", "u1", later).unwrap();
            assert_eq!(due, later + ChronoDuration::days(LOAN_PERIOD_DAYS));
        }

        let before = catalog.get("LIB001").cloned();
        assert_eq!(
            catalog.renew("LIB001", "u1", noon()),
            Err(CatalogError::RenewalLimitExceeded)
        );
        assert_eq!(catalog.get("LIB001").cloned(), before, "Rejected renewal must not mutate");
        assert_eq!(catalog.get("LIB001").unwrap().loan_of("u1").unwrap().renewals, MAX_RENEWALS);
    }

    #[test]
    fn test_renew_without_loan() {
        let mut catalog = sample_catalog();
        assert_eq!(catalog.renew("LIB001", "ghost", noon()), Err(CatalogError::NoActiveLoan));
    }

    #[test]
    fn test_full_circulation_scenario() {
        let mut catalog = sample_catalog();

        let loaned = catalog
            .apply(&intent(IntentKind::Loan, "LIB001", "u1"), noon())
            .unwrap()
            .into_result();
        assert!(loaned.ok);
        assert_eq!(loaned.mensaje, "Préstamo registrado");
        assert!(loaned.fecha_fin.is_some());

        for _ in 0..2 {
            let renewed = catalog
                .apply(&intent(IntentKind::Renew, "LIB001", "u1"), noon())
                .unwrap()
                .into_result();
            assert_eq!(renewed.mensaje, "Renovación realizada");
            assert!(renewed.nueva_fecha_fin.is_some());
        }

        let third = catalog
            .apply(&intent(IntentKind::Renew, "LIB001", "u1"), noon())
            .unwrap_err();
        assert_eq!(third.to_string(), "No se puede renovar más veces.");

        let returned = catalog
            .apply(&intent(IntentKind::Return, "LIB001", "u1"), noon())
            .unwrap()
            .into_result();
        assert_eq!(returned.mensaje, "Devolución registrada");

        let record = catalog.get("LIB001").unwrap();
        assert_eq!(record.available_copies, 2);
        assert!(record.loans.is_empty());
    }

    #[test]
    fn test_snapshot_format_keeps_unknown_fields() {
        let raw = r#"{
            "LIB001": {
                "titulo": "Cien años de soledad",
                "ejemplares_disponibles": 1,
                "prestamos": [
                    {"usuario": "u9", "fecha_inicio": "2025-01-02 10:00:00.000000",
                     "fecha_fin": "2025-01-16T10:00:00", "renovaciones": 1}
                ]
            }
        }"#;

        let catalog: Catalog = serde_json::from_str(raw).unwrap();
        let record = catalog.get("LIB001").unwrap();
        assert_eq!(record.extra["titulo"], "Cien años de soledad");
        assert_eq!(timestamp::format(&record.loans[0].due_at), "2025-01-16 10:00:00.000000");

        let encoded = serde_json::to_value(&catalog).unwrap();
        assert_eq!(encoded["LIB001"]["titulo"], "Cien años de soledad");
        assert_eq!(encoded["LIB001"]["prestamos"][0]["fecha_inicio"], "2025-01-02 10:00:00.000000");
    }

    // ============================================================
    // ENGINE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_engine_persists_successful_mutations_only() {
        let store = Arc::new(MemorySnapshotStore::new());
        let mut engine = StorageEngine::new(InstanceRole::Backup, sample_catalog(), store.clone(), None);

        let rejected = engine.apply(&intent(IntentKind::Loan, "LIB002", "u1")).await;
        assert!(!rejected.ok);
        assert_eq!(rejected.mensaje, "No hay ejemplares disponibles.");
        assert!(store.load().await.unwrap().is_none(), "Failed intent must not persist");

        let accepted = engine.apply(&intent(IntentKind::Loan, "LIB001", "u1")).await;
        assert!(accepted.ok);

        let saved = store.load().await.unwrap().expect("snapshot written");
        assert_eq!(saved.catalog, *engine.catalog());
        assert_eq!(saved.catalog.get("LIB001").unwrap().available_copies, 1);
    }

    #[tokio::test]
    async fn test_engine_rolls_back_on_failed_write() {
        let mut engine = StorageEngine::new(InstanceRole::Primary, sample_catalog(), Arc::new(BrokenStore), None);

        let result = engine.apply(&intent(IntentKind::Loan, "LIB001", "u1")).await;

        assert!(!result.ok);
        assert_eq!(result.mensaje, "Error interno en GA");
        assert_eq!(engine.catalog(), &sample_catalog());
    }

    #[tokio::test]
    async fn test_engine_handle_serves_intents_and_lookups() {
        let store = Arc::new(MemorySnapshotStore::new());
        let handle = StorageEngine::new(InstanceRole::Primary, sample_catalog(), store, None).spawn();

        let mut tasks = Vec::new();
        for i in 0..5 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle
                    .apply(intent(IntentKind::Loan, "LIB001", &format!("u{}", i)))
                    .await
                    .unwrap()
            }));
        }

        let mut granted = 0;
        for task in tasks {
            if task.await.unwrap().ok {
                granted += 1;
            }
        }

        assert_eq!(granted, 2, "Only the available copies may be lent");
        let record = handle.lookup("LIB001").await.unwrap().unwrap();
        assert_eq!(record.available_copies, 0);
        assert_eq!(record.loans.len(), 2);
        assert!(handle.lookup("NOPE").await.unwrap().is_none());
    }

    // ============================================================
    // REPLICATION TESTS
    // ============================================================

    #[tokio::test(start_paused = true)]
    async fn test_replication_waits_for_settle_delay() {
        let mirror = Arc::new(MemorySnapshotStore::new());
        let replicator = Replicator::new(mirror.clone(), Duration::from_millis(500));

        let task = replicator.schedule(sample_catalog());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(mirror.load().await.unwrap().is_none());

        assert!(task.await.unwrap());
        assert_eq!(mirror.load().await.unwrap().unwrap().catalog, sample_catalog());
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_replication_is_skipped() {
        let mirror = Arc::new(MemorySnapshotStore::new());
        let replicator = Replicator::new(mirror.clone(), Duration::from_millis(500));

        let mut newer = sample_catalog();
        newer.lend("LIB001", "u1", noon()).unwrap();

        let first = replicator.schedule(sample_catalog());
        let second = replicator.schedule(newer.clone());

        assert!(!first.await.unwrap());
        assert!(second.await.unwrap());
        assert_eq!(mirror.load().await.unwrap().unwrap().catalog, newer);
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_mirrors_and_backup_does_not() {
        let mirror = Arc::new(MemorySnapshotStore::new());

        let mut backup = StorageEngine::new(
            InstanceRole::Backup,
            sample_catalog(),
            Arc::new(MemorySnapshotStore::new()),
            Some(Replicator::new(mirror.clone(), Duration::from_millis(500))),
        );
        assert!(backup.apply(&intent(IntentKind::Loan, "LIB001", "u1")).await.ok);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(mirror.load().await.unwrap().is_none(), "Backup must never write the mirror");

        let mut primary = StorageEngine::new(
            InstanceRole::Primary,
            sample_catalog(),
            Arc::new(MemorySnapshotStore::new()),
            Some(Replicator::new(mirror.clone(), Duration::from_millis(500))),
        );
        assert!(primary.apply(&intent(IntentKind::Loan, "LIB001", "u1")).await.ok);
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mirrored = mirror.load().await.unwrap().expect("mirror written");
        assert_eq!(mirrored.catalog, *primary.catalog());
    }

    // ============================================================
    // SNAPSHOT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_bootstrap_from_seed_initialises_both_stores() {
        let dir = tempfile::tempdir().unwrap();
        let seed = dir.path().join("bd_libros_inicial.json");
        std::fs::write(&seed, r#"{"LIB001": {"ejemplares_disponibles": 3}}"#).unwrap();

        let own = FileSnapshotStore::new(dir.path().join("primaria.json"));
        let peer = FileSnapshotStore::new(dir.path().join("replica.json"));

        let catalog = bootstrap(&own, Some(&seed), Some(&peer), true).await.unwrap();
        assert_eq!(catalog.get("LIB001").unwrap().available_copies, 3);

        assert_eq!(own.load().await.unwrap().unwrap().catalog, catalog);
        assert_eq!(peer.load().await.unwrap().unwrap().catalog, catalog);
    }

    #[tokio::test]
    async fn test_bootstrap_keeps_existing_peer() {
        let dir = tempfile::tempdir().unwrap();
        let seed = dir.path().join("seed.json");
        std::fs::write(&seed, r#"{"LIB001": {"ejemplares_disponibles": 3}}"#).unwrap();

        let own = MemorySnapshotStore::new();
        let peer = MemorySnapshotStore::with_catalog(Catalog::new(), SystemTime::now());

        bootstrap(&own, Some(&seed), Some(&peer), true).await.unwrap();
        assert!(peer.load().await.unwrap().unwrap().catalog.is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_missing_seed_fails() {
        let dir = tempfile::tempdir().unwrap();
        let own = MemorySnapshotStore::new();

        let result = bootstrap(&own, Some(&dir.path().join("missing.json")), None, false).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_reconcile_adopts_newer_peer() {
        let older = SystemTime::now() - Duration::from_secs(60);
        let mut newer_catalog = sample_catalog();
        newer_catalog.lend("LIB001", "u1", noon()).unwrap();

        let own = MemorySnapshotStore::with_catalog(sample_catalog(), older);
        let peer = MemorySnapshotStore::with_catalog(newer_catalog.clone(), SystemTime::now());

        let catalog = bootstrap(&own, None, Some(&peer), true).await.unwrap();
        assert_eq!(catalog, newer_catalog);
        assert_eq!(own.load().await.unwrap().unwrap().catalog, newer_catalog);
    }

    #[tokio::test]
    async fn test_reconcile_keeps_own_when_newer_or_disabled() {
        let older = SystemTime::now() - Duration::from_secs(60);
        let mut other = sample_catalog();
        other.lend("LIB001", "u1", noon()).unwrap();

        let own = MemorySnapshotStore::with_catalog(sample_catalog(), SystemTime::now());
        let peer = MemorySnapshotStore::with_catalog(other.clone(), older);
        assert_eq!(bootstrap(&own, None, Some(&peer), true).await.unwrap(), sample_catalog());

        let own = MemorySnapshotStore::with_catalog(sample_catalog(), older);
        let peer = MemorySnapshotStore::with_catalog(other, SystemTime::now());
        assert_eq!(bootstrap(&own, None, Some(&peer), false).await.unwrap(), sample_catalog());
    }

    #[tokio::test]
    async fn test_file_store_round_trip_and_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bd.json");
        let store = FileSnapshotStore::new(&path);

        assert!(store.load().await.unwrap().is_none());

        store.save(&sample_catalog()).await.unwrap();
        let snapshot = store.load().await.unwrap().unwrap();
        assert_eq!(snapshot.catalog, sample_catalog());
        assert!(snapshot.written_at.is_some());

        std::fs::write(&path, "{not json").unwrap();
        assert!(store.load().await.unwrap().is_none(), "Unreadable snapshot counts as absent");

        assert!(!path.exists());
        let kept: Vec<String> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("bd.json.corrupt-"))
            .collect();
        assert_eq!(kept.len(), 1, "Corrupt snapshot is kept aside");
        let aside = path.parent().unwrap().join(&kept[0]);
        assert_eq!(std::fs::read_to_string(aside).unwrap(), "{not json");
    }

    #[tokio::test]
    async fn test_corrupt_own_snapshot_adopts_peer_over_seed() {
        let dir = tempfile::tempdir().unwrap();
        let seed = dir.path().join("seed.json");
        std::fs::write(&seed, r#"{"LIB001": {"ejemplares_disponibles": 2}}"#).unwrap();
        let own_path = dir.path().join("primaria.json");
        std::fs::write(&own_path, "{ truncated").unwrap();

        let mut peer_catalog = Catalog::new();
        peer_catalog.insert("LIB001", BookRecord::with_copies(2));
        peer_catalog.lend("LIB001", "juan", noon()).unwrap();
        let peer = MemorySnapshotStore::with_catalog(peer_catalog.clone(), SystemTime::now());
        let own = FileSnapshotStore::new(&own_path);

        let catalog = bootstrap(&own, Some(&seed), Some(&peer), true).await.unwrap();

        let book = catalog.get("LIB001").unwrap();
        assert_eq!(book.available_copies, 1);
        assert_eq!(book.loans.len(), 1);
        assert_eq!(own.load().await.unwrap().unwrap().catalog, peer_catalog);
        assert_eq!(peer.load().await.unwrap().unwrap().catalog, peer_catalog, "Peer is never reseeded");
    }

    #[tokio::test]
    async fn test_missing_own_snapshot_adopts_peer_even_without_reconcile() {
        let mut peer_catalog = sample_catalog();
        peer_catalog.lend("LIB001", "u1", noon()).unwrap();
        let peer = MemorySnapshotStore::with_catalog(peer_catalog.clone(), SystemTime::now());
        let own = MemorySnapshotStore::new();

        let catalog = bootstrap(&own, None, Some(&peer), false).await.unwrap();

        assert_eq!(catalog, peer_catalog);
    }

    #[tokio::test]
    async fn test_unreadable_peer_is_not_reseeded() {
        let dir = tempfile::tempdir().unwrap();
        let seed = dir.path().join("seed.json");
        std::fs::write(&seed, r#"{"LIB001": {"ejemplares_disponibles": 3}}"#).unwrap();
        let own = MemorySnapshotStore::new();

        let catalog = bootstrap(&own, Some(&seed), Some(&UnreadableStore), true).await.unwrap();

        assert_eq!(catalog.get("LIB001").unwrap().available_copies, 3);
        assert!(own.load().await.unwrap().is_some());
    }

    // ============================================================
    // LIVENESS TESTS
    // ============================================================

    #[test]
    fn test_liveness_replies() {
        assert_eq!(liveness::reply_for(b"PING"), "PONG");
        assert_eq!(liveness::reply_for(b"PING\n"), "PONG");
        assert_eq!(liveness::reply_for(b"ping"), "UNKNOWN");
        assert_eq!(liveness::reply_for(&[0xff, 0xfe]), "UNKNOWN");
    }

    #[tokio::test]
    async fn test_liveness_probe_over_udp() {
        let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let responder = LivenessResponder::bind(bind).await.unwrap();
        let addr = responder.local_addr().unwrap();
        let task = tokio::spawn(responder.run());

        assert!(liveness::probe(addr, Duration::from_secs(2)).await.unwrap());

        task.abort();
    }
}
