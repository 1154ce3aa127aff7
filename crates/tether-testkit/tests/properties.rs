//! Property tests over generated transforms.

use proptest::prelude::*;
use tokio::runtime::Runtime;

use tether_core::{Query, QueryResult, Transform};
use tether_store::{MemoryStore, SqliteStore, Store};
use tether_sync::{compute_log_digest, verify_convergence};
use tether_testkit::fixtures::{solar_system, ContextFixture};
use tether_testkit::generators::{transform, transforms};

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

async fn snapshot<S: Store + ?Sized>(store: &S) -> Vec<QueryResult> {
    let mut out = Vec::new();
    for kind in ["moon", "planet", "star"] {
        out.push(store.query(&Query::find_records(kind)).await.unwrap());
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn applying_twice_equals_applying_once(t in transform()) {
        let rt = runtime();
        rt.block_on(async {
            let once = MemoryStore::new();
            let twice = MemoryStore::new();

            once.update(&t).await.unwrap();
            twice.update(&t).await.unwrap();
            let again = twice.update(&t).await.unwrap();

            assert_eq!(again.transform_id, t.id);
            assert_eq!(again.records.len(), t.len());
            assert!(!twice.transformed(&t).await.unwrap());
            assert_eq!(snapshot(&once).await, snapshot(&twice).await);
            assert_eq!(twice.transform_log().await.unwrap().len(), 1);
        });
    }

    #[test]
    fn memory_and_sqlite_agree(ts in transforms(8)) {
        let rt = runtime();
        rt.block_on(async {
            let memory = MemoryStore::new();
            let sqlite = SqliteStore::open_memory().unwrap();
            for t in &ts {
                let a = memory.update(t).await.unwrap();
                let b = sqlite.update(t).await.unwrap();
                assert_eq!(a, b);
            }
            assert_eq!(snapshot(&memory).await, snapshot(&sqlite).await);
            assert!(verify_convergence(&memory, &sqlite).await.unwrap().is_converged());
        });
    }

    #[test]
    fn replaying_in_the_same_order_converges(ts in transforms(6)) {
        let rt = runtime();
        rt.block_on(async {
            let a = MemoryStore::new();
            let b = MemoryStore::new();
            for t in ts.iter().chain(ts.iter()) {
                a.transformed(t).await.unwrap();
            }
            for t in &ts {
                b.transformed(t).await.unwrap();
            }
            assert_eq!(snapshot(&a).await, snapshot(&b).await);
            assert_eq!(
                compute_log_digest(&a).await.unwrap(),
                compute_log_digest(&b).await.unwrap()
            );
        });
    }
}

#[tokio::test]
async fn test_secondaries_converge_with_primary() {
    let fixture = ContextFixture::with_records(3, solar_system()).await.unwrap();

    let writes: Vec<Transform> = (0..5)
        .map(|i| {
            Transform::builder()
                .id(format!("t{i}"))
                .update_record(
                    tether_core::Record::new("planet", "earth").with_attribute("visits", i),
                )
                .build()
        })
        .collect();

    // Writes arrive from different contexts.
    for (i, t) in writes.iter().enumerate() {
        if i % 2 == 0 {
            fixture.apply_on_primary(t).await.unwrap();
        } else {
            fixture.secondary(i % 3).update(t.clone()).await.unwrap();
        }
    }
    for t in &writes {
        fixture.settle(t.id.clone()).await;
    }

    for source in &fixture.secondaries {
        let result = verify_convergence(source.local().as_ref(), fixture.primary_store.as_ref())
            .await
            .unwrap();
        assert!(result.is_converged(), "{result:?}");
    }

    let earth = fixture
        .secondary(2)
        .query(Query::find_record("planet", "earth"))
        .await
        .unwrap();
    let QueryResult::Record(earth) = earth else {
        panic!("expected a record");
    };
    assert_eq!(earth.attribute("visits"), Some(&serde_json::json!(4)));
}
