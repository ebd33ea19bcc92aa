//! Overlapping writers against PostgreSQL, where unique-key waits and row locks are real.

use common::payload::SubmittedSample;
use futures::future::join_all;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, TransactionTrait};
use serde_json::{Value, json};

use registry::composite::CompositeEntityResolver;
use registry::entity::{donor, sample_set, specimen};
use registry::ids::UuidAllocator;

use crate::common::{STUDY, TestApp, payload, sample};

/// A submission whose samples come from `donors`, in that order.
fn payload_for_donors(donors: &[&str]) -> Value {
    let mut doc = payload();
    doc["samples"] = Value::Array(
        donors
            .iter()
            .map(|d| sample(&format!("SA-{d}"), &format!("SP-{d}"), d))
            .collect(),
    );
    doc
}

async fn donor_count(app: &TestApp) -> u64 {
    donor::Entity::find()
        .filter(donor::Column::StudyId.eq(STUDY))
        .count(&app.db)
        .await
        .unwrap()
}

mod submissions {
    use super::*;

    #[tokio::test]
    async fn concurrent_submissions_share_new_composites() {
        let app = TestApp::spawn_postgres().await;
        app.register_variant_call().await;

        let results = join_all((0..8).map(|_| app.analyses().create(STUDY, payload()))).await;
        let ids: Vec<String> = results
            .into_iter()
            .map(|r| r.expect("create failed"))
            .collect();

        assert_eq!(donor_count(&app).await, 1);
        assert_eq!(specimen::Entity::find().count(&app.db).await.unwrap(), 1);
        assert_eq!(
            registry::entity::sample::Entity::find()
                .count(&app.db)
                .await
                .unwrap(),
            1
        );

        let links = sample_set::Entity::find().all(&app.db).await.unwrap();
        assert_eq!(links.len(), ids.len());
        assert!(links.iter().all(|l| l.sample_id == links[0].sample_id));
    }

    #[tokio::test]
    async fn cross_ordered_submissions_all_succeed() {
        let app = TestApp::spawn_postgres().await;
        app.register_variant_call().await;

        for round in 0..5 {
            let donors: Vec<String> = (0..4).map(|i| format!("DO{round}-{i}")).collect();
            let forward: Vec<&str> = donors.iter().map(String::as_str).collect();
            let backward: Vec<&str> = forward.iter().rev().copied().collect();

            let docs = [
                payload_for_donors(&forward),
                payload_for_donors(&backward),
                payload_for_donors(&forward),
                payload_for_donors(&backward),
            ];
            let results = join_all(
                docs.iter()
                    .cloned()
                    .map(|doc| app.analyses().create(STUDY, doc)),
            )
            .await;
            let ids: Vec<String> = results
                .into_iter()
                .map(|r| r.expect("create failed"))
                .collect();

            // Samples come back in submitted order whatever order they were resolved in.
            for (id, expected) in ids.iter().zip([&forward, &backward, &forward, &backward]) {
                let analysis = app.analyses().read_deep(id).await.unwrap();
                let order: Vec<&str> = analysis
                    .samples
                    .iter()
                    .map(|c| c.donor.submitter_donor_id.as_str())
                    .collect();
                assert_eq!(&order, expected);
            }
        }

        assert_eq!(donor_count(&app).await, 20);
    }
}

mod races {
    use super::*;

    #[tokio::test]
    async fn resolver_adopts_the_row_of_a_concurrent_winner() {
        let app = TestApp::spawn_postgres().await;
        let submitted: SubmittedSample =
            serde_json::from_value(sample("SA1", "SP1", "DO1")).unwrap();

        let holder = app.db.begin().await.unwrap();
        let won = CompositeEntityResolver::new(&holder, &UuidAllocator, 3)
            .resolve_sample(STUDY, &submitted)
            .await
            .unwrap();

        // The second writer misses the uncommitted rows, then blocks on the donor key.
        let db = app.db.clone();
        let racing = submitted.clone();
        let racer = tokio::spawn(async move {
            CompositeEntityResolver::new(&db, &UuidAllocator, 3)
                .resolve_sample(STUDY, &racing)
                .await
        });
        app.wait_for_lock_waiters(1).await;
        holder.commit().await.unwrap();

        let lost = racer.await.unwrap().unwrap();
        assert_eq!(lost, won);
        assert_eq!(donor_count(&app).await, 1);
    }

    #[tokio::test]
    async fn registration_takes_the_next_version_after_losing_a_race() {
        let app = TestApp::spawn_postgres().await;

        let holder = app.db.begin().await.unwrap();
        let first = app
            .schemas()
            .register(&holder, "seqread", json!({"type": "object"}))
            .await
            .unwrap();
        assert_eq!(first.version, 1);

        let db = app.db.clone();
        let schemas = app.state.schemas.clone();
        let racer = tokio::spawn(async move {
            schemas
                .register(&db, "seqread", json!({"required": ["reads"]}))
                .await
        });
        app.wait_for_lock_waiters(1).await;
        holder.commit().await.unwrap();

        let second = racer.await.unwrap().unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.schema, json!({"required": ["reads"]}));
    }

    #[tokio::test]
    async fn concurrent_registrations_get_distinct_versions() {
        let app = TestApp::spawn_postgres().await;

        let results = join_all((0..5).map(|i| {
            app.schemas().register(
                &app.db,
                "seqread",
                json!({"type": "object", "properties": {"field": {"maxLength": i + 1}}}),
            )
        }))
        .await;

        let mut versions: Vec<i32> = results
            .into_iter()
            .map(|r| r.expect("registration failed").version)
            .collect();
        versions.sort();
        assert_eq!(versions, vec![1, 2, 3, 4, 5]);
    }
}
