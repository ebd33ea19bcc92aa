use futures::future::join_all;
use serde_json::json;

use registry::error::RegistryError;
use registry::schema::ListQuery;

use crate::common::{STUDY, TestApp, payload, variant_call_schema};

mod registration {
    use super::*;

    #[tokio::test]
    async fn versions_start_at_one_and_increase_by_one() {
        let app = TestApp::spawn().await;

        let mut versions = Vec::new();
        for i in 0..3 {
            let schema = json!({"type": "object", "properties": {"field": {"maxLength": i + 1}}});
            versions.push(app.register_type("seqread", schema).await);
        }
        assert_eq!(versions, vec![1, 2, 3]);
        let latest = app.schemas().resolve(&app.db, "seqread", None).await.unwrap();
        assert_eq!(latest.version, 3);

        // Names are versioned independently.
        assert_eq!(app.register_type("variantCall", json!({})).await, 1);
    }

    #[tokio::test]
    async fn concurrent_registrations_get_distinct_versions() {
        let app = TestApp::spawn().await;

        let results = join_all((0..5).map(|_| {
            app.schemas()
                .register(&app.db, "seqread", json!({"type": "object"}))
        }))
        .await;

        let mut versions: Vec<i32> = results
            .into_iter()
            .map(|r| r.expect("registration failed").version)
            .collect();
        versions.sort();
        assert_eq!(versions, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn rejects_reserved_and_invalid_names() {
        let app = TestApp::spawn().await;

        for name in ["registration", "has space", "semi;colon", ""] {
            let err = app
                .schemas()
                .register(&app.db, name, json!({}))
                .await
                .unwrap_err();
            assert_eq!(err.code(), "MALFORMED_PARAMETER", "{name}");
        }
    }

    #[tokio::test]
    async fn rejects_malformed_schemas() {
        let app = TestApp::spawn().await;

        for schema in [
            json!("not an object"),
            json!({"type": "array"}),
            json!({"properties": {"analysisState": {"type": "string"}}}),
            json!({"required": ["a", "a"]}),
            json!({"type": "object", "properties": {"x": {"type": "no-such-type"}}}),
        ] {
            let err = app
                .schemas()
                .register(&app.db, "seqread", schema.clone())
                .await
                .unwrap_err();
            assert!(matches!(err, RegistryError::MalformedSchema(_)), "{schema}: {err}");
        }
        assert_eq!(
            app.schemas().latest_version(&app.db, "seqread").await.unwrap(),
            None
        );
    }
}

mod lookup {
    use super::*;

    #[tokio::test]
    async fn unknown_type_and_version_are_distinguished() {
        let app = TestApp::spawn().await;
        app.register_variant_call().await;
        app.register_variant_call().await;

        let err = app
            .schemas()
            .get_analysis_type(&app.db, "nope", None, false)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ANALYSIS_TYPE_NOT_FOUND");

        let err = app
            .schemas()
            .get_analysis_type(&app.db, "variantCall", Some(7), false)
            .await
            .unwrap_err();
        match err {
            RegistryError::UnknownAnalysisTypeVersion { version, latest, .. } => {
                assert_eq!(version, 7);
                assert_eq!(latest, 2);
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = app
            .schemas()
            .get_analysis_type(&app.db, "variantCall", Some(0), false)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MALFORMED_PARAMETER");
    }

    #[tokio::test]
    async fn rendered_schema_includes_envelope() {
        let app = TestApp::spawn().await;
        app.register_variant_call().await;

        let latest = app
            .schemas()
            .get_analysis_type(&app.db, "variantCall", None, false)
            .await
            .unwrap();
        assert_eq!(latest.version, 1);
        let rendered = latest.schema.unwrap();
        let required = rendered["required"].as_array().unwrap();
        for field in ["analysisType", "samples", "files", "experiment"] {
            assert!(required.contains(&json!(field)), "{field} missing from {required:?}");
        }

        let raw = app
            .schemas()
            .get_analysis_type(&app.db, "variantCall", Some(1), true)
            .await
            .unwrap();
        assert_eq!(raw.schema.unwrap(), variant_call_schema());
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let app = TestApp::spawn().await;
        for _ in 0..3 {
            app.register_type("seqread", json!({})).await;
        }
        app.register_variant_call().await;

        let (items, page) = app
            .schemas()
            .list(
                &app.db,
                &ListQuery {
                    per_page: 2,
                    hide_schema: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 2);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|t| t.schema.is_none()));

        let (items, _) = app
            .schemas()
            .list(
                &app.db,
                &ListQuery {
                    names: vec!["seqread".into()],
                    versions: vec![2, 3],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let versions: Vec<i32> = items.iter().map(|t| t.version).collect();
        assert_eq!(versions, vec![2, 3]);

        let err = app
            .schemas()
            .list(
                &app.db,
                &ListQuery {
                    versions: vec![1, -2],
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MALFORMED_PARAMETER");
    }
}

mod version_policy {
    use super::*;

    #[tokio::test]
    async fn latest_only_rejects_older_versions() {
        let app = TestApp::spawn_with(|c| c.validation.latest_only = true).await;
        app.register_variant_call().await;
        app.register_variant_call().await;

        let mut old = payload();
        old["analysisType"] = json!({"name": "variantCall", "version": 1});
        let err = app.analyses().create(STUDY, old).await.unwrap_err();
        assert_eq!(err.code(), "ANALYSIS_TYPE_INCORRECT_VERSION");

        // Without a version the latest is used.
        app.analyses().create(STUDY, payload()).await.unwrap();
    }

    #[tokio::test]
    async fn explicitly_rejected_versions_are_refused() {
        let app = TestApp::spawn_with(|c| {
            c.validation.rejected_versions = vec!["variantCall:1".into()];
        })
        .await;
        app.register_variant_call().await;

        let err = app.analyses().create(STUDY, payload()).await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::AnalysisTypeIncorrectVersion { .. }
        ));

        app.register_variant_call().await;
        app.analyses().create(STUDY, payload()).await.unwrap();
    }
}
