use std::sync::Arc;

use common::AnalysisState;
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;

use registry::analysis::AnalysisView;
use registry::entity::{analysis, analysis_data, donor, file, sample_set};
use registry::error::RegistryError;
use registry::ids::{EntityKind, IdAllocator, UuidAllocator};

use crate::common::{MD5, OTHER_STUDY, STUDY, TestApp, file_entry, payload, sample};

mod creation {
    use super::*;

    #[tokio::test]
    async fn created_analysis_reads_back_as_submitted() {
        let app = TestApp::spawn().await;
        app.register_variant_call().await;

        let mut submitted = payload();
        submitted["samples"] = json!([sample("SA1", "SP1", "DO1"), sample("SA2", "SP2", "DO1")]);
        submitted["workflow"] = json!({"runId": "wf-1"});
        let id = app.create_analysis(submitted).await;

        let analysis = app.analyses().read_deep(&id).await.unwrap();
        assert_eq!(analysis.header.analysis_id, id);
        assert_eq!(analysis.header.study_id, STUDY);
        assert_eq!(analysis.header.analysis_state, AnalysisState::Unpublished);
        assert_eq!(analysis.header.analysis_type.to_string(), "variantCall:1");
        assert_eq!(
            serde_json::Value::Object(analysis.data.clone()),
            json!({
                "experiment": {"variantCallingTool": "mutect2"},
                "workflow": {"runId": "wf-1"}
            })
        );

        let sample_ids: Vec<&str> = analysis
            .samples
            .iter()
            .map(|s| s.sample.submitter_sample_id.as_str())
            .collect();
        assert_eq!(sample_ids, vec!["SA1", "SA2"]);
        assert_eq!(analysis.samples[0].donor.id, analysis.samples[1].donor.id);

        let names: Vec<&str> = analysis.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["calls.vcf.gz", "calls.vcf.gz.tbi"]);
        assert!(analysis.files.iter().all(|f| f.analysis_id == id && f.study_id == STUDY));
        assert_eq!(analysis.files[0].md5.as_deref(), Some(MD5));
        assert_ne!(analysis.files[0].id, analysis.files[1].id);

        assert!(analysis.state_history.is_empty());
        assert_eq!(analysis.first_published_at, None);
        assert_eq!(analysis.published_at, None);
    }

    #[tokio::test]
    async fn repeated_sample_is_linked_once() {
        let app = TestApp::spawn().await;
        app.register_variant_call().await;

        let mut submitted = payload();
        submitted["samples"] = json!([sample("SA1", "SP1", "DO1"), sample("SA1", "SP1", "DO1")]);
        let id = app.create_analysis(submitted).await;

        let analysis = app.analyses().read_deep(&id).await.unwrap();
        assert_eq!(analysis.samples.len(), 1);
    }

    #[tokio::test]
    async fn samples_keep_submitted_order() {
        let app = TestApp::spawn().await;
        app.register_variant_call().await;

        let mut submitted = payload();
        submitted["samples"] = json!([
            sample("SA3", "SP3", "DO3"),
            sample("SA1", "SP1", "DO1"),
            sample("SA2", "SP2", "DO2"),
        ]);
        let id = app.create_analysis(submitted).await;

        let analysis = app.analyses().read_deep(&id).await.unwrap();
        let order: Vec<&str> = analysis
            .samples
            .iter()
            .map(|c| c.sample.submitter_sample_id.as_str())
            .collect();
        assert_eq!(order, vec!["SA3", "SA1", "SA2"]);
    }

    #[tokio::test]
    async fn study_must_exist_and_match() {
        let app = TestApp::spawn().await;
        app.register_variant_call().await;

        let err = app.analyses().create("NOPE", payload()).await.unwrap_err();
        assert_eq!(err.code(), "STUDY_ID_DOES_NOT_EXIST");

        let err = app
            .analyses()
            .create(OTHER_STUDY, payload())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::StudyIdMismatch { .. }));

        // The studyId is optional in the payload.
        let mut without = payload();
        without.as_object_mut().unwrap().remove("studyId");
        app.analyses().create(OTHER_STUDY, without).await.unwrap();
    }

    #[tokio::test]
    async fn analysis_type_must_be_named_and_known() {
        let app = TestApp::spawn().await;
        app.register_variant_call().await;

        let mut untyped = payload();
        untyped.as_object_mut().unwrap().remove("analysisType");
        let err = app.analyses().create(STUDY, untyped).await.unwrap_err();
        assert_eq!(err.code(), "MALFORMED_PARAMETER");

        let mut unknown = payload();
        unknown["analysisType"] = json!({"name": "sequencingRead"});
        let err = app.analyses().create(STUDY, unknown).await.unwrap_err();
        assert_eq!(err.code(), "ANALYSIS_TYPE_NOT_FOUND");

        let mut bad_version = payload();
        bad_version["analysisType"] = json!({"name": "variantCall", "version": 4});
        let err = app.analyses().create(STUDY, bad_version).await.unwrap_err();
        assert_eq!(err.code(), "ANALYSIS_TYPE_VERSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn schema_violations_are_all_reported() {
        let app = TestApp::spawn().await;
        app.register_variant_call().await;

        let mut invalid = payload();
        invalid.as_object_mut().unwrap().remove("experiment");
        invalid["files"] = json!([]);
        invalid["samples"][0]["donor"]["gender"] = json!("Unknown");

        let err = app.analyses().create(STUDY, invalid).await.unwrap_err();
        let RegistryError::SchemaViolation(errors) = err else {
            panic!("expected a schema violation, got {err}");
        };
        assert!(errors.len() >= 3, "{errors}");
        assert!(errors.iter().any(|e| e.path == "/files"), "{errors}");
        assert!(
            errors.iter().any(|e| e.path == "/samples/0/donor/gender"),
            "{errors}"
        );
        assert!(
            errors.iter().any(|e| e.path.is_empty() && e.message.contains("experiment")),
            "{errors}"
        );
    }

    /// Hands every file the same id, so the second file insert fails.
    struct CollidingFileIds;

    impl IdAllocator for CollidingFileIds {
        fn new_id(&self, kind: EntityKind) -> String {
            match kind {
                EntityKind::File => "FILE-1".to_string(),
                _ => UuidAllocator.new_id(kind),
            }
        }
    }

    #[tokio::test]
    async fn failed_creation_leaves_nothing_behind() {
        let app = TestApp::spawn_with_ids(Arc::new(CollidingFileIds)).await;
        app.register_variant_call().await;

        let err = app.analyses().create(STUDY, payload()).await.unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");

        assert_eq!(analysis::Entity::find().count(&app.db).await.unwrap(), 0);
        assert_eq!(analysis_data::Entity::find().count(&app.db).await.unwrap(), 0);
        assert_eq!(donor::Entity::find().count(&app.db).await.unwrap(), 0);
        assert_eq!(sample_set::Entity::find().count(&app.db).await.unwrap(), 0);
        assert_eq!(file::Entity::find().count(&app.db).await.unwrap(), 0);
    }
}

mod updates {
    use super::*;

    #[tokio::test]
    async fn update_replaces_data_and_moves_to_named_version() {
        let app = TestApp::spawn().await;
        app.register_variant_call().await;
        let id = app.create_analysis(payload()).await;
        let v2 = app
            .register_type(
                "variantCall",
                json!({
                    "type": "object",
                    "required": ["experiment", "pipeline"],
                    "properties": {"pipeline": {"type": "string"}}
                }),
            )
            .await;
        assert_eq!(v2, 2);

        let before = app.analyses().read_deep(&id).await.unwrap();

        let err = app
            .analyses()
            .update_analysis(
                STUDY,
                &id,
                json!({"analysisType": {"name": "variantCall", "version": 2}, "experiment": {}}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SCHEMA_VIOLATION");

        let entry = app
            .analyses()
            .update_analysis(
                STUDY,
                &id,
                json!({
                    "analysisType": {"name": "variantCall", "version": 2},
                    "experiment": {"variantCallingTool": "strelka"},
                    "pipeline": "dna-seq"
                }),
            )
            .await
            .unwrap();
        assert_eq!(entry.version, 2);

        let after = app.analyses().read_deep(&id).await.unwrap();
        assert_eq!(after.header.analysis_type.version, 2);
        assert_eq!(
            serde_json::Value::Object(after.data),
            json!({"experiment": {"variantCallingTool": "strelka"}, "pipeline": "dna-seq"})
        );
        assert_eq!(after.files, before.files);
        assert_eq!(after.samples, before.samples);
        assert_eq!(after.header.analysis_state, AnalysisState::Unpublished);
        assert!(after.header.updated_at >= before.header.updated_at);
    }

    #[tokio::test]
    async fn update_is_scoped_to_study() {
        let app = TestApp::spawn().await;
        app.register_variant_call().await;
        let id = app.create_analysis(payload()).await;

        let update = json!({"analysisType": {"name": "variantCall"}, "experiment": {"variantCallingTool": "x"}});
        let err = app
            .analyses()
            .update_analysis(OTHER_STUDY, &id, update.clone())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ENTITY_NOT_RELATED_TO_STUDY");

        let err = app
            .analyses()
            .update_analysis(STUDY, "missing", update)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ANALYSIS_ID_NOT_FOUND");
    }

    #[tokio::test]
    async fn patch_merges_into_current_data() {
        let app = TestApp::spawn().await;
        app.register_variant_call().await;
        let mut submitted = payload();
        submitted["workflow"] = json!({"runId": "wf-1", "attempt": 1});
        let id = app.create_analysis(submitted).await;

        app.analyses()
            .patch_analysis(
                STUDY,
                &id,
                json!({"workflow": {"attempt": null, "host": "hpc"}, "notes": "rerun"}),
            )
            .await
            .unwrap();

        let analysis = app.analyses().read_deep(&id).await.unwrap();
        assert_eq!(
            serde_json::Value::Object(analysis.data),
            json!({
                "experiment": {"variantCallingTool": "mutect2"},
                "workflow": {"runId": "wf-1", "host": "hpc"},
                "notes": "rerun"
            })
        );

        // Removing a required clause is caught by validation.
        let err = app
            .analyses()
            .patch_analysis(STUDY, &id, json!({"experiment": null}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SCHEMA_VIOLATION");

        let err = app
            .analyses()
            .patch_analysis(STUDY, &id, json!({"analysisType": {"name": "variantCall"}}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MALFORMED_PARAMETER");
    }
}

mod reads {
    use super::*;

    #[tokio::test]
    async fn relation_check_distinguishes_unknown_and_foreign() {
        let app = TestApp::spawn().await;
        app.register_variant_call().await;
        let id = app.create_analysis(payload()).await;

        let row = app
            .analyses()
            .check_analysis_and_study_related(STUDY, &id)
            .await
            .unwrap();
        assert_eq!(row.id, id);

        let err = app
            .analyses()
            .check_analysis_and_study_related(OTHER_STUDY, &id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ENTITY_NOT_RELATED_TO_STUDY");

        let err = app
            .analyses()
            .check_analysis_and_study_related(STUDY, "missing")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ANALYSIS_ID_NOT_FOUND");

        let err = app.analyses().read_secured(OTHER_STUDY, &id).await.unwrap_err();
        assert_eq!(err.code(), "ENTITY_NOT_RELATED_TO_STUDY");
    }

    #[tokio::test]
    async fn shallow_and_deep_reads_agree() {
        let app = TestApp::spawn().await;
        app.register_variant_call().await;
        let id = app.create_analysis(payload()).await;

        let shallow = app.analyses().read(&id, false).await.unwrap();
        assert!(matches!(shallow, AnalysisView::Shallow(_)));
        let deep = app.analyses().read(&id, true).await.unwrap();
        assert!(matches!(deep, AnalysisView::Deep(_)));
        assert_eq!(shallow.header(), deep.header());

        assert_eq!(
            app.analyses().read_state(&id).await.unwrap(),
            AnalysisState::Unpublished
        );
        let err = app.analyses().read("missing", true).await.unwrap_err();
        assert_eq!(err.code(), "ANALYSIS_ID_NOT_FOUND");
    }

    #[tokio::test]
    async fn list_by_study_filters_on_state() {
        let app = TestApp::spawn().await;
        app.register_variant_call().await;
        let published = app.create_analysis(payload()).await;
        let draft = app.create_analysis(payload()).await;
        let hidden = app.create_analysis(payload()).await;
        app.upload_all(&published).await;
        app.analyses().publish(STUDY, &published, false).await.unwrap();
        app.analyses().suppress(STUDY, &hidden).await.unwrap();

        let ids = |items: Vec<registry::analysis::Analysis>| -> Vec<String> {
            items.into_iter().map(|a| a.header.analysis_id).collect()
        };

        let (items, _) = app.analyses().list_by_study(STUDY, None, 1, 10).await.unwrap();
        assert_eq!(ids(items), vec![published.clone()]);

        let (items, page) = app
            .analyses()
            .list_by_study(STUDY, Some("UNPUBLISHED,SUPPRESSED"), 1, 10)
            .await
            .unwrap();
        let mut got = ids(items);
        got.sort();
        let mut want = vec![draft.clone(), hidden.clone()];
        want.sort();
        assert_eq!(got, want);
        assert_eq!(page.total, 2);

        let (items, page) = app
            .analyses()
            .list_by_study(STUDY, Some("PUBLISHED,UNPUBLISHED,SUPPRESSED"), 2, 2)
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);

        let err = app
            .analyses()
            .list_by_study(STUDY, Some("PUBLISHED,DRAFT"), 1, 10)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MALFORMED_PARAMETER");

        let err = app
            .analyses()
            .list_by_study("NOPE", None, 1, 10)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STUDY_ID_DOES_NOT_EXIST");
    }

    #[tokio::test]
    async fn file_entries_keep_their_attributes() {
        let app = TestApp::spawn().await;
        app.register_variant_call().await;
        let mut submitted = payload();
        let mut f = file_entry("reads.bam", 5_000_000_000);
        f["info"] = json!({"lane": 3});
        f.as_object_mut().unwrap().remove("fileMd5sum");
        submitted["files"] = json!([f]);
        let id = app.create_analysis(submitted).await;

        let analysis = app.analyses().read_deep(&id).await.unwrap();
        let file = &analysis.files[0];
        assert_eq!(file.size, 5_000_000_000);
        assert_eq!(file.md5, None);
        assert_eq!(file.access, "controlled");
        assert_eq!(file.file_type, "VCF");
        assert_eq!(file.data_type.as_deref(), Some("Raw SNV Calls"));
        assert_eq!(file.info, Some(json!({"lane": 3})));
    }
}
