//! Integration tests for the SQLite storage layer
//!
//! Tests database operations using an in-memory SQLite database.

use pretty_assertions::assert_eq;

use aegis_engine::error::StorageError;
use aegis_engine::storage::{
    AgentStep, AnalysisRecord, AnalysisStatus, Decision, Feedback, FinalizeOutcome, SqliteStorage,
    StageSummary, Storage, Verdict,
};

/// Create an in-memory storage instance for testing
async fn create_test_storage() -> SqliteStorage {
    SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage")
}

fn valid_record() -> AnalysisRecord {
    AnalysisRecord::new("Should we launch a subscription box for artisan coffee?", None)
        .expect("valid record")
}

fn decision(verdict: Verdict, confidence: f64) -> Decision {
    Decision {
        verdict,
        summary: "summary".to_string(),
        detailed_explanation: String::new(),
        key_factors: vec![],
        risks: vec![],
        recommendations: vec![],
        next_steps: vec![],
        confidence,
    }
}

fn completed_outcome(verdict: Verdict, confidence: f64) -> FinalizeOutcome {
    FinalizeOutcome {
        status: AnalysisStatus::Completed,
        decision: Some(decision(verdict, confidence)),
        error: None,
        total_duration_ms: 4000,
        tokens_used: 1200,
    }
}

mod analysis_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_file_backed_storage_creates_parent_directories() {
        use aegis_engine::config::DatabaseConfig;

        let dir = tempfile::tempdir().expect("tempdir");
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("aegis.db"),
            max_connections: 2,
        };

        let storage = SqliteStorage::new(&config).await.expect("file-backed storage");
        let record = valid_record();
        storage.create_analysis(&record).await.unwrap();

        assert!(config.path.exists());
        let fetched = storage.get_analysis(&record.id).await.unwrap();
        assert_eq!(fetched.id, record.id);
    }

    #[tokio::test]
    async fn test_create_then_get_is_pending_without_result() {
        let storage = create_test_storage().await;

        let record = valid_record();
        storage.create_analysis(&record).await.unwrap();

        let fetched = storage.get_analysis(&record.id).await.unwrap();
        assert_eq!(fetched.status, AnalysisStatus::Pending);
        assert!(fetched.result.is_none());
        assert!(fetched.completed_at.is_none());
        assert_eq!(fetched.problem_statement, record.problem_statement);
    }

    #[tokio::test]
    async fn test_get_unknown_analysis_fails() {
        let storage = create_test_storage().await;

        let err = storage.get_analysis("nonexistent-id").await.unwrap_err();
        assert!(matches!(err, StorageError::AnalysisNotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_status_advances_non_terminal_record() {
        let storage = create_test_storage().await;
        let record = valid_record();
        storage.create_analysis(&record).await.unwrap();

        let updated = storage
            .update_status(&record.id, AnalysisStatus::Researching)
            .await
            .unwrap();
        assert_eq!(updated.status, AnalysisStatus::Researching);
    }

    #[tokio::test]
    async fn test_terminal_status_is_sticky() {
        let storage = create_test_storage().await;
        let record = valid_record();
        storage.create_analysis(&record).await.unwrap();

        storage
            .finalize(&record.id, &completed_outcome(Verdict::Go, 0.8))
            .await
            .unwrap();

        // A later transition attempt is a no-op returning the current state
        let after = storage
            .update_status(&record.id, AnalysisStatus::Researching)
            .await
            .unwrap();
        assert_eq!(after.status, AnalysisStatus::Completed);
    }

    #[tokio::test]
    async fn test_stage_summaries_are_written_per_column() {
        let storage = create_test_storage().await;
        let record = valid_record();
        storage.create_analysis(&record).await.unwrap();

        storage
            .set_stage_summary(&record.id, StageSummary::Research, "Market: $2B")
            .await
            .unwrap();
        storage
            .set_stage_summary(&record.id, StageSummary::Risk, "Overall Risk: 40%")
            .await
            .unwrap();

        let fetched = storage.get_analysis(&record.id).await.unwrap();
        assert_eq!(fetched.research_summary.as_deref(), Some("Market: $2B"));
        assert_eq!(fetched.risk_summary.as_deref(), Some("Overall Risk: 40%"));
        assert!(fetched.analysis_summary.is_none());
    }

    #[tokio::test]
    async fn test_delete_analysis_is_idempotent() {
        let storage = create_test_storage().await;
        let record = valid_record();
        storage.create_analysis(&record).await.unwrap();

        assert!(storage.delete_analysis(&record.id).await.unwrap());
        assert!(!storage.delete_analysis(&record.id).await.unwrap());

        let err = storage.get_analysis(&record.id).await.unwrap_err();
        assert!(matches!(err, StorageError::AnalysisNotFound { .. }));
    }
}

mod finalize_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_finalize_sets_terminal_fields_together() {
        let storage = create_test_storage().await;
        let record = valid_record();
        storage.create_analysis(&record).await.unwrap();

        let won = storage
            .finalize(&record.id, &completed_outcome(Verdict::Go, 0.82))
            .await
            .unwrap();
        assert!(won);

        let fetched = storage.get_analysis(&record.id).await.unwrap();
        assert_eq!(fetched.status, AnalysisStatus::Completed);
        assert!(fetched.completed_at.is_some());
        assert_eq!(fetched.total_duration_ms, Some(4000));
        assert_eq!(fetched.tokens_used, Some(1200));

        let result = fetched.result.expect("completed record carries a result");
        assert_eq!(result.decision.unwrap().verdict, Verdict::Go);
    }

    #[tokio::test]
    async fn test_second_finalize_is_observable_noop() {
        let storage = create_test_storage().await;
        let record = valid_record();
        storage.create_analysis(&record).await.unwrap();

        assert!(storage
            .finalize(&record.id, &completed_outcome(Verdict::Go, 0.9))
            .await
            .unwrap());

        // The loser carries a different result; nothing about it lands
        let second = FinalizeOutcome {
            status: AnalysisStatus::Failed,
            decision: Some(decision(Verdict::NoGo, 0.1)),
            error: Some("should not be written".to_string()),
            total_duration_ms: 1,
            tokens_used: 1,
        };
        assert!(!storage.finalize(&record.id, &second).await.unwrap());

        let fetched = storage.get_analysis(&record.id).await.unwrap();
        assert_eq!(fetched.status, AnalysisStatus::Completed);
        assert!(fetched.error.is_none());
        assert_eq!(fetched.total_duration_ms, Some(4000));
        assert_eq!(
            fetched.result.unwrap().decision.unwrap().verdict,
            Verdict::Go
        );
    }

    #[tokio::test]
    async fn test_concurrent_finalize_has_exactly_one_winner() {
        let storage = create_test_storage().await;
        let record = valid_record();
        storage.create_analysis(&record).await.unwrap();

        let a = {
            let storage = storage.clone();
            let id = record.id.clone();
            tokio::spawn(async move {
                storage
                    .finalize(&id, &completed_outcome(Verdict::Go, 0.8))
                    .await
                    .unwrap()
            })
        };
        let b = {
            let storage = storage.clone();
            let id = record.id.clone();
            tokio::spawn(async move {
                let outcome = FinalizeOutcome {
                    status: AnalysisStatus::Failed,
                    decision: None,
                    error: Some("raced".to_string()),
                    total_duration_ms: 0,
                    tokens_used: 0,
                };
                storage.finalize(&id, &outcome).await.unwrap()
            })
        };

        let (won_a, won_b) = (a.await.unwrap(), b.await.unwrap());
        assert!(won_a ^ won_b, "exactly one finalize must win");

        let fetched = storage.get_analysis(&record.id).await.unwrap();
        assert!(fetched.status.is_terminal());
    }

    #[tokio::test]
    async fn test_finalize_unknown_id_fails() {
        let storage = create_test_storage().await;
        let err = storage
            .finalize("ghost", &completed_outcome(Verdict::Go, 0.5))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AnalysisNotFound { .. }));
    }

    #[tokio::test]
    async fn test_finalize_rejects_non_terminal_status() {
        let storage = create_test_storage().await;
        let record = valid_record();
        storage.create_analysis(&record).await.unwrap();

        let outcome = FinalizeOutcome {
            status: AnalysisStatus::Deciding,
            decision: None,
            error: None,
            total_duration_ms: 0,
            tokens_used: 0,
        };
        let err = storage.finalize(&record.id, &outcome).await.unwrap_err();
        assert!(matches!(err, StorageError::Query { .. }));
    }
}

mod step_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn step(analysis_id: &str, agent: &str) -> AgentStep {
        AgentStep::new(analysis_id, agent, "Executing", "done", "because")
            .with_confidence(0.8)
            .with_duration(1000)
            .with_tokens(300)
    }

    #[tokio::test]
    async fn test_step_numbers_are_assigned_in_append_order() {
        let storage = create_test_storage().await;
        let record = valid_record();
        storage.create_analysis(&record).await.unwrap();

        for agent in ["Research Agent", "Analysis Agent", "Risk Agent", "Decision Agent"] {
            storage.append_step(step(&record.id, agent)).await.unwrap();
        }

        let steps = storage.get_steps(&record.id).await.unwrap();
        assert_eq!(steps.len(), 4);
        let numbers: Vec<i64> = steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(steps[0].agent, "Research Agent");
        assert_eq!(steps[3].agent, "Decision Agent");
    }

    #[tokio::test]
    async fn test_step_numbering_is_per_analysis() {
        let storage = create_test_storage().await;
        let first = valid_record();
        let second =
            AnalysisRecord::new("Another problem statement of sufficient length", None).unwrap();
        storage.create_analysis(&first).await.unwrap();
        storage.create_analysis(&second).await.unwrap();

        storage.append_step(step(&first.id, "Research Agent")).await.unwrap();
        let other = storage
            .append_step(step(&second.id, "Research Agent"))
            .await
            .unwrap();

        assert_eq!(other.step_number, 1);
    }

    #[tokio::test]
    async fn test_steps_round_trip_tools_and_metrics() {
        let storage = create_test_storage().await;
        let record = valid_record();
        storage.create_analysis(&record).await.unwrap();

        let step = AgentStep::new(&record.id, "Research Agent", "act", "sum", "why")
            .with_tools(vec!["web_search".to_string(), "db_query".to_string()])
            .with_confidence(0.91)
            .with_duration(2345)
            .with_tokens(789);
        storage.append_step(step).await.unwrap();

        let steps = storage.get_steps(&record.id).await.unwrap();
        assert_eq!(steps[0].tools_used, vec!["web_search", "db_query"]);
        assert!((steps[0].confidence - 0.91).abs() < f64::EPSILON);
        assert_eq!(steps[0].duration_ms, 2345);
        assert_eq!(steps[0].tokens_used, 789);
    }

    #[tokio::test]
    async fn test_deleting_analysis_removes_its_steps() {
        let storage = create_test_storage().await;
        let record = valid_record();
        storage.create_analysis(&record).await.unwrap();
        storage.append_step(step(&record.id, "Research Agent")).await.unwrap();

        storage.delete_analysis(&record.id).await.unwrap();

        let steps = storage.get_steps(&record.id).await.unwrap();
        assert!(steps.is_empty());
    }
}

mod list_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn seed(storage: &SqliteStorage, count: usize) -> Vec<String> {
        let mut ids = Vec::new();
        for i in 0..count {
            let mut record = AnalysisRecord::new(
                format!("Problem statement number {} with enough length", i),
                None,
            )
            .unwrap();
            // Spread creation times so the DESC ordering is deterministic
            record.created_at = chrono::Utc::now() - chrono::Duration::seconds((count - i) as i64);
            storage.create_analysis(&record).await.unwrap();
            ids.push(record.id);
        }
        ids
    }

    #[tokio::test]
    async fn test_pages_are_disjoint_and_cover_all_records() {
        let storage = create_test_storage().await;
        seed(&storage, 6).await;

        let (page1, total) = storage.list_analyses(3, 0, None).await.unwrap();
        let (page2, _) = storage.list_analyses(3, 3, None).await.unwrap();

        assert_eq!(total, 6);
        assert_eq!(page1.len(), 3);
        assert_eq!(page2.len(), 3);

        let mut seen: Vec<&str> = page1.iter().chain(page2.iter()).map(|i| i.id.as_str()).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 6, "pages must not share ids");

        // Newest first within and across pages
        let all: Vec<_> = page1.iter().chain(page2.iter()).collect();
        for pair in all.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }
    }

    #[tokio::test]
    async fn test_status_filter_restricts_listing() {
        let storage = create_test_storage().await;
        let ids = seed(&storage, 3).await;
        storage
            .finalize(&ids[0], &completed_outcome(Verdict::Go, 0.8))
            .await
            .unwrap();

        let (completed, total) = storage
            .list_analyses(10, 0, Some(AnalysisStatus::Completed))
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, ids[0]);
        assert_eq!(completed[0].verdict, Some(Verdict::Go));

        let (pending, total) = storage
            .list_analyses(10, 0, Some(AnalysisStatus::Pending))
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(pending.len(), 2);
    }
}

mod stats_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_stats_with_no_records() {
        let storage = create_test_storage().await;

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.total_analyses, 0);
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.failed, 0);
        assert!(stats.average_confidence.is_none());
        assert!(stats.verdict_distribution.is_empty());
    }

    #[tokio::test]
    async fn test_stats_verdict_distribution_and_average() {
        let storage = create_test_storage().await;

        for (verdict, confidence) in [
            (Verdict::Go, 0.8),
            (Verdict::Go, 0.6),
            (Verdict::NoGo, 0.7),
        ] {
            let record = valid_record();
            storage.create_analysis(&record).await.unwrap();
            storage
                .finalize(&record.id, &completed_outcome(verdict, confidence))
                .await
                .unwrap();
        }

        // One still running, one failed - both excluded from verdict stats
        let running = valid_record();
        storage.create_analysis(&running).await.unwrap();
        let failed = valid_record();
        storage.create_analysis(&failed).await.unwrap();
        storage
            .finalize(
                &failed.id,
                &FinalizeOutcome {
                    status: AnalysisStatus::Failed,
                    decision: None,
                    error: Some("agent failure".to_string()),
                    total_duration_ms: 10,
                    tokens_used: 0,
                },
            )
            .await
            .unwrap();

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.total_analyses, 5);
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.verdict_distribution.get("GO"), Some(&2));
        assert_eq!(stats.verdict_distribution.get("NO-GO"), Some(&1));
        assert!(stats.verdict_distribution.get("CONDITIONAL").is_none());

        let avg = stats.average_confidence.unwrap();
        assert!((avg - 0.7).abs() < 1e-9);
    }
}

mod feedback_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_feedback_round_trip() {
        let storage = create_test_storage().await;
        let record = valid_record();
        storage.create_analysis(&record).await.unwrap();

        let feedback = Feedback::new(&record.id, 4, 5, 3)
            .with_comment("useful but slow")
            .with_decision_correct(true);
        storage.create_feedback(&feedback).await.unwrap();

        let all = storage.get_feedback_for_analysis(&record.id).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].rating, 4);
        assert_eq!(all[0].comment.as_deref(), Some("useful but slow"));
        assert_eq!(all[0].was_decision_correct, Some(true));
    }

    #[tokio::test]
    async fn test_feedback_for_unknown_analysis_is_empty() {
        let storage = create_test_storage().await;
        let all = storage.get_feedback_for_analysis("ghost").await.unwrap();
        assert!(all.is_empty());
    }
}
