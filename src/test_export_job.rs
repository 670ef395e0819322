#[cfg(test)]
mod tests {
    use crate::api_client::{ExportOutcome, ServiceError};
    use crate::export::{
        ExportField, ExportFormat, ExportJob, ExportRequest, ExportResult, ExportScope,
        ExportStatus, ExportValidationError,
    };
    use crate::filter_state::FilterState;
    use std::time::{Duration, Instant};

    fn filter_scope() -> ExportScope {
        ExportScope::Filter(FilterState::default())
    }

    fn job() -> ExportJob {
        ExportJob::new(Duration::ZERO)
    }

    fn tick_to_full(job: &mut ExportJob) {
        let mut previous = job.progress();
        for _ in 0..20 {
            job.tick();
            assert!(job.progress() >= previous, "progress went backwards");
            previous = job.progress();
            if job.progress() == 100 {
                break;
            }
        }
        assert_eq!(job.progress(), 100);
    }

    #[test]
    fn test_empty_field_list_is_rejected() {
        let mut job = job();
        let mut request = ExportRequest::quick(ExportFormat::Pdf, filter_scope());
        request.fields.clear();

        let err = job.begin(request).unwrap_err();
        assert_eq!(err, ExportValidationError::NoFields);
        assert_eq!(job.status(), ExportStatus::Idle);
    }

    #[test]
    fn test_empty_selection_scope_is_rejected() {
        let mut job = job();
        let request = ExportRequest::quick(ExportFormat::Csv, ExportScope::Selection(vec![]));

        let err = job.begin(request).unwrap_err();
        assert_eq!(err, ExportValidationError::EmptySelection);
        assert_eq!(job.status(), ExportStatus::Idle);
    }

    #[test]
    fn test_invalid_delivery_address_is_rejected() {
        let mut job = job();
        let mut request = ExportRequest::quick(ExportFormat::Pdf, filter_scope());
        request.delivery_email = Some("not an address".to_string());

        let err = job.begin(request).unwrap_err();
        assert!(matches!(err, ExportValidationError::InvalidEmail(_)));
        assert_eq!(job.status(), ExportStatus::Idle);
    }

    #[test]
    fn test_second_request_while_running_is_rejected() {
        let mut job = job();
        job.begin(ExportRequest::quick(ExportFormat::Pdf, filter_scope()))
            .unwrap();

        let err = job
            .begin(ExportRequest::quick(ExportFormat::Csv, filter_scope()))
            .unwrap_err();
        assert_eq!(err, ExportValidationError::AlreadyRunning);
    }

    #[test]
    fn test_mandatory_fields_cannot_be_deselected() {
        let request = ExportRequest {
            format: ExportFormat::Xlsx,
            fields: vec![ExportField::Amount],
            scope: filter_scope(),
            delivery_email: None,
            include_filters: false,
            include_stats: false,
        };

        let resolved = request.resolved_fields();
        for field in ExportField::mandatory() {
            assert!(resolved.contains(field), "missing mandatory {:?}", field);
        }
        assert!(resolved.contains(&ExportField::Amount));
        // Canonical order, no duplicates
        assert_eq!(
            resolved,
            vec![
                ExportField::Title,
                ExportField::Entity,
                ExportField::Amount,
                ExportField::Deadline,
            ]
        );
    }

    #[test]
    fn test_progress_alone_does_not_complete() {
        let mut job = job();
        job.begin(ExportRequest::quick(ExportFormat::Csv, filter_scope()))
            .unwrap();
        assert_eq!(job.status(), ExportStatus::Preparing);

        job.dispatched();
        assert_eq!(job.status(), ExportStatus::Generating);
        assert_eq!(job.progress(), 0);

        // Simulated progress runs dry before the remote call resolves
        tick_to_full(&mut job);
        assert_eq!(
            job.status(),
            ExportStatus::Generating,
            "job completed before the remote call resolved"
        );

        job.resolve_remote(Ok(ExportOutcome::Payload(b"%PDF".to_vec())));
        assert_eq!(job.status(), ExportStatus::Complete);
    }

    #[test]
    fn test_remote_alone_does_not_complete() {
        let mut job = job();
        job.begin(ExportRequest::quick(ExportFormat::Csv, filter_scope()))
            .unwrap();
        job.dispatched();

        // Remote resolves first; the progress sequence still gates
        job.resolve_remote(Ok(ExportOutcome::Payload(b"id;title\n".to_vec())));
        assert_eq!(job.status(), ExportStatus::Generating);

        tick_to_full(&mut job);
        assert_eq!(job.status(), ExportStatus::Complete);
    }

    #[test]
    fn test_download_artifact_shape() {
        let mut job = job();
        job.begin(ExportRequest::quick(ExportFormat::Csv, filter_scope()))
            .unwrap();
        job.dispatched();
        tick_to_full(&mut job);
        job.resolve_remote(Ok(ExportOutcome::Payload(b"id;title\n1;Bando\n".to_vec())));

        let Some(ExportResult::Download(artifact)) = job.result() else {
            panic!("expected a download result");
        };
        assert!(artifact.filename.starts_with("bandi-iss-"));
        assert!(artifact.filename.ends_with(".csv"));
        assert_eq!(artifact.content_type, "text/csv");
        assert_eq!(artifact.bytes, b"id;title\n1;Bando\n".to_vec());
    }

    #[test]
    fn test_email_delivery_produces_no_artifact() {
        let mut job = job();
        let mut request = ExportRequest::quick(ExportFormat::Pdf, filter_scope());
        request.delivery_email = Some("ufficio@comune.example.it".to_string());
        job.begin(request).unwrap();
        job.dispatched();
        tick_to_full(&mut job);
        job.resolve_remote(Ok(ExportOutcome::DeliveryAccepted));

        assert_eq!(job.status(), ExportStatus::Complete);
        assert_eq!(job.result(), Some(&ExportResult::EmailDelivery));
    }

    #[test]
    fn test_remote_failure_fails_the_job() {
        let mut job = job();
        job.begin(ExportRequest::quick(ExportFormat::Xlsx, filter_scope()))
            .unwrap();
        job.dispatched();
        job.tick();

        job.resolve_remote(Err(ServiceError::Status {
            status: 500,
            message: "generation error".to_string(),
        }));
        assert_eq!(job.status(), ExportStatus::Failed);
        assert!(job.error().unwrap().contains("generation error"));
        assert!(job.result().is_none());

        // No automatic retry: further ticks change nothing
        job.tick();
        assert_eq!(job.status(), ExportStatus::Failed);
    }

    #[test]
    fn test_failure_reachable_from_preparing() {
        let mut job = job();
        job.begin(ExportRequest::quick(ExportFormat::Pdf, filter_scope()))
            .unwrap();

        job.resolve_remote(Err(ServiceError::Transport("socket closed".to_string())));
        assert_eq!(job.status(), ExportStatus::Failed);
    }

    #[test]
    fn test_cooldown_returns_job_to_idle() {
        let mut job = ExportJob::new(Duration::ZERO);
        job.begin(ExportRequest::quick(ExportFormat::Csv, filter_scope()))
            .unwrap();
        job.dispatched();
        tick_to_full(&mut job);
        job.resolve_remote(Ok(ExportOutcome::Payload(vec![1, 2, 3])));
        assert_eq!(job.status(), ExportStatus::Complete);

        assert!(job.maybe_reset(Instant::now()));
        assert_eq!(job.status(), ExportStatus::Idle);
        assert_eq!(job.progress(), 0);
        assert!(job.result().is_none());
        assert!(job.request().is_none());
    }

    #[test]
    fn test_cooldown_holds_until_elapsed() {
        let mut job = ExportJob::new(Duration::from_secs(3600));
        job.begin(ExportRequest::quick(ExportFormat::Csv, filter_scope()))
            .unwrap();
        job.dispatched();
        job.resolve_remote(Err(ServiceError::Transport("down".to_string())));
        assert_eq!(job.status(), ExportStatus::Failed);

        assert!(!job.maybe_reset(Instant::now()));
        assert_eq!(job.status(), ExportStatus::Failed);
    }

    #[test]
    fn test_reset_does_nothing_while_active() {
        let mut job = ExportJob::new(Duration::ZERO);
        job.begin(ExportRequest::quick(ExportFormat::Csv, filter_scope()))
            .unwrap();
        job.dispatched();
        assert!(!job.maybe_reset(Instant::now()));
        assert_eq!(job.status(), ExportStatus::Generating);
    }
}
