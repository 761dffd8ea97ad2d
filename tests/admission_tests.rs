//! Admission rejections observed through the service facade: every
//! rejection is immediate and leaves no trace in the queue or pool.

mod test_harness;

use std::time::Duration;

use convertd::error::{ConvertError, RejectionReason};
use convertd::pipeline::job::JobOutcome;
use test_harness::*;

#[tokio::test]
async fn oversized_payload_rejected_without_side_effects() {
    let config = base_config(echo_converter()).with_max_payload_bytes(1024);
    let service = start(config);

    let err = service
        .submit(pdf_request(&vec![0u8; 2048]), "c1")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Rejected(RejectionReason::PayloadTooLarge { size: 2048, max: 1024 })
    ));

    let snap = service.metrics();
    assert_eq!(snap.rejected_payload_too_large, 1);
    assert_eq!(snap.queue_depth, 0);
    assert_eq!(snap.busy_workers, 0);
    assert_eq!(snap.completed, 0);
    service.shutdown(true).await;
}

#[tokio::test]
async fn unsupported_type_rejected() {
    let service = start(base_config(echo_converter()));

    let request = convertd::pipeline::job::ConvertRequest::new("payload.exe", b"MZ".to_vec());
    let err = service.submit(request, "c1").await.unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Rejected(RejectionReason::UnsupportedType { .. })
    ));
    assert_eq!(service.metrics().rejected_unsupported_type, 1);
    service.shutdown(true).await;
}

#[tokio::test]
async fn third_request_in_window_is_rate_limited() {
    let config = base_config(echo_converter()).with_rate_limit(2, Duration::from_secs(60));
    let service = start(config);

    let h1 = service.submit(pdf_request(b"%PDF"), "10.0.0.9").await.unwrap();
    let h2 = service.submit(pdf_request(b"%PDF"), "10.0.0.9").await.unwrap();
    let err = service
        .submit(pdf_request(b"%PDF"), "10.0.0.9")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Rejected(RejectionReason::RateLimited { .. })
    ));

    // A different client identity is unaffected
    let h3 = service.submit(pdf_request(b"%PDF"), "10.0.0.10").await.unwrap();

    for handle in [h1, h2, h3] {
        let outcome = service
            .await_result(handle, Duration::from_secs(10))
            .await
            .unwrap();
        assert!(matches!(outcome, JobOutcome::Completed(_)));
    }
    assert_eq!(service.metrics().rejected_rate_limited, 1);
    service.shutdown(true).await;
}
