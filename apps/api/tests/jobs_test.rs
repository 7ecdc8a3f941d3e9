//! Job submission, status and admin queue route tests

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::{json, Value};
use talentflow_api::config::CreditPricing;
use talentflow_job_queue::{
    now_ms, payload_reservation, CvAnalysisPayload, CvDocument, JobId, JobKind, JobOptions,
    JobState, JobStore,
};
use uuid::Uuid;

fn cv_request() -> Value {
    json!({
        "candidate_name": "Ada Lovelace",
        "cv_text": sample_cv(),
        "job_description": "Backend engineer, payments team"
    })
}

async fn submit_cv(app: &TestApp, token: &str) -> Value {
    let (status, body) = send(
        &app.router,
        post_json("/api/cv-analysis", Some(token), &cv_request()),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED, "unexpected body: {}", body);
    body
}

/// Claim the next CV job and fail it for good, as the worker would
async fn fail_next_cv_job(app: &TestApp) -> JobId {
    let store = app.queues.cv_analysis.store();
    let now = now_ms();
    let job = store
        .claim_next(now, 60_000, "test-worker")
        .await
        .unwrap()
        .expect("a waiting job");
    store
        .fail(job.id, "test-worker", "model unavailable", None, now)
        .await
        .unwrap();
    job.id
}

#[tokio::test]
async fn test_submission_requires_token() {
    let app = TestApp::builder().build();

    let (status, body) = send(&app.router, post_json("/api/cv-analysis", None, &cv_request())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, body) = send(
        &app.router,
        post_json("/api/cv-analysis", Some("not-a-jwt"), &cv_request()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_cv_submission_is_queued() {
    let app = TestApp::builder().build();
    let (user_id, token) = app.user_token();

    let accepted = submit_cv(&app, &token).await;
    assert_eq!(accepted["queue"], "cv-analysis");
    assert_eq!(accepted["credits_charged"], 0);

    let job_id: JobId = accepted["job_id"].as_str().unwrap().parse().unwrap();
    assert_eq!(
        accepted["status_url"],
        format!("/api/jobs/cv-analysis/{}", job_id)
    );

    let record = app
        .queues
        .get_job(JobKind::CvAnalysis, job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state, JobState::Waiting);
    assert_eq!(record.name, "analyze-cv");
    assert_eq!(record.payload["user_id"], user_id.to_string());
    assert_eq!(record.payload["candidate_name"], "Ada Lovelace");
    assert_eq!(record.payload["document"]["type"], "text");
}

#[tokio::test]
async fn test_cv_submission_validation() {
    let app = TestApp::builder().build();
    let (_, token) = app.user_token();

    let cases = [
        json!({"candidate_name": "Ada", "cv_text": "too short"}),
        json!({"candidate_name": "  ", "cv_text": sample_cv()}),
        json!({"candidate_name": "Ada"}),
        json!({"candidate_name": "Ada", "cv_text": sample_cv(), "cv_url": "https://cv.example.com/ada.txt"}),
        json!({"candidate_name": "Ada", "cv_url": "ftp://cv.example.com/ada.txt"}),
    ];

    for case in cases {
        let (status, body) = send(&app.router, post_json("/api/cv-analysis", Some(&token), &case)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "accepted {}", case);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    let stats = app.queues.stats(JobKind::CvAnalysis).await.unwrap();
    assert_eq!(stats.counts.total(), 0);
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let app = TestApp::builder().build();
    let (_, token) = app.user_token();

    let request = post_raw(
        "/api/cv-analysis",
        &[("authorization", format!("Bearer {}", token).as_str())],
        "{\"candidate_name\": ".to_string(),
    );
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_BODY");
}

#[tokio::test]
async fn test_interview_scoring_submission() {
    let app = TestApp::builder().build();
    let (_, token) = app.user_token();

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/interview-scoring",
            Some(&token),
            &json!({
                "role": "Data engineer",
                "answers": [
                    {"question": "How do you model slowly changing dimensions?", "answer": "Type 2 tables with validity ranges."},
                    {"question": "How do you test pipelines?", "answer": "Contract tests on every stage."}
                ]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["queue"], "interview-scoring");

    let job_id: JobId = body["job_id"].as_str().unwrap().parse().unwrap();
    let record = app
        .queues
        .get_job(JobKind::InterviewScoring, job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.payload["answers"].as_array().unwrap().len(), 2);
    assert!(record.payload["interview_id"].is_string());

    let (status, _) = send(
        &app.router,
        post_json(
            "/api/interview-scoring",
            Some(&token),
            &json!({"role": "Data engineer", "answers": []}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_is_private_to_owner() {
    let app = TestApp::builder().build();
    let (_, owner) = app.user_token();
    let (_, stranger) = app.user_token();
    let (_, admin) = app.admin_token();

    let accepted = submit_cv(&app, &owner).await;
    let url = accepted["status_url"].as_str().unwrap().to_string();

    let (status, body) = send(&app.router, get(&url, Some(&owner))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "waiting");
    assert_eq!(body["position"], 1);

    let (status, body) = send(&app.router, get(&url, Some(&stranger))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = send(&app.router, get(&url, Some(&admin))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_status_of_unknown_queue_and_job() {
    let app = TestApp::builder().build();
    let (_, token) = app.user_token();

    let (status, _) = send(
        &app.router,
        get(&format!("/api/jobs/emails/{}", JobId::new()), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app.router,
        get(&format!("/api/jobs/cv-analysis/{}", JobId::new()), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app.router, get("/api/jobs/cv-analysis/42", Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_admin_routes_refuse_users() {
    let app = TestApp::builder().build();
    let (_, token) = app.user_token();

    for request in [
        get("/api/jobs/cv-analysis/stats", Some(&token)),
        get("/api/jobs/cv-analysis", Some(&token)),
        delete(&format!("/api/jobs/cv-analysis/{}", JobId::new()), Some(&token)),
        post_json(
            "/api/jobs/cv-analysis/clean",
            Some(&token),
            &json!({"state": "completed"}),
        ),
    ] {
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");
    }
}

#[tokio::test]
async fn test_admin_stats_and_list() {
    let app = TestApp::builder().build();
    let (_, user) = app.user_token();
    let (_, admin) = app.admin_token();

    submit_cv(&app, &user).await;
    submit_cv(&app, &user).await;

    let (status, body) = send(&app.router, get("/api/jobs/cv-analysis/stats", Some(&admin))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue"], "cv-analysis");
    assert_eq!(body["counts"]["waiting"], 2);

    let (status, body) = send(
        &app.router,
        get("/api/jobs/cv-analysis?state=waiting&limit=1", Some(&admin)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app.router,
        get("/api/jobs/cv-analysis?state=sleeping", Some(&admin)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_admin_remove_and_retry() {
    let app = TestApp::builder().build();
    let (_, user) = app.user_token();
    let (_, admin) = app.admin_token();

    let accepted = submit_cv(&app, &user).await;
    let url = accepted["status_url"].as_str().unwrap().to_string();

    // Only failed jobs can be retried
    let (status, body) = send(
        &app.router,
        post_json(&format!("{}/retry", url), Some(&admin), &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_JOB_STATE");

    let (status, _) = send(&app.router, delete(&url, Some(&admin))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app.router, delete(&url, Some(&admin))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app.router, get(&url, Some(&user))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_clean_only_finished_states() {
    let app = TestApp::builder().build();
    let (_, admin) = app.admin_token();

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/jobs/interview-scoring/clean",
            Some(&admin),
            &json!({"state": "waiting"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/jobs/interview-scoring/clean",
            Some(&admin),
            &json!({"state": "completed", "grace_secs": 0, "limit": 10}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 0);
}

#[test_log::test(tokio::test)]
async fn test_charge_failure_queues_nothing() {
    // The ledger is unreachable, so reserving credits fails
    let app = TestApp::builder()
        .with_pricing(CreditPricing::default())
        .build();
    let (_, token) = app.user_token();

    let (status, body) = send(
        &app.router,
        post_json("/api/cv-analysis", Some(&token), &cv_request()),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "DATABASE_ERROR");

    let stats = app.queues.stats(JobKind::CvAnalysis).await.unwrap();
    assert_eq!(stats.counts.waiting, 0);
}

#[tokio::test]
async fn test_closed_queue_refuses_submissions() {
    let app = TestApp::builder().build();
    let (_, token) = app.user_token();
    app.queues.close();

    let (status, body) = send(
        &app.router,
        post_json("/api/cv-analysis", Some(&token), &cv_request()),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "QUEUE_CLOSED");
}

#[tokio::test]
async fn test_admin_retry_of_free_job() {
    let app = TestApp::builder().build();
    let (_, user) = app.user_token();
    let (_, admin) = app.admin_token();

    submit_cv(&app, &user).await;
    let job_id = fail_next_cv_job(&app).await;
    let before = app
        .queues
        .get_job(JobKind::CvAnalysis, job_id)
        .await
        .unwrap()
        .unwrap();

    let (status, body) = send(
        &app.router,
        post_json(
            &format!("/api/jobs/cv-analysis/{}/retry", job_id),
            Some(&admin),
            &json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {}", body);
    assert_eq!(body["state"], "waiting");
    assert_eq!(body["attempts_made"], 0);

    let after = app
        .queues
        .get_job(JobKind::CvAnalysis, job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.payload, before.payload);
}

#[test_log::test(tokio::test)]
async fn test_admin_retry_of_charged_job_charges_again() {
    let app = TestApp::builder().build();
    let (_, admin) = app.admin_token();

    let reservation_id = Uuid::new_v4();
    let payload = CvAnalysisPayload {
        user_id: Uuid::new_v4(),
        candidate_name: "Ada Lovelace".to_string(),
        document: CvDocument::Text { text: sample_cv() },
        job_description: None,
        credits_charged: 3,
        reservation_id,
    };
    app.queues
        .cv_analysis
        .add("analyze-cv", &payload, Some(JobOptions::default().with_attempts(1)))
        .await
        .unwrap();
    let job_id = fail_next_cv_job(&app).await;

    // The ledger is unreachable, so the new charge fails and nothing runs
    let (status, body) = send(
        &app.router,
        post_json(
            &format!("/api/jobs/cv-analysis/{}/retry", job_id),
            Some(&admin),
            &json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "DATABASE_ERROR");

    let job = app
        .queues
        .get_job(JobKind::CvAnalysis, job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(payload_reservation(&job.payload), Some((3, reservation_id)));
}
