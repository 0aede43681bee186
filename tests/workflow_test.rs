//! Database-backed workflows. Set `TEST_DATABASE_URL` to a disposable
//! Postgres database to run them; they return early otherwise.

mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use vantahire_backend::{
    dto::{
        application_dto::{ApplicationForm, BulkStatusPayload, MoveStagePayload},
        auth_dto::RegisterPayload,
        job_dto::{CreateJobPayload, ReviewJobPayload},
    },
    error::{Error, Result},
    middleware::auth::{issue_token, AuthUser},
    models::{
        application::{Application, ApplicationStatus},
        job::{Job, JobStatus, JobType},
        notification::OutboxEntry,
        user::{Role, User},
    },
    routes,
    services::{
        mail_transport::{LogMailTransport, MailTransport, OutgoingMail},
        notification_service::NotificationService,
    },
    AppState,
};

use common::{body_json, database_state, json_request, multipart_body, multipart_request};

mockall::mock! {
    Transport {}

    #[async_trait::async_trait]
    impl MailTransport for Transport {
        async fn send(&self, mail: &OutgoingMail) -> Result<()>;
    }
}

fn unique_username() -> String {
    format!("{}@example.com", Uuid::new_v4())
}

fn as_auth(user: &User) -> AuthUser {
    AuthUser {
        id: user.id,
        username: user.username.clone(),
        role: user.role,
    }
}

async fn signup(state: &AppState, role: Role) -> User {
    let payload = RegisterPayload {
        username: unique_username(),
        password: "correct-horse-battery".into(),
        first_name: Some("Test".into()),
        last_name: None,
        role: Some(role),
    };
    state.user_service.register(&payload).await.expect("register")
}

async fn register(state: &AppState, role: Role) -> AuthUser {
    as_auth(&signup(state, role).await)
}

/// Registration refuses the admin role, so admins come from the bootstrap path.
async fn admin_account(state: &AppState) -> User {
    state
        .user_service
        .ensure_admin(&unique_username(), "correct-horse-battery")
        .await
        .expect("admin")
}

async fn admin(state: &AppState) -> AuthUser {
    as_auth(&admin_account(state).await)
}

async fn outbox_rows(state: &AppState, application_id: i32) -> Vec<OutboxEntry> {
    sqlx::query_as::<_, OutboxEntry>(
        r#"
        SELECT id, application_id, template_type, recipient, subject, body, status, attempts,
               max_attempts, next_retry_at, last_error, created_at, updated_at
        FROM notification_outbox
        WHERE application_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(application_id)
    .fetch_all(&state.pool)
    .await
    .expect("outbox rows")
}

/// Runs the worker step until `id` has been attempted `attempts` times and
/// is no longer in flight. Other due rows may be drained along the way.
async fn deliver(service: &NotificationService, id: Uuid, attempts: i32) -> OutboxEntry {
    for _ in 0..500 {
        let entry = service.get(id).await.expect("outbox entry");
        if entry.attempts >= attempts && entry.status != "sending" {
            return entry;
        }
        if !service.run_once().await.expect("run_once") {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
    panic!("outbox entry {} was never attempted {} times", id, attempts);
}

async fn make_due(state: &AppState, id: Uuid) {
    sqlx::query("UPDATE notification_outbox SET next_retry_at = NOW() - INTERVAL '1 second' WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await
        .expect("make due");
}

fn job_payload(title: &str) -> CreateJobPayload {
    CreateJobPayload {
        title: title.into(),
        location: "Remote".into(),
        job_type: JobType::FullTime,
        description: "Build and run the hiring pipeline services.".into(),
        skills: vec!["rust".into(), "postgres".into()],
        deadline: NaiveDate::from_ymd_opt(2030, 1, 1),
    }
}

async fn approved_job(state: &AppState, recruiter: &AuthUser, admin: &AuthUser) -> Job {
    let job = state
        .job_service
        .submit(recruiter, &job_payload("Platform Engineer"))
        .await
        .expect("submit job");
    state
        .job_service
        .review(
            job.id,
            &ReviewJobPayload {
                status: JobStatus::Approved,
                review_comments: None,
            },
            admin.id,
        )
        .await
        .expect("approve job")
}

async fn application(state: &AppState, job_id: i32, email: &str) -> Application {
    let form = ApplicationForm {
        name: "Grace Hopper".into(),
        email: email.into(),
        phone: "+15550001111".into(),
        cover_letter: None,
    };
    state
        .application_service
        .submit(job_id, &form, "http://localhost:8080/uploads/resumes/test.pdf")
        .await
        .expect("submit application")
}

async fn stage_id(state: &AppState, name: &str) -> i32 {
    sqlx::query_scalar("SELECT id FROM pipeline_stages WHERE name = $1 ORDER BY id LIMIT 1")
        .bind(name)
        .fetch_one(&state.pool)
        .await
        .expect("seeded stage")
}

#[tokio::test]
async fn job_lifecycle_and_sweeps() {
    let Some(state) = database_state().await else { return };
    let recruiter = register(&state, Role::Recruiter).await;
    let admin = admin(&state).await;

    let job = state
        .job_service
        .submit(&recruiter, &job_payload("Data Engineer"))
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.is_active);
    assert_eq!(job.posted_by, recruiter.id);

    let pending = ReviewJobPayload {
        status: JobStatus::Pending,
        review_comments: None,
    };
    assert!(matches!(
        state.job_service.review(job.id, &pending, admin.id).await,
        Err(Error::InvalidFields(_))
    ));

    let declined = state
        .job_service
        .review(
            job.id,
            &ReviewJobPayload {
                status: JobStatus::Declined,
                review_comments: Some("Needs a salary range".into()),
            },
            admin.id,
        )
        .await
        .unwrap();
    assert_eq!(declined.status, JobStatus::Declined);
    assert_eq!(declined.reviewed_by, Some(admin.id));
    assert!(declined.reviewed_at.is_some());

    let other = register(&state, Role::Recruiter).await;
    assert!(matches!(
        state.job_service.set_active(job.id, false, &other).await,
        Err(Error::Forbidden(_))
    ));

    let fresh = approved_job(&state, &recruiter, &admin).await;
    sqlx::query("UPDATE jobs SET created_at = NOW() - INTERVAL '61 days' WHERE id = ANY($1)")
        .bind(vec![job.id, fresh.id])
        .execute(&state.pool)
        .await
        .unwrap();

    let archived = state.maintenance_service.archive_declined(Utc::now()).await.unwrap();
    assert!(archived >= 1);
    let declined = state.job_service.get(job.id).await.unwrap();
    assert!(!declined.is_active);

    let swept = state.maintenance_service.sweep_expired(Utc::now()).await.unwrap();
    assert!(swept >= 1);
    let expired = state.job_service.get(fresh.id).await.unwrap();
    assert!(!expired.is_active);
    assert!(expired.expires_at.is_some());
    assert_eq!(expired.status, JobStatus::Approved);

    // A second sweep finds nothing left for these jobs.
    state.maintenance_service.sweep_expired(Utc::now()).await.unwrap();
    assert_eq!(
        state.job_service.get(fresh.id).await.unwrap().expires_at,
        expired.expires_at
    );
}

#[tokio::test]
async fn apply_through_router_records_click() {
    let Some(state) = database_state().await else { return };
    let recruiter = register(&state, Role::Recruiter).await;
    let admin = admin(&state).await;
    let job = approved_job(&state, &recruiter, &admin).await;

    let app = routes::router(state.clone());
    let body = multipart_body(
        &[
            ("name", "Ada Lovelace"),
            ("email", "ada@example.com"),
            ("phone", "+15551234567"),
            ("coverLetter", "I like engines."),
        ],
        Some(("cv.pdf", b"%PDF-1.4\n%test resume\n")),
    );
    let response = app
        .oneshot(multipart_request(
            &format!("/api/jobs/{}/apply", job.id),
            "192.0.2.44",
            body,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let application_id = body_json(response).await["applicationId"]
        .as_i64()
        .expect("application id") as i32;

    let stored = state
        .application_service
        .get(application_id, &recruiter)
        .await
        .unwrap();
    assert_eq!(stored.status, ApplicationStatus::Submitted);
    assert!(stored.resume_url.ends_with(".pdf"));
    assert_eq!(stored.current_stage, Some(stage_id(&state, "Applied").await));

    let analytics = state
        .analytics_service
        .get_for_job(job.id)
        .await
        .unwrap()
        .expect("analytics row");
    assert_eq!(analytics.apply_clicks, 1);

    let queued = outbox_rows(&state, application_id).await;
    assert_eq!(queued.len(), 2);
    let candidate = queued
        .iter()
        .find(|row| row.template_type.as_deref() == Some("application_received"))
        .expect("candidate confirmation");
    assert_eq!(candidate.recipient, "ada@example.com");
    let alert = queued
        .iter()
        .find(|row| row.template_type.is_none())
        .expect("owner alert");
    assert_eq!(alert.recipient, recruiter.username);
}

#[tokio::test]
async fn stage_move_writes_history_atomically() {
    let Some(state) = database_state().await else { return };
    let recruiter = register(&state, Role::Recruiter).await;
    let admin = admin(&state).await;
    let job = approved_job(&state, &recruiter, &admin).await;
    let app = application(&state, job.id, "stage@example.com").await;

    let screening = stage_id(&state, "Screening").await;
    let (moved, stage) = state
        .application_service
        .move_stage(
            app.id,
            &MoveStagePayload {
                stage_id: screening,
                notes: Some("Strong portfolio".into()),
            },
            &recruiter,
        )
        .await
        .unwrap();
    assert_eq!(stage.name, "Screening");
    assert_eq!(moved.current_stage, Some(screening));
    assert_eq!(moved.stage_changed_by, Some(recruiter.id));
    assert_eq!(moved.status, ApplicationStatus::Submitted);

    let history = state
        .application_service
        .stage_history(app.id, &recruiter)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].to_stage, screening);
    assert_eq!(history[0].notes.as_deref(), Some("Strong portfolio"));

    let missing = state
        .application_service
        .move_stage(
            app.id,
            &MoveStagePayload {
                stage_id: i32::MAX,
                notes: None,
            },
            &recruiter,
        )
        .await;
    assert!(matches!(missing, Err(Error::NotFound(_))));
    let history = state
        .application_service
        .stage_history(app.id, &recruiter)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);

    let rejected = stage_id(&state, "Rejected").await;
    let (moved, _) = state
        .application_service
        .move_stage(
            app.id,
            &MoveStagePayload {
                stage_id: rejected,
                notes: None,
            },
            &recruiter,
        )
        .await
        .unwrap();
    assert_eq!(moved.status, ApplicationStatus::Rejected);
}

#[tokio::test]
async fn bulk_update_is_all_or_nothing() {
    let Some(state) = database_state().await else { return };
    let recruiter = register(&state, Role::Recruiter).await;
    let rival = register(&state, Role::Recruiter).await;
    let admin = admin(&state).await;
    let own_job = approved_job(&state, &recruiter, &admin).await;
    let rival_job = approved_job(&state, &rival, &admin).await;

    let mut ids = Vec::new();
    for n in 0..4 {
        ids.push(application(&state, own_job.id, &format!("bulk{}@example.com", n)).await.id);
    }
    ids.push(application(&state, rival_job.id, "rival@example.com").await.id);

    let payload = BulkStatusPayload {
        application_ids: ids.clone(),
        status: ApplicationStatus::Rejected,
        notes: None,
    };
    let result = state
        .application_service
        .bulk_update_status(&payload, &recruiter)
        .await;
    assert!(matches!(result, Err(Error::Forbidden(_))));

    let rejected: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM applications WHERE id = ANY($1) AND status = 'rejected'",
    )
    .bind(&ids)
    .fetch_one(&state.pool)
    .await
    .unwrap();
    assert_eq!(rejected, 0);

    let own = BulkStatusPayload {
        application_ids: ids[..4].to_vec(),
        status: ApplicationStatus::Shortlisted,
        notes: None,
    };
    assert_eq!(
        state
            .application_service
            .bulk_update_status(&own, &recruiter)
            .await
            .unwrap(),
        4
    );
}

#[tokio::test]
async fn withdraw_requires_matching_email() {
    let Some(state) = database_state().await else { return };
    let recruiter = register(&state, Role::Recruiter).await;
    let admin = admin(&state).await;
    let candidate = register(&state, Role::Candidate).await;
    let job = approved_job(&state, &recruiter, &admin).await;

    let foreign = application(&state, job.id, "someone-else@example.com").await;
    assert!(matches!(
        state.application_service.withdraw(foreign.id, &candidate).await,
        Err(Error::Forbidden(_))
    ));
    assert!(state
        .application_service
        .get(foreign.id, &recruiter)
        .await
        .is_ok());

    let own = application(&state, job.id, &candidate.username.to_uppercase()).await;
    state
        .application_service
        .withdraw(own.id, &candidate)
        .await
        .unwrap();
    assert!(matches!(
        state.application_service.get(own.id, &recruiter).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn conversion_rate_tracks_counters() {
    let Some(state) = database_state().await else { return };
    let recruiter = register(&state, Role::Recruiter).await;
    let admin = admin(&state).await;
    let job = approved_job(&state, &recruiter, &admin).await;

    for _ in 0..3 {
        state.analytics_service.record_view(job.id).await.unwrap();
    }
    let analytics = state.analytics_service.record_apply_click(job.id).await.unwrap();
    assert_eq!(analytics.views, 3);
    assert_eq!(analytics.apply_clicks, 1);
    assert_eq!(analytics.conversion_rate, Decimal::new(3333, 2));

    let summaries = state
        .analytics_service
        .summaries(Some(recruiter.id))
        .await
        .unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].job_id, job.id);
}

#[tokio::test]
async fn conversion_rate_has_room_for_clicks_without_views() {
    let Some(state) = database_state().await else { return };
    let recruiter = register(&state, Role::Recruiter).await;
    let admin = admin(&state).await;
    let job = approved_job(&state, &recruiter, &admin).await;

    state.analytics_service.record_view(job.id).await.unwrap();
    sqlx::query("UPDATE job_analytics SET apply_clicks = 1000 WHERE job_id = $1")
        .bind(job.id)
        .execute(&state.pool)
        .await
        .unwrap();

    let analytics = state.analytics_service.record_apply_click(job.id).await.unwrap();
    assert_eq!(analytics.apply_clicks, 1001);
    assert_eq!(analytics.conversion_rate, Decimal::new(10010000, 2));
}

#[tokio::test]
async fn demoted_user_loses_access_with_old_token() {
    let Some(state) = database_state().await else { return };
    let recruiter = signup(&state, Role::Recruiter).await;
    let admin = admin_account(&state).await;
    let recruiter_token = issue_token(&state.config, &recruiter).unwrap();
    let admin_token = issue_token(&state.config, &admin).unwrap();
    let app = routes::router(state.clone());

    let my_jobs = || {
        Request::get("/api/my-jobs")
            .header(header::AUTHORIZATION, format!("Bearer {}", recruiter_token))
            .body(Body::empty())
            .unwrap()
    };
    let response = app.clone().oneshot(my_jobs()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/api/admin/users/{}/role", recruiter.id),
            Some(&admin_token),
            json!({ "role": "candidate" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(my_jobs()).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn token_for_deleted_user_is_rejected() {
    let Some(state) = database_state().await else { return };
    let candidate = signup(&state, Role::Candidate).await;
    let token = issue_token(&state.config, &candidate).unwrap();
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(candidate.id)
        .execute(&state.pool)
        .await
        .unwrap();

    let response = routes::router(state)
        .oneshot(
            Request::get("/api/user")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bulk_update_notifies_each_application() {
    let Some(state) = database_state().await else { return };
    let recruiter = signup(&state, Role::Recruiter).await;
    let admin = admin(&state).await;
    let job = approved_job(&state, &as_auth(&recruiter), &admin).await;
    let first = application(&state, job.id, "first@example.com").await;
    let second = application(&state, job.id, "second@example.com").await;
    let token = issue_token(&state.config, &recruiter).unwrap();

    let response = routes::router(state.clone())
        .oneshot(json_request(
            "PATCH",
            "/api/applications/bulk",
            Some(&token),
            json!({ "applicationIds": [first.id, second.id, first.id], "status": "rejected" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["updated"], 2);

    for id in [first.id, second.id] {
        let rows = outbox_rows(&state, id).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].template_type.as_deref(), Some("rejection"));
    }
}

// One test drives both transports so parallel tests never claim each
// other's rows.
#[tokio::test]
async fn outbox_delivery_retries_then_settles() {
    let Some(state) = database_state().await else { return };
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .returning(|_| Err(Error::ServiceUnavailable("mail api down".into())));
    let failing = NotificationService::new(
        state.pool.clone(),
        Arc::new(transport),
        "noreply@vantahire.com".into(),
        true,
    );
    let id = failing
        .enqueue(None, None, &unique_username(), "Retry me", "Body")
        .await
        .unwrap();

    let first = deliver(&failing, id, 1).await;
    assert_eq!(first.status, "pending");
    assert_eq!(first.attempts, 1);
    assert!(first.next_retry_at.expect("retry scheduled") > Utc::now());
    assert!(first.last_error.as_deref().unwrap_or_default().contains("mail api down"));

    make_due(&state, id).await;
    let second = deliver(&failing, id, 2).await;
    assert_eq!(second.status, "pending");
    assert!(second.next_retry_at.is_some());

    make_due(&state, id).await;
    let last = deliver(&failing, id, 3).await;
    assert_eq!(last.status, "failed");
    assert_eq!(last.attempts, 3);

    let working = NotificationService::new(
        state.pool.clone(),
        Arc::new(LogMailTransport),
        "noreply@vantahire.com".into(),
        true,
    );
    let id = working
        .enqueue(None, None, &unique_username(), "Hello", "Body")
        .await
        .unwrap();
    let entry = deliver(&working, id, 1).await;
    assert_eq!(entry.status, "sent");
    assert!(entry.last_error.is_none());
}

#[tokio::test]
async fn stale_sending_rows_are_requeued() {
    let Some(state) = database_state().await else { return };
    let service = state.notification_service.clone();
    let id = service
        .enqueue(None, None, &unique_username(), "Orphaned", "Body")
        .await
        .unwrap();
    sqlx::query(
        "UPDATE notification_outbox SET status = 'sending', attempts = 1, updated_at = NOW() - INTERVAL '11 minutes' WHERE id = $1",
    )
    .bind(id)
    .execute(&state.pool)
    .await
    .unwrap();

    assert!(service.recover_stale().await.unwrap() >= 1);
    let entry = service.get(id).await.unwrap();
    assert_eq!(entry.status, "pending");
    assert_eq!(entry.attempts, 1);
}
