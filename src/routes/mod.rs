pub mod applications;
pub mod auth;
pub mod health;
pub mod jobs;
pub mod pipeline;
pub mod profile;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{
    middleware::{
        auth::{require_admin, require_auth, require_candidate, require_recruiter},
        cors::api_cors,
        rate_limit::{new_rps_state, rps_middleware},
    },
    AppState,
};

/// Full HTTP surface. Each group carries its own gate; groups that share a
/// path with different methods are merged per method.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .route("/api/jobs", get(jobs::list_jobs))
        .route("/api/jobs/:id", get(jobs::get_job))
        .route(
            "/api/jobs/:id/apply",
            post(jobs::apply).layer(DefaultBodyLimit::max(jobs::APPLY_BODY_LIMIT)),
        )
        .route_layer(from_fn_with_state(
            new_rps_state(state.config.public_rps),
            rps_middleware,
        ));

    let authenticated = Router::new()
        .route("/api/user", get(auth::current_user))
        .route(
            "/api/profile",
            get(profile::get_profile).put(profile::save_profile),
        )
        .route("/api/my-applications", get(applications::my_applications))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let candidate = Router::new()
        .route("/api/applications/:id/withdraw", delete(applications::withdraw))
        .route_layer(from_fn_with_state(state.clone(), require_candidate));

    let recruiter = Router::new()
        .route("/api/jobs", post(jobs::create_job))
        .route("/api/my-jobs", get(jobs::my_jobs))
        .route("/api/jobs/:id/status", patch(jobs::set_job_active))
        .route("/api/jobs/:id/applications", get(jobs::job_applications))
        .route("/api/applications/bulk", patch(applications::bulk_update_status))
        .route("/api/applications/:id", get(applications::get_application))
        .route("/api/applications/:id/status", patch(applications::update_status))
        .route("/api/applications/:id/view", patch(applications::mark_viewed))
        .route("/api/applications/:id/download", patch(applications::mark_downloaded))
        .route("/api/applications/:id/stage", patch(applications::move_stage))
        .route("/api/applications/:id/history", get(applications::stage_history))
        .route("/api/applications/:id/interview", patch(applications::schedule_interview))
        .route(
            "/api/applications/:id/notes",
            get(applications::list_notes).post(applications::add_note),
        )
        .route("/api/applications/:id/rating", patch(applications::set_rating))
        .route("/api/applications/:id/send-email", post(applications::send_email))
        .route(
            "/api/pipeline/stages",
            get(pipeline::list_stages).post(pipeline::create_stage),
        )
        .route(
            "/api/email-templates",
            get(pipeline::list_templates).post(pipeline::create_template),
        )
        .route("/api/analytics/jobs", get(pipeline::job_analytics))
        .route_layer(from_fn_with_state(state.clone(), require_recruiter));

    let admin = Router::new()
        .route("/api/admin/jobs", get(jobs::admin_list_jobs))
        .route("/api/admin/jobs/:id/review", patch(jobs::review_job))
        .route("/api/admin/users/:id/role", patch(auth::change_role))
        .route_layer(from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::ready))
        .merge(public)
        .merge(authenticated)
        .merge(candidate)
        .merge(recruiter)
        .merge(admin)
        .nest_service("/uploads", ServeDir::new(&state.config.uploads_dir))
        .layer(TraceLayer::new_for_http())
        .layer(api_cors())
        .with_state(state)
}
