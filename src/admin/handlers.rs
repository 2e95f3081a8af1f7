use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::export::trainees_csv;
use crate::{
    auth::{jwt::AdminUser, services::validate_update},
    error::ApiError,
    importer::{import_trainees, normalize_token, ImportReport},
    state::AppState,
    trainees::{AccountKind, Trainee, TraineeStats, TraineeUpdate},
};

/// Room for multipart boundaries and part headers on top of the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/stats", get(stats))
        .route("/admin/users", get(list_users))
        .route("/admin/users/export", get(export_users))
        .route("/admin/courses/enrolled", get(enrolled))
}

pub fn write_routes() -> Router<AppState> {
    Router::new().route(
        "/admin/users/:id",
        get(get_user).put(update_user).delete(delete_user),
    )
}

pub fn import_routes(max_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/admin/users/import-csv", post(import_csv))
        .layer(DefaultBodyLimit::max(max_bytes + MULTIPART_OVERHEAD))
}

#[instrument(skip(state, _admin))]
pub async fn stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<TraineeStats>, ApiError> {
    Ok(Json(state.store.stats().await?))
}

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<Trainee>>, ApiError> {
    Ok(Json(state.store.list(AccountKind::Trainee).await?))
}

#[instrument(skip(state, _admin))]
pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Trainee>, ApiError> {
    state
        .store
        .find_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("User not found".into()))
}

#[instrument(skip(state, admin, changes))]
pub async fn update_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(changes): Json<TraineeUpdate>,
) -> Result<Json<Trainee>, ApiError> {
    let changes = validate_update(changes)?;
    let user = state.store.update(id, changes).await?;
    info!(admin_id = %admin.id, user_id = %id, "user updated by admin");
    Ok(Json(user))
}

#[instrument(skip(state, admin))]
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if admin.id == id {
        warn!(admin_id = %admin.id, "admin tried to delete own account");
        return Err(ApiError::BadRequest("You cannot delete your own account.".into()));
    }
    if !state.store.delete(id).await? {
        return Err(ApiError::NotFound("User not found".into()));
    }
    info!(admin_id = %admin.id, user_id = %id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct EnrolledQuery {
    pub course: Option<String>,
}

#[instrument(skip(state, _admin))]
pub async fn enrolled(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(q): Query<EnrolledQuery>,
) -> Result<Json<Vec<Trainee>>, ApiError> {
    let course = q.course.as_deref().map(normalize_token).unwrap_or_default();
    if course.is_empty() {
        return Err(ApiError::BadRequest("course is required".into()));
    }
    Ok(Json(state.store.enrolled_in(&course).await?))
}

#[instrument(skip(state, _admin))]
pub async fn export_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<impl IntoResponse, ApiError> {
    let trainees = state.store.list(AccountKind::Trainee).await?;
    let body = trainees_csv(&trainees).map_err(ApiError::internal)?;
    info!(rows = trainees.len(), "trainees exported");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"trainees.csv\""),
        ],
        body,
    ))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::BadRequest(e.body_text())
    }
}

/// POST /admin/users/import-csv (multipart, field `file`)
#[instrument(skip(state, admin, mp))]
pub async fn import_csv(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    mut mp: Multipart,
) -> Result<Json<ImportReport>, ApiError> {
    let mut file: Option<Bytes> = None;
    while let Some(field) = mp.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("file") {
            file = Some(field.bytes().await.map_err(multipart_error)?);
        }
    }
    let Some(bytes) = file else {
        return Err(ApiError::BadRequest("No file uploaded".into()));
    };

    let report = import_trainees(state.store.as_ref(), &state.config.import, &bytes)
        .await
        .map_err(|e| {
            warn!(admin_id = %admin.id, error = %e, "csv import rejected");
            ApiError::from(e)
        })?;

    info!(admin_id = %admin.id, errors = report.error_count, "csv import served");
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::jwt::tests::token_for;
    use crate::trainees::NewTrainee;

    const BOUNDARY: &str = "XBOUNDARYX";

    fn app(state: AppState) -> Router {
        crate::admin::router(state.config.import.max_bytes).with_state(state)
    }

    fn account(email: &str, name: &str, kind: AccountKind, courses: &[&str]) -> NewTrainee {
        NewTrainee {
            email: email.into(),
            full_name: name.into(),
            school: "Mapua".into(),
            mobile_number: String::new(),
            grade_teach: String::new(),
            years_experience: None,
            training_attended: None,
            courses_interested: courses.iter().map(|c| c.to_string()).collect(),
            courses_other: vec![],
            interested_in_certification: true,
            password_hash: "$argon2id$placeholder".into(),
            account_kind: kind,
        }
    }

    async fn setup() -> (AppState, Trainee, Trainee) {
        let state = AppState::fake();
        let admin = state
            .store
            .create(account("admin@example.com", "Admin", AccountKind::Admin, &[]))
            .await
            .unwrap();
        let trainee = state
            .store
            .create(account("jo@example.com", "Jo Cruz", AccountKind::Trainee, &["Python"]))
            .await
            .unwrap();
        (state, admin, trainee)
    }

    fn bearer(state: &AppState, id: Uuid) -> String {
        format!("Bearer {}", token_for(state, id, 300))
    }

    fn upload(auth: Option<String>, csv: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"t.csv\"\r\n\
             Content-Type: text/csv\r\n\r\n{csv}\r\n--{BOUNDARY}--\r\n"
        );
        let mut req = Request::post("/admin/users/import-csv").header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
        if let Some(auth) = auth {
            req = req.header(header::AUTHORIZATION, auth);
        }
        req.body(Body::from(body)).unwrap()
    }

    fn get_req(uri: &str, auth: String) -> Request<Body> {
        Request::get(uri)
            .header(header::AUTHORIZATION, auth)
            .body(Body::empty())
            .unwrap()
    }

    async fn read(app: Router, req: Request<Body>) -> (StatusCode, Bytes) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        (status, to_bytes(res.into_body(), usize::MAX).await.unwrap())
    }

    fn json(bytes: &Bytes) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn import_requires_admin() {
        let (state, _, trainee) = setup().await;
        let csv = "fullName,school,interestedInCertification,email\nA B,S,yes,a@x.com";

        let (status, body) = read(app(state.clone()), upload(None, csv)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json(&body)["msg"], "No token, authorization denied");

        let auth = bearer(&state, trainee.id);
        let (status, body) = read(app(state), upload(Some(auth), csv)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json(&body)["msg"], "Admin only");
    }

    #[tokio::test]
    async fn import_returns_report() {
        let (state, admin, _) = setup().await;
        let csv = "fullName,school,interestedInCertification,email,coursesInterested\n\
                   Ana Reyes,UP,yes,Ana@Example.com,\"Python; Excel\"\n\
                   ,UP,no,bad@example.com,\n\
                   Jo Cruz,Mapua,no,jo@example.com,Python";
        let auth = bearer(&state, admin.id);
        let (status, body) = read(app(state.clone()), upload(Some(auth), csv)).await;
        assert_eq!(status, StatusCode::OK);
        let report = json(&body);
        assert_eq!(report["processedRows"], 3);
        assert_eq!(report["upsertedCount"], 1);
        assert_eq!(report["matchedCount"], 1);
        assert_eq!(report["modifiedCount"], 1);
        assert_eq!(report["errorCount"], 1);
        assert_eq!(report["errors"][0]["rowNumber"], 3);
        assert_eq!(report["errors"][0]["error"], "fullName is required");

        let ana = state.store.find_by_email("ana@example.com").await.unwrap().unwrap();
        assert_eq!(ana.courses_interested, vec!["Python", "Excel"]);
    }

    #[tokio::test]
    async fn import_missing_column_is_bad_request() {
        let (state, admin, _) = setup().await;
        let auth = bearer(&state, admin.id);
        let (status, body) = read(app(state), upload(Some(auth), "fullName,email\nA,a@x.com")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body = json(&body);
        assert_eq!(body["missing"], serde_json::json!(["school", "interestedInCertification"]));
        assert!(body["msg"].is_string());
    }

    #[tokio::test]
    async fn export_of_unset_optionals_reimports_unchanged() {
        let (state, admin, trainee) = setup().await;
        let auth = bearer(&state, admin.id);
        let (status, body) = read(app(state.clone()), get_req("/admin/users/export", auth.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("jo@example.com"));
        assert!(!text.contains("admin@example.com"));

        let (status, body) = read(app(state.clone()), upload(Some(auth), &text)).await;
        assert_eq!(status, StatusCode::OK);
        let report = json(&body);
        assert_eq!(report["matchedCount"], 1);
        assert_eq!(report["modifiedCount"], 0);
        assert_eq!(report["errorCount"], 0);

        let after = state.store.find_by_id(trainee.id).await.unwrap().unwrap();
        assert_eq!(after.mobile_number, "");
        assert_eq!(after.grade_teach, "");
        assert_eq!(after.training_attended, None);
        assert_eq!(after.years_experience, None);
        assert_eq!(after.courses_other, Vec::<String>::new());
        assert_eq!(after.created_at, trainee.created_at);
    }

    #[tokio::test]
    async fn admin_user_crud() {
        let (state, admin, trainee) = setup().await;
        let auth = bearer(&state, admin.id);

        let (status, body) = read(app(state.clone()), get_req("/admin/users", auth.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body).as_array().unwrap().len(), 1);

        let (status, body) = read(
            app(state.clone()),
            get_req("/admin/courses/enrolled?course=Python", auth.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)[0]["email"], "jo@example.com");

        let self_delete = Request::delete(format!("/admin/users/{}", admin.id))
            .header(header::AUTHORIZATION, auth.clone())
            .body(Body::empty())
            .unwrap();
        let (status, _) = read(app(state.clone()), self_delete).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let delete = |id: Uuid| {
            Request::delete(format!("/admin/users/{id}"))
                .header(header::AUTHORIZATION, auth.clone())
                .body(Body::empty())
                .unwrap()
        };
        let (status, _) = read(app(state.clone()), delete(trainee.id)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = read(app(state), delete(trainee.id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
