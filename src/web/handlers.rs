use super::prelude::*;

#[derive(Serialize, Debug)]
pub(crate) struct VideoIdResponse {
    video_id: JobReference,
}

#[derive(Deserialize, Debug)]
pub(crate) struct StatusQuery {
    app_bundle_id: String,
    apphud_user_id: String,
    video_id: i64,
}

#[derive(Serialize, Debug)]
pub(crate) struct HealthResponse {
    token_captured: bool,
}

#[instrument(skip_all)]
pub(crate) async fn text2video_handler(
    State(state): State<AppState>,
    fields: JobFields,
) -> Result<Json<VideoIdResponse>, RelayError> {
    let caller = fields.caller()?;
    let prompt = fields.require("prompt")?;

    let video_id = state.platform.submit_text_job(prompt).await?;
    generation_history::record(&state.db, video_id.as_str(), &caller, CallKind::TextToVideo)
        .await?;

    Ok(Json(VideoIdResponse { video_id }))
}

#[instrument(skip_all)]
pub(crate) async fn image2video_handler(
    State(state): State<AppState>,
    mut fields: JobFields,
) -> Result<Json<VideoIdResponse>, RelayError> {
    let caller = fields.caller()?;
    let image = fields.take_image()?;
    let prompt = fields.require("prompt")?;

    let video_id = state.platform.submit_image_job(prompt, &image).await?;
    generation_history::record(&state.db, video_id.as_str(), &caller, CallKind::ImageToVideo)
        .await?;

    Ok(Json(VideoIdResponse { video_id }))
}

#[instrument(skip_all, fields(video_id = query.video_id))]
pub(crate) async fn get_status_handler(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<JobStatus>, RelayError> {
    let job = JobReference::from(query.video_id);
    let status = state.platform.poll_status(&job).await?;

    let caller = Caller {
        app_bundle_id: query.app_bundle_id,
        apphud_user_id: query.apphud_user_id,
    };
    generation_history::record(&state.db, job.as_str(), &caller, CallKind::StatusCheck).await?;
    debug!(?status, "Status relayed");

    Ok(Json(status))
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        token_captured: state.platform.has_token(),
    })
}
