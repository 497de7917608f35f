//! Batch scoring of an uploaded CSV file

use crate::batch;
use crate::http::{ApiError, ApiResult, AppState};
use crate::types::BatchResult;
use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::Json;
use tracing::{debug, info};

/// Form field the CSV is expected under
const FILE_FIELD: &str = "file";

const MULTIPART_FORM_DATA: &str = "multipart/form-data";

pub async fn upload(
    State(state): State<AppState>,
    request: Request,
) -> ApiResult<Json<BatchResult>> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_multipart);

    let body = if is_multipart {
        let multipart = Multipart::from_request(request, &state).await?;
        read_file_field(multipart).await?
    } else {
        Bytes::from_request(request, &state).await?
    };

    debug!(bytes = body.len(), multipart = is_multipart, "Upload received");

    let service = state.service.clone();
    let result = tokio::task::spawn_blocking(move || {
        let rows = batch::read_transactions(&body)?;
        Ok::<_, ApiError>(service.score_rows(rows))
    })
    .await??;

    info!(
        total = result.summary.total,
        legit = result.summary.legit,
        fraudulent = result.summary.fraudulent,
        rejected = result.summary.rejected,
        "Upload scored"
    );

    Ok(Json(result))
}

/// Media types compare case-insensitively
fn is_multipart(content_type: &str) -> bool {
    content_type
        .trim_start()
        .get(..MULTIPART_FORM_DATA.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(MULTIPART_FORM_DATA))
}

/// Contents of the `file` field, or of the first file field when no field
/// carries that name
async fn read_file_field(mut multipart: Multipart) -> ApiResult<Bytes> {
    let mut first_file = None;

    while let Some(field) = multipart.next_field().await? {
        let named = field.name() == Some(FILE_FIELD);
        let is_file = field.file_name().is_some();
        if !named && (!is_file || first_file.is_some()) {
            continue;
        }

        let data = field.bytes().await?;
        if named {
            return Ok(data);
        }
        first_file = Some(data);
    }

    first_file.ok_or_else(|| {
        ApiError::Validation(format!(
            "no CSV file in upload; send it in the '{}' field",
            FILE_FIELD
        ))
    })
}
