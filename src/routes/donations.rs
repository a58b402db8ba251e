use axum::{
    extract::{Json, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json as AxumJson},
};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthenticatedUser;
use crate::db::{
    self,
    models::{AiInsights, DonationStatus, FoodType, NewDonation, UrgencyLevel},
    TransitionOutcome,
};
use crate::routes::{ai, flatten_field_errors};
use crate::storage;
use crate::AppState;

const DEMO_IMAGE_URL: &str = "https://images.unsplash.com/photo-1482049016688-2d3e1b311543";

#[derive(Debug, Default)]
struct RawSubmission {
    title: Option<String>,
    quantity: Option<String>,
    pickup_deadline: Option<String>,
    food_type: Option<String>,
    location: Option<String>,
    image: Option<ImagePart>,
}

#[derive(Debug)]
struct ImagePart {
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
}

#[derive(Debug)]
struct ValidSubmission {
    title: String,
    quantity: i64,
    pickup_deadline: String,
    food_type: FoodType,
    location: String,
    image: ImagePart,
}

#[derive(Debug, Validate)]
struct SubmissionDraft {
    #[validate(length(min = 3, message = "title must be at least 3 characters"))]
    title: String,
    #[validate(length(min = 1, message = "pickupDeadline is required"))]
    pickup_deadline: String,
    #[validate(length(min = 3, message = "location must be at least 3 characters"))]
    location: String,
}

type FieldIssues = BTreeMap<String, Vec<String>>;

fn push_issue(issues: &mut FieldIssues, field: &str, message: &str) {
    issues
        .entry(field.to_string())
        .or_default()
        .push(message.to_string());
}

/// Whole-form check producing one field-level report. Nothing downstream
/// runs unless every constraint holds.
fn validate_submission(raw: RawSubmission) -> Result<ValidSubmission, FieldIssues> {
    let draft = SubmissionDraft {
        title: raw.title.unwrap_or_default(),
        pickup_deadline: raw.pickup_deadline.unwrap_or_default(),
        location: raw.location.unwrap_or_default(),
    };

    let mut issues = match draft.validate() {
        Ok(()) => FieldIssues::new(),
        Err(errors) => flatten_field_errors(&errors),
    };

    let quantity = raw
        .quantity
        .as_deref()
        .map(str::trim)
        .and_then(|q| q.parse::<i64>().ok())
        .filter(|q| *q > 0);
    if quantity.is_none() {
        push_issue(&mut issues, "quantity", "quantity must be a positive integer");
    }

    let food_type = raw.food_type.as_deref().and_then(FoodType::parse);
    if food_type.is_none() {
        push_issue(&mut issues, "foodType", "foodType must be 'veg' or 'non-veg'");
    }

    let image = match raw.image {
        Some(part) if part.bytes.is_empty() => {
            push_issue(&mut issues, "image", "image file is empty");
            None
        }
        Some(part) if !part.content_type.starts_with("image/") => {
            push_issue(&mut issues, "image", "image must be an image file");
            None
        }
        Some(part) => Some(part),
        None => {
            push_issue(&mut issues, "image", "image file is required");
            None
        }
    };

    match (quantity, food_type, image) {
        (Some(quantity), Some(food_type), Some(image)) if issues.is_empty() => Ok(ValidSubmission {
            title: draft.title,
            quantity,
            pickup_deadline: draft.pickup_deadline,
            food_type,
            location: draft.location,
            image,
        }),
        _ => Err(issues),
    }
}

async fn collect_submission(multipart: &mut Multipart) -> anyhow::Result<RawSubmission> {
    let mut raw = RawSubmission::default();
    while let Some(field) = multipart.next_field().await? {
        match field.name().unwrap_or_default() {
            "title" => raw.title = Some(field.text().await?),
            "quantity" => raw.quantity = Some(field.text().await?),
            "pickupDeadline" => raw.pickup_deadline = Some(field.text().await?),
            "foodType" => raw.food_type = Some(field.text().await?),
            "location" => raw.location = Some(field.text().await?),
            "image" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await?.to_vec();
                raw.image = Some(ImagePart {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            other => tracing::debug!("Ignoring unknown form field '{}'", other),
        }
    }
    Ok(raw)
}

pub async fn create_donation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let raw = match collect_submission(&mut multipart).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!("Malformed multipart submission: {}", e);
            return (StatusCode::BAD_REQUEST, "Malformed form submission").into_response();
        }
    };

    let valid = match validate_submission(raw) {
        Ok(valid) => valid,
        Err(issues) => {
            return (StatusCode::BAD_REQUEST, AxumJson(json!({ "error": issues })))
                .into_response()
        }
    };

    // A failed upload aborts the whole action; a failed AI call never does.
    let image_url = match storage::upload_donation_image(
        &state.storage,
        &user.id,
        &valid.image.file_name,
        &valid.image.content_type,
        valid.image.bytes,
    )
    .await
    {
        Ok(url) => url,
        Err(e) => {
            tracing::error!("Image upload failed: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Upload Error").into_response();
        }
    };

    let ai = ai::resolve_insights(
        &valid.title,
        valid.quantity as f64,
        valid.food_type.as_str(),
        &valid.pickup_deadline,
    )
    .await;

    let new = NewDonation {
        title: valid.title,
        quantity: valid.quantity,
        food_type: valid.food_type,
        pickup_deadline: valid.pickup_deadline,
        location: valid.location,
        image_url,
        donor_id: user.id.clone(),
        donor_name: user.name.clone(),
    };

    match db::add_donation(&state.db, &new, &ai).await {
        Ok(donation) => {
            let audit_id = Uuid::new_v4().to_string();
            let _ = db::log_audit(
                &state.db,
                &audit_id,
                &user.id,
                "create",
                &Some(donation.id.clone()),
                &Some(format!("Created donation '{}'", donation.title)),
            )
            .await;
            if let Err(e) = state.feed.publish(&state.db).await {
                tracing::warn!("Snapshot publish failed: {}", e);
            }
            (StatusCode::CREATED, AxumJson(donation)).into_response()
        }
        Err(e) => {
            tracing::error!("DB Error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response()
        }
    }
}

pub async fn list_donations(State(state): State<AppState>) -> impl IntoResponse {
    match db::list_donations(&state.db).await {
        Ok(donations) => AxumJson(json!({ "donations": donations })).into_response(),
        Err(e) => {
            tracing::error!("DB Query Error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response()
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub status: DonationStatus,
    pub accepted_by: Option<String>,
}

pub async fn update_status(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<StatusUpdateRequest>,
) -> impl IntoResponse {
    let actor = req.accepted_by.unwrap_or_else(|| user.name.clone());

    match db::transition_status(&state.db, &id, req.status, &actor).await {
        Ok(TransitionOutcome::Applied(donation)) => {
            let audit_id = Uuid::new_v4().to_string();
            let _ = db::log_audit(
                &state.db,
                &audit_id,
                &user.id,
                req.status.as_str(),
                &Some(id.clone()),
                &Some(format!("Status changed by '{}'", actor)),
            )
            .await;
            if let Err(e) = state.feed.publish(&state.db).await {
                tracing::warn!("Snapshot publish failed: {}", e);
            }
            (
                StatusCode::OK,
                AxumJson(json!({ "status": "updated", "donation": donation })),
            )
                .into_response()
        }
        Ok(TransitionOutcome::NotFound) => (StatusCode::NOT_FOUND, "Not found").into_response(),
        Ok(TransitionOutcome::Conflict(current)) => (
            StatusCode::CONFLICT,
            AxumJson(json!({
                "error": "invalid status transition",
                "currentStatus": current,
            })),
        )
            .into_response(),
        Ok(TransitionOutcome::NotAccepting) => (
            StatusCode::FORBIDDEN,
            "Only the accepting organization may mark a donation collected",
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Status update error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response()
        }
    }
}

/// Seeds two canned listings so a fresh account has something on the board.
pub async fn seed_demo_donations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> impl IntoResponse {
    let deadline = (chrono::Utc::now() + chrono::Duration::hours(2))
        .format("%Y-%m-%dT%H:%M")
        .to_string();
    let demo = [
        ("Paneer Biryani Trays", 20, FoodType::Veg, "Sector 18, Noida"),
        (
            "Mixed Buffet Leftovers",
            35,
            FoodType::NonVeg,
            "Koramangala, BLR",
        ),
    ];

    let mut seeded = 0usize;
    for (title, quantity, food_type, location) in demo {
        let new = NewDonation {
            title: title.to_string(),
            quantity,
            food_type,
            pickup_deadline: deadline.clone(),
            location: location.to_string(),
            image_url: DEMO_IMAGE_URL.to_string(),
            donor_id: user.id.clone(),
            donor_name: user.name.clone(),
        };
        let ai = AiInsights {
            safe_consumption_time: "Best before 3 hours".to_string(),
            urgency_level: match food_type {
                FoodType::NonVeg => UrgencyLevel::High,
                FoodType::Veg => UrgencyLevel::Medium,
            },
            storage_advice: "Keep covered and refrigerated if possible.".to_string(),
        };

        match db::add_donation(&state.db, &new, &ai).await {
            Ok(donation) => {
                seeded += 1;
                let audit_id = Uuid::new_v4().to_string();
                let _ = db::log_audit(
                    &state.db,
                    &audit_id,
                    &user.id,
                    "seed_demo",
                    &Some(donation.id),
                    &None,
                )
                .await;
            }
            Err(e) => {
                tracing::error!("Demo seed failed: {}", e);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response();
            }
        }
    }

    if let Err(e) = state.feed.publish(&state.db).await {
        tracing::warn!("Snapshot publish failed: {}", e);
    }
    (StatusCode::OK, AxumJson(json!({ "seeded": seeded }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_valid() -> RawSubmission {
        RawSubmission {
            title: Some("Paneer Biryani Trays".to_string()),
            quantity: Some("15".to_string()),
            pickup_deadline: Some("2024-01-01T10:00".to_string()),
            food_type: Some("veg".to_string()),
            location: Some("Sector 18, Noida".to_string()),
            image: Some(ImagePart {
                file_name: "tray.jpg".to_string(),
                content_type: "image/jpeg".to_string(),
                bytes: vec![0xff, 0xd8, 0xff],
            }),
        }
    }

    #[test]
    fn accepts_valid_submission_and_coerces_quantity() {
        let valid = validate_submission(raw_valid()).expect("should validate");
        assert_eq!(valid.quantity, 15);
        assert_eq!(valid.food_type, FoodType::Veg);
    }

    #[test]
    fn rejects_short_title_and_location() {
        let mut raw = raw_valid();
        raw.title = Some("ab".to_string());
        raw.location = Some("x".to_string());
        let issues = validate_submission(raw).unwrap_err();
        assert!(issues.contains_key("title"));
        assert!(issues.contains_key("location"));
    }

    #[test]
    fn rejects_non_positive_or_non_numeric_quantity() {
        for bad in ["0", "-3", "abc", "2.5"] {
            let mut raw = raw_valid();
            raw.quantity = Some(bad.to_string());
            let issues = validate_submission(raw).unwrap_err();
            assert!(issues.contains_key("quantity"), "quantity '{}' passed", bad);
        }
    }

    #[test]
    fn rejects_unknown_food_type_and_missing_image() {
        let mut raw = raw_valid();
        raw.food_type = Some("fried".to_string());
        raw.image = None;
        let issues = validate_submission(raw).unwrap_err();
        assert!(issues.contains_key("foodType"));
        assert!(issues.contains_key("image"));
    }

    #[test]
    fn rejects_non_image_upload() {
        let mut raw = raw_valid();
        raw.image = Some(ImagePart {
            file_name: "notes.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            bytes: vec![1, 2, 3],
        });
        let issues = validate_submission(raw).unwrap_err();
        assert!(issues.contains_key("image"));
    }
}
