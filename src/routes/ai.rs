use axum::{
    extract::Json,
    http::StatusCode,
    response::{IntoResponse, Json as AxumJson},
};
use serde::Deserialize;
use serde_json::json;
use std::env;
use validator::{Validate, ValidationError};

use crate::db::models::{AiInsights, FoodType, UrgencyLevel};
use crate::routes::flatten_field_errors;

const GEMMA_DEFAULT_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemma-2-9b-it:generateContent";

/// The fixed safe default returned whenever the external model is
/// unconfigured or fails.
pub fn fallback_insights() -> AiInsights {
    AiInsights {
        safe_consumption_time: "Consume within 4-6 hours".to_string(),
        urgency_level: UrgencyLevel::Medium,
        storage_advice: "Keep in insulated containers below 5°C until pickup.".to_string(),
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[validate(required(message = "title is required"))]
    pub title: Option<String>,
    #[validate(required(message = "quantity must be a number"))]
    pub quantity: Option<f64>,
    #[validate(
        required(message = "foodType is required"),
        custom = "validate_food_type"
    )]
    pub food_type: Option<String>,
    #[validate(required(message = "pickupDeadline is required"))]
    pub pickup_deadline: Option<String>,
}

fn validate_food_type(value: &str) -> Result<(), ValidationError> {
    if FoodType::parse(value).is_some() {
        return Ok(());
    }
    let mut err = ValidationError::new("food_type");
    err.message = Some("foodType must be 'veg' or 'non-veg'".into());
    Err(err)
}

/// What the model is asked to return. Each field is optional so a partially
/// well-formed reply still contributes what it has.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ParsedInsights {
    safe_consumption_time: Option<String>,
    urgency_level: Option<String>,
    storage_advice: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: String,
}

/// One field at a time: a recognized model value wins, anything missing or
/// malformed takes the fallback value for that field. Urgency is normalized
/// to the three-level enum so free text never leaks into stored records.
fn merge_insights(parsed: ParsedInsights, fallback: AiInsights) -> AiInsights {
    AiInsights {
        safe_consumption_time: parsed
            .safe_consumption_time
            .unwrap_or(fallback.safe_consumption_time),
        urgency_level: parsed
            .urgency_level
            .as_deref()
            .and_then(UrgencyLevel::parse)
            .unwrap_or(fallback.urgency_level),
        storage_advice: parsed.storage_advice.unwrap_or(fallback.storage_advice),
    }
}

async fn call_generative_api(
    api_key: &str,
    url: &str,
    prompt: &str,
) -> anyhow::Result<ParsedInsights> {
    let client = reqwest::Client::new();
    let resp = client
        .post(url)
        .header("x-goog-api-key", api_key)
        .json(&json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.2 }
        }))
        .send()
        .await?;

    let body: GenerateContentResponse = resp.json().await?;
    let text = body
        .candidates
        .first()
        .and_then(|c| c.content.parts.first())
        .map(|p| p.text.as_str())
        .ok_or_else(|| anyhow::anyhow!("model response contained no candidate text"))?;

    Ok(serde_json::from_str(text)?)
}

/// Annotates a submission. Without GEMMA_API_KEY this is a pure local
/// default; with it, a single one-shot model call whose failure of any kind
/// degrades to the same default. Never errors.
pub async fn resolve_insights(
    title: &str,
    quantity: f64,
    food_type: &str,
    pickup_deadline: &str,
) -> AiInsights {
    let fallback = fallback_insights();

    let api_key = match env::var("GEMMA_API_KEY") {
        Ok(key) if !key.is_empty() => key,
        _ => return fallback,
    };
    let url = env::var("GEMMA_API_URL").unwrap_or_else(|_| GEMMA_DEFAULT_URL.to_string());

    let data = json!({
        "title": title,
        "quantity": quantity,
        "foodType": food_type,
        "pickupDeadline": pickup_deadline,
    });
    let prompt = format!(
        "You are a food safety assistant. Return ONLY JSON with keys safeConsumptionTime, \
         urgencyLevel(LOW|MEDIUM|HIGH), storageAdvice. Data: {}",
        data
    );

    match call_generative_api(&api_key, &url, &prompt).await {
        Ok(parsed) => merge_insights(parsed, fallback),
        Err(e) => {
            tracing::warn!("AI annotation failed, using fallback: {}", e);
            fallback
        }
    }
}

pub async fn analyze(Json(req): Json<AnalyzeRequest>) -> impl IntoResponse {
    if let Err(errors) = req.validate() {
        return (
            StatusCode::BAD_REQUEST,
            AxumJson(json!({ "error": flatten_field_errors(&errors) })),
        )
            .into_response();
    }

    let insights = resolve_insights(
        req.title.as_deref().unwrap_or_default(),
        req.quantity.unwrap_or_default(),
        req.food_type.as_deref().unwrap_or_default(),
        req.pickup_deadline.as_deref().unwrap_or_default(),
    )
    .await;

    AxumJson(insights).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    fn valid_request() -> AnalyzeRequest {
        AnalyzeRequest {
            title: Some("Rice".to_string()),
            quantity: Some(10.0),
            food_type: Some("veg".to_string()),
            pickup_deadline: Some("2024-01-01T10:00".to_string()),
        }
    }

    #[tokio::test]
    async fn returns_fallback_without_credential() {
        std::env::remove_var("GEMMA_API_KEY");

        let resp = analyze(Json(valid_request())).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "safeConsumptionTime": "Consume within 4-6 hours",
                "urgencyLevel": "MEDIUM",
                "storageAdvice": "Keep in insulated containers below 5°C until pickup."
            })
        );
    }

    #[tokio::test]
    async fn rejects_missing_fields_without_calling_model() {
        let req = AnalyzeRequest {
            title: None,
            quantity: None,
            food_type: Some("fried".to_string()),
            pickup_deadline: None,
        };

        let resp = analyze(Json(req)).await.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        let error = body.get("error").expect("error object");
        assert!(error.get("title").is_some());
        assert!(error.get("quantity").is_some());
        assert!(error.get("foodType").is_some());
        assert!(error.get("pickupDeadline").is_some());
    }

    #[tokio::test]
    async fn unreachable_model_is_an_error() {
        let err = call_generative_api("key", "http://127.0.0.1:9/generate", "prompt").await;
        assert!(err.is_err());
    }

    #[test]
    fn merge_prefers_model_fields() {
        let parsed = ParsedInsights {
            safe_consumption_time: Some("Within 2 hours".to_string()),
            urgency_level: Some("high".to_string()),
            storage_advice: None,
        };
        let merged = merge_insights(parsed, fallback_insights());
        assert_eq!(merged.safe_consumption_time, "Within 2 hours");
        assert_eq!(merged.urgency_level, UrgencyLevel::High);
        assert_eq!(
            merged.storage_advice,
            "Keep in insulated containers below 5°C until pickup."
        );
    }

    #[test]
    fn merge_normalizes_unknown_urgency() {
        let parsed = ParsedInsights {
            safe_consumption_time: None,
            urgency_level: Some("CRITICAL".to_string()),
            storage_advice: Some("Freeze it".to_string()),
        };
        let merged = merge_insights(parsed, fallback_insights());
        assert_eq!(merged.urgency_level, UrgencyLevel::Medium);
        assert_eq!(merged.storage_advice, "Freeze it");
    }

    #[test]
    fn non_json_candidate_text_fails_parsing() {
        let parsed: Result<ParsedInsights, _> = serde_json::from_str("Sure! Here you go:");
        assert!(parsed.is_err());
    }
}
