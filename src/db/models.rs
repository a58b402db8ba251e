use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    Available,
    Accepted,
    Collected,
}

impl DonationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonationStatus::Available => "available",
            DonationStatus::Accepted => "accepted",
            DonationStatus::Collected => "collected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "available" => Some(DonationStatus::Available),
            "accepted" => Some(DonationStatus::Accepted),
            "collected" => Some(DonationStatus::Collected),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoodType {
    #[serde(rename = "veg")]
    Veg,
    #[serde(rename = "non-veg")]
    NonVeg,
}

impl FoodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FoodType::Veg => "veg",
            FoodType::NonVeg => "non-veg",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "veg" => Some(FoodType::Veg),
            "non-veg" => Some(FoodType::NonVeg),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
}

impl UrgencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Low => "LOW",
            UrgencyLevel::Medium => "MEDIUM",
            UrgencyLevel::High => "HIGH",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "LOW" => Some(UrgencyLevel::Low),
            "MEDIUM" => Some(UrgencyLevel::Medium),
            "HIGH" => Some(UrgencyLevel::High),
            _ => None,
        }
    }
}

/// Safety annotation attached to every donation at creation, immutable after.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AiInsights {
    pub safe_consumption_time: String,
    pub urgency_level: UrgencyLevel,
    pub storage_advice: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: String,
    pub title: String,
    pub quantity: i64,
    pub food_type: FoodType,
    pub pickup_deadline: String,
    pub location: String,
    pub image_url: String,
    pub status: DonationStatus,
    pub donor_id: String,
    pub donor_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub ai: AiInsights,
}

/// A validated submission, before the persistence layer assigns id, status
/// and creation time.
#[derive(Debug, Clone)]
pub struct NewDonation {
    pub title: String,
    pub quantity: i64,
    pub food_type: FoodType,
    pub pickup_deadline: String,
    pub location: String,
    pub image_url: String,
    pub donor_id: String,
    pub donor_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuditLog {
    pub id: String,
    pub user_id: String,
    pub action: String,
    pub record_id: Option<String>,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}
