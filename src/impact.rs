use chrono::NaiveDate;
use serde::Serialize;

use crate::db::models::Donation;

/// Rough kg of CO2 avoided per redistributed meal.
const CO2_KG_PER_MEAL: f64 = 1.8;

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImpactSummary {
    pub meals: i64,
    pub donations_today: usize,
    pub co2_kg: f64,
}

/// Recomputed over the full list on every snapshot. Fine while the
/// collection stays small; pagination is out of scope.
pub fn summarize(donations: &[Donation], today: NaiveDate) -> ImpactSummary {
    let meals: i64 = donations.iter().map(|d| d.quantity.max(0)).sum();
    let donations_today = donations
        .iter()
        .filter(|d| {
            d.created_at
                .map(|ts| ts.date_naive() == today)
                .unwrap_or(false)
        })
        .count();

    ImpactSummary {
        meals,
        donations_today,
        co2_kg: (meals as f64 * CO2_KG_PER_MEAL * 10.0).round() / 10.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{AiInsights, DonationStatus, FoodType, UrgencyLevel};
    use chrono::{TimeZone, Utc};

    fn donation(quantity: i64, created_at: Option<chrono::DateTime<Utc>>) -> Donation {
        Donation {
            id: format!("d-{}", quantity),
            title: "Leftover trays".to_string(),
            quantity,
            food_type: FoodType::Veg,
            pickup_deadline: "2024-01-01T10:00".to_string(),
            location: "Sector 18, Noida".to_string(),
            image_url: "https://example.com/img.jpg".to_string(),
            status: DonationStatus::Available,
            donor_id: "donor-1".to_string(),
            donor_name: "Donor".to_string(),
            accepted_by: None,
            created_at,
            ai: AiInsights {
                safe_consumption_time: "Consume within 4-6 hours".to_string(),
                urgency_level: UrgencyLevel::Medium,
                storage_advice: "Keep chilled".to_string(),
            },
        }
    }

    #[test]
    fn sums_meals_and_co2() {
        let now = Utc::now();
        let list = vec![donation(20, Some(now)), donation(35, Some(now))];
        let summary = summarize(&list, now.date_naive());
        assert_eq!(summary.meals, 55);
        assert_eq!(summary.co2_kg, 99.0);
    }

    #[test]
    fn counts_only_today() {
        let today = Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap();
        let yesterday = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 0).unwrap();
        let list = vec![
            donation(10, Some(today)),
            donation(12, Some(yesterday)),
            donation(7, None),
        ];
        let summary = summarize(&list, today.date_naive());
        assert_eq!(summary.donations_today, 1);
        assert_eq!(summary.meals, 29);
    }

    #[test]
    fn empty_list_is_zero() {
        let summary = summarize(&[], Utc::now().date_naive());
        assert_eq!(summary.meals, 0);
        assert_eq!(summary.donations_today, 0);
        assert_eq!(summary.co2_kg, 0.0);
    }
}
