use tempfile::TempDir;
use zerowaste_connect::db::{
    self,
    models::{AiInsights, DonationStatus, FoodType, NewDonation, UrgencyLevel},
    TransitionOutcome,
};

fn new_donation(title: &str, quantity: i64) -> NewDonation {
    NewDonation {
        title: title.to_string(),
        quantity,
        food_type: FoodType::Veg,
        pickup_deadline: "2026-03-01T18:00".to_string(),
        location: "Sector 18, Noida".to_string(),
        image_url: "https://example.com/tray.jpg".to_string(),
        donor_id: "donor-1".to_string(),
        donor_name: "Donor".to_string(),
    }
}

fn insights() -> AiInsights {
    AiInsights {
        safe_consumption_time: "Consume within 4-6 hours".to_string(),
        urgency_level: UrgencyLevel::Medium,
        storage_advice: "Keep in insulated containers below 5°C until pickup.".to_string(),
    }
}

#[tokio::test]
async fn donation_lifecycle_flow() {
    let dir = TempDir::new().expect("tempdir");
    std::env::set_var("DATABASE_PATH", dir.path().join("test.db"));
    let pool = db::init_pool().await.expect("init pool");

    // Create two donations; status is forced to available and creation
    // time is server-assigned.
    let first = db::add_donation(&pool, &new_donation("Paneer Biryani Trays", 20), &insights())
        .await
        .expect("add first");
    let second = db::add_donation(&pool, &new_donation("Mixed Buffet Leftovers", 35), &insights())
        .await
        .expect("add second");

    assert_eq!(first.status, DonationStatus::Available);
    assert!(first.created_at.is_some());

    // Newest first.
    let listed = db::list_donations(&pool).await.expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second.id);
    assert_eq!(listed[1].id, first.id);

    // Skipping straight to collected is rejected before commit.
    let skipped = db::transition_status(&pool, &first.id, DonationStatus::Collected, "Food Bank")
        .await
        .expect("transition");
    assert_eq!(skipped, TransitionOutcome::Conflict(DonationStatus::Available));

    // Accept records the accepting organization.
    let accepted = db::transition_status(&pool, &first.id, DonationStatus::Accepted, "Food Bank")
        .await
        .expect("transition");
    match &accepted {
        TransitionOutcome::Applied(d) => {
            assert_eq!(d.status, DonationStatus::Accepted);
            assert_eq!(d.accepted_by.as_deref(), Some("Food Bank"));
        }
        other => panic!("expected Applied, got {:?}", other),
    }

    // A second organization racing to accept loses with a conflict.
    let raced = db::transition_status(&pool, &first.id, DonationStatus::Accepted, "Shelter Trust")
        .await
        .expect("transition");
    assert_eq!(raced, TransitionOutcome::Conflict(DonationStatus::Accepted));

    // Only the accepting organization may collect.
    let wrong_org =
        db::transition_status(&pool, &first.id, DonationStatus::Collected, "Shelter Trust")
            .await
            .expect("transition");
    assert_eq!(wrong_org, TransitionOutcome::NotAccepting);

    let collected = db::transition_status(&pool, &first.id, DonationStatus::Collected, "Food Bank")
        .await
        .expect("transition");
    match &collected {
        TransitionOutcome::Applied(d) => assert_eq!(d.status, DonationStatus::Collected),
        other => panic!("expected Applied, got {:?}", other),
    }

    // Collected is terminal: no move back to available or accepted.
    for target in [DonationStatus::Available, DonationStatus::Accepted] {
        let reversed = db::transition_status(&pool, &first.id, target, "Food Bank")
            .await
            .expect("transition");
        assert_eq!(reversed, TransitionOutcome::Conflict(DonationStatus::Collected));
    }

    // Unknown ids are reported, not invented.
    let missing = db::transition_status(&pool, "no-such-id", DonationStatus::Accepted, "Food Bank")
        .await
        .expect("transition");
    assert_eq!(missing, TransitionOutcome::NotFound);

    // Audit trail is written and retrievable.
    db::log_audit(
        &pool,
        "audit-1",
        "donor-1",
        "create",
        &Some(first.id.clone()),
        &Some("Created donation".to_string()),
    )
    .await
    .expect("log audit");
    let logs = db::list_audit_logs(&pool, "donor-1", None).await.expect("list audit");
    assert!(!logs.is_empty());
}
