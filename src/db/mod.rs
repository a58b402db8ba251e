use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use std::env;

pub mod models;

use models::{AiInsights, AuditLog, Donation, DonationStatus, FoodType, NewDonation};

pub type DbPool = Pool<SqliteConnectionManager>;

pub async fn init_pool() -> anyhow::Result<DbPool> {
    let path = env::var("DATABASE_PATH").unwrap_or_else(|_| "data/zerowaste.db".to_string());
    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let manager = SqliteConnectionManager::file(&path).with_init(|conn| {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    });

    let pool = Pool::builder()
        .max_size(8)
        .connection_timeout(std::time::Duration::from_secs(30))
        .build(manager)
        .map_err(|e| anyhow::anyhow!("Failed to create DB pool: {}", e))?;

    ensure_schema(&pool)?;
    Ok(pool)
}

fn ensure_schema(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS donations (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            food_type TEXT NOT NULL,
            pickup_deadline TEXT NOT NULL,
            location TEXT NOT NULL,
            image_url TEXT NOT NULL,
            status TEXT NOT NULL,
            donor_id TEXT NOT NULL,
            donor_name TEXT NOT NULL,
            accepted_by TEXT,
            ai_safe_consumption_time TEXT NOT NULL,
            ai_urgency TEXT NOT NULL,
            ai_storage_advice TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_donations_created_at
            ON donations (created_at DESC);
        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            action TEXT NOT NULL,
            record_id TEXT,
            details TEXT,
            created_at TEXT NOT NULL
        );",
    )?;
    Ok(())
}

const DONATION_COLUMNS: &str = "id, title, quantity, food_type, pickup_deadline, location, image_url, \
     status, donor_id, donor_name, accepted_by, ai_safe_consumption_time, \
     ai_urgency, ai_storage_advice, created_at";

fn column_err(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

fn row_to_donation(row: &Row<'_>) -> rusqlite::Result<Donation> {
    let status_raw: String = row.get(7)?;
    let status = DonationStatus::parse(&status_raw)
        .ok_or_else(|| column_err(7, format!("unknown donation status '{}'", status_raw)))?;

    let food_raw: String = row.get(3)?;
    let food_type = FoodType::parse(&food_raw)
        .ok_or_else(|| column_err(3, format!("unknown food type '{}'", food_raw)))?;

    let urgency_raw: String = row.get(12)?;
    let urgency = models::UrgencyLevel::parse(&urgency_raw)
        .ok_or_else(|| column_err(12, format!("unknown urgency '{}'", urgency_raw)))?;

    let created_raw: String = row.get(14)?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| column_err(14, format!("bad created_at '{}': {}", created_raw, e)))?;

    Ok(Donation {
        id: row.get(0)?,
        title: row.get(1)?,
        quantity: row.get(2)?,
        food_type,
        pickup_deadline: row.get(4)?,
        location: row.get(5)?,
        image_url: row.get(6)?,
        status,
        donor_id: row.get(8)?,
        donor_name: row.get(9)?,
        accepted_by: row.get(10)?,
        ai: AiInsights {
            safe_consumption_time: row.get(11)?,
            urgency_level: urgency,
            storage_advice: row.get(13)?,
        },
        created_at: Some(created_at),
    })
}

/// Inserts a new record. Status is forced to `available` and id/creation
/// time are assigned here, whatever the caller supplied upstream.
pub async fn add_donation(
    pool: &DbPool,
    new: &NewDonation,
    ai: &AiInsights,
) -> anyhow::Result<Donation> {
    let conn = pool.get()?;
    let id = Uuid::new_v4().to_string();
    let created_at = Utc::now();

    conn.execute(
        "INSERT INTO donations (id, title, quantity, food_type, pickup_deadline, location, \
         image_url, status, donor_id, donor_name, accepted_by, ai_safe_consumption_time, \
         ai_urgency, ai_storage_advice, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'available', ?8, ?9, NULL, ?10, ?11, ?12, ?13)",
        params![
            id,
            new.title,
            new.quantity,
            new.food_type.as_str(),
            new.pickup_deadline,
            new.location,
            new.image_url,
            new.donor_id,
            new.donor_name,
            ai.safe_consumption_time,
            ai.urgency_level.as_str(),
            ai.storage_advice,
            created_at.to_rfc3339(),
        ],
    )?;

    Ok(Donation {
        id,
        title: new.title.clone(),
        quantity: new.quantity,
        food_type: new.food_type,
        pickup_deadline: new.pickup_deadline.clone(),
        location: new.location.clone(),
        image_url: new.image_url.clone(),
        status: DonationStatus::Available,
        donor_id: new.donor_id.clone(),
        donor_name: new.donor_name.clone(),
        accepted_by: None,
        created_at: Some(created_at),
        ai: ai.clone(),
    })
}

/// Full collection, newest first. Ties on created_at fall back to id so the
/// ordering every subscriber sees is deterministic.
pub async fn list_donations(pool: &DbPool) -> anyhow::Result<Vec<Donation>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM donations ORDER BY created_at DESC, id DESC",
        DONATION_COLUMNS
    ))?;
    let rows = stmt.query_map([], row_to_donation)?;
    let mut donations = Vec::new();
    for row in rows {
        donations.push(row?);
    }
    Ok(donations)
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The transition committed; holds the updated record.
    Applied(Box<Donation>),
    NotFound,
    /// The target is not reachable from the donation's current status.
    Conflict(DonationStatus),
    /// Collection attempted by someone other than the accepting organization.
    NotAccepting,
}

/// Status patch with the transition table checked inside a transaction.
/// Only available -> accepted -> collected moves commit; accepting records
/// the actor, collecting requires the same actor. Two organizations racing
/// to accept are arbitrated by the conditional UPDATE: the loser sees a
/// Conflict with the winner's status.
pub async fn transition_status(
    pool: &DbPool,
    id: &str,
    target: DonationStatus,
    actor: &str,
) -> anyhow::Result<TransitionOutcome> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;

    let current: Option<(String, Option<String>)> = tx
        .query_row(
            "SELECT status, accepted_by FROM donations WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let (status_raw, accepted_by) = match current {
        Some(pair) => pair,
        None => return Ok(TransitionOutcome::NotFound),
    };
    let current = DonationStatus::parse(&status_raw)
        .ok_or_else(|| anyhow::anyhow!("donation {} has unknown status '{}'", id, status_raw))?;

    let updated = match (current, target) {
        (DonationStatus::Available, DonationStatus::Accepted) => tx.execute(
            "UPDATE donations SET status = 'accepted', accepted_by = ?1 \
             WHERE id = ?2 AND status = 'available'",
            params![actor, id],
        )?,
        (DonationStatus::Accepted, DonationStatus::Collected) => {
            if accepted_by.as_deref() != Some(actor) {
                return Ok(TransitionOutcome::NotAccepting);
            }
            tx.execute(
                "UPDATE donations SET status = 'collected' \
                 WHERE id = ?1 AND status = 'accepted' AND accepted_by = ?2",
                params![id, actor],
            )?
        }
        _ => return Ok(TransitionOutcome::Conflict(current)),
    };

    if updated == 0 {
        return Ok(TransitionOutcome::Conflict(current));
    }

    let donation = tx.query_row(
        &format!("SELECT {} FROM donations WHERE id = ?1", DONATION_COLUMNS),
        params![id],
        row_to_donation,
    )?;
    tx.commit()?;

    Ok(TransitionOutcome::Applied(Box::new(donation)))
}

pub async fn log_audit(
    pool: &DbPool,
    id: &str,
    user_id: &str,
    action: &str,
    record_id: &Option<String>,
    details: &Option<String>,
) -> anyhow::Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO audit_logs (id, user_id, action, record_id, details, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, user_id, action, record_id, details, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

pub async fn list_audit_logs(
    pool: &DbPool,
    user_id: &str,
    limit: Option<i64>,
) -> anyhow::Result<Vec<AuditLog>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, user_id, action, record_id, details, created_at FROM audit_logs \
         WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id, limit.unwrap_or(100)], |row| {
        let created_raw: String = row.get(5)?;
        let created_at = DateTime::parse_from_rfc3339(&created_raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| column_err(5, format!("bad created_at '{}': {}", created_raw, e)))?;
        Ok(AuditLog {
            id: row.get(0)?,
            user_id: row.get(1)?,
            action: row.get(2)?,
            record_id: row.get(3)?,
            details: row.get(4)?,
            created_at,
        })
    })?;
    let mut logs = Vec::new();
    for row in rows {
        logs.push(row?);
    }
    Ok(logs)
}
