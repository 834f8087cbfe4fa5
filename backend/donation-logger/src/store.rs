//! Durable queue store — the SQLite table of donations awaiting the ledger.
//!
//! The only mutations are [`append`] and [`remove`]; a queued row is never
//! updated. Each operation is a single statement, so SQLite makes it atomic
//! with respect to the others.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::errors::Result;
use crate::model::{NewDonation, PendingDonation};

/// Open (creating if needed) the SQLite queue and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    // A donation is only "saved" once it is on disk.
    let options = SqliteConnectOptions::from_str(&url)?
        .create_if_missing(true)
        .synchronous(SqliteSynchronous::Full);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

/// Persist a new donation and return its freshly assigned `local_id`.
pub async fn append(pool: &SqlitePool, donation: &NewDonation) -> Result<i64> {
    let local_id = sqlx::query(
        r#"
        INSERT INTO pending_donations
            (udi, amount, branch_code, team, fundraiser,
             volunteer_email, volunteer_name, submitted_at_ms)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&donation.udi)
    .bind(donation.amount)
    .bind(&donation.branch_code)
    .bind(donation.team)
    .bind(&donation.fundraiser)
    .bind(&donation.volunteer_email)
    .bind(&donation.volunteer_name)
    .bind(donation.submitted_at_ms)
    .execute(pool)
    .await?
    .last_insert_rowid();

    debug!(local_id, udi = %donation.udi, "Donation queued");
    Ok(local_id)
}

/// All pending donations, oldest first.
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<PendingDonation>> {
    let rows = sqlx::query_as::<_, PendingDonation>(
        r#"
        SELECT local_id, udi, amount, branch_code, team, fundraiser,
               volunteer_email, volunteer_name, submitted_at_ms
        FROM   pending_donations
        ORDER  BY local_id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Delete one pending donation.
///
/// Returns `false` when the row was already gone; that is not an error.
pub async fn remove(pool: &SqlitePool, local_id: i64) -> Result<bool> {
    let removed = sqlx::query("DELETE FROM pending_donations WHERE local_id = ?1")
        .bind(local_id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(removed > 0)
}

/// Whether `local_id` is still waiting for the ledger.
pub async fn contains(pool: &SqlitePool, local_id: i64) -> Result<bool> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT local_id FROM pending_donations WHERE local_id = ?1")
            .bind(local_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.is_some())
}

/// Number of donations still waiting for the ledger.
pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_donations")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Single-connection in-memory queue for tests.
#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

#[cfg(test)]
pub(crate) fn sample(udi: &str) -> NewDonation {
    NewDonation {
        udi: udi.to_string(),
        amount: 20.0,
        branch_code: "A".to_string(),
        team: Some(1),
        fundraiser: "Candle".to_string(),
        volunteer_email: "vol@example.org".to_string(),
        volunteer_name: Some("Sam".to_string()),
        submitted_at_ms: 1_709_800_000_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_then_list_in_insertion_order() {
        let pool = memory_pool().await;

        let a = append(&pool, &sample("A030724-01")).await.unwrap();
        let b = append(&pool, &sample("A030724-02")).await.unwrap();
        assert!(b > a);

        let rows = list_all(&pool).await.unwrap();
        let udis: Vec<_> = rows.iter().map(|r| r.udi.as_str()).collect();
        assert_eq!(udis, ["A030724-01", "A030724-02"]);
        assert_eq!(rows[0].local_id, a);
        assert_eq!(rows[0].team, Some(1));
        assert_eq!(rows[0].volunteer_name.as_deref(), Some("Sam"));
    }

    #[tokio::test]
    async fn team_survives_storage_as_stored() {
        let pool = memory_pool().await;
        let mut no_team = sample("A001");
        no_team.team = None;
        let mut team_three = sample("A030724-40");
        team_three.team = Some(3);
        append(&pool, &no_team).await.unwrap();
        append(&pool, &team_three).await.unwrap();

        let rows = list_all(&pool).await.unwrap();
        let teams: Vec<Option<u8>> = rows.iter().map(|r| r.team).collect();
        assert_eq!(teams, [None, Some(3)]);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let pool = memory_pool().await;
        let a = append(&pool, &sample("A030724-01")).await.unwrap();
        append(&pool, &sample("A030724-02")).await.unwrap();

        assert!(remove(&pool, a).await.unwrap());
        assert!(!contains(&pool, a).await.unwrap());
        let after_once = list_all(&pool).await.unwrap();

        assert!(!remove(&pool, a).await.unwrap());
        let after_twice = list_all(&pool).await.unwrap();

        assert_eq!(after_once, after_twice);
        assert_eq!(count(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn local_ids_are_not_reused() {
        let pool = memory_pool().await;
        let a = append(&pool, &sample("A030724-01")).await.unwrap();
        remove(&pool, a).await.unwrap();
        let b = append(&pool, &sample("A030724-01")).await.unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn non_positive_amount_is_refused_by_schema() {
        let pool = memory_pool().await;
        let mut bad = sample("A030724-03");
        bad.amount = 0.0;
        assert!(append(&pool, &bad).await.is_err());
        assert_eq!(count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn file_backed_queue_survives_reopen() {
        let path = std::env::temp_dir().join(format!(
            "donation-logger-store-{}.db",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let url = format!("sqlite:{}", path.display());

        let pool = init_pool(&url).await.unwrap();
        append(&pool, &sample("A030724-04")).await.unwrap();
        pool.close().await;

        let reopened = init_pool(&url).await.unwrap();
        let rows = list_all(&reopened).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].udi, "A030724-04");
        reopened.close().await;

        let _ = std::fs::remove_file(&path);
    }
}
