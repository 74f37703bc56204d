use sqlx::SqlitePool;

use crate::quota::GuestWindow;

/// Current window for `ip` at `now`, without persisting any reset.
pub(crate) async fn window(
    pool: &SqlitePool,
    ip: &str,
    now: i64,
) -> Result<GuestWindow, sqlx::Error> {
    let row: Option<(i64, i64)> =
        sqlx::query_as("SELECT count, last_reset FROM visitors WHERE ip = ?")
            .bind(ip)
            .fetch_optional(pool)
            .await?;

    Ok(match row {
        Some((count, last_reset)) => GuestWindow { count, last_reset }.at(now),
        None => GuestWindow::fresh(now),
    })
}

/// Records one conversion for `ip` and returns the updated window.
pub(crate) async fn charge(
    pool: &SqlitePool,
    ip: &str,
    now: i64,
) -> Result<GuestWindow, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let row: Option<(i64, i64)> =
        sqlx::query_as("SELECT count, last_reset FROM visitors WHERE ip = ?")
            .bind(ip)
            .fetch_optional(&mut *tx)
            .await?;
    let current = match row {
        Some((count, last_reset)) => GuestWindow { count, last_reset },
        None => GuestWindow::fresh(now),
    };
    let next = current.charged(now);

    sqlx::query(
        r#"
        INSERT INTO visitors (ip, count, last_reset) VALUES (?, ?, ?)
        ON CONFLICT(ip) DO UPDATE SET count = excluded.count, last_reset = excluded.last_reset
        "#,
    )
    .bind(ip)
    .bind(next.count)
    .bind(next.last_reset)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::QUOTA_WINDOW_SECS;
    use crate::db::connect_in_memory;

    const T0: i64 = 1_700_000_000;

    #[tokio::test]
    async fn unknown_ip_has_fresh_window() {
        let pool = connect_in_memory().await;
        let w = window(&pool, "198.51.100.1", T0).await.unwrap();
        assert_eq!(w.count, 0);
        assert_eq!(w.remaining(10), 10);
    }

    #[tokio::test]
    async fn charges_accumulate_per_ip() {
        let pool = connect_in_memory().await;
        charge(&pool, "198.51.100.1", T0).await.unwrap();
        charge(&pool, "198.51.100.1", T0 + 5).await.unwrap();
        charge(&pool, "198.51.100.2", T0 + 5).await.unwrap();

        assert_eq!(window(&pool, "198.51.100.1", T0 + 6).await.unwrap().count, 2);
        assert_eq!(window(&pool, "198.51.100.2", T0 + 6).await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn stale_window_reads_as_reset_and_charges_from_one() {
        let pool = connect_in_memory().await;
        for i in 0..10 {
            charge(&pool, "ip", T0 + i).await.unwrap();
        }
        assert!(window(&pool, "ip", T0 + 60).await.unwrap().is_exhausted(10));

        let later = T0 + QUOTA_WINDOW_SECS + 100;
        assert_eq!(window(&pool, "ip", later).await.unwrap().count, 0);

        let charged = charge(&pool, "ip", later).await.unwrap();
        assert_eq!(charged.count, 1);
        assert_eq!(charged.last_reset, later);
    }
}
