use rusqlite::{params, Connection};

use crate::grading::{BucketStats, PerformanceStats};

/// Per-cycle performance snapshots. One row per bucket per cycle, so hit
/// rates and ROI can be charted over time without replaying the logs.
pub struct StatsStore {
    conn: Connection,
}

impl StatsStore {
    pub fn new(path: &str) -> Result<Self, rusqlite::Error> {
        Ok(Self { conn: Connection::open(path)? })
    }

    pub fn init(&mut self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS grading_cycles (
                ts INTEGER NOT NULL,
                bucket_kind TEXT NOT NULL,
                bucket TEXT NOT NULL,
                picks INTEGER NOT NULL,
                wins INTEGER NOT NULL,
                losses INTEGER NOT NULL,
                pushes INTEGER NOT NULL,
                roi_units REAL NOT NULL,
                hit_rate REAL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn persist_cycle(&self, ts: u64, stats: &PerformanceStats) -> Result<(), rusqlite::Error> {
        let tx = self.conn.unchecked_transaction()?;
        Self::insert_bucket(&tx, ts, "overall", "overall", &stats.overall)?;
        Self::insert_bucket(&tx, ts, "confluence", "strong_or_better", &stats.high_confluence)?;
        for (tier, bucket) in &stats.by_tier {
            Self::insert_bucket(&tx, ts, "tier", tier, bucket)?;
        }
        for (sport, bucket) in &stats.by_sport {
            Self::insert_bucket(&tx, ts, "sport", sport, bucket)?;
        }
        for (engine, bucket) in &stats.by_engine {
            Self::insert_bucket(&tx, ts, "engine", engine, bucket)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_bucket(
        tx: &rusqlite::Transaction<'_>,
        ts: u64,
        kind: &str,
        bucket: &str,
        stats: &BucketStats,
    ) -> Result<(), rusqlite::Error> {
        tx.execute(
            "INSERT INTO grading_cycles
                (ts, bucket_kind, bucket, picks, wins, losses, pushes, roi_units, hit_rate)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                ts as i64,
                kind,
                bucket,
                stats.picks as i64,
                stats.wins as i64,
                stats.losses as i64,
                stats.pushes as i64,
                stats.roi_units,
                stats.hit_rate(),
            ],
        )?;
        Ok(())
    }

    pub fn cycle_count(&self) -> Result<i64, rusqlite::Error> {
        self.conn.query_row(
            "SELECT COUNT(DISTINCT ts) FROM grading_cycles",
            [],
            |row| row.get(0),
        )
    }
}
