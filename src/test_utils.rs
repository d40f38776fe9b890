#[cfg(test)]
pub mod test_helpers {
    use crate::db::{create_pool, run_migrations};
    use sqlx::SqlitePool;
    use tempfile::TempDir;

    /// Keeps password hashing fast in tests
    pub const TEST_ITERATIONS: u32 = 1_000;

    /// Temporary database with a `home` calendar already created.
    pub struct TestContext {
        pub pool: SqlitePool,
        pub _temp_dir: TempDir,
    }

    impl TestContext {
        pub async fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let db_path = temp_dir.path().join("taskcal.db");

            let pool = create_pool(&db_path).await.unwrap();
            run_migrations(&pool).await.unwrap();

            let ctx = Self {
                pool,
                _temp_dir: temp_dir,
            };
            ctx.add_calendar("home").await;
            ctx
        }

        pub fn pool(&self) -> &SqlitePool {
            &self.pool
        }

        pub fn data_dir(&self) -> &std::path::Path {
            self._temp_dir.path()
        }

        pub async fn add_calendar(&self, id: &str) {
            sqlx::query("INSERT OR IGNORE INTO calendars (id, name) VALUES (?, ?)")
                .bind(id)
                .bind(id)
                .execute(&self.pool)
                .await
                .unwrap();
        }
    }
}
