use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::db::{DatabaseError, LedgerStore};
use crate::utils::text::{format_thousands, title_case_name};

pub const PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub name: String,
    pub points: i64,
}

/// Ranked, paginated point totals over an optional time window.
pub struct Leaderboard {
    ledger: Arc<dyn LedgerStore>,
}

impl Leaderboard {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    pub async fn fetch_ranked_totals(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<LeaderboardEntry>, DatabaseError> {
        let mut totals = self.ledger.ranked_totals(since).await?;
        totals.sort_by(|a, b| b.points.cmp(&a.points));

        info!("leaderboard length is {}", totals.len());

        Ok(totals
            .into_iter()
            .enumerate()
            .map(|(index, total)| LeaderboardEntry {
                rank: index + 1,
                name: total.name,
                points: total.points,
            })
            .collect())
    }

    /// Points awarded in the last seven days.
    pub async fn weekly(&self) -> Result<Vec<LeaderboardEntry>, DatabaseError> {
        self.fetch_ranked_totals(Some(Utc::now() - Duration::days(7)))
            .await
    }

    /// All-time totals.
    pub async fn total(&self) -> Result<Vec<LeaderboardEntry>, DatabaseError> {
        self.fetch_ranked_totals(None).await
    }
}

/// Splits entries into display pages of `page_size`.
pub fn paginate(entries: Vec<LeaderboardEntry>, page_size: usize) -> Vec<Vec<LeaderboardEntry>> {
    entries
        .chunks(page_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Renders one page as display lines.
pub fn render_page(page: &[LeaderboardEntry]) -> String {
    let mut lines = Vec::with_capacity(page.len());
    for entry in page {
        lines.push(format!(
            "{}. {}: {} points",
            entry.rank,
            title_case_name(&entry.name),
            format_thousands(entry.points)
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use tempfile::NamedTempFile;

    use super::{Leaderboard, LeaderboardEntry, paginate, render_page};
    use crate::db::DatabaseManager;
    use crate::points::{RecipientDescriptor, TransactionEngine};

    async fn seeded() -> (Leaderboard, DatabaseManager, NamedTempFile) {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = DatabaseManager::from_path(file.path().to_string_lossy().to_string());
        manager.migrate().await.expect("migrate");

        let users = manager.user_store();
        users.create_user("alice", Some("1"), true).await.expect("alice");
        users.create_user("bob", Some("2"), true).await.expect("bob");
        users.create_user("abba-zaba", Some("3"), true).await.expect("abba-zaba");

        let engine = TransactionEngine::new(manager.user_store(), manager.ledger_store());
        for (recipient, amount) in [("bob", 30_i128), ("bob", 20), ("abba-zaba", 5)] {
            engine
                .attempt_transfer("1", &RecipientDescriptor::Name(recipient.to_string()), amount)
                .await
                .expect("transfer");
        }

        (Leaderboard::new(manager.ledger_store()), manager, file)
    }

    #[tokio::test]
    async fn totals_are_summed_ranked_and_sorted() {
        let (leaderboard, _manager, _file) = seeded().await;

        let entries = leaderboard.total().await.expect("totals");
        assert_eq!(
            entries,
            vec![
                LeaderboardEntry { rank: 1, name: "bob".to_string(), points: 50 },
                LeaderboardEntry { rank: 2, name: "abba-zaba".to_string(), points: 5 },
            ]
        );
    }

    #[tokio::test]
    async fn weekly_window_includes_fresh_entries() {
        let (leaderboard, _manager, _file) = seeded().await;

        let entries = leaderboard.weekly().await.expect("weekly totals");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "bob");
    }

    #[tokio::test]
    async fn deactivated_users_drop_off_the_board() {
        let (leaderboard, manager, _file) = seeded().await;

        manager
            .user_store()
            .deactivate_user("bob")
            .await
            .expect("deactivate");

        let entries = leaderboard.total().await.expect("totals");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "abba-zaba");
        assert_eq!(entries[0].rank, 1);
    }

    #[test]
    fn pagination_chunks_fixed_size_pages() {
        let entries: Vec<LeaderboardEntry> = (1..=25)
            .map(|rank| LeaderboardEntry {
                rank,
                name: format!("user{rank}"),
                points: 100 - rank as i64,
            })
            .collect();

        let pages = paginate(entries, 10);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].len(), 10);
        assert_eq!(pages[2].len(), 5);
        assert_eq!(pages[1][0].rank, 11);
    }

    #[test]
    fn page_rendering_title_cases_and_formats() {
        let page = vec![
            LeaderboardEntry { rank: 1, name: "abba-zaba".to_string(), points: 1_000 },
            LeaderboardEntry { rank: 2, name: "bob".to_string(), points: 5 },
        ];

        let rendered = render_page(&page);
        assert_eq!(rendered, "1. Abba-Zaba: 1,000 points\n2. Bob: 5 points");
    }
}
