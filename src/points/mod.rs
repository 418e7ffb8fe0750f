use std::sync::Arc;

use tracing::{info, warn};

use crate::db::{DatabaseError, LedgerStore, UserStore};
use crate::utils::text::format_thousands;

pub mod admin;
pub mod leaderboard;

/// Reserved recipient keyword that fans a transfer out to every eligible
/// user.
pub const EVERYONE_KEYWORD: &str = "everyone";

/// How the caller identified the recipient, after reply resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientDescriptor {
    Name(String),
    Snowflake(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Committed {
        bestower: String,
        /// Recipient display name, or the broadcast keyword.
        recipient: String,
        points: i64,
        rows: usize,
    },
    BestowerNotRegistered,
    BestowerInactive,
    BestowerNotAuthorized,
    RecipientNotFound,
    RecipientInactive,
    ExcessiveAmount,
    SelfTransferViolation {
        bestower: String,
        points: i64,
    },
}

impl TransferOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, TransferOutcome::Committed { .. })
    }
}

/// Validates and commits point transfers. Every accepted transfer becomes
/// exactly one ledger row, or exactly one row per eligible recipient in
/// broadcast mode; rejections write nothing.
pub struct TransactionEngine {
    users: Arc<dyn UserStore>,
    ledger: Arc<dyn LedgerStore>,
}

impl TransactionEngine {
    pub fn new(users: Arc<dyn UserStore>, ledger: Arc<dyn LedgerStore>) -> Self {
        Self { users, ledger }
    }

    pub async fn attempt_transfer(
        &self,
        bestower_snowflake: &str,
        recipient: &RecipientDescriptor,
        amount: i128,
    ) -> Result<TransferOutcome, DatabaseError> {
        let Some(bestower) = self.users.get_by_snowflake(bestower_snowflake).await? else {
            info!(
                "user with snowflake '{}' tried to bestow points but isn't registered",
                bestower_snowflake
            );
            return Ok(TransferOutcome::BestowerNotRegistered);
        };

        if !bestower.is_active {
            warn!(
                "user '{}' with snowflake '{}' tried to bestow points but is currently inactive",
                bestower.name, bestower_snowflake
            );
            return Ok(TransferOutcome::BestowerInactive);
        }

        if !bestower.point_giver {
            info!(
                "user '{}' with snowflake '{}' tried to bestow points but isn't a point giver",
                bestower.name, bestower_snowflake
            );
            return Ok(TransferOutcome::BestowerNotAuthorized);
        }

        let broadcast = matches!(
            recipient,
            RecipientDescriptor::Name(name) if name.eq_ignore_ascii_case(EVERYONE_KEYWORD)
        );

        let resolved = if broadcast {
            None
        } else {
            let found = match recipient {
                RecipientDescriptor::Name(name) => {
                    self.users.get_by_name(&name.to_lowercase()).await?
                }
                RecipientDescriptor::Snowflake(snowflake) => {
                    self.users.get_by_snowflake(snowflake).await?
                }
            };

            let Some(user) = found else {
                info!(
                    "{} tried to bestow points to {:?} but they weren't in the user table",
                    bestower.name, recipient
                );
                return Ok(TransferOutcome::RecipientNotFound);
            };

            if !user.is_active {
                info!(
                    "{} tried to bestow points to '{}' but they were inactive",
                    bestower.name, user.name
                );
                return Ok(TransferOutcome::RecipientInactive);
            }

            Some(user)
        };

        let Ok(points) = i64::try_from(amount) else {
            info!(
                "{} tried to give {} more points than the ledger can hold",
                bestower.name,
                resolved
                    .as_ref()
                    .map(|u| u.name.as_str())
                    .unwrap_or(EVERYONE_KEYWORD)
            );
            return Ok(TransferOutcome::ExcessiveAmount);
        };

        if let Some(user) = &resolved {
            if user.id == bestower.id {
                info!(
                    "{} attempted to give themselves {} points. Very naughty.",
                    bestower.name,
                    format_thousands(points)
                );
                return Ok(TransferOutcome::SelfTransferViolation {
                    bestower: bestower.name,
                    points,
                });
            }
        }

        let (recipient_label, rows) = match &resolved {
            Some(user) => {
                self.ledger
                    .insert_transfer(&bestower.id, &user.id, points)
                    .await?;
                info!("added point transaction to ledger");
                (user.name.clone(), 1)
            }
            None => {
                let rows = self
                    .ledger
                    .insert_broadcast_transfer(&bestower.id, points)
                    .await?;
                info!("added {} point transactions to ledger", rows);
                (EVERYONE_KEYWORD.to_string(), rows)
            }
        };

        info!(
            "{} awarded {} point(s) to {}",
            bestower.name,
            format_thousands(points),
            recipient_label
        );

        Ok(TransferOutcome::Committed {
            bestower: bestower.name,
            recipient: recipient_label,
            points,
            rows,
        })
    }
}
