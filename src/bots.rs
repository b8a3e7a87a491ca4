//! Bot profiles: the directory resolving a bot id to its vector table and
//! per-bot model overrides.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotProfile {
    pub bot_id: String,
    pub bot_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_desc: Option<String>,
    /// Answer-composition model override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_model: Option<String>,
    /// Standing instruction injected into retrieval answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    pub vector_table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Read seam the orchestrator depends on, so it is testable without a live
/// database.
#[async_trait]
pub trait BotDirectory: Send + Sync {
    async fn get(&self, bot_id: &str) -> Result<Option<BotProfile>, ApiError>;
}

/// Derive a safe per-bot vector table name from the bot id.
pub fn vector_table_for(bot_id: &str) -> String {
    let sanitized: String = bot_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("kb_{sanitized}")
}

pub struct BotStore {
    pool: SqlitePool,
}

impl BotStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, ApiError> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS bots (
                bot_id TEXT PRIMARY KEY,
                bot_name TEXT NOT NULL,
                bot_desc TEXT,
                base_model TEXT,
                embed_model TEXT,
                tool_model TEXT,
                instruction TEXT,
                vector_table TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_bot(row: &sqlx::sqlite::SqliteRow) -> BotProfile {
        BotProfile {
            bot_id: row.get("bot_id"),
            bot_name: row.get("bot_name"),
            bot_desc: row.get("bot_desc"),
            base_model: row.get("base_model"),
            embed_model: row.get("embed_model"),
            tool_model: row.get("tool_model"),
            instruction: row.get("instruction"),
            vector_table: row.get("vector_table"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    pub async fn create(&self, mut bot: BotProfile) -> Result<BotProfile, ApiError> {
        if bot.bot_name.trim().is_empty() {
            return Err(ApiError::BadRequest("botName is required".to_string()));
        }
        if bot.bot_id.is_empty() {
            bot.bot_id = uuid::Uuid::new_v4().to_string();
        }
        if bot.vector_table.is_empty() {
            bot.vector_table = vector_table_for(&bot.bot_id);
        }
        let now = Utc::now().to_rfc3339();
        bot.created_at = Some(now.clone());
        bot.updated_at = Some(now);

        sqlx::query(
            "INSERT INTO bots
                (bot_id, bot_name, bot_desc, base_model, embed_model, tool_model,
                 instruction, vector_table, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&bot.bot_id)
        .bind(&bot.bot_name)
        .bind(&bot.bot_desc)
        .bind(&bot.base_model)
        .bind(&bot.embed_model)
        .bind(&bot.tool_model)
        .bind(&bot.instruction)
        .bind(&bot.vector_table)
        .bind(&bot.created_at)
        .bind(&bot.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(bot)
    }

    pub async fn list(&self) -> Result<Vec<BotProfile>, ApiError> {
        let rows = sqlx::query("SELECT * FROM bots ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(Self::row_to_bot).collect())
    }

    pub async fn delete(&self, bot_id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM bots WHERE bot_id = ?1")
            .bind(bot_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl BotDirectory for BotStore {
    async fn get(&self, bot_id: &str) -> Result<Option<BotProfile>, ApiError> {
        let row = sqlx::query("SELECT * FROM bots WHERE bot_id = ?1")
            .bind(bot_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(Self::row_to_bot))
    }
}
