//! Tool registry: CRUD over tool definitions.
//!
//! The classifier and executor both read through this interface at query
//! time. There is no caching layer; reads always reflect the latest write.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use super::types::ToolDefinition;
use crate::core::errors::ApiError;

#[async_trait]
pub trait ToolRegistry: Send + Sync {
    async fn list_by_bot(&self, bot_id: &str) -> Result<Vec<ToolDefinition>, ApiError>;

    async fn get(&self, id: &str) -> Result<Option<ToolDefinition>, ApiError>;

    /// Like `get`, but disabled tools are treated as absent.
    async fn get_enabled(&self, id: &str) -> Result<Option<ToolDefinition>, ApiError>;

    async fn create(&self, tool: ToolDefinition) -> Result<ToolDefinition, ApiError>;

    async fn update(&self, id: &str, tool: ToolDefinition) -> Result<ToolDefinition, ApiError>;

    async fn delete(&self, id: &str) -> Result<bool, ApiError>;

    /// Cascade helper used when a bot is deleted.
    async fn delete_by_bot(&self, bot_id: &str) -> Result<u64, ApiError>;
}

pub struct SqliteToolRegistry {
    pool: SqlitePool,
}

impl SqliteToolRegistry {
    pub async fn new(pool: SqlitePool) -> Result<Self, ApiError> {
        let registry = Self { pool };
        registry.init_schema().await?;
        Ok(registry)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tools (
                id TEXT PRIMARY KEY,
                bot_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                parameters TEXT NOT NULL DEFAULT '[]',
                endpoint TEXT NOT NULL DEFAULT '',
                method TEXT NOT NULL DEFAULT 'GET',
                kind TEXT NOT NULL DEFAULT 'http',
                secure INTEGER NOT NULL DEFAULT 0,
                enabled INTEGER NOT NULL DEFAULT 1,
                system_prompt TEXT,
                headers TEXT,
                auth TEXT NOT NULL DEFAULT '{\"type\":\"none\"}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tools_bot ON tools(bot_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn row_to_tool(row: &sqlx::sqlite::SqliteRow) -> Result<ToolDefinition, ApiError> {
        let parameters: String = row.get("parameters");
        let auth: String = row.get("auth");
        let headers: Option<String> = row.get("headers");
        let kind: String = row.get("kind");
        let method: String = row.get("method");

        Ok(ToolDefinition {
            id: row.get("id"),
            bot_id: row.get("bot_id"),
            name: row.get("name"),
            description: row.get("description"),
            parameters: serde_json::from_str(&parameters).map_err(ApiError::internal)?,
            endpoint: row.get("endpoint"),
            method: serde_json::from_value(serde_json::Value::String(method))
                .map_err(ApiError::internal)?,
            kind: serde_json::from_value(serde_json::Value::String(kind))
                .map_err(ApiError::internal)?,
            secure: row.get::<i64, _>("secure") != 0,
            enabled: row.get::<i64, _>("enabled") != 0,
            system_prompt: row.get("system_prompt"),
            headers: headers
                .map(|raw| serde_json::from_str(&raw).map_err(ApiError::internal))
                .transpose()?,
            auth: serde_json::from_str(&auth).map_err(ApiError::internal)?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    async fn write(&self, tool: &ToolDefinition, replace: bool) -> Result<(), ApiError> {
        let verb = if replace {
            "INSERT OR REPLACE"
        } else {
            "INSERT"
        };
        let parameters = serde_json::to_string(&tool.parameters).map_err(ApiError::internal)?;
        let auth = serde_json::to_string(&tool.auth).map_err(ApiError::internal)?;
        let headers = tool
            .headers
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(ApiError::internal)?;
        let method = serde_json::to_value(tool.method)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "GET".to_string());
        let kind = serde_json::to_value(tool.kind)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "http".to_string());

        sqlx::query(&format!(
            "{verb} INTO tools
                (id, bot_id, name, description, parameters, endpoint, method,
                 kind, secure, enabled, system_prompt, headers, auth,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ))
        .bind(&tool.id)
        .bind(&tool.bot_id)
        .bind(&tool.name)
        .bind(&tool.description)
        .bind(&parameters)
        .bind(&tool.endpoint)
        .bind(&method)
        .bind(&kind)
        .bind(tool.secure as i64)
        .bind(tool.enabled as i64)
        .bind(&tool.system_prompt)
        .bind(&headers)
        .bind(&auth)
        .bind(&tool.created_at)
        .bind(&tool.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ToolRegistry for SqliteToolRegistry {
    async fn list_by_bot(&self, bot_id: &str) -> Result<Vec<ToolDefinition>, ApiError> {
        let rows = sqlx::query("SELECT * FROM tools WHERE bot_id = ?1 ORDER BY created_at")
            .bind(bot_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_tool).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<ToolDefinition>, ApiError> {
        let row = sqlx::query("SELECT * FROM tools WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_tool).transpose()
    }

    async fn get_enabled(&self, id: &str) -> Result<Option<ToolDefinition>, ApiError> {
        let row = sqlx::query("SELECT * FROM tools WHERE id = ?1 AND enabled = 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_tool).transpose()
    }

    async fn create(&self, mut tool: ToolDefinition) -> Result<ToolDefinition, ApiError> {
        tool.validate().map_err(ApiError::BadRequest)?;
        if tool.id.is_empty() {
            tool.id = uuid::Uuid::new_v4().to_string();
        }
        let now = Utc::now().to_rfc3339();
        tool.created_at = Some(now.clone());
        tool.updated_at = Some(now);

        self.write(&tool, false).await?;
        Ok(tool)
    }

    async fn update(&self, id: &str, mut tool: ToolDefinition) -> Result<ToolDefinition, ApiError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Tool not found: {id}")))?;

        tool.id = existing.id;
        tool.created_at = existing.created_at;
        tool.updated_at = Some(Utc::now().to_rfc3339());
        tool.validate().map_err(ApiError::BadRequest)?;

        self.write(&tool, true).await?;
        Ok(tool)
    }

    async fn delete(&self, id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM tools WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_bot(&self, bot_id: &str) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM tools WHERE bot_id = ?1")
            .bind(bot_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
