//! Item template persistence.

use super::sqlite_store::SqliteItemStore;
use super::{RepoError, RepoResult};
use crate::model::attribute::AttributeTable;
use crate::model::template::ItemTemplate;
use rusqlite::{params, OptionalExtension};

/// Durable storage of named item templates.
pub trait TemplateRepository: Send + Sync {
    fn load_template(&self, name: &str) -> RepoResult<Option<ItemTemplate>>;
    fn save_template(&self, template: &ItemTemplate) -> RepoResult<()>;
    fn list_template_names(&self) -> RepoResult<Vec<String>>;
}

impl TemplateRepository for SqliteItemStore {
    fn load_template(&self, name: &str) -> RepoResult<Option<ItemTemplate>> {
        let attrs_text = self
            .conn()
            .query_row(
                "SELECT attrs FROM item_templates WHERE name = ?1;",
                [name],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        let Some(attrs_text) = attrs_text else {
            return Ok(None);
        };
        let attrs: AttributeTable = serde_json::from_str(&attrs_text).map_err(|err| {
            RepoError::InvalidData(format!("invalid attrs for template `{name}`: {err}"))
        })?;
        let template = ItemTemplate::new(name, attrs)
            .map_err(|err| RepoError::InvalidData(err.to_string()))?;
        Ok(Some(template))
    }

    fn save_template(&self, template: &ItemTemplate) -> RepoResult<()> {
        let attrs = serde_json::to_string(template.attrs()).map_err(|err| {
            RepoError::InvalidData(format!("template `{}` attrs: {err}", template.name()))
        })?;
        self.conn().execute(
            "INSERT INTO item_templates (name, attrs)
             VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET
                attrs = excluded.attrs,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![template.name(), attrs],
        )?;
        Ok(())
    }

    fn list_template_names(&self) -> RepoResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT name FROM item_templates ORDER BY name ASC;")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}
