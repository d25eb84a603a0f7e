//! Read-through cache over the template store.

use super::owner::Owner;
use crate::model::item::Item;
use crate::model::template::{is_valid_template_name, ItemTemplate, TemplateError, TemplateResult};
use crate::repo::TemplateRepository;
use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Named templates, cached after the first read and dropped from the cache on
/// every write.
pub struct TemplateRegistry {
    store: Arc<dyn TemplateRepository>,
    cache: RwLock<HashMap<String, Arc<ItemTemplate>>>,
}

impl TemplateRegistry {
    pub fn new(store: Arc<dyn TemplateRepository>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, name: &str) -> TemplateResult<Arc<ItemTemplate>> {
        if !is_valid_template_name(name) {
            return Err(TemplateError::InvalidName(name.to_string()));
        }
        if let Some(template) = self.cache.read().get(name) {
            return Ok(Arc::clone(template));
        }

        let template = self
            .store
            .load_template(name)?
            .map(Arc::new)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
        debug!("event=template_cache module=template status=miss name={name}");
        self.cache
            .write()
            .insert(name.to_string(), Arc::clone(&template));
        Ok(template)
    }

    /// Persists `template` and invalidates its cache entry.
    pub fn save(&self, template: &ItemTemplate) -> TemplateResult<()> {
        self.store.save_template(template)?;
        self.invalidate(template.name());
        debug!(
            "event=template_save module=template status=ok name={}",
            template.name()
        );
        Ok(())
    }

    pub fn invalidate(&self, name: &str) {
        self.cache.write().remove(name);
    }

    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }

    /// New top-level item from template `name`, owned by and id-minted through
    /// `owner`.
    pub fn instantiate(&self, name: &str, owner: &dyn Owner) -> TemplateResult<Item> {
        let template = self.get(name)?;
        let id = owner.new_id()?;
        Ok(Item::new(template.instantiate(id, owner.owner_ref())))
    }
}
