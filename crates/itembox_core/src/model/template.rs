//! Named item prototypes.

use crate::alloc::AllocError;
use crate::model::attribute::{Attr, AttributeTable};
use crate::model::item::{ItemData, ItemId};
use crate::model::owner::OwnerRef;
use crate::repo::RepoError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const TEMPLATE_MONEY_COPPER: &str = "money.copper";
pub const TEMPLATE_MONEY_SILVER: &str = "money.silver";
pub const TEMPLATE_MONEY_GOLD: &str = "money.gold";
/// Key handed out with a freshly rented bank cell.
pub const TEMPLATE_BANK_KEY: &str = "bank.key";

static TEMPLATE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_.]{0,63}$").expect("valid template name regex"));

pub type TemplateResult<T> = Result<T, TemplateError>;

#[derive(Debug)]
pub enum TemplateError {
    InvalidName(String),
    NotFound(String),
    Repo(RepoError),
    Alloc(AllocError),
}

impl Display for TemplateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "invalid template name `{name}`"),
            Self::NotFound(name) => write!(f, "template not found: {name}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Alloc(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TemplateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidName(_) | Self::NotFound(_) => None,
            Self::Repo(err) => Some(err),
            Self::Alloc(err) => Some(err),
        }
    }
}

impl From<RepoError> for TemplateError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<AllocError> for TemplateError {
    fn from(value: AllocError) -> Self {
        Self::Alloc(value)
    }
}

/// Prototype from which item records are instantiated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTemplate")]
pub struct ItemTemplate {
    name: String,
    attrs: AttributeTable,
}

#[derive(Deserialize)]
struct RawTemplate {
    name: String,
    #[serde(default)]
    attrs: AttributeTable,
}

impl TryFrom<RawTemplate> for ItemTemplate {
    type Error = TemplateError;

    fn try_from(value: RawTemplate) -> Result<Self, Self::Error> {
        ItemTemplate::new(value.name, value.attrs)
    }
}

impl ItemTemplate {
    /// Builds a template; the prototype's own id is dropped.
    pub fn new(name: impl Into<String>, mut attrs: AttributeTable) -> TemplateResult<Self> {
        let name = name.into();
        if !is_valid_template_name(&name) {
            return Err(TemplateError::InvalidName(name));
        }
        attrs.reset(Attr::Id);
        Ok(Self { name, attrs })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attrs(&self) -> &AttributeTable {
        &self.attrs
    }

    /// Fresh top-level record data carrying the prototype's attributes.
    pub fn instantiate(&self, id: ItemId, owner: OwnerRef) -> ItemData {
        let mut data = ItemData {
            parent: None,
            owner,
            attrs: self.attrs.clone(),
        };
        data.attrs.set(Attr::Id, id);
        data
    }
}

pub fn is_valid_template_name(name: &str) -> bool {
    TEMPLATE_NAME_RE.is_match(name)
}
