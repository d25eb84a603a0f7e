//! Compile-time item attribute table.
//!
//! # Responsibility
//! - Enumerate every attribute an item can carry, in wire order.
//! - Store each attribute in a slot whose type is fixed by the schema.
//! - Provide coercing accessors that never fail.
//!
//! # Invariants
//! - `AttributeTable` slot `i` always holds a value of `Attr::ALL[i].kind()`.
//! - Doubles are stored rounded to three decimals.
//! - Reads of absent or non-coercible values return the kind's zero value.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};

/// Storage type of one attribute slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Str,
    Int,
    Long,
    Double,
}

macro_rules! attributes {
    ($($variant:ident => $wire:literal, $kind:ident, $on_wire:literal;)+) => {
        /// Closed set of item attributes.
        ///
        /// Declaration order is the wire order used by serialization.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Attr {
            $($variant,)+
        }

        impl Attr {
            /// Every attribute in wire order.
            pub const ALL: &'static [Attr] = &[$(Attr::$variant,)+];

            /// Attribute name used on the wire and in persisted JSON.
            pub const fn wire_name(self) -> &'static str {
                match self {
                    $(Attr::$variant => $wire,)+
                }
            }

            pub const fn kind(self) -> AttrKind {
                match self {
                    $(Attr::$variant => AttrKind::$kind,)+
                }
            }

            /// Whether the attribute is emitted in the `<O .../>` fragment.
            pub const fn on_wire(self) -> bool {
                match self {
                    $(Attr::$variant => $on_wire,)+
                }
            }

            /// Resolves a persisted attribute name.
            pub fn from_wire_name(name: &str) -> Option<Attr> {
                match name {
                    $($wire => Some(Attr::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

attributes! {
    Id => "id", Long, true;
    Section => "section", Int, true;
    Slot => "slot", Str, true;
    Name => "name", Str, true;
    Txt => "txt", Str, true;
    Weight => "massa", Int, true;
    Slots => "st", Str, true;
    Requirements => "min", Str, true;
    Protection => "protect", Str, true;
    Quality => "quality", Int, true;
    MaxQuality => "maxquality", Int, true;
    UseCost => "OD", Int, true;
    ReloadCost => "rOD", Int, true;
    Type => "type", Double, true;
    Damage => "damage", Str, true;
    Calibre => "calibre", Double, true;
    Shot => "shot", Str, true;
    SkillName => "nskill", Str, true;
    MaxCount => "max_count", Int, true;
    Up => "up", Str, true;
    Grouping => "grouping", Str, true;
    Range => "range", Int, true;
    NoTransfer => "nt", Int, true;
    BuildIn => "build_in", Str, true;
    Category => "c", Int, true;
    Radius => "radius", Int, true;
    Cost => "cost", Double, true;
    Cost2 => "cost2", Double, true;
    S1 => "s1", Str, true;
    S2 => "s2", Str, true;
    S3 => "s3", Str, true;
    S4 => "s4", Str, true;
    Count => "count", Int, true;
    Lb => "lb", Str, true;
    Expiry => "dt", Long, true;
    Hz => "hz", Long, true;
    Res => "res", Str, true;
    OwnerName => "owner", Str, true;
    Tm => "tm", Str, true;
    LongName => "ln", Str, true;
    Made => "made", Str, false;
}

/// Number of attribute slots in every table.
pub const ATTR_COUNT: usize = Attr::ALL.len();

impl Attr {
    fn index(self) -> usize {
        self as usize
    }

    /// Schema default for this attribute.
    pub fn default_value(self) -> AttrValue {
        match self.kind() {
            AttrKind::Str => AttrValue::Str(String::new()),
            AttrKind::Int => AttrValue::Int(0),
            AttrKind::Long => AttrValue::Long(0),
            AttrKind::Double => AttrValue::Double(0.0),
        }
    }
}

impl Display for Attr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// One attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i32),
    Long(i64),
    Double(f64),
    Str(String),
}

impl AttrValue {
    /// Whether the value is the zero value of its kind.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Str(value) => value.is_empty(),
            Self::Int(value) => *value == 0,
            Self::Long(value) => *value == 0,
            Self::Double(value) => *value == 0.0,
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            Self::Str(value) => value.clone(),
            Self::Int(value) => value.to_string(),
            Self::Long(value) => value.to_string(),
            Self::Double(value) => format_double(*value),
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Str(value) => parse_long(value),
            Self::Int(value) => i64::from(*value),
            Self::Long(value) => *value,
            Self::Double(value) => round_to_long(*value),
        }
    }

    pub fn as_i32(&self) -> i32 {
        i32::try_from(self.as_i64()).unwrap_or(0)
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Str(value) => value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .unwrap_or(0.0),
            Self::Int(value) => f64::from(*value),
            Self::Long(value) => *value as f64,
            Self::Double(value) => *value,
        }
    }

    /// Converts the value into the storage type of `kind`.
    pub fn coerce(&self, kind: AttrKind) -> AttrValue {
        match kind {
            AttrKind::Str => Self::Str(self.as_string()),
            AttrKind::Int => Self::Int(self.as_i32()),
            AttrKind::Long => Self::Long(self.as_i64()),
            AttrKind::Double => Self::Double(round_millis(self.as_f64())),
        }
    }
}

impl Display for AttrValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

/// Fixed-schema attribute storage of one item.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeTable {
    slots: [AttrValue; ATTR_COUNT],
}

impl Default for AttributeTable {
    fn default() -> Self {
        Self {
            slots: std::array::from_fn(|index| Attr::ALL[index].default_value()),
        }
    }
}

impl AttributeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, attr: Attr) -> &AttrValue {
        &self.slots[attr.index()]
    }

    pub fn str(&self, attr: Attr) -> String {
        self.get(attr).as_string()
    }

    pub fn int(&self, attr: Attr) -> i32 {
        self.get(attr).as_i32()
    }

    pub fn long(&self, attr: Attr) -> i64 {
        self.get(attr).as_i64()
    }

    pub fn double(&self, attr: Attr) -> f64 {
        self.get(attr).as_f64()
    }

    /// Stores `value` coerced into the attribute's schema type.
    pub fn set(&mut self, attr: Attr, value: impl Into<AttrValue>) {
        self.slots[attr.index()] = value.into().coerce(attr.kind());
    }

    pub fn reset(&mut self, attr: Attr) {
        self.slots[attr.index()] = attr.default_value();
    }

    pub fn is_empty(&self, attr: Attr) -> bool {
        self.get(attr).is_empty()
    }

    /// Non-empty attributes in wire order.
    pub fn non_empty(&self) -> impl Iterator<Item = (Attr, &AttrValue)> + '_ {
        Attr::ALL
            .iter()
            .map(move |attr| (*attr, self.get(*attr)))
            .filter(|(_, value)| !value.is_empty())
    }

    /// Appends ` name="value"` pairs for every non-empty wire attribute.
    pub fn write_wire_attrs(&self, out: &mut String) {
        for (attr, value) in self.non_empty().filter(|(attr, _)| attr.on_wire()) {
            out.push(' ');
            out.push_str(attr.wire_name());
            out.push_str("=\"");
            push_escaped(out, &value.as_string());
            out.push('"');
        }
    }
}

impl Serialize for AttributeTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entries = self.non_empty().collect::<Vec<_>>();
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (attr, value) in entries {
            map.serialize_entry(attr.wire_name(), value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AttributeTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(AttributeTableVisitor)
    }
}

struct AttributeTableVisitor;

impl<'de> Visitor<'de> for AttributeTableVisitor {
    type Value = AttributeTable;

    fn expecting(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("a map of item attribute names to values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut table = AttributeTable::new();
        while let Some(name) = access.next_key::<String>()? {
            let attr = Attr::from_wire_name(&name)
                .ok_or_else(|| de::Error::custom(format!("unknown item attribute `{name}`")))?;
            let value = access.next_value::<AttrValue>()?;
            table.set(attr, value);
        }
        Ok(table)
    }
}

fn parse_long(value: &str) -> i64 {
    let trimmed = value.trim();
    if let Ok(parsed) = trimmed.parse::<i64>() {
        return parsed;
    }
    trimmed
        .parse::<f64>()
        .map(round_to_long)
        .unwrap_or(0)
}

fn round_to_long(value: f64) -> i64 {
    if !value.is_finite() || value.abs() >= i64::MAX as f64 {
        return 0;
    }
    value.round() as i64
}

fn round_millis(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 1000.0).round() / 1000.0
}

fn format_double(value: f64) -> String {
    format!("{value}")
}

fn push_escaped(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
}
