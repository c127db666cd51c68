//! Cause slots and cause chains.
//!
//! A phase context carries named cause slots: a [`CauseKey`] mapped to a
//! [`CauseValue`]. When the context unwinds, its slots become an ordered
//! [`Cause`] chain attached to every event the unwind posts. The first entry
//! of a chain is its *root*: the thing ultimately responsible (the user who
//! ran the command, the entity that died, the block that ticked).
//!
//! Typed lookup goes through the [`CauseType`] trait so call sites can ask for
//! "the `SOURCE` slot as a [`UserId`]" without matching on the enum.

use std::fmt;

use causeway_world::block::BlockSnapshot;
use causeway_world::entity::{EntityId, ItemStack};
use causeway_world::identity::{PluginId, UserId};
use causeway_world::position::BlockPos;

use crate::state::PhaseState;

// ---------------------------------------------------------------------------
// CauseKey
// ---------------------------------------------------------------------------

/// Name of a cause slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CauseKey(pub &'static str);

impl CauseKey {
    pub fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for CauseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Primary responsible object.
pub const SOURCE: CauseKey = CauseKey("source");
/// User whose action caused an update to propagate.
pub const NOTIFIER: CauseKey = CauseKey("notifier");
/// User who owns the thing being changed.
pub const OWNER: CauseKey = CauseKey("owner");
/// Command line being executed.
pub const COMMAND: CauseKey = CauseKey("command");
pub const PLUGIN: CauseKey = CauseKey("plugin");
/// Name of the scheduled task a plugin queued.
pub const TASK: CauseKey = CauseKey("task");
/// Name of the world populator running.
pub const POPULATOR: CauseKey = CauseKey("populator");
/// Snapshot of a block that was broken and is dropping items.
pub const BLOCK_BROKEN: CauseKey = CauseKey("block_broken");
/// Phase whose unwind a post-unwind frame is collecting for.
pub const UNWINDING_STATE: CauseKey = CauseKey("unwinding_state");
pub const DAMAGE: CauseKey = CauseKey("damage");
pub const USED_ITEM: CauseKey = CauseKey("used_item");
/// Phase the chain was built for. Appended by the tracker, never a slot.
pub const PHASE: CauseKey = CauseKey("phase");

// ---------------------------------------------------------------------------
// CauseValue
// ---------------------------------------------------------------------------

/// A value stored in a cause slot or chain entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CauseValue {
    User(UserId),
    Entity(EntityId),
    Block(BlockSnapshot),
    Item(ItemStack),
    Position(BlockPos),
    Plugin(PluginId),
    Text(String),
    Phase(PhaseState),
}

/// Discriminant of a [`CauseValue`], used in missing-slot diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CauseKind {
    User,
    Entity,
    Block,
    Item,
    Position,
    Plugin,
    Text,
    Phase,
}

impl fmt::Display for CauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CauseKind::User => "user",
            CauseKind::Entity => "entity",
            CauseKind::Block => "block snapshot",
            CauseKind::Item => "item stack",
            CauseKind::Position => "position",
            CauseKind::Plugin => "plugin",
            CauseKind::Text => "text",
            CauseKind::Phase => "phase",
        };
        f.write_str(name)
    }
}

impl CauseValue {
    pub fn kind(&self) -> CauseKind {
        match self {
            CauseValue::User(_) => CauseKind::User,
            CauseValue::Entity(_) => CauseKind::Entity,
            CauseValue::Block(_) => CauseKind::Block,
            CauseValue::Item(_) => CauseKind::Item,
            CauseValue::Position(_) => CauseKind::Position,
            CauseValue::Plugin(_) => CauseKind::Plugin,
            CauseValue::Text(_) => CauseKind::Text,
            CauseValue::Phase(_) => CauseKind::Phase,
        }
    }

    /// Typed view of this value, if it holds a `T`.
    pub fn get<T: CauseType>(&self) -> Option<&T> {
        T::from_value(self)
    }
}

impl fmt::Display for CauseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CauseValue::User(u) => write!(f, "{u}"),
            CauseValue::Entity(e) => write!(f, "{e}"),
            CauseValue::Block(b) => write!(f, "{b}"),
            CauseValue::Item(i) => write!(f, "{i}"),
            CauseValue::Position(p) => write!(f, "{p}"),
            CauseValue::Plugin(p) => write!(f, "{p}"),
            CauseValue::Text(t) => f.write_str(t),
            CauseValue::Phase(p) => write!(f, "{p}"),
        }
    }
}

// ---------------------------------------------------------------------------
// CauseType
// ---------------------------------------------------------------------------

/// A Rust type that can be stored in and read back from a [`CauseValue`].
pub trait CauseType: Sized {
    const KIND: CauseKind;

    fn from_value(value: &CauseValue) -> Option<&Self>;

    fn into_value(self) -> CauseValue;
}

macro_rules! cause_type {
    ($ty:ty, $variant:ident) => {
        impl CauseType for $ty {
            const KIND: CauseKind = CauseKind::$variant;

            fn from_value(value: &CauseValue) -> Option<&Self> {
                match value {
                    CauseValue::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_value(self) -> CauseValue {
                CauseValue::$variant(self)
            }
        }

        impl From<$ty> for CauseValue {
            fn from(value: $ty) -> Self {
                CauseValue::$variant(value)
            }
        }
    };
}

cause_type!(UserId, User);
cause_type!(EntityId, Entity);
cause_type!(BlockSnapshot, Block);
cause_type!(ItemStack, Item);
cause_type!(BlockPos, Position);
cause_type!(PluginId, Plugin);
cause_type!(String, Text);
cause_type!(PhaseState, Phase);

impl From<&str> for CauseValue {
    fn from(value: &str) -> Self {
        CauseValue::Text(value.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Cause chain
// ---------------------------------------------------------------------------

/// One entry of a cause chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedCause {
    pub name: CauseKey,
    pub value: CauseValue,
}

/// An ordered, immutable chain of responsible origins attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cause {
    entries: Vec<NamedCause>,
}

impl Cause {
    /// The first entry of the chain.
    pub fn root(&self) -> Option<&NamedCause> {
        self.entries.first()
    }

    /// Display form of the root value, or `"none"` for an empty chain.
    pub fn root_label(&self) -> String {
        self.root()
            .map(|c| c.value.to_string())
            .unwrap_or_else(|| "none".to_owned())
    }

    /// The first entry named `key`, viewed as a `T`.
    pub fn first_named<T: CauseType>(&self, key: CauseKey) -> Option<&T> {
        self.entries
            .iter()
            .find(|c| c.name == key)
            .and_then(|c| T::from_value(&c.value))
    }

    /// The first entry of type `T`, whatever its name.
    pub fn first<T: CauseType>(&self) -> Option<&T> {
        self.entries.iter().find_map(|c| T::from_value(&c.value))
    }

    /// Every entry of type `T`, in chain order.
    pub fn all_of<'a, T: CauseType + 'a>(&'a self) -> impl Iterator<Item = &'a T> {
        self.entries.iter().filter_map(|c| T::from_value(&c.value))
    }

    pub fn contains_key(&self, key: CauseKey) -> bool {
        self.entries.iter().any(|c| c.name == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedCause> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", entry.name, entry.value)?;
        }
        f.write_str("]")
    }
}

/// Accumulates entries for a [`Cause`].
///
/// Unlike context slots, a chain may hold the same name more than once.
#[derive(Debug, Clone, Default)]
pub struct CauseBuilder {
    entries: Vec<NamedCause>,
}

impl CauseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a chain whose root is `value` named `key`.
    pub fn rooted(key: CauseKey, value: impl Into<CauseValue>) -> Self {
        let mut builder = Self::new();
        builder.named(key, value);
        builder
    }

    /// Append an entry.
    pub fn named(&mut self, key: CauseKey, value: impl Into<CauseValue>) -> &mut Self {
        self.entries.push(NamedCause {
            name: key,
            value: value.into(),
        });
        self
    }

    /// Append every entry of an existing chain.
    pub fn extend_from(&mut self, cause: &Cause) -> &mut Self {
        self.entries.extend(cause.entries.iter().cloned());
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries appended after the chain had `len` entries.
    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    pub fn build(self) -> Cause {
        Cause {
            entries: self.entries,
        }
    }
}
