//! Schema and trait model.
//!
//! A [`Schema`] is an immutable, cheaply cloneable handle to one node of a
//! shared arena. Shapes that reference each other (including recursive
//! shapes) live in the same arena and are linked by index when a
//! [`SchemaBuilder`] is built. Member schemas report their target's shape
//! type and the target's traits overlaid by the member's own traits.

mod builder;
pub mod prelude;
mod traits;

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use thiserror::Error;

use crate::document::Document;
use crate::shape_id::ShapeId;

pub use builder::{MemberTarget, SchemaBuilder, SchemaSet, ShapeRef};
pub use traits::{
    TimestampFormat, Trait, TraitConstructor, TraitMap, TraitRegistry, TraitRegistryBuilder,
};

/// Kind of shape described by a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeType {
    Blob,
    Boolean,
    String,
    Timestamp,
    Byte,
    Short,
    Integer,
    Long,
    Float,
    Double,
    Document,
    Enum,
    IntEnum,
    List,
    Map,
    Structure,
    Union,
    Operation,
    Service,
}

impl ShapeType {
    /// Whether the shape declares members.
    pub const fn is_aggregate(self) -> bool {
        matches!(self, Self::List | Self::Map | Self::Structure | Self::Union)
    }
}

/// Errors raised while building schemas.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("shape '{0}' is declared twice")]
    DuplicateShape(String),
    #[error("member '{member}' is declared twice on '{shape}'")]
    DuplicateMember { shape: String, member: String },
    #[error("shape '{shape}' of type {shape_type:?} cannot have members")]
    MembersNotAllowed { shape: String, shape_type: ShapeType },
    #[error("member '{member}' targets unknown shape '{target}'")]
    UnresolvedTarget { member: String, target: String },
    #[error("shape '{shape}' is invalid: {reason}")]
    InvalidMembers { shape: String, reason: String },
    #[error("trait '{id}' is invalid: {reason}")]
    InvalidTrait { id: String, reason: String },
    #[error("shape handle {0} was not issued by this builder")]
    ForeignShapeRef(usize),
}

#[derive(Clone)]
enum Target {
    Local(usize),
    External(Schema),
}

struct MemberSlot {
    name: String,
    index: usize,
    target: Target,
}

struct Node {
    id: ShapeId,
    shape_type: ShapeType,
    traits: TraitMap,
    members: Vec<usize>,
    by_name: HashMap<String, usize>,
    member: Option<MemberSlot>,
}

struct Arena {
    nodes: Vec<Node>,
}

/// Shared handle to an immutable shape description.
#[derive(Clone)]
pub struct Schema {
    arena: Arc<Arena>,
    index: usize,
}

/// Member declaration for [`Schema::collection`].
#[derive(Debug, Clone)]
pub struct MemberDef {
    pub name: String,
    pub target: Schema,
    pub traits: TraitMap,
}

impl MemberDef {
    pub fn new(name: impl Into<String>, target: &Schema) -> Self {
        Self {
            name: name.into(),
            target: target.clone(),
            traits: TraitMap::new(),
        }
    }

    pub fn with_trait(mut self, value: Trait) -> Self {
        self.traits.insert(value);
        self
    }
}

impl Schema {
    /// Schema for a shape without members.
    pub fn simple(id: ShapeId, shape_type: ShapeType, traits: TraitMap) -> Self {
        let node = Node {
            id,
            shape_type,
            traits,
            members: Vec::new(),
            by_name: HashMap::new(),
            member: None,
        };
        Self {
            arena: Arc::new(Arena { nodes: vec![node] }),
            index: 0,
        }
    }

    /// Schema for a structure, union, list or map whose members target
    /// already-built schemas. Recursive shapes go through [`SchemaBuilder`].
    ///
    /// # Errors
    ///
    /// Fails for duplicate member names or member-less shape types.
    pub fn collection(
        id: ShapeId,
        shape_type: ShapeType,
        traits: TraitMap,
        members: Vec<MemberDef>,
    ) -> Result<Self, SchemaError> {
        let mut builder = SchemaBuilder::new();
        let shape = builder.shape(id, shape_type, traits)?;
        for member in members {
            builder.member(
                shape,
                member.name,
                MemberTarget::Schema(member.target),
                member.traits,
            )?;
        }
        let set = builder.build()?;
        Ok(set.schema(shape))
    }

    fn node(&self) -> &Node {
        &self.arena.nodes[self.index]
    }

    /// The node members are looked up on: the target for members, self otherwise.
    fn container(&self) -> Schema {
        match self.node().member.as_ref().map(|slot| &slot.target) {
            Some(Target::Local(index)) => Schema {
                arena: Arc::clone(&self.arena),
                index: *index,
            }
            .container(),
            Some(Target::External(schema)) => schema.container(),
            None => self.clone(),
        }
    }

    pub fn id(&self) -> &ShapeId {
        &self.node().id
    }

    pub fn shape_type(&self) -> ShapeType {
        self.node().shape_type
    }

    /// Traits of this schema; for members, target traits overlaid by member traits.
    pub fn traits(&self) -> &TraitMap {
        &self.node().traits
    }

    pub fn get_trait(&self, id: &ShapeId) -> Option<&Trait> {
        self.traits().get(id)
    }

    pub fn is_member(&self) -> bool {
        self.node().member.is_some()
    }

    pub fn member_name(&self) -> Option<&str> {
        self.node().member.as_ref().map(|slot| slot.name.as_str())
    }

    /// Position of this member within its container.
    pub fn member_index(&self) -> Option<usize> {
        self.node().member.as_ref().map(|slot| slot.index)
    }

    /// Schema of the shape a member refers to.
    pub fn member_target(&self) -> Option<Schema> {
        self.node().member.as_ref().map(|slot| match &slot.target {
            Target::Local(index) => Schema {
                arena: Arc::clone(&self.arena),
                index: *index,
            },
            Target::External(schema) => schema.clone(),
        })
    }

    pub fn member(&self, name: &str) -> Option<Schema> {
        let container = self.container();
        let position = *container.node().by_name.get(name)?;
        container.member_at(position)
    }

    pub fn member_at(&self, position: usize) -> Option<Schema> {
        let container = self.container();
        let index = *container.node().members.get(position)?;
        Some(Schema {
            arena: Arc::clone(&container.arena),
            index,
        })
    }

    pub fn member_count(&self) -> usize {
        self.container().node().members.len()
    }

    /// Members in declaration order, recursive members last.
    pub fn members(&self) -> Members {
        Members {
            container: self.container(),
            next: 0,
        }
    }

    pub fn default_value(&self) -> Option<&Document> {
        self.traits().default_value()
    }

    pub fn is_required(&self) -> bool {
        self.traits().is_required()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        (Arc::ptr_eq(&self.arena, &other.arena) && self.index == other.index)
            || (self.id() == other.id() && self.member_index() == other.member_index())
    }
}

impl Debug for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("id", self.id())
            .field("shape_type", &self.shape_type())
            .field("member_index", &self.member_index())
            .finish()
    }
}

/// Iterator over a schema's member schemas.
pub struct Members {
    container: Schema,
    next: usize,
}

impl Iterator for Members {
    type Item = Schema;

    fn next(&mut self) -> Option<Self::Item> {
        let member = self.container.member_at(self.next)?;
        self.next += 1;
        Some(member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: &str) -> ShapeId {
        ShapeId::parse(value).expect("valid shape id")
    }

    #[test]
    fn collection_assigns_member_indexes_in_order() {
        let schema = Schema::collection(
            id("example#Point"),
            ShapeType::Structure,
            TraitMap::new(),
            vec![
                MemberDef::new("x", &prelude::INTEGER),
                MemberDef::new("y", &prelude::INTEGER).with_trait(Trait::Required),
            ],
        )
        .expect("valid structure");

        let y = schema.member("y").expect("y member");
        assert_eq!(y.member_index(), Some(1));
        assert_eq!(y.shape_type(), ShapeType::Integer);
        assert!(y.is_required());
        assert_eq!(y.id().to_string(), "example#Point$y");
        assert_eq!(y.member_target(), Some(prelude::INTEGER.clone()));
        assert_eq!(
            schema.members().filter_map(|m| m.member_name().map(str::to_owned)).collect::<Vec<_>>(),
            vec![String::from("x"), String::from("y")]
        );
    }

    #[test]
    fn member_traits_overlay_target_traits() {
        let name = Schema::simple(
            id("example#Name"),
            ShapeType::String,
            TraitMap::new()
                .with(Trait::Sensitive)
                .with(Trait::JsonName(String::from("from_target"))),
        );
        let schema = Schema::collection(
            id("example#Person"),
            ShapeType::Structure,
            TraitMap::new(),
            vec![MemberDef::new("name", &name).with_trait(Trait::JsonName(String::from("n")))],
        )
        .expect("valid structure");

        let member = schema.member("name").expect("member");
        assert!(member.traits().is_sensitive());
        assert_eq!(member.traits().json_name(), Some("n"));
    }

    #[test]
    fn simple_shapes_reject_members() {
        let error = Schema::collection(
            id("example#Flag"),
            ShapeType::Boolean,
            TraitMap::new(),
            vec![MemberDef::new("x", &prelude::INTEGER)],
        )
        .expect_err("booleans have no members");
        assert!(matches!(error, SchemaError::MembersNotAllowed { .. }));
    }
}
