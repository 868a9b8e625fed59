use std::collections::HashMap;
use std::sync::Arc;

use super::{Arena, MemberSlot, Node, Schema, SchemaError, ShapeType, Target, TraitMap};
use crate::shape_id::ShapeId;

/// Handle to a shape declared on a [`SchemaBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeRef(usize);

/// What a member refers to.
#[derive(Debug, Clone)]
pub enum MemberTarget {
    /// A shape declared on the same builder.
    Shape(ShapeRef),
    /// A schema built elsewhere, such as a prelude shape.
    Schema(Schema),
    /// A shape of this compilation unit named by id, possibly not declared yet.
    Id(ShapeId),
}

enum PendingTarget {
    Local(usize),
    External(Schema),
    Deferred(ShapeId),
}

struct PendingMember {
    name: String,
    target: PendingTarget,
    traits: TraitMap,
}

struct PendingShape {
    id: ShapeId,
    shape_type: ShapeType,
    traits: TraitMap,
    members: Vec<PendingMember>,
}

/// One compilation unit of schemas.
///
/// Shapes are declared first and members attached afterwards. Members that
/// name a shape by id before it is declared are deferred: they are linked
/// during [`SchemaBuilder::build`] and ordered after the container's other
/// members, so recursive members always come last.
#[derive(Default)]
pub struct SchemaBuilder {
    shapes: Vec<PendingShape>,
    ids: HashMap<ShapeId, usize>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a shape.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateShape`] when the id is already declared.
    pub fn shape(
        &mut self,
        id: ShapeId,
        shape_type: ShapeType,
        traits: TraitMap,
    ) -> Result<ShapeRef, SchemaError> {
        if self.ids.contains_key(&id) {
            return Err(SchemaError::DuplicateShape(id.to_string()));
        }
        let index = self.shapes.len();
        self.ids.insert(id.clone(), index);
        self.shapes.push(PendingShape {
            id,
            shape_type,
            traits,
            members: Vec::new(),
        });
        Ok(ShapeRef(index))
    }

    /// Attaches a member to a declared aggregate shape.
    ///
    /// # Errors
    ///
    /// Fails when the container cannot have members or already has a member
    /// with this name, or when a handle came from a different builder.
    pub fn member(
        &mut self,
        container: ShapeRef,
        name: impl Into<String>,
        target: MemberTarget,
        traits: TraitMap,
    ) -> Result<(), SchemaError> {
        let name = name.into();
        let target = match target {
            MemberTarget::Shape(ShapeRef(index)) if index < self.shapes.len() => {
                PendingTarget::Local(index)
            }
            MemberTarget::Shape(ShapeRef(index)) => {
                return Err(SchemaError::ForeignShapeRef(index));
            }
            MemberTarget::Schema(schema) => PendingTarget::External(schema),
            MemberTarget::Id(id) => match self.ids.get(&id) {
                Some(index) => PendingTarget::Local(*index),
                None => PendingTarget::Deferred(id),
            },
        };

        let shape = self
            .shapes
            .get_mut(container.0)
            .ok_or(SchemaError::ForeignShapeRef(container.0))?;
        if !shape.shape_type.is_aggregate() {
            return Err(SchemaError::MembersNotAllowed {
                shape: shape.id.to_string(),
                shape_type: shape.shape_type,
            });
        }
        if shape.members.iter().any(|member| member.name == name) {
            return Err(SchemaError::DuplicateMember {
                shape: shape.id.to_string(),
                member: name,
            });
        }
        shape.members.push(PendingMember {
            name,
            target,
            traits,
        });
        Ok(())
    }

    /// Links deferred members and freezes the unit.
    ///
    /// # Errors
    ///
    /// Fails when a deferred member names a shape that was never declared or
    /// when a list or map does not declare its required members.
    pub fn build(self) -> Result<SchemaSet, SchemaError> {
        let Self { shapes, ids } = self;

        let mut nodes: Vec<Node> = shapes
            .iter()
            .map(|shape| Node {
                id: shape.id.clone(),
                shape_type: shape.shape_type,
                traits: shape.traits.clone(),
                members: Vec::new(),
                by_name: HashMap::new(),
                member: None,
            })
            .collect();

        for (container, shape) in shapes.iter().enumerate() {
            validate_members(shape)?;

            let (immediate, deferred): (Vec<&PendingMember>, Vec<&PendingMember>) = shape
                .members
                .iter()
                .partition(|member| !matches!(member.target, PendingTarget::Deferred(_)));

            for (position, member) in immediate.into_iter().chain(deferred).enumerate() {
                let target = match &member.target {
                    PendingTarget::Local(index) => Target::Local(*index),
                    PendingTarget::External(schema) => Target::External(schema.clone()),
                    PendingTarget::Deferred(id) => {
                        let index = ids.get(id).ok_or_else(|| SchemaError::UnresolvedTarget {
                            member: shape.id.with_member(member.name.clone()).to_string(),
                            target: id.to_string(),
                        })?;
                        Target::Local(*index)
                    }
                };
                let (shape_type, target_traits) = match &target {
                    Target::Local(index) => (shapes[*index].shape_type, &shapes[*index].traits),
                    Target::External(schema) => (schema.shape_type(), schema.traits()),
                };

                let node_index = nodes.len();
                nodes.push(Node {
                    id: shape.id.with_member(member.name.clone()),
                    shape_type,
                    traits: target_traits.merged(&member.traits),
                    members: Vec::new(),
                    by_name: HashMap::new(),
                    member: Some(MemberSlot {
                        name: member.name.clone(),
                        index: position,
                        target,
                    }),
                });
                nodes[container].members.push(node_index);
                nodes[container]
                    .by_name
                    .insert(member.name.clone(), position);
            }
        }

        Ok(SchemaSet {
            arena: Arc::new(Arena { nodes }),
            ids,
        })
    }
}

fn validate_members(shape: &PendingShape) -> Result<(), SchemaError> {
    let names: Vec<&str> = shape
        .members
        .iter()
        .map(|member| member.name.as_str())
        .collect();
    let reason = match shape.shape_type {
        ShapeType::List if names != ["member"] => "lists declare exactly one member named 'member'",
        ShapeType::Map
            if !(names.len() == 2 && names.contains(&"key") && names.contains(&"value")) =>
        {
            "maps declare exactly the members 'key' and 'value'"
        }
        _ => return Ok(()),
    };
    Err(SchemaError::InvalidMembers {
        shape: shape.id.to_string(),
        reason: reason.to_owned(),
    })
}

/// Frozen output of a [`SchemaBuilder`].
#[derive(Clone)]
pub struct SchemaSet {
    arena: Arc<Arena>,
    ids: HashMap<ShapeId, usize>,
}

impl SchemaSet {
    pub fn get(&self, id: &ShapeId) -> Option<Schema> {
        self.ids.get(id).map(|index| Schema {
            arena: Arc::clone(&self.arena),
            index: *index,
        })
    }

    pub fn schema(&self, shape: ShapeRef) -> Schema {
        Schema {
            arena: Arc::clone(&self.arena),
            index: shape.0,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
