//! Singleton schemas for the prelude's simple shapes.

use std::sync::LazyLock;

use super::{Schema, ShapeType, TraitMap};
use crate::shape_id::ShapeId;

fn prelude(name: &str, shape_type: ShapeType) -> Schema {
    Schema::simple(ShapeId::prelude(name), shape_type, TraitMap::new())
}

pub static BLOB: LazyLock<Schema> = LazyLock::new(|| prelude("Blob", ShapeType::Blob));
pub static BOOLEAN: LazyLock<Schema> = LazyLock::new(|| prelude("Boolean", ShapeType::Boolean));
pub static STRING: LazyLock<Schema> = LazyLock::new(|| prelude("String", ShapeType::String));
pub static TIMESTAMP: LazyLock<Schema> =
    LazyLock::new(|| prelude("Timestamp", ShapeType::Timestamp));
pub static BYTE: LazyLock<Schema> = LazyLock::new(|| prelude("Byte", ShapeType::Byte));
pub static SHORT: LazyLock<Schema> = LazyLock::new(|| prelude("Short", ShapeType::Short));
pub static INTEGER: LazyLock<Schema> = LazyLock::new(|| prelude("Integer", ShapeType::Integer));
pub static LONG: LazyLock<Schema> = LazyLock::new(|| prelude("Long", ShapeType::Long));
pub static FLOAT: LazyLock<Schema> = LazyLock::new(|| prelude("Float", ShapeType::Float));
pub static DOUBLE: LazyLock<Schema> = LazyLock::new(|| prelude("Double", ShapeType::Double));
pub static DOCUMENT: LazyLock<Schema> =
    LazyLock::new(|| prelude("Document", ShapeType::Document));
pub static UNIT: LazyLock<Schema> = LazyLock::new(|| prelude("Unit", ShapeType::Structure));
