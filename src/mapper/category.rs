use super::{DecodeError, DocumentMapper, FieldReader, FieldSpec, FieldWriter};
use crate::ids::EntityId;
use crate::models::{Category, NewCategory};
use crate::store::{Document, Fields};

pub mod fields {
    use super::FieldSpec;

    pub const ID: FieldSpec = FieldSpec::new("id", &["id_categoria", "idCategoria"]);
    pub const NAME: FieldSpec =
        FieldSpec::new("name", &["nombre_categoria", "nombreCategoria", "nombre"]);
    pub const DESCRIPTION: FieldSpec = FieldSpec::new("description", &["descripcion"]);
    pub const CREATED_AT: FieldSpec =
        FieldSpec::new("createdAt", &["fecha_creacion", "fechaCreacion", "created_at"]);
}

#[derive(Debug, Clone, Copy)]
pub struct CategoryMapper;

impl DocumentMapper for CategoryMapper {
    type Entity = Category;

    const COLLECTION: &'static str = "categories";
    const ID: FieldSpec = fields::ID;

    fn to_document(category: &Category) -> Fields {
        FieldWriter::new()
            .identity(fields::ID, &category.id)
            .set(fields::NAME, category.name.as_str())
            .set(fields::DESCRIPTION, category.description.as_str())
            .instant(fields::CREATED_AT, category.created_at)
            .build()
    }

    fn entity_id(category: &Category) -> &EntityId {
        &category.id
    }

    fn from_document(doc: &Document) -> Result<Category, DecodeError> {
        let reader = FieldReader::new(doc);
        Ok(Category {
            id: reader.entity_id(fields::ID)?,
            name: reader.string(fields::NAME)?,
            description: reader.string(fields::DESCRIPTION)?,
            created_at: reader.timestamp(fields::CREATED_AT)?,
        })
    }
}

impl CategoryMapper {
    pub fn creation_payload(id: &EntityId, input: &NewCategory) -> Fields {
        FieldWriter::new()
            .identity(fields::ID, id)
            .set(fields::NAME, input.name.as_str())
            .text(fields::DESCRIPTION, input.description.as_deref())
            .server_time(fields::CREATED_AT)
            .build()
    }

    /// Mutable fields only; `createdAt` is never rewritten.
    pub fn update_payload(category: &Category) -> Fields {
        FieldWriter::new()
            .set(fields::NAME, category.name.as_str())
            .set(fields::DESCRIPTION, category.description.as_str())
            .build()
    }
}
