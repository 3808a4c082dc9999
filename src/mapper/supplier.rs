use super::{DecodeError, DocumentMapper, FieldReader, FieldSpec, FieldWriter};
use crate::ids::EntityId;
use crate::models::{NewSupplier, Supplier};
use crate::store::{Document, Fields};

pub mod fields {
    use super::FieldSpec;

    pub const ID: FieldSpec = FieldSpec::new("id", &["id_proveedor", "idProveedor"]);
    pub const NAME: FieldSpec =
        FieldSpec::new("name", &["nombre_proveedor", "nombreProveedor", "nombre"]);
    pub const PHONE: FieldSpec = FieldSpec::new("phone", &["telefono"]);
    pub const EMAIL: FieldSpec = FieldSpec::new("email", &["correo"]);
    pub const ADDRESS: FieldSpec = FieldSpec::new("address", &["direccion"]);
    pub const CITY: FieldSpec = FieldSpec::new("city", &["ciudad"]);
    pub const COUNTRY: FieldSpec = FieldSpec::new("country", &["pais"]);
    pub const REGISTERED_AT: FieldSpec =
        FieldSpec::new("registeredAt", &["fecha_registro", "fechaRegistro", "registered_at"]);
}

#[derive(Debug, Clone, Copy)]
pub struct SupplierMapper;

impl DocumentMapper for SupplierMapper {
    type Entity = Supplier;

    const COLLECTION: &'static str = "suppliers";
    const ID: FieldSpec = fields::ID;

    fn to_document(supplier: &Supplier) -> Fields {
        FieldWriter::new()
            .identity(fields::ID, &supplier.id)
            .set(fields::NAME, supplier.name.as_str())
            .set(fields::PHONE, supplier.phone.as_str())
            .set(fields::EMAIL, supplier.email.as_str())
            .set(fields::ADDRESS, supplier.address.as_str())
            .set(fields::CITY, supplier.city.as_str())
            .set(fields::COUNTRY, supplier.country.as_str())
            .instant(fields::REGISTERED_AT, supplier.registered_at)
            .build()
    }

    fn entity_id(supplier: &Supplier) -> &EntityId {
        &supplier.id
    }

    fn from_document(doc: &Document) -> Result<Supplier, DecodeError> {
        let reader = FieldReader::new(doc);
        Ok(Supplier {
            id: reader.entity_id(fields::ID)?,
            name: reader.string(fields::NAME)?,
            phone: reader.string(fields::PHONE)?,
            email: reader.string(fields::EMAIL)?,
            address: reader.string(fields::ADDRESS)?,
            city: reader.string(fields::CITY)?,
            country: reader.string(fields::COUNTRY)?,
            registered_at: reader.timestamp(fields::REGISTERED_AT)?,
        })
    }
}

impl SupplierMapper {
    pub fn creation_payload(id: &EntityId, input: &NewSupplier) -> Fields {
        FieldWriter::new()
            .identity(fields::ID, id)
            .set(fields::NAME, input.name.as_str())
            .text(fields::PHONE, input.phone.as_deref())
            .text(fields::EMAIL, input.email.as_deref())
            .text(fields::ADDRESS, input.address.as_deref())
            .text(fields::CITY, input.city.as_deref())
            .text(fields::COUNTRY, input.country.as_deref())
            .server_time(fields::REGISTERED_AT)
            .build()
    }

    pub fn update_payload(supplier: &Supplier) -> Fields {
        FieldWriter::new()
            .set(fields::NAME, supplier.name.as_str())
            .set(fields::PHONE, supplier.phone.as_str())
            .set(fields::EMAIL, supplier.email.as_str())
            .set(fields::ADDRESS, supplier.address.as_str())
            .set(fields::CITY, supplier.city.as_str())
            .set(fields::COUNTRY, supplier.country.as_str())
            .build()
    }
}
