use super::{DecodeError, DocumentMapper, FieldReader, FieldSpec, FieldWriter};
use crate::ids::EntityId;
use crate::models::{NewProduct, Product};
use crate::store::{Document, Fields};

pub mod fields {
    use super::FieldSpec;

    pub const ID: FieldSpec = FieldSpec::new("id", &["id_producto", "idProducto"]);
    pub const NAME: FieldSpec =
        FieldSpec::new("name", &["nombre_producto", "nombreProducto", "nombre"]);
    pub const DESCRIPTION: FieldSpec = FieldSpec::new("description", &["descripcion"]);
    pub const UNIT_PRICE: FieldSpec =
        FieldSpec::new("unitPrice", &["precio_unitario", "precioUnitario", "precio"]);
    pub const STOCK_ON_HAND: FieldSpec =
        FieldSpec::new("stockOnHand", &["stock_actual", "stockActual", "stock"]);
    pub const STOCK_MIN: FieldSpec = FieldSpec::new("stockMin", &["stock_minimo", "stockMinimo"]);
    pub const CATEGORY_ID: FieldSpec = FieldSpec::new("categoryId", &["id_categoria", "idCategoria"]);
    pub const SUPPLIER_ID: FieldSpec = FieldSpec::new("supplierId", &["id_proveedor", "idProveedor"]);
    pub const BARCODE: FieldSpec = FieldSpec::new("barcode", &["codigo_barras", "codigoBarras"]);
    pub const ACTIVE: FieldSpec = FieldSpec::new("active", &["activo"]);
    pub const REGISTERED_AT: FieldSpec =
        FieldSpec::new("registeredAt", &["fecha_registro", "fechaRegistro"]);
    pub const UPDATED_AT: FieldSpec = FieldSpec::new(
        "updatedAt",
        &["ultima_actualizacion", "ultimaActualizacion", "timestamp"],
    );
}

#[derive(Debug, Clone, Copy)]
pub struct ProductMapper;

impl DocumentMapper for ProductMapper {
    type Entity = Product;

    const COLLECTION: &'static str = "products";
    const ID: FieldSpec = fields::ID;

    /// Decorations are not part of the document.
    fn to_document(product: &Product) -> Fields {
        FieldWriter::new()
            .identity(fields::ID, &product.id)
            .set(fields::NAME, product.name.as_str())
            .set(fields::DESCRIPTION, product.description.as_str())
            .set(fields::UNIT_PRICE, product.unit_price)
            .set(fields::STOCK_ON_HAND, product.stock_on_hand)
            .set(fields::STOCK_MIN, product.stock_min)
            .set(fields::CATEGORY_ID, product.category_id)
            .set(fields::SUPPLIER_ID, product.supplier_id)
            .set(fields::BARCODE, product.barcode.as_str())
            .set(fields::ACTIVE, product.active)
            .instant(fields::REGISTERED_AT, product.registered_at)
            .instant(fields::UPDATED_AT, product.updated_at)
            .build()
    }

    fn entity_id(product: &Product) -> &EntityId {
        &product.id
    }

    fn from_document(doc: &Document) -> Result<Product, DecodeError> {
        let reader = FieldReader::new(doc);
        Ok(Product {
            id: reader.entity_id(fields::ID)?,
            name: reader.string(fields::NAME)?,
            description: reader.string(fields::DESCRIPTION)?,
            unit_price: reader.f64(fields::UNIT_PRICE)?,
            stock_on_hand: reader.i32(fields::STOCK_ON_HAND)?,
            stock_min: reader.i32(fields::STOCK_MIN)?,
            category_id: reader.i32(fields::CATEGORY_ID)?,
            supplier_id: reader.i32(fields::SUPPLIER_ID)?,
            barcode: reader.string(fields::BARCODE)?,
            active: reader.bool(fields::ACTIVE, true)?,
            registered_at: reader.timestamp(fields::REGISTERED_AT)?,
            updated_at: reader.timestamp(fields::UPDATED_AT)?,
            category_name: None,
            supplier_name: None,
        })
    }
}

impl ProductMapper {
    pub fn creation_payload(id: &EntityId, input: &NewProduct) -> Fields {
        FieldWriter::new()
            .identity(fields::ID, id)
            .set(fields::NAME, input.name.as_str())
            .text(fields::DESCRIPTION, input.description.as_deref())
            .set(fields::UNIT_PRICE, input.unit_price)
            .set(fields::STOCK_ON_HAND, input.stock_on_hand)
            .set(fields::STOCK_MIN, input.stock_min)
            .set(fields::CATEGORY_ID, input.category_id)
            .set(fields::SUPPLIER_ID, input.supplier_id)
            .text(fields::BARCODE, input.barcode.as_deref())
            .set(fields::ACTIVE, true)
            .server_time(fields::REGISTERED_AT)
            .server_time(fields::UPDATED_AT)
            .build()
    }

    /// Mutable fields plus a fresh `updatedAt`; `registeredAt` is preserved.
    pub fn update_payload(product: &Product) -> Fields {
        FieldWriter::new()
            .set(fields::NAME, product.name.as_str())
            .set(fields::DESCRIPTION, product.description.as_str())
            .set(fields::UNIT_PRICE, product.unit_price)
            .set(fields::STOCK_ON_HAND, product.stock_on_hand)
            .set(fields::STOCK_MIN, product.stock_min)
            .set(fields::CATEGORY_ID, product.category_id)
            .set(fields::SUPPLIER_ID, product.supplier_id)
            .set(fields::BARCODE, product.barcode.as_str())
            .set(fields::ACTIVE, product.active)
            .server_time(fields::UPDATED_AT)
            .build()
    }

    pub fn stock_payload(stock_on_hand: i32) -> Fields {
        FieldWriter::new()
            .set(fields::STOCK_ON_HAND, stock_on_hand)
            .server_time(fields::UPDATED_AT)
            .build()
    }

    pub fn deactivation_payload() -> Fields {
        FieldWriter::new()
            .set(fields::ACTIVE, false)
            .server_time(fields::UPDATED_AT)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FieldValue;

    fn legacy_document() -> Document {
        let mut raw = Fields::new();
        raw.insert("nombre_producto".into(), FieldValue::from("Teclado"));
        raw.insert("precio".into(), FieldValue::Integer(25));
        raw.insert("stock_actual".into(), FieldValue::Double(4.0));
        raw.insert("stock_minimo".into(), FieldValue::Integer(10));
        raw.insert("id_categoria".into(), FieldValue::Integer(3));
        raw.insert("idProveedor".into(), FieldValue::Integer(-8));
        raw.insert("codigo_barras".into(), FieldValue::from("750100"));
        raw.insert("activo".into(), FieldValue::Boolean(true));
        raw.insert("timestamp".into(), FieldValue::Integer(1_650_000_000_000));
        Document::new("products", "7hQz1m9KXc2LrTnVbYwE", raw)
    }

    #[test]
    fn decodes_legacy_document() {
        let product = ProductMapper::from_document(&legacy_document()).unwrap();
        assert_eq!(product.id, -523_177_028);
        assert_eq!(product.name, "Teclado");
        assert_eq!(product.unit_price, 25.0);
        assert_eq!(product.stock_on_hand, 4);
        assert_eq!(product.stock_min, 10);
        assert_eq!(product.category_id, 3);
        assert_eq!(product.supplier_id, -8);
        assert_eq!(product.barcode, "750100");
        assert!(product.active);
        assert!(product.registered_at.is_none());
        assert_eq!(
            product.updated_at.map(|ts| ts.timestamp_millis()),
            Some(1_650_000_000_000)
        );
        assert!(product.is_low_stock());
    }

    #[test]
    fn missing_active_flag_defaults_to_true() {
        let mut doc = legacy_document();
        doc.fields.remove("activo");
        assert!(ProductMapper::from_document(&doc).unwrap().active);
    }

    #[test]
    fn creation_payload_starts_active_with_server_times() {
        let id = EntityId::from_document_id("7hQz1m9KXc2LrTnVbYwE");
        let input = NewProduct {
            name: "Mouse".into(),
            unit_price: 10.5,
            stock_on_hand: 20,
            stock_min: 5,
            category_id: 1,
            supplier_id: 2,
            ..NewProduct::default()
        };
        let payload = ProductMapper::creation_payload(&id, &input);
        assert_eq!(payload.get("active"), Some(&FieldValue::Boolean(true)));
        assert_eq!(payload.get("barcode"), Some(&FieldValue::from("")));
        assert_eq!(payload.get("registeredAt"), Some(&FieldValue::ServerTimestamp));
        assert_eq!(payload.get("updatedAt"), Some(&FieldValue::ServerTimestamp));
        assert_eq!(payload.get("id"), Some(&FieldValue::Integer(-523_177_028)));
    }

    #[test]
    fn stock_payload_touches_only_stock_and_time() {
        let payload = ProductMapper::stock_payload(7);
        assert_eq!(payload.len(), 2);
        assert_eq!(payload.get("stockOnHand"), Some(&FieldValue::Integer(7)));
    }

    #[test]
    fn update_payload_keeps_registration_time() {
        let mut product = ProductMapper::from_document(&legacy_document()).unwrap();
        product.category_name = Some("Periféricos".into());
        let payload = ProductMapper::update_payload(&product);
        assert!(!payload.contains_key("registeredAt"));
        assert!(!payload.contains_key("categoryName"));
        assert_eq!(payload.get("updatedAt"), Some(&FieldValue::ServerTimestamp));
    }
}
