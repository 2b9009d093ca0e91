//! # Entity Model
//!
//! Typed record bodies for the six entity kinds, built from resolved fields.
//!
//! Field slots are fixed per kind. A server key this module does not know, or
//! a value whose shape does not fit its slot, is kept in the record's `extra`
//! map instead of failing the whole response.

use crate::entity::{AnyEntity, Entity, Field, FieldSet, Link, Record};
use crate::types::{EntityKind, StructDbError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Unresolved leftovers of a record.
pub type Extra = BTreeMap<String, Field>;

macro_rules! record_kind {
    ($record:ident, $variant:ident) => {
        impl Record for $record {
            const KIND: EntityKind = EntityKind::$variant;

            fn from_fields(fields: FieldSet) -> Self {
                Self::build(fields)
            }

            fn wrap(link: Link<Self>) -> AnyEntity {
                AnyEntity::$variant(link)
            }

            fn unwrap(entity: &AnyEntity) -> Option<&Link<Self>> {
                match entity {
                    AnyEntity::$variant(link) => Some(link),
                    _ => None,
                }
            }
        }
    };
}

// =============================================================================
// STRUCTURE DATA
// =============================================================================

/// Crystal-structure fields shared by `StructureEntry` and `GenericEntry`.
#[derive(Debug, Clone, Default)]
pub struct StructureData {
    pub composition: Option<String>,
    pub occupation: Vec<String>,
    pub wyckoff_sites: Option<Value>,
    pub magnetic_moments: Option<Vec<f64>>,
    pub charges: Option<Vec<f64>>,
    pub lattice_vectors: Vec<[f64; 3]>,
    pub coordinates: Vec<[f64; 3]>,
    /// `relative` (fractional) or `absolute` (Cartesian).
    pub coordinates_type: Option<String>,
    pub number_of_atoms: Option<u64>,
    pub number_of_atomtypes: Option<u64>,
    pub pearson: Option<String>,
    pub spacegroup: Option<Value>,
}

impl StructureData {
    fn take(fields: &mut FieldSet) -> Self {
        Self {
            composition: fields.take_json("COMPOSITION"),
            occupation: fields.take_json("OCCUPATION").unwrap_or_default(),
            wyckoff_sites: fields.take_value("WYCKOFF_SITES"),
            magnetic_moments: fields.take_json("MAGNETIC_MOMENTS"),
            charges: fields.take_json("CHARGES"),
            lattice_vectors: fields.take_json("LATTICE_VECTORS").unwrap_or_default(),
            coordinates: fields.take_json("COORDINATES").unwrap_or_default(),
            coordinates_type: fields.take_json("COORDINATES_TYPE"),
            number_of_atoms: fields.take_json("NUMBER_OF_ATOMS"),
            number_of_atomtypes: fields.take_json("NUMBER_OF_ATOMTYPES"),
            pearson: fields.take_json("PEARSON"),
            spacegroup: fields.take_value("SPACEGROUP"),
        }
    }

    /// The coordinate frame of `coordinates`.
    pub fn frame(&self) -> Result<CoordinateFrame, StructDbError> {
        match self.coordinates_type.as_deref() {
            Some("relative") => Ok(CoordinateFrame::Relative),
            Some("absolute") => Ok(CoordinateFrame::Absolute),
            Some(other) => Err(StructDbError::UnknownCoordinateFrame(other.to_string())),
            None => Err(StructDbError::UnknownCoordinateFrame("<missing>".to_string())),
        }
    }

    /// Build an atomic configuration in Cartesian coordinates.
    pub fn to_atoms(&self) -> Result<Atoms, StructDbError> {
        let frame = self.frame()?;
        let cell: [[f64; 3]; 3] = match self.lattice_vectors.as_slice() {
            [a, b, c] => [*a, *b, *c],
            other => {
                return Err(StructDbError::InvalidStructure(format!(
                    "expected 3 lattice vectors, found {}",
                    other.len()
                )));
            }
        };
        if self.occupation.len() != self.coordinates.len() {
            return Err(StructDbError::InvalidStructure(format!(
                "{} symbols for {} coordinates",
                self.occupation.len(),
                self.coordinates.len()
            )));
        }

        let (positions, pbc) = match frame {
            CoordinateFrame::Relative => (
                self.coordinates
                    .iter()
                    .map(|frac| fractional_to_cartesian(frac, &cell))
                    .collect(),
                [true; 3],
            ),
            CoordinateFrame::Absolute => (
                self.coordinates.clone(),
                [
                    has_length(&cell[0]),
                    has_length(&cell[1]),
                    has_length(&cell[2]),
                ],
            ),
        };

        Ok(Atoms {
            symbols: self.occupation.clone(),
            cell,
            positions,
            pbc,
            initial_magnetic_moments: self.magnetic_moments.clone().filter(|m| !m.is_empty()),
            initial_charges: self.charges.clone().filter(|c| !c.is_empty()),
            generic_parent: None,
            strukturbericht: None,
        })
    }
}

#[allow(clippy::float_arithmetic)]
fn fractional_to_cartesian(frac: &[f64; 3], cell: &[[f64; 3]; 3]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (axis, slot) in out.iter_mut().enumerate() {
        *slot = frac[0] * cell[0][axis] + frac[1] * cell[1][axis] + frac[2] * cell[2][axis];
    }
    out
}

fn has_length(vector: &[f64; 3]) -> bool {
    vector.iter().any(|c| *c != 0.0)
}

/// Frame of a structure's coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateFrame {
    /// Fractional coordinates in units of the lattice vectors.
    Relative,
    /// Cartesian coordinates.
    Absolute,
}

/// An atomic configuration ready for simulation tooling.
#[derive(Debug, Clone)]
pub struct Atoms {
    pub symbols: Vec<String>,
    /// Rows are lattice vectors.
    pub cell: [[f64; 3]; 3],
    /// Cartesian positions.
    pub positions: Vec<[f64; 3]>,
    pub pbc: [bool; 3],
    pub initial_magnetic_moments: Option<Vec<f64>>,
    pub initial_charges: Option<Vec<f64>>,
    pub generic_parent: Option<Link<GenericEntry>>,
    pub strukturbericht: Option<String>,
}

// =============================================================================
// STRUCTURE ENTRY
// =============================================================================

/// A concrete crystal structure.
#[derive(Debug, Clone, Default)]
pub struct StructureEntry {
    pub data: StructureData,
    pub generic_parent: Option<Link<GenericEntry>>,
    pub extra: Extra,
}

impl StructureEntry {
    fn build(mut fields: FieldSet) -> Self {
        let data = StructureData::take(&mut fields);
        let generic_parent = fields.take_link("GENERICPARENT");
        Self {
            data,
            generic_parent,
            extra: fields.into_extra(),
        }
    }

    /// Build atoms, carrying the generic parent and its Strukturbericht label.
    pub fn to_atoms(&self) -> Result<Atoms, StructDbError> {
        let mut atoms = self.data.to_atoms()?;
        atoms.strukturbericht = self
            .generic_parent
            .as_ref()
            .and_then(|parent| parent.get())
            .and_then(|parent| parent.strukturbericht.clone());
        atoms.generic_parent = self.generic_parent.clone();
        Ok(atoms)
    }
}

record_kind!(StructureEntry, StructureEntry);

// =============================================================================
// GENERIC ENTRY
// =============================================================================

/// A prototype structure.
#[derive(Debug, Clone, Default)]
pub struct GenericEntry {
    pub data: StructureData,
    pub strukturbericht: Option<String>,
    pub prototype_name: Option<String>,
    pub prototype_structure: Option<Field>,
    pub extra: Extra,
}

impl GenericEntry {
    fn build(mut fields: FieldSet) -> Self {
        let data = StructureData::take(&mut fields);
        Self {
            data,
            strukturbericht: fields.take_json("STRUKTURBERICHT"),
            prototype_name: fields.take_json("PROTOTYPE_NAME"),
            prototype_structure: fields.take_field("PROTOTYPE_STRUCTURE"),
            extra: fields.into_extra(),
        }
    }
}

record_kind!(GenericEntry, GenericEntry);

// =============================================================================
// PROPERTY
// =============================================================================

/// A measured or computed property.
#[derive(Debug, Clone, Default)]
pub struct Property {
    pub name: Option<String>,
    pub value: Option<Value>,
    /// The structure the property was computed for.
    pub original_structure: Option<AnyEntity>,
    pub calculator_id: Option<Value>,
    pub calculator: Option<Link<CalculatorType>>,
    pub extra_settings: Option<Value>,
    pub type_id: Option<Value>,
    pub property_type: Option<Link<PropertyType>>,
    pub composition: Option<String>,
    pub children: BTreeMap<String, Link<Property>>,
    pub structures: BTreeMap<String, AnyEntity>,
    pub extra: Extra,
}

impl Property {
    /// Names of the fields that hold name-keyed mappings of references.
    pub const MAPPING_FIELDS: [&'static str; 2] = ["CHILDREN", "STRUCTURES"];

    fn build(mut fields: FieldSet) -> Self {
        Self {
            name: fields.take_json("NAME"),
            value: fields.take_value("_VALUE"),
            original_structure: fields.take_entity("ORIGINAL_STRUCTURE"),
            calculator_id: fields.take_value("CALCULATOR_ID"),
            calculator: fields.take_link("CALCULATOR"),
            extra_settings: fields.take_value("_EXTRA_SETTINGS"),
            type_id: fields.take_value("TYPE_ID"),
            property_type: fields.take_link("TYPE"),
            composition: fields.take_json("COMPOSITION"),
            children: fields.take_link_map("CHILDREN"),
            structures: fields.take_entity_map("STRUCTURES"),
            extra: fields.into_extra(),
        }
    }

    /// Name of the property type, if the type is linked and filled.
    pub fn type_name(&self) -> Option<String> {
        self.property_type
            .as_ref()
            .and_then(|t| t.get())
            .and_then(|t| t.name.clone())
    }
}

record_kind!(Property, Property);

// =============================================================================
// TAXONOMY KINDS
// =============================================================================

/// Taxonomy entry naming a class of properties.
#[derive(Debug, Clone, Default)]
pub struct PropertyType {
    pub name: Option<String>,
    pub extra: Extra,
}

impl PropertyType {
    fn build(mut fields: FieldSet) -> Self {
        Self {
            name: fields.take_json("NAME"),
            extra: fields.into_extra(),
        }
    }
}

record_kind!(PropertyType, PropertyType);

/// The code or method that produced a property.
#[derive(Debug, Clone, Default)]
pub struct CalculatorType {
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub settings: Option<Value>,
    pub extra: Extra,
}

impl CalculatorType {
    fn build(mut fields: FieldSet) -> Self {
        Self {
            name: fields.take_json("NAME"),
            short_name: fields.take_json("SHORT_NAME"),
            settings: fields.take_value("SETTINGS"),
            extra: fields.into_extra(),
        }
    }
}

record_kind!(CalculatorType, CalculatorType);

/// A way of comparing properties of one property type.
#[derive(Debug, Clone, Default)]
pub struct ComparisonType {
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub metrics_description: Option<String>,
    pub property_type_id: Option<Value>,
    pub property_type: Option<Link<PropertyType>>,
    pub extra: Extra,
}

impl ComparisonType {
    fn build(mut fields: FieldSet) -> Self {
        Self {
            name: fields.take_json("NAME"),
            code: fields.take_json("CODE"),
            description: fields.take_json("DESCRIPTION"),
            metrics_description: fields.take_json("METRICS_DESCRIPTION"),
            property_type_id: fields.take_value("PROPERTY_TYPE_ID"),
            property_type: fields.take_link("PROPERTY_TYPE"),
            extra: fields.into_extra(),
        }
    }
}

record_kind!(ComparisonType, ComparisonType);

// =============================================================================
// LABELS
// =============================================================================

fn or_blank(value: Option<&str>) -> &str {
    value.unwrap_or("")
}

impl fmt::Display for Entity<Property> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(p) => write!(
                f,
                "<Property #{}:{}:{}:{}>",
                self.id(),
                or_blank(p.type_name().as_deref()),
                or_blank(p.composition.as_deref()),
                or_blank(p.name.as_deref())
            ),
            None => write!(f, "<Property #{}>", self.id()),
        }
    }
}

impl fmt::Display for Entity<StructureEntry> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self.get();
        let composition = body.as_ref().and_then(|s| s.data.composition.as_deref());
        write!(f, "<StructureEntry #{}:{}>", self.id(), or_blank(composition))
    }
}

impl fmt::Display for Entity<GenericEntry> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self.get();
        let composition = body.as_ref().and_then(|g| g.data.composition.as_deref());
        write!(f, "<GenericEntry #{}:{}>", self.id(), or_blank(composition))
    }
}

impl fmt::Display for Entity<PropertyType> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self.get();
        let name = body.as_ref().and_then(|t| t.name.as_deref());
        write!(f, "<PropertyType #{}:{}>", self.id(), or_blank(name))
    }
}

impl fmt::Display for Entity<CalculatorType> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self.get();
        let name = body.as_ref().and_then(|c| c.name.as_deref());
        write!(f, "<CalculatorType #{}:{}>", self.id(), or_blank(name))
    }
}

impl fmt::Display for Entity<ComparisonType> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self.get();
        let name = body.as_ref().and_then(|c| c.name.as_deref());
        write!(f, "<ComparisonType #{}:{}>", self.id(), or_blank(name))
    }
}

impl fmt::Display for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property(e) => write!(f, "{e}"),
            Self::StructureEntry(e) => write!(f, "{e}"),
            Self::GenericEntry(e) => write!(f, "{e}"),
            Self::PropertyType(e) => write!(f, "{e}"),
            Self::CalculatorType(e) => write!(f, "{e}"),
            Self::ComparisonType(e) => write!(f, "{e}"),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::float_arithmetic)]
mod tests {
    use super::*;
    use crate::types::EntityKey;
    use serde_json::json;

    fn fields(pairs: &[(&str, Value)]) -> FieldSet {
        let mut set = FieldSet::new();
        for (key, value) in pairs {
            set.insert(*key, Field::Value(value.clone()));
        }
        set
    }

    fn cubic(frame: &str) -> StructureData {
        StructureData::take(&mut fields(&[
            ("OCCUPATION", json!(["Al", "Cu"])),
            (
                "LATTICE_VECTORS",
                json!([[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 2.0]]),
            ),
            ("COORDINATES", json!([[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]])),
            ("COORDINATES_TYPE", json!(frame)),
        ]))
    }

    #[test]
    fn relative_coordinates_scale_by_cell() {
        let atoms = cubic("relative").to_atoms().ok();
        let atoms = atoms.as_ref();
        assert_eq!(atoms.map(|a| a.positions[1]), Some([1.0, 1.0, 1.0]));
        assert_eq!(atoms.map(|a| a.pbc), Some([true; 3]));
    }

    #[test]
    fn absolute_coordinates_periodic_only_along_nonzero_vectors() {
        let mut data = cubic("absolute");
        data.lattice_vectors[2] = [0.0, 0.0, 0.0];
        let atoms = data.to_atoms().ok();
        assert_eq!(atoms.as_ref().map(|a| a.positions[1]), Some([0.5, 0.5, 0.5]));
        assert_eq!(atoms.map(|a| a.pbc), Some([true, true, false]));
    }

    #[test]
    fn unknown_frame_is_rejected() {
        assert!(matches!(
            cubic("spherical").to_atoms(),
            Err(StructDbError::UnknownCoordinateFrame(frame)) if frame == "spherical"
        ));
    }

    #[test]
    fn missing_lattice_is_rejected() {
        let mut data = cubic("relative");
        data.lattice_vectors.pop();
        assert!(matches!(data.to_atoms(), Err(StructDbError::InvalidStructure(_))));
    }

    #[test]
    fn empty_moments_are_dropped() {
        let mut data = cubic("relative");
        data.magnetic_moments = Some(Vec::new());
        data.charges = Some(vec![1.0, -1.0]);
        let atoms = data.to_atoms().ok();
        assert!(atoms.as_ref().is_some_and(|a| a.initial_magnetic_moments.is_none()));
        assert_eq!(atoms.and_then(|a| a.initial_charges), Some(vec![1.0, -1.0]));
    }

    #[test]
    fn unknown_keys_land_in_extra() {
        let record = PropertyType::build(fields(&[
            ("NAME", json!("bulk modulus")),
            ("UNITS", json!("GPa")),
        ]));
        assert_eq!(record.name.as_deref(), Some("bulk modulus"));
        assert!(record.extra.contains_key("UNITS"));
    }

    #[test]
    fn property_label_includes_type_and_composition() {
        let kind = Entity::new(
            EntityKey::new(EntityKind::PropertyType, 2),
            PropertyType::build(fields(&[("NAME", json!("elastic"))])),
        );
        let mut set = fields(&[("NAME", json!("C11")), ("COMPOSITION", json!("Al-1"))]);
        set.insert("TYPE", Field::Entity(AnyEntity::PropertyType(kind)));
        let property = Entity::new(EntityKey::new(EntityKind::Property, 9), Property::build(set));

        assert_eq!(property.to_string(), "<Property #9:elastic:Al-1:C11>");
    }

    #[test]
    fn unfilled_label_shows_only_id() {
        let shell: Link<Property> = Entity::shell(EntityKey::new(EntityKind::Property, 4));
        assert_eq!(shell.to_string(), "<Property #4>");
    }
}
