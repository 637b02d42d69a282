//! Junction-table resolution for many-to-many relations.

use super::many_to_many::ManyToManyDef;
use crate::query::validate_identifier;
use crate::record::RecordError;
use crate::schema::TableSchema;

/// The tables, junction and foreign-key columns behind one relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationLink {
    pub owner_table: String,
    pub owner_key: String,
    pub related_table: String,
    pub related_key: String,
    pub junction: String,
    /// Junction column holding the owner's primary key
    pub owner_column: String,
    /// Junction column holding the related record's primary key
    pub related_column: String,
}

impl AssociationLink {
    /// `<a>_to_<b>` with the two table names in alphabetical order, so both
    /// sides of a relation derive the same junction.
    pub fn junction_name(a: &str, b: &str) -> String {
        if a <= b {
            format!("{a}_to_{b}")
        } else {
            format!("{b}_to_{a}")
        }
    }

    /// `<singular(table)>_<primary key>`
    pub fn foreign_key(schema: &TableSchema) -> String {
        format!("{}_{}", schema.singular_name(), schema.primary_key())
    }

    /// Resolve the link for `def` declared on `owner`
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Configuration` when both foreign-key columns
    /// resolve to the same name (self-referential relations need an
    /// override), and `RecordError::Build` for invalid identifiers.
    pub fn derive(
        owner: &TableSchema,
        related: &TableSchema,
        def: &ManyToManyDef,
    ) -> Result<Self, RecordError> {
        let link = Self {
            owner_table: owner.name().to_string(),
            owner_key: owner.primary_key().to_string(),
            related_table: related.name().to_string(),
            related_key: related.primary_key().to_string(),
            junction: def
                .junction_override()
                .map(str::to_string)
                .unwrap_or_else(|| Self::junction_name(owner.name(), related.name())),
            owner_column: def
                .owner_column_override()
                .map(str::to_string)
                .unwrap_or_else(|| Self::foreign_key(owner)),
            related_column: def
                .related_column_override()
                .map(str::to_string)
                .unwrap_or_else(|| Self::foreign_key(related)),
        };
        validate_identifier(&link.junction)?;
        validate_identifier(&link.owner_column)?;
        validate_identifier(&link.related_column)?;
        if link.owner_column == link.related_column {
            return Err(RecordError::Configuration(format!(
                "relation {:?} on {:?} maps both sides to junction column {:?}",
                def.name(),
                link.owner_table,
                link.owner_column
            )));
        }
        Ok(link)
    }

    /// True when `other` walks the same junction in the opposite direction.
    pub fn is_reverse_of(&self, other: &AssociationLink) -> bool {
        self.junction == other.junction
            && self.owner_table == other.related_table
            && self.related_table == other.owner_table
            && self.owner_column == other.related_column
            && self.related_column == other.owner_column
    }

    pub(crate) fn qualified_owner_column(&self) -> String {
        format!("{}.{}", self.junction, self.owner_column)
    }

    pub(crate) fn qualified_related_column(&self) -> String {
        format!("{}.{}", self.junction, self.related_column)
    }

    pub(crate) fn qualified_related_key(&self) -> String {
        format!("{}.{}", self.related_table, self.related_key)
    }
}
