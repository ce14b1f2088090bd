//! Per-entity sync configuration.
//!
//! Built once through [`EntitySyncConfigBuilder`] and validated at
//! [`build`](EntitySyncConfigBuilder::build); the resulting config is
//! immutable and every identifier in it has already passed the sanitizer.

use thiserror::Error;

use crate::security::identifier::{validate, validate_collection_name, IdentifierKind, InjectionError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncConfigError {
    #[error(transparent)]
    InvalidIdentifier(#[from] InjectionError),

    #[error("entity '{label}' syncs to neither store")]
    NothingToSync { label: String },

    #[error("vector sync for '{label}' names no text fields")]
    NoVectorFields { label: String },
}

/// Vector-side settings: which collection and which fields become the
/// embedded text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorSync {
    pub collection: String,
    pub text_fields: Vec<String>,
}

/// An outgoing relationship derived from a foreign-key attribute:
/// `(entity)-[rel_type]->(target_label {target_key: entity[foreign_key]})`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipSync {
    pub rel_type: String,
    pub target_label: String,
    pub target_key: String,
    pub foreign_key: String,
}

impl RelationshipSync {
    pub fn new(
        rel_type: impl Into<String>,
        target_label: impl Into<String>,
        target_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            rel_type: rel_type.into(),
            target_label: target_label.into(),
            target_key: target_key.into(),
            foreign_key: foreign_key.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySyncConfig {
    label: String,
    id_field: String,
    graph_enabled: bool,
    graph_properties: Vec<String>,
    vector: Option<VectorSync>,
    relationships: Vec<RelationshipSync>,
}

impl EntitySyncConfig {
    pub fn builder(label: impl Into<String>) -> EntitySyncConfigBuilder {
        EntitySyncConfigBuilder {
            label: label.into(),
            id_field: "id".to_string(),
            graph_enabled: true,
            graph_properties: Vec::new(),
            vector: None,
            relationships: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn graph_enabled(&self) -> bool {
        self.graph_enabled
    }

    /// Attribute names copied onto the graph node. Empty copies all.
    pub fn graph_properties(&self) -> &[String] {
        &self.graph_properties
    }

    pub fn vector(&self) -> Option<&VectorSync> {
        self.vector.as_ref()
    }

    pub fn relationships(&self) -> &[RelationshipSync] {
        &self.relationships
    }
}

#[derive(Debug, Clone)]
pub struct EntitySyncConfigBuilder {
    label: String,
    id_field: String,
    graph_enabled: bool,
    graph_properties: Vec<String>,
    vector: Option<VectorSync>,
    relationships: Vec<RelationshipSync>,
}

impl EntitySyncConfigBuilder {
    /// Attribute holding the entity's unique id. Defaults to `id`.
    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Skip the graph store for this entity.
    pub fn without_graph(mut self) -> Self {
        self.graph_enabled = false;
        self
    }

    pub fn graph_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.graph_properties = properties.into_iter().map(Into::into).collect();
        self
    }

    pub fn vector<I, S>(mut self, collection: impl Into<String>, text_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vector = Some(VectorSync {
            collection: collection.into(),
            text_fields: text_fields.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn relationship(mut self, relationship: RelationshipSync) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn build(self) -> Result<EntitySyncConfig, SyncConfigError> {
        validate(&self.label, IdentifierKind::Label)?;
        validate(&self.id_field, IdentifierKind::PropertyKey)?;
        for property in &self.graph_properties {
            validate(property, IdentifierKind::PropertyKey)?;
        }
        for relationship in &self.relationships {
            validate(&relationship.rel_type, IdentifierKind::RelationshipType)?;
            validate(&relationship.target_label, IdentifierKind::Label)?;
            validate(&relationship.target_key, IdentifierKind::PropertyKey)?;
            validate(&relationship.foreign_key, IdentifierKind::PropertyKey)?;
        }

        if let Some(vector) = &self.vector {
            validate_collection_name(&vector.collection)?;
            if vector.text_fields.is_empty() {
                return Err(SyncConfigError::NoVectorFields { label: self.label });
            }
        }
        if !self.graph_enabled && self.vector.is_none() {
            return Err(SyncConfigError::NothingToSync { label: self.label });
        }

        Ok(EntitySyncConfig {
            label: self.label,
            id_field: self.id_field,
            graph_enabled: self.graph_enabled,
            graph_properties: self.graph_properties,
            vector: self.vector,
            relationships: self.relationships,
        })
    }
}
