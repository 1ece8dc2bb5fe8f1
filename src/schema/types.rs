//! Introspection type model
//!
//! Mirrors the shapes returned by the standard introspection query.

use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `__TypeKind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
    List,
    NonNull,
}

impl TypeKind {
    /// `LIST` and `NON_NULL` wrap another type reference
    pub fn is_wrapper(self) -> bool {
        matches!(self, TypeKind::List | TypeKind::NonNull)
    }

    /// Scalars and enums take no selection set
    pub fn is_leaf(self) -> bool {
        matches!(self, TypeKind::Scalar | TypeKind::Enum)
    }
}

/// A possibly wrapped reference to a named type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRef {
    pub kind: TypeKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "ofType", default, skip_serializing_if = "Option::is_none")]
    pub of_type: Option<Box<TypeRef>>,
}

impl TypeRef {
    pub fn named<S: Into<String>>(kind: TypeKind, name: S) -> Self {
        Self {
            kind,
            name: Some(name.into()),
            of_type: None,
        }
    }

    pub fn non_null(inner: TypeRef) -> Self {
        Self {
            kind: TypeKind::NonNull,
            name: None,
            of_type: Some(Box::new(inner)),
        }
    }

    pub fn list(inner: TypeRef) -> Self {
        Self {
            kind: TypeKind::List,
            name: None,
            of_type: Some(Box::new(inner)),
        }
    }

    /// Wrappers must wrap something; everything else must be named
    pub fn validate(&self) -> Result<()> {
        let mut current = self;
        loop {
            if current.kind.is_wrapper() {
                match current.of_type.as_deref() {
                    Some(inner) => current = inner,
                    None => {
                        return Err(AuditError::schema_load(format!(
                            "{:?} type reference without ofType (introspection nesting too shallow?)",
                            current.kind
                        )))
                    }
                }
            } else if current.name.as_deref().map_or(true, str::is_empty) {
                return Err(AuditError::schema_load(format!(
                    "{:?} type reference without a name",
                    current.kind
                )));
            } else {
                return Ok(());
            }
        }
    }

    /// Name of the innermost named type
    pub fn base_name(&self) -> &str {
        unwrap_type(self).name.as_deref().unwrap_or_default()
    }
}

impl fmt::Display for TypeRef {
    /// GraphQL SDL notation, e.g. `[String!]!`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.of_type.as_deref()) {
            (TypeKind::NonNull, Some(inner)) => write!(f, "{}!", inner),
            (TypeKind::List, Some(inner)) => write!(f, "[{}]", inner),
            _ => f.write_str(self.name.as_deref().unwrap_or("?")),
        }
    }
}

/// Strip `LIST` / `NON_NULL` wrappers down to the terminal reference
pub fn unwrap_type(type_ref: &TypeRef) -> &TypeRef {
    let mut current = type_ref;
    while current.kind.is_wrapper() {
        match current.of_type.as_deref() {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

/// `__InputValue`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputValue {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(default)]
    pub default_value: Option<String>,
}

/// `__Field`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub args: Vec<InputValue>,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(default)]
    pub is_deprecated: bool,
    #[serde(default)]
    pub deprecation_reason: Option<String>,
}

/// `__EnumValue`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumValue {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_deprecated: bool,
    #[serde(default)]
    pub deprecation_reason: Option<String>,
}

/// A named type definition as returned by the `FullType` fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullType {
    pub kind: TypeKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Option<Vec<Field>>,
    #[serde(default)]
    pub input_fields: Option<Vec<InputValue>>,
    #[serde(default)]
    pub interfaces: Option<Vec<TypeRef>>,
    #[serde(default)]
    pub enum_values: Option<Vec<EnumValue>>,
    #[serde(default)]
    pub possible_types: Option<Vec<TypeRef>>,
}

impl FullType {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    pub fn fields(&self) -> &[Field] {
        self.fields.as_deref().unwrap_or_default()
    }

    pub fn input_fields(&self) -> &[InputValue] {
        self.input_fields.as_deref().unwrap_or_default()
    }

    pub fn interfaces(&self) -> &[TypeRef] {
        self.interfaces.as_deref().unwrap_or_default()
    }

    pub fn enum_values(&self) -> &[EnumValue] {
        self.enum_values.as_deref().unwrap_or_default()
    }

    pub fn possible_types(&self) -> &[TypeRef] {
        self.possible_types.as_deref().unwrap_or_default()
    }

    /// Linear scan; field names are unique within a type
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields().iter().find(|field| field.name == name)
    }

    /// Validate every type reference this definition holds
    pub(crate) fn validate(&self) -> Result<()> {
        for field in self.fields() {
            field.ty.validate()?;
            for arg in &field.args {
                arg.ty.validate()?;
            }
        }
        for input in self.input_fields() {
            input.ty.validate()?;
        }
        for type_ref in self.interfaces().iter().chain(self.possible_types()) {
            type_ref.validate()?;
        }
        Ok(())
    }
}
