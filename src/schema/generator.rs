//! Operation synthesis
//!
//! Produces example operations for root fields by walking the type graph. The walk is
//! bounded twice: by a depth budget and by how many times a type may appear on the
//! current path. Branches that hit either bound are emitted as bare field names.

use crate::error::{AuditError, Result};
use crate::schema::model::Schema;
use crate::schema::types::{unwrap_type, Field, FullType, TypeKind};
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;

/// Default depth budget for selection sets
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// How many times a type may appear on one path from the root
pub const DEFAULT_REPEAT_VISIT_LIMIT: usize = 2;

const INDENT: &str = "  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub fn keyword(self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Result of walking one composite type
enum Selection {
    /// Rendered selection lines, possibly empty
    Fields(String),
    /// The walk stopped here (depth budget spent or type repeated too often)
    Truncated,
}

/// Generates operations against a loaded [`Schema`]
#[derive(Debug, Clone, Copy)]
pub struct OperationGenerator<'a> {
    schema: &'a Schema,
    max_depth: usize,
    repeat_visit_limit: usize,
}

impl<'a> OperationGenerator<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            max_depth: DEFAULT_MAX_DEPTH,
            repeat_visit_limit: DEFAULT_REPEAT_VISIT_LIMIT,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_repeat_visit_limit(mut self, limit: usize) -> Self {
        self.repeat_visit_limit = limit;
        self
    }

    pub fn generate_query(&self, field_name: &str) -> Result<String> {
        self.generate(OperationKind::Query, field_name)
    }

    pub fn generate_mutation(&self, field_name: &str) -> Result<String> {
        self.generate(OperationKind::Mutation, field_name)
    }

    pub fn generate_subscription(&self, field_name: &str) -> Result<String> {
        self.generate(OperationKind::Subscription, field_name)
    }

    /// Render an operation named after `field_name` that selects that root field
    pub fn generate(&self, kind: OperationKind, field_name: &str) -> Result<String> {
        if self.max_depth == 0 || self.repeat_visit_limit == 0 {
            return Err(AuditError::validation(
                "max depth and repeat-visit limit must be at least 1",
            ));
        }

        let root = match kind {
            OperationKind::Query => self.schema.query_root(),
            OperationKind::Mutation => self.schema.mutation_root(),
            OperationKind::Subscription => self.schema.subscription_root(),
        };
        let field = root
            .and_then(|root| root.field(field_name))
            .ok_or_else(|| AuditError::field_not_found(field_name, kind.keyword()))?;

        let mut document = format!("{} {} {{\n{}{}", kind, field_name, INDENT, field_name);
        document.push_str(&render_arguments(field));

        let return_type = unwrap_type(&field.ty);
        let mut visits = HashMap::new();
        let selection = if return_type.kind.is_leaf() {
            None
        } else {
            match self.select(return_type.base_name(), self.max_depth, 2, &mut visits) {
                Selection::Fields(lines) if !lines.is_empty() => Some(lines),
                _ => None,
            }
        };

        match selection {
            Some(lines) => {
                let _ = write!(document, " {{\n{}{}}}\n}}", lines, INDENT);
            }
            None => document.push_str("\n}"),
        }
        Ok(document)
    }

    /// Selection set for `type_name`, rendered at `level` levels of indentation
    fn select(
        &self,
        type_name: &str,
        depth: usize,
        level: usize,
        visits: &mut HashMap<String, usize>,
    ) -> Selection {
        if depth == 0 {
            return Selection::Truncated;
        }
        if visits.get(type_name).copied().unwrap_or(0) >= self.repeat_visit_limit {
            return Selection::Truncated;
        }
        let Some(full_type) = self.schema.type_by_name(type_name) else {
            return Selection::Fields(String::new());
        };

        *visits.entry(type_name.to_string()).or_insert(0) += 1;
        let lines = match full_type.kind {
            TypeKind::Union => self.select_union(full_type, depth, level, visits),
            _ => self.select_fields(full_type, depth, level, visits),
        };
        if let Some(count) = visits.get_mut(type_name) {
            *count -= 1;
        }

        Selection::Fields(lines)
    }

    fn select_fields(
        &self,
        full_type: &FullType,
        depth: usize,
        level: usize,
        visits: &mut HashMap<String, usize>,
    ) -> String {
        let indent = INDENT.repeat(level);
        let mut lines = String::new();
        for field in full_type.fields() {
            let field_type = unwrap_type(&field.ty);
            if field_type.kind.is_leaf() {
                let _ = writeln!(lines, "{}{}", indent, field.name);
                continue;
            }
            match self.select(field_type.base_name(), depth - 1, level + 1, visits) {
                Selection::Fields(nested) if !nested.is_empty() => {
                    let _ = write!(lines, "{}{} {{\n{}{}}}\n", indent, field.name, nested, indent);
                }
                _ => {
                    let _ = writeln!(lines, "{}{}", indent, field.name);
                }
            }
        }
        lines
    }

    /// `__typename` plus one inline fragment per member that yields a selection
    fn select_union(
        &self,
        full_type: &FullType,
        depth: usize,
        level: usize,
        visits: &mut HashMap<String, usize>,
    ) -> String {
        let indent = INDENT.repeat(level);
        let mut lines = format!("{}__typename\n", indent);
        for member in full_type.possible_types() {
            let member_name = member.base_name();
            if let Selection::Fields(nested) = self.select(member_name, depth - 1, level + 1, visits) {
                if !nested.is_empty() {
                    let _ = write!(lines, "{}... on {} {{\n{}{}}}\n", indent, member_name, nested, indent);
                }
            }
        }
        lines
    }
}

/// `(name: Type!, other: [Int])` placeholders, empty when the field takes no arguments
fn render_arguments(field: &Field) -> String {
    if field.args.is_empty() {
        return String::new();
    }
    let args: Vec<String> = field
        .args
        .iter()
        .map(|arg| format!("{}: {}", arg.name, arg.ty))
        .collect();
    format!("({})", args.join(", "))
}
