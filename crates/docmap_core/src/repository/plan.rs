//! Criteria, ordering and access-path selection.
//!
//! Planning only reads metadata; it never touches the store.

use crate::error::CoreResult;
use crate::hydrate::Hydrator;
use crate::metadata::ClassMetadata;
use docmap_codec::{FieldType, Value};
use std::cmp::Ordering;
use std::fmt;

/// Equality criteria, one value per field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    terms: Vec<(String, Value)>,
}

impl Criteria {
    /// Creates empty criteria (matches every document).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `field` to equal `value`. A later term on the same field
    /// replaces the earlier one.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        let value = value.into();
        match self.terms.iter_mut().find(|(name, _)| *name == field) {
            Some(term) => term.1 = value,
            None => self.terms.push((field, value)),
        }
        self
    }

    /// Terms in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.terms.iter().map(|(field, value)| (field.as_str(), value))
    }

    /// Number of terms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Returns true if there are no terms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

/// One client-side sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    field: String,
    direction: Direction,
}

impl OrderBy {
    /// Sorts by `field` with the given direction.
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    /// Ascending by `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, Direction::Asc)
    }

    /// Descending by `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, Direction::Desc)
    }

    /// The field sorted on.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The direction.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }
}

/// Compares two rows of sort values under `order`. Values that cannot be
/// compared are treated as equal so the stable sort keeps their order.
pub(crate) fn compare_rows(order: &[OrderBy], left: &[Value], right: &[Value]) -> Ordering {
    for ((order_by, a), b) in order.iter().zip(left).zip(right) {
        let ord = a.compare(b).unwrap_or(Ordering::Equal);
        let ord = match order_by.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// How candidate ids are fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Members of one secondary-index set.
    IndexLookup {
        /// The index set key.
        key: String,
    },
    /// Store-side intersection of several index sets.
    IndexIntersection {
        /// The index set keys.
        keys: Vec<String>,
    },
    /// Cursor scan over every primary key of the collection.
    CollectionScan {
        /// The scan pattern.
        pattern: String,
    },
}

/// The access path chosen for a set of criteria, plus the fields that
/// must still be checked on loaded documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    /// Candidate source.
    pub access: Access,
    /// Fields filtered client-side.
    pub residual: Vec<String>,
}

impl QueryPlan {
    /// Returns true if the plan enumerates the whole collection.
    #[must_use]
    pub const fn is_collection_scan(&self) -> bool {
        matches!(self.access, Access::CollectionScan { .. })
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.access {
            Access::IndexLookup { key } => write!(f, "IndexLookup({key})")?,
            Access::IndexIntersection { keys } => write!(f, "IndexIntersection({})", keys.join(", "))?,
            Access::CollectionScan { pattern } => write!(f, "CollectionScan({pattern})")?,
        }
        if !self.residual.is_empty() {
            write!(f, " filter [{}]", self.residual.join(", "))?;
        }
        Ok(())
    }
}

/// A criterion checked on loaded documents, compared in store form.
#[derive(Debug, Clone)]
pub(crate) struct Residual {
    pub field: String,
    ty: FieldType,
    expected: Option<String>,
}

impl Residual {
    pub fn matches(&self, hydrator: &dyn Hydrator, actual: &Value) -> CoreResult<bool> {
        Ok(hydrator.to_store(actual, self.ty)? == self.expected)
    }
}

pub(crate) struct Planned {
    pub plan: QueryPlan,
    pub residual: Vec<Residual>,
}

/// Splits criteria into index-served terms and residual terms.
///
/// A term is index-served when its field has a secondary index and its
/// value is not null.
pub(crate) fn plan_criteria(
    metadata: &ClassMetadata,
    hydrator: &dyn Hydrator,
    criteria: &Criteria,
) -> CoreResult<Planned> {
    let keys = metadata.keys();
    let mut index_keys = Vec::new();
    let mut residual = Vec::new();

    for term in residual_terms(metadata, hydrator, criteria)? {
        let index_key = match (metadata.index_for(&term.field), &term.expected) {
            (Some(index), Some(stored)) => Some(keys.index(index.name(), stored)),
            _ => None,
        };
        match index_key {
            Some(key) => index_keys.push(key),
            None => residual.push(term),
        }
    }

    let access = match index_keys.len() {
        0 => Access::CollectionScan {
            pattern: keys.collection_pattern(),
        },
        1 => Access::IndexLookup {
            key: index_keys.remove(0),
        },
        _ => Access::IndexIntersection { keys: index_keys },
    };
    Ok(Planned {
        plan: QueryPlan {
            access,
            residual: residual.iter().map(|r| r.field.clone()).collect(),
        },
        residual,
    })
}

/// Every term in store form, for callers that only filter loaded documents.
pub(crate) fn residual_terms(
    metadata: &ClassMetadata,
    hydrator: &dyn Hydrator,
    criteria: &Criteria,
) -> CoreResult<Vec<Residual>> {
    criteria
        .iter()
        .map(|(field, value)| {
            let ty = metadata.require_field(field)?.field_type();
            Ok(Residual {
                field: field.to_string(),
                ty,
                expected: hydrator.to_store(value, ty)?,
            })
        })
        .collect()
}
