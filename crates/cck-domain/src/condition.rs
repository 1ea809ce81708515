use serde::{Deserialize, Serialize};

use crate::primitive::Primitive;

// ── Condition kinds ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistenceKind {
    Exists,
    NotExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareKind {
    Eq,
    Neq,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Exists,
    NotExists,
}

// ── AttributeCondition ────────────────────────────────────────────────────────

/// A precondition evaluated against an item's JSON before a conditional
/// database write. Multiple conditions on one operation combine by logical
/// AND.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum AttributeCondition {
    /// Tests top-level presence of the attribute.
    Existence { op: ExistenceKind, attribute: String },
    /// Orders the attribute (coerced to a [`Primitive`]) against a reference
    /// value. Fails when the attribute is absent.
    Value { op: CompareKind, attribute: String, value: Primitive },
    /// Tests membership of an element in an array attribute.
    ArrayElement { op: ElementKind, attribute: String, element: Primitive },
}

impl AttributeCondition {
    pub fn exists(attribute: impl Into<String>) -> Self {
        AttributeCondition::Existence { op: ExistenceKind::Exists, attribute: attribute.into() }
    }

    pub fn not_exists(attribute: impl Into<String>) -> Self {
        AttributeCondition::Existence { op: ExistenceKind::NotExists, attribute: attribute.into() }
    }

    pub fn compare(op: CompareKind, attribute: impl Into<String>, value: Primitive) -> Self {
        AttributeCondition::Value { op, attribute: attribute.into(), value }
    }

    pub fn eq(attribute: impl Into<String>, value: Primitive) -> Self {
        Self::compare(CompareKind::Eq, attribute, value)
    }

    pub fn neq(attribute: impl Into<String>, value: Primitive) -> Self {
        Self::compare(CompareKind::Neq, attribute, value)
    }

    pub fn gt(attribute: impl Into<String>, value: Primitive) -> Self {
        Self::compare(CompareKind::Gt, attribute, value)
    }

    pub fn ge(attribute: impl Into<String>, value: Primitive) -> Self {
        Self::compare(CompareKind::Ge, attribute, value)
    }

    pub fn lt(attribute: impl Into<String>, value: Primitive) -> Self {
        Self::compare(CompareKind::Lt, attribute, value)
    }

    pub fn le(attribute: impl Into<String>, value: Primitive) -> Self {
        Self::compare(CompareKind::Le, attribute, value)
    }

    pub fn array_element_exists(attribute: impl Into<String>, element: Primitive) -> Self {
        AttributeCondition::ArrayElement {
            op: ElementKind::Exists,
            attribute: attribute.into(),
            element,
        }
    }

    pub fn array_element_not_exists(attribute: impl Into<String>, element: Primitive) -> Self {
        AttributeCondition::ArrayElement {
            op: ElementKind::NotExists,
            attribute: attribute.into(),
            element,
        }
    }

    /// The attribute this condition inspects.
    pub fn attribute(&self) -> &str {
        match self {
            AttributeCondition::Existence { attribute, .. } => attribute,
            AttributeCondition::Value { attribute, .. } => attribute,
            AttributeCondition::ArrayElement { attribute, .. } => attribute,
        }
    }
}
