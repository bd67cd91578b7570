//! Dims/shape pairs to array expressions.
//!
//! A `dims`/`shape` pair is either flat (one candidate shape) or a list of
//! lists (several alternative shapes, used when a field's rank varies). Each
//! candidate becomes one [`ArrayExpression`]; several candidates become an
//! `any_of` constraint on the slot.

use crate::linkml::{AnonymousSlotExpression, ArrayExpression, DimensionExpression, SlotDefinition};
use nwb_schema_language::{Dims, Nested, Shape};
use tracing::warn;

/// Normalized array-shape constraint for one slot.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeExpression {
    Single(ArrayExpression),
    AnyOf(Vec<ArrayExpression>),
}

impl ShapeExpression {
    pub fn candidates(&self) -> &[ArrayExpression] {
        match self {
            ShapeExpression::Single(array) => std::slice::from_ref(array),
            ShapeExpression::AnyOf(arrays) => arrays,
        }
    }

    /// Attach this constraint to a slot. Alternatives keep the slot's range.
    pub fn apply_to(self, slot: &mut SlotDefinition) {
        match self {
            ShapeExpression::Single(array) => slot.array = Some(array),
            ShapeExpression::AnyOf(arrays) => {
                slot.any_of = arrays
                    .into_iter()
                    .map(|array| AnonymousSlotExpression {
                        range: slot.range.clone(),
                        array: Some(array),
                    })
                    .collect();
            }
        }
    }
}

/// Build the shape expression for an optional dims/shape pair.
///
/// Missing shapes mean "any size"; missing dims are named `dim_<i>`.
/// Returns `None` when neither is given.
pub fn from_parts(dims: Option<&Dims>, shape: Option<&Shape>) -> Option<ShapeExpression> {
    match (dims, shape) {
        (None, None) => None,
        (Some(dims), Some(shape)) => Some(shape_expression(dims, shape)),
        (Some(dims), None) => Some(shape_expression(dims, &unbounded_like(dims))),
        (None, Some(shape)) => Some(shape_expression(&anonymous_like(shape), shape)),
    }
}

/// Pair each dimension name with its cardinality, per candidate.
pub fn shape_expression(dims: &Dims, shape: &Shape) -> ShapeExpression {
    let mut candidates: Vec<ArrayExpression> = candidate_pairs(dims, shape)
        .into_iter()
        .map(|(names, sizes)| {
            if names.len() != sizes.len() {
                warn!(
                    "dims {:?} and shape {:?} differ in length; zipping the overlapping prefix",
                    names, sizes
                );
            }
            ArrayExpression {
                dimensions: names
                    .iter()
                    .zip(sizes.iter())
                    .map(|(name, size)| DimensionExpression {
                        alias: name.clone(),
                        exact_cardinality: *size,
                    })
                    .collect(),
            }
        })
        .collect();

    if candidates.len() == 1 {
        ShapeExpression::Single(candidates.remove(0))
    } else {
        ShapeExpression::AnyOf(candidates)
    }
}

type Candidate<'a> = (&'a [String], &'a [Option<u64>]);

fn candidate_pairs<'a>(dims: &'a Dims, shape: &'a Shape) -> Vec<Candidate<'a>> {
    match (dims, shape) {
        (Nested::Flat(names), Nested::Flat(sizes)) => vec![(names.as_slice(), sizes.as_slice())],
        (Nested::Nested(names), Nested::Nested(sizes)) => {
            if names.len() != sizes.len() {
                warn!(
                    "{} dims candidates but {} shape candidates; extra candidates dropped",
                    names.len(),
                    sizes.len()
                );
            }
            names
                .iter()
                .zip(sizes.iter())
                .map(|(n, s)| (n.as_slice(), s.as_slice()))
                .collect()
        }
        // Flat names with nested shapes: reuse the names for every shape.
        (Nested::Flat(names), Nested::Nested(sizes)) => sizes
            .iter()
            .map(|s| (names.as_slice(), s.as_slice()))
            .collect(),
        (Nested::Nested(names), Nested::Flat(sizes)) => names
            .iter()
            .map(|n| (n.as_slice(), sizes.as_slice()))
            .collect(),
    }
}

fn unbounded_like(dims: &Dims) -> Shape {
    match dims {
        Nested::Flat(names) => Nested::Flat(vec![None; names.len()]),
        Nested::Nested(lists) => Nested::Nested(lists.iter().map(|n| vec![None; n.len()]).collect()),
    }
}

fn anonymous_like(shape: &Shape) -> Dims {
    let names = |len: usize| (0..len).map(|i| format!("dim_{i}")).collect::<Vec<_>>();
    match shape {
        Nested::Flat(sizes) => Nested::Flat(names(sizes.len())),
        Nested::Nested(lists) => Nested::Nested(lists.iter().map(|s| names(s.len())).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn pairs(array: &ArrayExpression) -> Vec<(&str, Option<u64>)> {
        array
            .dimensions
            .iter()
            .map(|d| (d.alias.as_str(), d.exact_cardinality))
            .collect()
    }

    #[test]
    fn test_single_candidate() {
        let expr = shape_expression(
            &Nested::Flat(dims(&["a", "b"])),
            &Nested::Flat(vec![Some(1), Some(2)]),
        );
        match expr {
            ShapeExpression::Single(array) => {
                assert_eq!(pairs(&array), vec![("a", Some(1)), ("b", Some(2))]);
            }
            other => panic!("expected single candidate, got {other:?}"),
        }
    }

    #[test]
    fn test_multiple_candidates_preserve_order() {
        let expr = shape_expression(
            &Nested::Nested(vec![dims(&["a"]), dims(&["a", "b"])]),
            &Nested::Nested(vec![vec![Some(1)], vec![Some(1), Some(2)]]),
        );
        let candidates = expr.candidates();
        assert!(matches!(expr, ShapeExpression::AnyOf(_)));
        assert_eq!(candidates.len(), 2);
        assert_eq!(pairs(&candidates[0]), vec![("a", Some(1))]);
        assert_eq!(pairs(&candidates[1]), vec![("a", Some(1)), ("b", Some(2))]);
    }

    #[test]
    fn test_flat_dims_repeat_for_nested_shapes() {
        let expr = shape_expression(
            &Nested::Flat(dims(&["x", "y"])),
            &Nested::Nested(vec![vec![None, Some(3)], vec![Some(2), None]]),
        );
        let candidates = expr.candidates();
        assert_eq!(candidates.len(), 2);
        assert_eq!(pairs(&candidates[0]), vec![("x", None), ("y", Some(3))]);
        assert_eq!(pairs(&candidates[1]), vec![("x", Some(2)), ("y", None)]);
    }

    #[test]
    fn test_length_mismatch_zips_prefix() {
        let expr = shape_expression(
            &Nested::Flat(dims(&["a", "b", "c"])),
            &Nested::Flat(vec![Some(4)]),
        );
        assert_eq!(pairs(&expr.candidates()[0]), vec![("a", Some(4))]);
    }

    #[test]
    fn test_from_parts_fills_missing_side() {
        let only_dims = from_parts(Some(&Nested::Flat(dims(&["t"]))), None).unwrap();
        assert_eq!(pairs(&only_dims.candidates()[0]), vec![("t", None)]);

        let only_shape = from_parts(None, Some(&Nested::Flat(vec![Some(3), None]))).unwrap();
        assert_eq!(
            pairs(&only_shape.candidates()[0]),
            vec![("dim_0", Some(3)), ("dim_1", None)]
        );
        assert!(from_parts(None, None).is_none());
    }

    #[test]
    fn test_apply_any_of_keeps_range() {
        let expr = shape_expression(
            &Nested::Nested(vec![dims(&["a"]), dims(&["a", "b"])]),
            &Nested::Nested(vec![vec![None], vec![None, None]]),
        );
        let mut slot = SlotDefinition::new("data").with_range("float");
        expr.apply_to(&mut slot);
        assert!(slot.array.is_none());
        assert_eq!(slot.any_of.len(), 2);
        assert!(slot.any_of.iter().all(|alt| alt.range.as_deref() == Some("float")));
    }
}
