//! Typed array values read from datasets and attributes.

use crate::error::SelectionError;
use indexmap::IndexMap;
use ndarray::{ArrayD, Axis, IxDyn, Slice};
use std::fmt;
use std::ops::Range;

/// An object reference stored in a dataset cell or attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(pub u64);

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref:{}", self.0)
    }
}

/// Element type of an array.
#[derive(Debug, Clone, PartialEq)]
pub enum DType {
    Bool,
    Int,
    Float,
    Text,
    Ref,
    Compound(Vec<(String, DType)>),
}

impl DType {
    /// Whether any element (or compound field) is an object reference.
    pub fn has_refs(&self) -> bool {
        match self {
            DType::Ref => true,
            DType::Compound(fields) => fields.iter().any(|(_, dtype)| dtype.has_refs()),
            _ => false,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Bool => write!(f, "bool"),
            DType::Int => write!(f, "int"),
            DType::Float => write!(f, "float"),
            DType::Text => write!(f, "text"),
            DType::Ref => write!(f, "ref"),
            DType::Compound(fields) => {
                write!(f, "compound{{")?;
                for (i, (name, dtype)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {dtype}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// A single element.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Ref(ObjectRef),
}

/// Which elements to read, along the first axis.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    All,
    Index(usize),
    Range(Range<usize>),
    Points(Vec<usize>),
    Mask(Vec<bool>),
}

/// An n-dimensional array of one element type. Compound arrays hold one
/// array per field, all with the dataset's shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Bool(ArrayD<bool>),
    Int(ArrayD<i64>),
    Float(ArrayD<f64>),
    Text(ArrayD<String>),
    Ref(ArrayD<ObjectRef>),
    Compound(IndexMap<String, ArrayData>),
}

impl ArrayData {
    pub fn scalar(value: Scalar) -> Self {
        let dim = IxDyn(&[]);
        match value {
            Scalar::Bool(v) => ArrayData::Bool(ArrayD::from_elem(dim, v)),
            Scalar::Int(v) => ArrayData::Int(ArrayD::from_elem(dim, v)),
            Scalar::Float(v) => ArrayData::Float(ArrayD::from_elem(dim, v)),
            Scalar::Text(v) => ArrayData::Text(ArrayD::from_elem(dim, v)),
            Scalar::Ref(v) => ArrayData::Ref(ArrayD::from_elem(dim, v)),
        }
    }

    pub fn ints(values: impl IntoIterator<Item = i64>) -> Self {
        ArrayData::Int(vec1d(values.into_iter().collect()))
    }

    pub fn floats(values: impl IntoIterator<Item = f64>) -> Self {
        ArrayData::Float(vec1d(values.into_iter().collect()))
    }

    pub fn bools(values: impl IntoIterator<Item = bool>) -> Self {
        ArrayData::Bool(vec1d(values.into_iter().collect()))
    }

    pub fn texts<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        ArrayData::Text(vec1d(
            values.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn refs(values: impl IntoIterator<Item = ObjectRef>) -> Self {
        ArrayData::Ref(vec1d(values.into_iter().collect()))
    }

    pub fn compound<S: Into<String>>(fields: impl IntoIterator<Item = (S, ArrayData)>) -> Self {
        ArrayData::Compound(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            ArrayData::Bool(a) => a.shape().to_vec(),
            ArrayData::Int(a) => a.shape().to_vec(),
            ArrayData::Float(a) => a.shape().to_vec(),
            ArrayData::Text(a) => a.shape().to_vec(),
            ArrayData::Ref(a) => a.shape().to_vec(),
            ArrayData::Compound(fields) => fields
                .values()
                .next()
                .map(ArrayData::shape)
                .unwrap_or_else(|| vec![0]),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            ArrayData::Bool(_) => DType::Bool,
            ArrayData::Int(_) => DType::Int,
            ArrayData::Float(_) => DType::Float,
            ArrayData::Text(_) => DType::Text,
            ArrayData::Ref(_) => DType::Ref,
            ArrayData::Compound(fields) => DType::Compound(
                fields
                    .iter()
                    .map(|(name, data)| (name.clone(), data.dtype()))
                    .collect(),
            ),
        }
    }

    /// Length of the first axis; a rank-0 array has length 1.
    pub fn len(&self) -> usize {
        self.shape().first().copied().unwrap_or(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn field(&self, name: &str) -> Option<&ArrayData> {
        match self {
            ArrayData::Compound(fields) => fields.get(name),
            _ => None,
        }
    }

    /// The single element of a rank-0 (or one-element) array.
    pub fn as_scalar(&self) -> Option<Scalar> {
        fn single<T: Clone>(a: &ArrayD<T>) -> Option<T> {
            if a.len() == 1 {
                a.iter().next().cloned()
            } else {
                None
            }
        }
        match self {
            ArrayData::Bool(a) => single(a).map(Scalar::Bool),
            ArrayData::Int(a) => single(a).map(Scalar::Int),
            ArrayData::Float(a) => single(a).map(Scalar::Float),
            ArrayData::Text(a) => single(a).map(Scalar::Text),
            ArrayData::Ref(a) => single(a).map(Scalar::Ref),
            ArrayData::Compound(_) => None,
        }
    }

    /// Every element in logical order, for arrays of any rank.
    pub fn to_scalars(&self) -> Vec<Scalar> {
        match self {
            ArrayData::Bool(a) => a.iter().copied().map(Scalar::Bool).collect(),
            ArrayData::Int(a) => a.iter().copied().map(Scalar::Int).collect(),
            ArrayData::Float(a) => a.iter().copied().map(Scalar::Float).collect(),
            ArrayData::Text(a) => a.iter().cloned().map(Scalar::Text).collect(),
            ArrayData::Ref(a) => a.iter().copied().map(Scalar::Ref).collect(),
            ArrayData::Compound(_) => Vec::new(),
        }
    }

    /// Every object reference in the array, including inside compound fields.
    pub fn refs_iter(&self) -> Vec<ObjectRef> {
        match self {
            ArrayData::Ref(a) => a.iter().copied().collect(),
            ArrayData::Compound(fields) => fields.values().flat_map(ArrayData::refs_iter).collect(),
            _ => Vec::new(),
        }
    }

    /// Apply a selection along the first axis.
    pub fn select(&self, selection: &Selection) -> Result<ArrayData, SelectionError> {
        Ok(match self {
            ArrayData::Bool(a) => ArrayData::Bool(select_axis0(a, selection)?),
            ArrayData::Int(a) => ArrayData::Int(select_axis0(a, selection)?),
            ArrayData::Float(a) => ArrayData::Float(select_axis0(a, selection)?),
            ArrayData::Text(a) => ArrayData::Text(select_axis0(a, selection)?),
            ArrayData::Ref(a) => ArrayData::Ref(select_axis0(a, selection)?),
            ArrayData::Compound(fields) => ArrayData::Compound(
                fields
                    .iter()
                    .map(|(name, data)| Ok((name.clone(), data.select(selection)?)))
                    .collect::<Result<IndexMap<_, _>, SelectionError>>()?,
            ),
        })
    }
}

fn vec1d<T>(values: Vec<T>) -> ArrayD<T> {
    ndarray::Array1::from(values).into_dyn()
}

fn select_axis0<T: Clone>(array: &ArrayD<T>, selection: &Selection) -> Result<ArrayD<T>, SelectionError> {
    if array.ndim() == 0 {
        return match selection {
            Selection::All => Ok(array.clone()),
            other => Err(SelectionError(format!("cannot apply {other:?} to a scalar"))),
        };
    }
    let len = array.len_of(Axis(0));
    let out_of_bounds = |index: usize| SelectionError(format!("index {index} out of bounds for length {len}"));
    match selection {
        Selection::All => Ok(array.clone()),
        Selection::Index(index) => {
            if *index >= len {
                return Err(out_of_bounds(*index));
            }
            Ok(array.index_axis(Axis(0), *index).to_owned())
        }
        Selection::Range(range) => {
            if range.start > range.end || range.end > len {
                return Err(SelectionError(format!(
                    "range {}..{} out of bounds for length {len}",
                    range.start, range.end
                )));
            }
            Ok(array.slice_axis(Axis(0), Slice::from(range.clone())).to_owned())
        }
        Selection::Points(points) => {
            if let Some(bad) = points.iter().find(|&&p| p >= len) {
                return Err(out_of_bounds(*bad));
            }
            Ok(array.select(Axis(0), points))
        }
        Selection::Mask(mask) => {
            if mask.len() != len {
                return Err(SelectionError(format!(
                    "mask of length {} for axis of length {len}",
                    mask.len()
                )));
            }
            let points: Vec<usize> = mask
                .iter()
                .enumerate()
                .filter_map(|(i, keep)| keep.then_some(i))
                .collect();
            Ok(array.select(Axis(0), &points))
        }
    }
}
