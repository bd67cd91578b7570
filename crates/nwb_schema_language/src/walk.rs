//! Generic depth-first traversal over schema-language trees.
//!
//! [`Walkable::walk`] yields a node before its children, in field declaration
//! order. Each call builds a fresh iterator from the tree as it currently is,
//! so walking twice yields the same sequence.

use crate::dtype::{CompoundDtype, Dtype};
use crate::namespace::{Namespace, Namespaces, SchemaRef};
use crate::schema::{Attribute, Dataset, Group, Link, Schema};

/// Borrowed view of any node in a schema-language tree.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Namespaces(&'a Namespaces),
    Namespace(&'a Namespace),
    SchemaRef(&'a SchemaRef),
    Schema(&'a Schema),
    Group(&'a Group),
    Dataset(&'a Dataset),
    Attribute(&'a Attribute),
    Link(&'a Link),
    Dtype(&'a Dtype),
    CompoundField(&'a CompoundDtype),
}

/// Runtime kind of a [`Node`], used to filter walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Namespaces,
    Namespace,
    SchemaRef,
    Schema,
    Group,
    Dataset,
    Attribute,
    Link,
    Dtype,
    CompoundField,
}

impl<'a> Node<'a> {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Namespaces(_) => NodeKind::Namespaces,
            Node::Namespace(_) => NodeKind::Namespace,
            Node::SchemaRef(_) => NodeKind::SchemaRef,
            Node::Schema(_) => NodeKind::Schema,
            Node::Group(_) => NodeKind::Group,
            Node::Dataset(_) => NodeKind::Dataset,
            Node::Attribute(_) => NodeKind::Attribute,
            Node::Link(_) => NodeKind::Link,
            Node::Dtype(_) => NodeKind::Dtype,
            Node::CompoundField(_) => NodeKind::CompoundField,
        }
    }

    /// Direct children, in field declaration order.
    pub fn children(&self) -> Vec<Node<'a>> {
        match *self {
            Node::Namespaces(n) => n.namespaces.iter().map(Node::Namespace).collect(),
            Node::Namespace(n) => n.schema.iter().map(Node::SchemaRef).collect(),
            Node::SchemaRef(_) => Vec::new(),
            Node::Schema(s) => s
                .groups
                .iter()
                .map(Node::Group)
                .chain(s.datasets.iter().map(Node::Dataset))
                .collect(),
            Node::Group(g) => g
                .attributes
                .iter()
                .map(Node::Attribute)
                .chain(g.datasets.iter().map(Node::Dataset))
                .chain(g.groups.iter().map(Node::Group))
                .chain(g.links.iter().map(Node::Link))
                .collect(),
            Node::Dataset(d) => d
                .dtype
                .iter()
                .map(Node::Dtype)
                .chain(d.attributes.iter().map(Node::Attribute))
                .collect(),
            Node::Attribute(a) => vec![Node::Dtype(&a.dtype)],
            Node::Link(_) => Vec::new(),
            Node::Dtype(Dtype::Compound(fields)) => {
                fields.iter().map(Node::CompoundField).collect()
            }
            Node::Dtype(_) => Vec::new(),
            Node::CompoundField(c) => vec![Node::Dtype(&c.dtype)],
        }
    }

    /// String values of the field called `name` on this node (list-valued
    /// fields yield one entry per item).
    pub fn field_values(&self, name: &str) -> Vec<&'a str> {
        let single = |value: Option<&'a String>| value.map(|v| vec![v.as_str()]).unwrap_or_default();
        match (*self, name) {
            (Node::Namespace(n), "name") => vec![n.name.as_str()],
            (Node::Namespace(n), "version") => vec![n.version.as_str()],
            (Node::Namespace(n), "doc") => vec![n.doc.as_str()],
            (Node::Namespace(n), "full_name") => single(n.full_name.as_ref()),
            (Node::SchemaRef(s), "source") => single(s.source.as_ref()),
            (Node::SchemaRef(s), "namespace") => single(s.namespace.as_ref()),
            (Node::SchemaRef(s), "title") => single(s.title.as_ref()),
            (Node::SchemaRef(s), "neurodata_types") => s
                .neurodata_types
                .iter()
                .flatten()
                .map(String::as_str)
                .collect(),
            (Node::Group(g), "neurodata_type_def") => single(g.neurodata_type_def.as_ref()),
            (Node::Group(g), "neurodata_type_inc") => single(g.neurodata_type_inc.as_ref()),
            (Node::Group(g), "name") => single(g.name.as_ref()),
            (Node::Group(g), "default_name") => single(g.default_name.as_ref()),
            (Node::Group(g), "doc") => vec![g.doc.as_str()],
            (Node::Dataset(d), "neurodata_type_def") => single(d.neurodata_type_def.as_ref()),
            (Node::Dataset(d), "neurodata_type_inc") => single(d.neurodata_type_inc.as_ref()),
            (Node::Dataset(d), "name") => single(d.name.as_ref()),
            (Node::Dataset(d), "default_name") => single(d.default_name.as_ref()),
            (Node::Dataset(d), "doc") => vec![d.doc.as_str()],
            (Node::Attribute(a), "name") => vec![a.name.as_str()],
            (Node::Attribute(a), "doc") => vec![a.doc.as_str()],
            (Node::Link(l), "name") => single(l.name.as_ref()),
            (Node::Link(l), "doc") => vec![l.doc.as_str()],
            (Node::Link(l), "target_type") => vec![l.target_type.as_str()],
            (Node::Dtype(Dtype::Reference(r)), "target_type") => vec![r.target_type.as_str()],
            (Node::Dtype(Dtype::Flat(f)), "dtype") => vec![f.as_str()],
            (Node::CompoundField(c), "name") => vec![c.name.as_str()],
            (Node::CompoundField(c), "doc") => vec![c.doc.as_str()],
            _ => Vec::new(),
        }
    }

    pub fn as_group(&self) -> Option<&'a Group> {
        match *self {
            Node::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_dataset(&self) -> Option<&'a Dataset> {
        match *self {
            Node::Dataset(d) => Some(d),
            _ => None,
        }
    }
}

/// Lazy preorder iterator over a node and everything beneath it.
#[derive(Debug, Clone)]
pub struct Walk<'a> {
    stack: Vec<Node<'a>>,
}

impl<'a> Walk<'a> {
    pub fn new(root: Node<'a>) -> Self {
        Self { stack: vec![root] }
    }
}

impl<'a> Iterator for Walk<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children().into_iter().rev());
        Some(node)
    }
}

/// `(field, value)` pairs of every node carrying the requested field.
#[derive(Debug, Clone)]
pub struct WalkFields<'a, 'f> {
    walk: Walk<'a>,
    field: &'f str,
    pending: Vec<&'a str>,
}

impl<'a, 'f> Iterator for WalkFields<'a, 'f> {
    type Item = (&'f str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(value) = self.pending.pop() {
                return Some((self.field, value));
            }
            let node = self.walk.next()?;
            let mut values = node.field_values(self.field);
            values.reverse();
            self.pending = values;
        }
    }
}

/// Nodes whose kind is in a given set.
#[derive(Debug, Clone)]
pub struct WalkTypes<'a, 'k> {
    walk: Walk<'a>,
    kinds: &'k [NodeKind],
}

impl<'a, 'k> Iterator for WalkTypes<'a, 'k> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let kinds = self.kinds;
        self.walk.by_ref().find(|node| kinds.contains(&node.kind()))
    }
}

/// Anything that can be viewed as a [`Node`] can be walked.
pub trait Walkable {
    fn as_node(&self) -> Node<'_>;

    fn walk(&self) -> Walk<'_> {
        Walk::new(self.as_node())
    }

    fn walk_fields<'f>(&self, field: &'f str) -> WalkFields<'_, 'f> {
        WalkFields {
            walk: self.walk(),
            field,
            pending: Vec::new(),
        }
    }

    fn walk_types<'k>(&self, kinds: &'k [NodeKind]) -> WalkTypes<'_, 'k> {
        WalkTypes {
            walk: self.walk(),
            kinds,
        }
    }
}

macro_rules! impl_walkable {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Walkable for $ty {
                fn as_node(&self) -> Node<'_> {
                    Node::$variant(self)
                }
            }
        )*
    };
}

impl_walkable!(
    Namespaces => Namespaces,
    Namespace => Namespace,
    SchemaRef => SchemaRef,
    Schema => Schema,
    Group => Group,
    Dataset => Dataset,
    Attribute => Attribute,
    Link => Link,
    Dtype => Dtype,
    CompoundDtype => CompoundField,
);
