//! Label predicates evaluated during filtered traversal.
//!
//! A predicate is a pure `Label -> bool` decision. The traversal never looks
//! at label values itself, it only asks the predicate.

use roaring::RoaringBitmap;

use crate::store::Label;

/// Boolean membership test over a vector's label.
pub trait Predicate {
    fn matches(&self, label: Label) -> bool;
}

impl<F> Predicate for F
where
    F: Fn(Label) -> bool,
{
    #[inline]
    fn matches(&self, label: Label) -> bool {
        self(label)
    }
}

/// Accepts every label; turns a filtered search into a plain one.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Predicate for AcceptAll {
    #[inline]
    fn matches(&self, _label: Label) -> bool {
        true
    }
}

/// Accepts exactly one label value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelEquals(pub Label);

impl Predicate for LabelEquals {
    #[inline]
    fn matches(&self, label: Label) -> bool {
        label == self.0
    }
}

/// Treats the label as a bitmask and requires every bit of the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelMask(pub u32);

impl Predicate for LabelMask {
    #[inline]
    fn matches(&self, label: Label) -> bool {
        label & self.0 == self.0
    }
}

/// Accepts any label contained in the set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelSet(RoaringBitmap);

impl LabelSet {
    pub fn new(labels: RoaringBitmap) -> Self {
        Self(labels)
    }

    pub fn bitmap(&self) -> &RoaringBitmap {
        &self.0
    }
}

impl FromIterator<Label> for LabelSet {
    fn from_iter<I: IntoIterator<Item = Label>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Predicate for LabelSet {
    #[inline]
    fn matches(&self, label: Label) -> bool {
        self.0.contains(label)
    }
}
