//! The traverser: the unit of work flowing through a step chain.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::Hasher;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use xxhash_rust::xxh64::Xxh64;

use crate::value::Value;

/// Capabilities a traversal needs its traversers to carry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TraverserRequirement {
    /// Traversers may be merged into bulked traversers.
    Bulk,
    /// Every traverser must have bulk 1.
    OneBulk,
    /// Traversers record the values they passed through.
    Path,
    /// Traversers carry a sack value.
    Sack,
    /// Traversers carry a loop counter.
    SingleLoop,
}

impl fmt::Display for TraverserRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TraverserRequirement::Bulk => "BULK",
            TraverserRequirement::OneBulk => "ONE_BULK",
            TraverserRequirement::Path => "PATH",
            TraverserRequirement::Sack => "SACK",
            TraverserRequirement::SingleLoop => "SINGLE_LOOP",
        };
        f.write_str(name)
    }
}

impl TraverserRequirement {
    /// Parses the name produced by `Display`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "BULK" => Some(TraverserRequirement::Bulk),
            "ONE_BULK" => Some(TraverserRequirement::OneBulk),
            "PATH" => Some(TraverserRequirement::Path),
            "SACK" => Some(TraverserRequirement::Sack),
            "SINGLE_LOOP" => Some(TraverserRequirement::SingleLoop),
            _ => None,
        }
    }
}

/// Monotonically growing set of [`TraverserRequirement`]s.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Requirements(BTreeSet<TraverserRequirement>);

impl Requirements {
    /// Empty requirement set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a requirement.
    pub fn insert(&mut self, requirement: TraverserRequirement) {
        self.0.insert(requirement);
    }

    /// Adds every requirement of `other`.
    pub fn extend(&mut self, other: &Requirements) {
        self.0.extend(other.0.iter().copied());
    }

    /// Returns true when `requirement` is present.
    pub fn contains(&self, requirement: TraverserRequirement) -> bool {
        self.0.contains(&requirement)
    }

    /// Iterates in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = TraverserRequirement> + '_ {
        self.0.iter().copied()
    }

    /// Returns true when nothing is required.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<TraverserRequirement> for Requirements {
    fn from_iter<I: IntoIterator<Item = TraverserRequirement>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Ordered history of the values a traverser passed through.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Path {
    objects: Vec<Value>,
    labels: Vec<SmallVec<[String; 1]>>,
}

impl Path {
    /// Appends a value with no labels.
    pub fn extend(&mut self, value: Value) {
        self.objects.push(value);
        self.labels.push(SmallVec::new());
    }

    /// Attaches labels to the most recent value.
    pub fn add_labels<'a>(&mut self, labels: impl IntoIterator<Item = &'a String>) {
        if let Some(head) = self.labels.last_mut() {
            for label in labels {
                if !head.contains(label) {
                    head.push(label.clone());
                }
            }
        }
    }

    /// Values in traversal order.
    pub fn objects(&self) -> &[Value] {
        &self.objects
    }

    /// Labels attached to the value at `index`.
    pub fn labels_at(&self, index: usize) -> &[String] {
        self.labels.get(index).map(|l| l.as_slice()).unwrap_or(&[])
    }

    /// Most recent value carrying `label`.
    pub fn get(&self, label: &str) -> Option<&Value> {
        self.labels
            .iter()
            .rposition(|labels| labels.iter().any(|l| l == label))
            .map(|idx| &self.objects[idx])
    }

    /// Number of recorded values.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// A value plus its multiplicity and optional path, loop, and sack metadata.
///
/// `bulk` is a [`NonZeroU64`]: a traverser always stands for at least one
/// identical traverser. Splitting and merging preserve the total multiplicity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Traverser {
    value: Value,
    bulk: NonZeroU64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<Path>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    loops: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sack: Option<Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    sentinel: bool,
}

impl Traverser {
    /// Creates a bulk-1 traverser with no metadata.
    pub fn new(value: impl Into<Value>) -> Self {
        Self::with_bulk(value, NonZeroU64::MIN)
    }

    /// Creates a traverser standing for `bulk` identical traversers.
    pub fn with_bulk(value: impl Into<Value>, bulk: NonZeroU64) -> Self {
        Self {
            value: value.into(),
            bulk,
            path: None,
            loops: None,
            sack: None,
            sentinel: false,
        }
    }

    /// Creates the placeholder emitted by steps whose result is a side effect.
    pub fn sentinel() -> Self {
        Self {
            sentinel: true,
            ..Self::new(Value::Null)
        }
    }

    /// Creates a traverser shaped by `requirements`: path tracking, loop
    /// counter, and sack are present only when required.
    pub fn generate(value: Value, requirements: &Requirements, sack: Option<&Value>) -> Self {
        let mut traverser = Self::new(value);
        if requirements.contains(TraverserRequirement::Path) {
            let mut path = Path::default();
            path.extend(traverser.value.clone());
            traverser.path = Some(path);
        }
        if requirements.contains(TraverserRequirement::SingleLoop) {
            traverser.loops = Some(0);
        }
        if requirements.contains(TraverserRequirement::Sack) {
            traverser.sack = Some(sack.cloned().unwrap_or(Value::Null));
        }
        traverser
    }

    /// Current value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consumes the traverser, returning its value.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Replaces the value in place without extending the path.
    pub fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    /// Derives a traverser for `value` that inherits this one's bulk and
    /// metadata, extending the path when it is tracked.
    pub fn split(&self, value: Value) -> Self {
        let mut path = self.path.clone();
        if let Some(path) = path.as_mut() {
            path.extend(value.clone());
        }
        Self {
            value,
            bulk: self.bulk,
            path,
            loops: self.loops,
            sack: self.sack.clone(),
            sentinel: false,
        }
    }

    /// Multiplicity.
    pub fn bulk(&self) -> u64 {
        self.bulk.get()
    }

    /// Overrides the multiplicity.
    pub fn set_bulk(&mut self, bulk: NonZeroU64) {
        self.bulk = bulk;
    }

    /// Path history, when tracked.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_ref()
    }

    /// Attaches step labels to the head of the path, when tracked.
    pub fn add_labels<'a>(&mut self, labels: impl IntoIterator<Item = &'a String>) {
        if let Some(path) = self.path.as_mut() {
            path.add_labels(labels);
        }
    }

    /// Loop counter, when tracked.
    pub fn loops(&self) -> Option<u32> {
        self.loops
    }

    /// Increments the loop counter, when tracked.
    pub fn incr_loops(&mut self) {
        if let Some(loops) = self.loops.as_mut() {
            *loops = loops.saturating_add(1);
        }
    }

    /// Resets the loop counter, when tracked.
    pub fn reset_loops(&mut self) {
        if let Some(loops) = self.loops.as_mut() {
            *loops = 0;
        }
    }

    /// Sack value, when tracked.
    pub fn sack(&self) -> Option<&Value> {
        self.sack.as_ref()
    }

    /// Replaces the sack value.
    pub fn set_sack(&mut self, sack: Value) {
        self.sack = Some(sack);
    }

    /// Returns true for the side-effect placeholder.
    pub fn is_sentinel(&self) -> bool {
        self.sentinel
    }

    /// Returns true when `other` is indistinguishable apart from bulk.
    pub fn can_merge(&self, other: &Traverser) -> bool {
        !self.sentinel
            && !other.sentinel
            && self.value == other.value
            && self.path == other.path
            && self.loops == other.loops
            && self.sack == other.sack
    }

    /// Absorbs `other`'s multiplicity. The caller checks [`Self::can_merge`].
    ///
    /// Bulk saturates at `u64::MAX`.
    pub fn merge(&mut self, other: Traverser) {
        self.bulk = self.bulk.saturating_add(other.bulk.get());
    }

    /// Moves `count` of this traverser's multiplicity into a new traverser.
    ///
    /// Returns `None` (leaving `self` untouched) unless `0 < count < bulk`.
    pub fn split_off(&mut self, count: u64) -> Option<Traverser> {
        let keep = self.bulk.get().checked_sub(count)?;
        let (Some(keep), Some(taken)) = (NonZeroU64::new(keep), NonZeroU64::new(count)) else {
            return None;
        };
        self.bulk = keep;
        let mut detached = self.clone();
        detached.bulk = taken;
        Some(detached)
    }

    /// Expands into `bulk` traversers of bulk 1.
    pub fn unroll(self) -> impl Iterator<Item = Traverser> {
        let count = self.bulk.get();
        let mut single = self;
        single.bulk = NonZeroU64::MIN;
        std::iter::repeat(single).take(count as usize)
    }

    /// Hash over every field that [`Self::can_merge`] compares.
    pub fn merge_key(&self) -> u64 {
        let mut hasher = Xxh64::new(0);
        self.value.hash_into(&mut hasher);
        match &self.path {
            Some(path) => {
                hasher.write_u8(1);
                for (idx, object) in path.objects().iter().enumerate() {
                    object.hash_into(&mut hasher);
                    for label in path.labels_at(idx) {
                        hasher.write(label.as_bytes());
                    }
                }
            }
            None => hasher.write_u8(0),
        }
        hasher.write_u32(self.loops.unwrap_or(u32::MAX));
        if let Some(sack) = &self.sack {
            sack.hash_into(&mut hasher);
        }
        hasher.digest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(n: u64) -> NonZeroU64 {
        NonZeroU64::new(n).unwrap()
    }

    #[test]
    fn split_off_preserves_total() {
        let mut t = Traverser::with_bulk(Value::Int(1), bulk(5));
        let taken = t.split_off(2).unwrap();
        assert_eq!(t.bulk() + taken.bulk(), 5);
        assert_eq!(taken.value(), t.value());
        assert!(t.split_off(3).is_none());
        assert!(t.split_off(0).is_none());
        assert_eq!(t.bulk(), 3);
    }

    #[test]
    fn generate_honours_requirements() {
        let reqs: Requirements = [TraverserRequirement::Path, TraverserRequirement::Sack]
            .into_iter()
            .collect();
        let t = Traverser::generate(Value::from("a"), &reqs, Some(&Value::Int(0)));
        assert_eq!(t.path().unwrap().objects(), &[Value::from("a")]);
        assert_eq!(t.sack(), Some(&Value::Int(0)));
        assert_eq!(t.loops(), None);

        let plain = Traverser::generate(Value::from("a"), &Requirements::new(), None);
        assert!(plain.path().is_none());
        assert!(plain.sack().is_none());
    }

    #[test]
    fn split_extends_tracked_path() {
        let reqs: Requirements = [TraverserRequirement::Path].into_iter().collect();
        let mut start = Traverser::generate(Value::from("v"), &reqs, None);
        start.add_labels([&"a".to_owned()]);
        let next = start.split(Value::Int(3));
        let path = next.path().unwrap();
        assert_eq!(path.objects(), &[Value::from("v"), Value::Int(3)]);
        assert_eq!(path.get("a"), Some(&Value::from("v")));
    }

    #[test]
    fn different_paths_do_not_merge() {
        let reqs: Requirements = [TraverserRequirement::Path].into_iter().collect();
        let a = Traverser::generate(Value::from("x"), &reqs, None).split(Value::Int(1));
        let b = Traverser::generate(Value::from("y"), &reqs, None).split(Value::Int(1));
        assert!(!a.can_merge(&b));
        assert_ne!(a.merge_key(), b.merge_key());
        assert!(a.can_merge(&a.clone()));
    }

    #[test]
    fn sentinel_never_merges() {
        let s = Traverser::sentinel();
        assert!(s.is_sentinel());
        assert!(!s.can_merge(&Traverser::sentinel()));
    }

    #[test]
    fn unroll_yields_bulk_ones() {
        let t = Traverser::with_bulk(Value::Int(9), bulk(3));
        let parts: Vec<_> = t.unroll().collect();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.bulk() == 1));
    }
}
