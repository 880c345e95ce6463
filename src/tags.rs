//! Draw list and draw filter tag registries.
//!
//! Tags are small integer handles identifying logical draw buckets
//! ([`DrawListTag`]) or per-pipeline draw filters ([`DrawFilterTag`]).
//! Both registries reference-count acquisitions by owner name: acquiring an
//! already-registered name returns the existing tag and bumps its count,
//! releasing decrements and frees the slot at zero.

use parking_lot::Mutex;

use crate::error::SceneError;

/// Maximum number of distinct tags a registry can hand out.
///
/// Bounded so a full set of draw list tags fits into a single
/// [`DrawListMask`] word.
pub const MAX_TAGS: usize = 64;

/// Handle identifying a logical draw bucket shared across passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawListTag(u8);

impl DrawListTag {
    fn new(index: u8) -> Self {
        Self(index)
    }

    /// Bit index of this tag inside a [`DrawListMask`].
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle identifying the draw filter of a single render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawFilterTag(u8);

impl DrawFilterTag {
    fn new(index: u8) -> Self {
        Self(index)
    }

    /// Slot index of this tag inside the owning registry.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Bitset over [`DrawListTag`]s.
///
/// A view's mask is the bitwise OR of the masks requested by every pipeline
/// that renders it; draw items whose tag falls outside the mask are dropped
/// when draw lists are finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawListMask(u64);

impl DrawListMask {
    /// The empty mask.
    pub const EMPTY: Self = Self(0);

    /// Mask containing exactly one tag.
    pub fn from_tag(tag: DrawListTag) -> Self {
        Self(1u64 << tag.index())
    }

    /// Adds a tag to the mask.
    pub fn insert(&mut self, tag: DrawListTag) {
        self.0 |= 1u64 << tag.index();
    }

    /// Whether the mask contains the given tag.
    pub fn contains(&self, tag: DrawListTag) -> bool {
        self.0 & (1u64 << tag.index()) != 0
    }

    /// Whether the two masks share at least one tag.
    pub fn intersects(&self, other: DrawListMask) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether the mask contains no tags.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Number of tags in the mask.
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }
}

impl std::ops::BitOr for DrawListMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for DrawListMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug)]
struct TagSlot {
    name: String,
    refs: usize,
}

/// Shared tag allocation logic used by both registries.
#[derive(Debug)]
struct TagSlots {
    slots: Mutex<Vec<Option<TagSlot>>>,
}

impl TagSlots {
    fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_TAGS);
        slots.resize_with(MAX_TAGS, || None);
        Self {
            slots: Mutex::new(slots),
        }
    }

    fn acquire(&self, name: &str) -> Result<u8, SceneError> {
        let mut slots = self.slots.lock();

        // Same owner name re-acquires the existing tag.
        for (i, slot) in slots.iter_mut().enumerate() {
            if let Some(slot) = slot {
                if slot.name == name {
                    slot.refs += 1;
                    return Ok(i as u8);
                }
            }
        }

        for (i, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(TagSlot {
                    name: name.to_string(),
                    refs: 1,
                });
                return Ok(i as u8);
            }
        }

        Err(SceneError::TagRegistryExhausted { capacity: MAX_TAGS })
    }

    fn release(&self, index: usize) {
        let mut slots = self.slots.lock();
        match slots.get_mut(index) {
            Some(Some(slot)) => {
                slot.refs -= 1;
                if slot.refs == 0 {
                    slots[index] = None;
                }
            }
            _ => {
                log::warn!("Releasing tag {index} which is not acquired");
            }
        }
    }

    fn name_of(&self, index: usize) -> Option<String> {
        let slots = self.slots.lock();
        slots
            .get(index)
            .and_then(|s| s.as_ref())
            .map(|s| s.name.clone())
    }

    fn acquired_count(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }
}

/// Registry handing out [`DrawListTag`]s by draw bucket name.
///
/// Typically shared process-wide behind an `Arc`; passes and cullables
/// acquire tags for the draw buckets they contribute to.
#[derive(Debug)]
pub struct DrawListTagRegistry {
    slots: TagSlots,
}

impl DrawListTagRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            slots: TagSlots::new(),
        }
    }

    /// Acquires the tag for `name`, allocating a slot on first use.
    pub fn acquire_tag(&self, name: &str) -> Result<DrawListTag, SceneError> {
        self.slots.acquire(name).map(DrawListTag::new)
    }

    /// Releases one reference to `tag`.
    pub fn release_tag(&self, tag: DrawListTag) {
        self.slots.release(tag.index());
    }

    /// Name the tag was acquired under, if it is live.
    pub fn tag_name(&self, tag: DrawListTag) -> Option<String> {
        self.slots.name_of(tag.index())
    }

    /// Number of currently acquired tags.
    pub fn acquired_count(&self) -> usize {
        self.slots.acquired_count()
    }
}

impl Default for DrawListTagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-scene registry handing out [`DrawFilterTag`]s, one per pipeline id.
///
/// A scene acquires a filter tag when a pipeline is added and releases it
/// on removal.
#[derive(Debug)]
pub struct DrawFilterTagRegistry {
    slots: TagSlots,
}

impl DrawFilterTagRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            slots: TagSlots::new(),
        }
    }

    /// Acquires the filter tag owned by `owner_id`.
    pub fn acquire_tag(&self, owner_id: &str) -> Result<DrawFilterTag, SceneError> {
        self.slots.acquire(owner_id).map(DrawFilterTag::new)
    }

    /// Releases one reference to `tag`.
    pub fn release_tag(&self, tag: DrawFilterTag) {
        self.slots.release(tag.index());
    }

    /// Number of currently acquired tags.
    pub fn acquired_count(&self) -> usize {
        self.slots.acquired_count()
    }
}

impl Default for DrawFilterTagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_same_name_returns_same_tag() {
        let registry = DrawListTagRegistry::new();
        let a = registry.acquire_tag("opaque").unwrap();
        let b = registry.acquire_tag("opaque").unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.acquired_count(), 1);
    }

    #[test]
    fn release_frees_slot_at_zero_refs() {
        let registry = DrawListTagRegistry::new();
        let a = registry.acquire_tag("opaque").unwrap();
        let _b = registry.acquire_tag("opaque").unwrap();

        registry.release_tag(a);
        assert_eq!(registry.acquired_count(), 1);
        registry.release_tag(a);
        assert_eq!(registry.acquired_count(), 0);
        assert!(registry.tag_name(a).is_none());
    }

    #[test]
    fn distinct_names_get_distinct_tags() {
        let registry = DrawListTagRegistry::new();
        let a = registry.acquire_tag("opaque").unwrap();
        let b = registry.acquire_tag("transparent").unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.tag_name(b).as_deref(), Some("transparent"));
    }

    #[test]
    fn registry_exhaustion_is_an_error() {
        let registry = DrawFilterTagRegistry::new();
        for i in 0..MAX_TAGS {
            registry.acquire_tag(&format!("pipeline_{i}")).unwrap();
        }
        let err = registry.acquire_tag("one_too_many").unwrap_err();
        assert_eq!(err, SceneError::TagRegistryExhausted { capacity: MAX_TAGS });
    }

    #[test]
    fn freed_slot_is_reused() {
        let registry = DrawListTagRegistry::new();
        let a = registry.acquire_tag("first").unwrap();
        registry.release_tag(a);
        let b = registry.acquire_tag("second").unwrap();
        assert_eq!(a.index(), b.index());
    }

    #[test]
    fn mask_operations() {
        let registry = DrawListTagRegistry::new();
        let opaque = registry.acquire_tag("opaque").unwrap();
        let shadow = registry.acquire_tag("shadow").unwrap();

        let mut mask = DrawListMask::default();
        assert!(mask.is_empty());

        mask.insert(opaque);
        assert!(mask.contains(opaque));
        assert!(!mask.contains(shadow));
        assert_eq!(mask.len(), 1);

        let combined = mask | DrawListMask::from_tag(shadow);
        assert!(combined.contains(opaque));
        assert!(combined.contains(shadow));
        assert!(combined.intersects(mask));
        assert!(!DrawListMask::EMPTY.intersects(combined));
    }
}
