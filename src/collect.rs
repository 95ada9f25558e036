// src/collect.rs

//! Merging every image source into one canonical partition set
//!
//! The set is built in one pass over the three sources, lowest precedence
//! first, so a later source simply replaces a same-named entry:
//!
//! ```text
//! discrete  <  payload  <  super
//! ```
//!
//! Images split out of an A/B super image carry slot suffixes
//! (`system_a.img`, `system_b.img`). Those are folded onto the plain name
//! before merging: the `_a` image wins, an empty `_b` twin is dropped.

use crate::error::Result;
use crate::partition::{PartitionImage, PartitionSource, flash_priority, partition_name, split_slot_suffix};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// The canonical working set, keyed by partition name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionSet {
    images: BTreeMap<String, PartitionImage>,
}

impl PartitionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an image, returning the one it replaced
    pub fn insert(&mut self, image: PartitionImage) -> Option<PartitionImage> {
        self.images.insert(image.name.clone(), image)
    }

    pub fn get(&self, name: &str) -> Option<&PartitionImage> {
        self.images.get(name)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Partition names, alphabetical
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }

    /// Images in installer flash order
    pub fn in_flash_order(&self) -> Vec<&PartitionImage> {
        let mut images: Vec<_> = self.images.values().collect();
        images.sort_by(|a, b| flash_priority(&a.name, &b.name));
        images
    }

    /// Sum of all image sizes
    pub fn total_size(&self) -> u64 {
        self.images.values().map(|i| i.size).sum()
    }

    /// Split into (matching, rest) by partition name
    pub fn partition_by<F>(&self, mut predicate: F) -> (PartitionSet, PartitionSet)
    where
        F: FnMut(&str) -> bool,
    {
        let mut matching = PartitionSet::new();
        let mut rest = PartitionSet::new();
        for image in self.images.values() {
            if predicate(&image.name) {
                matching.insert(image.clone());
            } else {
                rest.insert(image.clone());
            }
        }
        (matching, rest)
    }
}

/// A name produced by more than one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub name: String,
    /// Source of the image that was kept
    pub kept: PartitionSource,
    /// Source of the image that was discarded
    pub dropped: PartitionSource,
}

impl Collision {
    /// Whether source precedence decided the outcome
    ///
    /// Two images from the same source have no precedence to settle them;
    /// the first one found is kept.
    pub fn resolved_by_precedence(&self) -> bool {
        self.kept != self.dropped
    }
}

/// Images gathered from each source before merging
#[derive(Debug, Clone, Default)]
pub struct Sources {
    /// Loose images in the bundle, by partition name
    pub discrete: BTreeMap<String, PathBuf>,
    /// Images produced by the payload extractor
    pub payload: Vec<PathBuf>,
    /// Images split out of a super image
    pub super_images: Vec<PathBuf>,
}

/// Result of collection
#[derive(Debug, Clone, Default)]
pub struct Collected {
    pub set: PartitionSet,
    pub collisions: Vec<Collision>,
}

/// Merge every source into the canonical set
pub fn collect(sources: &Sources) -> Result<Collected> {
    let mut candidates: Vec<PartitionImage> = Vec::new();

    for (name, path) in &sources.discrete {
        candidates.push(PartitionImage::from_file(name.clone(), path, PartitionSource::Discrete)?);
    }
    for path in &sources.payload {
        if let Some(name) = partition_name(path) {
            candidates.push(PartitionImage::from_file(name, path, PartitionSource::Payload)?);
        }
    }
    candidates.extend(normalize_slots(&sources.super_images)?);

    // Stable sort keeps discovery order within one source.
    candidates.sort_by_key(|image| image.source);

    let collected = candidates
        .into_iter()
        .fold(Collected::default(), |mut acc, image| {
            match acc.set.get(&image.name) {
                Some(existing) if existing.source == image.source => {
                    acc.collisions.push(Collision {
                        name: image.name.clone(),
                        kept: existing.source,
                        dropped: image.source,
                    });
                }
                Some(existing) => {
                    acc.collisions.push(Collision {
                        name: image.name.clone(),
                        kept: image.source,
                        dropped: existing.source,
                    });
                    acc.set.insert(image);
                }
                None => {
                    acc.set.insert(image);
                }
            }
            acc
        });

    for collision in &collected.collisions {
        if collision.resolved_by_precedence() {
            info!(
                "{}: {} image replaces {} image",
                collision.name, collision.kept, collision.dropped
            );
        } else {
            warn!(
                "{}: duplicate {} images, keeping the first",
                collision.name, collision.kept
            );
        }
    }
    debug!(
        "Collected {} partition(s): {}",
        collected.set.len(),
        collected.set.names().collect::<Vec<_>>().join(", ")
    );

    Ok(collected)
}

/// Fold slot-suffixed super images onto plain partition names
fn normalize_slots(paths: &[PathBuf]) -> Result<Vec<PartitionImage>> {
    // base name -> (unsuffixed, slot a, slot b)
    type Slots = (Option<PartitionImage>, Option<PartitionImage>, Option<PartitionImage>);
    let mut grouped: BTreeMap<String, Slots> = BTreeMap::new();

    for path in paths {
        let Some(full_name) = partition_name(path) else {
            continue;
        };
        let (base, slot) = split_slot_suffix(full_name);
        let image = PartitionImage::from_file(base, path, PartitionSource::Super)?;
        let entry = grouped.entry(base.to_string()).or_default();
        match slot {
            None => entry.0 = Some(image),
            Some('a') => entry.1 = Some(image),
            Some(_) => entry.2 = Some(image),
        }
    }

    let mut images = Vec::new();
    for (name, (plain, slot_a, slot_b)) in grouped {
        let chosen = plain
            .or(slot_a)
            .or_else(|| slot_b.filter(|b| b.size > 0));
        match chosen {
            Some(image) => images.push(image),
            None => debug!("Dropping empty slot image for {}", name),
        }
    }
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn img(dir: &Path, sub: &str, name: &str, size: usize) -> PathBuf {
        let d = dir.join(sub);
        fs::create_dir_all(&d).unwrap();
        let p = d.join(format!("{name}.img"));
        fs::write(&p, vec![0u8; size]).unwrap();
        p
    }

    #[test]
    fn test_union_of_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut sources = Sources::default();
        sources.discrete.insert("boot".into(), img(dir.path(), "bundle", "boot", 10));
        sources.payload.push(img(dir.path(), "payload", "dtbo", 5));
        sources.super_images.push(img(dir.path(), "super", "system", 20));

        let collected = collect(&sources).unwrap();
        let names: Vec<_> = collected.set.names().collect();
        assert_eq!(names, vec!["boot", "dtbo", "system"]);
        assert!(collected.collisions.is_empty());
        assert_eq!(collected.set.total_size(), 35);
    }

    #[test]
    fn test_precedence_super_over_payload_over_discrete() {
        let dir = tempfile::tempdir().unwrap();
        let mut sources = Sources::default();
        sources.discrete.insert("system".into(), img(dir.path(), "bundle", "system", 1));
        sources.discrete.insert("vendor".into(), img(dir.path(), "bundle", "vendor", 1));
        sources.payload.push(img(dir.path(), "payload", "system", 2));
        sources.payload.push(img(dir.path(), "payload", "vendor", 2));
        sources.super_images.push(img(dir.path(), "super", "system", 3));

        let collected = collect(&sources).unwrap();
        let system = collected.set.get("system").unwrap();
        assert_eq!(system.source, PartitionSource::Super);
        assert_eq!(system.size, 3);
        let vendor = collected.set.get("vendor").unwrap();
        assert_eq!(vendor.source, PartitionSource::Payload);
        assert_eq!(collected.collisions.len(), 3);
        assert!(collected.collisions.iter().all(Collision::resolved_by_precedence));
    }

    #[test]
    fn test_slot_suffixes_folded() {
        let dir = tempfile::tempdir().unwrap();
        let mut sources = Sources::default();
        sources.super_images.push(img(dir.path(), "super", "system_a", 8));
        sources.super_images.push(img(dir.path(), "super", "system_b", 0));
        sources.super_images.push(img(dir.path(), "super", "product_b", 4));
        sources.super_images.push(img(dir.path(), "super", "odm_b", 0));
        sources.super_images.push(img(dir.path(), "super", "system_ext", 2));

        let collected = collect(&sources).unwrap();
        let names: Vec<_> = collected.set.names().collect();
        assert_eq!(names, vec!["product", "system", "system_ext"]);
        assert_eq!(collected.set.get("system").unwrap().size, 8);
        assert!(collected.set.get("system").unwrap().path.ends_with("system_a.img"));
    }

    #[test]
    fn test_empty_sources() {
        let collected = collect(&Sources::default()).unwrap();
        assert!(collected.set.is_empty());
    }

    #[test]
    fn test_flash_order_and_partition_by() {
        let dir = tempfile::tempdir().unwrap();
        let mut sources = Sources::default();
        for name in ["vendor", "system", "boot", "vbmeta"] {
            sources.discrete.insert(name.into(), img(dir.path(), "b", name, 1));
        }
        let set = collect(&sources).unwrap().set;
        let order: Vec<_> = set.in_flash_order().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(order, vec!["boot", "vbmeta", "system", "vendor"]);

        let (logical, loose) = set.partition_by(|n| n == "system");
        assert_eq!(logical.names().collect::<Vec<_>>(), vec!["system"]);
        assert_eq!(loose.len(), 3);
    }
}
