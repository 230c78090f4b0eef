use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::backend::Rotation;
use crate::error::ModelError;
use crate::objects::{EditableObject, ObjectDraft, ObjectId, Point, Property, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZDirection {
    Forward,
    Backward,
    Front,
    Back,
}

/// Z-order values that a reorder overwrote, in the order they were changed.
pub type ZOrderChanges = Vec<(ObjectId, i64)>;

/// Structured, serializable copy of everything the collection owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub next_id: u64,
    pub objects: Vec<EditableObject>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub page_rotations: BTreeMap<usize, Rotation>,
}

/// Per-document owner of every editable object, grouped by page and kept sorted by z-order.
#[derive(Debug, Clone, Default)]
pub struct ObjectCollection {
    pages: BTreeMap<usize, Vec<EditableObject>>,
    page_rotations: BTreeMap<usize, Rotation>,
    next_id: u64,
}

impl ObjectCollection {
    pub fn new() -> Self {
        Self {
            pages: BTreeMap::new(),
            page_rotations: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.values().all(Vec::is_empty)
    }

    /// Objects on `page_index`, bottom-most first.
    pub fn objects_on_page(&self, page_index: usize) -> &[EditableObject] {
        self.pages
            .get(&page_index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn pages(&self) -> impl Iterator<Item = usize> + '_ {
        self.pages
            .iter()
            .filter(|(_, objects)| !objects.is_empty())
            .map(|(page, _)| *page)
    }

    pub fn get(&self, id: ObjectId) -> Option<&EditableObject> {
        self.pages
            .values()
            .flat_map(|objects| objects.iter())
            .find(|object| object.id == id)
    }

    pub fn add(&mut self, draft: ObjectDraft) -> Result<ObjectId, ModelError> {
        draft.bounds.validate()?;
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        let objects = self.pages.entry(draft.page_index).or_default();
        let z_order = objects.last().map_or(0, |top| top.z_order + 1);
        objects.push(EditableObject {
            id,
            page_index: draft.page_index,
            bounds: draft.bounds,
            z_order,
            selected: false,
            payload: draft.payload,
        });
        Ok(id)
    }

    /// Puts back a previously removed object with its original id and z-order. The object
    /// comes back unselected.
    pub fn insert(&mut self, mut object: EditableObject) -> Result<(), ModelError> {
        object.bounds.validate()?;
        object.selected = false;
        if self.get(object.id).is_some() {
            return Err(ModelError::DuplicateObject(object.id));
        }
        self.next_id = self.next_id.max(object.id.0 + 1);
        let objects = self.pages.entry(object.page_index).or_default();
        let position = objects.partition_point(|other| other.z_order < object.z_order);
        if objects
            .get(position)
            .is_some_and(|other| other.z_order == object.z_order)
        {
            // The slot was reused while the object was away; keep the rest of the page intact.
            let z_order = objects.last().map_or(0, |top| top.z_order + 1);
            objects.push(EditableObject { z_order, ..object });
        } else {
            objects.insert(position, object);
        }
        Ok(())
    }

    pub fn remove(&mut self, id: ObjectId) -> Result<EditableObject, ModelError> {
        let (page, position) = self.locate(id)?;
        let objects = self
            .pages
            .get_mut(&page)
            .ok_or(ModelError::ObjectNotFound(id))?;
        let mut removed = objects.remove(position);
        removed.selected = false;
        if objects.is_empty() {
            self.pages.remove(&page);
        }
        Ok(removed)
    }

    /// Moves or resizes an object, returning its previous bounds.
    pub fn move_to(&mut self, id: ObjectId, bounds: Rect) -> Result<Rect, ModelError> {
        bounds.validate()?;
        let object = self.get_mut(id)?;
        Ok(std::mem::replace(&mut object.bounds, bounds))
    }

    pub fn set_property(&mut self, id: ObjectId, property: Property) -> Result<Property, ModelError> {
        let object = self.get_mut(id)?;
        property.apply_to(&mut object.payload)
    }

    /// Changes the stacking position of `id` on its page.
    ///
    /// Only the objects whose relative order actually changes are renumbered: a neighbour
    /// swap for forward/backward, a single new extreme value for front/back. Returns the
    /// overwritten values so the change can be inverted with [`Self::restore_z_orders`].
    pub fn reorder(&mut self, id: ObjectId, direction: ZDirection) -> Result<ZOrderChanges, ModelError> {
        let (page, position) = self.locate(id)?;
        let objects = self
            .pages
            .get_mut(&page)
            .ok_or(ModelError::ObjectNotFound(id))?;
        let last = objects.len() - 1;
        let mut changes = ZOrderChanges::new();

        match direction {
            ZDirection::Forward if position < last => {
                swap_z(objects, position, position + 1, &mut changes);
            }
            ZDirection::Backward if position > 0 => {
                swap_z(objects, position, position - 1, &mut changes);
            }
            ZDirection::Front if position < last => {
                let top = objects[last].z_order;
                changes.push((id, objects[position].z_order));
                let mut object = objects.remove(position);
                object.z_order = top + 1;
                objects.push(object);
            }
            ZDirection::Back if position > 0 => {
                let bottom = objects[0].z_order;
                changes.push((id, objects[position].z_order));
                let mut object = objects.remove(position);
                object.z_order = bottom - 1;
                objects.insert(0, object);
            }
            _ => {}
        }
        Ok(changes)
    }

    /// Writes back z-order values captured by [`Self::reorder`].
    pub fn restore_z_orders(&mut self, changes: &[(ObjectId, i64)]) -> Result<(), ModelError> {
        let mut touched = BTreeSet::new();
        for (id, _) in changes {
            let (page, _) = self.locate(*id)?;
            touched.insert(page);
        }
        for (id, z_order) in changes.iter().rev() {
            let object = self.get_mut(*id)?;
            object.z_order = *z_order;
        }
        for page in touched {
            if let Some(objects) = self.pages.get_mut(&page) {
                objects.sort_by_key(|object| object.z_order);
            }
        }
        Ok(())
    }

    pub fn page_rotation(&self, page_index: usize) -> Rotation {
        self.page_rotations
            .get(&page_index)
            .copied()
            .unwrap_or_default()
    }

    /// Sets the stored rotation of one page and returns the previous one.
    pub fn set_page_rotation(&mut self, page_index: usize, rotation: Rotation) -> Rotation {
        let previous = if rotation == Rotation::None {
            self.page_rotations.remove(&page_index)
        } else {
            self.page_rotations.insert(page_index, rotation)
        };
        previous.unwrap_or_default()
    }

    /// Topmost object on `page_index` whose bounds contain `point`.
    pub fn hit_test(&self, page_index: usize, point: Point) -> Option<ObjectId> {
        self.objects_on_page(page_index)
            .iter()
            .rev()
            .find(|object| object.bounds.contains(point))
            .map(|object| object.id)
    }

    /// Selects a single object; returns the pages whose selection changed.
    pub fn select(&mut self, id: ObjectId) -> Result<BTreeSet<usize>, ModelError> {
        self.locate(id)?;
        let mut pages = self.clear_selection();
        let object = self.get_mut(id)?;
        object.selected = true;
        pages.insert(object.page_index);
        Ok(pages)
    }

    pub fn clear_selection(&mut self) -> BTreeSet<usize> {
        let mut pages = BTreeSet::new();
        for (page, objects) in self.pages.iter_mut() {
            for object in objects.iter_mut().filter(|object| object.selected) {
                object.selected = false;
                pages.insert(*page);
            }
        }
        pages
    }

    pub fn selected(&self) -> Vec<ObjectId> {
        self.pages
            .values()
            .flat_map(|objects| objects.iter())
            .filter(|object| object.selected)
            .map(|object| object.id)
            .collect()
    }

    pub fn serialize(&self) -> CollectionSnapshot {
        CollectionSnapshot {
            next_id: self.next_id,
            objects: self
                .pages
                .values()
                .flat_map(|objects| objects.iter().cloned())
                .collect(),
            page_rotations: self.page_rotations.clone(),
        }
    }

    /// Replaces the whole collection with `snapshot`. The snapshot is validated first; on
    /// error the current contents are kept.
    pub fn deserialize(&mut self, snapshot: CollectionSnapshot) -> Result<(), ModelError> {
        let mut ids = HashSet::new();
        let mut slots = HashSet::new();
        let mut pages: BTreeMap<usize, Vec<EditableObject>> = BTreeMap::new();
        let mut next_id = snapshot.next_id.max(1);

        for object in snapshot.objects {
            object.bounds.validate()?;
            if !ids.insert(object.id) {
                return Err(ModelError::DuplicateObject(object.id));
            }
            if !slots.insert((object.page_index, object.z_order)) {
                return Err(ModelError::DuplicateObject(object.id));
            }
            next_id = next_id.max(object.id.0 + 1);
            pages.entry(object.page_index).or_default().push(object);
        }
        for objects in pages.values_mut() {
            objects.sort_by_key(|object| object.z_order);
        }

        self.pages = pages;
        self.page_rotations = snapshot.page_rotations;
        self.next_id = next_id;
        Ok(())
    }

    fn locate(&self, id: ObjectId) -> Result<(usize, usize), ModelError> {
        self.pages
            .iter()
            .find_map(|(page, objects)| {
                objects
                    .iter()
                    .position(|object| object.id == id)
                    .map(|position| (*page, position))
            })
            .ok_or(ModelError::ObjectNotFound(id))
    }

    fn get_mut(&mut self, id: ObjectId) -> Result<&mut EditableObject, ModelError> {
        self.pages
            .values_mut()
            .flat_map(|objects| objects.iter_mut())
            .find(|object| object.id == id)
            .ok_or(ModelError::ObjectNotFound(id))
    }
}

fn swap_z(objects: &mut [EditableObject], a: usize, b: usize, changes: &mut ZOrderChanges) {
    let (za, zb) = (objects[a].z_order, objects[b].z_order);
    changes.push((objects[a].id, za));
    changes.push((objects[b].id, zb));
    objects[a].z_order = zb;
    objects[b].z_order = za;
    objects.swap(a, b);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{ObjectPayload, TextPayload};

    fn draft(page: usize, label: &str) -> ObjectDraft {
        ObjectDraft::text(
            page,
            Rect::new(10.0, 10.0, 100.0, 20.0),
            TextPayload::new(label),
        )
    }

    fn z_orders(collection: &ObjectCollection, page: usize) -> Vec<(ObjectId, i64)> {
        collection
            .objects_on_page(page)
            .iter()
            .map(|object| (object.id, object.z_order))
            .collect()
    }

    fn stacked(count: usize) -> (ObjectCollection, Vec<ObjectId>) {
        let mut collection = ObjectCollection::new();
        let ids = (0..count)
            .map(|i| collection.add(draft(0, &format!("obj{i}"))).unwrap())
            .collect();
        (collection, ids)
    }

    #[test]
    fn add_assigns_unique_ids_and_increasing_z() {
        let (collection, ids) = stacked(3);
        assert_eq!(ids, vec![ObjectId(1), ObjectId(2), ObjectId(3)]);
        assert_eq!(
            z_orders(&collection, 0),
            vec![(ObjectId(1), 0), (ObjectId(2), 1), (ObjectId(3), 2)]
        );
    }

    #[test]
    fn add_rejects_invalid_geometry_without_consuming_an_id() {
        let mut collection = ObjectCollection::new();
        let bad = ObjectDraft::text(0, Rect::new(0.0, 0.0, -5.0, 10.0), TextPayload::new("x"));
        assert!(matches!(
            collection.add(bad),
            Err(ModelError::InvalidGeometry { .. })
        ));
        assert!(collection.is_empty());
        assert_eq!(collection.add(draft(0, "ok")).unwrap(), ObjectId(1));
    }

    #[test]
    fn operations_on_unknown_ids_fail() {
        let mut collection = ObjectCollection::new();
        let missing = ObjectId(42);
        assert_eq!(
            collection.remove(missing),
            Err(ModelError::ObjectNotFound(missing))
        );
        assert_eq!(
            collection.move_to(missing, Rect::new(0.0, 0.0, 1.0, 1.0)),
            Err(ModelError::ObjectNotFound(missing))
        );
        assert_eq!(
            collection.reorder(missing, ZDirection::Front),
            Err(ModelError::ObjectNotFound(missing))
        );
    }

    #[test]
    fn move_returns_previous_bounds_and_rejects_degenerate_rects() {
        let (mut collection, ids) = stacked(1);
        let previous = collection
            .move_to(ids[0], Rect::new(50.0, 60.0, 10.0, 10.0))
            .unwrap();
        assert_eq!(previous, Rect::new(10.0, 10.0, 100.0, 20.0));
        assert!(collection
            .move_to(ids[0], Rect::new(0.0, 0.0, 10.0, 0.0))
            .is_err());
        assert_eq!(
            collection.get(ids[0]).unwrap().bounds,
            Rect::new(50.0, 60.0, 10.0, 10.0)
        );
    }

    #[test]
    fn forward_and_backward_swap_only_neighbours() {
        let (mut collection, ids) = stacked(4);
        let changes = collection.reorder(ids[1], ZDirection::Forward).unwrap();
        assert_eq!(changes.len(), 2);
        let order: Vec<_> = z_orders(&collection, 0).iter().map(|(id, _)| *id).collect();
        assert_eq!(order, vec![ids[0], ids[2], ids[1], ids[3]]);
        assert_eq!(collection.get(ids[0]).unwrap().z_order, 0);
        assert_eq!(collection.get(ids[3]).unwrap().z_order, 3);

        collection.reorder(ids[1], ZDirection::Backward).unwrap();
        let order: Vec<_> = z_orders(&collection, 0).iter().map(|(id, _)| *id).collect();
        assert_eq!(order, ids);
    }

    #[test]
    fn front_on_topmost_object_changes_nothing() {
        let (mut collection, ids) = stacked(3);
        let before = z_orders(&collection, 0);
        let changes = collection.reorder(ids[2], ZDirection::Front).unwrap();
        assert!(changes.is_empty());
        assert_eq!(z_orders(&collection, 0), before);

        let changes = collection.reorder(ids[0], ZDirection::Back).unwrap();
        assert!(changes.is_empty());
        assert_eq!(z_orders(&collection, 0), before);
    }

    #[test]
    fn front_and_back_keep_the_others_in_order() {
        let (mut collection, ids) = stacked(4);
        collection.reorder(ids[1], ZDirection::Front).unwrap();
        assert_eq!(
            z_orders(&collection, 0),
            vec![(ids[0], 0), (ids[2], 2), (ids[3], 3), (ids[1], 4)]
        );

        collection.reorder(ids[3], ZDirection::Back).unwrap();
        assert_eq!(
            z_orders(&collection, 0),
            vec![(ids[3], -1), (ids[0], 0), (ids[2], 2), (ids[1], 4)]
        );
    }

    #[test]
    fn restore_z_orders_inverts_reorder() {
        let (mut collection, ids) = stacked(4);
        let before = z_orders(&collection, 0);
        for direction in [
            ZDirection::Forward,
            ZDirection::Backward,
            ZDirection::Front,
            ZDirection::Back,
        ] {
            let changes = collection.reorder(ids[1], direction).unwrap();
            collection.restore_z_orders(&changes).unwrap();
            assert_eq!(z_orders(&collection, 0), before, "{:?}", direction);
        }
    }

    #[test]
    fn reorder_is_scoped_to_the_page() {
        let mut collection = ObjectCollection::new();
        let a = collection.add(draft(0, "a")).unwrap();
        let b = collection.add(draft(1, "b")).unwrap();
        collection.add(draft(1, "c")).unwrap();
        assert!(collection.reorder(a, ZDirection::Front).unwrap().is_empty());
        assert_eq!(collection.reorder(b, ZDirection::Front).unwrap().len(), 1);
    }

    #[test]
    fn insert_restores_removed_object_in_place() {
        let (mut collection, ids) = stacked(3);
        let before = collection.serialize();
        let removed = collection.remove(ids[1]).unwrap();
        collection.insert(removed).unwrap();
        assert_eq!(collection.serialize(), before);
        let again = collection.get(ids[1]).unwrap().clone();
        assert_eq!(
            collection.insert(again),
            Err(ModelError::DuplicateObject(ids[1]))
        );
    }

    #[test]
    fn hit_test_prefers_topmost_object() {
        let (mut collection, ids) = stacked(2);
        assert_eq!(collection.hit_test(0, Point::new(15.0, 15.0)), Some(ids[1]));
        collection.reorder(ids[0], ZDirection::Front).unwrap();
        assert_eq!(collection.hit_test(0, Point::new(15.0, 15.0)), Some(ids[0]));
        assert_eq!(collection.hit_test(0, Point::new(500.0, 15.0)), None);
    }

    #[test]
    fn selection_is_exclusive() {
        let (mut collection, ids) = stacked(2);
        collection.select(ids[0]).unwrap();
        collection.select(ids[1]).unwrap();
        assert_eq!(collection.selected(), vec![ids[1]]);
        assert_eq!(collection.clear_selection().len(), 1);
        assert!(collection.selected().is_empty());
    }

    #[test]
    fn restored_object_does_not_bring_back_its_selection() {
        let (mut collection, ids) = stacked(2);
        collection.select(ids[0]).unwrap();
        let removed = collection.remove(ids[0]).unwrap();
        assert!(!removed.selected);

        collection.select(ids[1]).unwrap();
        collection.insert(removed).unwrap();
        assert_eq!(collection.selected(), vec![ids[1]]);

        let mut stale = collection.get(ids[1]).unwrap().clone();
        collection.remove(ids[1]).unwrap();
        stale.selected = true;
        collection.insert(stale).unwrap();
        assert!(collection.selected().is_empty());
    }

    #[test]
    fn snapshot_survives_json_and_keeps_id_allocation() {
        let (mut collection, ids) = stacked(2);
        collection.set_page_rotation(0, Rotation::Quarter);
        collection
            .set_property(ids[0], Property::TextContent("changed".into()))
            .unwrap();
        let json = serde_json::to_string(&collection.serialize()).unwrap();

        let mut restored = ObjectCollection::new();
        restored
            .deserialize(serde_json::from_str(&json).unwrap())
            .unwrap();
        assert_eq!(restored.serialize(), collection.serialize());
        assert_eq!(restored.page_rotation(0), Rotation::Quarter);
        match &restored.get(ids[0]).unwrap().payload {
            ObjectPayload::Text(text) => assert_eq!(text.content, "changed"),
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(restored.add(draft(0, "next")).unwrap(), ObjectId(3));
    }

    #[test]
    fn deserialize_rejects_duplicates_and_keeps_state() {
        let (mut collection, _) = stacked(1);
        let before = collection.serialize();
        let mut snapshot = before.clone();
        snapshot.objects.push(snapshot.objects[0].clone());
        assert!(collection.deserialize(snapshot).is_err());
        assert_eq!(collection.serialize(), before);
    }
}
