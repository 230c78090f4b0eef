//! Reversible edits and the undo/redo history.

use std::collections::BTreeSet;

use tracing::debug;

use crate::backend::Rotation;
use crate::collection::{ObjectCollection, ZDirection, ZOrderChanges};
use crate::error::ModelError;
use crate::objects::{EditableObject, ObjectDraft, ObjectId, Property, Rect};
use crate::state::HistoryMark;

/// One discrete user operation, holding whatever it needs to run in both directions.
#[derive(Debug, Clone)]
pub enum EditCommand {
    AddObject {
        draft: ObjectDraft,
        /// Filled once the object exists, so redo restores the same id and z-order.
        created: Option<EditableObject>,
    },
    RemoveObject {
        id: ObjectId,
        removed: Option<EditableObject>,
    },
    MoveObject {
        id: ObjectId,
        to: Rect,
        from: Option<Rect>,
    },
    SetProperty {
        id: ObjectId,
        value: Property,
        previous: Option<Property>,
    },
    Reorder {
        id: ObjectId,
        direction: ZDirection,
        previous: ZOrderChanges,
    },
    RotatePage {
        page_index: usize,
        rotation: Rotation,
        previous: Option<Rotation>,
    },
    Group {
        label: String,
        commands: Vec<EditCommand>,
    },
}

impl EditCommand {
    pub fn add(draft: ObjectDraft) -> Self {
        EditCommand::AddObject {
            draft,
            created: None,
        }
    }

    pub fn remove(id: ObjectId) -> Self {
        EditCommand::RemoveObject { id, removed: None }
    }

    pub fn move_to(id: ObjectId, to: Rect) -> Self {
        EditCommand::MoveObject { id, to, from: None }
    }

    pub fn set_property(id: ObjectId, value: Property) -> Self {
        EditCommand::SetProperty {
            id,
            value,
            previous: None,
        }
    }

    pub fn reorder(id: ObjectId, direction: ZDirection) -> Self {
        EditCommand::Reorder {
            id,
            direction,
            previous: ZOrderChanges::new(),
        }
    }

    pub fn rotate_page(page_index: usize, rotation: Rotation) -> Self {
        EditCommand::RotatePage {
            page_index,
            rotation,
            previous: None,
        }
    }

    /// Bundles `commands` into one entry; a single command stays as it is.
    pub fn group(label: impl Into<String>, mut commands: Vec<EditCommand>) -> Self {
        if commands.len() == 1 {
            if let Some(command) = commands.pop() {
                return command;
            }
        }
        EditCommand::Group {
            label: label.into(),
            commands,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            EditCommand::AddObject { .. } => "Add Object",
            EditCommand::RemoveObject { .. } => "Delete Object",
            EditCommand::MoveObject { .. } => "Move Object",
            EditCommand::SetProperty { .. } => "Change Property",
            EditCommand::Reorder { .. } => "Reorder",
            EditCommand::RotatePage { .. } => "Rotate Page",
            EditCommand::Group { label, .. } => label.as_str(),
        }
    }

    /// Runs the forward action. On error nothing observable has changed.
    pub fn apply(&mut self, target: &mut ObjectCollection) -> Result<Touched, ModelError> {
        let mut touched = Touched::default();
        match self {
            EditCommand::AddObject { draft, created } => match created {
                Some(object) => {
                    touched.objects(object.page_index);
                    target.insert(object.clone())?;
                }
                None => {
                    let id = target.add(draft.clone())?;
                    let object = target.get(id).cloned().ok_or(ModelError::ObjectNotFound(id))?;
                    touched.objects(object.page_index);
                    *created = Some(object);
                }
            },
            EditCommand::RemoveObject { id, removed } => {
                let object = target.remove(*id)?;
                touched.objects(object.page_index);
                *removed = Some(object);
            }
            EditCommand::MoveObject { id, to, from } => {
                *from = Some(target.move_to(*id, *to)?);
                touched.objects(page_of(target, *id)?);
            }
            EditCommand::SetProperty {
                id,
                value,
                previous,
            } => {
                *previous = Some(target.set_property(*id, value.clone())?);
                touched.objects(page_of(target, *id)?);
            }
            EditCommand::Reorder {
                id,
                direction,
                previous,
            } => {
                *previous = target.reorder(*id, *direction)?;
                touched.objects(page_of(target, *id)?);
            }
            EditCommand::RotatePage {
                page_index,
                rotation,
                previous,
            } => {
                *previous = Some(target.set_page_rotation(*page_index, *rotation));
                touched.layout(*page_index);
            }
            EditCommand::Group { commands, .. } => {
                for done in 0..commands.len() {
                    match commands[done].apply(target) {
                        Ok(sub) => touched.merge(sub),
                        Err(err) => {
                            for command in commands[..done].iter_mut().rev() {
                                command.revert(target)?;
                            }
                            return Err(err);
                        }
                    }
                }
            }
        }
        Ok(touched)
    }

    /// Runs the inverse action of a previously applied command.
    pub fn revert(&mut self, target: &mut ObjectCollection) -> Result<Touched, ModelError> {
        let mut touched = Touched::default();
        match self {
            EditCommand::AddObject { created, .. } => {
                if let Some(object) = created {
                    let removed = target.remove(object.id)?;
                    touched.objects(removed.page_index);
                    *object = removed;
                }
            }
            EditCommand::RemoveObject { removed, .. } => {
                if let Some(object) = removed {
                    target.insert(object.clone())?;
                    touched.objects(object.page_index);
                }
            }
            EditCommand::MoveObject { id, from, .. } => {
                if let Some(from) = from {
                    target.move_to(*id, *from)?;
                    touched.objects(page_of(target, *id)?);
                }
            }
            EditCommand::SetProperty { id, previous, .. } => {
                if let Some(previous) = previous {
                    target.set_property(*id, previous.clone())?;
                    touched.objects(page_of(target, *id)?);
                }
            }
            EditCommand::Reorder { id, previous, .. } => {
                target.restore_z_orders(previous)?;
                touched.objects(page_of(target, *id)?);
            }
            EditCommand::RotatePage {
                page_index,
                previous,
                ..
            } => {
                if let Some(previous) = previous {
                    target.set_page_rotation(*page_index, *previous);
                    touched.layout(*page_index);
                }
            }
            EditCommand::Group { commands, .. } => {
                for command in commands.iter_mut().rev() {
                    touched.merge(command.revert(target)?);
                }
            }
        }
        Ok(touched)
    }

    /// Folds a follow-up edit into this one when both describe the same continuous change.
    fn absorb(&mut self, next: &EditCommand) -> bool {
        match (self, next) {
            (
                EditCommand::MoveObject { id, to, .. },
                EditCommand::MoveObject {
                    id: next_id,
                    to: next_to,
                    ..
                },
            ) if id == next_id => {
                *to = *next_to;
                true
            }
            (
                EditCommand::SetProperty { id, value, .. },
                EditCommand::SetProperty {
                    id: next_id,
                    value: next_value,
                    ..
                },
            ) if id == next_id && value.name() == next_value.name() => {
                *value = next_value.clone();
                true
            }
            _ => false,
        }
    }
}

fn page_of(target: &ObjectCollection, id: ObjectId) -> Result<usize, ModelError> {
    target
        .get(id)
        .map(|object| object.page_index)
        .ok_or(ModelError::ObjectNotFound(id))
}

/// Pages an edit affected, split by whether only overlay objects or the page layout changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Touched {
    pub object_pages: BTreeSet<usize>,
    pub layout_pages: BTreeSet<usize>,
}

impl Touched {
    fn objects(&mut self, page: usize) {
        self.object_pages.insert(page);
    }

    fn layout(&mut self, page: usize) {
        self.layout_pages.insert(page);
    }

    fn merge(&mut self, other: Touched) {
        self.object_pages.extend(other.object_pages);
        self.layout_pages.extend(other.layout_pages);
    }
}

/// Side effects the caller must propagate after a history change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditEffects {
    /// History position after the change; feed it to `DocumentStateManager::record_edit`.
    pub head: HistoryMark,
    pub touched: Touched,
    /// Id of the object a forward `AddObject` created.
    pub created: Option<ObjectId>,
}

struct HistoryEntry {
    mark: HistoryMark,
    command: EditCommand,
}

struct Gesture {
    label: String,
    mark: HistoryMark,
    commands: Vec<EditCommand>,
    base: HistoryMark,
    /// Redo history set aside by the gesture's first edit, given back on cancel.
    redo: Vec<HistoryEntry>,
}

pub struct UndoManager {
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    max_depth: usize,
    next_mark: u64,
    /// Mark of the newest entry that was trimmed off the bottom of the undo stack.
    floor: HistoryMark,
    gesture: Option<Gesture>,
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoManager {
    pub const DEFAULT_DEPTH: usize = 200;

    pub fn new() -> Self {
        Self::with_depth(Self::DEFAULT_DEPTH)
    }

    pub fn with_depth(max_depth: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_depth: max_depth.max(1),
            next_mark: 1,
            floor: HistoryMark::ORIGIN,
            gesture: None,
        }
    }

    /// Current history position.
    pub fn head(&self) -> HistoryMark {
        if let Some(gesture) = &self.gesture {
            if !gesture.commands.is_empty() {
                return gesture.mark;
            }
        }
        self.undo_stack
            .last()
            .map_or(self.floor, |entry| entry.mark)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty() || self.gesture_is_dirty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.undo_stack.last().map(|entry| entry.command.label())
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.redo_stack.last().map(|entry| entry.command.label())
    }

    pub fn in_gesture(&self) -> bool {
        self.gesture.is_some()
    }

    /// Applies `command`, records it, and drops the redo history. A failing command leaves
    /// both the target and the stacks untouched.
    pub fn execute(
        &mut self,
        mut command: EditCommand,
        target: &mut ObjectCollection,
    ) -> Result<EditEffects, ModelError> {
        let touched = command.apply(target)?;
        match self.gesture.as_mut() {
            Some(gesture) if gesture.commands.is_empty() => {
                gesture.redo = std::mem::take(&mut self.redo_stack);
            }
            _ => self.redo_stack.clear(),
        }
        let created = match &command {
            EditCommand::AddObject {
                created: Some(object),
                ..
            } => Some(object.id),
            _ => None,
        };

        if self.gesture.is_some() {
            let mark = self.allocate_mark();
            if let Some(gesture) = self.gesture.as_mut() {
                if gesture.commands.is_empty() {
                    gesture.mark = mark;
                }
                let merged = gesture
                    .commands
                    .last_mut()
                    .is_some_and(|last| last.absorb(&command));
                if !merged {
                    gesture.commands.push(command);
                }
            }
        } else {
            let mark = self.allocate_mark();
            debug!(label = command.label(), ?mark, "executed edit");
            self.push_undo(HistoryEntry { mark, command });
        }

        Ok(EditEffects {
            head: self.head(),
            touched,
            created,
        })
    }

    /// Reverts the newest entry. Returns `Ok(None)` when there is nothing to undo.
    pub fn undo(&mut self, target: &mut ObjectCollection) -> Result<Option<EditEffects>, ModelError> {
        self.end_gesture();
        let Some(mut entry) = self.undo_stack.pop() else {
            debug!("undo requested with empty history");
            return Ok(None);
        };
        match entry.command.revert(target) {
            Ok(touched) => {
                debug!(label = entry.command.label(), "undid edit");
                self.redo_stack.push(entry);
                Ok(Some(EditEffects {
                    head: self.head(),
                    touched,
                    created: None,
                }))
            }
            Err(err) => {
                self.undo_stack.push(entry);
                Err(err)
            }
        }
    }

    /// Re-applies the newest undone entry. Returns `Ok(None)` when there is nothing to redo.
    pub fn redo(&mut self, target: &mut ObjectCollection) -> Result<Option<EditEffects>, ModelError> {
        self.end_gesture();
        let Some(mut entry) = self.redo_stack.pop() else {
            debug!("redo requested with empty redo stack");
            return Ok(None);
        };
        match entry.command.apply(target) {
            Ok(touched) => {
                debug!(label = entry.command.label(), "redid edit");
                self.undo_stack.push(entry);
                Ok(Some(EditEffects {
                    head: self.head(),
                    touched,
                    created: None,
                }))
            }
            Err(err) => {
                self.redo_stack.push(entry);
                Err(err)
            }
        }
    }

    /// Starts collecting edits into a single undo entry (e.g. a drag). An open gesture is
    /// closed first.
    pub fn begin_gesture(&mut self, label: impl Into<String>) {
        self.end_gesture();
        let base = self.head();
        self.gesture = Some(Gesture {
            label: label.into(),
            mark: base,
            commands: Vec::new(),
            base,
            redo: Vec::new(),
        });
    }

    /// Closes the open gesture. Returns the new history head if the gesture recorded edits.
    pub fn end_gesture(&mut self) -> Option<HistoryMark> {
        let gesture = self.gesture.take()?;
        if gesture.commands.is_empty() {
            return None;
        }
        let command = if gesture.commands.len() == 1 {
            gesture.commands.into_iter().next()?
        } else {
            EditCommand::Group {
                label: gesture.label,
                commands: gesture.commands,
            }
        };
        debug!(label = command.label(), "closed gesture");
        self.push_undo(HistoryEntry {
            mark: gesture.mark,
            command,
        });
        Some(gesture.mark)
    }

    /// Reverts every edit of the open gesture and discards it.
    pub fn cancel_gesture(
        &mut self,
        target: &mut ObjectCollection,
    ) -> Result<Option<EditEffects>, ModelError> {
        let Some(mut gesture) = self.gesture.take() else {
            return Ok(None);
        };
        if gesture.commands.is_empty() {
            return Ok(None);
        }
        let mut touched = Touched::default();
        while let Some(mut command) = gesture.commands.pop() {
            match command.revert(target) {
                Ok(sub) => touched.merge(sub),
                Err(err) => {
                    gesture.commands.push(command);
                    self.gesture = Some(gesture);
                    return Err(err);
                }
            }
        }
        self.redo_stack = gesture.redo;
        Ok(Some(EditEffects {
            head: gesture.base,
            touched,
            created: None,
        }))
    }

    pub fn clear(&mut self) {
        self.floor = self.head();
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.gesture = None;
    }

    fn gesture_is_dirty(&self) -> bool {
        self.gesture
            .as_ref()
            .is_some_and(|gesture| !gesture.commands.is_empty())
    }

    fn allocate_mark(&mut self) -> HistoryMark {
        let mark = HistoryMark(self.next_mark);
        self.next_mark += 1;
        mark
    }

    fn push_undo(&mut self, entry: HistoryEntry) {
        self.undo_stack.push(entry);
        if self.undo_stack.len() > self.max_depth {
            let trimmed = self.undo_stack.remove(0);
            self.floor = trimmed.mark;
        }
    }
}
