//! Client-local undo/redo over whole-board snapshots.
//!
//! Two unbounded stacks of full shape lists. History is per client, not a
//! shared operation log: undoing replaces the whole room document for every
//! peer, so two clients undoing at the same time overwrite each other.

use crate::shape::Shape;

#[derive(Debug, Clone, Default)]
pub struct History {
    past: Vec<Vec<Shape>>,
    future: Vec<Vec<Shape>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the board as it was before a local mutation starts.
    ///
    /// Any redo branch is discarded.
    pub fn checkpoint(&mut self, current: &[Shape]) {
        self.past.push(current.to_vec());
        self.future.clear();
    }

    /// Step back one checkpoint.
    ///
    /// `current` moves onto the redo stack and the returned snapshot becomes
    /// the new document. `None` when there is nothing to undo.
    pub fn undo(&mut self, current: &[Shape]) -> Option<Vec<Shape>> {
        let previous = self.past.pop()?;
        self.future.push(current.to_vec());
        Some(previous)
    }

    /// Re-apply the most recently undone snapshot.
    pub fn redo(&mut self, current: &[Shape]) -> Option<Vec<Shape>> {
        let next = self.future.pop()?;
        self.past.push(current.to_vec());
        Some(next)
    }

    /// Forget everything. Used on clear, on join and when a remote snapshot
    /// replaces the document.
    pub fn reset(&mut self) {
        self.past.clear();
        self.future.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// (undo depth, redo depth)
    pub fn depth(&self) -> (usize, usize) {
        (self.past.len(), self.future.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ShapeKind;

    fn circle(id: &str) -> Shape {
        Shape::new(id, ShapeKind::Circle { radius: 3.0 })
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let mut history = History::new();
        let before = vec![circle("a")];

        history.checkpoint(&before);
        let after = vec![circle("a"), circle("b")];

        let undone = history.undo(&after).unwrap();
        assert_eq!(undone, before);

        let redone = history.redo(&undone).unwrap();
        assert_eq!(redone, after);
        assert_eq!(history.depth(), (1, 0));
    }

    #[test]
    fn test_empty_stacks_are_noops() {
        let mut history = History::new();
        assert!(history.undo(&[]).is_none());
        assert!(history.redo(&[]).is_none());
        assert_eq!(history.depth(), (0, 0));
    }

    #[test]
    fn test_checkpoint_discards_redo_branch() {
        let mut history = History::new();
        history.checkpoint(&[]);
        history.undo(&[circle("a")]);
        assert!(history.can_redo());

        history.checkpoint(&[]);
        assert!(!history.can_redo());
        assert_eq!(history.depth(), (1, 0));
    }

    #[test]
    fn test_multiple_steps() {
        let mut history = History::new();
        let s0: Vec<Shape> = vec![];
        let s1 = vec![circle("a")];
        let s2 = vec![circle("a"), circle("b")];

        history.checkpoint(&s0);
        history.checkpoint(&s1);

        assert_eq!(history.undo(&s2).unwrap(), s1);
        assert_eq!(history.undo(&s1).unwrap(), s0);
        assert!(history.undo(&s0).is_none());

        assert_eq!(history.redo(&s0).unwrap(), s1);
        assert_eq!(history.redo(&s1).unwrap(), s2);
        assert!(history.redo(&s2).is_none());
    }

    #[test]
    fn test_reset() {
        let mut history = History::new();
        history.checkpoint(&[circle("a")]);
        history.undo(&[]);
        history.checkpoint(&[]);

        history.reset();
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }
}
