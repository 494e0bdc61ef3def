//! Ordered shape arena for one room.
//!
//! Order is arrival order and doubles as z-order. Every lookup is a linear
//! scan by id; rooms hold tens to low hundreds of shapes.

use serde::{Deserialize, Serialize};

use crate::shape::Shape;

/// Where an appended shape ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// New id, pushed to the end.
    Appended,
    /// Id already present; the existing entry was overwritten in place.
    Replaced,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    shapes: Vec<Shape>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a board from a shape list, collapsing duplicate ids.
    pub fn from_shapes(shapes: Vec<Shape>) -> Self {
        let mut board = Self::new();
        board.replace_all(shapes);
        board
    }

    /// Append a shape. A duplicate id overwrites the earlier entry in place.
    pub fn append(&mut self, shape: Shape) -> Placement {
        match self.position(&shape.id) {
            Some(idx) => {
                self.shapes[idx] = shape;
                Placement::Replaced
            }
            None => {
                self.shapes.push(shape);
                Placement::Appended
            }
        }
    }

    /// Replace the shape with the same id, keeping its position.
    ///
    /// Returns `false` and leaves the board untouched if the id is unknown.
    pub fn replace(&mut self, shape: Shape) -> bool {
        match self.position(&shape.id) {
            Some(idx) => {
                self.shapes[idx] = shape;
                true
            }
            None => false,
        }
    }

    /// Remove a shape by id.
    pub fn remove(&mut self, id: &str) -> Option<Shape> {
        self.position(id).map(|idx| self.shapes.remove(idx))
    }

    /// Remove every shape, returning how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.shapes.len();
        self.shapes.clear();
        removed
    }

    /// Overwrite the whole sequence. Duplicate ids keep the last value at
    /// the position of their first occurrence.
    pub fn replace_all(&mut self, shapes: Vec<Shape>) {
        self.shapes.clear();
        for shape in shapes {
            self.append(shape);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Shape> {
        self.shapes.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn to_vec(&self) -> Vec<Shape> {
        self.shapes.clone()
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.shapes.iter().position(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ShapeKind;

    fn rect(id: &str, width: f64) -> Shape {
        Shape::new(id, ShapeKind::Rect { width, height: 1.0 })
    }

    fn ids(board: &Board) -> Vec<&str> {
        board.shapes().iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_append_keeps_arrival_order() {
        let mut board = Board::new();
        assert_eq!(board.append(rect("a", 1.0)), Placement::Appended);
        assert_eq!(board.append(rect("b", 1.0)), Placement::Appended);
        assert_eq!(board.append(rect("c", 1.0)), Placement::Appended);
        assert_eq!(ids(&board), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_append_last_value_wins_in_place() {
        let mut board = Board::new();
        board.append(rect("a", 1.0));
        board.append(rect("b", 1.0));

        assert_eq!(board.append(rect("a", 9.0)), Placement::Replaced);
        assert_eq!(ids(&board), vec!["a", "b"]);
        assert_eq!(board.get("a"), Some(&rect("a", 9.0)));
    }

    #[test]
    fn test_replace_preserves_position() {
        let mut board = Board::from_shapes(vec![rect("a", 1.0), rect("b", 1.0), rect("c", 1.0)]);

        assert!(board.replace(rect("b", 5.0)));
        assert_eq!(ids(&board), vec!["a", "b", "c"]);
        assert_eq!(board.shapes()[1], rect("b", 5.0));
    }

    #[test]
    fn test_replace_unknown_is_noop() {
        let mut board = Board::from_shapes(vec![rect("a", 1.0)]);
        let before = board.clone();

        assert!(!board.replace(rect("zzz", 3.0)));
        assert_eq!(board, before);
    }

    #[test]
    fn test_remove() {
        let mut board = Board::from_shapes(vec![rect("a", 1.0), rect("b", 1.0)]);

        assert_eq!(board.remove("a"), Some(rect("a", 1.0)));
        assert_eq!(ids(&board), vec!["b"]);
        assert_eq!(board.remove("a"), None);
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut board = Board::from_shapes(vec![rect("a", 1.0), rect("b", 1.0)]);

        assert_eq!(board.clear(), 2);
        let once = board.clone();
        assert_eq!(board.clear(), 0);
        assert_eq!(board, once);
        assert!(board.is_empty());
    }

    #[test]
    fn test_replace_all_collapses_duplicates() {
        let mut board = Board::from_shapes(vec![rect("old", 1.0)]);
        board.replace_all(vec![rect("a", 1.0), rect("b", 1.0), rect("a", 7.0)]);

        assert_eq!(ids(&board), vec!["a", "b"]);
        assert_eq!(board.get("a"), Some(&rect("a", 7.0)));
        assert!(!board.contains("old"));
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let board = Board::from_shapes(vec![rect("a", 1.0)]);
        let value = serde_json::to_value(&board).unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["id"], "a");
    }
}
