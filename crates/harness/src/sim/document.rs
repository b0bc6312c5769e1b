use serde_json::Value;

/// A document edit, resolved by value so it stays meaningful when replayed
/// against a list that changed in the meantime.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    Insert { index: usize, value: Value },
    Remove { value: Value },
    Move { value: Value, to: usize },
    Clear,
}

impl Mutation {
    pub fn apply(&self, items: &mut Vec<Value>) {
        match self {
            Self::Insert { index, value } => {
                if !items.contains(value) {
                    items.insert((*index).min(items.len()), value.clone());
                }
            }
            Self::Remove { value } => {
                if let Some(position) = items.iter().position(|item| item == value) {
                    drop(items.remove(position));
                }
            }
            Self::Move { value, to } => {
                if let Some(position) = items.iter().position(|item| item == value) {
                    let item = items.remove(position);
                    items.insert((*to).min(items.len()), item);
                }
            }
            Self::Clear => items.clear(),
        }
    }
}

/// A client's own edit together with the edit that reverts it.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub forward: Mutation,
    pub inverse: Mutation,
}

/// Per-client undo/redo stacks.
#[derive(Debug, Default)]
pub struct History {
    undo: Vec<HistoryEntry>,
    redo: Vec<HistoryEntry>,
}

impl History {
    pub fn record(&mut self, entry: HistoryEntry) {
        self.undo.push(entry);
        self.redo.clear();
    }

    pub fn undo(&mut self) -> Option<Mutation> {
        let entry = self.undo.pop()?;
        let mutation = entry.inverse.clone();
        self.redo.push(entry);
        Some(mutation)
    }

    pub fn redo(&mut self) -> Option<Mutation> {
        let entry = self.redo.pop()?;
        let mutation = entry.forward.clone();
        self.undo.push(entry);
        Some(mutation)
    }

    pub fn reset(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn list(values: &[&str]) -> Vec<Value> {
        values.iter().map(|v| json!(v)).collect()
    }

    #[test]
    fn insert_is_idempotent_and_clamped() {
        let mut items = list(&["a"]);
        let insert = Mutation::Insert {
            index: 10,
            value: json!("b"),
        };

        insert.apply(&mut items);
        insert.apply(&mut items);

        assert_eq!(items, list(&["a", "b"]), "clamped to end, applied once");
    }

    #[test]
    fn remove_and_move_skip_missing_values() {
        let mut items = list(&["a", "b"]);

        Mutation::Remove { value: json!("z") }.apply(&mut items);
        Mutation::Move {
            value: json!("z"),
            to: 0,
        }
        .apply(&mut items);

        assert_eq!(items, list(&["a", "b"]), "unknown values are ignored");
    }

    #[test]
    fn move_relocates_by_value() {
        let mut items = list(&["a", "b", "c"]);

        Mutation::Move {
            value: json!("a"),
            to: 2,
        }
        .apply(&mut items);

        assert_eq!(items, list(&["b", "c", "a"]), "first moved to end");
    }

    #[test]
    fn history_walks_both_ways() {
        let mut history = History::default();
        history.record(HistoryEntry {
            forward: Mutation::Insert {
                index: 0,
                value: json!("a"),
            },
            inverse: Mutation::Remove { value: json!("a") },
        });

        assert_eq!(
            history.undo(),
            Some(Mutation::Remove { value: json!("a") }),
            "undo yields inverse"
        );
        assert_eq!(history.undo(), None, "nothing left to undo");
        assert_eq!(
            history.redo(),
            Some(Mutation::Insert {
                index: 0,
                value: json!("a")
            }),
            "redo yields forward"
        );
        assert_eq!(history.redo(), None, "nothing left to redo");
    }
}
