use serde_json::Value;

/// Iteration-scalar state for `foreach`-style workflow resources.
///
/// A single typed value rather than a stringly-keyed map — `item("current")`
/// and friends translate onto this. Outside an active iteration this is the
/// default (empty) value: `current`/`prev`/`next` return nothing (never an
/// error), `index`/`count` are zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Iteration {
    /// The element at the current index, if iterating.
    pub current: Option<Value>,
    /// The previous element, if any.
    pub prev: Option<Value>,
    /// The next element, if any.
    pub next: Option<Value>,
    /// Zero-based position within `items`.
    pub index: usize,
    /// Total number of items being iterated.
    pub count: usize,
    /// The full item list.
    pub items: Vec<Value>,
}

impl Iteration {
    /// No active iteration.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build iteration state positioned at `index` within `items`.
    #[must_use]
    pub fn at(items: Vec<Value>, index: usize) -> Self {
        let current = items.get(index).cloned();
        let prev = index.checked_sub(1).and_then(|i| items.get(i)).cloned();
        let next = items.get(index + 1).cloned();
        let count = items.len();
        Self {
            current,
            prev,
            next,
            index,
            count,
            items,
        }
    }

    /// Resolve an `Item(name)` accessor, including its aliases: `current`,
    /// `i`→`index`, `total`→`count`, `list`→`items`.
    #[must_use]
    pub fn item(&self, name: &str) -> Option<Value> {
        match name {
            "" | "current" => self.current.clone(),
            "prev" => self.prev.clone(),
            "next" => self.next.clone(),
            "index" | "i" => Some(Value::from(self.index)),
            "count" | "total" => Some(Value::from(self.count)),
            "items" | "list" => Some(Value::from(self.items.clone())),
            _ => None,
        }
    }
}
