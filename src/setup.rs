//! Setup-time matrix and batch-family grouping (spec component: setup &
//! batching).

use std::collections::HashMap;

use crate::time::Duration;

/// Changeover cost between setup families, keyed by `(from, to)`. Same-family
/// transitions (or an unseen machine with no prior setup) cost zero.
#[derive(Debug, Clone, Default)]
pub struct SetupMatrix {
    costs: HashMap<(String, String), Duration>,
}

impl SetupMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, from: impl Into<String>, to: impl Into<String>, cost: Duration) {
        self.costs.insert((from.into(), to.into()), cost);
    }

    /// Cost of changing over from `from` (the machine's current setup,
    /// `None` if it has none yet) to `to`.
    pub fn cost(&self, from: Option<&str>, to: &str) -> Duration {
        match from {
            None => Duration::ZERO,
            Some(from) if from == to => Duration::ZERO,
            Some(from) => self
                .costs
                .get(&(from.to_owned(), to.to_owned()))
                .copied()
                .unwrap_or(Duration::ZERO),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_family_is_free() {
        let mut m = SetupMatrix::new();
        m.set("a", "b", Duration(5.0));
        assert_eq!(m.cost(Some("a"), "a"), Duration::ZERO);
    }

    #[test]
    fn unset_transition_defaults_to_zero() {
        let m = SetupMatrix::new();
        assert_eq!(m.cost(Some("a"), "b"), Duration::ZERO);
    }

    #[test]
    fn looked_up_transition_applies() {
        let mut m = SetupMatrix::new();
        m.set("a", "b", Duration(5.0));
        assert_eq!(m.cost(Some("a"), "b"), Duration(5.0));
        assert_eq!(m.cost(None, "b"), Duration::ZERO);
    }
}
