use crate::Id;
use std::collections::{HashMap, HashSet};

/// Generates names that are unique within one scope, e.g. the signals of a
/// module or the submodules of a parent.
#[derive(Clone, Debug, Default)]
pub struct NameGenerator {
    name_hash: HashMap<Id, i64>,
    generated_names: HashSet<Id>,
}

impl NameGenerator {
    /// Create a NameGenerator where `names` are already defined so that this
    /// generator will never generate those names.
    pub fn with_prev_defined_names(names: HashSet<Id>) -> Self {
        NameGenerator {
            generated_names: names,
            name_hash: HashMap::default(),
        }
    }

    /// Returns a new name that starts with `prefix`.
    /// The first request for a prefix returns the prefix itself, later ones
    /// append `_1`, `_2`, ...
    pub fn gen_name<S>(&mut self, prefix: S) -> Id
    where
        S: Into<Id>,
    {
        let mut cur_prefix: Id = prefix.into();
        loop {
            let count = self
                .name_hash
                .entry(cur_prefix)
                .and_modify(|v| *v += 1)
                .or_insert(0);

            let name = if *count == 0 {
                cur_prefix
            } else {
                cur_prefix.with_suffix(count.to_string())
            };

            if self.generated_names.insert(name) {
                return name;
            }

            // Collides with a name given out under another prefix.
            cur_prefix = name;
        }
    }
}
