use std::collections::BTreeMap;
use trading::Strategy;

pub type StrategyFactory = fn() -> Box<dyn Strategy>;

/// Maps configured strategy kinds to constructors.
pub struct StrategyRegistry {
    factories: BTreeMap<String, StrategyFactory>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("moving-average", my_strategy::entry_point);
        registry
    }
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, kind: impl Into<String>, factory: StrategyFactory) {
        self.factories.insert(kind.into(), factory);
    }

    pub fn create(&self, kind: &str) -> Option<Box<dyn Strategy>> {
        self.factories.get(kind).map(|factory| factory())
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
