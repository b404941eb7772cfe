use serde::{Deserialize, Serialize};

pub const DEFAULT_WEIGHT: f32 = 1.0;

/// An item paired with the weight it contributes with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weighted<T> {
    pub item: T,
    pub weight: f32,
}

impl<T> Weighted<T> {
    #[inline]
    pub fn new(item: T, weight: f32) -> Self {
        Self { item, weight }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Weighted<U> {
        Weighted {
            item: f(self.item),
            weight: self.weight,
        }
    }
}

impl<T> From<T> for Weighted<T> {
    fn from(item: T) -> Self {
        Self::new(item, DEFAULT_WEIGHT)
    }
}
