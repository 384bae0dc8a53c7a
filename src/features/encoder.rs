//! Label encoding for one categorical column.

use serde::{Deserialize, Serialize};

/// Code assigned to categories never seen at fit time.
pub const UNKNOWN_CODE: i64 = -1;

/// Sorted vocabulary; a category's code is its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    classes: Vec<String>,
}

impl CategoricalEncoder {
    pub fn fit<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut classes: Vec<String> = values.into_iter().map(str::to_string).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn encode(&self, value: &str) -> i64 {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(value))
            .map(|i| i as i64)
            .unwrap_or(UNKNOWN_CODE)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_sorted_order() {
        let enc = CategoricalEncoder::fit(["web", "atm", "pos", "atm"]);
        assert_eq!(enc.classes(), &["atm", "pos", "web"]);
        assert_eq!(enc.encode("atm"), 0);
        assert_eq!(enc.encode("web"), 2);
    }

    #[test]
    fn unseen_category_maps_to_sentinel_without_growing() {
        let enc = CategoricalEncoder::fit(["web", "atm"]);
        assert_eq!(enc.encode("crypto"), UNKNOWN_CODE);
        assert_eq!(enc.len(), 2);
    }
}
