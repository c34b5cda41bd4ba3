use serde::Deserialize;
use serde::Serialize;
use utoipa::ToSchema;

/// A free-form tag list attached to a project
///
/// Stored as a nullable-element text array; NULL entries are dropped on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default, ToSchema)]
pub struct Tags(Vec<String>);

impl Tags {
    pub fn new(value: Vec<String>) -> Self {
        Self(value)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Option<String>>> for Tags {
    fn from(value: Vec<Option<String>>) -> Self {
        Self(value.into_iter().flatten().collect())
    }
}

impl From<Tags> for Vec<Option<String>> {
    fn from(value: Tags) -> Self {
        value.0.into_iter().map(Some).collect()
    }
}

impl FromIterator<String> for Tags {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn null_entries_are_dropped_on_read() {
        let stored = vec![Some("web".to_owned()), None, Some("editor".to_owned())];
        let tags = Tags::from(stored);
        assert_eq!(tags.to_vec(), vec!["web".to_owned(), "editor".to_owned()]);
    }

    #[test]
    fn round_trip_wraps_every_tag() {
        let tags = Tags::new(vec!["a".to_owned(), "b".to_owned()]);
        let stored: Vec<Option<String>> = tags.into();
        assert_eq!(stored, vec![Some("a".to_owned()), Some("b".to_owned())]);
    }
}
