// Named derivative templates and the path segment → derivative map

use std::collections::{BTreeMap, HashMap};

use super::TransformOptions;

/// Read-only registry of derivative templates, built once from config
#[derive(Debug, Clone, Default)]
pub struct DerivativeRegistry {
    templates: HashMap<String, TransformOptions>,
    path_map: BTreeMap<String, String>,
}

impl DerivativeRegistry {
    pub fn new(
        templates: HashMap<String, TransformOptions>,
        path_map: BTreeMap<String, String>,
    ) -> Self {
        Self {
            templates,
            path_map,
        }
    }

    pub fn get(&self, name: &str) -> Option<&TransformOptions> {
        self.templates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Derivative named by a directory segment of `path`.
    ///
    /// Segments are checked left to right and the file name is never a
    /// match: `/thumbnails/cat.jpg` hits `thumbnails`, `/thumbnails` does not.
    pub fn derivative_for_path(&self, path: &str) -> Option<&str> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let (_, directories) = segments.split_last()?;

        directories
            .iter()
            .find_map(|segment| self.path_map.get(*segment))
            .map(String::as_str)
    }
}
