use serde::{Deserialize, Serialize};

/// Outlook's preset category colors, addressed by their preset index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum CategoryColor {
    #[default]
    None,
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Maroon,
    SteelBlue,
    DarkGreen,
    Teal,
    Olive,
    Gray,
    DarkGray,
    Black,
}

const PRESETS: [CategoryColor; 15] = [
    CategoryColor::None,
    CategoryColor::Red,
    CategoryColor::Orange,
    CategoryColor::Yellow,
    CategoryColor::Green,
    CategoryColor::Blue,
    CategoryColor::Purple,
    CategoryColor::Maroon,
    CategoryColor::SteelBlue,
    CategoryColor::DarkGreen,
    CategoryColor::Teal,
    CategoryColor::Olive,
    CategoryColor::Gray,
    CategoryColor::DarkGray,
    CategoryColor::Black,
];

impl CategoryColor {
    /// Unknown indices map to `CategoryColor::None`.
    pub fn from_index(index: u8) -> Self {
        PRESETS.get(usize::from(index)).copied().unwrap_or_default()
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn hex(self) -> &'static str {
        match self {
            CategoryColor::None => "#D3D3D3",
            CategoryColor::Red => "#FF0000",
            CategoryColor::Orange => "#FFA500",
            CategoryColor::Yellow => "#FFFF00",
            CategoryColor::Green => "#008000",
            CategoryColor::Blue => "#0000FF",
            CategoryColor::Purple => "#800080",
            CategoryColor::Maroon => "#800000",
            CategoryColor::SteelBlue => "#4682B4",
            CategoryColor::DarkGreen => "#006400",
            CategoryColor::Teal => "#008080",
            CategoryColor::Olive => "#808000",
            CategoryColor::Gray => "#808080",
            CategoryColor::DarkGray => "#A9A9A9",
            CategoryColor::Black => "#000000",
        }
    }
}

impl From<u8> for CategoryColor {
    fn from(index: u8) -> Self {
        CategoryColor::from_index(index)
    }
}

impl From<CategoryColor> for u8 {
    fn from(color: CategoryColor) -> Self {
        color.index()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub color: CategoryColor,
}

impl Category {
    pub fn new(name: &str, color: CategoryColor) -> Self {
        Self {
            name: name.to_string(),
            color,
        }
    }
}

/// Source of the categories an operator can pick from. Not used by the
/// decision core.
pub trait CategoryDirectory: Send + Sync {
    fn list_categories(&self) -> Vec<Category>;

    fn contains(&self, name: &str) -> bool {
        self.list_categories().iter().any(|c| c.name == name)
    }
}

/// Categories from the settings file, or the built-in set when none are configured.
#[derive(Debug, Clone)]
pub struct ConfiguredCategories {
    categories: Vec<Category>,
}

impl ConfiguredCategories {
    pub fn new(configured: &[Category]) -> Self {
        let categories = if configured.is_empty() {
            default_categories()
        } else {
            configured.to_vec()
        };
        Self { categories }
    }
}

impl CategoryDirectory for ConfiguredCategories {
    fn list_categories(&self) -> Vec<Category> {
        self.categories.clone()
    }
}

fn default_categories() -> Vec<Category> {
    vec![
        Category::new("KARL", CategoryColor::Green),
        Category::new("ADRIAN", CategoryColor::Yellow),
        Category::new("Borgz", CategoryColor::Gray),
        Category::new("JB", CategoryColor::Orange),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_lookup_has_explicit_default() {
        assert_eq!(CategoryColor::from_index(4), CategoryColor::Green);
        assert_eq!(CategoryColor::from_index(14).hex(), "#000000");
        assert_eq!(CategoryColor::from_index(15), CategoryColor::None);
        assert_eq!(CategoryColor::from_index(200).hex(), "#D3D3D3");
    }

    #[test]
    fn test_index_matches_preset_position() {
        for (position, color) in PRESETS.iter().enumerate() {
            assert_eq!(usize::from(color.index()), position);
        }
    }

    #[test]
    fn test_empty_configuration_falls_back_to_builtin_categories() {
        let directory = ConfiguredCategories::new(&[]);
        let names: Vec<String> = directory.list_categories().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["KARL", "ADRIAN", "Borgz", "JB"]);
        assert!(directory.contains("KARL"));
        assert!(!directory.contains("karl"));
    }

    #[test]
    fn test_configured_categories_replace_builtin_set() {
        let directory = ConfiguredCategories::new(&[Category::new("OPS", CategoryColor::Teal)]);
        assert_eq!(directory.list_categories(), vec![Category::new("OPS", CategoryColor::Teal)]);
    }
}
