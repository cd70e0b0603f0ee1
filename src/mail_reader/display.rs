use crate::categorizer::Classification;
use crate::categories::Category;
use log::error;

pub fn display_classifications(classifications: &[Classification]) {
    match serde_json::to_string_pretty(classifications) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Error converting to JSON: {}", e),
    }
}

pub fn display_categories(categories: &[Category]) {
    for category in categories {
        println!("{:<16} {} (preset {})", category.name, category.color.hex(), category.color.index());
    }
}
