//! Keyword-driven category classification shared by every adapter.
//!
//! One ordered rule table instead of per-adapter string-contains cascades,
//! so the admission pipeline's category decisions stay auditable in one
//! place. First matching rule wins.

use fdr_core::Category;

const KEYWORD_RULES: &[(Category, &[&str])] = &[
    (
        Category::Fashion,
        &[
            "cloth", "shirt", "dress", "shoe", "jean", "fashion", "kurta", "saree", "handbag",
        ],
    ),
    (Category::Home, &["home", "kitchen", "furniture", "decor"]),
    (Category::Beauty, &["beauty", "cosmetic", "skincare"]),
    (Category::Sports, &["sport", "fitness", "gym", "yoga"]),
    (Category::Books, &["book"]),
    (
        Category::Electronics,
        &[
            "phone", "electronic", "gadget", "laptop", "headphone", "camera", "keyboard", "watch",
        ],
    ),
];

/// Classifies a listing title, falling back to the platform's dominant
/// category when no keyword matches.
pub fn categorize(title: &str, fallback: Category) -> Category {
    let lower = title.to_ascii_lowercase();
    for (category, keywords) in KEYWORD_RULES {
        if keywords.iter().any(|keyword| lower.contains(keyword)) {
            return *category;
        }
    }
    fallback
}
