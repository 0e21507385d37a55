//! Category taxonomy of the listing site

/// Code used for anything the table does not know
pub const FALLBACK_CATEGORY: u32 = 162733;

/// Site category codes and the inventory category names (lowercase) that map to them
const CATEGORIES: &[(u32, &[&str])] = &[
    (2830472, &["appliances"]),
    (
        2830485,
        &["arts, crafts & sewing", "arts,crafts & sewing", "arts & crafts", "arts"],
    ),
    (339711, &["automotive", "automotive parts & accessories"]),
    (339747, &["furniture"]),
    (2830498, &["baby products"]),
    (2830511, &["beauty & personal care"]),
    (2830524, &["cell phones & accessories"]),
    (
        2830537,
        &["clothing", "clothing,shoes & jewelry", "clothing, shoes & jewelry"],
    ),
    (2153220, &["comics", "collectibles"]),
    (339723, &["electronics", "computers & accessories"]),
    (2830563, &["grocery & gourmet food"]),
    (2830576, &["health & household"]),
    (
        162703,
        &["home & kitchen", "storage & organization", "kitchen & dining"],
    ),
    (2830771, &["industrial & scientific"]),
    (2830784, &["medical supplies & equipment"]),
    (2830797, &["mobility & daily living aids"]),
    (2673968, &["musical instruments"]),
    (2830810, &["office products"]),
    (2830823, &["lawn & garden", "garden & outdor", "garden & outdoor"]),
    (2830836, &["dogs", "cats", "pet supplies"]),
    (2830862, &["restaurant appliances & equipment"]),
    (2830875, &["sports & fitness"]),
    (
        2830914,
        &[
            "lighting & ceiling fans",
            "tools & home improvement",
            "kitchen & bath fixtures",
            "power & hand tools",
        ],
    ),
    (2830927, &["toys & games", "toys"]),
    (2830940, &["video games"]),
    (162733, &["misc"]),
    (2830888, &["sports & outdoors", "outdoors"]),
    (2831231, &["movies & tv"]),
    (507716, &["luggage"]),
    (507704, &["drugstore"]),
    (2673955, &["books"]),
    (2831248, &["cds & vinyl"]),
    (70189253, &["pool"]),
    (83468654, &["christmas"]),
];

/// Site category code for an inventory category name
///
/// Matching is case-insensitive and ignores surrounding whitespace. Unknown
/// names resolve to [`FALLBACK_CATEGORY`], so this never fails.
pub fn resolve_category(name: &str) -> u32 {
    let needle = name.trim().to_lowercase();
    CATEGORIES
        .iter()
        .find(|(_, names)| names.contains(&needle.as_str()))
        .map(|(code, _)| *code)
        .unwrap_or(FALLBACK_CATEGORY)
}
