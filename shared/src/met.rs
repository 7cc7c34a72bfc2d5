//! MET (Metabolic Equivalent of Task) reference table
//!
//! Values follow the Compendium of Physical Activities. Lookup is by
//! keyword so free-text exercise names produced by the model still resolve.

/// MET used when an exercise name matches nothing in the table
pub const DEFAULT_MET: f64 = 4.0;

/// Keyword → MET. Longer, more specific keywords come first so that
/// "brisk walking" wins over "walk".
const MET_TABLE: &[(&str, f64)] = &[
    ("brisk walk", 4.3),
    ("stair climb", 8.8),
    ("jump rope", 11.0),
    ("strength training", 5.0),
    ("weight lifting", 5.0),
    ("resistance band", 3.5),
    ("water aerobics", 5.5),
    ("tai chi", 3.0),
    ("walk", 3.5),
    ("jog", 7.0),
    ("run", 9.8),
    ("cycl", 7.5),
    ("bike", 7.5),
    ("swim", 6.0),
    ("yoga", 2.5),
    ("pilates", 3.0),
    ("stretch", 2.3),
    ("hiit", 8.0),
    ("elliptical", 5.0),
    ("rowing", 7.0),
    ("dance", 5.0),
    ("hike", 6.0),
    ("squat", 5.0),
    ("push-up", 3.8),
    ("pushup", 3.8),
    ("plank", 3.8),
    ("lunge", 4.0),
    ("burpee", 8.0),
];

/// Look up the MET value for a free-text exercise name
pub fn met_for(exercise_name: &str) -> f64 {
    let name = exercise_name.to_lowercase();
    MET_TABLE
        .iter()
        .find(|(keyword, _)| name.contains(keyword))
        .map(|(_, met)| *met)
        .unwrap_or(DEFAULT_MET)
}

/// Estimate calories burned
///
/// kcal = MET × weight(kg) × duration(h)
pub fn estimate_kcal(met: f64, weight_kg: f64, minutes: f64) -> i32 {
    if met <= 0.0 || weight_kg <= 0.0 || minutes <= 0.0 {
        return 0;
    }
    (met * weight_kg * minutes / 60.0).round() as i32
}

/// Convenience wrapper: estimate directly from an exercise name
pub fn estimate_exercise_kcal(exercise_name: &str, weight_kg: f64, minutes: f64) -> i32 {
    estimate_kcal(met_for(exercise_name), weight_kg, minutes)
}
