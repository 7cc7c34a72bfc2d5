//! Static knowledge base: food facts, exercises and safety protocols

use super::RagError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Minimum score for a food match
pub const FOOD_MIN_SCORE: u32 = 75;
/// Minimum score for an exercise match
pub const EXERCISE_MIN_SCORE: u32 = 60;

/// Nutrition facts per 100 g
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodFact {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Typical weight of one piece or serving
    pub unit_grams: f64,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl FoodFact {
    /// Calories for a given weight; one typical unit when weight is unknown
    pub fn calories_for(&self, grams: Option<f64>) -> f64 {
        let grams = grams.filter(|g| g.is_finite() && *g > 0.0).unwrap_or(self.unit_grams);
        self.calories * grams / 100.0
    }

    /// One-line summary used as grounding text
    pub fn describe(&self) -> String {
        format!(
            "{} (per 100 g): {} kcal, {} g protein, {} g carbs, {} g fat; one unit is about {} g",
            self.name, self.calories, self.protein, self.carbs, self.fat, self.unit_grams
        )
    }
}

/// Best food match for a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodMatch {
    pub fact: FoodFact,
    pub score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub intensity: Intensity,
    pub met: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub contraindications: Vec<String>,
}

impl Exercise {
    fn search_text(&self) -> String {
        format!("{} {} {}", self.name, self.category, self.tags.join(" "))
    }

    pub fn describe(&self) -> String {
        format!("{} ({}, {:?} intensity, MET {}): {}", self.name, self.category, self.intensity, self.met, self.description)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyProtocol {
    pub condition: String,
    #[serde(default)]
    pub forbidden_patterns: Vec<String>,
    pub warning_message: String,
}

/// Outcome of the contraindication and protocol filter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SafetyFilter {
    pub safe: Vec<Exercise>,
    pub warnings: Vec<String>,
    pub filtered_count: usize,
}

/// In-memory knowledge base
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    pub foods: Vec<FoodFact>,
    pub exercises: Vec<Exercise>,
    pub protocols: Vec<SafetyProtocol>,
}

impl KnowledgeBase {
    pub fn new(foods: Vec<FoodFact>, exercises: Vec<Exercise>, protocols: Vec<SafetyProtocol>) -> Self {
        Self {
            foods,
            exercises,
            protocols,
        }
    }

    /// Load `foods.json`, `exercises.json` and `safety_protocols.json`
    ///
    /// A missing file yields an empty table; a malformed one is an error.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, RagError> {
        let dir = dir.as_ref();
        let kb = Self {
            foods: load_table(dir, "foods.json")?,
            exercises: load_table(dir, "exercises.json")?,
            protocols: load_table(dir, "safety_protocols.json")?,
        };
        info!(
            foods = kb.foods.len(),
            exercises = kb.exercises.len(),
            protocols = kb.protocols.len(),
            "Knowledge base loaded"
        );
        Ok(kb)
    }

    /// Closest food by name or alias
    pub fn search_food(&self, query: &str) -> Option<FoodMatch> {
        if query.trim().is_empty() {
            return None;
        }

        self.foods
            .iter()
            .filter_map(|fact| {
                let score = std::iter::once(&fact.name)
                    .chain(fact.aliases.iter())
                    .map(|name| similarity_score(query, name))
                    .max()
                    .unwrap_or(0);
                (score >= FOOD_MIN_SCORE).then_some((score, fact))
            })
            // Stable: ties keep the earlier entry
            .fold(None::<(u32, &FoodFact)>, |best, candidate| match best {
                Some(b) if b.0 >= candidate.0 => Some(b),
                _ => Some(candidate),
            })
            .map(|(score, fact)| FoodMatch {
                fact: fact.clone(),
                score,
            })
    }

    /// Foods whose full name appears in free text, in table order
    pub fn mentioned_foods(&self, text: &str) -> Vec<&FoodFact> {
        self.foods
            .iter()
            .filter(|fact| overlap_score(&fact.name, text) == 100)
            .collect()
    }

    /// Exercises matching the query; an empty query returns the first `limit`
    pub fn search_exercises(&self, query: &str, limit: usize) -> Vec<Exercise> {
        rank_exercises(&self.exercises, query, limit)
    }

    /// Drop exercises that conflict with the user's conditions
    ///
    /// An exercise is removed when a condition appears in one of its
    /// contraindications, or when its name or description contains a
    /// forbidden pattern from a protocol for one of the conditions.
    pub fn filter_safe(&self, conditions: &[String]) -> SafetyFilter {
        let conditions: Vec<String> = conditions
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();

        let mut patterns: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        for protocol in &self.protocols {
            if conditions.contains(&protocol.condition.trim().to_lowercase()) {
                patterns.extend(protocol.forbidden_patterns.iter().map(|p| p.to_lowercase()));
                if !protocol.warning_message.is_empty() && !warnings.contains(&protocol.warning_message) {
                    warnings.push(protocol.warning_message.clone());
                }
            }
        }

        let mut safe = Vec::new();
        let mut filtered_count = 0;
        for exercise in &self.exercises {
            let contraindicated = conditions.iter().any(|cond| {
                exercise
                    .contraindications
                    .iter()
                    .any(|contra| contra.to_lowercase().contains(cond.as_str()))
            });
            let name = exercise.name.to_lowercase();
            let description = exercise.description.to_lowercase();
            let forbidden = patterns
                .iter()
                .any(|p| name.contains(p.as_str()) || description.contains(p.as_str()));

            if contraindicated || forbidden {
                filtered_count += 1;
            } else {
                safe.push(exercise.clone());
            }
        }

        SafetyFilter {
            safe,
            warnings,
            filtered_count,
        }
    }
}

/// Rank a list of exercises against a query
pub fn rank_exercises(exercises: &[Exercise], query: &str, limit: usize) -> Vec<Exercise> {
    if query.trim().is_empty() {
        return exercises.iter().take(limit).cloned().collect();
    }

    let mut scored: Vec<(u32, usize)> = exercises
        .iter()
        .enumerate()
        .map(|(i, ex)| (overlap_score(query, &ex.search_text()), i))
        .filter(|(score, _)| *score >= EXERCISE_MIN_SCORE)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    scored
        .into_iter()
        .take(limit)
        .map(|(_, i)| exercises[i].clone())
        .collect()
}

fn load_table<T: for<'de> Deserialize<'de>>(dir: &Path, file: &str) -> Result<Vec<T>, RagError> {
    let path = dir.join(file);
    if !path.exists() {
        warn!(path = %path.display(), "Knowledge file not found, using empty table");
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(&path).map_err(|e| RagError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    serde_json::from_str(&raw).map_err(|e| RagError::Parse {
        path: path.display().to_string(),
        source: e,
    })
}

// ============================================================================
// Token-set scoring
// ============================================================================

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "the", "i", "me", "my", "to", "for", "of", "with", "some", "this", "that",
    "want", "would", "like", "please", "can", "you", "should", "do", "what", "is", "are", "in",
    "on", "at", "it", "be", "based", "suggest", "recommend",
];

fn normalize_token(token: &str) -> String {
    let t = token.to_lowercase();
    if t.len() > 4 && t.ends_with("ies") {
        format!("{}y", &t[..t.len() - 3])
    } else if t.len() > 3 && t.ends_with('s') && !t.ends_with("ss") {
        t[..t.len() - 1].to_string()
    } else {
        t
    }
}

fn tokens(text: &str, drop_stop_words: bool) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .filter(|t| !drop_stop_words || !STOP_WORDS.contains(&t.to_lowercase().as_str()))
        .map(normalize_token)
        .collect()
}

fn tokens_match(a: &str, b: &str) -> bool {
    a == b || (a.len() >= 3 && b.len() >= 3 && (a.starts_with(b) || b.starts_with(a)))
}

fn common_count(query: &HashSet<String>, candidate: &HashSet<String>) -> usize {
    query
        .iter()
        .filter(|q| candidate.iter().any(|c| tokens_match(q, c)))
        .count()
}

/// Symmetric token-set similarity, 0–100
///
/// Twice the shared tokens over the total token count, so extra words on
/// either side lower the score.
pub fn similarity_score(query: &str, candidate: &str) -> u32 {
    let q = tokens(query, false);
    let c = tokens(candidate, false);
    if q.is_empty() || c.is_empty() {
        return 0;
    }
    let common = common_count(&q, &c);
    ((200 * common) as f64 / (q.len() + c.len()) as f64).round().min(100.0) as u32
}

/// Overlap score for free-text queries, 0–100
///
/// Any shared token scores at least 50; full coverage of either side
/// scores 100. Stop words in the query are ignored.
pub fn overlap_score(query: &str, candidate: &str) -> u32 {
    let q = tokens(query, true);
    let c = tokens(candidate, false);
    if q.is_empty() || c.is_empty() {
        return 0;
    }
    let common = common_count(&q, &c);
    if common == 0 {
        return 0;
    }
    let coverage = (common as f64 / q.len() as f64).max(common as f64 / c.len() as f64);
    (50.0 + 50.0 * coverage.min(1.0)).round() as u32
}
