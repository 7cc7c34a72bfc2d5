//! Embeds, buttons and text shown in Discord

use super::model::{button_style, Component, Embed, MessagePayload};
use crate::repositories::WorkoutProgress;
use crate::services::{DailySummary, DayIntake, LoggedMeal, ProfileService, SummaryService, TodayStats};
use health_butler_shared::{calorie_breakdown_rows, FitnessPlan, NutritionPayload, UserProfile};

/// Discord message content limit
pub const MAX_CONTENT: usize = 2000;
/// Embed field value limit
pub const MAX_FIELD: usize = 1024;
/// Embed description limit
pub const MAX_DESCRIPTION: usize = 4096;

const BREAKDOWN_ROWS: usize = 6;
const MEAL_LINES: usize = 8;
const PLAN_ITEMS: usize = 4;

const GREEN: u32 = 0x2ECC71;
const BLUE: u32 = 0x3498DB;
const PURPLE: u32 = 0x9B59B6;
const ORANGE: u32 = 0xF39C12;
const RED: u32 = 0xE74C3C;

/// Cut text to `max` characters, marking the cut
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// 150.0 → "150", 27.5 → "27.5"
pub fn num(value: f64) -> String {
    let formatted = format!("{value:.1}");
    formatted
        .strip_suffix(".0")
        .map(str::to_string)
        .unwrap_or(formatted)
}

/// Plain text reply, truncated to the content limit
pub fn text(content: &str) -> MessagePayload {
    MessagePayload::text(truncate(content, MAX_CONTENT))
}

// ============================================================================
// Nutrition
// ============================================================================

pub fn nutrition_embed(payload: &NutritionPayload, logged: bool) -> Embed {
    let macros = payload.total_macros;
    let confidence_pct = (payload.display_confidence() * 100.0).round() as i64;

    let mut breakdown: Vec<String> = calorie_breakdown_rows(payload)
        .iter()
        .take(BREAKDOWN_ROWS)
        .map(|row| {
            if row.quantity > 1.0 {
                format!(
                    "• {} ×{} ({} kcal each) = **{}** kcal",
                    row.item,
                    num(row.quantity),
                    num(row.calories_each),
                    num(row.calories_total)
                )
            } else {
                format!("• {} = **{}** kcal", row.item, num(row.calories_total))
            }
        })
        .collect();
    breakdown.push(format!("**Overall Total: {} kcal**", num(macros.calories)));

    let serving = payload.serving_multiplier.unwrap_or(1.0);
    let status = if logged { "Logged to today" } else { "Not logged" };

    Embed::new(
        format!("Nutrition Analysis: {} • {}% Confidence", payload.dish_or_default(), confidence_pct),
        GREEN,
    )
    .description(format!(
        "🔥 **{}** kcal | 🥩 **{}g** protein | 🍞 **{}g** carbs | 🥑 **{}g** fat",
        num(macros.calories),
        num(macros.protein),
        num(macros.carbs),
        num(macros.fat)
    ))
    .field("Calories by Item", truncate(&breakdown.join("\n"), MAX_FIELD), false)
    .field(
        "Health Insight",
        truncate(
            &SummaryService::health_insight(payload.health_tip.as_deref(), macros.calories),
            MAX_FIELD,
        ),
        false,
    )
    .footer(format!(
        "Confidence {} • Serving ×{} • {}",
        SummaryService::confidence_stars(payload.display_confidence()),
        num(serving),
        status
    ))
}

pub fn meal_components(session_id: &str, logged: bool) -> Vec<Component> {
    vec![Component::row(vec![
        Component::button(button_style::SUCCESS, "Add to today", format!("meal:add:{session_id}")).disabled(logged),
        Component::button(button_style::PRIMARY, "Adjust serving", format!("meal:serving:{session_id}")),
        Component::button(button_style::DANGER, "Remove", format!("meal:remove:{session_id}")).disabled(!logged),
    ])]
}

pub fn meal_message(session_id: &str, payload: &NutritionPayload, logged: bool) -> MessagePayload {
    MessagePayload::embeds(vec![nutrition_embed(payload, logged)])
        .with_components(meal_components(session_id, logged))
}

// ============================================================================
// Fitness
// ============================================================================

pub fn fitness_embed(plan: &FitnessPlan) -> Embed {
    let mut embed = Embed::new("Fitness Plan", BLUE);
    if !plan.summary.trim().is_empty() {
        embed = embed.description(truncate(plan.summary.trim(), MAX_DESCRIPTION));
    }

    let recommendations: Vec<String> = plan
        .recommendations
        .iter()
        .take(PLAN_ITEMS)
        .map(|rec| {
            let mut line = format!(
                "• **{}** ({} min, ~{} kcal)",
                rec.name.trim(),
                num(rec.duration_min),
                num(rec.kcal_estimate)
            );
            if !rec.reason.trim().is_empty() {
                line.push_str(&format!("\n  {}", rec.reason.trim()));
            }
            line
        })
        .collect();
    if !recommendations.is_empty() {
        embed = embed.field("Recommended", truncate(&recommendations.join("\n"), MAX_FIELD), false);
    }
    if !plan.safety_warnings.is_empty() {
        embed = embed.field("⚠️ Safety", truncate(&bullets(&plan.safety_warnings), MAX_FIELD), false);
    }
    if !plan.avoid.is_empty() {
        embed = embed.field("🚫 Avoid", truncate(&bullets(&plan.avoid), MAX_FIELD), false);
    }
    embed.footer("Use 'Log Workout' after you finish the first exercise to track it.")
}

pub fn workout_components(session_id: &str) -> Vec<Component> {
    vec![Component::row(vec![
        Component::button(button_style::SUCCESS, "Log workout", format!("workout:log:{session_id}")),
        Component::button(button_style::PRIMARY, "Add to routine", format!("workout:routine:{session_id}")),
        Component::button(button_style::SECONDARY, "View progress", format!("workout:progress:{session_id}")),
        Component::button(button_style::SECONDARY, "Safety info", format!("workout:safety:{session_id}")),
    ])]
}

pub fn workout_message(session_id: &str, plan: &FitnessPlan) -> MessagePayload {
    MessagePayload::embeds(vec![fitness_embed(plan)]).with_components(workout_components(session_id))
}

/// Safety text behind the "Safety info" button
pub fn safety_text(plan: &FitnessPlan) -> String {
    let mut sections = Vec::new();
    if !plan.safety_warnings.is_empty() {
        sections.push(format!("**Safety notes**\n{}", bullets(&plan.safety_warnings)));
    }
    if !plan.avoid.is_empty() {
        sections.push(format!("**Avoid**\n{}", bullets(&plan.avoid)));
    }
    if sections.is_empty() {
        return "No specific safety concerns for this plan. Warm up first and stop if anything hurts.".to_string();
    }
    sections.join("\n\n")
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|s| format!("• {}", s.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Profile, summary, progress
// ============================================================================

pub fn profile_embed(profile: &UserProfile) -> Embed {
    let list = |items: &[String]| {
        if items.is_empty() {
            "None".to_string()
        } else {
            items.join(", ")
        }
    };

    Embed::new(format!("Profile: {}", profile.full_name), PURPLE)
        .field("Age", profile.age.to_string(), true)
        .field("Gender", profile.gender.as_str(), true)
        .field("Activity", profile.activity.label(), true)
        .field("Height", format!("{} cm", num(profile.height_cm)), true)
        .field("Weight", format!("{} kg", num(profile.weight_kg)), true)
        .field("Daily target", format!("{} kcal", ProfileService::daily_target(profile)), true)
        .field("Goal", truncate(&profile.goal, MAX_FIELD), false)
        .field("Diet", truncate(&list(&profile.diet), MAX_FIELD), true)
        .field("Conditions", truncate(&list(&profile.conditions), MAX_FIELD), true)
        .field(
            "Daily reminders",
            if profile.daily_reminders { "On" } else { "Off" },
            true,
        )
}

pub fn summary_embed(summary: &DailySummary, stats: &TodayStats, meals: &[LoggedMeal], recent: &[DayIntake]) -> Embed {
    let color = if summary.is_over() { RED } else { ORANGE };
    let mut embed = Embed::new("Today's Summary", color)
        .description(format!(
            "**{}** / {} kcal ({:.1}%)",
            num(summary.consumed),
            summary.target,
            summary.percent
        ))
        .field("Meals", summary.meal_count.to_string(), true)
        .field(
            "Macros",
            format!(
                "{}g protein • {}g carbs • {}g fat",
                num(stats.protein),
                num(stats.carbs),
                num(stats.fat)
            ),
            true,
        )
        .field("Status", summary.status_line(), false);

    if let Some(list) = meal_list(meals) {
        embed = embed.field("Today's Meals", list, false);
    }
    if let Some(trend) = intake_trend(recent) {
        embed = embed.field("Recent Days", trend, false);
    }
    embed
}

/// Bullet per meal, with a count of the rest past the limit
fn meal_list(meals: &[LoggedMeal]) -> Option<String> {
    if meals.is_empty() {
        return None;
    }
    let mut lines: Vec<String> = meals
        .iter()
        .take(MEAL_LINES)
        .map(|m| format!("• {}: {} kcal", m.dish_name, num(m.calories)))
        .collect();
    if meals.len() > MEAL_LINES {
        lines.push(format!("…and {} more", meals.len() - MEAL_LINES));
    }
    Some(truncate(&lines.join("\n"), MAX_FIELD))
}

/// One line per logged day; nothing to compare with a single day
fn intake_trend(recent: &[DayIntake]) -> Option<String> {
    if recent.len() < 2 {
        return None;
    }
    let lines: Vec<String> = recent
        .iter()
        .map(|d| {
            format!(
                "{}: {} kcal ({} meal{})",
                d.day.format("%a %b %-d"),
                num(d.calories),
                d.meal_count,
                if d.meal_count == 1 { "" } else { "s" }
            )
        })
        .collect();
    Some(truncate(&lines.join("\n"), MAX_FIELD))
}

pub fn progress_embed(progress: &WorkoutProgress) -> Embed {
    let list = |items: &[String]| {
        if items.is_empty() {
            "None yet".to_string()
        } else {
            items.join(", ")
        }
    };

    Embed::new("Workout Progress (last 7 days)", BLUE)
        .field("Completed", progress.completed_count.to_string(), true)
        .field("Recommended", progress.recommended_count.to_string(), true)
        .field("Active minutes", progress.total_minutes.to_string(), true)
        .field("Calories burned", format!("~{} kcal", num(progress.total_kcal)), true)
        .field(
            format!("Routine ({})", progress.routine_count),
            truncate(&list(&progress.routine_exercises), MAX_FIELD),
            false,
        )
        .field(
            "Recent suggestions",
            truncate(&list(&progress.recent_recommendations), MAX_FIELD),
            false,
        )
}

pub fn morning_reminder(profile: &UserProfile) -> String {
    format!(
        "Good morning, {}! ☀️ Your calorie target today is **{} kcal**. Send me a photo of your meals with `/ask` and I'll keep track.",
        profile.full_name,
        ProfileService::daily_target(profile)
    )
}

pub fn evening_reminder(profile: &UserProfile, summary: &DailySummary) -> String {
    format!(
        "Good evening, {}! 🌙 Today you had **{}** / {} kcal across {} meal(s). {}.",
        profile.full_name,
        num(summary.consumed),
        summary.target,
        summary.meal_count,
        summary.status_line()
    )
}

pub fn help_text() -> &'static str {
    "**Health Butler** can help with:\n\
     • `/ask` a nutrition or fitness question, or attach a meal photo for a calorie breakdown\n\
     • `/onboard` to save your profile for personalized targets\n\
     • `/profile` to see your profile and daily target\n\
     • `/summary` for today's intake\n\
     • `/progress` for your workout week\n\
     • `/reset` to clear our conversation history\n\n\
     Meal results have buttons to add, resize or remove the meal from today's log. \
     Workout plans can be logged or added to your routine."
}

#[cfg(test)]
mod tests {
    use super::*;
    use health_butler_shared::{apply_serving_multiplier, Macros, Recommendation};
    use rstest::rstest;

    fn payload() -> NutritionPayload {
        NutritionPayload {
            dish_name: "Chicken Rice".to_string(),
            total_macros: Macros {
                calories: 300.0,
                protein: 12.0,
                carbs: 55.0,
                fat: 7.0,
            },
            confidence_score: Some(0.82),
            health_tip: Some("Good protein. Go easy on sauce.".to_string()),
            ..NutritionPayload::default()
        }
    }

    #[rstest]
    #[case(150.0, "150")]
    #[case(27.5, "27.5")]
    #[case(3.46, "3.5")]
    #[case(0.0, "0")]
    fn test_num(#[case] value: f64, #[case] expected: &str) {
        assert_eq!(num(value), expected);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        let cut = truncate(&"é".repeat(20), 10);
        assert_eq!(cut.chars().count(), 10);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn test_nutrition_embed() {
        let embed = nutrition_embed(&payload(), true);
        assert_eq!(
            embed.title.as_deref(),
            Some("Nutrition Analysis: Chicken Rice • 82% Confidence")
        );
        assert_eq!(
            embed.description.as_deref(),
            Some("🔥 **300** kcal | 🥩 **12g** protein | 🍞 **55g** carbs | 🥑 **7g** fat")
        );
        assert_eq!(embed.field_value("Calories by Item"), Some("**Overall Total: 300 kcal**"));
        assert!(embed.field_value("Health Insight").unwrap().starts_with("• Good protein."));
        assert_eq!(
            embed.footer.unwrap().text,
            "Confidence ★★★★☆ • Serving ×1 • Logged to today"
        );
    }

    #[test]
    fn test_half_serving_is_rendered_scaled() {
        let mut half = payload();
        apply_serving_multiplier(&mut half, 0.5, None);
        let embed = nutrition_embed(&half, false);
        assert_eq!(
            embed.description.as_deref(),
            Some("🔥 **150** kcal | 🥩 **6g** protein | 🍞 **27.5g** carbs | 🥑 **3.5g** fat")
        );
        assert!(embed.footer.unwrap().text.contains("Serving ×0.5 • Not logged"));
    }

    #[test]
    fn test_meal_buttons_follow_log_state() {
        let logged = serde_json::to_value(meal_components("abc", true)).unwrap();
        let buttons = &logged[0]["components"];
        assert_eq!(buttons[0]["custom_id"], "meal:add:abc");
        assert_eq!(buttons[0]["disabled"], true);
        assert_eq!(buttons[2]["disabled"], false);

        let unlogged = serde_json::to_value(meal_components("abc", false)).unwrap();
        assert_eq!(unlogged[0]["components"][2]["disabled"], true);
    }

    #[test]
    fn test_fitness_embed_caps_recommendations() {
        let rec = |name: &str| Recommendation {
            name: name.to_string(),
            duration_min: 30.0,
            kcal_estimate: 150.0,
            reason: "Low impact".to_string(),
        };
        let plan = FitnessPlan {
            summary: "Balance the meal".to_string(),
            recommendations: vec![rec("Walk"), rec("Swim"), rec("Cycle"), rec("Yoga"), rec("Row")],
            safety_warnings: vec!["Keep knees soft".to_string()],
            avoid: vec![],
        };

        let embed = fitness_embed(&plan);
        let recommended = embed.field_value("Recommended").unwrap();
        assert!(recommended.starts_with("• **Walk** (30 min, ~150 kcal)\n  Low impact"));
        assert!(!recommended.contains("Row"));
        assert_eq!(embed.field_value("⚠️ Safety"), Some("• Keep knees soft"));
        assert!(embed.field_value("🚫 Avoid").is_none());
        assert!(safety_text(&plan).starts_with("**Safety notes**"));
    }

    #[test]
    fn test_summary_embed_over_target_is_red() {
        let summary = DailySummary::compute(2300.0, 2000, 4);
        let embed = summary_embed(&summary, &TodayStats::default(), &[], &[]);
        assert_eq!(embed.color, Some(RED));
        assert_eq!(embed.description.as_deref(), Some("**2300** / 2000 kcal (115.0%)"));
        assert!(embed.field_value("Today's Meals").is_none());
        assert!(embed.field_value("Recent Days").is_none());
    }

    #[test]
    fn test_summary_embed_lists_meals_and_recent_days() {
        let summary = DailySummary::compute(650.0, 2000, 2);
        let meals = vec![
            LoggedMeal { dish_name: "Oatmeal".to_string(), calories: 300.0 },
            LoggedMeal { dish_name: "Chicken Salad".to_string(), calories: 350.5 },
        ];
        let day = |d: u32| chrono::NaiveDate::from_ymd_opt(2025, 3, d).unwrap();
        let recent = vec![
            DayIntake { day: day(14), calories: 650.5, meal_count: 2 },
            DayIntake { day: day(13), calories: 1800.0, meal_count: 1 },
        ];

        let embed = summary_embed(&summary, &TodayStats::default(), &meals, &recent);
        assert_eq!(
            embed.field_value("Today's Meals"),
            Some("• Oatmeal: 300 kcal\n• Chicken Salad: 350.5 kcal")
        );
        assert_eq!(
            embed.field_value("Recent Days"),
            Some("Fri Mar 14: 650.5 kcal (2 meals)\nThu Mar 13: 1800 kcal (1 meal)")
        );
    }

    #[test]
    fn test_meal_list_counts_overflow() {
        let meals: Vec<LoggedMeal> = (0..10)
            .map(|i| LoggedMeal { dish_name: format!("Snack {i}"), calories: 100.0 })
            .collect();
        let list = meal_list(&meals).unwrap();
        assert_eq!(list.lines().count(), MEAL_LINES + 1);
        assert!(list.ends_with("…and 2 more"));
    }
}
